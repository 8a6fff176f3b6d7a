//! L2CAP transport layer used by the ATT bearer.
//!
//! ATT runs over the L2CAP fixed channel (CID 4), which delivers each PDU
//! as one complete datagram. This module defines the small transport
//! surface the ATT connection needs: a non-blocking datagram socket with
//! an attached link security level. A real BlueZ-backed socket is provided
//! on Linux; [`LoopbackSocket`] serves tests and non-Bluetooth platforms.

use std::collections::VecDeque;
use std::io;

/// L2CAP channel ID of the ATT fixed channel.
pub const ATT_CID: u16 = 0x0004;

/// Security level of the underlying link, driven by pairing and
/// encryption state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum SecurityLevel {
    /// No security
    None,
    /// Link established, no encryption
    Low,
    /// Encrypted link
    Medium,
    /// Authenticated and encrypted link
    High,
}

/// A message-framed byte channel carrying ATT PDUs.
///
/// Each datagram is exactly one PDU; implementations never deliver or
/// accept partial PDUs. `recv` must not block: it returns `Ok(None)` when
/// no datagram is pending.
pub trait L2capSocket {
    /// Receives one PDU if available.
    fn recv(&mut self) -> io::Result<Option<Vec<u8>>>;

    /// Sends one PDU in full.
    fn send(&mut self, pdu: &[u8]) -> io::Result<()>;

    /// Current security level of the link.
    fn security_level(&self) -> SecurityLevel;
}

/// In-memory datagram pair, used for tests and for platforms without a
/// Bluetooth stack.
///
/// `recv` pops PDUs queued with [`push_inbound`](Self::push_inbound);
/// `send` appends to an outbound queue drained with
/// [`pop_outbound`](Self::pop_outbound).
pub struct LoopbackSocket {
    inbound: VecDeque<Vec<u8>>,
    outbound: VecDeque<Vec<u8>>,
    security: SecurityLevel,
}

impl LoopbackSocket {
    pub fn new() -> Self {
        Self::with_security(SecurityLevel::None)
    }

    pub fn with_security(security: SecurityLevel) -> Self {
        Self {
            inbound: VecDeque::new(),
            outbound: VecDeque::new(),
            security,
        }
    }

    /// Queues a PDU to be returned by the next `recv` call.
    pub fn push_inbound(&mut self, pdu: &[u8]) {
        self.inbound.push_back(pdu.to_vec());
    }

    /// Pops the oldest PDU written through `send`.
    pub fn pop_outbound(&mut self) -> Option<Vec<u8>> {
        self.outbound.pop_front()
    }

    pub fn outbound_len(&self) -> usize {
        self.outbound.len()
    }

    pub fn set_security_level(&mut self, security: SecurityLevel) {
        self.security = security;
    }
}

impl Default for LoopbackSocket {
    fn default() -> Self {
        Self::new()
    }
}

impl L2capSocket for LoopbackSocket {
    fn recv(&mut self) -> io::Result<Option<Vec<u8>>> {
        Ok(self.inbound.pop_front())
    }

    fn send(&mut self, pdu: &[u8]) -> io::Result<()> {
        self.outbound.push_back(pdu.to_vec());
        Ok(())
    }

    fn security_level(&self) -> SecurityLevel {
        self.security
    }
}

/// Forwarding impl so an embedder can keep a handle to the socket while
/// the ATT bearer owns another.
impl<S: L2capSocket> L2capSocket for std::rc::Rc<std::cell::RefCell<S>> {
    fn recv(&mut self) -> io::Result<Option<Vec<u8>>> {
        self.borrow_mut().recv()
    }

    fn send(&mut self, pdu: &[u8]) -> io::Result<()> {
        self.borrow_mut().send(pdu)
    }

    fn security_level(&self) -> SecurityLevel {
        self.borrow().security_level()
    }
}

#[cfg(target_os = "linux")]
pub use self::bluez::BluezAttSocket;

#[cfg(target_os = "linux")]
mod bluez {
    use super::{L2capSocket, SecurityLevel, ATT_CID};
    use std::io;
    use std::os::unix::io::{AsRawFd, RawFd};

    // Bluetooth socket constants
    const AF_BLUETOOTH: i32 = 31;
    const BTPROTO_L2CAP: i32 = 0;
    const SOL_BLUETOOTH: i32 = 274;
    const BT_SECURITY: i32 = 4;
    const BDADDR_LE_PUBLIC: u8 = 0x01;

    // Define the sockaddr_l2 structure
    #[repr(C)]
    struct SockaddrL2 {
        l2_family: libc::sa_family_t,
        l2_psm: u16,
        l2_bdaddr: [u8; 6],
        l2_cid: u16,
        l2_bdaddr_type: u8,
    }

    #[repr(C)]
    struct BtSecurity {
        level: u8,
        key_size: u8,
    }

    /// A connected BlueZ L2CAP seq-packet socket bound to the ATT fixed
    /// channel.
    ///
    /// The caller is expected to have accepted or connected the socket
    /// already (e.g. via an advertising peripheral's listener); this type
    /// wraps the resulting descriptor and takes ownership of it.
    #[derive(Debug)]
    pub struct BluezAttSocket {
        fd: RawFd,
    }

    impl BluezAttSocket {
        /// Connects to a peer's ATT channel.
        pub fn connect(peer: [u8; 6]) -> io::Result<Self> {
            let fd = unsafe { libc::socket(AF_BLUETOOTH, libc::SOCK_SEQPACKET, BTPROTO_L2CAP) };
            if fd < 0 {
                return Err(io::Error::last_os_error());
            }

            let addr = SockaddrL2 {
                l2_family: AF_BLUETOOTH as libc::sa_family_t,
                l2_psm: 0,
                l2_bdaddr: peer,
                l2_cid: ATT_CID.to_le(),
                l2_bdaddr_type: BDADDR_LE_PUBLIC,
            };

            let result = unsafe {
                libc::connect(
                    fd,
                    &addr as *const _ as *const libc::sockaddr,
                    std::mem::size_of::<SockaddrL2>() as libc::socklen_t,
                )
            };
            if result < 0 {
                let err = io::Error::last_os_error();
                unsafe { libc::close(fd) };
                return Err(err);
            }

            Ok(BluezAttSocket { fd })
        }

        /// Wraps an already-connected descriptor, taking ownership.
        pub fn from_raw_fd(fd: RawFd) -> Self {
            BluezAttSocket { fd }
        }
    }

    impl L2capSocket for BluezAttSocket {
        fn recv(&mut self) -> io::Result<Option<Vec<u8>>> {
            let mut buf = [0u8; 1024];
            let n = unsafe {
                libc::recv(
                    self.fd,
                    buf.as_mut_ptr() as *mut libc::c_void,
                    buf.len(),
                    libc::MSG_DONTWAIT,
                )
            };
            if n < 0 {
                let err = io::Error::last_os_error();
                if err.kind() == io::ErrorKind::WouldBlock {
                    return Ok(None);
                }
                return Err(err);
            }
            Ok(Some(buf[..n as usize].to_vec()))
        }

        fn send(&mut self, pdu: &[u8]) -> io::Result<()> {
            let n = unsafe {
                libc::send(self.fd, pdu.as_ptr() as *const libc::c_void, pdu.len(), 0)
            };
            if n < 0 {
                return Err(io::Error::last_os_error());
            }
            Ok(())
        }

        fn security_level(&self) -> SecurityLevel {
            let mut sec = BtSecurity { level: 0, key_size: 0 };
            let mut len = std::mem::size_of::<BtSecurity>() as libc::socklen_t;
            let result = unsafe {
                libc::getsockopt(
                    self.fd,
                    SOL_BLUETOOTH,
                    BT_SECURITY,
                    &mut sec as *mut _ as *mut libc::c_void,
                    &mut len,
                )
            };
            if result < 0 {
                return SecurityLevel::None;
            }
            match sec.level {
                0 => SecurityLevel::None,
                1 => SecurityLevel::Low,
                2 => SecurityLevel::Medium,
                _ => SecurityLevel::High,
            }
        }
    }

    impl AsRawFd for BluezAttSocket {
        fn as_raw_fd(&self) -> RawFd {
            self.fd
        }
    }

    impl Drop for BluezAttSocket {
        fn drop(&mut self) {
            unsafe {
                libc::close(self.fd);
            }
        }
    }
}
