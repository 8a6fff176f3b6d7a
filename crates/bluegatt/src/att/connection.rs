//! ATT bearer: PDU framing, dispatch and queueing over one L2CAP channel
use super::constants::*;
use super::error::{AttError, AttErrorCode, AttResult};
use super::types::{AttPacket, ErrorResponse, Opcode};
use crate::l2cap::{L2capSocket, SecurityLevel};
use log::{debug, trace, warn};
use std::collections::{HashMap, VecDeque};

/// Handler invoked with the connection and the full PDU bytes (opcode
/// byte included) of a dispatched packet.
pub type AttHandler = Box<dyn FnMut(&mut AttConnection, &[u8]) -> AttResult<()>>;

/// Completion callback fired once a queued PDU has been handed to the
/// socket.
pub type SendComplete = Box<dyn FnOnce()>;

struct Outbound {
    bytes: Vec<u8>,
    on_complete: Option<SendComplete>,
}

/// One ATT bearer over a connected L2CAP channel.
///
/// The connection frames and unframes PDUs, routes inbound PDUs to the
/// handlers registered per opcode, and queues outbound PDUs. It also
/// enforces the request/response pairing rule: at most one client request
/// is outstanding at a time, and the next request-class PDU sent answers
/// it.
///
/// The embedder drives the bearer by calling [`poll_read`](Self::poll_read)
/// and [`poll_write`](Self::poll_write) from its event loop; neither call
/// blocks and no background threads exist.
pub struct AttConnection {
    socket: Box<dyn L2capSocket>,
    mtu: u16,
    max_mtu: u16,
    pending_request: Option<u8>,
    send_queue: VecDeque<Outbound>,
    handlers: HashMap<u8, AttHandler>,
    closed: bool,
}

impl AttConnection {
    /// Creates a bearer over a connected socket with the default 23-octet
    /// MTU and no room to grow it.
    pub fn new(socket: Box<dyn L2capSocket>) -> Self {
        Self::with_max_mtu(socket, ATT_DEFAULT_MTU)
    }

    /// Creates a bearer whose MTU may later be raised up to `max_mtu`
    /// through [`set_mtu`](Self::set_mtu).
    pub fn with_max_mtu(socket: Box<dyn L2capSocket>, max_mtu: u16) -> Self {
        Self {
            socket,
            mtu: ATT_DEFAULT_MTU,
            max_mtu: max_mtu.max(ATT_DEFAULT_MTU),
            pending_request: None,
            send_queue: VecDeque::new(),
            handlers: HashMap::new(),
            closed: false,
        }
    }

    /// Installs the handler for an opcode, replacing any prior one.
    pub fn register(&mut self, opcode: u8, handler: AttHandler) {
        self.handlers.insert(opcode, handler);
    }

    /// The negotiated MTU.
    pub fn mtu(&self) -> u16 {
        self.mtu
    }

    /// Sets the MTU, clamped into `[23, max_mtu]`.
    pub fn set_mtu(&mut self, mtu: u16) {
        self.mtu = mtu.clamp(ATT_DEFAULT_MTU, self.max_mtu);
    }

    /// Security level of the underlying link.
    pub fn security_level(&self) -> SecurityLevel {
        self.socket.security_level()
    }

    /// True once the bearer has hit a fatal error or was closed.
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Marks the bearer dead. Already-queued PDUs still drain through
    /// [`poll_write`](Self::poll_write); nothing further is read.
    pub fn close(&mut self) {
        self.closed = true;
    }

    /// Serializes and enqueues a PDU. `on_complete` fires after the bytes
    /// are handed to the socket. Does not block.
    pub fn send<P: AttPacket>(&mut self, pdu: &P, on_complete: Option<SendComplete>) {
        self.enqueue(pdu.serialize(), on_complete);
    }

    /// Enqueues an Error Response for `request_opcode` citing `handle`.
    pub fn send_error(&mut self, request_opcode: u8, error_code: AttErrorCode, handle: u16) {
        debug!(
            "ATT-> error rsp: req=0x{:02X} handle=0x{:04X} code={:?}",
            request_opcode, handle, error_code
        );
        let response = ErrorResponse {
            request_opcode,
            handle,
            error_code: error_code.into(),
        };
        self.enqueue(response.serialize(), None);
    }

    fn enqueue(&mut self, bytes: Vec<u8>, on_complete: Option<SendComplete>) {
        // A response-class PDU answers the outstanding request
        if !bytes.is_empty() && Opcode(bytes[0]).is_response() {
            self.pending_request = None;
        }
        self.send_queue.push_back(Outbound { bytes, on_complete });
    }

    /// Pulls all available inbound PDUs off the socket and dispatches each
    /// to its registered handler, in arrival order. Returns the number of
    /// PDUs dispatched.
    ///
    /// Unknown request opcodes are answered with a `RequestNotSupported`
    /// Error Response at handle 0; unknown commands are dropped. A request
    /// arriving while another is still unanswered is dropped. Transport
    /// failures and malformed frames kill the bearer.
    pub fn poll_read(&mut self) -> AttResult<usize> {
        if self.closed {
            return Err(AttError::ConnectionClosed);
        }

        let mut dispatched = 0;
        loop {
            let pdu = match self.socket.recv() {
                Ok(Some(pdu)) => pdu,
                Ok(None) => return Ok(dispatched),
                Err(err) => {
                    self.closed = true;
                    return Err(AttError::Transport(err));
                }
            };
            self.dispatch(&pdu)?;
            dispatched += 1;
            // A handler may have shut the bearer down mid-tick
            if self.closed {
                return Ok(dispatched);
            }
        }
    }

    fn dispatch(&mut self, pdu: &[u8]) -> AttResult<()> {
        let opcode = match pdu.first() {
            Some(&byte) => Opcode(byte),
            None => {
                self.closed = true;
                return Err(AttError::InvalidPdu);
            }
        };
        trace!("ATT<- opcode=0x{:02X} len={}", opcode.0, pdu.len());

        if opcode.is_request() && self.pending_request.is_some() {
            warn!(
                "dropping request 0x{:02X}: request 0x{:02X} still unanswered",
                opcode.0,
                self.pending_request.unwrap_or(0)
            );
            return Ok(());
        }

        let mut handler = match self.handlers.remove(&opcode.0) {
            Some(handler) => handler,
            None if opcode.is_command() => {
                debug!("ignoring unknown command 0x{:02X}", opcode.0);
                return Ok(());
            }
            None => {
                self.send_error(opcode.0, AttErrorCode::RequestNotSupported, 0);
                return Ok(());
            }
        };

        if opcode.is_request() {
            self.pending_request = Some(opcode.0);
        }
        let result = handler(self, pdu);
        self.handlers.insert(opcode.0, handler);

        if let Err(err) = result {
            self.closed = true;
            return Err(err);
        }
        Ok(())
    }

    /// Flushes the send queue to the socket in enqueue order, firing each
    /// completion callback as its PDU goes out. Returns the number of PDUs
    /// written.
    pub fn poll_write(&mut self) -> AttResult<usize> {
        let mut written = 0;
        while let Some(outbound) = self.send_queue.pop_front() {
            if let Err(err) = self.socket.send(&outbound.bytes) {
                self.closed = true;
                return Err(AttError::Transport(err));
            }
            if let Some(on_complete) = outbound.on_complete {
                on_complete();
            }
            written += 1;
        }
        Ok(written)
    }

    /// Number of PDUs waiting to be flushed.
    pub fn queued(&self) -> usize {
        self.send_queue.len()
    }
}
