//! Type definitions for the ATT protocol
use super::constants::*;
use super::error::{AttError, AttResult};
use crate::l2cap::SecurityLevel;
use crate::uuid::Uuid;
use byteorder::{LittleEndian, ReadBytesExt};
use std::io::Cursor;

/// An ATT opcode byte.
///
/// The low six bits carry the method; bit 6 marks a command (no response
/// expected) and bit 7 an authentication signature.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Opcode(pub u8);

impl Opcode {
    /// The method bits of the opcode.
    pub const fn method(self) -> u8 {
        self.0 & ATT_OPCODE_METHOD_MASK
    }

    /// True for commands, which never produce a response.
    pub const fn is_command(self) -> bool {
        self.0 & ATT_OPCODE_COMMAND_BIT != 0
    }

    /// True when the PDU carries an authentication signature.
    pub const fn has_signature(self) -> bool {
        self.0 & ATT_OPCODE_SIGNATURE_BIT != 0
    }

    /// True for client-initiated requests, which expect exactly one
    /// response.
    pub fn is_request(self) -> bool {
        matches!(
            self.0,
            ATT_EXCHANGE_MTU_REQ
                | ATT_FIND_INFO_REQ
                | ATT_FIND_BY_TYPE_VALUE_REQ
                | ATT_READ_BY_TYPE_REQ
                | ATT_READ_REQ
                | ATT_READ_BLOB_REQ
                | ATT_READ_MULTIPLE_REQ
                | ATT_READ_BY_GROUP_TYPE_REQ
                | ATT_WRITE_REQ
                | ATT_PREPARE_WRITE_REQ
                | ATT_EXECUTE_WRITE_REQ
        )
    }

    /// True for server responses, Error Response included.
    pub fn is_response(self) -> bool {
        matches!(
            self.0,
            ATT_ERROR_RSP
                | ATT_EXCHANGE_MTU_RSP
                | ATT_FIND_INFO_RSP
                | ATT_FIND_BY_TYPE_VALUE_RSP
                | ATT_READ_BY_TYPE_RSP
                | ATT_READ_RSP
                | ATT_READ_BLOB_RSP
                | ATT_READ_MULTIPLE_RSP
                | ATT_READ_BY_GROUP_TYPE_RSP
                | ATT_WRITE_RSP
                | ATT_PREPARE_WRITE_RSP
                | ATT_EXECUTE_WRITE_RSP
        )
    }
}

/// ATT attribute permission flags
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttPermissions {
    raw_value: u16,
}

impl AttPermissions {
    /// Create permissions from a raw flag value
    pub const fn new(raw_value: u16) -> Self {
        Self { raw_value }
    }

    /// No access
    pub const fn none() -> Self {
        Self { raw_value: ATT_PERM_NONE }
    }

    /// Plain read access
    pub const fn read_only() -> Self {
        Self { raw_value: ATT_PERM_READ }
    }

    /// Plain write access
    pub const fn write_only() -> Self {
        Self { raw_value: ATT_PERM_WRITE }
    }

    /// Plain read and write access
    pub const fn read_write() -> Self {
        Self { raw_value: ATT_PERM_READ | ATT_PERM_WRITE }
    }

    /// Read/write requiring an encrypted link
    pub const fn encrypted() -> Self {
        Self {
            raw_value: ATT_PERM_READ
                | ATT_PERM_WRITE
                | ATT_PERM_READ_ENCRYPTED
                | ATT_PERM_WRITE_ENCRYPTED,
        }
    }

    /// Read/write requiring an authenticated link
    pub const fn authenticated() -> Self {
        Self {
            raw_value: ATT_PERM_READ
                | ATT_PERM_WRITE
                | ATT_PERM_READ_AUTHENTICATED
                | ATT_PERM_WRITE_AUTHENTICATED,
        }
    }

    pub const fn value(&self) -> u16 {
        self.raw_value
    }

    pub const fn can_read(&self) -> bool {
        (self.raw_value & ATT_PERM_READ) != 0
    }

    pub const fn can_write(&self) -> bool {
        (self.raw_value & ATT_PERM_WRITE) != 0
    }

    pub const fn read_requires_encryption(&self) -> bool {
        (self.raw_value & ATT_PERM_READ_ENCRYPTED) != 0
    }

    pub const fn write_requires_encryption(&self) -> bool {
        (self.raw_value & ATT_PERM_WRITE_ENCRYPTED) != 0
    }

    pub const fn read_requires_authentication(&self) -> bool {
        (self.raw_value & ATT_PERM_READ_AUTHENTICATED) != 0
    }

    pub const fn write_requires_authentication(&self) -> bool {
        (self.raw_value & ATT_PERM_WRITE_AUTHENTICATED) != 0
    }

    /// Gate a read access against the link's security level.
    ///
    /// Checks run in a fixed order: access flag, then authentication
    /// (needs [`SecurityLevel::High`]), then encryption (needs
    /// [`SecurityLevel::Medium`]). The first failure is returned.
    pub fn check_read(&self, level: SecurityLevel) -> AttResult<()> {
        if !self.can_read() {
            return Err(AttError::ReadNotPermitted);
        }
        if self.read_requires_authentication() && level < SecurityLevel::High {
            return Err(AttError::InsufficientAuthentication);
        }
        if self.read_requires_encryption() && level < SecurityLevel::Medium {
            return Err(AttError::InsufficientEncryption);
        }
        Ok(())
    }

    /// Gate a write access against the link's security level.
    ///
    /// Same ordering as [`check_read`](Self::check_read).
    pub fn check_write(&self, level: SecurityLevel) -> AttResult<()> {
        if !self.can_write() {
            return Err(AttError::WriteNotPermitted);
        }
        if self.write_requires_authentication() && level < SecurityLevel::High {
            return Err(AttError::InsufficientAuthentication);
        }
        if self.write_requires_encryption() && level < SecurityLevel::Medium {
            return Err(AttError::InsufficientEncryption);
        }
        Ok(())
    }
}

/// ATT packet formats
pub trait AttPacket: Sized {
    /// Opcode for this packet
    fn opcode() -> u8;

    /// Parse a full PDU (opcode byte included) into this packet
    fn parse(data: &[u8]) -> AttResult<Self>;

    /// Serialize this packet into a full PDU
    fn serialize(&self) -> Vec<u8>;
}

fn read_u16(cursor: &mut Cursor<&[u8]>) -> AttResult<u16> {
    cursor
        .read_u16::<LittleEndian>()
        .map_err(|_| AttError::InvalidPdu)
}

/// Error Response packet
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorResponse {
    /// Opcode of the request in error
    pub request_opcode: u8,
    /// Attribute handle in error
    pub handle: u16,
    /// Error code
    pub error_code: u8,
}

impl AttPacket for ErrorResponse {
    fn opcode() -> u8 {
        ATT_ERROR_RSP
    }

    fn parse(data: &[u8]) -> AttResult<Self> {
        if data.len() != 5 || data[0] != Self::opcode() {
            return Err(AttError::InvalidPdu);
        }
        let request_opcode = data[1];
        let mut cursor = Cursor::new(&data[2..]);
        let handle = read_u16(&mut cursor)?;
        let error_code = data[4];
        Ok(Self {
            request_opcode,
            handle,
            error_code,
        })
    }

    fn serialize(&self) -> Vec<u8> {
        let mut packet = Vec::with_capacity(5);
        packet.push(Self::opcode());
        packet.push(self.request_opcode);
        packet.extend_from_slice(&self.handle.to_le_bytes());
        packet.push(self.error_code);
        packet
    }
}

/// Exchange MTU Request packet
#[derive(Debug, Clone)]
pub struct ExchangeMtuRequest {
    /// Client Rx MTU size
    pub client_mtu: u16,
}

impl AttPacket for ExchangeMtuRequest {
    fn opcode() -> u8 {
        ATT_EXCHANGE_MTU_REQ
    }

    fn parse(data: &[u8]) -> AttResult<Self> {
        if data.len() != 3 || data[0] != Self::opcode() {
            return Err(AttError::InvalidPdu);
        }
        let mut cursor = Cursor::new(&data[1..]);
        let client_mtu = read_u16(&mut cursor)?;
        Ok(Self { client_mtu })
    }

    fn serialize(&self) -> Vec<u8> {
        let mut packet = Vec::with_capacity(3);
        packet.push(Self::opcode());
        packet.extend_from_slice(&self.client_mtu.to_le_bytes());
        packet
    }
}

/// Exchange MTU Response packet
#[derive(Debug, Clone)]
pub struct ExchangeMtuResponse {
    /// Server Rx MTU size
    pub server_mtu: u16,
}

impl AttPacket for ExchangeMtuResponse {
    fn opcode() -> u8 {
        ATT_EXCHANGE_MTU_RSP
    }

    fn parse(data: &[u8]) -> AttResult<Self> {
        if data.len() != 3 || data[0] != Self::opcode() {
            return Err(AttError::InvalidPdu);
        }
        let mut cursor = Cursor::new(&data[1..]);
        let server_mtu = read_u16(&mut cursor)?;
        Ok(Self { server_mtu })
    }

    fn serialize(&self) -> Vec<u8> {
        let mut packet = Vec::with_capacity(3);
        packet.push(Self::opcode());
        packet.extend_from_slice(&self.server_mtu.to_le_bytes());
        packet
    }
}

/// Find Information Request packet
#[derive(Debug, Clone)]
pub struct FindInformationRequest {
    /// First requested handle
    pub start_handle: u16,
    /// Last requested handle
    pub end_handle: u16,
}

impl AttPacket for FindInformationRequest {
    fn opcode() -> u8 {
        ATT_FIND_INFO_REQ
    }

    fn parse(data: &[u8]) -> AttResult<Self> {
        if data.len() != 5 || data[0] != Self::opcode() {
            return Err(AttError::InvalidPdu);
        }
        let mut cursor = Cursor::new(&data[1..]);
        let start_handle = read_u16(&mut cursor)?;
        let end_handle = read_u16(&mut cursor)?;
        Ok(Self {
            start_handle,
            end_handle,
        })
    }

    fn serialize(&self) -> Vec<u8> {
        let mut packet = Vec::with_capacity(5);
        packet.push(Self::opcode());
        packet.extend_from_slice(&self.start_handle.to_le_bytes());
        packet.extend_from_slice(&self.end_handle.to_le_bytes());
        packet
    }
}

/// Handle-UUID pair in a Find Information Response
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandleUuidPair {
    /// 16-bit UUID
    Uuid16(u16, u16),
    /// 128-bit UUID
    Uuid128(u16, Uuid),
}

/// Find Information Response packet
#[derive(Debug, Clone)]
pub struct FindInformationResponse {
    /// Format of the information data
    pub format: u8,
    /// List of handle-UUID pairs
    pub information_data: Vec<HandleUuidPair>,
}

impl AttPacket for FindInformationResponse {
    fn opcode() -> u8 {
        ATT_FIND_INFO_RSP
    }

    fn parse(data: &[u8]) -> AttResult<Self> {
        if data.len() < 2 || data[0] != Self::opcode() {
            return Err(AttError::InvalidPdu);
        }
        let format = data[1];
        let pair_size = match format {
            ATT_FIND_INFO_RSP_FORMAT_16BIT => 4,
            ATT_FIND_INFO_RSP_FORMAT_128BIT => 18,
            _ => return Err(AttError::InvalidPdu),
        };
        let body = &data[2..];
        if body.is_empty() || body.len() % pair_size != 0 {
            return Err(AttError::InvalidPdu);
        }

        let mut information_data = Vec::with_capacity(body.len() / pair_size);
        for chunk in body.chunks_exact(pair_size) {
            let handle = u16::from_le_bytes([chunk[0], chunk[1]]);
            if format == ATT_FIND_INFO_RSP_FORMAT_16BIT {
                let uuid16 = u16::from_le_bytes([chunk[2], chunk[3]]);
                information_data.push(HandleUuidPair::Uuid16(handle, uuid16));
            } else {
                let uuid =
                    Uuid::try_from_slice_le(&chunk[2..18]).ok_or(AttError::InvalidPdu)?;
                information_data.push(HandleUuidPair::Uuid128(handle, uuid));
            }
        }
        Ok(Self {
            format,
            information_data,
        })
    }

    fn serialize(&self) -> Vec<u8> {
        let mut packet = Vec::new();
        packet.push(Self::opcode());
        packet.push(self.format);
        for pair in &self.information_data {
            match pair {
                HandleUuidPair::Uuid16(handle, uuid16) => {
                    packet.extend_from_slice(&handle.to_le_bytes());
                    packet.extend_from_slice(&uuid16.to_le_bytes());
                }
                HandleUuidPair::Uuid128(handle, uuid) => {
                    packet.extend_from_slice(&handle.to_le_bytes());
                    packet.extend_from_slice(uuid.as_bytes_le());
                }
            }
        }
        packet
    }
}

/// Find By Type Value Request packet
#[derive(Debug, Clone)]
pub struct FindByTypeValueRequest {
    /// First requested handle
    pub start_handle: u16,
    /// Last requested handle
    pub end_handle: u16,
    /// Attribute type (always a 16-bit UUID on the wire)
    pub attribute_type: u16,
    /// Attribute value to match
    pub attribute_value: Vec<u8>,
}

impl AttPacket for FindByTypeValueRequest {
    fn opcode() -> u8 {
        ATT_FIND_BY_TYPE_VALUE_REQ
    }

    fn parse(data: &[u8]) -> AttResult<Self> {
        if data.len() < 7 || data[0] != Self::opcode() {
            return Err(AttError::InvalidPdu);
        }
        let mut cursor = Cursor::new(&data[1..]);
        let start_handle = read_u16(&mut cursor)?;
        let end_handle = read_u16(&mut cursor)?;
        let attribute_type = read_u16(&mut cursor)?;
        let attribute_value = data[7..].to_vec();
        Ok(Self {
            start_handle,
            end_handle,
            attribute_type,
            attribute_value,
        })
    }

    fn serialize(&self) -> Vec<u8> {
        let mut packet = Vec::with_capacity(7 + self.attribute_value.len());
        packet.push(Self::opcode());
        packet.extend_from_slice(&self.start_handle.to_le_bytes());
        packet.extend_from_slice(&self.end_handle.to_le_bytes());
        packet.extend_from_slice(&self.attribute_type.to_le_bytes());
        packet.extend_from_slice(&self.attribute_value);
        packet
    }
}

/// Handle range in a Find By Type Value Response
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandleRange {
    /// Found attribute handle
    pub found_handle: u16,
    /// End handle of the group containing the found attribute
    pub group_end_handle: u16,
}

/// Find By Type Value Response packet
#[derive(Debug, Clone)]
pub struct FindByTypeValueResponse {
    /// List of handle ranges
    pub handles: Vec<HandleRange>,
}

impl AttPacket for FindByTypeValueResponse {
    fn opcode() -> u8 {
        ATT_FIND_BY_TYPE_VALUE_RSP
    }

    fn parse(data: &[u8]) -> AttResult<Self> {
        if data.len() < 5 || data[0] != Self::opcode() || (data.len() - 1) % 4 != 0 {
            return Err(AttError::InvalidPdu);
        }
        let mut handles = Vec::with_capacity((data.len() - 1) / 4);
        for chunk in data[1..].chunks_exact(4) {
            handles.push(HandleRange {
                found_handle: u16::from_le_bytes([chunk[0], chunk[1]]),
                group_end_handle: u16::from_le_bytes([chunk[2], chunk[3]]),
            });
        }
        Ok(Self { handles })
    }

    fn serialize(&self) -> Vec<u8> {
        let mut packet = Vec::with_capacity(1 + self.handles.len() * 4);
        packet.push(Self::opcode());
        for range in &self.handles {
            packet.extend_from_slice(&range.found_handle.to_le_bytes());
            packet.extend_from_slice(&range.group_end_handle.to_le_bytes());
        }
        packet
    }
}

/// Read By Type Request packet
#[derive(Debug, Clone)]
pub struct ReadByTypeRequest {
    /// First requested handle
    pub start_handle: u16,
    /// Last requested handle
    pub end_handle: u16,
    /// Attribute type UUID
    pub attribute_type: Uuid,
}

impl AttPacket for ReadByTypeRequest {
    fn opcode() -> u8 {
        ATT_READ_BY_TYPE_REQ
    }

    fn parse(data: &[u8]) -> AttResult<Self> {
        parse_typed_range_request(data, Self::opcode()).map(
            |(start_handle, end_handle, attribute_type)| Self {
                start_handle,
                end_handle,
                attribute_type,
            },
        )
    }

    fn serialize(&self) -> Vec<u8> {
        serialize_typed_range_request(
            Self::opcode(),
            self.start_handle,
            self.end_handle,
            &self.attribute_type,
        )
    }
}

/// Handle and value in a Read By Type Response
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandleValue {
    /// Attribute handle
    pub handle: u16,
    /// Attribute value
    pub value: Vec<u8>,
}

/// Read By Type Response packet
#[derive(Debug, Clone)]
pub struct ReadByTypeResponse {
    /// Length of each record
    pub length: u8,
    /// List of handle-value records
    pub data: Vec<HandleValue>,
}

impl AttPacket for ReadByTypeResponse {
    fn opcode() -> u8 {
        ATT_READ_BY_TYPE_RSP
    }

    fn parse(data: &[u8]) -> AttResult<Self> {
        if data.len() < 2 || data[0] != Self::opcode() {
            return Err(AttError::InvalidPdu);
        }
        let length = data[1] as usize;
        let body = &data[2..];
        if length < 2 || body.is_empty() || body.len() % length != 0 {
            return Err(AttError::InvalidPdu);
        }
        let mut records = Vec::with_capacity(body.len() / length);
        for chunk in body.chunks_exact(length) {
            records.push(HandleValue {
                handle: u16::from_le_bytes([chunk[0], chunk[1]]),
                value: chunk[2..].to_vec(),
            });
        }
        Ok(Self {
            length: length as u8,
            data: records,
        })
    }

    fn serialize(&self) -> Vec<u8> {
        let mut packet = Vec::new();
        packet.push(Self::opcode());
        packet.push(self.length);
        for record in &self.data {
            packet.extend_from_slice(&record.handle.to_le_bytes());
            packet.extend_from_slice(&record.value);
        }
        packet
    }
}

/// Read By Group Type Request packet
#[derive(Debug, Clone)]
pub struct ReadByGroupTypeRequest {
    /// First requested handle
    pub start_handle: u16,
    /// Last requested handle
    pub end_handle: u16,
    /// Group type UUID
    pub group_type: Uuid,
}

impl AttPacket for ReadByGroupTypeRequest {
    fn opcode() -> u8 {
        ATT_READ_BY_GROUP_TYPE_REQ
    }

    fn parse(data: &[u8]) -> AttResult<Self> {
        parse_typed_range_request(data, Self::opcode()).map(
            |(start_handle, end_handle, group_type)| Self {
                start_handle,
                end_handle,
                group_type,
            },
        )
    }

    fn serialize(&self) -> Vec<u8> {
        serialize_typed_range_request(
            Self::opcode(),
            self.start_handle,
            self.end_handle,
            &self.group_type,
        )
    }
}

/// Group record in a Read By Group Type Response
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttributeData {
    /// Group declaration handle
    pub handle: u16,
    /// End handle of the group
    pub end_group_handle: u16,
    /// Declaration value (the group's UUID bytes)
    pub value: Vec<u8>,
}

/// Read By Group Type Response packet
#[derive(Debug, Clone)]
pub struct ReadByGroupTypeResponse {
    /// Length of each record
    pub length: u8,
    /// List of group records
    pub data: Vec<AttributeData>,
}

impl AttPacket for ReadByGroupTypeResponse {
    fn opcode() -> u8 {
        ATT_READ_BY_GROUP_TYPE_RSP
    }

    fn parse(data: &[u8]) -> AttResult<Self> {
        if data.len() < 2 || data[0] != Self::opcode() {
            return Err(AttError::InvalidPdu);
        }
        let length = data[1] as usize;
        let body = &data[2..];
        if length < 6 || body.is_empty() || body.len() % length != 0 {
            return Err(AttError::InvalidPdu);
        }
        let mut records = Vec::with_capacity(body.len() / length);
        for chunk in body.chunks_exact(length) {
            records.push(AttributeData {
                handle: u16::from_le_bytes([chunk[0], chunk[1]]),
                end_group_handle: u16::from_le_bytes([chunk[2], chunk[3]]),
                value: chunk[4..].to_vec(),
            });
        }
        Ok(Self {
            length: length as u8,
            data: records,
        })
    }

    fn serialize(&self) -> Vec<u8> {
        let mut packet = Vec::new();
        packet.push(Self::opcode());
        packet.push(self.length);
        for record in &self.data {
            packet.extend_from_slice(&record.handle.to_le_bytes());
            packet.extend_from_slice(&record.end_group_handle.to_le_bytes());
            packet.extend_from_slice(&record.value);
        }
        packet
    }
}

/// Write Request packet
#[derive(Debug, Clone)]
pub struct WriteRequest {
    /// Handle to write
    pub handle: u16,
    /// Value to write
    pub value: Vec<u8>,
}

impl AttPacket for WriteRequest {
    fn opcode() -> u8 {
        ATT_WRITE_REQ
    }

    fn parse(data: &[u8]) -> AttResult<Self> {
        let (handle, value) = parse_handle_value(data, Self::opcode())?;
        Ok(Self { handle, value })
    }

    fn serialize(&self) -> Vec<u8> {
        serialize_handle_value(Self::opcode(), self.handle, &self.value)
    }
}

/// Write Response packet
#[derive(Debug, Clone)]
pub struct WriteResponse;

impl AttPacket for WriteResponse {
    fn opcode() -> u8 {
        ATT_WRITE_RSP
    }

    fn parse(data: &[u8]) -> AttResult<Self> {
        if data.len() != 1 || data[0] != Self::opcode() {
            return Err(AttError::InvalidPdu);
        }
        Ok(Self)
    }

    fn serialize(&self) -> Vec<u8> {
        vec![Self::opcode()]
    }
}

/// Write Command packet
#[derive(Debug, Clone)]
pub struct WriteCommand {
    /// Handle to write
    pub handle: u16,
    /// Value to write
    pub value: Vec<u8>,
}

impl AttPacket for WriteCommand {
    fn opcode() -> u8 {
        ATT_WRITE_CMD
    }

    fn parse(data: &[u8]) -> AttResult<Self> {
        let (handle, value) = parse_handle_value(data, Self::opcode())?;
        Ok(Self { handle, value })
    }

    fn serialize(&self) -> Vec<u8> {
        serialize_handle_value(Self::opcode(), self.handle, &self.value)
    }
}

/// Parses `start(2) . end(2) . type(2 or 16)` after the opcode byte.
fn parse_typed_range_request(data: &[u8], opcode: u8) -> AttResult<(u16, u16, Uuid)> {
    if data.len() < 7 || data[0] != opcode {
        return Err(AttError::InvalidPdu);
    }
    let mut cursor = Cursor::new(&data[1..]);
    let start_handle = read_u16(&mut cursor)?;
    let end_handle = read_u16(&mut cursor)?;

    // The type field is either a 16-bit or a full 128-bit UUID
    let uuid = match data.len() {
        7 => Uuid::from_u16(u16::from_le_bytes([data[5], data[6]])),
        21 => Uuid::try_from_slice_le(&data[5..21]).ok_or(AttError::InvalidPdu)?,
        _ => return Err(AttError::InvalidPdu),
    };
    Ok((start_handle, end_handle, uuid))
}

fn serialize_typed_range_request(opcode: u8, start: u16, end: u16, uuid: &Uuid) -> Vec<u8> {
    let mut packet = Vec::new();
    packet.push(opcode);
    packet.extend_from_slice(&start.to_le_bytes());
    packet.extend_from_slice(&end.to_le_bytes());
    packet.extend_from_slice(&uuid.to_wire_bytes());
    packet
}

fn parse_handle_value(data: &[u8], opcode: u8) -> AttResult<(u16, Vec<u8>)> {
    if data.len() < 3 || data[0] != opcode {
        return Err(AttError::InvalidPdu);
    }
    let mut cursor = Cursor::new(&data[1..]);
    let handle = read_u16(&mut cursor)?;
    Ok((handle, data[3..].to_vec()))
}

fn serialize_handle_value(opcode: u8, handle: u16, value: &[u8]) -> Vec<u8> {
    let mut packet = Vec::with_capacity(3 + value.len());
    packet.push(opcode);
    packet.extend_from_slice(&handle.to_le_bytes());
    packet.extend_from_slice(value);
    packet
}

/// Builder for Read By Group Type responses.
///
/// The wire format allows one record length per response, fixed by a
/// single length byte. The builder pins the length on the first record and
/// refuses records that would break uniformity or overflow the MTU, so a
/// handler simply pushes until `push` returns false.
pub struct GroupRecordBuilder {
    mtu: usize,
    record_len: Option<usize>,
    records: Vec<AttributeData>,
}

impl GroupRecordBuilder {
    pub fn new(mtu: u16) -> Self {
        Self {
            mtu: mtu as usize,
            record_len: None,
            records: Vec::new(),
        }
    }

    /// Tries to append one group record. Returns false when the record
    /// does not match the pinned length or the response is full; the
    /// caller stops on the first false.
    pub fn push(&mut self, handle: u16, end_group_handle: u16, value: Vec<u8>) -> bool {
        let len = 4 + value.len();
        if self.record_len.map_or(false, |pinned| pinned != len) {
            return false;
        }
        if 2 + (self.records.len() + 1) * len > self.mtu {
            return false;
        }
        self.record_len = Some(len);
        self.records.push(AttributeData {
            handle,
            end_group_handle,
            value,
        });
        true
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn finish(self) -> AttResult<ReadByGroupTypeResponse> {
        let length = self.record_len.ok_or(AttError::InvalidPdu)?;
        if length > u8::MAX as usize {
            return Err(AttError::WireInvariant(0));
        }
        Ok(ReadByGroupTypeResponse {
            length: length as u8,
            data: self.records,
        })
    }
}

/// Builder for Read By Type responses; same uniformity rule as
/// [`GroupRecordBuilder`] with records of `handle . value`.
pub struct TypeRecordBuilder {
    mtu: usize,
    record_len: Option<usize>,
    records: Vec<HandleValue>,
}

impl TypeRecordBuilder {
    pub fn new(mtu: u16) -> Self {
        Self {
            mtu: mtu as usize,
            record_len: None,
            records: Vec::new(),
        }
    }

    pub fn push(&mut self, handle: u16, value: Vec<u8>) -> bool {
        let len = 2 + value.len();
        if self.record_len.map_or(false, |pinned| pinned != len) {
            return false;
        }
        if 2 + (self.records.len() + 1) * len > self.mtu {
            return false;
        }
        self.record_len = Some(len);
        self.records.push(HandleValue { handle, value });
        true
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn finish(self) -> AttResult<ReadByTypeResponse> {
        let length = self.record_len.ok_or(AttError::InvalidPdu)?;
        if length > u8::MAX as usize {
            return Err(AttError::WireInvariant(0));
        }
        Ok(ReadByTypeResponse {
            length: length as u8,
            data: self.records,
        })
    }
}

/// Builder for Find Information responses.
///
/// The response format (16-bit or 128-bit pairs) is fixed by the first
/// record; later attributes with the other UUID width are skipped without
/// ending the response. `push` returns false only when the PDU is full.
pub struct InfoRecordBuilder {
    mtu: usize,
    format: Option<u8>,
    records: Vec<HandleUuidPair>,
}

impl InfoRecordBuilder {
    pub fn new(mtu: u16) -> Self {
        Self {
            mtu: mtu as usize,
            format: None,
            records: Vec::new(),
        }
    }

    pub fn push(&mut self, handle: u16, att_type: &Uuid) -> bool {
        let format = *self
            .format
            .get_or_insert(match att_type.as_u16() {
                Some(_) => ATT_FIND_INFO_RSP_FORMAT_16BIT,
                None => ATT_FIND_INFO_RSP_FORMAT_128BIT,
            });
        let record_len: usize = if format == ATT_FIND_INFO_RSP_FORMAT_16BIT {
            4
        } else {
            18
        };
        if 2 + (self.records.len() + 1) * record_len > self.mtu {
            return false;
        }
        match (format, att_type.as_u16()) {
            (ATT_FIND_INFO_RSP_FORMAT_16BIT, Some(uuid16)) => {
                self.records.push(HandleUuidPair::Uuid16(handle, uuid16));
            }
            (ATT_FIND_INFO_RSP_FORMAT_128BIT, None) => {
                self.records.push(HandleUuidPair::Uuid128(handle, *att_type));
            }
            // UUID width does not match the response format; skip
            _ => {}
        }
        true
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn finish(self) -> AttResult<FindInformationResponse> {
        let format = self.format.ok_or(AttError::InvalidPdu)?;
        Ok(FindInformationResponse {
            format,
            information_data: self.records,
        })
    }
}
