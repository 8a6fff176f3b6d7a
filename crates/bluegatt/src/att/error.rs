//! Error handling for the ATT protocol
use super::constants::*;
use thiserror::Error;

/// ATT error codes as they appear in an Error Response PDU.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttErrorCode {
    /// Invalid handle
    InvalidHandle,
    /// Read not permitted
    ReadNotPermitted,
    /// Write not permitted
    WriteNotPermitted,
    /// Invalid PDU
    InvalidPdu,
    /// Insufficient authentication
    InsufficientAuthentication,
    /// Request not supported
    RequestNotSupported,
    /// Attribute not found
    AttributeNotFound,
    /// Unlikely error
    Unlikely,
    /// Insufficient encryption
    InsufficientEncryption,
    /// Unsupported group type
    UnsupportedGroupType,
    /// Insufficient resources
    InsufficientResources,
    /// Error code outside the set this server emits
    Unknown(u8),
}

impl From<u8> for AttErrorCode {
    fn from(code: u8) -> Self {
        match code {
            ATT_ERROR_INVALID_HANDLE => AttErrorCode::InvalidHandle,
            ATT_ERROR_READ_NOT_PERMITTED => AttErrorCode::ReadNotPermitted,
            ATT_ERROR_WRITE_NOT_PERMITTED => AttErrorCode::WriteNotPermitted,
            ATT_ERROR_INVALID_PDU => AttErrorCode::InvalidPdu,
            ATT_ERROR_INSUFFICIENT_AUTHENTICATION => AttErrorCode::InsufficientAuthentication,
            ATT_ERROR_REQUEST_NOT_SUPPORTED => AttErrorCode::RequestNotSupported,
            ATT_ERROR_ATTRIBUTE_NOT_FOUND => AttErrorCode::AttributeNotFound,
            ATT_ERROR_UNLIKELY => AttErrorCode::Unlikely,
            ATT_ERROR_INSUFFICIENT_ENCRYPTION => AttErrorCode::InsufficientEncryption,
            ATT_ERROR_UNSUPPORTED_GROUP_TYPE => AttErrorCode::UnsupportedGroupType,
            ATT_ERROR_INSUFFICIENT_RESOURCES => AttErrorCode::InsufficientResources,
            _ => AttErrorCode::Unknown(code),
        }
    }
}

impl From<AttErrorCode> for u8 {
    fn from(code: AttErrorCode) -> u8 {
        match code {
            AttErrorCode::InvalidHandle => ATT_ERROR_INVALID_HANDLE,
            AttErrorCode::ReadNotPermitted => ATT_ERROR_READ_NOT_PERMITTED,
            AttErrorCode::WriteNotPermitted => ATT_ERROR_WRITE_NOT_PERMITTED,
            AttErrorCode::InvalidPdu => ATT_ERROR_INVALID_PDU,
            AttErrorCode::InsufficientAuthentication => ATT_ERROR_INSUFFICIENT_AUTHENTICATION,
            AttErrorCode::RequestNotSupported => ATT_ERROR_REQUEST_NOT_SUPPORTED,
            AttErrorCode::AttributeNotFound => ATT_ERROR_ATTRIBUTE_NOT_FOUND,
            AttErrorCode::Unlikely => ATT_ERROR_UNLIKELY,
            AttErrorCode::InsufficientEncryption => ATT_ERROR_INSUFFICIENT_ENCRYPTION,
            AttErrorCode::UnsupportedGroupType => ATT_ERROR_UNSUPPORTED_GROUP_TYPE,
            AttErrorCode::InsufficientResources => ATT_ERROR_INSUFFICIENT_RESOURCES,
            AttErrorCode::Unknown(code) => code,
        }
    }
}

/// ATT error type
#[derive(Debug, Error)]
pub enum AttError {
    #[error("invalid PDU")]
    InvalidPdu,

    #[error("invalid handle: {0}")]
    InvalidHandle(u16),

    #[error("read not permitted")]
    ReadNotPermitted,

    #[error("write not permitted")]
    WriteNotPermitted,

    #[error("insufficient authentication")]
    InsufficientAuthentication,

    #[error("insufficient encryption")]
    InsufficientEncryption,

    #[error("attribute not found")]
    AttributeNotFound,

    #[error("request not supported")]
    RequestNotSupported,

    #[error("unsupported group type")]
    UnsupportedGroupType,

    #[error("insufficient resources")]
    InsufficientResources,

    #[error("response would violate a wire invariant on handle {0}")]
    WireInvariant(u16),

    #[error("bearer is closed")]
    ConnectionClosed,

    #[error("transport error: {0}")]
    Transport(#[from] std::io::Error),
}

impl AttError {
    /// Convert to the error code carried in an Error Response.
    pub fn to_error_code(&self) -> AttErrorCode {
        match self {
            AttError::InvalidPdu => AttErrorCode::InvalidPdu,
            AttError::InvalidHandle(_) => AttErrorCode::InvalidHandle,
            AttError::ReadNotPermitted => AttErrorCode::ReadNotPermitted,
            AttError::WriteNotPermitted => AttErrorCode::WriteNotPermitted,
            AttError::InsufficientAuthentication => AttErrorCode::InsufficientAuthentication,
            AttError::InsufficientEncryption => AttErrorCode::InsufficientEncryption,
            AttError::AttributeNotFound => AttErrorCode::AttributeNotFound,
            AttError::RequestNotSupported => AttErrorCode::RequestNotSupported,
            AttError::UnsupportedGroupType => AttErrorCode::UnsupportedGroupType,
            AttError::InsufficientResources => AttErrorCode::InsufficientResources,
            AttError::WireInvariant(_) => AttErrorCode::Unlikely,
            AttError::ConnectionClosed | AttError::Transport(_) => AttErrorCode::Unlikely,
        }
    }

    /// The attribute handle associated with this error, if any.
    pub fn handle(&self) -> Option<u16> {
        match self {
            AttError::InvalidHandle(handle) => Some(*handle),
            AttError::WireInvariant(handle) => Some(*handle),
            _ => None,
        }
    }
}

/// ATT result type
pub type AttResult<T> = Result<T, AttError>;
