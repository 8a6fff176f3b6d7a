//! Attribute Protocol (ATT) implementation
//!
//! This module provides the server side of the ATT protocol: the bearer
//! that frames PDUs and dispatches them to per-opcode handlers, the PDU
//! codecs, and the attribute database the GATT layer populates.

pub mod connection;
pub mod constants;
pub mod database;
pub mod error;
pub mod types;

// Re-export the public API
pub use self::connection::{AttConnection, AttHandler, SendComplete};
pub use self::constants::*;
pub use self::database::{Attribute, AttributeDatabase, ServiceRecord};
pub use self::error::{AttError, AttErrorCode, AttResult};
pub use self::types::*;
