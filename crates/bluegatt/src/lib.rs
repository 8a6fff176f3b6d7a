//! BlueGatt - a GATT attribute server for Bluetooth Low Energy peripherals
//!
//! This library implements the server side of the Attribute Protocol (ATT)
//! and the GATT attribute database it serves. PDUs arrive over an L2CAP
//! datagram channel, are dispatched against the in-memory database, and
//! conforming responses (or Error Responses) are queued back out. The
//! embedder drives everything from its own event loop:
//!
//! ```no_run
//! use bluegatt::att::AttPermissions;
//! use bluegatt::gatt::{Characteristic, CharacteristicProperty, GattServer, GattServerConfig, Service};
//! use bluegatt::l2cap::LoopbackSocket;
//! use bluegatt::uuid::Uuid;
//!
//! let socket = Box::new(LoopbackSocket::new());
//! let mut server = GattServer::new(socket, GattServerConfig::default());
//!
//! let battery = Service::primary(Uuid::from_u16(0x180F)).with_characteristic(
//!     Characteristic::new(
//!         Uuid::from_u16(0x2A19),
//!         CharacteristicProperty(CharacteristicProperty::READ),
//!         AttPermissions::read_only(),
//!         vec![100],
//!     ),
//! );
//! server.add_service(&battery).unwrap();
//!
//! loop {
//!     server.poll_read().unwrap();
//!     server.poll_write().unwrap();
//! }
//! ```

pub mod att;
pub mod gatt;
pub mod l2cap;
pub mod uuid;

// Re-export common types for convenience
pub use att::{AttError, AttErrorCode, AttPermissions, AttResult, AttributeDatabase};
pub use gatt::{Characteristic, CharacteristicProperty, GattServer, GattServerConfig, Service};
pub use l2cap::{L2capSocket, LoopbackSocket, SecurityLevel};
pub use uuid::Uuid;
