//! GATT (Generic Attribute Profile) server
//!
//! This module layers the service/characteristic data model on top of the
//! ATT protocol engine and implements the request handlers.

pub mod server;
pub mod types;

#[cfg(test)]
mod tests;

pub use server::{GattServer, GattServerConfig};
pub use types::{Characteristic, CharacteristicProperty, Descriptor, Service};
