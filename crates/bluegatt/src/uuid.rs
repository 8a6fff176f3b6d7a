use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

/// A Bluetooth UUID.
///
/// Handles both the 16-bit short form assigned by the SIG and full 128-bit
/// values. Internally the UUID is always stored in its canonical 128-bit
/// form in little-endian byte order, so two UUIDs compare equal exactly when
/// their canonical forms match (`0x180F` equals
/// `0000180f-0000-1000-8000-00805f9b34fb`).
#[derive(Clone, Copy, Eq, PartialEq, Ord, PartialOrd)]
pub struct Uuid {
    bytes: [u8; 16],
}

/// The Bluetooth base UUID, "00000000-0000-1000-8000-00805F9B34FB",
/// in little-endian byte order. Short-form values are folded in at
/// `BASE_OFFSET`.
const BASE_UUID_BYTES: [u8; 16] = [
    0xFB, 0x34, 0x9B, 0x5F, 0x80, 0x00, 0x00, 0x80, 0x00, 0x10, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
];

const BASE_OFFSET: usize = 12;

impl Uuid {
    /// Creates a UUID from 16 little-endian bytes.
    pub const fn from_bytes_le(bytes: [u8; 16]) -> Self {
        Uuid { bytes }
    }

    /// Creates a UUID from 16 big-endian bytes (the order used in the
    /// hyphenated text form).
    pub fn from_bytes_be(mut bytes: [u8; 16]) -> Self {
        bytes.reverse();
        Uuid { bytes }
    }

    /// Creates a UUID from a 16-bit SIG-assigned value.
    /// Formula: `value * 2^96 + BASE_UUID`.
    pub const fn from_u16(uuid16: u16) -> Self {
        let mut bytes = BASE_UUID_BYTES;
        bytes[BASE_OFFSET] = uuid16 as u8;
        bytes[BASE_OFFSET + 1] = (uuid16 >> 8) as u8;
        Uuid { bytes }
    }

    /// Tries to create a UUID from a little-endian byte slice.
    ///
    /// Accepts slices of length 2 (short form) or 16 (full form), the two
    /// widths that appear on the ATT wire. Returns `None` otherwise.
    pub fn try_from_slice_le(slice: &[u8]) -> Option<Self> {
        match slice.len() {
            2 => Some(Uuid::from_u16(u16::from_le_bytes([slice[0], slice[1]]))),
            16 => {
                let mut bytes = [0u8; 16];
                bytes.copy_from_slice(slice);
                Some(Uuid::from_bytes_le(bytes))
            }
            _ => None,
        }
    }

    /// Returns the underlying 16 bytes in little-endian order.
    pub const fn as_bytes_le(&self) -> &[u8; 16] {
        &self.bytes
    }

    /// Returns the underlying 16 bytes in big-endian order.
    pub fn as_bytes_be(&self) -> [u8; 16] {
        let mut bytes = self.bytes;
        bytes.reverse();
        bytes
    }

    /// Checks if the UUID is derived from the Bluetooth base UUID.
    fn is_sig_assigned(&self) -> bool {
        self.bytes[0..BASE_OFFSET] == BASE_UUID_BYTES[0..BASE_OFFSET]
    }

    /// Tries to represent the UUID as a 16-bit value.
    ///
    /// Returns `Some(u16)` only if the UUID is a SIG-assigned short-form
    /// UUID, i.e. the upper two bytes of the folded value are zero.
    pub fn as_u16(&self) -> Option<u16> {
        if self.is_sig_assigned()
            && self.bytes[BASE_OFFSET + 2] == 0
            && self.bytes[BASE_OFFSET + 3] == 0
        {
            Some(u16::from_le_bytes([
                self.bytes[BASE_OFFSET],
                self.bytes[BASE_OFFSET + 1],
            ]))
        } else {
            None
        }
    }

    /// The bytes this UUID occupies on the ATT wire: 2 for a short-form
    /// UUID, 16 otherwise, little-endian either way.
    pub fn to_wire_bytes(&self) -> Vec<u8> {
        match self.as_u16() {
            Some(uuid16) => uuid16.to_le_bytes().to_vec(),
            None => self.bytes.to_vec(),
        }
    }
}

impl From<u16> for Uuid {
    fn from(uuid16: u16) -> Self {
        Uuid::from_u16(uuid16)
    }
}

impl From<[u8; 16]> for Uuid {
    /// Assumes bytes are in little-endian order.
    fn from(bytes: [u8; 16]) -> Self {
        Uuid::from_bytes_le(bytes)
    }
}

impl PartialEq<u16> for Uuid {
    fn eq(&self, other: &u16) -> bool {
        self.as_u16() == Some(*other)
    }
}

impl PartialEq<Uuid> for u16 {
    fn eq(&self, other: &Uuid) -> bool {
        other.as_u16() == Some(*self)
    }
}

impl Hash for Uuid {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.bytes.hash(state);
    }
}

impl fmt::Display for Uuid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Standard hyphenated format (big-endian)
        let b = self.as_bytes_be();
        write!(
            f,
            "{:02x}{:02x}{:02x}{:02x}-{:02x}{:02x}-{:02x}{:02x}-{:02x}{:02x}-{:02x}{:02x}{:02x}{:02x}{:02x}{:02x}",
            b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7],
            b[8], b[9], b[10], b[11], b[12], b[13], b[14], b[15]
        )
    }
}

impl fmt::Debug for Uuid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Show short form if possible, otherwise full hyphenated form
        if let Some(uuid16) = self.as_u16() {
            write!(f, "Uuid(0x{:04X})", uuid16)
        } else {
            write!(f, "Uuid({})", self)
        }
    }
}

#[derive(Debug)]
pub enum UuidParseError {
    InvalidLength,
    InvalidFormat,
    HexError(hex::FromHexError),
}

impl From<hex::FromHexError> for UuidParseError {
    fn from(err: hex::FromHexError) -> Self {
        UuidParseError::HexError(err)
    }
}

impl FromStr for Uuid {
    type Err = UuidParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let cleaned: String = s.chars().filter(|c| c.is_ascii_hexdigit()).collect();

        match cleaned.len() {
            4 => {
                // 16-bit short form e.g. "180F"
                let val = u16::from_str_radix(&cleaned, 16)
                    .map_err(|_| UuidParseError::InvalidFormat)?;
                Ok(Uuid::from_u16(val))
            }
            32 => {
                // Full 128-bit form with or without hyphens
                let mut bytes_be = [0u8; 16];
                hex::decode_to_slice(&cleaned, &mut bytes_be)?;
                Ok(Uuid::from_bytes_be(bytes_be))
            }
            _ => Err(UuidParseError::InvalidLength),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_form_folds_onto_base_uuid() {
        let uuid = Uuid::from_u16(0x180F);
        assert_eq!(uuid.to_string(), "0000180f-0000-1000-8000-00805f9b34fb");
        assert_eq!(uuid.as_u16(), Some(0x180F));
    }

    #[test]
    fn short_and_long_form_compare_equal() {
        let short = Uuid::from_u16(0x2800);
        let long = "00002800-0000-1000-8000-00805F9B34FB".parse::<Uuid>().unwrap();
        assert_eq!(short, long);
        assert_eq!(short, 0x2800u16);
    }

    #[test]
    fn vendor_uuid_has_no_short_form() {
        let uuid = "6e400001-b5a3-f393-e0a9-e50e24dcca9e".parse::<Uuid>().unwrap();
        assert_eq!(uuid.as_u16(), None);
        assert_eq!(uuid.to_wire_bytes().len(), 16);
    }

    #[test]
    fn wire_bytes_round_trip() {
        let uuid = Uuid::from_u16(0x2A00);
        assert_eq!(uuid.to_wire_bytes(), vec![0x00, 0x2A]);
        assert_eq!(Uuid::try_from_slice_le(&[0x00, 0x2A]), Some(uuid));

        let full = Uuid::from_bytes_le([7; 16]);
        assert_eq!(Uuid::try_from_slice_le(full.as_bytes_le()), Some(full));
        assert_eq!(Uuid::try_from_slice_le(&[1, 2, 3]), None);
    }
}
