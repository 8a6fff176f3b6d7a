//! Attribute database backing the GATT server
use super::constants::*;
use super::error::{AttError, AttResult};
use super::types::AttPermissions;
use crate::gatt::types::Service;
use crate::uuid::Uuid;

/// An attribute in the database
#[derive(Debug, Clone)]
pub struct Attribute {
    /// Attribute handle
    pub handle: u16,
    /// Attribute type (UUID)
    pub att_type: Uuid,
    /// Attribute value
    pub value: Vec<u8>,
    /// Attribute permissions
    pub permissions: AttPermissions,
}

impl Attribute {
    pub fn new(handle: u16, att_type: Uuid, value: Vec<u8>, permissions: AttPermissions) -> Self {
        Self {
            handle,
            att_type,
            value,
            permissions,
        }
    }
}

/// Handle range and identity of one service group.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServiceRecord {
    /// Service UUID
    pub uuid: Uuid,
    /// Primary or secondary service
    pub primary: bool,
    /// Handle of the service declaration attribute
    pub start_handle: u16,
    /// Handle of the last attribute contributed by the service
    pub end_handle: u16,
}

/// Flat, handle-ordered attribute store with derived service grouping.
///
/// Handles are assigned densely starting at 1 in insertion order and never
/// change, so the attribute with handle `h` lives at index `h - 1`. The
/// database is populated through [`append_service`](Self::append_service)
/// before the server starts and is only mutated through
/// [`write`](Self::write) afterwards.
pub struct AttributeDatabase {
    attributes: Vec<Attribute>,
    services: Vec<ServiceRecord>,
}

impl AttributeDatabase {
    /// Create a new empty attribute database
    pub fn new() -> Self {
        Self {
            attributes: Vec::new(),
            services: Vec::new(),
        }
    }

    /// Number of attributes, which is also the highest assigned handle.
    pub fn len(&self) -> usize {
        self.attributes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.attributes.is_empty()
    }

    /// Look up an attribute by handle.
    pub fn attribute(&self, handle: u16) -> Option<&Attribute> {
        if handle == 0 {
            return None;
        }
        self.attributes.get(handle as usize - 1)
    }

    /// The registered service groups in handle order.
    pub fn services(&self) -> &[ServiceRecord] {
        &self.services
    }

    /// Appends a service, flattening it into attributes.
    ///
    /// The service contributes, in order: its declaration attribute, then
    /// per characteristic a declaration attribute, the value attribute and
    /// each descriptor. Returns the service's handle range.
    pub fn append_service(&mut self, service: &Service) -> AttResult<ServiceRecord> {
        let mut contributed = 1usize;
        for characteristic in &service.characteristics {
            contributed += 2 + characteristic.descriptors.len();
        }
        if self.attributes.len() + contributed > ATT_HANDLE_MAX as usize {
            return Err(AttError::InsufficientResources);
        }

        let start_handle = self.next_handle();
        let declaration_type = if service.primary {
            PRIMARY_SERVICE_UUID
        } else {
            SECONDARY_SERVICE_UUID
        };
        self.push_attribute(
            Uuid::from_u16(declaration_type),
            service.uuid.to_wire_bytes(),
            AttPermissions::read_only(),
        );

        for characteristic in &service.characteristics {
            // Declaration value: properties, value handle, characteristic UUID
            let value_handle = self.next_handle() + 1;
            let mut declaration_value = Vec::with_capacity(3 + 16);
            declaration_value.push(characteristic.properties.0);
            declaration_value.extend_from_slice(&value_handle.to_le_bytes());
            declaration_value.extend_from_slice(&characteristic.uuid.to_wire_bytes());

            self.push_attribute(
                Uuid::from_u16(CHARACTERISTIC_UUID),
                declaration_value,
                AttPermissions::read_only(),
            );
            self.push_attribute(
                characteristic.uuid,
                characteristic.value.clone(),
                characteristic.permissions,
            );
            for descriptor in &characteristic.descriptors {
                self.push_attribute(
                    descriptor.uuid,
                    descriptor.value.clone(),
                    descriptor.permissions,
                );
            }
        }

        let record = ServiceRecord {
            uuid: service.uuid,
            primary: service.primary,
            start_handle,
            end_handle: self.attributes.len() as u16,
        };
        self.services.push(record);
        Ok(record)
    }

    /// Services whose handle range is fully contained in the request range
    /// and whose primary flag matches, in ascending handle order.
    pub fn read_by_group_type(&self, start: u16, end: u16, primary: bool) -> Vec<ServiceRecord> {
        self.services
            .iter()
            .filter(|svc| svc.primary == primary && svc.start_handle >= start && svc.end_handle <= end)
            .copied()
            .collect()
    }

    /// Attributes in the request range whose type matches, in ascending
    /// handle order. UUID equality is canonical-form equality.
    pub fn read_by_type(&self, start: u16, end: u16, att_type: &Uuid) -> Vec<&Attribute> {
        self.in_range(start, end)
            .filter(|attr| attr.att_type == *att_type)
            .collect()
    }

    /// All attributes in the request range, in ascending handle order.
    pub fn find_information(&self, start: u16, end: u16) -> Vec<&Attribute> {
        self.in_range(start, end).collect()
    }

    /// `(found_handle, group_end_handle)` pairs for attributes in range
    /// whose type equals the short-form UUID and whose value matches
    /// octet-for-octet.
    pub fn find_by_type_value(
        &self,
        start: u16,
        end: u16,
        type16: u16,
        value: &[u8],
    ) -> Vec<(u16, u16)> {
        let att_type = Uuid::from_u16(type16);
        self.in_range(start, end)
            .filter(|attr| attr.att_type == att_type && attr.value == value)
            .map(|attr| (attr.handle, self.group_end(attr.handle)))
            .collect()
    }

    /// Replaces the value at `handle`. Permissions are not consulted here;
    /// the server gates access before calling in.
    pub fn write(&mut self, handle: u16, value: &[u8]) -> AttResult<()> {
        if handle == 0 {
            return Err(AttError::InvalidHandle(handle));
        }
        let attr = self
            .attributes
            .get_mut(handle as usize - 1)
            .ok_or(AttError::InvalidHandle(handle))?;
        attr.value = value.to_vec();
        Ok(())
    }

    fn next_handle(&self) -> u16 {
        self.attributes.len() as u16 + 1
    }

    fn push_attribute(&mut self, att_type: Uuid, value: Vec<u8>, permissions: AttPermissions) {
        let handle = self.next_handle();
        self.attributes
            .push(Attribute::new(handle, att_type, value, permissions));
    }

    fn in_range(&self, start: u16, end: u16) -> impl Iterator<Item = &Attribute> {
        let lo = start.max(ATT_HANDLE_MIN) as usize - 1;
        let hi = (end as usize).min(self.attributes.len());
        let slice = if lo < hi { &self.attributes[lo..hi] } else { &[] };
        slice.iter()
    }

    /// End handle of the service group containing `handle`, or the handle
    /// itself when it belongs to no group.
    fn group_end(&self, handle: u16) -> u16 {
        self.services
            .iter()
            .find(|svc| svc.start_handle <= handle && handle <= svc.end_handle)
            .map(|svc| svc.end_handle)
            .unwrap_or(handle)
    }
}

impl Default for AttributeDatabase {
    fn default() -> Self {
        Self::new()
    }
}
