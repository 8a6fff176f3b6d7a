//! Database invariants and end-to-end PDU scenarios for the GATT server

use super::server::{GattServer, GattServerConfig};
use super::types::{Characteristic, CharacteristicProperty, Descriptor, Service};
use crate::att::constants::*;
use crate::att::database::AttributeDatabase;
use crate::att::types::AttPermissions;
use crate::l2cap::{LoopbackSocket, SecurityLevel};
use crate::uuid::Uuid;
use std::cell::RefCell;
use std::rc::Rc;

type SharedSocket = Rc<RefCell<LoopbackSocket>>;

fn server_with(
    services: &[Service],
    server_mtu: u16,
    security: SecurityLevel,
) -> (GattServer, SharedSocket) {
    let socket = Rc::new(RefCell::new(LoopbackSocket::with_security(security)));
    let mut server = GattServer::new(
        Box::new(Rc::clone(&socket)),
        GattServerConfig { server_mtu },
    );
    for service in services {
        server.add_service(service).unwrap();
    }
    (server, socket)
}

/// One tick of the embedder loop: dispatch inbound, flush outbound,
/// return everything the server sent.
fn exchange(server: &mut GattServer, socket: &SharedSocket, pdu: &[u8]) -> Vec<Vec<u8>> {
    socket.borrow_mut().push_inbound(pdu);
    server.poll_read().unwrap();
    server.poll_write().unwrap();
    let mut out = Vec::new();
    while let Some(pdu) = socket.borrow_mut().pop_outbound() {
        out.push(pdu);
    }
    out
}

/// Battery service: declaration only, no characteristics.
fn bare_battery_service() -> Service {
    Service::primary(Uuid::from_u16(0x180F))
}

/// Battery service with a read-only battery level characteristic.
/// Handles: 1 = service declaration, 2 = characteristic declaration,
/// 3 = value.
fn battery_service() -> Service {
    battery_service_with_perms(AttPermissions::read_only())
}

fn battery_service_with_perms(permissions: AttPermissions) -> Service {
    Service::primary(Uuid::from_u16(0x180F)).with_characteristic(Characteristic::new(
        Uuid::from_u16(0x2A19),
        CharacteristicProperty(CharacteristicProperty::READ),
        permissions,
        vec![100],
    ))
}

#[test]
fn handles_are_dense_after_appends() {
    let mut db = AttributeDatabase::new();
    db.append_service(&battery_service()).unwrap();
    db.append_service(&bare_battery_service()).unwrap();
    db.append_service(
        &Service::primary(Uuid::from_u16(0x1800)).with_characteristic(
            Characteristic::new(
                Uuid::from_u16(0x2A00),
                CharacteristicProperty(CharacteristicProperty::READ),
                AttPermissions::read_only(),
                b"widget".to_vec(),
            )
            .with_descriptor(Descriptor {
                uuid: Uuid::from_u16(CHAR_USER_DESC_UUID),
                permissions: AttPermissions::read_only(),
                value: b"name".to_vec(),
            }),
        ),
    )
    .unwrap();

    assert_eq!(db.len(), 8);
    for (index, attr) in db.find_information(1, 0xFFFF).iter().enumerate() {
        assert_eq!(attr.handle as usize, index + 1);
    }
}

#[test]
fn service_ranges_cover_their_attributes() {
    let mut db = AttributeDatabase::new();
    let first = db.append_service(&battery_service()).unwrap();
    let second = db.append_service(&bare_battery_service()).unwrap();

    assert_eq!((first.start_handle, first.end_handle), (1, 3));
    assert_eq!((second.start_handle, second.end_handle), (4, 4));

    let groups = db.read_by_group_type(1, 0xFFFF, true);
    assert_eq!(groups, vec![first, second]);
}

#[test]
fn group_lookup_is_contained_and_ordered() {
    let mut db = AttributeDatabase::new();
    let first = db.append_service(&battery_service()).unwrap();
    let second = db.append_service(&battery_service()).unwrap();

    // Full range, ascending order
    let groups = db.read_by_group_type(1, 0xFFFF, true);
    assert_eq!(groups, vec![first, second]);

    // A range cutting through the second service excludes it
    let groups = db.read_by_group_type(1, second.end_handle - 1, true);
    assert_eq!(groups, vec![first]);

    // Secondary services only
    assert!(db.read_by_group_type(1, 0xFFFF, false).is_empty());
}

#[test]
fn characteristic_declaration_points_at_value_handle() {
    let mut db = AttributeDatabase::new();
    db.append_service(&battery_service()).unwrap();

    let decl = db.attribute(2).unwrap();
    assert_eq!(decl.att_type, Uuid::from_u16(CHARACTERISTIC_UUID));
    // properties, value handle (3), characteristic UUID
    assert_eq!(decl.value, vec![CharacteristicProperty::READ, 0x03, 0x00, 0x19, 0x2A]);
}

#[test]
fn find_information_preserves_handle_order() {
    let mut db = AttributeDatabase::new();
    db.append_service(&battery_service()).unwrap();
    db.append_service(&bare_battery_service()).unwrap();

    let attrs = db.find_information(2, 4);
    let handles: Vec<u16> = attrs.iter().map(|attr| attr.handle).collect();
    assert_eq!(handles, vec![2, 3, 4]);

    assert!(db.find_information(5, 0xFFFF).is_empty());
    assert!(db.find_information(3, 2).is_empty());
}

#[test]
fn write_is_visible_through_lookups() {
    let mut db = AttributeDatabase::new();
    db.append_service(&battery_service()).unwrap();

    db.write(3, &[42]).unwrap();
    assert_eq!(db.attribute(3).unwrap().value, vec![42]);
    assert_eq!(db.find_information(3, 3)[0].value, vec![42]);

    assert!(db.write(0, &[1]).is_err());
    assert!(db.write(9, &[1]).is_err());
}

#[test]
fn find_by_type_value_reports_group_end() {
    let mut db = AttributeDatabase::new();
    db.append_service(&battery_service()).unwrap();
    db.append_service(&bare_battery_service()).unwrap();

    let found = db.find_by_type_value(1, 0xFFFF, PRIMARY_SERVICE_UUID, &[0x0F, 0x18]);
    assert_eq!(found, vec![(1, 3), (4, 4)]);

    // Value must match octet-for-octet
    assert!(db
        .find_by_type_value(1, 0xFFFF, PRIMARY_SERVICE_UUID, &[0x0F])
        .is_empty());
}

// --- End-to-end scenarios, MTU 23 throughout ---

#[test]
fn scenario_exchange_mtu() {
    let (mut server, socket) = server_with(&[], 23, SecurityLevel::None);

    let out = exchange(&mut server, &socket, &[0x02, 0x40, 0x00]);
    assert_eq!(out, vec![vec![0x03, 0x17, 0x00]]);
    assert_eq!(server.mtu(), 23);
}

#[test]
fn scenario_discover_primary_services_empty_db() {
    let (mut server, socket) = server_with(&[], 23, SecurityLevel::None);

    let out = exchange(&mut server, &socket, &[0x10, 0x01, 0x00, 0xFF, 0xFF, 0x00, 0x28]);
    assert_eq!(out, vec![vec![0x01, 0x10, 0x01, 0x00, 0x0A]]);
}

#[test]
fn scenario_discover_primary_services_battery() {
    let (mut server, socket) = server_with(&[bare_battery_service()], 23, SecurityLevel::None);

    let out = exchange(&mut server, &socket, &[0x10, 0x01, 0x00, 0xFF, 0xFF, 0x00, 0x28]);
    assert_eq!(
        out,
        vec![vec![0x11, 0x06, 0x01, 0x00, 0x01, 0x00, 0x0F, 0x18]]
    );
}

#[test]
fn scenario_unsupported_group_type() {
    let (mut server, socket) = server_with(&[bare_battery_service()], 23, SecurityLevel::None);

    let out = exchange(&mut server, &socket, &[0x10, 0x01, 0x00, 0xFF, 0xFF, 0x0A, 0x2A]);
    assert_eq!(out, vec![vec![0x01, 0x10, 0x01, 0x00, 0x10]]);
}

#[test]
fn scenario_write_request_denied() {
    let (mut server, socket) = server_with(&[battery_service()], 23, SecurityLevel::None);

    let out = exchange(&mut server, &socket, &[0x12, 0x03, 0x00, 0xAA, 0xBB]);
    assert_eq!(out, vec![vec![0x01, 0x12, 0x03, 0x00, 0x03]]);
}

#[test]
fn scenario_write_command_to_read_only_attribute() {
    let (mut server, socket) = server_with(&[battery_service()], 23, SecurityLevel::None);

    let out = exchange(&mut server, &socket, &[0x52, 0x03, 0x00, 0xAA, 0xBB]);
    assert!(out.is_empty());
    assert_eq!(server.database().attribute(3).unwrap().value, vec![100]);
}

// --- Further protocol behavior ---

#[test]
fn mtu_negotiation_clamps_to_both_sides() {
    // Server willing to go to 100: the common value wins
    let (mut server, socket) = server_with(&[], 100, SecurityLevel::None);
    let out = exchange(&mut server, &socket, &[0x02, 0x40, 0x00]);
    assert_eq!(out, vec![vec![0x03, 0x64, 0x00]]);
    assert_eq!(server.mtu(), 64);

    // A client MTU below the default is raised to 23
    let (mut server, socket) = server_with(&[], 100, SecurityLevel::None);
    exchange(&mut server, &socket, &[0x02, 0x0A, 0x00]);
    assert_eq!(server.mtu(), 23);
}

#[test]
fn repeated_mtu_exchange_is_rejected() {
    let (mut server, socket) = server_with(&[], 23, SecurityLevel::None);

    exchange(&mut server, &socket, &[0x02, 0x40, 0x00]);
    let out = exchange(&mut server, &socket, &[0x02, 0x40, 0x00]);
    assert_eq!(out, vec![vec![0x01, 0x02, 0x00, 0x00, 0x06]]);
}

#[test]
fn read_by_type_returns_real_attribute_handles() {
    let (mut server, socket) = server_with(
        &[battery_service(), battery_service()],
        23,
        SecurityLevel::None,
    );

    let out = exchange(&mut server, &socket, &[0x08, 0x01, 0x00, 0xFF, 0xFF, 0x19, 0x2A]);
    // Two records of handle + one-byte value, at handles 3 and 6
    assert_eq!(
        out,
        vec![vec![0x09, 0x03, 0x03, 0x00, 100, 0x06, 0x00, 100]]
    );
}

#[test]
fn read_by_type_truncates_oversized_first_value() {
    let service = Service::primary(Uuid::from_u16(0x1800)).with_characteristic(
        Characteristic::new(
            Uuid::from_u16(0x2A00),
            CharacteristicProperty(CharacteristicProperty::READ),
            AttPermissions::read_only(),
            vec![0x55; 30],
        ),
    );
    let (mut server, socket) = server_with(&[service], 23, SecurityLevel::None);

    let out = exchange(&mut server, &socket, &[0x08, 0x01, 0x00, 0xFF, 0xFF, 0x00, 0x2A]);
    // One record, value cut to mtu - 4 = 19 octets
    let mut expected = vec![0x09, 21, 0x03, 0x00];
    expected.extend_from_slice(&[0x55; 19]);
    assert_eq!(out, vec![expected]);
}

#[test]
fn read_by_type_stops_at_value_length_mismatch() {
    let service = Service::primary(Uuid::from_u16(0x1800))
        .with_characteristic(Characteristic::new(
            Uuid::from_u16(0x2A00),
            CharacteristicProperty(CharacteristicProperty::READ),
            AttPermissions::read_only(),
            vec![1, 2],
        ))
        .with_characteristic(Characteristic::new(
            Uuid::from_u16(0x2A00),
            CharacteristicProperty(CharacteristicProperty::READ),
            AttPermissions::read_only(),
            vec![3, 4, 5],
        ));
    let (mut server, socket) = server_with(&[service], 23, SecurityLevel::None);

    let out = exchange(&mut server, &socket, &[0x08, 0x01, 0x00, 0xFF, 0xFF, 0x00, 0x2A]);
    assert_eq!(out, vec![vec![0x09, 0x04, 0x03, 0x00, 1, 2]]);
}

#[test]
fn find_information_lists_handle_uuid_pairs() {
    let (mut server, socket) = server_with(&[battery_service()], 23, SecurityLevel::None);

    let out = exchange(&mut server, &socket, &[0x04, 0x01, 0x00, 0xFF, 0xFF]);
    assert_eq!(
        out,
        vec![vec![
            0x05, 0x01, // format: 16-bit pairs
            0x01, 0x00, 0x00, 0x28, // primary service declaration
            0x02, 0x00, 0x03, 0x28, // characteristic declaration
            0x03, 0x00, 0x19, 0x2A, // battery level value
        ]]
    );
}

#[test]
fn find_information_skips_other_uuid_width() {
    let vendor = Uuid::from_bytes_le([0xC4; 16]);
    let service = Service::primary(Uuid::from_u16(0x1800)).with_characteristic(
        Characteristic::new(
            vendor,
            CharacteristicProperty(CharacteristicProperty::READ),
            AttPermissions::read_only(),
            vec![0],
        ),
    );
    let (mut server, socket) = server_with(&[service], 100, SecurityLevel::None);

    // First attribute is 16-bit, so the 128-bit value attribute at
    // handle 3 is skipped
    let out = exchange(&mut server, &socket, &[0x04, 0x01, 0x00, 0xFF, 0xFF]);
    assert_eq!(
        out,
        vec![vec![
            0x05, 0x01,
            0x01, 0x00, 0x00, 0x28,
            0x02, 0x00, 0x03, 0x28,
        ]]
    );

    // A range starting at the value attribute flips the format
    let out = exchange(&mut server, &socket, &[0x04, 0x03, 0x00, 0xFF, 0xFF]);
    let mut expected = vec![0x05, 0x02, 0x03, 0x00];
    expected.extend_from_slice(vendor.as_bytes_le());
    assert_eq!(out, vec![expected]);
}

#[test]
fn find_by_type_value_matches_service_uuid() {
    let (mut server, socket) = server_with(
        &[battery_service(), bare_battery_service()],
        23,
        SecurityLevel::None,
    );

    let out = exchange(
        &mut server,
        &socket,
        &[0x06, 0x01, 0x00, 0xFF, 0xFF, 0x00, 0x28, 0x0F, 0x18],
    );
    assert_eq!(
        out,
        vec![vec![0x07, 0x01, 0x00, 0x03, 0x00, 0x04, 0x00, 0x04, 0x00]]
    );

    let out = exchange(
        &mut server,
        &socket,
        &[0x06, 0x01, 0x00, 0xFF, 0xFF, 0x00, 0x28, 0x0A, 0x18],
    );
    assert_eq!(out, vec![vec![0x01, 0x06, 0x01, 0x00, 0x0A]]);
}

#[test]
fn write_request_updates_value_and_responds() {
    let (mut server, socket) = server_with(
        &[battery_service_with_perms(AttPermissions::read_write())],
        23,
        SecurityLevel::None,
    );

    let out = exchange(&mut server, &socket, &[0x12, 0x03, 0x00, 0xAA, 0xBB]);
    assert_eq!(out, vec![vec![0x13]]);
    assert_eq!(server.database().attribute(3).unwrap().value, vec![0xAA, 0xBB]);
}

#[test]
fn write_to_invalid_handle() {
    let (mut server, socket) = server_with(&[battery_service()], 23, SecurityLevel::None);

    let out = exchange(&mut server, &socket, &[0x12, 0x09, 0x00, 0xAA]);
    assert_eq!(out, vec![vec![0x01, 0x12, 0x09, 0x00, 0x01]]);

    // Same handle as a command: silence
    let out = exchange(&mut server, &socket, &[0x52, 0x09, 0x00, 0xAA]);
    assert!(out.is_empty());
}

#[test]
fn encrypted_write_needs_medium_security() {
    let service = battery_service_with_perms(AttPermissions::encrypted());

    let (mut server, socket) = server_with(&[service.clone()], 23, SecurityLevel::None);
    let out = exchange(&mut server, &socket, &[0x12, 0x03, 0x00, 0x01]);
    assert_eq!(out, vec![vec![0x01, 0x12, 0x03, 0x00, 0x0F]]);

    let (mut server, socket) = server_with(&[service], 23, SecurityLevel::Medium);
    let out = exchange(&mut server, &socket, &[0x12, 0x03, 0x00, 0x01]);
    assert_eq!(out, vec![vec![0x13]]);
}

#[test]
fn authenticated_write_needs_high_security() {
    let service = battery_service_with_perms(AttPermissions::authenticated());

    let (mut server, socket) = server_with(&[service.clone()], 23, SecurityLevel::Medium);
    let out = exchange(&mut server, &socket, &[0x12, 0x03, 0x00, 0x01]);
    assert_eq!(out, vec![vec![0x01, 0x12, 0x03, 0x00, 0x05]]);

    let (mut server, socket) = server_with(&[service], 23, SecurityLevel::High);
    let out = exchange(&mut server, &socket, &[0x12, 0x03, 0x00, 0x01]);
    assert_eq!(out, vec![vec![0x13]]);
}

#[test]
fn invalid_ranges_cite_the_right_handle() {
    let (mut server, socket) = server_with(&[battery_service()], 23, SecurityLevel::None);

    // Inverted range cites the start handle
    let out = exchange(&mut server, &socket, &[0x04, 0x05, 0x00, 0x02, 0x00]);
    assert_eq!(out, vec![vec![0x01, 0x04, 0x05, 0x00, 0x01]]);

    // Zero end bound: Find Information cites the start handle
    let out = exchange(&mut server, &socket, &[0x04, 0x05, 0x00, 0x00, 0x00]);
    assert_eq!(out, vec![vec![0x01, 0x04, 0x05, 0x00, 0x01]]);

    // Read By Group Type cites handle zero instead
    let out = exchange(&mut server, &socket, &[0x10, 0x05, 0x00, 0x00, 0x00, 0x00, 0x28]);
    assert_eq!(out, vec![vec![0x01, 0x10, 0x00, 0x00, 0x01]]);
}

#[test]
fn truncated_request_yields_invalid_pdu() {
    let (mut server, socket) = server_with(&[battery_service()], 23, SecurityLevel::None);

    let out = exchange(&mut server, &socket, &[0x10, 0x01, 0x00, 0xFF]);
    assert_eq!(out, vec![vec![0x01, 0x10, 0x00, 0x00, 0x04]]);
}

#[test]
fn every_request_gets_exactly_one_response_in_order() {
    let (mut server, socket) = server_with(
        &[battery_service_with_perms(AttPermissions::read_write())],
        23,
        SecurityLevel::None,
    );

    {
        let mut socket = socket.borrow_mut();
        socket.push_inbound(&[0x02, 0x40, 0x00]);
        socket.push_inbound(&[0x04, 0x01, 0x00, 0xFF, 0xFF]);
        socket.push_inbound(&[0x52, 0x03, 0x00, 0x07]); // command, no response
        socket.push_inbound(&[0x12, 0x03, 0x00, 0x08]);
        socket.push_inbound(&[0x0A, 0x03, 0x00]); // unsupported request
    }
    assert_eq!(server.poll_read().unwrap(), 5);
    server.poll_write().unwrap();

    let mut opcodes = Vec::new();
    while let Some(pdu) = socket.borrow_mut().pop_outbound() {
        opcodes.push(pdu[0]);
    }
    // One response per request, in request order; the command produced none
    assert_eq!(opcodes, vec![0x03, 0x05, 0x13, 0x01]);
    assert_eq!(server.database().attribute(3).unwrap().value, vec![0x08]);
}

#[test]
fn group_records_stop_at_uuid_width_mismatch() {
    let vendor = Uuid::from_bytes_le([0x9E; 16]);
    let (mut server, socket) = server_with(
        &[bare_battery_service(), Service::primary(vendor)],
        100,
        SecurityLevel::None,
    );

    let out = exchange(&mut server, &socket, &[0x10, 0x01, 0x00, 0xFF, 0xFF, 0x00, 0x28]);
    // The 128-bit service record has a different length and ends the list
    assert_eq!(
        out,
        vec![vec![0x11, 0x06, 0x01, 0x00, 0x01, 0x00, 0x0F, 0x18]]
    );
}
