//! GATT server implementation
//!
//! Binds a handler for each supported ATT request opcode onto an
//! [`AttConnection`], consults the attribute database, and constructs
//! responses subject to the MTU truncation rules.

use crate::att::connection::AttConnection;
use crate::att::constants::*;
use crate::att::database::{AttributeDatabase, ServiceRecord};
use crate::att::error::{AttErrorCode, AttResult};
use crate::att::types::{
    AttPacket, ExchangeMtuRequest, ExchangeMtuResponse, FindByTypeValueRequest,
    FindByTypeValueResponse, FindInformationRequest, GroupRecordBuilder, HandleRange,
    InfoRecordBuilder, ReadByGroupTypeRequest, ReadByTypeRequest, TypeRecordBuilder, WriteCommand,
    WriteRequest, WriteResponse,
};
use crate::l2cap::L2capSocket;
use log::debug;
use std::cell::{Cell, Ref, RefCell, RefMut};
use std::rc::Rc;

/// GATT server configuration
#[derive(Debug, Clone)]
pub struct GattServerConfig {
    /// The MTU this server is willing to accept, answered verbatim in the
    /// Exchange MTU Response.
    pub server_mtu: u16,
}

impl Default for GattServerConfig {
    fn default() -> Self {
        Self {
            server_mtu: ATT_DEFAULT_MTU,
        }
    }
}

/// A GATT server bound to one ATT bearer.
///
/// The server owns the attribute database; handlers take exclusive access
/// for the duration of one PDU. Concurrency is cooperative, so the shared
/// handle is a plain `Rc<RefCell<..>>` and no locks exist anywhere.
pub struct GattServer {
    connection: AttConnection,
    database: Rc<RefCell<AttributeDatabase>>,
}

impl GattServer {
    /// Creates a server over a connected socket and registers the request
    /// handlers.
    pub fn new(socket: Box<dyn L2capSocket>, config: GattServerConfig) -> Self {
        let mut connection = AttConnection::with_max_mtu(socket, config.server_mtu);
        let database = Rc::new(RefCell::new(AttributeDatabase::new()));
        let server_mtu = config.server_mtu;

        let mtu_exchanged = Rc::new(Cell::new(false));
        connection.register(
            ATT_EXCHANGE_MTU_REQ,
            Box::new(move |conn, pdu| handle_exchange_mtu(conn, server_mtu, &mtu_exchanged, pdu)),
        );

        let db = Rc::clone(&database);
        connection.register(
            ATT_READ_BY_GROUP_TYPE_REQ,
            Box::new(move |conn, pdu| handle_read_by_group_type(conn, &db.borrow(), pdu)),
        );

        let db = Rc::clone(&database);
        connection.register(
            ATT_READ_BY_TYPE_REQ,
            Box::new(move |conn, pdu| handle_read_by_type(conn, &db.borrow(), pdu)),
        );

        let db = Rc::clone(&database);
        connection.register(
            ATT_FIND_INFO_REQ,
            Box::new(move |conn, pdu| handle_find_information(conn, &db.borrow(), pdu)),
        );

        let db = Rc::clone(&database);
        connection.register(
            ATT_FIND_BY_TYPE_VALUE_REQ,
            Box::new(move |conn, pdu| handle_find_by_type_value(conn, &db.borrow(), pdu)),
        );

        let db = Rc::clone(&database);
        connection.register(
            ATT_WRITE_REQ,
            Box::new(move |conn, pdu| handle_write(conn, &mut db.borrow_mut(), pdu, true)),
        );

        let db = Rc::clone(&database);
        connection.register(
            ATT_WRITE_CMD,
            Box::new(move |conn, pdu| handle_write(conn, &mut db.borrow_mut(), pdu, false)),
        );

        Self {
            connection,
            database,
        }
    }

    /// Appends a service to the database, assigning handles. Services are
    /// registered before the bearer is first polled.
    pub fn add_service(&mut self, service: &super::types::Service) -> AttResult<ServiceRecord> {
        self.database.borrow_mut().append_service(service)
    }

    /// Reads and dispatches all pending inbound PDUs.
    pub fn poll_read(&mut self) -> AttResult<usize> {
        self.connection.poll_read()
    }

    /// Flushes queued responses to the socket.
    pub fn poll_write(&mut self) -> AttResult<usize> {
        self.connection.poll_write()
    }

    /// The bearer's negotiated MTU.
    pub fn mtu(&self) -> u16 {
        self.connection.mtu()
    }

    pub fn is_closed(&self) -> bool {
        self.connection.is_closed()
    }

    /// Shared read access to the attribute database.
    pub fn database(&self) -> Ref<'_, AttributeDatabase> {
        self.database.borrow()
    }

    /// Exclusive access to the attribute database, e.g. for the embedder
    /// to update characteristic values between polls.
    pub fn database_mut(&mut self) -> RefMut<'_, AttributeDatabase> {
        self.database.borrow_mut()
    }

    /// The underlying bearer.
    pub fn connection(&self) -> &AttConnection {
        &self.connection
    }
}

/// Validates the handle range of a range-based request. Emits an
/// `InvalidHandle` Error Response and returns false when the range is
/// unusable. `zero_cite` is the handle cited when a bound is zero.
fn validate_range(
    conn: &mut AttConnection,
    opcode: u8,
    start: u16,
    end: u16,
    zero_cite: u16,
) -> bool {
    if start == 0 || end == 0 {
        conn.send_error(opcode, AttErrorCode::InvalidHandle, zero_cite);
        return false;
    }
    if start > end {
        conn.send_error(opcode, AttErrorCode::InvalidHandle, start);
        return false;
    }
    true
}

fn handle_exchange_mtu(
    conn: &mut AttConnection,
    server_mtu: u16,
    mtu_exchanged: &Cell<bool>,
    pdu: &[u8],
) -> AttResult<()> {
    let request = match ExchangeMtuRequest::parse(pdu) {
        Ok(request) => request,
        Err(err) => {
            conn.send_error(ATT_EXCHANGE_MTU_REQ, err.to_error_code(), 0);
            return Ok(());
        }
    };

    // MTU is negotiated once per bearer
    if mtu_exchanged.get() {
        conn.send_error(ATT_EXCHANGE_MTU_REQ, AttErrorCode::RequestNotSupported, 0);
        return Ok(());
    }
    mtu_exchanged.set(true);

    // The response carries the configured server MTU; the bearer then uses
    // the clamped common value
    conn.send(&ExchangeMtuResponse { server_mtu }, None);
    let final_mtu = ATT_DEFAULT_MTU.max(request.client_mtu.min(server_mtu));
    conn.set_mtu(final_mtu);
    debug!(
        "MTU exchanged: client={} server={} final={}",
        request.client_mtu, server_mtu, final_mtu
    );
    Ok(())
}

fn handle_read_by_group_type(
    conn: &mut AttConnection,
    db: &AttributeDatabase,
    pdu: &[u8],
) -> AttResult<()> {
    let request = match ReadByGroupTypeRequest::parse(pdu) {
        Ok(request) => request,
        Err(err) => {
            conn.send_error(ATT_READ_BY_GROUP_TYPE_REQ, err.to_error_code(), 0);
            return Ok(());
        }
    };
    let start = request.start_handle;
    if !validate_range(conn, ATT_READ_BY_GROUP_TYPE_REQ, start, request.end_handle, 0) {
        return Ok(());
    }

    let primary = if request.group_type == PRIMARY_SERVICE_UUID {
        true
    } else if request.group_type == SECONDARY_SERVICE_UUID {
        false
    } else {
        conn.send_error(
            ATT_READ_BY_GROUP_TYPE_REQ,
            AttErrorCode::UnsupportedGroupType,
            start,
        );
        return Ok(());
    };

    let services = db.read_by_group_type(start, request.end_handle, primary);
    if services.is_empty() {
        conn.send_error(
            ATT_READ_BY_GROUP_TYPE_REQ,
            AttErrorCode::AttributeNotFound,
            start,
        );
        return Ok(());
    }

    let mut builder = GroupRecordBuilder::new(conn.mtu());
    for service in &services {
        if !builder.push(
            service.start_handle,
            service.end_handle,
            service.uuid.to_wire_bytes(),
        ) {
            break;
        }
    }
    match builder.finish() {
        Ok(response) => conn.send(&response, None),
        Err(_) => {
            conn.send_error(ATT_READ_BY_GROUP_TYPE_REQ, AttErrorCode::Unlikely, start);
            conn.close();
        }
    }
    Ok(())
}

fn handle_read_by_type(
    conn: &mut AttConnection,
    db: &AttributeDatabase,
    pdu: &[u8],
) -> AttResult<()> {
    let request = match ReadByTypeRequest::parse(pdu) {
        Ok(request) => request,
        Err(err) => {
            conn.send_error(ATT_READ_BY_TYPE_REQ, err.to_error_code(), 0);
            return Ok(());
        }
    };
    let start = request.start_handle;
    if !validate_range(conn, ATT_READ_BY_TYPE_REQ, start, request.end_handle, start) {
        return Ok(());
    }

    let attrs = db.read_by_type(start, request.end_handle, &request.attribute_type);
    if attrs.is_empty() {
        conn.send_error(ATT_READ_BY_TYPE_REQ, AttErrorCode::AttributeNotFound, start);
        return Ok(());
    }

    let mtu = conn.mtu() as usize;
    let mut builder = TypeRecordBuilder::new(conn.mtu());
    if attrs[0].value.len() > mtu - 4 {
        // Oversized first value: one record, value cut to fit
        builder.push(attrs[0].handle, attrs[0].value[..mtu - 4].to_vec());
    } else {
        for attr in &attrs {
            if !builder.push(attr.handle, attr.value.clone()) {
                break;
            }
        }
    }
    match builder.finish() {
        Ok(response) => conn.send(&response, None),
        Err(_) => {
            conn.send_error(ATT_READ_BY_TYPE_REQ, AttErrorCode::Unlikely, start);
            conn.close();
        }
    }
    Ok(())
}

fn handle_find_information(
    conn: &mut AttConnection,
    db: &AttributeDatabase,
    pdu: &[u8],
) -> AttResult<()> {
    let request = match FindInformationRequest::parse(pdu) {
        Ok(request) => request,
        Err(err) => {
            conn.send_error(ATT_FIND_INFO_REQ, err.to_error_code(), 0);
            return Ok(());
        }
    };
    let start = request.start_handle;
    if !validate_range(conn, ATT_FIND_INFO_REQ, start, request.end_handle, start) {
        return Ok(());
    }

    let attrs = db.find_information(start, request.end_handle);
    if attrs.is_empty() {
        conn.send_error(ATT_FIND_INFO_REQ, AttErrorCode::AttributeNotFound, start);
        return Ok(());
    }

    let mut builder = InfoRecordBuilder::new(conn.mtu());
    for attr in &attrs {
        if !builder.push(attr.handle, &attr.att_type) {
            break;
        }
    }
    match builder.finish() {
        Ok(response) => conn.send(&response, None),
        Err(_) => {
            conn.send_error(ATT_FIND_INFO_REQ, AttErrorCode::Unlikely, start);
            conn.close();
        }
    }
    Ok(())
}

fn handle_find_by_type_value(
    conn: &mut AttConnection,
    db: &AttributeDatabase,
    pdu: &[u8],
) -> AttResult<()> {
    let request = match FindByTypeValueRequest::parse(pdu) {
        Ok(request) => request,
        Err(err) => {
            conn.send_error(ATT_FIND_BY_TYPE_VALUE_REQ, err.to_error_code(), 0);
            return Ok(());
        }
    };
    let start = request.start_handle;
    if !validate_range(conn, ATT_FIND_BY_TYPE_VALUE_REQ, start, request.end_handle, start) {
        return Ok(());
    }

    let found = db.find_by_type_value(
        start,
        request.end_handle,
        request.attribute_type,
        &request.attribute_value,
    );
    if found.is_empty() {
        conn.send_error(
            ATT_FIND_BY_TYPE_VALUE_REQ,
            AttErrorCode::AttributeNotFound,
            start,
        );
        return Ok(());
    }

    // 1 + 4n must fit the MTU
    let max_pairs = (conn.mtu() as usize - 1) / 4;
    let handles = found
        .into_iter()
        .take(max_pairs)
        .map(|(found_handle, group_end_handle)| HandleRange {
            found_handle,
            group_end_handle,
        })
        .collect();
    conn.send(&FindByTypeValueResponse { handles }, None);
    Ok(())
}

/// Common routine for Write Request and Write Command. Commands never
/// produce a response: every failure is a silent drop.
fn handle_write(
    conn: &mut AttConnection,
    db: &mut AttributeDatabase,
    pdu: &[u8],
    respond: bool,
) -> AttResult<()> {
    let opcode = if respond { ATT_WRITE_REQ } else { ATT_WRITE_CMD };
    let (handle, value) = if respond {
        match WriteRequest::parse(pdu) {
            Ok(request) => (request.handle, request.value),
            Err(err) => {
                conn.send_error(opcode, err.to_error_code(), 0);
                return Ok(());
            }
        }
    } else {
        match WriteCommand::parse(pdu) {
            Ok(command) => (command.handle, command.value),
            Err(_) => return Ok(()),
        }
    };

    let permissions = match db.attribute(handle) {
        Some(attr) => attr.permissions,
        None => {
            if respond {
                conn.send_error(opcode, AttErrorCode::InvalidHandle, handle);
            }
            return Ok(());
        }
    };

    if let Err(err) = permissions.check_write(conn.security_level()) {
        debug!("write to handle 0x{:04X} denied: {}", handle, err);
        if respond {
            conn.send_error(opcode, err.to_error_code(), handle);
        }
        return Ok(());
    }

    db.write(handle, &value)?;
    if respond {
        conn.send(&WriteResponse, None);
    }
    Ok(())
}
