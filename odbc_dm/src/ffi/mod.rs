// Allow FFI functions to dereference raw pointers without being marked unsafe
// This is expected and safe for extern "C" FFI boundaries
#![allow(clippy::not_unsafe_ptr_arg_deref)]
#![allow(non_snake_case)]

//! The call-level C ABI. Handles handed to the application are encoded arena
//! ids, never pointers into manager memory.

use crate::api::{
    info, FetchDirection, SqlReturn, SQL_ATTR_ODBC_VERSION, SQL_DROP, SQL_HANDLE_DBC,
    SQL_HANDLE_ENV, SQL_HANDLE_STMT, SQL_NTS,
};
use crate::config::ManagerConfig;
use crate::engine::buffer::{copy_str, short_length};
use crate::engine::DriverManager;
use crate::error::{DmError, Result};
use crate::handles::{decode, HandleId, HandleKind};
use crate::versioning::Revision;
use std::ffi::{c_void, CStr};
use std::os::raw::c_char;
use std::sync::OnceLock;

pub type SqlHandle = *mut c_void;

static MANAGER: OnceLock<DriverManager> = OnceLock::new();

fn manager() -> &'static DriverManager {
    MANAGER.get_or_init(|| {
        let config = ManagerConfig::from_env();
        log::info!("Driver manager using {}", config.ini_path.display());
        DriverManager::new(config)
    })
}

/// Installs the manager behind the C ABI. Fails (returning it) once the ABI
/// has been used or a manager was already installed.
pub fn install_manager(manager: DriverManager) -> std::result::Result<(), DriverManager> {
    MANAGER.set(manager)
}

fn status<T>(result: &Result<T>) -> i16 {
    match result {
        Ok(_) => SqlReturn::SUCCESS.0,
        Err(err) => err.sql_return().0,
    }
}

fn handle_of(handle: SqlHandle, kind: HandleKind) -> Result<HandleId> {
    decode(handle as usize, kind)
}

fn write_handle(output: *mut SqlHandle, id: HandleId) {
    // Safety: checked non-null by every caller
    unsafe { *output = id.to_raw() as SqlHandle };
}

fn write_short(output: *mut i16, value: i16) {
    if !output.is_null() {
        // Safety: non-null; the caller provides storage for one SQLSMALLINT
        unsafe { *output = value };
    }
}

/// Caller buffer of `capacity` bytes, or `None` for a null pointer.
fn out_bytes<'a>(ptr: *mut u8, capacity: i16) -> Option<&'a mut [u8]> {
    if ptr.is_null() {
        return None;
    }
    let len = usize::try_from(capacity).unwrap_or(0);
    // Safety: the caller guarantees `capacity` writable bytes at `ptr`
    Some(unsafe { std::slice::from_raw_parts_mut(ptr, len) })
}

/// Reads an input string given with an explicit length or `SQL_NTS`. Null
/// reads as empty.
fn in_str(ptr: *const u8, len: i16) -> Result<String> {
    if ptr.is_null() {
        return Ok(String::new());
    }
    let bytes = if len == SQL_NTS {
        // Safety: SQL_NTS promises a NUL-terminated string
        unsafe { CStr::from_ptr(ptr as *const c_char) }.to_bytes()
    } else {
        let len = usize::try_from(len).map_err(|_| DmError::InvalidBufferLength)?;
        // Safety: the caller guarantees `len` readable bytes at `ptr`
        unsafe { std::slice::from_raw_parts(ptr, len) }
    };
    Ok(String::from_utf8_lossy(bytes).into_owned())
}

fn alloc_child(
    parent: SqlHandle,
    output: *mut SqlHandle,
    kind: HandleKind,
    alloc: impl FnOnce(&DriverManager, HandleId) -> Result<HandleId>,
) -> i16 {
    let dm = manager();
    let parent = match handle_of(parent, kind) {
        Ok(id) => id,
        Err(err) => return err.sql_return().0,
    };
    if output.is_null() {
        return dm
            .reject(parent, kind, DmError::InvalidArgumentValue("null output handle".to_string()))
            .sql_return()
            .0;
    }
    let result = alloc(dm, parent);
    if let Ok(id) = &result {
        write_handle(output, *id);
    }
    status(&result)
}

#[no_mangle]
pub extern "C" fn SQLAllocEnv(phenv: *mut SqlHandle) -> i16 {
    alloc_env(phenv, Revision::Legacy)
}

fn alloc_env(output: *mut SqlHandle, revision: Revision) -> i16 {
    if output.is_null() {
        return SqlReturn::ERROR.0;
    }
    let result = manager().alloc_environment(revision);
    if let Ok(id) = &result {
        write_handle(output, *id);
    }
    status(&result)
}

#[no_mangle]
pub extern "C" fn SQLAllocConnect(henv: SqlHandle, phdbc: *mut SqlHandle) -> i16 {
    alloc_child(henv, phdbc, HandleKind::Environment, |dm, env| {
        dm.alloc_connection(env)
    })
}

#[no_mangle]
pub extern "C" fn SQLAllocStmt(hdbc: SqlHandle, phstmt: *mut SqlHandle) -> i16 {
    alloc_child(hdbc, phstmt, HandleKind::Connection, |dm, dbc| {
        dm.alloc_statement(dbc)
    })
}

/// Environments allocated here start on the current revision.
#[no_mangle]
pub extern "C" fn SQLAllocHandle(handle_type: i16, input: SqlHandle, output: *mut SqlHandle) -> i16 {
    match handle_type {
        SQL_HANDLE_ENV => alloc_env(output, Revision::Current),
        SQL_HANDLE_DBC => SQLAllocConnect(input, output),
        SQL_HANDLE_STMT => SQLAllocStmt(input, output),
        _ => SqlReturn::ERROR.0,
    }
}

#[no_mangle]
pub extern "C" fn SQLFreeEnv(henv: SqlHandle) -> i16 {
    let result = handle_of(henv, HandleKind::Environment).and_then(|env| manager().free_environment(env));
    status(&result)
}

#[no_mangle]
pub extern "C" fn SQLFreeConnect(hdbc: SqlHandle) -> i16 {
    let result = handle_of(hdbc, HandleKind::Connection).and_then(|dbc| manager().free_connection(dbc));
    status(&result)
}

/// Only `SQL_DROP` is handled by the manager.
#[no_mangle]
pub extern "C" fn SQLFreeStmt(hstmt: SqlHandle, option: u16) -> i16 {
    let dm = manager();
    let stmt = match handle_of(hstmt, HandleKind::Statement) {
        Ok(id) => id,
        Err(err) => return err.sql_return().0,
    };
    if option != SQL_DROP {
        return dm
            .reject(stmt, HandleKind::Statement, DmError::OptionOutOfRange(i32::from(option)))
            .sql_return()
            .0;
    }
    status(&dm.free_statement(stmt))
}

#[no_mangle]
pub extern "C" fn SQLFreeHandle(handle_type: i16, handle: SqlHandle) -> i16 {
    match handle_type {
        SQL_HANDLE_ENV => SQLFreeEnv(handle),
        SQL_HANDLE_DBC => SQLFreeConnect(handle),
        SQL_HANDLE_STMT => SQLFreeStmt(handle, SQL_DROP),
        _ => SqlReturn::ERROR.0,
    }
}

/// Supports `SQL_ATTR_ODBC_VERSION` only; the value is passed as an integer
/// in the pointer argument.
#[no_mangle]
pub extern "C" fn SQLSetEnvAttr(
    henv: SqlHandle,
    attribute: i32,
    value: SqlHandle,
    _string_length: i32,
) -> i16 {
    let dm = manager();
    let env = match handle_of(henv, HandleKind::Environment) {
        Ok(id) => id,
        Err(err) => return err.sql_return().0,
    };
    if attribute != SQL_ATTR_ODBC_VERSION {
        return dm.reject(env, HandleKind::Environment, DmError::OptionOutOfRange(attribute)).sql_return().0;
    }
    let requested = value as usize;
    let Some(revision) = u32::try_from(requested)
        .ok()
        .and_then(Revision::from_odbc_version)
    else {
        return dm
            .reject(
                env,
                HandleKind::Environment,
                DmError::InvalidAttributeValue(format!("ODBC version {}", requested)),
            )
            .sql_return()
            .0;
    };
    status(&dm.set_env_revision(env, revision))
}

#[no_mangle]
pub extern "C" fn SQLConnect(
    hdbc: SqlHandle,
    dsn: *const u8,
    dsn_len: i16,
    uid: *const u8,
    uid_len: i16,
    pwd: *const u8,
    pwd_len: i16,
) -> i16 {
    let dm = manager();
    let dbc = match handle_of(hdbc, HandleKind::Connection) {
        Ok(id) => id,
        Err(err) => return err.sql_return().0,
    };
    let args = in_str(dsn, dsn_len).and_then(|dsn| {
        Ok((dsn, in_str(uid, uid_len)?, in_str(pwd, pwd_len)?))
    });
    let (dsn, uid, pwd) = match args {
        Ok(args) => args,
        Err(err) => return dm.reject(dbc, HandleKind::Connection, err).sql_return().0,
    };
    match dm.connect(dbc, &dsn, &uid, &pwd) {
        Ok(code) => code.0,
        Err(err) => err.sql_return().0,
    }
}

#[no_mangle]
pub extern "C" fn SQLDisconnect(hdbc: SqlHandle) -> i16 {
    let result = handle_of(hdbc, HandleKind::Connection).and_then(|dbc| manager().disconnect(dbc));
    match result {
        Ok(code) => code.0,
        Err(err) => err.sql_return().0,
    }
}

fn is_handle_item(info_type: u16) -> bool {
    matches!(
        info_type,
        info::SQL_DRIVER_HDBC | info::SQL_DRIVER_HENV | info::SQL_DRIVER_HSTMT | info::SQL_DRIVER_HLIB
    )
}

#[no_mangle]
pub extern "C" fn SQLGetInfo(
    hdbc: SqlHandle,
    info_type: u16,
    value: *mut c_void,
    capacity: i16,
    length: *mut i16,
) -> i16 {
    let dm = manager();
    let dbc = match handle_of(hdbc, HandleKind::Connection) {
        Ok(id) => id,
        Err(err) => return err.sql_return().0,
    };
    if capacity < 0 {
        return dm.reject(dbc, HandleKind::Connection, DmError::InvalidBufferLength).sql_return().0;
    }

    // Handle items are SQLHANDLE-sized whatever the stated capacity.
    let capacity = if is_handle_item(info_type) {
        short_length(std::mem::size_of::<usize>())
    } else {
        capacity
    };
    match dm.get_info(dbc, info_type, out_bytes(value as *mut u8, capacity)) {
        Ok(reply) => {
            write_short(length, reply.length);
            reply.status.0
        }
        Err(err) => err.sql_return().0,
    }
}

#[no_mangle]
pub extern "C" fn SQLGetFunctions(hdbc: SqlHandle, function: u16, exists: *mut u16) -> i16 {
    let dm = manager();
    let dbc = match handle_of(hdbc, HandleKind::Connection) {
        Ok(id) => id,
        Err(err) => return err.sql_return().0,
    };
    let len = match function {
        crate::api::SQL_API_ALL_FUNCTIONS => crate::api::LEGACY_ALL_FUNCTIONS_SIZE,
        crate::api::SQL_API_ODBC3_ALL_FUNCTIONS => crate::api::SQL_API_ODBC3_ALL_FUNCTIONS_SIZE,
        _ => 1,
    };
    let exists = if exists.is_null() {
        None
    } else {
        // Safety: the caller provides the array size the selector requires
        Some(unsafe { std::slice::from_raw_parts_mut(exists, len) })
    };
    match dm.get_functions(dbc, function, exists) {
        Ok(code) => code.0,
        Err(err) => err.sql_return().0,
    }
}

/// Validates the arguments shared by `SQLDataSources` and `SQLDrivers`.
fn fetch_args(
    dm: &DriverManager,
    henv: SqlHandle,
    direction: u16,
    capacities: [i16; 2],
) -> std::result::Result<(HandleId, FetchDirection), i16> {
    let env = handle_of(henv, HandleKind::Environment).map_err(|err| err.sql_return().0)?;
    if capacities.iter().any(|c| *c < 0) {
        return Err(dm.reject(env, HandleKind::Environment, DmError::InvalidBufferLength).sql_return().0);
    }
    let direction = FetchDirection::try_from(direction)
        .map_err(|raw| dm.reject(env, HandleKind::Environment, DmError::FetchTypeOutOfRange(raw)).sql_return().0)?;
    Ok((env, direction))
}

#[no_mangle]
pub extern "C" fn SQLDataSources(
    henv: SqlHandle,
    direction: u16,
    name: *mut u8,
    name_max: i16,
    name_len: *mut i16,
    description: *mut u8,
    description_max: i16,
    description_len: *mut i16,
) -> i16 {
    let dm = manager();
    let (env, direction) = match fetch_args(dm, henv, direction, [name_max, description_max]) {
        Ok(args) => args,
        Err(code) => return code,
    };
    let result = dm.data_sources(
        env,
        direction,
        out_bytes(name, name_max),
        out_bytes(description, description_max),
    );
    match result {
        Ok(reply) => {
            if reply.status != SqlReturn::NO_DATA {
                write_short(name_len, short_length(reply.name_length));
                write_short(description_len, short_length(reply.description_length));
            }
            reply.status.0
        }
        Err(err) => err.sql_return().0,
    }
}

#[no_mangle]
pub extern "C" fn SQLDrivers(
    henv: SqlHandle,
    direction: u16,
    description: *mut u8,
    description_max: i16,
    description_len: *mut i16,
    attributes: *mut u8,
    attributes_max: i16,
    attributes_len: *mut i16,
) -> i16 {
    let dm = manager();
    let (env, direction) = match fetch_args(dm, henv, direction, [description_max, attributes_max])
    {
        Ok(args) => args,
        Err(code) => return code,
    };
    let result = dm.drivers(
        env,
        direction,
        out_bytes(description, description_max),
        out_bytes(attributes, attributes_max),
    );
    match result {
        Ok(reply) => {
            write_short(description_len, 0);
            write_short(attributes_len, 0);
            reply.status.0
        }
        Err(err) => err.sql_return().0,
    }
}

/// Reads the `record`th diagnostic (1-based) of a handle without clearing
/// the handle's queue.
#[no_mangle]
pub extern "C" fn SQLGetDiagRec(
    handle_type: i16,
    handle: SqlHandle,
    record: i16,
    sqlstate: *mut u8,
    native: *mut i32,
    message: *mut u8,
    message_max: i16,
    message_len: *mut i16,
) -> i16 {
    let Some(kind) = HandleKind::from_sql(handle_type) else {
        return SqlReturn::ERROR.0;
    };
    let id = match handle_of(handle, kind) {
        Ok(id) => id,
        Err(err) => return err.sql_return().0,
    };
    if record < 1 || message_max < 0 {
        return SqlReturn::ERROR.0;
    }

    let diagnostic = match manager().diagnostic(id, usize::from(record.unsigned_abs())) {
        Ok(Some(diagnostic)) => diagnostic,
        Ok(None) => return SqlReturn::NO_DATA.0,
        Err(err) => return err.sql_return().0,
    };

    if let Some(out) = out_bytes(sqlstate, 6) {
        out[..5].copy_from_slice(&diagnostic.sqlstate);
        out[5] = 0;
    }
    if !native.is_null() {
        // Safety: non-null; the caller provides storage for one SQLINTEGER
        unsafe { *native = diagnostic.native_code };
    }
    let copied = copy_str(&diagnostic.message, out_bytes(message, message_max));
    write_short(message_len, short_length(copied.length));
    SqlReturn::success_or_info(copied.truncated).0
}
