mod helpers;

use helpers::{c_str, Fixture};
use odbc_dm::api::{info, SQL_HANDLE_DBC, SQL_HANDLE_ENV, SQL_HANDLE_STMT, SQL_NTS};
use odbc_dm::ffi::{self, SqlHandle};
use odbc_dm::testing::MockDriver;
use odbc_dm::{Function, FunctionBitmap, SqlReturn};
use serial_test::serial;
use std::ffi::c_void;
use std::ptr;
use std::sync::OnceLock;

const SUCCESS: i16 = SqlReturn::SUCCESS.0;
const ERROR: i16 = SqlReturn::ERROR.0;
const INVALID_HANDLE: i16 = SqlReturn::INVALID_HANDLE.0;
const NO_DATA: i16 = SqlReturn::NO_DATA.0;

struct Drivers {
    current: MockDriver,
}

/// Installs a mock-backed manager behind the exported functions once per
/// test binary.
fn drivers() -> &'static Drivers {
    static DRIVERS: OnceLock<Drivers> = OnceLock::new();
    DRIVERS.get_or_init(|| {
        let Fixture { dm, current, .. } = Fixture::new();
        if ffi::install_manager(dm).is_err() {
            panic!("manager already installed");
        }
        Drivers { current }
    })
}

fn alloc(handle_type: i16, input: SqlHandle) -> SqlHandle {
    let mut output: SqlHandle = ptr::null_mut();
    assert_eq!(ffi::SQLAllocHandle(handle_type, input, &mut output), SUCCESS);
    assert!(!output.is_null());
    output
}

fn connect(dbc: SqlHandle, dsn: &[u8]) -> i16 {
    ffi::SQLConnect(
        dbc,
        dsn.as_ptr(),
        SQL_NTS,
        b"scott\0".as_ptr(),
        SQL_NTS,
        b"tiger".as_ptr(),
        5,
    )
}

fn diag_state(handle_type: i16, handle: SqlHandle) -> Option<String> {
    let mut state = [0u8; 6];
    let mut native = 0i32;
    let mut message = [0u8; 256];
    let mut length = 0i16;
    let code = ffi::SQLGetDiagRec(
        handle_type,
        handle,
        1,
        state.as_mut_ptr(),
        &mut native,
        message.as_mut_ptr(),
        message.len() as i16,
        &mut length,
    );
    if code == NO_DATA {
        return None;
    }
    assert_eq!(code, SUCCESS);
    assert!(length > 0);
    Some(c_str(&state))
}

#[test]
#[serial]
fn test_session_through_c_api() {
    let drivers = drivers();
    let env = alloc(SQL_HANDLE_ENV, ptr::null_mut());
    assert_eq!(ffi::SQLSetEnvAttr(env, 200, 3usize as SqlHandle, 0), SUCCESS);
    let dbc = alloc(SQL_HANDLE_DBC, env);
    assert_eq!(connect(dbc, b"Sales\0"), SUCCESS);
    assert!(drivers
        .current
        .calls()
        .contains(&"SQLConnect(Sales)".to_string()));

    let mut name = [0u8; 64];
    let mut length = 0i16;
    assert_eq!(
        ffi::SQLGetInfo(
            dbc,
            info::SQL_DRIVER_NAME,
            name.as_mut_ptr() as *mut c_void,
            name.len() as i16,
            &mut length,
        ),
        SUCCESS
    );
    assert_eq!(c_str(&name), "libmockodbc.so");
    assert_eq!(length, 14);

    let mut words = [0u16; 250];
    assert_eq!(ffi::SQLGetFunctions(dbc, 999, words.as_mut_ptr()), SUCCESS);
    let bitmap = FunctionBitmap::from_words(&words);
    assert!(bitmap.is_set(Function::Connect.id()));
    assert!(bitmap.is_set(Function::SetEnvAttr.id()));

    let stmt = alloc(SQL_HANDLE_STMT, dbc);
    let mut word = (stmt as usize).to_ne_bytes();
    assert_eq!(
        ffi::SQLGetInfo(
            dbc,
            info::SQL_DRIVER_HSTMT,
            word.as_mut_ptr() as *mut c_void,
            0,
            &mut length,
        ),
        SUCCESS
    );
    assert_ne!(usize::from_ne_bytes(word), stmt as usize);
    assert_eq!(length as usize, std::mem::size_of::<usize>());

    assert_eq!(ffi::SQLFreeStmt(stmt, 0), ERROR);
    assert_eq!(diag_state(SQL_HANDLE_STMT, stmt).as_deref(), Some("HY092"));
    assert_eq!(ffi::SQLFreeHandle(SQL_HANDLE_STMT, stmt), SUCCESS);

    assert_eq!(ffi::SQLDisconnect(dbc), SUCCESS);
    assert_eq!(ffi::SQLFreeHandle(SQL_HANDLE_DBC, dbc), SUCCESS);
    assert_eq!(ffi::SQLFreeHandle(SQL_HANDLE_ENV, env), SUCCESS);
}

#[test]
#[serial]
fn test_legacy_entry_points() {
    drivers();
    let mut env: SqlHandle = ptr::null_mut();
    assert_eq!(ffi::SQLAllocEnv(&mut env), SUCCESS);
    let mut dbc: SqlHandle = ptr::null_mut();
    assert_eq!(ffi::SQLAllocConnect(env, &mut dbc), SUCCESS);

    assert_eq!(connect(dbc, b"Nowhere\0"), ERROR);
    assert_eq!(diag_state(SQL_HANDLE_DBC, dbc).as_deref(), Some("IM002"));

    let mut buf = [0u8; 8];
    assert_eq!(
        ffi::SQLGetInfo(dbc, info::SQL_ODBC_VER, buf.as_mut_ptr() as *mut c_void, -1, ptr::null_mut()),
        ERROR
    );
    assert_eq!(diag_state(SQL_HANDLE_DBC, dbc).as_deref(), Some("S1090"));

    assert_eq!(connect(dbc, b"Archive\0"), SUCCESS);
    let mut stmt: SqlHandle = ptr::null_mut();
    assert_eq!(ffi::SQLAllocStmt(dbc, &mut stmt), SUCCESS);
    assert_eq!(ffi::SQLFreeStmt(stmt, 1), SUCCESS);
    assert_eq!(ffi::SQLDisconnect(dbc), SUCCESS);
    assert_eq!(ffi::SQLFreeConnect(dbc), SUCCESS);
    assert_eq!(ffi::SQLFreeEnv(env), SUCCESS);
}

#[test]
#[serial]
fn test_data_sources_through_c_api() {
    drivers();
    let env = alloc(SQL_HANDLE_ENV, ptr::null_mut());

    let mut seen = Vec::new();
    let mut direction = 2u16;
    loop {
        let mut name = [0u8; 32];
        let mut description = [0u8; 64];
        let mut name_len = 0i16;
        let mut description_len = 0i16;
        let code = ffi::SQLDataSources(
            env,
            direction,
            name.as_mut_ptr(),
            name.len() as i16,
            &mut name_len,
            description.as_mut_ptr(),
            description.len() as i16,
            &mut description_len,
        );
        if code == NO_DATA {
            break;
        }
        assert_eq!(code, SUCCESS);
        assert_eq!(name_len as usize, c_str(&name).len());
        seen.push(c_str(&name));
        direction = 1;
    }
    assert_eq!(seen, vec!["Archive".to_string(), "Sales".to_string()]);

    assert_eq!(
        ffi::SQLDataSources(env, 7, ptr::null_mut(), 0, ptr::null_mut(), ptr::null_mut(), 0, ptr::null_mut()),
        ERROR
    );
    assert_eq!(diag_state(SQL_HANDLE_ENV, env).as_deref(), Some("HY103"));

    assert_eq!(ffi::SQLFreeHandle(SQL_HANDLE_ENV, env), SUCCESS);
}

#[test]
#[serial]
fn test_invalid_handles() {
    drivers();
    let mut output: SqlHandle = ptr::null_mut();
    assert_eq!(
        ffi::SQLAllocHandle(SQL_HANDLE_DBC, ptr::null_mut(), &mut output),
        INVALID_HANDLE
    );
    assert_eq!(
        ffi::SQLGetInfo(0xdead_0000 as SqlHandle, info::SQL_ODBC_VER, ptr::null_mut(), 0, ptr::null_mut()),
        INVALID_HANDLE
    );

    // An environment handle is not a connection handle.
    let env = alloc(SQL_HANDLE_ENV, ptr::null_mut());
    assert_eq!(ffi::SQLDisconnect(env), INVALID_HANDLE);
    assert_eq!(ffi::SQLFreeHandle(SQL_HANDLE_ENV, env), SUCCESS);
    assert_eq!(ffi::SQLFreeHandle(SQL_HANDLE_ENV, env), INVALID_HANDLE);
    assert_eq!(ffi::SQLFreeHandle(42, env), ERROR);
}
