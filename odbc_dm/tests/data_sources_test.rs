mod helpers;

use helpers::{c_str, init_logging, Fixture};
use odbc_dm::testing::{MockDriver, MockLoader};
use odbc_dm::{
    DataSource, DataSourceList, DmError, DriverManager, FetchDirection, HandleId, IniFileStore,
    Revision, SqlReturn,
};
use std::io::Write;
use std::sync::Arc;

const ODBC_INI: &str = "\
[B]
Driver = /opt/drivers/libb.so
Description = Bravo warehouse

[A]
Driver = /opt/drivers/liba.so

[ODBC Data Sources]
A = Alpha
B = Bravo

[Default]
Driver = /opt/drivers/liba.so
";

fn ini_file(contents: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().expect("temp file");
    file.write_all(contents.as_bytes()).expect("write odbc.ini");
    file.flush().expect("flush");
    file
}

fn fetch(dm: &DriverManager, env: HandleId, direction: FetchDirection) -> Option<(String, String)> {
    let mut name = [0u8; 64];
    let mut description = [0u8; 64];
    let reply = dm
        .data_sources(env, direction, Some(&mut name), Some(&mut description))
        .expect("data sources");
    if reply.status == SqlReturn::NO_DATA {
        return None;
    }
    assert_eq!(reply.status, SqlReturn::SUCCESS);
    Some((c_str(&name), c_str(&description)))
}

#[test]
fn test_enumerates_ini_file() {
    init_logging();
    let file = ini_file(ODBC_INI);
    let dm = DriverManager::with_parts(
        Arc::new(IniFileStore::new(file.path())),
        Box::new(MockLoader::new()),
    );
    let env = dm.alloc_environment(Revision::Current).expect("env");

    assert_eq!(
        fetch(&dm, env, FetchDirection::First),
        Some(("A".to_string(), String::new()))
    );
    assert_eq!(
        fetch(&dm, env, FetchDirection::Next),
        Some(("B".to_string(), "Bravo warehouse".to_string()))
    );
    assert_eq!(fetch(&dm, env, FetchDirection::Next), None);
    assert_eq!(
        fetch(&dm, env, FetchDirection::Next),
        Some(("A".to_string(), String::new()))
    );
}

#[test]
fn test_first_rereads_edited_file() {
    init_logging();
    let file = ini_file(ODBC_INI);
    let dm = DriverManager::with_parts(
        Arc::new(IniFileStore::new(file.path())),
        Box::new(MockLoader::new()),
    );
    let env = dm.alloc_environment(Revision::Current).expect("env");
    assert_eq!(fetch(&dm, env, FetchDirection::First).map(|(n, _)| n), Some("A".to_string()));

    std::fs::write(file.path(), "[Zulu]\nDescription = Last\n[alpha]\n").expect("rewrite");

    // Next keeps walking the list read by First.
    assert_eq!(fetch(&dm, env, FetchDirection::Next).map(|(n, _)| n), Some("B".to_string()));
    assert_eq!(
        fetch(&dm, env, FetchDirection::First).map(|(n, _)| n),
        Some("alpha".to_string())
    );
    assert_eq!(
        fetch(&dm, env, FetchDirection::Next),
        Some(("Zulu".to_string(), "Last".to_string()))
    );
}

#[test]
fn test_missing_file_reports_no_data() {
    init_logging();
    let dir = tempfile::tempdir().expect("temp dir");
    let dm = DriverManager::with_parts(
        Arc::new(IniFileStore::new(dir.path().join("odbc.ini"))),
        Box::new(MockLoader::new()),
    );
    let env = dm.alloc_environment(Revision::Legacy).expect("env");

    assert_eq!(fetch(&dm, env, FetchDirection::First), None);
    assert!(dm.diagnostics(env).expect("diagnostics").is_empty());
}

#[test]
fn test_connect_through_ini_file() {
    init_logging();
    let file = ini_file(ODBC_INI);
    let driver = MockDriver::current();
    let loader = MockLoader::new();
    loader.register("/opt/drivers/liba.so", driver.clone());
    let dm = DriverManager::with_parts(Arc::new(IniFileStore::new(file.path())), Box::new(loader));

    let env = dm.alloc_environment(Revision::Current).expect("env");
    let dbc = dm.alloc_connection(env).expect("dbc");
    dm.connect(dbc, "A", "", "").expect("connect A");
    dm.disconnect(dbc).expect("disconnect");

    // No such section: the [Default] driver serves it.
    dm.connect(dbc, "Nowhere", "", "").expect("connect default");
    dm.disconnect(dbc).expect("disconnect");

    // B's driver is not installed.
    assert!(matches!(
        dm.connect(dbc, "B", "", ""),
        Err(DmError::DriverLoad { .. })
    ));
    let record = dm.diagnostic(dbc, 1).expect("lookup").expect("record");
    assert_eq!(record.sqlstate_str(), "IM003");

    let calls = driver.calls();
    assert!(calls.contains(&"SQLConnect(A)".to_string()));
    assert!(calls.contains(&"SQLConnect(Nowhere)".to_string()));
    dm.free_connection(dbc).expect("free dbc");
    dm.free_environment(env).expect("free env");
}

#[test]
fn test_truncated_names_warn() {
    let fx = Fixture::new();
    let env = fx.dm.alloc_environment(Revision::Current).expect("env");

    let mut name = [0u8; 4];
    let mut description = [0u8; 64];
    let reply = fx
        .dm
        .data_sources(env, FetchDirection::First, Some(&mut name), Some(&mut description))
        .expect("first");
    assert_eq!(reply.status, SqlReturn::SUCCESS_WITH_INFO);
    assert_eq!(reply.name_length, "Archive".len());
    assert_eq!(c_str(&name), "Arc");
    assert_eq!(c_str(&description), "Pre-2010 archive");

    let record = fx.dm.diagnostic(env, 1).expect("lookup").expect("record");
    assert_eq!(record.sqlstate_str(), "01004");

    // The warning belongs to the call that produced it.
    let reply = fx
        .dm
        .data_sources(env, FetchDirection::Next, None, None)
        .expect("next");
    assert_eq!(reply.status, SqlReturn::SUCCESS);
    assert_eq!(reply.name_length, "Sales".len());
    assert!(fx.dm.diagnostics(env).expect("diagnostics").is_empty());
}

#[test]
fn test_snapshot_list_is_independent() {
    let fx = Fixture::new();
    let env = fx.dm.alloc_environment(Revision::Current).expect("env");
    assert!(fetch(&fx.dm, env, FetchDirection::First).is_some());

    let listed: Vec<DataSource> = DataSourceList::load(&fx.store).expect("list").collect();
    assert_eq!(
        listed,
        vec![
            DataSource {
                name: "Archive".to_string(),
                description: Some("Pre-2010 archive".to_string()),
            },
            DataSource {
                name: "Sales".to_string(),
                description: Some("Quarterly sales".to_string()),
            },
        ]
    );

    assert_eq!(fetch(&fx.dm, env, FetchDirection::Next).map(|(n, _)| n), Some("Sales".to_string()));
}

#[test]
fn test_drivers_enumeration_is_empty() {
    let fx = Fixture::new();
    let env = fx.dm.alloc_environment(Revision::Legacy).expect("env");

    let mut description = [0u8; 32];
    let mut attributes = [0u8; 32];
    let reply = fx
        .dm
        .drivers(
            env,
            FetchDirection::First,
            Some(&mut description),
            Some(&mut attributes),
        )
        .expect("drivers");
    assert_eq!(reply.status, SqlReturn::NO_DATA);

    let mut one = [0u8; 1];
    assert_eq!(
        fx.dm
            .drivers(env, FetchDirection::Next, Some(&mut description), Some(&mut one)),
        Err(DmError::InvalidBufferLength)
    );
    let record = fx.dm.diagnostic(env, 1).expect("lookup").expect("record");
    assert_eq!(record.sqlstate_str(), "S1090");
}
