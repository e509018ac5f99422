//! Shared fixtures: a manager wired to mock drivers through an in-memory
//! configuration store.
#![allow(dead_code)]

use odbc_dm::testing::{load_dotenv, MockDriver, MockLoader};
use odbc_dm::{DriverManager, HandleId, MemoryStore, Revision};
use std::sync::Arc;

pub const SALES_DSN: &str = "Sales";
pub const SALES_DRIVER: &str = "/opt/drivers/libsales.so";
pub const LEGACY_DSN: &str = "Archive";
pub const LEGACY_DRIVER: &str = "/opt/drivers/libarchive.so";

pub fn init_logging() {
    load_dotenv();
    let _ = env_logger::builder().is_test(true).try_init();
}

pub struct Fixture {
    pub dm: DriverManager,
    pub store: MemoryStore,
    pub current: MockDriver,
    pub legacy: MockDriver,
}

impl Fixture {
    pub fn new() -> Self {
        Self::with_drivers(MockDriver::current(), MockDriver::legacy())
    }

    pub fn with_drivers(current: MockDriver, legacy: MockDriver) -> Self {
        init_logging();
        let store = MemoryStore::new()
            .with_section("ODBC Data Sources", &[(SALES_DSN, "Sales"), (LEGACY_DSN, "Archive")])
            .with_section(
                SALES_DSN,
                &[("Driver", SALES_DRIVER), ("Description", "Quarterly sales")],
            )
            .with_section(
                LEGACY_DSN,
                &[("Driver", LEGACY_DRIVER), ("Description", "Pre-2010 archive")],
            );
        let loader = MockLoader::new();
        loader.register(SALES_DRIVER, current.clone());
        loader.register(LEGACY_DRIVER, legacy.clone());
        let dm = DriverManager::with_parts(Arc::new(store.clone()), Box::new(loader));
        Self {
            dm,
            store,
            current,
            legacy,
        }
    }

    /// A connection to `dsn` under a fresh environment of `revision`.
    pub fn connect(&self, dsn: &str, revision: Revision) -> (HandleId, HandleId) {
        let env = self.dm.alloc_environment(revision).expect("alloc env");
        let dbc = self.dm.alloc_connection(env).expect("alloc dbc");
        self.dm.connect(dbc, dsn, "scott", "tiger").expect("connect");
        (env, dbc)
    }

    /// Disconnects and frees both handles.
    pub fn teardown(&self, env: HandleId, dbc: HandleId) {
        self.dm.disconnect(dbc).expect("disconnect");
        self.dm.free_connection(dbc).expect("free dbc");
        self.dm.free_environment(env).expect("free env");
    }
}

/// The NUL-terminated prefix of `buf` as text.
pub fn c_str(buf: &[u8]) -> String {
    let end = buf.iter().position(|b| *b == 0).unwrap_or(buf.len());
    String::from_utf8_lossy(&buf[..end]).into_owned()
}
