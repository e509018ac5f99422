//! Data-source configuration: where odbc.ini lives and how it is read.

pub mod ini;
pub mod memory;

use crate::error::Result;
use std::path::PathBuf;

pub use ini::IniFileStore;
pub use memory::MemoryStore;

/// Section listing data-source names; never a data source itself.
pub const DATA_SOURCES_SECTION: &str = "ODBC Data Sources";
/// Fallback section used when a data source is not configured.
pub const DEFAULT_SECTION: &str = "Default";
pub const DRIVER_KEY: &str = "Driver";
pub const DESCRIPTION_KEY: &str = "Description";

const ODBCINI_ENV: &str = "ODBCINI";
const HOME_ENV: &str = "HOME";
const USER_ODBCINI: &str = ".odbc.ini";
const SYSTEM_ODBCINI: &str = "/etc/odbc.ini";
const LOGGING_ENV: &str = "ODBC_DM_LOGGING";
const DEFAULT_LOGGING: bool = true;

/// Read access to configured data sources.
pub trait ConfigStore: Send + Sync {
    /// Section headers in file order. Fails with `StoreUnreadable` when the
    /// store cannot be opened.
    fn section_names(&self) -> Result<Vec<String>>;

    /// Value of `key` in `section`; both matched case-insensitively.
    fn attribute(&self, section: &str, key: &str) -> Option<String>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManagerConfig {
    pub ini_path: PathBuf,
    pub logging: bool,
}

impl ManagerConfig {
    pub fn new(ini_path: impl Into<PathBuf>) -> Self {
        Self {
            ini_path: ini_path.into(),
            logging: DEFAULT_LOGGING,
        }
    }

    pub fn with_logging(mut self, logging: bool) -> Self {
        self.logging = logging;
        self
    }

    pub fn from_env() -> Self {
        let ini_path = resolve_ini_path(
            std::env::var(ODBCINI_ENV).ok(),
            std::env::var(HOME_ENV).ok(),
        );
        Self {
            ini_path,
            logging: read_logging_from_env().unwrap_or(DEFAULT_LOGGING),
        }
    }

    pub fn store(&self) -> IniFileStore {
        IniFileStore::new(self.ini_path.clone())
    }
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self::from_env()
    }
}

fn resolve_ini_path(odbcini: Option<String>, home: Option<String>) -> PathBuf {
    if let Some(path) = odbcini.filter(|p| !p.is_empty()) {
        return PathBuf::from(path);
    }
    if let Some(home) = home.filter(|h| !h.is_empty()) {
        return PathBuf::from(home).join(USER_ODBCINI);
    }
    PathBuf::from(SYSTEM_ODBCINI)
}

fn parse_bool_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn read_logging_from_env() -> Option<bool> {
    std::env::var(LOGGING_ENV)
        .ok()
        .and_then(|value| parse_bool_flag(&value))
}
