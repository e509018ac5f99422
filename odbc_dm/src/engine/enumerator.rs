//! `SQLDataSources` / `SQLDrivers`: first/next iteration over configured data
//! sources. Each environment keeps its own cursor.

use super::buffer::copy_str;
use super::DriverManager;
use crate::api::{FetchDirection, SqlReturn};
use crate::config::{ConfigStore, DATA_SOURCES_SECTION, DEFAULT_SECTION, DESCRIPTION_KEY};
use crate::error::{DiagnosticRecord, DmError, Result};
use crate::handles::{HandleId, HandleKind};

/// Upper bound on names collected from one read of the store.
pub const MAX_DATA_SOURCES: usize = 1024;

const RESERVED_SECTIONS: [&str; 2] = [DATA_SOURCES_SECTION, DEFAULT_SECTION];

/// Data source names from the store's section headers: reserved sections
/// dropped (exact match), duplicates kept, sorted case-insensitively with
/// letters folded to upper case.
pub fn collect_data_sources(sections: Vec<String>) -> Vec<String> {
    let mut names: Vec<String> = sections
        .into_iter()
        .filter(|name| !RESERVED_SECTIONS.contains(&name.as_str()))
        .take(MAX_DATA_SOURCES)
        .collect();
    names.sort_by_cached_key(|name| name.to_ascii_uppercase());
    names
}

/// Enumeration state of one environment. The position stays in
/// `[0, names.len()]`; reaching the end reports exhaustion and wraps to 0.
#[derive(Debug, Default, Clone)]
pub struct DataSourceCursor {
    names: Vec<String>,
    position: usize,
    active: bool,
}

impl DataSourceCursor {
    pub fn restart(&mut self, names: Vec<String>) {
        self.names = names;
        self.position = 0;
        self.active = true;
    }

    /// Empties the list but stays active: `Next` keeps reporting exhaustion
    /// until `First` reads the store again.
    pub fn exhaust(&mut self) {
        self.restart(Vec::new());
    }

    /// Whether enumeration has started since the environment was created.
    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn advance(&mut self) -> Option<String> {
        match self.names.get(self.position) {
            Some(name) => {
                self.position += 1;
                Some(name.clone())
            }
            None => {
                self.position = 0;
                None
            }
        }
    }

    pub fn position(&self) -> usize {
        self.position
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataSource {
    pub name: String,
    pub description: Option<String>,
}

/// A caller-owned snapshot of the configured data sources, independent of
/// any environment's cursor.
pub struct DataSourceList<'a> {
    store: &'a dyn ConfigStore,
    names: std::vec::IntoIter<String>,
}

impl<'a> DataSourceList<'a> {
    pub fn load(store: &'a dyn ConfigStore) -> Result<Self> {
        let names = collect_data_sources(store.section_names()?);
        Ok(Self {
            store,
            names: names.into_iter(),
        })
    }
}

impl Iterator for DataSourceList<'_> {
    type Item = DataSource;

    fn next(&mut self) -> Option<DataSource> {
        let name = self.names.next()?;
        let description = self.store.attribute(&name, DESCRIPTION_KEY);
        Some(DataSource { name, description })
    }
}

/// Status of one fetch with the untruncated lengths of what was returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchReply {
    pub status: SqlReturn,
    pub name_length: usize,
    pub description_length: usize,
}

impl FetchReply {
    fn exhausted() -> Self {
        Self {
            status: SqlReturn::NO_DATA,
            name_length: 0,
            description_length: 0,
        }
    }
}

impl DriverManager {
    /// Fetches the next data source name and its `Description`. `First`
    /// re-reads the store; an unreadable store reports `NO_DATA`.
    pub fn data_sources(
        &self,
        env: HandleId,
        direction: FetchDirection,
        name: Option<&mut [u8]>,
        description: Option<&mut [u8]>,
    ) -> Result<FetchReply> {
        self.begin(env, HandleKind::Environment)?;
        let result = self.data_sources_inner(env, direction, name, description);
        self.finish(env, result)
    }

    fn data_sources_inner(
        &self,
        env: HandleId,
        direction: FetchDirection,
        name: Option<&mut [u8]>,
        description: Option<&mut [u8]>,
    ) -> Result<FetchReply> {
        let restart =
            direction == FetchDirection::First || !self.lock()?.environment(env)?.cursor.is_active();

        if restart {
            match self.store.section_names() {
                Ok(sections) => {
                    let names = collect_data_sources(sections);
                    log::debug!("Read {} data source(s) for {:?}", names.len(), env);
                    self.lock()?.environment_mut(env)?.cursor.restart(names);
                }
                Err(err) => {
                    log::debug!("Data source store unavailable: {}", err);
                    self.lock()?.environment_mut(env)?.cursor.exhaust();
                    return Ok(FetchReply::exhausted());
                }
            }
        }

        let Some(current) = self.lock()?.environment_mut(env)?.cursor.advance() else {
            return Ok(FetchReply::exhausted());
        };
        let text = self
            .store
            .attribute(&current, DESCRIPTION_KEY)
            .unwrap_or_default();

        let copied_name = copy_str(&current, name);
        let copied_description = copy_str(&text, description);
        let warned = copied_name.truncated || copied_description.truncated;
        if warned {
            self.post(env, DiagnosticRecord::truncated());
        }
        Ok(FetchReply {
            status: SqlReturn::success_or_info(warned),
            name_length: copied_name.length,
            description_length: copied_description.length,
        })
    }

    /// Installed-driver enumeration is not backed by a registry: apart from
    /// the buffer checks every call reports exhaustion.
    pub fn drivers(
        &self,
        env: HandleId,
        _direction: FetchDirection,
        description: Option<&mut [u8]>,
        attributes: Option<&mut [u8]>,
    ) -> Result<FetchReply> {
        self.begin(env, HandleKind::Environment)?;
        let result = self.drivers_inner(env, description, attributes);
        self.finish(env, result)
    }

    fn drivers_inner(
        &self,
        env: HandleId,
        description: Option<&mut [u8]>,
        attributes: Option<&mut [u8]>,
    ) -> Result<FetchReply> {
        if attributes.as_ref().is_some_and(|buf| buf.len() == 1) {
            return Err(DmError::InvalidBufferLength);
        }

        let degenerate = |buf: &Option<&mut [u8]>| buf.as_ref().map_or(true, |b| b.is_empty());
        if degenerate(&description) || degenerate(&attributes) {
            self.post(env, DiagnosticRecord::truncated());
            return Ok(FetchReply {
                status: SqlReturn::SUCCESS_WITH_INFO,
                name_length: 0,
                description_length: 0,
            });
        }
        Ok(FetchReply::exhausted())
    }
}
