//! The driver manager: handle validation, diagnostics, and the operations
//! forwarded to drivers.

pub mod buffer;
pub mod enumerator;
pub mod functions;
pub mod info;
pub mod lifecycle;

use crate::api::{Function, SqlReturn};
use crate::config::{ConfigStore, ManagerConfig};
use crate::driver::{DriverRegistry, LibraryLoader, ModuleLoader};
use crate::error::{DiagnosticRecord, DmError, Result, StructuredError};
use crate::handles::{HandleId, HandleKind, HandleManager, SharedHandleManager};
use crate::observability::StructuredLogger;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

pub use enumerator::{DataSource, DataSourceCursor, DataSourceList, FetchReply};
pub use info::InfoReply;

pub struct DriverManager {
    handles: SharedHandleManager,
    registry: DriverRegistry,
    store: Arc<dyn ConfigStore>,
    logger: StructuredLogger,
}

impl DriverManager {
    /// Manager reading odbc.ini from `config` and loading drivers as shared
    /// libraries.
    pub fn new(config: ManagerConfig) -> Self {
        let logger = StructuredLogger::new(config.logging);
        Self::with_parts(Arc::new(config.store()), Box::new(LibraryLoader)).with_logger(logger)
    }

    pub fn with_parts(store: Arc<dyn ConfigStore>, loader: Box<dyn ModuleLoader>) -> Self {
        Self {
            handles: Arc::new(Mutex::new(HandleManager::new())),
            registry: DriverRegistry::new(loader),
            store,
            logger: StructuredLogger::default(),
        }
    }

    pub fn with_logger(mut self, logger: StructuredLogger) -> Self {
        self.logger = logger;
        self
    }

    pub fn get_handles(&self) -> SharedHandleManager {
        self.handles.clone()
    }

    pub fn registry(&self) -> &DriverRegistry {
        &self.registry
    }

    fn lock(&self) -> Result<MutexGuard<'_, HandleManager>> {
        self.handles
            .lock()
            .map_err(|_| DmError::InternalError("Failed to lock handles mutex".to_string()))
    }

    /// Validates `id` as a live handle of `kind` and clears its diagnostics.
    /// A mismatched kind is rejected before anything is touched.
    fn begin(&self, id: HandleId, kind: HandleKind) -> Result<()> {
        if id.kind() != kind {
            return Err(DmError::InvalidHandle(id.to_raw()));
        }
        let mut handles = self.lock()?;
        handles.diagnostics_mut(id)?.clear();
        Ok(())
    }

    /// Records the diagnostic for a failed call on `id`.
    fn finish<T>(&self, id: HandleId, result: Result<T>) -> Result<T> {
        if let Err(err) = &result {
            self.record(id, err);
        }
        result
    }

    fn record(&self, id: HandleId, err: &DmError) {
        if let Some(record) = err.to_record() {
            let mut metadata = HashMap::new();
            metadata.insert("handle".to_string(), format!("{:?}", id));
            self.logger.log_error(err, &metadata);
            self.post(id, record);
        }
    }

    /// Adds a record (typically a warning) to `id`'s diagnostics.
    fn post(&self, id: HandleId, record: DiagnosticRecord) {
        if let Ok(mut handles) = self.lock() {
            if let Ok(diagnostics) = handles.diagnostics_mut(id) {
                diagnostics.push(record);
            }
        }
    }

    /// A forwarded call's return code as the caller sees it: `SQL_ERROR`
    /// surfaces as a driver error, anything else passes through.
    fn forwarded(function: Function, code: SqlReturn) -> Result<SqlReturn> {
        if code == SqlReturn::ERROR {
            Err(DmError::Driver { function, code })
        } else {
            Ok(code)
        }
    }

    /// Fails a call on `id` with `err` after validating the handle. Used for
    /// argument errors detected before a typed operation can be invoked.
    pub fn reject(&self, id: HandleId, kind: HandleKind, err: DmError) -> DmError {
        if let Err(invalid) = self.begin(id, kind) {
            return invalid;
        }
        self.record(id, &err);
        err
    }

    /// Diagnostics queued on `id` by its most recent call, rendered for the
    /// owning environment's revision. Reading does not clear them.
    pub fn diagnostics(&self, id: HandleId) -> Result<Vec<StructuredError>> {
        let handles = self.lock()?;
        let revision = handles.revision_of(id)?;
        Ok(handles
            .diagnostics(id)?
            .iter()
            .map(|record| record.render(revision))
            .collect())
    }

    /// The `number`th diagnostic record (1-based), if any.
    pub fn diagnostic(&self, id: HandleId, number: usize) -> Result<Option<StructuredError>> {
        let diagnostics = self.diagnostics(id)?;
        Ok(number
            .checked_sub(1)
            .and_then(|index| diagnostics.into_iter().nth(index)))
    }
}
