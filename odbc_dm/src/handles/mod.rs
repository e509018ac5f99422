pub mod arena;
pub mod state;

use crate::driver::{DriverHandle, LoadedModule};
use crate::engine::enumerator::DataSourceCursor;
use crate::error::{DiagnosticRecord, DmError, Result};
use crate::versioning::{OdbcVersion, Revision};
use std::sync::{Arc, Mutex};

pub use arena::{Arena, HandleId, HandleKind};
pub use state::{ConnectionEvent, ConnectionState};

/// A driver's own environment handle, shared by every connection of one
/// manager environment that selected the same module.
pub struct DriverEnv {
    pub module: Arc<LoadedModule>,
    pub handle: DriverHandle,
    pub connections: usize,
}

pub struct EnvironmentRecord {
    pub revision: Revision,
    pub connections: Vec<HandleId>,
    pub driver_envs: Vec<DriverEnv>,
    pub cursor: DataSourceCursor,
    pub diagnostics: Vec<DiagnosticRecord>,
}

/// The driver side of a connected connection.
pub struct ActiveDriver {
    pub module: Arc<LoadedModule>,
    pub env: DriverHandle,
    pub dbc: DriverHandle,
    /// `SQL_DRIVER_ODBC_VER` as reported right after connecting.
    pub version: Option<OdbcVersion>,
    /// Revision used to talk to the driver: the module's, downgraded when
    /// the driver reports a pre-3.0 version.
    pub revision: Revision,
}

pub struct ConnectionRecord {
    pub env: HandleId,
    pub state: ConnectionState,
    pub driver: Option<ActiveDriver>,
    /// Insertion order.
    pub statements: Vec<HandleId>,
    pub diagnostics: Vec<DiagnosticRecord>,
}

pub struct StatementRecord {
    pub dbc: HandleId,
    pub handle: DriverHandle,
    pub diagnostics: Vec<DiagnosticRecord>,
}

fn invalid(id: HandleId) -> DmError {
    DmError::InvalidHandle(id.to_raw())
}

/// Decodes a handle value received from a caller, checking its kind.
pub fn decode(raw: usize, kind: HandleKind) -> Result<HandleId> {
    HandleId::from_raw(raw)
        .filter(|id| id.kind() == kind)
        .ok_or(DmError::InvalidHandle(raw))
}

pub struct HandleManager {
    environments: Arena<EnvironmentRecord>,
    connections: Arena<ConnectionRecord>,
    statements: Arena<StatementRecord>,
}

impl HandleManager {
    pub fn new() -> Self {
        Self {
            environments: Arena::new(HandleKind::Environment),
            connections: Arena::new(HandleKind::Connection),
            statements: Arena::new(HandleKind::Statement),
        }
    }

    pub fn contains(&self, id: HandleId) -> bool {
        match id.kind() {
            HandleKind::Environment => self.environments.contains(id),
            HandleKind::Connection => self.connections.contains(id),
            HandleKind::Statement => self.statements.contains(id),
        }
    }

    pub fn environment(&self, id: HandleId) -> Result<&EnvironmentRecord> {
        self.environments.get(id).ok_or_else(|| invalid(id))
    }

    pub fn environment_mut(&mut self, id: HandleId) -> Result<&mut EnvironmentRecord> {
        self.environments.get_mut(id).ok_or_else(|| invalid(id))
    }

    pub fn connection(&self, id: HandleId) -> Result<&ConnectionRecord> {
        self.connections.get(id).ok_or_else(|| invalid(id))
    }

    pub fn connection_mut(&mut self, id: HandleId) -> Result<&mut ConnectionRecord> {
        self.connections.get_mut(id).ok_or_else(|| invalid(id))
    }

    pub fn statement(&self, id: HandleId) -> Result<&StatementRecord> {
        self.statements.get(id).ok_or_else(|| invalid(id))
    }

    pub fn diagnostics(&self, id: HandleId) -> Result<&[DiagnosticRecord]> {
        let diagnostics = match id.kind() {
            HandleKind::Environment => &self.environment(id)?.diagnostics,
            HandleKind::Connection => &self.connection(id)?.diagnostics,
            HandleKind::Statement => &self.statement(id)?.diagnostics,
        };
        Ok(diagnostics)
    }

    pub fn diagnostics_mut(&mut self, id: HandleId) -> Result<&mut Vec<DiagnosticRecord>> {
        let diagnostics = match id.kind() {
            HandleKind::Environment => &mut self.environment_mut(id)?.diagnostics,
            HandleKind::Connection => &mut self.connection_mut(id)?.diagnostics,
            HandleKind::Statement => {
                &mut self.statements.get_mut(id).ok_or_else(|| invalid(id))?.diagnostics
            }
        };
        Ok(diagnostics)
    }

    /// Revision requested by the environment that owns `id`.
    pub fn revision_of(&self, id: HandleId) -> Result<Revision> {
        let env = match id.kind() {
            HandleKind::Environment => id,
            HandleKind::Connection => self.connection(id)?.env,
            HandleKind::Statement => self.connection(self.statement(id)?.dbc)?.env,
        };
        Ok(self.environment(env)?.revision)
    }

    pub fn insert_environment(&mut self, revision: Revision) -> HandleId {
        self.environments.insert(EnvironmentRecord {
            revision,
            connections: Vec::new(),
            driver_envs: Vec::new(),
            cursor: DataSourceCursor::default(),
            diagnostics: Vec::new(),
        })
    }

    pub fn insert_connection(&mut self, env: HandleId) -> Result<HandleId> {
        self.environment(env)?;
        let dbc = self.connections.insert(ConnectionRecord {
            env,
            state: ConnectionState::Allocated,
            driver: None,
            statements: Vec::new(),
            diagnostics: Vec::new(),
        });
        self.environment_mut(env)?.connections.push(dbc);
        Ok(dbc)
    }

    pub fn insert_statement(&mut self, dbc: HandleId, handle: DriverHandle) -> Result<HandleId> {
        self.connection(dbc)?;
        let stmt = self.statements.insert(StatementRecord {
            dbc,
            handle,
            diagnostics: Vec::new(),
        });
        self.connection_mut(dbc)?.statements.push(stmt);
        Ok(stmt)
    }

    pub fn remove_environment(&mut self, env: HandleId) -> Result<EnvironmentRecord> {
        self.environments.remove(env).ok_or_else(|| invalid(env))
    }

    pub fn remove_connection(&mut self, dbc: HandleId) -> Result<ConnectionRecord> {
        let record = self.connections.remove(dbc).ok_or_else(|| invalid(dbc))?;
        if let Ok(env) = self.environment_mut(record.env) {
            env.connections.retain(|c| *c != dbc);
        }
        Ok(record)
    }

    pub fn remove_statement(&mut self, stmt: HandleId) -> Result<StatementRecord> {
        let record = self.statements.remove(stmt).ok_or_else(|| invalid(stmt))?;
        if let Ok(dbc) = self.connection_mut(record.dbc) {
            dbc.statements.retain(|s| *s != stmt);
        }
        Ok(record)
    }

    /// Drops every statement record of `dbc`, returning the driver handles in
    /// insertion order.
    pub fn drain_statements(&mut self, dbc: HandleId) -> Result<Vec<DriverHandle>> {
        let ids = std::mem::take(&mut self.connection_mut(dbc)?.statements);
        Ok(ids
            .into_iter()
            .filter_map(|id| self.statements.remove(id))
            .map(|record| record.handle)
            .collect())
    }

    pub fn environment_count(&self) -> usize {
        self.environments.len()
    }

    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    pub fn statement_count(&self) -> usize {
        self.statements.len()
    }
}

impl Default for HandleManager {
    fn default() -> Self {
        Self::new()
    }
}

pub type SharedHandleManager = Arc<Mutex<HandleManager>>;
