//! Allocation, connection and release of handles.

use super::DriverManager;
use crate::api::{info, SqlReturn};
use crate::config::{DEFAULT_SECTION, DRIVER_KEY};
use crate::driver::{DriverCall, DriverHandle, LoadedModule};
use crate::error::{DmError, Result};
use crate::handles::{
    ActiveDriver, ConnectionEvent, ConnectionState, DriverEnv, HandleId, HandleKind,
};
use crate::versioning::{shim, OdbcVersion, Revision};
use log::Level;
use std::path::Path;
use std::sync::Arc;

impl DriverManager {
    pub fn alloc_environment(&self, revision: Revision) -> Result<HandleId> {
        let env = self.lock()?.insert_environment(revision);
        log::debug!("Allocated environment {:?} for {}", env, revision);
        Ok(env)
    }

    pub fn env_revision(&self, env: HandleId) -> Result<Revision> {
        Ok(self.lock()?.environment(env)?.revision)
    }

    /// Changes the revision an environment's application targets. Only
    /// allowed before any connection is allocated under it.
    pub fn set_env_revision(&self, env: HandleId, revision: Revision) -> Result<()> {
        self.begin(env, HandleKind::Environment)?;
        let result = self.set_env_revision_inner(env, revision);
        self.finish(env, result)
    }

    fn set_env_revision_inner(&self, env: HandleId, revision: Revision) -> Result<()> {
        let mut handles = self.lock()?;
        let record = handles.environment_mut(env)?;
        if !record.connections.is_empty() {
            return Err(DmError::FunctionSequence("environment has allocated connections"));
        }
        record.revision = revision;
        Ok(())
    }

    pub fn free_environment(&self, env: HandleId) -> Result<()> {
        self.begin(env, HandleKind::Environment)?;
        let result = self.free_environment_inner(env);
        self.finish(env, result)
    }

    fn free_environment_inner(&self, env: HandleId) -> Result<()> {
        let record = {
            let mut handles = self.lock()?;
            if !handles.environment(env)?.connections.is_empty() {
                return Err(DmError::FunctionSequence("environment has allocated connections"));
            }
            handles.remove_environment(env)?
        };
        for driver_env in record.driver_envs {
            self.free_driver_handle(&driver_env.module, HandleKind::Environment, driver_env.handle);
        }
        log::debug!("Freed environment {:?}", env);
        Ok(())
    }

    pub fn alloc_connection(&self, env: HandleId) -> Result<HandleId> {
        self.begin(env, HandleKind::Environment)?;
        let result = self.lock().and_then(|mut handles| handles.insert_connection(env));
        self.finish(env, result)
    }

    pub fn free_connection(&self, dbc: HandleId) -> Result<()> {
        self.begin(dbc, HandleKind::Connection)?;
        let result = self.free_connection_inner(dbc);
        self.finish(dbc, result)
    }

    fn free_connection_inner(&self, dbc: HandleId) -> Result<()> {
        let mut handles = self.lock()?;
        if handles.connection(dbc)?.state != ConnectionState::Allocated {
            return Err(DmError::FunctionSequence("connection is still connected"));
        }
        handles.remove_connection(dbc)?;
        Ok(())
    }

    pub fn connection_state(&self, dbc: HandleId) -> Result<ConnectionState> {
        Ok(self.lock()?.connection(dbc)?.state)
    }

    /// Establishes a connection to `dsn`. An empty name selects the
    /// `[Default]` data source; a data source without a `Driver` entry falls
    /// back to the default driver.
    pub fn connect(&self, dbc: HandleId, dsn: &str, uid: &str, pwd: &str) -> Result<SqlReturn> {
        self.begin(dbc, HandleKind::Connection)?;
        let result = self.connect_inner(dbc, dsn, uid, pwd);
        self.finish(dbc, result)
    }

    fn connect_inner(&self, dbc: HandleId, dsn: &str, uid: &str, pwd: &str) -> Result<SqlReturn> {
        let (env, caller) = {
            let handles = self.lock()?;
            let record = handles.connection(dbc)?;
            if record.state != ConnectionState::Allocated {
                return Err(DmError::ConnectionInUse);
            }
            (record.env, handles.environment(record.env)?.revision)
        };

        let dsn = if dsn.is_empty() { DEFAULT_SECTION } else { dsn };
        let path = self
            .store
            .attribute(dsn, DRIVER_KEY)
            .or_else(|| self.store.attribute(DEFAULT_SECTION, DRIVER_KEY))
            .ok_or_else(|| DmError::DataSourceNotFound(dsn.to_string()))?;
        let module = self.registry.load(Path::new(&path))?;

        let driver_env = self.acquire_driver_env(env, &module, caller)?;

        let driver_dbc = match self.alloc_driver_handle(&module, HandleKind::Connection, driver_env) {
            Ok(handle) => handle,
            Err(err) => {
                self.logger.log_rollback("connect", &err);
                self.release_driver_env(env, &module);
                return Err(DmError::DriverConnectionAllocation);
            }
        };

        let rollback = |err: &DmError| {
            self.logger.log_rollback("connect", err);
            self.free_driver_handle(&module, HandleKind::Connection, driver_dbc);
            self.release_driver_env(env, &module);
        };

        let code = module
            .call(DriverCall::Connect {
                dbc: driver_dbc,
                dsn,
                uid,
                pwd,
            })
            .inspect_err(|err| rollback(err))?;

        let version = driver_version(&module, driver_dbc);
        let revision = match version {
            Some(version) if version.revision().is_legacy() => Revision::Legacy,
            _ => module.revision(),
        };

        let attached = self.lock().and_then(|mut handles| {
            let record = handles.connection_mut(dbc)?;
            record.state = record.state.transition(ConnectionEvent::ConnectSucceeded)?;
            record.driver = Some(ActiveDriver {
                module: module.clone(),
                env: driver_env,
                dbc: driver_dbc,
                version,
                revision,
            });
            Ok(())
        });
        if let Err(err) = attached {
            self.abandon_driver_connection(&module, driver_dbc);
            rollback(&err);
            return Err(err);
        }

        self.logger.log_connection(Level::Info, dsn, "established");
        Ok(code)
    }

    /// Closes the driver connection. Statements are released by the
    /// driver's `SQLDisconnect`; the manager drops its records of them.
    pub fn disconnect(&self, dbc: HandleId) -> Result<SqlReturn> {
        self.begin(dbc, HandleKind::Connection)?;
        let result = self.disconnect_inner(dbc);
        self.finish(dbc, result)
    }

    fn disconnect_inner(&self, dbc: HandleId) -> Result<SqlReturn> {
        let (module, driver_dbc, env) = {
            let handles = self.lock()?;
            let record = handles.connection(dbc)?;
            match record.state {
                ConnectionState::Allocated => return Err(DmError::ConnectionNotOpen),
                ConnectionState::Executing | ConnectionState::NeedData => {
                    return Err(DmError::FunctionSequence("an operation is still in progress"))
                }
                ConnectionState::Connected => {}
            }
            let driver = active_driver(record.driver.as_ref())?;
            (driver.module.clone(), driver.dbc, record.env)
        };

        let code = module.call(DriverCall::Disconnect { dbc: driver_dbc })?;

        let dropped = {
            let mut handles = self.lock()?;
            let statements = handles.drain_statements(dbc)?;
            let record = handles.connection_mut(dbc)?;
            record.state = record.state.transition(ConnectionEvent::Disconnect)?;
            record.driver = None;
            statements.len()
        };
        if dropped > 0 {
            log::debug!("Dropped {} statement(s) of {:?}", dropped, dbc);
        }

        self.free_driver_handle(&module, HandleKind::Connection, driver_dbc);
        self.release_driver_env(env, &module);
        self.logger
            .log_connection(Level::Info, &module.path().display().to_string(), "closed");
        Ok(code)
    }

    pub fn alloc_statement(&self, dbc: HandleId) -> Result<HandleId> {
        self.begin(dbc, HandleKind::Connection)?;
        let result = self.alloc_statement_inner(dbc);
        self.finish(dbc, result)
    }

    fn alloc_statement_inner(&self, dbc: HandleId) -> Result<HandleId> {
        let (module, driver_dbc) = {
            let handles = self.lock()?;
            let record = handles.connection(dbc)?;
            match record.state {
                ConnectionState::Allocated => return Err(DmError::ConnectionNotOpen),
                ConnectionState::NeedData => {
                    return Err(DmError::FunctionSequence("data-at-execution in progress"))
                }
                ConnectionState::Connected | ConnectionState::Executing => {}
            }
            let driver = active_driver(record.driver.as_ref())?;
            (driver.module.clone(), driver.dbc)
        };

        let handle = self.alloc_driver_handle(&module, HandleKind::Statement, driver_dbc)?;
        let inserted = self
            .lock()
            .and_then(|mut handles| handles.insert_statement(dbc, handle));
        if inserted.is_err() {
            self.free_driver_handle(&module, HandleKind::Statement, handle);
        }
        inserted
    }

    pub fn free_statement(&self, stmt: HandleId) -> Result<()> {
        self.begin(stmt, HandleKind::Statement)?;
        let result = self.free_statement_inner(stmt);
        self.finish(stmt, result)
    }

    fn free_statement_inner(&self, stmt: HandleId) -> Result<()> {
        let (module, handle) = {
            let handles = self.lock()?;
            let record = handles.statement(stmt)?;
            let driver = active_driver(handles.connection(record.dbc)?.driver.as_ref())?;
            (driver.module.clone(), record.handle)
        };
        module.call(shim::free_call(HandleKind::Statement, module.revision(), handle))?;
        self.lock()?.remove_statement(stmt)?;
        Ok(())
    }

    pub fn begin_execute(&self, dbc: HandleId) -> Result<()> {
        self.transition(dbc, ConnectionEvent::BeginExecute)
    }

    pub fn end_execute(&self, dbc: HandleId) -> Result<()> {
        self.transition(dbc, ConnectionEvent::EndExecute)
    }

    pub fn begin_need_data(&self, dbc: HandleId) -> Result<()> {
        self.transition(dbc, ConnectionEvent::BeginNeedData)
    }

    /// Data-at-execution finished or was cancelled.
    pub fn complete_need_data(&self, dbc: HandleId) -> Result<()> {
        self.transition(dbc, ConnectionEvent::CompleteNeedData)
    }

    fn transition(&self, dbc: HandleId, event: ConnectionEvent) -> Result<()> {
        self.begin(dbc, HandleKind::Connection)?;
        let result = self.lock().and_then(|mut handles| {
            let record = handles.connection_mut(dbc)?;
            record.state = record.state.transition(event)?;
            Ok(())
        });
        self.finish(dbc, result)
    }

    /// The driver environment for `module` under `env`, allocated on first
    /// use and reference-counted by connection.
    fn acquire_driver_env(
        &self,
        env: HandleId,
        module: &Arc<LoadedModule>,
        caller: Revision,
    ) -> Result<DriverHandle> {
        if let Some(handle) = self.share_driver_env(env, module)? {
            return Ok(handle);
        }

        let handle = self
            .alloc_driver_handle(module, HandleKind::Environment, DriverHandle::null())
            .map_err(|err| {
                self.logger.log_rollback("driver environment allocation", &err);
                DmError::DriverEnvAllocation
            })?;
        if let Some(call) = shim::version_call(module.revision(), handle, caller) {
            if let Err(err) = module.call(call) {
                self.logger.log_rollback("driver environment allocation", &err);
                self.free_driver_handle(module, HandleKind::Environment, handle);
                return Err(DmError::DriverEnvAllocation);
            }
        }

        let registered = self.lock().and_then(|mut handles| {
            let record = handles.environment_mut(env)?;
            if let Some(existing) = record
                .driver_envs
                .iter_mut()
                .find(|d| Arc::ptr_eq(&d.module, module))
            {
                existing.connections += 1;
                return Ok(Some(existing.handle));
            }
            record.driver_envs.push(DriverEnv {
                module: module.clone(),
                handle,
                connections: 1,
            });
            Ok(None)
        });
        match registered {
            Ok(None) => Ok(handle),
            Ok(Some(raced)) => {
                self.free_driver_handle(module, HandleKind::Environment, handle);
                Ok(raced)
            }
            Err(err) => {
                self.free_driver_handle(module, HandleKind::Environment, handle);
                Err(err)
            }
        }
    }

    fn share_driver_env(
        &self,
        env: HandleId,
        module: &Arc<LoadedModule>,
    ) -> Result<Option<DriverHandle>> {
        let mut handles = self.lock()?;
        let record = handles.environment_mut(env)?;
        Ok(record
            .driver_envs
            .iter_mut()
            .find(|d| Arc::ptr_eq(&d.module, module))
            .map(|existing| {
                existing.connections += 1;
                existing.handle
            }))
    }

    fn release_driver_env(&self, env: HandleId, module: &Arc<LoadedModule>) {
        let released = self.lock().ok().and_then(|mut handles| {
            let record = handles.environment_mut(env).ok()?;
            let position = record
                .driver_envs
                .iter()
                .position(|d| Arc::ptr_eq(&d.module, module))?;
            let entry = &mut record.driver_envs[position];
            entry.connections = entry.connections.saturating_sub(1);
            (entry.connections == 0).then(|| record.driver_envs.remove(position))
        });
        if let Some(driver_env) = released {
            self.free_driver_handle(&driver_env.module, HandleKind::Environment, driver_env.handle);
        }
    }

    fn alloc_driver_handle(
        &self,
        module: &LoadedModule,
        kind: HandleKind,
        input: DriverHandle,
    ) -> Result<DriverHandle> {
        let mut output = DriverHandle::null();
        module.call(shim::alloc_call(kind, module.revision(), input, &mut output))?;
        Ok(output)
    }

    /// Disconnects a driver connection the manager failed to record. Returns
    /// whether the driver accepted the disconnect; a refusal is logged.
    fn abandon_driver_connection(&self, module: &LoadedModule, dbc: DriverHandle) -> bool {
        match module.call(DriverCall::Disconnect { dbc }) {
            Ok(_) => true,
            Err(err) => {
                self.logger.log_rollback("driver disconnect", &err);
                false
            }
        }
    }

    fn free_driver_handle(&self, module: &LoadedModule, kind: HandleKind, handle: DriverHandle) {
        if let Err(err) = module.call(shim::free_call(kind, module.revision(), handle)) {
            log::warn!("Releasing driver {:?} handle failed: {}", kind, err);
        }
    }
}

pub(super) fn active_driver(driver: Option<&ActiveDriver>) -> Result<&ActiveDriver> {
    driver.ok_or_else(|| DmError::InternalError("connected without a driver".to_string()))
}

/// `SQL_DRIVER_ODBC_VER` of a freshly connected driver, if it reports one.
fn driver_version(module: &LoadedModule, dbc: DriverHandle) -> Option<OdbcVersion> {
    let mut buf = [0u8; 16];
    let mut length = 0i16;
    let code = module
        .dispatch(DriverCall::GetInfo {
            dbc,
            info_type: info::SQL_DRIVER_ODBC_VER,
            value: Some(&mut buf),
            length: &mut length,
        })
        .ok()?;
    if !code.is_success() {
        return None;
    }
    let end = buf.iter().position(|b| *b == 0).unwrap_or(buf.len());
    OdbcVersion::parse(std::str::from_utf8(&buf[..end]).ok()?)
}
