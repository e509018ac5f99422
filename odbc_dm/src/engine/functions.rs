//! `SQLGetFunctions`: the driver's own answer when it exports one, symbol
//! probing otherwise, with the manager's functions laid over the result.

use super::lifecycle::active_driver;
use super::DriverManager;
use crate::api::{
    Function, FunctionBitmap, SqlReturn, CATALOG, LEGACY_ALL_FUNCTIONS_SIZE,
    SQL_API_ALL_FUNCTIONS, SQL_API_ODBC3_ALL_FUNCTIONS, SQL_API_ODBC3_ALL_FUNCTIONS_SIZE,
};
use crate::driver::{DriverCall, DriverHandle, LoadedModule};
use crate::error::{DmError, Result};
use crate::handles::{ConnectionState, HandleId, HandleKind};
use crate::versioning::shim::{self, FunctionProbe};
use crate::versioning::Revision;
use std::sync::Arc;

/// Bitmap built by resolving every catalog function in `module`.
pub fn probe_bitmap(module: &LoadedModule) -> FunctionBitmap {
    let mut bitmap = FunctionBitmap::new();
    for function in CATALOG {
        bitmap.set(function.id(), module.supports(function));
    }
    bitmap
}

/// The legacy 100-entry form, one `u16` flag per raw identifier.
pub fn probe_legacy_array(module: &LoadedModule, exists: &mut [u16]) {
    for (id, slot) in exists.iter_mut().take(LEGACY_ALL_FUNCTIONS_SIZE).enumerate() {
        let supported = u16::try_from(id)
            .ok()
            .and_then(Function::from_id)
            .is_some_and(|function| module.supports(function));
        *slot = u16::from(supported);
    }
}

/// Marks what the manager serves regardless of the driver's answer.
pub fn overlay_bitmap(bitmap: &mut FunctionBitmap, caller: Revision, driver: Revision) {
    for function in shim::MANAGER_FUNCTIONS {
        bitmap.set(function.id(), true);
    }
    if caller == Revision::Current {
        for function in shim::MANAGER_ENV_FUNCTIONS {
            bitmap.set(function.id(), true);
        }
    }
    if driver == Revision::Legacy {
        for function in shim::LEGACY_DRIVER_EMULATED {
            bitmap.set(function.id(), true);
        }
        if bitmap.is_set(Function::BindParameter.id()) {
            bitmap.set(Function::BindParam.id(), true);
        }
    }
}

pub fn overlay_legacy_array(exists: &mut [u16]) {
    for function in shim::MANAGER_FUNCTIONS {
        if let Some(slot) = exists.get_mut(usize::from(function.id())) {
            *slot = 1;
        }
    }
}

struct Target {
    module: Arc<LoadedModule>,
    dbc: DriverHandle,
    caller: Revision,
    driver: Revision,
}

impl DriverManager {
    /// `function` is a single identifier, `SQL_API_ALL_FUNCTIONS` (100
    /// flags) or `SQL_API_ODBC3_ALL_FUNCTIONS` (250-word bitmap). A missing
    /// output buffer succeeds without doing anything.
    pub fn get_functions(
        &self,
        dbc: HandleId,
        function: u16,
        exists: Option<&mut [u16]>,
    ) -> Result<SqlReturn> {
        self.begin(dbc, HandleKind::Connection)?;
        let result = self.get_functions_inner(dbc, function, exists);
        self.finish(dbc, result)
    }

    fn get_functions_inner(
        &self,
        dbc: HandleId,
        function: u16,
        exists: Option<&mut [u16]>,
    ) -> Result<SqlReturn> {
        let target = self.function_target(dbc)?;
        let Some(exists) = exists else {
            return Ok(SqlReturn::SUCCESS);
        };

        match function {
            SQL_API_ALL_FUNCTIONS => self.legacy_array(&target, exists),
            SQL_API_ODBC3_ALL_FUNCTIONS if target.caller == Revision::Current => {
                self.current_bitmap(&target, exists)
            }
            id => {
                let slot = exists.first_mut().ok_or(DmError::InvalidBufferLength)?;
                self.single(&target, id, slot)
            }
        }
    }

    /// Whether the connected driver supports `function`, as an application
    /// of the environment's revision would be told.
    pub fn supports_function(&self, dbc: HandleId, function: Function) -> Result<bool> {
        let mut exists = [0u16; 1];
        self.get_functions(dbc, function.id(), Some(&mut exists))?;
        Ok(exists[0] != 0)
    }

    /// Every supported function as a bitmap. Legacy environments get the
    /// 100-entry answer widened to a bitmap.
    pub fn supported_functions(&self, dbc: HandleId) -> Result<FunctionBitmap> {
        if self.lock()?.revision_of(dbc)? == Revision::Current {
            let mut words = [0u16; SQL_API_ODBC3_ALL_FUNCTIONS_SIZE];
            self.get_functions(dbc, SQL_API_ODBC3_ALL_FUNCTIONS, Some(&mut words))?;
            return Ok(FunctionBitmap::from_words(&words));
        }

        let mut flags = [0u16; LEGACY_ALL_FUNCTIONS_SIZE];
        self.get_functions(dbc, SQL_API_ALL_FUNCTIONS, Some(&mut flags))?;
        Ok(widen(&flags))
    }

    fn function_target(&self, dbc: HandleId) -> Result<Target> {
        let handles = self.lock()?;
        let record = handles.connection(dbc)?;
        if matches!(
            record.state,
            ConnectionState::Allocated | ConnectionState::NeedData
        ) {
            return Err(DmError::FunctionSequence("connection is not ready"));
        }
        let driver = active_driver(record.driver.as_ref())?;
        Ok(Target {
            module: driver.module.clone(),
            dbc: driver.dbc,
            caller: handles.environment(record.env)?.revision,
            driver: driver.revision,
        })
    }

    fn single(&self, target: &Target, id: u16, slot: &mut u16) -> Result<SqlReturn> {
        let id = match shim::plan_single(id, target.caller, target.driver)? {
            FunctionProbe::Answer(supported) => {
                *slot = u16::from(supported);
                return Ok(SqlReturn::SUCCESS);
            }
            FunctionProbe::Forward(id) => id,
        };

        if target.module.supports(Function::GetFunctions) {
            let code = target.module.dispatch(DriverCall::GetFunctions {
                dbc: target.dbc,
                function: id,
                exists: std::slice::from_mut(slot),
            })?;
            return Self::forwarded(Function::GetFunctions, code);
        }

        let supported = Function::from_id(shim::probe_alias(id))
            .is_some_and(|function| target.module.supports(function));
        *slot = u16::from(supported);
        Ok(SqlReturn::SUCCESS)
    }

    fn legacy_array(&self, target: &Target, exists: &mut [u16]) -> Result<SqlReturn> {
        let exists = exists
            .get_mut(..LEGACY_ALL_FUNCTIONS_SIZE)
            .ok_or(DmError::InvalidBufferLength)?;

        let status = if target.module.supports(Function::GetFunctions) {
            let code = target.module.dispatch(DriverCall::GetFunctions {
                dbc: target.dbc,
                function: SQL_API_ALL_FUNCTIONS,
                exists: &mut *exists,
            })?;
            Self::forwarded(Function::GetFunctions, code)?
        } else {
            probe_legacy_array(&target.module, exists);
            SqlReturn::SUCCESS
        };

        overlay_legacy_array(exists);
        Ok(status)
    }

    fn current_bitmap(&self, target: &Target, exists: &mut [u16]) -> Result<SqlReturn> {
        let exists = exists
            .get_mut(..SQL_API_ODBC3_ALL_FUNCTIONS_SIZE)
            .ok_or(DmError::InvalidBufferLength)?;

        let (mut bitmap, status) = if !target.module.supports(Function::GetFunctions) {
            (probe_bitmap(&target.module), SqlReturn::SUCCESS)
        } else if target.driver == Revision::Legacy {
            // Legacy drivers only know the 100-entry form.
            let mut flags = [0u16; LEGACY_ALL_FUNCTIONS_SIZE];
            let code = target.module.dispatch(DriverCall::GetFunctions {
                dbc: target.dbc,
                function: SQL_API_ALL_FUNCTIONS,
                exists: &mut flags,
            })?;
            (widen(&flags), Self::forwarded(Function::GetFunctions, code)?)
        } else {
            let code = target.module.dispatch(DriverCall::GetFunctions {
                dbc: target.dbc,
                function: SQL_API_ODBC3_ALL_FUNCTIONS,
                exists: &mut *exists,
            })?;
            let status = Self::forwarded(Function::GetFunctions, code)?;
            (FunctionBitmap::from_words(exists), status)
        };

        overlay_bitmap(&mut bitmap, target.caller, target.driver);
        bitmap.write_to(exists);
        Ok(status)
    }
}

fn widen(flags: &[u16]) -> FunctionBitmap {
    let mut bitmap = FunctionBitmap::new();
    for (id, flag) in flags.iter().enumerate() {
        if let Ok(id) = u16::try_from(id) {
            bitmap.set(id, *flag != 0);
        }
    }
    bitmap
}
