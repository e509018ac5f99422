//! Translation between the legacy (ODBC 2) and current (ODBC 3) call-level
//! API revisions.

use crate::api::{info, Function, SQL_ATTR_ODBC_VERSION, SQL_DROP, SQL_EXT_API_LAST};
use crate::driver::{DriverCall, DriverHandle};
use crate::error::{DmError, Result};
use crate::handles::HandleKind;
use crate::versioning::Revision;

/// A current-only function and the legacy function serving it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Mapping {
    pub current: Function,
    pub legacy: Function,
}

const fn map(current: Function, legacy: Function) -> Mapping {
    Mapping { current, legacy }
}

pub const MAPPINGS: [Mapping; 12] = [
    map(Function::AllocHandle, Function::AllocConnect),
    map(Function::FreeHandle, Function::FreeConnect),
    map(Function::SetConnectAttr, Function::SetConnectOption),
    map(Function::GetConnectAttr, Function::GetConnectOption),
    map(Function::SetStmtAttr, Function::SetStmtOption),
    map(Function::GetStmtAttr, Function::GetStmtOption),
    map(Function::EndTran, Function::Transact),
    map(Function::FetchScroll, Function::ExtendedFetch),
    map(Function::GetDiagRec, Function::Error),
    map(Function::GetDiagField, Function::Error),
    map(Function::BulkOperations, Function::SetPos),
    map(Function::BindParam, Function::BindParameter),
];

/// Functions reported as supported for a legacy driver without probing: the
/// manager emulates them on top of the driver's ODBC 2 entry points.
pub const LEGACY_DRIVER_EMULATED: [Function; 12] = [
    Function::AllocHandle,
    Function::FreeHandle,
    Function::SetConnectAttr,
    Function::GetConnectAttr,
    Function::GetStmtAttr,
    Function::SetStmtAttr,
    Function::ColAttributes,
    Function::EndTran,
    Function::BulkOperations,
    Function::FetchScroll,
    Function::GetDiagRec,
    Function::GetDiagField,
];

/// Answered by the manager for every caller.
pub const MANAGER_FUNCTIONS: [Function; 2] = [Function::DataSources, Function::Drivers];

/// Answered by the manager for ODBC 3 callers; environment attributes live in
/// the manager's environment handle.
pub const MANAGER_ENV_FUNCTIONS: [Function; 2] = [Function::GetEnvAttr, Function::SetEnvAttr];

pub fn to_legacy(function: Function) -> Option<Function> {
    MAPPINGS
        .iter()
        .find(|m| m.current == function)
        .map(|m| m.legacy)
}

pub fn to_current(function: Function) -> Option<Function> {
    MAPPINGS
        .iter()
        .find(|m| m.legacy == function)
        .map(|m| m.current)
}

pub fn is_emulated_for_legacy_driver(function: Function) -> bool {
    LEGACY_DRIVER_EMULATED.contains(&function)
}

/// Legacy aliases resolved before a symbol probe when the driver cannot
/// answer `SQLGetFunctions` itself.
pub fn probe_alias(id: u16) -> u16 {
    if id == Function::SetParam.id() {
        Function::BindParameter.id()
    } else {
        id
    }
}

/// Outcome of translating a single-function capability query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FunctionProbe {
    /// Answered without consulting the driver.
    Answer(bool),
    /// Ask the driver (natively or by symbol probe) about this identifier.
    Forward(u16),
}

/// Decides how `SQLGetFunctions(id)` is answered for a caller of revision
/// `caller` talking to a driver of revision `driver`.
pub fn plan_single(id: u16, caller: Revision, driver: Revision) -> Result<FunctionProbe> {
    let function = Function::from_id(id);

    if caller == Revision::Current && function.is_some_and(|f| MANAGER_ENV_FUNCTIONS.contains(&f))
    {
        return Ok(FunctionProbe::Answer(true));
    }

    let mut id = id;
    let current_only = function.map_or(id > SQL_EXT_API_LAST, Function::is_current_only);
    if caller == Revision::Legacy && current_only {
        id = function
            .and_then(to_legacy)
            .map(Function::id)
            .ok_or(DmError::FunctionTypeOutOfRange(id))?;
    }

    if driver == Revision::Legacy {
        match Function::from_id(id) {
            Some(f) if is_emulated_for_legacy_driver(f) => return Ok(FunctionProbe::Answer(true)),
            Some(Function::BindParam) => id = Function::BindParameter.id(),
            _ if id > SQL_EXT_API_LAST => return Ok(FunctionProbe::Answer(false)),
            _ => {}
        }
    }

    if Function::from_id(id).is_some_and(|f| MANAGER_FUNCTIONS.contains(&f)) {
        return Ok(FunctionProbe::Answer(true));
    }

    Ok(FunctionProbe::Forward(id))
}

/// `SQLGetInfo` items the manager answers from its own state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ManagerInfo {
    /// `SQL_ODBC_VER`: the manager's revision literal.
    OdbcVersion,
    DriverConnection,
    DriverEnvironment,
    DriverLibrary,
    /// The caller's statement handle is read from the value buffer.
    DriverStatement,
}

pub fn manager_info(info_type: u16) -> Option<ManagerInfo> {
    match info_type {
        info::SQL_ODBC_VER => Some(ManagerInfo::OdbcVersion),
        info::SQL_DRIVER_HDBC => Some(ManagerInfo::DriverConnection),
        info::SQL_DRIVER_HENV => Some(ManagerInfo::DriverEnvironment),
        info::SQL_DRIVER_HLIB => Some(ManagerInfo::DriverLibrary),
        info::SQL_DRIVER_HSTMT => Some(ManagerInfo::DriverStatement),
        _ => None,
    }
}

/// Allocation call for `kind`: `SQLAllocHandle` on a current driver,
/// `SQLAllocEnv`/`SQLAllocConnect`/`SQLAllocStmt` on a legacy one.
pub fn alloc_call(
    kind: HandleKind,
    driver: Revision,
    input: DriverHandle,
    output: &mut DriverHandle,
) -> DriverCall<'_> {
    match (driver, kind) {
        (Revision::Current, kind) => DriverCall::AllocHandle {
            kind,
            input,
            output,
        },
        (Revision::Legacy, HandleKind::Environment) => DriverCall::AllocEnv { output },
        (Revision::Legacy, HandleKind::Connection) => DriverCall::AllocConnect { env: input, output },
        (Revision::Legacy, HandleKind::Statement) => DriverCall::AllocStmt { dbc: input, output },
    }
}

/// Release call matching [`alloc_call`].
pub fn free_call(kind: HandleKind, driver: Revision, handle: DriverHandle) -> DriverCall<'static> {
    match (driver, kind) {
        (Revision::Current, kind) => DriverCall::FreeHandle { kind, handle },
        (Revision::Legacy, HandleKind::Environment) => DriverCall::FreeEnv { env: handle },
        (Revision::Legacy, HandleKind::Connection) => DriverCall::FreeConnect { dbc: handle },
        (Revision::Legacy, HandleKind::Statement) => DriverCall::FreeStmt {
            stmt: handle,
            option: SQL_DROP,
        },
    }
}

/// Tells a current driver which revision the application expects. Legacy
/// drivers have no such attribute.
pub fn version_call(driver: Revision, env: DriverHandle, caller: Revision) -> Option<DriverCall<'static>> {
    match driver {
        Revision::Current => Some(DriverCall::SetEnvAttr {
            env,
            attribute: SQL_ATTR_ODBC_VERSION,
            value: caller.odbc_version() as usize,
        }),
        Revision::Legacy => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mapping_is_bidirectional() {
        assert_eq!(to_legacy(Function::EndTran), Some(Function::Transact));
        assert_eq!(to_current(Function::Transact), Some(Function::EndTran));
        assert_eq!(to_legacy(Function::BindParam), Some(Function::BindParameter));
        assert_eq!(to_current(Function::BindParameter), Some(Function::BindParam));
        assert_eq!(to_legacy(Function::GetInfo), None);
    }

    #[test]
    fn test_every_mapping_targets_a_legacy_function() {
        for m in MAPPINGS {
            assert!(m.current.is_current_only(), "{} should be current-only", m.current);
            assert!(!m.legacy.is_current_only(), "{} should be legacy", m.legacy);
        }
    }

    #[test]
    fn test_manager_env_functions_for_current_caller() {
        let plan = plan_single(Function::GetEnvAttr.id(), Revision::Current, Revision::Current);
        assert_eq!(plan, Ok(FunctionProbe::Answer(true)));
    }

    #[test]
    fn test_manager_functions_for_any_caller() {
        for caller in [Revision::Legacy, Revision::Current] {
            for driver in [Revision::Legacy, Revision::Current] {
                assert_eq!(
                    plan_single(Function::DataSources.id(), caller, driver),
                    Ok(FunctionProbe::Answer(true))
                );
                assert_eq!(
                    plan_single(Function::Drivers.id(), caller, driver),
                    Ok(FunctionProbe::Answer(true))
                );
            }
        }
    }

    #[test]
    fn test_legacy_driver_emulated_set_short_circuits() {
        for f in LEGACY_DRIVER_EMULATED {
            assert_eq!(
                plan_single(f.id(), Revision::Current, Revision::Legacy),
                Ok(FunctionProbe::Answer(true)),
                "{}",
                f
            );
        }
    }

    #[test]
    fn test_bind_param_rewritten_for_legacy_driver() {
        assert_eq!(
            plan_single(Function::BindParam.id(), Revision::Current, Revision::Legacy),
            Ok(FunctionProbe::Forward(Function::BindParameter.id()))
        );
    }

    #[test]
    fn test_unmapped_current_function_unsupported_by_legacy_driver() {
        assert_eq!(
            plan_single(Function::CopyDesc.id(), Revision::Current, Revision::Legacy),
            Ok(FunctionProbe::Answer(false))
        );
    }

    #[test]
    fn test_current_driver_forwards_unmodified() {
        assert_eq!(
            plan_single(Function::CopyDesc.id(), Revision::Current, Revision::Current),
            Ok(FunctionProbe::Forward(Function::CopyDesc.id()))
        );
    }

    #[test]
    fn test_legacy_caller_maps_current_only_ids() {
        for m in MAPPINGS {
            assert_eq!(
                plan_single(m.current.id(), Revision::Legacy, Revision::Current),
                Ok(FunctionProbe::Forward(m.legacy.id())),
                "{}",
                m.current
            );
        }
    }

    #[test]
    fn test_legacy_caller_bulk_operations_maps_to_set_pos() {
        // BulkOperations sits inside the legacy id range but is still current-only.
        assert_eq!(
            plan_single(Function::BulkOperations.id(), Revision::Legacy, Revision::Current),
            Ok(FunctionProbe::Forward(Function::SetPos.id()))
        );
        assert_eq!(
            plan_single(Function::BulkOperations.id(), Revision::Current, Revision::Current),
            Ok(FunctionProbe::Forward(Function::BulkOperations.id()))
        );
    }

    #[test]
    fn test_legacy_caller_unmapped_id_out_of_range() {
        assert_eq!(
            plan_single(Function::CopyDesc.id(), Revision::Legacy, Revision::Current),
            Err(DmError::FunctionTypeOutOfRange(Function::CopyDesc.id()))
        );
        assert_eq!(
            plan_single(Function::GetEnvAttr.id(), Revision::Legacy, Revision::Legacy),
            Err(DmError::FunctionTypeOutOfRange(Function::GetEnvAttr.id()))
        );
    }

    #[test]
    fn test_probe_alias() {
        assert_eq!(probe_alias(Function::SetParam.id()), Function::BindParameter.id());
        assert_eq!(probe_alias(Function::GetInfo.id()), Function::GetInfo.id());
    }

    #[test]
    fn test_manager_info() {
        assert_eq!(manager_info(info::SQL_ODBC_VER), Some(ManagerInfo::OdbcVersion));
        assert_eq!(manager_info(info::SQL_DRIVER_HSTMT), Some(ManagerInfo::DriverStatement));
        assert_eq!(manager_info(info::SQL_DRIVER_ODBC_VER), None);
        assert_eq!(manager_info(info::SQL_DRIVER_NAME), None);
    }

    #[test]
    fn test_alloc_call_per_revision() {
        let mut out = DriverHandle::null();
        let call = alloc_call(HandleKind::Statement, Revision::Legacy, DriverHandle::from_raw(7), &mut out);
        assert_eq!(call.function(), Function::AllocStmt);

        let mut out = DriverHandle::null();
        let call = alloc_call(HandleKind::Statement, Revision::Current, DriverHandle::from_raw(7), &mut out);
        assert_eq!(call.function(), Function::AllocHandle);
    }

    #[test]
    fn test_free_call_per_revision() {
        let h = DriverHandle::from_raw(9);
        assert_eq!(free_call(HandleKind::Environment, Revision::Legacy, h).function(), Function::FreeEnv);
        assert_eq!(free_call(HandleKind::Connection, Revision::Legacy, h).function(), Function::FreeConnect);
        assert_eq!(free_call(HandleKind::Statement, Revision::Legacy, h).function(), Function::FreeStmt);
        assert_eq!(free_call(HandleKind::Connection, Revision::Current, h).function(), Function::FreeHandle);
    }

    #[test]
    fn test_version_call_only_for_current_driver() {
        let env = DriverHandle::from_raw(1);
        assert!(version_call(Revision::Legacy, env, Revision::Current).is_none());
        let call = version_call(Revision::Current, env, Revision::Legacy).expect("call");
        assert_eq!(call.function(), Function::SetEnvAttr);
    }
}
