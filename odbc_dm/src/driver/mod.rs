//! The boundary between the manager and a loaded driver module.

pub mod library;
pub mod registry;
pub mod symbols;

use crate::api::{Function, SqlReturn};
use crate::error::Result;
use crate::handles::HandleKind;
use std::path::Path;

pub use library::{LibraryLoader, LibraryModule};
pub use registry::{DriverRegistry, LoadedModule};
pub use symbols::SymbolCache;

/// Address of a resolved driver export.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EntryPoint(pub usize);

/// Opaque driver-side handle (`SQLHENV`/`SQLHDBC`/`SQLHSTMT` as the driver
/// handed it out).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct DriverHandle(usize);

impl DriverHandle {
    pub fn null() -> Self {
        Self(0)
    }

    pub fn from_raw(raw: usize) -> Self {
        Self(raw)
    }

    pub fn as_raw(self) -> usize {
        self.0
    }

    pub fn is_null(self) -> bool {
        self.0 == 0
    }
}

/// One forwarded call with its arguments. Output arguments borrow caller
/// memory for the duration of the call.
#[derive(Debug)]
pub enum DriverCall<'a> {
    AllocHandle {
        kind: HandleKind,
        input: DriverHandle,
        output: &'a mut DriverHandle,
    },
    AllocEnv {
        output: &'a mut DriverHandle,
    },
    AllocConnect {
        env: DriverHandle,
        output: &'a mut DriverHandle,
    },
    AllocStmt {
        dbc: DriverHandle,
        output: &'a mut DriverHandle,
    },
    SetEnvAttr {
        env: DriverHandle,
        attribute: i32,
        value: usize,
    },
    Connect {
        dbc: DriverHandle,
        dsn: &'a str,
        uid: &'a str,
        pwd: &'a str,
    },
    Disconnect {
        dbc: DriverHandle,
    },
    FreeHandle {
        kind: HandleKind,
        handle: DriverHandle,
    },
    FreeEnv {
        env: DriverHandle,
    },
    FreeConnect {
        dbc: DriverHandle,
    },
    FreeStmt {
        stmt: DriverHandle,
        option: u16,
    },
    GetInfo {
        dbc: DriverHandle,
        info_type: u16,
        value: Option<&'a mut [u8]>,
        length: &'a mut i16,
    },
    GetFunctions {
        dbc: DriverHandle,
        function: u16,
        exists: &'a mut [u16],
    },
}

impl DriverCall<'_> {
    pub fn function(&self) -> Function {
        match self {
            DriverCall::AllocHandle { .. } => Function::AllocHandle,
            DriverCall::AllocEnv { .. } => Function::AllocEnv,
            DriverCall::AllocConnect { .. } => Function::AllocConnect,
            DriverCall::AllocStmt { .. } => Function::AllocStmt,
            DriverCall::SetEnvAttr { .. } => Function::SetEnvAttr,
            DriverCall::Connect { .. } => Function::Connect,
            DriverCall::Disconnect { .. } => Function::Disconnect,
            DriverCall::FreeHandle { .. } => Function::FreeHandle,
            DriverCall::FreeEnv { .. } => Function::FreeEnv,
            DriverCall::FreeConnect { .. } => Function::FreeConnect,
            DriverCall::FreeStmt { .. } => Function::FreeStmt,
            DriverCall::GetInfo { .. } => Function::GetInfo,
            DriverCall::GetFunctions { .. } => Function::GetFunctions,
        }
    }
}

/// A loaded driver. Implementations must be shareable across connections.
pub trait DriverModule: Send + Sync {
    fn path(&self) -> &Path;

    /// Value reported for `SQL_DRIVER_HLIB`.
    fn library_handle(&self) -> usize;

    /// Looks up an export by symbol name. Never cached here.
    fn locate(&self, symbol: &str) -> Option<EntryPoint>;

    /// Calls `entry` with the arguments carried by `call`.
    ///
    /// # Safety
    ///
    /// `entry` must have been returned by [`DriverModule::locate`] on this
    /// module for the symbol matching `call.function()`.
    unsafe fn invoke(&self, entry: EntryPoint, call: DriverCall<'_>) -> SqlReturn;
}

/// Turns a driver path from the configuration store into a loaded module.
pub trait ModuleLoader: Send + Sync {
    fn load(&self, path: &Path) -> Result<Box<dyn DriverModule>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_driver_handle_null() {
        assert!(DriverHandle::null().is_null());
        assert!(DriverHandle::default().is_null());
        assert_eq!(DriverHandle::from_raw(42).as_raw(), 42);
    }

    #[test]
    fn test_call_function() {
        let mut length = 0i16;
        let call = DriverCall::GetInfo {
            dbc: DriverHandle::from_raw(1),
            info_type: 6,
            value: None,
            length: &mut length,
        };
        assert_eq!(call.function(), Function::GetInfo);

        let call = DriverCall::Connect {
            dbc: DriverHandle::from_raw(1),
            dsn: "A",
            uid: "",
            pwd: "",
        };
        assert_eq!(call.function(), Function::Connect);
    }
}
