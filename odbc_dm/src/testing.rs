//! In-process driver modules for tests. A [`MockDriver`] records every call
//! it receives and hands out fake handles; [`MockLoader`] serves registered
//! mocks by path in place of shared libraries.

use crate::api::{
    info, Function, FunctionBitmap, SqlReturn, LEGACY_ALL_FUNCTIONS_SIZE, SQL_API_ALL_FUNCTIONS,
    SQL_API_ODBC3_ALL_FUNCTIONS, SQL_DROP,
};
use crate::driver::{DriverCall, DriverHandle, DriverModule, EntryPoint, ModuleLoader};
use crate::engine::buffer::copy_str;
use crate::error::{DmError, Result};
use crate::handles::HandleKind;
use crate::versioning::Revision;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

const CURRENT_EXPORTS: [Function; 17] = [
    Function::AllocHandle,
    Function::FreeHandle,
    Function::SetEnvAttr,
    Function::Connect,
    Function::Disconnect,
    Function::GetInfo,
    Function::FreeStmt,
    Function::Prepare,
    Function::Execute,
    Function::ExecDirect,
    Function::Fetch,
    Function::BindCol,
    Function::GetData,
    Function::SetConnectAttr,
    Function::GetConnectAttr,
    Function::GetDiagRec,
    Function::EndTran,
];

const LEGACY_EXPORTS: [Function; 18] = [
    Function::AllocEnv,
    Function::AllocConnect,
    Function::AllocStmt,
    Function::FreeEnv,
    Function::FreeConnect,
    Function::FreeStmt,
    Function::Connect,
    Function::Disconnect,
    Function::GetInfo,
    Function::Prepare,
    Function::Execute,
    Function::ExecDirect,
    Function::Fetch,
    Function::BindCol,
    Function::GetData,
    Function::Error,
    Function::Transact,
    Function::SetConnectOption,
];

const FIRST_HANDLE: usize = 0x1000;

#[derive(Debug)]
struct LiveHandle {
    kind: HandleKind,
    parent: usize,
}

#[derive(Debug)]
struct State {
    revision: Revision,
    exports: Vec<String>,
    lookups: HashMap<String, usize>,
    info: HashMap<u16, String>,
    failing_info: HashSet<u16>,
    failing_alloc: HashSet<HandleKind>,
    failing_connect: bool,
    native_functions: Option<FunctionBitmap>,
    calls: Vec<String>,
    live: HashMap<usize, LiveHandle>,
    next_handle: usize,
}

/// A scriptable driver. Clones share state, so a test keeps one clone and
/// inspects what the manager did with the other.
#[derive(Debug, Clone)]
pub struct MockDriver {
    state: Arc<Mutex<State>>,
    unloads: Arc<AtomicUsize>,
}

impl MockDriver {
    /// Reported for `SQL_DRIVER_HLIB`.
    pub const LIBRARY_HANDLE: usize = 0xd11b;

    /// An ODBC 3 driver exporting the core set, reporting `03.51`.
    pub fn current() -> Self {
        Self::bare(Revision::Current)
            .exporting(&CURRENT_EXPORTS)
            .with_info(info::SQL_DRIVER_ODBC_VER, "03.51")
            .with_info(info::SQL_DRIVER_NAME, "libmockodbc.so")
            .with_info(info::SQL_DRIVER_VER, "01.02.0003")
    }

    /// An ODBC 2 driver exporting the legacy core set, reporting `02.50`.
    pub fn legacy() -> Self {
        Self::bare(Revision::Legacy)
            .exporting(&LEGACY_EXPORTS)
            .with_info(info::SQL_DRIVER_ODBC_VER, "02.50")
            .with_info(info::SQL_DRIVER_NAME, "libmockodbc2.so")
            .with_info(info::SQL_DRIVER_VER, "01.00.0001")
    }

    /// Exports nothing; symbol names follow `revision`.
    pub fn bare(revision: Revision) -> Self {
        Self {
            state: Arc::new(Mutex::new(State {
                revision,
                exports: Vec::new(),
                lookups: HashMap::new(),
                info: HashMap::new(),
                failing_info: HashSet::new(),
                failing_alloc: HashSet::new(),
                failing_connect: false,
                native_functions: None,
                calls: Vec::new(),
                live: HashMap::new(),
                next_handle: FIRST_HANDLE,
            })),
            unloads: Arc::new(AtomicUsize::new(0)),
        }
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn exporting(self, functions: &[Function]) -> Self {
        {
            let mut state = self.state();
            let revision = state.revision;
            for function in functions {
                let symbol = function.symbol_name(revision).to_string();
                if !state.exports.contains(&symbol) {
                    state.exports.push(symbol);
                }
            }
        }
        self
    }

    pub fn hiding(self, functions: &[Function]) -> Self {
        {
            let mut state = self.state();
            let revision = state.revision;
            for function in functions {
                let symbol = function.symbol_name(revision);
                state.exports.retain(|s| s != symbol);
            }
        }
        self
    }

    pub fn with_info(self, info_type: u16, value: &str) -> Self {
        self.state().info.insert(info_type, value.to_string());
        self
    }

    pub fn failing_info(self, info_type: u16) -> Self {
        self.state().failing_info.insert(info_type);
        self
    }

    pub fn failing_alloc(self, kind: HandleKind) -> Self {
        self.state().failing_alloc.insert(kind);
        self
    }

    pub fn failing_connect(self) -> Self {
        self.state().failing_connect = true;
        self
    }

    /// Exports `SQLGetFunctions`, answering that exactly `functions` exist.
    pub fn with_native_functions(self, functions: &[Function]) -> Self {
        let mut bitmap = FunctionBitmap::new();
        for function in functions {
            bitmap.set(function.id(), true);
        }
        self.state().native_functions = Some(bitmap);
        self.exporting(&[Function::GetFunctions])
    }

    /// Times the manager asked the module for `symbol`.
    pub fn lookups(&self, symbol: &str) -> usize {
        self.state().lookups.get(symbol).copied().unwrap_or(0)
    }

    /// Calls received, in order, as `SQLName(argument)`.
    pub fn calls(&self) -> Vec<String> {
        self.state().calls.clone()
    }

    /// Driver handles allocated and not yet released.
    pub fn live_handles(&self) -> usize {
        self.state().live.len()
    }

    /// Modules created from this driver that have been dropped.
    pub fn unloads(&self) -> usize {
        self.unloads.load(Ordering::SeqCst)
    }

    pub fn module(&self) -> Box<dyn DriverModule> {
        self.module_at(Path::new("/drivers/mock.so"))
    }

    fn module_at(&self, path: &Path) -> Box<dyn DriverModule> {
        Box::new(MockModule {
            driver: self.clone(),
            path: path.to_path_buf(),
        })
    }
}

struct MockModule {
    driver: MockDriver,
    path: PathBuf,
}

impl Drop for MockModule {
    fn drop(&mut self) {
        self.driver.unloads.fetch_add(1, Ordering::SeqCst);
    }
}

impl State {
    fn allocate(&mut self, kind: HandleKind, parent: DriverHandle) -> Option<DriverHandle> {
        if self.failing_alloc.contains(&kind) {
            return None;
        }
        let raw = self.next_handle;
        self.next_handle += 0x10;
        self.live.insert(
            raw,
            LiveHandle {
                kind,
                parent: parent.as_raw(),
            },
        );
        Some(DriverHandle::from_raw(raw))
    }

    fn release(&mut self, handle: DriverHandle) -> SqlReturn {
        match self.live.remove(&handle.as_raw()) {
            Some(_) => SqlReturn::SUCCESS,
            None => SqlReturn::INVALID_HANDLE,
        }
    }

    fn release_statements(&mut self, dbc: DriverHandle) {
        self.live
            .retain(|_, h| !(h.kind == HandleKind::Statement && h.parent == dbc.as_raw()));
    }

    fn get_functions(&self, function: u16, exists: &mut [u16]) -> SqlReturn {
        let Some(bitmap) = &self.native_functions else {
            return SqlReturn::ERROR;
        };
        match function {
            SQL_API_ALL_FUNCTIONS => {
                for (id, slot) in exists.iter_mut().take(LEGACY_ALL_FUNCTIONS_SIZE).enumerate() {
                    *slot = u16::from(bitmap.is_set(id as u16));
                }
            }
            SQL_API_ODBC3_ALL_FUNCTIONS => bitmap.write_to(exists),
            id => {
                if let Some(slot) = exists.first_mut() {
                    *slot = u16::from(bitmap.is_set(id));
                }
            }
        }
        SqlReturn::SUCCESS
    }
}

fn allocated(output: &mut DriverHandle, handle: Option<DriverHandle>) -> SqlReturn {
    match handle {
        Some(handle) => {
            *output = handle;
            SqlReturn::SUCCESS
        }
        None => SqlReturn::ERROR,
    }
}

impl DriverModule for MockModule {
    fn path(&self) -> &Path {
        &self.path
    }

    fn library_handle(&self) -> usize {
        MockDriver::LIBRARY_HANDLE
    }

    fn locate(&self, symbol: &str) -> Option<EntryPoint> {
        let mut state = self.driver.state();
        *state.lookups.entry(symbol.to_string()).or_insert(0) += 1;
        state
            .exports
            .iter()
            .position(|s| s == symbol)
            .map(|index| EntryPoint(index + 1))
    }

    unsafe fn invoke(&self, _entry: EntryPoint, call: DriverCall<'_>) -> SqlReturn {
        let mut state = self.driver.state();
        match call {
            DriverCall::AllocHandle {
                kind,
                input,
                output,
            } => {
                state.calls.push(format!("SQLAllocHandle({})", kind.to_sql()));
                let handle = state.allocate(kind, input);
                allocated(output, handle)
            }
            DriverCall::AllocEnv { output } => {
                state.calls.push("SQLAllocEnv".to_string());
                let handle = state.allocate(HandleKind::Environment, DriverHandle::null());
                allocated(output, handle)
            }
            DriverCall::AllocConnect { env, output } => {
                state.calls.push("SQLAllocConnect".to_string());
                let handle = state.allocate(HandleKind::Connection, env);
                allocated(output, handle)
            }
            DriverCall::AllocStmt { dbc, output } => {
                state.calls.push("SQLAllocStmt".to_string());
                let handle = state.allocate(HandleKind::Statement, dbc);
                allocated(output, handle)
            }
            DriverCall::SetEnvAttr {
                attribute, value, ..
            } => {
                state
                    .calls
                    .push(format!("SQLSetEnvAttr({}={})", attribute, value));
                SqlReturn::SUCCESS
            }
            DriverCall::Connect { dsn, .. } => {
                state.calls.push(format!("SQLConnect({})", dsn));
                if state.failing_connect {
                    SqlReturn::ERROR
                } else {
                    SqlReturn::SUCCESS
                }
            }
            DriverCall::Disconnect { dbc } => {
                state.calls.push("SQLDisconnect".to_string());
                state.release_statements(dbc);
                SqlReturn::SUCCESS
            }
            DriverCall::FreeHandle { kind, handle } => {
                state.calls.push(format!("SQLFreeHandle({})", kind.to_sql()));
                state.release(handle)
            }
            DriverCall::FreeEnv { env } => {
                state.calls.push("SQLFreeEnv".to_string());
                state.release(env)
            }
            DriverCall::FreeConnect { dbc } => {
                state.calls.push("SQLFreeConnect".to_string());
                state.release(dbc)
            }
            DriverCall::FreeStmt { stmt, option } => {
                state.calls.push(format!("SQLFreeStmt({})", option));
                if option == SQL_DROP {
                    state.release(stmt)
                } else {
                    SqlReturn::SUCCESS
                }
            }
            DriverCall::GetInfo {
                info_type,
                value,
                length,
                ..
            } => {
                state.calls.push(format!("SQLGetInfo({})", info_type));
                if state.failing_info.contains(&info_type) {
                    return SqlReturn::ERROR;
                }
                match state.info.get(&info_type) {
                    Some(text) => {
                        let copied = copy_str(text, value);
                        *length = i16::try_from(copied.length).unwrap_or(i16::MAX);
                        SqlReturn::success_or_info(copied.truncated)
                    }
                    None => SqlReturn::ERROR,
                }
            }
            DriverCall::GetFunctions {
                function, exists, ..
            } => {
                state.calls.push(format!("SQLGetFunctions({})", function));
                state.get_functions(function, exists)
            }
        }
    }
}

/// Loads `.env` from the working directory once, so integration tests can
/// pick up `RUST_LOG` and `ODBCINI` overrides.
#[cfg(feature = "test-helpers")]
pub fn load_dotenv() {
    static LOADED: std::sync::Once = std::sync::Once::new();
    LOADED.call_once(|| {
        let _ = dotenvy::dotenv();
    });
}

/// Serves registered [`MockDriver`]s by path. Clones share registrations.
#[derive(Debug, Clone, Default)]
pub struct MockLoader {
    drivers: Arc<Mutex<HashMap<PathBuf, MockDriver>>>,
    loads: Arc<AtomicUsize>,
}

impl MockLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, path: impl AsRef<Path>, driver: MockDriver) {
        self.drivers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(path.as_ref().to_path_buf(), driver);
    }

    /// Modules handed out so far.
    pub fn loads(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }
}

impl ModuleLoader for MockLoader {
    fn load(&self, path: &Path) -> Result<Box<dyn DriverModule>> {
        let drivers = self.drivers.lock().unwrap_or_else(PoisonError::into_inner);
        let driver = drivers.get(path).ok_or_else(|| DmError::DriverLoad {
            path: path.display().to_string(),
            reason: "no mock driver registered".to_string(),
        })?;
        self.loads.fetch_add(1, Ordering::SeqCst);
        Ok(driver.module_at(path))
    }
}
