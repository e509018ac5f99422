//! Shared-library driver modules. Every foreign call into a driver goes
//! through [`LibraryModule::invoke`].

use super::{DriverCall, DriverHandle, DriverModule, EntryPoint, ModuleLoader};
use crate::api::SqlReturn;
use crate::error::{DmError, Result};
use libloading::Library;
use std::ffi::c_void;
use std::path::{Path, PathBuf};

type SqlHandle = *mut c_void;

type AllocHandleFn = unsafe extern "C" fn(i16, SqlHandle, *mut SqlHandle) -> i16;
type AllocEnvFn = unsafe extern "C" fn(*mut SqlHandle) -> i16;
type AllocChildFn = unsafe extern "C" fn(SqlHandle, *mut SqlHandle) -> i16;
type SetEnvAttrFn = unsafe extern "C" fn(SqlHandle, i32, *mut c_void, i32) -> i16;
type ConnectFn =
    unsafe extern "C" fn(SqlHandle, *const u8, i16, *const u8, i16, *const u8, i16) -> i16;
type HandleFn = unsafe extern "C" fn(SqlHandle) -> i16;
type FreeHandleFn = unsafe extern "C" fn(i16, SqlHandle) -> i16;
type FreeStmtFn = unsafe extern "C" fn(SqlHandle, u16) -> i16;
type GetInfoFn = unsafe extern "C" fn(SqlHandle, u16, *mut c_void, i16, *mut i16) -> i16;
type GetFunctionsFn = unsafe extern "C" fn(SqlHandle, u16, *mut u16) -> i16;

fn as_handle(handle: DriverHandle) -> SqlHandle {
    handle.as_raw() as SqlHandle
}

fn short_len(len: usize) -> i16 {
    i16::try_from(len).unwrap_or(i16::MAX)
}

pub struct LibraryModule {
    path: PathBuf,
    library: Library,
    hlib: usize,
}

impl LibraryModule {
    pub fn open(path: &Path) -> Result<Self> {
        // SAFETY: loading a driver runs its initializers; the manager trusts
        // the modules named by the configuration store.
        let library = unsafe { Library::new(path) }.map_err(|e| DmError::DriverLoad {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        let (library, hlib) = raw_library_handle(library);
        log::info!("Loaded driver module {}", path.display());
        Ok(Self {
            path: path.to_path_buf(),
            library,
            hlib,
        })
    }
}

#[cfg(unix)]
fn raw_library_handle(library: Library) -> (Library, usize) {
    let unix: libloading::os::unix::Library = library.into();
    let raw = unix.into_raw();
    // SAFETY: `raw` was produced by `into_raw` just above.
    let unix = unsafe { libloading::os::unix::Library::from_raw(raw) };
    (unix.into(), raw as usize)
}

#[cfg(not(unix))]
fn raw_library_handle(library: Library) -> (Library, usize) {
    (library, 0)
}

impl DriverModule for LibraryModule {
    fn path(&self) -> &Path {
        &self.path
    }

    fn library_handle(&self) -> usize {
        self.hlib
    }

    fn locate(&self, symbol: &str) -> Option<EntryPoint> {
        // SAFETY: the symbol is only read as an address here; its signature is
        // applied in `invoke`.
        unsafe {
            self.library
                .get::<unsafe extern "C" fn()>(symbol.as_bytes())
                .ok()
                .map(|f| EntryPoint(*f as usize))
        }
    }

    unsafe fn invoke(&self, entry: EntryPoint, call: DriverCall<'_>) -> SqlReturn {
        let addr = entry.0;
        let rc = match call {
            DriverCall::AllocHandle {
                kind,
                input,
                output,
            } => {
                let f = std::mem::transmute::<usize, AllocHandleFn>(addr);
                let mut raw: SqlHandle = std::ptr::null_mut();
                let rc = f(kind.to_sql(), as_handle(input), &mut raw);
                *output = DriverHandle::from_raw(raw as usize);
                rc
            }
            DriverCall::AllocEnv { output } => {
                let f = std::mem::transmute::<usize, AllocEnvFn>(addr);
                let mut raw: SqlHandle = std::ptr::null_mut();
                let rc = f(&mut raw);
                *output = DriverHandle::from_raw(raw as usize);
                rc
            }
            DriverCall::AllocConnect { env: parent, output }
            | DriverCall::AllocStmt {
                dbc: parent,
                output,
            } => {
                let f = std::mem::transmute::<usize, AllocChildFn>(addr);
                let mut raw: SqlHandle = std::ptr::null_mut();
                let rc = f(as_handle(parent), &mut raw);
                *output = DriverHandle::from_raw(raw as usize);
                rc
            }
            DriverCall::SetEnvAttr {
                env,
                attribute,
                value,
            } => {
                let f = std::mem::transmute::<usize, SetEnvAttrFn>(addr);
                f(as_handle(env), attribute, value as *mut c_void, 0)
            }
            DriverCall::Connect { dbc, dsn, uid, pwd } => {
                let f = std::mem::transmute::<usize, ConnectFn>(addr);
                f(
                    as_handle(dbc),
                    dsn.as_ptr(),
                    short_len(dsn.len()),
                    uid.as_ptr(),
                    short_len(uid.len()),
                    pwd.as_ptr(),
                    short_len(pwd.len()),
                )
            }
            DriverCall::Disconnect { dbc: handle }
            | DriverCall::FreeEnv { env: handle }
            | DriverCall::FreeConnect { dbc: handle } => {
                let f = std::mem::transmute::<usize, HandleFn>(addr);
                f(as_handle(handle))
            }
            DriverCall::FreeHandle { kind, handle } => {
                let f = std::mem::transmute::<usize, FreeHandleFn>(addr);
                f(kind.to_sql(), as_handle(handle))
            }
            DriverCall::FreeStmt { stmt, option } => {
                let f = std::mem::transmute::<usize, FreeStmtFn>(addr);
                f(as_handle(stmt), option)
            }
            DriverCall::GetInfo {
                dbc,
                info_type,
                value,
                length,
            } => {
                let f = std::mem::transmute::<usize, GetInfoFn>(addr);
                let (ptr, cap) = match value {
                    Some(buf) => (buf.as_mut_ptr() as *mut c_void, short_len(buf.len())),
                    None => (std::ptr::null_mut(), 0),
                };
                f(as_handle(dbc), info_type, ptr, cap, length)
            }
            DriverCall::GetFunctions {
                dbc,
                function,
                exists,
            } => {
                let f = std::mem::transmute::<usize, GetFunctionsFn>(addr);
                f(as_handle(dbc), function, exists.as_mut_ptr())
            }
        };
        SqlReturn(rc)
    }
}

impl Drop for LibraryModule {
    fn drop(&mut self) {
        log::info!("Unloading driver module {}", self.path.display());
    }
}

/// Loads driver modules from shared libraries.
#[derive(Debug, Default, Clone, Copy)]
pub struct LibraryLoader;

impl ModuleLoader for LibraryLoader {
    fn load(&self, path: &Path) -> Result<Box<dyn DriverModule>> {
        Ok(Box::new(LibraryModule::open(path)?))
    }
}
