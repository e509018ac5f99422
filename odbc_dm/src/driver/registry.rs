use super::{DriverCall, DriverModule, EntryPoint, ModuleLoader, SymbolCache};
use crate::api::{Function, SqlReturn};
use crate::error::{DmError, Result};
use crate::versioning::Revision;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, Weak};

/// A driver module with its symbol cache and the revision it implements.
pub struct LoadedModule {
    module: Box<dyn DriverModule>,
    symbols: SymbolCache,
    revision: Revision,
}

impl LoadedModule {
    /// A module exporting `SQLAllocHandle` implements the current revision.
    pub fn new(module: Box<dyn DriverModule>) -> Self {
        let symbols = SymbolCache::new();
        let revision = match symbols.resolve(module.as_ref(), Function::AllocHandle, Revision::Current)
        {
            Some(_) => Revision::Current,
            None => Revision::Legacy,
        };
        log::debug!("{} implements {}", module.path().display(), revision);
        Self {
            module,
            symbols,
            revision,
        }
    }

    pub fn path(&self) -> &Path {
        self.module.path()
    }

    pub fn revision(&self) -> Revision {
        self.revision
    }

    pub fn library_handle(&self) -> usize {
        self.module.library_handle()
    }

    pub fn symbols(&self) -> &SymbolCache {
        &self.symbols
    }

    pub fn resolve(&self, function: Function) -> Option<EntryPoint> {
        self.symbols
            .resolve(self.module.as_ref(), function, self.revision)
    }

    pub fn supports(&self, function: Function) -> bool {
        self.resolve(function).is_some()
    }

    /// Resolves and invokes. The driver's return code comes back unmodified;
    /// a missing export is `DriverIncomplete`.
    pub fn dispatch(&self, call: DriverCall<'_>) -> Result<SqlReturn> {
        let function = call.function();
        let entry = self
            .resolve(function)
            .ok_or(DmError::DriverIncomplete(function))?;
        log::debug!("Dispatching {} to {}", function, self.path().display());
        // SAFETY: `entry` was located in this module under the symbol for
        // `call.function()`.
        Ok(unsafe { self.module.invoke(entry, call) })
    }

    /// [`dispatch`](Self::dispatch), treating any non-success code as a
    /// driver error.
    pub fn call(&self, call: DriverCall<'_>) -> Result<SqlReturn> {
        let function = call.function();
        let code = self.dispatch(call)?;
        if code.is_success() {
            Ok(code)
        } else {
            Err(DmError::Driver { function, code })
        }
    }
}

/// Shares loaded modules by path. The registry holds weak references only:
/// a module is unloaded once the last environment or connection using it
/// lets go.
pub struct DriverRegistry {
    loader: Box<dyn ModuleLoader>,
    modules: Mutex<HashMap<PathBuf, Weak<LoadedModule>>>,
}

impl DriverRegistry {
    pub fn new(loader: Box<dyn ModuleLoader>) -> Self {
        Self {
            loader,
            modules: Mutex::new(HashMap::new()),
        }
    }

    pub fn load(&self, path: &Path) -> Result<Arc<LoadedModule>> {
        let mut modules = self
            .modules
            .lock()
            .map_err(|_| DmError::InternalError("Failed to lock driver registry".to_string()))?;

        if let Some(module) = modules.get(path).and_then(Weak::upgrade) {
            return Ok(module);
        }

        let module = Arc::new(LoadedModule::new(self.loader.load(path)?));
        modules.retain(|_, module| module.strong_count() > 0);
        modules.insert(path.to_path_buf(), Arc::downgrade(&module));
        Ok(module)
    }

    /// Number of modules currently loaded.
    pub fn loaded(&self) -> usize {
        self.modules
            .lock()
            .map(|modules| modules.values().filter(|m| m.strong_count() > 0).count())
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::DriverHandle;
    use crate::testing::{MockDriver, MockLoader};

    #[test]
    fn test_revision_detection() {
        let current = LoadedModule::new(MockDriver::current().module());
        assert_eq!(current.revision(), Revision::Current);

        let legacy = LoadedModule::new(MockDriver::legacy().module());
        assert_eq!(legacy.revision(), Revision::Legacy);
    }

    #[test]
    fn test_dispatch_missing_export_is_driver_incomplete() {
        let module = LoadedModule::new(MockDriver::legacy().module());
        let result = module.dispatch(DriverCall::Disconnect {
            dbc: DriverHandle::from_raw(1),
        });
        assert!(result.is_ok());

        let mut exists = [0u16; 1];
        let result = module.dispatch(DriverCall::GetFunctions {
            dbc: DriverHandle::from_raw(1),
            function: 45,
            exists: &mut exists,
        });
        assert_eq!(result, Err(DmError::DriverIncomplete(Function::GetFunctions)));
    }

    #[test]
    fn test_call_maps_failure_to_driver_error() {
        let driver = MockDriver::current().failing_connect();
        let module = LoadedModule::new(driver.module());
        let result = module.call(DriverCall::Connect {
            dbc: DriverHandle::from_raw(1),
            dsn: "X",
            uid: "",
            pwd: "",
        });
        assert_eq!(
            result,
            Err(DmError::Driver {
                function: Function::Connect,
                code: SqlReturn::ERROR
            })
        );
    }

    #[test]
    fn test_registry_shares_modules_by_path() {
        let driver = MockDriver::current();
        let loader = MockLoader::new();
        loader.register("/drivers/a.so", driver.clone());
        let registry = DriverRegistry::new(Box::new(loader.clone()));

        let a = registry.load(Path::new("/drivers/a.so")).expect("load");
        let b = registry.load(Path::new("/drivers/a.so")).expect("load");
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(loader.loads(), 1);
        assert_eq!(registry.loaded(), 1);

        drop(a);
        assert_eq!(driver.unloads(), 0);
        drop(b);
        assert_eq!(driver.unloads(), 1);
        assert_eq!(registry.loaded(), 0);

        let _c = registry.load(Path::new("/drivers/a.so")).expect("reload");
        assert_eq!(loader.loads(), 2);
    }

    #[test]
    fn test_registry_load_failure() {
        let registry = DriverRegistry::new(Box::new(MockLoader::new()));
        let result = registry.load(Path::new("/drivers/missing.so"));
        assert!(matches!(result, Err(DmError::DriverLoad { .. })));
    }
}
