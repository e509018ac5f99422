use super::{DriverModule, EntryPoint};
use crate::api::Function;
use crate::versioning::Revision;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::RwLock;

/// Per-module memo of resolved entry points. Only successes are stored; a
/// miss is asked of the module again next time.
pub struct SymbolCache {
    entries: RwLock<HashMap<Function, EntryPoint>>,
    lookups: AtomicUsize,
}

impl SymbolCache {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            lookups: AtomicUsize::new(0),
        }
    }

    pub fn resolve(
        &self,
        module: &dyn DriverModule,
        function: Function,
        revision: Revision,
    ) -> Option<EntryPoint> {
        if let Some(entry) = self.cached(function) {
            return Some(entry);
        }

        let symbol = function.symbol_name(revision);
        self.lookups.fetch_add(1, Ordering::Relaxed);
        let entry = module.locate(symbol);
        match entry {
            Some(entry) => {
                log::debug!("Resolved {} in {}", symbol, module.path().display());
                // A racing resolver may have inserted first; both found the
                // same export.
                if let Ok(mut entries) = self.entries.write() {
                    entries.entry(function).or_insert(entry);
                }
            }
            None => log::debug!("{} not exported by {}", symbol, module.path().display()),
        }
        entry
    }

    pub fn cached(&self, function: Function) -> Option<EntryPoint> {
        self.entries
            .read()
            .ok()
            .and_then(|entries| entries.get(&function).copied())
    }

    /// Number of times the module was asked to locate a symbol.
    pub fn lookups(&self) -> usize {
        self.lookups.load(Ordering::Relaxed)
    }

    pub fn len(&self) -> usize {
        self.entries.read().map(|entries| entries.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for SymbolCache {
    fn default() -> Self {
        Self::new()
    }
}
