use crate::api::Function;
use crate::error::DmError;
use log::Level;
use std::collections::HashMap;

/// Manager-level events routed through the `log` facade. Per-call tracing of
/// symbol resolution and dispatch is logged directly at `debug`.
pub struct StructuredLogger {
    enabled: bool,
}

impl StructuredLogger {
    pub fn new(enabled: bool) -> Self {
        Self { enabled }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn log_connection(&self, level: Level, dsn: &str, action: &str) {
        if !self.enabled {
            return;
        }

        log::log!(level, "Connection {}: DSN={}", action, dsn);
    }

    /// A driver failure the manager answered on the driver's behalf.
    pub fn log_substitution(&self, function: Function, item: u16, replacement: &str) {
        if !self.enabled {
            return;
        }

        log::warn!(
            "{} failed for item {}; substituting \"{}\"",
            function,
            item,
            replacement
        );
    }

    /// Undoing the allocations of a failed call.
    pub fn log_rollback(&self, operation: &str, cause: &DmError) {
        if !self.enabled {
            return;
        }

        log::warn!("Rolling back {}: {}", operation, cause);
    }

    pub fn log_error(&self, error: &DmError, metadata: &HashMap<String, String>) {
        if !self.enabled {
            return;
        }

        let mut message = format!("Error: {}", error);
        let mut keys: Vec<_> = metadata.keys().collect();
        keys.sort();
        for key in keys {
            message.push_str(&format!(", {}={}", key, metadata[key]));
        }

        log::error!("{}", message);
    }
}

impl Default for StructuredLogger {
    fn default() -> Self {
        Self::new(true)
    }
}
