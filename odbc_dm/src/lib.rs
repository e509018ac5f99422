pub mod api;
pub mod config;
pub mod driver;
pub mod engine;
pub mod error;
pub mod ffi;
pub mod handles;
pub mod observability;
#[cfg(any(test, feature = "test-helpers"))]
pub mod testing;
pub mod versioning;

pub use api::{FetchDirection, Function, FunctionBitmap, SqlReturn};
pub use config::{ConfigStore, IniFileStore, ManagerConfig, MemoryStore};
pub use driver::{DriverModule, LibraryLoader, ModuleLoader};
pub use engine::{DataSource, DataSourceList, DriverManager, FetchReply, InfoReply};
pub use error::{DmError, Result, StructuredError};
pub use handles::{ConnectionState, HandleId, HandleKind};
pub use versioning::{OdbcVersion, Revision};
