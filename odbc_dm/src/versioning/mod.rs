pub mod revision;
pub mod shim;

pub use revision::{OdbcVersion, Revision, SQL_OV_ODBC2, SQL_OV_ODBC3};
pub use shim::{FunctionProbe, ManagerInfo};
