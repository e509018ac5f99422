//! Call-level API vocabulary shared by the manager, drivers and the C ABI.

pub mod function;

use std::fmt;

pub use function::{
    Function, FunctionBitmap, CATALOG, LEGACY_ALL_FUNCTIONS_SIZE, SQL_API_ALL_FUNCTIONS,
    SQL_API_ODBC3_ALL_FUNCTIONS, SQL_API_ODBC3_ALL_FUNCTIONS_SIZE, SQL_EXT_API_LAST,
};

/// Return code of a call-level operation. Kept as the raw `SQLRETURN` value so
/// codes returned by a driver pass through unmodified.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SqlReturn(pub i16);

impl SqlReturn {
    pub const SUCCESS: SqlReturn = SqlReturn(0);
    pub const SUCCESS_WITH_INFO: SqlReturn = SqlReturn(1);
    pub const STILL_EXECUTING: SqlReturn = SqlReturn(2);
    pub const NEED_DATA: SqlReturn = SqlReturn(99);
    pub const NO_DATA: SqlReturn = SqlReturn(100);
    pub const ERROR: SqlReturn = SqlReturn(-1);
    pub const INVALID_HANDLE: SqlReturn = SqlReturn(-2);

    pub fn is_success(self) -> bool {
        self == Self::SUCCESS || self == Self::SUCCESS_WITH_INFO
    }

    /// `SUCCESS` unless `warned`, in which case `SUCCESS_WITH_INFO`.
    pub fn success_or_info(warned: bool) -> Self {
        if warned {
            Self::SUCCESS_WITH_INFO
        } else {
            Self::SUCCESS
        }
    }
}

impl fmt::Display for SqlReturn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match *self {
            Self::SUCCESS => "SQL_SUCCESS",
            Self::SUCCESS_WITH_INFO => "SQL_SUCCESS_WITH_INFO",
            Self::STILL_EXECUTING => "SQL_STILL_EXECUTING",
            Self::NEED_DATA => "SQL_NEED_DATA",
            Self::NO_DATA => "SQL_NO_DATA",
            Self::ERROR => "SQL_ERROR",
            Self::INVALID_HANDLE => "SQL_INVALID_HANDLE",
            SqlReturn(other) => return write!(f, "SQLRETURN({})", other),
        };
        f.write_str(name)
    }
}

/// `SQLGetInfo` information types the manager inspects.
pub mod info {
    pub const SQL_DRIVER_HDBC: u16 = 3;
    pub const SQL_DRIVER_HENV: u16 = 4;
    pub const SQL_DRIVER_HSTMT: u16 = 5;
    pub const SQL_DRIVER_NAME: u16 = 6;
    pub const SQL_DRIVER_VER: u16 = 7;
    pub const SQL_ODBC_VER: u16 = 10;
    pub const SQL_DRIVER_HLIB: u16 = 76;
    pub const SQL_DRIVER_ODBC_VER: u16 = 77;
}

pub const SQL_HANDLE_ENV: i16 = 1;
pub const SQL_HANDLE_DBC: i16 = 2;
pub const SQL_HANDLE_STMT: i16 = 3;

pub const SQL_ATTR_ODBC_VERSION: i32 = 200;
pub const SQL_DROP: u16 = 1;
pub const SQL_NTS: i16 = -3;

/// Direction argument of `SQLDataSources` / `SQLDrivers`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchDirection {
    First,
    Next,
}

impl FetchDirection {
    pub const SQL_FETCH_NEXT: u16 = 1;
    pub const SQL_FETCH_FIRST: u16 = 2;
}

impl TryFrom<u16> for FetchDirection {
    type Error = u16;

    fn try_from(raw: u16) -> Result<Self, Self::Error> {
        match raw {
            Self::SQL_FETCH_FIRST => Ok(FetchDirection::First),
            Self::SQL_FETCH_NEXT => Ok(FetchDirection::Next),
            other => Err(other),
        }
    }
}
