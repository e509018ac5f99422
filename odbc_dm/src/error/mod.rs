pub mod diagnostics;

use crate::api::{Function, SqlReturn};
use thiserror::Error;

pub use diagnostics::{DiagnosticRecord, SqlState, StructuredError};

/// Error category for decision-making (retry, abort, reconnect, etc.)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Transient error - retry may resolve
    Transient,
    /// Fatal error - should abort operation
    Fatal,
    /// Validation error - invalid caller input or call order
    Validation,
    /// Connection lost or never established
    ConnectionLost,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DmError {
    #[error("Invalid handle: {0:#x}")]
    InvalidHandle(usize),

    #[error("Connection not open")]
    ConnectionNotOpen,

    #[error("Connection in use")]
    ConnectionInUse,

    #[error("Function sequence error: {0}")]
    FunctionSequence(&'static str),

    #[error("Invalid string or buffer length")]
    InvalidBufferLength,

    #[error("Fetch type out of range: {0}")]
    FetchTypeOutOfRange(u16),

    #[error("Function type out of range: {0}")]
    FunctionTypeOutOfRange(u16),

    #[error("Option type out of range: {0}")]
    OptionOutOfRange(i32),

    #[error("Invalid argument value: {0}")]
    InvalidArgumentValue(String),

    #[error("Invalid attribute value: {0}")]
    InvalidAttributeValue(String),

    #[error("Driver does not support this function: {0}")]
    DriverIncomplete(Function),

    #[error("Data source name not found and no default driver specified: {0}")]
    DataSourceNotFound(String),

    #[error("Driver's shared library could not be loaded: {path}: {reason}")]
    DriverLoad { path: String, reason: String },

    #[error("Driver's environment handle allocation failed")]
    DriverEnvAllocation,

    #[error("Driver's connection handle allocation failed")]
    DriverConnectionAllocation,

    #[error("{function} returned {code}")]
    Driver { function: Function, code: SqlReturn },

    #[error("Data source store unreadable: {0}")]
    StoreUnreadable(String),

    #[error("Internal error: {0}")]
    InternalError(String),
}

impl DmError {
    /// SQLSTATE the manager records for this error. `None` when no manager
    /// diagnostic is posted: invalid handles never get one, driver failures
    /// keep the driver's own diagnostics, an unreadable store is not an error.
    pub fn sqlstate(&self) -> Option<SqlState> {
        let state = match self {
            DmError::InvalidHandle(_) | DmError::Driver { .. } | DmError::StoreUnreadable(_) => {
                return None
            }
            DmError::ConnectionNotOpen => SqlState::ConnectionNotOpen,
            DmError::ConnectionInUse => SqlState::ConnectionInUse,
            DmError::FunctionSequence(_) => SqlState::FunctionSequence,
            DmError::InvalidBufferLength => SqlState::InvalidBufferLength,
            DmError::FetchTypeOutOfRange(_) => SqlState::FetchTypeOutOfRange,
            DmError::FunctionTypeOutOfRange(_) => SqlState::FunctionTypeOutOfRange,
            DmError::OptionOutOfRange(_) => SqlState::OptionOutOfRange,
            DmError::InvalidArgumentValue(_) => SqlState::InvalidArgumentValue,
            DmError::InvalidAttributeValue(_) => SqlState::InvalidAttributeValue,
            DmError::DriverIncomplete(_) => SqlState::DriverIncomplete,
            DmError::DataSourceNotFound(_) => SqlState::DataSourceNotFound,
            DmError::DriverLoad { .. } => SqlState::DriverLoadFailed,
            DmError::DriverEnvAllocation => SqlState::DriverEnvAllocationFailed,
            DmError::DriverConnectionAllocation => SqlState::DriverConnectionAllocationFailed,
            DmError::InternalError(_) => SqlState::GeneralError,
        };
        Some(state)
    }

    /// Status code returned to the caller.
    pub fn sql_return(&self) -> SqlReturn {
        match self {
            DmError::InvalidHandle(_) => SqlReturn::INVALID_HANDLE,
            DmError::Driver { code, .. } => *code,
            DmError::StoreUnreadable(_) => SqlReturn::NO_DATA,
            _ => SqlReturn::ERROR,
        }
    }

    pub fn to_record(&self) -> Option<DiagnosticRecord> {
        self.sqlstate()
            .map(|state| DiagnosticRecord::new(state, self.to_string()))
    }

    /// Returns true if this is a connection-related error
    pub fn is_connection_error(&self) -> bool {
        matches!(
            self,
            DmError::ConnectionNotOpen
                | DmError::DataSourceNotFound(_)
                | DmError::DriverLoad { .. }
                | DmError::DriverEnvAllocation
                | DmError::DriverConnectionAllocation
        )
    }

    /// Returns the error category for decision-making
    pub fn error_category(&self) -> ErrorCategory {
        match self {
            DmError::InvalidHandle(_)
            | DmError::ConnectionInUse
            | DmError::FunctionSequence(_)
            | DmError::InvalidBufferLength
            | DmError::FetchTypeOutOfRange(_)
            | DmError::FunctionTypeOutOfRange(_)
            | DmError::OptionOutOfRange(_)
            | DmError::InvalidArgumentValue(_)
            | DmError::InvalidAttributeValue(_) => ErrorCategory::Validation,
            DmError::StoreUnreadable(_) => ErrorCategory::Transient,
            e if e.is_connection_error() => ErrorCategory::ConnectionLost,
            _ => ErrorCategory::Fatal,
        }
    }
}

pub type Result<T> = std::result::Result<T, DmError>;
