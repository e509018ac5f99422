use crate::versioning::Revision;
use std::fmt;

/// SQLSTATE raised by the manager itself. Stored revision-neutral and rendered
/// with the class the owning environment expects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SqlState {
    /// 01004
    StringTruncated,
    /// 08002
    ConnectionInUse,
    /// 08003
    ConnectionNotOpen,
    /// IM001
    DriverIncomplete,
    /// IM002
    DataSourceNotFound,
    /// IM003
    DriverLoadFailed,
    /// IM004
    DriverEnvAllocationFailed,
    /// IM005
    DriverConnectionAllocationFailed,
    /// S1000 / HY000
    GeneralError,
    /// S1009 / HY009
    InvalidArgumentValue,
    /// S1010 / HY010
    FunctionSequence,
    /// S1090 / HY090
    InvalidBufferLength,
    /// S1092 / HY092
    OptionOutOfRange,
    /// S1095 / HY095
    FunctionTypeOutOfRange,
    /// S1103 / HY103
    FetchTypeOutOfRange,
    /// S1009 / HY024
    InvalidAttributeValue,
}

impl SqlState {
    pub fn as_str(self, revision: Revision) -> &'static str {
        let legacy = revision.is_legacy();
        match self {
            SqlState::StringTruncated => "01004",
            SqlState::ConnectionInUse => "08002",
            SqlState::ConnectionNotOpen => "08003",
            SqlState::DriverIncomplete => "IM001",
            SqlState::DataSourceNotFound => "IM002",
            SqlState::DriverLoadFailed => "IM003",
            SqlState::DriverEnvAllocationFailed => "IM004",
            SqlState::DriverConnectionAllocationFailed => "IM005",
            SqlState::GeneralError if legacy => "S1000",
            SqlState::GeneralError => "HY000",
            SqlState::InvalidArgumentValue if legacy => "S1009",
            SqlState::InvalidArgumentValue => "HY009",
            SqlState::FunctionSequence if legacy => "S1010",
            SqlState::FunctionSequence => "HY010",
            SqlState::InvalidBufferLength if legacy => "S1090",
            SqlState::InvalidBufferLength => "HY090",
            SqlState::OptionOutOfRange if legacy => "S1092",
            SqlState::OptionOutOfRange => "HY092",
            SqlState::FunctionTypeOutOfRange if legacy => "S1095",
            SqlState::FunctionTypeOutOfRange => "HY095",
            SqlState::FetchTypeOutOfRange if legacy => "S1103",
            SqlState::FetchTypeOutOfRange => "HY103",
            SqlState::InvalidAttributeValue if legacy => "S1009",
            SqlState::InvalidAttributeValue => "HY024",
        }
    }

    pub fn code(self, revision: Revision) -> [u8; 5] {
        let mut code = [0u8; 5];
        code.copy_from_slice(self.as_str(revision).as_bytes());
        code
    }

    pub fn is_warning(self) -> bool {
        self == SqlState::StringTruncated
    }
}

/// One entry on a handle's diagnostic stack.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiagnosticRecord {
    pub state: SqlState,
    pub native_code: i32,
    pub message: String,
}

impl DiagnosticRecord {
    pub fn new(state: SqlState, message: impl Into<String>) -> Self {
        Self {
            state,
            native_code: 0,
            message: message.into(),
        }
    }

    pub fn truncated() -> Self {
        Self::new(SqlState::StringTruncated, "String data, right truncated")
    }

    pub fn render(&self, revision: Revision) -> StructuredError {
        StructuredError {
            sqlstate: self.state.code(revision),
            native_code: self.native_code,
            message: format!("[odbc_dm]{}", self.message),
        }
    }
}

/// A diagnostic as handed to the application by `SQLGetDiagRec`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StructuredError {
    pub sqlstate: [u8; 5],
    pub native_code: i32,
    pub message: String,
}

impl StructuredError {
    pub fn sqlstate_str(&self) -> &str {
        std::str::from_utf8(&self.sqlstate).unwrap_or("?????")
    }
}

impl fmt::Display for StructuredError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}): {}", self.sqlstate_str(), self.native_code, self.message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_class_depends_on_revision() {
        assert_eq!(SqlState::FunctionSequence.as_str(Revision::Legacy), "S1010");
        assert_eq!(SqlState::FunctionSequence.as_str(Revision::Current), "HY010");
        assert_eq!(SqlState::InvalidAttributeValue.as_str(Revision::Legacy), "S1009");
        assert_eq!(SqlState::InvalidAttributeValue.as_str(Revision::Current), "HY024");
    }

    #[test]
    fn test_revision_neutral_states() {
        for revision in [Revision::Legacy, Revision::Current] {
            assert_eq!(SqlState::StringTruncated.as_str(revision), "01004");
            assert_eq!(SqlState::ConnectionNotOpen.as_str(revision), "08003");
            assert_eq!(SqlState::DriverIncomplete.as_str(revision), "IM001");
        }
    }

    #[test]
    fn test_code_bytes() {
        assert_eq!(SqlState::InvalidBufferLength.code(Revision::Current), *b"HY090");
    }

    #[test]
    fn test_render() {
        let record = DiagnosticRecord::truncated();
        let rendered = record.render(Revision::Current);
        assert_eq!(&rendered.sqlstate, b"01004");
        assert_eq!(rendered.native_code, 0);
        assert!(rendered.message.contains("truncated"));
        assert!(rendered.to_string().starts_with("01004 (0): "));
    }

    #[test]
    fn test_only_truncation_is_a_warning() {
        assert!(SqlState::StringTruncated.is_warning());
        assert!(!SqlState::GeneralError.is_warning());
    }
}
