use std::fmt;

/// `SQL_ATTR_ODBC_VERSION` values.
pub const SQL_OV_ODBC2: u32 = 2;
pub const SQL_OV_ODBC3: u32 = 3;

/// Generation of the call-level API a caller targets or a driver implements.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Revision {
    /// ODBC 2.x
    Legacy,
    /// ODBC 3.x
    Current,
}

impl Revision {
    pub fn from_odbc_version(value: u32) -> Option<Self> {
        match value {
            SQL_OV_ODBC2 => Some(Revision::Legacy),
            SQL_OV_ODBC3 => Some(Revision::Current),
            _ => None,
        }
    }

    pub fn odbc_version(self) -> u32 {
        match self {
            Revision::Legacy => SQL_OV_ODBC2,
            Revision::Current => SQL_OV_ODBC3,
        }
    }

    pub fn is_legacy(self) -> bool {
        self == Revision::Legacy
    }
}

impl fmt::Display for Revision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Revision::Legacy => f.write_str("ODBC 2.x"),
            Revision::Current => f.write_str("ODBC 3.x"),
        }
    }
}

/// Two-part revision string as reported by `SQL_ODBC_VER` and
/// `SQL_DRIVER_ODBC_VER`, formatted `MM.mm`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct OdbcVersion {
    pub major: u8,
    pub minor: u8,
}

impl OdbcVersion {
    pub fn new(major: u8, minor: u8) -> Self {
        Self { major, minor }
    }

    /// Revision implemented by this manager.
    pub fn manager() -> Self {
        Self::new(3, 0)
    }

    /// Reported in place of a driver that cannot state its own revision.
    pub fn legacy_fallback() -> Self {
        Self::new(1, 0)
    }

    /// Parses `"MM.mm"`, ignoring anything after the minor part (drivers
    /// often append a NUL or a build suffix).
    pub fn parse(text: &str) -> Option<Self> {
        let (major, rest) = text.trim().split_once('.')?;
        let minor: String = rest.chars().take_while(|c| c.is_ascii_digit()).collect();
        Some(Self::new(major.parse().ok()?, minor.parse().ok()?))
    }

    pub fn revision(&self) -> Revision {
        if self.major >= 3 {
            Revision::Current
        } else {
            Revision::Legacy
        }
    }
}

impl fmt::Display for OdbcVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}.{:02}", self.major, self.minor)
    }
}

impl Default for OdbcVersion {
    fn default() -> Self {
        Self::manager()
    }
}
