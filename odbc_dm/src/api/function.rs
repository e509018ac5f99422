use crate::versioning::Revision;
use std::fmt;

/// `SQLGetFunctions` selector for the legacy 100-entry boolean array.
pub const SQL_API_ALL_FUNCTIONS: u16 = 0;
/// `SQLGetFunctions` selector for the ODBC 3 bitmap.
pub const SQL_API_ODBC3_ALL_FUNCTIONS: u16 = 999;
/// Number of `u16` words in the ODBC 3 bitmap.
pub const SQL_API_ODBC3_ALL_FUNCTIONS_SIZE: usize = 250;
/// Highest function identifier defined by the ODBC 2 API.
pub const SQL_EXT_API_LAST: u16 = 72;
/// Number of entries in the legacy `SQL_API_ALL_FUNCTIONS` array.
pub const LEGACY_ALL_FUNCTIONS_SIZE: usize = 100;

macro_rules! functions {
    ($($variant:ident = $id:literal => $name:literal,)*) => {
        /// Call-level operations known to the manager, discriminated by their
        /// `SQL_API_*` identifier.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        #[repr(u16)]
        pub enum Function {
            $($variant = $id,)*
        }

        impl Function {
            pub fn from_id(id: u16) -> Option<Self> {
                match id {
                    $($id => Some(Function::$variant),)*
                    _ => None,
                }
            }

            fn base_name(self) -> &'static str {
                match self {
                    $(Function::$variant => $name,)*
                }
            }
        }
    };
}

functions! {
    AllocConnect = 1 => "SQLAllocConnect",
    AllocEnv = 2 => "SQLAllocEnv",
    AllocStmt = 3 => "SQLAllocStmt",
    BindCol = 4 => "SQLBindCol",
    Cancel = 5 => "SQLCancel",
    ColAttributes = 6 => "SQLColAttributes",
    Connect = 7 => "SQLConnect",
    DescribeCol = 8 => "SQLDescribeCol",
    Disconnect = 9 => "SQLDisconnect",
    Error = 10 => "SQLError",
    ExecDirect = 11 => "SQLExecDirect",
    Execute = 12 => "SQLExecute",
    Fetch = 13 => "SQLFetch",
    FreeConnect = 14 => "SQLFreeConnect",
    FreeEnv = 15 => "SQLFreeEnv",
    FreeStmt = 16 => "SQLFreeStmt",
    GetCursorName = 17 => "SQLGetCursorName",
    NumResultCols = 18 => "SQLNumResultCols",
    Prepare = 19 => "SQLPrepare",
    RowCount = 20 => "SQLRowCount",
    SetCursorName = 21 => "SQLSetCursorName",
    SetParam = 22 => "SQLSetParam",
    Transact = 23 => "SQLTransact",
    BulkOperations = 24 => "SQLBulkOperations",
    Columns = 40 => "SQLColumns",
    DriverConnect = 41 => "SQLDriverConnect",
    GetConnectOption = 42 => "SQLGetConnectOption",
    GetData = 43 => "SQLGetData",
    GetFunctions = 44 => "SQLGetFunctions",
    GetInfo = 45 => "SQLGetInfo",
    GetStmtOption = 46 => "SQLGetStmtOption",
    GetTypeInfo = 47 => "SQLGetTypeInfo",
    ParamData = 48 => "SQLParamData",
    PutData = 49 => "SQLPutData",
    SetConnectOption = 50 => "SQLSetConnectOption",
    SetStmtOption = 51 => "SQLSetStmtOption",
    SpecialColumns = 52 => "SQLSpecialColumns",
    Statistics = 53 => "SQLStatistics",
    Tables = 54 => "SQLTables",
    BrowseConnect = 55 => "SQLBrowseConnect",
    ColumnPrivileges = 56 => "SQLColumnPrivileges",
    DataSources = 57 => "SQLDataSources",
    DescribeParam = 58 => "SQLDescribeParam",
    ExtendedFetch = 59 => "SQLExtendedFetch",
    ForeignKeys = 60 => "SQLForeignKeys",
    MoreResults = 61 => "SQLMoreResults",
    NativeSql = 62 => "SQLNativeSql",
    NumParams = 63 => "SQLNumParams",
    ParamOptions = 64 => "SQLParamOptions",
    PrimaryKeys = 65 => "SQLPrimaryKeys",
    ProcedureColumns = 66 => "SQLProcedureColumns",
    Procedures = 67 => "SQLProcedures",
    SetPos = 68 => "SQLSetPos",
    SetScrollOptions = 69 => "SQLSetScrollOptions",
    TablePrivileges = 70 => "SQLTablePrivileges",
    Drivers = 71 => "SQLDrivers",
    BindParameter = 72 => "SQLBindParameter",
    AllocHandle = 1001 => "SQLAllocHandle",
    BindParam = 1002 => "SQLBindParam",
    CloseCursor = 1003 => "SQLCloseCursor",
    CopyDesc = 1004 => "SQLCopyDesc",
    EndTran = 1005 => "SQLEndTran",
    FreeHandle = 1006 => "SQLFreeHandle",
    GetConnectAttr = 1007 => "SQLGetConnectAttr",
    GetDescField = 1008 => "SQLGetDescField",
    GetDescRec = 1009 => "SQLGetDescRec",
    GetDiagField = 1010 => "SQLGetDiagField",
    GetDiagRec = 1011 => "SQLGetDiagRec",
    GetEnvAttr = 1012 => "SQLGetEnvAttr",
    GetStmtAttr = 1014 => "SQLGetStmtAttr",
    SetConnectAttr = 1016 => "SQLSetConnectAttr",
    SetDescField = 1017 => "SQLSetDescField",
    SetDescRec = 1018 => "SQLSetDescRec",
    SetEnvAttr = 1019 => "SQLSetEnvAttr",
    SetStmtAttr = 1020 => "SQLSetStmtAttr",
    FetchScroll = 1021 => "SQLFetchScroll",
}

/// Every function the capability introspector probes when building the
/// ODBC 3 bitmap, covering both revisions.
pub const CATALOG: [Function; 76] = [
    Function::AllocHandle,
    Function::BindParam,
    Function::CloseCursor,
    Function::CopyDesc,
    Function::EndTran,
    Function::FreeHandle,
    Function::GetConnectAttr,
    Function::GetDescField,
    Function::GetDescRec,
    Function::GetDiagField,
    Function::GetDiagRec,
    Function::GetEnvAttr,
    Function::GetStmtAttr,
    Function::SetConnectAttr,
    Function::SetDescField,
    Function::SetDescRec,
    Function::SetEnvAttr,
    Function::SetStmtAttr,
    Function::FetchScroll,
    Function::BulkOperations,
    Function::AllocEnv,
    Function::AllocConnect,
    Function::Connect,
    Function::DriverConnect,
    Function::BrowseConnect,
    Function::DataSources,
    Function::Drivers,
    Function::GetInfo,
    Function::GetFunctions,
    Function::GetTypeInfo,
    Function::SetConnectOption,
    Function::GetConnectOption,
    Function::SetStmtOption,
    Function::GetStmtOption,
    Function::AllocStmt,
    Function::Prepare,
    Function::BindParameter,
    Function::ParamOptions,
    Function::GetCursorName,
    Function::SetCursorName,
    Function::SetScrollOptions,
    Function::SetParam,
    Function::Execute,
    Function::ExecDirect,
    Function::NativeSql,
    Function::DescribeParam,
    Function::NumParams,
    Function::ParamData,
    Function::PutData,
    Function::RowCount,
    Function::NumResultCols,
    Function::DescribeCol,
    Function::ColAttributes,
    Function::BindCol,
    Function::Fetch,
    Function::ExtendedFetch,
    Function::GetData,
    Function::SetPos,
    Function::MoreResults,
    Function::Error,
    Function::ColumnPrivileges,
    Function::Columns,
    Function::ForeignKeys,
    Function::PrimaryKeys,
    Function::ProcedureColumns,
    Function::Procedures,
    Function::SpecialColumns,
    Function::Statistics,
    Function::TablePrivileges,
    Function::Tables,
    Function::FreeStmt,
    Function::Cancel,
    Function::Transact,
    Function::Disconnect,
    Function::FreeConnect,
    Function::FreeEnv,
];

impl Function {
    pub fn id(self) -> u16 {
        self as u16
    }

    /// Exported symbol name a driver of the given revision uses for this
    /// function. Only `SQL_API_SQLCOLATTRIBUTE(S)` differs between revisions.
    pub fn symbol_name(self, revision: Revision) -> &'static str {
        match (self, revision) {
            (Function::ColAttributes, Revision::Current) => "SQLColAttribute",
            _ => self.base_name(),
        }
    }

    /// Revision that introduced the function.
    pub fn introduced_in(self) -> Revision {
        if self == Function::BulkOperations || self.id() > SQL_EXT_API_LAST {
            Revision::Current
        } else {
            Revision::Legacy
        }
    }

    pub fn is_current_only(self) -> bool {
        self.introduced_in() == Revision::Current
    }
}

impl fmt::Display for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol_name(Revision::Current))
    }
}

/// ODBC 3 `SQL_API_ODBC3_ALL_FUNCTIONS` result: one bit per identifier.
#[derive(Clone, PartialEq, Eq)]
pub struct FunctionBitmap {
    words: [u16; SQL_API_ODBC3_ALL_FUNCTIONS_SIZE],
}

impl FunctionBitmap {
    pub fn new() -> Self {
        Self {
            words: [0; SQL_API_ODBC3_ALL_FUNCTIONS_SIZE],
        }
    }

    pub fn from_words(words: &[u16]) -> Self {
        let mut bitmap = Self::new();
        let n = words.len().min(SQL_API_ODBC3_ALL_FUNCTIONS_SIZE);
        bitmap.words[..n].copy_from_slice(&words[..n]);
        bitmap
    }

    pub fn set(&mut self, id: u16, on: bool) {
        let word = usize::from(id >> 4);
        if word >= SQL_API_ODBC3_ALL_FUNCTIONS_SIZE {
            return;
        }
        let bit = 1u16 << (id & 0xF);
        if on {
            self.words[word] |= bit;
        } else {
            self.words[word] &= !bit;
        }
    }

    pub fn is_set(&self, id: u16) -> bool {
        let word = usize::from(id >> 4);
        word < SQL_API_ODBC3_ALL_FUNCTIONS_SIZE && self.words[word] & (1 << (id & 0xF)) != 0
    }

    /// Identifiers whose bit is set, ascending.
    pub fn ids(&self) -> Vec<u16> {
        (0..(SQL_API_ODBC3_ALL_FUNCTIONS_SIZE * 16) as u16)
            .filter(|id| self.is_set(*id))
            .collect()
    }

    pub fn words(&self) -> &[u16] {
        &self.words
    }

    pub fn write_to(&self, out: &mut [u16]) {
        let n = out.len().min(SQL_API_ODBC3_ALL_FUNCTIONS_SIZE);
        out[..n].copy_from_slice(&self.words[..n]);
    }
}

impl Default for FunctionBitmap {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for FunctionBitmap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FunctionBitmap")
            .field("ids", &self.ids())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_id_roundtrips_every_catalog_entry() {
        for f in CATALOG {
            assert_eq!(Function::from_id(f.id()), Some(f));
        }
    }

    #[test]
    fn test_from_id_unknown() {
        assert_eq!(Function::from_id(0), None);
        assert_eq!(Function::from_id(25), None);
        assert_eq!(Function::from_id(1013), None);
        assert_eq!(Function::from_id(SQL_API_ODBC3_ALL_FUNCTIONS), None);
    }

    #[test]
    fn test_catalog_has_no_duplicates() {
        let mut ids: Vec<u16> = CATALOG.iter().map(|f| f.id()).collect();
        ids.sort_unstable();
        ids.dedup();
        assert_eq!(ids.len(), CATALOG.len());
    }

    #[test]
    fn test_symbol_name_depends_on_revision() {
        assert_eq!(
            Function::ColAttributes.symbol_name(Revision::Legacy),
            "SQLColAttributes"
        );
        assert_eq!(
            Function::ColAttributes.symbol_name(Revision::Current),
            "SQLColAttribute"
        );
        assert_eq!(
            Function::GetInfo.symbol_name(Revision::Legacy),
            Function::GetInfo.symbol_name(Revision::Current)
        );
    }

    #[test]
    fn test_introduced_in() {
        assert_eq!(Function::BindParameter.introduced_in(), Revision::Legacy);
        assert_eq!(Function::AllocHandle.introduced_in(), Revision::Current);
        assert!(Function::BulkOperations.is_current_only());
        assert!(!Function::SetPos.is_current_only());
    }

    #[test]
    fn test_bitmap_word_and_bit_layout() {
        let mut bitmap = FunctionBitmap::new();
        bitmap.set(Function::FetchScroll.id(), true);
        // 1021 >> 4 == 63, 1021 & 0xF == 13
        assert_eq!(bitmap.words()[63], 1 << 13);
        assert!(bitmap.is_set(1021));
        bitmap.set(1021, false);
        assert!(!bitmap.is_set(1021));
        assert!(bitmap.ids().is_empty());
    }

    #[test]
    fn test_bitmap_ignores_out_of_range_ids() {
        let mut bitmap = FunctionBitmap::new();
        bitmap.set(u16::MAX, true);
        assert!(!bitmap.is_set(u16::MAX));
    }

    #[test]
    fn test_bitmap_from_words_roundtrip() {
        let mut bitmap = FunctionBitmap::new();
        bitmap.set(1, true);
        bitmap.set(72, true);
        let mut out = [0u16; SQL_API_ODBC3_ALL_FUNCTIONS_SIZE];
        bitmap.write_to(&mut out);
        assert_eq!(FunctionBitmap::from_words(&out), bitmap);
        assert_eq!(bitmap.ids(), vec![1, 72]);
    }
}
