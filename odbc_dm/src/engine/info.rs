//! `SQLGetInfo`: manager-owned items answered locally, the rest forwarded.

use super::buffer::{copy_str, read_word, short_length, write_word};
use super::lifecycle::active_driver;
use super::DriverManager;
use crate::api::{info, Function, SqlReturn};
use crate::driver::{DriverCall, DriverHandle};
use crate::error::{DiagnosticRecord, DmError, Result};
use crate::handles::{HandleId, HandleKind, HandleManager};
use crate::versioning::shim::{self, ManagerInfo};
use crate::versioning::OdbcVersion;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InfoReply {
    pub status: SqlReturn,
    /// Untruncated length of the value in bytes.
    pub length: i16,
}

impl DriverManager {
    /// `SQL_ODBC_VER` is answered in any connection state; the handle items
    /// and forwarded items need a connected driver.
    pub fn get_info(
        &self,
        dbc: HandleId,
        info_type: u16,
        value: Option<&mut [u8]>,
    ) -> Result<InfoReply> {
        self.begin(dbc, HandleKind::Connection)?;
        let result = self.get_info_inner(dbc, info_type, value);
        self.finish(dbc, result)
    }

    fn get_info_inner(
        &self,
        dbc: HandleId,
        info_type: u16,
        mut value: Option<&mut [u8]>,
    ) -> Result<InfoReply> {
        let item = shim::manager_info(info_type);
        if item == Some(ManagerInfo::OdbcVersion) {
            return Ok(self.reply_str(dbc, &OdbcVersion::manager().to_string(), value));
        }

        let (module, driver_dbc) = {
            let handles = self.lock()?;
            let record = handles.connection(dbc)?;
            if !record.state.accepts_info() {
                return Err(DmError::ConnectionNotOpen);
            }
            let driver = active_driver(record.driver.as_ref())?;

            let word = match item {
                Some(ManagerInfo::DriverConnection) => Some(driver.dbc.as_raw()),
                Some(ManagerInfo::DriverEnvironment) => Some(driver.env.as_raw()),
                Some(ManagerInfo::DriverLibrary) => Some(driver.module.library_handle()),
                Some(ManagerInfo::DriverStatement) => {
                    Some(owned_statement(&handles, dbc, value.as_deref())?.as_raw())
                }
                Some(ManagerInfo::OdbcVersion) | None => None,
            };
            if let Some(word) = word {
                let length = write_word(word, value)?;
                return Ok(InfoReply {
                    status: SqlReturn::SUCCESS,
                    length: short_length(length),
                });
            }
            (driver.module.clone(), driver.dbc)
        };

        let mut length = 0i16;
        let code = module.dispatch(DriverCall::GetInfo {
            dbc: driver_dbc,
            info_type,
            value: value.as_deref_mut(),
            length: &mut length,
        })?;

        if code == SqlReturn::ERROR && info_type == info::SQL_DRIVER_ODBC_VER {
            let fallback = OdbcVersion::legacy_fallback().to_string();
            self.logger
                .log_substitution(Function::GetInfo, info_type, &fallback);
            return Ok(self.reply_str(dbc, &fallback, value));
        }

        let status = Self::forwarded(Function::GetInfo, code)?;
        Ok(InfoReply { status, length })
    }

    fn reply_str(&self, dbc: HandleId, text: &str, value: Option<&mut [u8]>) -> InfoReply {
        let copied = copy_str(text, value);
        if copied.truncated {
            self.post(dbc, DiagnosticRecord::truncated());
        }
        InfoReply {
            status: SqlReturn::success_or_info(copied.truncated),
            length: short_length(copied.length),
        }
    }
}

/// Driver handle of the statement whose manager handle the caller placed in
/// the value buffer. It must be one of `dbc`'s statements.
fn owned_statement(
    handles: &HandleManager,
    dbc: HandleId,
    value: Option<&[u8]>,
) -> Result<DriverHandle> {
    let raw = read_word(value)
        .ok_or_else(|| DmError::InvalidArgumentValue("missing statement handle".to_string()))?;
    HandleId::from_raw(raw)
        .filter(|id| id.kind() == HandleKind::Statement)
        .and_then(|id| handles.statement(id).ok())
        .filter(|record| record.dbc == dbc)
        .map(|record| record.handle)
        .ok_or_else(|| {
            DmError::InvalidArgumentValue(format!(
                "0x{:x} is not a statement of this connection",
                raw
            ))
        })
}
