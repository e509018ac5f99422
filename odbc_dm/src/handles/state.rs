use crate::error::{DmError, Result};

/// Connection lifecycle. `Executing` and `NeedData` are sub-states of a live
/// connection; `Freed` is represented by the slot leaving the arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Allocated,
    Connected,
    Executing,
    NeedData,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionEvent {
    ConnectSucceeded,
    Disconnect,
    BeginExecute,
    EndExecute,
    BeginNeedData,
    /// Data-at-execution completed or cancelled.
    CompleteNeedData,
}

impl ConnectionState {
    pub fn transition(self, event: ConnectionEvent) -> Result<ConnectionState> {
        use ConnectionEvent::*;
        use ConnectionState::*;

        match (self, event) {
            (Allocated, ConnectSucceeded) => Ok(Connected),
            (Connected, Disconnect) => Ok(Allocated),
            (Connected, BeginExecute) => Ok(Executing),
            (Executing, EndExecute) => Ok(Connected),
            (Connected, BeginNeedData) => Ok(NeedData),
            (NeedData, CompleteNeedData) => Ok(Connected),
            (Allocated, _) => Err(DmError::ConnectionNotOpen),
            (_, ConnectSucceeded) => Err(DmError::ConnectionInUse),
            _ => Err(DmError::FunctionSequence("invalid connection state transition")),
        }
    }

    pub fn is_live(self) -> bool {
        !matches!(self, ConnectionState::Allocated)
    }

    /// Info-style queries need a driver that is not waiting for parameter data.
    pub fn accepts_info(self) -> bool {
        matches!(self, ConnectionState::Connected | ConnectionState::Executing)
    }
}
