//! Error domain for the call/data graph, bridged into [`pbx_core::error::CoreError`]
//! so `Service`-style call sites can propagate with `?`.

use pbx_core::error::CoreError;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SwitchError {
    #[error("endpoint `{id}` already has a peer")]
    AlreadyPeered { id: String },

    #[error("endpoint `{id}` not found")]
    EndpointNotFound { id: String },

    #[error("no translator path from `{from}` to `{to}`")]
    FormatMismatch { from: String, to: String },

    #[error("data endpoint `{id}` media `{media}` already has a {role}")]
    SlotOccupied { id: String, media: String, role: &'static str },

    #[error("internal switch failure: {0}")]
    Internal(String),
}

impl From<SwitchError> for CoreError {
    fn from(value: SwitchError) -> Self {
        match value {
            SwitchError::AlreadyPeered { id } => CoreError::BadArgument(format!("already peered: {id}")),
            SwitchError::EndpointNotFound { id } => CoreError::NotFound(format!("endpoint {id}")),
            SwitchError::FormatMismatch { from, to } => {
                CoreError::FormatMismatch(format!("{from} -> {to}"))
            }
            SwitchError::SlotOccupied { id, media, role } => {
                CoreError::BadArgument(format!("{id}/{media} {role} already attached"))
            }
            SwitchError::Internal(detail) => CoreError::Fatal(detail),
        }
    }
}

pub type Result<T> = core::result::Result<T, SwitchError>;
