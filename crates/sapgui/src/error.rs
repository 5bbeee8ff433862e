//! Error types for SAP GUI sessions.

use std::time::Duration;

use thiserror::Error;

use crate::bridge::BridgeError;

#[derive(Debug, Error)]
pub enum SapError {
    /// The bridge process itself failed (spawn, pipe, protocol).
    #[error("Bridge error: {0}")]
    Bridge(#[source] BridgeError),

    /// SAP GUI rejected an operation. The message is passed through as-is.
    #[error("{0}")]
    Engine(String),

    /// A new session on `server` did not show up within `after`.
    #[error("No new session appeared on '{server}' within {}s", after.as_secs())]
    Timeout { server: String, after: Duration },

    #[error("No element found with Id: {0} in its path")]
    ElementNotFound(String),

    #[error("More than one element found with Id: {needle} in its path ({} matches)", matches.len())]
    AmbiguousElement { needle: String, matches: Vec<String> },

    #[error("{kind} type object is not supported as a table (element {id})")]
    UnsupportedTable { id: String, kind: String },

    #[error("{code} could either not be found or there is a problem with the SAP connection: {source}")]
    Transaction {
        code: String,
        #[source]
        source: Box<SapError>,
    },
}

impl From<BridgeError> for SapError {
    fn from(err: BridgeError) -> Self {
        match err {
            BridgeError::Remote(message) => SapError::Engine(message),
            BridgeError::Timeout { server, after } => SapError::Timeout { server, after },
            other => SapError::Bridge(other),
        }
    }
}

pub type Result<T> = std::result::Result<T, SapError>;
