//! Failures of a single bridge command.

use std::time::Duration;

use sapgui_protocol::{ErrorDetail, ResponseResult};

#[derive(Debug, thiserror::Error)]
pub enum CommandError {
    /// SAP GUI or COM reported an error; the text goes back verbatim.
    #[error("{0}")]
    Failed(String),

    #[error("No new session appeared on '{server}' within {}s", after.as_secs())]
    Timeout { server: String, after: Duration },
}

impl From<String> for CommandError {
    fn from(message: String) -> Self {
        CommandError::Failed(message)
    }
}

impl CommandError {
    pub fn into_response(self) -> ResponseResult {
        let message = self.to_string();
        match self {
            CommandError::Failed(_) => ResponseResult::error(message),
            CommandError::Timeout { server, after } => ResponseResult::error_with_detail(
                message,
                ErrorDetail::Timeout {
                    server,
                    after_ms: after.as_millis() as u64,
                },
            ),
        }
    }
}
