//! Shared protocol types for communication between the `sapgui` client
//! library and the Windows bridge process that owns the SAP GUI Scripting
//! COM objects.
//!
//! The protocol is JSON-over-stdio: one JSON object per line in each direction.

use serde::{Deserialize, Serialize};

mod tree;

pub use tree::{parse_object_tree, GuiNode, Walk};

/// A command sent from the client to the bridge process.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Request {
    /// Monotonically increasing request ID for correlating responses.
    pub id: u64,
    /// The command to execute.
    #[serde(flatten)]
    pub command: Command,
}

/// Commands the client can send to the bridge.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "cmd", content = "params")]
pub enum Command {
    /// Initialize COM and attach to the SAP GUI scripting engine.
    ///
    /// When SAP GUI is not running and `saplogon_path` is set, the bridge
    /// launches it and keeps retrying for `session_timeout_ms`.
    Init {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        saplogon_path: Option<String>,
        session_timeout_ms: u64,
    },

    /// Attach to (or open) the connection described by `server` and hand out
    /// a session on it. Returns a session handle.
    OpenSession { server: String },

    /// Dump the element tree of a session.
    GetObjectTree { session: u64 },

    /// Read the `Text` property of an element.
    GetText { session: u64, id: String },

    /// Write the `Text` property of an element.
    SetText {
        session: u64,
        id: String,
        text: String,
    },

    /// Send a virtual key to a window (`wnd[window]`).
    SendVKey { session: u64, window: u32, key: u8 },

    /// Close a window of a session. Closing `wnd[0]` ends the session.
    CloseWindow { session: u64, id: String },

    /// Read every row of a table control or grid view.
    ReadTable { session: u64, id: String },

    /// Shut down the bridge: release all sessions and uninitialize COM.
    Shutdown,
}

/// A response sent from the bridge back to the client.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Response {
    /// The request ID this response corresponds to.
    pub id: u64,
    /// The result of the command.
    #[serde(flatten)]
    pub result: ResponseResult,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "status")]
pub enum ResponseResult {
    #[serde(rename = "ok")]
    Ok {
        #[serde(skip_serializing_if = "Option::is_none")]
        data: Option<ResponseData>,
    },
    #[serde(rename = "error")]
    Error {
        message: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        detail: Option<ErrorDetail>,
    },
}

/// Machine-readable detail for errors the client handles differently from
/// a plain SAP GUI message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ErrorDetail {
    /// `CreateSession` did not produce a new session within the timeout.
    Timeout { server: String, after_ms: u64 },
}

/// Data returned in successful responses.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ResponseData {
    /// Handle to a session opened by `OpenSession`, with its scripting id
    /// (e.g. `/app/con[0]/ses[1]`).
    SessionHandle { session: u64, path: String },
    /// The element tree of a session.
    Tree { tree: GuiNode },
    /// The text of an element.
    Text { text: String },
    /// Table contents, row-major.
    Table { rows: Vec<Vec<String>> },
}

impl ResponseResult {
    pub fn ok() -> Self {
        ResponseResult::Ok { data: None }
    }

    pub fn with_data(data: ResponseData) -> Self {
        ResponseResult::Ok { data: Some(data) }
    }

    pub fn error(message: impl Into<String>) -> Self {
        ResponseResult::Error {
            message: message.into(),
            detail: None,
        }
    }

    pub fn error_with_detail(message: impl Into<String>, detail: ErrorDetail) -> Self {
        ResponseResult::Error {
            message: message.into(),
            detail: Some(detail),
        }
    }
}
