//! Subprocess management and JSON IPC for the SAP GUI bridge process.

use std::io::{BufRead, BufReader, Write};
use std::path::PathBuf;
use std::process::{Child, ChildStdin, ChildStdout, Stdio};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use sapgui_protocol::{
    Command as BridgeCommand, ErrorDetail, GuiNode, Request, Response, ResponseData,
    ResponseResult,
};

use crate::engine::{Engine, SessionHandle};
use crate::error::Result;
use crate::vkey::VKey;

const BRIDGE_EXE: &str = "sapgui-bridge.exe";

/// Errors from the bridge process.
#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    #[error("Failed to spawn bridge process: {0}")]
    SpawnFailed(#[from] std::io::Error),

    #[error("Bridge process not running")]
    NotRunning,

    #[error("Failed to send command to bridge: {0}")]
    SendFailed(String),

    #[error("Failed to read response from bridge: {0}")]
    ReadFailed(String),

    #[error("JSON serialization error: {0}")]
    JsonError(#[from] serde_json::Error),

    /// SAP GUI reported an error while executing the command.
    #[error("{0}")]
    Remote(String),

    /// The bridge gave up waiting for a new session on `server`.
    #[error("No new session appeared on '{server}' within {}s", after.as_secs())]
    Timeout { server: String, after: Duration },

    #[error("Unexpected response data")]
    UnexpectedResponse,

    #[error("Response id {got} does not match request id {expected}")]
    IdMismatch { expected: u64, got: u64 },

    #[error("WINE not found. Install WINE and ensure 'wine' is in PATH.")]
    WineNotFound,

    #[error("Bridge executable not found at: {0}")]
    BridgeExeNotFound(String),
}

/// Configuration for the bridge process.
#[derive(Debug, Clone)]
pub struct BridgeConfig {
    /// Path to `sapgui-bridge.exe`. If None, searched next to the current
    /// binary and in the cargo target directories.
    pub bridge_exe_path: Option<PathBuf>,

    /// Launcher for the exe. `None` runs it directly (Windows); elsewhere it
    /// defaults to `wine`.
    pub wine_path: Option<PathBuf>,

    /// Optional WINEPREFIX for the launcher.
    pub wine_prefix: Option<PathBuf>,

    /// SAP Logon executable, started by the bridge when SAP GUI is not running.
    pub saplogon_path: Option<PathBuf>,

    /// How long to wait for SAP GUI to come up and for a new session to
    /// appear after `CreateSession`.
    pub session_timeout: Duration,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            bridge_exe_path: None,
            wine_path: if cfg!(windows) {
                None
            } else {
                Some(PathBuf::from("wine"))
            },
            wine_prefix: None,
            saplogon_path: None,
            session_timeout: Duration::from_secs(20),
        }
    }
}

impl BridgeConfig {
    /// Defaults overlaid with `SAPGUI_BRIDGE_EXE`, `SAPGUI_WINE`, `WINEPREFIX`,
    /// `SAPGUI_SAPLOGON` and `SAPGUI_SESSION_TIMEOUT_SECS`.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();
        if let Some(exe) = lookup("SAPGUI_BRIDGE_EXE") {
            config.bridge_exe_path = Some(exe.into());
        }
        if let Some(wine) = lookup("SAPGUI_WINE") {
            // An empty value means "run the exe directly".
            config.wine_path = (!wine.is_empty()).then(|| wine.into());
        }
        if let Some(prefix) = lookup("WINEPREFIX") {
            config.wine_prefix = Some(prefix.into());
        }
        if let Some(saplogon) = lookup("SAPGUI_SAPLOGON") {
            config.saplogon_path = Some(saplogon.into());
        }
        match lookup("SAPGUI_SESSION_TIMEOUT_SECS").map(|s| s.parse::<u64>()) {
            Some(Ok(secs)) => config.session_timeout = Duration::from_secs(secs),
            Some(Err(e)) => tracing::warn!("Ignoring SAPGUI_SESSION_TIMEOUT_SECS: {e}"),
            None => {}
        }
        config
    }
}

/// A running bridge process.
///
/// One request/response pair is in flight at a time; stdin and stdout are
/// locked for the duration of a command.
pub struct BridgeProcess {
    child: Mutex<Child>,
    stdin: Mutex<ChildStdin>,
    stdout: Mutex<BufReader<ChildStdout>>,
    next_id: AtomicU64,
}

impl BridgeProcess {
    /// Start the bridge process and attach it to SAP GUI.
    pub fn start(config: &BridgeConfig) -> std::result::Result<Self, BridgeError> {
        let exe_path = config
            .bridge_exe_path
            .clone()
            .unwrap_or_else(find_bridge_exe);

        if !exe_path.exists() {
            return Err(BridgeError::BridgeExeNotFound(
                exe_path.display().to_string(),
            ));
        }

        let mut cmd = match &config.wine_path {
            Some(wine) => {
                let mut cmd = std::process::Command::new(wine);
                if let Some(prefix) = &config.wine_prefix {
                    cmd.env("WINEPREFIX", prefix);
                }
                cmd.arg(&exe_path);
                cmd
            }
            None => std::process::Command::new(&exe_path),
        };
        cmd.stdin(Stdio::piped());
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::inherit()); // bridge logs go to our stderr

        tracing::info!("Starting SAP GUI bridge: {:?}", cmd);
        let mut child = cmd.spawn().map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound && config.wine_path.is_some() {
                BridgeError::WineNotFound
            } else {
                BridgeError::SpawnFailed(e)
            }
        })?;

        let (Some(stdin), Some(stdout)) = (child.stdin.take(), child.stdout.take()) else {
            let _ = child.kill();
            return Err(BridgeError::NotRunning);
        };

        let bridge = Self {
            child: Mutex::new(child),
            stdin: Mutex::new(stdin),
            stdout: Mutex::new(BufReader::new(stdout)),
            next_id: AtomicU64::new(1),
        };

        bridge.send_command(BridgeCommand::Init {
            saplogon_path: config
                .saplogon_path
                .as_ref()
                .map(|p| p.display().to_string()),
            session_timeout_ms: config.session_timeout.as_millis() as u64,
        })?;

        Ok(bridge)
    }

    /// Send a command to the bridge and wait for the response.
    pub fn send_command(
        &self,
        command: BridgeCommand,
    ) -> std::result::Result<Option<ResponseData>, BridgeError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(id, "-> {:?}", command);

        let request = Request { id, command };
        let json = serde_json::to_string(&request)?;

        // Hold stdout across the write so responses cannot interleave.
        let mut stdout = self.stdout.lock();
        {
            let mut stdin = self.stdin.lock();
            writeln!(stdin, "{json}").map_err(|e| BridgeError::SendFailed(e.to_string()))?;
            stdin
                .flush()
                .map_err(|e| BridgeError::SendFailed(e.to_string()))?;
        }

        let mut line = String::new();
        stdout
            .read_line(&mut line)
            .map_err(|e| BridgeError::ReadFailed(e.to_string()))?;
        decode_response(id, &line)
    }

    /// Ask the bridge to release SAP GUI and wait for it to exit.
    pub fn shutdown(&self) -> std::result::Result<(), BridgeError> {
        let result = self.send_command(BridgeCommand::Shutdown).map(|_| ());
        let _ = self.child.lock().wait();
        result
    }
}

impl Drop for BridgeProcess {
    fn drop(&mut self) {
        let child = self.child.get_mut();
        if let Ok(None) = child.try_wait() {
            let _ = child.kill();
            let _ = child.wait();
        }
    }
}

/// Turn one response line into the command's outcome. An empty line means
/// the bridge closed its stdout.
fn decode_response(
    expected: u64,
    line: &str,
) -> std::result::Result<Option<ResponseData>, BridgeError> {
    if line.is_empty() {
        return Err(BridgeError::NotRunning);
    }
    let response: Response = serde_json::from_str(line)?;
    if response.id != expected {
        return Err(BridgeError::IdMismatch {
            expected,
            got: response.id,
        });
    }

    match response.result {
        ResponseResult::Ok { data } => Ok(data),
        ResponseResult::Error {
            detail: Some(ErrorDetail::Timeout { server, after_ms }),
            ..
        } => Err(BridgeError::Timeout {
            server,
            after: Duration::from_millis(after_ms),
        }),
        ResponseResult::Error {
            message,
            detail: None,
        } => {
            tracing::debug!(id = expected, "<- error: {message}");
            Err(BridgeError::Remote(message))
        }
    }
}

/// [`Engine`] backed by the bridge process. The process is spawned lazily by
/// [`Engine::attach`].
pub struct BridgeEngine {
    config: BridgeConfig,
    process: Option<Arc<BridgeProcess>>,
}

impl BridgeEngine {
    pub fn new(config: BridgeConfig) -> Self {
        Self {
            config,
            process: None,
        }
    }

    pub fn is_running(&self) -> bool {
        self.process.is_some()
    }

    fn process(&self) -> std::result::Result<&Arc<BridgeProcess>, BridgeError> {
        self.process.as_ref().ok_or(BridgeError::NotRunning)
    }
}

impl Engine for BridgeEngine {
    type Session = BridgeSession;

    fn attach(&mut self) -> Result<()> {
        if self.process.is_none() {
            self.process = Some(Arc::new(BridgeProcess::start(&self.config)?));
        }
        Ok(())
    }

    fn open_session(&mut self, server: &str) -> Result<BridgeSession> {
        let process = Arc::clone(self.process()?);
        let data = process.send_command(BridgeCommand::OpenSession {
            server: server.to_string(),
        })?;
        match data {
            Some(ResponseData::SessionHandle { session, path }) => Ok(BridgeSession {
                process,
                handle: session,
                path,
            }),
            _ => Err(BridgeError::UnexpectedResponse.into()),
        }
    }

    fn shutdown(&mut self) -> Result<()> {
        match self.process.take() {
            Some(process) => Ok(process.shutdown()?),
            None => Ok(()),
        }
    }
}

/// A session living inside the bridge process.
pub struct BridgeSession {
    process: Arc<BridgeProcess>,
    handle: u64,
    path: String,
}

impl SessionHandle for BridgeSession {
    fn path(&self) -> &str {
        &self.path
    }

    fn object_tree(&self) -> Result<GuiNode> {
        let data = self.process.send_command(BridgeCommand::GetObjectTree {
            session: self.handle,
        })?;
        match data {
            Some(ResponseData::Tree { tree }) => Ok(tree),
            _ => Err(BridgeError::UnexpectedResponse.into()),
        }
    }

    fn text(&self, id: &str) -> Result<String> {
        let data = self.process.send_command(BridgeCommand::GetText {
            session: self.handle,
            id: id.to_string(),
        })?;
        match data {
            Some(ResponseData::Text { text }) => Ok(text),
            _ => Err(BridgeError::UnexpectedResponse.into()),
        }
    }

    fn set_text(&self, id: &str, text: &str) -> Result<()> {
        self.process.send_command(BridgeCommand::SetText {
            session: self.handle,
            id: id.to_string(),
            text: text.to_string(),
        })?;
        Ok(())
    }

    fn send_vkey(&self, window: u32, key: VKey) -> Result<()> {
        self.process.send_command(BridgeCommand::SendVKey {
            session: self.handle,
            window,
            key: key.code(),
        })?;
        Ok(())
    }

    fn close_window(&self, id: &str) -> Result<()> {
        self.process.send_command(BridgeCommand::CloseWindow {
            session: self.handle,
            id: id.to_string(),
        })?;
        Ok(())
    }

    fn read_table(&self, id: &str) -> Result<Vec<Vec<String>>> {
        let data = self.process.send_command(BridgeCommand::ReadTable {
            session: self.handle,
            id: id.to_string(),
        })?;
        match data {
            Some(ResponseData::Table { rows }) => Ok(rows),
            _ => Err(BridgeError::UnexpectedResponse.into()),
        }
    }
}

/// Attempt to locate the bridge exe relative to the current executable or in
/// the cargo target directories.
fn find_bridge_exe() -> PathBuf {
    if let Ok(mut exe) = std::env::current_exe() {
        exe.pop();
        let candidate = exe.join(BRIDGE_EXE);
        if candidate.exists() {
            return candidate;
        }
    }

    [
        "target/x86_64-pc-windows-gnu/release",
        "target/x86_64-pc-windows-gnu/debug",
        "target/release",
        "target/debug",
    ]
    .iter()
    .map(|dir| PathBuf::from(dir).join(BRIDGE_EXE))
    .find(|path| path.exists())
    .unwrap_or_else(|| PathBuf::from(BRIDGE_EXE))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SapError;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn default_config() {
        let config = BridgeConfig::default();
        assert_eq!(config.session_timeout, Duration::from_secs(20));
        assert!(config.bridge_exe_path.is_none());
        assert_eq!(config.wine_path.is_some(), !cfg!(windows));
    }

    #[test]
    fn config_from_environment() {
        let config = BridgeConfig::from_lookup(lookup(&[
            ("SAPGUI_BRIDGE_EXE", "/opt/sap/sapgui-bridge.exe"),
            ("SAPGUI_WINE", ""),
            ("WINEPREFIX", "/home/sap/.wine"),
            ("SAPGUI_SAPLOGON", r"C:\Program Files (x86)\SAP\FrontEnd\SAPgui\saplogon.exe"),
            ("SAPGUI_SESSION_TIMEOUT_SECS", "5"),
        ]));
        assert_eq!(
            config.bridge_exe_path,
            Some(PathBuf::from("/opt/sap/sapgui-bridge.exe"))
        );
        assert_eq!(config.wine_path, None);
        assert_eq!(config.wine_prefix, Some(PathBuf::from("/home/sap/.wine")));
        assert!(config.saplogon_path.is_some());
        assert_eq!(config.session_timeout, Duration::from_secs(5));
    }

    #[test]
    fn bad_timeout_keeps_default() {
        let config = BridgeConfig::from_lookup(lookup(&[("SAPGUI_SESSION_TIMEOUT_SECS", "soon")]));
        assert_eq!(config.session_timeout, Duration::from_secs(20));
    }

    #[test]
    fn missing_bridge_exe_is_reported() {
        let config = BridgeConfig {
            bridge_exe_path: Some(PathBuf::from("/nonexistent/sapgui-bridge.exe")),
            ..BridgeConfig::default()
        };
        match BridgeProcess::start(&config) {
            Err(BridgeError::BridgeExeNotFound(path)) => {
                assert!(path.ends_with("sapgui-bridge.exe"))
            }
            Err(other) => panic!("unexpected error: {other}"),
            Ok(_) => panic!("bridge should not start"),
        }
    }

    #[test]
    fn decode_ok_response() {
        let data = decode_response(4, "{\"id\":4,\"status\":\"ok\",\"data\":{\"text\":\"SU01\"}}\n").unwrap();
        assert!(matches!(data, Some(ResponseData::Text { ref text }) if text == "SU01"));
    }

    #[test]
    fn decode_rejects_foreign_id() {
        match decode_response(4, r#"{"id":3,"status":"ok"}"#) {
            Err(BridgeError::IdMismatch { expected, got }) => {
                assert_eq!((expected, got), (4, 3))
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn decode_empty_line_means_bridge_exited() {
        assert!(matches!(decode_response(1, ""), Err(BridgeError::NotRunning)));
    }

    #[test]
    fn remote_error_becomes_engine_error() {
        let err = decode_response(
            2,
            r#"{"id":2,"status":"error","message":"The control could not be found by id."}"#,
        )
        .unwrap_err();
        match SapError::from(err) {
            SapError::Engine(message) => {
                assert_eq!(message, "The control could not be found by id.")
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn session_timeout_is_its_own_error() {
        let line = r#"{"id":6,"status":"error","message":"No new session appeared on 'PRD' within 20s","detail":{"kind":"timeout","server":"PRD","after_ms":20000}}"#;
        let err = decode_response(6, line).unwrap_err();
        match SapError::from(err) {
            SapError::Timeout { server, after } => {
                assert_eq!(server, "PRD");
                assert_eq!(after, Duration::from_secs(20));
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn engine_requires_attach() {
        let mut engine = BridgeEngine::new(BridgeConfig::default());
        assert!(!engine.is_running());
        let err = engine.open_session("PRD").err().map(|e| e.to_string());
        assert_eq!(err.as_deref(), Some("Bridge error: Bridge process not running"));
        assert!(engine.shutdown().is_ok());
    }
}
