//! SAP GUI bridge — a Windows process that drives SAP GUI Scripting via COM,
//! controlled by JSON commands over stdin/stdout.
//!
//! Runs natively on Windows, or cross-compiled from Linux and run under WINE.
//!
//! Protocol: one JSON object per line (newline-delimited JSON).
//! - Reads `Request` objects from stdin
//! - Writes `Response` objects to stdout
//! - Diagnostics go to stderr via `tracing` (never stdout)

#[cfg_attr(not(windows), allow(dead_code))]
mod connect;
#[cfg(windows)]
mod dispatch;
#[cfg_attr(not(windows), allow(dead_code))]
mod error;
#[cfg(windows)]
mod scripting;
#[cfg_attr(not(windows), allow(dead_code))]
mod table;

#[cfg(windows)]
use std::io::Write;

#[cfg(windows)]
use sapgui_protocol::Response;
use tracing_subscriber::EnvFilter;

const LOG_ENV: &str = "SAPGUI_BRIDGE_LOG";

fn init_logging() {
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();
}

#[cfg(windows)]
fn write_response(out: &mut impl Write, response: &Response) {
    match serde_json::to_string(response) {
        Ok(json) => {
            let _ = writeln!(out, "{json}");
            let _ = out.flush();
        }
        Err(e) => tracing::error!("Failed to encode response {}: {e}", response.id),
    }
}

#[cfg(not(windows))]
fn main() {
    init_logging();
    tracing::error!("sapgui-bridge must be compiled for Windows (--target x86_64-pc-windows-gnu)");
    tracing::error!("and run on Windows or under WINE.");
    std::process::exit(1);
}

#[cfg(windows)]
fn main() {
    use std::io::{self, BufRead};

    use sapgui_protocol::{Command, Request, ResponseResult};

    init_logging();
    tracing::info!("Starting up...");

    let stdin = io::stdin();
    let stdout = io::stdout();
    let mut out = stdout.lock();

    let mut engine: Option<scripting::ScriptingEngine> = None;

    for line in stdin.lock().lines() {
        let line = match line {
            Ok(l) => l,
            Err(e) => {
                tracing::error!("stdin read error: {e}");
                break;
            }
        };

        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let request: Request = match serde_json::from_str(line) {
            Ok(r) => r,
            Err(e) => {
                tracing::warn!("JSON parse error: {e}; line was: {line}");
                // id=0: the request id could not be recovered
                let resp = Response {
                    id: 0,
                    result: ResponseResult::error(format!("JSON parse error: {e}")),
                };
                write_response(&mut out, &resp);
                continue;
            }
        };

        tracing::debug!(id = request.id, "{:?}", request.command);
        let response = handle_command(&mut engine, &request);
        write_response(&mut out, &response);

        if matches!(request.command, Command::Shutdown) {
            tracing::info!("Shutdown complete, exiting.");
            break;
        }
    }

    if let Some(engine) = engine {
        tracing::info!("stdin closed, releasing SAP GUI objects...");
        engine.shutdown();
        uninit_com();
    }

    tracing::info!("Process exiting.");
}

#[cfg(windows)]
fn handle_command(
    engine: &mut Option<scripting::ScriptingEngine>,
    request: &sapgui_protocol::Request,
) -> Response {
    use sapgui_protocol::{Command, ResponseData, ResponseResult};

    let id = request.id;

    let result = match &request.command {
        Command::Init {
            saplogon_path,
            session_timeout_ms,
        } => init_com_and_engine(
            engine,
            saplogon_path.as_deref(),
            std::time::Duration::from_millis(*session_timeout_ms),
        ),
        Command::OpenSession { server } => with_engine(engine, |sap| {
            let (session, path) = sap.open_session(server)?;
            Ok(ResponseResult::with_data(ResponseData::SessionHandle {
                session,
                path,
            }))
        }),
        Command::GetObjectTree { session } => with_engine(engine, |sap| {
            let tree = sap.object_tree(*session)?;
            Ok(ResponseResult::with_data(ResponseData::Tree { tree }))
        }),
        Command::GetText { session, id } => with_engine(engine, |sap| {
            let text = sap.get_text(*session, id)?;
            Ok(ResponseResult::with_data(ResponseData::Text { text }))
        }),
        Command::SetText { session, id, text } => with_engine(engine, |sap| {
            sap.set_text(*session, id, text)?;
            Ok(ResponseResult::ok())
        }),
        Command::SendVKey {
            session,
            window,
            key,
        } => with_engine(engine, |sap| {
            sap.send_vkey(*session, *window, *key)?;
            Ok(ResponseResult::ok())
        }),
        Command::CloseWindow { session, id } => with_engine(engine, |sap| {
            sap.close_window(*session, id)?;
            Ok(ResponseResult::ok())
        }),
        Command::ReadTable { session, id } => with_engine(engine, |sap| {
            let rows = sap.read_table(*session, id)?;
            Ok(ResponseResult::with_data(ResponseData::Table { rows }))
        }),
        Command::Shutdown => {
            if let Some(sap) = engine.take() {
                sap.shutdown();
                uninit_com();
            }
            ResponseResult::ok()
        }
    };

    Response { id, result }
}

#[cfg(windows)]
fn init_com_and_engine(
    engine: &mut Option<scripting::ScriptingEngine>,
    saplogon_path: Option<&str>,
    session_timeout: std::time::Duration,
) -> sapgui_protocol::ResponseResult {
    use sapgui_protocol::ResponseResult;
    use windows::Win32::System::Com::{CoInitializeEx, COINIT_APARTMENTTHREADED};

    if engine.is_some() {
        return ResponseResult::ok();
    }

    // SAP GUI's scripting objects live in an STA.
    unsafe {
        let hr = CoInitializeEx(None, COINIT_APARTMENTTHREADED);
        if let Err(e) = hr.ok() {
            return ResponseResult::error(format!("CoInitializeEx failed: {e}"));
        }
    }
    tracing::info!("COM initialized (STA)");

    match scripting::ScriptingEngine::attach(saplogon_path, session_timeout) {
        Ok(sap) => {
            tracing::info!("Attached to SAP GUI scripting engine");
            *engine = Some(sap);
            ResponseResult::ok()
        }
        Err(e) => {
            uninit_com();
            ResponseResult::error(e)
        }
    }
}

#[cfg(windows)]
fn uninit_com() {
    unsafe {
        windows::Win32::System::Com::CoUninitialize();
    }
    tracing::info!("COM uninitialized");
}

#[cfg(windows)]
fn with_engine(
    engine: &mut Option<scripting::ScriptingEngine>,
    f: impl FnOnce(
        &mut scripting::ScriptingEngine,
    ) -> Result<sapgui_protocol::ResponseResult, error::CommandError>,
) -> sapgui_protocol::ResponseResult {
    match engine.as_mut() {
        Some(sap) => f(sap).unwrap_or_else(error::CommandError::into_response),
        None => sapgui_protocol::ResponseResult::error(
            "Scripting engine not attached. Send 'Init' command first.",
        ),
    }
}
