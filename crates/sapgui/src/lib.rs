//! Session and query helpers for SAP GUI Scripting.
//!
//! SAP GUI exposes its UI as a COM object tree. This crate talks to it
//! through a small Windows bridge process (`sapgui-bridge.exe`, run directly
//! on Windows or under WINE elsewhere) and offers a handful of conveniences
//! on top: transaction navigation, key presses, element lookup by id
//! fragment, field updates and table extraction.
//!
//! # Architecture
//!
//! ```text
//! Your Rust code
//!     └── Client / Session (this crate)
//!           └── Engine + SessionHandle
//!                 ├── BridgeEngine ── spawns: sapgui-bridge.exe
//!                 │                     └── COM: GetObject("SAPGUI").GetScriptingEngine
//!                 └── fake::FakeEngine (in-memory, for tests)
//! ```
//!
//! # Example
//!
//! ```rust,no_run
//! use sapgui::{BridgeConfig, Client, VKey};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut client = Client::new(BridgeConfig::default());
//!     let rows = client.with_session("PRD [Production]", |session| {
//!         session.open_transaction("SE16")?;
//!         session.update_field("DATABROWSE-TABLENAME", "T001")?;
//!         session.send_key(VKey::ENTER)?;
//!         session.send_key(VKey::EXECUTE)?;
//!         session.get_table("wnd[0]/usr/cntlGRID1/shellcont/shell")
//!     })?;
//!     println!("{} company codes", rows.len());
//!     client.shutdown()?;
//!     Ok(())
//! }
//! ```

mod bridge;
mod client;
mod engine;
mod error;
pub mod fake;
mod session;
mod vkey;

pub use bridge::{BridgeConfig, BridgeEngine, BridgeError, BridgeProcess, BridgeSession};
pub use client::Client;
pub use engine::{Engine, SessionHandle};
pub use error::{Result, SapError};
pub use sapgui_protocol::GuiNode;
pub use session::{Element, Session, MAIN_WINDOW, OK_CODE_FIELD};
pub use vkey::VKey;
