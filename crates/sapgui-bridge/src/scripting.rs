//! SAP GUI Scripting layer built on top of the generic IDispatch wrapper.

#![cfg(windows)]

use std::collections::{BTreeSet, HashMap};
use std::path::Path;
use std::process::{Child, Command};
use std::time::Duration;

use sapgui_protocol::{parse_object_tree, GuiNode};

use crate::connect::{wait_for, Application, Connection, Connector};
use crate::dispatch::{variant_bool, variant_get_string, variant_i32, variant_str, DispatchObject};
use crate::error::CommandError;
use crate::table::{read_grid_view, read_table_control, GridView, TableControl};

/// The scripting engine (`GuiApplication`) plus the sessions handed out to
/// the client.
pub struct ScriptingEngine {
    connector: Connector<DispatchObject>,
    sessions: HashMap<u64, DispatchObject>,
    next_handle: u64,
    saplogon: Option<Child>,
}

impl ScriptingEngine {
    /// Attach to the running SAP GUI. If it is not running and `saplogon_path`
    /// is given, start SAP Logon and keep trying until `session_timeout`.
    pub fn attach(saplogon_path: Option<&str>, session_timeout: Duration) -> Result<Self, String> {
        let mut saplogon = None;
        let sap_gui = match DispatchObject::get_object("SAPGUI") {
            Ok(obj) => obj,
            Err(first_err) => {
                let Some(path) = saplogon_path else {
                    return Err(format!("SAP GUI was not found! {first_err}"));
                };
                tracing::info!("SAP GUI not running, launching {path}");
                saplogon = Some(
                    Command::new(Path::new(path))
                        .spawn()
                        .map_err(|e| format!("Failed to launch '{path}': {e}"))?,
                );
                wait_for(session_timeout, || {
                    DispatchObject::get_object("SAPGUI").ok()
                })
                .ok_or_else(|| format!("SAP GUI was not found! {first_err}"))?
            }
        };

        let application = sap_gui
            .invoke_child("GetScriptingEngine", &[])
            .map_err(|e| format!("SAP Scripting Engine was not found! {e}"))?;

        Ok(Self {
            connector: Connector::new(application, session_timeout),
            sessions: HashMap::new(),
            next_handle: 1,
            saplogon,
        })
    }

    /// Hand out a session on the connection for `server`. Returns the handle
    /// and the session's scripting id.
    pub fn open_session(&mut self, server: &str) -> Result<(u64, String), CommandError> {
        let session = self.connector.open_session(server)?;
        let path = session.get_string("Id")?;
        let handle = self.next_handle;
        self.next_handle += 1;
        self.sessions.insert(handle, session);
        tracing::info!("Session {handle} is {path}");
        Ok((handle, path))
    }

    fn session(&self, handle: u64) -> Result<&DispatchObject, String> {
        self.sessions
            .get(&handle)
            .ok_or_else(|| format!("Unknown session handle: {handle}"))
    }

    fn find(&self, handle: u64, id: &str) -> Result<DispatchObject, String> {
        self.session(handle)?
            .invoke_child("FindById", &[variant_str(id)])
    }

    pub fn object_tree(&self, handle: u64) -> Result<GuiNode, String> {
        let json = self
            .session(handle)?
            .invoke_method("GetObjectTree", &[variant_str("")])?;
        let json = variant_get_string(&json)
            .ok_or_else(|| "GetObjectTree did not return a string".to_string())?;
        parse_object_tree(&json).map_err(|e| format!("Malformed object tree: {e}"))
    }

    pub fn get_text(&self, handle: u64, id: &str) -> Result<String, String> {
        self.find(handle, id)?.get_string("Text")
    }

    pub fn set_text(&self, handle: u64, id: &str, text: &str) -> Result<(), String> {
        self.find(handle, id)?.set_property("Text", variant_str(text))
    }

    pub fn send_vkey(&self, handle: u64, window: u32, key: u8) -> Result<(), String> {
        let wnd = self.find(handle, &format!("wnd[{window}]"))?;
        wnd.invoke_method("SendVKey", &[variant_i32(key as i32)])?;
        Ok(())
    }

    pub fn close_window(&mut self, handle: u64, id: &str) -> Result<(), String> {
        self.find(handle, id)?.invoke_method("Close", &[])?;
        if id == "wnd[0]" {
            self.sessions.remove(&handle);
        }
        Ok(())
    }

    pub fn read_table(&self, handle: u64, id: &str) -> Result<Vec<Vec<String>>, String> {
        let table = self.find(handle, id)?;
        let kind = table.get_string("Type")?;
        match kind.as_str() {
            "GuiTableControl" => read_table_control(&table),
            "GuiShell" if is_grid_view(&table) => read_grid_view(&table),
            "GuiShell" => Err(format!(
                "{} type object is not supported!",
                table.get_string("Text").unwrap_or_default()
            )),
            other => Err(format!("{other} type object is not supported!")),
        }
    }

    /// Forget all sessions. SAP GUI itself keeps running; it belongs to the user.
    pub fn shutdown(mut self) {
        self.sessions.clear();
        if let Some(saplogon) = self.saplogon.take() {
            tracing::debug!("Leaving SAP Logon (pid {}) running", saplogon.id());
        }
    }
}

fn is_grid_view(shell: &DispatchObject) -> bool {
    shell.get_string("SubType").ok().as_deref() == Some("GridView")
        || shell
            .get_string("Text")
            .map(|t| t.contains("GridViewCtrl"))
            .unwrap_or(false)
}

/// `Children` of a connection, or `Connections` of the application.
fn collection(parent: &DispatchObject, name: &str) -> Result<Vec<DispatchObject>, String> {
    let items = parent.get_child(name)?;
    (0..items.get_i32("Count")?)
        .map(|i| items.invoke_child("ElementAt", &[variant_i32(i)]))
        .collect()
}

impl Application for DispatchObject {
    type Connection = DispatchObject;

    fn connections(&self) -> Result<Vec<DispatchObject>, String> {
        collection(self, "Connections")
    }

    fn open_connection(&self, server: &str) -> Result<DispatchObject, String> {
        self.invoke_child("OpenConnection", &[variant_str(server), variant_bool(true)])
    }
}

impl Connection for DispatchObject {
    type Session = DispatchObject;

    fn description(&self) -> Result<String, String> {
        self.get_string("Description")
    }

    fn session_ids(&self) -> Result<BTreeSet<String>, String> {
        collection(self, "Children")?
            .iter()
            .map(|session| session.get_string("Id"))
            .collect()
    }

    fn session_at(&self, index: i32) -> Result<DispatchObject, String> {
        self.get_child("Children")?
            .invoke_child("ElementAt", &[variant_i32(index)])
    }

    fn create_session(&self) -> Result<(), String> {
        self.session_at(0)?.invoke_method("CreateSession", &[])?;
        Ok(())
    }

    fn session_by_id(&self, id: &str) -> Result<DispatchObject, String> {
        self.invoke_child("FindById", &[variant_str(id)])
    }
}

impl TableControl for DispatchObject {
    fn row_count(&self) -> Result<i32, String> {
        self.get_i32("RowCount")
    }

    fn cell_text(&self, row: i32, column: i32) -> Result<String, String> {
        self.invoke_child("GetCell", &[variant_i32(row), variant_i32(column)])?
            .get_string("Text")
    }
}

impl GridView for DispatchObject {
    fn row_count(&self) -> Result<i32, String> {
        self.get_i32("RowCount")
    }

    fn column_order(&self) -> Result<Vec<String>, String> {
        let order = self.get_child("ColumnOrder")?;
        (0..order.get_i32("Count")?)
            .map(|i| {
                let v = order.invoke_method("ElementAt", &[variant_i32(i)])?;
                variant_get_string(&v)
                    .ok_or_else(|| "ColumnOrder entry is not a string".to_string())
            })
            .collect()
    }

    fn set_first_visible_row(&self, row: i32) -> Result<(), String> {
        self.set_property("FirstVisibleRow", variant_i32(row))
    }

    fn set_first_visible_column(&self, column: &str) -> Result<(), String> {
        self.set_property("FirstVisibleColumn", variant_str(column))
    }

    fn cell_value(&self, row: i32, column: &str) -> Result<String, String> {
        let value = self.invoke_method("GetCellValue", &[variant_i32(row), variant_str(column)])?;
        variant_get_string(&value).ok_or_else(|| format!("Cell {row}/{column} is not a string"))
    }
}
