//! In-memory stand-in for SAP GUI, for testing code built on [`Session`].
//!
//! A [`FakeScreen`] describes the elements of one session: an object tree,
//! the text of each element and the contents of tables. [`FakeSession`]
//! serves it through [`SessionHandle`] and records what was done to it.
//!
//! [`Session`]: crate::Session

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use sapgui_protocol::GuiNode;

use crate::engine::{Engine, SessionHandle};
use crate::error::{Result, SapError};
use crate::session::{MAIN_WINDOW, OK_CODE_FIELD};
use crate::vkey::VKey;

const NOT_FOUND: &str = "The control could not be found by id.";

/// Elements of one fake session. Ids passed to the builder methods are
/// relative to the session path.
#[derive(Debug, Clone)]
pub struct FakeScreen {
    tree: GuiNode,
    texts: HashMap<String, String>,
    tables: HashMap<String, Vec<Vec<String>>>,
    broken: HashMap<String, String>,
}

impl FakeScreen {
    /// A session with a main window, its system toolbar and OK-code field,
    /// and an empty user area.
    pub fn new(session_path: &str) -> Self {
        let screen = Self {
            tree: GuiNode::new(session_path, "GuiSession"),
            texts: HashMap::new(),
            tables: HashMap::new(),
            broken: HashMap::new(),
        };
        screen
            .node(MAIN_WINDOW, "GuiMainWindow")
            .node("wnd[0]/tbar[0]", "GuiToolbar")
            .field(OK_CODE_FIELD, "")
            .node("wnd[0]/usr", "GuiUserArea")
    }

    fn absolute(&self, id: &str) -> String {
        format!("{}/{}", self.tree.id, id.trim_start_matches('/'))
    }

    /// Add an element. Missing ancestors are created without a type.
    pub fn node(mut self, id: &str, kind: &str) -> Self {
        let id = self.absolute(id);
        insert(&mut self.tree, &id, kind);
        self
    }

    /// Add an input field (`GuiOkCodeField` for the OK-code, `GuiTextField`
    /// otherwise) holding `text`.
    pub fn field(self, id: &str, text: &str) -> Self {
        let kind = if id == OK_CODE_FIELD {
            "GuiOkCodeField"
        } else {
            "GuiTextField"
        };
        let mut screen = self.node(id, kind);
        let id = screen.absolute(id);
        screen.texts.insert(id, text.to_string());
        screen
    }

    /// Add a table element of type `kind` with the given rows.
    pub fn table(self, id: &str, kind: &str, rows: Vec<Vec<String>>) -> Self {
        let mut screen = self.node(id, kind);
        let id = screen.absolute(id);
        screen.tables.insert(id, rows);
        screen
    }

    /// Make every access to `id` fail with `message`.
    pub fn broken(mut self, id: &str, message: &str) -> Self {
        let id = self.absolute(id);
        self.broken.insert(id, message.to_string());
        self
    }
}

/// Insert `id` below `node`, whose id is a path prefix of `id`.
fn insert(node: &mut GuiNode, id: &str, kind: &str) {
    let rest = &id[node.id.len() + 1..];
    let child_id = match rest.find('/') {
        Some(i) => &id[..node.id.len() + 1 + i],
        None => id,
    };
    let is_target = child_id == id;

    let index = match node.children.iter().position(|c| c.id == child_id) {
        Some(index) => index,
        None => {
            node.children.push(GuiNode::new(child_id, if is_target { kind } else { "" }));
            node.children.len() - 1
        }
    };
    let child = &mut node.children[index];
    if is_target {
        if !kind.is_empty() {
            child.kind = kind.to_string();
        }
    } else {
        insert(child, id, kind);
    }
}

#[derive(Debug)]
struct FakeState {
    screen: FakeScreen,
    keys: Vec<(u32, VKey)>,
    commands: Vec<String>,
    closes: usize,
    closed: bool,
}

/// A fake session. Clones share state, so a test can keep one clone for
/// inspection while a [`Session`](crate::Session) owns another.
#[derive(Debug, Clone)]
pub struct FakeSession {
    path: String,
    state: Arc<Mutex<FakeState>>,
}

impl FakeSession {
    pub fn from_screen(screen: FakeScreen) -> Self {
        Self {
            path: screen.tree.id.clone(),
            state: Arc::new(Mutex::new(FakeState {
                screen,
                keys: Vec::new(),
                commands: Vec::new(),
                closes: 0,
                closed: false,
            })),
        }
    }

    /// Keys sent so far, with the window number they went to.
    pub fn keys(&self) -> Vec<(u32, VKey)> {
        self.state.lock().keys.clone()
    }

    /// OK-codes submitted with Enter, in order.
    pub fn commands(&self) -> Vec<String> {
        self.state.lock().commands.clone()
    }

    /// How many times the main window was closed.
    pub fn close_count(&self) -> usize {
        self.state.lock().closes
    }

    /// Current text of an element, by absolute id.
    pub fn text_of(&self, id: &str) -> Option<String> {
        self.state.lock().screen.texts.get(id).cloned()
    }

    /// Absolute id of an existing element, or the engine's not-found error.
    fn lookup(&self, state: &FakeState, id: &str) -> Result<String> {
        if state.closed {
            return Err(SapError::Engine(
                "The session is no longer available.".to_string(),
            ));
        }
        let absolute = if id.starts_with("/app/") {
            id.to_string()
        } else {
            state.screen.absolute(id)
        };
        if let Some(message) = state.screen.broken.get(&absolute) {
            return Err(SapError::Engine(message.clone()));
        }
        match state.screen.tree.find(&absolute) {
            Some(_) => Ok(absolute),
            None => Err(SapError::Engine(NOT_FOUND.to_string())),
        }
    }
}

impl SessionHandle for FakeSession {
    fn path(&self) -> &str {
        &self.path
    }

    fn object_tree(&self) -> Result<GuiNode> {
        let state = self.state.lock();
        if state.closed {
            return Err(SapError::Engine(
                "The session is no longer available.".to_string(),
            ));
        }
        Ok(state.screen.tree.clone())
    }

    fn text(&self, id: &str) -> Result<String> {
        let state = self.state.lock();
        let id = self.lookup(&state, id)?;
        Ok(state.screen.texts.get(&id).cloned().unwrap_or_default())
    }

    fn set_text(&self, id: &str, text: &str) -> Result<()> {
        let mut state = self.state.lock();
        let id = self.lookup(&state, id)?;
        state.screen.texts.insert(id, text.to_string());
        Ok(())
    }

    fn send_vkey(&self, window: u32, key: VKey) -> Result<()> {
        let mut state = self.state.lock();
        let wnd = format!("wnd[{window}]");
        self.lookup(&state, &wnd)?;
        state.keys.push((window, key));

        // Enter on the main window submits whatever is in the OK-code field.
        if window == 0 && key == VKey::ENTER {
            let okcd = state.screen.absolute(OK_CODE_FIELD);
            let submitted = state.screen.texts.get_mut(&okcd).map(std::mem::take);
            if let Some(code) = submitted.filter(|code| !code.is_empty()) {
                state.commands.push(code);
            }
        }
        Ok(())
    }

    fn close_window(&self, id: &str) -> Result<()> {
        let mut state = self.state.lock();
        let absolute = self.lookup(&state, id)?;
        if absolute == state.screen.absolute(MAIN_WINDOW) {
            state.closes += 1;
            state.closed = true;
        }
        Ok(())
    }

    fn read_table(&self, id: &str) -> Result<Vec<Vec<String>>> {
        let state = self.state.lock();
        let id = self.lookup(&state, id)?;
        state
            .screen
            .tables
            .get(&id)
            .cloned()
            .ok_or_else(|| SapError::Engine(format!("{id} is not a table")))
    }
}

/// A fake engine serving one [`FakeScreen`] per server name.
#[derive(Debug, Default)]
pub struct FakeEngine {
    servers: HashMap<String, FakeScreen>,
    attach_error: Option<String>,
    attaches: usize,
    sessions: Vec<FakeSession>,
}

impl FakeEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve `screen` for sessions opened on `server`.
    pub fn with_server(mut self, server: &str, screen: FakeScreen) -> Self {
        self.servers.insert(server.to_string(), screen);
        self
    }

    /// Make [`Engine::attach`] fail, as when SAP GUI is not running.
    pub fn unavailable(mut self, message: &str) -> Self {
        self.attach_error = Some(message.to_string());
        self
    }

    pub fn attach_count(&self) -> usize {
        self.attaches
    }

    /// Every session handed out so far.
    pub fn sessions(&self) -> &[FakeSession] {
        &self.sessions
    }
}

impl Engine for FakeEngine {
    type Session = FakeSession;

    fn attach(&mut self) -> Result<()> {
        if let Some(message) = &self.attach_error {
            return Err(SapError::Engine(message.clone()));
        }
        self.attaches += 1;
        Ok(())
    }

    fn open_session(&mut self, server: &str) -> Result<FakeSession> {
        let screen = self.servers.get(server).ok_or_else(|| {
            SapError::Engine(format!(
                "Connection to server: {server} could not be established!"
            ))
        })?;
        let session = FakeSession::from_screen(screen.clone());
        self.sessions.push(session.clone());
        Ok(session)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn builder_creates_missing_ancestors() {
        let screen = FakeScreen::new("/app/con[0]/ses[0]")
            .field("wnd[0]/usr/sub:SAPLSZA1:0300/txtADDR1_DATA-NAME1", "ACME");
        let ids: Vec<&str> = screen.tree.ids().collect();
        assert_eq!(
            ids,
            vec![
                "/app/con[0]/ses[0]",
                "/app/con[0]/ses[0]/wnd[0]",
                "/app/con[0]/ses[0]/wnd[0]/tbar[0]",
                "/app/con[0]/ses[0]/wnd[0]/tbar[0]/okcd",
                "/app/con[0]/ses[0]/wnd[0]/usr",
                "/app/con[0]/ses[0]/wnd[0]/usr/sub:SAPLSZA1:0300",
                "/app/con[0]/ses[0]/wnd[0]/usr/sub:SAPLSZA1:0300/txtADDR1_DATA-NAME1",
            ]
        );
        let sub = screen
            .tree
            .find("/app/con[0]/ses[0]/wnd[0]/usr/sub:SAPLSZA1:0300")
            .unwrap();
        assert_eq!(sub.kind, "");
    }

    #[test]
    fn relative_and_absolute_ids_resolve_alike() {
        let fake = FakeSession::from_screen(
            FakeScreen::new("/app/con[0]/ses[0]").field("wnd[0]/usr/txtA", "x"),
        );
        assert_eq!(fake.text("wnd[0]/usr/txtA").unwrap(), "x");
        assert_eq!(fake.text("/app/con[0]/ses[0]/wnd[0]/usr/txtA").unwrap(), "x");
        assert_eq!(
            fake.text("wnd[0]/usr/txtB").unwrap_err().to_string(),
            NOT_FOUND
        );
    }

    #[test]
    fn closed_session_rejects_calls() {
        let fake = FakeSession::from_screen(FakeScreen::new("/app/con[0]/ses[0]"));
        fake.close_window("wnd[0]").unwrap();
        assert!(fake.object_tree().is_err());
        assert!(fake.close_window("wnd[0]").is_err());
        assert_eq!(fake.close_count(), 1);
    }
}
