//! Session handle — navigation, lookup and field/table access on one SAP GUI
//! session.

use sapgui_protocol::GuiNode;

use crate::engine::SessionHandle;
use crate::error::{Result, SapError};
use crate::vkey::VKey;

/// The command field of the main window.
pub const OK_CODE_FIELD: &str = "wnd[0]/tbar[0]/okcd";
/// The main window. Closing it ends the session.
pub const MAIN_WINDOW: &str = "wnd[0]";

const TABLE_KINDS: &[&str] = &["GuiTableControl", "GuiShell"];

/// One SAP GUI session.
///
/// The session is open from construction until it is closed, either
/// explicitly with [`Session::close`] or implicitly when it is dropped
/// (including while unwinding from a panic). The underlying window is closed
/// exactly once.
pub struct Session<S: SessionHandle> {
    handle: S,
    transaction: Option<String>,
    closed: bool,
}

impl<S: SessionHandle> Session<S> {
    pub fn new(handle: S) -> Self {
        tracing::debug!("Session {} opened", handle.path());
        Self {
            handle,
            transaction: None,
            closed: false,
        }
    }

    /// Scripting id of the session, e.g. `/app/con[0]/ses[1]`.
    pub fn path(&self) -> &str {
        self.handle.path()
    }

    /// The transaction last entered with [`Session::open_transaction`].
    pub fn transaction(&self) -> Option<&str> {
        self.transaction.as_deref()
    }

    /// Access to the engine-level handle.
    pub fn handle(&self) -> &S {
        &self.handle
    }

    /// Leave the current transaction and enter `code`.
    pub fn open_transaction(&mut self, code: &str) -> Result<()> {
        tracing::debug!("Opening transaction {code} in {}", self.path());
        self.close_transaction()
            .and_then(|()| {
                self.handle.set_text(OK_CODE_FIELD, code)?;
                self.handle.send_vkey(0, VKey::ENTER)
            })
            .map_err(|source| SapError::Transaction {
                code: code.to_string(),
                source: Box::new(source),
            })?;
        self.transaction = Some(code.to_string());
        Ok(())
    }

    /// Enter `/n`, whether or not a transaction is open.
    pub fn close_transaction(&mut self) -> Result<()> {
        self.handle.set_text(OK_CODE_FIELD, "/n")?;
        self.handle.send_vkey(0, VKey::ENTER)?;
        self.transaction = None;
        Ok(())
    }

    /// Send a key to the main window.
    pub fn send_key(&self, key: VKey) -> Result<()> {
        self.send_key_to(0, key)
    }

    /// Send a key to `wnd[window]`.
    pub fn send_key_to(&self, window: u32, key: VKey) -> Result<()> {
        tracing::debug!("Sending {key} to wnd[{window}]");
        self.handle.send_vkey(window, key)
    }

    /// Send several keys to the main window, in order.
    pub fn send_keys(&self, keys: &[VKey]) -> Result<()> {
        self.send_keys_to(0, keys)
    }

    /// Send several keys to `wnd[window]`, in order. Stops at the first
    /// key the window rejects.
    pub fn send_keys_to(&self, window: u32, keys: &[VKey]) -> Result<()> {
        keys.iter().try_for_each(|key| self.send_key_to(window, *key))
    }

    /// Ids of every element whose id contains `needle`, in depth-first order.
    /// An empty needle matches every element.
    pub fn find_elements(&self, needle: &str) -> Result<Vec<String>> {
        let tree = self.handle.object_tree()?;
        Ok(tree
            .ids()
            .filter(|id| id.contains(needle))
            .map(str::to_string)
            .collect())
    }

    /// The element identified by `needle`.
    ///
    /// An element whose id equals `needle` (absolute, or relative to this
    /// session) is returned directly. Otherwise `needle` must be contained in
    /// exactly one element id.
    pub fn find_element(&self, needle: &str) -> Result<Element<'_, S>> {
        self.resolve(needle, false)
    }

    /// Like [`Session::find_element`], but takes the first match in
    /// depth-first order when several ids contain `needle`.
    pub fn find_first_element(&self, needle: &str) -> Result<Element<'_, S>> {
        self.resolve(needle, true)
    }

    fn resolve(&self, needle: &str, take_first: bool) -> Result<Element<'_, S>> {
        let tree = self.handle.object_tree()?;
        if let Some(node) = self.exact_match(&tree, needle) {
            return Ok(Element::new(self, node));
        }

        let mut matches = tree
            .walk()
            .filter(|node| !node.id.is_empty() && node.id.contains(needle));
        let first = matches
            .next()
            .ok_or_else(|| SapError::ElementNotFound(needle.to_string()))?;
        if !take_first {
            let rest: Vec<String> = matches.map(|node| node.id.clone()).collect();
            if !rest.is_empty() {
                let mut all = vec![first.id.clone()];
                all.extend(rest);
                return Err(SapError::AmbiguousElement {
                    needle: needle.to_string(),
                    matches: all,
                });
            }
        }
        Ok(Element::new(self, first))
    }

    fn exact_match<'t>(&self, tree: &'t GuiNode, needle: &str) -> Option<&'t GuiNode> {
        if needle.is_empty() {
            return None;
        }
        let relative = format!("{}/{}", self.path(), needle.trim_start_matches('/'));
        tree.walk()
            .find(|node| node.id == needle || node.id == relative)
    }

    /// Set the text of the element identified by `id`.
    pub fn update_field(&self, id: &str, value: &str) -> Result<()> {
        tracing::debug!("Updating {id}");
        self.find_element(id)?.set_text(value)
    }

    /// Set several fields in order. Stops at the first failure; fields set
    /// before it keep their new value.
    pub fn update_fields<I, K, V>(&self, fields: I) -> Result<()>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        fields
            .into_iter()
            .try_for_each(|(id, value)| self.update_field(id.as_ref(), value.as_ref()))
    }

    /// Text of the element identified by `id`.
    pub fn read_field(&self, id: &str) -> Result<String> {
        self.find_element(id)?.text()
    }

    /// Contents of a table control or grid view, row by row. Rows without
    /// any cells are dropped.
    pub fn get_table(&self, id: &str) -> Result<Vec<Vec<String>>> {
        let table = self.find_first_element(id)?;
        if !table.kind.is_empty() && !TABLE_KINDS.contains(&table.kind.as_str()) {
            return Err(SapError::UnsupportedTable {
                id: table.path,
                kind: table.kind,
            });
        }
        let mut rows = self.handle.read_table(&table.path)?;
        rows.retain(|row| !row.is_empty());
        tracing::debug!("Read {} rows from {}", rows.len(), table.path);
        Ok(rows)
    }

    /// Close the session's main window.
    pub fn close(mut self) -> Result<()> {
        self.close_once()
    }

    fn close_once(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        tracing::debug!("Closing session {}", self.path());
        self.handle.close_window(MAIN_WINDOW)
    }
}

impl<S: SessionHandle> Drop for Session<S> {
    fn drop(&mut self) {
        if let Err(e) = self.close_once() {
            tracing::warn!("Failed to close session {}: {e}", self.handle.path());
        }
    }
}

/// An element resolved by [`Session::find_element`].
pub struct Element<'s, S: SessionHandle> {
    session: &'s Session<S>,
    path: String,
    kind: String,
}

impl<'s, S: SessionHandle> Element<'s, S> {
    fn new(session: &'s Session<S>, node: &GuiNode) -> Self {
        Self {
            session,
            path: node.id.clone(),
            kind: node.kind.clone(),
        }
    }

    /// Full scripting id.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Scripting type, e.g. `GuiTextField`. Empty when the engine did not
    /// report one.
    pub fn kind(&self) -> &str {
        &self.kind
    }

    pub fn text(&self) -> Result<String> {
        self.session.handle.text(&self.path)
    }

    pub fn set_text(&self, value: &str) -> Result<()> {
        self.session.handle.set_text(&self.path, value)
    }
}

impl<S: SessionHandle> std::fmt::Debug for Element<'_, S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Element")
            .field("path", &self.path)
            .field("kind", &self.kind)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fake::{FakeScreen, FakeSession};
    use pretty_assertions::assert_eq;

    const SES: &str = "/app/con[0]/ses[0]";

    fn screen() -> FakeScreen {
        FakeScreen::new(SES)
            .field("wnd[0]/usr/txtRSYST-BNAME", "")
            .field("wnd[0]/usr/pwdRSYST-BCODE", "")
            .field("wnd[0]/usr/txtRSYST-LANGU", "EN")
            .node("wnd[0]/sbar", "GuiStatusbar")
    }

    fn session() -> (Session<FakeSession>, FakeSession) {
        let fake = FakeSession::from_screen(screen());
        (Session::new(fake.clone()), fake)
    }

    #[test]
    fn find_elements_filters_by_substring_in_tree_order() {
        let (session, _) = session();
        assert_eq!(
            session.find_elements("RSYST").unwrap(),
            vec![
                format!("{SES}/wnd[0]/usr/txtRSYST-BNAME"),
                format!("{SES}/wnd[0]/usr/pwdRSYST-BCODE"),
                format!("{SES}/wnd[0]/usr/txtRSYST-LANGU"),
            ]
        );
        assert!(session.find_elements("nothing-like-this").unwrap().is_empty());
    }

    #[test]
    fn find_element_prefers_exact_id() {
        let (session, _) = session();
        // "wnd[0]" is contained in every id below the main window.
        let wnd = session.find_element(&format!("{SES}/wnd[0]")).unwrap();
        assert_eq!(wnd.kind(), "GuiMainWindow");

        let relative = session.find_element("wnd[0]/usr").unwrap();
        assert_eq!(relative.path(), format!("{SES}/wnd[0]/usr"));
    }

    #[test]
    fn find_element_accepts_unique_fragment() {
        let (session, _) = session();
        let field = session.find_element("BNAME").unwrap();
        assert_eq!(field.path(), format!("{SES}/wnd[0]/usr/txtRSYST-BNAME"));
        assert_eq!(field.kind(), "GuiTextField");
    }

    #[test]
    fn find_element_rejects_missing_and_ambiguous() {
        let (session, _) = session();
        match session.find_element("MANDT") {
            Err(SapError::ElementNotFound(needle)) => assert_eq!(needle, "MANDT"),
            other => panic!("unexpected: {other:?}"),
        }
        match session.find_element("RSYST") {
            Err(SapError::AmbiguousElement { matches, .. }) => assert_eq!(matches.len(), 3),
            other => panic!("unexpected: {other:?}"),
        }
        let first = session.find_first_element("RSYST").unwrap();
        assert_eq!(first.path(), format!("{SES}/wnd[0]/usr/txtRSYST-BNAME"));
    }

    #[test]
    fn empty_needle_is_never_an_exact_match() {
        let (session, _) = session();
        assert!(matches!(
            session.find_element(""),
            Err(SapError::AmbiguousElement { .. })
        ));
    }

    #[test]
    fn open_transaction_leaves_previous_one_first() {
        let (mut session, fake) = session();
        session.open_transaction("SU01").unwrap();
        session.open_transaction("VA03").unwrap();
        assert_eq!(session.transaction(), Some("VA03"));
        assert_eq!(fake.commands(), vec!["/n", "SU01", "/n", "VA03"]);

        session.close_transaction().unwrap();
        assert_eq!(session.transaction(), None);
        assert_eq!(fake.commands().last().map(String::as_str), Some("/n"));
    }

    #[test]
    fn open_transaction_wraps_engine_failure() {
        let fake = FakeSession::from_screen(
            screen().broken(OK_CODE_FIELD, "The control could not be found by id."),
        );
        let mut session = Session::new(fake);
        match session.open_transaction("SU01") {
            Err(SapError::Transaction { code, source }) => {
                assert_eq!(code, "SU01");
                assert_eq!(source.to_string(), "The control could not be found by id.");
            }
            other => panic!("unexpected: {other:?}"),
        }
        assert_eq!(session.transaction(), None);
    }

    #[test]
    fn send_keys_in_order() {
        let fake = FakeSession::from_screen(screen().node("wnd[1]", "GuiModalWindow"));
        let session = Session::new(fake.clone());
        session
            .send_keys(&[VKey::F8, VKey::BACK, VKey::ENTER])
            .unwrap();
        session.send_key_to(1, VKey::CANCEL).unwrap();
        assert_eq!(
            fake.keys(),
            vec![(0, VKey::F8), (0, VKey::BACK), (0, VKey::ENTER), (1, VKey::CANCEL)]
        );
    }

    #[test]
    fn send_keys_to_popup_window() {
        let fake = FakeSession::from_screen(screen().node("wnd[1]", "GuiModalWindow"));
        let session = Session::new(fake.clone());
        session.send_keys_to(1, &[VKey::F4, VKey::ENTER]).unwrap();
        assert_eq!(fake.keys(), vec![(1, VKey::F4), (1, VKey::ENTER)]);
    }

    #[test]
    fn send_keys_to_missing_window_fails() {
        let (session, fake) = session();
        assert!(session.send_keys_to(2, &[VKey::ENTER, VKey::F3]).is_err());
        assert!(fake.keys().is_empty());
    }

    #[test]
    fn update_then_read_field() {
        let (session, fake) = session();
        session.update_field("BNAME", "DEVELOPER").unwrap();
        assert_eq!(session.read_field("BNAME").unwrap(), "DEVELOPER");
        assert_eq!(
            fake.text_of(&format!("{SES}/wnd[0]/usr/txtRSYST-BNAME")),
            Some("DEVELOPER".to_string())
        );
    }

    #[test]
    fn update_fields_stops_at_first_failure() {
        let (session, _) = session();
        let result = session.update_fields([("BNAME", "DEVELOPER"), ("MANDT", "100"), ("LANGU", "DE")]);
        assert!(matches!(result, Err(SapError::ElementNotFound(_))));
        assert_eq!(session.read_field("BNAME").unwrap(), "DEVELOPER");
        assert_eq!(session.read_field("LANGU").unwrap(), "EN");
    }

    #[test]
    fn get_table_drops_empty_rows() {
        let fake = FakeSession::from_screen(screen().table(
            "wnd[0]/usr/tblSAPMV45ATCTRL_U_ERF_AUFTRAG",
            "GuiTableControl",
            vec![
                vec!["10".into(), "MAT-1".into()],
                vec![],
                vec!["20".into(), "MAT-2".into()],
            ],
        ));
        let session = Session::new(fake);
        assert_eq!(
            session.get_table("TCTRL").unwrap(),
            vec![vec!["10", "MAT-1"], vec!["20", "MAT-2"]]
        );
    }

    #[test]
    fn get_table_rejects_non_table_elements() {
        let (session, _) = session();
        match session.get_table("BNAME") {
            Err(SapError::UnsupportedTable { kind, .. }) => assert_eq!(kind, "GuiTextField"),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn close_runs_once() {
        let (session, fake) = session();
        session.close().unwrap();
        assert_eq!(fake.close_count(), 1);
    }

    #[test]
    fn drop_closes() {
        let (session, fake) = session();
        drop(session);
        assert_eq!(fake.close_count(), 1);
    }
}
