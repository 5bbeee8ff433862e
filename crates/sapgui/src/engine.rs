//! The seam between [`Session`](crate::Session) and whatever actually talks
//! to SAP GUI.
//!
//! [`BridgeEngine`](crate::BridgeEngine) forwards everything to the COM bridge
//! process; [`FakeEngine`](crate::fake::FakeEngine) serves an in-memory tree.

use sapgui_protocol::GuiNode;

use crate::error::Result;
use crate::vkey::VKey;

/// Capabilities of one live SAP GUI session.
///
/// Element ids may be absolute (`/app/con[0]/ses[0]/wnd[0]/usr`) or relative
/// to the session (`wnd[0]/usr`), as with `GuiSession.FindById`.
pub trait SessionHandle {
    /// Scripting id of the session, e.g. `/app/con[0]/ses[1]`.
    fn path(&self) -> &str;

    fn object_tree(&self) -> Result<GuiNode>;

    fn text(&self, id: &str) -> Result<String>;

    fn set_text(&self, id: &str, text: &str) -> Result<()>;

    fn send_vkey(&self, window: u32, key: VKey) -> Result<()>;

    fn close_window(&self, id: &str) -> Result<()>;

    /// Rows of a `GuiTableControl` or grid view, in display order.
    fn read_table(&self, id: &str) -> Result<Vec<Vec<String>>>;
}

/// Root of the scripting object model: hands out sessions by server name.
pub trait Engine {
    type Session: SessionHandle;

    /// Make the engine usable. Called once before the first session is opened.
    fn attach(&mut self) -> Result<()>;

    fn open_session(&mut self, server: &str) -> Result<Self::Session>;

    /// Release the engine. Sessions handed out earlier become unusable.
    fn shutdown(&mut self) -> Result<()> {
        Ok(())
    }
}
