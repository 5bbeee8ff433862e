//! Client — hands out [`Session`]s on named SAP GUI connections.

use crate::bridge::{BridgeConfig, BridgeEngine};
use crate::engine::Engine;
use crate::error::Result;
use crate::session::Session;

/// Entry point to SAP GUI.
///
/// The engine is attached on the first [`Client::new_session`] call, not at
/// construction.
pub struct Client<E: Engine = BridgeEngine> {
    engine: E,
    attached: bool,
}

impl Client<BridgeEngine> {
    /// A client that drives SAP GUI through the bridge process.
    pub fn new(config: BridgeConfig) -> Self {
        Self::with_engine(BridgeEngine::new(config))
    }

    /// [`Client::new`] with [`BridgeConfig::from_env`].
    pub fn from_env() -> Self {
        Self::new(BridgeConfig::from_env())
    }
}

impl<E: Engine> Client<E> {
    pub fn with_engine(engine: E) -> Self {
        Self {
            engine,
            attached: false,
        }
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    /// Open a session on the connection named `server` (its SAP Logon
    /// description). An existing connection is reused; otherwise a new one is
    /// opened.
    pub fn new_session(&mut self, server: &str) -> Result<Session<E::Session>> {
        if !self.attached {
            self.engine.attach()?;
            self.attached = true;
        }
        tracing::info!("Opening session on '{server}'");
        let handle = self.engine.open_session(server)?;
        Ok(Session::new(handle))
    }

    /// Run `f` with a fresh session, closing it afterwards whatever `f`
    /// returns. An error from `f` takes precedence over a failed close.
    pub fn with_session<T>(
        &mut self,
        server: &str,
        f: impl FnOnce(&mut Session<E::Session>) -> Result<T>,
    ) -> Result<T> {
        let mut session = self.new_session(server)?;
        let outcome = f(&mut session);
        let closed = session.close();
        match (outcome, closed) {
            (Ok(value), Ok(())) => Ok(value),
            (Ok(_), Err(close_err)) => Err(close_err),
            (Err(err), Ok(())) => Err(err),
            (Err(err), Err(close_err)) => {
                tracing::warn!("Failed to close session after error: {close_err}");
                Err(err)
            }
        }
    }

    /// Release the engine (stops the bridge process).
    pub fn shutdown(mut self) -> Result<()> {
        self.engine.shutdown()
    }
}
