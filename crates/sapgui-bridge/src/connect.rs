//! Resolving a server name to a connection, and a connection to a session.

use std::collections::{BTreeSet, HashMap};
use std::thread;
use std::time::{Duration, Instant};

use crate::error::CommandError;

const POLL_INTERVAL: Duration = Duration::from_millis(250);

/// The scripting engine's `GuiApplication`.
pub trait Application {
    type Connection: Connection;

    /// Every open connection (`Connections`).
    fn connections(&self) -> Result<Vec<Self::Connection>, String>;

    /// `OpenConnection(server, true)`.
    fn open_connection(&self, server: &str) -> Result<Self::Connection, String>;
}

/// A `GuiConnection`.
pub trait Connection: Clone {
    type Session;

    /// The SAP Logon entry name the connection was opened for.
    fn description(&self) -> Result<String, String>;

    /// Ids of the sessions currently open on the connection.
    fn session_ids(&self) -> Result<BTreeSet<String>, String>;

    fn session_at(&self, index: i32) -> Result<Self::Session, String>;

    /// `CreateSession` on the first session. The new session shows up some
    /// time after the call returns.
    fn create_session(&self) -> Result<(), String>;

    fn session_by_id(&self, id: &str) -> Result<Self::Session, String>;
}

/// Hands out sessions, reusing connections by their description.
pub struct Connector<A: Application> {
    application: A,
    /// Connections already resolved, keyed by server.
    connections: HashMap<String, A::Connection>,
    session_timeout: Duration,
}

impl<A: Application> Connector<A> {
    pub fn new(application: A, session_timeout: Duration) -> Self {
        Self {
            application,
            connections: HashMap::new(),
            session_timeout,
        }
    }

    /// A fresh connection hands out its first session. An existing one gets
    /// a new session through `CreateSession`, which is waited for until
    /// the session timeout.
    pub fn open_session(
        &mut self,
        server: &str,
    ) -> Result<<A::Connection as Connection>::Session, CommandError> {
        let (connection, reused) = self.connection(server)?;
        if !reused {
            return Ok(connection.session_at(0)?);
        }

        let before = connection.session_ids()?;
        connection.create_session()?;
        let new_id = wait_for(self.session_timeout, || {
            let after = connection.session_ids().ok()?;
            after.difference(&before).next().cloned()
        })
        .ok_or_else(|| CommandError::Timeout {
            server: server.to_string(),
            after: self.session_timeout,
        })?;
        tracing::debug!("New session {new_id} on '{server}'");
        Ok(connection.session_by_id(&new_id)?)
    }

    /// Resolve the connection for `server`; `true` when it existed already.
    fn connection(&mut self, server: &str) -> Result<(A::Connection, bool), String> {
        if let Some(conn) = self.connections.get(server) {
            if conn.description().ok().as_deref() == Some(server) {
                return Ok((conn.clone(), true));
            }
        }

        for conn in self.application.connections()? {
            if conn.description()? == server {
                tracing::info!("Attached to existing connection '{server}'");
                self.connections.insert(server.to_string(), conn.clone());
                return Ok((conn, true));
            }
        }

        tracing::info!("Opening new connection '{server}'");
        let conn = self
            .application
            .open_connection(server)
            .map_err(|e| format!("Connection to server: {server} could not be established! {e}"))?;
        self.connections.insert(server.to_string(), conn.clone());
        Ok((conn, false))
    }
}

/// Poll `probe` until it yields a value or `timeout` has elapsed. The probe
/// always runs at least once.
pub fn wait_for<T>(timeout: Duration, mut probe: impl FnMut() -> Option<T>) -> Option<T> {
    let start = Instant::now();
    loop {
        if let Some(found) = probe() {
            return Some(found);
        }
        if start.elapsed() >= timeout {
            return None;
        }
        thread::sleep(POLL_INTERVAL);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::cell::{Cell, RefCell};
    use std::rc::Rc;

    #[derive(Clone)]
    struct FakeConnection {
        description: String,
        sessions: Rc<RefCell<Vec<String>>>,
        /// `CreateSession` succeeds but nothing ever appears.
        stalls: bool,
        creates: Rc<Cell<usize>>,
    }

    impl FakeConnection {
        fn new(index: usize, description: &str) -> Self {
            Self {
                description: description.to_string(),
                sessions: Rc::new(RefCell::new(vec![format!("/app/con[{index}]/ses[0]")])),
                stalls: false,
                creates: Rc::new(Cell::new(0)),
            }
        }
    }

    impl Connection for FakeConnection {
        type Session = String;

        fn description(&self) -> Result<String, String> {
            Ok(self.description.clone())
        }

        fn session_ids(&self) -> Result<BTreeSet<String>, String> {
            Ok(self.sessions.borrow().iter().cloned().collect())
        }

        fn session_at(&self, index: i32) -> Result<String, String> {
            self.sessions
                .borrow()
                .get(index as usize)
                .cloned()
                .ok_or_else(|| "Index out of range".to_string())
        }

        fn create_session(&self) -> Result<(), String> {
            self.creates.set(self.creates.get() + 1);
            if !self.stalls {
                let mut sessions = self.sessions.borrow_mut();
                let first = sessions[0].clone();
                let next = first.replace("ses[0]", &format!("ses[{}]", sessions.len()));
                sessions.push(next);
            }
            Ok(())
        }

        fn session_by_id(&self, id: &str) -> Result<String, String> {
            self.sessions
                .borrow()
                .iter()
                .find(|s| *s == id)
                .cloned()
                .ok_or_else(|| "The control could not be found by id.".to_string())
        }
    }

    #[derive(Default)]
    struct FakeApplication {
        connections: RefCell<Vec<FakeConnection>>,
        unreachable: bool,
        scans: Cell<usize>,
    }

    impl FakeApplication {
        fn with_connection(self, conn: FakeConnection) -> Self {
            self.connections.borrow_mut().push(conn);
            self
        }

        fn opened(&self) -> Vec<String> {
            self.connections
                .borrow()
                .iter()
                .map(|c| c.description.clone())
                .collect()
        }
    }

    impl Application for FakeApplication {
        type Connection = FakeConnection;

        fn connections(&self) -> Result<Vec<FakeConnection>, String> {
            self.scans.set(self.scans.get() + 1);
            Ok(self.connections.borrow().clone())
        }

        fn open_connection(&self, server: &str) -> Result<FakeConnection, String> {
            if self.unreachable {
                return Err("SAP Logon entry not found".to_string());
            }
            let mut connections = self.connections.borrow_mut();
            let conn = FakeConnection::new(connections.len(), server);
            connections.push(conn.clone());
            Ok(conn)
        }
    }

    const TIMEOUT: Duration = Duration::from_secs(5);

    #[test]
    fn fresh_connection_uses_its_first_session() {
        let mut connector = Connector::new(FakeApplication::default(), TIMEOUT);
        let session = connector.open_session("DEV [Development]").unwrap();
        assert_eq!(session, "/app/con[0]/ses[0]");
        assert_eq!(connector.application.opened(), vec!["DEV [Development]"]);
    }

    #[test]
    fn existing_connection_is_reused_by_description() {
        let existing = FakeConnection::new(0, "DEV [Development]");
        let creates = Rc::clone(&existing.creates);
        let app = FakeApplication::default().with_connection(existing);
        let mut connector = Connector::new(app, TIMEOUT);

        let session = connector.open_session("DEV [Development]").unwrap();
        assert_eq!(session, "/app/con[0]/ses[1]");
        assert_eq!(creates.get(), 1);
        assert_eq!(connector.application.opened(), vec!["DEV [Development]"]);
    }

    #[test]
    fn other_description_opens_a_new_connection() {
        let app = FakeApplication::default().with_connection(FakeConnection::new(0, "QAS [Quality]"));
        let mut connector = Connector::new(app, TIMEOUT);

        let session = connector.open_session("DEV [Development]").unwrap();
        assert_eq!(session, "/app/con[1]/ses[0]");
        assert_eq!(
            connector.application.opened(),
            vec!["QAS [Quality]", "DEV [Development]"]
        );
    }

    #[test]
    fn second_session_on_the_same_server_creates_one() {
        let mut connector = Connector::new(FakeApplication::default(), TIMEOUT);
        let first = connector.open_session("DEV [Development]").unwrap();
        let second = connector.open_session("DEV [Development]").unwrap();
        assert_eq!(first, "/app/con[0]/ses[0]");
        assert_eq!(second, "/app/con[0]/ses[1]");
        // The cached connection is used; the connection list is scanned once.
        assert_eq!(connector.application.scans.get(), 1);
    }

    #[test]
    fn session_that_never_appears_times_out() {
        let mut stalled = FakeConnection::new(0, "DEV [Development]");
        stalled.stalls = true;
        let app = FakeApplication::default().with_connection(stalled);
        let mut connector = Connector::new(app, Duration::ZERO);

        match connector.open_session("DEV [Development]") {
            Err(CommandError::Timeout { server, after }) => {
                assert_eq!(server, "DEV [Development]");
                assert_eq!(after, Duration::ZERO);
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn unreachable_server_is_a_connection_error() {
        let app = FakeApplication {
            unreachable: true,
            ..FakeApplication::default()
        };
        let mut connector = Connector::new(app, TIMEOUT);
        match connector.open_session("PRD") {
            Err(CommandError::Failed(message)) => assert_eq!(
                message,
                "Connection to server: PRD could not be established! SAP Logon entry not found"
            ),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn wait_for_polls_until_found() {
        let mut calls = 0;
        let found = wait_for(TIMEOUT, || {
            calls += 1;
            (calls == 2).then_some(calls)
        });
        assert_eq!(found, Some(2));
    }
}
