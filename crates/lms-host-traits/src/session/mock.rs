use super::errors::{Error, ErrorCode};
use super::session::{ConnectorInner, Namespace, Session, SessionInner};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

#[derive(Default)]
struct MockState {
    loaded: HashMap<Namespace, HashSet<String>>,
    faults: HashMap<String, ErrorCode>,
    delays: HashMap<String, Duration>,
    refuse_connections: bool,
    opened: usize,
    closed: usize,
    in_flight: usize,
    max_in_flight: usize,
    requests: Vec<(Namespace, String)>,
}

/// In-memory model host. Cloning shares the same state.
#[derive(Clone, Default)]
pub struct MockServer {
    state: Arc<Mutex<MockState>>,
}

impl MockServer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn load(&self, namespace: Namespace, identifier: &str) -> &Self {
        self.state()
            .loaded
            .entry(namespace)
            .or_default()
            .insert(identifier.to_string());
        self
    }

    /// Every unload of `identifier` fails with `code`.
    pub fn fail(&self, identifier: &str, code: ErrorCode) -> &Self {
        self.state().faults.insert(identifier.to_string(), code);
        self
    }

    /// Unloads of `identifier` take `latency` before answering.
    pub fn delay(&self, identifier: &str, latency: Duration) -> &Self {
        self.state().delays.insert(identifier.to_string(), latency);
        self
    }

    pub fn refuse_connections(&self) -> &Self {
        self.state().refuse_connections = true;
        self
    }

    pub fn is_loaded(&self, namespace: Namespace, identifier: &str) -> bool {
        self.state()
            .loaded
            .get(&namespace)
            .map(|models| models.contains(identifier))
            .unwrap_or(false)
    }

    pub fn connections_opened(&self) -> usize {
        self.state().opened
    }

    pub fn connections_closed(&self) -> usize {
        self.state().closed
    }

    pub fn max_in_flight(&self) -> usize {
        self.state().max_in_flight
    }

    pub fn requests(&self) -> Vec<(Namespace, String)> {
        self.state().requests.clone()
    }

    pub fn connector(&self) -> MockConnector {
        MockConnector {
            server: self.clone(),
        }
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

pub struct MockConnector {
    server: MockServer,
}

#[async_trait]
impl ConnectorInner for MockConnector {
    async fn connect(&self) -> Result<Session, Error> {
        {
            let mut state = self.server.state();
            if state.refuse_connections {
                return Err(Error::msg(
                    ErrorCode::ConnectionFailed,
                    "mock server refused the connection",
                ));
            }
            state.opened += 1;
        }

        let session: Box<dyn SessionInner> = Box::new(MockSession {
            server: self.server.clone(),
            closed: AtomicBool::new(false),
        });
        Ok(session.into())
    }
}

struct MockSession {
    server: MockServer,
    closed: AtomicBool,
}

// Keeps the in-flight counter right when a request future is dropped mid-flight.
struct InFlight<'a>(&'a MockServer);

impl<'a> InFlight<'a> {
    fn enter(server: &'a MockServer) -> Self {
        let mut state = server.state();
        state.in_flight += 1;
        state.max_in_flight = state.max_in_flight.max(state.in_flight);
        Self(server)
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.state().in_flight -= 1;
    }
}

#[async_trait]
impl SessionInner for MockSession {
    async fn unload(&self, namespace: Namespace, identifier: &str) -> Result<(), Error> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(Error::msg(ErrorCode::ConnectionFailed, "session is closed"));
        }

        let latency = {
            let mut state = self.server.state();
            state.requests.push((namespace, identifier.to_string()));
            state.delays.get(identifier).copied()
        };

        let _in_flight = InFlight::enter(&self.server);
        match latency {
            Some(latency) => tokio::time::sleep(latency).await,
            None => tokio::task::yield_now().await,
        }

        let mut state = self.server.state();
        if let Some(code) = state.faults.get(identifier) {
            log::debug!("mock unload of '{}' failing with {}", identifier, code);
            return Err(Error::msg(
                code.clone(),
                format!("injected fault for '{}'", identifier),
            ));
        }

        let removed = state
            .loaded
            .get_mut(&namespace)
            .map(|models| models.remove(identifier))
            .unwrap_or(false);
        if removed {
            Ok(())
        } else {
            Err(Error::msg(
                ErrorCode::ModelNotFound,
                format!("no {} model '{}' is loaded", namespace, identifier),
            ))
        }
    }

    fn close(&self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            self.server.state().closed += 1;
        }
    }
}
