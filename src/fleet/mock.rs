//! Mock Fleet backend for testing.
//!
//! Replays scripted responses and records every call, so tests can assert both
//! what the pipeline returned and which network operations it performed.

use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};

use super::{ClientMessage, FleetBackend, HostRecord, HostStatus, ResultChannel};
use crate::config::Credentials;
use crate::error::{CollectionError, FleetError, ResolutionError, SubmissionError};

/// Number of calls made to each backend operation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CallCounts {
    pub login: usize,
    pub list_hosts: usize,
    pub run_query: usize,
    pub open_results: usize,
}

impl CallCounts {
    /// Calls that touch the network after login.
    pub fn network_after_login(&self) -> usize {
        self.list_hosts + self.run_query + self.open_results
    }
}

#[derive(Debug)]
struct Script {
    login: Result<String, FleetError>,
    hosts: Result<Vec<HostRecord>, ResolutionError>,
    run: Result<Value, SubmissionError>,
    open: Result<Vec<String>, CollectionError>,
}

#[derive(Debug, Default)]
struct Recorded {
    calls: CallCounts,
    tokens: Vec<String>,
    queries: Vec<(u64, String)>,
    sent: Vec<ClientMessage>,
    closed: usize,
}

#[derive(Debug)]
struct MockState {
    script: Script,
    recorded: Recorded,
}

/// A backend that returns predefined results.
///
/// Clones share state: keep one clone in the test and hand another to the
/// client under test.
#[derive(Debug, Clone)]
pub struct MockBackend {
    state: Arc<Mutex<MockState>>,
}

impl MockBackend {
    /// Creates a mock with a valid login, no hosts, campaign 1, and a stream
    /// whose payload has no rows.
    pub fn new() -> Self {
        let script = Script {
            login: Ok("mock-token".to_string()),
            hosts: Ok(Vec::new()),
            run: Ok(json!({"campaign": {"id": 1}})),
            open: Ok(result_stream(Vec::<Value>::new())),
        };
        Self {
            state: Arc::new(Mutex::new(MockState {
                script,
                recorded: Recorded::default(),
            })),
        }
    }

    /// Creates a mock with one online host and a file hash result, for demos.
    pub fn demo() -> Self {
        Self::new()
            .with_hosts(vec![
                HostRecord::new("demo-workstation", 1, HostStatus::Online),
                HostRecord::new("demo-laptop", 2, HostStatus::Offline),
            ])
            .with_messages(result_stream(vec![json!({
                "path": "c:\\windows\\notepad.exe",
                "md5": "d41d8cd98f00b204e9800998ecf8427e",
                "sha1": "da39a3ee5e6b4b0d3255bfef95601890afd80709",
                "sha256": "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855",
            })]))
    }

    pub fn with_token(self, token: impl Into<String>) -> Self {
        self.lock().script.login = Ok(token.into());
        self
    }

    pub fn with_login_failure(self, msg: impl Into<String>) -> Self {
        self.lock().script.login = Err(FleetError::auth(msg));
        self
    }

    pub fn with_hosts(self, hosts: Vec<HostRecord>) -> Self {
        self.lock().script.hosts = Ok(hosts);
        self
    }

    pub fn with_hosts_error(self, err: ResolutionError) -> Self {
        self.lock().script.hosts = Err(err);
        self
    }

    /// Sets the raw body returned by `POST /queries/run`.
    pub fn with_run_response(self, body: Value) -> Self {
        self.lock().script.run = Ok(body);
        self
    }

    pub fn with_run_error(self, err: SubmissionError) -> Self {
        self.lock().script.run = Err(err);
        self
    }

    /// Sets the text messages the result stream will deliver, in order.
    pub fn with_messages(self, messages: Vec<String>) -> Self {
        self.lock().script.open = Ok(messages);
        self
    }

    pub fn with_open_error(self, err: CollectionError) -> Self {
        self.lock().script.open = Err(err);
        self
    }

    pub fn calls(&self) -> CallCounts {
        self.lock().recorded.calls
    }

    /// Messages sent on result streams, across all connections.
    pub fn sent_messages(&self) -> Vec<ClientMessage> {
        self.lock().recorded.sent.clone()
    }

    /// Host id and SQL text of every submitted query.
    pub fn submitted_queries(&self) -> Vec<(u64, String)> {
        self.lock().recorded.queries.clone()
    }

    /// Bearer tokens presented to REST calls.
    pub fn tokens_seen(&self) -> Vec<String> {
        self.lock().recorded.tokens.clone()
    }

    /// Number of result stream connections closed by the client.
    pub fn closed_channels(&self) -> usize {
        self.lock().recorded.closed
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        // A panicking test thread must not hide the recorded calls from others.
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Default for MockBackend {
    fn default() -> Self {
        Self::new()
    }
}

/// Builds the usual three-message stream: totals, status, then one result.
pub fn result_stream(rows: Vec<Value>) -> Vec<String> {
    vec![
        json!({"type": "totals", "data": {"count": 1, "online": 1}}).to_string(),
        json!({"type": "status", "data": {"status": "pending"}}).to_string(),
        json!({"type": "result", "data": {"rows": rows}}).to_string(),
    ]
}

#[async_trait]
impl FleetBackend for MockBackend {
    fn address(&self) -> String {
        "mock".to_string()
    }

    async fn login(&self, _credentials: &Credentials) -> Result<String, FleetError> {
        let mut state = self.lock();
        state.recorded.calls.login += 1;
        state.script.login.clone()
    }

    async fn list_hosts(&self, token: &str) -> Result<Vec<HostRecord>, ResolutionError> {
        let mut state = self.lock();
        state.recorded.calls.list_hosts += 1;
        state.recorded.tokens.push(token.to_string());
        state.script.hosts.clone()
    }

    async fn run_query(
        &self,
        token: &str,
        host_id: u64,
        sql: &str,
    ) -> Result<Value, SubmissionError> {
        let mut state = self.lock();
        state.recorded.calls.run_query += 1;
        state.recorded.tokens.push(token.to_string());
        state.recorded.queries.push((host_id, sql.to_string()));
        state.script.run.clone()
    }

    async fn open_results(&self) -> Result<Box<dyn ResultChannel>, CollectionError> {
        let messages = {
            let mut state = self.lock();
            state.recorded.calls.open_results += 1;
            state.script.open.clone()?
        };
        Ok(Box::new(MockChannel {
            incoming: messages.into(),
            state: Arc::clone(&self.state),
        }))
    }
}

/// Scripted result stream.
struct MockChannel {
    incoming: VecDeque<String>,
    state: Arc<Mutex<MockState>>,
}

#[async_trait]
impl ResultChannel for MockChannel {
    async fn send(&mut self, message: &ClientMessage) -> Result<(), CollectionError> {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.recorded.sent.push(message.clone());
        Ok(())
    }

    async fn recv(&mut self) -> Result<Option<String>, CollectionError> {
        Ok(self.incoming.pop_front())
    }

    async fn close(&mut self) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.recorded.closed += 1;
    }
}
