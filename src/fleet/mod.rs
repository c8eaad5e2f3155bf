//! Fleet API integration.
//!
//! The query pipeline (session, resolver, submitter, collector) talks to the
//! server only through [`FleetBackend`] and [`ResultChannel`], so the same
//! pipeline runs against the real HTTP/WebSocket backend or a scripted mock.

pub mod collector;
pub mod http;
pub mod mock;
pub mod resolver;
pub mod session;
pub mod submitter;
pub mod types;

pub use collector::{PayloadRule, ResultCollector};
pub use http::HttpBackend;
pub use mock::MockBackend;
pub use resolver::HostResolver;
pub use session::Session;
pub use submitter::QuerySubmitter;
pub use types::{Campaign, ClientMessage, HostRecord, HostStatus, Row};

use async_trait::async_trait;
use serde_json::Value;

use crate::config::Credentials;
use crate::error::{CollectionError, FleetError, ResolutionError, SubmissionError};

/// Transport boundary for the Fleet REST API and result stream.
///
/// Implementations must be thread-safe (Send + Sync) to support async operations.
#[async_trait]
pub trait FleetBackend: Send + Sync {
    /// Human-readable server address, for logs.
    fn address(&self) -> String;

    /// Exchanges credentials for a bearer token.
    async fn login(&self, credentials: &Credentials) -> Result<String, FleetError>;

    /// Fetches the full host listing, in server order.
    async fn list_hosts(&self, token: &str) -> Result<Vec<HostRecord>, ResolutionError>;

    /// Posts a live query for one host and returns the raw response body.
    async fn run_query(
        &self,
        token: &str,
        host_id: u64,
        sql: &str,
    ) -> Result<Value, SubmissionError>;

    /// Opens a fresh result stream connection.
    async fn open_results(&self) -> Result<Box<dyn ResultChannel>, CollectionError>;
}

/// One open result stream connection.
#[async_trait]
pub trait ResultChannel: Send {
    async fn send(&mut self, message: &ClientMessage) -> Result<(), CollectionError>;

    /// Returns the next text message, or `None` once the server closed the stream.
    async fn recv(&mut self) -> Result<Option<String>, CollectionError>;

    /// Closes the connection. Errors while closing are ignored.
    async fn close(&mut self);
}
