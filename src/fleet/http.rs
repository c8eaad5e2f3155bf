//! Fleet backend over HTTPS and WebSocket.
//!
//! REST calls go through reqwest; the result stream is a tokio-tungstenite
//! connection. Both use the same native-tls connector, so they trust the same
//! roots. Certificates are verified unless the configuration opts out.

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use native_tls::TlsConnector;
use reqwest::{Client, RequestBuilder, Response};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::protocol::Message;
use tokio_tungstenite::{
    connect_async_tls_with_config, Connector, MaybeTlsStream, WebSocketStream,
};
use tracing::{debug, warn};
use url::Url;

use super::types::HostListing;
use super::{ClientMessage, FleetBackend, HostRecord, ResultChannel};
use crate::config::{Credentials, ServerConfig};
use crate::error::{CollectionError, FleetError, ResolutionError, Result, SubmissionError};

/// Path of the result stream below the API prefix.
const RESULTS_PATH: &str = "/results/websocket";

/// Fleet backend speaking the real protocol.
#[derive(Debug, Clone)]
pub struct HttpBackend {
    api_root: String,
    client: Client,
    tls: TlsConnector,
    hosts_per_page: Option<u32>,
}

impl HttpBackend {
    /// Creates a backend for the configured server.
    pub fn new(config: &ServerConfig) -> Result<Self> {
        let base_url = config.base_url()?;
        let api_root = api_root(&base_url, &config.api_prefix);

        if config.accept_invalid_certs {
            warn!(
                "TLS certificate verification is disabled for {}",
                base_url.as_str()
            );
        }

        let tls = TlsConnector::builder()
            .danger_accept_invalid_certs(config.accept_invalid_certs)
            .danger_accept_invalid_hostnames(config.accept_invalid_certs)
            .build()
            .map_err(|e| FleetError::config(format!("Failed to create TLS connector: {}", e)))?;

        let client = Client::builder()
            .timeout(config.request_timeout())
            .use_preconfigured_tls(tls.clone())
            .build()
            .map_err(|e| FleetError::config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            api_root,
            client,
            tls,
            hosts_per_page: config.hosts_per_page.filter(|n| *n > 0),
        })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.api_root, path)
    }

    /// Returns the result stream URL (`https` maps to `wss`, `http` to `ws`).
    fn websocket_url(&self) -> Result<Url> {
        let mut url = Url::parse(&self.endpoint(RESULTS_PATH))
            .map_err(|e| FleetError::internal(format!("Invalid result stream URL: {e}")))?;
        let scheme = if url.scheme() == "https" { "wss" } else { "ws" };
        url.set_scheme(scheme)
            .map_err(|_| FleetError::internal(format!("Cannot use scheme {scheme} for {url}")))?;
        Ok(url)
    }

    fn authorized(&self, builder: RequestBuilder, token: &str) -> RequestBuilder {
        builder
            .bearer_auth(token)
            .header("Content-Type", "application/json")
    }

    async fn fetch_hosts(
        &self,
        token: &str,
        page: Option<(u32, u32)>,
    ) -> std::result::Result<Vec<HostRecord>, ResolutionError> {
        let mut request = self.authorized(self.client.get(self.endpoint("/hosts")), token);
        if let Some((page, per_page)) = page {
            request = request.query(&[("page", page), ("per_page", per_page)]);
        }

        let response = request.send().await.map_err(|e| {
            warn!("Host listing request failed: {}", e);
            ResolutionError::Unreachable
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(ResolutionError::Status(status.as_u16()));
        }

        let listing: HostListing = response.json().await.map_err(|e| {
            if e.is_timeout() {
                warn!("Host listing timed out: {}", e);
                ResolutionError::Unreachable
            } else {
                ResolutionError::Malformed(e.to_string())
            }
        })?;
        Ok(listing.into_hosts())
    }

    fn websocket_connector(&self) -> Connector {
        Connector::NativeTls(self.tls.clone())
    }
}

/// Joins the server URL and the API prefix without doubled slashes.
fn api_root(base_url: &Url, prefix: &str) -> String {
    let base = base_url.as_str().trim_end_matches('/');
    let prefix = prefix.trim_matches('/');
    if prefix.is_empty() {
        base.to_string()
    } else {
        format!("{base}/{prefix}")
    }
}

#[async_trait]
impl FleetBackend for HttpBackend {
    fn address(&self) -> String {
        self.api_root.clone()
    }

    async fn login(&self, credentials: &Credentials) -> Result<String> {
        let response = self
            .client
            .post(self.endpoint("/login"))
            .json(credentials)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    FleetError::auth("Login timed out")
                } else {
                    FleetError::auth(format!("Cannot connect to Fleet: {}", e))
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(FleetError::auth(format!("Login rejected ({})", status)));
        }

        let body: LoginResponse = response
            .json()
            .await
            .map_err(|e| FleetError::auth(format!("Failed to parse login response: {}", e)))?;

        body.token
            .filter(|token| !token.is_empty())
            .ok_or_else(|| FleetError::auth("Login response has no token"))
    }

    async fn list_hosts(
        &self,
        token: &str,
    ) -> std::result::Result<Vec<HostRecord>, ResolutionError> {
        let Some(per_page) = self.hosts_per_page else {
            return self.fetch_hosts(token, None).await;
        };

        let mut hosts = Vec::new();
        let mut page = 0;
        loop {
            let batch = self.fetch_hosts(token, Some((page, per_page))).await?;
            // A server that ignores paging repeats the first page.
            if page > 0 && !batch.is_empty() && batch.first() == hosts.first() {
                break;
            }
            let fetched = batch.len();
            hosts.extend(batch);
            debug!("Host listing page {}: {} host(s)", page, fetched);

            if fetched < per_page as usize {
                break;
            }
            page += 1;
        }
        Ok(hosts)
    }

    async fn run_query(
        &self,
        token: &str,
        host_id: u64,
        sql: &str,
    ) -> std::result::Result<Value, SubmissionError> {
        let request = RunQueryRequest {
            query: sql,
            selected: Selection {
                hosts: vec![host_id],
                labels: Vec::new(),
            },
        };

        let response = self
            .authorized(self.client.post(self.endpoint("/queries/run")), token)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                warn!("Query submission request failed: {}", e);
                SubmissionError::Unreachable
            })?;

        read_json(response).await
    }

    async fn open_results(&self) -> std::result::Result<Box<dyn ResultChannel>, CollectionError> {
        let url = self.websocket_url().map_err(|e| {
            warn!("{}", e);
            CollectionError::Unreachable
        })?;
        let connector = self.websocket_connector();

        let (stream, _) =
            connect_async_tls_with_config(url.as_str(), None, false, Some(connector))
                .await
                .map_err(|e| {
                    warn!("Cannot open result stream {}: {}", url, e);
                    CollectionError::Unreachable
                })?;
        debug!("Result stream open: {}", url);

        Ok(Box::new(WsChannel { stream }))
    }
}

/// Reads a JSON body whatever the status; the submitter decides what a
/// missing campaign means.
async fn read_json(response: Response) -> std::result::Result<Value, SubmissionError> {
    let status = response.status();
    if !status.is_success() {
        warn!("Query submission answered {}", status);
    }
    response.json().await.map_err(|e| {
        if e.is_timeout() {
            warn!("Query submission timed out: {}", e);
            SubmissionError::Unreachable
        } else {
            SubmissionError::MalformedResponse(format!("unreadable body ({}): {}", status, e))
        }
    })
}

/// Result stream over a WebSocket connection.
struct WsChannel {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

#[async_trait]
impl ResultChannel for WsChannel {
    async fn send(&mut self, message: &ClientMessage) -> std::result::Result<(), CollectionError> {
        self.stream
            .send(Message::Text(message.to_json()))
            .await
            .map_err(|e| {
                warn!("Result stream send failed: {}", e);
                CollectionError::Unreachable
            })
    }

    async fn recv(&mut self) -> std::result::Result<Option<String>, CollectionError> {
        loop {
            match self.stream.next().await {
                Some(Ok(Message::Text(text))) => return Ok(Some(text)),
                Some(Ok(Message::Binary(bytes))) => {
                    return Ok(Some(String::from_utf8_lossy(&bytes).into_owned()))
                }
                Some(Ok(Message::Close(_))) | None => return Ok(None),
                // Ping/pong and raw frames are transport traffic, not protocol messages.
                Some(Ok(_)) => continue,
                Some(Err(e)) => {
                    warn!("Result stream receive failed: {}", e);
                    return Err(CollectionError::Unreachable);
                }
            }
        }
    }

    async fn close(&mut self) {
        if let Err(e) = self.stream.close(None).await {
            debug!("Result stream close: {}", e);
        }
    }
}

// Fleet API types

#[derive(Debug, Deserialize)]
struct LoginResponse {
    #[serde(default)]
    token: Option<String>,
}

#[derive(Debug, Serialize)]
struct RunQueryRequest<'a> {
    query: &'a str,
    selected: Selection,
}

#[derive(Debug, Serialize)]
struct Selection {
    hosts: Vec<u64>,
    labels: Vec<u64>,
}
