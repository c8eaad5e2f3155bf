//! Query execution against one Fleet host.
//!
//! [`FleetQuery`] is the public entry point. It owns the backend and session
//! and runs each stage in order: resolve the host, submit the query, collect
//! the campaign, shape the rows. The first failure ends the call.

use tracing::{debug, info};

use super::{QueryResponse, QueryTemplate};
use crate::config::{Config, Credentials, ResultsConfig};
use crate::error::Result;
use crate::fleet::{
    FleetBackend, HostResolver, HttpBackend, QuerySubmitter, ResultCollector, Session,
};

/// Client for running named queries on single hosts.
pub struct FleetQuery {
    backend: Box<dyn FleetBackend>,
    session: Session,
    results: ResultsConfig,
}

impl FleetQuery {
    /// Connects to the configured Fleet server and logs in.
    ///
    /// A failed login is not an error here: it is logged, the token stays
    /// empty, and queries then fail with the server's rejection.
    pub async fn connect(config: &Config) -> Result<Self> {
        let backend = HttpBackend::new(&config.server)?;
        let credentials = config.server.credentials()?;
        Ok(Self::with_backend(Box::new(backend), &credentials, config.results.clone()).await)
    }

    /// Creates a client over any backend and logs in once.
    pub async fn with_backend(
        backend: Box<dyn FleetBackend>,
        credentials: &Credentials,
        results: ResultsConfig,
    ) -> Self {
        let session = Session::new(backend.address());
        if let Err(e) = session.authenticate(backend.as_ref(), credentials).await {
            debug!("Continuing without a token: {}", e);
        }

        Self {
            backend,
            session,
            results,
        }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Runs the template `query_name` with `args` on `host`.
    ///
    /// Unknown template names and rejected arguments fail before any request
    /// is made.
    pub async fn query(&self, host: &str, query_name: &str, args: &str) -> QueryResponse {
        let Some(template) = QueryTemplate::from_name(query_name) else {
            return QueryResponse::failure(format!("Unknown query name: {}", query_name));
        };

        let sql = match template.render(args) {
            Ok(sql) => sql,
            Err(e) => return QueryResponse::failure(e.to_string()),
        };

        info!("Running {} on {}", template, host);
        let backend = self.backend.as_ref();

        let host_id = match HostResolver::new(backend, &self.session)
            .resolve(host)
            .await
        {
            Ok(id) => id,
            Err(e) => {
                info!("Cannot resolve {}: {}", host, e);
                return QueryResponse::failure(e.to_string());
            }
        };

        let campaign = QuerySubmitter::new(backend, &self.session)
            .submit(host_id, &sql)
            .await;

        let collected = ResultCollector::from_config(backend, &self.session, &self.results)
            .collect(&campaign)
            .await;

        let response = template.shape_result(collected);
        info!(
            "{} on {} finished: success={}",
            template, host, response.success
        );
        response
    }
}
