//! Live query submission.

use serde_json::Value;
use tracing::{debug, warn};

use super::{Campaign, FleetBackend, Session};
use crate::error::SubmissionError;

/// Posts live queries scoped to a single host.
pub struct QuerySubmitter<'a> {
    backend: &'a dyn FleetBackend,
    session: &'a Session,
}

impl<'a> QuerySubmitter<'a> {
    pub fn new(backend: &'a dyn FleetBackend, session: &'a Session) -> Self {
        Self { backend, session }
    }

    /// Submits `sql` for `host_id`.
    ///
    /// Never fails outright: a failed submission yields [`Campaign::Invalid`]
    /// carrying the error text, which the collector reports without connecting.
    pub async fn submit(&self, host_id: u64, sql: &str) -> Campaign {
        match self.try_submit(host_id, sql).await {
            Ok(id) => Campaign::Id(id),
            Err(e) => {
                warn!("Query submission for host {} failed: {}", host_id, e);
                Campaign::Invalid(e.to_string())
            }
        }
    }

    /// Submits `sql` for `host_id`, returning the typed error on failure.
    pub async fn try_submit(&self, host_id: u64, sql: &str) -> Result<u64, SubmissionError> {
        let body = self
            .backend
            .run_query(self.session.token(), host_id, sql)
            .await?;
        let id = campaign_id(&body)?;
        debug!("Host {} query running as campaign {}", host_id, id);
        Ok(id)
    }
}

/// Reads `campaign.id` from a `POST /queries/run` response.
pub fn campaign_id(body: &Value) -> Result<u64, SubmissionError> {
    match body.pointer("/campaign/id") {
        Some(id) => id
            .as_u64()
            .ok_or_else(|| SubmissionError::MalformedResponse(format!("campaign.id = {id}"))),
        None => Err(SubmissionError::MalformedResponse(
            "missing campaign.id".to_string(),
        )),
    }
}
