//! Host name to host id resolution.

use tracing::debug;

use super::{FleetBackend, HostRecord, HostStatus, Session};
use crate::error::ResolutionError;

/// Maps host names to Fleet host ids using a fresh listing per lookup.
pub struct HostResolver<'a> {
    backend: &'a dyn FleetBackend,
    session: &'a Session,
}

impl<'a> HostResolver<'a> {
    pub fn new(backend: &'a dyn FleetBackend, session: &'a Session) -> Self {
        Self { backend, session }
    }

    /// Resolves `hostname` (case-insensitive) to its host id.
    ///
    /// Offline hosts are reported as errors even though the server knows their id.
    pub async fn resolve(&self, hostname: &str) -> Result<u64, ResolutionError> {
        let hostname = hostname.to_lowercase();
        let hosts = self.backend.list_hosts(self.session.token()).await?;
        debug!("Fetched {} hosts from {}", hosts.len(), self.session.address());

        find_host_id(&hosts, &hostname)
    }
}

/// Scans the listing in order; the first case-insensitive match decides.
///
/// `hostname` must already be lowercase.
pub fn find_host_id(hosts: &[HostRecord], hostname: &str) -> Result<u64, ResolutionError> {
    let record = hosts
        .iter()
        .find(|record| record.hostname.to_lowercase() == hostname)
        .ok_or_else(|| ResolutionError::NotFound(hostname.to_string()))?;

    if record.status == HostStatus::Offline {
        return Err(ResolutionError::Offline(hostname.to_string()));
    }

    record
        .id
        .ok_or_else(|| ResolutionError::MissingId(hostname.to_string()))
}
