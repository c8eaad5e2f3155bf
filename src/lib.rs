//! fleet-probe - run ad-hoc osquery diagnostics on one Fleet host.
//!
//! The library exposes the query pipeline: [`query::FleetQuery`] logs in,
//! resolves a host name, submits a named query as a live campaign, and reads
//! the campaign's rows back from the result stream.

pub mod config;
pub mod error;
pub mod fleet;
pub mod logging;
pub mod query;

pub use error::{FleetError, Result};
pub use query::{FleetQuery, QueryResponse};
