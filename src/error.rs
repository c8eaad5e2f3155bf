//! Error types for fleet-probe.
//!
//! Defines the main error enum used throughout the crate, plus one error enum
//! per pipeline stage. Stage errors render as the diagnostic text handed back
//! to callers, so their `Display` output is part of the public contract.

use thiserror::Error;

/// Main error type for fleet-probe operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FleetError {
    /// Login failed (transport failure, bad credentials, missing token).
    #[error("Authentication error: {0}")]
    Auth(String),

    /// Host name could not be turned into a host id.
    #[error(transparent)]
    Resolution(#[from] ResolutionError),

    /// Query could not be submitted as a campaign.
    #[error(transparent)]
    Submission(#[from] SubmissionError),

    /// Campaign results could not be retrieved.
    #[error(transparent)]
    Collection(#[from] CollectionError),

    /// A query template argument was rejected before anything was sent.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Configuration errors (invalid config file, missing required fields, etc.)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Internal errors (unexpected states, bugs, etc.)
    #[error("Internal error: {0}")]
    Internal(String),
}

impl FleetError {
    /// Creates an authentication error with the given message.
    pub fn auth(msg: impl Into<String>) -> Self {
        Self::Auth(msg.into())
    }

    /// Creates an invalid argument error with the given message.
    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }

    /// Creates a configuration error with the given message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Creates an internal error with the given message.
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Returns the error category as a string for display purposes.
    pub fn category(&self) -> &'static str {
        match self {
            Self::Auth(_) => "Authentication Error",
            Self::Resolution(_) => "Resolution Error",
            Self::Submission(_) => "Submission Error",
            Self::Collection(_) => "Collection Error",
            Self::InvalidArgument(_) => "Invalid Argument",
            Self::Config(_) => "Configuration Error",
            Self::Internal(_) => "Internal Error",
        }
    }
}

/// Failures while mapping a host name to a host id.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ResolutionError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("{0} is offline")]
    Offline(String),

    /// The listing matched but the record carried no id.
    #[error("host record for {0} has no id")]
    MissingId(String),

    /// Connection failure or timeout.
    #[error("cannot connect to Fleet")]
    Unreachable,

    /// The listing endpoint answered with a non-success status.
    #[error("cannot get data from Fleet with provided token: status: {0}")]
    Status(u16),

    /// The listing answered 2xx but the body was not a host listing.
    #[error("unexpected host listing from Fleet: {0}")]
    Malformed(String),
}

/// Failures while submitting a query.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SubmissionError {
    #[error("cannot send query to Fleet")]
    Unreachable,

    /// The response had no usable `campaign.id`.
    #[error("invalid campaign id in Fleet response: {0}")]
    MalformedResponse(String),
}

/// Failures while collecting campaign results.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CollectionError {
    /// The campaign never got a valid id; carries the upstream message verbatim.
    #[error("{0}")]
    InvalidCampaign(String),

    /// Connection failure, closed channel, or timeout.
    #[error("cannot get response from Fleet")]
    Unreachable,

    /// The stream did not follow the expected message contract.
    #[error("cannot get response from Fleet: {0}")]
    Protocol(String),
}

/// Result type alias using FleetError.
pub type Result<T> = std::result::Result<T, FleetError>;
