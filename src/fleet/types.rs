//! Wire and domain types for the Fleet API.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// One result row: column name to column value.
pub type Row = BTreeMap<String, String>;

/// Liveness state reported for a host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HostStatus {
    Online,
    Offline,
    /// Missing in action: not seen for a long time.
    Mia,
    New,
    #[default]
    #[serde(other)]
    Unknown,
}

impl HostStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Online => "online",
            Self::Offline => "offline",
            Self::Mia => "mia",
            Self::New => "new",
            Self::Unknown => "unknown",
        }
    }
}

/// A host as listed by `GET /hosts`.
///
/// Decoding never fails: odd field types fall back to empty or unknown values, so
/// one odd record cannot hide the rest of the listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Value")]
pub struct HostRecord {
    pub hostname: String,
    pub id: Option<u64>,
    pub status: HostStatus,
}

impl From<Value> for HostRecord {
    fn from(value: Value) -> Self {
        let hostname = match value.get("hostname") {
            None | Some(Value::Null) => String::new(),
            Some(Value::String(name)) => name.clone(),
            Some(other) => other.to_string(),
        };
        let status = value
            .get("status")
            .and_then(|status| HostStatus::deserialize(status).ok())
            .unwrap_or_default();

        Self {
            hostname,
            id: value.get("id").and_then(Value::as_u64),
            status,
        }
    }
}

impl HostRecord {
    pub fn new(hostname: impl Into<String>, id: u64, status: HostStatus) -> Self {
        Self {
            hostname: hostname.into(),
            id: Some(id),
            status,
        }
    }
}

/// Body of `GET /hosts`. A missing or null `hosts` field is an empty listing.
#[derive(Debug, Deserialize)]
pub(crate) struct HostListing {
    #[serde(default)]
    hosts: Option<Vec<HostRecord>>,
}

impl HostListing {
    pub(crate) fn into_hosts(self) -> Vec<HostRecord> {
        self.hosts.unwrap_or_default()
    }
}

/// A submitted query as seen by the collector.
///
/// A failed submission still produces a campaign; the collector turns
/// `Invalid` into a failure without touching the network.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Campaign {
    Id(u64),
    Invalid(String),
}

impl Campaign {
    pub fn id(&self) -> Option<u64> {
        match self {
            Self::Id(id) => Some(*id),
            Self::Invalid(_) => None,
        }
    }
}

/// Messages the client sends on the result stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum ClientMessage {
    Auth { token: String },
    SelectCampaign { campaign_id: u64 },
}

impl ClientMessage {
    pub fn auth(token: impl Into<String>) -> Self {
        Self::Auth {
            token: token.into(),
        }
    }

    pub fn select_campaign(campaign_id: u64) -> Self {
        Self::SelectCampaign { campaign_id }
    }

    /// Serializes the message to its JSON text frame.
    pub fn to_json(&self) -> String {
        // Serializing a tagged enum of strings and integers cannot fail.
        serde_json::to_string(self).unwrap_or_default()
    }
}

/// Kind of a server message on the result stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    /// Host counts for the campaign.
    Totals,
    /// Campaign status updates.
    Status,
    /// Rows from one host.
    Result,
    /// Server-side failure.
    Error,
    Other,
}

impl MessageKind {
    fn from_type(kind: &str) -> Self {
        match kind {
            "totals" => Self::Totals,
            "status" => Self::Status,
            "result" => Self::Result,
            "error" => Self::Error,
            _ => Self::Other,
        }
    }
}

/// A parsed server message.
#[derive(Debug, Clone)]
pub struct StreamMessage {
    pub kind: MessageKind,
    pub data: Value,
}

impl StreamMessage {
    /// Parses one text frame from the result stream.
    pub fn parse(text: &str) -> Result<Self, String> {
        let value: Value =
            serde_json::from_str(text).map_err(|e| format!("unparseable message: {e}"))?;

        let kind = value
            .get("type")
            .and_then(Value::as_str)
            .map(MessageKind::from_type)
            .unwrap_or(MessageKind::Other);
        let data = value.get("data").cloned().unwrap_or(Value::Null);

        Ok(Self { kind, data })
    }

    /// Extracts `data.rows`. A missing `rows` field is an empty result.
    pub fn rows(&self) -> Result<Vec<Row>, String> {
        let rows = match self.data.get("rows") {
            None | Some(Value::Null) => return Ok(Vec::new()),
            Some(Value::Array(rows)) => rows,
            Some(other) => return Err(format!("rows is not a list: {other}")),
        };

        rows.iter()
            .map(|row| match row {
                Value::Object(columns) => Ok(columns
                    .iter()
                    .map(|(name, value)| (name.clone(), column_text(value)))
                    .collect()),
                other => Err(format!("row is not an object: {other}")),
            })
            .collect()
    }
}

/// osquery reports every column as text; other JSON values are kept as their literal.
fn column_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}
