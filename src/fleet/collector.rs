//! Campaign result collection over the result stream.
//!
//! One [`ResultCollector::collect`] call owns one connection and walks it
//! through `Connecting → Authenticated → Subscribed → ResultReceived`; any
//! error moves it to `Failed`. The connection is closed on every exit path.

use std::time::Duration;
use tokio::time::{timeout, timeout_at, Instant};
use tracing::{debug, warn};

use super::types::{MessageKind, StreamMessage};
use super::{Campaign, ClientMessage, FleetBackend, ResultChannel, Row, Session};
use crate::config::{PayloadRuleKind, ResultsConfig};
use crate::error::CollectionError;

/// Messages the server sends ahead of the first result (totals, then status).
pub const FRAMING_MESSAGES: usize = 2;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// How long a close handshake may take before the socket is just dropped.
const CLOSE_GRACE: Duration = Duration::from_secs(2);

/// Rule for picking the payload message out of the stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadRule {
    /// Discard `framing` messages unconditionally and parse the next one.
    FixedOffset { framing: usize },
    /// Skip non-result kinds and parse the first `result` message, reading at
    /// most `max_messages`.
    Classified { max_messages: usize },
}

impl Default for PayloadRule {
    fn default() -> Self {
        Self::FixedOffset {
            framing: FRAMING_MESSAGES,
        }
    }
}

impl From<&ResultsConfig> for PayloadRule {
    fn from(config: &ResultsConfig) -> Self {
        match config.rule {
            PayloadRuleKind::Offset => Self::FixedOffset {
                framing: config.framing_messages,
            },
            PayloadRuleKind::Classified => Self::Classified {
                max_messages: config.max_messages,
            },
        }
    }
}

/// Collector progress, for tracing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CollectorState {
    Connecting,
    Authenticated,
    Subscribed,
    ResultReceived,
    Failed,
}

/// Retrieves the rows of one campaign from the result stream.
pub struct ResultCollector<'a> {
    backend: &'a dyn FleetBackend,
    session: &'a Session,
    rule: PayloadRule,
    timeout: Duration,
}

impl<'a> ResultCollector<'a> {
    pub fn new(backend: &'a dyn FleetBackend, session: &'a Session) -> Self {
        Self {
            backend,
            session,
            rule: PayloadRule::default(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn from_config(
        backend: &'a dyn FleetBackend,
        session: &'a Session,
        config: &ResultsConfig,
    ) -> Self {
        Self::new(backend, session)
            .with_rule(PayloadRule::from(config))
            .with_timeout(config.timeout())
    }

    pub fn with_rule(mut self, rule: PayloadRule) -> Self {
        self.rule = rule;
        self
    }

    /// Sets the deadline for the whole collection, connect included.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Collects the rows of `campaign`. An empty vector means nothing was found.
    ///
    /// An invalid campaign fails immediately with its own message and no
    /// connection is opened.
    pub async fn collect(&self, campaign: &Campaign) -> Result<Vec<Row>, CollectionError> {
        let campaign_id = match campaign {
            Campaign::Id(id) => *id,
            Campaign::Invalid(msg) => {
                debug!("Not collecting invalid campaign: {}", msg);
                return Err(CollectionError::InvalidCampaign(msg.clone()));
            }
        };

        let deadline = Instant::now() + self.timeout;
        let mut state = CollectorState::Connecting;
        debug!("Campaign {}: {:?}", campaign_id, state);

        let mut channel = match timeout_at(deadline, self.backend.open_results()).await {
            Ok(Ok(channel)) => channel,
            Ok(Err(e)) => {
                warn!("Campaign {}: cannot open result stream: {}", campaign_id, e);
                return Err(e);
            }
            Err(_) => {
                warn!("Campaign {}: result stream connect timed out", campaign_id);
                return Err(CollectionError::Unreachable);
            }
        };

        let result = match timeout_at(
            deadline,
            self.exchange(channel.as_mut(), campaign_id, &mut state),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => {
                warn!(
                    "Campaign {}: no result within {:?}",
                    campaign_id, self.timeout
                );
                Err(CollectionError::Unreachable)
            }
        };

        let _ = timeout(CLOSE_GRACE, channel.close()).await;

        match &result {
            Ok(rows) => debug!("Campaign {}: {} row(s)", campaign_id, rows.len()),
            Err(e) => {
                state = CollectorState::Failed;
                debug!("Campaign {}: {:?} ({})", campaign_id, state, e);
            }
        }
        result
    }

    async fn exchange(
        &self,
        channel: &mut dyn ResultChannel,
        campaign_id: u64,
        state: &mut CollectorState,
    ) -> Result<Vec<Row>, CollectionError> {
        // No acknowledgement is awaited for the auth message.
        channel
            .send(&ClientMessage::auth(self.session.token()))
            .await?;
        advance(state, CollectorState::Authenticated, campaign_id);

        channel
            .send(&ClientMessage::select_campaign(campaign_id))
            .await?;
        advance(state, CollectorState::Subscribed, campaign_id);

        let rows = self.rule.read_rows(channel).await?;
        advance(state, CollectorState::ResultReceived, campaign_id);
        Ok(rows)
    }
}

fn advance(state: &mut CollectorState, next: CollectorState, campaign_id: u64) {
    *state = next;
    debug!("Campaign {}: {:?}", campaign_id, state);
}

impl PayloadRule {
    /// Reads messages until the payload and returns its rows.
    async fn read_rows(
        &self,
        channel: &mut dyn ResultChannel,
    ) -> Result<Vec<Row>, CollectionError> {
        match *self {
            Self::FixedOffset { framing } => {
                for n in 1..=framing {
                    let skipped = next_text(channel).await?;
                    debug!("Discarding framing message {}: {}", n, preview(&skipped));
                }
                let message = StreamMessage::parse(&next_text(channel).await?)
                    .map_err(CollectionError::Protocol)?;
                message.rows().map_err(CollectionError::Protocol)
            }
            Self::Classified { max_messages } => {
                for _ in 0..max_messages {
                    let message = StreamMessage::parse(&next_text(channel).await?)
                        .map_err(CollectionError::Protocol)?;
                    match message.kind {
                        MessageKind::Result => {
                            return message.rows().map_err(CollectionError::Protocol)
                        }
                        MessageKind::Error => {
                            return Err(CollectionError::Protocol(format!(
                                "server reported {}",
                                message.data
                            )))
                        }
                        MessageKind::Status if is_finished(&message) => {
                            debug!("Campaign finished without results");
                            return Ok(Vec::new());
                        }
                        kind => debug!("Ignoring {:?} message", kind),
                    }
                }
                Err(CollectionError::Protocol(format!(
                    "no result within {max_messages} messages"
                )))
            }
        }
    }
}

async fn next_text(channel: &mut dyn ResultChannel) -> Result<String, CollectionError> {
    channel.recv().await?.ok_or_else(|| {
        CollectionError::Protocol("stream closed before the result arrived".to_string())
    })
}

fn is_finished(message: &StreamMessage) -> bool {
    message.data.get("status").and_then(|s| s.as_str()) == Some("finished")
}

fn preview(text: &str) -> &str {
    match text.char_indices().nth(120) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}
