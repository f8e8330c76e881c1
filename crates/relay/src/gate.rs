//! Moderation gate: ban lookup plus content classification.

use std::{fmt, sync::Arc};

use {
    crosstalk_channels::{ContentFilter, Severity},
    tracing::{debug, warn},
};

#[cfg(feature = "metrics")]
use crosstalk_metrics::{counter, labels, moderation as moderation_metrics};

use crate::{Result, store::RelayStore};

/// Why a message was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    Banned,
    InappropriateContent,
}

impl RejectReason {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Banned => "banned",
            Self::InappropriateContent => "inappropriate content",
        }
    }
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of [`ModerationGate::evaluate`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    /// `content` is what gets relayed; `redacted` is set when the filter masked words.
    Accepted { content: String, redacted: bool },
    Rejected(RejectReason),
}

impl Verdict {
    pub fn is_accepted(&self) -> bool {
        matches!(self, Self::Accepted { .. })
    }
}

/// Decides whether a message may enter the relay and in what form.
///
/// Bans are checked first so a banned user's content never reaches the
/// filter. A failing filter degrades open.
pub struct ModerationGate {
    store: Arc<dyn RelayStore>,
    filter: Arc<dyn ContentFilter>,
}

impl ModerationGate {
    pub fn new(store: Arc<dyn RelayStore>, filter: Arc<dyn ContentFilter>) -> Self {
        Self { store, filter }
    }

    /// Evaluate one message. Only a failing ban lookup is an error.
    pub async fn evaluate(&self, user_id: &str, raw: &str) -> Result<Verdict> {
        if self.store.get_ban(user_id).await?.is_some() {
            debug!(user_id, "rejected message from banned user");
            #[cfg(feature = "metrics")]
            counter!(moderation_metrics::REJECTIONS_TOTAL, labels::REASON => "banned").increment(1);
            return Ok(Verdict::Rejected(RejectReason::Banned));
        }

        let classification = match self.filter.classify(raw).await {
            Ok(c) => c,
            Err(e) => {
                warn!(user_id, error = %e, "content filter failed, relaying unfiltered");
                #[cfg(feature = "metrics")]
                counter!(moderation_metrics::FILTER_ERRORS_TOTAL).increment(1);
                return Ok(Verdict::Accepted {
                    content: raw.to_string(),
                    redacted: false,
                });
            },
        };

        let verdict = match classification.severity {
            Severity::High => {
                #[cfg(feature = "metrics")]
                counter!(
                    moderation_metrics::REJECTIONS_TOTAL,
                    labels::REASON => "inappropriate_content"
                )
                .increment(1);
                Verdict::Rejected(RejectReason::InappropriateContent)
            },
            Severity::Medium | Severity::Low => {
                #[cfg(feature = "metrics")]
                counter!(moderation_metrics::REDACTIONS_TOTAL).increment(1);
                Verdict::Accepted {
                    content: classification.redacted_text,
                    redacted: true,
                }
            },
            Severity::None => Verdict::Accepted {
                content: raw.to_string(),
                redacted: false,
            },
        };
        debug!(user_id, severity = ?classification.severity, "message evaluated");
        Ok(verdict)
    }
}
