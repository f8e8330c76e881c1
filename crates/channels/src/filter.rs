use {
    async_trait::async_trait,
    serde::{Deserialize, Serialize},
};

use crate::error::FilterError;

/// How offensive a piece of text is.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    #[default]
    None,
    Low,
    Medium,
    High,
}

impl Severity {
    /// Bucket a redaction ratio (masked chars / total chars).
    pub fn from_ratio(ratio: f64) -> Self {
        if ratio > 0.3 {
            Self::High
        } else if ratio > 0.1 {
            Self::Medium
        } else {
            Self::Low
        }
    }
}

/// Verdict returned by a [`ContentFilter`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classification {
    pub severity: Severity,
    /// Input with offending words masked. Equal to the input when `severity` is `None`.
    pub redacted_text: String,
}

impl Classification {
    pub fn clean(text: impl Into<String>) -> Self {
        Self {
            severity: Severity::None,
            redacted_text: text.into(),
        }
    }
}

/// Pure content classification. Implementations must not mutate relay state.
#[async_trait]
pub trait ContentFilter: Send + Sync {
    async fn classify(&self, text: &str) -> Result<Classification, FilterError>;
}
