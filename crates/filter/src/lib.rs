//! Profanity classification for relayed messages.
//!
//! [`PurgoMalumFilter`] asks a PurgoMalum-compatible HTTP service and falls
//! back to a local word list when the service is unreachable.

pub mod local;
pub mod remote;
pub mod words;

use {
    async_trait::async_trait,
    crosstalk_channels::{Classification, ContentFilter, FilterError},
    crosstalk_config::FilterConfig,
    std::sync::Arc,
};

pub use {local::LocalWordFilter, remote::PurgoMalumFilter, words::CustomWords};

/// Filter used when moderation is switched off in config.
#[derive(Debug, Default, Clone, Copy)]
pub struct PassthroughFilter;

#[async_trait]
impl ContentFilter for PassthroughFilter {
    async fn classify(&self, text: &str) -> Result<Classification, FilterError> {
        Ok(Classification::clean(text))
    }
}

/// Build the filter described by `config`.
pub fn from_config(config: &FilterConfig) -> Arc<dyn ContentFilter> {
    if !config.enabled {
        return Arc::new(PassthroughFilter);
    }
    let words = CustomWords::from_iter(config.custom_words.iter().cloned());
    Arc::new(PurgoMalumFilter::new(
        config.api_url.clone(),
        std::time::Duration::from_secs(config.timeout_secs),
        words,
    ))
}
