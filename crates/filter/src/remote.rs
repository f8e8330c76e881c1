use std::time::Duration;

use {
    async_trait::async_trait,
    crosstalk_channels::{Classification, ContentFilter, FilterError, Severity},
    tracing::{debug, warn},
};

use crate::{
    local::{LocalWordFilter, mask_ratio},
    words::CustomWords,
};

/// Client for a PurgoMalum-compatible profanity service.
///
/// `containsprofanity` decides whether anything is flagged; flagged text is
/// then fetched masked from `plain` and bucketed by the masked share.
pub struct PurgoMalumFilter {
    http: reqwest::Client,
    api_url: String,
    timeout: Duration,
    custom: CustomWords,
    fallback: LocalWordFilter,
}

impl PurgoMalumFilter {
    pub fn new(api_url: impl Into<String>, timeout: Duration, custom: CustomWords) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_url: api_url.into().trim_end_matches('/').to_string(),
            timeout,
            fallback: LocalWordFilter::new(custom.clone()),
            custom,
        }
    }

    /// Extra words sent along with every request.
    pub fn custom_words(&self) -> &CustomWords {
        &self.custom
    }

    async fn get(&self, path: &str, params: &[(&str, &str)]) -> Result<String, FilterError> {
        let url = format!("{}/{path}", self.api_url);
        let resp = self
            .http
            .get(&url)
            .query(params)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| FilterError::external(format!("GET {path}"), e))?;
        if !resp.status().is_success() {
            return Err(FilterError::unavailable(format!(
                "{path} returned {}",
                resp.status()
            )));
        }
        resp.text()
            .await
            .map_err(|e| FilterError::external(format!("read {path} body"), e))
    }

    async fn contains_profanity(&self, text: &str, add: &str) -> Result<bool, FilterError> {
        let body = self
            .get("containsprofanity", &[("text", text), ("add", add)])
            .await?;
        Ok(body.trim() == "true")
    }
}

#[async_trait]
impl ContentFilter for PurgoMalumFilter {
    async fn classify(&self, text: &str) -> Result<Classification, FilterError> {
        let add = self.custom.joined();

        let flagged = match self.contains_profanity(text, &add).await {
            Ok(flagged) => flagged,
            Err(e) => {
                warn!(error = %e, "profanity service unreachable, using local word list");
                return Ok(self.fallback.classify_text(text));
            },
        };
        if !flagged {
            return Ok(Classification::clean(text));
        }

        let redacted = self
            .get("plain", &[("text", text), ("fill_char", "*"), ("add", &add)])
            .await?;
        let severity = Severity::from_ratio(mask_ratio(&redacted, text));
        debug!(?severity, "profanity detected");
        Ok(Classification {
            severity,
            redacted_text: redacted,
        })
    }
}
