use {
    secrecy::{ExposeSecret, Secret},
    serde::{Deserialize, Serialize},
};

/// Root configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CrosstalkConfig {
    pub database: DatabaseConfig,
    pub discord: DiscordConfig,
    pub filter: FilterConfig,
    pub relay: RelayConfig,
}

/// Settings/ban store location.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// sqlx connection URL. Defaults to `sqlite:crosstalk.db?mode=rwc`.
    pub url: String,
    pub max_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "sqlite:crosstalk.db?mode=rwc".into(),
            max_connections: 5,
        }
    }
}

/// Discord REST access used to create and execute webhooks.
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscordConfig {
    /// Bot token (needs Manage Webhooks in relay channels).
    #[serde(serialize_with = "serialize_secret")]
    pub bot_token: Secret<String>,
    /// REST API base URL.
    pub api_base: String,
    /// Name given to webhooks created in relay channels.
    pub webhook_name: String,
    pub request_timeout_secs: u64,
}

impl std::fmt::Debug for DiscordConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DiscordConfig")
            .field("bot_token", &"[REDACTED]")
            .field("api_base", &self.api_base)
            .field("webhook_name", &self.webhook_name)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .finish()
    }
}

impl Default for DiscordConfig {
    fn default() -> Self {
        Self {
            bot_token: Secret::new(String::new()),
            api_base: "https://discord.com/api/v10".into(),
            webhook_name: "Global Chat".into(),
            request_timeout_secs: 10,
        }
    }
}

fn serialize_secret<S: serde::Serializer>(
    secret: &Secret<String>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(secret.expose_secret())
}

/// Remote profanity service plus local fallback words.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterConfig {
    /// When false, every message passes unfiltered.
    pub enabled: bool,
    pub api_url: String,
    pub timeout_secs: u64,
    /// Extra words flagged in addition to the service's list.
    pub custom_words: Vec<String>,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            api_url: "https://www.purgomalum.com/service".into(),
            timeout_secs: 5,
            custom_words: Vec::new(),
        }
    }
}

/// Relay engine host settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    /// Interval between invalid-endpoint sweeps in seconds (6 hours).
    pub sweep_interval_secs: u64,
    /// How long shutdown waits for the in-flight job to settle.
    pub shutdown_grace_secs: u64,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            sweep_interval_secs: 6 * 60 * 60,
            shutdown_grace_secs: 5,
        }
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_toml_yields_defaults() {
        let cfg: CrosstalkConfig = toml::from_str("").unwrap();
        assert_eq!(cfg.database.url, "sqlite:crosstalk.db?mode=rwc");
        assert_eq!(cfg.relay.sweep_interval_secs, 21_600);
        assert!(cfg.filter.enabled);
        assert!(cfg.discord.bot_token.expose_secret().is_empty());
    }

    #[test]
    fn partial_sections_keep_other_defaults() {
        let cfg: CrosstalkConfig = toml::from_str(
            r#"
            [discord]
            bot_token = "xyz"

            [filter]
            custom_words = ["spamword"]
            "#,
        )
        .unwrap();
        assert_eq!(cfg.discord.bot_token.expose_secret(), "xyz");
        assert_eq!(cfg.discord.webhook_name, "Global Chat");
        assert_eq!(cfg.filter.custom_words, vec!["spamword"]);
        assert_eq!(cfg.filter.timeout_secs, 5);
    }

    #[test]
    fn debug_redacts_bot_token() {
        let mut cfg = DiscordConfig::default();
        cfg.bot_token = Secret::new("hunter2".into());
        assert!(!format!("{cfg:?}").contains("hunter2"));
    }
}
