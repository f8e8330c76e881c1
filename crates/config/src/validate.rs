//! Semantic checks on a loaded configuration.

use secrecy::ExposeSecret;

use crate::schema::CrosstalkConfig;

/// Severity level for a diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Error,
    Warning,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Error => write!(f, "error"),
            Self::Warning => write!(f, "warning"),
        }
    }
}

/// A single validation diagnostic.
#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub severity: Severity,
    /// Dotted path, e.g. "relay.sweep_interval_secs"
    pub path: &'static str,
    pub message: String,
}

#[derive(Debug, Clone, Default)]
pub struct ValidationResult {
    pub diagnostics: Vec<Diagnostic>,
}

impl ValidationResult {
    #[must_use]
    pub fn has_errors(&self) -> bool {
        self.diagnostics
            .iter()
            .any(|d| d.severity == Severity::Error)
    }

    fn push(&mut self, severity: Severity, path: &'static str, message: impl Into<String>) {
        self.diagnostics.push(Diagnostic {
            severity,
            path,
            message: message.into(),
        });
    }
}

pub fn validate(config: &CrosstalkConfig) -> ValidationResult {
    let mut result = ValidationResult::default();

    if !config.database.url.starts_with("sqlite:") {
        result.push(
            Severity::Error,
            "database.url",
            format!("only sqlite URLs are supported, got '{}'", config.database.url),
        );
    }
    if config.database.max_connections == 0 {
        result.push(
            Severity::Error,
            "database.max_connections",
            "must be at least 1",
        );
    }
    if config.discord.bot_token.expose_secret().trim().is_empty() {
        result.push(
            Severity::Warning,
            "discord.bot_token",
            "empty bot token: enabling the relay in new channels will fail",
        );
    }
    if config.relay.sweep_interval_secs == 0 {
        result.push(
            Severity::Error,
            "relay.sweep_interval_secs",
            "must be greater than zero",
        );
    }
    if config.filter.enabled && config.filter.api_url.trim().is_empty() {
        result.push(
            Severity::Warning,
            "filter.api_url",
            "no filter service configured, only the local word list applies",
        );
    }

    result
}
