//! Persisted settings and ban store.

use {async_trait::async_trait, crosstalk_channels::EndpointCredentials};

use crate::Result;

/// Durable relay settings of one group.
#[derive(Debug, Clone)]
pub struct RelaySettings {
    pub guild_id: String,
    pub enabled: bool,
    pub channel_id: Option<String>,
    pub endpoint: Option<EndpointCredentials>,
    pub updated_at: i64,
}

impl RelaySettings {
    pub fn endpoint_id(&self) -> Option<&str> {
        self.endpoint.as_ref().map(|e| e.id.as_str())
    }
}

/// A network-wide ban. Existence of the row means banned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BanEntry {
    pub user_id: String,
    pub banned_by: String,
    pub reason: String,
    pub banned_at: i64,
}

/// Source of truth for settings and bans. Implementations serialize their own writes.
#[async_trait]
pub trait RelayStore: Send + Sync {
    async fn get_settings(&self, guild_id: &str) -> Result<Option<RelaySettings>>;
    async fn upsert_settings(&self, settings: &RelaySettings) -> Result<()>;
    /// Every configured group, enabled or not.
    async fn list_settings(&self) -> Result<Vec<RelaySettings>>;
    async fn list_enabled(&self) -> Result<Vec<RelaySettings>>;

    async fn get_ban(&self, user_id: &str) -> Result<Option<BanEntry>>;
    /// Returns false without writing if the user is already banned.
    async fn insert_ban(&self, entry: &BanEntry) -> Result<bool>;
    /// Returns false if there was no ban to remove.
    async fn delete_ban(&self, user_id: &str) -> Result<bool>;
    async fn list_bans(&self) -> Result<Vec<BanEntry>>;
}
