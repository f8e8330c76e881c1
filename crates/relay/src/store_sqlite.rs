//! SQLite-backed relay store using sqlx.

use {
    async_trait::async_trait,
    crosstalk_channels::EndpointCredentials,
    secrecy::ExposeSecret,
    sqlx::{SqlitePool, sqlite::SqlitePoolOptions},
};

use crate::{
    Result,
    store::{BanEntry, RelaySettings, RelayStore},
};

/// Internal row type for sqlx mapping.
#[derive(sqlx::FromRow)]
struct SettingsRow {
    guild_id: String,
    enabled: bool,
    channel_id: Option<String>,
    endpoint_url: Option<String>,
    endpoint_id: Option<String>,
    endpoint_token: Option<String>,
    updated_at: i64,
}

impl From<SettingsRow> for RelaySettings {
    fn from(r: SettingsRow) -> Self {
        let endpoint = match (r.endpoint_id, r.endpoint_token) {
            (Some(id), Some(token)) => Some(EndpointCredentials::new(
                id,
                token,
                r.endpoint_url.unwrap_or_default(),
            )),
            _ => None,
        };
        Self {
            guild_id: r.guild_id,
            enabled: r.enabled,
            channel_id: r.channel_id,
            endpoint,
            updated_at: r.updated_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct BanRow {
    user_id: String,
    banned_by: String,
    reason: String,
    banned_at: i64,
}

impl From<BanRow> for BanEntry {
    fn from(r: BanRow) -> Self {
        Self {
            user_id: r.user_id,
            banned_by: r.banned_by,
            reason: r.reason,
            banned_at: r.banned_at,
        }
    }
}

/// SQLite persistence for relay settings and bans.
pub struct SqliteRelayStore {
    pool: SqlitePool,
}

impl SqliteRelayStore {
    /// Create a store with its own connection pool and run migrations.
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;

        crate::run_migrations(&pool).await?;

        Ok(Self { pool })
    }

    /// Create a store using an existing pool (migrations must already be run).
    pub fn with_pool(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

#[async_trait]
impl RelayStore for SqliteRelayStore {
    async fn get_settings(&self, guild_id: &str) -> Result<Option<RelaySettings>> {
        let row =
            sqlx::query_as::<_, SettingsRow>("SELECT * FROM relay_settings WHERE guild_id = ?")
                .bind(guild_id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(row.map(Into::into))
    }

    async fn upsert_settings(&self, settings: &RelaySettings) -> Result<()> {
        let endpoint = settings.endpoint.as_ref();
        sqlx::query(
            r#"INSERT INTO relay_settings
                 (guild_id, enabled, channel_id, endpoint_url, endpoint_id, endpoint_token, updated_at)
               VALUES (?, ?, ?, ?, ?, ?, ?)
               ON CONFLICT(guild_id) DO UPDATE SET
                 enabled = excluded.enabled,
                 channel_id = excluded.channel_id,
                 endpoint_url = excluded.endpoint_url,
                 endpoint_id = excluded.endpoint_id,
                 endpoint_token = excluded.endpoint_token,
                 updated_at = excluded.updated_at"#,
        )
        .bind(&settings.guild_id)
        .bind(settings.enabled)
        .bind(&settings.channel_id)
        .bind(endpoint.map(|e| e.url.as_str()))
        .bind(endpoint.map(|e| e.id.as_str()))
        .bind(endpoint.map(|e| e.token.expose_secret().as_str()))
        .bind(settings.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn list_settings(&self) -> Result<Vec<RelaySettings>> {
        let rows =
            sqlx::query_as::<_, SettingsRow>("SELECT * FROM relay_settings ORDER BY guild_id")
                .fetch_all(&self.pool)
                .await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn list_enabled(&self) -> Result<Vec<RelaySettings>> {
        let rows = sqlx::query_as::<_, SettingsRow>(
            "SELECT * FROM relay_settings WHERE enabled = 1 ORDER BY guild_id",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn get_ban(&self, user_id: &str) -> Result<Option<BanEntry>> {
        let row = sqlx::query_as::<_, BanRow>("SELECT * FROM relay_bans WHERE user_id = ?")
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(Into::into))
    }

    async fn insert_ban(&self, entry: &BanEntry) -> Result<bool> {
        let result = sqlx::query(
            r#"INSERT INTO relay_bans (user_id, banned_by, reason, banned_at)
               VALUES (?, ?, ?, ?)
               ON CONFLICT(user_id) DO NOTHING"#,
        )
        .bind(&entry.user_id)
        .bind(&entry.banned_by)
        .bind(&entry.reason)
        .bind(entry.banned_at)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn delete_ban(&self, user_id: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM relay_bans WHERE user_id = ?")
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn list_bans(&self) -> Result<Vec<BanEntry>> {
        let rows = sqlx::query_as::<_, BanRow>("SELECT * FROM relay_bans ORDER BY banned_at DESC")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }
}
