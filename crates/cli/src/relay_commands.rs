//! One-shot admin commands against the relay store.

use std::{future::Future, sync::Arc, time::Duration};

use {
    anyhow::{Context, Result},
    crosstalk_config::CrosstalkConfig,
    crosstalk_discord::DiscordWebhookProvider,
    crosstalk_relay::{RelayService, SqliteRelayStore},
};

/// Open the store (running migrations) and wire a relay service around it.
pub async fn build_service(config: &CrosstalkConfig) -> Result<Arc<RelayService>> {
    let store = SqliteRelayStore::connect(&config.database.url, config.database.max_connections)
        .await
        .with_context(|| format!("failed to open {}", config.database.url))?;
    let provider = DiscordWebhookProvider::new(&config.discord)?;
    let filter = crosstalk_filter::from_config(&config.filter);
    let service = RelayService::new(Arc::new(store), Arc::new(provider), filter);
    service.start().await?;
    Ok(service)
}

/// Run `command` against a started service and shut it down afterwards,
/// whether or not the command succeeded.
async fn with_service<F, Fut>(config: &CrosstalkConfig, command: F) -> Result<()>
where
    F: FnOnce(Arc<RelayService>) -> Fut,
    Fut: Future<Output = Result<()>>,
{
    let service = build_service(config).await?;
    let result = command(Arc::clone(&service)).await;
    service.shutdown(Duration::from_secs(1)).await;
    result
}

pub async fn migrate(config: &CrosstalkConfig) -> Result<()> {
    let pool = sqlx::SqlitePool::connect(&config.database.url).await?;
    crosstalk_relay::run_migrations(&pool).await?;
    println!("Migrations applied to {}.", config.database.url);
    Ok(())
}

pub async fn stats(config: &CrosstalkConfig) -> Result<()> {
    with_service(config, |service| async move {
        let stats = service.get_stats().await?;
        println!("Configured servers: {}", stats.total_configured);
        println!("Enabled servers:    {}", stats.enabled_count);
        println!("Live webhooks:      {}", stats.live_endpoint_count);
        println!("Queued messages:    {}", stats.queue_depth);
        println!("Network health:     {}", stats.health());
        Ok(())
    })
    .await
}

pub async fn ban(config: &CrosstalkConfig, user_id: &str, by: &str, reason: &str) -> Result<()> {
    with_service(config, |service| async move {
        let entry = service.ban(user_id, by, reason).await?;
        println!("Banned {} ({}).", entry.user_id, entry.reason);
        Ok(())
    })
    .await
}

pub async fn unban(config: &CrosstalkConfig, user_id: &str) -> Result<()> {
    with_service(config, |service| async move {
        service.unban(user_id).await?;
        println!("Unbanned {user_id}.");
        Ok(())
    })
    .await
}

pub async fn bans(config: &CrosstalkConfig) -> Result<()> {
    with_service(config, |service| async move {
        let bans = service.list_bans().await?;
        if bans.is_empty() {
            println!("No banned users.");
        }
        for ban in &bans {
            println!(
                "  {}  by {}  at {}  {}",
                ban.user_id, ban.banned_by, ban.banned_at, ban.reason
            );
        }
        Ok(())
    })
    .await
}

pub async fn enable(config: &CrosstalkConfig, guild_id: &str, channel_id: &str) -> Result<()> {
    with_service(config, |service| async move {
        service.enable_at(guild_id, channel_id).await?;
        println!("Relay enabled in {guild_id}, posting into {channel_id}.");
        Ok(())
    })
    .await
}

pub async fn disable(config: &CrosstalkConfig, guild_id: &str) -> Result<()> {
    with_service(config, |service| async move {
        service.disable_at(guild_id).await?;
        println!("Relay disabled in {guild_id}.");
        Ok(())
    })
    .await
}

pub async fn sweep(config: &CrosstalkConfig) -> Result<()> {
    with_service(config, |service| async move {
        let removed = service.sweep_invalid_endpoints().await;
        println!("Removed {removed} dead webhook(s).");
        Ok(())
    })
    .await
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {super::*, crosstalk_channels::InboundMessage, crosstalk_relay::Error as RelayError};

    #[tokio::test]
    async fn failed_command_still_shuts_the_service_down() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = CrosstalkConfig::default();
        config.database.url = format!("sqlite:{}?mode=rwc", dir.path().join("relay.db").display());

        let mut used = None;
        let err = with_service(&config, |service| {
            used = Some(Arc::clone(&service));
            async { Err::<(), _>(anyhow::anyhow!("command failed")) }
        })
        .await
        .unwrap_err();
        assert_eq!(err.to_string(), "command failed");

        let service = used.unwrap();
        let submitted = service.submit(&InboundMessage::default()).await;
        assert!(matches!(submitted, Err(RelayError::QueueClosed)));
    }
}
