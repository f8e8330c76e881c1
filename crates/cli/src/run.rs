//! Long-running relay host.
//!
//! Reads one JSON-encoded inbound message per stdin line (as produced by a
//! chat gateway), relays the ones posted in a relay channel, and sweeps dead
//! webhooks on the configured interval until interrupted. Store errors for
//! a single message are logged and the message skipped; only stdin failures
//! end intake.

use std::{sync::Arc, time::Duration};

use {
    anyhow::Result,
    crosstalk_channels::InboundMessage,
    crosstalk_config::CrosstalkConfig,
    crosstalk_relay::{Error as RelayError, RelayService},
    tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader},
    tracing::{debug, info, warn},
};

use crate::relay_commands::build_service;

pub async fn run(config: CrosstalkConfig) -> Result<()> {
    let service = build_service(&config).await?;
    let stats = service.get_stats().await?;
    info!(
        enabled = stats.enabled_count,
        live = stats.live_endpoint_count,
        "relay ready"
    );

    let sweeper = tokio::spawn(sweep_loop(
        Arc::clone(&service),
        Duration::from_secs(config.relay.sweep_interval_secs.max(1)),
    ));

    tokio::select! {
        res = intake(Arc::clone(&service), BufReader::new(tokio::io::stdin())) => {
            if let Err(e) = res {
                warn!(error = %e, "message intake stopped");
            }
        },
        _ = tokio::signal::ctrl_c() => info!("interrupt received"),
    }

    sweeper.abort();
    service
        .shutdown(Duration::from_secs(config.relay.shutdown_grace_secs))
        .await;
    Ok(())
}

async fn sweep_loop(service: Arc<RelayService>, every: Duration) {
    let mut ticker = tokio::time::interval(every);
    // The first tick fires immediately; startup already loaded fresh state.
    ticker.tick().await;
    loop {
        ticker.tick().await;
        let removed = service.sweep_invalid_endpoints().await;
        info!(removed, "scheduled endpoint sweep done");
    }
}

async fn intake<R>(service: Arc<RelayService>, input: R) -> Result<()>
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = input.lines();
    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        let msg: InboundMessage = match serde_json::from_str(&line) {
            Ok(msg) => msg,
            Err(e) => {
                warn!(error = %e, "skipping malformed inbound message");
                continue;
            },
        };
        match service.is_relay_channel(&msg.guild_id, &msg.channel_id).await {
            Ok(true) => {},
            Ok(false) => {
                debug!(
                    guild_id = %msg.guild_id,
                    channel_id = %msg.channel_id,
                    "not a relay channel"
                );
                continue;
            },
            Err(e) => {
                warn!(
                    guild_id = %msg.guild_id,
                    error = %e,
                    "relay settings lookup failed, skipping message"
                );
                continue;
            },
        }
        match service.submit(&msg).await {
            Ok(result) => match result.reason {
                Some(reason) => info!(user_id = %msg.author_id, %reason, "message not relayed"),
                None => debug!(job_id = ?result.job_id, "message queued"),
            },
            Err(RelayError::QueueClosed) => {
                warn!("relay queue closed, stopping intake");
                break;
            },
            Err(e) => warn!(user_id = %msg.author_id, error = %e, "message dropped"),
        }
    }
    info!("intake finished, waiting for queued messages");
    service.wait_idle().await;
    Ok(())
}
