//! Relay service facade used by the command layer and message intake.

use std::{fmt, sync::Arc, time::Duration};

use {
    crosstalk_channels::{ContentFilter, EndpointProvider, InboundMessage, Permissions, RelayPayload},
    crosstalk_common::time::now_secs,
    tracing::{debug, info},
};

use crate::{
    Error, Result,
    dispatcher::{Dispatcher, DispatcherState},
    gate::{ModerationGate, RejectReason, Verdict},
    queue::RelayQueue,
    registry::DestinationRegistry,
    stats::RelayStats,
    store::{BanEntry, RelayStore},
};

/// Outcome of [`RelayService::submit`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayResult {
    pub accepted: bool,
    pub reason: Option<RejectReason>,
    pub job_id: Option<u64>,
    /// The relayed text differs from what the user wrote.
    pub redacted: bool,
}

impl RelayResult {
    fn rejected(reason: RejectReason) -> Self {
        Self {
            accepted: false,
            reason: Some(reason),
            job_id: None,
            redacted: false,
        }
    }
}

/// Privileged operations and who may run them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdminAction {
    Enable,
    Disable,
    Ban,
    Unban,
}

impl AdminAction {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Enable => "enable",
            Self::Disable => "disable",
            Self::Ban => "ban",
            Self::Unban => "unban",
        }
    }

    /// Check `perms` before running the action.
    pub fn authorize(self, perms: &Permissions) -> Result<()> {
        let (allowed, required) = match self {
            Self::Enable | Self::Disable => (perms.can_manage_relay(), "manage guild"),
            Self::Ban | Self::Unban => (perms.can_moderate(), "administrator"),
        };
        if allowed {
            Ok(())
        } else {
            Err(Error::PermissionDenied {
                action: self.as_str(),
                required,
            })
        }
    }
}

impl fmt::Display for AdminAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Gate, registry, queue and dispatcher wired together.
pub struct RelayService {
    store: Arc<dyn RelayStore>,
    gate: ModerationGate,
    registry: Arc<DestinationRegistry>,
    queue: Arc<RelayQueue>,
    dispatcher: Arc<Dispatcher>,
}

impl RelayService {
    pub fn new(
        store: Arc<dyn RelayStore>,
        provider: Arc<dyn EndpointProvider>,
        filter: Arc<dyn ContentFilter>,
    ) -> Arc<Self> {
        Self::with_batch_delay(store, provider, filter, crate::dispatcher::INTER_BATCH_DELAY)
    }

    /// Like [`new`](Self::new) with a custom pause between jobs.
    pub fn with_batch_delay(
        store: Arc<dyn RelayStore>,
        provider: Arc<dyn EndpointProvider>,
        filter: Arc<dyn ContentFilter>,
        batch_delay: Duration,
    ) -> Arc<Self> {
        let registry = Arc::new(DestinationRegistry::new(Arc::clone(&store), provider));
        let queue = Arc::new(RelayQueue::new());
        let dispatcher =
            Dispatcher::with_batch_delay(Arc::clone(&queue), Arc::clone(&registry), batch_delay);
        Arc::new(Self {
            gate: ModerationGate::new(Arc::clone(&store), filter),
            store,
            registry,
            queue,
            dispatcher,
        })
    }

    /// Hydrate the registry from the store and start the dispatcher.
    /// Returns the number of destinations loaded.
    pub async fn start(&self) -> Result<usize> {
        let loaded = self.registry.load_from_store().await?;
        self.dispatcher.start();
        Ok(loaded)
    }

    /// Moderate a message and, if accepted, queue it for fan-out.
    ///
    /// Returns as soon as the job is queued. Rejections are results, not errors.
    pub async fn submit(&self, msg: &InboundMessage) -> Result<RelayResult> {
        if self.queue.is_closed() {
            return Err(Error::QueueClosed);
        }
        match self.gate.evaluate(&msg.author_id, &msg.content).await? {
            Verdict::Rejected(reason) => {
                info!(user_id = %msg.author_id, guild_id = %msg.guild_id, %reason, "message rejected");
                Ok(RelayResult::rejected(reason))
            },
            Verdict::Accepted { content, redacted } => {
                let payload = RelayPayload::from_inbound(msg, content);
                let job_id = self.queue.enqueue(payload, &msg.guild_id)?;
                Ok(RelayResult {
                    accepted: true,
                    reason: None,
                    job_id: Some(job_id),
                    redacted,
                })
            },
        }
    }

    pub async fn enable_at(&self, group_id: &str, channel_id: &str) -> Result<()> {
        self.registry.enable(group_id, channel_id).await
    }

    /// Fails with [`Error::NotEnabled`] when the relay is already off.
    pub async fn disable_at(&self, group_id: &str) -> Result<()> {
        if self.registry.disable(group_id).await? {
            Ok(())
        } else {
            Err(Error::not_enabled(group_id))
        }
    }

    /// Ban `user_id` network-wide. Takes effect for the next evaluated message.
    pub async fn ban(&self, user_id: &str, banned_by: &str, reason: &str) -> Result<BanEntry> {
        if self.store.get_ban(user_id).await?.is_some() {
            return Err(Error::already_banned(user_id));
        }
        let entry = BanEntry {
            user_id: user_id.to_string(),
            banned_by: banned_by.to_string(),
            reason: reason.to_string(),
            banned_at: now_secs(),
        };
        // A concurrent ban may have landed between the lookup and the insert.
        if !self.store.insert_ban(&entry).await? {
            return Err(Error::already_banned(user_id));
        }
        info!(user_id, banned_by, reason, "user banned");
        Ok(entry)
    }

    pub async fn unban(&self, user_id: &str) -> Result<()> {
        if !self.store.delete_ban(user_id).await? {
            return Err(Error::not_banned(user_id));
        }
        info!(user_id, "user unbanned");
        Ok(())
    }

    pub async fn ban_entry(&self, user_id: &str) -> Result<Option<BanEntry>> {
        self.store.get_ban(user_id).await
    }

    pub async fn list_bans(&self) -> Result<Vec<BanEntry>> {
        self.store.list_bans().await
    }

    pub async fn get_stats(&self) -> Result<RelayStats> {
        RelayStats::collect(self.store.as_ref(), &self.registry, &self.queue).await
    }

    /// Probe every endpoint and invalidate the dead ones. Returns how many.
    pub async fn sweep_invalid_endpoints(&self) -> usize {
        self.registry.sweep().await
    }

    pub async fn is_enabled(&self, group_id: &str) -> Result<bool> {
        Ok(self
            .store
            .get_settings(group_id)
            .await?
            .is_some_and(|s| s.enabled))
    }

    /// The channel relayed messages are posted into, if the group ever set one.
    pub async fn relay_channel(&self, group_id: &str) -> Result<Option<String>> {
        Ok(self
            .store
            .get_settings(group_id)
            .await?
            .and_then(|s| s.channel_id))
    }

    /// Whether a message posted in `channel_id` should enter the relay.
    pub async fn is_relay_channel(&self, group_id: &str, channel_id: &str) -> Result<bool> {
        let settings = self.store.get_settings(group_id).await?;
        Ok(settings
            .is_some_and(|s| s.enabled && s.channel_id.as_deref() == Some(channel_id)))
    }

    pub fn registry(&self) -> &Arc<DestinationRegistry> {
        &self.registry
    }

    pub fn queue_depth(&self) -> usize {
        self.queue.depth()
    }

    pub fn dispatcher_state(&self) -> DispatcherState {
        self.dispatcher.state()
    }

    /// Resolve once every submitted job has been fanned out or dropped.
    pub async fn wait_idle(&self) {
        self.queue.wait_idle().await;
    }

    /// Refuse new submissions, let the job in flight settle and drop the rest.
    pub async fn shutdown(&self, grace: Duration) {
        self.queue.close();
        debug!(queued = self.queue.depth(), "relay shutting down");
        self.dispatcher.shutdown(grace).await;
        info!("relay service stopped");
    }
}
