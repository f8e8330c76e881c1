use std::fmt;

use crate::{Result, queue::RelayQueue, registry::DestinationRegistry, store::RelayStore};

/// Counts across store, registry and queue at one moment.
///
/// `live_endpoint_count` can trail `enabled_count` while an invalidation has
/// reached memory but not the store yet.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RelayStats {
    pub total_configured: usize,
    pub enabled_count: usize,
    pub live_endpoint_count: usize,
    pub queue_depth: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetworkHealth {
    Healthy,
    Degraded,
}

impl fmt::Display for NetworkHealth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Healthy => f.write_str("healthy"),
            Self::Degraded => f.write_str("degraded"),
        }
    }
}

impl RelayStats {
    pub async fn collect(
        store: &dyn RelayStore,
        registry: &DestinationRegistry,
        queue: &RelayQueue,
    ) -> Result<Self> {
        let total_configured = store.list_settings().await?.len();
        let enabled_count = store.list_enabled().await?.len();
        Ok(Self {
            total_configured,
            enabled_count,
            live_endpoint_count: registry.live_endpoint_count(),
            queue_depth: queue.depth(),
        })
    }

    pub fn health(&self) -> NetworkHealth {
        if self.live_endpoint_count == self.enabled_count {
            NetworkHealth::Healthy
        } else {
            NetworkHealth::Degraded
        }
    }
}

impl fmt::Display for RelayStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "configured: {}, enabled: {}, live endpoints: {}, queued: {} ({})",
            self.total_configured,
            self.enabled_count,
            self.live_endpoint_count,
            self.queue_depth,
            self.health()
        )
    }
}
