//! Destination registry: one live endpoint handle per participating group.
//!
//! The in-memory map is the dispatcher's view of where to deliver. The
//! [`RelayStore`] stays the durable source of truth. Admin mutations write
//! the store first and only touch memory after the store confirmed.
//! Invalidation runs the other way round (memory first) so the dispatcher
//! stops using a dead endpoint immediately; if the follow-up store write
//! fails, the group is remembered and the write is retried by
//! [`DestinationRegistry::reconcile_pending`]. Changes other processes make
//! to the store are picked up by [`DestinationRegistry::sync_with_store`].

use std::{
    collections::BTreeMap,
    fmt,
    sync::{Arc, Mutex, RwLock},
};

use {
    crosstalk_channels::{EndpointCredentials, EndpointHandle, EndpointProvider},
    crosstalk_common::time::now_secs,
    tokio::task::JoinSet,
    tracing::{debug, error, info, warn},
};

#[cfg(feature = "metrics")]
use crosstalk_metrics::{counter, gauge, registry as registry_metrics};

use crate::{
    Error, Result,
    store::{RelaySettings, RelayStore},
};

/// A participating group as the dispatcher sees it.
#[derive(Clone)]
pub struct RelayDestination {
    pub group_id: String,
    pub enabled: bool,
    pub channel_id: Option<String>,
    pub endpoint: Option<EndpointHandle>,
}

impl RelayDestination {
    pub fn is_live(&self) -> bool {
        self.enabled && self.endpoint.is_some()
    }

    pub fn endpoint_id(&self) -> Option<&str> {
        self.endpoint.as_ref().map(|e| e.id())
    }
}

impl fmt::Debug for RelayDestination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RelayDestination")
            .field("group_id", &self.group_id)
            .field("enabled", &self.enabled)
            .field("channel_id", &self.channel_id)
            .field("endpoint", &self.endpoint_id())
            .finish()
    }
}

/// An endpoint resolved for a group, ready to be stored and cached.
struct Resolved {
    credentials: EndpointCredentials,
    handle: EndpointHandle,
    fresh: bool,
}

pub struct DestinationRegistry {
    store: Arc<dyn RelayStore>,
    provider: Arc<dyn EndpointProvider>,
    destinations: RwLock<BTreeMap<String, RelayDestination>>,
    /// Serializes admin mutations (and invalidation store writes) across awaits.
    admin: tokio::sync::Mutex<()>,
    /// group id -> dead endpoint id whose store-side disable has not landed yet.
    /// Always written under the map's write lock, map first.
    pending: Mutex<BTreeMap<String, String>>,
}

impl DestinationRegistry {
    pub fn new(store: Arc<dyn RelayStore>, provider: Arc<dyn EndpointProvider>) -> Self {
        Self {
            store,
            provider,
            destinations: RwLock::new(BTreeMap::new()),
            admin: tokio::sync::Mutex::new(()),
            pending: Mutex::new(BTreeMap::new()),
        }
    }

    /// Replace the in-memory map with every enabled, provisioned store row.
    pub async fn load_from_store(&self) -> Result<usize> {
        let _guard = self.admin.lock().await;
        let rows = self.store.list_enabled().await?;

        let mut loaded = BTreeMap::new();
        for row in rows {
            let Some(credentials) = row.endpoint.as_ref() else {
                warn!(group_id = %row.guild_id, "enabled relay row has no endpoint, skipping");
                continue;
            };
            let handle = self.provider.connect(credentials);
            loaded.insert(row.guild_id.clone(), RelayDestination {
                group_id: row.guild_id,
                enabled: true,
                channel_id: row.channel_id,
                endpoint: Some(handle),
            });
        }

        let count = loaded.len();
        *self.write_map() = loaded;
        self.report_live();
        info!(count, "loaded relay destinations");
        Ok(count)
    }

    /// Ensure `group_id` has an endpoint in `channel_id`, creating one if needed.
    ///
    /// Reuses the stored endpoint when it targets the same channel. The
    /// enabled flag is left as it was. On failure nothing changes.
    pub async fn provision(&self, group_id: &str, channel_id: &str) -> Result<EndpointHandle> {
        let _guard = self.admin.lock().await;
        let existing = self.store.get_settings(group_id).await?;
        let enabled = existing.as_ref().is_some_and(|s| s.enabled);
        let resolved = self
            .resolve_endpoint(group_id, channel_id, existing.as_ref())
            .await?;
        let resolved = self
            .commit(group_id, channel_id, enabled, resolved, false)
            .await?;
        Ok(resolved.handle)
    }

    /// Turn the relay on for `group_id`, delivering into `channel_id`.
    ///
    /// Provisions an endpoint if none exists for that channel. Pointing an
    /// enabled group at a different channel provisions a fresh endpoint.
    pub async fn enable(&self, group_id: &str, channel_id: &str) -> Result<()> {
        let _guard = self.admin.lock().await;
        let existing = self.store.get_settings(group_id).await?;
        let resolved = self
            .resolve_endpoint(group_id, channel_id, existing.as_ref())
            .await?;
        let resolved = self
            .commit(group_id, channel_id, true, resolved, true)
            .await?;
        info!(group_id, channel_id, fresh = resolved.fresh, "relay enabled");
        Ok(())
    }

    /// Store `resolved` for the group, then cache it.
    ///
    /// An invalidation may hit a reused endpoint while the store write is in
    /// flight. That endpoint is then known dead and a fresh one is provisioned
    /// in its place before anything is cached.
    async fn commit(
        &self,
        group_id: &str,
        channel_id: &str,
        enabled: bool,
        resolved: Resolved,
        always_write: bool,
    ) -> Result<Resolved> {
        if resolved.fresh || always_write {
            self.write_settings(group_id, channel_id, enabled, &resolved.credentials)
                .await?;
        }

        let resolved = if self.cache_unless_dead(group_id, channel_id, enabled, &resolved) {
            resolved
        } else {
            warn!(
                group_id,
                endpoint_id = %resolved.credentials.id,
                "endpoint invalidated during update, replacing it"
            );
            let fresh = self.provision_fresh(group_id, channel_id).await?;
            self.write_settings(group_id, channel_id, enabled, &fresh.credentials)
                .await?;
            self.cache(group_id, channel_id, enabled, &fresh.handle);
            fresh
        };

        // The store holds a live endpoint now; drop pending entries for older ones.
        let mut pending = self.pending_map();
        if pending
            .get(group_id)
            .is_some_and(|dead| *dead != resolved.credentials.id)
        {
            pending.remove(group_id);
        }
        Ok(resolved)
    }

    async fn write_settings(
        &self,
        group_id: &str,
        channel_id: &str,
        enabled: bool,
        credentials: &EndpointCredentials,
    ) -> Result<()> {
        self.store
            .upsert_settings(&RelaySettings {
                guild_id: group_id.to_string(),
                enabled,
                channel_id: Some(channel_id.to_string()),
                endpoint: Some(credentials.clone()),
                updated_at: now_secs(),
            })
            .await
    }

    /// Turn the relay off for `group_id`, keeping its endpoint for re-enable.
    ///
    /// Returns `false` when the group was not enabled.
    pub async fn disable(&self, group_id: &str) -> Result<bool> {
        let _guard = self.admin.lock().await;
        let Some(mut row) = self.store.get_settings(group_id).await? else {
            return Ok(false);
        };
        if !row.enabled {
            return Ok(false);
        }

        row.enabled = false;
        row.updated_at = now_secs();
        self.store.upsert_settings(&row).await?;

        if let Some(dest) = self.write_map().get_mut(group_id) {
            dest.enabled = false;
        }
        self.report_live();
        info!(group_id, "relay disabled");
        Ok(true)
    }

    /// Drop whatever endpoint `group_id` currently has and disable it in the store.
    ///
    /// Never fails: store errors are logged and retried later.
    pub async fn invalidate(&self, group_id: &str) {
        let endpoint_id = {
            let mut map = self.write_map();
            let endpoint_id = map
                .remove(group_id)
                .and_then(|d| d.endpoint_id().map(str::to_string));
            if let Some(id) = &endpoint_id {
                self.pending_map().insert(group_id.to_string(), id.clone());
            }
            endpoint_id
        };
        self.after_removal(group_id, endpoint_id).await;
    }

    /// Like [`invalidate`](Self::invalidate), but only when `endpoint_id`
    /// is still the group's endpoint. A concurrent re-enable that already
    /// replaced the endpoint is left alone. Returns whether anything was removed.
    pub async fn invalidate_endpoint(&self, group_id: &str, endpoint_id: &str) -> bool {
        let removed = {
            let mut map = self.write_map();
            let current = map
                .get(group_id)
                .is_some_and(|d| d.endpoint_id() == Some(endpoint_id));
            if current {
                self.pending_map()
                    .insert(group_id.to_string(), endpoint_id.to_string());
                map.remove(group_id)
            } else {
                None
            }
        };
        if removed.is_none() {
            debug!(group_id, endpoint_id, "endpoint already replaced, skipping invalidation");
            return false;
        }
        self.after_removal(group_id, Some(endpoint_id.to_string()))
            .await;
        true
    }

    async fn after_removal(&self, group_id: &str, endpoint_id: Option<String>) {
        self.report_live();
        #[cfg(feature = "metrics")]
        counter!(registry_metrics::INVALIDATIONS_TOTAL).increment(1);
        warn!(group_id, endpoint_id = ?endpoint_id, "relay endpoint invalidated");

        // An empty marker disables whatever endpoint the store holds.
        let marker = endpoint_id.unwrap_or_default();
        let _guard = self.admin.lock().await;
        match self.persist_invalidation(group_id, Some(&marker)).await {
            Ok(()) => {
                let mut pending = self.pending_map();
                if pending.get(group_id) == Some(&marker) {
                    pending.remove(group_id);
                }
            },
            Err(e) => {
                error!(group_id, error = %e, "failed to disable invalidated destination in store");
                self.pending_map()
                    .entry(group_id.to_string())
                    .or_insert(marker);
            },
        }
    }

    /// Write `enabled = false` (and forget the dead credentials) for a group
    /// whose endpoint was invalidated. Skips rows that moved on to another endpoint.
    async fn persist_invalidation(&self, group_id: &str, endpoint_id: Option<&str>) -> Result<()> {
        let Some(mut row) = self.store.get_settings(group_id).await? else {
            return Ok(());
        };
        if let Some(endpoint_id) = endpoint_id.filter(|id| !id.is_empty())
            && row.endpoint_id().is_some_and(|current| current != endpoint_id)
        {
            return Ok(());
        }
        if !row.enabled && row.endpoint.is_none() {
            return Ok(());
        }
        row.enabled = false;
        row.endpoint = None;
        row.updated_at = now_secs();
        self.store.upsert_settings(&row).await
    }

    /// Retry store writes left behind by failed invalidations.
    ///
    /// Returns how many groups are still pending.
    pub async fn reconcile_pending(&self) -> usize {
        let pending: Vec<(String, String)> = self
            .pending_map()
            .iter()
            .map(|(g, e)| (g.clone(), e.clone()))
            .collect();
        if pending.is_empty() {
            return 0;
        }

        let _guard = self.admin.lock().await;
        for (group_id, endpoint_id) in pending {
            match self.persist_invalidation(&group_id, Some(&endpoint_id)).await {
                Ok(()) => {
                    let mut map = self.pending_map();
                    if map.get(&group_id) == Some(&endpoint_id) {
                        map.remove(&group_id);
                    }
                    info!(group_id, "reconciled invalidated destination");
                },
                Err(e) => debug!(group_id, error = %e, "invalidation still pending"),
            }
        }
        self.pending_map().len()
    }

    /// Bring the in-memory map in line with the store's enabled rows.
    ///
    /// Other processes sharing the store (the admin CLI) may have enabled,
    /// disabled or re-targeted groups since this registry last looked. Rows
    /// still holding an endpoint that awaits its invalidation write are not
    /// revived. Returns how many destinations changed.
    pub async fn sync_with_store(&self) -> Result<usize> {
        let _guard = self.admin.lock().await;
        let wanted: BTreeMap<String, RelaySettings> = self
            .store
            .list_enabled()
            .await?
            .into_iter()
            .filter(|row| row.endpoint.is_some())
            .map(|row| (row.guild_id.clone(), row))
            .collect();

        let mut changed = 0;
        {
            let mut map = self.write_map();
            let pending = self.pending_map();

            for dest in map.values_mut() {
                if dest.enabled && !wanted.contains_key(&dest.group_id) {
                    dest.enabled = false;
                    changed += 1;
                    debug!(group_id = %dest.group_id, "destination no longer enabled in store");
                }
            }

            for (group_id, row) in wanted {
                let Some(credentials) = row.endpoint.as_ref() else {
                    continue;
                };
                if pending.get(&group_id) == Some(&credentials.id) {
                    continue;
                }
                let current = map.get(&group_id);
                if current
                    .is_some_and(|d| d.enabled && d.endpoint_id() == Some(credentials.id.as_str()))
                {
                    continue;
                }
                let handle = current
                    .and_then(|d| d.endpoint.clone())
                    .filter(|h| h.id() == credentials.id)
                    .unwrap_or_else(|| self.provider.connect(credentials));
                debug!(group_id = %group_id, endpoint_id = %credentials.id, "destination enabled in store");
                map.insert(group_id.clone(), RelayDestination {
                    group_id,
                    enabled: true,
                    channel_id: row.channel_id.clone(),
                    endpoint: Some(handle),
                });
                changed += 1;
            }
        }

        if changed > 0 {
            self.report_live();
            info!(changed, "synced relay destinations from store");
        }
        Ok(changed)
    }

    /// Groups whose invalidation has not reached the store yet.
    pub fn pending_groups(&self) -> Vec<String> {
        self.pending_map().keys().cloned().collect()
    }

    /// Point-in-time copy of every enabled, provisioned destination, ordered by group id.
    pub fn snapshot(&self) -> Vec<(String, EndpointHandle)> {
        self.read_map()
            .values()
            .filter_map(|d| match (&d.endpoint, d.enabled) {
                (Some(handle), true) => Some((d.group_id.clone(), Arc::clone(handle))),
                _ => None,
            })
            .collect()
    }

    pub fn get(&self, group_id: &str) -> Option<RelayDestination> {
        self.read_map().get(group_id).cloned()
    }

    pub fn live_endpoint_count(&self) -> usize {
        self.read_map().values().filter(|d| d.is_live()).count()
    }

    /// Probe every cached endpoint and invalidate those that are gone.
    ///
    /// Transient probe failures are left alone. Returns the number invalidated.
    pub async fn sweep(&self) -> usize {
        let targets: Vec<(String, EndpointHandle)> = self
            .read_map()
            .values()
            .filter_map(|d| d.endpoint.as_ref().map(|h| (d.group_id.clone(), Arc::clone(h))))
            .collect();

        let mut probes = JoinSet::new();
        for (group_id, handle) in targets {
            probes.spawn(async move {
                let outcome = handle.probe().await;
                (group_id, handle.id().to_string(), outcome)
            });
        }

        let mut invalidated = 0;
        while let Some(joined) = probes.join_next().await {
            let (group_id, endpoint_id, outcome) = match joined {
                Ok(probe) => probe,
                Err(e) => {
                    warn!(error = %e, "endpoint probe task failed");
                    continue;
                },
            };
            match outcome {
                Ok(()) => {},
                Err(e) if e.is_endpoint_gone() => {
                    if self.invalidate_endpoint(&group_id, &endpoint_id).await {
                        invalidated += 1;
                    }
                },
                Err(e) => debug!(group_id, error = %e, "endpoint probe inconclusive"),
            }
        }
        info!(invalidated, "endpoint sweep finished");
        invalidated
    }

    /// Find or create the endpoint for `group_id` in `channel_id`. No writes.
    ///
    /// Stored credentials already known dead are never reused.
    async fn resolve_endpoint(
        &self,
        group_id: &str,
        channel_id: &str,
        existing: Option<&RelaySettings>,
    ) -> Result<Resolved> {
        let dead = self.pending_map().get(group_id).cloned();
        let reusable = existing.and_then(|row| {
            let credentials = row.endpoint.as_ref()?;
            let same_channel = row.channel_id.as_deref() == Some(channel_id);
            let known_dead = dead.as_deref() == Some(credentials.id.as_str());
            (same_channel && !known_dead).then_some(credentials)
        });

        if let Some(credentials) = reusable {
            let cached = self
                .read_map()
                .get(group_id)
                .and_then(|d| d.endpoint.clone())
                .filter(|h| h.id() == credentials.id);
            let handle = cached.unwrap_or_else(|| self.provider.connect(credentials));
            return Ok(Resolved {
                credentials: credentials.clone(),
                handle,
                fresh: false,
            });
        }

        self.provision_fresh(group_id, channel_id).await
    }

    async fn provision_fresh(&self, group_id: &str, channel_id: &str) -> Result<Resolved> {
        let credentials = self
            .provider
            .provision(group_id, channel_id)
            .await
            .map_err(|e| Error::provision(group_id, e))?;
        #[cfg(feature = "metrics")]
        counter!(registry_metrics::PROVISIONS_TOTAL).increment(1);
        info!(group_id, channel_id, endpoint_id = %credentials.id, "provisioned relay endpoint");
        let handle = self.provider.connect(&credentials);
        Ok(Resolved {
            credentials,
            handle,
            fresh: true,
        })
    }

    /// Cache `resolved` unless an invalidation already marked it dead.
    /// Checked under the map's write lock so the two cannot interleave.
    fn cache_unless_dead(
        &self,
        group_id: &str,
        channel_id: &str,
        enabled: bool,
        resolved: &Resolved,
    ) -> bool {
        {
            let mut map = self.write_map();
            if self.pending_map().get(group_id) == Some(&resolved.credentials.id) {
                return false;
            }
            map.insert(group_id.to_string(), RelayDestination {
                group_id: group_id.to_string(),
                enabled,
                channel_id: Some(channel_id.to_string()),
                endpoint: Some(Arc::clone(&resolved.handle)),
            });
        }
        self.report_live();
        true
    }

    fn cache(&self, group_id: &str, channel_id: &str, enabled: bool, handle: &EndpointHandle) {
        self.write_map()
            .insert(group_id.to_string(), RelayDestination {
                group_id: group_id.to_string(),
                enabled,
                channel_id: Some(channel_id.to_string()),
                endpoint: Some(Arc::clone(handle)),
            });
        self.report_live();
    }

    fn report_live(&self) {
        #[cfg(feature = "metrics")]
        gauge!(registry_metrics::LIVE_ENDPOINTS).set(self.live_endpoint_count() as f64);
    }

    fn read_map(&self) -> std::sync::RwLockReadGuard<'_, BTreeMap<String, RelayDestination>> {
        self.destinations.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write_map(&self) -> std::sync::RwLockWriteGuard<'_, BTreeMap<String, RelayDestination>> {
        self.destinations.write().unwrap_or_else(|e| e.into_inner())
    }

    fn pending_map(&self) -> std::sync::MutexGuard<'_, BTreeMap<String, String>> {
        self.pending.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::testing::{FakeFailure, FakeProvider, InMemoryRelayStore},
        std::time::Duration,
    };

    struct Fixture {
        registry: DestinationRegistry,
        store: Arc<InMemoryRelayStore>,
        provider: Arc<FakeProvider>,
    }

    fn fixture() -> Fixture {
        let store = Arc::new(InMemoryRelayStore::new());
        let provider = Arc::new(FakeProvider::new());
        let registry = DestinationRegistry::new(store.clone(), provider.clone());
        Fixture {
            registry,
            store,
            provider,
        }
    }

    fn groups(snapshot: &[(String, EndpointHandle)]) -> Vec<&str> {
        snapshot.iter().map(|(g, _)| g.as_str()).collect()
    }

    #[tokio::test]
    async fn enable_persists_then_caches() {
        let f = fixture();
        f.registry.enable("g1", "c1").await.unwrap();

        let row = f.store.get_settings("g1").await.unwrap().unwrap();
        assert!(row.enabled);
        assert_eq!(row.channel_id.as_deref(), Some("c1"));
        assert!(row.endpoint.is_some());
        assert_eq!(groups(&f.registry.snapshot()), vec!["g1"]);
        assert_eq!(f.provider.provision_count(), 1);
    }

    #[tokio::test]
    async fn enable_disable_enable_provisions_once() {
        let f = fixture();
        f.registry.enable("g1", "c1").await.unwrap();
        assert!(f.registry.disable("g1").await.unwrap());
        assert!(f.registry.snapshot().is_empty());
        f.registry.enable("g1", "c1").await.unwrap();

        assert_eq!(f.provider.provision_count_for("g1"), 1);
        assert_eq!(groups(&f.registry.snapshot()), vec!["g1"]);
    }

    #[tokio::test]
    async fn retargeting_provisions_new_endpoint() {
        let f = fixture();
        f.registry.enable("g1", "c1").await.unwrap();
        let first = f.registry.get("g1").unwrap().endpoint_id().unwrap().to_string();
        f.registry.enable("g1", "c2").await.unwrap();
        let second = f.registry.get("g1").unwrap().endpoint_id().unwrap().to_string();

        assert_ne!(first, second);
        assert_eq!(f.provider.provision_count_for("g1"), 2);
        let row = f.store.get_settings("g1").await.unwrap().unwrap();
        assert_eq!(row.channel_id.as_deref(), Some("c2"));
        assert_eq!(row.endpoint_id(), Some(second.as_str()));
    }

    #[tokio::test]
    async fn provision_failure_leaves_state_untouched() {
        let f = fixture();
        f.provider.fail_provisioning(true);
        let err = f.registry.enable("g1", "c1").await.unwrap_err();
        assert!(matches!(err, Error::Provision { .. }));
        assert!(f.registry.get("g1").is_none());
        assert!(f.store.get_settings("g1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn store_failure_on_enable_leaves_memory_untouched() {
        let f = fixture();
        f.store.fail_writes(true);
        assert!(f.registry.enable("g1", "c1").await.is_err());
        assert!(f.registry.snapshot().is_empty());
    }

    #[tokio::test]
    async fn provision_is_idempotent_and_keeps_flag() {
        let f = fixture();
        let a = f.registry.provision("g1", "c1").await.unwrap();
        let b = f.registry.provision("g1", "c1").await.unwrap();
        assert_eq!(a.id(), b.id());
        assert_eq!(f.provider.provision_count(), 1);

        let row = f.store.get_settings("g1").await.unwrap().unwrap();
        assert!(!row.enabled);
        assert!(f.registry.snapshot().is_empty());
    }

    #[tokio::test]
    async fn disable_unknown_group_is_noop() {
        let f = fixture();
        assert!(!f.registry.disable("nope").await.unwrap());
    }

    #[tokio::test]
    async fn invalidate_excludes_from_snapshot() {
        let f = fixture();
        f.registry.enable("g1", "c1").await.unwrap();
        f.registry.enable("g2", "c2").await.unwrap();

        f.registry.invalidate("g2").await;
        assert_eq!(groups(&f.registry.snapshot()), vec!["g1"]);

        let row = f.store.get_settings("g2").await.unwrap().unwrap();
        assert!(!row.enabled);
        assert!(row.endpoint.is_none());
    }

    #[tokio::test]
    async fn invalidation_store_failure_is_reconciled_later() {
        let f = fixture();
        f.registry.enable("g1", "c1").await.unwrap();
        f.store.fail_writes(true);

        f.registry.invalidate("g1").await;
        assert_eq!(f.registry.live_endpoint_count(), 0);
        assert!(f.store.get_settings("g1").await.unwrap().unwrap().enabled);
        assert_eq!(f.registry.pending_groups(), vec!["g1"]);
        assert_eq!(f.registry.reconcile_pending().await, 1);

        f.store.fail_writes(false);
        assert_eq!(f.registry.reconcile_pending().await, 0);
        assert!(!f.store.get_settings("g1").await.unwrap().unwrap().enabled);
    }

    #[tokio::test]
    async fn enable_after_failed_invalidation_provisions_fresh() {
        let f = fixture();
        f.registry.enable("g1", "c1").await.unwrap();
        f.store.fail_writes(true);
        f.registry.invalidate("g1").await;
        f.store.fail_writes(false);

        f.registry.enable("g1", "c1").await.unwrap();
        assert_eq!(f.provider.provision_count_for("g1"), 2);
        assert!(f.registry.pending_groups().is_empty());
    }

    #[tokio::test]
    async fn stale_endpoint_invalidation_is_ignored() {
        let f = fixture();
        f.registry.enable("g1", "c1").await.unwrap();
        let old = f.registry.get("g1").unwrap().endpoint_id().unwrap().to_string();
        f.registry.enable("g1", "c2").await.unwrap();

        assert!(!f.registry.invalidate_endpoint("g1", &old).await);
        assert_eq!(f.registry.live_endpoint_count(), 1);
        assert!(f.store.get_settings("g1").await.unwrap().unwrap().enabled);
    }

    #[tokio::test]
    async fn load_from_store_hydrates_enabled_rows() {
        let f = fixture();
        for (group, enabled) in [("g1", true), ("g2", false), ("g3", true)] {
            f.store
                .upsert_settings(&RelaySettings {
                    guild_id: group.into(),
                    enabled,
                    channel_id: Some(format!("{group}-c")),
                    endpoint: Some(f.provider.seed_credentials(group)),
                    updated_at: 0,
                })
                .await
                .unwrap();
        }
        f.store
            .upsert_settings(&RelaySettings {
                guild_id: "g4".into(),
                enabled: true,
                channel_id: None,
                endpoint: None,
                updated_at: 0,
            })
            .await
            .unwrap();

        assert_eq!(f.registry.load_from_store().await.unwrap(), 2);
        assert_eq!(groups(&f.registry.snapshot()), vec!["g1", "g3"]);
        assert_eq!(f.provider.provision_count(), 0);
    }

    #[tokio::test]
    async fn sweep_invalidates_only_gone_endpoints() {
        let f = fixture();
        for g in ["g1", "g2", "g3"] {
            f.registry.enable(g, "c").await.unwrap();
        }
        f.provider
            .endpoint_for("g1")
            .unwrap()
            .fail_probe_with(Some(FakeFailure::NotFound));
        f.provider
            .endpoint_for("g2")
            .unwrap()
            .fail_probe_with(Some(FakeFailure::Transient));

        assert_eq!(f.registry.sweep().await, 1);
        assert_eq!(groups(&f.registry.snapshot()), vec!["g2", "g3"]);
        assert!(!f.store.get_settings("g1").await.unwrap().unwrap().enabled);
    }

    #[tokio::test]
    async fn invalidation_during_enable_never_leaves_dead_endpoint_live() {
        let store = Arc::new(InMemoryRelayStore::new());
        let provider = Arc::new(FakeProvider::new());
        let registry = Arc::new(DestinationRegistry::new(store.clone(), provider.clone()));
        registry.enable("g2", "c2").await.unwrap();
        let dead = registry.get("g2").unwrap().endpoint_id().unwrap().to_string();

        store.set_write_delay(Some(Duration::from_millis(200)));
        let enabling = tokio::spawn({
            let registry = Arc::clone(&registry);
            async move { registry.enable("g2", "c2").await }
        });
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(registry.invalidate_endpoint("g2", &dead).await);
        enabling.await.unwrap().unwrap();
        store.set_write_delay(None);

        let live = registry.get("g2").unwrap();
        let row = store.get_settings("g2").await.unwrap().unwrap();
        assert!(live.is_live());
        assert!(row.enabled);
        assert_eq!(live.endpoint_id(), row.endpoint_id());
        assert_ne!(row.endpoint_id(), Some(dead.as_str()));
        assert!(registry.pending_groups().is_empty());
        assert_eq!(provider.provision_count_for("g2"), 2);
    }

    #[tokio::test]
    async fn sync_follows_changes_made_through_another_registry() {
        let f = fixture();
        f.registry.enable("g1", "c1").await.unwrap();
        f.registry.enable("g2", "c2").await.unwrap();

        let other = DestinationRegistry::new(f.store.clone(), f.provider.clone());
        assert!(other.disable("g2").await.unwrap());
        other.enable("g3", "c3").await.unwrap();
        assert_eq!(groups(&f.registry.snapshot()), vec!["g1", "g2"]);

        assert_eq!(f.registry.sync_with_store().await.unwrap(), 2);
        assert_eq!(groups(&f.registry.snapshot()), vec!["g1", "g3"]);
        assert_eq!(f.registry.sync_with_store().await.unwrap(), 0);
        assert_eq!(f.provider.provision_count_for("g3"), 1);
    }

    #[tokio::test]
    async fn sync_picks_up_retargeted_endpoint() {
        let f = fixture();
        f.registry.enable("g1", "c1").await.unwrap();
        let other = DestinationRegistry::new(f.store.clone(), f.provider.clone());
        other.enable("g1", "c9").await.unwrap();

        assert_eq!(f.registry.sync_with_store().await.unwrap(), 1);
        let row = f.store.get_settings("g1").await.unwrap().unwrap();
        let dest = f.registry.get("g1").unwrap();
        assert_eq!(dest.endpoint_id(), row.endpoint_id());
        assert_eq!(dest.channel_id.as_deref(), Some("c9"));
    }

    #[tokio::test]
    async fn sync_does_not_revive_endpoint_awaiting_invalidation() {
        let f = fixture();
        f.registry.enable("g1", "c1").await.unwrap();
        f.store.fail_writes(true);
        f.registry.invalidate("g1").await;

        assert!(f.store.get_settings("g1").await.unwrap().unwrap().enabled);
        assert_eq!(f.registry.sync_with_store().await.unwrap(), 0);
        assert!(f.registry.snapshot().is_empty());
    }

    #[test]
    fn debug_shows_endpoint_id() {
        let provider = FakeProvider::new();
        let creds = provider.seed_credentials("g1");
        let dest = RelayDestination {
            group_id: "g1".into(),
            enabled: true,
            channel_id: None,
            endpoint: Some(provider.connect(&creds)),
        };
        assert!(format!("{dest:?}").contains(&creds.id));
    }
}
