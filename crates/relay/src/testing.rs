//! In-memory store, scripted filter and fake endpoints for tests.

use std::{
    collections::{BTreeMap, HashMap},
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
    time::Duration,
};

use {
    async_trait::async_trait,
    crosstalk_channels::{
        Classification, ContentFilter, DeliveryEndpoint, DeliveryError, EndpointCredentials,
        EndpointHandle, EndpointProvider, FilterError, ProvisionError, RelayPayload, Severity,
    },
};

use crate::{
    Error, Result,
    store::{BanEntry, RelaySettings, RelayStore},
};

// ── Store ───────────────────────────────────────────────────────────────────

/// In-memory store. Writes can be made to fail or stall to exercise lazy
/// reconciliation and races with admin mutations.
#[derive(Default)]
pub struct InMemoryRelayStore {
    settings: Mutex<BTreeMap<String, RelaySettings>>,
    bans: Mutex<BTreeMap<String, BanEntry>>,
    fail_writes: AtomicBool,
    write_delay: Mutex<Option<Duration>>,
    broken_keys: Mutex<Vec<String>>,
}

impl InMemoryRelayStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent write return a store error until reset.
    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Hold every subsequent settings write for `delay` before applying it.
    pub fn set_write_delay(&self, delay: Option<Duration>) {
        *self.write_delay.lock().unwrap_or_else(|e| e.into_inner()) = delay;
    }

    /// Make settings and ban lookups for `key` (a guild or user id) fail.
    pub fn fail_reads_for(&self, key: &str) {
        self.broken_keys
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(key.to_string());
    }

    fn check_read(&self, key: &str) -> Result<()> {
        let broken = self.broken_keys.lock().unwrap_or_else(|e| e.into_inner());
        if broken.iter().any(|k| k == key) {
            return Err(Error::store(format!("injected read failure for {key}")));
        }
        Ok(())
    }

    fn check_write(&self) -> Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(Error::store("injected write failure"));
        }
        Ok(())
    }
}

#[async_trait]
impl RelayStore for InMemoryRelayStore {
    async fn get_settings(&self, guild_id: &str) -> Result<Option<RelaySettings>> {
        self.check_read(guild_id)?;
        let settings = self.settings.lock().unwrap_or_else(|e| e.into_inner());
        Ok(settings.get(guild_id).cloned())
    }

    async fn upsert_settings(&self, row: &RelaySettings) -> Result<()> {
        let delay = *self.write_delay.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.check_write()?;
        let mut settings = self.settings.lock().unwrap_or_else(|e| e.into_inner());
        settings.insert(row.guild_id.clone(), row.clone());
        Ok(())
    }

    async fn list_settings(&self) -> Result<Vec<RelaySettings>> {
        let settings = self.settings.lock().unwrap_or_else(|e| e.into_inner());
        Ok(settings.values().cloned().collect())
    }

    async fn list_enabled(&self) -> Result<Vec<RelaySettings>> {
        let settings = self.settings.lock().unwrap_or_else(|e| e.into_inner());
        Ok(settings.values().filter(|s| s.enabled).cloned().collect())
    }

    async fn get_ban(&self, user_id: &str) -> Result<Option<BanEntry>> {
        self.check_read(user_id)?;
        let bans = self.bans.lock().unwrap_or_else(|e| e.into_inner());
        Ok(bans.get(user_id).cloned())
    }

    async fn insert_ban(&self, entry: &BanEntry) -> Result<bool> {
        self.check_write()?;
        let mut bans = self.bans.lock().unwrap_or_else(|e| e.into_inner());
        if bans.contains_key(&entry.user_id) {
            return Ok(false);
        }
        bans.insert(entry.user_id.clone(), entry.clone());
        Ok(true)
    }

    async fn delete_ban(&self, user_id: &str) -> Result<bool> {
        self.check_write()?;
        let mut bans = self.bans.lock().unwrap_or_else(|e| e.into_inner());
        Ok(bans.remove(user_id).is_some())
    }

    async fn list_bans(&self) -> Result<Vec<BanEntry>> {
        let bans = self.bans.lock().unwrap_or_else(|e| e.into_inner());
        let mut out: Vec<_> = bans.values().cloned().collect();
        out.sort_by(|a, b| b.banned_at.cmp(&a.banned_at));
        Ok(out)
    }
}

// ── Filter ──────────────────────────────────────────────────────────────────

/// Filter answering from a fixed table; unknown text is clean.
#[derive(Default)]
pub struct ScriptedFilter {
    verdicts: Mutex<HashMap<String, Classification>>,
    failing: AtomicBool,
    calls: AtomicUsize,
}

impl ScriptedFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, text: &str, severity: Severity, redacted: &str) {
        let mut verdicts = self.verdicts.lock().unwrap_or_else(|e| e.into_inner());
        verdicts.insert(text.to_string(), Classification {
            severity,
            redacted_text: redacted.to_string(),
        });
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ContentFilter for ScriptedFilter {
    async fn classify(&self, text: &str) -> std::result::Result<Classification, FilterError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.failing.load(Ordering::SeqCst) {
            return Err(FilterError::unavailable("scripted outage"));
        }
        let verdicts = self.verdicts.lock().unwrap_or_else(|e| e.into_inner());
        Ok(verdicts
            .get(text)
            .cloned()
            .unwrap_or_else(|| Classification::clean(text)))
    }
}

// ── Endpoints ───────────────────────────────────────────────────────────────

/// Failure a [`FakeEndpoint`] reports instead of delivering.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FakeFailure {
    NotFound,
    Unauthorized,
    RateLimited,
    Transient,
}

impl FakeFailure {
    fn to_error(self) -> DeliveryError {
        match self {
            Self::NotFound => DeliveryError::NotFound,
            Self::Unauthorized => DeliveryError::Unauthorized,
            Self::RateLimited => DeliveryError::RateLimited { retry_after: None },
            Self::Transient => DeliveryError::transient("connection reset"),
        }
    }
}

/// Delivery lifecycle event recorded by fake endpoints, in wall-clock order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryEvent {
    Started { group_id: String, content: String },
    Finished { group_id: String, content: String },
}

/// One delivery attempt as seen by a fake endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    pub group_id: String,
    pub endpoint_id: String,
    pub content: String,
    pub ok: bool,
}

#[derive(Default)]
struct DeliveryLog {
    deliveries: Mutex<Vec<Delivery>>,
    events: Mutex<Vec<DeliveryEvent>>,
}

/// Endpoint recording every attempt into the provider's shared log.
pub struct FakeEndpoint {
    id: String,
    group_id: String,
    log: Arc<DeliveryLog>,
    failure: Mutex<Option<FakeFailure>>,
    probe_failure: Mutex<Option<FakeFailure>>,
    delay: Mutex<Option<Duration>>,
}

impl FakeEndpoint {
    pub fn group_id(&self) -> &str {
        &self.group_id
    }

    pub fn fail_with(&self, failure: Option<FakeFailure>) {
        *self.failure.lock().unwrap_or_else(|e| e.into_inner()) = failure;
    }

    pub fn fail_probe_with(&self, failure: Option<FakeFailure>) {
        *self.probe_failure.lock().unwrap_or_else(|e| e.into_inner()) = failure;
    }

    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock().unwrap_or_else(|e| e.into_inner()) = Some(delay);
    }

    fn push_event(&self, event: DeliveryEvent) {
        self.log
            .events
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(event);
    }
}

#[async_trait]
impl DeliveryEndpoint for FakeEndpoint {
    fn id(&self) -> &str {
        &self.id
    }

    async fn deliver(&self, payload: &RelayPayload) -> std::result::Result<(), DeliveryError> {
        self.push_event(DeliveryEvent::Started {
            group_id: self.group_id.clone(),
            content: payload.content.clone(),
        });
        let delay = *self.delay.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let failure = *self.failure.lock().unwrap_or_else(|e| e.into_inner());
        self.log
            .deliveries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(Delivery {
                group_id: self.group_id.clone(),
                endpoint_id: self.id.clone(),
                content: payload.content.clone(),
                ok: failure.is_none(),
            });
        self.push_event(DeliveryEvent::Finished {
            group_id: self.group_id.clone(),
            content: payload.content.clone(),
        });
        match failure {
            Some(f) => Err(f.to_error()),
            None => Ok(()),
        }
    }

    async fn probe(&self) -> std::result::Result<(), DeliveryError> {
        let failure = *self.probe_failure.lock().unwrap_or_else(|e| e.into_inner());
        match failure {
            Some(f) => Err(f.to_error()),
            None => Ok(()),
        }
    }
}

/// Provider minting fake endpoints and counting provisioning calls.
#[derive(Default)]
pub struct FakeProvider {
    log: Arc<DeliveryLog>,
    endpoints: Mutex<HashMap<String, Arc<FakeEndpoint>>>,
    owners: Mutex<HashMap<String, String>>,
    provisions: Mutex<Vec<(String, String)>>,
    next_id: AtomicUsize,
    fail_provisioning: AtomicBool,
}

impl FakeProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `provision` refuse with a missing-permission error.
    pub fn fail_provisioning(&self, fail: bool) {
        self.fail_provisioning.store(fail, Ordering::SeqCst);
    }

    /// Total successful provisioning calls.
    pub fn provision_count(&self) -> usize {
        self.provisions.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn provision_count_for(&self, group_id: &str) -> usize {
        self.provisions
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .filter(|(g, _)| g == group_id)
            .count()
    }

    /// Credentials for a group as if provisioned earlier, for seeding stores.
    pub fn seed_credentials(&self, group_id: &str) -> EndpointCredentials {
        let n = self.next_id.fetch_add(1, Ordering::SeqCst);
        let id = format!("hook-{n}");
        self.owners
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(id.clone(), group_id.to_string());
        EndpointCredentials::new(id.clone(), format!("token-{n}"), format!("fake://{id}"))
    }

    /// The most recently connected endpoint belonging to `group_id`.
    pub fn endpoint_for(&self, group_id: &str) -> Option<Arc<FakeEndpoint>> {
        let endpoints = self.endpoints.lock().unwrap_or_else(|e| e.into_inner());
        endpoints
            .values()
            .filter(|e| e.group_id == group_id)
            .max_by_key(|e| {
                e.id.trim_start_matches("hook-")
                    .parse::<usize>()
                    .unwrap_or_default()
            })
            .cloned()
    }

    pub fn deliveries(&self) -> Vec<Delivery> {
        self.log
            .deliveries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn deliveries_to(&self, group_id: &str) -> Vec<Delivery> {
        self.deliveries()
            .into_iter()
            .filter(|d| d.group_id == group_id)
            .collect()
    }

    pub fn events(&self) -> Vec<DeliveryEvent> {
        self.log
            .events
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

#[async_trait]
impl EndpointProvider for FakeProvider {
    async fn provision(
        &self,
        group_id: &str,
        channel_id: &str,
    ) -> std::result::Result<EndpointCredentials, ProvisionError> {
        if self.fail_provisioning.load(Ordering::SeqCst) {
            return Err(ProvisionError::missing_permission(channel_id));
        }
        self.provisions
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push((group_id.to_string(), channel_id.to_string()));
        Ok(self.seed_credentials(group_id))
    }

    fn connect(&self, credentials: &EndpointCredentials) -> EndpointHandle {
        let mut endpoints = self.endpoints.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(existing) = endpoints.get(&credentials.id) {
            return Arc::clone(existing) as EndpointHandle;
        }
        let group_id = self
            .owners
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(&credentials.id)
            .cloned()
            .unwrap_or_else(|| credentials.id.clone());
        let endpoint = Arc::new(FakeEndpoint {
            id: credentials.id.clone(),
            group_id,
            log: Arc::clone(&self.log),
            failure: Mutex::new(None),
            probe_failure: Mutex::new(None),
            delay: Mutex::new(None),
        });
        endpoints.insert(credentials.id.clone(), Arc::clone(&endpoint));
        endpoint
    }
}
