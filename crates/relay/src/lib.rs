//! Cross-group message relay engine.
//!
//! Messages posted in one participating group pass the [`gate`], are queued
//! as [`queue::RelayJob`]s and fanned out by a single [`dispatcher`] worker
//! to every other enabled destination in the [`registry`]. Settings and bans
//! persist through a [`store::RelayStore`].

pub mod dispatcher;
pub mod error;
pub mod gate;
pub mod queue;
pub mod registry;
pub mod service;
pub mod stats;
pub mod store;
pub mod store_sqlite;
#[cfg(any(test, feature = "test-utils"))]
pub mod testing;

pub use {
    dispatcher::{DispatcherState, INTER_BATCH_DELAY, JobReport},
    error::{Error, Result},
    gate::{ModerationGate, RejectReason, Verdict},
    queue::{RelayJob, RelayQueue},
    registry::{DestinationRegistry, RelayDestination},
    service::{AdminAction, RelayResult, RelayService},
    stats::{NetworkHealth, RelayStats},
    store::{BanEntry, RelaySettings, RelayStore},
    store_sqlite::SqliteRelayStore,
};

/// Run database migrations for the relay tables.
///
/// Creates `relay_settings` and `relay_bans`. Call at startup before using
/// [`SqliteRelayStore::with_pool`].
pub async fn run_migrations(pool: &sqlx::SqlitePool) -> Result<()> {
    sqlx::migrate!("./migrations")
        .set_ignore_missing(true)
        .run(pool)
        .await?;
    Ok(())
}
