//! Picks up writes made to the store by other processes.
//!
//! Another process sharing the database file does not publish on this
//! process's `ChangeBus`. The watcher re-reads the owner's records every
//! watch interval and republishes anything that moved.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use crate::db::SettingKey;
use crate::models::OwnerId;
use crate::store::MedicineStore;

/// Every storage key that belongs to `owner`.
pub fn watched_keys(owner: &OwnerId) -> Vec<String> {
    std::iter::once(owner.medicines_key())
        .chain(SettingKey::ALL.iter().map(|k| k.key_for(owner)))
        .collect()
}

/// Handle to a running watcher. Dropping it stops the poll loop.
pub struct WatcherHandle {
    owner: OwnerId,
    shutdown_tx: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

impl WatcherHandle {
    pub fn shutdown(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
            tracing::info!(owner = %self.owner, "Store watcher shutdown signal sent");
        }
    }

    /// Stop and wait for the loop to exit.
    pub async fn stop(mut self) {
        self.shutdown();
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

impl Drop for WatcherHandle {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Spawn the poll loop for one owner.
///
/// The first poll only records a baseline, so nothing already stored is
/// reported as a change.
pub fn start_watcher(store: Arc<MedicineStore>, owner: OwnerId, interval: Duration) -> WatcherHandle {
    let (shutdown_tx, mut shutdown_rx) = oneshot::channel::<()>();
    let keys = watched_keys(&owner);
    let loop_owner = owner.clone();

    let task = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        tracing::info!(owner = %loop_owner, interval_ms = interval.as_millis() as u64, "Store watcher started");

        loop {
            tokio::select! {
                _ = &mut shutdown_rx => break,
                _ = ticker.tick() => {
                    match store.observe_external(&loop_owner, &keys) {
                        Ok(0) => {}
                        Ok(n) => tracing::debug!(owner = %loop_owner, changes = n, "External changes observed"),
                        Err(e) => tracing::warn!(owner = %loop_owner, error = %e, "Store watcher poll failed"),
                    }
                }
            }
        }

        tracing::info!(owner = %loop_owner, "Store watcher stopped");
    });

    WatcherHandle {
        owner,
        shutdown_tx: Some(shutdown_tx),
        task: Some(task),
    }
}
