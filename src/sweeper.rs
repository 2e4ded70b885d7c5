//! Periodic expiration sweeper.
//!
//! One task per running checker. Ticks on a fixed period with no jitter;
//! missed ticks are skipped, so a late sweep simply flushes everything that
//! became overdue in the meantime.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::dispatch::WorkerPool;
use crate::events::EmailNotification;
use crate::memory::CatalogStore;
use crate::reservation;

/// Run one sweep at `now` and notify every user whose reservation expired.
///
/// The write lock is released before any notification is enqueued.
/// Returns the number of reservations that expired.
pub fn sweep(
    store: &CatalogStore,
    notifications: &WorkerPool<EmailNotification>,
    now: DateTime<Utc>,
) -> usize {
    let expired = {
        let mut catalog = store.write();
        reservation::expire_due(&mut catalog, now)
    };

    if expired.is_empty() {
        debug!("Sweep found no overdue reservations");
        return 0;
    }

    for reservation in &expired {
        if let Err(err) = notifications.dispatch(EmailNotification::expired(reservation)) {
            debug!(
                reservation_id = reservation.id,
                error = %err,
                "Expiration notification not delivered"
            );
        }
    }

    info!(expired = expired.len(), "Processed expired reservations");
    expired.len()
}

/// Handle to a running sweeper task.
#[derive(Debug)]
pub struct ExpirationSweeper {
    stop: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl ExpirationSweeper {
    /// Spawn the sweeper. The first sweep runs one full `period` after start.
    ///
    /// `period` must be non-zero.
    pub fn start(
        store: CatalogStore,
        notifications: Arc<WorkerPool<EmailNotification>>,
        period: Duration,
        runtime: &Handle,
    ) -> Self {
        let (stop, mut stop_rx) = watch::channel(false);

        let task = runtime.spawn(async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            debug!(period_ms = period.as_millis() as u64, "Expiration sweeper started");

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        sweep(&store, &notifications, Utc::now());
                    }
                    // A stop signal or a dropped handle both end the loop.
                    _ = stop_rx.changed() => break,
                }
            }

            debug!("Expiration sweeper stopped");
        });

        Self { stop, task }
    }

    /// Signal the task to stop and wait for it to exit.
    pub async fn stop(self) {
        let _ = self.stop.send(true);
        if let Err(err) = self.task.await {
            warn!(error = %err, "Expiration sweeper ended abnormally");
        }
    }
}
