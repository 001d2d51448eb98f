//! Notification Poller
//!
//! BLE notifications are edge triggered while PVs are only polled. Each
//! subscribed characteristic gets one task that samples its PV on a fixed
//! period and pushes a notification only when the encoded value changed.
//!
//! ```text
//! start_notify ──► begin_notify ──► push current value ──► spawn task
//!                                                            │
//!                    ┌───────────── every period ◄───────────┘
//!                    ▼
//!           session still live? ── no ──► Stopped (task ends)
//!                    │ yes
//!                    ▼
//!          sample == last sent? ── yes ──► Unchanged
//!                    │ no
//!                    ▼
//!             sink.notify ──► Emitted
//! ```
//!
//! Every subscription is a numbered session. `stop_notify` clears the flag
//! and sends an explicit stop signal to the task. `take_over_notify` ends a
//! session that is still registered and starts a new one, so a client that
//! resubscribes before its old session wound down is served by the new one.

use crate::domain::characteristic::MotorCharacteristic;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, info};
use uuid::Uuid;

/// Receives value-changed notifications for characteristics
pub trait NotificationSink: Send + Sync {
    /// Deliver a new value. Returns `false` once the subscriber is gone.
    fn notify_property_changed(&self, uuid: Uuid, value: Vec<u8>) -> bool;
}

/// Result of one poll tick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    Emitted,
    Unchanged,
    /// The session is no longer live; the task must end.
    Stopped,
    /// The sink refused the value; the session is closed.
    Detached,
}

/// Sample `characteristic` once and notify `session` if its value changed
pub async fn tick(
    characteristic: &MotorCharacteristic,
    session: u64,
    sink: &dyn NotificationSink,
) -> TickOutcome {
    if !characteristic.is_current(session) {
        return TickOutcome::Stopped;
    }

    let value = characteristic.sample().await;

    // The session may have ended while the PV was read.
    match characteristic.record_sent(session, &value) {
        None => return TickOutcome::Stopped,
        Some(false) => return TickOutcome::Unchanged,
        Some(true) => {}
    }

    if sink.notify_property_changed(characteristic.uuid(), value) {
        TickOutcome::Emitted
    } else {
        characteristic.end_session(session);
        TickOutcome::Detached
    }
}

struct PollTask {
    session: u64,
    stop_tx: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

/// Registry of running poll tasks, keyed by characteristic UUID
pub struct NotificationPoller {
    period: Duration,
    tasks: Mutex<HashMap<Uuid, PollTask>>,
}

impl NotificationPoller {
    pub fn new(period: Duration) -> Self {
        Self {
            period,
            tasks: Mutex::new(HashMap::new()),
        }
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    /// Enable notifications for `characteristic`, ending any session that
    /// is still registered for it. Returns the new session id.
    pub async fn take_over_notify(
        &self,
        characteristic: Arc<MotorCharacteristic>,
        sink: Arc<dyn NotificationSink>,
    ) -> Option<u64> {
        if characteristic.is_notifying() {
            info!("Replacing subscription for {}", characteristic.uuid());
            self.stop_notify(&characteristic);
        }
        self.start_notify(characteristic, sink).await
    }

    /// Enable notifications for `characteristic`.
    ///
    /// Pushes the current value right away, then polls every period.
    /// Returns the session id, or `None` without doing anything if it is
    /// already notifying.
    pub async fn start_notify(
        &self,
        characteristic: Arc<MotorCharacteristic>,
        sink: Arc<dyn NotificationSink>,
    ) -> Option<u64> {
        let uuid = characteristic.uuid();
        let Some(session) = characteristic.begin_notify() else {
            debug!("{} already notifying", uuid);
            return None;
        };
        info!("Notifications enabled for {} every {:?}", uuid, self.period);

        characteristic.prepare_notify().await;
        let value = characteristic.sample().await;
        // Superseded while sampling
        characteristic.record_sent(session, &value)?;
        if !sink.notify_property_changed(uuid, value) {
            characteristic.end_session(session);
            return None;
        }

        let (stop_tx, stop_rx) = watch::channel(false);
        let handle = tokio::spawn(poll_loop(
            characteristic,
            session,
            sink,
            self.period,
            stop_rx,
        ));

        let mut tasks = self.lock_tasks();
        tasks.retain(|_, task| !task.handle.is_finished());
        if tasks.get(&uuid).is_some_and(|task| task.session > session) {
            let _ = stop_tx.send(true);
            return None;
        }
        let task = PollTask {
            session,
            stop_tx,
            handle,
        };
        if let Some(previous) = tasks.insert(uuid, task) {
            let _ = previous.stop_tx.send(true);
        }
        Some(session)
    }

    /// Disable notifications for `characteristic`.
    ///
    /// Returns whether a poll task was registered for it.
    pub fn stop_notify(&self, characteristic: &MotorCharacteristic) -> bool {
        characteristic.end_notify();
        match self.lock_tasks().remove(&characteristic.uuid()) {
            Some(task) => {
                info!("Notifications disabled for {}", characteristic.uuid());
                let _ = task.stop_tx.send(true);
                true
            }
            None => false,
        }
    }

    /// Disable notifications only if `session` is still the live one
    pub fn end_session(&self, characteristic: &MotorCharacteristic, session: u64) -> bool {
        characteristic.end_session(session);

        let uuid = characteristic.uuid();
        let mut tasks = self.lock_tasks();
        if !tasks.get(&uuid).is_some_and(|task| task.session == session) {
            return false;
        }
        match tasks.remove(&uuid) {
            Some(task) => {
                info!("Notifications disabled for {}", uuid);
                let _ = task.stop_tx.send(true);
                true
            }
            None => false,
        }
    }

    /// Signal every task to stop; used at shutdown
    pub fn stop_all(&self) {
        let mut tasks = self.lock_tasks();
        for (uuid, task) in tasks.drain() {
            debug!("Stopping poll task for {}", uuid);
            let _ = task.stop_tx.send(true);
        }
    }

    /// Number of poll tasks still running
    pub fn active_tasks(&self) -> usize {
        let mut tasks = self.lock_tasks();
        tasks.retain(|_, task| !task.handle.is_finished());
        tasks.len()
    }

    fn lock_tasks(&self) -> MutexGuard<'_, HashMap<Uuid, PollTask>> {
        self.tasks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

async fn poll_loop(
    characteristic: Arc<MotorCharacteristic>,
    session: u64,
    sink: Arc<dyn NotificationSink>,
    period: Duration,
    mut stop_rx: watch::Receiver<bool>,
) {
    let mut ticker = time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            changed = stop_rx.changed() => {
                if changed.is_err() || *stop_rx.borrow() {
                    break;
                }
            }
        }

        match tick(&characteristic, session, sink.as_ref()).await {
            TickOutcome::Stopped | TickOutcome::Detached => break,
            TickOutcome::Emitted | TickOutcome::Unchanged => {}
        }
    }

    debug!("Poll task for {} (session {}) ended", characteristic.uuid(), session);
}
