//! Heartbeat scheduler

use crate::pump::{ControlMessage, ControlSender};
use crate::transport::ConnectionId;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

/// How long `stop` waits for the timer task
const STOP_GRACE: Duration = Duration::from_secs(1);

/// What the timer is currently beating for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeartbeatTarget {
    pub connection: ConnectionId,
    pub interval: Duration,
}

/// Long-lived heartbeat timer
///
/// Idle until the first `update`; every later `update` restarts the cadence
/// with the new interval and connection.
#[derive(Debug)]
pub struct HeartbeatScheduler {
    target: Option<watch::Sender<Option<HeartbeatTarget>>>,
    task: Option<JoinHandle<()>>,
}

impl HeartbeatScheduler {
    /// Start the timer task, initially idle
    pub fn spawn(control: ControlSender) -> Self {
        let (target_tx, target_rx) = watch::channel(None);
        let task = tokio::spawn(run(target_rx, control));

        Self {
            target: Some(target_tx),
            task: Some(task),
        }
    }

    /// Beat every `interval` for `connection`, starting one interval from now
    pub fn update(&self, connection: ConnectionId, interval: Duration) {
        tracing::debug!(
            connection = %connection,
            interval_secs = interval.as_secs(),
            "Heartbeat interval updated"
        );
        self.set(Some(HeartbeatTarget {
            connection,
            interval,
        }));
    }

    /// Stop beating until the next `update`
    pub fn suspend(&self) {
        self.set(None);
    }

    #[must_use]
    pub fn target(&self) -> Option<HeartbeatTarget> {
        self.target.as_ref().and_then(|tx| *tx.borrow())
    }

    /// The interval currently in effect
    #[must_use]
    pub fn interval(&self) -> Option<Duration> {
        self.target().map(|t| t.interval)
    }

    /// Stop the timer task and wait for it to exit
    pub async fn stop(&mut self) {
        // Dropping the sender ends the task's wait on the channel
        self.target = None;

        if let Some(mut task) = self.task.take() {
            if tokio::time::timeout(STOP_GRACE, &mut task).await.is_err() {
                task.abort();
            }
            tracing::debug!("Heartbeat scheduler stopped");
        }
    }

    fn set(&self, target: Option<HeartbeatTarget>) {
        if let Some(tx) = &self.target {
            tx.send_replace(target);
        }
    }
}

impl Drop for HeartbeatScheduler {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

async fn run(mut target_rx: watch::Receiver<Option<HeartbeatTarget>>, control: ControlSender) {
    loop {
        let current = *target_rx.borrow_and_update();

        let Some(target) = current else {
            if target_rx.changed().await.is_err() {
                return;
            }
            continue;
        };

        let mut ticker = interval_at(Instant::now() + target.interval, target.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    tracing::trace!(connection = %target.connection, "Heartbeat due");
                    let due = ControlMessage::HeartbeatDue { connection: target.connection };
                    if control.send(due).is_err() {
                        return;
                    }
                }
                changed = target_rx.changed() => {
                    if changed.is_err() {
                        return;
                    }
                    break;
                }
            }
        }
    }
}
