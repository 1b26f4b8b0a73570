//! Dispatch worker pool
//!
//! Events are queued in arrival order. A feeder task starts one handler task
//! per event, in order, with at most `max_concurrency` running at once.
//! Handler errors and panics stay inside the handler task.

use super::{DispatchEvent, EventHandler};
use futures::FutureExt;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Semaphore};
use tokio::task::{JoinHandle, JoinSet};

/// Bounded, ordered, fire-and-forget event dispatcher
#[derive(Debug)]
pub struct Dispatcher {
    jobs: Option<mpsc::UnboundedSender<DispatchEvent>>,
    feeder: Option<JoinHandle<()>>,
}

impl Dispatcher {
    /// Start the feeder task
    pub fn spawn(handler: Arc<dyn EventHandler>, max_concurrency: usize) -> Self {
        let (jobs, rx) = mpsc::unbounded_channel();
        let permits = Arc::new(Semaphore::new(max_concurrency.max(1)));
        let feeder = tokio::spawn(feed(rx, handler, permits));

        Self {
            jobs: Some(jobs),
            feeder: Some(feeder),
        }
    }

    /// Queue an event; never blocks
    ///
    /// Returns `false` once the dispatcher is shut down.
    pub fn submit(&self, event: DispatchEvent) -> bool {
        match &self.jobs {
            Some(jobs) => jobs.send(event).is_ok(),
            None => false,
        }
    }

    /// Stop accepting events and wait up to `grace` for queued and in-flight
    /// handlers to finish; whatever is left is aborted
    pub async fn shutdown(&mut self, grace: Duration) {
        self.jobs = None;

        if let Some(mut feeder) = self.feeder.take() {
            if tokio::time::timeout(grace, &mut feeder).await.is_err() {
                tracing::warn!(
                    grace_secs = grace.as_secs(),
                    "Handlers still running at shutdown, aborting"
                );
                feeder.abort();
            }
        }
    }
}

impl Drop for Dispatcher {
    fn drop(&mut self) {
        if let Some(feeder) = self.feeder.take() {
            feeder.abort();
        }
    }
}

async fn feed(
    mut rx: mpsc::UnboundedReceiver<DispatchEvent>,
    handler: Arc<dyn EventHandler>,
    permits: Arc<Semaphore>,
) {
    let mut in_flight = JoinSet::new();

    while let Some(event) = rx.recv().await {
        let Ok(permit) = Arc::clone(&permits).acquire_owned().await else {
            break;
        };
        let handler = Arc::clone(&handler);
        in_flight.spawn(async move {
            let _permit = permit;
            run_handler(handler.as_ref(), event).await;
        });

        // Reap finished handlers so the set does not grow without bound
        while in_flight.try_join_next().is_some() {}
    }

    while in_flight.join_next().await.is_some() {}
}

async fn run_handler(handler: &dyn EventHandler, event: DispatchEvent) {
    let outcome = AssertUnwindSafe(handler.handle(&event)).catch_unwind().await;

    match outcome {
        Ok(Ok(())) => {
            tracing::trace!(event_type = %event.event_type, seq = ?event.sequence, "Event handled");
        }
        Ok(Err(e)) => {
            tracing::warn!(
                event_type = %event.event_type,
                seq = ?event.sequence,
                error = %e,
                "Event handler failed"
            );
        }
        Err(panic) => {
            tracing::error!(
                event_type = %event.event_type,
                seq = ?event.sequence,
                panic = %panic_message(panic.as_ref()),
                "Event handler panicked"
            );
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    if let Some(msg) = panic.downcast_ref::<&'static str>() {
        msg
    } else if let Some(msg) = panic.downcast_ref::<String>() {
        msg
    } else {
        "non-string panic payload"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::HandlerError;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use serde_json::json;

    #[derive(Default)]
    struct Recorder {
        seen: Mutex<Vec<u64>>,
    }

    #[async_trait]
    impl EventHandler for Recorder {
        async fn handle(&self, event: &DispatchEvent) -> Result<(), HandlerError> {
            if event.event_type == "BOOM" {
                panic!("handler exploded");
            }
            if event.event_type == "FAIL" {
                return Err(HandlerError::MissingField("channel_id"));
            }
            self.seen.lock().push(event.sequence.unwrap_or_default());
            Ok(())
        }
    }

    fn event(event_type: &str, seq: u64) -> DispatchEvent {
        DispatchEvent::new(event_type, json!({}), Some(seq))
    }

    #[tokio::test]
    async fn test_events_start_in_order() {
        let recorder = Arc::new(Recorder::default());
        let mut dispatcher = Dispatcher::spawn(recorder.clone(), 1);

        for seq in 1..=20 {
            assert!(dispatcher.submit(event("MESSAGE_CREATE", seq)));
        }
        dispatcher.shutdown(Duration::from_secs(5)).await;

        assert_eq!(*recorder.seen.lock(), (1..=20).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn test_panic_and_error_are_contained() {
        let recorder = Arc::new(Recorder::default());
        let mut dispatcher = Dispatcher::spawn(recorder.clone(), 4);

        dispatcher.submit(event("MESSAGE_CREATE", 1));
        dispatcher.submit(event("BOOM", 2));
        dispatcher.submit(event("FAIL", 3));
        dispatcher.submit(event("MESSAGE_CREATE", 4));
        dispatcher.shutdown(Duration::from_secs(5)).await;

        let mut seen = recorder.seen.lock().clone();
        seen.sort_unstable();
        assert_eq!(seen, vec![1, 4]);
    }

    #[tokio::test]
    async fn test_submit_after_shutdown() {
        let mut dispatcher = Dispatcher::spawn(Arc::new(Recorder::default()), 2);
        dispatcher.shutdown(Duration::from_secs(1)).await;
        assert!(!dispatcher.submit(event("MESSAGE_CREATE", 1)));
    }

    struct Slow;

    #[async_trait]
    impl EventHandler for Slow {
        async fn handle(&self, _event: &DispatchEvent) -> Result<(), HandlerError> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_is_bounded() {
        let mut dispatcher = Dispatcher::spawn(Arc::new(Slow), 2);
        dispatcher.submit(event("MESSAGE_CREATE", 1));

        let start = tokio::time::Instant::now();
        dispatcher.shutdown(Duration::from_secs(2)).await;
        assert!(start.elapsed() < Duration::from_secs(3600));
    }

    #[test]
    fn test_panic_message() {
        let boxed: Box<dyn Any + Send> = Box::new("static");
        assert_eq!(panic_message(boxed.as_ref()), "static");

        let owned: Box<dyn Any + Send> = Box::new(String::from("owned"));
        assert_eq!(panic_message(owned.as_ref()), "owned");

        let other: Box<dyn Any + Send> = Box::new(5_u8);
        assert_eq!(panic_message(other.as_ref()), "non-string panic payload");
    }
}
