//! A stage running on its own Tokio task.
//!
//! The caller keeps a handle that can subscribe to progress, request
//! cancellation, and wait for the stage's result. Cancellation is cooperative:
//! the runner checks the token between units, so the unit in flight always
//! finishes and is persisted.

use std::future::Future;

use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use folio_types::FolioError;

use crate::events::{EventEmitter, ProgressEvent};

/// Handle to a spawned stage.
pub struct StageTask<T> {
    handle: JoinHandle<T>,
    cancel: CancellationToken,
    events: EventEmitter,
}

impl<T: Send + 'static> StageTask<T> {
    /// Spawn the future built by `start`. It receives the emitter and the
    /// token to wire into the stage driver.
    pub fn spawn<F, Fut>(start: F) -> Self
    where
        F: FnOnce(EventEmitter, CancellationToken) -> Fut,
        Fut: Future<Output = T> + Send + 'static,
    {
        Self::spawn_subscribed(start).0
    }

    /// Like [`spawn`](Self::spawn), also returning a receiver that exists
    /// before the stage starts, so it sees every event from the first one.
    pub fn spawn_subscribed<F, Fut>(start: F) -> (Self, broadcast::Receiver<ProgressEvent>)
    where
        F: FnOnce(EventEmitter, CancellationToken) -> Fut,
        Fut: Future<Output = T> + Send + 'static,
    {
        let events = EventEmitter::default();
        let receiver = events.subscribe();
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(start(events.clone(), cancel.clone()));
        let task = Self {
            handle,
            cancel,
            events,
        };
        (task, receiver)
    }

    /// Events emitted after this call.
    pub fn subscribe(&self) -> broadcast::Receiver<ProgressEvent> {
        self.events.subscribe()
    }

    /// Ask the stage to stop before its next unit.
    pub fn cancel(&self) {
        tracing::info!("Stage cancellation requested");
        self.cancel.cancel();
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Wait for the stage. A panic inside the task surfaces as an error.
    pub async fn join(self) -> Result<T, FolioError> {
        self.handle
            .await
            .map_err(|e| FolioError::Other(format!("stage task failed: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test]
    async fn join_returns_result() {
        let task = StageTask::spawn(|_, _| async { 42usize });
        assert_eq!(task.join().await.unwrap(), 42);
    }

    #[tokio::test]
    async fn cancellation_stops_loop_between_iterations() {
        let iterations = Arc::new(AtomicUsize::new(0));
        let counter = iterations.clone();
        let task = StageTask::spawn(move |_, cancel| async move {
            loop {
                if cancel.is_cancelled() {
                    break;
                }
                counter.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
            "stopped"
        });
        tokio::time::sleep(Duration::from_millis(20)).await;
        task.cancel();
        assert_eq!(task.join().await.unwrap(), "stopped");
        assert!(iterations.load(Ordering::SeqCst) >= 1);
    }

    #[tokio::test]
    async fn subscribers_see_emitted_events() {
        let (go_tx, go_rx) = tokio::sync::oneshot::channel::<()>();
        let task = StageTask::spawn(move |events, _| async move {
            let _ = go_rx.await;
            events.emit(ProgressEvent::ProgressSaved {
                completed: 1,
                total: 2,
            });
        });
        let mut rx = task.subscribe();
        go_tx.send(()).unwrap();
        let event = rx.recv().await.unwrap();
        assert_eq!(
            event,
            ProgressEvent::ProgressSaved {
                completed: 1,
                total: 2
            }
        );
        task.join().await.unwrap();
    }

    #[tokio::test]
    async fn early_receiver_sees_first_event() {
        let (task, mut rx) = StageTask::spawn_subscribed(|events, _| async move {
            events.emit(ProgressEvent::ProgressSaved {
                completed: 0,
                total: 3,
            });
        });
        task.join().await.unwrap();
        assert_eq!(
            rx.try_recv().unwrap(),
            ProgressEvent::ProgressSaved {
                completed: 0,
                total: 3
            }
        );
    }

    #[tokio::test]
    async fn panic_becomes_error() {
        let task = StageTask::spawn(|_, _| async {
            panic!("boom");
        });
        let result: Result<(), FolioError> = task.join().await;
        assert!(result.is_err());
    }
}
