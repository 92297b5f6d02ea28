use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::oneshot;
use tokio::task::AbortHandle;
use tracing::debug;

use crate::models::{ImageUpload, UserJob};
use crate::services::analysis::{AnalysisClient, AnalysisError};

pub type AnalysisResult = Result<UserJob, AnalysisError>;

type Delivery = Box<dyn FnOnce(AnalysisResult) + Send + 'static>;

/// Shared between a running request and everyone able to cancel it.
///
/// The delivery slot is taken exactly once, either by the finished request
/// or by `cancel`, so a result is never delivered after cancellation.
struct DeliveryState {
    slot: Mutex<Option<Delivery>>,
    cancelled: AtomicBool,
}

impl DeliveryState {
    fn take(&self) -> Option<Delivery> {
        self.slot
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }
}

/// Cancels one in-flight analysis. Cheap to clone.
#[derive(Clone)]
pub struct CancelHandle {
    state: Arc<DeliveryState>,
    abort: AbortHandle,
}

impl CancelHandle {
    /// Drop the pending delivery and abort the request, closing its connection.
    pub fn cancel(&self) {
        self.state.cancelled.store(true, Ordering::SeqCst);
        if self.state.take().is_some() {
            debug!("Analysis cancelled before completion");
        }
        self.abort.abort();
    }

    pub fn is_cancelled(&self) -> bool {
        self.state.cancelled.load(Ordering::SeqCst)
    }
}

impl std::fmt::Debug for CancelHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CancelHandle")
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

/// Run one analysis on the tokio runtime and hand its result to `on_complete`.
///
/// `on_complete` runs exactly once, unless the returned handle is cancelled
/// first, in which case it is dropped without being called.
pub fn spawn_with_callback<F>(
    client: Arc<AnalysisClient>,
    image: ImageUpload,
    notes: Option<String>,
    user_id: String,
    on_complete: F,
) -> CancelHandle
where
    F: FnOnce(AnalysisResult) + Send + 'static,
{
    let state = Arc::new(DeliveryState {
        slot: Mutex::new(Some(Box::new(on_complete))),
        cancelled: AtomicBool::new(false),
    });

    let task_state = Arc::clone(&state);
    let handle = tokio::spawn(async move {
        let result = client.analyze(&image, notes.as_deref(), &user_id).await;
        match task_state.take() {
            Some(deliver) => deliver(result),
            None => debug!("Discarding result of cancelled analysis"),
        }
    });

    CancelHandle {
        state,
        abort: handle.abort_handle(),
    }
}

/// How a spawned analysis ended, from the caller's point of view.
#[derive(Debug)]
pub enum TaskOutcome {
    Completed(AnalysisResult),
    Cancelled,
}

/// A spawned analysis whose result is awaited with [`AnalysisTask::join`].
///
/// Dropping the task cancels it.
#[derive(Debug)]
pub struct AnalysisTask {
    rx: Option<oneshot::Receiver<AnalysisResult>>,
    handle: CancelHandle,
}

impl AnalysisTask {
    pub fn spawn(
        client: Arc<AnalysisClient>,
        image: ImageUpload,
        notes: Option<String>,
        user_id: String,
    ) -> Self {
        let (tx, rx) = oneshot::channel();
        let handle = spawn_with_callback(client, image, notes, user_id, move |result| {
            // The receiver is gone only if the task was dropped.
            let _ = tx.send(result);
        });

        Self {
            rx: Some(rx),
            handle,
        }
    }

    pub fn cancel(&self) {
        self.handle.cancel();
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        self.handle.clone()
    }

    /// Wait for the result. A task cancelled at any point before this returns
    /// yields `Cancelled`, never a result.
    pub async fn join(mut self) -> TaskOutcome {
        let Some(rx) = self.rx.take() else {
            return TaskOutcome::Cancelled;
        };

        match rx.await {
            Ok(_) if self.handle.is_cancelled() => TaskOutcome::Cancelled,
            Ok(result) => TaskOutcome::Completed(result),
            Err(_) => TaskOutcome::Cancelled,
        }
    }
}

impl Drop for AnalysisTask {
    fn drop(&mut self) {
        // No-op once the result has been delivered.
        self.handle.cancel();
    }
}
