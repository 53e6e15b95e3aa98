//! Persistence collaborator for strokes.

mod memory;
mod outbox;

#[cfg(not(target_arch = "wasm32"))]
mod file;

pub use memory::MemoryRepository;
pub use outbox::{FlushOutcome, FlushOutcomeSummary, OutboxBatch, PersistOp, PersistOutbox, RetryPolicy};

#[cfg(not(target_arch = "wasm32"))]
pub use file::FileRepository;

use crate::stroke::{AttemptId, DocumentId, SessionId, Stroke, StrokeId};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::pin::Pin;
use thiserror::Error;

/// Repository errors.
#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("Repository unavailable: {0}")]
    Unavailable(String),
    #[error("Serialization error: {0}")]
    Serialization(String),
    #[error("IO error: {0}")]
    Io(String),
    #[error("Repository error: {0}")]
    Other(String),
}

/// Result type for repository operations.
pub type RepositoryResult<T> = Result<T, RepositoryError>;

/// Boxed future for async operations (compatible with WASM).
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + 'a>>;

/// Shift every stroke of an attempt.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TranslateAttempt {
    pub attempt_id: AttemptId,
    pub dx: f64,
    pub dy: f64,
}

/// Shift a set of strokes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranslateStrokes {
    pub stroke_ids: Vec<StrokeId>,
    pub dx: f64,
    pub dy: f64,
}

/// Durable stroke storage.
///
/// Writes are idempotent per stroke id. Translations must move every affected
/// stroke's points and bounds and bump its `updated_at_ms`. The engine is
/// single-threaded, so implementations need not be `Send`.
pub trait InkRepository {
    /// All strokes of a `(session, document)` context, used for hydration.
    fn list_by_session_and_document(
        &self,
        session_id: SessionId,
        document_id: DocumentId,
    ) -> BoxFuture<'_, RepositoryResult<Vec<Stroke>>>;

    /// All strokes of one attempt, used by the composite exporter.
    fn list_by_attempt(&self, attempt_id: AttemptId) -> BoxFuture<'_, RepositoryResult<Vec<Stroke>>>;

    /// Insert or replace a stroke.
    fn upsert(&self, stroke: &Stroke) -> BoxFuture<'_, RepositoryResult<()>>;

    /// Insert or replace many strokes in one batch.
    fn bulk_upsert(&self, strokes: &[Stroke]) -> BoxFuture<'_, RepositoryResult<()>>;

    /// Delete strokes; unknown ids are ignored.
    fn delete_by_ids(&self, ids: &[StrokeId]) -> BoxFuture<'_, RepositoryResult<()>>;

    fn translate_attempt(&self, request: TranslateAttempt) -> BoxFuture<'_, RepositoryResult<()>>;

    fn translate_strokes(&self, request: TranslateStrokes) -> BoxFuture<'_, RepositoryResult<()>>;
}

#[cfg(test)]
pub(crate) mod test_util {
    /// Simple blocking executor for tests.
    pub(crate) fn block_on<F: std::future::Future>(f: F) -> F::Output {
        use std::task::{Context, Poll, RawWaker, RawWakerVTable, Waker};

        fn dummy_raw_waker() -> RawWaker {
            fn no_op(_: *const ()) {}
            fn clone(_: *const ()) -> RawWaker {
                dummy_raw_waker()
            }
            static VTABLE: RawWakerVTable = RawWakerVTable::new(clone, no_op, no_op, no_op);
            RawWaker::new(std::ptr::null(), &VTABLE)
        }

        let waker = unsafe { Waker::from_raw(dummy_raw_waker()) };
        let mut cx = Context::from_waker(&waker);
        let mut f = std::pin::pin!(f);

        loop {
            match f.as_mut().poll(&mut cx) {
                Poll::Ready(result) => return result,
                Poll::Pending => {}
            }
        }
    }
}
