//! In-memory repository implementation.

use super::{BoxFuture, InkRepository, RepositoryError, RepositoryResult, TranslateAttempt, TranslateStrokes};
use crate::stroke::{AttemptId, DocumentId, SessionId, Stroke, StrokeId};
use crate::time::now_ms;
use std::collections::HashMap;
use std::sync::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};

/// In-memory repository for testing and ephemeral use.
///
/// Can be taken offline with [`MemoryRepository::set_available`] to exercise
/// failure paths.
#[derive(Debug, Default)]
pub struct MemoryRepository {
    strokes: RwLock<HashMap<StrokeId, Stroke>>,
    offline: AtomicBool,
}

impl MemoryRepository {
    /// Create a new empty repository.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a repository pre-filled with `strokes`.
    pub fn with_strokes(strokes: impl IntoIterator<Item = Stroke>) -> Self {
        let repo = Self::new();
        if let Ok(mut map) = repo.strokes.write() {
            map.extend(strokes.into_iter().map(|s| (s.id, s)));
        }
        repo
    }

    /// When unavailable, every call fails with [`RepositoryError::Unavailable`].
    pub fn set_available(&self, available: bool) {
        self.offline.store(!available, Ordering::Relaxed);
    }

    /// Number of stored strokes.
    pub fn len(&self) -> usize {
        self.strokes.read().map(|m| m.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot of one stored stroke.
    pub fn get(&self, id: StrokeId) -> Option<Stroke> {
        self.strokes.read().ok().and_then(|m| m.get(&id).cloned())
    }

    fn check_online(&self) -> RepositoryResult<()> {
        if self.offline.load(Ordering::Relaxed) {
            return Err(RepositoryError::Unavailable("memory repository is offline".to_string()));
        }
        Ok(())
    }

    fn list_where(&self, pred: impl Fn(&Stroke) -> bool) -> RepositoryResult<Vec<Stroke>> {
        self.check_online()?;
        let map = self
            .strokes
            .read()
            .map_err(|e| RepositoryError::Other(format!("Lock error: {}", e)))?;
        let mut rows: Vec<Stroke> = map.values().filter(|s| pred(s)).cloned().collect();
        rows.sort_by(|a, b| a.created_at_ms.cmp(&b.created_at_ms).then(a.id.cmp(&b.id)));
        Ok(rows)
    }

    fn write(&self, f: impl FnOnce(&mut HashMap<StrokeId, Stroke>)) -> RepositoryResult<()> {
        self.check_online()?;
        let mut map = self
            .strokes
            .write()
            .map_err(|e| RepositoryError::Other(format!("Lock error: {}", e)))?;
        f(&mut map);
        Ok(())
    }
}

impl InkRepository for MemoryRepository {
    fn list_by_session_and_document(
        &self,
        session_id: SessionId,
        document_id: DocumentId,
    ) -> BoxFuture<'_, RepositoryResult<Vec<Stroke>>> {
        Box::pin(async move {
            self.list_where(|s| s.session_id == session_id && s.document_id == document_id)
        })
    }

    fn list_by_attempt(&self, attempt_id: AttemptId) -> BoxFuture<'_, RepositoryResult<Vec<Stroke>>> {
        Box::pin(async move { self.list_where(|s| s.attempt_id == attempt_id) })
    }

    fn upsert(&self, stroke: &Stroke) -> BoxFuture<'_, RepositoryResult<()>> {
        let stroke = stroke.clone();
        Box::pin(async move {
            self.write(|map| {
                map.insert(stroke.id, stroke);
            })
        })
    }

    fn bulk_upsert(&self, strokes: &[Stroke]) -> BoxFuture<'_, RepositoryResult<()>> {
        let strokes = strokes.to_vec();
        Box::pin(async move {
            self.write(|map| {
                map.extend(strokes.into_iter().map(|s| (s.id, s)));
            })
        })
    }

    fn delete_by_ids(&self, ids: &[StrokeId]) -> BoxFuture<'_, RepositoryResult<()>> {
        let ids = ids.to_vec();
        Box::pin(async move {
            self.write(|map| {
                for id in &ids {
                    map.remove(id);
                }
            })
        })
    }

    fn translate_attempt(&self, request: TranslateAttempt) -> BoxFuture<'_, RepositoryResult<()>> {
        Box::pin(async move {
            let now = now_ms();
            self.write(|map| {
                for stroke in map.values_mut().filter(|s| s.attempt_id == request.attempt_id) {
                    stroke.translate(request.dx, request.dy, now);
                }
            })
        })
    }

    fn translate_strokes(&self, request: TranslateStrokes) -> BoxFuture<'_, RepositoryResult<()>> {
        Box::pin(async move {
            let now = now_ms();
            self.write(|map| {
                for id in &request.stroke_ids {
                    if let Some(stroke) = map.get_mut(id) {
                        stroke.translate(request.dx, request.dy, now);
                    }
                }
            })
        })
    }
}
