//! File-backed repository for native platforms.

use super::{BoxFuture, InkRepository, RepositoryError, RepositoryResult, TranslateAttempt, TranslateStrokes};
use crate::stroke::{AttemptId, DocumentId, SessionId, Stroke, StrokeId};
use crate::time::now_ms;
use std::fs;
use std::path::{Path, PathBuf};

/// Stores every stroke as one JSON array in a single file.
///
/// Each write reads, modifies and rewrites the whole file, so this is meant
/// for small local ink sets and offline tooling. Rows that fail validation on
/// load (fewer than two points, non-finite coordinates) are skipped with a
/// warning.
pub struct FileRepository {
    path: PathBuf,
}

impl FileRepository {
    /// Open (or lazily create) the ink file at `path`.
    ///
    /// Creates the parent directory if it doesn't exist.
    pub fn open(path: impl Into<PathBuf>) -> RepositoryResult<Self> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent).map_err(|e| {
                    RepositoryError::Io(format!("Failed to create ink directory: {}", e))
                })?;
            }
        }
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load_all(&self) -> RepositoryResult<Vec<Stroke>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let json = fs::read_to_string(&self.path).map_err(|e| {
            RepositoryError::Io(format!("Failed to read {}: {}", self.path.display(), e))
        })?;
        let rows: Vec<serde_json::Value> = serde_json::from_str(&json).map_err(|e| {
            RepositoryError::Serialization(format!("Failed to parse {}: {}", self.path.display(), e))
        })?;

        let mut strokes = Vec::with_capacity(rows.len());
        for (index, row) in rows.into_iter().enumerate() {
            match serde_json::from_value::<Stroke>(row) {
                Ok(stroke) => strokes.push(stroke),
                Err(e) => log::warn!("Skipping invalid stroke row {} in {}: {}", index, self.path.display(), e),
            }
        }
        Ok(strokes)
    }

    fn save_all(&self, strokes: &[Stroke]) -> RepositoryResult<()> {
        let json = serde_json::to_string_pretty(strokes)
            .map_err(|e| RepositoryError::Serialization(e.to_string()))?;
        fs::write(&self.path, json).map_err(|e| {
            RepositoryError::Io(format!("Failed to write {}: {}", self.path.display(), e))
        })
    }

    fn list_where(&self, pred: impl Fn(&Stroke) -> bool) -> RepositoryResult<Vec<Stroke>> {
        let mut rows: Vec<Stroke> = self.load_all()?.into_iter().filter(|s| pred(s)).collect();
        rows.sort_by(|a, b| a.created_at_ms.cmp(&b.created_at_ms).then(a.id.cmp(&b.id)));
        Ok(rows)
    }

    fn modify(&self, f: impl FnOnce(&mut Vec<Stroke>)) -> RepositoryResult<()> {
        let mut strokes = self.load_all()?;
        f(&mut strokes);
        self.save_all(&strokes)
    }
}

fn upsert_into(strokes: &mut Vec<Stroke>, stroke: Stroke) {
    match strokes.iter_mut().find(|s| s.id == stroke.id) {
        Some(existing) => *existing = stroke,
        None => strokes.push(stroke),
    }
}

impl InkRepository for FileRepository {
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
        Box::pin(async move { self.modify(|all| upsert_into(all, stroke)) })
    }

    fn bulk_upsert(&self, strokes: &[Stroke]) -> BoxFuture<'_, RepositoryResult<()>> {
        let strokes = strokes.to_vec();
        Box::pin(async move {
            self.modify(|all| {
                for stroke in strokes {
                    upsert_into(all, stroke);
                }
            })
        })
    }

    fn delete_by_ids(&self, ids: &[StrokeId]) -> BoxFuture<'_, RepositoryResult<()>> {
        let ids = ids.to_vec();
        Box::pin(async move { self.modify(|all| all.retain(|s| !ids.contains(&s.id))) })
    }

    fn translate_attempt(&self, request: TranslateAttempt) -> BoxFuture<'_, RepositoryResult<()>> {
        Box::pin(async move {
            let now = now_ms();
            self.modify(|all| {
                for stroke in all.iter_mut().filter(|s| s.attempt_id == request.attempt_id) {
                    stroke.translate(request.dx, request.dy, now);
                }
            })
        })
    }

    fn translate_strokes(&self, request: TranslateStrokes) -> BoxFuture<'_, RepositoryResult<()>> {
        Box::pin(async move {
            let now = now_ms();
            self.modify(|all| {
                for stroke in all.iter_mut().filter(|s| request.stroke_ids.contains(&s.id)) {
                    stroke.translate(request.dx, request.dy, now);
                }
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::test_util::block_on;
    use crate::stroke::tests::stroke;
    use tempfile::tempdir;
    use uuid::Uuid;

    #[test]
    fn test_missing_file_lists_empty() {
        let dir = tempdir().unwrap();
        let repo = FileRepository::open(dir.path().join("ink.json")).unwrap();
        let rows = block_on(repo.list_by_attempt(Uuid::new_v4())).unwrap();
        assert!(rows.is_empty());
    }

    #[test]
    fn test_creates_parent_directory() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("ink.json");
        let repo = FileRepository::open(&path).unwrap();
        block_on(repo.upsert(&stroke(Uuid::new_v4(), &[(0.0, 0.0), (1.0, 1.0)]))).unwrap();
        assert!(path.exists());
    }

    #[test]
    fn test_write_then_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("ink.json");
        let attempt = Uuid::new_v4();
        let a = stroke(attempt, &[(0.0, 0.0), (5.0, 5.0)]);
        let b = stroke(attempt, &[(10.0, 0.0), (15.0, 5.0)]);

        {
            let repo = FileRepository::open(&path).unwrap();
            block_on(repo.bulk_upsert(&[a.clone(), b.clone()])).unwrap();
            block_on(repo.delete_by_ids(&[a.id])).unwrap();
            block_on(repo.translate_attempt(TranslateAttempt { attempt_id: attempt, dx: 1.0, dy: 2.0 }))
                .unwrap();
        }

        let repo = FileRepository::open(&path).unwrap();
        let rows = block_on(repo.list_by_session_and_document(Uuid::nil(), Uuid::nil())).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].id, b.id);
        assert_eq!(rows[0].bounds(), kurbo::Rect::new(11.0, 2.0, 16.0, 7.0));
    }

    #[test]
    fn test_skips_invalid_rows() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("ink.json");
        let good = stroke(Uuid::new_v4(), &[(0.0, 0.0), (5.0, 5.0)]);
        let mut bad = serde_json::to_value(&good).unwrap();
        bad["id"] = serde_json::json!(Uuid::new_v4());
        bad["points"] = serde_json::json!([]);
        let rows = serde_json::json!([serde_json::to_value(&good).unwrap(), bad]);
        std::fs::write(&path, rows.to_string()).unwrap();

        let repo = FileRepository::open(&path).unwrap();
        let listed = block_on(repo.list_by_attempt(good.attempt_id)).unwrap();
        assert_eq!(listed, vec![good]);
    }

    #[test]
    fn test_corrupt_file_is_an_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("ink.json");
        std::fs::write(&path, "not json").unwrap();
        let repo = FileRepository::open(&path).unwrap();
        let result = block_on(repo.list_by_attempt(Uuid::new_v4()));
        assert!(matches!(result, Err(RepositoryError::Serialization(_))));
    }
}
