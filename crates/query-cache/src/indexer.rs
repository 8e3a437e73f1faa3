//! Incremental change recorder
//!
//! Throttles vault file events: repeats for one path coalesce within a
//! window, and a batched invalidation callback fires once per window. The
//! recorder also remembers the last observed `(mtime, size)` per path so
//! hosts can skip reparsing unchanged files.

use rustc_hash::FxHashMap;
use tracing::debug;

/// Kind of file-system change
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    /// File appeared
    Created,
    /// File content changed
    Modified,
    /// File disappeared
    Deleted,
}

/// One recorded change
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathChange {
    /// Vault-relative path
    pub path: String,
    /// Latest kind observed within the batch
    pub kind: ChangeKind,
    /// Timestamp of the latest event (milliseconds)
    pub timestamp_ms: u64,
}

type BatchCallback = Box<dyn FnMut(&[PathChange]) + Send>;

/// Throttled file-change recorder
pub struct ChangeRecorder {
    window_ms: u64,
    pending: Vec<PathChange>,
    batch_started_ms: Option<u64>,
    known: FxHashMap<String, (u64, u64)>,
    callback: Option<BatchCallback>,
}

impl ChangeRecorder {
    /// Create a recorder with the given coalescing window
    pub fn new(window_ms: u64) -> Self {
        Self {
            window_ms,
            pending: Vec::new(),
            batch_started_ms: None,
            known: FxHashMap::default(),
            callback: None,
        }
    }

    /// Register the batched invalidation callback
    pub fn on_batch<F>(&mut self, callback: F)
    where
        F: FnMut(&[PathChange]) + Send + 'static,
    {
        self.callback = Some(Box::new(callback));
    }

    /// Record one event; may fire a batch when the window elapses
    ///
    /// Repeats for the same path within the window coalesce into one
    /// change carrying the latest kind and timestamp.
    pub fn record(&mut self, path: &str, kind: ChangeKind, timestamp_ms: u64) {
        match self.pending.iter_mut().find(|change| change.path == path) {
            Some(change) => {
                change.kind = kind;
                change.timestamp_ms = timestamp_ms;
            }
            None => self.pending.push(PathChange {
                path: path.to_string(),
                kind,
                timestamp_ms,
            }),
        }

        let started = *self.batch_started_ms.get_or_insert(timestamp_ms);
        if timestamp_ms.saturating_sub(started) >= self.window_ms {
            self.flush();
        }
    }

    /// Emit the pending batch now (also invoked when the window elapses)
    pub fn flush(&mut self) -> Vec<PathChange> {
        self.batch_started_ms = None;
        if self.pending.is_empty() {
            return Vec::new();
        }
        let batch = std::mem::take(&mut self.pending);
        debug!(target: "vaultkg::indexer", changes = batch.len(), "invalidation batch");
        if let Some(callback) = &mut self.callback {
            callback(&batch);
        }
        batch
    }

    /// Number of changes waiting for the next batch
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Remember the observed `(mtime, size)` of a path
    pub fn note_seen(&mut self, path: &str, mtime: u64, size: u64) {
        self.known.insert(path.to_string(), (mtime, size));
    }

    /// Whether a path differs from its last observation
    ///
    /// Unknown paths count as changed.
    pub fn has_changed(&self, path: &str, mtime: u64, size: u64) -> bool {
        match self.known.get(path) {
            Some(&(known_mtime, known_size)) => known_mtime != mtime || known_size != size,
            None => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn repeats_within_window_coalesce() {
        let mut recorder = ChangeRecorder::new(1_000);
        recorder.record("notes/a.md", ChangeKind::Created, 0);
        recorder.record("notes/a.md", ChangeKind::Modified, 10);
        recorder.record("notes/b.md", ChangeKind::Modified, 20);

        let batch = recorder.flush();
        assert_eq!(batch.len(), 2);
        assert_eq!(batch[0].kind, ChangeKind::Modified);
        assert_eq!(batch[0].timestamp_ms, 10);
    }

    #[test]
    fn window_elapse_fires_callback() {
        let fired = Arc::new(AtomicUsize::new(0));
        let seen = fired.clone();

        let mut recorder = ChangeRecorder::new(100);
        recorder.on_batch(move |batch| {
            seen.fetch_add(batch.len(), Ordering::SeqCst);
        });

        recorder.record("notes/a.md", ChangeKind::Modified, 0);
        assert_eq!(fired.load(Ordering::SeqCst), 0);

        // Crossing the window boundary flushes the coalesced batch
        recorder.record("notes/b.md", ChangeKind::Modified, 150);
        assert_eq!(fired.load(Ordering::SeqCst), 2);
        assert_eq!(recorder.pending_len(), 0);
    }

    #[test]
    fn change_detection_by_mtime_and_size() {
        let mut recorder = ChangeRecorder::new(100);
        assert!(recorder.has_changed("notes/a.md", 1, 10));

        recorder.note_seen("notes/a.md", 1, 10);
        assert!(!recorder.has_changed("notes/a.md", 1, 10));
        assert!(recorder.has_changed("notes/a.md", 2, 10));
        assert!(recorder.has_changed("notes/a.md", 1, 11));
    }

    #[test]
    fn empty_flush_is_a_no_op() {
        let fired = Arc::new(AtomicUsize::new(0));
        let seen = fired.clone();
        let mut recorder = ChangeRecorder::new(100);
        recorder.on_batch(move |_| {
            seen.fetch_add(1, Ordering::SeqCst);
        });

        assert!(recorder.flush().is_empty());
        assert_eq!(fired.load(Ordering::SeqCst), 0);
    }
}
