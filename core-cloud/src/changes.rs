//! Normalized change feed and the change-collection engine.
//!
//! Providers expose wildly different listing/delta APIs; this module defines
//! the normalized output every implementation must produce - an ordered
//! sequence of [`RemoteChange`] records plus an opaque cursor - and the
//! [`ChangeCollector`] that turns a flat recursive listing into that
//! sequence.
//!
//! For providers without a true delta API the listing is a full rescan every
//! call. That behavior is kept deliberately: the cursor is the maximum
//! modification time observed (a decimal millisecond string), carried forward
//! unchanged when nothing was listed, and deletions are invisible.

use std::collections::HashSet;

use bridge_traits::ProgressListener;
use tracing::debug;

use crate::document::RemoteDocument;
use crate::error::{Result, StorageError};

/// What happened to a document.
///
/// Creation and update are not distinguished at this layer; deletion is only
/// reported by providers whose delta API can see it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoteChangeKind {
    Modification,
    Deletion,
}

/// One unit of the change feed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteChange {
    pub kind: RemoteChangeKind,
    pub document: RemoteDocument,
}

impl RemoteChange {
    pub fn modification(document: RemoteDocument) -> Self {
        Self {
            kind: RemoteChangeKind::Modification,
            document,
        }
    }

    pub fn deletion(document: RemoteDocument) -> Self {
        Self {
            kind: RemoteChangeKind::Deletion,
            document,
        }
    }
}

/// An ordered batch of changes plus the cursor to thread into the next call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteChanges {
    pub changes: Vec<RemoteChange>,
    /// Opaque cursor; pass into the next `changes` call to continue from here.
    pub last_change_id: Option<String>,
    /// Whether this batch came from a full provider rescan rather than a
    /// true incremental delta.
    pub full_resync: bool,
}

/// Turns a recursive listing into the normalized change sequence.
///
/// For each listed object the collector synthesizes the parent virtual
/// folder once per distinct parent path and emits its modification before
/// the object's own, so downstream consumers can create directories before
/// placing files in them. The cursor advances to the maximum modification
/// time seen; cancellation is polled after every item.
///
/// On cancellation [`push`](Self::push) returns [`StorageError::Cancelled`];
/// changes collected up to that point stay valid and [`finish`](Self::finish)
/// yields a cursor reflecting only fully processed items.
pub struct ChangeCollector<'a> {
    account_name: String,
    listener: Option<&'a dyn ProgressListener>,
    previous_cursor: Option<String>,
    seen_parents: HashSet<String>,
    changes: Vec<RemoteChange>,
    max_seen_time: Option<i64>,
}

impl<'a> ChangeCollector<'a> {
    pub fn new(
        account_name: impl Into<String>,
        previous_cursor: Option<&str>,
        listener: Option<&'a dyn ProgressListener>,
    ) -> Self {
        Self {
            account_name: account_name.into(),
            listener,
            previous_cursor: previous_cursor.map(str::to_string),
            seen_parents: HashSet::new(),
            changes: Vec::new(),
            max_seen_time: None,
        }
    }

    /// Report the total item count and poll for an early abort.
    pub fn start(&self, total: usize) -> Result<()> {
        if let Some(listener) = self.listener {
            listener.on_set_max(0, total);
            listener.pause_if_needed();
            if listener.is_cancelled() {
                return Err(StorageError::Cancelled);
            }
        }
        Ok(())
    }

    /// Record a modification for one listed object.
    pub fn push(&mut self, document: RemoteDocument) -> Result<()> {
        if let Some(modified_at) = document.modified_at {
            if self.max_seen_time.map_or(true, |max| modified_at > max) {
                self.max_seen_time = Some(modified_at);
            }
        }

        // One synthesized folder change per distinct parent, before the
        // change of any object inside it.
        let parent = document.parent_path().to_string();
        if self.seen_parents.insert(parent.clone()) {
            self.changes.push(RemoteChange::modification(
                RemoteDocument::virtual_folder(&self.account_name, &parent),
            ));
        }
        self.changes.push(RemoteChange::modification(document));

        if let Some(listener) = self.listener {
            listener.on_set_max(0, self.changes.len());
            listener.on_progress(0, self.changes.len());
            listener.pause_if_needed();
            if listener.is_cancelled() {
                debug!(
                    collected = self.changes.len(),
                    "change listing cancelled by caller"
                );
                return Err(StorageError::Cancelled);
            }
        }
        Ok(())
    }

    /// Changes collected so far.
    pub fn changes(&self) -> &[RemoteChange] {
        &self.changes
    }

    /// Close the batch.
    ///
    /// The cursor is the maximum modification time observed, as a decimal
    /// string; when no object carried one, the previous cursor is carried
    /// forward unchanged so an empty listing never rewinds the feed.
    pub fn finish(self) -> RemoteChanges {
        let last_change_id = match self.max_seen_time {
            Some(max) => Some(max.to_string()),
            None => self.previous_cursor,
        };
        RemoteChanges {
            changes: self.changes,
            last_change_id,
            full_resync: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Listener that cancels once `cancel_after` progress reports happened.
    struct CancelAfter {
        reports: AtomicUsize,
        cancel_after: usize,
    }

    impl CancelAfter {
        fn new(cancel_after: usize) -> Self {
            Self {
                reports: AtomicUsize::new(0),
                cancel_after,
            }
        }
    }

    impl ProgressListener for CancelAfter {
        fn on_set_max(&self, _index: usize, _max: usize) {}

        fn on_progress(&self, _index: usize, _current: usize) {
            self.reports.fetch_add(1, Ordering::SeqCst);
        }

        fn is_cancelled(&self) -> bool {
            self.reports.load(Ordering::SeqCst) >= self.cancel_after
        }
    }

    fn file(path: &str, modified_at: i64) -> RemoteDocument {
        RemoteDocument::file("acc", path, 1, Some(modified_at), None)
    }

    #[test]
    fn test_folder_emitted_once_before_files() {
        let mut collector = ChangeCollector::new("acc", None, None);
        collector.push(file("x/1.txt", 100)).unwrap();
        collector.push(file("x/2.txt", 200)).unwrap();

        let batch = collector.finish();
        let paths: Vec<&str> = batch
            .changes
            .iter()
            .map(|c| c.document.path.as_str())
            .collect();
        assert_eq!(paths, vec!["x", "x/1.txt", "x/2.txt"]);
        assert!(batch.changes[0].document.is_folder);
        assert_eq!(batch.changes[0].kind, RemoteChangeKind::Modification);
    }

    #[test]
    fn test_distinct_parents_each_get_a_folder_change() {
        let mut collector = ChangeCollector::new("acc", None, None);
        collector.push(file("a/1.txt", 100)).unwrap();
        collector.push(file("b/2.txt", 200)).unwrap();
        collector.push(file("a/3.txt", 300)).unwrap();

        let batch = collector.finish();
        let folder_count = batch
            .changes
            .iter()
            .filter(|c| c.document.is_folder)
            .count();
        assert_eq!(folder_count, 2);
        assert_eq!(batch.changes.len(), 5);
    }

    #[test]
    fn test_cursor_is_max_seen_time() {
        let mut collector = ChangeCollector::new("acc", Some("50"), None);
        collector.push(file("a/1.txt", 300)).unwrap();
        collector.push(file("a/2.txt", 100)).unwrap();

        let batch = collector.finish();
        assert_eq!(batch.last_change_id.as_deref(), Some("300"));
        assert!(batch.full_resync);
    }

    #[test]
    fn test_empty_listing_carries_cursor_forward() {
        let collector = ChangeCollector::new("acc", Some("1234"), None);
        let batch = collector.finish();
        assert!(batch.changes.is_empty());
        assert_eq!(batch.last_change_id.as_deref(), Some("1234"));
    }

    #[test]
    fn test_no_cursor_and_no_objects_yields_none() {
        let collector = ChangeCollector::new("acc", None, None);
        assert_eq!(collector.finish().last_change_id, None);
    }

    #[test]
    fn test_cancellation_preserves_collected_changes() {
        let listener = CancelAfter::new(2);
        let mut collector = ChangeCollector::new("acc", None, Some(&listener));

        collector.start(3).unwrap();
        collector.push(file("x/1.txt", 100)).unwrap();
        let err = collector.push(file("x/2.txt", 200)).unwrap_err();
        assert!(matches!(err, StorageError::Cancelled));

        // Items processed before the cancel remain valid, and the cursor
        // reflects exactly what was processed.
        assert_eq!(collector.changes().len(), 3);
        let batch = collector.finish();
        assert_eq!(batch.last_change_id.as_deref(), Some("200"));
    }

    #[test]
    fn test_cancellation_before_iteration() {
        let listener = CancelAfter::new(0);
        let collector = ChangeCollector::new("acc", None, Some(&listener));
        assert!(matches!(collector.start(10), Err(StorageError::Cancelled)));
    }

    #[test]
    fn test_deletion_changes_are_distinct_from_modifications() {
        let doc = RemoteDocument::file("acc", "x/gone.txt", 0, None, None);
        let deletion = RemoteChange::deletion(doc.clone());

        assert_eq!(deletion.kind, RemoteChangeKind::Deletion);
        assert_eq!(deletion.document.path, "x/gone.txt");
        assert_ne!(deletion, RemoteChange::modification(doc));
    }

    #[test]
    fn test_top_level_objects_synthesize_root_folder() {
        let mut collector = ChangeCollector::new("acc", None, None);
        collector.push(file("top.txt", 10)).unwrap();

        let batch = collector.finish();
        assert_eq!(batch.changes[0].document.path, "");
        assert!(batch.changes[0].document.is_folder);
    }
}
