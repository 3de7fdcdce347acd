// SPDX-FileCopyrightText: 2025 blinry <mail@blinry.org>
// SPDX-FileCopyrightText: 2025 zormit <nt4u@kpvn.de>
//
// SPDX-License-Identifier: AGPL-3.0-or-later

//! The Document Store (C3): per-document `(content, revision, history)`
//! state, one instance per document, single-writer.

use std::collections::VecDeque;

use tracing::debug;

use crate::error::IngestError;
use crate::ot::{transform, Operation, Side};

/// How many past operations a document keeps around to transform stale
/// client ops against. Clients whose `baseRevision` predates the oldest
/// retained entry must be resynced from a fresh snapshot instead.
pub const HISTORY_LIMIT: usize = 100;

/// A read-only view of a document's state, cheap to produce and send to a
/// newly subscribed or resyncing client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    pub content: String,
    pub revision: u64,
}

/// One document's canonical state. All mutation goes through [`Document::ingest`],
/// which is the only place `content`/`revision`/`history` ever change together.
#[derive(Debug, Clone)]
pub struct Document {
    content: String,
    revision: u64,
    history: VecDeque<Operation>,
    history_limit: usize,
}

impl Document {
    #[must_use]
    pub fn new(content: impl Into<String>) -> Self {
        Self::with_history_limit(content, HISTORY_LIMIT)
    }

    /// Like [`Document::new`], but with a caller-supplied history bound
    /// (C8's `HISTORY_SIZE` option) instead of the compile-time default.
    #[must_use]
    pub fn with_history_limit(content: impl Into<String>, history_limit: usize) -> Self {
        Self {
            content: content.into(),
            revision: 0,
            history: VecDeque::new(),
            history_limit,
        }
    }

    /// Reconstruct a document from a persisted `(content, revision)` pair,
    /// as C4 does when restoring a room after a restart. Starts with empty
    /// history, same as [`Document::reset`].
    #[must_use]
    pub fn restore(content: impl Into<String>, revision: u64) -> Self {
        Self::restore_with_history_limit(content, revision, HISTORY_LIMIT)
    }

    #[must_use]
    pub fn restore_with_history_limit(
        content: impl Into<String>,
        revision: u64,
        history_limit: usize,
    ) -> Self {
        Self {
            content: content.into(),
            revision,
            history: VecDeque::new(),
            history_limit,
        }
    }

    #[must_use]
    pub fn content(&self) -> &str {
        &self.content
    }

    #[must_use]
    pub const fn revision(&self) -> u64 {
        self.revision
    }

    /// The oldest revision a client can still be transformed forward from
    /// incrementally: `revision - |history|`.
    #[must_use]
    pub fn rev0(&self) -> u64 {
        self.revision.saturating_sub(self.history.len() as u64)
    }

    #[must_use]
    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            content: self.content.clone(),
            revision: self.revision,
        }
    }

    /// Replace the document's state wholesale, as C5 does after loading a
    /// persisted row. Clears history: there is nothing yet to transform
    /// incoming stale ops against until new ones are ingested.
    pub fn reset(&mut self, content: impl Into<String>, revision: u64) {
        self.content = content.into();
        self.revision = revision;
        self.history.clear();
    }

    /// Ingest a client operation authored against `base_revision`.
    ///
    /// Returns the transformed operation actually applied, and the document's
    /// new revision. See the module-level table for the four cases.
    pub fn ingest(
        &mut self,
        op: Operation,
        base_revision: u64,
    ) -> Result<(Operation, u64), IngestError> {
        if base_revision > self.revision {
            return Err(IngestError::FutureRevision {
                base_revision,
                revision: self.revision,
            });
        }

        let rev0 = self.rev0();
        if base_revision < rev0 {
            return Err(IngestError::RevisionTooOld {
                base_revision,
                rev0,
            });
        }

        let mut transformed = op;
        if base_revision < self.revision {
            let start = (base_revision - rev0) as usize;
            for historical in self.history.iter().skip(start) {
                transformed = transform(&transformed, historical, Side::Left)?;
            }
        }

        let new_content = transformed.apply(&self.content)?;
        self.content = new_content;
        self.revision += 1;
        self.history.push_back(transformed.clone());
        if self.history.len() > self.history_limit {
            self.history.pop_front();
        }

        debug!(revision = self.revision, "ingested operation");
        Ok((transformed, self.revision))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ot::factories::{delete, insert};
    use pretty_assertions::assert_eq;
    use tracing_test::traced_test;

    #[traced_test]
    #[test]
    fn ingest_at_current_revision_applies_directly() {
        let mut doc = Document::new("hello");
        let (transformed, revision) = doc.ingest(insert(5, " world"), 0).unwrap();
        assert_eq!(transformed, insert(5, " world"));
        assert_eq!(revision, 1);
        assert_eq!(doc.content(), "hello world");
    }

    #[test]
    fn ingest_transforms_against_intervening_history() {
        let mut doc = Document::new("hello world");
        // Editor A deletes "hello " at rev 0.
        doc.ingest(delete(0, 6), 0).unwrap();
        assert_eq!(doc.content(), "world");
        assert_eq!(doc.revision(), 1);

        // Editor B, still at rev 0, appends "!" at the end of the original doc.
        let (transformed, revision) = doc.ingest(insert(11, "!"), 0).unwrap();
        assert_eq!(revision, 2);
        assert_eq!(doc.content(), "world!");
        assert_eq!(transformed.apply("world").unwrap(), "world!");
    }

    #[test]
    fn ingest_rejects_future_revision() {
        let mut doc = Document::new("hi");
        let err = doc.ingest(insert(2, "!"), 5).unwrap_err();
        assert!(matches!(err, IngestError::FutureRevision { .. }));
    }

    #[test]
    fn ingest_rejects_revision_older_than_history_window() {
        let mut doc = Document::new(String::new());
        for i in 0..(HISTORY_LIMIT + 5) {
            doc.ingest(insert(i as u64, "x"), i as u64).unwrap();
        }
        assert_eq!(doc.rev0(), (HISTORY_LIMIT + 5) as u64 - HISTORY_LIMIT as u64);

        let err = doc.ingest(insert(0, "y"), 0).unwrap_err();
        assert!(matches!(err, IngestError::RevisionTooOld { .. }));
    }

    #[test]
    fn history_never_exceeds_limit() {
        let mut doc = Document::new(String::new());
        for i in 0..(HISTORY_LIMIT + 10) {
            doc.ingest(insert(i as u64, "x"), i as u64).unwrap();
        }
        assert_eq!(doc.history.len(), HISTORY_LIMIT);
    }

    #[test]
    fn a_custom_history_limit_overrides_the_default() {
        let mut doc = Document::with_history_limit(String::new(), 3);
        for i in 0..10 {
            doc.ingest(insert(i as u64, "x"), i as u64).unwrap();
        }
        assert_eq!(doc.history.len(), 3);
        assert_eq!(doc.rev0(), 7);
    }

    #[test]
    fn snapshot_then_reset_is_observationally_identical() {
        let mut doc = Document::new("hello");
        doc.ingest(insert(5, "!"), 0).unwrap();
        let snapshot = doc.snapshot();

        let mut restored = Document::new(String::new());
        restored.reset(snapshot.content.clone(), snapshot.revision);

        assert_eq!(restored.content(), doc.content());
        assert_eq!(restored.revision(), doc.revision());
        assert_eq!(restored.rev0(), restored.revision());
    }

    #[test]
    fn boundary_base_revision_equals_rev0_transforms_against_full_history() {
        let mut doc = Document::new("abc");
        doc.ingest(insert(3, "d"), 0).unwrap(); // rev 1, content "abcd"
        doc.ingest(insert(4, "e"), 1).unwrap(); // rev 2, content "abcde"
        assert_eq!(doc.rev0(), 0);

        let (_, revision) = doc.ingest(insert(0, "Z"), 0).unwrap();
        assert_eq!(revision, 3);
        assert_eq!(doc.content(), "Zabcde");
    }
}
