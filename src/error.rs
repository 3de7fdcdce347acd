// SPDX-FileCopyrightText: 2025 blinry <mail@blinry.org>
// SPDX-FileCopyrightText: 2025 zormit <nt4u@kpvn.de>
//
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Typed error kinds shared across the OT engine, the document store, and the
//! room registry. [`RoomError`] is the only error type that crosses the wire
//! adapter boundary; everything downstream of it gets flattened into a
//! `{message}` payload there (see `protocol::ServerEvent`).

use thiserror::Error;

/// Failure modes of [`crate::ot::apply`] and [`crate::ot::transform`].
#[derive(Debug, Error, PartialEq, Eq, Clone)]
pub enum OtError {
    /// An operation's retain/delete mass didn't match the content it was applied to.
    #[error("operation is invalid for a document of length {base_len}")]
    InvalidOperation { base_len: usize },
    /// Two operations passed to `transform` weren't both defined against the same base length.
    #[error("operations are not compatible: base lengths {left} and {right} differ")]
    IncompatibleOperations { left: usize, right: usize },
}

/// Failure modes of [`crate::document::DocumentStore::ingest`].
#[derive(Debug, Error, PartialEq, Eq, Clone)]
pub enum IngestError {
    #[error(transparent)]
    Ot(#[from] OtError),
    /// `baseRevision` is older than the oldest entry retained in history.
    #[error("base revision {base_revision} is older than the oldest retained revision {rev0}")]
    RevisionTooOld { base_revision: u64, rev0: u64 },
    /// `baseRevision` is newer than the document's current revision: a client bug.
    #[error("base revision {base_revision} is ahead of current revision {revision}")]
    FutureRevision { base_revision: u64, revision: u64 },
}

/// Every error kind a participant command can fail with, as named in the
/// specification's error table. This is the type the wire adapter renders
/// into `room_error` / `operation_error` / `sync_error` payloads.
#[derive(Debug, Error, PartialEq, Eq, Clone)]
pub enum RoomError {
    #[error("room {code} does not exist")]
    RoomNotFound { code: String },
    #[error("you are not in a room")]
    NotInRoom,
    #[error("editor {id} does not exist")]
    EditorNotFound { id: u64 },
    #[error(transparent)]
    Ingest(#[from] IngestError),
    #[error("only the host can do that")]
    NotHost,
    /// `remove_editor` on the last remaining editor. Per spec this is a silent
    /// no-op at the wire boundary, never shown to the client; it is still a
    /// distinct variant so callers can tell the two cases apart.
    #[error("cannot remove the last remaining editor")]
    LastEditor,
}

impl RoomError {
    /// True for errors the spec says `remove_editor` should swallow instead of
    /// reporting as a `room_error`.
    #[must_use]
    pub const fn is_silent(&self) -> bool {
        matches!(self, Self::LastEditor)
    }

    /// True for errors that should trigger a forced `editor_synced` resync
    /// rather than an `operation_error`.
    #[must_use]
    pub const fn wants_resync(&self) -> bool {
        matches!(
            self,
            Self::Ingest(IngestError::RevisionTooOld { .. })
        )
    }
}
