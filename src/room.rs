// SPDX-FileCopyrightText: 2025 blinry <mail@blinry.org>
// SPDX-FileCopyrightText: 2025 zormit <nt4u@kpvn.de>
//
// SPDX-License-Identifier: AGPL-3.0-or-later

//! A single room's state: its documents, its members, and the document
//! topic subscriptions that decide who receives an `OperationApplied`
//! broadcast. Pure data and synchronous logic; all async orchestration
//! (connection channels, persistence, expiry timers) lives in
//! [`crate::registry`].

use std::collections::{HashMap, HashSet};

use rand::Rng;

use crate::document::{Document, HISTORY_LIMIT};
use crate::error::RoomError;
use crate::persistence::DocumentRow;

pub type DocumentId = u64;
pub type ParticipantId = u64;

/// The 32-symbol alphabet room codes are drawn from: uppercase letters and
/// digits with visually ambiguous glyphs (`I`, `O`, `0`, `1`) removed.
const ROOM_CODE_ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";
const ROOM_CODE_LEN: usize = 6;

#[must_use]
pub fn generate_room_code() -> String {
    let mut rng = rand::thread_rng();
    (0..ROOM_CODE_LEN)
        .map(|_| ROOM_CODE_ALPHABET[rng.gen_range(0..ROOM_CODE_ALPHABET.len())] as char)
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemberInfo {
    pub display: String,
    pub color: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentMeta {
    pub name: String,
    pub language: String,
}

/// `(code, documents, members, hostId, expiryTimer, state)` from the data model,
/// minus `expiryTimer`, which [`crate::registry::Registry`] owns as a cancellable task.
pub struct Room {
    pub code: String,
    documents: HashMap<DocumentId, Document>,
    document_meta: HashMap<DocumentId, DocumentMeta>,
    next_document_id: DocumentId,
    /// Join order, oldest first. The head (after removing a departing member)
    /// is the next host on a host-leave transfer.
    member_order: Vec<ParticipantId>,
    members: HashMap<ParticipantId, MemberInfo>,
    host_id: Option<ParticipantId>,
    subscriptions: HashMap<DocumentId, HashSet<ParticipantId>>,
    /// The per-document history bound new documents in this room are created
    /// with (C8's `HISTORY_SIZE` option).
    history_limit: usize,
}

impl Room {
    #[must_use]
    pub fn new(code: String) -> Self {
        Self::with_history_limit(code, HISTORY_LIMIT)
    }

    /// Like [`Room::new`], but with a caller-supplied per-document history
    /// bound instead of the compile-time default.
    #[must_use]
    pub fn with_history_limit(code: String, history_limit: usize) -> Self {
        let mut documents = HashMap::new();
        let mut document_meta = HashMap::new();
        documents.insert(0, Document::with_history_limit(String::new(), history_limit));
        document_meta.insert(
            0,
            DocumentMeta {
                name: "main".to_string(),
                language: "plaintext".to_string(),
            },
        );
        Self {
            code,
            documents,
            document_meta,
            next_document_id: 1,
            member_order: Vec::new(),
            members: HashMap::new(),
            host_id: None,
            subscriptions: HashMap::new(),
            history_limit,
        }
    }

    /// Reconstruct a room from persisted document rows after a restart, per
    /// the restart-recovery scenario (§8). Document names/languages aren't
    /// persisted, so restored documents get a placeholder name; membership
    /// is never persisted either, so the room starts with no members until
    /// the reconnecting participant joins it.
    #[must_use]
    pub fn restore(code: String, rows: Vec<DocumentRow>, history_limit: usize) -> Self {
        let mut documents = HashMap::new();
        let mut document_meta = HashMap::new();
        let mut next_document_id = 0;
        for row in rows {
            document_meta.insert(
                row.id,
                DocumentMeta {
                    name: format!("document-{}", row.id),
                    language: "plaintext".to_string(),
                },
            );
            next_document_id = next_document_id.max(row.id + 1);
            documents.insert(
                row.id,
                Document::restore_with_history_limit(row.content, row.revision, history_limit),
            );
        }
        Self {
            code,
            documents,
            document_meta,
            next_document_id,
            member_order: Vec::new(),
            members: HashMap::new(),
            host_id: None,
            subscriptions: HashMap::new(),
            history_limit,
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    #[must_use]
    pub fn host_id(&self) -> Option<ParticipantId> {
        self.host_id
    }

    #[must_use]
    pub fn is_host(&self, participant: ParticipantId) -> bool {
        self.host_id == Some(participant)
    }

    #[must_use]
    pub fn document_ids(&self) -> Vec<DocumentId> {
        let mut ids: Vec<_> = self.documents.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    #[must_use]
    pub fn document_summaries(&self) -> Vec<(DocumentId, DocumentMeta)> {
        self.document_ids()
            .into_iter()
            .map(|id| (id, self.document_meta[&id].clone()))
            .collect()
    }

    #[must_use]
    pub fn members(&self) -> Vec<(ParticipantId, MemberInfo)> {
        self.member_order
            .iter()
            .map(|id| (*id, self.members[id].clone()))
            .collect()
    }

    pub fn document_mut(&mut self, id: DocumentId) -> Result<&mut Document, RoomError> {
        self.documents.get_mut(&id).ok_or(RoomError::EditorNotFound { id })
    }

    pub fn document(&self, id: DocumentId) -> Result<&Document, RoomError> {
        self.documents.get(&id).ok_or(RoomError::EditorNotFound { id })
    }

    /// Add `participant` as a new member. The first member ever added becomes host.
    pub fn join(&mut self, participant: ParticipantId, info: MemberInfo) {
        self.member_order.push(participant);
        self.members.insert(participant, info);
        if self.host_id.is_none() {
            self.host_id = Some(participant);
        }
    }

    pub fn add_document(&mut self, meta: DocumentMeta) -> DocumentId {
        let id = self.next_document_id;
        self.next_document_id += 1;
        self.documents
            .insert(id, Document::with_history_limit(String::new(), self.history_limit));
        self.document_meta.insert(id, meta);
        id
    }

    /// Remove a document, provided it isn't the last one. `remove_editor` on
    /// the last remaining document is a silent no-op per §7's error table —
    /// callers should check `RoomError::is_silent()` before reporting this
    /// back to the client.
    pub fn remove_document(&mut self, id: DocumentId) -> Result<(), RoomError> {
        if self.documents.len() <= 1 {
            return Err(RoomError::LastEditor);
        }
        self.documents
            .remove(&id)
            .ok_or(RoomError::EditorNotFound { id })?;
        self.document_meta.remove(&id);
        self.subscriptions.remove(&id);
        Ok(())
    }

    /// Subscribe `participant` to `doc`'s operation broadcasts. A participant
    /// is in at most one document topic at a time (§3, §4.4): subscribing to
    /// a new document drops any previous subscription first.
    pub fn subscribe(&mut self, participant: ParticipantId, doc: DocumentId) -> Result<(), RoomError> {
        if !self.documents.contains_key(&doc) {
            return Err(RoomError::EditorNotFound { id: doc });
        }
        for (id, subs) in &mut self.subscriptions {
            if *id != doc {
                subs.remove(&participant);
            }
        }
        self.subscriptions.entry(doc).or_default().insert(participant);
        Ok(())
    }

    pub fn unsubscribe(&mut self, participant: ParticipantId, doc: DocumentId) {
        if let Some(subs) = self.subscriptions.get_mut(&doc) {
            subs.remove(&participant);
        }
    }

    #[must_use]
    pub fn subscribers(&self, doc: DocumentId) -> Vec<ParticipantId> {
        self.subscriptions
            .get(&doc)
            .map(|s| s.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Remove a member. Returns the newly promoted host, if the departing
    /// member was host and others remain.
    pub fn leave(&mut self, participant: ParticipantId) -> Option<ParticipantId> {
        self.members.remove(&participant);
        self.member_order.retain(|id| *id != participant);
        for subs in self.subscriptions.values_mut() {
            subs.remove(&participant);
        }

        if self.host_id == Some(participant) {
            self.host_id = self.member_order.first().copied();
            self.host_id
        } else {
            None
        }
    }

    pub fn kick(&mut self, target: ParticipantId) -> Option<ParticipantId> {
        self.leave(target)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn info(name: &str) -> MemberInfo {
        MemberInfo {
            display: name.to_string(),
            color: "#000".to_string(),
        }
    }

    #[test]
    fn room_code_has_expected_shape() {
        let code = generate_room_code();
        assert_eq!(code.len(), ROOM_CODE_LEN);
        assert!(code.chars().all(|c| ROOM_CODE_ALPHABET.contains(&(c as u8))));
    }

    #[test]
    fn first_joiner_becomes_host() {
        let mut room = Room::new("ABCDEF".into());
        room.join(1, info("alice"));
        assert_eq!(room.host_id(), Some(1));
    }

    #[test]
    fn host_transfers_to_oldest_remaining_member_on_leave() {
        let mut room = Room::new("ABCDEF".into());
        room.join(1, info("host"));
        room.join(2, info("m1"));
        room.join(3, info("m2"));

        let new_host = room.leave(1);
        assert_eq!(new_host, Some(2));
        assert_eq!(room.host_id(), Some(2));
    }

    #[test]
    fn non_host_leave_does_not_transfer() {
        let mut room = Room::new("ABCDEF".into());
        room.join(1, info("host"));
        room.join(2, info("m1"));

        let new_host = room.leave(2);
        assert_eq!(new_host, None);
        assert_eq!(room.host_id(), Some(1));
    }

    #[test]
    fn remove_document_refuses_to_remove_last_one() {
        let mut room = Room::new("ABCDEF".into());
        let err = room.remove_document(0).unwrap_err();
        assert!(err.is_silent());
    }

    #[test]
    fn remove_document_succeeds_with_more_than_one() {
        let mut room = Room::new("ABCDEF".into());
        let extra = room.add_document(DocumentMeta {
            name: "scratch".into(),
            language: "plaintext".into(),
        });
        assert!(room.remove_document(extra).is_ok());
        assert_eq!(room.document_ids(), vec![0]);
    }

    #[test]
    fn subscriber_set_tracks_subscribe_and_unsubscribe() {
        let mut room = Room::new("ABCDEF".into());
        room.join(1, info("alice"));
        room.subscribe(1, 0).unwrap();
        assert_eq!(room.subscribers(0), vec![1]);
        room.unsubscribe(1, 0);
        assert!(room.subscribers(0).is_empty());
    }

    #[test]
    fn subscribing_to_a_new_document_drops_the_previous_subscription() {
        let mut room = Room::new("ABCDEF".into());
        room.join(1, info("alice"));
        let other = room.add_document(DocumentMeta {
            name: "scratch".into(),
            language: "plaintext".into(),
        });

        room.subscribe(1, 0).unwrap();
        room.subscribe(1, other).unwrap();

        assert!(room.subscribers(0).is_empty());
        assert_eq!(room.subscribers(other), vec![1]);
    }

    #[test]
    fn leave_drops_all_subscriptions() {
        let mut room = Room::new("ABCDEF".into());
        room.join(1, info("alice"));
        room.subscribe(1, 0).unwrap();
        room.leave(1);
        assert!(room.subscribers(0).is_empty());
    }
}
