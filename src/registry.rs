// SPDX-FileCopyrightText: 2025 blinry <mail@blinry.org>
// SPDX-FileCopyrightText: 2025 zormit <nt4u@kpvn.de>
//
// SPDX-License-Identifier: AGPL-3.0-or-later

//! The Room Registry & Session Manager (C4): room lifecycle, membership,
//! host transfer, and routing of client commands to the right
//! [`crate::document::Document`], with subscription fan-out back out to
//! connections.
//!
//! Locking discipline (§5): registry → room → document, always in that
//! order, never the reverse, and never two document locks at once.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc::UnboundedSender;
use tokio::time::sleep;
use tracing::{debug, info, instrument};

use crate::error::RoomError;
use crate::persistence::PersistenceHandle;
use crate::protocol::{ClientEvent, DocumentSummary, ServerEvent};
use crate::room::{DocumentId, DocumentMeta, MemberInfo, ParticipantId, Room};

pub use crate::room::generate_room_code;

/// The empty-room time-to-live before a room's persisted state is torn down.
pub const DEFAULT_ROOM_EXPIRY: Duration = Duration::from_secs(30 * 60);

/// The wire-facing shape of a room member, as sent in `room_created`/`room_joined`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Member {
    pub id: ParticipantId,
    pub display: String,
    pub color: String,
}

struct Connection {
    sender: UnboundedSender<ServerEvent>,
    room_code: Option<String>,
}

/// Owns every live room and the reverse `participant → room` mapping, plus
/// each connection's outbound channel. Cheap to clone; all state behind
/// `Arc`.
#[derive(Clone)]
pub struct Registry {
    rooms: Arc<Mutex<HashMap<String, Arc<Mutex<Room>>>>>,
    connections: Arc<Mutex<HashMap<ParticipantId, Connection>>>,
    expiry_generations: Arc<Mutex<HashMap<String, u64>>>,
    next_participant_id: Arc<AtomicU64>,
    persistence: PersistenceHandle,
    room_expiry: Duration,
    history_limit: usize,
}

impl Registry {
    #[must_use]
    pub fn new(persistence: PersistenceHandle) -> Self {
        Self::with_expiry(persistence, DEFAULT_ROOM_EXPIRY)
    }

    #[must_use]
    pub fn with_expiry(persistence: PersistenceHandle, room_expiry: Duration) -> Self {
        Self::with_expiry_and_history_limit(persistence, room_expiry, crate::document::HISTORY_LIMIT)
    }

    /// Full constructor: every room this registry creates or restores uses
    /// `history_limit` as its per-document history bound (C8's `HISTORY_SIZE`).
    #[must_use]
    pub fn with_expiry_and_history_limit(
        persistence: PersistenceHandle,
        room_expiry: Duration,
        history_limit: usize,
    ) -> Self {
        Self {
            rooms: Arc::new(Mutex::new(HashMap::new())),
            connections: Arc::new(Mutex::new(HashMap::new())),
            expiry_generations: Arc::new(Mutex::new(HashMap::new())),
            next_participant_id: Arc::new(AtomicU64::new(1)),
            persistence,
            room_expiry,
            history_limit,
        }
    }

    #[must_use]
    pub fn allocate_participant_id(&self) -> ParticipantId {
        self.next_participant_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Register a freshly accepted connection's outbound channel. Called by
    /// the wire adapter at connection bootstrap, before any event is processed.
    pub fn register_connection(&self, participant: ParticipantId, sender: UnboundedSender<ServerEvent>) {
        self.connections.lock().expect("connections poisoned").insert(
            participant,
            Connection {
                sender,
                room_code: None,
            },
        );
    }

    /// Report a wire-level decode failure directly to the connection that
    /// sent it, without touching any room state (§4.6: malformed payloads
    /// never reach C4).
    pub async fn send_protocol_error(&self, participant: ParticipantId, message: String) {
        self.send_to(participant, ServerEvent::RoomError { message });
    }

    fn send_to(&self, participant: ParticipantId, event: ServerEvent) {
        let connections = self.connections.lock().expect("connections poisoned");
        if let Some(conn) = connections.get(&participant) {
            let _ = conn.sender.send(event);
        }
    }

    fn room_code_of(&self, participant: ParticipantId) -> Option<String> {
        self.connections
            .lock()
            .expect("connections poisoned")
            .get(&participant)
            .and_then(|c| c.room_code.clone())
    }

    fn set_room_code_of(&self, participant: ParticipantId, code: Option<String>) {
        if let Some(conn) = self
            .connections
            .lock()
            .expect("connections poisoned")
            .get_mut(&participant)
        {
            conn.room_code = code;
        }
    }

    fn room(&self, code: &str) -> Option<Arc<Mutex<Room>>> {
        self.rooms.lock().expect("rooms poisoned").get(code).cloned()
    }

    /// Reconstruct a room from persisted document rows after a restart
    /// (§8, restart recovery). Returns `None` if nothing was ever persisted
    /// under this code, which the caller treats the same as "room not found".
    async fn restore_room(&self, code: &str) -> Option<Arc<Mutex<Room>>> {
        let rows = self.persistence.load_documents(code).await;
        if rows.is_empty() {
            return None;
        }
        let room = Room::restore(code.to_string(), rows, self.history_limit);
        let handle = Arc::new(Mutex::new(room));
        self.rooms
            .lock()
            .expect("rooms poisoned")
            .insert(code.to_string(), handle.clone());
        info!(room_code = code, "room restored from persisted state");
        Some(handle)
    }

    fn broadcast(&self, room: &Room, event: ServerEvent, exclude: Option<ParticipantId>) {
        for (id, _) in room.members() {
            if Some(id) == exclude {
                continue;
            }
            self.send_to(id, event.clone());
        }
    }

    fn broadcast_to_topic(&self, room: &Room, doc: DocumentId, event: ServerEvent) {
        for id in room.subscribers(doc) {
            self.send_to(id, event.clone());
        }
    }

    fn summaries(room: &Room) -> Vec<DocumentSummary> {
        room.document_summaries()
            .into_iter()
            .map(|(id, meta)| DocumentSummary {
                id,
                name: meta.name,
                language: meta.language,
            })
            .collect()
    }

    fn members_wire(room: &Room) -> Vec<Member> {
        room.members()
            .into_iter()
            .map(|(id, info)| Member {
                id,
                display: info.display,
                color: info.color,
            })
            .collect()
    }

    /// Dispatch a single client command. `participant` is the connection the
    /// event arrived on, supplied by the wire adapter out of band.
    #[instrument(skip(self, event), fields(participant))]
    pub async fn handle(&self, participant: ParticipantId, event: ClientEvent) {
        match event {
            ClientEvent::CreateRoom { username, color } => {
                self.create_room(participant, username, color).await;
            }
            ClientEvent::JoinRoom {
                username,
                color,
                room_code,
            } => {
                self.join_room(participant, username, color, room_code).await;
            }
            ClientEvent::AddEditor { name, language } => {
                self.add_editor(participant, name, language);
            }
            ClientEvent::RemoveEditor { editor_id } => {
                self.remove_editor(participant, editor_id);
            }
            ClientEvent::JoinEditor { editor_id } => {
                self.join_editor(participant, editor_id);
            }
            ClientEvent::LeaveEditor { editor_id } => {
                self.leave_editor(participant, editor_id);
            }
            ClientEvent::SendOperation {
                editor_id,
                operation,
                base_revision,
            } => {
                self.send_operation(participant, editor_id, operation, base_revision);
            }
            ClientEvent::RequestSync { editor_id } => {
                self.request_sync(participant, editor_id);
            }
            ClientEvent::KickUser { target_socket_id } => {
                self.kick_user(participant, target_socket_id);
            }
            ClientEvent::CloseRoom => {
                self.close_room(participant).await;
            }
        }
    }

    async fn create_room(&self, participant: ParticipantId, username: String, color: String) {
        let code = loop {
            let candidate = generate_room_code();
            if !self.rooms.lock().expect("rooms poisoned").contains_key(&candidate) {
                break candidate;
            }
        };

        let mut room = Room::with_history_limit(code.clone(), self.history_limit);
        room.join(
            participant,
            MemberInfo {
                display: username,
                color,
            },
        );
        self.persistence.init_documents(&code, &room.document_ids()).await;

        self.rooms
            .lock()
            .expect("rooms poisoned")
            .insert(code.clone(), Arc::new(Mutex::new(room)));
        self.set_room_code_of(participant, Some(code.clone()));
        self.bump_expiry_generation(&code);

        let room_handle = self.room(&code).expect("just inserted");
        let room = room_handle.lock().expect("room poisoned");
        info!(room_code = %code, "room created");
        self.send_to(
            participant,
            ServerEvent::RoomCreated {
                room_code: code,
                editors: Self::summaries(&room),
                users: Self::members_wire(&room),
                is_host: true,
            },
        );
    }

    async fn join_room(&self, participant: ParticipantId, username: String, color: String, code: String) {
        let room_handle = match self.room(&code) {
            Some(handle) => handle,
            None => match self.restore_room(&code).await {
                Some(handle) => handle,
                None => {
                    self.send_to(
                        participant,
                        ServerEvent::RoomError {
                            message: RoomError::RoomNotFound { code }.to_string(),
                        },
                    );
                    return;
                }
            },
        };

        {
            let mut room = room_handle.lock().expect("room poisoned");
            room.join(
                participant,
                MemberInfo {
                    display: username.clone(),
                    color: color.clone(),
                },
            );
            self.set_room_code_of(participant, Some(code.clone()));
            self.bump_expiry_generation(&code);

            self.send_to(
                participant,
                ServerEvent::RoomJoined {
                    room_code: code.clone(),
                    editors: Self::summaries(&room),
                    users: Self::members_wire(&room),
                },
            );
            self.broadcast(
                &room,
                ServerEvent::UserJoined {
                    socket_id: participant,
                    username,
                    color,
                },
                Some(participant),
            );
        }
        info!(room_code = %code, %participant, "participant joined room");
    }

    fn with_room_of<T>(
        &self,
        participant: ParticipantId,
        f: impl FnOnce(&mut Room, &str) -> Result<T, RoomError>,
    ) -> Result<T, RoomError> {
        let Some(code) = self.room_code_of(participant) else {
            return Err(RoomError::NotInRoom);
        };
        let Some(room_handle) = self.room(&code) else {
            return Err(RoomError::RoomNotFound { code });
        };
        let mut room = room_handle.lock().expect("room poisoned");
        f(&mut room, &code)
    }

    fn add_editor(&self, participant: ParticipantId, name: String, language: String) {
        let result = self.with_room_of(participant, |room, code| {
            let id = room.add_document(DocumentMeta {
                name: name.clone(),
                language: language.clone(),
            });
            Ok((id, code.to_string(), name, language))
        });
        match result {
            Ok((id, code, name, language)) => {
                let persistence = self.persistence.clone();
                let ids = vec![id];
                tokio::spawn(async move {
                    persistence.init_documents(&code, &ids).await;
                });
                if let Some(room_handle) = self.room(&code) {
                    let room = room_handle.lock().expect("room poisoned");
                    self.broadcast(
                        &room,
                        ServerEvent::EditorAdded {
                            editor: DocumentSummary { id, name, language },
                        },
                        None,
                    );
                }
            }
            Err(err) => self.send_to(participant, ServerEvent::RoomError { message: err.to_string() }),
        }
    }

    fn remove_editor(&self, participant: ParticipantId, editor_id: DocumentId) {
        let result = self.with_room_of(participant, |room, code| {
            room.remove_document(editor_id)?;
            Ok(code.to_string())
        });
        match result {
            Ok(code) => {
                if let Some(room_handle) = self.room(&code) {
                    let room = room_handle.lock().expect("room poisoned");
                    self.broadcast(&room, ServerEvent::EditorRemoved { editor_id }, None);
                }
            }
            Err(err) if err.is_silent() => {}
            Err(err) => self.send_to(participant, ServerEvent::RoomError { message: err.to_string() }),
        }
    }

    fn join_editor(&self, participant: ParticipantId, editor_id: DocumentId) {
        let result = self.with_room_of(participant, |room, _code| {
            room.subscribe(participant, editor_id)?;
            let snapshot = room.document(editor_id)?.snapshot();
            Ok(snapshot)
        });
        match result {
            Ok(snapshot) => self.send_to(
                participant,
                ServerEvent::EditorSynced {
                    editor_id,
                    content: snapshot.content,
                    revision: snapshot.revision,
                },
            ),
            Err(err) => self.send_to(participant, ServerEvent::SyncError { message: err.to_string() }),
        }
    }

    fn leave_editor(&self, participant: ParticipantId, editor_id: DocumentId) {
        let _ = self.with_room_of(participant, |room, _code| {
            room.unsubscribe(participant, editor_id);
            Ok(())
        });
    }

    fn send_operation(
        &self,
        participant: ParticipantId,
        editor_id: DocumentId,
        operation: crate::ot::Operation,
        base_revision: u64,
    ) {
        let result = self.with_room_of(participant, |room, code| {
            let doc = room.document_mut(editor_id)?;
            match doc.ingest(operation, base_revision) {
                Ok((transformed, revision)) => {
                    debug!(editor_id, revision, "operation transformed and applied");
                    let content = doc.content().to_string();
                    Ok((code.to_string(), transformed, revision, content))
                }
                Err(err) => Err(RoomError::from(err)),
            }
        });

        match result {
            Ok((code, transformed, revision, content)) => {
                self.persistence
                    .schedule_write(code.clone(), editor_id, content, revision);
                if let Some(room_handle) = self.room(&code) {
                    let room = room_handle.lock().expect("room poisoned");
                    self.broadcast_to_topic(
                        &room,
                        editor_id,
                        ServerEvent::ReceiveOperation {
                            editor_id,
                            operation: transformed,
                            revision,
                            author_socket_id: participant,
                        },
                    );
                }
            }
            Err(err) if err.wants_resync() => {
                // RevisionTooOld: force a full resync instead of an operation_error.
                if let Some(code) = self.room_code_of(participant) {
                    if let Some(room_handle) = self.room(&code) {
                        let room = room_handle.lock().expect("room poisoned");
                        if let Ok(doc) = room.document(editor_id) {
                            let snapshot = doc.snapshot();
                            self.send_to(
                                participant,
                                ServerEvent::EditorSynced {
                                    editor_id,
                                    content: snapshot.content,
                                    revision: snapshot.revision,
                                },
                            );
                            return;
                        }
                    }
                }
                self.send_to(participant, ServerEvent::OperationError { message: err.to_string() });
            }
            Err(err) => self.send_to(participant, ServerEvent::OperationError { message: err.to_string() }),
        }
    }

    fn request_sync(&self, participant: ParticipantId, editor_id: DocumentId) {
        let result = self.with_room_of(participant, |room, _code| {
            Ok(room.document(editor_id)?.snapshot())
        });
        match result {
            Ok(snapshot) => self.send_to(
                participant,
                ServerEvent::EditorSynced {
                    editor_id,
                    content: snapshot.content,
                    revision: snapshot.revision,
                },
            ),
            Err(err) => self.send_to(participant, ServerEvent::SyncError { message: err.to_string() }),
        }
    }

    fn kick_user(&self, participant: ParticipantId, target: ParticipantId) {
        let result = self.with_room_of(participant, |room, code| {
            if !room.is_host(participant) {
                return Err(RoomError::NotHost);
            }
            room.kick(target);
            Ok(code.to_string())
        });
        match result {
            Ok(code) => {
                self.send_to(
                    target,
                    ServerEvent::Kicked {
                        message: "you were removed from the room".to_string(),
                    },
                );
                self.set_room_code_of(target, None);
                if let Some(room_handle) = self.room(&code) {
                    let room = room_handle.lock().expect("room poisoned");
                    self.broadcast(&room, ServerEvent::UserLeft { socket_id: target }, None);
                }
            }
            Err(err) => self.send_to(participant, ServerEvent::RoomError { message: err.to_string() }),
        }
    }

    async fn close_room(&self, participant: ParticipantId) {
        let result = self.with_room_of(participant, |room, code| {
            if !room.is_host(participant) {
                return Err(RoomError::NotHost);
            }
            Ok((code.to_string(), room.members()))
        });
        match result {
            Ok((code, members)) => {
                for (id, _) in &members {
                    self.send_to(
                        *id,
                        ServerEvent::RoomClosed {
                            message: "the host closed the room".to_string(),
                        },
                    );
                    self.set_room_code_of(*id, None);
                }
                self.rooms.lock().expect("rooms poisoned").remove(&code);
                self.persistence.cleanup_room(&code).await;
                info!(room_code = %code, "room closed by host");
            }
            Err(err) => self.send_to(participant, ServerEvent::RoomError { message: err.to_string() }),
        }
    }

    /// Synthesized by the wire adapter when a transport-level disconnect is
    /// detected, per §4.6. Removes the participant from its room, transfers
    /// host if needed, and arms the room-expiry timer if the room is now empty.
    pub fn disconnect(&self, participant: ParticipantId) {
        let Some(code) = self.room_code_of(participant) else {
            self.connections.lock().expect("connections poisoned").remove(&participant);
            return;
        };
        self.connections.lock().expect("connections poisoned").remove(&participant);

        let Some(room_handle) = self.room(&code) else {
            return;
        };
        let (new_host, now_empty) = {
            let mut room = room_handle.lock().expect("room poisoned");
            let new_host = room.leave(participant);
            (new_host, room.is_empty())
        };

        let room = room_handle.lock().expect("room poisoned");
        self.broadcast(&room, ServerEvent::UserLeft { socket_id: participant }, None);
        if let Some(new_host) = new_host {
            info!(room_code = %code, new_host, "host transferred after disconnect");
            self.broadcast(
                &room,
                ServerEvent::HostTransferred { new_host_id: new_host },
                None,
            );
        }
        drop(room);

        if now_empty {
            self.arm_expiry(code);
        }
    }

    fn bump_expiry_generation(&self, code: &str) -> u64 {
        let mut generations = self.expiry_generations.lock().expect("expiry generations poisoned");
        let next = generations.get(code).copied().unwrap_or(0) + 1;
        generations.insert(code.to_string(), next);
        next
    }

    fn arm_expiry(&self, code: String) {
        let generation = self.bump_expiry_generation(&code);
        let registry = self.clone();
        let expiry = self.room_expiry;
        tokio::spawn(async move {
            sleep(expiry).await;
            registry.expire_if_current(&code, generation).await;
        });
    }

    async fn expire_if_current(&self, code: &str, generation: u64) {
        let current = self
            .expiry_generations
            .lock()
            .expect("expiry generations poisoned")
            .get(code)
            .copied();
        if current != Some(generation) {
            return; // superseded by a rejoin or a later empty-room arming
        }

        let still_empty = self
            .room(code)
            .is_some_and(|room| room.lock().expect("room poisoned").is_empty());
        if !still_empty {
            return;
        }

        self.rooms.lock().expect("rooms poisoned").remove(code);
        self.persistence.cleanup_room(code).await;
        info!(room_code = code, "room expired and was cleaned up");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ot::factories::insert;
    use tokio::sync::mpsc::unbounded_channel;

    fn registry() -> Registry {
        Registry::with_expiry(
            PersistenceHandle::in_memory(Duration::from_millis(10)),
            Duration::from_millis(200),
        )
    }

    async fn connect(registry: &Registry) -> (ParticipantId, tokio::sync::mpsc::UnboundedReceiver<ServerEvent>) {
        let id = registry.allocate_participant_id();
        let (tx, rx) = unbounded_channel();
        registry.register_connection(id, tx);
        (id, rx)
    }

    #[tokio::test]
    async fn create_then_join_room_notifies_both_participants() {
        let registry = registry();
        let (host, mut host_rx) = connect(&registry).await;
        registry
            .handle(
                host,
                ClientEvent::CreateRoom {
                    username: "host".into(),
                    color: "#000".into(),
                },
            )
            .await;
        let created = host_rx.recv().await.unwrap();
        let ServerEvent::RoomCreated { room_code, .. } = created else {
            panic!("expected RoomCreated, got {created:?}");
        };

        let (guest, mut guest_rx) = connect(&registry).await;
        registry
            .handle(
                guest,
                ClientEvent::JoinRoom {
                    username: "guest".into(),
                    color: "#fff".into(),
                    room_code: room_code.clone(),
                },
            )
            .await;

        let joined = guest_rx.recv().await.unwrap();
        assert!(matches!(joined, ServerEvent::RoomJoined { .. }));
        let notified = host_rx.recv().await.unwrap();
        assert!(matches!(notified, ServerEvent::UserJoined { .. }));
    }

    #[tokio::test]
    async fn join_unknown_room_reports_room_not_found() {
        let registry = registry();
        let (participant, mut rx) = connect(&registry).await;
        registry
            .handle(
                participant,
                ClientEvent::JoinRoom {
                    username: "x".into(),
                    color: "#000".into(),
                    room_code: "ZZZZZZ".into(),
                },
            )
            .await;
        let event = rx.recv().await.unwrap();
        assert!(matches!(event, ServerEvent::RoomError { .. }));
    }

    #[tokio::test]
    async fn late_joiner_receives_content_via_editor_synced() {
        let registry = registry();
        let (host, mut host_rx) = connect(&registry).await;
        registry
            .handle(
                host,
                ClientEvent::CreateRoom {
                    username: "host".into(),
                    color: "#000".into(),
                },
            )
            .await;
        let ServerEvent::RoomCreated { room_code, .. } = host_rx.recv().await.unwrap() else {
            panic!("expected RoomCreated");
        };

        registry.handle(host, ClientEvent::JoinEditor { editor_id: 0 }).await;
        let _ = host_rx.recv().await.unwrap(); // editor_synced for host

        registry
            .handle(
                host,
                ClientEvent::SendOperation {
                    editor_id: 0,
                    operation: insert(0, "hello world"),
                    base_revision: 0,
                },
            )
            .await;
        let _ = host_rx.recv().await.unwrap(); // receive_operation ack

        let (guest, mut guest_rx) = connect(&registry).await;
        registry
            .handle(
                guest,
                ClientEvent::JoinRoom {
                    username: "guest".into(),
                    color: "#fff".into(),
                    room_code: room_code.clone(),
                },
            )
            .await;
        let _ = guest_rx.recv().await.unwrap(); // room_joined
        let _ = host_rx.recv().await.unwrap(); // user_joined to host

        registry.handle(guest, ClientEvent::JoinEditor { editor_id: 0 }).await;
        let synced = guest_rx.recv().await.unwrap();
        assert_eq!(
            synced,
            ServerEvent::EditorSynced {
                editor_id: 0,
                content: "hello world".to_string(),
                revision: 1,
            }
        );
    }

    #[tokio::test]
    async fn host_transfer_on_disconnect_notifies_remaining_members() {
        let registry = registry();
        let (host, mut host_rx) = connect(&registry).await;
        registry
            .handle(
                host,
                ClientEvent::CreateRoom {
                    username: "host".into(),
                    color: "#000".into(),
                },
            )
            .await;
        let ServerEvent::RoomCreated { room_code, .. } = host_rx.recv().await.unwrap() else {
            panic!("expected RoomCreated");
        };

        let (member, mut member_rx) = connect(&registry).await;
        registry
            .handle(
                member,
                ClientEvent::JoinRoom {
                    username: "m1".into(),
                    color: "#fff".into(),
                    room_code,
                },
            )
            .await;
        let _ = member_rx.recv().await.unwrap(); // room_joined
        let _ = host_rx.recv().await.unwrap(); // user_joined

        registry.disconnect(host);
        let left = member_rx.recv().await.unwrap();
        assert!(matches!(left, ServerEvent::UserLeft { .. }));
        let transferred = member_rx.recv().await.unwrap();
        assert_eq!(transferred, ServerEvent::HostTransferred { new_host_id: member });
    }

    #[tokio::test]
    async fn rejoining_a_persisted_room_restores_its_documents() {
        let persistence = PersistenceHandle::in_memory(Duration::from_millis(10));
        let registry = Registry::with_expiry(persistence.clone(), Duration::from_millis(200));

        persistence.init_documents("XYZ123", &[1]).await;
        persistence.schedule_write("XYZ123".to_string(), 1, "content".to_string(), 4);
        tokio::time::sleep(Duration::from_millis(50)).await;

        let (participant, mut rx) = connect(&registry).await;
        registry
            .handle(
                participant,
                ClientEvent::JoinRoom {
                    username: "a".into(),
                    color: "#000".into(),
                    room_code: "XYZ123".into(),
                },
            )
            .await;
        let joined = rx.recv().await.unwrap();
        assert!(matches!(joined, ServerEvent::RoomJoined { .. }));

        registry.handle(participant, ClientEvent::JoinEditor { editor_id: 1 }).await;
        let synced = rx.recv().await.unwrap();
        assert_eq!(
            synced,
            ServerEvent::EditorSynced {
                editor_id: 1,
                content: "content".to_string(),
                revision: 4,
            }
        );
    }

    #[tokio::test]
    async fn kick_user_requires_host() {
        let registry = registry();
        let (host, mut host_rx) = connect(&registry).await;
        registry
            .handle(
                host,
                ClientEvent::CreateRoom {
                    username: "host".into(),
                    color: "#000".into(),
                },
            )
            .await;
        let ServerEvent::RoomCreated { room_code, .. } = host_rx.recv().await.unwrap() else {
            panic!("expected RoomCreated");
        };

        let (member, mut member_rx) = connect(&registry).await;
        registry
            .handle(
                member,
                ClientEvent::JoinRoom {
                    username: "m1".into(),
                    color: "#fff".into(),
                    room_code,
                },
            )
            .await;
        let _ = member_rx.recv().await.unwrap();
        let _ = host_rx.recv().await.unwrap();

        // Non-host tries to kick the host: rejected.
        registry.handle(member, ClientEvent::KickUser { target_socket_id: host }).await;
        let rejected = member_rx.recv().await.unwrap();
        assert!(matches!(rejected, ServerEvent::RoomError { .. }));
    }
}
