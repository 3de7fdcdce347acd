// SPDX-FileCopyrightText: 2025 blinry <mail@blinry.org>
// SPDX-FileCopyrightText: 2025 zormit <nt4u@kpvn.de>
//
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Wire-level event types (§6.1) exchanged between a connection and the
//! room registry. These are plain serde types with no behavior; the wire
//! adapter ([`crate::server`]) is the only thing that constructs or matches
//! on them. The `ParticipantId` sending a [`ClientEvent`] is carried out of
//! band by the adapter, not as a payload field, since the transport already
//! knows which connection an event arrived on.

use serde::{Deserialize, Serialize};

use crate::ot::Operation;
use crate::registry::{DocumentId, Member, ParticipantId};

/// Events a client may send.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "payload", rename_all = "snake_case")]
pub enum ClientEvent {
    CreateRoom {
        username: String,
        color: String,
    },
    JoinRoom {
        username: String,
        color: String,
        room_code: String,
    },
    AddEditor {
        name: String,
        language: String,
    },
    RemoveEditor {
        editor_id: DocumentId,
    },
    JoinEditor {
        editor_id: DocumentId,
    },
    LeaveEditor {
        editor_id: DocumentId,
    },
    SendOperation {
        editor_id: DocumentId,
        operation: Operation,
        base_revision: u64,
    },
    RequestSync {
        editor_id: DocumentId,
    },
    KickUser {
        target_socket_id: ParticipantId,
    },
    CloseRoom,
}

/// A document summary as sent in room snapshots (`room_created`/`room_joined`/`editor_added`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentSummary {
    pub id: DocumentId,
    pub name: String,
    pub language: String,
}

/// Events the server may push to a connection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "payload", rename_all = "snake_case")]
pub enum ServerEvent {
    RoomCreated {
        room_code: String,
        editors: Vec<DocumentSummary>,
        users: Vec<Member>,
        is_host: bool,
    },
    RoomJoined {
        room_code: String,
        editors: Vec<DocumentSummary>,
        users: Vec<Member>,
    },
    RoomError {
        message: String,
    },
    UserJoined {
        socket_id: ParticipantId,
        username: String,
        color: String,
    },
    UserLeft {
        socket_id: ParticipantId,
    },
    HostTransferred {
        new_host_id: ParticipantId,
    },
    Kicked {
        message: String,
    },
    RoomClosed {
        message: String,
    },
    EditorAdded {
        editor: DocumentSummary,
    },
    EditorRemoved {
        editor_id: DocumentId,
    },
    EditorSynced {
        editor_id: DocumentId,
        content: String,
        revision: u64,
    },
    ReceiveOperation {
        editor_id: DocumentId,
        operation: Operation,
        revision: u64,
        author_socket_id: ParticipantId,
    },
    OperationError {
        message: String,
    },
    SyncError {
        message: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ot::factories::insert;
    use pretty_assertions::assert_eq;

    #[test]
    fn client_event_send_operation_round_trips() {
        let event = ClientEvent::SendOperation {
            editor_id: 1,
            operation: insert(3, "hi"),
            base_revision: 5,
        };
        let json = serde_json::to_string(&event).unwrap();
        let parsed: ClientEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, event);
    }

    #[test]
    fn client_event_uses_snake_case_event_names() {
        let event = ClientEvent::CreateRoom {
            username: "alice".into(),
            color: "#fff".into(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event"], "create_room");
    }

    #[test]
    fn server_event_operation_error_round_trips() {
        let event = ServerEvent::OperationError {
            message: "base revision is ahead of current revision".into(),
        };
        let json = serde_json::to_string(&event).unwrap();
        let parsed: ServerEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, event);
    }
}
