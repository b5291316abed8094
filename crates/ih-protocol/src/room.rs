//! Chat-room records and the topic room catalog.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A message posted in a topic room, as stored by the backend.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RoomMessage {
    pub id: String,
    pub room_id: String,
    /// `None` once the author's account has been removed.
    pub user_id: Option<String>,
    pub nickname: String,
    pub message: String,
    pub created_at: DateTime<Utc>,
}

/// Insert payload for a new room message. The store assigns `id` and
/// `created_at`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NewRoomMessage {
    pub room_id: String,
    pub user_id: String,
    pub nickname: String,
    pub message: String,
}

/// Membership of a user in a room, under a per-room nickname.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RoomMember {
    pub room_id: String,
    pub user_id: String,
    pub nickname: String,
}

/// A moderation report against a message.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MessageReport {
    pub message_id: String,
    pub reporter_id: String,
    pub reason: String,
}

/// Realtime notification delivered on a room channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoomEvent {
    Inserted(RoomMessage),
    Deleted { id: String },
}

impl RoomEvent {
    /// Room the event belongs to, when the payload carries it.
    pub fn room_id(&self) -> Option<&str> {
        match self {
            RoomEvent::Inserted(msg) => Some(&msg.room_id),
            RoomEvent::Deleted { .. } => None,
        }
    }
}

/// A topic room from the fixed catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoomInfo {
    pub id: &'static str,
    pub name: &'static str,
}

impl RoomInfo {
    pub fn lookup(id: &str) -> Option<&'static RoomInfo> {
        ROOM_CATALOG.iter().find(|room| room.id == id)
    }
}

pub const ROOM_CATALOG: &[RoomInfo] = &[
    RoomInfo { id: "anxiety", name: "Anxiety Support" },
    RoomInfo { id: "depression", name: "Depression Support" },
    RoomInfo { id: "ptsd", name: "PTSD & Trauma" },
    RoomInfo { id: "bipolar", name: "Bipolar Support" },
    RoomInfo { id: "ocd", name: "OCD Support" },
    RoomInfo { id: "stress", name: "Stress & Overwhelm" },
    RoomInfo { id: "eating", name: "Eating Disorders" },
    RoomInfo { id: "addiction", name: "Addiction Recovery" },
    RoomInfo { id: "grief", name: "Grief & Loss" },
    RoomInfo { id: "burnout", name: "Burnout Recovery" },
    RoomInfo { id: "adhd", name: "ADHD Support" },
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn catalog_lookup() {
        assert_eq!(ROOM_CATALOG.len(), 11);
        assert_eq!(RoomInfo::lookup("ptsd").unwrap().name, "PTSD & Trauma");
        assert!(RoomInfo::lookup("lobby").is_none());
    }

    #[test]
    fn room_message_accepts_backend_timestamps() {
        let json = r#"{
            "id": "7d1c",
            "room_id": "anxiety",
            "user_id": null,
            "nickname": "river",
            "message": "hi all",
            "created_at": "2024-03-01T09:30:00.123456+00:00"
        }"#;
        let msg: RoomMessage = serde_json::from_str(json).unwrap();
        assert_eq!(msg.user_id, None);
        assert_eq!(msg.created_at.to_rfc3339(), "2024-03-01T09:30:00.123456+00:00");
    }

    #[test]
    fn event_room_id() {
        let deleted = RoomEvent::Deleted { id: "m1".to_string() };
        assert_eq!(deleted.room_id(), None);
    }
}
