//! Seams to the managed backend used by chat rooms.

use async_trait::async_trait;
use ih_protocol::{MessageReport, NewRoomMessage, RoomEvent, RoomMember, RoomMessage};
use thiserror::Error;
use tokio::sync::mpsc::{self, error::TryRecvError};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("{message}")]
    Api { status: u16, message: String },
    #[error("not found")]
    NotFound,
    #[error("realtime channel closed")]
    Closed,
}

/// Request/response document store for room data.
#[async_trait]
pub trait MessageStore: Send + Sync {
    async fn find_member(
        &self,
        room_id: &str,
        user_id: &str,
    ) -> Result<Option<RoomMember>, StoreError>;

    async fn join(&self, member: &RoomMember) -> Result<(), StoreError>;

    /// The newest `limit` messages of a room, oldest first.
    async fn recent_messages(
        &self,
        room_id: &str,
        limit: usize,
    ) -> Result<Vec<RoomMessage>, StoreError>;

    /// Insert and return the stored row.
    async fn insert_message(&self, message: &NewRoomMessage) -> Result<RoomMessage, StoreError>;

    async fn delete_message(&self, message_id: &str) -> Result<(), StoreError>;

    async fn report_message(&self, report: &MessageReport) -> Result<(), StoreError>;
}

/// Realtime fan-out of room changes.
pub trait RoomChannel: Send + Sync {
    fn subscribe(&self, room_id: &str) -> Subscription;
}

/// Live feed of one room's events. Dropping it unsubscribes.
#[derive(Debug)]
pub struct Subscription {
    room_id: String,
    events: mpsc::UnboundedReceiver<RoomEvent>,
}

impl Subscription {
    pub fn new(room_id: impl Into<String>, events: mpsc::UnboundedReceiver<RoomEvent>) -> Self {
        Self {
            room_id: room_id.into(),
            events,
        }
    }

    pub fn room_id(&self) -> &str {
        &self.room_id
    }

    /// Next event if one is already queued.
    pub fn try_next(&mut self) -> Result<Option<RoomEvent>, StoreError> {
        match self.events.try_recv() {
            Ok(event) => Ok(Some(event)),
            Err(TryRecvError::Empty) => Ok(None),
            Err(TryRecvError::Disconnected) => Err(StoreError::Closed),
        }
    }

    /// Wait for the next event; `None` once the channel is closed.
    pub async fn next(&mut self) -> Option<RoomEvent> {
        self.events.recv().await
    }
}
