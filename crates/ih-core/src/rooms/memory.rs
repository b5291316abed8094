//! In-process store and realtime hub.
//!
//! Backs the room client in tests and offline use. Every insert and delete
//! is published to the room's subscribers, as the hosted realtime service
//! does for database changes.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::Utc;
use ih_protocol::{MessageReport, NewRoomMessage, RoomEvent, RoomMember, RoomMessage};
use tokio::sync::mpsc;
use tracing::debug;
use uuid::Uuid;

use super::store::{MessageStore, RoomChannel, StoreError, Subscription};

#[derive(Debug, Default)]
struct MemoryState {
    members: Vec<RoomMember>,
    messages: Vec<RoomMessage>,
    reports: Vec<MessageReport>,
    subscribers: HashMap<String, Vec<mpsc::UnboundedSender<RoomEvent>>>,
}

impl MemoryState {
    fn publish(&mut self, room_id: &str, event: RoomEvent) {
        if let Some(senders) = self.subscribers.get_mut(room_id) {
            senders.retain(|tx| tx.send(event.clone()).is_ok());
            debug!(room_id, subscribers = senders.len(), "published room event");
        }
    }
}

/// Shared in-memory backend; clones see the same data.
#[derive(Debug, Clone, Default)]
pub struct MemoryBackend {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> Result<MutexGuard<'_, MemoryState>, StoreError> {
        self.state.lock().map_err(|_| StoreError::Api {
            status: 500,
            message: "memory store poisoned".to_string(),
        })
    }

    /// Reports filed so far.
    pub fn reports(&self) -> Vec<MessageReport> {
        self.state().map(|s| s.reports.clone()).unwrap_or_default()
    }

    /// Live subscriber count for a room.
    pub fn subscriber_count(&self, room_id: &str) -> usize {
        self.state()
            .map(|s| {
                s.subscribers
                    .get(room_id)
                    .map(|senders| senders.iter().filter(|tx| !tx.is_closed()).count())
                    .unwrap_or(0)
            })
            .unwrap_or(0)
    }
}

#[async_trait]
impl MessageStore for MemoryBackend {
    async fn find_member(
        &self,
        room_id: &str,
        user_id: &str,
    ) -> Result<Option<RoomMember>, StoreError> {
        let state = self.state()?;
        Ok(state
            .members
            .iter()
            .find(|m| m.room_id == room_id && m.user_id == user_id)
            .cloned())
    }

    async fn join(&self, member: &RoomMember) -> Result<(), StoreError> {
        let mut state = self.state()?;
        let exists = state
            .members
            .iter()
            .any(|m| m.room_id == member.room_id && m.user_id == member.user_id);
        if exists {
            return Err(StoreError::Api {
                status: 409,
                message: "already a member of this room".to_string(),
            });
        }
        state.members.push(member.clone());
        Ok(())
    }

    async fn recent_messages(
        &self,
        room_id: &str,
        limit: usize,
    ) -> Result<Vec<RoomMessage>, StoreError> {
        let state = self.state()?;
        let mut messages: Vec<RoomMessage> = state
            .messages
            .iter()
            .filter(|m| m.room_id == room_id)
            .cloned()
            .collect();
        messages.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        let skip = messages.len().saturating_sub(limit);
        Ok(messages.split_off(skip))
    }

    async fn insert_message(&self, message: &NewRoomMessage) -> Result<RoomMessage, StoreError> {
        let stored = RoomMessage {
            id: Uuid::new_v4().to_string(),
            room_id: message.room_id.clone(),
            user_id: Some(message.user_id.clone()),
            nickname: message.nickname.clone(),
            message: message.message.clone(),
            created_at: Utc::now(),
        };

        let mut state = self.state()?;
        state.messages.push(stored.clone());
        state.publish(&stored.room_id, RoomEvent::Inserted(stored.clone()));
        Ok(stored)
    }

    async fn delete_message(&self, message_id: &str) -> Result<(), StoreError> {
        let mut state = self.state()?;
        let pos = state
            .messages
            .iter()
            .position(|m| m.id == message_id)
            .ok_or(StoreError::NotFound)?;
        let removed = state.messages.remove(pos);
        state.publish(
            &removed.room_id,
            RoomEvent::Deleted {
                id: removed.id.clone(),
            },
        );
        Ok(())
    }

    async fn report_message(&self, report: &MessageReport) -> Result<(), StoreError> {
        let mut state = self.state()?;
        if !state.messages.iter().any(|m| m.id == report.message_id) {
            return Err(StoreError::NotFound);
        }
        state.reports.push(report.clone());
        Ok(())
    }
}

impl RoomChannel for MemoryBackend {
    fn subscribe(&self, room_id: &str) -> Subscription {
        let (tx, rx) = mpsc::unbounded_channel();
        if let Ok(mut state) = self.state.lock() {
            state
                .subscribers
                .entry(room_id.to_string())
                .or_default()
                .push(tx);
        }
        Subscription::new(room_id, rx)
    }
}
