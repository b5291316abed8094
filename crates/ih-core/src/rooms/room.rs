//! Client state for one topic room.

use ih_protocol::{MessageReport, NewRoomMessage, RoomEvent, RoomInfo, RoomMember, RoomMessage};
use thiserror::Error;
use tracing::{debug, info, warn};

use super::store::{MessageStore, RoomChannel, StoreError, Subscription};

pub const DEFAULT_HISTORY_LIMIT: usize = 100;

#[derive(Debug, Error)]
pub enum RoomError {
    #[error("unknown room: {0}")]
    UnknownRoom(String),
    #[error("nickname is empty")]
    EmptyNickname,
    #[error("message is empty")]
    EmptyMessage,
    #[error("report reason is empty")]
    EmptyReason,
    #[error("join the room before posting")]
    NotJoined,
    #[error("only the author can delete a message")]
    NotOwner,
    /// Joined, but the history could not be loaded. The room stays usable;
    /// retry with [`ChatRoom::reload_history`].
    #[error("could not load room history: {0}")]
    History(StoreError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Membership {
    NeedsNickname,
    Joined { nickname: String },
}

/// A user's view of a room: membership, visible messages and the live feed.
///
/// Realtime events only flow while joined; dropping the room (or calling
/// [`ChatRoom::leave`]) unsubscribes.
pub struct ChatRoom<S, C> {
    store: S,
    channel: C,
    info: &'static RoomInfo,
    user_id: String,
    history_limit: usize,
    membership: Membership,
    messages: Vec<RoomMessage>,
    subscription: Option<Subscription>,
}

impl<S: MessageStore, C: RoomChannel> ChatRoom<S, C> {
    pub async fn open(
        store: S,
        channel: C,
        room_id: &str,
        user_id: impl Into<String>,
    ) -> Result<Self, RoomError> {
        Self::open_with_limit(store, channel, room_id, user_id, DEFAULT_HISTORY_LIMIT).await
    }

    pub async fn open_with_limit(
        store: S,
        channel: C,
        room_id: &str,
        user_id: impl Into<String>,
        history_limit: usize,
    ) -> Result<Self, RoomError> {
        let info =
            RoomInfo::lookup(room_id).ok_or_else(|| RoomError::UnknownRoom(room_id.to_string()))?;
        let user_id = user_id.into();

        let mut room = Self {
            store,
            channel,
            info,
            user_id,
            history_limit,
            membership: Membership::NeedsNickname,
            messages: Vec::new(),
            subscription: None,
        };

        if let Some(member) = room.store.find_member(info.id, &room.user_id).await? {
            if let Err(e) = room.enter(member.nickname).await {
                warn!(room = info.id, error = %e, "entered room without history");
            }
        }
        Ok(room)
    }

    pub fn info(&self) -> &'static RoomInfo {
        self.info
    }

    pub fn membership(&self) -> &Membership {
        &self.membership
    }

    pub fn is_joined(&self) -> bool {
        matches!(self.membership, Membership::Joined { .. })
    }

    pub fn messages(&self) -> &[RoomMessage] {
        &self.messages
    }

    pub fn join_nickname(&self) -> Option<&str> {
        match &self.membership {
            Membership::Joined { nickname } => Some(nickname),
            Membership::NeedsNickname => None,
        }
    }

    pub async fn join(&mut self, nickname: &str) -> Result<(), RoomError> {
        let nickname = nickname.trim();
        if nickname.is_empty() {
            return Err(RoomError::EmptyNickname);
        }
        if self.is_joined() {
            return Ok(());
        }

        let member = RoomMember {
            room_id: self.info.id.to_string(),
            user_id: self.user_id.clone(),
            nickname: nickname.to_string(),
        };
        self.store.join(&member).await?;
        info!(room = self.info.id, "joined room");
        self.enter(member.nickname).await
    }

    // Membership and subscription come first so nothing posted during the
    // history load is missed; `apply` drops the overlap by id.
    async fn enter(&mut self, nickname: String) -> Result<(), RoomError> {
        self.membership = Membership::Joined { nickname };
        self.subscription = Some(self.channel.subscribe(self.info.id));
        self.reload_history().await
    }

    /// Load the newest messages, keeping any live messages that arrived
    /// meanwhile.
    pub async fn reload_history(&mut self) -> Result<(), RoomError> {
        let history = self
            .store
            .recent_messages(self.info.id, self.history_limit)
            .await
            .map_err(RoomError::History)?;
        let live: Vec<RoomMessage> = std::mem::replace(&mut self.messages, history);
        for msg in live {
            self.apply(RoomEvent::Inserted(msg));
        }
        self.messages.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        debug!(room = self.info.id, count = self.messages.len(), "room history loaded");
        Ok(())
    }

    /// Post a message and show it immediately.
    pub async fn send(&mut self, text: &str) -> Result<&RoomMessage, RoomError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(RoomError::EmptyMessage);
        }
        let nickname = self.join_nickname().ok_or(RoomError::NotJoined)?.to_string();

        let new = NewRoomMessage {
            room_id: self.info.id.to_string(),
            user_id: self.user_id.clone(),
            nickname,
            message: text.to_string(),
        };
        let stored = self.store.insert_message(&new).await?;
        let id = stored.id.clone();
        self.apply(RoomEvent::Inserted(stored));
        self.messages
            .iter()
            .find(|m| m.id == id)
            .ok_or(RoomError::Store(StoreError::NotFound))
    }

    /// Fold a realtime event into the visible list.
    pub fn apply(&mut self, event: RoomEvent) {
        if event.room_id().is_some_and(|room| room != self.info.id) {
            return;
        }
        match event {
            RoomEvent::Inserted(msg) => {
                if self.messages.iter().any(|m| m.id == msg.id) {
                    debug!(id = %msg.id, "duplicate insert ignored");
                    return;
                }
                self.messages.push(msg);
            }
            RoomEvent::Deleted { id } => self.messages.retain(|m| m.id != id),
        }
    }

    /// Apply every event already queued; returns how many were applied.
    pub fn poll_events(&mut self) -> Result<usize, RoomError> {
        let mut applied = 0;
        loop {
            let event = match self.subscription.as_mut() {
                Some(sub) => sub.try_next()?,
                None => None,
            };
            match event {
                Some(event) => {
                    self.apply(event);
                    applied += 1;
                }
                None => return Ok(applied),
            }
        }
    }

    /// Wait for the next event and apply it. `None` when not subscribed or
    /// the channel has closed.
    pub async fn next_event(&mut self) -> Option<RoomEvent> {
        let event = self.subscription.as_mut()?.next().await?;
        self.apply(event.clone());
        Some(event)
    }

    /// Delete one of this user's messages. It disappears from the list when
    /// the delete event arrives.
    pub async fn delete(&mut self, message_id: &str) -> Result<(), RoomError> {
        let owned = self
            .messages
            .iter()
            .any(|m| m.id == message_id && m.user_id.as_deref() == Some(self.user_id.as_str()));
        if !owned {
            return Err(RoomError::NotOwner);
        }
        self.store.delete_message(message_id).await?;
        Ok(())
    }

    pub async fn report(&self, message_id: &str, reason: &str) -> Result<(), RoomError> {
        let reason = reason.trim();
        if reason.is_empty() {
            return Err(RoomError::EmptyReason);
        }
        let report = MessageReport {
            message_id: message_id.to_string(),
            reporter_id: self.user_id.clone(),
            reason: reason.to_string(),
        };
        self.store.report_message(&report).await?;
        info!(room = self.info.id, message_id, "message reported");
        Ok(())
    }

    pub fn leave(&mut self) {
        if let Some(sub) = self.subscription.take() {
            debug!(room = sub.room_id(), "unsubscribed");
        }
    }
}
