//! ih-protocol: Shared types for the Ihumure client.
//!
//! This crate defines the records exchanged between the assistant session,
//! the chat-completion backend, and the chat-room store.

pub mod conversation;
pub mod message;
pub mod room;

pub use conversation::{ChatRequest, ConversationTurn, Role};
pub use message::DeltaEvent;
pub use room::{
    MessageReport, NewRoomMessage, RoomEvent, RoomInfo, RoomMember, RoomMessage, ROOM_CATALOG,
};
