//! Peer-support topic rooms.

pub mod memory;
pub mod rest;
pub mod room;
pub mod store;

pub use memory::MemoryBackend;
pub use rest::RestStore;
pub use room::{ChatRoom, Membership, RoomError, DEFAULT_HISTORY_LIMIT};
pub use store::{MessageStore, RoomChannel, StoreError, Subscription};
