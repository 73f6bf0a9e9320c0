//! Client-side chat synchronization: a local view of a user's chats kept in
//! step with a remote store and with peers through a push relay.

pub mod common;
pub mod config;
pub mod identity;
pub mod network;
pub mod storage;
pub mod sync;

pub use sync::{ChatsAction, ChatsEngine, ChatsState};
