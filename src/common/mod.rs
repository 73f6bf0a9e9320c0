pub mod commands;
pub mod events;
pub mod types;

pub use commands::EngineCommand;
pub use events::{ClientEvent, LikeData, MessageData, ServerEvent};
pub use types::{Chat, ChatId, Message, MessageId, NewMessage, UserId};
