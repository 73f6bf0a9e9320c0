use serde::{Deserialize, Serialize};

use super::types::{ChatId, Message, MessageId, UserId};

/// Payload shared by `newMessage` and `messageReceived`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageData {
    pub chat_id: ChatId,
    pub message: Message,
}

/// Payload shared by `likeMessage` and `messageLiked`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LikeData {
    pub message_id: MessageId,
    pub user_id: UserId,
}

/// Frames a client sends to the relay.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum ClientEvent {
    #[serde(rename = "newMessage")]
    NewMessage(MessageData),
    #[serde(rename = "likeMessage")]
    LikeMessage(LikeData),
}

/// Frames the relay fans out to every connection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum ServerEvent {
    #[serde(rename = "messageReceived")]
    MessageReceived(MessageData),
    #[serde(rename = "messageLiked")]
    MessageLiked(LikeData),
}

impl From<ClientEvent> for ServerEvent {
    /// The relay's whole job: rename the event, keep the payload verbatim.
    fn from(event: ClientEvent) -> Self {
        match event {
            ClientEvent::NewMessage(data) => ServerEvent::MessageReceived(data),
            ClientEvent::LikeMessage(data) => ServerEvent::MessageLiked(data),
        }
    }
}
