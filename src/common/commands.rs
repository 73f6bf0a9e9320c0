use tokio::sync::oneshot;

use super::types::{Chat, ChatId, Message, MessageId, UserId};

/// Requests a front end sends to a running `ChatsEngine`.
///
/// Replies are optional; a dropped receiver is not an error.
#[derive(Debug)]
pub enum EngineCommand {
    /// Schedules a debounced summary refresh.
    RefreshSummary,
    FetchChat {
        chat_id: ChatId,
        reply: Option<oneshot::Sender<Option<Chat>>>,
    },
    GetOrCreateChat {
        members: Vec<UserId>,
        reply: Option<oneshot::Sender<Option<Chat>>>,
    },
    SendMessage {
        chat_id: ChatId,
        content: String,
        reply: Option<oneshot::Sender<Option<Message>>>,
    },
    LikeMessage {
        message_id: MessageId,
    },
    DeleteChat {
        chat_id: ChatId,
        reply: Option<oneshot::Sender<bool>>,
    },
    SetLastSeen {
        chat_id: ChatId,
    },
}
