use chrono::{DateTime, Utc};

use crate::common::{Chat, ChatId, Message, MessageId, UserId};

/// The closed set of transitions `ChatsState` accepts.
#[derive(Debug, Clone, PartialEq)]
pub enum ChatsAction {
    /// Replaces the summary list wholesale.
    SetChatsSummary(Vec<Chat>),
    /// Replaces the detail view wholesale; `None` closes it.
    SetSelectedChat(Option<Chat>),
    /// Appends to the detail view when it shows `chat_id`; otherwise no-op.
    AddMessage { chat_id: ChatId, message: Message },
    /// Drops the chat from the summary list only.
    DeleteChat { chat_id: ChatId },
    UpdateLastSeen {
        chat_id: ChatId,
        user_id: UserId,
        timestamp: DateTime<Utc>,
    },
    LikeMessage { message_id: MessageId, user_id: UserId },
}

/// Local view of the user's conversations.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChatsState {
    chats: Vec<Chat>,
    selected_chat: Option<Chat>,
}

impl ChatsState {
    pub fn chats(&self) -> &[Chat] {
        &self.chats
    }

    pub fn selected_chat(&self) -> Option<&Chat> {
        self.selected_chat.as_ref()
    }

    pub fn find_chat(&self, chat_id: &str) -> Option<&Chat> {
        self.chats.iter().find(|chat| chat.id == chat_id)
    }

    /// True when any loaded copy of `chat_id` already holds `message_id`.
    /// Message ids are only unique within their chat.
    pub fn has_message(&self, chat_id: &str, message_id: &str) -> bool {
        self.chats
            .iter()
            .chain(self.selected_chat.as_ref())
            .filter(|chat| chat.id == chat_id)
            .any(|chat| chat.contains_message(message_id))
    }

    pub fn apply(&mut self, action: ChatsAction) {
        match action {
            ChatsAction::SetChatsSummary(chats) => self.chats = chats,
            ChatsAction::SetSelectedChat(chat) => self.selected_chat = chat,
            ChatsAction::AddMessage { chat_id, message } => self.add_message(&chat_id, message),
            ChatsAction::DeleteChat { chat_id } => self.chats.retain(|chat| chat.id != chat_id),
            ChatsAction::UpdateLastSeen {
                chat_id,
                user_id,
                timestamp,
            } => self.update_last_seen(&chat_id, user_id, timestamp),
            ChatsAction::LikeMessage {
                message_id,
                user_id,
            } => self.like_message(&message_id, user_id),
        }
    }

    fn add_message(&mut self, chat_id: &str, message: Message) {
        match self.selected_chat.as_mut() {
            Some(selected) if selected.id == chat_id => {
                selected.messages.get_or_insert_with(Vec::new).push(message);
            }
            _ => {}
        }
    }

    fn update_last_seen(&mut self, chat_id: &str, user_id: UserId, timestamp: DateTime<Utc>) {
        for chat in self
            .chats
            .iter_mut()
            .chain(self.selected_chat.as_mut())
            .filter(|chat| chat.id == chat_id)
        {
            chat.last_seen.insert(user_id.clone(), timestamp);
        }
    }

    fn like_message(&mut self, message_id: &str, user_id: UserId) {
        let loaded = self
            .chats
            .iter_mut()
            .chain(self.selected_chat.as_mut())
            .filter_map(|chat| chat.messages.as_mut())
            .flatten()
            .filter(|message| message.id == message_id);
        for message in loaded {
            message.likes.insert(user_id.clone());
        }
    }
}
