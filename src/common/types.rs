use std::collections::{BTreeSet, HashMap, HashSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub type ChatId = String;
pub type MessageId = String;
pub type UserId = String;

/// A conversation among a fixed member set.
///
/// `messages` is `None` in summaries that were sent without message detail.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Chat {
    #[serde(rename = "_id", alias = "id")]
    pub id: ChatId,
    pub members: Vec<UserId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub messages: Option<Vec<Message>>,
    /// Sparse: a member without an entry has never seen the chat.
    #[serde(default)]
    pub last_seen: HashMap<UserId, DateTime<Utc>>,
}

impl Chat {
    /// True when `members` names exactly the same people as this chat,
    /// regardless of order. Lengths must match too, so a list with repeats
    /// never matches.
    pub fn has_members(&self, members: &[UserId]) -> bool {
        self.members.len() == members.len() && member_set(&self.members) == member_set(members)
    }

    pub fn contains_message(&self, message_id: &str) -> bool {
        self.messages
            .as_ref()
            .is_some_and(|messages| messages.iter().any(|message| message.id == message_id))
    }

    pub fn unseen_count(&self, user_id: &str) -> usize {
        let Some(messages) = self.messages.as_ref() else {
            return 0;
        };
        let seen_at = self.last_seen.get(user_id);
        messages
            .iter()
            .filter(|message| message.author_id != user_id)
            .filter(|message| seen_at.is_none_or(|seen| message.created_at > *seen))
            .count()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    #[serde(rename = "_id", alias = "id")]
    pub id: MessageId,
    pub chat_id: ChatId,
    #[serde(rename = "userId", alias = "authorId")]
    pub author_id: UserId,
    pub content: String,
    pub created_at: DateTime<Utc>,
    /// Liking twice has no further effect.
    #[serde(default)]
    pub likes: BTreeSet<UserId>,
}

/// Body of `POST /messages/add`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewMessage {
    pub chat_id: ChatId,
    pub content: String,
    pub user_id: UserId,
}

fn member_set(members: &[UserId]) -> HashSet<&str> {
    members.iter().map(String::as_str).collect()
}

/// Decodes a chat list payload, refusing anything that is not a JSON array.
pub fn decode_chat_list(payload: Value) -> Result<Vec<Chat>, PayloadError> {
    if !payload.is_array() {
        return Err(PayloadError::NotASequence(json_kind(&payload)));
    }
    serde_json::from_value(payload).map_err(PayloadError::Invalid)
}

#[derive(Debug, thiserror::Error)]
pub enum PayloadError {
    #[error("expected a sequence of chats, got {0}")]
    NotASequence(&'static str),
    #[error("invalid chat payload: {0}")]
    Invalid(#[from] serde_json::Error),
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
