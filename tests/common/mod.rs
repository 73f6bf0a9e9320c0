#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chat_sync::ChatsEngine;
use chat_sync::common::types::{PayloadError, decode_chat_list};
use chat_sync::common::{Chat, Message, NewMessage, UserId};
use chat_sync::identity::IdentityProvider;
use chat_sync::network::{GatewayError, PushChannel, RemoteStore};
use chat_sync::storage::MemorySession;
use chrono::Utc;
use reqwest::StatusCode;

pub const DEBOUNCE: Duration = Duration::from_millis(500);

type CallHook = Box<dyn Fn(&str) + Send + Sync>;

/// In-memory chat store that records every call it serves.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<StoreInner>,
    on_call: Mutex<Option<CallHook>>,
}

#[derive(Default)]
struct StoreInner {
    chats: Vec<Chat>,
    next_chat: u64,
    next_message: u64,
    failing: bool,
    malformed_summary: bool,
    calls: Vec<String>,
}

impl MemoryStore {
    pub fn with_chats(chats: Vec<Chat>) -> Self {
        let store = Self::default();
        store.inner.lock().unwrap().chats = chats;
        store
    }

    pub fn fail_requests(&self, failing: bool) {
        self.inner.lock().unwrap().failing = failing;
    }

    pub fn return_malformed_summary(&self) {
        self.inner.lock().unwrap().malformed_summary = true;
    }

    pub fn calls(&self) -> Vec<String> {
        self.inner.lock().unwrap().calls.clone()
    }

    pub fn count_calls(&self, name: &str) -> usize {
        self.calls().iter().filter(|call| call.as_str() == name).count()
    }

    pub fn chat(&self, chat_id: &str) -> Option<Chat> {
        let inner = self.inner.lock().unwrap();
        inner.chats.iter().find(|chat| chat.id == chat_id).cloned()
    }

    /// Runs `hook` with the call name before each request is served, i.e.
    /// while the caller is awaiting the response.
    pub fn on_call(&self, hook: impl Fn(&str) + Send + Sync + 'static) {
        *self.on_call.lock().unwrap() = Some(Box::new(hook));
    }

    fn begin(&self, call: &str) -> Result<std::sync::MutexGuard<'_, StoreInner>, GatewayError> {
        if let Some(hook) = self.on_call.lock().unwrap().as_ref() {
            hook(call);
        }
        let mut inner = self.inner.lock().unwrap();
        inner.calls.push(call.to_string());
        if inner.failing {
            return Err(GatewayError::Status {
                status: StatusCode::INTERNAL_SERVER_ERROR,
                reason: "store unavailable".to_string(),
            });
        }
        Ok(inner)
    }
}

fn not_found(chat_id: &str) -> GatewayError {
    GatewayError::Status {
        status: StatusCode::NOT_FOUND,
        reason: format!("chat {chat_id} not found"),
    }
}

#[async_trait]
impl RemoteStore for MemoryStore {
    async fn list_summaries(&self, _token: &str) -> Result<Vec<Chat>, GatewayError> {
        let inner = self.begin("summary")?;
        if inner.malformed_summary {
            let err: PayloadError = decode_chat_list(serde_json::json!({ "chats": [] }))
                .expect_err("objects are not chat lists");
            return Err(err.into());
        }
        Ok(inner
            .chats
            .iter()
            .cloned()
            .map(|mut chat| {
                chat.messages = None;
                chat
            })
            .collect())
    }

    async fn get_chat(&self, _token: &str, chat_id: &str) -> Result<Chat, GatewayError> {
        let inner = self.begin("get")?;
        inner
            .chats
            .iter()
            .find(|chat| chat.id == chat_id)
            .cloned()
            .ok_or_else(|| not_found(chat_id))
    }

    async fn create_chat(&self, _token: &str, members: &[UserId]) -> Result<Chat, GatewayError> {
        let mut inner = self.begin("create")?;
        if let Some(chat) = inner.chats.iter().find(|chat| chat.has_members(members)) {
            return Ok(chat.clone());
        }
        inner.next_chat += 1;
        let chat = Chat {
            id: format!("new{}", inner.next_chat),
            members: members.to_vec(),
            messages: Some(Vec::new()),
            last_seen: HashMap::new(),
        };
        inner.chats.push(chat.clone());
        Ok(chat)
    }

    async fn delete_chat(&self, _token: &str, chat_id: &str) -> Result<(), GatewayError> {
        let mut inner = self.begin("delete")?;
        let before = inner.chats.len();
        inner.chats.retain(|chat| chat.id != chat_id);
        if inner.chats.len() == before {
            return Err(not_found(chat_id));
        }
        Ok(())
    }

    async fn update_last_seen(
        &self,
        _token: &str,
        chat_id: &str,
        user_id: &str,
    ) -> Result<(), GatewayError> {
        let mut inner = self.begin("last_seen")?;
        let chat = inner
            .chats
            .iter_mut()
            .find(|chat| chat.id == chat_id)
            .ok_or_else(|| not_found(chat_id))?;
        chat.last_seen.insert(user_id.to_string(), Utc::now());
        Ok(())
    }

    async fn add_message(
        &self,
        _token: &str,
        message: &NewMessage,
    ) -> Result<Message, GatewayError> {
        let mut inner = self.begin("add_message")?;
        inner.next_message += 1;
        let stored = Message {
            id: format!("m{}", inner.next_message),
            chat_id: message.chat_id.clone(),
            author_id: message.user_id.clone(),
            content: message.content.clone(),
            created_at: Utc::now(),
            likes: Default::default(),
        };
        let chat = inner
            .chats
            .iter_mut()
            .find(|chat| chat.id == message.chat_id)
            .ok_or_else(|| not_found(&message.chat_id))?;
        chat.messages.get_or_insert_with(Vec::new).push(stored.clone());
        Ok(stored)
    }
}

/// Identity whose validity can be flipped mid-test.
pub struct FixedIdentity {
    user: UserId,
    valid: AtomicBool,
}

impl FixedIdentity {
    pub fn new(user: &str) -> Self {
        Self {
            user: user.to_string(),
            valid: AtomicBool::new(true),
        }
    }

    pub fn set_valid(&self, valid: bool) {
        self.valid.store(valid, Ordering::SeqCst);
    }
}

impl IdentityProvider for FixedIdentity {
    fn current_user(&self) -> Option<UserId> {
        self.valid
            .load(Ordering::SeqCst)
            .then(|| self.user.clone())
    }

    fn is_token_valid(&self, _token: &str) -> bool {
        self.valid.load(Ordering::SeqCst)
    }
}

pub fn chat(id: &str, members: &[&str]) -> Chat {
    Chat {
        id: id.to_string(),
        members: members.iter().map(|m| m.to_string()).collect(),
        messages: Some(Vec::new()),
        last_seen: HashMap::new(),
    }
}

pub fn members(ids: &[&str]) -> Vec<UserId> {
    ids.iter().map(|id| id.to_string()).collect()
}

pub fn message_ids(chat: Option<&Chat>) -> Vec<String> {
    chat.and_then(|chat| chat.messages.as_ref())
        .map(|messages| messages.iter().map(|m| m.id.clone()).collect())
        .unwrap_or_default()
}

pub struct Harness {
    pub engine: ChatsEngine,
    pub store: Arc<MemoryStore>,
    pub identity: Arc<FixedIdentity>,
    pub session: Arc<MemorySession>,
}

/// An engine logged in as `user` against `store`, talking through `push`.
pub fn engine_for(user: &str, store: Arc<MemoryStore>, push: Arc<dyn PushChannel>) -> Harness {
    let identity = Arc::new(FixedIdentity::new(user));
    let session = Arc::new(MemorySession::with_token(format!("token-{user}")));
    let engine = ChatsEngine::new(
        store.clone(),
        push,
        session.clone(),
        identity.clone(),
        DEBOUNCE,
    );
    Harness {
        engine,
        store,
        identity,
        session,
    }
}
