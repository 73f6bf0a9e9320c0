use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{mpsc, oneshot, watch};

use crate::common::{
    Chat, ClientEvent, EngineCommand, LikeData, Message, MessageData, NewMessage, ServerEvent,
    UserId,
};
use crate::identity::IdentityProvider;
use crate::network::{PushChannel, RemoteStore, Subscription};
use crate::storage::SessionStore;

use super::debounce::Debouncer;
use super::state::{ChatsAction, ChatsState};

/// Owns the local chat state and keeps it in step with the remote store and
/// the relay.
///
/// All mutation goes through [`ChatsEngine::dispatch`]. Operations never
/// return errors: failures are logged and leave the state as it was.
pub struct ChatsEngine {
    state: ChatsState,
    gateway: Arc<dyn RemoteStore>,
    push: Arc<dyn PushChannel>,
    session: Arc<dyn SessionStore>,
    identity: Arc<dyn IdentityProvider>,
    subscription: Option<Subscription>,
    refresh: Debouncer,
    snapshots: watch::Sender<ChatsState>,
}

impl ChatsEngine {
    pub fn new(
        gateway: Arc<dyn RemoteStore>,
        push: Arc<dyn PushChannel>,
        session: Arc<dyn SessionStore>,
        identity: Arc<dyn IdentityProvider>,
        refresh_delay: Duration,
    ) -> Self {
        let (snapshots, _) = watch::channel(ChatsState::default());
        Self {
            state: ChatsState::default(),
            gateway,
            push,
            session,
            identity,
            subscription: None,
            refresh: Debouncer::new(refresh_delay),
            snapshots,
        }
    }

    pub fn state(&self) -> &ChatsState {
        &self.state
    }

    pub fn chats(&self) -> &[Chat] {
        self.state.chats()
    }

    pub fn selected_chat(&self) -> Option<&Chat> {
        self.state.selected_chat()
    }

    /// Snapshot published after every transition.
    pub fn watch(&self) -> watch::Receiver<ChatsState> {
        self.snapshots.subscribe()
    }

    pub fn dispatch(&mut self, action: ChatsAction) {
        self.state.apply(action);
        self.snapshots.send_replace(self.state.clone());
    }

    fn valid_token(&self) -> Option<String> {
        self.session
            .token()
            .filter(|token| self.identity.is_token_valid(token))
    }

    /// True while the session still holds `token` and it is still valid.
    fn session_unchanged(&self, token: &str) -> bool {
        self.valid_token().is_some_and(|current| current == token)
    }

    // ---- lifecycle ----

    /// Registers the push handler and schedules a summary refresh.
    /// Mounting twice keeps a single handler.
    pub fn mount(&mut self) {
        if self.subscription.is_none() {
            self.subscription = Some(self.push.subscribe());
            log::info!("Chat engine mounted");
        }
        self.request_summary_refresh();
    }

    /// Deregisters the push handler and drops any pending refresh.
    pub fn unmount(&mut self) {
        if self.subscription.take().is_some() {
            log::info!("Chat engine unmounted");
        }
        self.refresh.cancel();
    }

    pub fn is_mounted(&self) -> bool {
        self.subscription.is_some()
    }

    // ---- summary refresh ----

    /// Debounced `fetch_chats_summary`; ignored without a valid session.
    pub fn request_summary_refresh(&mut self) {
        if self.valid_token().is_some() {
            self.refresh.trigger();
        }
    }

    pub fn refresh_pending(&self) -> bool {
        self.refresh.is_pending()
    }

    /// Waits out the debounce window, then refreshes once.
    pub async fn process_pending_refresh(&mut self) {
        self.refresh.fired().await;
        self.fetch_chats_summary().await;
    }

    pub async fn fetch_chats_summary(&mut self) {
        let Some(token) = self.valid_token() else {
            log::debug!("No valid session; skipping chat summary refresh");
            return;
        };

        match self.gateway.list_summaries(&token).await {
            Ok(chats) => {
                // The session may have ended while the request was in flight.
                if !self.session_unchanged(&token) {
                    log::debug!("Session ended during summary refresh; discarding result");
                    return;
                }
                self.dispatch(ChatsAction::SetChatsSummary(chats));
            }
            Err(err) => log::error!("Failed to fetch chats: {err}"),
        }
    }

    // ---- chat operations ----

    pub async fn fetch_chat_by_id(&mut self, chat_id: &str) -> Option<Chat> {
        let token = self.session.token()?;
        match self.gateway.get_chat(&token, chat_id).await {
            Ok(chat) => {
                if !self.session_unchanged(&token) {
                    log::debug!("Session ended while fetching chat {chat_id}; discarding result");
                    return None;
                }
                self.dispatch(ChatsAction::SetSelectedChat(Some(chat.clone())));
                Some(chat)
            }
            Err(err) => {
                log::error!("Failed to fetch chat {chat_id}: {err}");
                None
            }
        }
    }

    pub async fn refetch_selected_chat(&mut self, chat_id: &str) {
        self.fetch_chat_by_id(chat_id).await;
    }

    /// Selects the chat whose member set is exactly `members`, creating it
    /// remotely when no cached chat matches.
    pub async fn get_or_create_chat(&mut self, members: &[UserId]) -> Option<Chat> {
        if let Some(existing) = self
            .state
            .chats()
            .iter()
            .find(|chat| chat.has_members(members))
            .cloned()
        {
            self.dispatch(ChatsAction::SetSelectedChat(Some(existing.clone())));
            return Some(existing);
        }

        let token = self.session.token()?;
        match self.gateway.create_chat(&token, members).await {
            Ok(chat) => {
                if self.state.find_chat(&chat.id).is_none() {
                    let mut chats = self.state.chats().to_vec();
                    chats.push(chat.clone());
                    self.dispatch(ChatsAction::SetChatsSummary(chats));
                }
                self.dispatch(ChatsAction::SetSelectedChat(Some(chat.clone())));
                Some(chat)
            }
            Err(err) => {
                log::error!("Failed to fetch or create chat for {members:?}: {err}");
                None
            }
        }
    }

    /// Stores the message, then announces it on the push channel. The sender
    /// sees it when the relay echoes it back, like every other member.
    pub async fn add_message(
        &mut self,
        chat_id: &str,
        content: &str,
        author_id: &str,
    ) -> Option<Message> {
        let token = self.session.token()?;
        let new_message = NewMessage {
            chat_id: chat_id.to_string(),
            content: content.to_string(),
            user_id: author_id.to_string(),
        };

        let message = match self.gateway.add_message(&token, &new_message).await {
            Ok(message) => message,
            Err(err) => {
                log::error!("Failed to add message to {chat_id}: {err}");
                return None;
            }
        };

        let event = ClientEvent::NewMessage(MessageData {
            chat_id: chat_id.to_string(),
            message: message.clone(),
        });
        if let Err(err) = self.push.emit(event) {
            log::warn!("Message {} stored but not announced: {err}", message.id);
        }
        Some(message)
    }

    /// Announces a like by the current user.
    pub fn like_message(&mut self, message_id: &str) -> bool {
        let Some(user_id) = self.identity.current_user() else {
            return false;
        };
        let event = ClientEvent::LikeMessage(LikeData {
            message_id: message_id.to_string(),
            user_id,
        });
        match self.push.emit(event) {
            Ok(()) => true,
            Err(err) => {
                log::warn!("Failed to send like for {message_id}: {err}");
                false
            }
        }
    }

    pub async fn delete_chat(&mut self, chat_id: &str) -> bool {
        let Some(token) = self.session.token() else {
            return false;
        };
        match self.gateway.delete_chat(&token, chat_id).await {
            Ok(()) => {
                self.dispatch(ChatsAction::DeleteChat {
                    chat_id: chat_id.to_string(),
                });
                true
            }
            Err(err) => {
                log::error!("Failed to delete chat {chat_id}: {err}");
                false
            }
        }
    }

    pub async fn set_last_seen(&mut self, chat_id: &str) {
        let (Some(token), Some(user_id)) = (self.session.token(), self.identity.current_user())
        else {
            return;
        };

        if let Err(err) = self
            .gateway
            .update_last_seen(&token, chat_id, &user_id)
            .await
        {
            log::error!("Failed to update last seen for {chat_id}: {err}");
            return;
        }

        self.dispatch(ChatsAction::UpdateLastSeen {
            chat_id: chat_id.to_string(),
            user_id,
            timestamp: Utc::now(),
        });
        self.refetch_selected_chat(chat_id).await;
    }

    // ---- push events ----

    /// Next push event, or `None` once the channel has shut down.
    /// Pends forever while unmounted.
    pub async fn next_event(&mut self) -> Option<ServerEvent> {
        next_push_event(&mut self.subscription).await
    }

    /// Merges a relayed event. A message already loaded in any copy of its
    /// chat is dropped, which absorbs the sender's own echo.
    pub fn handle_event(&mut self, event: ServerEvent) {
        match event {
            ServerEvent::MessageReceived(MessageData { chat_id, message }) => {
                if self.state.has_message(&chat_id, &message.id) {
                    log::debug!("Discarding duplicate message {}", message.id);
                    return;
                }
                self.dispatch(ChatsAction::AddMessage { chat_id, message });
            }
            ServerEvent::MessageLiked(LikeData {
                message_id,
                user_id,
            }) => {
                self.dispatch(ChatsAction::LikeMessage {
                    message_id,
                    user_id,
                });
            }
        }
    }

    // ---- driver ----

    /// Runs the engine until `commands` closes: mounts, then serves commands,
    /// push events and refresh deadlines one at a time.
    pub async fn run(mut self, mut commands: mpsc::Receiver<EngineCommand>) {
        self.mount();

        loop {
            tokio::select! {
                command = commands.recv() => match command {
                    Some(command) => self.handle_command(command).await,
                    None => break,
                },
                event = next_push_event(&mut self.subscription) => match event {
                    Some(event) => self.handle_event(event),
                    None => {
                        log::warn!("Push channel closed; live updates stopped");
                        self.subscription = None;
                    }
                },
                _ = self.refresh.fired() => self.fetch_chats_summary().await,
            }
        }

        self.unmount();
    }

    async fn handle_command(&mut self, command: EngineCommand) {
        match command {
            EngineCommand::RefreshSummary => self.request_summary_refresh(),
            EngineCommand::FetchChat { chat_id, reply } => {
                let chat = self.fetch_chat_by_id(&chat_id).await;
                respond(reply, chat);
            }
            EngineCommand::GetOrCreateChat { members, reply } => {
                let chat = self.get_or_create_chat(&members).await;
                respond(reply, chat);
            }
            EngineCommand::SendMessage {
                chat_id,
                content,
                reply,
            } => {
                let message = match self.identity.current_user() {
                    Some(author_id) => self.add_message(&chat_id, &content, &author_id).await,
                    None => None,
                };
                respond(reply, message);
            }
            EngineCommand::LikeMessage { message_id } => {
                self.like_message(&message_id);
            }
            EngineCommand::DeleteChat { chat_id, reply } => {
                let deleted = self.delete_chat(&chat_id).await;
                respond(reply, deleted);
            }
            EngineCommand::SetLastSeen { chat_id } => self.set_last_seen(&chat_id).await,
        }
    }
}

async fn next_push_event(subscription: &mut Option<Subscription>) -> Option<ServerEvent> {
    match subscription {
        Some(subscription) => subscription.recv().await,
        None => std::future::pending().await,
    }
}

fn respond<T>(reply: Option<oneshot::Sender<T>>, value: T) {
    if let Some(reply) = reply {
        let _ = reply.send(value);
    }
}
