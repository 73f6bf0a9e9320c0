use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::{Value, json};

use crate::common::types::{PayloadError, decode_chat_list};
use crate::common::{Chat, Message, NewMessage, UserId};

#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("server answered {status}: {reason}")]
    Status { status: StatusCode, reason: String },
    #[error(transparent)]
    Malformed(#[from] PayloadError),
    #[error("could not decode response: {0}")]
    Decode(#[from] serde_json::Error),
}

/// Authoritative request/response calls against the chat store.
///
/// Every call carries the bearer token explicitly; implementations hold no
/// session state.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    async fn list_summaries(&self, token: &str) -> Result<Vec<Chat>, GatewayError>;
    async fn get_chat(&self, token: &str, chat_id: &str) -> Result<Chat, GatewayError>;
    /// Creates a chat for `members`, or returns the one that already exists.
    async fn create_chat(&self, token: &str, members: &[UserId]) -> Result<Chat, GatewayError>;
    async fn delete_chat(&self, token: &str, chat_id: &str) -> Result<(), GatewayError>;
    async fn update_last_seen(
        &self,
        token: &str,
        chat_id: &str,
        user_id: &str,
    ) -> Result<(), GatewayError>;
    async fn add_message(&self, token: &str, message: &NewMessage)
    -> Result<Message, GatewayError>;
}

/// `RemoteStore` over HTTP + JSON.
pub struct HttpGateway {
    client: Client,
    base_url: String,
}

impl HttpGateway {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_client(Client::new(), base_url)
    }

    pub fn with_client(client: Client, base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self { client, base_url }
    }

    fn request(&self, method: Method, path: &str, token: &str) -> RequestBuilder {
        self.client
            .request(method, format!("{}{}", self.base_url, path))
            .bearer_auth(token)
    }

    async fn send(&self, request: RequestBuilder) -> Result<Response, GatewayError> {
        let response = request.send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let reason = response
            .text()
            .await
            .ok()
            .filter(|body| !body.is_empty())
            .unwrap_or_else(|| status.canonical_reason().unwrap_or("").to_string());
        Err(GatewayError::Status { status, reason })
    }

    async fn send_json<T: DeserializeOwned>(
        &self,
        request: RequestBuilder,
    ) -> Result<T, GatewayError> {
        let body = self.send(request).await?.bytes().await?;
        Ok(serde_json::from_slice(&body)?)
    }
}

#[async_trait]
impl RemoteStore for HttpGateway {
    async fn list_summaries(&self, token: &str) -> Result<Vec<Chat>, GatewayError> {
        let payload: Value = self
            .send_json(self.request(Method::GET, "/chats/summary", token))
            .await?;
        Ok(decode_chat_list(payload)?)
    }

    async fn get_chat(&self, token: &str, chat_id: &str) -> Result<Chat, GatewayError> {
        let path = format!("/chats/chat/{chat_id}");
        self.send_json(self.request(Method::GET, &path, token)).await
    }

    async fn create_chat(&self, token: &str, members: &[UserId]) -> Result<Chat, GatewayError> {
        let request = self
            .request(Method::POST, "/chats/chat/add", token)
            .json(&json!({ "members": members }));
        self.send_json(request).await
    }

    async fn delete_chat(&self, token: &str, chat_id: &str) -> Result<(), GatewayError> {
        let path = format!("/chats/chat/delete/{chat_id}");
        self.send(self.request(Method::DELETE, &path, token)).await?;
        Ok(())
    }

    async fn update_last_seen(
        &self,
        token: &str,
        chat_id: &str,
        user_id: &str,
    ) -> Result<(), GatewayError> {
        let path = format!("/chats/chat/{chat_id}/lastSeen");
        let request = self
            .request(Method::PATCH, &path, token)
            .json(&json!({ "userId": user_id }));
        self.send(request).await?;
        Ok(())
    }

    async fn add_message(
        &self,
        token: &str,
        message: &NewMessage,
    ) -> Result<Message, GatewayError> {
        let request = self
            .request(Method::POST, "/messages/add", token)
            .json(message);
        self.send_json(request).await
    }
}
