use std::sync::Arc;

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::Utc;
use serde::Deserialize;

use crate::common::UserId;
use crate::storage::SessionStore;

/// Read-only view of who is logged in.
pub trait IdentityProvider: Send + Sync {
    fn current_user(&self) -> Option<UserId>;
    fn is_token_valid(&self, token: &str) -> bool;
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenClaims {
    pub user_id: UserId,
    /// Expiry, seconds since the epoch.
    pub exp: i64,
}

#[derive(Debug, thiserror::Error)]
pub enum TokenError {
    #[error("token is not a three-part JWT")]
    Shape,
    #[error("invalid base64 token payload: {0}")]
    InvalidBase64(#[from] base64::DecodeError),
    #[error("invalid token claims: {0}")]
    InvalidJson(#[from] serde_json::Error),
}

/// Decodes the claims segment of a JWT. The signature is the server's concern.
pub fn decode_claims(token: &str) -> Result<TokenClaims, TokenError> {
    let mut parts = token.split('.');
    let (Some(_header), Some(payload), Some(_signature), None) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        return Err(TokenError::Shape);
    };
    let bytes = URL_SAFE_NO_PAD.decode(payload.trim_end_matches('='))?;
    Ok(serde_json::from_slice(&bytes)?)
}

/// Identity derived from the claims of the stored session token.
pub struct TokenIdentity {
    session: Arc<dyn SessionStore>,
}

impl TokenIdentity {
    pub fn new(session: Arc<dyn SessionStore>) -> Self {
        Self { session }
    }
}

impl IdentityProvider for TokenIdentity {
    fn current_user(&self) -> Option<UserId> {
        let token = self.session.token()?;
        match decode_claims(&token) {
            Ok(claims) if claims.exp > Utc::now().timestamp() => Some(claims.user_id),
            Ok(_) => None,
            Err(err) => {
                log::debug!("Stored token is unreadable: {err}");
                None
            }
        }
    }

    fn is_token_valid(&self, token: &str) -> bool {
        decode_claims(token).is_ok_and(|claims| claims.exp > Utc::now().timestamp())
    }
}
