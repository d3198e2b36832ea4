use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use sha2::{Digest, Sha256};

use crate::gateway::session::Identity;
use crate::state::AppState;

/// The caller of a REST endpoint, resolved from `Authorization: Bearer`.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user_id: String,
    pub display_name: String,
    /// The raw bearer token, kept so logout can revoke it.
    pub token: String,
}

impl AuthUser {
    pub fn identity(&self) -> Identity {
        Identity {
            user_id: self.user_id.clone(),
            display_name: self.display_name.clone(),
        }
    }
}

fn hash_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Rejection type for when auth fails.
pub struct AuthRejection;

impl IntoResponse for AuthRejection {
    fn into_response(self) -> Response {
        let body = json!({
            "error": {
                "code": "unauthorized",
                "message": "invalid or missing authentication"
            }
        });
        (StatusCode::UNAUTHORIZED, Json(body)).into_response()
    }
}

impl FromRequestParts<AppState> for AuthUser {
    type Rejection = AuthRejection;

    fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> impl std::future::Future<Output = Result<Self, Self::Rejection>> + Send {
        let auth = state.auth.clone();
        let token = parts
            .headers
            .get("Authorization")
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.strip_prefix("Bearer "))
            .map(|s| s.trim().to_string());

        async move {
            let token = token.filter(|t| !t.is_empty()).ok_or(AuthRejection)?;
            match auth.authenticate(&token).await {
                Ok(identity) => Ok(AuthUser {
                    user_id: identity.user_id,
                    display_name: identity.display_name,
                    token,
                }),
                Err(e) => {
                    tracing::debug!("bearer token rejected: {e}");
                    Err(AuthRejection)
                }
            }
        }
    }
}

/// Helper to create a token hash for token creation.
pub fn create_token_hash(token: &str) -> String {
    hash_token(token)
}

/// Generate a random opaque token string.
pub fn generate_token() -> String {
    let ts = chrono::Utc::now().timestamp_nanos_opt().unwrap_or_default();
    let random: u128 = rand::random();
    format!("{ts:x}.{random:x}")
}
