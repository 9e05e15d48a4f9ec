//! Login and registration collaborator
//!
//! The session only needs a user and a bearer token back; [`AuthApi`] keeps
//! the REST calls behind a trait so the runtime can be tested without HTTP.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub user_id: i64,
    pub username: String,
}

/// Result of a successful login or registration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthSession {
    pub user: User,
    pub token: String,
}

#[derive(Clone, Serialize)]
pub struct Credentials {
    pub email: String,
    pub password: String,
}

impl Credentials {
    pub fn new(email: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            password: password.into(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("email", &self.email)
            .field("password", &"<redacted>")
            .finish()
    }
}

#[derive(Clone, Serialize)]
pub struct Registration {
    pub username: String,
    pub email: String,
    pub password: String,
}

impl fmt::Debug for Registration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registration")
            .field("username", &self.username)
            .field("email", &self.email)
            .field("password", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    #[error("Invalid email or password")]
    InvalidCredentials,
    #[error("{0}")]
    Rejected(String),
    #[error("Auth request failed: {0}")]
    Network(String),
    #[error("Auth server returned HTTP {status}: {body}")]
    Http { status: u16, body: String },
    #[error("Unexpected auth response: {0}")]
    Decode(String),
}

#[async_trait]
pub trait AuthApi: Send + Sync {
    async fn login(&self, credentials: &Credentials) -> Result<AuthSession, AuthError>;
    async fn register(&self, registration: &Registration) -> Result<AuthSession, AuthError>;
}

/// Wire shape shared by login and register
#[derive(Debug, Deserialize)]
struct UserResponse {
    user_id: i64,
    username: String,
    access_token: String,
}

impl From<UserResponse> for AuthSession {
    fn from(resp: UserResponse) -> Self {
        AuthSession {
            user: User {
                user_id: resp.user_id,
                username: resp.username,
            },
            token: resp.access_token,
        }
    }
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    detail: serde_json::Value,
}

/// HTTP implementation against the planner's `/api/v1/auth` routes
#[derive(Debug, Clone)]
pub struct HttpAuthApi {
    client: Client,
    base_url: String,
}

impl HttpAuthApi {
    pub fn new(base_url: impl Into<String>) -> Result<Self, AuthError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| AuthError::Network(e.to_string()))?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    async fn post<B: Serialize + Sync>(&self, route: &str, body: &B) -> Result<AuthSession, AuthError> {
        let url = format!("{}/api/v1/auth/{route}", self.base_url);
        tracing::debug!(%url, "Auth request");

        let response = self
            .client
            .post(&url)
            .json(body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    AuthError::Network(format!("Request timeout: {e}"))
                } else {
                    AuthError::Network(e.to_string())
                }
            })?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| AuthError::Network(format!("Failed to read response: {e}")))?;

        if !status.is_success() {
            return Err(classify_error(status, &body));
        }

        let parsed: UserResponse =
            serde_json::from_str(&body).map_err(|e| AuthError::Decode(e.to_string()))?;
        Ok(parsed.into())
    }
}

#[async_trait]
impl AuthApi for HttpAuthApi {
    async fn login(&self, credentials: &Credentials) -> Result<AuthSession, AuthError> {
        self.post("login", credentials).await
    }

    async fn register(&self, registration: &Registration) -> Result<AuthSession, AuthError> {
        self.post("register", registration).await
    }
}

fn classify_error(status: StatusCode, body: &str) -> AuthError {
    match status.as_u16() {
        401 => AuthError::InvalidCredentials,
        400 | 409 | 422 => AuthError::Rejected(detail(body)),
        code => AuthError::Http {
            status: code,
            body: body.to_string(),
        },
    }
}

/// Human-readable `detail` from an error body, falling back to the raw text
fn detail(body: &str) -> String {
    match serde_json::from_str::<ErrorBody>(body) {
        Ok(ErrorBody {
            detail: serde_json::Value::String(s),
        }) => s,
        Ok(ErrorBody { detail }) => detail.to_string(),
        Err(_) => body.to_string(),
    }
}
