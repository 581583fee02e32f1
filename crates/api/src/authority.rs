//! Authorization service client.

use async_trait::async_trait;
use resilience::{Classify, FailureClass};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Role a caller must hold for an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Host,
    Guest,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Host => "host",
            Role::Guest => "guest",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An authenticated caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    pub username: String,
    pub role: Role,
}

/// Errors returned by an [`Authority`].
#[derive(Debug, Error)]
pub enum AuthorityError {
    /// The token is missing, expired or invalid.
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// The caller lacks the required role.
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// The authority answered with an unexpected status.
    #[error("Authority returned status {status}")]
    Status { status: u16 },

    /// The authority could not be reached.
    #[error("Authority transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// The authority answered with a body that could not be decoded.
    #[error("Invalid authority response: {0}")]
    InvalidResponse(String),
}

impl Classify for AuthorityError {
    fn classify(&self) -> FailureClass {
        match self {
            AuthorityError::Unauthorized(_) | AuthorityError::Forbidden(_) => {
                FailureClass::ClientRejection
            }
            AuthorityError::Status { status } if (400..500).contains(status) => {
                FailureClass::ClientRejection
            }
            AuthorityError::Status { .. }
            | AuthorityError::Transport(_)
            | AuthorityError::InvalidResponse(_) => FailureClass::ServerFailure,
        }
    }
}

/// Decides whether a bearer token grants a role.
#[async_trait]
pub trait Authority: Send + Sync {
    async fn authorize(&self, token: &str, role: Role) -> Result<Principal, AuthorityError>;
}

#[derive(Serialize)]
struct AuthorizeRequest {
    role: Role,
}

/// [`Authority`] backed by the user service over HTTP.
///
/// Calls `POST {base_url}/api/users/authorize` with the caller's bearer token.
#[derive(Debug, Clone)]
pub struct HttpAuthority {
    client: reqwest::Client,
    base_url: String,
}

impl HttpAuthority {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_client(reqwest::Client::new(), base_url)
    }

    pub fn with_client(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    fn authorize_url(&self) -> String {
        format!("{}/api/users/authorize", self.base_url)
    }
}

#[async_trait]
impl Authority for HttpAuthority {
    #[tracing::instrument(skip(self, token))]
    async fn authorize(&self, token: &str, role: Role) -> Result<Principal, AuthorityError> {
        let response = self
            .client
            .post(self.authorize_url())
            .bearer_auth(token)
            .json(&AuthorizeRequest { role })
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            return response
                .json::<Principal>()
                .await
                .map_err(|e| AuthorityError::InvalidResponse(e.to_string()));
        }

        let detail = response.text().await.unwrap_or_default();
        match status.as_u16() {
            401 => Err(AuthorityError::Unauthorized(detail)),
            403 => Err(AuthorityError::Forbidden(detail)),
            code => {
                tracing::debug!(status = code, "authority refused request");
                Err(AuthorityError::Status { status: code })
            }
        }
    }
}
