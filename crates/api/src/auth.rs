//! Role checks in front of protected routes.

use std::sync::Arc;

use axum::extract::{Request, State};
use axum::http::HeaderMap;
use axum::http::header::AUTHORIZATION;
use axum::middleware::Next;
use axum::response::Response;
use resilience::CircuitBreaker;

use crate::authority::{Authority, Principal, Role};
use crate::error::ApiError;
use crate::state::AppState;

/// Authorizes requests through the authority, guarded by a circuit breaker.
pub struct AuthGuard {
    authority: Arc<dyn Authority>,
    breaker: Arc<CircuitBreaker>,
}

impl AuthGuard {
    pub fn new(authority: Arc<dyn Authority>, breaker: Arc<CircuitBreaker>) -> Self {
        Self { authority, breaker }
    }

    pub fn breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }

    /// Resolves the caller from the bearer token, requiring `role`.
    pub async fn authorize(&self, headers: &HeaderMap, role: Role) -> Result<Principal, ApiError> {
        let token = bearer_token(headers)
            .ok_or_else(|| ApiError::Unauthorized("missing bearer token".to_string()))?;

        let principal = self
            .breaker
            .call(|| self.authority.authorize(token, role))
            .await?;

        if principal.role != role {
            return Err(ApiError::Forbidden(format!("{role} role required")));
        }
        Ok(principal)
    }
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

async fn require(
    state: &AppState,
    role: Role,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let principal = state.auth.authorize(request.headers(), role).await?;
    tracing::debug!(username = %principal.username, %role, "request authorized");
    request.extensions_mut().insert(principal);
    Ok(next.run(request).await)
}

/// Middleware admitting only callers with the host role.
pub async fn require_host(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    require(&state, Role::Host, request, next).await
}

/// Middleware admitting only callers with the guest role.
pub async fn require_guest(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    require(&state, Role::Guest, request, next).await
}
