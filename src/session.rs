//! Caller identity injected by the authenticating proxy.

use crate::errors::AppError;
use crate::handlers::AppState;
use async_trait::async_trait;
use axum::extract::FromRequestParts;
use axum::http::{request::Parts, HeaderMap};
use std::sync::Arc;
use uuid::Uuid;

pub const USER_ID_HEADER: &str = "x-user-id";
pub const USER_ROLE_HEADER: &str = "x-user-role";
pub const SESSION_SECRET_HEADER: &str = "x-session-secret";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Admin,
    User,
}

impl Role {
    /// `admin` (any case) is an admin; anything else, including no header, is a regular user.
    fn from_header(value: Option<&str>) -> Self {
        match value.map(str::trim) {
            Some(role) if role.eq_ignore_ascii_case("admin") => Role::Admin,
            _ => Role::User,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionUser {
    pub id: Uuid,
    pub role: Role,
}

impl SessionUser {
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    pub fn require_admin(&self) -> Result<(), AppError> {
        if self.is_admin() {
            Ok(())
        } else {
            Err(AppError::Forbidden(
                "Forbidden - Admin access required".to_string(),
            ))
        }
    }

    /// Reads the session headers. When `proxy_secret` is set, the request must
    /// carry the same value in `X-Session-Secret`.
    pub fn from_headers(headers: &HeaderMap, proxy_secret: Option<&str>) -> Result<Self, AppError> {
        if let Some(expected) = proxy_secret {
            let provided = header_str(headers, SESSION_SECRET_HEADER)
                .ok_or_else(|| AppError::Unauthorized("missing session secret".to_string()))?;

            if !constant_time_compare(provided, expected) {
                return Err(AppError::Unauthorized("invalid session secret".to_string()));
            }
        }

        let id = header_str(headers, USER_ID_HEADER)
            .ok_or_else(|| AppError::Unauthorized("missing user id".to_string()))?;
        let id = Uuid::parse_str(id.trim())
            .map_err(|_| AppError::Unauthorized(format!("invalid user id '{}'", id)))?;

        Ok(Self {
            id,
            role: Role::from_header(header_str(headers, USER_ROLE_HEADER)),
        })
    }
}

#[async_trait]
impl FromRequestParts<Arc<AppState>> for SessionUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        Self::from_headers(&parts.headers, state.config.session_proxy_secret.as_deref())
    }
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.trim().is_empty())
}

fn constant_time_compare(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }

    a.as_bytes()
        .iter()
        .zip(b.as_bytes().iter())
        .fold(0u8, |acc, (x, y)| acc | (x ^ y))
        == 0
}
