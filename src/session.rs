//! Caller identity as asserted by the upstream authentication provider.

use axum::{async_trait, extract::FromRequestParts, http::request::Parts};
use uuid::Uuid;

use crate::error::{Result, StorefrontError};

pub const USER_ID_HEADER: &str = "x-user-id";
pub const USER_EMAIL_HEADER: &str = "x-user-email";
pub const USER_ROLE_HEADER: &str = "x-user-role";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Session {
    pub user_id: Uuid,
    pub email: Option<String>,
    pub is_admin: bool,
}

impl Session {
    pub fn shopper(user_id: Uuid) -> Self { Self { user_id, email: None, is_admin: false } }
    pub fn admin(user_id: Uuid) -> Self { Self { user_id, email: None, is_admin: true } }
}

/// Unwraps an optional session, failing before any storage call when absent.
pub fn require(session: Option<&Session>) -> Result<&Session> {
    session.ok_or(StorefrontError::AuthenticationRequired)
}

pub fn require_admin(session: Option<&Session>) -> Result<&Session> {
    let s = require(session)?;
    if s.is_admin { Ok(s) } else { Err(StorefrontError::Forbidden) }
}

fn header<'a>(parts: &'a Parts, name: &str) -> Option<&'a str> {
    parts.headers.get(name).and_then(|v| v.to_str().ok()).map(str::trim).filter(|v| !v.is_empty())
}

/// Extractor for routes that accept anonymous callers; services decide what needs a session.
#[derive(Clone, Debug, Default)]
pub struct MaybeSession(pub Option<Session>);

impl MaybeSession {
    pub fn get(&self) -> Option<&Session> { self.0.as_ref() }
}

#[async_trait]
impl<S: Send + Sync> FromRequestParts<S> for MaybeSession {
    type Rejection = StorefrontError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self> {
        let Some(raw) = header(parts, USER_ID_HEADER) else { return Ok(Self(None)) };
        let user_id = Uuid::parse_str(raw).map_err(|_| StorefrontError::AuthenticationRequired)?;
        let is_admin = header(parts, USER_ROLE_HEADER).is_some_and(|r| r.eq_ignore_ascii_case("admin"));
        Ok(Self(Some(Session { user_id, email: header(parts, USER_EMAIL_HEADER).map(str::to_string), is_admin })))
    }
}
