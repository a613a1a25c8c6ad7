//! Cookie side of a browser session.
//!
//! The session id travels in a signed cookie so clients cannot pick their own
//! id. The short-lived pending authorization (state and PKCE verifier) travels
//! in an encrypted cookie, so nothing is written to the session store until
//! the handshake succeeds.

use app_core::error::AppError;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use tower_cookies::cookie::{SameSite, time};
use tower_cookies::{Cookie, Cookies, Key};

use crate::domain::entity::flow::PendingAuthorization;
use crate::domain::entity::session::SessionId;
use crate::inbound::state::AuthState;

pub const COOKIE_OAUTH_STATE: &str = "__oauth_state";
const PENDING_MAX_AGE_MINUTES: i64 = 5;

#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub cookie_name: String,
    pub secure: bool,
    pub ttl_secs: u64,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self { cookie_name: "sid".to_string(), secure: false, ttl_secs: 86_400 }
    }
}

/// The caller's session. Visitors without a valid cookie get a fresh id and
/// a cookie on the response.
pub struct CurrentSession {
    id: SessionId,
    cookies: Cookies,
    key: Key,
    settings: SessionSettings,
}

impl CurrentSession {
    pub fn id(&self) -> &SessionId {
        &self.id
    }

    /// Moves the browser to `id`.
    pub fn rotate(&mut self, id: SessionId) {
        self.id = id;
        self.write_id_cookie();
    }

    pub fn stash_pending(&self, pending: &PendingAuthorization) -> Result<(), AppError> {
        let value = serde_json::to_string(pending)?;

        let cookie = Cookie::build((COOKIE_OAUTH_STATE, value))
            .http_only(true)
            .secure(self.settings.secure)
            .path("/")
            .max_age(time::Duration::minutes(PENDING_MAX_AGE_MINUTES))
            .same_site(SameSite::Lax)
            .build();

        self.cookies.private(&self.key).add(cookie);
        Ok(())
    }

    /// Returns the pending authorization and clears it; it is good for one
    /// callback only.
    pub fn take_pending(&self) -> Option<PendingAuthorization> {
        let private = self.cookies.private(&self.key);
        let cookie = private.get(COOKIE_OAUTH_STATE)?;
        private.remove(Cookie::build((COOKIE_OAUTH_STATE, "")).path("/").build());

        match serde_json::from_str(cookie.value()) {
            Ok(pending) => Some(pending),
            Err(err) => {
                tracing::warn!(error = %err, "Ignoring malformed pending authorization cookie");
                None
            },
        }
    }

    fn write_id_cookie(&self) {
        let max_age = i64::try_from(self.settings.ttl_secs).unwrap_or(i64::MAX);

        let cookie = Cookie::build((self.settings.cookie_name.clone(), self.id.to_string()))
            .http_only(true)
            .secure(self.settings.secure)
            .path("/")
            .max_age(time::Duration::seconds(max_age))
            .same_site(SameSite::Lax)
            .build();

        self.cookies.signed(&self.key).add(cookie);
    }
}

impl FromRequestParts<AuthState> for CurrentSession {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AuthState) -> Result<Self, Self::Rejection> {
        let cookies = Cookies::from_request_parts(parts, state).await.map_err(|(_, msg)| {
            tracing::error!("Cookie layer unavailable: {msg}");
            AppError::Internal
        })?;

        let existing = cookies
            .signed(&state.cookie_key)
            .get(&state.session.cookie_name)
            .and_then(|cookie| SessionId::parse(cookie.value()));

        let session = CurrentSession {
            id: existing.clone().unwrap_or_else(SessionId::generate),
            cookies,
            key: state.cookie_key.clone(),
            settings: state.session.clone(),
        };

        if existing.is_none() {
            session.write_id_cookie();
        }

        Ok(session)
    }
}
