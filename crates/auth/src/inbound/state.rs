use std::sync::Arc;

use app_core::config::Config;
use tower_cookies::Key;

use crate::inbound::session::SessionSettings;
use crate::usecase::authn::AuthnUseCase;
use crate::usecase::profile::ProfileUseCase;

/// A callback path that does not follow `/auth/{provider}/callback`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallbackRoute {
    pub path: String,
    pub provider: String,
}

#[derive(Clone)]
pub struct AuthState {
    pub cookie_key: Key,
    pub config: Arc<Config>,
    pub session: SessionSettings,
    pub callback_routes: Vec<CallbackRoute>,
    pub authn: Arc<dyn AuthnUseCase>,
    pub profile: Arc<dyn ProfileUseCase>,
}

impl AuthState {
    pub fn new(
        cookie_key: Key,
        config: Arc<Config>,
        session: SessionSettings,
        authn: Arc<dyn AuthnUseCase>,
        profile: Arc<dyn ProfileUseCase>,
    ) -> Self {
        Self { cookie_key, config, session, callback_routes: Vec::new(), authn, profile }
    }

    pub fn with_callback_routes(mut self, routes: Vec<CallbackRoute>) -> Self {
        self.callback_routes = routes;
        self
    }

    /// Reads a redirect target, falling back when the key is absent.
    pub fn redirect_target(&self, key: &str, fallback: &str) -> String {
        self.config.get_or(key, fallback.to_string()).unwrap_or_else(|err| {
            tracing::warn!(key, error = %err, "Unreadable redirect target, using default");
            fallback.to_string()
        })
    }
}
