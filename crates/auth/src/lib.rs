mod domain;
mod inbound;
mod outbound;
mod usecase;

use std::sync::Arc;

use app_core::config::Config;
use app_core::oauth::OAuthManager;
use bb8_redis::RedisConnectionManager;
use bb8_redis::bb8::Pool;
pub use inbound::router::create_router;
pub use inbound::session::SessionSettings;
pub use inbound::state::{AuthState, CallbackRoute};
use tower_cookies::Key;

use crate::outbound::session::{SessionMemory, SessionRedis, SessionRepository};
use crate::usecase::authn::AuthnService;
use crate::usecase::profile::ProfileService;

/// Where session records live.
pub enum SessionStore {
    /// In-process cache, lost on restart.
    Memory { max_capacity: u64 },
    Redis(Pool<RedisConnectionManager>),
}

pub struct Dependency {
    pub config: Arc<Config>,
    pub oauth: OAuthManager,
    pub store: SessionStore,
    pub cookie_key: Key,
    pub session: SessionSettings,
    pub callback_routes: Vec<CallbackRoute>,
}

pub fn new(dep: Dependency) -> AuthState {
    let session: Arc<dyn SessionRepository> = match dep.store {
        SessionStore::Memory { max_capacity } => Arc::new(SessionMemory::new(max_capacity)),
        SessionStore::Redis(pool) => Arc::new(SessionRedis::new(pool)),
    };

    let authn_svc = Arc::new(AuthnService::new(dep.oauth, session.clone(), dep.session.ttl_secs));
    let profile_svc = Arc::new(ProfileService::new(session));

    AuthState::new(dep.cookie_key, dep.config, dep.session, authn_svc, profile_svc)
        .with_callback_routes(dep.callback_routes)
}
