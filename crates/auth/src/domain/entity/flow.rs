use std::fmt;

use serde::{Deserialize, Serialize};

/// Steps of the Authorization Code handshake. The handshake spans two
/// requests, so the stage is never stored; it labels log lines and outcomes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthorizationStage {
    Unauthenticated,
    AwaitingProviderRedirect,
    AwaitingCodeExchange,
    Authenticated,
    Failed,
}

impl fmt::Display for AuthorizationStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            AuthorizationStage::Unauthenticated => "unauthenticated",
            AuthorizationStage::AwaitingProviderRedirect => "awaiting_provider_redirect",
            AuthorizationStage::AwaitingCodeExchange => "awaiting_code_exchange",
            AuthorizationStage::Authenticated => "authenticated",
            AuthorizationStage::Failed => "failed",
        };
        f.write_str(label)
    }
}

/// What the browser carries between the redirect and the callback, inside a
/// short-lived encrypted cookie.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingAuthorization {
    pub provider: String,
    #[serde(default)]
    pub csrf_token: Option<String>,
    #[serde(default)]
    pub pkce_verifier: Option<String>,
}
