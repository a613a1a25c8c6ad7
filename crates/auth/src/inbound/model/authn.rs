use serde::Deserialize;

// ╔════════════════════════════╗
// ║   Authorization Callback   ║
// ╚════════════════════════════╝

/// Query string the provider appends when redirecting back. Either `code`
/// or `error` is present; unknown parameters such as `scope` are ignored.
#[derive(Debug, Deserialize)]
pub struct OAuthCallbackRequest {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
    pub error_description: Option<String>,
}
