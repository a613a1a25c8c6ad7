use app_core::error::AppError;
use app_core::response::{Page, escape_html};
use axum::debug_handler;
use axum::extract::State;

use crate::domain::inout::prelude::*;
use crate::inbound::session::CurrentSession;
use crate::inbound::state::AuthState;

const LOGOUT_FORM: &str = "<form method=\"post\" action=\"/logout\"><button type=\"submit\">Logout</button></form>";

/// Capitalizes a provider name for link text, `google` -> `Google`.
fn provider_label(name: &str) -> String {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

#[debug_handler]
pub async fn home(State(state): State<AuthState>, _session: CurrentSession) -> Page {
    let links: Vec<String> = state
        .authn
        .providers()
        .iter()
        .map(|name| {
            format!(
                "<a href=\"/auth/{}\">Login with {}</a>",
                escape_html(name),
                escape_html(&provider_label(name))
            )
        })
        .collect();

    Page::new("Home", links.join("\n"))
}

#[debug_handler]
pub async fn profile(State(state): State<AuthState>, session: CurrentSession) -> Result<Page, AppError> {
    let output = state
        .profile
        .current_profile(CurrentProfileInput { session_id: session.id().clone() })
        .await?;

    let body = match output.profile {
        Some(profile) => {
            let pretty = serde_json::to_string_pretty(&profile)?;
            format!("<pre>{}</pre>\n{LOGOUT_FORM}", escape_html(&pretty))
        },
        None => "<pre></pre>".to_string(),
    };

    Ok(Page::new("Profile", body))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_label() {
        assert_eq!(provider_label("google"), "Google");
        assert_eq!(provider_label(""), "");
    }
}
