use app_core::error::AppError;
use app_core::extractors::{AppPath, AppQuery};
use axum::debug_handler;
use axum::extract::State;
use axum::response::{IntoResponse, Redirect};

use crate::domain::entity::flow::AuthorizationStage;
use crate::domain::entity::session::SessionId;
use crate::domain::inout::prelude::*;
use crate::inbound::model::prelude::*;
use crate::inbound::session::CurrentSession;
use crate::inbound::state::AuthState;

const KEY_SUCCESS_REDIRECT: &str = "oauth.success_redirect";
const KEY_FAILURE_REDIRECT: &str = "oauth.failure_redirect";
const DEFAULT_SUCCESS_REDIRECT: &str = "/profile";
const DEFAULT_FAILURE_REDIRECT: &str = "/";
const HOME: &str = "/";

#[debug_handler]
pub async fn oauth_login(
    State(state): State<AuthState>,
    session: CurrentSession,
    AppPath(provider): AppPath<String>,
) -> Result<Redirect, AppError> {
    let output = state.authn.initiate(InitiateInput { provider }).await?;
    session.stash_pending(&output.pending)?;

    Ok(Redirect::to(&output.auth_url))
}

#[debug_handler]
pub async fn oauth_callback(
    State(state): State<AuthState>,
    session: CurrentSession,
    AppPath(provider): AppPath<String>,
    query: Result<AppQuery<OAuthCallbackRequest>, AppError>,
) -> impl IntoResponse {
    complete_callback(state, session, provider, query.map(|AppQuery(query)| query)).await
}

/// Finishes the handshake for `provider`. Every outcome is a redirect: the
/// profile page on success, the failure page otherwise. An unparsable query
/// counts as a denied authorization.
pub async fn complete_callback(
    state: AuthState,
    mut session: CurrentSession,
    provider: String,
    query: Result<OAuthCallbackRequest, AppError>,
) -> Redirect {
    // Consumed whatever happens next.
    let pending = session.take_pending();

    let outcome = match query {
        Ok(query) => {
            let input = CallbackInput {
                session_id: session.id().clone(),
                provider: provider.clone(),
                code: query.code,
                state: query.state,
                error: query.error,
                error_description: query.error_description,
                pending,
            };
            state.authn.handle_callback(input).await
        },
        Err(err) => Err(AppError::AuthorizationDenied(format!("malformed callback query: {err}"))),
    };

    match outcome {
        Ok(output) => {
            tracing::debug!(provider = %provider, user_id = %output.profile.id, "Rotating session cookie");
            session.rotate(output.session_id);
            Redirect::to(&state.redirect_target(KEY_SUCCESS_REDIRECT, DEFAULT_SUCCESS_REDIRECT))
        },
        Err(err) => {
            if err.is_handshake_failure() {
                tracing::warn!(provider = %provider, stage = %AuthorizationStage::Failed, error = %err, "Sign-in failed");
            } else {
                tracing::error!(provider = %provider, stage = %AuthorizationStage::Failed, error = %err, "Sign-in aborted");
            }
            Redirect::to(&state.redirect_target(KEY_FAILURE_REDIRECT, DEFAULT_FAILURE_REDIRECT))
        },
    }
}

#[debug_handler]
pub async fn logout(State(state): State<AuthState>, mut session: CurrentSession) -> Result<Redirect, AppError> {
    state.authn.logout(LogoutInput { session_id: session.id().clone() }).await?;
    session.rotate(SessionId::generate());

    Ok(Redirect::to(HOME))
}
