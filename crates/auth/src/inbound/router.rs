use app_core::error::AppError;
use app_core::extractors::AppQuery;
use axum::Router;
use axum::extract::State;
use axum::routing::{get, post};

use crate::inbound::http::authn::*;
use crate::inbound::http::page::*;
use crate::inbound::model::prelude::*;
use crate::inbound::session::CurrentSession;
use crate::inbound::state::AuthState;

pub fn create_router(state: AuthState) -> Router {
    let mut router = Router::new()
        // pages
        .route("/", get(home))
        .route("/profile", get(profile))
        // authentication scope
        .route("/auth/{provider}", get(oauth_login))
        .route("/auth/{provider}/callback", get(oauth_callback))
        .route("/logout", post(logout));

    // Providers whose registered redirect URI is not `/auth/{provider}/callback`.
    for route in &state.callback_routes {
        let provider = route.provider.clone();
        router = router.route(
            &route.path,
            get(
                move |State(state): State<AuthState>,
                      session: CurrentSession,
                      query: Result<AppQuery<OAuthCallbackRequest>, AppError>| async move {
                    complete_callback(state, session, provider, query.map(|AppQuery(query)| query)).await
                },
            ),
        );
    }

    router.with_state(state)
}
