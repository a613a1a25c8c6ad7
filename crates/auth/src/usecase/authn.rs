use std::sync::Arc;

use app_core::error::AppError;
use app_core::oauth::OAuthManager;
use async_trait::async_trait;
use chrono::Utc;
use validator::Validate;

use crate::domain::entity::flow::{AuthorizationStage, PendingAuthorization};
use crate::domain::entity::profile::{UserProfile, serialize_for_session};
use crate::domain::entity::session::{SessionId, SessionRecord};
use crate::domain::inout::prelude::*;
use crate::outbound::session::SessionRepository;

const MISSING_CODE_MSG: &str = "callback carried no authorization code";
const STATE_MISMATCH_MSG: &str = "state parameter does not match the pending authorization";
const STATE_MISSING_MSG: &str = "no pending authorization for this callback";

#[async_trait]
#[cfg_attr(test, mockall::automock)]
pub trait AuthnUseCase: Send + Sync {
    /// Names of the registered providers, sorted.
    fn providers(&self) -> Vec<String>;
    async fn initiate(&self, input: InitiateInput) -> Result<InitiateOutput, AppError>;
    async fn handle_callback(&self, input: CallbackInput) -> Result<CallbackOutput, AppError>;
    async fn logout(&self, input: LogoutInput) -> Result<(), AppError>;
}

#[derive(Clone)]
pub struct AuthnService {
    oauth: OAuthManager,
    session: Arc<dyn SessionRepository>,
    session_ttl_secs: u64,
}

impl AuthnService {
    pub fn new(oauth: OAuthManager, session: Arc<dyn SessionRepository>, session_ttl_secs: u64) -> Self {
        Self { oauth, session, session_ttl_secs }
    }

    /// Consumes the pending authorization and returns its PKCE verifier.
    fn verify_pending(
        requires_state: bool,
        provider: &str,
        state: Option<&str>,
        pending: Option<PendingAuthorization>,
    ) -> Result<Option<String>, AppError> {
        let pending = match pending {
            Some(pending) if pending.provider == provider => Some(pending),
            Some(pending) => {
                return Err(AppError::AuthorizationDenied(format!(
                    "pending authorization was started for `{}`",
                    pending.provider
                )));
            },
            None => None,
        };

        if requires_state {
            let expected = pending
                .as_ref()
                .and_then(|p| p.csrf_token.as_deref())
                .ok_or_else(|| AppError::AuthorizationDenied(STATE_MISSING_MSG.to_string()))?;

            if state != Some(expected) {
                return Err(AppError::AuthorizationDenied(STATE_MISMATCH_MSG.to_string()));
            }
        }

        Ok(pending.and_then(|p| p.pkce_verifier))
    }
}

#[async_trait]
impl AuthnUseCase for AuthnService {
    fn providers(&self) -> Vec<String> {
        self.oauth.provider_names()
    }

    async fn initiate(&self, input: InitiateInput) -> Result<InitiateOutput, AppError> {
        input.validate()?;

        let provider = self.oauth.get_provider(&input.provider)?;
        let request = provider.authorization_request();

        tracing::debug!(
            provider = %input.provider,
            stage = %AuthorizationStage::AwaitingProviderRedirect,
            "Redirecting to identity provider"
        );

        Ok(InitiateOutput {
            auth_url: request.url,
            pending: PendingAuthorization {
                provider: input.provider,
                csrf_token: request.csrf_token,
                pkce_verifier: request.pkce_verifier,
            },
        })
    }

    async fn handle_callback(&self, input: CallbackInput) -> Result<CallbackOutput, AppError> {
        input.validate()?;

        let provider = self.oauth.get_provider(&input.provider)?;

        if let Some(error) = input.error {
            let reason = match input.error_description {
                Some(description) => format!("{error}: {description}"),
                None => error,
            };
            return Err(AppError::AuthorizationDenied(reason));
        }

        let pkce_verifier =
            Self::verify_pending(provider.requires_state(), &input.provider, input.state.as_deref(), input.pending)?;

        let code = input
            .code
            .filter(|code| !code.is_empty())
            .ok_or_else(|| AppError::AuthorizationDenied(MISSING_CODE_MSG.to_string()))?;

        tracing::debug!(
            provider = %input.provider,
            stage = %AuthorizationStage::AwaitingCodeExchange,
            "Exchanging authorization code"
        );

        let access_token = provider
            .exchange_code(code, pkce_verifier)
            .await
            .map_err(|err| AppError::CodeExchangeFailed(err.to_string()))?;

        let provider_profile = provider
            .fetch_profile(&access_token)
            .await
            .map_err(|err| AppError::CodeExchangeFailed(err.to_string()))?;

        let profile = UserProfile::from_provider(&input.provider, provider_profile);
        let record = SessionRecord { user: Some(serialize_for_session(&profile)?), authenticated_at: Some(Utc::now()) };

        // A fresh id on every sign-in; the pre-login id may have been seen by others.
        let session_id = SessionId::generate();
        self.session.save(&session_id, &record, self.session_ttl_secs).await?;

        if let Err(err) = self.session.delete(&input.session_id).await {
            tracing::warn!(error = %err, "Failed to discard pre-login session");
        }

        tracing::info!(
            provider = %input.provider,
            user_id = %profile.id,
            stage = %AuthorizationStage::Authenticated,
            "User signed in"
        );

        Ok(CallbackOutput { session_id, profile })
    }

    async fn logout(&self, input: LogoutInput) -> Result<(), AppError> {
        self.session.delete(&input.session_id).await
    }
}
