use std::sync::Arc;

use app_core::error::AppError;
use async_trait::async_trait;

use crate::domain::entity::flow::AuthorizationStage;
use crate::domain::entity::profile::deserialize_from_session;
use crate::domain::inout::prelude::*;
use crate::outbound::session::SessionRepository;

#[async_trait]
#[cfg_attr(test, mockall::automock)]
pub trait ProfileUseCase: Send + Sync {
    async fn current_profile(&self, input: CurrentProfileInput) -> Result<CurrentProfileOutput, AppError>;
}

#[derive(Clone)]
pub struct ProfileService {
    session: Arc<dyn SessionRepository>,
}

impl ProfileService {
    pub fn new(session: Arc<dyn SessionRepository>) -> Self {
        Self { session }
    }
}

#[async_trait]
impl ProfileUseCase for ProfileService {
    async fn current_profile(&self, input: CurrentProfileInput) -> Result<CurrentProfileOutput, AppError> {
        let user = self.session.load(&input.session_id).await?.and_then(|record| record.user);

        let Some(user) = user else {
            tracing::debug!(stage = %AuthorizationStage::Unauthenticated, "Anonymous session");
            return Ok(CurrentProfileOutput { profile: None });
        };

        // A record we cannot read is treated as signed out rather than an error page.
        let profile = match deserialize_from_session(&user) {
            Ok(profile) => Some(profile),
            Err(err) => {
                tracing::warn!(error = %err, "Discarding unreadable session profile");
                None
            },
        };

        Ok(CurrentProfileOutput { profile })
    }
}
