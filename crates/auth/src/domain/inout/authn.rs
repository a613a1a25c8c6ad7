use validator::Validate;

use crate::domain::entity::flow::PendingAuthorization;
use crate::domain::entity::profile::UserProfile;
use crate::domain::entity::session::SessionId;

// ╔════════════════════════════╗
// ║   Initiate Authorization   ║
// ╚════════════════════════════╝

#[derive(Debug, Validate)]
pub struct InitiateInput {
    #[validate(length(min = 1, message = "provider cannot be empty"))]
    pub provider: String,
}

#[derive(Debug)]
pub struct InitiateOutput {
    pub auth_url: String,
    pub pending: PendingAuthorization,
}

// ╔════════════════════════════╗
// ║   Authorization Callback   ║
// ╚════════════════════════════╝

#[derive(Debug, Validate)]
pub struct CallbackInput {
    pub session_id: SessionId,

    #[validate(length(min = 1, message = "provider cannot be empty"))]
    pub provider: String,

    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
    pub error_description: Option<String>,

    /// Recovered from the pending-authorization cookie, if it survived.
    pub pending: Option<PendingAuthorization>,
}

#[derive(Debug)]
pub struct CallbackOutput {
    /// Fresh id the profile was stored under; the old one is discarded.
    pub session_id: SessionId,
    pub profile: UserProfile,
}

// ╔════════════════════════════╗
// ║          Logout            ║
// ╚════════════════════════════╝

#[derive(Debug)]
pub struct LogoutInput {
    pub session_id: SessionId,
}
