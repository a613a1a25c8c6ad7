use crate::domain::entity::profile::UserProfile;
use crate::domain::entity::session::SessionId;

// ╔════════════════════════════╗
// ║      Current Profile       ║
// ╚════════════════════════════╝

#[derive(Debug)]
pub struct CurrentProfileInput {
    pub session_id: SessionId,
}

#[derive(Debug)]
pub struct CurrentProfileOutput {
    /// `None` for anonymous sessions.
    pub profile: Option<UserProfile>,
}
