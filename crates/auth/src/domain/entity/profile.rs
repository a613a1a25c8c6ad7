use app_core::error::AppError;
use app_core::oauth::OAuthUserProfile;
use serde::{Deserialize, Serialize};

/// The identity kept in a session once a user has signed in.
///
/// Only these fields survive the callback; everything else the provider
/// returned is discarded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    /// Name of the provider that vouched for this identity, e.g. `"google"`.
    pub provider: String,
    /// Provider-assigned, stable user id (`sub` for OpenID providers).
    pub id: String,
    pub display_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub given_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub family_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default)]
    pub email_verified: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<String>,
}

impl UserProfile {
    /// Projects provider data, falling back to the email and then the id when
    /// the provider sent no usable display name.
    pub fn from_provider(provider: &str, data: OAuthUserProfile) -> Self {
        let display_name = data
            .display_name
            .filter(|n| !n.trim().is_empty())
            .or_else(|| data.email.clone())
            .unwrap_or_else(|| data.provider_user_id.clone());

        Self {
            provider: provider.to_string(),
            id: data.provider_user_id,
            display_name,
            given_name: data.given_name,
            family_name: data.family_name,
            email: data.email,
            email_verified: data.email_verified,
            avatar_url: data.avatar_url,
        }
    }
}

/// Encodes a profile for storage in a session record.
pub fn serialize_for_session(profile: &UserProfile) -> Result<String, AppError> {
    Ok(serde_json::to_string(profile)?)
}

/// Inverse of [`serialize_for_session`].
pub fn deserialize_from_session(token: &str) -> Result<UserProfile, AppError> {
    Ok(serde_json::from_str(token)?)
}
