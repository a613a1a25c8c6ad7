//! A centralized and idiomatic error handling module for the Axum web
//! application.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use serde_json::json;
use thiserror::Error;

use super::config::ConfigError;
use super::crypto::CryptoError;
use super::oauth::OAuthError;

const INTERNAL_MSG: &str = "An internal server error occurred";

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Validation failed")]
    Validation(#[from] validator::ValidationErrors),

    #[error("Invalid request format: {0}")]
    RequestFormat(String),

    #[error("Resource not found: {0}")]
    NotFound(String),

    // Authorization handshake
    #[error("Required configuration `{0}` is missing")]
    ConfigurationMissing(String),

    #[error("Authorization denied: {0}")]
    AuthorizationDenied(String),

    #[error("Authorization code exchange failed: {0}")]
    CodeExchangeFailed(String),

    #[error("Session store unavailable: {0}")]
    SessionUnavailable(String),

    // Internal Libraries
    #[error("Config operation failed")]
    Config(#[from] ConfigError),

    #[error("Crypto operation failed")]
    Crypto(#[from] CryptoError),

    #[error("OAuth operation failed")]
    OAuth(#[from] OAuthError),

    // Third Party Libraries
    #[error("Serde JSON operation failed")]
    JsonParse(#[from] serde_json::Error),

    #[error("An internal server error occurred")]
    Internal,
}

impl AppError {
    /// Errors raised while talking to the provider or validating its
    /// callback. These end the handshake with a redirect instead of an error
    /// page.
    pub fn is_handshake_failure(&self) -> bool {
        matches!(self, AppError::AuthorizationDenied(_) | AppError::CodeExchangeFailed(_))
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<serde_json::Value>,
}

fn internal() -> (StatusCode, String, Option<serde_json::Value>) {
    (StatusCode::INTERNAL_SERVER_ERROR, INTERNAL_MSG.to_string(), None)
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message, details) = match self {
            AppError::Validation(err) => {
                let details = json!(err.field_errors());
                (StatusCode::UNPROCESSABLE_ENTITY, "Validation failed".to_string(), Some(details))
            },
            AppError::RequestFormat(msg) => (StatusCode::BAD_REQUEST, msg, None),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg, None),

            AppError::ConfigurationMissing(key) => {
                tracing::error!(key = %key, "Missing configuration");
                internal()
            },
            AppError::AuthorizationDenied(reason) => {
                tracing::warn!(reason = %reason, "Authorization denied");
                (StatusCode::FORBIDDEN, "Authorization denied".to_string(), None)
            },
            AppError::CodeExchangeFailed(reason) => {
                tracing::warn!(reason = %reason, "Authorization code exchange failed");
                (StatusCode::BAD_GATEWAY, "Identity provider unavailable".to_string(), None)
            },
            AppError::SessionUnavailable(reason) => {
                tracing::error!(reason = %reason, "Session store unavailable");
                (StatusCode::SERVICE_UNAVAILABLE, "Session store unavailable".to_string(), None)
            },

            // Internal Libraries
            AppError::Config(err) => {
                tracing::error!("Config getter error: {:?}", err);
                internal()
            },
            AppError::Crypto(err) => {
                tracing::error!("Crypto error: {:?}", err);
                internal()
            },
            AppError::OAuth(err) => {
                let status = match err {
                    OAuthError::ProviderNotFound(_) => StatusCode::NOT_FOUND,
                    OAuthError::InvalidUrl(_) | OAuthError::InvalidConfig(_) => StatusCode::INTERNAL_SERVER_ERROR,
                    OAuthError::TokenExchange(_) | OAuthError::HttpClient(_) | OAuthError::ProfileParse => {
                        StatusCode::BAD_GATEWAY
                    },
                };

                let message = match err {
                    OAuthError::ProviderNotFound(_) => err.to_string(),
                    OAuthError::InvalidUrl(_) | OAuthError::InvalidConfig(_) => {
                        tracing::error!("OAuth configuration error: {:?}", err);
                        INTERNAL_MSG.to_string()
                    },
                    OAuthError::TokenExchange(_) | OAuthError::HttpClient(_) | OAuthError::ProfileParse => {
                        "OAuth provider unavailable".to_string()
                    },
                };

                (status, message, None)
            },

            // Third Party Libraries
            AppError::JsonParse(err) => {
                tracing::error!("Failed to parse JSON: {:?}", err);
                internal()
            },
            AppError::Internal => internal(),
        };

        (status, Json(ErrorResponse { message, details })).into_response()
    }
}
