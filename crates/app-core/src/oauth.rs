//! OAuth 2.0 Authorization Code flow against a third-party identity provider.
//!
//! A provider builds the authorization redirect (optionally hardened with an
//! anti-forgery `state` and a PKCE challenge), exchanges the returned code for
//! an access token and fetches the user's identity from the userinfo
//! endpoint. Providers are registered in an [`OAuthManager`] that is built at
//! startup and handed to whoever needs it.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use oauth2::basic::BasicClient;
use oauth2::{
    AuthUrl, AuthorizationCode, ClientId, ClientSecret, CsrfToken, EndpointNotSet, EndpointSet, PkceCodeChallenge,
    PkceCodeVerifier, RedirectUrl, Scope, TokenResponse, TokenUrl,
};
use reqwest::{Client, ClientBuilder, redirect};
use serde::Deserialize;
use thiserror::Error;

pub const GOOGLE_AUTH_URL: &str = "https://accounts.google.com/o/oauth2/v2/auth";
pub const GOOGLE_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
pub const GOOGLE_USERINFO_URL: &str = "https://www.googleapis.com/oauth2/v3/userinfo";

const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Error)]
pub enum OAuthError {
    #[error("Invalid URL format: {0}")]
    InvalidUrl(#[from] oauth2::url::ParseError),

    #[error("Invalid provider configuration: {0}")]
    InvalidConfig(String),

    #[error("HTTP client error: {0}")]
    HttpClient(#[from] reqwest::Error),

    #[error("OAuth token exchange failed: {0}")]
    TokenExchange(String),

    #[error("Failed to parse user profile response")]
    ProfileParse,

    #[error("Provider not found: {0}")]
    ProviderNotFound(String),
}

/// Everything the caller must remember between the redirect and the callback.
#[derive(Debug, Clone)]
pub struct AuthorizationRequest {
    pub url: String,
    pub csrf_token: Option<String>,
    pub pkce_verifier: Option<String>,
}

/// Identity returned by the provider, already reduced to the fields this
/// application keeps.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OAuthUserProfile {
    pub provider_user_id: String,
    pub display_name: Option<String>,
    pub given_name: Option<String>,
    pub family_name: Option<String>,
    pub email: Option<String>,
    pub email_verified: bool,
    pub avatar_url: Option<String>,
}

#[async_trait::async_trait]
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
pub trait OAuthProvider: Send + Sync {
    /// Builds the provider redirect and the transient state to verify later.
    fn authorization_request(&self) -> AuthorizationRequest;

    /// Whether callbacks must carry the `state` issued by
    /// [`OAuthProvider::authorization_request`].
    fn requires_state(&self) -> bool;

    /// Exchanges an authorization code for an access token.
    async fn exchange_code(&self, code: String, pkce_verifier: Option<String>) -> Result<String, OAuthError>;

    /// Fetches the user's identity with an access token.
    async fn fetch_profile(&self, access_token: &str) -> Result<OAuthUserProfile, OAuthError>;
}

#[derive(Debug, Clone)]
pub struct ProviderConfig {
    pub client_id: String,
    pub client_secret: String,
    pub redirect_uri: String,
    pub auth_url: String,
    pub token_url: String,
    pub userinfo_url: String,
    pub scopes: Vec<String>,
    pub use_state: bool,
    pub use_pkce: bool,
    pub http_timeout: Duration,
}

impl ProviderConfig {
    /// Google endpoints with the `profile` and `email` scopes, hardened.
    pub fn google(client_id: String, client_secret: String, redirect_uri: String) -> Self {
        Self {
            client_id,
            client_secret,
            redirect_uri,
            auth_url: GOOGLE_AUTH_URL.to_string(),
            token_url: GOOGLE_TOKEN_URL.to_string(),
            userinfo_url: GOOGLE_USERINFO_URL.to_string(),
            scopes: vec!["profile".to_string(), "email".to_string()],
            use_state: true,
            use_pkce: true,
            http_timeout: DEFAULT_HTTP_TIMEOUT,
        }
    }
}

type ConfiguredClient = BasicClient<EndpointSet, EndpointNotSet, EndpointNotSet, EndpointNotSet, EndpointSet>;

/// Google's OAuth 2.0 endpoints speak the standard Authorization Code flow
/// plus an OpenID userinfo endpoint. Endpoint URLs are configurable so the
/// same adapter can be pointed at a test double.
#[derive(Debug)]
pub struct GoogleOAuthProvider {
    client: ConfiguredClient,
    http: Client,
    userinfo_url: String,
    scopes: Vec<Scope>,
    use_state: bool,
    use_pkce: bool,
}

impl GoogleOAuthProvider {
    pub fn new(config: ProviderConfig) -> Result<Self, OAuthError> {
        let scopes: Vec<Scope> = config
            .scopes
            .iter()
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
            .map(|s| Scope::new(s.to_string()))
            .collect();

        if scopes.is_empty() {
            return Err(OAuthError::InvalidConfig("at least one scope is required".to_string()));
        }

        oauth2::url::Url::parse(&config.userinfo_url)?;

        let client = BasicClient::new(ClientId::new(config.client_id))
            .set_client_secret(ClientSecret::new(config.client_secret))
            .set_auth_uri(AuthUrl::new(config.auth_url)?)
            .set_token_uri(TokenUrl::new(config.token_url)?)
            .set_redirect_uri(RedirectUrl::new(config.redirect_uri)?);

        // The token endpoint must never bounce us elsewhere, and a slow
        // provider must not hold a request forever.
        let http = ClientBuilder::new()
            .redirect(redirect::Policy::none())
            .timeout(config.http_timeout)
            .build()?;

        Ok(Self {
            client,
            http,
            userinfo_url: config.userinfo_url,
            scopes,
            use_state: config.use_state,
            use_pkce: config.use_pkce,
        })
    }
}

#[async_trait::async_trait]
impl OAuthProvider for GoogleOAuthProvider {
    fn authorization_request(&self) -> AuthorizationRequest {
        let mut request = self.client.authorize_url(CsrfToken::new_random).add_scopes(self.scopes.clone());

        let mut pkce_verifier = None;
        if self.use_pkce {
            let (challenge, verifier) = PkceCodeChallenge::new_random_sha256();
            request = request.set_pkce_challenge(challenge);
            pkce_verifier = Some(verifier.secret().to_string());
        }

        let (mut url, csrf_token) = request.url();

        let csrf_token = if self.use_state {
            Some(csrf_token.secret().to_string())
        } else {
            // oauth2 always emits `state`; drop it for the unhardened flow.
            let pairs: Vec<(String, String)> = url
                .query_pairs()
                .filter(|(k, _)| k != "state")
                .map(|(k, v)| (k.into_owned(), v.into_owned()))
                .collect();
            url.query_pairs_mut().clear().extend_pairs(pairs);
            None
        };

        tracing::debug!(
            auth_url = %url.origin().ascii_serialization(),
            state = csrf_token.is_some(),
            pkce = pkce_verifier.is_some(),
            "Generated authorization URL"
        );

        AuthorizationRequest { url: url.to_string(), csrf_token, pkce_verifier }
    }

    fn requires_state(&self) -> bool {
        self.use_state
    }

    async fn exchange_code(&self, code: String, pkce_verifier: Option<String>) -> Result<String, OAuthError> {
        let mut request = self.client.exchange_code(AuthorizationCode::new(code));
        if let Some(secret) = pkce_verifier {
            request = request.set_pkce_verifier(PkceCodeVerifier::new(secret));
        }

        let token_result = request.request_async(&self.http).await.map_err(|e| {
            let error_msg = match &e {
                oauth2::RequestTokenError::ServerResponse(err) => {
                    format!("Server response error: {} {:?}", err.error(), err.error_description())
                },
                oauth2::RequestTokenError::Parse(_, body) => match std::str::from_utf8(body) {
                    Ok(body_str) => format!("Parse error. Response body: {}", body_str),
                    Err(_) => "Parse error with non-UTF8 response".to_string(),
                },
                oauth2::RequestTokenError::Request(err) => format!("Request error: {}", err),
                oauth2::RequestTokenError::Other(msg) => format!("Token exchange error: {}", msg),
            };
            tracing::error!("OAuth token exchange failed: {}", error_msg);
            OAuthError::TokenExchange(error_msg)
        })?;

        Ok(token_result.access_token().secret().to_string())
    }

    async fn fetch_profile(&self, access_token: &str) -> Result<OAuthUserProfile, OAuthError> {
        #[derive(Deserialize)]
        struct GoogleProfile {
            sub: String,
            name: Option<String>,
            given_name: Option<String>,
            family_name: Option<String>,
            email: Option<String>,
            #[serde(default)]
            email_verified: bool,
            picture: Option<String>,
        }

        let response = self
            .http
            .get(&self.userinfo_url)
            .bearer_auth(access_token)
            .send()
            .await?
            .error_for_status()?;

        let profile: GoogleProfile = response.json().await.map_err(|e| {
            tracing::error!("Failed to decode userinfo response: {}", e);
            OAuthError::ProfileParse
        })?;

        Ok(OAuthUserProfile {
            provider_user_id: profile.sub,
            display_name: profile.name,
            given_name: profile.given_name,
            family_name: profile.family_name,
            email: profile.email,
            email_verified: profile.email_verified,
            avatar_url: profile.picture,
        })
    }
}

#[derive(Clone, Default)]
pub struct OAuthManager {
    providers: HashMap<String, Arc<dyn OAuthProvider>>,
}

impl OAuthManager {
    pub fn new() -> Self {
        Self { providers: HashMap::new() }
    }

    pub fn add_provider(&mut self, name: &str, provider: Arc<dyn OAuthProvider>) {
        self.providers.insert(name.to_string(), provider);
    }

    pub fn get_provider(&self, name: &str) -> Result<&Arc<dyn OAuthProvider>, OAuthError> {
        self.providers
            .get(name)
            .ok_or_else(|| OAuthError::ProviderNotFound(name.to_string()))
    }

    pub fn has_provider(&self, name: &str) -> bool {
        self.providers.contains_key(name)
    }

    /// Registered provider names in a stable order.
    pub fn provider_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.providers.keys().cloned().collect();
        names.sort();
        names
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use wiremock::matchers::{body_string_contains, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    fn test_config(base_url: &str) -> ProviderConfig {
        ProviderConfig {
            auth_url: format!("{base_url}/o/oauth2/v2/auth"),
            token_url: format!("{base_url}/token"),
            userinfo_url: format!("{base_url}/userinfo"),
            http_timeout: Duration::from_millis(500),
            ..ProviderConfig::google(
                "client_id".to_string(),
                "client_secret".to_string(),
                "http://localhost:3000/auth/google/callback".to_string(),
            )
        }
    }

    fn query_value(url: &str, key: &str) -> Option<String> {
        oauth2::url::Url::parse(url)
            .unwrap()
            .query_pairs()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.into_owned())
    }

    #[test]
    fn test_oauth_manager() {
        let mut manager = OAuthManager::new();
        manager.add_provider("test", Arc::new(MockOAuthProvider::new()));
        manager.add_provider("another", Arc::new(MockOAuthProvider::new()));

        assert!(manager.has_provider("test"));
        assert!(manager.get_provider("test").is_ok());
        assert!(matches!(manager.get_provider("nonexistent"), Err(OAuthError::ProviderNotFound(_))));
        assert_eq!(manager.provider_names(), vec!["another".to_string(), "test".to_string()]);
    }

    #[test]
    fn test_google_oauth_provider_invalid_redirect_url() {
        let provider = GoogleOAuthProvider::new(ProviderConfig::google(
            "client_id".to_string(),
            "client_secret".to_string(),
            "invalid_url".to_string(),
        ));

        assert!(matches!(provider.unwrap_err(), OAuthError::InvalidUrl(_)));
    }

    #[test]
    fn test_google_oauth_provider_requires_scopes() {
        let config = ProviderConfig { scopes: vec![" ".to_string()], ..test_config("http://localhost:9") };

        assert!(matches!(GoogleOAuthProvider::new(config).unwrap_err(), OAuthError::InvalidConfig(_)));
    }

    #[test]
    fn test_authorization_request_hardened() {
        let provider = GoogleOAuthProvider::new(ProviderConfig::google(
            "client_id".to_string(),
            "client_secret".to_string(),
            "http://localhost:3000/auth/google/callback".to_string(),
        ))
        .unwrap();

        let request = provider.authorization_request();

        assert!(request.url.starts_with(GOOGLE_AUTH_URL));
        assert_eq!(query_value(&request.url, "response_type").as_deref(), Some("code"));
        assert_eq!(query_value(&request.url, "client_id").as_deref(), Some("client_id"));
        assert_eq!(query_value(&request.url, "scope").as_deref(), Some("profile email"));
        assert_eq!(
            query_value(&request.url, "redirect_uri").as_deref(),
            Some("http://localhost:3000/auth/google/callback")
        );
        assert_eq!(query_value(&request.url, "code_challenge_method").as_deref(), Some("S256"));
        assert_eq!(query_value(&request.url, "state"), request.csrf_token);
        assert!(request.csrf_token.is_some());
        assert!(request.pkce_verifier.is_some());
        assert!(provider.requires_state());
    }

    #[test]
    fn test_authorization_request_unhardened() {
        let config = ProviderConfig { use_state: false, use_pkce: false, ..test_config("http://localhost:9") };
        let provider = GoogleOAuthProvider::new(config).unwrap();

        let request = provider.authorization_request();

        assert!(query_value(&request.url, "state").is_none());
        assert!(query_value(&request.url, "code_challenge").is_none());
        assert_eq!(query_value(&request.url, "scope").as_deref(), Some("profile email"));
        assert!(request.csrf_token.is_none());
        assert!(request.pkce_verifier.is_none());
        assert!(!provider.requires_state());
    }

    #[tokio::test]
    async fn test_exchange_code_success() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .and(body_string_contains("grant_type=authorization_code"))
            .and(body_string_contains("code=test_code"))
            .and(body_string_contains("code_verifier=test_verifier"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": "mock_access_token",
                "token_type": "Bearer",
                "expires_in": 3599,
                "scope": "profile email"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let provider = GoogleOAuthProvider::new(test_config(&server.uri())).unwrap();
        let token = provider
            .exchange_code("test_code".to_string(), Some("test_verifier".to_string()))
            .await
            .unwrap();

        assert_eq!(token, "mock_access_token");
    }

    #[tokio::test]
    async fn test_exchange_code_rejected() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .respond_with(ResponseTemplate::new(400).set_body_json(serde_json::json!({
                "error": "invalid_grant",
                "error_description": "Bad Request"
            })))
            .mount(&server)
            .await;

        let provider = GoogleOAuthProvider::new(test_config(&server.uri())).unwrap();
        let result = provider.exchange_code("expired_code".to_string(), None).await;

        assert!(matches!(result, Err(OAuthError::TokenExchange(msg)) if msg.contains("invalid_grant")));
    }

    #[tokio::test]
    async fn test_exchange_code_timeout() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_delay(Duration::from_secs(3))
                    .set_body_json(serde_json::json!({"access_token": "late", "token_type": "Bearer"})),
            )
            .mount(&server)
            .await;

        let provider = GoogleOAuthProvider::new(test_config(&server.uri())).unwrap();
        let result = provider.exchange_code("slow_code".to_string(), None).await;

        assert!(matches!(result, Err(OAuthError::TokenExchange(_))));
    }

    #[tokio::test]
    async fn test_fetch_profile_success() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/userinfo"))
            .and(header("authorization", "Bearer mock_token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "sub": "123456",
                "name": "Test User",
                "given_name": "Test",
                "family_name": "User",
                "picture": "https://example.com/avatar.jpg",
                "email": "test@example.com",
                "email_verified": true,
                "locale": "en",
                "hd": "example.com"
            })))
            .mount(&server)
            .await;

        let provider = GoogleOAuthProvider::new(test_config(&server.uri())).unwrap();
        let profile = provider.fetch_profile("mock_token").await.unwrap();

        assert_eq!(profile.provider_user_id, "123456");
        assert_eq!(profile.display_name.as_deref(), Some("Test User"));
        assert_eq!(profile.given_name.as_deref(), Some("Test"));
        assert_eq!(profile.family_name.as_deref(), Some("User"));
        assert_eq!(profile.email.as_deref(), Some("test@example.com"));
        assert!(profile.email_verified);
        assert_eq!(profile.avatar_url.as_deref(), Some("https://example.com/avatar.jpg"));
    }

    #[tokio::test]
    async fn test_fetch_profile_failures() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/userinfo"))
            .and(header("authorization", "Bearer garbage"))
            .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/userinfo"))
            .and(header("authorization", "Bearer revoked"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let provider = GoogleOAuthProvider::new(test_config(&server.uri())).unwrap();

        assert!(matches!(provider.fetch_profile("garbage").await, Err(OAuthError::ProfileParse)));
        assert!(matches!(provider.fetch_profile("revoked").await, Err(OAuthError::HttpClient(_))));
    }
}
