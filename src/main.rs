//! The binary entry point for the application.

use std::sync::Arc;
use std::time::Duration;

use app_core::config::{Config, ConfigError};
use app_core::crypto::derive_cookie_key;
use app_core::error::AppError;
use app_core::middleware::request_response_logger;
use app_core::oauth::{
    GOOGLE_AUTH_URL, GOOGLE_TOKEN_URL, GOOGLE_USERINFO_URL, GoogleOAuthProvider, OAuthManager, ProviderConfig,
};
use auth::{CallbackRoute, SessionSettings, SessionStore};
use axum::http::StatusCode;
use axum::{Json, Router, middleware};
use bb8_redis::RedisConnectionManager;
use bb8_redis::bb8::Pool;
use tokio::signal;
use tower::ServiceBuilder;
use tower_cookies::CookieManagerLayer;
use tower_http::compression::CompressionLayer;
use tower_http::cors::{Any, CorsLayer};
use tower_http::decompression::RequestDecompressionLayer;
use tower_http::timeout::TimeoutLayer;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt};

const DEFAULT_CONFIG_PATH: &str = "config/config.yaml";
const DEFAULT_SESSION_SALT: &str = "oauth-login.session";
const GOOGLE: &str = "google";

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(
            fmt::layer()
                .json()
                .with_target(true)
                .with_file(true)
                .with_line_number(true)
                .with_span_events(fmt::format::FmtSpan::CLOSE),
        )
        .init();

    if let Err(err) = run().await {
        tracing::error!(error = %err, "❌ Application failed to start");
        std::process::exit(1);
    }
}

/// Layers built-in defaults, the YAML file, `APP__*` variables and the
/// conventional plain variable names, lowest precedence first.
fn load_config(path: &str) -> Result<Config, ConfigError> {
    Config::builder()
        .default("server.address", "0.0.0.0:3000")
        .default("server.public_url", "http://localhost:3000")
        .default("server.timeout_secs", 30_i64)
        .default("session.cookie_name", "sid")
        .default("session.secure_cookie", false)
        .default("session.ttl_secs", 86_400_i64)
        .default("session.store", "memory")
        .default("session.max_entries", 10_000_i64)
        .default("redis.max_connections", 10_i64)
        .default("oauth.http_timeout_secs", 10_i64)
        .default("oauth.success_redirect", "/profile")
        .default("oauth.failure_redirect", "/")
        .default("oauth.google.callback_path", "/auth/google/callback")
        .default("oauth.google.scopes", vec!["profile", "email"])
        .default("oauth.google.auth_url", GOOGLE_AUTH_URL)
        .default("oauth.google.token_url", GOOGLE_TOKEN_URL)
        .default("oauth.google.userinfo_url", GOOGLE_USERINFO_URL)
        .default("oauth.google.use_state", true)
        .default("oauth.google.use_pkce", true)
        .file(path)
        .env_prefix("APP")
        .env_list_key("oauth.google.scopes")
        .env_alias("SESSION_SECRET", "session.secret")
        .env_alias("GOOGLE_CLIENT_ID", "oauth.google.client_id")
        .env_alias("GOOGLE_CLIENT_SECRET", "oauth.google.client_secret")
        .watch_interval(Duration::from_secs(5))
        .watch()
        .build()
}

/// Reads a value the server cannot run without.
fn required(config: &Config, key: &str) -> Result<String, AppError> {
    config.require(key).map_err(|err| match err {
        ConfigError::Missing(key) => AppError::ConfigurationMissing(key),
        other => AppError::Config(other),
    })
}

/// Extra callback route when the configured path is not the default one.
fn callback_routes(provider: &str, callback_path: &str) -> Vec<CallbackRoute> {
    if callback_path == format!("/auth/{provider}/callback") {
        Vec::new()
    } else {
        vec![CallbackRoute { path: callback_path.to_string(), provider: provider.to_string() }]
    }
}

fn google_provider(config: &Config) -> Result<(GoogleOAuthProvider, String), Box<dyn std::error::Error>> {
    let client_id = required(config, "oauth.google.client_id")?;
    let client_secret = required(config, "oauth.google.client_secret")?;

    let callback_path = config.get::<String>("oauth.google.callback_path")?;
    if !callback_path.starts_with('/') {
        return Err(format!("oauth.google.callback_path must start with `/`, got `{callback_path}`").into());
    }
    let public_url = config.get::<String>("server.public_url")?;
    let redirect_uri = format!("{}{}", public_url.trim_end_matches('/'), callback_path);

    let provider = GoogleOAuthProvider::new(ProviderConfig {
        client_id,
        client_secret,
        redirect_uri,
        auth_url: config.get("oauth.google.auth_url")?,
        token_url: config.get("oauth.google.token_url")?,
        userinfo_url: config.get("oauth.google.userinfo_url")?,
        scopes: config.get("oauth.google.scopes")?,
        use_state: config.get("oauth.google.use_state")?,
        use_pkce: config.get("oauth.google.use_pkce")?,
        http_timeout: Duration::from_secs(config.get("oauth.http_timeout_secs")?),
    })?;

    Ok((provider, callback_path))
}

async fn session_store(config: &Config) -> Result<SessionStore, Box<dyn std::error::Error>> {
    match config.get::<String>("session.store")?.as_str() {
        "memory" => Ok(SessionStore::Memory { max_capacity: config.get("session.max_entries")? }),
        "redis" => {
            let rds_manager = RedisConnectionManager::new(required(config, "redis.url")?)?;
            let rds_pool = Pool::builder()
                .max_size(config.get::<u32>("redis.max_connections")?)
                .build(rds_manager)
                .await?;
            Ok(SessionStore::Redis(rds_pool))
        },
        other => Err(format!("unsupported session.store `{other}`, expected `memory` or `redis`").into()),
    }
}

/// Initializes all dependencies and starts the web server.
async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let config_path = std::env::var("APP_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
    let config = Arc::new(load_config(&config_path)?);

    // Secrets first: a missing credential must stop startup before anything binds.
    let session_secret = required(&config, "session.secret")?;
    let session_salt = config.get_or("session.salt", DEFAULT_SESSION_SALT.to_string())?;
    let cookie_key = derive_cookie_key(&session_secret, &session_salt)?;

    let (google, callback_path) = google_provider(&config)?;
    let mut oauth_manager = OAuthManager::new();
    oauth_manager.add_provider(GOOGLE, Arc::new(google));

    let session = SessionSettings {
        cookie_name: config.get("session.cookie_name")?,
        secure: config.get("session.secure_cookie")?,
        ttl_secs: config.get("session.ttl_secs")?,
    };

    let auth_state = auth::new(auth::Dependency {
        config: config.clone(),
        oauth: oauth_manager,
        store: session_store(&config).await?,
        cookie_key,
        session,
        callback_routes: callback_routes(GOOGLE, &callback_path),
    });

    // Create the Router and Middlewares
    let timeout_secs = Duration::from_secs(config.get::<u64>("server.timeout_secs")?);
    let app = Router::new()
        .merge(auth::create_router(auth_state))
        .fallback(|| async {
            (
                StatusCode::NOT_FOUND,
                Json(serde_json::json!({"message": "Endpoint not found"})),
            )
        })
        .method_not_allowed_fallback(|| async {
            (
                StatusCode::METHOD_NOT_ALLOWED,
                Json(serde_json::json!({"message": "Method not allowed"})),
            )
        })
        .layer(
            ServiceBuilder::new()
                .layer(middleware::from_fn(request_response_logger))
                .layer(CookieManagerLayer::new())
                .layer(CorsLayer::new().allow_origin(Any).allow_headers(Any))
                .layer(RequestDecompressionLayer::new())
                .layer(CompressionLayer::new())
                .layer(TimeoutLayer::new(timeout_secs)),
        );

    let server_address = config.get::<String>("server.address")?;
    let listener = tokio::net::TcpListener::bind(&server_address).await?;

    tracing::info!("🚀 listening on {}", listener.local_addr()?);

    axum::serve(listener, app).with_graceful_shutdown(shutdown_signal()).await?;

    tracing::info!("🛑 Server stopped");
    Ok(())
}

/// Resolves on Ctrl+C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            tracing::error!(error = %err, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            },
            Err(err) => {
                tracing::error!(error = %err, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            },
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => { tracing::info!("🔻 Received SIGINT (Ctrl+C)")},
        _ = terminate => { tracing::info!("🔻 Received SIGTERM")},
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_callback_routes() {
        assert!(callback_routes("google", "/auth/google/callback").is_empty());

        let routes = callback_routes("google", "/oauth2/callback");
        assert_eq!(routes, vec![CallbackRoute { path: "/oauth2/callback".to_string(), provider: "google".to_string() }]);
    }

    #[test]
    fn test_defaults_without_file() {
        let config = load_config("does/not/exist.yaml").unwrap();

        assert_eq!(config.get::<String>("server.address").unwrap(), "0.0.0.0:3000");
        assert_eq!(config.get::<Vec<String>>("oauth.google.scopes").unwrap(), vec!["profile", "email"]);
        assert!(config.get::<bool>("oauth.google.use_state").unwrap());
        assert_eq!(config.get::<u64>("session.ttl_secs").unwrap(), 86_400);
    }

    #[test]
    fn test_required_maps_to_configuration_missing() {
        let config = Config::builder().default("session.secret", "  ").build().unwrap();

        match required(&config, "session.secret") {
            Err(AppError::ConfigurationMissing(key)) => assert_eq!(key, "session.secret"),
            other => panic!("unexpected result: {other:?}"),
        }
        assert!(matches!(required(&config, "oauth.google.client_id"), Err(AppError::ConfigurationMissing(_))));
    }

    #[test]
    fn test_google_provider_requires_credentials() {
        let config = load_config("does/not/exist.yaml").unwrap();
        // Ambient GOOGLE_CLIENT_ID variables would make this test meaningless.
        if std::env::var("GOOGLE_CLIENT_ID").is_ok() || std::env::var("APP__OAUTH__GOOGLE__CLIENT_ID").is_ok() {
            return;
        }

        let err = google_provider(&config).err().unwrap();
        assert!(err.to_string().contains("oauth.google.client_id"));
    }

    #[test]
    fn test_google_provider_rejects_relative_callback() {
        let config = Config::builder()
            .default("oauth.google.client_id", "id")
            .default("oauth.google.client_secret", "secret")
            .default("oauth.google.callback_path", "auth/google/callback")
            .build()
            .unwrap();

        let err = google_provider(&config).err().unwrap();
        assert!(err.to_string().contains("must start with"));
    }
}
