use std::fmt::Display;
use std::time::{Duration, Instant};

use app_core::error::AppError;
use async_trait::async_trait;
use bb8_redis::{RedisConnectionManager, bb8};
use moka::Expiry;
use moka::future::Cache;
use redis::AsyncCommands;

use crate::domain::entity::session::{SessionId, SessionRecord};

/// Repository interface for server-side session records.
///
/// Every operation touches a single key, and implementations must apply
/// each one atomically so concurrent requests on the same session never see
/// a torn record.
#[async_trait]
#[cfg_attr(test, mockall::automock)]
pub trait SessionRepository: Send + Sync {
    /// Loads the record stored under `id`.
    ///
    /// # Returns
    ///
    /// * `Ok(Some(record))` if the session exists and has not expired.
    /// * `Ok(None)` if there is no such session.
    /// * `Err(AppError::SessionUnavailable)` if the store cannot be reached.
    async fn load(&self, id: &SessionId) -> Result<Option<SessionRecord>, AppError>;

    /// Stores `record` under `id`, replacing any previous value and resetting
    /// its time-to-live to `ttl_secs`.
    async fn save(&self, id: &SessionId, record: &SessionRecord, ttl_secs: u64) -> Result<(), AppError>;

    /// Deletes the session. Deleting a missing session is not an error.
    async fn delete(&self, id: &SessionId) -> Result<(), AppError>;
}

fn unavailable<E: Display>(err: E) -> AppError {
    AppError::SessionUnavailable(err.to_string())
}

fn session_key(id: &SessionId) -> String {
    format!("session:{id}")
}

/// Decodes a stored record. An unreadable record reads as no session.
fn decode_record(raw: &str) -> Option<SessionRecord> {
    match serde_json::from_str(raw) {
        Ok(record) => Some(record),
        Err(err) => {
            tracing::warn!(error = %err, "Discarding unreadable session record");
            None
        },
    }
}

/// Redis-backed implementation of [`SessionRepository`].
///
/// Records are stored as JSON strings with a Redis TTL.
pub struct SessionRedis {
    pool: bb8::Pool<RedisConnectionManager>,
}

impl SessionRedis {
    pub fn new(pool: bb8::Pool<RedisConnectionManager>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SessionRepository for SessionRedis {
    async fn load(&self, id: &SessionId) -> Result<Option<SessionRecord>, AppError> {
        let mut conn = self.pool.get().await.map_err(unavailable)?;
        let raw: Option<String> = conn.get(session_key(id)).await.map_err(unavailable)?;

        let Some(raw) = raw else {
            return Ok(None);
        };

        let record = decode_record(&raw);
        if record.is_none() {
            // Drop the unreadable value so the next request starts clean.
            let _: () = conn.del(session_key(id)).await.map_err(unavailable)?;
        }
        Ok(record)
    }

    async fn save(&self, id: &SessionId, record: &SessionRecord, ttl_secs: u64) -> Result<(), AppError> {
        let value = serde_json::to_string(record)?;
        let mut conn = self.pool.get().await.map_err(unavailable)?;
        let _: () = conn.set_ex(session_key(id), value, ttl_secs).await.map_err(unavailable)?;
        Ok(())
    }

    async fn delete(&self, id: &SessionId) -> Result<(), AppError> {
        let mut conn = self.pool.get().await.map_err(unavailable)?;
        let _: () = conn.del(session_key(id)).await.map_err(unavailable)?;
        Ok(())
    }
}

#[derive(Clone)]
struct StoredRecord {
    record: SessionRecord,
    ttl: Duration,
}

struct RecordExpiry;

impl Expiry<String, StoredRecord> for RecordExpiry {
    fn expire_after_create(&self, _key: &String, value: &StoredRecord, _created_at: Instant) -> Option<Duration> {
        Some(value.ttl)
    }

    fn expire_after_update(
        &self,
        _key: &String,
        value: &StoredRecord,
        _updated_at: Instant,
        _duration_until_expiry: Option<Duration>,
    ) -> Option<Duration> {
        Some(value.ttl)
    }
}

/// In-process implementation of [`SessionRepository`] for single-instance
/// deployments. Sessions are lost on restart.
pub struct SessionMemory {
    cache: Cache<String, StoredRecord>,
}

impl SessionMemory {
    pub fn new(max_capacity: u64) -> Self {
        let cache = Cache::builder().max_capacity(max_capacity).expire_after(RecordExpiry).build();
        Self { cache }
    }
}

#[async_trait]
impl SessionRepository for SessionMemory {
    async fn load(&self, id: &SessionId) -> Result<Option<SessionRecord>, AppError> {
        Ok(self.cache.get(id.as_str()).await.map(|stored| stored.record))
    }

    async fn save(&self, id: &SessionId, record: &SessionRecord, ttl_secs: u64) -> Result<(), AppError> {
        let stored = StoredRecord { record: record.clone(), ttl: Duration::from_secs(ttl_secs) };
        self.cache.insert(id.as_str().to_string(), stored).await;
        Ok(())
    }

    async fn delete(&self, id: &SessionId) -> Result<(), AppError> {
        self.cache.invalidate(id.as_str()).await;
        Ok(())
    }
}
