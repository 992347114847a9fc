use std::fmt;

use async_trait::async_trait;
use parking_lot::RwLock;
use redis::ErrorKind;
use redis::RedisError;
use redis::aio::ConnectionManager;
use tracing::debug;
use tracing::warn;

use super::BucketRequest;
use super::BucketStore;
use crate::StoreError;

const SCRIPT: &str = include_str!("token_bucket.lua");

/// Bucket store backed by Redis (or anything speaking its protocol with Lua
/// scripting, e.g. Dragonfly or Valkey).
///
/// The refill-and-consume step runs as a server-side script, so all instances
/// sharing the server see one consistent sequence per key.
#[derive(Clone)]
pub struct RedisStore {
    conn: ConnectionManager,
    sha: std::sync::Arc<RwLock<Option<String>>>,
}

impl fmt::Debug for RedisStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RedisStore")
            .field("sha", &*self.sha.read())
            .finish_non_exhaustive()
    }
}

impl RedisStore {
    /// Connect and verify the server answers. The script is registered by
    /// [`BucketStore::prepare`].
    pub async fn connect(url: &str) -> Result<Self, StoreError> {
        let client = redis::Client::open(url).map_err(|e| {
            warn!("failed to create redis client: {}", e);
            StoreError::Unreachable(e.to_string())
        })?;

        let conn = ConnectionManager::new(client).await.map_err(|e| {
            warn!("failed to connect to redis: {}", e);
            StoreError::Unreachable(e.to_string())
        })?;

        let mut ping = conn.clone();
        redis::cmd("PING")
            .query_async::<String>(&mut ping)
            .await
            .map_err(map_error)?;

        debug!("connected to redis bucket store");

        Ok(Self {
            conn,
            sha: Default::default(),
        })
    }

    async fn load_script(&self) -> Result<String, StoreError> {
        let mut conn = self.conn.clone();
        let sha = redis::cmd("SCRIPT")
            .arg("LOAD")
            .arg(SCRIPT)
            .query_async::<String>(&mut conn)
            .await
            .map_err(map_error)?;
        *self.sha.write() = Some(sha.clone());
        Ok(sha)
    }

    async fn eval(&self, sha: &str, request: &BucketRequest<'_>) -> Result<i64, RedisError> {
        let mut conn = self.conn.clone();
        redis::cmd("EVALSHA")
            .arg(sha)
            .arg(1)
            .arg(request.key)
            .arg(request.capacity)
            .arg(request.refill_rate)
            .arg(request.now)
            .arg(request.ttl.as_secs().max(1))
            .query_async::<i64>(&mut conn)
            .await
    }
}

#[async_trait]
impl BucketStore for RedisStore {
    async fn prepare(&self) -> Result<(), StoreError> {
        let sha = self.load_script().await?;
        debug!(%sha, "registered token bucket script");
        Ok(())
    }

    async fn check_and_consume(&self, request: BucketRequest<'_>) -> Result<bool, StoreError> {
        let Some(sha) = self.sha.read().clone() else {
            return Err(StoreError::ScriptMissing);
        };

        let reply = match self.eval(&sha, &request).await {
            // The server lost its script cache (restart, SCRIPT FLUSH); register again, once.
            Err(err) if err.kind() == ErrorKind::NoScriptError => {
                warn!("token bucket script missing on server, reloading");
                let sha = self.load_script().await?;
                self.eval(&sha, &request).await.map_err(map_error)?
            }
            other => other.map_err(map_error)?,
        };

        match reply {
            1 => Ok(true),
            0 => Ok(false),
            other => Err(StoreError::Protocol(format!(
                "script returned {other}, expected 0 or 1"
            ))),
        }
    }
}

fn map_error(err: RedisError) -> StoreError {
    match err.kind() {
        ErrorKind::NoScriptError => StoreError::ScriptMissing,
        ErrorKind::TypeError | ErrorKind::ResponseError | ErrorKind::ExtensionError => {
            StoreError::Protocol(err.to_string())
        }
        _ => StoreError::Unreachable(err.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use super::*;
    use crate::BucketEngine;
    use crate::BucketKey;
    use crate::Policy;

    // The tests marked #[ignore] need a Redis-compatible server, found through
    // REDIS_URL (default redis://127.0.0.1:6379).

    async fn live_store() -> RedisStore {
        let url = std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1:6379".into());
        let store = RedisStore::connect(&url).await.expect("Failed to connect");
        store.prepare().await.expect("Failed to load script");
        store
    }

    async fn reset(store: &RedisStore, key: &str) {
        let mut conn = store.conn.clone();
        redis::cmd("DEL")
            .arg(key)
            .query_async::<()>(&mut conn)
            .await
            .expect("Failed to reset key");
    }

    async fn stored(store: &RedisStore, key: &str) -> (f64, u64) {
        let mut conn = store.conn.clone();
        let (tokens, last_refill): (String, String) = redis::cmd("HMGET")
            .arg(key)
            .arg("tokens")
            .arg("last_refill")
            .query_async(&mut conn)
            .await
            .expect("Failed to read bucket");
        (tokens.parse().unwrap(), last_refill.parse().unwrap())
    }

    fn request(key: &str, capacity: u32, refill_rate: f64, now: u64) -> BucketRequest<'_> {
        BucketRequest {
            key,
            capacity,
            refill_rate,
            now,
            ttl: Duration::from_secs(60),
        }
    }

    #[test]
    fn script_reads_all_arguments() {
        for arg in ["KEYS[1]", "ARGV[1]", "ARGV[2]", "ARGV[3]", "ARGV[4]"] {
            assert!(SCRIPT.contains(arg), "script does not read {arg}");
        }
    }

    #[test]
    fn errors_are_classified() {
        let missing = RedisError::from((ErrorKind::NoScriptError, "NOSCRIPT"));
        assert!(matches!(map_error(missing), StoreError::ScriptMissing));

        let io = RedisError::from(std::io::Error::new(
            std::io::ErrorKind::ConnectionRefused,
            "refused",
        ));
        assert!(map_error(io).is_unavailable());

        let garbage = RedisError::from((ErrorKind::TypeError, "bad reply"));
        assert!(matches!(map_error(garbage), StoreError::Protocol(_)));
    }

    #[tokio::test]
    #[ignore]
    async fn live_capacity_is_a_hard_bound() {
        let store = live_store().await;
        let key = "tb:test:capacity";
        reset(&store, key).await;

        for _ in 0..3 {
            assert!(store.check_and_consume(request(key, 3, 0.0, 100)).await.unwrap());
        }
        for _ in 0..3 {
            assert!(!store.check_and_consume(request(key, 3, 0.0, 100)).await.unwrap());
        }
        assert_eq!(stored(&store, key).await, (0.0, 100));
    }

    #[tokio::test]
    #[ignore]
    async fn live_denials_persist_partial_refill() {
        let store = live_store().await;
        let key = "tb:test:partial";
        reset(&store, key).await;

        for _ in 0..5 {
            assert!(store.check_and_consume(request(key, 5, 0.5, 10)).await.unwrap());
        }
        assert!(!store.check_and_consume(request(key, 5, 0.5, 11)).await.unwrap());
        assert_eq!(stored(&store, key).await, (0.5, 11));

        assert!(store.check_and_consume(request(key, 5, 0.5, 12)).await.unwrap());
        assert_eq!(stored(&store, key).await, (0.0, 12));

        // A lagging clock neither refills nor rewinds the bucket.
        assert!(!store.check_and_consume(request(key, 5, 0.5, 5)).await.unwrap());
        assert_eq!(stored(&store, key).await, (0.0, 12));
    }

    #[tokio::test]
    #[ignore]
    async fn live_engine_drains_and_refills() {
        let store = live_store().await;
        let key = BucketKey::new(Some("live-engine"), "/api/status");
        reset(&store, &key.to_string()).await;

        let engine = BucketEngine::initialize(Arc::new(store.clone())).await.unwrap();
        let policy = Policy::new(10, 1.0, 60);

        for _ in 0..10 {
            assert!(engine.check_and_consume(&key, &policy, 1000).await.unwrap());
        }
        assert!(!engine.check_and_consume(&key, &policy, 1000).await.unwrap());
        assert!(engine.check_and_consume(&key, &policy, 1010).await.unwrap());
        assert_eq!(stored(&store, &key.to_string()).await, (9.0, 1010));

        let mut conn = store.conn.clone();
        let ttl: i64 = redis::cmd("TTL")
            .arg(key.to_string())
            .query_async(&mut conn)
            .await
            .unwrap();
        assert!(ttl > 0 && ttl <= 60, "unexpected ttl {ttl}");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    #[ignore]
    async fn live_concurrent_callers_never_overshoot() {
        let store = Arc::new(live_store().await);
        let key = "tb:test:concurrent";
        reset(&store, key).await;
        let capacity = 20;

        let handles = (0..200)
            .map(|_| {
                let store = store.clone();
                tokio::spawn(async move {
                    store
                        .check_and_consume(request(key, capacity, 0.0, 1))
                        .await
                        .unwrap()
                })
            })
            .collect::<Vec<_>>();

        let allowed = futures::future::join_all(handles)
            .await
            .into_iter()
            .filter(|res| *res.as_ref().unwrap())
            .count();

        assert_eq!(allowed, capacity as usize);
    }

    #[tokio::test]
    #[ignore]
    async fn live_script_is_reloaded_after_a_flush() {
        let store = live_store().await;
        let key = "tb:test:flush";
        reset(&store, key).await;

        let mut conn = store.conn.clone();
        redis::cmd("SCRIPT")
            .arg("FLUSH")
            .query_async::<()>(&mut conn)
            .await
            .unwrap();

        assert!(store.check_and_consume(request(key, 2, 0.0, 1)).await.unwrap());
        assert!(store.check_and_consume(request(key, 2, 0.0, 1)).await.unwrap());
        assert!(!store.check_and_consume(request(key, 2, 0.0, 1)).await.unwrap());
    }
}
