//! Shared fast key-value store: push targets, badges, name caches, provider
//! tokens and login state all live here.
//!
//! `RedisCache` is the production backend. `MemoryCache` keeps the same
//! semantics (string and hash values, per-key TTL) in-process for single-node
//! deployments and tests.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use redis::AsyncCommands;
use redis::aio::ConnectionManager;
use tracing::info;

#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),
    #[error("key {0} holds the wrong kind of value")]
    WrongType(String),
    #[error("cache lock poisoned")]
    Poisoned,
}

pub type CacheResult<T> = Result<T, CacheError>;

#[async_trait]
pub trait FastCache: Send + Sync {
    async fn get(&self, key: &str) -> CacheResult<Option<String>>;

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> CacheResult<()>;

    async fn del(&self, key: &str) -> CacheResult<()>;

    /// Empty map when the key does not exist.
    async fn hgetall(&self, key: &str) -> CacheResult<HashMap<String, String>>;

    /// Sets the given fields, leaving others untouched, and optionally
    /// refreshes the key's TTL.
    async fn hset_multiple(&self, key: &str, fields: &[(&str, &str)], ttl: Option<Duration>) -> CacheResult<()>;

    /// Drops every existing field and writes `fields` as one atomic step, so
    /// readers see either the old hash or the new one.
    async fn hreplace(&self, key: &str, fields: &[(&str, &str)]) -> CacheResult<()>;

    /// Atomic increment; returns the new value.
    async fn hincrby(&self, key: &str, field: &str, delta: i64) -> CacheResult<i64>;
}

// -- Redis --

#[derive(Clone)]
pub struct RedisCache {
    conn: ConnectionManager,
}

impl RedisCache {
    pub async fn connect(url: &str) -> CacheResult<Self> {
        let client = redis::Client::open(url)?;
        let conn = client.get_connection_manager().await?;
        info!("Connected to redis at {}", url);
        Ok(Self { conn })
    }
}

#[async_trait]
impl FastCache for RedisCache {
    async fn get(&self, key: &str) -> CacheResult<Option<String>> {
        let mut conn = self.conn.clone();
        Ok(conn.get(key).await?)
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> CacheResult<()> {
        let mut conn = self.conn.clone();
        match ttl {
            Some(ttl) => {
                let _: () = conn.set_ex(key, value, ttl.as_secs().max(1)).await?;
            }
            None => {
                let _: () = conn.set(key, value).await?;
            }
        }
        Ok(())
    }

    async fn del(&self, key: &str) -> CacheResult<()> {
        let mut conn = self.conn.clone();
        let _: () = conn.del(key).await?;
        Ok(())
    }

    async fn hgetall(&self, key: &str) -> CacheResult<HashMap<String, String>> {
        let mut conn = self.conn.clone();
        Ok(conn.hgetall(key).await?)
    }

    async fn hset_multiple(&self, key: &str, fields: &[(&str, &str)], ttl: Option<Duration>) -> CacheResult<()> {
        let mut conn = self.conn.clone();
        let _: () = conn.hset_multiple(key, fields).await?;
        if let Some(ttl) = ttl {
            let _: () = conn.expire(key, ttl.as_secs().max(1) as i64).await?;
        }
        Ok(())
    }

    async fn hreplace(&self, key: &str, fields: &[(&str, &str)]) -> CacheResult<()> {
        let mut conn = self.conn.clone();
        let _: () = redis::pipe()
            .atomic()
            .del(key)
            .ignore()
            .hset_multiple(key, fields)
            .ignore()
            .query_async(&mut conn)
            .await?;
        Ok(())
    }

    async fn hincrby(&self, key: &str, field: &str, delta: i64) -> CacheResult<i64> {
        let mut conn = self.conn.clone();
        Ok(conn.hincr(key, field, delta).await?)
    }
}

// -- In-process --

enum Value {
    Str(String),
    Hash(HashMap<String, String>),
}

struct Entry {
    value: Value,
    expires_at: Option<Instant>,
}

impl Entry {
    fn live(&self, now: Instant) -> bool {
        self.expires_at.is_none_or(|at| at > now)
    }
}

#[derive(Default)]
pub struct MemoryCache {
    entries: Mutex<HashMap<String, Entry>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_entries<T>(&self, f: impl FnOnce(&mut HashMap<String, Entry>) -> CacheResult<T>) -> CacheResult<T> {
        let mut entries = self.entries.lock().map_err(|_| CacheError::Poisoned)?;
        let now = Instant::now();
        entries.retain(|_, e| e.live(now));
        f(&mut entries)
    }
}

#[async_trait]
impl FastCache for MemoryCache {
    async fn get(&self, key: &str) -> CacheResult<Option<String>> {
        self.with_entries(|entries| match entries.get(key) {
            None => Ok(None),
            Some(Entry { value: Value::Str(s), .. }) => Ok(Some(s.clone())),
            Some(_) => Err(CacheError::WrongType(key.to_string())),
        })
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> CacheResult<()> {
        self.with_entries(|entries| {
            entries.insert(
                key.to_string(),
                Entry {
                    value: Value::Str(value.to_string()),
                    expires_at: ttl.map(|t| Instant::now() + t),
                },
            );
            Ok(())
        })
    }

    async fn del(&self, key: &str) -> CacheResult<()> {
        self.with_entries(|entries| {
            entries.remove(key);
            Ok(())
        })
    }

    async fn hgetall(&self, key: &str) -> CacheResult<HashMap<String, String>> {
        self.with_entries(|entries| match entries.get(key) {
            None => Ok(HashMap::new()),
            Some(Entry { value: Value::Hash(h), .. }) => Ok(h.clone()),
            Some(_) => Err(CacheError::WrongType(key.to_string())),
        })
    }

    async fn hset_multiple(&self, key: &str, fields: &[(&str, &str)], ttl: Option<Duration>) -> CacheResult<()> {
        self.with_entries(|entries| {
            let entry = entries.entry(key.to_string()).or_insert_with(|| Entry {
                value: Value::Hash(HashMap::new()),
                expires_at: None,
            });
            let Value::Hash(hash) = &mut entry.value else {
                return Err(CacheError::WrongType(key.to_string()));
            };
            for (f, v) in fields {
                hash.insert((*f).to_string(), (*v).to_string());
            }
            if let Some(ttl) = ttl {
                entry.expires_at = Some(Instant::now() + ttl);
            }
            Ok(())
        })
    }

    async fn hreplace(&self, key: &str, fields: &[(&str, &str)]) -> CacheResult<()> {
        self.with_entries(|entries| {
            let hash = fields.iter().map(|(f, v)| ((*f).to_string(), (*v).to_string())).collect();
            entries.insert(
                key.to_string(),
                Entry {
                    value: Value::Hash(hash),
                    expires_at: None,
                },
            );
            Ok(())
        })
    }

    async fn hincrby(&self, key: &str, field: &str, delta: i64) -> CacheResult<i64> {
        self.with_entries(|entries| {
            let entry = entries.entry(key.to_string()).or_insert_with(|| Entry {
                value: Value::Hash(HashMap::new()),
                expires_at: None,
            });
            let Value::Hash(hash) = &mut entry.value else {
                return Err(CacheError::WrongType(key.to_string()));
            };
            let current = hash.get(field).and_then(|v| v.parse::<i64>().ok()).unwrap_or(0);
            let next = current + delta;
            hash.insert(field.to_string(), next.to_string());
            Ok(next)
        })
    }
}
