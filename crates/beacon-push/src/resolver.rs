use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{error, warn};

use beacon_db::cache::FastCache;
use beacon_db::directory::SqlDirectory;
use beacon_db::models::ThirdName;

use crate::PushError;

const NAME_CACHE_PREFIX: &str = "name:";
const GROUP_NAME_CACHE_PREFIX: &str = "groupName:";
pub const BADGE_KEY: &str = "userDeviceBadge";

/// Source of truth for names on a cache miss.
#[async_trait]
pub trait NameSource: Send + Sync {
    async fn third_name(&self, from_uid: &str, to_uid: &str, group_no: Option<&str>) -> anyhow::Result<ThirdName>;
    async fn group_name(&self, group_no: &str) -> anyhow::Result<String>;
}

#[async_trait]
impl NameSource for SqlDirectory {
    async fn third_name(&self, from_uid: &str, to_uid: &str, group_no: Option<&str>) -> anyhow::Result<ThirdName> {
        let (from, to, group) = (from_uid.to_string(), to_uid.to_string(), group_no.map(str::to_string));
        self.blocking(move |db| db.third_name(&from, &to, group.as_deref())).await
    }

    async fn group_name(&self, group_no: &str) -> anyhow::Result<String> {
        let group = group_no.to_string();
        self.blocking(move |db| db.group_name(&group)).await
    }
}

/// Cached display names and per-user unread badges.
#[derive(Clone)]
pub struct NameAndBadgeResolver {
    cache: Arc<dyn FastCache>,
    source: Arc<dyn NameSource>,
    ttl: Duration,
}

impl NameAndBadgeResolver {
    pub fn new(cache: Arc<dyn FastCache>, source: Arc<dyn NameSource>, ttl: Duration) -> Self {
        Self { cache, source, ttl }
    }

    /// Name `to_uid` should see for `from_uid`: remark, then group nickname,
    /// then profile name.
    pub async fn display_name(&self, from_uid: &str, to_uid: &str, group_no: Option<&str>) -> Result<String, PushError> {
        let key = match group_no {
            Some(group) => format!("{}{}-{}@{}", NAME_CACHE_PREFIX, from_uid, to_uid, group),
            None => format!("{}{}-{}", NAME_CACHE_PREFIX, from_uid, to_uid),
        };

        let cached = self.cache.hgetall(&key).await?;
        let names = if !cached.is_empty() {
            ThirdName {
                name: cached.get("name").cloned().unwrap_or_default(),
                remark: cached.get("remark").cloned().unwrap_or_default(),
                name_in_group: cached.get("name_in_group").cloned().unwrap_or_default(),
            }
        } else {
            let names = self.source.third_name(from_uid, to_uid, group_no).await.map_err(|e| {
                error!(from_uid, to_uid, "Name lookup failed: {}", e);
                PushError::Other(e)
            })?;
            let mut fields = vec![("name", names.name.as_str()), ("remark", names.remark.as_str())];
            if group_no.is_some() {
                fields.push(("name_in_group", names.name_in_group.as_str()));
            }
            self.cache.hset_multiple(&key, &fields, Some(self.ttl)).await?;
            names
        };

        Ok(pick_name(names))
    }

    pub async fn group_name(&self, group_no: &str) -> Result<String, PushError> {
        let key = format!("{}{}", GROUP_NAME_CACHE_PREFIX, group_no);
        if let Some(name) = self.cache.get(&key).await? {
            if !name.is_empty() {
                return Ok(name);
            }
        }
        let name = self.source.group_name(group_no).await?;
        self.cache.set(&key, &name, Some(self.ttl)).await?;
        Ok(name)
    }

    /// Bumps and returns the unread counter shown on the app icon.
    pub async fn badge(&self, uid: &str) -> i64 {
        match self.cache.hincrby(BADGE_KEY, uid, 1).await {
            Ok(n) => n,
            Err(e) => {
                warn!(uid, "Failed to increment badge: {}", e);
                0
            }
        }
    }
}

fn pick_name(names: ThirdName) -> String {
    if !names.remark.is_empty() {
        names.remark
    } else if !names.name_in_group.is_empty() {
        names.name_in_group
    } else {
        names.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use beacon_db::Database;
    use beacon_db::cache::MemoryCache;

    fn resolver() -> (NameAndBadgeResolver, Arc<Database>, Arc<MemoryCache>) {
        let db = Arc::new(Database::open_in_memory(1).unwrap());
        db.upsert_user("alice", "Alice", true, true).unwrap();
        db.upsert_group("g1", "Hiking").unwrap();
        let cache = Arc::new(MemoryCache::new());
        let r = NameAndBadgeResolver::new(
            cache.clone(),
            Arc::new(SqlDirectory::new(db.clone())),
            Duration::from_secs(60),
        );
        (r, db, cache)
    }

    #[tokio::test]
    async fn precedence_remark_then_group_then_name() {
        let (r, db, _) = resolver();
        assert_eq!(r.display_name("alice", "bob", None).await.unwrap(), "Alice");

        db.add_group_member("g1", "alice", "Lead").unwrap();
        assert_eq!(r.display_name("alice", "bob", Some("g1")).await.unwrap(), "Lead");

        db.add_friend("carol", "alice", "Ali").unwrap();
        assert_eq!(r.display_name("alice", "carol", Some("g1")).await.unwrap(), "Ali");
    }

    #[tokio::test]
    async fn names_are_served_from_cache_after_first_lookup() {
        let (r, db, cache) = resolver();
        assert_eq!(r.display_name("alice", "bob", None).await.unwrap(), "Alice");
        db.upsert_user("alice", "Renamed", true, true).unwrap();
        assert_eq!(r.display_name("alice", "bob", None).await.unwrap(), "Alice");

        let cached = cache.hgetall("name:alice-bob").await.unwrap();
        assert_eq!(cached["name"], "Alice");
    }

    #[tokio::test]
    async fn group_name_cached() {
        let (r, db, _) = resolver();
        assert_eq!(r.group_name("g1").await.unwrap(), "Hiking");
        db.upsert_group("g1", "Climbing").unwrap();
        assert_eq!(r.group_name("g1").await.unwrap(), "Hiking");
    }

    #[tokio::test]
    async fn badge_increments_per_user() {
        let (r, _, _) = resolver();
        assert_eq!(r.badge("bob").await, 1);
        assert_eq!(r.badge("bob").await, 2);
        assert_eq!(r.badge("carol").await, 1);
    }
}
