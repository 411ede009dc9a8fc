use std::sync::Arc;

use beacon_db::cache::{CacheResult, FastCache};

use crate::resolver::BADGE_KEY;

const TARGET_KEY_PREFIX: &str = "userDeviceToken:";

/// The one device a user currently receives pushes on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PushTarget {
    pub device_type: String,
    pub device_token: String,
    pub bundle_id: String,
}

#[derive(Clone)]
pub struct PushTargetStore {
    cache: Arc<dyn FastCache>,
}

impl PushTargetStore {
    pub fn new(cache: Arc<dyn FastCache>) -> Self {
        Self { cache }
    }

    fn key(uid: &str) -> String {
        format!("{}{}", TARGET_KEY_PREFIX, uid)
    }

    /// Replaces whatever target the user had before.
    pub async fn register(&self, uid: &str, target: &PushTarget) -> CacheResult<()> {
        self.cache
            .hreplace(
                &Self::key(uid),
                &[
                    ("device_type", target.device_type.as_str()),
                    ("device_token", target.device_token.as_str()),
                    ("bundle_id", target.bundle_id.as_str()),
                ],
            )
            .await
    }

    pub async fn unregister(&self, uid: &str) -> CacheResult<()> {
        self.cache.del(&Self::key(uid)).await
    }

    /// `None` when nothing is registered or the token is blank.
    pub async fn get(&self, uid: &str) -> CacheResult<Option<PushTarget>> {
        let mut fields = self.cache.hgetall(&Self::key(uid)).await?;
        let device_token = fields.remove("device_token").unwrap_or_default();
        if device_token.is_empty() {
            return Ok(None);
        }
        Ok(Some(PushTarget {
            device_type: fields.remove("device_type").unwrap_or_default(),
            device_token,
            bundle_id: fields.remove("bundle_id").unwrap_or_default(),
        }))
    }

    /// Overwrites the unread counter, typically after the app was opened.
    pub async fn set_badge(&self, uid: &str, badge: i64) -> CacheResult<()> {
        let badge = badge.to_string();
        self.cache.hset_multiple(BADGE_KEY, &[(uid, badge.as_str())], None).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use beacon_db::cache::MemoryCache;

    fn target(token: &str) -> PushTarget {
        PushTarget {
            device_type: "HMS".into(),
            device_token: token.into(),
            bundle_id: "com.example.chat".into(),
        }
    }

    #[tokio::test]
    async fn register_overwrites_and_unregister_removes() {
        let store = PushTargetStore::new(Arc::new(MemoryCache::new()));
        assert!(store.get("u1").await.unwrap().is_none());

        store.register("u1", &target("t1")).await.unwrap();
        store.register("u1", &target("t2")).await.unwrap();
        assert_eq!(store.get("u1").await.unwrap(), Some(target("t2")));

        store.unregister("u1").await.unwrap();
        assert!(store.get("u1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn reregistration_never_exposes_a_missing_target() {
        let store = PushTargetStore::new(Arc::new(MemoryCache::new()));
        store.register("u1", &target("t0")).await.unwrap();

        let writer = {
            let store = store.clone();
            tokio::spawn(async move {
                for i in 0..500 {
                    store.register("u1", &target(&format!("t{}", i % 2))).await.unwrap();
                    tokio::task::yield_now().await;
                }
            })
        };
        while !writer.is_finished() {
            assert!(store.get("u1").await.unwrap().is_some());
            tokio::task::yield_now().await;
        }
        writer.await.unwrap();
    }

    #[tokio::test]
    async fn badge_reset() {
        let cache = Arc::new(MemoryCache::new());
        let store = PushTargetStore::new(cache.clone());
        cache.hincrby(BADGE_KEY, "u1", 5).await.unwrap();
        store.set_badge("u1", 0).await.unwrap();
        assert_eq!(cache.hincrby(BADGE_KEY, "u1", 1).await.unwrap(), 1);
    }
}
