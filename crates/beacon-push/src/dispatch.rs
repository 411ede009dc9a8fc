//! Offline-push fan-out: one `msg.offline` notice in, one pool job per
//! eligible recipient out.

use std::io::Read;
use std::sync::Arc;

use flate2::read::GzDecoder;
use tracing::{debug, error, info};

use beacon_types::directory::{GroupDirectory, MuteSetting, UserDirectory};
use beacon_types::events::OfflineNotify;
use beacon_types::models::ChannelType;

use crate::PushError;
use crate::eligibility::{EligibilityFilter, MuteIndex, index_users};
use crate::payload::{ContentError, MessageContent};
use crate::pool::DispatchWorkerPool;
use crate::router::PushRouter;

#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("unsupported recipient compression: {0}")]
    UnknownCompression(String),

    #[error("failed to decompress recipients: {0}")]
    Decompress(#[from] std::io::Error),

    #[error("failed to decode recipients: {0}")]
    Recipients(#[from] serde_json::Error),

    #[error("failed to decode message content: {0}")]
    Content(#[from] ContentError),

    #[error(transparent)]
    Push(#[from] PushError),
}

/// Recipients carried by a notice, inflating `compress_to_uids` when set.
pub fn decode_recipients(notice: &OfflineNotify) -> Result<Vec<String>, DispatchError> {
    match notice.compress.as_str() {
        "" => Ok(notice.to_uids.clone()),
        "gzip" => {
            let mut raw = Vec::new();
            GzDecoder::new(notice.compress_to_uids.as_slice()).read_to_end(&mut raw)?;
            Ok(serde_json::from_slice(&raw)?)
        }
        other => Err(DispatchError::UnknownCompression(other.to_string())),
    }
}

pub struct OfflinePushDispatcher {
    users: Arc<dyn UserDirectory>,
    groups: Arc<dyn GroupDirectory>,
    filter: EligibilityFilter,
    router: PushRouter,
    pool: Arc<DispatchWorkerPool>,
}

impl OfflinePushDispatcher {
    pub fn new(
        users: Arc<dyn UserDirectory>,
        groups: Arc<dyn GroupDirectory>,
        router: PushRouter,
        pool: Arc<DispatchWorkerPool>,
    ) -> Self {
        Self {
            users,
            groups,
            filter: EligibilityFilter::default(),
            router,
            pool,
        }
    }

    /// Queues one push per eligible recipient and returns how many were
    /// queued. Directory failures are logged and yield zero jobs.
    pub async fn dispatch(&self, notice: OfflineNotify) -> Result<usize, DispatchError> {
        let recipients = decode_recipients(&notice)?;
        if recipients.is_empty() {
            return Ok(0);
        }

        let msg = &notice.message;
        let content = if msg.setting.signal() {
            None
        } else {
            Some(MessageContent::decode(&msg.payload)?)
        };

        if let Err(reason) = self.filter.prefilter(msg, content.as_ref()) {
            debug!(message_id = msg.message_id, ?reason, "Offline push suppressed");
            return Ok(0);
        }

        let users = match self.users.get_users(&recipients).await {
            Ok(users) => index_users(users),
            Err(e) => {
                error!(message_id = msg.message_id, "Failed to load recipients: {}", e);
                return Ok(0);
            }
        };

        let channel_type = msg.channel_type();
        let mutes = match self.mute_settings(channel_type, &notice, &recipients).await {
            Ok((peer, group)) => MuteIndex::new(peer, group),
            Err(e) => {
                error!(message_id = msg.message_id, "Failed to load mute settings: {}", e);
                return Ok(0);
            }
        };

        let notice = Arc::new(notice);
        let content = Arc::new(content);
        let mut queued = 0;
        for uid in &recipients {
            let Some(user) = users.get(uid) else {
                error!(uid = %uid, "Offline push recipient not found");
                continue;
            };
            if let Err(reason) = self.filter.allow(channel_type, user, &mutes) {
                debug!(uid = %uid, ?reason, "Recipient suppressed");
                continue;
            }

            let router = self.router.clone();
            let notice = notice.clone();
            let content = content.clone();
            let user = user.clone();
            self.pool
                .submit(async move {
                    router.deliver(&notice, Option::as_ref(&content), &user).await;
                })
                .await?;
            queued += 1;
        }

        info!(message_id = notice.message.message_id, recipients = recipients.len(), queued, "Offline push queued");
        Ok(queued)
    }

    async fn mute_settings(
        &self,
        channel_type: ChannelType,
        notice: &OfflineNotify,
        recipients: &[String],
    ) -> anyhow::Result<(Vec<MuteSetting>, Vec<MuteSetting>)> {
        let msg = &notice.message;
        Ok(match channel_type {
            ChannelType::Person => (self.users.peer_settings(recipients, &msg.from_uid).await?, vec![]),
            ChannelType::Group => (
                vec![],
                self.groups.settings_with_uids(&msg.channel_id, recipients).await?,
            ),
            ChannelType::Other(_) => (vec![], vec![]),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::sync::atomic::Ordering;

    use beacon_db::cache::MemoryCache;
    use beacon_types::models::{DeviceType, Setting};
    use flate2::Compression;
    use flate2::write::GzEncoder;

    use crate::registry::PusherRegistry;
    use crate::target::{PushTarget, PushTargetStore};
    use crate::testutil::{MockDirectory, RecordingPusher, builder, notice, user};

    struct Harness {
        dispatcher: OfflinePushDispatcher,
        pusher: Arc<RecordingPusher>,
        pool: Arc<DispatchWorkerPool>,
        directory: Arc<MockDirectory>,
    }

    async fn harness(directory: MockDirectory) -> Harness {
        let cache = Arc::new(MemoryCache::new());
        let targets = PushTargetStore::new(cache.clone());
        for u in &directory.users {
            targets
                .register(
                    &u.uid,
                    &PushTarget {
                        device_type: "HMS".into(),
                        device_token: format!("tok-{}", u.uid),
                        bundle_id: "app".into(),
                    },
                )
                .await
                .unwrap();
        }
        let pusher = Arc::new(RecordingPusher::default());
        let mut registry = PusherRegistry::new();
        registry.register(DeviceType::Hms, "app", pusher.clone());

        let router = PushRouter::new(targets, Arc::new(registry), builder(cache));
        let pool = Arc::new(DispatchWorkerPool::new(4, 16));
        let directory = Arc::new(directory);
        let dispatcher = OfflinePushDispatcher::new(directory.clone(), directory.clone(), router, pool.clone());
        Harness {
            dispatcher,
            pusher,
            pool,
            directory,
        }
    }

    fn gzip(data: &[u8]) -> Vec<u8> {
        let mut enc = GzEncoder::new(Vec::new(), Compression::default());
        enc.write_all(data).unwrap();
        enc.finish().unwrap()
    }

    const TEXT: &str = r#"{"type":1,"content":"hi"}"#;

    #[tokio::test]
    async fn muted_peer_is_skipped() {
        let h = harness(MockDirectory {
            users: vec![user("a", true), user("b", true)],
            peer_mutes: vec![("a".into(), "alice".into())],
            ..Default::default()
        })
        .await;

        let n = notice(ChannelType::PERSON, "a", &["a", "b"], TEXT);
        assert_eq!(h.dispatcher.dispatch(n).await.unwrap(), 1);
        h.pool.shutdown().await;

        let sent = h.pusher.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, "tok-b");
        assert_eq!(h.directory.settings_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn corrupted_gzip_yields_error_and_no_jobs() {
        let h = harness(MockDirectory {
            users: vec![user("a", true)],
            ..Default::default()
        })
        .await;

        let mut n = notice(ChannelType::PERSON, "a", &[], TEXT);
        n.compress = "gzip".into();
        n.compress_to_uids = b"definitely not gzip".to_vec();
        let err = h.dispatcher.dispatch(n).await.unwrap_err();
        assert!(matches!(err, DispatchError::Decompress(_)));
        assert_eq!(h.pool.submitted(), 0);
    }

    #[tokio::test]
    async fn gzip_recipients_are_inflated() {
        let h = harness(MockDirectory {
            users: vec![user("a", true), user("b", true)],
            ..Default::default()
        })
        .await;

        let mut n = notice(ChannelType::PERSON, "a", &[], TEXT);
        n.compress = "gzip".into();
        n.compress_to_uids = gzip(br#"["a","b"]"#);
        assert_eq!(h.dispatcher.dispatch(n).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn group_mute_and_notice_off() {
        let h = harness(MockDirectory {
            users: vec![user("a", true), user("b", false), user("c", true)],
            group_mutes: vec![("a".into(), "g1".into())],
            ..Default::default()
        })
        .await;

        let n = notice(ChannelType::GROUP, "g1", &["a", "b", "c"], TEXT);
        assert_eq!(h.dispatcher.dispatch(n).await.unwrap(), 1);
        h.pool.shutdown().await;

        let sent = h.pusher.sent();
        assert_eq!(sent[0].0, "tok-c");
        assert_eq!(sent[0].1.title(), "Hiking");
        assert_eq!(sent[0].1.content(), "Alice: hi");
    }

    #[tokio::test]
    async fn directory_failure_is_not_an_error() {
        let h = harness(MockDirectory {
            users: vec![user("a", true)],
            ..Default::default()
        })
        .await;
        h.directory.fail.store(true, Ordering::SeqCst);

        let n = notice(ChannelType::PERSON, "a", &["a"], TEXT);
        assert_eq!(h.dispatcher.dispatch(n).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn unknown_users_are_skipped() {
        let h = harness(MockDirectory {
            users: vec![user("a", true)],
            ..Default::default()
        })
        .await;
        let n = notice(ChannelType::PERSON, "a", &["a", "ghost"], TEXT);
        assert_eq!(h.dispatcher.dispatch(n).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn sync_once_and_unsupported_types_are_dropped() {
        let h = harness(MockDirectory {
            users: vec![user("a", true)],
            ..Default::default()
        })
        .await;

        let mut n = notice(ChannelType::PERSON, "a", &["a"], TEXT);
        n.message.header.sync_once = 1;
        assert_eq!(h.dispatcher.dispatch(n).await.unwrap(), 0);

        let n = notice(ChannelType::PERSON, "a", &["a"], r#"{"type":99}"#);
        assert_eq!(h.dispatcher.dispatch(n).await.unwrap(), 0);

        let n = notice(ChannelType::PERSON, "a", &["a"], "not json");
        assert!(matches!(
            h.dispatcher.dispatch(n).await,
            Err(DispatchError::Content(_))
        ));
    }

    #[tokio::test]
    async fn encrypted_payload_is_pushed_generically() {
        let h = harness(MockDirectory {
            users: vec![user("a", true)],
            ..Default::default()
        })
        .await;

        let mut n = notice(ChannelType::PERSON, "a", &["a"], "ciphertext");
        n.message.setting = Setting(1 << 5);
        assert_eq!(h.dispatcher.dispatch(n).await.unwrap(), 1);
        h.pool.shutdown().await;
        assert_eq!(h.pusher.sent()[0].1.content(), "You have a new message");
    }
}
