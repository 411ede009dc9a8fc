use std::sync::Arc;

use tracing::{debug, error, warn};

use beacon_types::directory::UserNotice;
use beacon_types::events::OfflineNotify;

use crate::PushError;
use crate::payload::{MessageContent, PayloadBuilder};
use crate::registry::PusherRegistry;
use crate::target::PushTargetStore;

/// Sends one notice to one recipient's registered device.
#[derive(Clone)]
pub struct PushRouter {
    targets: PushTargetStore,
    registry: Arc<PusherRegistry>,
    builder: PayloadBuilder,
}

impl PushRouter {
    pub fn new(targets: PushTargetStore, registry: Arc<PusherRegistry>, builder: PayloadBuilder) -> Self {
        Self {
            targets,
            registry,
            builder,
        }
    }

    pub async fn push(
        &self,
        notice: &OfflineNotify,
        content: Option<&MessageContent>,
        recipient: &UserNotice,
    ) -> Result<(), PushError> {
        let uid = recipient.uid.as_str();
        let target = self
            .targets
            .get(uid)
            .await?
            .ok_or_else(|| PushError::NoTarget(uid.to_string()))?;

        let pusher = self
            .registry
            .get(&target.device_type, &target.bundle_id)
            .inspect_err(|e| {
                error!(uid, device_type = %target.device_type, bundle_id = %target.bundle_id, "{}", e);
            })?;

        let payload = self.builder.build(notice, content, recipient).await?;
        pusher.push(&target.device_token, &payload).await.inspect_err(|e| {
            error!(
                uid,
                device_type = %target.device_type,
                device_token = %target.device_token,
                provider = pusher.name(),
                "Push failed: {}",
                e
            );
        })?;

        debug!(uid, provider = pusher.name(), message_id = notice.message.message_id, "Pushed");
        Ok(())
    }

    /// Like [`push`](Self::push), but failures are logged and dropped.
    pub async fn deliver(&self, notice: &OfflineNotify, content: Option<&MessageContent>, recipient: &UserNotice) {
        match self.push(notice, content, recipient).await {
            Ok(()) => {}
            Err(PushError::NoTarget(uid)) => warn!(uid = %uid, "No push target registered, skipping"),
            Err(e) => warn!(uid = %recipient.uid, "Offline push dropped: {}", e),
        }
    }
}
