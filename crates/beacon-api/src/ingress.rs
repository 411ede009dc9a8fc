//! Routes IM core events to storage, presence and offline push.

use std::sync::Arc;

use serde_json::{Value, json};
use tracing::{debug, error, info, warn};

use beacon_db::Database;
use beacon_push::dispatch::{DispatchError, OfflinePushDispatcher};
use beacon_types::api::StatusResponse;
use beacon_types::events::{EventKind, Message, MessageListener, OfflineNotify, OnlineStatus, PresenceListener};

#[derive(Debug, thiserror::Error)]
pub enum IngressError {
    #[error("failed to decode {event} payload: {source}")]
    Decode {
        event: &'static str,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to persist messages: {0}")]
    Storage(anyhow::Error),

    #[error(transparent)]
    Dispatch(#[from] DispatchError),
}

pub struct EventIngress {
    db: Arc<Database>,
    dispatcher: Option<Arc<OfflinePushDispatcher>>,
    message_listeners: Vec<Arc<dyn MessageListener>>,
    presence_listeners: Vec<Arc<dyn PresenceListener>>,
}

impl EventIngress {
    pub fn new(db: Arc<Database>) -> Self {
        Self {
            db,
            dispatcher: None,
            message_listeners: Vec::new(),
            presence_listeners: Vec::new(),
        }
    }

    pub fn with_dispatcher(mut self, dispatcher: Arc<OfflinePushDispatcher>) -> Self {
        self.dispatcher = Some(dispatcher);
        self
    }

    /// Listeners are called in registration order.
    pub fn add_message_listener(&mut self, listener: Arc<dyn MessageListener>) {
        self.message_listeners.push(listener);
    }

    /// Listeners are called in registration order.
    pub fn add_presence_listener(&mut self, listener: Arc<dyn PresenceListener>) {
        self.presence_listeners.push(listener);
    }

    /// Handles one event. Unknown kinds succeed without doing anything.
    pub async fn handle(&self, event: &str, data: &[u8]) -> Result<Value, IngressError> {
        let Some(kind) = EventKind::parse(event) else {
            debug!(event, "Ignoring unhandled event");
            return Ok(status_ok());
        };

        match kind {
            EventKind::MsgNotify => self.handle_msg_notify(data).await,
            EventKind::OnlineStatus => self.handle_online_status(data).await,
            EventKind::MsgOffline => self.handle_msg_offline(data).await,
        }
    }

    async fn handle_msg_notify(&self, data: &[u8]) -> Result<Value, IngressError> {
        let messages: Vec<Message> = decode("msg.notify", data)?;
        let ids: Vec<String> = messages.iter().map(|m| m.message_id.to_string()).collect();

        let db = self.db.clone();
        let committed = tokio::task::spawn_blocking(move || db.persist_messages(&messages))
            .await
            .map_err(|e| IngressError::Storage(anyhow::anyhow!("spawn_blocking join error: {}", e)))?
            .map_err(|e| {
                error!("Message batch rolled back: {}", e);
                IngressError::Storage(e)
            })?;

        if !committed.is_empty() {
            for listener in &self.message_listeners {
                listener.on_messages(&committed).await;
            }
        }

        info!(received = ids.len(), persisted = committed.len(), "msg.notify handled");
        Ok(json!(ids))
    }

    async fn handle_online_status(&self, data: &[u8]) -> Result<Value, IngressError> {
        let raw: Vec<String> = decode("user.onlinestatus", data)?;
        let statuses: Vec<OnlineStatus> = raw
            .iter()
            .filter_map(|s| {
                let parsed = OnlineStatus::parse(s);
                if parsed.is_none() {
                    warn!(raw = %s, "Dropping malformed online status");
                }
                parsed
            })
            .collect();

        if !statuses.is_empty() {
            for listener in &self.presence_listeners {
                listener.on_presence(&statuses).await;
            }
        }
        Ok(status_ok())
    }

    async fn handle_msg_offline(&self, data: &[u8]) -> Result<Value, IngressError> {
        let notice: OfflineNotify = decode("msg.offline", data)?;
        let Some(dispatcher) = &self.dispatcher else {
            debug!(message_id = notice.message.message_id, "Offline push disabled, dropping notice");
            return Ok(status_ok());
        };

        let message_id = notice.message.message_id;
        dispatcher.dispatch(notice).await.inspect_err(|e| {
            error!(message_id, "Offline push aborted: {}", e);
        })?;
        Ok(status_ok())
    }
}

fn decode<T: serde::de::DeserializeOwned>(event: &'static str, data: &[u8]) -> Result<T, IngressError> {
    serde_json::from_slice(data).map_err(|source| {
        error!(event, payload = %String::from_utf8_lossy(data), "Failed to decode event: {}", source);
        IngressError::Decode { event, source }
    })
}

fn status_ok() -> Value {
    json!(StatusResponse::ok())
}
