#[derive(Debug, thiserror::Error)]
pub enum PresenceError {
    #[error("presence storage error: {0}")]
    Storage(anyhow::Error),

    #[error("IM core request failed: {0}")]
    ImCore(anyhow::Error),

    #[error("directory lookup failed: {0}")]
    Directory(anyhow::Error),

    #[error("device weight table poisoned")]
    Poisoned,
}
