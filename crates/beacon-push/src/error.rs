use beacon_db::cache::CacheError;

#[derive(Debug, thiserror::Error)]
pub enum PushError {
    #[error("no push target registered for {0}")]
    NoTarget(String),

    #[error("unsupported push device: {device_type} (bundle {bundle_id})")]
    UnsupportedDevice { device_type: String, bundle_id: String },

    #[error("{provider} auth failed: {reason}")]
    Auth { provider: &'static str, reason: String },

    #[error("{provider} rejected push: {reason}")]
    Rejected { provider: &'static str, reason: String },

    #[error("dispatch pool is shut down")]
    PoolClosed,

    #[error("invalid provider configuration: {0}")]
    Config(String),

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("signing error: {0}")]
    Signing(#[from] jsonwebtoken::errors::Error),

    #[error("cache error: {0}")]
    Cache(#[from] CacheError),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}
