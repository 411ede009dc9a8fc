pub mod announce;
pub mod error;
pub mod imcore;
pub mod sweep;
pub mod tracker;
pub mod weights;

#[cfg(test)]
pub(crate) mod testutil;

pub use error::PresenceError;
pub use tracker::PresenceTracker;
