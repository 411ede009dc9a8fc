pub mod dispatch;
pub mod eligibility;
pub mod error;
pub mod locale;
pub mod payload;
pub mod pool;
pub mod providers;
pub mod registry;
pub mod resolver;
pub mod router;
pub mod target;

#[cfg(test)]
pub(crate) mod testutil;

pub use error::PushError;
