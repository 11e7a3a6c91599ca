//! # Ratekeeper
//!
//! Per-client admission control built on keyed token buckets.
//!
//! Each distinct client key (typically a network address) is granted a
//! replenishing allowance of tokens. Requests are admitted while tokens
//! remain and rejected once the allowance is spent. Every key's bucket is
//! refilled on its own schedule by a background task, and buckets that
//! sit full and idle are evicted so memory stays bounded by the set of
//! active keys.
//!
//! The limiter knows nothing about transports: callers hand it an opaque
//! key and act on the boolean it returns.
//!
//! ## Quick start
//!
//! ```rust
//! use ratekeeper::KeyedLimiter;
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), ratekeeper::ConfigError> {
//!     // 5 requests per 10 seconds per client
//!     let limiter = KeyedLimiter::with_defaults(5, Duration::from_secs(10))?;
//!
//!     if limiter.allow("203.0.113.7") {
//!         // handle the request
//!     } else {
//!         // respond with a rate-limit error
//!     }
//!
//!     limiter.shutdown().await;
//!     Ok(())
//! }
//! ```

mod bucket;
mod config;
mod error;
mod limiter;

pub use bucket::TokenBucket;
pub use config::LimiterConfig;
pub use error::ConfigError;
pub use limiter::KeyedLimiter;

use std::sync::Arc;

/// Global limiter singleton
static GLOBAL_LIMITER: std::sync::OnceLock<Arc<KeyedLimiter>> = std::sync::OnceLock::new();

/// Initialize the global limiter.
///
/// Later calls leave the already-installed limiter in place.
pub fn init_global_limiter(config: LimiterConfig) -> Result<(), ConfigError> {
    let limiter = Arc::new(KeyedLimiter::new(config)?);
    let _ = GLOBAL_LIMITER.set(limiter);
    Ok(())
}

/// Get the global limiter, if initialized.
pub fn global_limiter() -> Option<Arc<KeyedLimiter>> {
    GLOBAL_LIMITER.get().cloned()
}
