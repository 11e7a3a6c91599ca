//! Construction-time error types

/// Errors produced when a limiter or bucket is configured with
/// out-of-contract parameters.
///
/// Admission itself never fails; these only surface from constructors
/// and [`crate::KeyedLimiter::add_key`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("capacity must be greater than 0")]
    ZeroCapacity,

    #[error("refill interval must be greater than 0")]
    ZeroInterval,

    #[error("staleness threshold must be greater than 0")]
    ZeroStaleAfter,
}
