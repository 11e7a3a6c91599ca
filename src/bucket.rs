//! Per-key token bucket state

use parking_lot::Mutex;
use std::time::Duration;
use tokio::time::Instant;

/// Admission state for a single client key.
///
/// A bucket starts full and hands out one token per admitted request.
/// Refill is an all-or-nothing reset to capacity, performed once per
/// refill interval by the owning [`crate::KeyedLimiter`]'s maintenance
/// task. This is deliberately coarser than a continuous per-second
/// trickle: within one interval the bucket behaves like a fixed window,
/// which keeps the accounting to a single integer.
///
/// All mutable state sits behind one mutex, so concurrent
/// [`try_consume`](TokenBucket::try_consume) calls serialize and exactly
/// one caller wins the last token.
#[derive(Debug)]
pub struct TokenBucket {
    /// Maximum tokens the bucket can hold
    capacity: u32,
    /// Period between refill ticks, fixed at creation
    refill_interval: Duration,
    state: Mutex<BucketState>,
}

#[derive(Debug)]
struct BucketState {
    /// Tokens currently available, always in `0..=capacity`
    tokens: u32,
    /// Updated on every successful consumption; drives idle eviction
    last_consumed_at: Instant,
}

impl TokenBucket {
    /// Create a bucket that starts full.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` or `refill_interval` is zero. Validated entry
    /// points ([`crate::LimiterConfig::validate`],
    /// [`crate::KeyedLimiter::add_key`]) reject these parameters with a
    /// [`crate::ConfigError`] before reaching this constructor.
    pub fn new(capacity: u32, refill_interval: Duration) -> Self {
        assert!(capacity > 0, "capacity must be greater than 0");
        assert!(
            !refill_interval.is_zero(),
            "refill_interval must be greater than 0"
        );

        Self {
            capacity,
            refill_interval,
            state: Mutex::new(BucketState {
                tokens: capacity,
                last_consumed_at: Instant::now(),
            }),
        }
    }

    /// Atomically take one token if any are available.
    ///
    /// Returns `true` and records the consumption time on success,
    /// `false` with no state change when the bucket is empty.
    pub fn try_consume(&self) -> bool {
        let mut state = self.state.lock();
        if state.tokens == 0 {
            return false;
        }
        state.tokens -= 1;
        state.last_consumed_at = Instant::now();
        true
    }

    /// Reset the token count to capacity. No-op when already full.
    pub fn refill(&self) {
        let mut state = self.state.lock();
        if state.tokens < self.capacity {
            state.tokens = self.capacity;
        }
    }

    /// Whether the bucket currently holds its full capacity.
    pub fn is_full(&self) -> bool {
        self.state.lock().tokens == self.capacity
    }

    /// Whether more than `threshold` has elapsed since the last
    /// successful consumption (or creation, for a never-used bucket).
    pub fn is_idle_for(&self, threshold: Duration) -> bool {
        self.state.lock().last_consumed_at.elapsed() > threshold
    }

    /// Snapshot of the currently available tokens.
    pub fn available(&self) -> u32 {
        self.state.lock().tokens
    }

    /// Maximum tokens the bucket can hold.
    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    /// Period between refill ticks.
    pub fn refill_interval(&self) -> Duration {
        self.refill_interval
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bucket_starts_full() {
        let bucket = TokenBucket::new(5, Duration::from_secs(10));
        assert!(bucket.is_full());
        assert_eq!(bucket.available(), 5);
        assert_eq!(bucket.capacity(), 5);
        assert_eq!(bucket.refill_interval(), Duration::from_secs(10));
    }

    #[test]
    fn test_consume_until_empty() {
        let bucket = TokenBucket::new(3, Duration::from_secs(10));

        assert!(bucket.try_consume());
        assert!(bucket.try_consume());
        assert!(bucket.try_consume());
        assert_eq!(bucket.available(), 0);

        // Empty bucket rejects without going negative
        assert!(!bucket.try_consume());
        assert_eq!(bucket.available(), 0);
    }

    #[test]
    fn test_refill_resets_to_capacity() {
        let bucket = TokenBucket::new(4, Duration::from_secs(1));

        bucket.try_consume();
        bucket.try_consume();
        assert_eq!(bucket.available(), 2);

        bucket.refill();
        assert!(bucket.is_full());
        assert_eq!(bucket.available(), 4);

        // Refilling a full bucket never exceeds capacity
        bucket.refill();
        assert_eq!(bucket.available(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_idleness_tracks_last_consumption() {
        let bucket = TokenBucket::new(2, Duration::from_secs(1));
        let threshold = Duration::from_secs(5);

        assert!(!bucket.is_idle_for(threshold));

        tokio::time::sleep(Duration::from_secs(6)).await;
        assert!(bucket.is_idle_for(threshold));

        // Consumption resets the idle clock
        assert!(bucket.try_consume());
        assert!(!bucket.is_idle_for(threshold));
    }

    #[test]
    #[should_panic(expected = "capacity must be greater than 0")]
    fn test_zero_capacity_panics() {
        let _ = TokenBucket::new(0, Duration::from_secs(1));
    }

    #[test]
    #[should_panic(expected = "refill_interval must be greater than 0")]
    fn test_zero_interval_panics() {
        let _ = TokenBucket::new(1, Duration::ZERO);
    }
}
