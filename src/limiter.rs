//! Keyed limiter: bucket registry and per-key maintenance tasks

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::interval;
use tracing::{debug, info};

use crate::bucket::TokenBucket;
use crate::config::{LimiterConfig, validate_bucket_params};
use crate::error::ConfigError;

/// Registry entry for one client key.
///
/// Holding the task handle next to the bucket keeps the invariant
/// structural: a key is present exactly while its maintenance task runs.
#[derive(Debug)]
struct KeyState {
    bucket: Arc<TokenBucket>,
    task: JoinHandle<()>,
}

/// Per-client admission control over a set of independent token buckets.
///
/// Each distinct key gets its own [`TokenBucket`], created lazily on
/// first sight with the configured defaults or explicitly via
/// [`add_key`](KeyedLimiter::add_key). Every bucket is paired with one
/// background maintenance task that refills it each interval and evicts
/// it from the registry once it has been both full and idle past the
/// staleness threshold, so abandoned keys never accumulate.
///
/// [`allow`](KeyedLimiter::allow) is non-blocking and safe to call from
/// many request-handling tasks concurrently. It must run inside a tokio
/// runtime, since first sight of a key spawns that key's maintenance
/// task.
#[derive(Debug)]
pub struct KeyedLimiter {
    config: LimiterConfig,
    buckets: Arc<DashMap<String, KeyState>>,
    /// Shared stop channel observed by every maintenance task
    stop_tx: watch::Sender<bool>,
}

impl KeyedLimiter {
    /// Create a limiter, rejecting out-of-contract configuration.
    pub fn new(config: LimiterConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let (stop_tx, _) = watch::channel(false);
        Ok(Self {
            config,
            buckets: Arc::new(DashMap::new()),
            stop_tx,
        })
    }

    /// Create a limiter from per-key defaults, using the standard
    /// staleness threshold.
    pub fn with_defaults(
        default_capacity: u32,
        default_interval: Duration,
    ) -> Result<Self, ConfigError> {
        Self::new(LimiterConfig::new(default_capacity, default_interval))
    }

    /// Decide whether one request for `key` is admitted.
    ///
    /// An unseen key gets a fresh full bucket with the default
    /// parameters, so its first request is always admitted. Never blocks
    /// and never fails; a rejected request is just `false`.
    pub fn allow(&self, key: &str) -> bool {
        let bucket = match self.buckets.get(key) {
            Some(state) => Arc::clone(&state.bucket),
            None => self.register(
                key.to_string(),
                self.config.default_capacity,
                self.config.default_interval,
            ),
        };

        // The map guard is released above; only the bucket lock is taken
        // here, so maintenance tasks touching the map are never waited on
        // while we hold a bucket.
        let admitted = bucket.try_consume();
        if !admitted {
            debug!("Admission rejected for {}: no tokens available", key);
        }
        admitted
    }

    /// Pre-register `key` with custom parameters.
    ///
    /// First registration wins: if the key already has a bucket, the
    /// call validates its arguments but changes nothing.
    pub fn add_key(
        &self,
        key: &str,
        capacity: u32,
        interval: Duration,
    ) -> Result<(), ConfigError> {
        validate_bucket_params(capacity, interval)?;
        self.register(key.to_string(), capacity, interval);
        Ok(())
    }

    /// Number of keys currently tracked.
    pub fn active_keys(&self) -> usize {
        self.buckets.len()
    }

    /// Whether `key` currently has a bucket in the registry.
    pub fn is_tracked(&self, key: &str) -> bool {
        self.buckets.contains_key(key)
    }

    /// Stop every maintenance task and wait for it to finish, emptying
    /// the registry.
    ///
    /// Admission state is discarded; keys seen afterwards start over
    /// with fresh buckets.
    pub async fn shutdown(&self) {
        info!("Shutting down keyed limiter");
        let _ = self.stop_tx.send(true);

        let keys: Vec<String> = self.buckets.iter().map(|entry| entry.key().clone()).collect();
        for key in keys {
            if let Some((_, state)) = self.buckets.remove(&key) {
                if let Err(err) = state.task.await {
                    debug!("Maintenance task for {} ended abnormally: {}", key, err);
                }
            }
        }

        info!("Keyed limiter shutdown complete");
    }

    /// Insert-if-absent on the registry.
    ///
    /// The entry API makes lookup and insert one atomic step, so two
    /// callers racing on a new key can never install two buckets or two
    /// maintenance tasks.
    fn register(&self, key: String, capacity: u32, interval: Duration) -> Arc<TokenBucket> {
        match self.buckets.entry(key.clone()) {
            Entry::Occupied(entry) => Arc::clone(&entry.get().bucket),
            Entry::Vacant(entry) => {
                let bucket = Arc::new(TokenBucket::new(capacity, interval));
                let task = self.spawn_maintenance(key, Arc::clone(&bucket));
                entry.insert(KeyState {
                    bucket: Arc::clone(&bucket),
                    task,
                });
                bucket
            }
        }
    }

    /// Start the refill-and-evict task for one bucket.
    ///
    /// The task ticks every refill interval: a non-full bucket is
    /// refilled; a bucket that has stayed full and idle past the
    /// staleness threshold removes its own registry entry and stops.
    fn spawn_maintenance(&self, key: String, bucket: Arc<TokenBucket>) -> JoinHandle<()> {
        let buckets = Arc::clone(&self.buckets);
        let stale_after = self.config.stale_after;
        let mut stop_rx = self.stop_tx.subscribe();

        tokio::spawn(async move {
            let mut ticker = interval(bucket.refill_interval());
            // The first tick completes immediately; skip it so the first
            // refill lands one full interval after creation.
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        if !bucket.is_full() {
                            bucket.refill();
                            continue;
                        }
                        if bucket.is_idle_for(stale_after) {
                            // A request racing this eviction may already
                            // have installed a replacement bucket under
                            // the same key; only remove our own entry.
                            buckets.remove_if(&key, |_, state| {
                                Arc::ptr_eq(&state.bucket, &bucket)
                            });
                            debug!("Evicted idle bucket for {}", key);
                            return;
                        }
                    }
                    _ = stop_rx.wait_for(|stopped| *stopped) => {
                        // Shutdown usually drains the entry itself; this
                        // covers tasks spawned after the signal was sent.
                        buckets.remove_if(&key, |_, state| {
                            Arc::ptr_eq(&state.bucket, &bucket)
                        });
                        debug!("Maintenance task for {} stopped", key);
                        return;
                    }
                }
            }
        })
    }
}
