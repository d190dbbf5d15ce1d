//! Admission rate limiting for courier-server.
//!
//! Provides protection against connection flooding before a connection is
//! handed a task of its own.
//!
//! ## Design Notes
//!
//! Peers are plain TCP clients, so connections are keyed by source IP. A
//! global limiter caps aggregate accept rate even when each IP is within
//! quota. Both use the governor crate; the keyed limiter is backed by DashMap
//! and shrunk periodically by [`spawn_shrink_task`].

use crate::config::{ConfigError, LimitsConfig};
use governor::clock::DefaultClock;
use governor::middleware::NoOpMiddleware;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter};
use std::net::IpAddr;
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::interval;

/// Type alias for a keyed rate limiter using DashMap.
type KeyedLimiter<K> = RateLimiter<
    K,
    dashmap::DashMap<K, InMemoryState>,
    DefaultClock,
    NoOpMiddleware<governor::clock::QuantaInstant>,
>;

/// Type alias for a direct (non-keyed) rate limiter.
type DirectLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Rate limiters applied at accept time.
#[derive(Clone)]
pub struct RateLimits {
    /// Limits connection attempts per source IP.
    connection_limiter: Arc<KeyedLimiter<IpAddr>>,

    /// Limits aggregate accept rate.
    global_limiter: Arc<DirectLimiter>,
}

impl std::fmt::Debug for RateLimits {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimits")
            .field("connection_limiter", &"KeyedLimiter<IpAddr>")
            .field("global_limiter", &"DirectLimiter")
            .finish()
    }
}

impl RateLimits {
    /// Create rate limiters from configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] if a configured rate is zero.
    pub fn new(config: &LimitsConfig) -> Result<Self, ConfigError> {
        let per_ip = NonZeroU32::new(config.connections_per_ip).ok_or(ConfigError::Invalid {
            field: "limits.connections_per_ip",
            reason: "must be greater than zero".into(),
        })?;
        let global = NonZeroU32::new(config.global_connections_per_second).ok_or(
            ConfigError::Invalid {
                field: "limits.global_connections_per_second",
                reason: "must be greater than zero".into(),
            },
        )?;

        Ok(Self {
            connection_limiter: Arc::new(RateLimiter::keyed(Quota::per_minute(per_ip))),
            global_limiter: Arc::new(RateLimiter::direct(Quota::per_second(global))),
        })
    }

    /// Check if a connection from `ip` is allowed.
    pub fn check_connection(&self, ip: IpAddr) -> Result<(), RateLimitError> {
        self.connection_limiter
            .check_key(&ip)
            .map_err(|_| RateLimitError::ConnectionLimitExceeded)
    }

    /// Check if the global accept rate is within limits.
    pub fn check_global(&self) -> Result<(), RateLimitError> {
        self.global_limiter
            .check()
            .map_err(|_| RateLimitError::GlobalLimitExceeded)
    }

    /// Get the number of tracked source IPs (for metrics).
    pub fn connection_keys_count(&self) -> usize {
        self.connection_limiter.len()
    }

    /// Evict entries whose quota has fully recharged.
    pub fn shrink(&self) {
        self.connection_limiter.retain_recent();
        self.connection_limiter.shrink_to_fit();
    }
}

/// Rate limit error types.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RateLimitError {
    /// Too many connection attempts from this IP.
    #[error("connection rate limit exceeded")]
    ConnectionLimitExceeded,
    /// Aggregate accept rate exceeded.
    #[error("global rate limit exceeded")]
    GlobalLimitExceeded,
}

/// Spawn a background task that periodically shrinks the keyed limiter.
///
/// The task exits once `shutdown` flips to `true`.
pub fn spawn_shrink_task(
    limits: RateLimits,
    every: Duration,
    mut shutdown: watch::Receiver<bool>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        tracing::debug!("Limiter maintenance started (interval: {:?})", every);
        let mut timer = interval(every);

        loop {
            tokio::select! {
                _ = timer.tick() => {
                    let before = limits.connection_keys_count();
                    limits.shrink();
                    tracing::debug!(
                        "Limiter maintenance: {} -> {} tracked IPs",
                        before,
                        limits.connection_keys_count()
                    );
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
        tracing::debug!("Limiter maintenance stopped");
    })
}
