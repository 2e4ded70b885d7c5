//! Configuration for the library facade and its worker pools.

use std::time::Duration;

use crate::store::MAX_ACTIVE_RESERVATIONS;

/// Default bounded queue capacity per pool.
pub const DEFAULT_QUEUE_CAPACITY: usize = 100;

/// Default number of workers per pool.
pub const DEFAULT_WORKERS: usize = 3;

/// Default simulated processing latency per job.
pub const DEFAULT_PROCESSING_DELAY: Duration = Duration::from_millis(100);

/// Default period of the expiration sweeper.
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// Sizing of one worker pool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolConfig {
    /// Maximum number of queued jobs; further jobs are dropped.
    pub capacity: usize,
    /// Number of consumer tasks.
    pub workers: usize,
    /// Simulated latency of handling one job.
    pub processing_delay: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_QUEUE_CAPACITY,
            workers: DEFAULT_WORKERS,
            processing_delay: DEFAULT_PROCESSING_DELAY,
        }
    }
}

/// Library configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LibraryConfig {
    /// Period between expiration sweeps.
    pub sweep_interval: Duration,
    /// Cap on simultaneous active reservations per user.
    pub max_active_reservations: usize,
    /// Notification-email pool.
    pub notifications: PoolConfig,
    /// Reservation-processing pool.
    pub reservations: PoolConfig,
}

impl Default for LibraryConfig {
    fn default() -> Self {
        Self {
            sweep_interval: DEFAULT_SWEEP_INTERVAL,
            max_active_reservations: MAX_ACTIVE_RESERVATIONS,
            notifications: PoolConfig::default(),
            reservations: PoolConfig::default(),
        }
    }
}

impl LibraryConfig {
    /// Build a configuration from defaults, overridden by environment
    /// variables where set and parsable.
    ///
    /// - `CATALOG_SWEEP_INTERVAL_SECS`
    /// - `CATALOG_MAX_ACTIVE_RESERVATIONS`
    /// - `CATALOG_QUEUE_CAPACITY` (both pools)
    /// - `CATALOG_WORKERS` (both pools)
    /// - `CATALOG_PROCESSING_DELAY_MS` (both pools)
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let parse = |key: &str| lookup(key).and_then(|s| s.trim().parse::<u64>().ok());
        let defaults = Self::default();

        let sweep_interval = parse("CATALOG_SWEEP_INTERVAL_SECS")
            .map(Duration::from_secs)
            .unwrap_or(defaults.sweep_interval);

        let max_active_reservations = parse("CATALOG_MAX_ACTIVE_RESERVATIONS")
            .map(|n| n as usize)
            .unwrap_or(defaults.max_active_reservations);

        let pool = PoolConfig {
            capacity: parse("CATALOG_QUEUE_CAPACITY")
                .map(|n| n as usize)
                .unwrap_or(DEFAULT_QUEUE_CAPACITY),
            workers: parse("CATALOG_WORKERS")
                .map(|n| n as usize)
                .unwrap_or(DEFAULT_WORKERS),
            processing_delay: parse("CATALOG_PROCESSING_DELAY_MS")
                .map(Duration::from_millis)
                .unwrap_or(DEFAULT_PROCESSING_DELAY),
        };

        Self {
            sweep_interval,
            max_active_reservations,
            notifications: pool.clone(),
            reservations: pool,
        }
    }
}
