use crate::ConstructionError;
use std::time::Duration;

/// Largest accepted capacity. Cursor differences must fit in `u32`.
pub const MAX_CAPACITY: usize = 1 << 31;

/// Which [`BackoffStrategy`](crate::BackoffStrategy) the pipeline loops use
/// when the ring is observed full (producer) or empty (consumer).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WaitStrategy {
    /// Unconditional sleep of `backoff_interval`.
    #[default]
    Fixed,
    /// Spin, then yield, then sleep with a doubling delay capped at `backoff_interval`.
    Exponential,
    /// Condvar wait woken on publish, bounded by `backoff_interval`.
    Doorbell,
}

impl std::str::FromStr for WaitStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "fixed" => Ok(Self::Fixed),
            "exponential" => Ok(Self::Exponential),
            "doorbell" => Ok(Self::Doorbell),
            other => Err(format!("unknown wait strategy: {other}")),
        }
    }
}

/// Configuration for the ring and the producer/consumer loops.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Config {
    /// Number of slots. Must be a power of two (default: 512)
    pub capacity: usize,
    /// Items per burst (default: 64)
    pub max_burst: usize,
    /// Delay before retrying a failed enqueue/dequeue (default: 10ms)
    pub backoff_interval: Duration,
    /// How the loops wait between retries
    pub wait_strategy: WaitStrategy,
    /// Enable metrics collection (slight overhead)
    pub enable_metrics: bool,
    /// Stop producing after this many items. `None` runs until shutdown.
    pub item_limit: Option<u64>,
}

impl Config {
    /// Creates a new configuration with custom settings.
    pub const fn new(capacity: usize, max_burst: usize, backoff_interval: Duration) -> Self {
        Self {
            capacity,
            max_burst,
            backoff_interval,
            wait_strategy: WaitStrategy::Fixed,
            enable_metrics: false,
            item_limit: None,
        }
    }

    /// Returns the mask for index wrapping.
    #[inline]
    pub const fn mask(&self) -> usize {
        self.capacity.wrapping_sub(1)
    }

    /// Sets the wait strategy.
    pub fn with_wait_strategy(mut self, strategy: WaitStrategy) -> Self {
        self.wait_strategy = strategy;
        self
    }

    /// Sets the backoff interval.
    pub fn with_backoff_interval(mut self, interval: Duration) -> Self {
        self.backoff_interval = interval;
        self
    }

    /// Enables or disables metrics.
    pub fn with_metrics(mut self, enabled: bool) -> Self {
        self.enable_metrics = enabled;
        self
    }

    /// Limits the total number of items the producer generates.
    pub fn with_item_limit(mut self, limit: u64) -> Self {
        self.item_limit = Some(limit);
        self
    }

    /// Checks the capacity rules and that a full burst fits in the ring.
    pub fn validate(&self) -> Result<(), ConstructionError> {
        validate_capacity(self.capacity)?;
        if self.max_burst == 0 || self.max_burst > self.capacity {
            return Err(ConstructionError::InvalidBurst {
                burst: self.max_burst,
                capacity: self.capacity,
            });
        }
        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new(512, 64, Duration::from_millis(10))
    }
}

/// Small ring, short bursts, exponential wait capped at 100µs.
pub const LOW_LATENCY_CONFIG: Config = Config {
    capacity: 256,
    max_burst: 16,
    backoff_interval: Duration::from_micros(100),
    wait_strategy: WaitStrategy::Exponential,
    enable_metrics: false,
    item_limit: None,
};

/// 64K slots, 1K bursts, doorbell wait capped at 1ms.
pub const HIGH_THROUGHPUT_CONFIG: Config = Config {
    capacity: 1 << 16,
    max_burst: 1024,
    backoff_interval: Duration::from_millis(1),
    wait_strategy: WaitStrategy::Doorbell,
    enable_metrics: false,
    item_limit: None,
};

pub(crate) fn validate_capacity(capacity: usize) -> Result<(), ConstructionError> {
    if capacity == 0 {
        return Err(ConstructionError::ZeroCapacity);
    }
    if !capacity.is_power_of_two() {
        return Err(ConstructionError::NotPowerOfTwo { capacity });
    }
    if capacity > MAX_CAPACITY {
        return Err(ConstructionError::TooLarge {
            capacity,
            max: MAX_CAPACITY,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_matches_reference_constants() {
        let config = Config::default();
        assert_eq!(config.capacity, 512);
        assert_eq!(config.mask(), 511);
        assert_eq!(config.max_burst, 64);
        assert_eq!(config.backoff_interval, Duration::from_millis(10));
        assert_eq!(config.wait_strategy, WaitStrategy::Fixed);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_presets_are_valid() {
        assert!(LOW_LATENCY_CONFIG.validate().is_ok());
        assert!(HIGH_THROUGHPUT_CONFIG.validate().is_ok());
    }

    #[test]
    fn test_capacity_validation() {
        assert_eq!(validate_capacity(0), Err(ConstructionError::ZeroCapacity));
        assert_eq!(
            validate_capacity(500),
            Err(ConstructionError::NotPowerOfTwo { capacity: 500 })
        );
        assert!(validate_capacity(512).is_ok());
        assert!(validate_capacity(1).is_ok());
        assert!(validate_capacity(MAX_CAPACITY).is_ok());
    }

    #[test]
    fn test_burst_must_fit_capacity() {
        let config = Config::new(64, 65, Duration::from_millis(1));
        assert_eq!(
            config.validate(),
            Err(ConstructionError::InvalidBurst { burst: 65, capacity: 64 })
        );

        let config = Config::new(64, 0, Duration::from_millis(1));
        assert!(config.validate().is_err());

        let config = Config::new(64, 64, Duration::from_millis(1));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_wait_strategy_parse() {
        assert_eq!("fixed".parse::<WaitStrategy>(), Ok(WaitStrategy::Fixed));
        assert_eq!("exponential".parse::<WaitStrategy>(), Ok(WaitStrategy::Exponential));
        assert_eq!("doorbell".parse::<WaitStrategy>(), Ok(WaitStrategy::Doorbell));
        assert!("spin".parse::<WaitStrategy>().is_err());
    }
}
