//! Block number to wall-clock estimation.
//!
//! Chains with a steady block interval let us approximate a block's timestamp
//! without an extra RPC round trip: `genesis + block_number * interval`.
//! The estimate drifts whenever the real interval changed over the chain's
//! history, so callers that need exact times should enable
//! `USE_CHAIN_TIMESTAMPS` instead.

use serde::{Deserialize, Serialize};

/// Linear model mapping block numbers to unix timestamps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockClock {
    genesis_timestamp: u64,
    block_time_ms: u64,
}

impl BlockClock {
    /// Unix timestamp of block 0 on the default chain.
    pub const DEFAULT_GENESIS_TIMESTAMP: u64 = 1_598_671_449;

    /// Average block interval on the default chain.
    pub const DEFAULT_BLOCK_TIME_MS: u64 = 3_000;

    /// Create a clock from a genesis timestamp (seconds) and interval (milliseconds).
    #[must_use]
    pub const fn new(genesis_timestamp: u64, block_time_ms: u64) -> Self {
        Self {
            genesis_timestamp,
            block_time_ms,
        }
    }

    /// Genesis timestamp in unix seconds.
    #[must_use]
    pub const fn genesis_timestamp(&self) -> u64 {
        self.genesis_timestamp
    }

    /// Average block interval in milliseconds.
    #[must_use]
    pub const fn block_time_ms(&self) -> u64 {
        self.block_time_ms
    }

    /// Estimate the unix timestamp (seconds) at which `block_number` was produced.
    ///
    /// Saturates instead of overflowing for absurd inputs.
    ///
    /// # Example
    ///
    /// ```
    /// use referral_sync::clock::BlockClock;
    ///
    /// let clock = BlockClock::new(1_000, 2_000);
    /// assert_eq!(clock.estimate_timestamp(10), 1_020);
    /// ```
    #[must_use]
    pub const fn estimate_timestamp(&self, block_number: u64) -> u64 {
        let elapsed_ms = block_number.saturating_mul(self.block_time_ms);
        self.genesis_timestamp.saturating_add(elapsed_ms / 1_000)
    }
}

impl Default for BlockClock {
    fn default() -> Self {
        Self::new(Self::DEFAULT_GENESIS_TIMESTAMP, Self::DEFAULT_BLOCK_TIME_MS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_genesis_block_maps_to_genesis_timestamp() {
        let clock = BlockClock::default();
        assert_eq!(clock.estimate_timestamp(0), BlockClock::DEFAULT_GENESIS_TIMESTAMP);
    }

    #[test]
    fn test_default_chain_estimate() {
        let clock = BlockClock::default();
        // 47_304_058 blocks * 3s after genesis
        assert_eq!(
            clock.estimate_timestamp(47_304_058),
            1_598_671_449 + 141_912_174
        );
    }

    #[test]
    fn test_sub_second_intervals() {
        let clock = BlockClock::new(0, 750);
        assert_eq!(clock.estimate_timestamp(4), 3);
        assert_eq!(clock.estimate_timestamp(3), 2);
    }

    #[test]
    fn test_estimate_is_monotonic() {
        let clock = BlockClock::default();
        let mut previous = 0;
        for block in (0..10_000_000).step_by(999_983) {
            let ts = clock.estimate_timestamp(block);
            assert!(ts >= previous);
            previous = ts;
        }
    }

    #[test]
    fn test_saturates_on_overflow() {
        let clock = BlockClock::new(u64::MAX - 1, 3_000);
        assert_eq!(clock.estimate_timestamp(u64::MAX), u64::MAX);
    }
}
