//! Fee bidding
//!
//! Bids start from the network estimate times `gas_price_multiplier`.
//! Retries and speed-ups multiply further, and nothing ever exceeds the
//! configured ceiling.

use crate::config::FeeConfig;
use crate::types::FeeBid;

const GWEI: u128 = 1_000_000_000;

#[derive(Debug, Clone)]
pub struct GasPolicy {
    pub multiplier: f64,
    pub ceiling: u128,
    pub retry_multiplier: f64,
    pub speed_up_multiplier: f64,
}

impl From<&FeeConfig> for GasPolicy {
    fn from(config: &FeeConfig) -> Self {
        Self {
            multiplier: config.gas_price_multiplier,
            ceiling: config.max_fee_per_gas_gwei as u128 * GWEI,
            retry_multiplier: config.retry_fee_multiplier,
            speed_up_multiplier: config.speed_up_fee_multiplier,
        }
    }
}

impl Default for GasPolicy {
    fn default() -> Self {
        Self::from(&FeeConfig::default())
    }
}

fn scale(value: u128, factor: f64) -> u128 {
    (value as f64 * factor) as u128
}

impl GasPolicy {
    /// Bid for the `attempt`-th submission of a message (0 = first)
    pub fn bid_for_attempt(&self, estimate: FeeBid, attempt: u32) -> FeeBid {
        let factor = self.multiplier * self.retry_multiplier.powi(attempt as i32);
        self.cap(FeeBid {
            max_fee_per_gas: scale(estimate.max_fee_per_gas, factor),
            max_priority_fee_per_gas: scale(estimate.max_priority_fee_per_gas, factor),
        })
    }

    /// Escalate a bid after an underpriced rejection
    pub fn bump(&self, previous: FeeBid) -> FeeBid {
        self.escalate(previous, self.retry_multiplier)
    }

    /// Replacement bid for a pending transaction.
    ///
    /// `None` once the ceiling leaves no room above the previous bid.
    pub fn speed_up(&self, previous: FeeBid) -> Option<FeeBid> {
        let next = self.escalate(previous, self.speed_up_multiplier);
        if next.max_fee_per_gas <= previous.max_fee_per_gas {
            return None;
        }
        Some(next)
    }

    fn escalate(&self, previous: FeeBid, factor: f64) -> FeeBid {
        self.cap(FeeBid {
            max_fee_per_gas: scale(previous.max_fee_per_gas, factor),
            max_priority_fee_per_gas: scale(previous.max_priority_fee_per_gas, factor),
        })
    }

    /// Clamp to the ceiling; priority fee never exceeds max fee
    pub fn cap(&self, bid: FeeBid) -> FeeBid {
        let max_fee_per_gas = bid.max_fee_per_gas.min(self.ceiling);
        FeeBid {
            max_fee_per_gas,
            max_priority_fee_per_gas: bid.max_priority_fee_per_gas.min(max_fee_per_gas),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn estimate(gwei: u128) -> FeeBid {
        FeeBid {
            max_fee_per_gas: gwei * GWEI,
            max_priority_fee_per_gas: GWEI,
        }
    }

    fn policy() -> GasPolicy {
        GasPolicy {
            multiplier: 1.1,
            ceiling: 100 * GWEI,
            retry_multiplier: 1.2,
            speed_up_multiplier: 1.5,
        }
    }

    #[test]
    fn test_initial_bid_applies_multiplier() {
        let bid = policy().bid_for_attempt(estimate(10), 0);
        assert_eq!(bid.max_fee_per_gas, 11 * GWEI);
        assert_eq!(bid.max_priority_fee_per_gas, 1_100_000_000);
    }

    #[test]
    fn test_retry_escalates() {
        let p = policy();
        let first = p.bid_for_attempt(estimate(10), 0);
        let second = p.bid_for_attempt(estimate(10), 1);
        let third = p.bid_for_attempt(estimate(10), 2);
        assert!(second.max_fee_per_gas > first.max_fee_per_gas);
        assert!(third.max_fee_per_gas > second.max_fee_per_gas);
        assert_eq!(second.max_fee_per_gas, 13_200_000_000);
    }

    #[test]
    fn test_ceiling_is_never_exceeded() {
        let p = policy();
        assert_eq!(p.bid_for_attempt(estimate(500), 0).max_fee_per_gas, 100 * GWEI);
        assert_eq!(p.bid_for_attempt(estimate(10), 30).max_fee_per_gas, 100 * GWEI);
        let bumped = p.bump(estimate(95));
        assert_eq!(bumped.max_fee_per_gas, 100 * GWEI);
    }

    #[test]
    fn test_speed_up() {
        let p = policy();
        let bid = estimate(10);
        let faster = p.speed_up(bid).unwrap();
        assert_eq!(faster.max_fee_per_gas, 15 * GWEI);
        assert_eq!(faster.max_priority_fee_per_gas, 1_500_000_000);

        // already at the ceiling
        assert!(p.speed_up(estimate(100)).is_none());
    }

    #[test]
    fn test_priority_capped_by_max_fee() {
        let p = policy();
        let bid = p.cap(FeeBid {
            max_fee_per_gas: 2 * GWEI,
            max_priority_fee_per_gas: 5 * GWEI,
        });
        assert_eq!(bid.max_priority_fee_per_gas, 2 * GWEI);
    }

    #[test]
    fn test_from_fee_config() {
        let p = GasPolicy::from(&FeeConfig::default());
        assert_eq!(p.ceiling, 500 * GWEI);
        assert_eq!(p.speed_up_multiplier, 1.5);
    }
}
