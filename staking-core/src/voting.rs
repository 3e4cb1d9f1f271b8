//! Voter and producer records and the vote weight schedule
//!
//! Weights are applied as deltas: each voter caches the weight it last
//! contributed (`last_vote_weight`) and every refresh moves producers and
//! proxies by `new - last`. Downstream totals are never rebuilt from
//! scratch, so weights are integers and every delta cancels exactly.

use crate::time::{TimePoint, SECONDS_PER_WEEK};
use crate::types::AccountName;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};

/// Vote weight in whole weight units
pub type VoteWeight = i128;

/// Checked weight addition with a labelled overflow error
pub(crate) fn add_weight(a: VoteWeight, b: VoteWeight, what: &str) -> Result<VoteWeight> {
    a.checked_add(b)
        .ok_or_else(|| Error::ArithmeticOverflow(format!("{} overflow", what)))
}

/// Stake-weighted voting record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VoterInfo {
    /// Voter
    pub owner: AccountName,

    /// Proxy casting this voter's weight, if any
    pub proxy: Option<AccountName>,

    /// Producers voted for, sorted and unique
    pub producers: Vec<AccountName>,

    /// Core tokens counted for voting (base units)
    pub staked: i64,

    /// Weight contributed on the last refresh
    pub last_vote_weight: VoteWeight,

    /// Weight delegated to this account as a proxy
    pub proxied_vote_weight: VoteWeight,

    /// Registered as a proxy
    pub is_proxy: bool,
}

impl VoterInfo {
    /// Fresh record with no stake
    pub fn new(owner: AccountName) -> Self {
        Self {
            owner,
            proxy: None,
            producers: Vec::new(),
            staked: 0,
            last_vote_weight: 0,
            proxied_vote_weight: 0,
            is_proxy: false,
        }
    }
}

/// Block producer as seen by the vote tally
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProducerInfo {
    /// Producer account
    pub owner: AccountName,
    /// Accumulated vote weight
    pub total_votes: VoteWeight,
    /// Accepting new votes
    pub is_active: bool,
}

/// Stake to vote weight conversion
///
/// Implementations must be deterministic and monotonic in both
/// arguments so that replaying the same actions yields the same tally.
pub trait VoteWeightSchedule: Send + Sync {
    /// Weight of `staked` base units at `now`
    fn weight(&self, staked: i64, now: TimePoint) -> VoteWeight;
}

/// Binary places kept for the fractional doubling factor
const FACTOR_BITS: u32 = 32;

/// Weight doubles every `doubling_weeks` weeks after `epoch`
#[derive(Debug, Clone, Copy)]
pub struct DoublingSchedule {
    /// Reference point where the factor is 1
    pub epoch: TimePoint,
    /// Weeks per doubling
    pub doubling_weeks: u32,
}

impl DoublingSchedule {
    /// `2^(step / period)` in `FACTOR_BITS` fixed point, `step < period`
    fn partial_factor(step: i64, period: i64) -> i128 {
        let factor = (step as f64 / period as f64).exp2();
        (factor * (1u64 << FACTOR_BITS) as f64).floor() as i128
    }
}

impl VoteWeightSchedule for DoublingSchedule {
    fn weight(&self, staked: i64, now: TimePoint) -> VoteWeight {
        let weeks = (now.secs() - self.epoch.secs()).div_euclid(SECONDS_PER_WEEK);
        let period = i64::from(self.doubling_weeks.max(1));
        let doublings = weeks.div_euclid(period);
        let scaled = i128::from(staked) * Self::partial_factor(weeks.rem_euclid(period), period);
        if scaled == 0 {
            return 0;
        }

        let shifted = if doublings >= 0 {
            u32::try_from(doublings)
                .ok()
                .and_then(|d| 2i128.checked_pow(d))
                .and_then(|m| scaled.checked_mul(m))
                .unwrap_or(i128::MAX)
        } else {
            scaled >> doublings.unsigned_abs().min(127)
        };
        shifted >> FACTOR_BITS
    }
}

/// One unit of weight per staked base unit
#[derive(Debug, Clone, Copy, Default)]
pub struct FlatSchedule;

impl VoteWeightSchedule for FlatSchedule {
    fn weight(&self, staked: i64, _now: TimePoint) -> VoteWeight {
        i128::from(staked)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_doubling_schedule() {
        let schedule = DoublingSchedule {
            epoch: TimePoint::from_secs(1_000),
            doubling_weeks: 52,
        };
        let at = |weeks: i64| TimePoint::from_secs(1_000 + weeks * SECONDS_PER_WEEK);

        assert_eq!(schedule.weight(100, at(0)), 100);
        assert_eq!(schedule.weight(100, at(52)), 200);
        assert_eq!(schedule.weight(100, at(104)), 400);
        assert_eq!(schedule.weight(100, at(-52)), 50);
        // constant within a week
        assert_eq!(
            schedule.weight(100, at(52).plus_secs(SECONDS_PER_WEEK - 1)),
            200
        );
        // 2^(26/52) = 1.41421...
        assert_eq!(schedule.weight(1_000_000, at(26)), 1_414_213);
        assert!(schedule.weight(100, at(53)) > schedule.weight(100, at(52)));
        assert!(schedule.weight(101, at(53)) > schedule.weight(100, at(53)));
    }

    #[test]
    fn test_flat_schedule() {
        assert_eq!(FlatSchedule.weight(42, TimePoint::MAX), 42);
    }

    #[test]
    fn test_doubling_schedule_saturates_far_future() {
        let schedule = DoublingSchedule {
            epoch: TimePoint::from_secs(0),
            doubling_weeks: 1,
        };
        let far = TimePoint::from_secs(200 * SECONDS_PER_WEEK);
        assert_eq!(schedule.weight(1, far), i128::MAX >> FACTOR_BITS);
        assert_eq!(schedule.weight(0, far), 0);
    }
}
