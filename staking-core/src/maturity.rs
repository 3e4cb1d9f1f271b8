//! Day-keyed REX maturity buckets
//!
//! Purchased REX is locked until the start of the day `maturity_days`
//! after purchase. Buckets are kept in ascending order of due date and
//! folded into the matured scalar lazily, whenever the balance is read.
//!
//! The savings bucket uses [`TimePoint::MAX`] as its due date, so it
//! never folds and always sits at the back of the schedule.

use crate::time::TimePoint;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// REX that becomes sellable at `due`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MaturityBucket {
    /// First instant the REX is sellable
    pub due: TimePoint,
    /// REX amount (base units)
    pub amount: i64,
}

/// Due date for REX acquired at `now`
pub fn maturity_date(now: TimePoint, maturity_days: i64) -> TimePoint {
    now.start_of_day().plus_days(maturity_days)
}

/// Split `buckets` into the amount already matured at `now` and the
/// buckets still pending
pub fn consolidate(
    buckets: &VecDeque<MaturityBucket>,
    now: TimePoint,
) -> (i64, VecDeque<MaturityBucket>) {
    let mut matured = 0i64;
    let mut remaining = VecDeque::with_capacity(buckets.len());
    for bucket in buckets {
        if bucket.due <= now && remaining.is_empty() {
            matured += bucket.amount;
        } else {
            remaining.push_back(*bucket);
        }
    }
    (matured, remaining)
}

/// Remove and return the savings amount
pub fn take_savings(buckets: &mut VecDeque<MaturityBucket>) -> i64 {
    match buckets.back() {
        Some(bucket) if bucket.due == TimePoint::MAX => {
            let amount = bucket.amount;
            buckets.pop_back();
            amount
        }
        _ => 0,
    }
}

/// Append a savings bucket (no-op for zero)
pub fn put_savings(buckets: &mut VecDeque<MaturityBucket>, amount: i64) {
    if amount != 0 {
        buckets.push_back(MaturityBucket {
            due: TimePoint::MAX,
            amount,
        });
    }
}

/// Add `amount` to the bucket due at `due`, which must not precede the
/// last non-savings bucket; savings must have been taken out first
pub fn schedule(buckets: &mut VecDeque<MaturityBucket>, due: TimePoint, amount: i64) {
    match buckets.back_mut() {
        Some(last) if last.due == due => last.amount += amount,
        _ => buckets.push_back(MaturityBucket { due, amount }),
    }
}

/// Sum of all bucket amounts (savings included)
pub fn total(buckets: &VecDeque<MaturityBucket>) -> i64 {
    buckets.iter().map(|b| b.amount).sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::SECONDS_PER_DAY;

    fn day(d: i64) -> TimePoint {
        TimePoint::from_secs(d * SECONDS_PER_DAY)
    }

    #[test]
    fn test_maturity_date_is_day_aligned() {
        let now = day(10).plus_secs(1234);
        assert_eq!(maturity_date(now, 4), day(14));
    }

    #[test]
    fn test_consolidate_folds_due_buckets() {
        let buckets: VecDeque<_> = vec![
            MaturityBucket { due: day(3), amount: 5 },
            MaturityBucket { due: day(4), amount: 7 },
            MaturityBucket { due: day(9), amount: 11 },
            MaturityBucket { due: TimePoint::MAX, amount: 13 },
        ]
        .into();

        let (matured, remaining) = consolidate(&buckets, day(4));
        assert_eq!(matured, 12);
        assert_eq!(remaining.len(), 2);
        assert_eq!(total(&remaining), 24);

        let (matured, remaining) = consolidate(&buckets, day(2));
        assert_eq!(matured, 0);
        assert_eq!(remaining, buckets);
    }

    #[test]
    fn test_savings_never_matures() {
        let mut buckets = VecDeque::new();
        put_savings(&mut buckets, 40);
        let (matured, remaining) = consolidate(&buckets, TimePoint::from_secs(i64::MAX / 2_000_000));
        assert_eq!(matured, 0);
        assert_eq!(remaining.len(), 1);

        let mut buckets = remaining;
        assert_eq!(take_savings(&mut buckets), 40);
        assert!(buckets.is_empty());
        assert_eq!(take_savings(&mut buckets), 0);
    }

    #[test]
    fn test_schedule_merges_same_day() {
        let mut buckets = VecDeque::new();
        schedule(&mut buckets, day(5), 10);
        schedule(&mut buckets, day(5), 15);
        schedule(&mut buckets, day(6), 1);
        assert_eq!(buckets.len(), 2);
        assert_eq!(buckets[0].amount, 25);
    }
}
