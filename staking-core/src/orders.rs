//! REX sell-order queue
//!
//! Orders that could not be filled when placed wait here until the pool
//! has enough unlent tokens. At most one order per owner. Filling is
//! strictly first-in first-out by `order_time`; ties are broken by
//! arrival sequence.

use crate::asset::Asset;
use crate::time::TimePoint;
use crate::types::AccountName;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Pending sale of matured REX
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RexOrder {
    /// Seller
    pub owner: AccountName,

    /// Shares to sell
    pub rex_requested: Asset,

    /// When the order was queued
    pub order_time: TimePoint,

    seq: u64,
}

impl RexOrder {
    /// New order placed at `now`
    pub fn open(owner: AccountName, rex_requested: Asset, now: TimePoint) -> Self {
        Self {
            owner,
            rex_requested,
            order_time: now,
            seq: 0,
        }
    }
}

/// Open sell orders
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OrderQueue {
    orders: BTreeMap<AccountName, RexOrder>,
    by_time: BTreeMap<(TimePoint, u64), AccountName>,
    next_seq: u64,
}

impl OrderQueue {
    /// Queue an order; fails if the owner already has one
    pub fn push(&mut self, mut order: RexOrder) -> Result<()> {
        if self.orders.contains_key(&order.owner) {
            return Err(Error::precondition(format!(
                "{} already has an open sell order",
                order.owner
            )));
        }
        self.next_seq += 1;
        order.seq = self.next_seq;
        self.by_time
            .insert((order.order_time, order.seq), order.owner.clone());
        self.orders.insert(order.owner.clone(), order);
        Ok(())
    }

    /// Order placed by `owner`
    pub fn get(&self, owner: &AccountName) -> Option<&RexOrder> {
        self.orders.get(owner)
    }

    /// REX reserved by the owner's open order
    pub fn rex_in_order(&self, owner: &AccountName) -> i64 {
        self.orders
            .get(owner)
            .map(|o| o.rex_requested.amount)
            .unwrap_or(0)
    }

    /// Earliest queued order
    pub fn front(&self) -> Option<&RexOrder> {
        self.by_time
            .values()
            .next()
            .and_then(|owner| self.orders.get(owner))
    }

    /// Remove the owner's order
    pub fn remove(&mut self, owner: &AccountName) -> Option<RexOrder> {
        let order = self.orders.remove(owner)?;
        self.by_time.remove(&(order.order_time, order.seq));
        Some(order)
    }

    /// Orders in fill order
    pub fn iter(&self) -> impl Iterator<Item = &RexOrder> {
        self.by_time.values().filter_map(|owner| self.orders.get(owner))
    }

    /// Queued orders
    pub fn len(&self) -> usize {
        self.orders.len()
    }

    /// Nothing queued
    pub fn is_empty(&self) -> bool {
        self.orders.is_empty()
    }

    /// Index and records agree
    pub fn check_invariants(&self) -> Result<()> {
        if self.by_time.len() != self.orders.len() {
            return Err(Error::inconsistent("order time index out of sync"));
        }
        for ((time, seq), owner) in &self.by_time {
            match self.orders.get(owner) {
                Some(o) if o.order_time == *time && o.seq == *seq => {}
                _ => {
                    return Err(Error::inconsistent(format!(
                        "order index entry for {} does not match its record",
                        owner
                    )))
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::asset::REX_SYMBOL;

    fn order(owner: &str, rex: i64, secs: i64) -> RexOrder {
        RexOrder::open(
            AccountName::new(owner),
            Asset::new(rex, REX_SYMBOL),
            TimePoint::from_secs(secs),
        )
    }

    #[test]
    fn test_fifo_by_order_time() {
        let mut queue = OrderQueue::default();
        queue.push(order("carol", 10, 20)).unwrap();
        queue.push(order("alice", 10, 10)).unwrap();
        queue.push(order("bob", 10, 20)).unwrap();

        let owners: Vec<&str> = queue.iter().map(|o| o.owner.as_str()).collect();
        assert_eq!(owners, vec!["alice", "carol", "bob"]);
        assert_eq!(queue.front().unwrap().owner.as_str(), "alice");

        queue.remove(&AccountName::new("alice")).unwrap();
        assert_eq!(queue.front().unwrap().owner.as_str(), "carol");
        queue.check_invariants().unwrap();
    }

    #[test]
    fn test_one_order_per_owner() {
        let mut queue = OrderQueue::default();
        queue.push(order("alice", 10, 10)).unwrap();
        let err = queue.push(order("alice", 5, 11)).unwrap_err();
        assert!(matches!(err, Error::PreconditionFailed(_)));
        assert_eq!(queue.rex_in_order(&AccountName::new("alice")), 10);
        assert_eq!(queue.rex_in_order(&AccountName::new("bob")), 0);
    }
}
