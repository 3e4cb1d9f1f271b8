//! REX connector pool
//!
//! Single global record converting between core tokens and REX shares.
//! Shares are priced at net asset value: `total_lendable / total_rex`.
//! Rental fees and name auction proceeds enter `total_lendable` without
//! minting shares, which raises the value of every outstanding share.
//!
//! Rentals are priced with a Bancor-style connector: `total_rent` is a
//! virtual reserve and a payment `p` rents
//! `p * total_unlent / (total_rent + p)` tokens.
//!
//! # Invariants
//!
//! - `total_lendable == total_lent + total_unlent` after every mutation
//! - all divisions truncate, so rounding always favors the pool

use crate::asset::{add_i64, mul_div, sub_i64, Asset, Symbol, REX_SYMBOL};
use crate::{Error, Result};
use serde::{Deserialize, Serialize};

/// Pool seeding parameters
#[derive(Debug, Clone, Copy)]
pub struct PoolParams {
    /// Smallest purchase allowed to seed an empty pool
    pub min_seed_amount: i64,
    /// Rent reserve assigned when the pool is seeded
    pub initial_rent_connector: i64,
}

/// Global REX pool
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RexPool {
    /// Core tokens out on open loans
    pub total_lent: Asset,

    /// Core tokens available to lend or pay sellers
    pub total_unlent: Asset,

    /// Virtual rent reserve of the rental connector
    pub total_rent: Asset,

    /// All core tokens backing REX (`total_lent + total_unlent`)
    pub total_lendable: Asset,

    /// Outstanding REX shares
    pub total_rex: Asset,

    /// Name auction proceeds waiting to enter the pool
    pub namebid_proceeds: Asset,

    /// Last assigned loan number
    pub loan_num: u64,
}

/// Sale quote against the current pool
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SaleQuote {
    /// Core tokens paid for the shares
    pub proceeds: i64,
    /// Whether `total_unlent` covers the proceeds right now
    pub fillable: bool,
}

impl RexPool {
    /// Empty, uninitialised pool
    pub fn new(core: Symbol) -> Self {
        let zero = Asset::zero(core);
        Self {
            total_lent: zero,
            total_unlent: zero,
            total_rent: zero,
            total_lendable: zero,
            total_rex: Asset::zero(REX_SYMBOL),
            namebid_proceeds: zero,
            loan_num: 0,
        }
    }

    /// Shares are outstanding and can be priced
    pub fn is_available(&self) -> bool {
        self.total_rex.amount > 0
    }

    /// Core value of `rex` shares at the current price (zero when empty)
    pub fn share_value(&self, rex: i64) -> Result<i64> {
        if !self.is_available() {
            return Ok(0);
        }
        mul_div(rex, self.total_lendable.amount, self.total_rex.amount)
    }

    /// Add `payment` to the pool and mint shares for it
    ///
    /// An empty pool is (re)seeded at one share per base unit.
    pub fn buy(&mut self, payment: i64, params: &PoolParams) -> Result<i64> {
        if payment <= 0 {
            return Err(Error::invalid("payment must be positive"));
        }
        let mut next = self.clone();
        let minted = if !next.is_available() {
            if payment < params.min_seed_amount {
                return Err(Error::invalid(format!(
                    "first purchase must be at least {} base units to seed the pool",
                    params.min_seed_amount
                )));
            }
            next.total_lendable.amount = payment;
            next.total_lent.amount = 0;
            next.total_unlent.amount = payment;
            next.total_rent.amount = params.initial_rent_connector;
            next.total_rex.amount = payment;
            payment
        } else {
            let s1 = add_i64(next.total_lendable.amount, payment, "total_lendable")?;
            let r1 = mul_div(s1, next.total_rex.amount, next.total_lendable.amount)?;
            let minted = r1 - next.total_rex.amount;
            if minted <= 0 {
                return Err(Error::invalid("payment too small to receive any REX"));
            }
            next.total_lendable.amount = s1;
            next.total_rex.amount = r1;
            next.total_unlent.amount = sub_i64(s1, next.total_lent.amount, "total_unlent")?;
            minted
        };
        next.check_invariants()?;
        *self = next;
        Ok(minted)
    }

    /// Price `rex` shares without touching the pool
    pub fn quote_sale(&self, rex: i64) -> Result<SaleQuote> {
        if !self.is_available() {
            return Err(Error::precondition("rex system not initialized yet"));
        }
        if rex <= 0 || rex > self.total_rex.amount {
            return Err(Error::inconsistent(format!(
                "sale of {} REX against {} outstanding",
                rex, self.total_rex.amount
            )));
        }
        let proceeds = mul_div(rex, self.total_lendable.amount, self.total_rex.amount)?;
        Ok(SaleQuote {
            proceeds,
            fillable: proceeds <= self.total_unlent.amount,
        })
    }

    /// Burn `rex` shares and pay out their value; the caller must have
    /// checked the quote is fillable
    pub fn sell(&mut self, rex: i64) -> Result<i64> {
        let quote = self.quote_sale(rex)?;
        if !quote.fillable {
            return Err(Error::InsufficientLiquidity(format!(
                "sale proceeds {} exceed unlent {}",
                quote.proceeds, self.total_unlent.amount
            )));
        }
        let mut next = self.clone();
        next.total_rex.amount = sub_i64(next.total_rex.amount, rex, "total_rex")?;
        next.total_lendable.amount =
            sub_i64(next.total_lendable.amount, quote.proceeds, "total_lendable")?;
        next.total_unlent.amount = sub_i64(
            next.total_lendable.amount,
            next.total_lent.amount,
            "total_unlent",
        )?;
        next.check_invariants()?;
        *self = next;
        Ok(quote.proceeds)
    }

    /// Tokens rented out for `payment` at the current connector price
    pub fn rent_quote(&self, payment: i64) -> Result<i64> {
        let reserve = add_i64(self.total_rent.amount, payment, "total_rent")?;
        mul_div(payment, self.total_unlent.amount, reserve)
    }

    /// Account for a new or renewed loan: tokens move from unlent to
    /// lent, the payment joins unlent as yield
    ///
    /// Returns the loan number when `new_loan` is set.
    pub fn add_loan(&mut self, payment: i64, rented: i64, new_loan: bool) -> Result<Option<u64>> {
        if rented > self.total_unlent.amount {
            return Err(Error::InsufficientLiquidity(format!(
                "cannot lend {} with only {} unlent",
                rented, self.total_unlent.amount
            )));
        }
        let mut next = self.clone();
        next.total_rent.amount = add_i64(next.total_rent.amount, payment, "total_rent")?;
        next.total_unlent.amount = add_i64(
            sub_i64(next.total_unlent.amount, rented, "total_unlent")?,
            payment,
            "total_unlent",
        )?;
        next.total_lent.amount = add_i64(next.total_lent.amount, rented, "total_lent")?;
        next.total_lendable.amount = add_i64(
            next.total_unlent.amount,
            next.total_lent.amount,
            "total_lendable",
        )?;
        let loan_num = if new_loan {
            next.loan_num = next
                .loan_num
                .checked_add(1)
                .ok_or_else(|| Error::ArithmeticOverflow("loan number".to_string()))?;
            Some(next.loan_num)
        } else {
            None
        };
        next.check_invariants()?;
        *self = next;
        Ok(loan_num)
    }

    /// Return a loan's staked tokens to unlent and shrink the rent reserve
    pub fn remove_loan(&mut self, total_staked: i64) -> Result<()> {
        let mut next = self.clone();
        let reserve = add_i64(next.total_unlent.amount, total_staked, "connector")?;
        let delta_rent = mul_div(total_staked, next.total_rent.amount, reserve)?;
        next.total_rent.amount -= delta_rent;
        next.total_lent.amount = sub_i64(next.total_lent.amount, total_staked, "total_lent")?;
        next.total_unlent.amount = add_i64(next.total_unlent.amount, total_staked, "total_unlent")?;
        next.total_lendable.amount = add_i64(
            next.total_unlent.amount,
            next.total_lent.amount,
            "total_lendable",
        )?;
        next.check_invariants()?;
        *self = next;
        Ok(())
    }

    /// Fee income: grows lendable without minting shares
    pub fn add_income(&mut self, amount: i64) -> Result<()> {
        if amount < 0 {
            return Err(Error::invalid("income cannot be negative"));
        }
        let mut next = self.clone();
        next.total_unlent.amount = add_i64(next.total_unlent.amount, amount, "total_unlent")?;
        next.total_lendable.amount =
            add_i64(next.total_lendable.amount, amount, "total_lendable")?;
        next.check_invariants()?;
        *self = next;
        Ok(())
    }

    /// Record name auction proceeds for the next housekeeping pass
    pub fn add_namebid_proceeds(&mut self, amount: i64) -> Result<()> {
        self.namebid_proceeds.amount =
            add_i64(self.namebid_proceeds.amount, amount, "namebid_proceeds")?;
        Ok(())
    }

    /// Fold pending name auction proceeds into the pool
    pub fn settle_namebid_proceeds(&mut self) -> Result<i64> {
        let pending = self.namebid_proceeds.amount;
        if pending == 0 || !self.is_available() {
            return Ok(0);
        }
        self.add_income(pending)?;
        self.namebid_proceeds.amount = 0;
        Ok(pending)
    }

    /// Verify the pool accounting identities
    pub fn check_invariants(&self) -> Result<()> {
        let sum = self
            .total_lent
            .amount
            .checked_add(self.total_unlent.amount)
            .ok_or_else(|| Error::ArithmeticOverflow("total_lent + total_unlent".to_string()))?;
        if sum != self.total_lendable.amount {
            return Err(Error::inconsistent(format!(
                "total_lendable {} != total_lent {} + total_unlent {}",
                self.total_lendable, self.total_lent, self.total_unlent
            )));
        }
        if self.total_lent.amount < 0 || self.total_rex.amount < 0 || self.total_rent.amount < 0 {
            return Err(Error::inconsistent("pool totals went negative"));
        }
        if self.total_rex.amount > 0 && self.total_lendable.amount <= 0 {
            return Err(Error::inconsistent("outstanding REX without backing tokens"));
        }
        Ok(())
    }
}
