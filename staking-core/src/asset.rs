//! Fixed-point token quantities
//!
//! An [`Asset`] is a signed 64-bit amount of base units tagged with a
//! [`Symbol`]. Arithmetic between assets requires identical symbols and
//! never wraps: every operation is checked and fails with an error.
//!
//! Products and quotients that feed pool pricing are computed in 128-bit
//! intermediates by [`mul_div`] and narrowed back with a range check.

use crate::{Error, Result};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Largest representable asset magnitude (2^62 - 1)
pub const MAX_AMOUNT: i64 = (1i64 << 62) - 1;

/// Maximum symbol precision
pub const MAX_PRECISION: u8 = 18;

/// Share symbol of the resource exchange
pub const REX_SYMBOL: Symbol = Symbol::from_raw(*b"REX\0\0\0\0", 4);

/// Currency tag with decimal precision
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Symbol {
    /// Number of decimal places
    precision: u8,
    /// Up to 7 uppercase ASCII letters, zero padded
    code: [u8; 7],
}

impl Symbol {
    /// Build a symbol, validating code and precision
    pub fn new(code: &str, precision: u8) -> Result<Self> {
        if code.is_empty() || code.len() > 7 || !code.bytes().all(|b| b.is_ascii_uppercase()) {
            return Err(Error::Config(format!("invalid symbol code '{}'", code)));
        }
        if precision > MAX_PRECISION {
            return Err(Error::Config(format!(
                "symbol precision {} exceeds {}",
                precision, MAX_PRECISION
            )));
        }
        let mut raw = [0u8; 7];
        raw[..code.len()].copy_from_slice(code.as_bytes());
        Ok(Self { precision, code: raw })
    }

    pub(crate) const fn from_raw(code: [u8; 7], precision: u8) -> Self {
        Self { precision, code }
    }

    /// Decimal places
    pub fn precision(&self) -> u8 {
        self.precision
    }

    /// Symbol code, e.g. `CORE`
    pub fn code(&self) -> &str {
        let len = self.code.iter().position(|b| *b == 0).unwrap_or(7);
        std::str::from_utf8(&self.code[..len]).unwrap_or("")
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{}", self.precision, self.code())
    }
}

impl FromStr for Symbol {
    type Err = Error;

    /// Parse the `precision,CODE` form, e.g. `4,CORE`
    fn from_str(s: &str) -> Result<Self> {
        let (precision, code) = s
            .split_once(',')
            .ok_or_else(|| Error::Config(format!("symbol '{}' must be 'precision,CODE'", s)))?;
        let precision = precision
            .trim()
            .parse::<u8>()
            .map_err(|e| Error::Config(format!("invalid symbol precision in '{}': {}", s, e)))?;
        Symbol::new(code.trim(), precision)
    }
}

/// Signed quantity of a token
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Asset {
    /// Amount in base units
    pub amount: i64,
    /// Currency tag
    pub symbol: Symbol,
}

impl Asset {
    /// Create new asset
    pub fn new(amount: i64, symbol: Symbol) -> Self {
        Self { amount, symbol }
    }

    /// Zero of the given symbol
    pub fn zero(symbol: Symbol) -> Self {
        Self { amount: 0, symbol }
    }

    /// Amount within the representable range
    pub fn is_amount_within_range(&self) -> bool {
        (-MAX_AMOUNT..=MAX_AMOUNT).contains(&self.amount)
    }

    /// Strictly positive
    pub fn is_positive(&self) -> bool {
        self.amount > 0
    }

    /// Checked addition
    pub fn checked_add(self, other: Asset) -> Result<Asset> {
        self.same_symbol(&other)?;
        let amount = self
            .amount
            .checked_add(other.amount)
            .filter(|a| (-MAX_AMOUNT..=MAX_AMOUNT).contains(a))
            .ok_or_else(|| Error::ArithmeticOverflow(format!("{} + {}", self, other)))?;
        Ok(Asset::new(amount, self.symbol))
    }

    /// Checked subtraction
    pub fn checked_sub(self, other: Asset) -> Result<Asset> {
        self.same_symbol(&other)?;
        let amount = self
            .amount
            .checked_sub(other.amount)
            .filter(|a| (-MAX_AMOUNT..=MAX_AMOUNT).contains(a))
            .ok_or_else(|| Error::ArithmeticOverflow(format!("{} - {}", self, other)))?;
        Ok(Asset::new(amount, self.symbol))
    }

    /// Negated copy
    pub fn neg(self) -> Asset {
        Asset::new(-self.amount, self.symbol)
    }

    /// Decimal value in whole tokens
    pub fn to_decimal(&self) -> Decimal {
        Decimal::new(self.amount, self.symbol.precision() as u32)
    }

    /// Require a strictly positive amount of `symbol`
    pub fn require_positive(&self, symbol: Symbol, what: &str) -> Result<()> {
        if self.symbol != symbol {
            return Err(Error::invalid(format!(
                "{} must be denominated in {}, got {}",
                what, symbol, self.symbol
            )));
        }
        if self.amount <= 0 || !self.is_amount_within_range() {
            return Err(Error::invalid(format!(
                "{} must be a positive amount, got {}",
                what, self
            )));
        }
        Ok(())
    }

    /// Require a non-negative amount of `symbol`
    pub fn require_non_negative(&self, symbol: Symbol, what: &str) -> Result<()> {
        if self.symbol != symbol {
            return Err(Error::invalid(format!(
                "{} must be denominated in {}, got {}",
                what, symbol, self.symbol
            )));
        }
        if self.amount < 0 || !self.is_amount_within_range() {
            return Err(Error::invalid(format!(
                "{} must not be negative, got {}",
                what, self
            )));
        }
        Ok(())
    }

    fn same_symbol(&self, other: &Asset) -> Result<()> {
        if self.symbol != other.symbol {
            return Err(Error::invalid(format!(
                "symbol mismatch: {} vs {}",
                self.symbol, other.symbol
            )));
        }
        Ok(())
    }
}

impl fmt::Display for Asset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.to_decimal(), self.symbol.code())
    }
}

impl FromStr for Asset {
    type Err = Error;

    /// Parse `12.3400 CORE`; precision is taken from the fraction digits
    fn from_str(s: &str) -> Result<Self> {
        let (amount, code) = s
            .trim()
            .split_once(' ')
            .ok_or_else(|| Error::invalid(format!("asset '{}' must be 'AMOUNT CODE'", s)))?;
        let decimal = Decimal::from_str(amount.trim())
            .map_err(|e| Error::invalid(format!("invalid asset amount '{}': {}", amount, e)))?;
        let precision = u8::try_from(decimal.scale())
            .map_err(|_| Error::invalid(format!("precision too large in '{}'", s)))?;
        let symbol = Symbol::new(code.trim(), precision)
            .map_err(|e| Error::invalid(e.to_string()))?;
        let amount = i64::try_from(decimal.mantissa())
            .ok()
            .filter(|a| (-MAX_AMOUNT..=MAX_AMOUNT).contains(a))
            .ok_or_else(|| Error::invalid(format!("asset '{}' out of range", s)))?;
        Ok(Asset::new(amount, symbol))
    }
}

/// `a * b / c` through a 128-bit intermediate, rounded toward zero
///
/// Callers pass non-negative operands, so truncation always favors the
/// pool side of the trade.
pub fn mul_div(a: i64, b: i64, c: i64) -> Result<i64> {
    if c == 0 {
        return Err(Error::inconsistent(format!("division by zero in {} * {} / 0", a, b)));
    }
    let value = (a as i128) * (b as i128) / (c as i128);
    i64::try_from(value)
        .map_err(|_| Error::ArithmeticOverflow(format!("{} * {} / {} exceeds 64 bits", a, b, c)))
}

/// Checked `i64` addition with a labelled overflow error
pub(crate) fn add_i64(a: i64, b: i64, what: &str) -> Result<i64> {
    a.checked_add(b)
        .ok_or_else(|| Error::ArithmeticOverflow(format!("{} overflow", what)))
}

/// Checked `i64` subtraction with a labelled overflow error
pub(crate) fn sub_i64(a: i64, b: i64, what: &str) -> Result<i64> {
    a.checked_sub(b)
        .ok_or_else(|| Error::ArithmeticOverflow(format!("{} underflow", what)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn core() -> Symbol {
        Symbol::new("CORE", 4).unwrap()
    }

    #[test]
    fn test_symbol_roundtrip_text() {
        let sym: Symbol = "4,CORE".parse().unwrap();
        assert_eq!(sym, core());
        assert_eq!(sym.to_string(), "4,CORE");
        assert_eq!(REX_SYMBOL.code(), "REX");
        assert!(Symbol::new("core", 4).is_err());
        assert!(Symbol::new("TOOLONGXX", 4).is_err());
        assert!(Symbol::new("CORE", 19).is_err());
    }

    #[test]
    fn test_asset_display_and_parse() {
        let a = Asset::new(12_3400, core());
        assert_eq!(a.to_string(), "12.3400 CORE");
        let parsed: Asset = "12.3400 CORE".parse().unwrap();
        assert_eq!(parsed, a);
        assert!("12.34CORE".parse::<Asset>().is_err());
    }

    #[test]
    fn test_checked_arithmetic() {
        let a = Asset::new(10, core());
        let b = Asset::new(3, core());
        assert_eq!(a.checked_add(b).unwrap().amount, 13);
        assert_eq!(a.checked_sub(b).unwrap().amount, 7);

        let big = Asset::new(MAX_AMOUNT, core());
        assert!(matches!(
            big.checked_add(Asset::new(1, core())),
            Err(Error::ArithmeticOverflow(_))
        ));

        let rex = Asset::new(1, REX_SYMBOL);
        assert!(matches!(a.checked_add(rex), Err(Error::InvalidAmount(_))));
    }

    #[test]
    fn test_require_positive() {
        let zero = Asset::zero(core());
        assert!(zero.require_positive(core(), "payment").is_err());
        assert!(zero.require_non_negative(core(), "fund").is_ok());
        assert!(Asset::new(5, REX_SYMBOL).require_positive(core(), "payment").is_err());
    }

    #[test]
    fn test_mul_div_truncates_and_checks() {
        assert_eq!(mul_div(10, 10, 3).unwrap(), 33);
        assert_eq!(mul_div(i64::MAX, 4, 4).unwrap(), i64::MAX);
        assert!(matches!(mul_div(i64::MAX, 4, 1), Err(Error::ArithmeticOverflow(_))));
        assert!(matches!(mul_div(1, 1, 0), Err(Error::StateInconsistency(_))));
    }
}
