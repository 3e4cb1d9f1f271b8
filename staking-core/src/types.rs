//! Shared identifiers

use serde::{Deserialize, Serialize};
use std::fmt;

/// Account name on the host ledger
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AccountName(String);

impl AccountName {
    /// Create new account name
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Get as string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AccountName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for AccountName {
    fn from(name: &str) -> Self {
        Self(name.to_string())
    }
}

/// Bandwidth resource a loan pays for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum LoanKind {
    /// CPU time
    Cpu,
    /// Network bandwidth
    Net,
}

impl LoanKind {
    /// Split a stake delta into `(net, cpu)` components
    pub fn split(&self, delta: i64) -> (i64, i64) {
        match self {
            LoanKind::Cpu => (0, delta),
            LoanKind::Net => (delta, 0),
        }
    }
}

impl fmt::Display for LoanKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LoanKind::Cpu => write!(f, "cpu"),
            LoanKind::Net => write!(f, "net"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_loan_kind_split() {
        assert_eq!(LoanKind::Cpu.split(7), (0, 7));
        assert_eq!(LoanKind::Net.split(-7), (-7, 0));
    }
}
