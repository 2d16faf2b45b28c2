//! Local earnings ledger.
//!
//! Running services accrue request counts and earnings into the ledger as they
//! accept paid requests. The orchestrator only reads it. Every field is an
//! accumulation and never decreases short of an explicit reset.

pub mod sqlite;

pub use sqlite::SqliteEarningsStore;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Earnings store errors.
#[derive(Debug, Error)]
pub enum EarningsError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Lock poisoned: {0}")]
    LockPoisoned(String),

    #[error("Ledger overflow for service {0}")]
    Overflow(String),
}

/// Accumulated earnings of one service, in minor units.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EarningsRecord {
    pub request_count: u64,
    pub buffer_earnings: u64,
    pub wallet_earnings: u64,
    pub channel_earnings: u64,
}

impl EarningsRecord {
    /// Sum of the three earnings pools.
    #[must_use]
    pub fn total_earnings(&self) -> u64 {
        self.buffer_earnings
            .saturating_add(self.wallet_earnings)
            .saturating_add(self.channel_earnings)
    }
}

#[cfg(test)]
impl EarningsRecord {
    /// Whether every field of `self` is at least the matching field of `earlier`.
    pub(crate) fn dominates(&self, earlier: &Self) -> bool {
        self.request_count >= earlier.request_count
            && self.buffer_earnings >= earlier.buffer_earnings
            && self.wallet_earnings >= earlier.wallet_earnings
            && self.channel_earnings >= earlier.channel_earnings
    }
}

/// Read accessor used by the orchestrator.
pub trait EarningsStore: Send + Sync {
    /// Earnings of a service. Unknown services read as all zeros.
    fn get_earnings(&self, service: &str) -> Result<EarningsRecord, EarningsError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_total_earnings_sums_pools() {
        let record = EarningsRecord {
            request_count: 4,
            buffer_earnings: 100,
            wallet_earnings: 20,
            channel_earnings: 3,
        };
        assert_eq!(record.total_earnings(), 123);
    }

    #[test]
    fn test_dominates() {
        let earlier = EarningsRecord {
            request_count: 1,
            buffer_earnings: 10,
            ..Default::default()
        };
        let later = EarningsRecord {
            request_count: 2,
            buffer_earnings: 10,
            wallet_earnings: 5,
            ..Default::default()
        };
        assert!(later.dominates(&earlier));
        assert!(!earlier.dominates(&later));
    }
}
