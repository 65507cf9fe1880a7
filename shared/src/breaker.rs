//! Circuit breaker state
//!
//! Persisted per delivery scope. Transitions are owned by the breaker
//! component; everything else only reads.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BreakerState {
    Closed,
    Open,
    HalfOpen,
}

/// Durable breaker record for one delivery scope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BreakerRecord {
    /// Delivery scope key, e.g. `ESSAI:tenant-1`
    pub scope: String,
    pub state: BreakerState,
    /// Consecutive non-success outcomes while CLOSED
    pub consecutive_failures: u32,
    /// Unix millis the breaker last opened
    #[serde(skip_serializing_if = "Option::is_none")]
    pub opened_at: Option<i64>,
}

impl BreakerRecord {
    pub fn closed(scope: impl Into<String>) -> Self {
        Self {
            scope: scope.into(),
            state: BreakerState::Closed,
            consecutive_failures: 0,
            opened_at: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_record_is_closed() {
        let r = BreakerRecord::closed("ESSAI:t1");
        assert_eq!(r.state, BreakerState::Closed);
        assert_eq!(r.consecutive_failures, 0);
        assert!(r.opened_at.is_none());
    }
}
