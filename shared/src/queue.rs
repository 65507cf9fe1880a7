//! Delivery queue entries
//!
//! One [`QueueEntry`] per fiscal transaction awaiting delivery. Entries in
//! the same [`DeviceScope`] form an independent FIFO ordering domain keyed
//! by a per-device sequence number.

use crate::outcome::ErrorCode;
use serde::{Deserialize, Serialize};

/// The (tenant, branch, device) triple that defines one FIFO ordering domain.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DeviceScope {
    pub tenant_id: String,
    pub branch_id: String,
    pub device_id: String,
}

impl DeviceScope {
    pub fn new(
        tenant_id: impl Into<String>,
        branch_id: impl Into<String>,
        device_id: impl Into<String>,
    ) -> Self {
        Self {
            tenant_id: tenant_id.into(),
            branch_id: branch_id.into(),
            device_id: device_id.into(),
        }
    }

    /// Storage key. Identifiers are ASCII and the separator is not part of
    /// the identifier alphabet, so the mapping is injective.
    pub fn key(&self) -> String {
        format!("{}/{}/{}", self.tenant_id, self.branch_id, self.device_id)
    }
}

impl std::fmt::Display for DeviceScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}/{}", self.tenant_id, self.branch_id, self.device_id)
    }
}

/// Entry lifecycle. Terminal states are immutable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl EntryStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, EntryStatus::Completed | EntryStatus::Failed)
    }
}

/// Processing claim held by one worker, bounded by a lease.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryClaim {
    /// Claim id of the worker that holds the lease
    pub claim_id: String,
    /// Unix millis after which the claim is considered abandoned
    pub lease_expires_at: i64,
}

/// One pending or in-flight fiscal transaction.
///
/// The payload is opaque to the adapter and never mutated after enqueue;
/// only queue metadata changes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueEntry {
    pub id: String,
    pub scope: DeviceScope,
    /// Monotonically increasing per device scope
    pub sequence: u64,
    pub payload: serde_json::Value,
    pub status: EntryStatus,
    pub retry_count: u32,
    /// Unix millis before which the entry must not be attempted
    pub next_attempt_at: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub claim: Option<EntryClaim>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<ErrorCode>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error_detail: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
}

impl QueueEntry {
    /// Eligible for claiming: pending and past its next-attempt time.
    pub fn is_due(&self, now: i64) -> bool {
        self.status == EntryStatus::Pending && self.next_attempt_at <= now
    }

    /// Claim lease has lapsed (crashed or stalled worker).
    pub fn lease_expired(&self, now: i64) -> bool {
        self.status == EntryStatus::Processing
            && self
                .claim
                .as_ref()
                .is_none_or(|c| c.lease_expires_at <= now)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(status: EntryStatus, next_attempt_at: i64) -> QueueEntry {
        QueueEntry {
            id: "e-1".into(),
            scope: DeviceScope::new("t", "b", "d"),
            sequence: 1,
            payload: serde_json::json!({}),
            status,
            retry_count: 0,
            next_attempt_at,
            claim: None,
            last_error: None,
            last_error_detail: None,
            created_at: 0,
            updated_at: 0,
        }
    }

    #[test]
    fn due_requires_pending_and_elapsed_time() {
        assert!(entry(EntryStatus::Pending, 10).is_due(10));
        assert!(!entry(EntryStatus::Pending, 11).is_due(10));
        assert!(!entry(EntryStatus::Processing, 0).is_due(10));
        assert!(!entry(EntryStatus::Completed, 0).is_due(10));
    }

    #[test]
    fn missing_claim_counts_as_expired() {
        let mut e = entry(EntryStatus::Processing, 0);
        assert!(e.lease_expired(100));
        e.claim = Some(EntryClaim {
            claim_id: "w-1".into(),
            lease_expires_at: 200,
        });
        assert!(!e.lease_expired(100));
        assert!(e.lease_expired(200));
    }

    #[test]
    fn scope_key_is_stable() {
        let scope = DeviceScope::new("tenant", "branch", "device");
        assert_eq!(scope.key(), "tenant/branch/device");
    }
}
