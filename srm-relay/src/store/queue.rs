//! Durable ordered delivery queue
//!
//! Entries live under a composite `(scope_key, sequence)` key, so a plain
//! range walk yields every device scope in ascending sequence order. The
//! claim walk enforces the two queue invariants:
//!
//! - only the lowest-sequence live entry of a scope is ever eligible
//! - at most one entry per scope is `processing`, bounded by a lease
//!
//! A crashed worker's lease simply expires; the next claim walk picks the
//! entry up again without any sweeper.

use super::{RelayDb, StoreError, StoreResult};
use redb::{Database, ReadableDatabase, ReadableTable, TableDefinition};
use shared::util::{new_id, now_millis};
use shared::{DeviceScope, EntryClaim, EntryStatus, ErrorCode, NormalizedError, QueueEntry};
use std::sync::Arc;

/// Entries: (scope_key, sequence) -> JSON [`QueueEntry`]
pub(super) const ENTRIES_TABLE: TableDefinition<(&str, u64), &[u8]> =
    TableDefinition::new("queue_entries");

/// Last allocated sequence per scope: scope_key -> u64
pub(super) const SEQUENCES_TABLE: TableDefinition<&str, u64> =
    TableDefinition::new("queue_sequences");

/// Index: entry id -> JSON (scope_key, sequence)
pub(super) const BY_ID_TABLE: TableDefinition<&str, &[u8]> =
    TableDefinition::new("queue_entries_by_id");

/// Queue entry counts by status
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueueStats {
    pub pending: u64,
    pub processing: u64,
    pub completed: u64,
    pub failed: u64,
}

/// Durable per-device FIFO queue
#[derive(Clone)]
pub struct QueueStore {
    db: Arc<Database>,
}

impl QueueStore {
    pub fn new(db: &RelayDb) -> Self {
        Self {
            db: db.raw().clone(),
        }
    }

    /// Append a transaction to its device scope, allocating the next
    /// sequence number. The payload is opaque and never touched again.
    pub fn enqueue(
        &self,
        scope: &DeviceScope,
        payload: serde_json::Value,
    ) -> StoreResult<QueueEntry> {
        let now = now_millis();
        let scope_key = scope.key();

        let txn = self.db.begin_write()?;
        let entry = {
            let mut sequences = txn.open_table(SEQUENCES_TABLE)?;
            let sequence = match sequences.get(scope_key.as_str())? {
                Some(guard) => guard.value() + 1,
                None => 1,
            };
            sequences.insert(scope_key.as_str(), sequence)?;

            let entry = QueueEntry {
                id: new_id(),
                scope: scope.clone(),
                sequence,
                payload,
                status: EntryStatus::Pending,
                retry_count: 0,
                next_attempt_at: now,
                claim: None,
                last_error: None,
                last_error_detail: None,
                created_at: now,
                updated_at: now,
            };

            let mut entries = txn.open_table(ENTRIES_TABLE)?;
            entries.insert(
                (scope_key.as_str(), sequence),
                serde_json::to_vec(&entry)?.as_slice(),
            )?;

            let mut by_id = txn.open_table(BY_ID_TABLE)?;
            by_id.insert(
                entry.id.as_str(),
                serde_json::to_vec(&(scope_key.as_str(), sequence))?.as_slice(),
            )?;

            entry
        };
        txn.commit()?;

        Ok(entry)
    }

    /// Claim up to `limit` due entries across device scopes.
    ///
    /// For each scope only the head (lowest-sequence live entry) is
    /// considered: claimed when pending and due, re-claimed when its lease
    /// has expired, skipped otherwise. Claimed entries move to
    /// `processing` under `claim_id` with a lease of `lease_ms`.
    pub fn claim_due(
        &self,
        claim_id: &str,
        now: i64,
        lease_ms: i64,
        limit: usize,
    ) -> StoreResult<Vec<QueueEntry>> {
        if limit == 0 {
            return Ok(Vec::new());
        }

        let txn = self.db.begin_write()?;
        let claimed = {
            let mut entries = txn.open_table(ENTRIES_TABLE)?;

            // Read pass: find each scope's head and decide eligibility.
            let mut candidates: Vec<QueueEntry> = Vec::new();
            {
                let mut current_scope: Option<String> = None;
                let mut head_decided = false;

                for row in entries.iter()? {
                    let (key, guard) = row?;
                    let (scope_key, _) = key.value();

                    if current_scope.as_deref() != Some(scope_key) {
                        current_scope = Some(scope_key.to_string());
                        head_decided = false;
                    }
                    if head_decided {
                        continue;
                    }

                    let entry: QueueEntry = serde_json::from_slice(guard.value())?;
                    if entry.status.is_terminal() {
                        continue;
                    }

                    // This is the scope head; whatever happens, nothing
                    // younger in this scope may run.
                    head_decided = true;

                    if entry.is_due(now) || entry.lease_expired(now) {
                        candidates.push(entry);
                        if candidates.len() == limit {
                            break;
                        }
                    }
                }
            }

            // Write pass: grant the claims.
            let mut claimed = Vec::with_capacity(candidates.len());
            for mut entry in candidates {
                if entry.lease_expired(now) {
                    tracing::warn!(
                        entry_id = %entry.id,
                        scope = %entry.scope,
                        "Reclaiming entry with expired lease"
                    );
                }
                entry.status = EntryStatus::Processing;
                entry.claim = Some(EntryClaim {
                    claim_id: claim_id.to_string(),
                    lease_expires_at: now + lease_ms,
                });
                entry.updated_at = now;

                entries.insert(
                    (entry.scope.key().as_str(), entry.sequence),
                    serde_json::to_vec(&entry)?.as_slice(),
                )?;
                claimed.push(entry);
            }
            claimed
        };
        txn.commit()?;

        Ok(claimed)
    }

    /// Mark a processing entry completed. `Duplicate` completions keep
    /// their code for audit; plain `Ok` stores no error.
    pub fn mark_completed(
        &self,
        id: &str,
        claim_id: &str,
        outcome: &NormalizedError,
    ) -> StoreResult<QueueEntry> {
        self.transition(id, claim_id, |entry, now| {
            entry.status = EntryStatus::Completed;
            entry.claim = None;
            entry.last_error = match outcome.code {
                ErrorCode::Ok => None,
                code => Some(code),
            };
            entry.last_error_detail = None;
            entry.updated_at = now;
        })
    }

    /// Return a processing entry to `pending` after a retryable outcome.
    pub fn reschedule(
        &self,
        id: &str,
        claim_id: &str,
        outcome: &NormalizedError,
        delay_ms: u64,
    ) -> StoreResult<QueueEntry> {
        self.transition(id, claim_id, |entry, now| {
            entry.status = EntryStatus::Pending;
            entry.claim = None;
            entry.retry_count += 1;
            entry.next_attempt_at = now + delay_ms as i64;
            entry.last_error = Some(outcome.code);
            entry.last_error_detail = outcome.detail.clone();
            entry.updated_at = now;
        })
    }

    /// Hand a processing entry straight back to `pending` without touching
    /// its retry budget. Used when an attempt is cancelled before an
    /// outcome exists (worker shutdown); the entry is due again at once.
    pub fn release(
        &self,
        id: &str,
        claim_id: &str,
        outcome: &NormalizedError,
    ) -> StoreResult<QueueEntry> {
        self.transition(id, claim_id, |entry, now| {
            entry.status = EntryStatus::Pending;
            entry.claim = None;
            entry.last_error = Some(outcome.code);
            entry.last_error_detail = outcome.detail.clone();
            entry.updated_at = now;
        })
    }

    /// Dead-letter a processing entry. Terminal; requires operator action.
    pub fn mark_failed(
        &self,
        id: &str,
        claim_id: &str,
        outcome: &NormalizedError,
    ) -> StoreResult<QueueEntry> {
        self.transition(id, claim_id, |entry, now| {
            entry.status = EntryStatus::Failed;
            entry.claim = None;
            entry.last_error = Some(outcome.code);
            entry.last_error_detail = outcome.detail.clone();
            entry.updated_at = now;
        })
    }

    /// Re-open a dead-letter as pending with a fresh retry budget.
    /// The sequence number is retained, so FIFO order against still-queued
    /// successors is preserved.
    pub fn requeue_dead_letter(&self, id: &str) -> StoreResult<QueueEntry> {
        let now = now_millis();
        let txn = self.db.begin_write()?;
        let entry = {
            let mut entries = txn.open_table(ENTRIES_TABLE)?;
            let (scope_key, sequence) = Self::locate(&txn, id)?;

            let mut entry: QueueEntry = {
                let guard = entries
                    .get((scope_key.as_str(), sequence))?
                    .ok_or_else(|| StoreError::EntryNotFound(id.to_string()))?;
                serde_json::from_slice(guard.value())?
            };

            if entry.status != EntryStatus::Failed {
                return Err(StoreError::NotDeadLetter(id.to_string()));
            }

            entry.status = EntryStatus::Pending;
            entry.retry_count = 0;
            entry.next_attempt_at = now;
            entry.last_error = None;
            entry.last_error_detail = None;
            entry.updated_at = now;

            entries.insert(
                (scope_key.as_str(), sequence),
                serde_json::to_vec(&entry)?.as_slice(),
            )?;
            entry
        };
        txn.commit()?;
        Ok(entry)
    }

    /// Fetch one entry by id.
    pub fn get(&self, id: &str) -> StoreResult<Option<QueueEntry>> {
        let txn = self.db.begin_read()?;
        let by_id = txn.open_table(BY_ID_TABLE)?;
        let Some(guard) = by_id.get(id)? else {
            return Ok(None);
        };
        let (scope_key, sequence): (String, u64) = serde_json::from_slice(guard.value())?;

        let entries = txn.open_table(ENTRIES_TABLE)?;
        match entries.get((scope_key.as_str(), sequence))? {
            Some(guard) => Ok(Some(serde_json::from_slice(guard.value())?)),
            None => Ok(None),
        }
    }

    /// All terminal failed entries, oldest first. Operator surface.
    pub fn dead_letters(&self) -> StoreResult<Vec<QueueEntry>> {
        let txn = self.db.begin_read()?;
        let entries = txn.open_table(ENTRIES_TABLE)?;

        let mut failed = Vec::new();
        for row in entries.iter()? {
            let (_, guard) = row?;
            let entry: QueueEntry = serde_json::from_slice(guard.value())?;
            if entry.status == EntryStatus::Failed {
                failed.push(entry);
            }
        }
        failed.sort_by_key(|e| e.updated_at);
        Ok(failed)
    }

    /// Entry counts by status.
    pub fn stats(&self) -> StoreResult<QueueStats> {
        let txn = self.db.begin_read()?;
        let entries = txn.open_table(ENTRIES_TABLE)?;

        let mut stats = QueueStats::default();
        for row in entries.iter()? {
            let (_, guard) = row?;
            let entry: QueueEntry = serde_json::from_slice(guard.value())?;
            match entry.status {
                EntryStatus::Pending => stats.pending += 1,
                EntryStatus::Processing => stats.processing += 1,
                EntryStatus::Completed => stats.completed += 1,
                EntryStatus::Failed => stats.failed += 1,
            }
        }
        Ok(stats)
    }

    /// Apply a mutation to a processing entry owned by `claim_id`.
    fn transition(
        &self,
        id: &str,
        claim_id: &str,
        apply: impl FnOnce(&mut QueueEntry, i64),
    ) -> StoreResult<QueueEntry> {
        let now = now_millis();
        let txn = self.db.begin_write()?;
        let entry = {
            let (scope_key, sequence) = Self::locate(&txn, id)?;
            let mut entries = txn.open_table(ENTRIES_TABLE)?;

            let mut entry: QueueEntry = {
                let guard = entries
                    .get((scope_key.as_str(), sequence))?
                    .ok_or_else(|| StoreError::EntryNotFound(id.to_string()))?;
                serde_json::from_slice(guard.value())?
            };

            let holds_claim = entry.status == EntryStatus::Processing
                && entry
                    .claim
                    .as_ref()
                    .is_some_and(|c| c.claim_id == claim_id);
            if !holds_claim {
                return Err(StoreError::StaleClaim(id.to_string()));
            }

            apply(&mut entry, now);

            entries.insert(
                (scope_key.as_str(), sequence),
                serde_json::to_vec(&entry)?.as_slice(),
            )?;
            entry
        };
        txn.commit()?;
        Ok(entry)
    }

    fn locate(txn: &redb::WriteTransaction, id: &str) -> StoreResult<(String, u64)> {
        let by_id = txn.open_table(BY_ID_TABLE)?;
        let guard = by_id
            .get(id)?
            .ok_or_else(|| StoreError::EntryNotFound(id.to_string()))?;
        Ok(serde_json::from_slice(guard.value())?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::ErrorCode;

    fn store() -> QueueStore {
        QueueStore::new(&RelayDb::open_in_memory().unwrap())
    }

    fn scope() -> DeviceScope {
        DeviceScope::new("t1", "b1", "d1")
    }

    fn ok() -> NormalizedError {
        NormalizedError::new(ErrorCode::Ok, Some(200), None)
    }

    fn temp_unavailable() -> NormalizedError {
        NormalizedError::new(ErrorCode::TempUnavailable, Some(500), None)
    }

    #[test]
    fn enqueue_allocates_ascending_sequences_per_scope() {
        let store = store();
        let a = store.enqueue(&scope(), serde_json::json!({"n": 1})).unwrap();
        let b = store.enqueue(&scope(), serde_json::json!({"n": 2})).unwrap();
        let other = store
            .enqueue(&DeviceScope::new("t1", "b1", "d2"), serde_json::json!({}))
            .unwrap();

        assert_eq!(a.sequence, 1);
        assert_eq!(b.sequence, 2);
        assert_eq!(other.sequence, 1);
    }

    #[test]
    fn only_the_scope_head_is_claimable() {
        let store = store();
        for n in 1..=3 {
            store.enqueue(&scope(), serde_json::json!({ "n": n })).unwrap();
        }

        let now = now_millis();
        let claimed = store.claim_due("w1", now, 60_000, 16).unwrap();
        assert_eq!(claimed.len(), 1);
        assert_eq!(claimed[0].sequence, 1);

        // Head is processing: nothing else in the scope may be claimed.
        assert!(store.claim_due("w2", now, 60_000, 16).unwrap().is_empty());

        // Completing the head releases the next sequence.
        store.mark_completed(&claimed[0].id, "w1", &ok()).unwrap();
        let next = store.claim_due("w1", now, 60_000, 16).unwrap();
        assert_eq!(next.len(), 1);
        assert_eq!(next[0].sequence, 2);
    }

    #[test]
    fn independent_scopes_claim_in_parallel() {
        let store = store();
        store.enqueue(&DeviceScope::new("t1", "b1", "d1"), serde_json::json!({})).unwrap();
        store.enqueue(&DeviceScope::new("t1", "b1", "d2"), serde_json::json!({})).unwrap();
        store.enqueue(&DeviceScope::new("t2", "b9", "d9"), serde_json::json!({})).unwrap();

        let claimed = store.claim_due("w1", now_millis(), 60_000, 16).unwrap();
        assert_eq!(claimed.len(), 3);
    }

    #[test]
    fn future_next_attempt_is_not_due() {
        let store = store();
        let entry = store.enqueue(&scope(), serde_json::json!({})).unwrap();
        let claimed = store.claim_due("w1", now_millis(), 60_000, 16).unwrap();
        assert_eq!(claimed.len(), 1);

        store
            .reschedule(&entry.id, "w1", &temp_unavailable(), 60_000)
            .unwrap();

        // Rescheduled an hour out: not due now.
        assert!(store.claim_due("w1", now_millis(), 60_000, 16).unwrap().is_empty());

        // But due once the clock passes next_attempt_at.
        let later = now_millis() + 120_000;
        let claimed = store.claim_due("w1", later, 60_000, 16).unwrap();
        assert_eq!(claimed.len(), 1);
        assert_eq!(claimed[0].retry_count, 1);
    }

    #[test]
    fn expired_lease_is_reclaimed() {
        let store = store();
        store.enqueue(&scope(), serde_json::json!({})).unwrap();

        let now = now_millis();
        let claimed = store.claim_due("w1", now, 1_000, 16).unwrap();
        assert_eq!(claimed.len(), 1);

        // Lease still live: no takeover.
        assert!(store.claim_due("w2", now, 1_000, 16).unwrap().is_empty());

        // Lease lapsed: a second worker takes over.
        let after_lease = now + 2_000;
        let reclaimed = store.claim_due("w2", after_lease, 1_000, 16).unwrap();
        assert_eq!(reclaimed.len(), 1);
        assert_eq!(
            reclaimed[0].claim.as_ref().unwrap().claim_id,
            "w2".to_string()
        );

        // The first worker's claim is now stale and its writes rejected.
        let err = store.mark_completed(&reclaimed[0].id, "w1", &ok()).unwrap_err();
        assert!(matches!(err, StoreError::StaleClaim(_)));
    }

    #[test]
    fn failed_head_unblocks_successors() {
        let store = store();
        let first = store.enqueue(&scope(), serde_json::json!({})).unwrap();
        store.enqueue(&scope(), serde_json::json!({})).unwrap();

        let now = now_millis();
        store.claim_due("w1", now, 60_000, 16).unwrap();
        store
            .mark_failed(&first.id, "w1", &temp_unavailable())
            .unwrap();

        let claimed = store.claim_due("w1", now, 60_000, 16).unwrap();
        assert_eq!(claimed.len(), 1);
        assert_eq!(claimed[0].sequence, 2);
    }

    #[test]
    fn release_returns_entry_without_spending_retry_budget() {
        let store = store();
        let entry = store.enqueue(&scope(), serde_json::json!({})).unwrap();
        store.claim_due("w1", now_millis(), 60_000, 16).unwrap();

        let released = store
            .release(&entry.id, "w1", &temp_unavailable())
            .unwrap();
        assert_eq!(released.status, EntryStatus::Pending);
        assert_eq!(released.retry_count, 0);

        // Immediately claimable again.
        let reclaimed = store.claim_due("w1", now_millis(), 60_000, 16).unwrap();
        assert_eq!(reclaimed.len(), 1);
    }

    #[test]
    fn dead_letter_requeue_resets_retry_budget() {
        let store = store();
        let entry = store.enqueue(&scope(), serde_json::json!({})).unwrap();
        store.claim_due("w1", now_millis(), 60_000, 16).unwrap();
        store
            .mark_failed(&entry.id, "w1", &temp_unavailable())
            .unwrap();

        let dead = store.dead_letters().unwrap();
        assert_eq!(dead.len(), 1);
        assert_eq!(dead[0].id, entry.id);

        let reopened = store.requeue_dead_letter(&entry.id).unwrap();
        assert_eq!(reopened.status, EntryStatus::Pending);
        assert_eq!(reopened.retry_count, 0);
        assert!(reopened.last_error.is_none());

        // Only failed entries can be requeued.
        assert!(matches!(
            store.requeue_dead_letter(&entry.id),
            Err(StoreError::NotDeadLetter(_))
        ));
    }

    #[test]
    fn stats_count_by_status() {
        let store = store();
        let a = store.enqueue(&scope(), serde_json::json!({})).unwrap();
        store.enqueue(&scope(), serde_json::json!({})).unwrap();

        store.claim_due("w1", now_millis(), 60_000, 16).unwrap();
        store.mark_completed(&a.id, "w1", &ok()).unwrap();

        let stats = store.stats().unwrap();
        assert_eq!(
            stats,
            QueueStats {
                pending: 1,
                processing: 0,
                completed: 1,
                failed: 0
            }
        );
    }

    #[test]
    fn queue_state_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("relay.redb");

        let entry_id = {
            let store = QueueStore::new(&RelayDb::open(&path).unwrap());
            let entry = store.enqueue(&scope(), serde_json::json!({"n": 1})).unwrap();
            store.enqueue(&scope(), serde_json::json!({"n": 2})).unwrap();
            entry.id
        };

        let store = QueueStore::new(&RelayDb::open(&path).unwrap());
        let loaded = store.get(&entry_id).unwrap().unwrap();
        assert_eq!(loaded.sequence, 1);
        assert_eq!(store.stats().unwrap().pending, 2);

        // Sequence allocation continues where it left off.
        let next = store.enqueue(&scope(), serde_json::json!({"n": 3})).unwrap();
        assert_eq!(next.sequence, 3);
    }

    #[test]
    fn payload_survives_round_trip_unchanged() {
        let store = store();
        let payload = serde_json::json!({
            "noTrans": 41,
            "items": [{"descr": "café allongé", "prix": "3.75"}],
        });
        let entry = store.enqueue(&scope(), payload.clone()).unwrap();
        let loaded = store.get(&entry.id).unwrap().unwrap();
        assert_eq!(loaded.payload, payload);
    }
}
