//! Delivery worker
//!
//! Poll loop over the durable queue:
//!
//! 1. Claim the due scope-heads (lease-bounded, one per device scope)
//! 2. Resolve the signing profile
//! 3. Sign the payload bytes exactly as transmitted
//! 4. Gate the send through the per-scope circuit breaker
//! 5. Classify the outcome and feed it back to breaker and queue
//!
//! Several workers may run concurrently; the queue's claim walk keeps
//! per-device ordering intact regardless. A send cancelled by shutdown is
//! rescheduled as temporarily unavailable, never completed and never lost.

use crate::backoff::calculate_backoff;
use crate::breaker::{CircuitBreaker, SendPermit};
use crate::classify::classify_raw;
use crate::config::RelayConfig;
use crate::profile::ProfileStore;
use crate::receipt::build_verification_url;
use crate::sanitize::sanitize;
use crate::store::queue::QueueStore;
use crate::transmit::Transport;
use shared::util::{new_id, now_millis};
use shared::{ErrorCode, NormalizedError, QueueEntry};
use srm_sign::sign_request;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

pub struct DeliveryWorker {
    queue: QueueStore,
    profiles: Arc<dyn ProfileStore>,
    transport: Arc<dyn Transport>,
    breaker: Arc<CircuitBreaker>,
    config: RelayConfig,
    claim_id: String,
}

impl DeliveryWorker {
    pub fn new(
        queue: QueueStore,
        profiles: Arc<dyn ProfileStore>,
        transport: Arc<dyn Transport>,
        breaker: Arc<CircuitBreaker>,
        config: RelayConfig,
    ) -> Self {
        Self {
            queue,
            profiles,
            transport,
            breaker,
            config,
            claim_id: new_id(),
        }
    }

    pub fn claim_id(&self) -> &str {
        &self.claim_id
    }

    /// Main run loop: claim, deliver, repeat until shutdown.
    pub async fn run(self, shutdown: CancellationToken) {
        tracing::info!(claim_id = %self.claim_id, "Delivery worker started");

        loop {
            if shutdown.is_cancelled() {
                break;
            }

            let batch = match self.queue.claim_due(
                &self.claim_id,
                now_millis(),
                self.config.lease_ms,
                self.config.claim_batch,
            ) {
                Ok(batch) => batch,
                Err(e) => {
                    tracing::error!("Failed to claim queue entries: {e}");
                    Vec::new()
                }
            };

            if batch.is_empty() {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = tokio::time::sleep(Duration::from_millis(self.config.poll_interval_ms)) => {}
                }
                continue;
            }

            for entry in batch {
                if shutdown.is_cancelled() {
                    // Claimed but not attempted: hand the entry straight back.
                    self.reschedule_for_shutdown(&entry);
                    continue;
                }
                self.process_entry(entry, &shutdown).await;
            }
        }

        tracing::info!("Delivery worker stopped");
    }

    /// Deliver one claimed entry end to end.
    async fn process_entry(&self, entry: QueueEntry, shutdown: &CancellationToken) {
        let scope = entry.scope.clone();

        let profile = match self
            .profiles
            .resolve(&scope.tenant_id, &scope.branch_id, &scope.device_id)
            .await
        {
            Ok(profile) => profile,
            Err(e) => {
                tracing::error!(
                    entry_id = %entry.id,
                    scope = %scope,
                    error = %e,
                    "Credential resolution failed, dead-lettering"
                );
                let outcome =
                    NormalizedError::new(ErrorCode::Unknown, None, Some(sanitize(&e.to_string())));
                self.finish_failed(&entry, &outcome);
                return;
            }
        };

        // The signature must cover the exact transmitted bytes, so the
        // payload is serialized once and reused for signing and sending.
        let body = match serde_json::to_string(&entry.payload) {
            Ok(body) => body,
            Err(e) => {
                tracing::error!(entry_id = %entry.id, "Unserializable payload: {e}");
                let outcome =
                    NormalizedError::new(ErrorCode::Unknown, None, Some(sanitize(&e.to_string())));
                self.finish_failed(&entry, &outcome);
                return;
            }
        };

        let headers =
            match sign_request("POST", &self.config.transaction_path, &body, &profile) {
                Ok(headers) => headers,
                Err(e) => {
                    tracing::error!(
                        entry_id = %entry.id,
                        scope = %scope,
                        error = %e,
                        "Signing fault, dead-lettering without network contact"
                    );
                    let outcome = NormalizedError::new(
                        ErrorCode::InvalidSignature,
                        None,
                        Some(sanitize(&e.to_string())),
                    );
                    self.finish_failed(&entry, &outcome);
                    return;
                }
            };

        let breaker_scope = format!("{}:{}", profile.environment, profile.tenant_id);
        let permit = match self.breaker.check(&breaker_scope, now_millis()).await {
            Ok(permit) => permit,
            Err(e) => {
                // Breaker store trouble must not stall deliveries.
                tracing::error!(scope = %breaker_scope, "Breaker check failed, allowing send: {e}");
                SendPermit::Allow
            }
        };

        if permit == SendPermit::Blocked {
            tracing::debug!(
                entry_id = %entry.id,
                scope = %breaker_scope,
                "Circuit breaker open, rescheduling without network contact"
            );
            let outcome = NormalizedError::new(
                ErrorCode::TempUnavailable,
                None,
                Some("circuit breaker open".into()),
            );
            self.handle_retryable(&entry, &outcome);
            return;
        }
        let probe = permit == SendPermit::Probe;

        let raw = tokio::select! {
            _ = shutdown.cancelled() => {
                if probe {
                    self.breaker.abort_probe(&breaker_scope).await;
                }
                tracing::warn!(entry_id = %entry.id, "Send cancelled by shutdown, entry will be retried");
                let outcome = NormalizedError::new(
                    ErrorCode::TempUnavailable,
                    None,
                    Some("send cancelled during shutdown".into()),
                );
                if let Err(e) = self.queue.release(&entry.id, &self.claim_id, &outcome) {
                    tracing::warn!(entry_id = %entry.id, "Could not release cancelled entry: {e}");
                }
                return;
            }
            raw = self
                .transport
                .send(&self.config.transaction_path, &body, &headers) => raw,
        };

        let outcome = classify_raw(&raw);

        if let Err(e) = self
            .breaker
            .record_outcome(&breaker_scope, outcome.is_success(), probe, now_millis())
            .await
        {
            tracing::error!(scope = %breaker_scope, "Failed to record breaker outcome: {e}");
        }

        if outcome.is_success() {
            match self.queue.mark_completed(&entry.id, &self.claim_id, &outcome) {
                Ok(completed) => {
                    tracing::info!(
                        entry_id = %completed.id,
                        scope = %scope,
                        sequence = completed.sequence,
                        code = %outcome.code,
                        "Transaction delivered"
                    );
                    self.emit_receipt(&completed, headers.signature());
                }
                Err(e) => {
                    tracing::warn!(entry_id = %entry.id, "Could not complete entry: {e}");
                }
            }
        } else if outcome.retryable {
            self.handle_retryable(&entry, &outcome);
        } else {
            tracing::error!(
                entry_id = %entry.id,
                scope = %scope,
                code = %outcome.code,
                status = ?outcome.http_status,
                "Non-retryable outcome, dead-lettering"
            );
            self.finish_failed(&entry, &outcome);
        }
    }

    /// Reschedule with backoff, or dead-letter once the budget is spent.
    fn handle_retryable(&self, entry: &QueueEntry, outcome: &NormalizedError) {
        if entry.retry_count >= self.config.max_retries {
            tracing::error!(
                entry_id = %entry.id,
                scope = %entry.scope,
                retries = entry.retry_count,
                "Retry budget exhausted, dead-letter requires operator intervention"
            );
            self.finish_failed(entry, outcome);
            return;
        }

        let delay_ms = calculate_backoff(
            entry.retry_count,
            self.config.backoff_base_secs,
            self.config.backoff_max_secs,
        );
        match self
            .queue
            .reschedule(&entry.id, &self.claim_id, outcome, delay_ms)
        {
            Ok(rescheduled) => {
                tracing::debug!(
                    entry_id = %rescheduled.id,
                    retry_count = rescheduled.retry_count,
                    delay_ms,
                    code = %outcome.code,
                    "Entry rescheduled"
                );
            }
            Err(e) => {
                tracing::warn!(entry_id = %entry.id, "Could not reschedule entry: {e}");
            }
        }
    }

    fn finish_failed(&self, entry: &QueueEntry, outcome: &NormalizedError) {
        if let Err(e) = self.queue.mark_failed(&entry.id, &self.claim_id, outcome) {
            tracing::warn!(entry_id = %entry.id, "Could not dead-letter entry: {e}");
        }
    }

    /// Hand a claimed-but-unattempted entry back during shutdown.
    fn reschedule_for_shutdown(&self, entry: &QueueEntry) {
        let outcome = NormalizedError::new(
            ErrorCode::TempUnavailable,
            None,
            Some("worker shutdown before attempt".into()),
        );
        if let Err(e) = self.queue.release(&entry.id, &self.claim_id, &outcome) {
            tracing::warn!(entry_id = %entry.id, "Could not release entry on shutdown: {e}");
        }
    }

    /// Derive the customer-facing verification payload after delivery.
    fn emit_receipt(&self, entry: &QueueEntry, signature: &str) {
        let Some((no, dt, tot)) = receipt_fields(&entry.payload) else {
            tracing::debug!(entry_id = %entry.id, "Payload carries no receipt fields, skipping");
            return;
        };

        match build_verification_url(&self.config.verify_base_url, &no, &dt, &tot, signature) {
            Ok(url) => {
                tracing::info!(entry_id = %entry.id, url = %url, "Receipt verification payload ready");
            }
            Err(e) => {
                tracing::error!(entry_id = %entry.id, "Could not build verification payload: {e}");
            }
        }
    }
}

/// Transaction number, date, and total as carried by the fiscal payload.
fn receipt_fields(payload: &serde_json::Value) -> Option<(String, String, String)> {
    let field = |key: &str| -> Option<String> {
        match payload.get(key)? {
            serde_json::Value::String(s) => Some(s.clone()),
            other => Some(other.to_string()),
        }
    };
    Some((field("noTrans")?, field("datTrans")?, field("mont")?))
}
