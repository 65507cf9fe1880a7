//! Per-scope circuit breaker
//!
//! CLOSED counts consecutive non-success outcomes; at the threshold the
//! scope OPENs and every send is short-circuited until the cooldown
//! elapses. The first check after the cooldown moves the scope to
//! HALF_OPEN and hands out exactly one probe; everyone else stays blocked
//! until that probe resolves. Transitions are serialized per scope and
//! persisted through [`BreakerStore`], so an open breaker survives a
//! restart.

use crate::store::StoreResult;
use crate::store::breaker::BreakerStore;
use dashmap::DashMap;
use shared::{BreakerRecord, BreakerState};
use std::sync::Arc;
use tokio::sync::Mutex;

/// Decision for one send attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendPermit {
    /// Breaker closed: send normally
    Allow,
    /// Breaker half-open: this attempt is the single probe
    Probe,
    /// Breaker open (or a probe is already in flight): do not touch the
    /// network, fail the attempt as temporarily unavailable
    Blocked,
}

struct Cell {
    record: BreakerRecord,
    probe_in_flight: bool,
    loaded: bool,
}

/// Failure-rate gate for the regulator endpoint, keyed by delivery scope.
pub struct CircuitBreaker {
    store: Arc<dyn BreakerStore>,
    cells: DashMap<String, Arc<Mutex<Cell>>>,
    threshold: u32,
    cooldown_ms: i64,
}

impl CircuitBreaker {
    pub fn new(store: Arc<dyn BreakerStore>, threshold: u32, cooldown_ms: i64) -> Self {
        Self {
            store,
            cells: DashMap::new(),
            threshold: threshold.max(1),
            cooldown_ms,
        }
    }

    fn cell(&self, scope: &str) -> Arc<Mutex<Cell>> {
        self.cells
            .entry(scope.to_string())
            .or_insert_with(|| {
                Arc::new(Mutex::new(Cell {
                    record: BreakerRecord::closed(scope),
                    probe_in_flight: false,
                    loaded: false,
                }))
            })
            .clone()
    }

    async fn ensure_loaded(&self, cell: &mut Cell, scope: &str) -> StoreResult<()> {
        if !cell.loaded {
            if let Some(record) = self.store.get(scope).await? {
                cell.record = record;
            }
            cell.loaded = true;
        }
        Ok(())
    }

    /// Gate one send attempt for a scope.
    pub async fn check(&self, scope: &str, now: i64) -> StoreResult<SendPermit> {
        let cell = self.cell(scope);
        let mut cell = cell.lock().await;
        self.ensure_loaded(&mut cell, scope).await?;

        match cell.record.state {
            BreakerState::Closed => Ok(SendPermit::Allow),
            BreakerState::Open => {
                let opened_at = cell.record.opened_at.unwrap_or(0);
                if now - opened_at >= self.cooldown_ms {
                    cell.record.state = BreakerState::HalfOpen;
                    cell.probe_in_flight = true;
                    self.store.put(&cell.record).await?;
                    tracing::info!(scope, "Circuit breaker half-open, sending probe");
                    Ok(SendPermit::Probe)
                } else {
                    Ok(SendPermit::Blocked)
                }
            }
            BreakerState::HalfOpen => {
                if cell.probe_in_flight {
                    Ok(SendPermit::Blocked)
                } else {
                    cell.probe_in_flight = true;
                    Ok(SendPermit::Probe)
                }
            }
        }
    }

    /// Feed the result of a real send back into the breaker.
    ///
    /// Only genuine transmission outcomes belong here; synthetic
    /// short-circuits and local signing faults never reach the network and
    /// must not move the state.
    pub async fn record_outcome(
        &self,
        scope: &str,
        success: bool,
        probe: bool,
        now: i64,
    ) -> StoreResult<()> {
        let cell = self.cell(scope);
        let mut cell = cell.lock().await;
        self.ensure_loaded(&mut cell, scope).await?;

        if probe {
            cell.probe_in_flight = false;
            if success {
                cell.record = BreakerRecord::closed(scope);
                self.store.put(&cell.record).await?;
                tracing::info!(scope, "Circuit breaker closed after successful probe");
            } else {
                cell.record.state = BreakerState::Open;
                cell.record.opened_at = Some(now);
                self.store.put(&cell.record).await?;
                tracing::warn!(scope, "Circuit breaker probe failed, reopening");
            }
            return Ok(());
        }

        match cell.record.state {
            BreakerState::Closed => {
                if success {
                    if cell.record.consecutive_failures != 0 {
                        cell.record.consecutive_failures = 0;
                        self.store.put(&cell.record).await?;
                    }
                } else {
                    cell.record.consecutive_failures += 1;
                    if cell.record.consecutive_failures >= self.threshold {
                        cell.record.state = BreakerState::Open;
                        cell.record.opened_at = Some(now);
                        tracing::warn!(
                            scope,
                            failures = cell.record.consecutive_failures,
                            "Circuit breaker opened"
                        );
                    }
                    self.store.put(&cell.record).await?;
                }
            }
            // A send that was already in flight when the scope tripped;
            // the probe protocol owns the state from here.
            BreakerState::Open | BreakerState::HalfOpen => {
                tracing::debug!(scope, "Ignoring straggler outcome while breaker is gated");
            }
        }

        Ok(())
    }

    /// Release a probe slot without an outcome (the probe send was
    /// cancelled). The scope stays HALF_OPEN and the next check may probe.
    pub async fn abort_probe(&self, scope: &str) {
        let cell = self.cell(scope);
        let mut cell = cell.lock().await;
        cell.probe_in_flight = false;
    }

    /// Current state for a scope (operator/introspection surface).
    pub async fn state(&self, scope: &str) -> StoreResult<BreakerRecord> {
        let cell = self.cell(scope);
        let mut cell = cell.lock().await;
        self.ensure_loaded(&mut cell, scope).await?;
        Ok(cell.record.clone())
    }
}
