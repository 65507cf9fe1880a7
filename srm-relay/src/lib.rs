//! Fiscal transaction delivery engine
//!
//! Drives signed transactions from the durable per-device queue to the
//! regulator endpoint:
//!
//! 1. Delivery worker claims the oldest due entry per device scope
//! 2. Profile store supplies the signing identity
//! 3. `srm-sign` produces the signed header set
//! 4. Circuit breaker gates the send per delivery scope
//! 5. Outcome classifier collapses the result into the closed taxonomy
//! 6. Queue transitions the entry (complete, reschedule with backoff,
//!    or dead-letter); successful entries yield a receipt verification URL
//!
//! Per-device FIFO order is the load-bearing invariant: an entry never
//! enters processing while an older live entry for the same device exists.

pub mod backoff;
pub mod breaker;
pub mod classify;
pub mod config;
pub mod error;
pub mod logger;
pub mod profile;
pub mod receipt;
pub mod sanitize;
pub mod store;
pub mod transmit;
pub mod worker;

pub use breaker::{CircuitBreaker, SendPermit};
pub use config::RelayConfig;
pub use error::{RelayError, Result};
pub use profile::{ProfileStore, SealedProfileStore, StaticProfiles};
pub use store::{RelayDb, StoreError, queue::QueueStore};
pub use transmit::{HttpTransmitter, RawOutcome, Transport};
pub use worker::DeliveryWorker;
