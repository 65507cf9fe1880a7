//! Shared types for the SRM adapter
//!
//! Domain types used across the signing and delivery crates: device
//! profiles, queue entries, normalized transmission outcomes, and
//! circuit-breaker state. No I/O lives here.

pub mod breaker;
pub mod outcome;
pub mod profile;
pub mod queue;
pub mod util;

// Re-exports
pub use breaker::{BreakerRecord, BreakerState};
pub use outcome::{ErrorCode, NormalizedError};
pub use profile::{DeviceProfile, Environment, ProfileError};
pub use queue::{DeviceScope, EntryClaim, EntryStatus, QueueEntry};
