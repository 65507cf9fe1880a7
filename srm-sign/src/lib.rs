//! Canonical request signing for the SRM protocol
//!
//! Turns (method, path, body, profile) into the exact transmitted header
//! set: canonical string construction, ECDSA P-256 signing with the
//! fixed-length P1363 signature encoding, and the SHA-1 certificate
//! fingerprint. Also handles the sealed credential format used by the
//! profile store. CPU-only; nothing here touches the network.

mod canonical;
mod crypto;
mod error;
mod headers;
mod secret;

pub use canonical::{CanonicalRequest, body_hash};
pub use crypto::{certificate_fingerprint, sign_p1363, verify_p1363};
pub use error::{Result, SignError};
pub use headers::{SignedHeaders, sign_request};
pub use secret::SealedBlob;
