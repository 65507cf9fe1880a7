//! Canonical request construction
//!
//! The canonical string is the exact byte sequence that gets signed. Its
//! shape is fixed by the protocol: method, path, body hash, and the ordered
//! header-pair line, joined by exactly three `\n` with no trailing newline.

use crate::error::{Result, SignError};
use sha2::{Digest, Sha256};

/// Lowercase hex SHA-256 of the UTF-8 body
pub fn body_hash(body: &str) -> String {
    let digest = Sha256::digest(body.as_bytes());
    hex::encode(digest)
}

/// Derived, ephemeral canonical form of one request.
///
/// Built once per transmission attempt and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CanonicalRequest {
    method: &'static str,
    path: String,
    body_hash: String,
    /// Ordered header pairs, exactly as they appear on the fourth line
    pairs: Vec<(&'static str, String)>,
}

impl CanonicalRequest {
    /// Build and validate the canonical form.
    ///
    /// Only `POST` is supported; the path must be absolute; every pair
    /// value must be ASCII. Pair ordering is the caller's contract; this
    /// type renders the pairs in the order given.
    pub fn build(
        method: &str,
        path: &str,
        body: &str,
        pairs: Vec<(&'static str, String)>,
    ) -> Result<Self> {
        if method != "POST" {
            return Err(SignError::MethodNotAllowed(method.to_string()));
        }
        if !path.starts_with('/') {
            return Err(SignError::InvalidPath(path.to_string()));
        }
        if !path.is_ascii() {
            return Err(SignError::NonAscii("path"));
        }
        for (name, value) in &pairs {
            if !value.is_ascii() {
                return Err(SignError::NonAscii(name));
            }
        }

        Ok(Self {
            method: "POST",
            path: path.to_string(),
            body_hash: body_hash(body),
            pairs,
        })
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn body_hash(&self) -> &str {
        &self.body_hash
    }

    pub fn pairs(&self) -> &[(&'static str, String)] {
        &self.pairs
    }

    /// Render the canonical string: four lines, three `\n`, pairs joined
    /// with `;`, no trailing newline.
    pub fn canonical_string(&self) -> String {
        let header_line = self
            .pairs
            .iter()
            .map(|(name, value)| format!("{name}={value}"))
            .collect::<Vec<_>>()
            .join(";");

        format!(
            "{}\n{}\n{}\n{}",
            self.method, self.path, self.body_hash, header_line
        )
    }
}
