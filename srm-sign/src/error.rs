use thiserror::Error;

/// Signing and canonicalization faults.
///
/// All of these are configuration or programmer errors: retrying cannot fix
/// them, so the delivery layer treats every variant as non-retryable and
/// aborts the attempt before any network contact.
#[derive(Error, Debug)]
pub enum SignError {
    #[error("Unsupported HTTP method: {0}")]
    MethodNotAllowed(String),
    #[error("Request path must start with '/': {0}")]
    InvalidPath(String),
    #[error("Header value for {0} contains non-ASCII data")]
    NonAscii(&'static str),
    #[error("Canonical string has {0} newlines, expected exactly 3")]
    MalformedCanonicalString(usize),
    #[error("PEM tag '{0}' not found")]
    PemTagNotFound(&'static str),
    #[error("PEM parse error: {0}")]
    InvalidPem(String),
    #[error("Signing failed: {0}")]
    SigningFault(String),
    #[error("Signature has unexpected length {0}, expected 88 base64 characters")]
    MalformedSignature(usize),
    #[error("Certificate fingerprint has unexpected length {0}, expected 40 hex characters")]
    MalformedFingerprint(usize),
    #[error("Sealed credential is not iv:authTag:ciphertext hex")]
    InvalidSealedBlob,
    #[error("Sealed credential decryption failed")]
    DecryptFailed,
    #[error("Invalid profile: {0}")]
    Profile(#[from] shared::ProfileError),
}

pub type Result<T> = std::result::Result<T, SignError>;
