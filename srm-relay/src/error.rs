use thiserror::Error;

/// Delivery-layer error type
#[derive(Debug, Error)]
pub enum RelayError {
    /// No profile in the durable store and no built-in fallback
    #[error("No signing credential for {tenant}/{branch}/{device}")]
    MissingCredential {
        tenant: String,
        branch: String,
        device: String,
    },

    /// A profile was found but fails validation or decryption
    #[error("Invalid profile for {tenant}/{branch}/{device}: {reason}")]
    InvalidProfile {
        tenant: String,
        branch: String,
        device: String,
        reason: String,
    },

    /// Signing or canonicalization fault (never retryable)
    #[error("Signing fault: {0}")]
    Sign(#[from] srm_sign::SignError),

    /// Durable store failure
    #[error("Store error: {0}")]
    Store(#[from] crate::store::StoreError),

    /// Receipt signature input is not exactly 88 characters
    #[error("Invalid signature length {0}, expected 88 characters")]
    InvalidSignatureLength(usize),

    /// Receipt signature input contains non-base64 characters
    #[error("Signature is not standard base64")]
    InvalidSignatureEncoding,

    /// Store key configuration problem (bad hex, wrong length)
    #[error("Invalid sealed-store key: {0}")]
    InvalidStoreKey(String),
}

pub type Result<T> = std::result::Result<T, RelayError>;
