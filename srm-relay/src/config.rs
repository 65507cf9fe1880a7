/// Delivery engine configuration
///
/// # Environment variables
///
/// Every knob can be overridden by environment variable:
///
/// | Variable | Default | Meaning |
/// |----------|---------|---------|
/// | SRM_BASE_URL | https://certificats.cnfr.api.rq-fo.ca | Regulator endpoint base URL |
/// | SRM_TRANSACTION_PATH | /transactions | POST path for fiscal transactions |
/// | SRM_VERIFY_BASE_URL | https://cnfr.rq-fo.ca/valider | Receipt verification base URL |
/// | SRM_REQUEST_TIMEOUT_MS | 30000 | Per-attempt HTTP timeout |
/// | SRM_BACKOFF_BASE_SECS | 60 | Retry backoff base |
/// | SRM_BACKOFF_MAX_SECS | 3600 | Retry backoff ceiling |
/// | SRM_MAX_RETRIES | 10 | Retries before dead-letter |
/// | SRM_BREAKER_THRESHOLD | 5 | Consecutive failures to open the breaker |
/// | SRM_BREAKER_COOLDOWN_MS | 60000 | OPEN cooldown before a probe |
/// | SRM_LEASE_MS | 120000 | Processing claim lease duration |
/// | SRM_POLL_INTERVAL_MS | 1000 | Worker poll interval when idle |
/// | SRM_CLAIM_BATCH | 16 | Max entries claimed per poll |
/// | SRM_STORE_KEY | (unset) | 64-char hex AES-256 key for sealed profiles |
#[derive(Debug, Clone)]
pub struct RelayConfig {
    pub base_url: String,
    pub transaction_path: String,
    pub verify_base_url: String,
    pub request_timeout_ms: u64,
    pub backoff_base_secs: u64,
    pub backoff_max_secs: u64,
    pub max_retries: u32,
    pub breaker_threshold: u32,
    pub breaker_cooldown_ms: i64,
    pub lease_ms: i64,
    pub poll_interval_ms: u64,
    pub claim_batch: usize,
    /// Hex-encoded 32-byte key for the sealed profile store
    pub store_key_hex: Option<String>,
}

fn env_parse<T: std::str::FromStr>(name: &str, default: T) -> T {
    std::env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

impl RelayConfig {
    /// Load configuration from environment variables, falling back to
    /// defaults for anything unset.
    pub fn from_env() -> Self {
        Self {
            base_url: std::env::var("SRM_BASE_URL")
                .unwrap_or_else(|_| "https://certificats.cnfr.api.rq-fo.ca".into()),
            transaction_path: std::env::var("SRM_TRANSACTION_PATH")
                .unwrap_or_else(|_| "/transactions".into()),
            verify_base_url: std::env::var("SRM_VERIFY_BASE_URL")
                .unwrap_or_else(|_| "https://cnfr.rq-fo.ca/valider".into()),
            request_timeout_ms: env_parse("SRM_REQUEST_TIMEOUT_MS", 30_000),
            backoff_base_secs: env_parse("SRM_BACKOFF_BASE_SECS", 60),
            backoff_max_secs: env_parse("SRM_BACKOFF_MAX_SECS", 3_600),
            max_retries: env_parse("SRM_MAX_RETRIES", 10),
            breaker_threshold: env_parse("SRM_BREAKER_THRESHOLD", 5),
            breaker_cooldown_ms: env_parse("SRM_BREAKER_COOLDOWN_MS", 60_000),
            lease_ms: env_parse("SRM_LEASE_MS", 120_000),
            poll_interval_ms: env_parse("SRM_POLL_INTERVAL_MS", 1_000),
            claim_batch: env_parse("SRM_CLAIM_BATCH", 16),
            store_key_hex: std::env::var("SRM_STORE_KEY").ok(),
        }
    }

    /// Test configuration: local endpoint, tight timings, no sealed store.
    pub fn with_overrides(base_url: impl Into<String>, poll_interval_ms: u64) -> Self {
        let mut config = Self::from_env();
        config.base_url = base_url.into();
        config.poll_interval_ms = poll_interval_ms;
        config
    }

    /// Decode the sealed-store key. `None` when unset.
    pub fn store_key(&self) -> crate::error::Result<Option<[u8; 32]>> {
        match &self.store_key_hex {
            None => Ok(None),
            Some(hex_key) => {
                let bytes = hex::decode(hex_key)
                    .map_err(|_| crate::RelayError::InvalidStoreKey("not hex".into()))?;
                let key: [u8; 32] = bytes.try_into().map_err(|v: Vec<u8>| {
                    crate::RelayError::InvalidStoreKey(format!("{} bytes, expected 32", v.len()))
                })?;
                Ok(Some(key))
            }
        }
    }
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self::from_env()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let config = RelayConfig::from_env();
        assert_eq!(config.backoff_base_secs, 60);
        assert_eq!(config.backoff_max_secs, 3_600);
        assert!(config.transaction_path.starts_with('/'));
    }

    #[test]
    fn store_key_must_be_32_bytes() {
        let mut config = RelayConfig::from_env();
        config.store_key_hex = Some("abcd".into());
        assert!(config.store_key().is_err());

        config.store_key_hex = Some("00".repeat(32));
        assert_eq!(config.store_key().unwrap(), Some([0u8; 32]));

        config.store_key_hex = None;
        assert_eq!(config.store_key().unwrap(), None);
    }
}
