//! Sealed device-profile records
//!
//! Profiles are deposited by the external enrollment process with the
//! private key and certificate sealed (`iv:authTag:ciphertext` hex).
//! Keying by the full (tenant, branch, device, environment) quadruple
//! makes "exactly one active profile per quadruple" structural.

use super::{RelayDb, StoreResult};
use redb::{Database, ReadableDatabase, TableDefinition};
use serde::{Deserialize, Serialize};
use shared::Environment;
use std::sync::Arc;

/// Profile records: "tenant/branch/device/ENV" -> JSON [`ProfileRecord`]
pub(super) const PROFILES_TABLE: TableDefinition<&str, &[u8]> =
    TableDefinition::new("device_profiles");

/// One enrollment record. Key material stays sealed at rest.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProfileRecord {
    pub tenant_id: String,
    pub branch_id: String,
    pub device_id: String,
    pub environment: Environment,
    pub partner_id: String,
    pub software_id: String,
    pub software_version_id: String,
    pub certification_code: String,
    pub protocol_version: String,
    pub partner_version: String,
    #[serde(default)]
    pub device_registration_id: Option<String>,
    #[serde(default)]
    pub test_case: Option<String>,
    /// `iv:authTag:ciphertext` hex, AES-256-GCM
    pub sealed_private_key: String,
    /// Same sealing scheme as the private key
    pub sealed_certificate: String,
    pub active: bool,
    pub created_at: i64,
    pub updated_at: i64,
}

impl ProfileRecord {
    pub fn key(&self) -> String {
        record_key(
            &self.tenant_id,
            &self.branch_id,
            &self.device_id,
            self.environment,
        )
    }
}

pub(crate) fn record_key(
    tenant: &str,
    branch: &str,
    device: &str,
    environment: Environment,
) -> String {
    format!("{tenant}/{branch}/{device}/{environment}")
}

/// redb-backed profile record store. Read by the adapter, written only by
/// enrollment tooling.
#[derive(Clone)]
pub struct RedbProfileStore {
    db: Arc<Database>,
}

impl RedbProfileStore {
    pub fn new(db: &RelayDb) -> Self {
        Self {
            db: db.raw().clone(),
        }
    }

    pub fn get(
        &self,
        tenant: &str,
        branch: &str,
        device: &str,
        environment: Environment,
    ) -> StoreResult<Option<ProfileRecord>> {
        let key = record_key(tenant, branch, device, environment);
        let txn = self.db.begin_read()?;
        let table = txn.open_table(PROFILES_TABLE)?;
        match table.get(key.as_str())? {
            Some(guard) => Ok(Some(serde_json::from_slice(guard.value())?)),
            None => Ok(None),
        }
    }

    /// Deposit or replace the record for a quadruple (enrollment and
    /// certificate rotation both land here).
    pub fn upsert(&self, record: &ProfileRecord) -> StoreResult<()> {
        let txn = self.db.begin_write()?;
        {
            let mut table = txn.open_table(PROFILES_TABLE)?;
            table.insert(record.key().as_str(), serde_json::to_vec(record)?.as_slice())?;
        }
        txn.commit()?;
        Ok(())
    }
}
