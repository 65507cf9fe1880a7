//! Protocol header assembly
//!
//! [`sign_request`] is the single entry point: it builds the canonical
//! request for a device profile, signs it, and returns the complete
//! transmitted header set as an immutable value. One [`SignedHeaders`] is
//! created per transmission attempt and never reused, since the signature
//! covers the exact bytes sent.

use crate::canonical::CanonicalRequest;
use crate::crypto::{certificate_fingerprint, sign_p1363};
use crate::error::{Result, SignError};
use base64::{Engine as _, engine::general_purpose::STANDARD};
use shared::DeviceProfile;

// Transmitted header names, literal per the protocol.
pub const ENVIRN: &str = "ENVIRN";
pub const APPRLINIT: &str = "APPRLINIT";
pub const IDAPPRL: &str = "IDAPPRL";
pub const IDSEV: &str = "IDSEV";
pub const IDVERSI: &str = "IDVERSI";
pub const CODCERTIF: &str = "CODCERTIF";
pub const IDPARTN: &str = "IDPARTN";
pub const VERSI: &str = "VERSI";
pub const VERSIPARN: &str = "VERSIPARN";
pub const CASESSAI: &str = "CASESSAI";
pub const SIGNATRANSM: &str = "SIGNATRANSM";
pub const EMPRCERTIFTRANSM: &str = "EMPRCERTIFTRANSM";

/// Device type flag: this adapter always transmits as a server device.
const DEVICE_TYPE: &str = "SRV";

/// The complete transmitted header set for one attempt.
///
/// Immutable once built; the ordering is deterministic for logging and
/// test stability even though HTTP header order carries no meaning.
#[derive(Debug, Clone)]
pub struct SignedHeaders {
    headers: Vec<(&'static str, String)>,
}

impl SignedHeaders {
    pub fn iter(&self) -> impl Iterator<Item = (&'static str, &str)> {
        self.headers.iter().map(|(name, value)| (*name, value.as_str()))
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| *n == name)
            .map(|(_, v)| v.as_str())
    }

    /// 88-character base64 P1363 signature
    pub fn signature(&self) -> &str {
        self.get(SIGNATRANSM).unwrap_or_default()
    }

    /// 40-character lowercase hex certificate fingerprint
    pub fn fingerprint(&self) -> &str {
        self.get(EMPRCERTIFTRANSM).unwrap_or_default()
    }
}

/// Build the ordered canonical header-pair line for a profile.
///
/// `IDAPPRL` leads when present, the seven required pairs follow in fixed
/// order, `CASESSAI` trails when present. Absent optional pairs leave no
/// separator behind.
fn canonical_pairs(profile: &DeviceProfile) -> Vec<(&'static str, String)> {
    let mut pairs = Vec::with_capacity(9);

    if let Some(id) = &profile.device_registration_id
        && !id.is_empty()
    {
        pairs.push((IDAPPRL, id.clone()));
    }

    pairs.push((IDSEV, profile.software_id.clone()));
    pairs.push((IDVERSI, profile.software_version_id.clone()));
    pairs.push((CODCERTIF, profile.certification_code.clone()));
    pairs.push((IDPARTN, profile.partner_id.clone()));
    pairs.push((VERSI, profile.protocol_version.clone()));
    pairs.push((VERSIPARN, profile.partner_version.clone()));
    pairs.push((ENVIRN, profile.environment.as_str().to_string()));

    if let Some(case) = &profile.test_case
        && !case.is_empty()
    {
        pairs.push((CASESSAI, case.clone()));
    }

    pairs
}

/// Canonicalize, sign, and assemble the transmitted headers for one attempt.
///
/// Fails without touching the network on any malformed input: wrong method,
/// relative path, non-ASCII or empty fields, bad PEM, or a signature that
/// does not come out at exactly 88 base64 characters.
pub fn sign_request(
    method: &str,
    path: &str,
    body: &str,
    profile: &DeviceProfile,
) -> Result<SignedHeaders> {
    profile.validate()?;

    let pairs = canonical_pairs(profile);
    let canonical = CanonicalRequest::build(method, path, body, pairs)?;
    let canonical_string = canonical.canonical_string();

    // ASCII alone admits control characters; an embedded newline in any
    // value would silently shift the signed lines.
    let newlines = canonical_string.matches('\n').count();
    if newlines != 3 {
        return Err(SignError::MalformedCanonicalString(newlines));
    }

    let raw_sig = sign_p1363(&profile.private_key_pem, canonical_string.as_bytes())?;
    let signature = STANDARD.encode(raw_sig);
    if signature.len() != 88 {
        return Err(SignError::MalformedSignature(signature.len()));
    }

    let fingerprint = certificate_fingerprint(&profile.certificate_pem)?;

    let mut headers: Vec<(&'static str, String)> = vec![
        (ENVIRN, profile.environment.as_str().to_string()),
        (APPRLINIT, DEVICE_TYPE.to_string()),
        (IDSEV, profile.software_id.clone()),
        (IDVERSI, profile.software_version_id.clone()),
        (CODCERTIF, profile.certification_code.clone()),
        (IDPARTN, profile.partner_id.clone()),
        (VERSI, profile.protocol_version.clone()),
        (VERSIPARN, profile.partner_version.clone()),
        (SIGNATRANSM, signature),
        (EMPRCERTIFTRANSM, fingerprint),
    ];

    if let Some(id) = &profile.device_registration_id
        && !id.is_empty()
    {
        headers.push((IDAPPRL, id.clone()));
    }
    if let Some(case) = &profile.test_case
        && !case.is_empty()
    {
        headers.push((CASESSAI, case.clone()));
    }

    tracing::debug!(
        path = %canonical.path(),
        body_hash = %canonical.body_hash(),
        "Signed canonical request"
    );

    Ok(SignedHeaders { headers })
}
