//! ECDSA P-256 signing and certificate fingerprinting
//!
//! Signatures use the fixed-length IEEE P1363 encoding (`r||s`, 64 bytes)
//! rather than DER, as required by the protocol. ring emits that encoding
//! directly, so no ASN.1 signature handling happens here at all.

use crate::error::{Result, SignError};
use ring::{digest, rand as ring_rand, signature};
use x509_parser::prelude::*;

/// OID for id-ecPublicKey
const EC_PUBLIC_KEY_OID: &str = "1.2.840.10045.2.1";

/// Sign data with an ECDSA P-256 private key (PKCS#8 PEM).
///
/// Returns the raw 64-byte `r||s` signature.
pub fn sign_p1363(priv_key_pem: &str, data: &[u8]) -> Result<[u8; 64]> {
    let der = decode_pem(priv_key_pem, "PRIVATE KEY")?;

    let rng = ring_rand::SystemRandom::new();
    let key_pair = signature::EcdsaKeyPair::from_pkcs8(
        &signature::ECDSA_P256_SHA256_FIXED_SIGNING,
        &der,
        &rng,
    )
    .map_err(|e| SignError::SigningFault(format!("Unusable P-256 private key: {}", e)))?;

    let sig = key_pair
        .sign(&rng, data)
        .map_err(|e| SignError::SigningFault(format!("ECDSA signing failed: {}", e)))?;

    // Fixed encoding is always 2 * 32 bytes for P-256; anything else is an
    // internal signing fault.
    sig.as_ref()
        .try_into()
        .map_err(|_| SignError::SigningFault(format!("Signature is {} bytes", sig.as_ref().len())))
}

/// Verify a 64-byte P1363 signature against the certificate's public key.
///
/// Used by tests and audit tooling; the delivery path never verifies its
/// own signatures.
pub fn verify_p1363(cert_pem: &str, data: &[u8], sig: &[u8]) -> Result<()> {
    let (_, pem) = parse_x509_pem(cert_pem.as_bytes())
        .map_err(|e| SignError::InvalidPem(format!("{}", e)))?;
    let (_, x509) = x509_parser::parse_x509_certificate(&pem.contents)
        .map_err(|e| SignError::InvalidPem(format!("{}", e)))?;

    let spki = x509.tbs_certificate.subject_pki;
    let oid = spki.algorithm.algorithm.to_id_string();
    if oid != EC_PUBLIC_KEY_OID {
        return Err(SignError::SigningFault(format!(
            "Certificate public key is not EC (OID {})",
            oid
        )));
    }

    let public_key = signature::UnparsedPublicKey::new(
        &signature::ECDSA_P256_SHA256_FIXED,
        spki.subject_public_key.data,
    );
    public_key
        .verify(data, sig)
        .map_err(|_| SignError::SigningFault("Signature verification failed".into()))
}

/// SHA-1 fingerprint of the certificate DER, lowercase hex (40 chars).
///
/// SHA-1 is fixed by the protocol (`EMPRCERTIFTRANSM`); it identifies the
/// certificate, it does not protect anything.
pub fn certificate_fingerprint(cert_pem: &str) -> Result<String> {
    let der = decode_pem(cert_pem, "CERTIFICATE")?;
    let digest = digest::digest(&digest::SHA1_FOR_LEGACY_USE_ONLY, &der);
    let fingerprint = hex::encode(digest.as_ref());
    if fingerprint.len() != 40 {
        return Err(SignError::MalformedFingerprint(fingerprint.len()));
    }
    Ok(fingerprint)
}

fn decode_pem(pem_str: &str, tag: &'static str) -> Result<Vec<u8>> {
    let pems =
        ::pem::parse_many(pem_str).map_err(|e| SignError::InvalidPem(format!("{}", e)))?;

    for p in pems {
        if p.tag() == tag {
            return Ok(p.into_contents());
        }
    }

    Err(SignError::PemTagNotFound(tag))
}
