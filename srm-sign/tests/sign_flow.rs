//! End-to-end signing flow against a real P-256 identity.

use base64::{Engine as _, engine::general_purpose::STANDARD};
use shared::{DeviceProfile, Environment};
use srm_sign::{CanonicalRequest, SignError, body_hash, sign_request, verify_p1363};

fn test_profile() -> DeviceProfile {
    let key_pair = rcgen::KeyPair::generate().expect("generate P-256 key");
    let params = rcgen::CertificateParams::new(vec!["pos.example".into()]).expect("cert params");
    let cert = params.self_signed(&key_pair).expect("self-signed cert");

    DeviceProfile {
        tenant_id: "tenant-1".into(),
        branch_id: "branch-1".into(),
        device_id: "device-1".into(),
        environment: Environment::Essai,
        partner_id: "PARTN01".into(),
        software_id: "SEV0042".into(),
        software_version_id: "2.1.0".into(),
        certification_code: "CERT-77".into(),
        protocol_version: "A".into(),
        partner_version: "B".into(),
        device_registration_id: None,
        test_case: None,
        private_key_pem: key_pair.serialize_pem(),
        certificate_pem: cert.pem(),
        active: true,
        created_at: 0,
        updated_at: 0,
    }
}

#[test]
fn signed_headers_carry_exact_lengths() {
    let profile = test_profile();
    let headers = sign_request("POST", "/transactions", "{\"total\":\"12.00\"}", &profile)
        .expect("signing succeeds");

    assert_eq!(headers.signature().len(), 88);
    assert_eq!(headers.fingerprint().len(), 40);
    assert!(headers
        .fingerprint()
        .chars()
        .all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
}

#[test]
fn header_set_matches_protocol_table() {
    let profile = test_profile();
    let headers = sign_request("POST", "/transactions", "{}", &profile).unwrap();

    for name in [
        "ENVIRN",
        "APPRLINIT",
        "IDSEV",
        "IDVERSI",
        "CODCERTIF",
        "IDPARTN",
        "VERSI",
        "VERSIPARN",
        "SIGNATRANSM",
        "EMPRCERTIFTRANSM",
    ] {
        assert!(headers.get(name).is_some(), "missing header {name}");
    }
    assert_eq!(headers.get("APPRLINIT"), Some("SRV"));
    assert_eq!(headers.get("ENVIRN"), Some("ESSAI"));

    // No device registration and no test case: the optional headers are
    // absent entirely, not empty.
    assert!(headers.get("IDAPPRL").is_none());
    assert!(headers.get("CASESSAI").is_none());
}

#[test]
fn optional_headers_appear_when_present() {
    let mut profile = test_profile();
    profile.device_registration_id = Some("0000-0000-0000".into());
    profile.test_case = Some("004.001".into());

    let headers = sign_request("POST", "/transactions", "{}", &profile).unwrap();
    assert_eq!(headers.get("IDAPPRL"), Some("0000-0000-0000"));
    assert_eq!(headers.get("CASESSAI"), Some("004.001"));
}

#[test]
fn signature_verifies_against_rebuilt_canonical_string() {
    let mut profile = test_profile();
    profile.device_registration_id = Some("0000-0000-0000".into());
    let body = "{\"noTrans\":41}";

    let headers = sign_request("POST", "/transactions", body, &profile).unwrap();

    // Rebuild the canonical string the way a verifier would.
    let pairs = vec![
        ("IDAPPRL", "0000-0000-0000".to_string()),
        ("IDSEV", profile.software_id.clone()),
        ("IDVERSI", profile.software_version_id.clone()),
        ("CODCERTIF", profile.certification_code.clone()),
        ("IDPARTN", profile.partner_id.clone()),
        ("VERSI", profile.protocol_version.clone()),
        ("VERSIPARN", profile.partner_version.clone()),
        ("ENVIRN", "ESSAI".to_string()),
    ];
    let canonical = CanonicalRequest::build("POST", "/transactions", body, pairs).unwrap();
    let canonical_string = canonical.canonical_string();
    assert!(canonical_string.contains(&body_hash(body)));

    let raw = STANDARD.decode(headers.signature()).unwrap();
    verify_p1363(&profile.certificate_pem, canonical_string.as_bytes(), &raw).unwrap();
}

#[test]
fn non_ascii_identifier_fails_before_any_signing() {
    let mut profile = test_profile();
    profile.software_id = "café".into();
    let err = sign_request("POST", "/transactions", "{}", &profile).unwrap_err();
    assert!(matches!(err, SignError::Profile(_)));
}

#[test]
fn embedded_newline_in_identifier_is_a_signing_fault() {
    let mut profile = test_profile();
    // ASCII, but would inject a fifth canonical line
    profile.software_id = "SEV\n0042".into();
    let err = sign_request("POST", "/transactions", "{}", &profile).unwrap_err();
    assert!(matches!(err, SignError::MalformedCanonicalString(4)));
}

#[test]
fn only_post_is_accepted() {
    let profile = test_profile();
    assert!(matches!(
        sign_request("PUT", "/transactions", "{}", &profile),
        Err(SignError::MethodNotAllowed(_))
    ));
    assert!(matches!(
        sign_request("POST", "transactions", "{}", &profile),
        Err(SignError::InvalidPath(_))
    ));
}
