//! Transmission outcome classification
//!
//! Collapses a raw transport/HTTP result into the closed [`ErrorCode`]
//! taxonomy. The keyword inspection of regulator 4xx messages is heuristic
//! by design and kept exactly as the protocol integration has always
//! behaved; it lives here as a pure function so it can be tested without
//! any transport in sight.

use crate::sanitize::sanitize;
use crate::transmit::RawOutcome;
use shared::{ErrorCode, NormalizedError};

/// 4xx messages mentioning any of these point at the transmission signature.
const SIGNATURE_KEYWORDS: [&str; 3] = ["signature", "signatransm", "empreinte"];

/// 4xx messages mentioning any of these point at the protocol headers.
const HEADER_KEYWORDS: [&str; 3] = ["header", "entete", "en-tete"];

/// Classify one transmission attempt.
///
/// Decision order is fixed: transport failure, 2xx, 409, 429, 5xx, then
/// keyword inspection for the remaining 4xx. Anything left is `Unknown`,
/// never retried, and carries its sanitized message for triage.
pub fn classify(
    http_status: Option<u16>,
    body: &str,
    transport_error: Option<&str>,
) -> NormalizedError {
    if let Some(detail) = transport_error {
        return NormalizedError::new(
            ErrorCode::TempUnavailable,
            http_status,
            Some(sanitize(detail)),
        );
    }

    let status = match http_status {
        Some(s) => s,
        // No status and no transport error: treat as transport-level loss.
        None => {
            return NormalizedError::new(
                ErrorCode::TempUnavailable,
                None,
                Some("no response".into()),
            );
        }
    };

    match status {
        200..=299 => NormalizedError::new(ErrorCode::Ok, Some(status), None),
        409 => NormalizedError::new(ErrorCode::Duplicate, Some(status), None),
        429 => NormalizedError::new(
            ErrorCode::RateLimit,
            Some(status),
            Some(sanitize(&extract_message(body))),
        ),
        500..=599 => NormalizedError::new(
            ErrorCode::TempUnavailable,
            Some(status),
            Some(sanitize(&extract_message(body))),
        ),
        400..=499 => {
            let message = extract_message(body);
            let lowered = message.to_lowercase();
            let code = if SIGNATURE_KEYWORDS.iter().any(|k| lowered.contains(k)) {
                ErrorCode::InvalidSignature
            } else if HEADER_KEYWORDS.iter().any(|k| lowered.contains(k)) {
                ErrorCode::InvalidHeader
            } else {
                ErrorCode::Unknown
            };
            NormalizedError::new(code, Some(status), Some(sanitize(&message)))
        }
        _ => NormalizedError::new(
            ErrorCode::Unknown,
            Some(status),
            Some(sanitize(&extract_message(body))),
        ),
    }
}

/// Classify a [`RawOutcome`] from the transport layer.
pub fn classify_raw(raw: &RawOutcome) -> NormalizedError {
    match raw {
        RawOutcome::Response { status, body } => classify(Some(*status), body, None),
        RawOutcome::TransportError { detail, .. } => classify(None, "", Some(detail)),
    }
}

/// Pull the regulator's message out of a JSON error body, falling back to
/// the raw text. The regulator nests messages in a handful of shapes;
/// only flat `message`/`messErreur`/`mess` fields are recognized here.
fn extract_message(body: &str) -> String {
    if let Ok(value) = serde_json::from_str::<serde_json::Value>(body) {
        for field in ["message", "messErreur", "mess"] {
            if let Some(message) = value.get(field).and_then(|m| m.as_str()) {
                return message.to_string();
            }
        }
    }
    body.to_string()
}
