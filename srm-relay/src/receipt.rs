//! Receipt verification payload
//!
//! After a transaction is confirmed, the customer-facing receipt carries a
//! QR link to the regulator's verification page. The link embeds the
//! transmission signature in URL-safe base64.

use crate::error::{RelayError, Result};

/// Build the verification URL for a confirmed transaction.
///
/// The signature must be the exact 88-character base64 transmission
/// signature; anything else means the caller is not holding a real
/// [`srm_sign::SignedHeaders`] signature and the receipt must not be
/// issued.
pub fn build_verification_url(
    base_url: &str,
    transaction_id: &str,
    date: &str,
    total: &str,
    signature: &str,
) -> Result<String> {
    if signature.len() != 88 {
        return Err(RelayError::InvalidSignatureLength(signature.len()));
    }
    if !signature
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '/' | '='))
    {
        return Err(RelayError::InvalidSignatureEncoding);
    }

    // Standard base64 -> URL-safe: '+' -> '-', '/' -> '_', padding dropped.
    let url_safe: String = signature
        .chars()
        .filter_map(|c| match c {
            '+' => Some('-'),
            '/' => Some('_'),
            '=' => None,
            other => Some(other),
        })
        .collect();

    Ok(format!(
        "{base_url}?no={transaction_id}&dt={date}&tot={total}&sig={url_safe}"
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    const BASE: &str = "https://cnfr.rq-fo.ca/valider";

    fn signature_with(filler: char) -> String {
        let mut s: String = std::iter::repeat_n(filler, 86).collect();
        s.push_str("==");
        s
    }

    #[test]
    fn builds_query_string_url() {
        let sig = signature_with('A');
        let url = build_verification_url(BASE, "41", "2026-01-29", "12.00", &sig).unwrap();
        assert_eq!(
            url,
            format!("{BASE}?no=41&dt=2026-01-29&tot=12.00&sig={}", "A".repeat(86))
        );
    }

    #[test]
    fn converts_to_url_safe_base64() {
        let mut sig = signature_with('A');
        sig.replace_range(0..2, "+/");
        let url = build_verification_url(BASE, "1", "d", "t", &sig).unwrap();
        assert!(url.ends_with(&format!("sig=-_{}", "A".repeat(84))));
        assert!(!url.contains('+'));
        assert!(!url.contains('='));
    }

    #[test]
    fn rejects_87_and_89_character_signatures() {
        for len in [87usize, 89] {
            let sig: String = "A".repeat(len);
            let err = build_verification_url(BASE, "1", "d", "t", &sig).unwrap_err();
            assert!(matches!(err, RelayError::InvalidSignatureLength(l) if l == len));
        }
    }

    #[test]
    fn rejects_non_base64_characters() {
        let mut sig = signature_with('A');
        sig.replace_range(0..1, "!");
        assert!(matches!(
            build_verification_url(BASE, "1", "d", "t", &sig),
            Err(RelayError::InvalidSignatureEncoding)
        ));
    }
}
