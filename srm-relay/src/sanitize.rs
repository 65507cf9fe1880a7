//! PII redaction for regulator error text
//!
//! Raw regulator messages may echo receipt content. Everything that looks
//! like personal data is struck before the text is logged or persisted on
//! a queue entry. Redaction is deliberately aggressive: losing part of a
//! diagnostic beats storing a card number.

use regex::Regex;
use std::sync::LazyLock;

/// Maximum stored length of a sanitized message
const MAX_LEN: usize = 500;

const REDACTED: &str = "[REDACTED]";

static EMAIL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}").unwrap()
});
static UUID_LIKE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[0-9a-fA-F]{8}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{12}")
        .unwrap()
});
static IBAN_LIKE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b[A-Z]{2}\d{2}[A-Za-z0-9]{10,30}\b").unwrap());
static CARD_LIKE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b\d(?:[ -]?\d){12,18}\b").unwrap());
static SIN_LIKE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b\d{3}[ -]?\d{3}[ -]?\d{3}\b").unwrap());
static PHONE_LIKE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\+?\d[\d()]*(?:[ .-]\d[\d()]*){1,5}\b").unwrap());

/// Redact PII patterns and truncate to the storage limit.
pub fn sanitize(raw: &str) -> String {
    let mut text = raw.to_string();

    // Order matters: specific shapes first, broad digit runs last.
    for pattern in [
        &*EMAIL,
        &*UUID_LIKE,
        &*IBAN_LIKE,
        &*CARD_LIKE,
        &*SIN_LIKE,
        &*PHONE_LIKE,
    ] {
        text = pattern.replace_all(&text, REDACTED).into_owned();
    }

    if text.chars().count() > MAX_LEN {
        text = text.chars().take(MAX_LEN).collect();
    }
    text
}
