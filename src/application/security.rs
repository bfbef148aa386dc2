use regex::Regex;
use std::borrow::Cow;
use std::sync::LazyLock;

static ACCOUNT_NUMBER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b\d{8,16}\b").expect("account number pattern compiles"));

const MASK: &str = "***PII***";

/// Masks account-number-like digit runs before text reaches logs or audit.
pub fn mask_pii(text: &str) -> Cow<'_, str> {
    ACCOUNT_NUMBER.replace_all(text, MASK)
}
