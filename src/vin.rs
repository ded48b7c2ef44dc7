//! VIN shape check and key normalization.
//!
//! A tracked vehicle identifier is exactly 17 ASCII alphanumeric
//! characters. Identifiers are uppercased here, once, before they are
//! used as keys anywhere (storage, lookup, display).

use regex::Regex;
use std::sync::LazyLock;

static VIN_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Z0-9]{17}$").expect("invalid VIN pattern"));

/// Returns the uppercased identifier if `text` has the VIN shape.
pub fn normalize(text: &str) -> Option<String> {
    let candidate = text.trim().to_uppercase();
    VIN_RE.is_match(&candidate).then_some(candidate)
}
