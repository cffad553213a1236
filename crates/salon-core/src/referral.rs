//! # Referral Codes
//!
//! A code is a prefix derived from the client and branch ids plus a random
//! suffix: `ANNMAK-3F9C1A`. The suffix entropy is supplied by the caller so
//! this module stays deterministic.

use crate::error::ValidationError;
use crate::validation::ValidationResult;

/// Maximum accepted length of a code typed at the front desk.
pub const MAX_CODE_LEN: usize = 32;

/// Prefix derived from the client and branch ids.
///
/// Three alphanumeric characters of each, upper-cased, padded with `X`.
pub fn code_prefix(client_id: &str, branch_id: &str) -> String {
    format!("{}{}", take_alnum(client_id, 3), take_alnum(branch_id, 3))
}

/// Builds a code from the prefix and the first `suffix_len` alphanumeric
/// characters of `entropy` (typically a fresh UUID).
///
/// ```rust
/// use salon_core::referral::generate_code;
///
/// let code = generate_code("anna-1", "makati", "3f9c1a77-0000", 6);
/// assert_eq!(code, "ANNMAK-3F9C1A");
/// ```
pub fn generate_code(client_id: &str, branch_id: &str, entropy: &str, suffix_len: usize) -> String {
    format!(
        "{}-{}",
        code_prefix(client_id, branch_id),
        take_alnum(entropy, suffix_len)
    )
}

/// Canonical form of a code entered by a user: trimmed, upper-cased.
pub fn normalize_code(input: &str) -> ValidationResult<String> {
    let code = input.trim().to_ascii_uppercase();

    if code.is_empty() {
        return Err(ValidationError::required("code"));
    }

    if code.len() > MAX_CODE_LEN {
        return Err(ValidationError::TooLong {
            field: "code".to_string(),
            max: MAX_CODE_LEN,
        });
    }

    if !code.chars().all(|c| c.is_ascii_alphanumeric() || c == '-') {
        return Err(ValidationError::InvalidFormat {
            field: "code".to_string(),
            reason: "must contain only letters, numbers, and hyphens".to_string(),
        });
    }

    Ok(code)
}

fn take_alnum(source: &str, len: usize) -> String {
    let mut out: String = source
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .take(len)
        .collect::<String>()
        .to_ascii_uppercase();
    while out.len() < len {
        out.push('X');
    }
    out
}
