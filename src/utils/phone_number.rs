//! Phone number matching for UK-style numbers.
//!
//! Contacts are entered by carers in whatever format they like ("07700 900123",
//! "+44 7700 900123") while the platform hands us the raw dialled string, so
//! every comparison goes through [`normalize`] first.

const MATCH_SUFFIX_LEN: usize = 10;

/// Strips formatting and rewrites a `44` country prefix to the national `0`.
pub fn normalize(number: &str) -> String {
    let digits: String = number.chars().filter(|c| c.is_ascii_digit()).collect();

    if digits.starts_with("44") && digits.len() > 10 {
        format!("0{}", &digits[2..])
    } else {
        digits
    }
}

/// Last `len` digits of the normalized number.
pub fn match_suffix(number: &str, len: usize) -> String {
    let normalized = normalize(number);
    let skip = normalized.len().saturating_sub(len);
    normalized[skip..].to_string()
}

/// Two numbers match when one normalized suffix ends with the other.
pub fn is_match(a: &str, b: &str) -> bool {
    let left = match_suffix(a, MATCH_SUFFIX_LEN);
    let right = match_suffix(b, MATCH_SUFFIX_LEN);

    if left.is_empty() || right.is_empty() {
        return false;
    }

    left.ends_with(&right) || right.ends_with(&left)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_formatting() {
        assert_eq!(normalize("(01632) 960-001"), "01632960001");
        assert_eq!(normalize(" 07700 900 123 "), "07700900123");
    }

    #[test]
    fn rewrites_uk_country_code() {
        assert_eq!(normalize("+44 7700 900123"), "07700900123");
        // Too short to carry a country code.
        assert_eq!(normalize("4412345"), "4412345");
    }

    #[test]
    fn international_and_national_forms_match() {
        assert!(is_match("+44 7700 900123", "07700 900123"));
        assert!(is_match("07700900123", "7700900123"));
        assert!(!is_match("07700900123", "07700900124"));
    }

    #[test]
    fn empty_numbers_never_match() {
        assert!(!is_match("", ""));
        assert!(!is_match("Unknown", "07700900123"));
    }
}
