//! Generated identifiers: SKU codes, URL slugs and order numbers.

use chrono::Utc;
use rand::seq::IndexedRandom;

const CODE_CHARSET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// Length of the random suffix in a SKU code.
pub const SKU_SUFFIX_LEN: usize = 7;

/// Length of the random suffix in an order number.
pub const ORDER_SUFFIX_LEN: usize = 6;

fn random_code(len: usize) -> String {
    let mut rng = rand::rng();
    (0..len)
        .map(|_| CODE_CHARSET.choose(&mut rng).copied().map_or('0', char::from))
        .collect()
}

/// Generate a SKU code of the form `SKU-<unix millis>-<7 uppercase alphanumerics>`.
///
/// ```
/// let code = atelier_core::generate_sku_code();
/// assert!(code.starts_with("SKU-"));
/// ```
#[must_use]
pub fn generate_sku_code() -> String {
    format!(
        "SKU-{}-{}",
        Utc::now().timestamp_millis(),
        random_code(SKU_SUFFIX_LEN)
    )
}

/// Generate a human-facing order number, `ORD-<YYYYMMDD>-<6 uppercase alphanumerics>`.
#[must_use]
pub fn generate_order_number() -> String {
    format!(
        "ORD-{}-{}",
        Utc::now().format("%Y%m%d"),
        random_code(ORDER_SUFFIX_LEN)
    )
}

/// Turn a display name into a URL slug.
///
/// Lowercases ASCII letters, keeps ASCII digits, and collapses every other run
/// of characters into a single `-`. Leading and trailing dashes are dropped.
///
/// ```
/// assert_eq!(atelier_core::slugify("  Linen Shirt (Navy) "), "linen-shirt-navy");
/// ```
#[must_use]
pub fn slugify(input: &str) -> String {
    let mut slug = String::with_capacity(input.len());
    for c in input.chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c.to_ascii_lowercase());
        } else if !slug.is_empty() && !slug.ends_with('-') {
            slug.push('-');
        }
    }
    while slug.ends_with('-') {
        slug.pop();
    }
    slug
}

/// Whether `slug` is already in canonical form.
#[must_use]
pub fn is_valid_slug(slug: &str) -> bool {
    !slug.is_empty() && slugify(slug) == slug
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    fn is_code_char(c: char) -> bool {
        c.is_ascii_uppercase() || c.is_ascii_digit()
    }

    #[test]
    fn test_sku_code_format() {
        let code = generate_sku_code();
        let parts: Vec<&str> = code.split('-').collect();

        assert_eq!(parts.len(), 3, "unexpected code {code}");
        assert_eq!(parts.first(), Some(&"SKU"));
        assert!(
            parts
                .get(1)
                .is_some_and(|ts| !ts.is_empty() && ts.chars().all(|c| c.is_ascii_digit()))
        );
        assert!(
            parts
                .get(2)
                .is_some_and(|s| s.len() == SKU_SUFFIX_LEN && s.chars().all(is_code_char))
        );
    }

    #[test]
    fn test_sku_codes_are_unique() {
        let codes: HashSet<String> = (0..1000).map(|_| generate_sku_code()).collect();
        assert_eq!(codes.len(), 1000);
    }

    #[test]
    fn test_order_number_format() {
        let number = generate_order_number();
        assert!(number.starts_with("ORD-"));
        assert_eq!(number.len(), "ORD-20260101-ABC123".len());
        assert!(number.chars().skip(4).all(|c| c == '-' || is_code_char(c)));
    }

    #[test]
    fn test_slugify() {
        assert_eq!(slugify("Linen Shirt"), "linen-shirt");
        assert_eq!(slugify("  --Hello,   World!--  "), "hello-world");
        assert_eq!(slugify("Café Crème 2024"), "caf-cr-me-2024");
        assert_eq!(slugify("already-a-slug"), "already-a-slug");
        assert_eq!(slugify("!!!"), "");
    }

    #[test]
    fn test_is_valid_slug() {
        assert!(is_valid_slug("wool-coat"));
        assert!(!is_valid_slug("Wool Coat"));
        assert!(!is_valid_slug("wool--coat"));
        assert!(!is_valid_slug(""));
    }
}
