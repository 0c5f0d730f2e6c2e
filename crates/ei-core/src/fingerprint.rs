//! Payment deduplication fingerprint and currency/amount normalization.

use chrono::NaiveDate;

/// Lowercases and strips punctuation/whitespace so "Acme Ltd" and
/// "acme ltd." fingerprint identically. Deliberately keeps legal suffixes
/// (Ltd/Inc/…) rather than stripping them — collapsing "Acme Ltd" and a
/// genuinely different "Acme Trading" down to the same vendor key would be
/// a false-positive dedup.
pub fn normalize_vendor(vendor: &str) -> String {
    vendor
        .to_ascii_lowercase()
        .chars()
        .filter(|c| c.is_alphanumeric())
        .collect()
}

/// `normalize(vendor) | amount | currency | date`
///
/// Equal inputs produce equal fingerprints; changing vendor, amount,
/// currency, or date produces a different fingerprint (spec §8).
pub fn payment_fingerprint(vendor: &str, amount: &str, currency: &str, date: NaiveDate) -> String {
    format!(
        "{}|{}|{}|{}",
        normalize_vendor(vendor),
        amount,
        currency,
        date.format("%Y-%m-%d")
    )
}

/// Known currency symbols, longest-match first so multi-char symbols aren't
/// shadowed by a single-char prefix.
const CURRENCY_SYMBOLS: &[(&str, &str)] = &[("US$", "USD"), ("£", "GBP"), ("€", "EUR"), ("$", "USD"), ("¥", "JPY")];

/// Parses an amount string that may carry a leading/trailing currency
/// symbol, a decimal comma, and thousands grouping (either `,` or `.` as
/// the grouping character, inferred from which one appears last).
///
/// Returns `(amount formatted to 2 decimals, currency code or None)`.
pub fn parse_amount(raw: &str) -> Option<(String, Option<String>)> {
    let trimmed = raw.trim();
    let mut currency = None;
    let mut body = trimmed;
    for (symbol, code) in CURRENCY_SYMBOLS {
        if let Some(rest) = body.strip_prefix(symbol) {
            currency = Some(code.to_string());
            body = rest;
            break;
        }
        if let Some(rest) = body.strip_suffix(symbol) {
            currency = Some(code.to_string());
            body = rest;
            break;
        }
    }
    body = body.trim();

    // Trailing alphabetic currency code: "12,34 GBP".
    if currency.is_none() {
        if let Some((amount_part, code_part)) = body.rsplit_once(' ') {
            if code_part.len() == 3 && code_part.chars().all(|c| c.is_ascii_alphabetic()) {
                currency = Some(code_part.to_ascii_uppercase());
                body = amount_part.trim();
            }
        }
    }

    let normalized = normalize_decimal(body)?;
    Some((normalized, currency))
}

/// Disambiguates `,` vs `.` as the decimal separator: whichever appears
/// last is the decimal point; the other is a thousands grouping character
/// and is stripped.
fn normalize_decimal(s: &str) -> Option<String> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }
    let last_comma = s.rfind(',');
    let last_dot = s.rfind('.');

    let (decimal_pos, grouping_char) = match (last_comma, last_dot) {
        (Some(c), Some(d)) if c > d => (Some(c), '.'),
        (Some(c), Some(d)) if d > c => (Some(d), ','),
        (Some(c), None) => (Some(c), '.'),
        (None, Some(d)) => (Some(d), ','),
        _ => (None, ','),
    };

    let mut integer_part = String::new();
    let mut fractional_part = String::new();
    match decimal_pos {
        Some(pos) => {
            for (i, c) in s.chars().enumerate() {
                if c == grouping_char {
                    continue;
                }
                if i == pos {
                    continue;
                }
                if i < pos {
                    if c.is_ascii_digit() {
                        integer_part.push(c);
                    }
                } else if c.is_ascii_digit() {
                    fractional_part.push(c);
                }
            }
        }
        None => {
            integer_part = s.chars().filter(|c| c.is_ascii_digit()).collect();
        }
    }

    if integer_part.is_empty() {
        integer_part.push('0');
    }
    fractional_part.truncate(2);
    while fractional_part.len() < 2 {
        fractional_part.push('0');
    }

    let value: f64 = format!("{integer_part}.{fractional_part}").parse().ok()?;
    Some(format!("{value:.2}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn fingerprint_matches_across_vendor_and_amount_spellings() {
        let a = payment_fingerprint(
            "Acme Ltd",
            &parse_amount("£12.34").unwrap().0,
            "GBP",
            NaiveDate::from_ymd_opt(2025, 3, 2).unwrap(),
        );
        let b = payment_fingerprint(
            "acme ltd.",
            &parse_amount("12,34 GBP").unwrap().0,
            "GBP",
            NaiveDate::from_ymd_opt(2025, 3, 2).unwrap(),
        );
        assert_eq!(a, b);
        assert_eq!(a, "acmeltd|12.34|GBP|2025-03-02");
    }

    #[test]
    fn changing_any_field_changes_fingerprint() {
        let base = payment_fingerprint("Acme", "12.34", "GBP", NaiveDate::from_ymd_opt(2025, 3, 2).unwrap());
        assert_ne!(base, payment_fingerprint("Beta", "12.34", "GBP", NaiveDate::from_ymd_opt(2025, 3, 2).unwrap()));
        assert_ne!(base, payment_fingerprint("Acme", "99.99", "GBP", NaiveDate::from_ymd_opt(2025, 3, 2).unwrap()));
        assert_ne!(base, payment_fingerprint("Acme", "12.34", "USD", NaiveDate::from_ymd_opt(2025, 3, 2).unwrap()));
        assert_ne!(base, payment_fingerprint("Acme", "12.34", "GBP", NaiveDate::from_ymd_opt(2025, 3, 3).unwrap()));
    }

    #[test]
    fn parses_currency_symbols() {
        assert_eq!(parse_amount("$12.00").unwrap(), ("12.00".into(), Some("USD".into())));
        assert_eq!(parse_amount("€9.50").unwrap(), ("9.50".into(), Some("EUR".into())));
    }

    #[test]
    fn tolerates_thousands_grouping() {
        assert_eq!(parse_amount("1,234.56").unwrap().0, "1234.56");
        assert_eq!(parse_amount("1.234,56").unwrap().0, "1234.56");
    }

    proptest::proptest! {
        #[test]
        fn fingerprint_is_a_pure_function_of_its_inputs(
            vendor in "[A-Za-z ]{1,20}",
            amount in "[0-9]{1,5}\\.[0-9]{2}",
            currency in "[A-Z]{3}",
            year in 2000i32..2100,
            month in 1u32..=12,
            day in 1u32..=28,
        ) {
            let date = NaiveDate::from_ymd_opt(year, month, day).unwrap();
            let a = payment_fingerprint(&vendor, &amount, &currency, date);
            let b = payment_fingerprint(&vendor, &amount, &currency, date);
            prop_assert_eq!(a, b);
        }

        #[test]
        fn normalize_vendor_is_idempotent(vendor in ".{0,40}") {
            let once = normalize_vendor(&vendor);
            let twice = normalize_vendor(&once);
            prop_assert_eq!(once, twice);
        }
    }
}
