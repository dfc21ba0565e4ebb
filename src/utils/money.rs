//! Integer money helpers. All amounts are minor units (cents) of the billing
//! currency.

/// Platform cut of `gross`, rounded half away from zero to a whole minor unit.
pub fn platform_fee(gross: i64, fee_percentage: f64) -> i64 {
    ((gross as f64) * fee_percentage / 100.0).round() as i64
}

/// Amount credited to the owner once the platform fee is retained.
pub fn net_amount(gross: i64, fee_percentage: f64) -> i64 {
    gross - platform_fee(gross, fee_percentage)
}

/// Parses a provider decimal string such as `"12.30"` into minor units.
///
/// Only two-decimal currencies are supported; extra precision is accepted
/// only when it is all zeros.
pub fn parse_decimal_minor(value: &str) -> Option<i64> {
    let value = value.trim();
    let (whole, fraction) = match value.split_once('.') {
        Some((w, f)) => (w, f),
        None => (value, ""),
    };

    if whole.is_empty() || !whole.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    if !fraction.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    if fraction.len() > 2 && fraction[2..].bytes().any(|b| b != b'0') {
        return None;
    }

    let mut cents = String::from(&fraction[..fraction.len().min(2)]);
    while cents.len() < 2 {
        cents.push('0');
    }

    let whole: i64 = whole.parse().ok()?;
    let cents: i64 = cents.parse().ok()?;
    whole.checked_mul(100)?.checked_add(cents)
}

/// Formats minor units as a two-decimal string.
pub fn format_minor(amount: i64) -> String {
    let sign = if amount < 0 { "-" } else { "" };
    let abs = amount.unsigned_abs();
    format!("{}{}.{:02}", sign, abs / 100, abs % 100)
}
