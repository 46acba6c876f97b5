//! Identifier generation and money conversion helpers

use bech32::Bech32m;
use chrono::Utc;
use uuid7::uuid7;

use super::error::ValidationError;

// construct a unique id then encode using bech32
pub fn new_uuid_to_bech32(hrp: &str) -> anyhow::Result<String> {
    let hrp = bech32::Hrp::parse(hrp)?;
    let encode = bech32::encode::<Bech32m>(hrp, uuid7().as_bytes())?;
    Ok(encode)
}

/// Human readable order number, e.g. `PS-2410-3FA91C`.
///
/// The suffix comes from the random tail of a uuid7 so numbers issued in the
/// same month stay distinct.
pub fn new_order_number(prefix: &str) -> String {
    let id = uuid7();
    let tail = &id.as_bytes()[13..16];

    format!(
        "{}-{}-{}",
        prefix,
        Utc::now().format("%y%m"),
        hex::encode_upper(tail)
    )
}

/// Parses a decimal money string ("1200", "1,200.5", "-30.25") into minor units.
pub fn parse_money(raw: &str) -> Result<i64, ValidationError> {
    let malformed = || ValidationError::MalformedMoney(raw.to_string());

    let cleaned: String = raw
        .trim()
        .chars()
        .filter(|c| *c != ',' && !c.is_whitespace())
        .collect();
    let (negative, digits) = match cleaned.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, cleaned.as_str()),
    };
    let (whole, fraction) = digits.split_once('.').unwrap_or((digits, ""));

    if whole.is_empty() && fraction.is_empty() {
        return Err(malformed());
    }
    if fraction.len() > 2 || !whole.chars().chain(fraction.chars()).all(|c| c.is_ascii_digit()) {
        return Err(malformed());
    }

    let whole: i64 = if whole.is_empty() {
        0
    } else {
        whole.parse().map_err(|_| malformed())?
    };
    let cents: i64 = match fraction.len() {
        0 => 0,
        1 => fraction.parse::<i64>().map_err(|_| malformed())? * 10,
        _ => fraction.parse().map_err(|_| malformed())?,
    };

    let value = whole
        .checked_mul(100)
        .and_then(|v| v.checked_add(cents))
        .ok_or_else(malformed)?;

    Ok(if negative { -value } else { value })
}

/// Formats minor units with two decimals, the inverse of [`parse_money`].
pub fn format_money(minor: i64) -> String {
    let sign = if minor < 0 { "-" } else { "" };
    let abs = minor.unsigned_abs();
    format!("{}{}.{:02}", sign, abs / 100, abs % 100)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn order_numbers_carry_prefix_and_differ() {
        let a = new_order_number("PS");
        let b = new_order_number("PS");

        assert!(a.starts_with("PS-"));
        assert_eq!(a.len(), "PS-2410-ABCDEF".len());
        assert_ne!(a, b);
    }

    #[test]
    fn money_parsing() {
        assert_eq!(parse_money("1000").unwrap(), 100_000);
        assert_eq!(parse_money("1,250.5").unwrap(), 125_050);
        assert_eq!(parse_money(" -30.25 ").unwrap(), -3_025);
        assert_eq!(parse_money(".75").unwrap(), 75);
        assert!(parse_money("").is_err());
        assert!(parse_money("12.345").is_err());
        assert!(parse_money("abc").is_err());
    }

    #[test]
    fn money_formatting() {
        assert_eq!(format_money(100_000), "1000.00");
        assert_eq!(format_money(-3_025), "-30.25");
        assert_eq!(format_money(5), "0.05");
        assert_eq!(parse_money(&format_money(98_765)).unwrap(), 98_765);
    }
}
