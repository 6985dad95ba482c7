//! Decimal formatting helpers for notification text.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;

/// Format with a fixed number of decimals and `,` thousands separators.
pub fn group_thousands(value: Decimal, decimals: u32) -> String {
    let rounded = value.round_dp(decimals);
    let text = format!("{:.*}", decimals as usize, rounded.abs());
    let (int_part, frac_part) = match text.split_once('.') {
        Some((i, f)) => (i, Some(f)),
        None => (text.as_str(), None),
    };

    let mut grouped = String::with_capacity(text.len() + int_part.len() / 3 + 1);
    if rounded.is_sign_negative() && !rounded.is_zero() {
        grouped.push('-');
    }
    for (i, ch) in int_part.chars().enumerate() {
        if i > 0 && (int_part.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }
    if let Some(frac) = frac_part {
        grouped.push('.');
        grouped.push_str(frac);
    }
    grouped
}

/// Like [`group_thousands`] but drops trailing fractional zeros.
pub fn round_to_str(value: Decimal, precision: u32) -> String {
    let rounded = group_thousands(value, precision);
    if precision == 0 {
        rounded
    } else {
        rounded.trim_end_matches('0').trim_end_matches('.').to_string()
    }
}

/// Debt display precision scales with magnitude.
pub fn format_debt(value: Decimal) -> String {
    if value >= dec!(1000) {
        round_to_str(value, 0)
    } else if value >= Decimal::ONE {
        round_to_str(value, 2)
    } else {
        value.normalize().to_string()
    }
}

/// Convert a ratio to a percentage (1.5 -> 150).
pub fn to_percent(ratio: Decimal) -> Decimal {
    ratio * dec!(100)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_group_thousands() {
        assert_eq!(group_thousands(dec!(1234567.891), 0), "1,234,568");
        assert_eq!(group_thousands(dec!(999), 0), "999");
        assert_eq!(group_thousands(dec!(1000), 2), "1,000.00");
        assert_eq!(group_thousands(dec!(-25000.5), 1), "-25,000.5");
    }

    #[test]
    fn test_round_to_str_trims() {
        assert_eq!(round_to_str(dec!(12.50), 2), "12.5");
        assert_eq!(round_to_str(dec!(12.00), 2), "12");
        assert_eq!(round_to_str(dec!(1234.5), 0), "1,234");
    }

    #[test]
    fn test_format_debt_precision() {
        assert_eq!(format_debt(dec!(15234.7)), "15,235");
        assert_eq!(format_debt(dec!(12.345)), "12.34");
        assert_eq!(format_debt(dec!(0.000123)), "0.000123");
    }

    #[test]
    fn test_to_percent() {
        assert_eq!(to_percent(dec!(1.2)), dec!(120));
    }
}
