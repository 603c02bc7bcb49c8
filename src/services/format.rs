//! Presentation helpers shared by the read-side services.

use rust_decimal::{Decimal, RoundingStrategy};

/// Two decimals, comma-grouped thousands: `1234.5` becomes `1,234.50`.
pub fn format_money(amount: Decimal) -> String {
    let rounded = amount.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);
    let negative = rounded.is_sign_negative() && !rounded.is_zero();
    let plain = format!("{:.2}", rounded.abs());
    let (whole, fraction) = plain.split_once('.').unwrap_or((plain.as_str(), "00"));

    let mut grouped = String::with_capacity(whole.len() + whole.len() / 3);
    for (i, digit) in whole.chars().enumerate() {
        if i > 0 && (whole.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(digit);
    }

    format!("{}{}.{}", if negative { "-" } else { "" }, grouped, fraction)
}

/// Absolute URL for a stored asset path, or `None` when there is no path.
pub fn asset_url(base_url: &str, path: Option<&str>) -> Option<String> {
    let path = path.map(str::trim).filter(|p| !p.is_empty())?;
    if path.starts_with("http://") || path.starts_with("https://") {
        return Some(path.to_string());
    }
    Some(format!(
        "{}/{}",
        base_url.trim_end_matches('/'),
        path.trim_start_matches('/')
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use rust_decimal_macros::dec;

    #[rstest]
    #[case(dec!(0), "0.00")]
    #[case(dec!(5), "5.00")]
    #[case(dec!(100.5), "100.50")]
    #[case(dec!(999.999), "1,000.00")]
    #[case(dec!(1234.5), "1,234.50")]
    #[case(dec!(1234567.891), "1,234,567.89")]
    #[case(dec!(-2500), "-2,500.00")]
    fn money_formatting(#[case] amount: Decimal, #[case] expected: &str) {
        assert_eq!(format_money(amount), expected);
    }

    #[test]
    fn asset_url_joins_without_double_slashes() {
        assert_eq!(
            asset_url("https://shop.test/", Some("/images/bread.png")).as_deref(),
            Some("https://shop.test/images/bread.png")
        );
        assert_eq!(
            asset_url("https://shop.test", Some("images/bread.png")).as_deref(),
            Some("https://shop.test/images/bread.png")
        );
    }

    #[test]
    fn asset_url_is_none_without_path() {
        assert_eq!(asset_url("https://shop.test", None), None);
        assert_eq!(asset_url("https://shop.test", Some("  ")), None);
    }

    #[test]
    fn absolute_asset_paths_are_kept() {
        assert_eq!(
            asset_url("https://shop.test", Some("https://cdn.test/a.png")).as_deref(),
            Some("https://cdn.test/a.png")
        );
    }
}
