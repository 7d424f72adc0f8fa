use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use std::str::FromStr;

/// Parse a monetary amount string as it appears on printed receipts.
///
/// Accepts thousands separators (`"1,234.56"`), a comma used as the decimal
/// separator when no dot is present (`"12,50"`), and leading currency
/// symbols / stray OCR characters around the digits. Returns `None` when no
/// parseable amount remains.
pub fn parse_amount(s: &str) -> Option<f64> {
    let mut clean: String = s
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '.' || *c == ',')
        .collect();
    if clean.contains(',') && !clean.contains('.') {
        clean = clean.replace(',', ".");
    } else {
        clean = clean.replace(',', "");
    }
    if clean.is_empty() {
        return None;
    }
    let dec = Decimal::from_str(&clean).ok()?;
    dec.to_f64()
}

/// Round to two decimal places via `Decimal`, avoiding binary-float drift on
/// sums of item prices.
pub fn round2(value: f64) -> f64 {
    match Decimal::from_f64_retain(value) {
        Some(dec) => dec.round_dp(2).to_f64().unwrap_or(value),
        None => value,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_amount_plain() {
        assert_eq!(parse_amount("49.99"), Some(49.99));
        assert_eq!(parse_amount("0.01"), Some(0.01));
    }

    #[test]
    fn parse_amount_thousands_separator() {
        assert_eq!(parse_amount("1,234.56"), Some(1234.56));
    }

    #[test]
    fn parse_amount_comma_decimal() {
        assert_eq!(parse_amount("12,50"), Some(12.50));
    }

    #[test]
    fn parse_amount_strips_currency_symbols() {
        assert_eq!(parse_amount("$ 5.25"), Some(5.25));
        assert_eq!(parse_amount("€9.00"), Some(9.00));
    }

    #[test]
    fn parse_amount_rejects_garbage() {
        assert_eq!(parse_amount(""), None);
        assert_eq!(parse_amount("no digits here"), None);
        assert_eq!(parse_amount("..,"), None);
    }

    #[test]
    fn round2_sums() {
        assert_eq!(round2(0.1 + 0.2), 0.3);
        assert_eq!(round2(10.005), 10.0); // 10.005 as f64 sits just below the midpoint
        assert_eq!(round2(3.456), 3.46);
    }
}
