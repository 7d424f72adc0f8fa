//! Per-chain extraction strategies.
//!
//! Each handler knows the layout quirks of one chain's register tape; the
//! generic handler covers everything else with vendor-agnostic patterns.
//! Shared helpers (dates, payment methods, currency marks, totals
//! reconciliation) live here so the vendor modules stay small.

pub mod costco;
pub mod generic;
pub mod h_mart;
pub mod key_food;
pub mod trader_joes;
pub mod walmart;

use chrono::NaiveDate;
use divvy_core::{parse_amount, round2, Currency};
use regex::Regex;

use crate::re;
use crate::types::{ExtractedItem, HandlerResult, PaymentMethod};

/// Subtotal, tax and total as stated on the tape, before reconciliation.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Totals {
    pub subtotal: Option<f64>,
    pub tax: Option<f64>,
    pub total: Option<f64>,
}

/// Receipt-level fields that are neither line items nor money totals.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Metadata {
    pub store_name: Option<String>,
    pub date: Option<NaiveDate>,
    pub payment_method: Option<PaymentMethod>,
    pub currency: Option<Currency>,
}

/// One extraction strategy over raw OCR text.
///
/// Implementations are stateless and independent of each other; the registry
/// builds a fresh one per lookup. Every method must tolerate arbitrary
/// garbage and come back empty rather than fail.
pub trait ExtractReceipt: Send + Sync {
    /// Identifier the registry knows this handler by.
    fn name(&self) -> &'static str;

    fn extract_items(&self, text: &str) -> Vec<ExtractedItem>;

    fn extract_totals(&self, text: &str) -> Totals;

    fn extract_metadata(&self, text: &str) -> Metadata;

    /// Run the three extraction stages and reconcile the totals.
    fn process_receipt(&self, text: &str) -> HandlerResult {
        let items = self.extract_items(text);
        let totals = self.extract_totals(text);
        let meta = self.extract_metadata(text);
        let mut result = HandlerResult {
            items,
            subtotal: totals.subtotal,
            tax: totals.tax,
            total: totals.total,
            store_name: meta.store_name,
            date: meta.date,
            payment_method: meta.payment_method,
            currency: meta.currency,
        };
        complete_totals(&mut result);
        tracing::debug!(
            handler = self.name(),
            items = result.items.len(),
            total = ?result.total,
            "extraction complete"
        );
        result
    }
}

/// Derive whichever of subtotal/tax/total is missing from the other two,
/// discarding derivations implausible for a retail receipt, then backfill a
/// missing subtotal from the item sum.
pub fn complete_totals(result: &mut HandlerResult) {
    match (result.subtotal, result.tax, result.total) {
        (Some(sub), Some(tax), None) => {
            result.total = Some(round2(sub + tax));
        }
        (Some(sub), None, Some(total)) => {
            let tax = round2(total - sub);
            if tax < 0.0 || tax > total * 0.25 {
                tracing::debug!(tax, total, "derived tax out of range, discarding");
            } else {
                result.tax = Some(tax);
            }
        }
        (None, Some(tax), Some(total)) => {
            let sub = round2(total - tax);
            if sub > 0.0 {
                result.subtotal = Some(sub);
            }
        }
        _ => {}
    }
    if result.subtotal.is_none() && !result.items.is_empty() {
        result.subtotal = Some(round2(result.item_sum()));
    }
    if let (Some(sub), Some(tax), Some(total)) = (result.subtotal, result.tax, result.total) {
        if (round2(sub + tax) - total).abs() > 0.02 {
            tracing::warn!(subtotal = sub, tax, total, "stated totals do not reconcile");
        }
    }
}

// ── Shared line filters ─────────────────────────────────────────────────────

/// Words marking receipt furniture rather than purchasable items.
pub(crate) const SKIP_KEYWORDS: &[&str] = &[
    "total", "subtotal", "tax", "sum", "amount", "balance", "credit", "debit", "change", "cash",
    "payment", "paid", "discount", "due", "account", "customer", "store", "receipt", "invoice",
    "date", "welcome", "thank you", "thanks", "phone", "tel", "fax", "address", "website", "url",
    "http", "www", "email", "e-mail",
];

pub(crate) fn contains_skip_keyword(line: &str) -> bool {
    let lower = line.to_lowercase();
    SKIP_KEYWORDS.iter().any(|k| lower.contains(k))
}

/// First capture across lines and patterns that parses as an amount.
/// Lines are scanned lowercased, outermost, so the earliest line wins.
pub(crate) fn find_labeled_amount(text: &str, patterns: &[&Regex]) -> Option<f64> {
    for line in text.lines() {
        let lower = line.to_lowercase();
        for pattern in patterns {
            if let Some(value) = pattern
                .captures(&lower)
                .and_then(|c| c.get(1))
                .and_then(|m| parse_amount(m.as_str()))
            {
                return Some(value);
            }
        }
    }
    None
}

// ── Dates ───────────────────────────────────────────────────────────────────

re!(date_label, r"\b(?:date|time|receipt|transaction)\b");
re!(date_ymd, r"(\d{4})[/\.\-](\d{1,2})[/\.\-](\d{1,2})");
re!(date_mdy, r"(\d{1,2})[/\.\-](\d{1,2})[/\.\-](\d{2,4})");
re!(
    date_month_day,
    r"(?i)\b(jan|feb|mar|apr|may|jun|jul|aug|sep|oct|nov|dec)[a-z]*\.?\s+(\d{1,2})(?:st|nd|rd|th)?,?\s+(\d{4})"
);
re!(
    date_day_month,
    r"(?i)\b(\d{1,2})(?:st|nd|rd|th)?\s+(jan|feb|mar|apr|may|jun|jul|aug|sep|oct|nov|dec)[a-z]*\.?,?\s+(\d{4})"
);

/// Find a receipt date, preferring lines labeled date/transaction over a
/// bare date anywhere in the text. Ambiguous numeric dates read as m/d/y.
pub(crate) fn extract_date(text: &str) -> Option<NaiveDate> {
    for line in text.lines() {
        if date_label().is_match(&line.to_lowercase()) {
            if let Some(date) = date_in_line(line) {
                return Some(date);
            }
        }
    }
    text.lines().find_map(date_in_line)
}

fn date_in_line(line: &str) -> Option<NaiveDate> {
    if let Some(c) = date_ymd().captures(line) {
        if let Some(date) = build_date(group_u32(&c, 1), group_u32(&c, 2), group_u32(&c, 3)) {
            return Some(date);
        }
    }
    if let Some(c) = date_mdy().captures(line) {
        let year = group_u32(&c, 3).map(expand_year);
        if let Some(date) = build_date(year, group_u32(&c, 1), group_u32(&c, 2)) {
            return Some(date);
        }
    }
    if let Some(c) = date_month_day().captures(line) {
        if let Some(date) = build_date(group_u32(&c, 3), month_number(&c[1]), group_u32(&c, 2)) {
            return Some(date);
        }
    }
    if let Some(c) = date_day_month().captures(line) {
        if let Some(date) = build_date(group_u32(&c, 3), month_number(&c[2]), group_u32(&c, 1)) {
            return Some(date);
        }
    }
    None
}

fn group_u32(caps: &regex::Captures<'_>, idx: usize) -> Option<u32> {
    caps.get(idx).and_then(|m| m.as_str().parse().ok())
}

/// Two-digit years split at 50: 49 → 2049, 50 → 1950.
pub(crate) fn expand_year(year: u32) -> u32 {
    match year {
        0..=49 => year + 2000,
        50..=99 => year + 1900,
        _ => year,
    }
}

fn build_date(year: Option<u32>, month: Option<u32>, day: Option<u32>) -> Option<NaiveDate> {
    let (year, month, day) = (year?, month?, day?);
    if !(1900..=2100).contains(&year) {
        return None;
    }
    NaiveDate::from_ymd_opt(year as i32, month, day)
}

fn month_number(name: &str) -> Option<u32> {
    let n = match name.to_lowercase().as_str() {
        "jan" => 1,
        "feb" => 2,
        "mar" => 3,
        "apr" => 4,
        "may" => 5,
        "jun" => 6,
        "jul" => 7,
        "aug" => 8,
        "sep" => 9,
        "oct" => 10,
        "nov" => 11,
        "dec" => 12,
        _ => return None,
    };
    Some(n)
}

// ── Currency and payment ────────────────────────────────────────────────────

re!(cad_marker, r"\bCAD\b|(?i:\bcanad(?:a|ian)\b)");
re!(aud_marker, r"\bAUD\b|(?i:\baustralia\b)");

/// Currency from symbols or codes in the text; USD when nothing else shows.
pub(crate) fn detect_currency(text: &str) -> Currency {
    if text.contains('€') || text.contains("EUR") {
        Currency::Eur
    } else if text.contains('£') || text.contains("GBP") {
        Currency::Gbp
    } else if text.contains('¥') || text.contains("JPY") {
        Currency::Jpy
    } else if cad_marker().is_match(text) {
        Currency::Cad
    } else if aud_marker().is_match(text) {
        Currency::Aud
    } else {
        Currency::Usd
    }
}

re!(pay_credit, r"\b(?:credit|visa|mastercard|amex|american express)\b");
re!(pay_debit, r"\b(?:debit|check card)\b");
re!(pay_cash, r"\b(?:cash|money)\b");
re!(pay_change, r"\bchange\b");
re!(pay_electronic, r"\b(?:paypal|venmo|apple pay|google pay|ebt)\b");
re!(pay_check, r"\b(?:check|cheque)\b");
re!(pay_gift, r"\b(?:gift card|store credit)\b");
re!(pay_auth_line, r"\b(?:approved|auth|code|transaction)\b");
re!(pay_card_brand, r"\b(?:visa|mastercard|mc|amex|discover)\b");

/// Classify the payment method from keyword groups; cash requires a change
/// line so grocery items named "cash" don't trigger it. Falls back to card
/// brands named on an authorization line.
pub(crate) fn detect_payment(text: &str) -> Option<PaymentMethod> {
    let lower = text.to_lowercase();
    if pay_credit().is_match(&lower) {
        return Some(PaymentMethod::Credit);
    }
    if pay_debit().is_match(&lower) {
        return Some(PaymentMethod::Debit);
    }
    if pay_cash().is_match(&lower) && pay_change().is_match(&lower) {
        return Some(PaymentMethod::Cash);
    }
    if pay_electronic().is_match(&lower) {
        return Some(PaymentMethod::Electronic);
    }
    if pay_check().is_match(&lower) {
        return Some(PaymentMethod::Check);
    }
    if pay_gift().is_match(&lower) {
        return Some(PaymentMethod::GiftCard);
    }
    for line in lower.lines() {
        if pay_auth_line().is_match(line) && pay_card_brand().is_match(line) {
            return Some(PaymentMethod::Credit);
        }
    }
    None
}

re!(looks_like_date, r"\d{2}[/\.\-]\d{2}[/\.\-]\d{2,4}");
re!(looks_like_address, r"\d+ .+ (?:st|ave|rd|blvd)\b");

/// First plausibly-sized header line that is not a date or street address.
pub(crate) fn guess_store_name(text: &str) -> Option<String> {
    text.trim()
        .lines()
        .take(5)
        .map(str::trim)
        .find(|line| {
            let len = line.chars().count();
            len > 2
                && len < 30
                && !looks_like_date().is_match(line)
                && !looks_like_address().is_match(&line.to_lowercase())
        })
        .map(str::to_string)
}

// ── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derives_total_from_subtotal_and_tax() {
        let mut r = HandlerResult {
            subtotal: Some(10.00),
            tax: Some(0.88),
            ..Default::default()
        };
        complete_totals(&mut r);
        assert_eq!(r.total, Some(10.88));
    }

    #[test]
    fn derives_tax_within_plausible_range() {
        let mut r = HandlerResult {
            subtotal: Some(10.00),
            total: Some(10.80),
            ..Default::default()
        };
        complete_totals(&mut r);
        assert_eq!(r.tax, Some(0.80));
    }

    #[test]
    fn discards_tax_over_quarter_of_total() {
        let mut r = HandlerResult {
            subtotal: Some(5.00),
            total: Some(10.00),
            ..Default::default()
        };
        complete_totals(&mut r);
        assert_eq!(r.tax, None);
    }

    #[test]
    fn discards_negative_derived_tax() {
        let mut r = HandlerResult {
            subtotal: Some(12.00),
            total: Some(10.00),
            ..Default::default()
        };
        complete_totals(&mut r);
        assert_eq!(r.tax, None);
    }

    #[test]
    fn derives_subtotal_when_positive() {
        let mut r = HandlerResult {
            tax: Some(1.00),
            total: Some(11.00),
            ..Default::default()
        };
        complete_totals(&mut r);
        assert_eq!(r.subtotal, Some(10.00));
    }

    #[test]
    fn backfills_subtotal_from_items() {
        let mut r = HandlerResult {
            items: vec![
                ExtractedItem::new("MILK", 3.49, 1.0, 0.9),
                ExtractedItem::new("EGGS", 4.99, 1.0, 0.9),
            ],
            ..Default::default()
        };
        complete_totals(&mut r);
        assert_eq!(r.subtotal, Some(8.48));
    }

    #[test]
    fn date_prefers_labeled_line() {
        let text = "MILK 12/25/2021 BATCH\nTRANSACTION DATE 03/04/2022";
        assert_eq!(
            extract_date(text),
            NaiveDate::from_ymd_opt(2022, 3, 4)
        );
    }

    #[test]
    fn date_falls_back_to_any_line() {
        assert_eq!(
            extract_date("STORE 42\n07/15/24\nTOTAL 9.99"),
            NaiveDate::from_ymd_opt(2024, 7, 15)
        );
    }

    #[test]
    fn date_parses_iso_form() {
        assert_eq!(
            extract_date("2023-11-05 14:22"),
            NaiveDate::from_ymd_opt(2023, 11, 5)
        );
    }

    #[test]
    fn date_parses_month_name_form() {
        assert_eq!(
            extract_date("January 5th, 2024"),
            NaiveDate::from_ymd_opt(2024, 1, 5)
        );
        assert_eq!(
            extract_date("5 Jan 2024"),
            NaiveDate::from_ymd_opt(2024, 1, 5)
        );
    }

    #[test]
    fn date_rejects_invalid_components() {
        assert_eq!(extract_date("99/99/2024"), None);
        assert_eq!(extract_date("no dates here"), None);
    }

    #[test]
    fn currency_from_symbols_and_codes() {
        assert_eq!(detect_currency("TOTAL €10.00"), Currency::Eur);
        assert_eq!(detect_currency("TOTAL £10.00"), Currency::Gbp);
        assert_eq!(detect_currency("CAD TOTAL 10.00"), Currency::Cad);
        assert_eq!(detect_currency("TOTAL $10.00"), Currency::Usd);
        assert_eq!(detect_currency(""), Currency::Usd);
    }

    #[test]
    fn payment_keyword_classes() {
        assert_eq!(detect_payment("PAID VISA ****1234"), Some(PaymentMethod::Credit));
        assert_eq!(detect_payment("DEBIT TEND 20.00"), Some(PaymentMethod::Debit));
        assert_eq!(
            detect_payment("CASH 20.00\nCHANGE 3.55"),
            Some(PaymentMethod::Cash)
        );
        assert_eq!(detect_payment("EBT 45.00"), Some(PaymentMethod::Electronic));
        assert_eq!(detect_payment("BANANAS 0.99"), None);
    }

    #[test]
    fn store_name_skips_dates_and_addresses() {
        let text = "12/25/2024\n123 MAIN ST\nCORNER GROCERY\nTOTAL 5.00";
        assert_eq!(guess_store_name(text), Some("CORNER GROCERY".into()));
    }
}
