//! H Mart receipts.
//!
//! Tapes mix Korean and English; item lines are uppercase ASCII with two
//! trailing amounts (unit and extended), or a weight/quantity breakdown
//! between the name and the extended price. Korean-only lines carry no
//! prices and fall through untouched.

use divvy_core::Currency;

use crate::re;
use crate::types::ExtractedItem;

use super::{detect_payment, extract_date, ExtractReceipt, Metadata, Totals};

pub struct HMartHandler;

re!(
    item_line,
    r"^([A-Z\s]+?)\s+(?:(\d+(?:\.\d+)?)\s*(?i:lb)?\s*@\s*(\d+\.\d+)|(\d+\.\d+))\s+(\d+\.\d+)\s*$"
);
re!(subtotal_line, r"SUBTOTAL\s+(\d+\.\d+)");
re!(tax_line, r"TAX\s+(\d+\.\d+)");
re!(total_line, r"TOTAL\s+(\d+\.\d+)");

impl ExtractReceipt for HMartHandler {
    fn name(&self) -> &'static str {
        "h_mart"
    }

    fn extract_items(&self, text: &str) -> Vec<ExtractedItem> {
        let mut items = Vec::new();
        for line in text.lines() {
            let Some(caps) = item_line().captures(line.trim()) else {
                continue;
            };
            let description = caps.get(1).map_or("", |m| m.as_str()).trim();
            let Some(price) = caps.get(5).and_then(|m| m.as_str().parse::<f64>().ok())
            else {
                continue;
            };
            let quantity = caps
                .get(2)
                .and_then(|m| m.as_str().parse::<f64>().ok())
                .unwrap_or(1.0);
            if description.len() < 2 {
                continue;
            }
            items.push(ExtractedItem::new(description, price, quantity, 0.85));
        }
        items
    }

    fn extract_totals(&self, text: &str) -> Totals {
        let mut totals = Totals::default();
        for line in text.lines() {
            let line = line.trim().to_uppercase();
            // SUBTOTAL lines would also satisfy the TOTAL pattern, so the
            // checks are ordered and exclusive per line.
            if let Some(v) = capture_amount(subtotal_line(), &line) {
                totals.subtotal = Some(v);
            } else if let Some(v) = capture_amount(tax_line(), &line) {
                totals.tax = Some(v);
            } else if let Some(v) = capture_amount(total_line(), &line) {
                totals.total = Some(v);
            }
        }
        totals
    }

    fn extract_metadata(&self, text: &str) -> Metadata {
        Metadata {
            store_name: Some("H Mart".to_string()),
            date: extract_date(text),
            payment_method: detect_payment(text),
            currency: Some(Currency::Usd),
        }
    }
}

fn capture_amount(pattern: &regex::Regex, line: &str) -> Option<f64> {
    pattern
        .captures(line)
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse().ok())
}
