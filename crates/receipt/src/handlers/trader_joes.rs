//! Trader Joe's receipts.
//!
//! Clean uppercase tapes: one item per line with the price at the end, an
//! occasional `N @ unit` line restating quantity for the item above, and
//! voided lines that show up negated.

use divvy_core::Currency;

use crate::re;
use crate::types::ExtractedItem;

use super::{contains_skip_keyword, detect_payment, extract_date, ExtractReceipt, Metadata, Totals};

pub struct TraderJoesHandler;

re!(item_line, r"^(.+?)\s+\$?(\d+\.\d{2})$");
re!(qty_line, r"^(\d+)\s*@\s*\$?(\d+\.\d{2})$");
re!(negated_amount, r"-\s*\$?\d+\.\d{2}\s*$");
re!(voided, r"(?i)\bvoid(?:ed)?\b");
re!(amount_at_end, r"\$?(\d+\.\d{2})\s*$");
re!(store_number, r"(?i)store\s*#\s*(\d{3})");

impl ExtractReceipt for TraderJoesHandler {
    fn name(&self) -> &'static str {
        "trader_joes"
    }

    fn extract_items(&self, text: &str) -> Vec<ExtractedItem> {
        let mut items: Vec<ExtractedItem> = Vec::new();
        for line in text.lines() {
            let line = line.trim();
            if line.len() < 4 || contains_skip_keyword(line) {
                continue;
            }
            if voided().is_match(line) || negated_amount().is_match(line) {
                continue;
            }
            if let Some(caps) = qty_line().captures(line) {
                if let (Some(last), Some(q)) = (
                    items.last_mut(),
                    caps.get(1).and_then(|m| m.as_str().parse::<f64>().ok()),
                ) {
                    last.quantity = q;
                }
                continue;
            }
            if let Some(caps) = item_line().captures(line) {
                let description = caps.get(1).map_or("", |m| m.as_str()).trim();
                let Some(price) = caps.get(2).and_then(|m| m.as_str().parse::<f64>().ok())
                else {
                    continue;
                };
                if description.chars().count() < 3
                    || !description.chars().any(|c| c.is_ascii_alphabetic())
                {
                    continue;
                }
                items.push(ExtractedItem::new(description, price, 1.0, 0.85));
            }
        }
        items
    }

    fn extract_totals(&self, text: &str) -> Totals {
        let mut totals = Totals::default();
        for line in text.lines() {
            let line = line.trim().to_uppercase();
            let Some(amount) = amount_at_end()
                .captures(&line)
                .and_then(|c| c.get(1))
                .and_then(|m| m.as_str().parse::<f64>().ok())
            else {
                continue;
            };
            if line.contains("SUBTOTAL") {
                totals.subtotal = Some(amount);
            } else if line.contains("TAX") {
                totals.tax = Some(amount);
            } else if line.contains("TOTAL") || line.contains("BALANCE DUE") {
                totals.total = Some(amount);
            }
        }
        totals
    }

    fn extract_metadata(&self, text: &str) -> Metadata {
        if let Some(store) = store_number().captures(text).and_then(|c| c.get(1)) {
            tracing::debug!(store = store.as_str(), "store number on tape");
        }
        Metadata {
            store_name: Some("Trader Joe's".to_string()),
            date: extract_date(text),
            payment_method: detect_payment(text),
            currency: Some(Currency::Usd),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::ExtractReceipt;
    use crate::types::PaymentMethod;
    use chrono::NaiveDate;

    const TAPE: &str = "\
TRADER JOE'S
STORE #552
BANANA EACH 0.23
2 @ 0.23
ORG COFFEE $8.99
AVOCADO BAG VOID 4.49
GIFT WRAP -1.99
SUBTOTAL $9.45
TAX 0.00
TOTAL $9.45
CASH 10.00
CHANGE 0.55
08/15/2024 11:05";

    #[test]
    fn quantity_line_applies_to_previous_item() {
        let items = TraderJoesHandler.extract_items(TAPE);
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].description, "BANANA EACH");
        assert_eq!(items[0].quantity, 2.0);
        assert_eq!(items[1].description, "ORG COFFEE");
        assert_eq!(items[1].price, 8.99);
    }

    #[test]
    fn voided_and_negated_lines_are_dropped() {
        let items = TraderJoesHandler.extract_items(TAPE);
        assert!(items.iter().all(|i| !i.description.contains("AVOCADO")));
        assert!(items.iter().all(|i| !i.description.contains("WRAP")));
    }

    #[test]
    fn totals_with_dollar_signs() {
        let totals = TraderJoesHandler.extract_totals(TAPE);
        assert_eq!(totals.subtotal, Some(9.45));
        assert_eq!(totals.tax, Some(0.00));
        assert_eq!(totals.total, Some(9.45));
    }

    #[test]
    fn metadata_fields() {
        let meta = TraderJoesHandler.extract_metadata(TAPE);
        assert_eq!(meta.store_name.as_deref(), Some("Trader Joe's"));
        assert_eq!(meta.date, NaiveDate::from_ymd_opt(2024, 8, 15));
        assert_eq!(meta.payment_method, Some(PaymentMethod::Cash));
        assert_eq!(meta.currency, Some(Currency::Usd));
    }

    #[test]
    fn empty_and_garbage_input_yield_empty_results() {
        for text in ["", "INVALID RECEIPT CONTENT"] {
            let result = TraderJoesHandler.process_receipt(text);
            assert!(result.items.is_empty());
            assert_eq!(result.total, None);
        }
    }
}
