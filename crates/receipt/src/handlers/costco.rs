//! Costco warehouse receipts.
//!
//! The tape puts an extended price at the end of each item line; a following
//! `N @ unit` line restates the quantity for the item above it, and a bare
//! item-number line closes an item out.

use chrono::NaiveDate;
use divvy_core::Currency;

use crate::re;
use crate::types::ExtractedItem;

use super::{contains_skip_keyword, detect_payment, expand_year, ExtractReceipt, Metadata, Totals};

pub struct CostcoHandler;

re!(price_at_end, r"(\d+\.\d{2})\s*$");
re!(qty_at_unit, r"^\s*(\d+)\s*@\s*(\d+\.\d{2})");
re!(item_number, r"^\d{5,}$");
re!(member_number, r"(?i)member\s*#?\s*(\d{10,})");
re!(tape_date, r"(\d{2})/(\d{2})/(\d{2,4})");

impl ExtractReceipt for CostcoHandler {
    fn name(&self) -> &'static str {
        "costco"
    }

    fn extract_items(&self, text: &str) -> Vec<ExtractedItem> {
        let mut items = Vec::new();
        let mut pending: Option<ExtractedItem> = None;

        for line in text.lines() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            if let Some(caps) = price_at_end().captures(line) {
                let Some(price) = caps.get(1).and_then(|m| m.as_str().parse::<f64>().ok())
                else {
                    continue;
                };
                let description = line[..caps.get(1).map_or(0, |m| m.start())].trim();
                if let Some(qty) = qty_at_unit().captures(description) {
                    // Quantity breakdown for the item directly above.
                    if let Some(mut item) = pending.take() {
                        if let Some(q) =
                            qty.get(1).and_then(|m| m.as_str().parse::<f64>().ok())
                        {
                            item.quantity = q;
                        }
                        item.description_confidence = 0.9;
                        items.push(item);
                    }
                } else if !contains_skip_keyword(description) {
                    // A second price line means the pending item had no
                    // quantity breakdown; it is complete as-is.
                    if let Some(item) = pending.take() {
                        items.push(item);
                    }
                    pending = Some(ExtractedItem::new(description, price, 1.0, 0.8));
                }
            } else if item_number().is_match(line) {
                if let Some(item) = pending.take() {
                    items.push(item);
                }
            }
        }
        if let Some(item) = pending {
            items.push(item);
        }
        items
    }

    fn extract_totals(&self, text: &str) -> Totals {
        let mut totals = Totals::default();
        for line in text.lines() {
            let line = line.trim().to_uppercase();
            let Some(amount) = price_at_end()
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
            } else if line.contains("TOTAL") {
                totals.total = Some(amount);
            }
        }
        totals
    }

    fn extract_metadata(&self, text: &str) -> Metadata {
        if let Some(member) = member_number().captures(text).and_then(|c| c.get(1)) {
            tracing::debug!(member = member.as_str(), "membership number on tape");
        }
        Metadata {
            store_name: Some("Costco".to_string()),
            date: extract_tape_date(text),
            payment_method: detect_payment(text),
            currency: Some(Currency::Usd),
        }
    }
}

/// Dates print as mm/dd/yy near the register banner.
fn extract_tape_date(text: &str) -> Option<NaiveDate> {
    let caps = tape_date().captures(text)?;
    let month: u32 = caps.get(1)?.as_str().parse().ok()?;
    let day: u32 = caps.get(2)?.as_str().parse().ok()?;
    let year: u32 = caps.get(3)?.as_str().parse().ok()?;
    NaiveDate::from_ymd_opt(expand_year(year) as i32, month, day)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::ExtractReceipt;

    const TAPE: &str = "\
COSTCO WHOLESALE
SE LAKE UNION #1190
MEMBER 111802398551
1204135 KS WATER 40PK 4.99
96716 ORG SPINACH 3.79
SUBTOTAL 8.78
TAX 0.77
**** TOTAL 9.55
XXXXXXXXXXXX1234 CHIP
08/15/24 17:32";

    #[test]
    fn consecutive_price_lines_both_survive() {
        let items = CostcoHandler.extract_items("AAA SNACK 1.99\nBBB JUICE 2.99");
        let descriptions: Vec<&str> = items.iter().map(|i| i.description.as_str()).collect();
        assert_eq!(descriptions, ["AAA SNACK", "BBB JUICE"]);
    }

    #[test]
    fn quantity_line_updates_pending_item() {
        let items = CostcoHandler.extract_items("KS ORG EGGS 7.98\n2 @ 3.99 7.98");
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].description, "KS ORG EGGS");
        assert_eq!(items[0].quantity, 2.0);
        assert_eq!(items[0].price, 7.98);
        assert_eq!(items[0].description_confidence, 0.9);
    }

    #[test]
    fn item_number_line_finalizes_pending_item() {
        let items = CostcoHandler.extract_items("KS BATTERIES 12.99\n1234567");
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].description, "KS BATTERIES");
    }

    #[test]
    fn totals_keyed_at_line_end() {
        let totals = CostcoHandler.extract_totals(TAPE);
        assert_eq!(totals.subtotal, Some(8.78));
        assert_eq!(totals.tax, Some(0.77));
        assert_eq!(totals.total, Some(9.55));
    }

    #[test]
    fn totals_lines_are_not_items() {
        let items = CostcoHandler.extract_items(TAPE);
        let descriptions: Vec<&str> = items.iter().map(|i| i.description.as_str()).collect();
        assert_eq!(descriptions, ["1204135 KS WATER 40PK", "96716 ORG SPINACH"]);
    }

    #[test]
    fn metadata_has_fixed_store_and_tape_date() {
        let meta = CostcoHandler.extract_metadata(TAPE);
        assert_eq!(meta.store_name.as_deref(), Some("Costco"));
        assert_eq!(meta.date, NaiveDate::from_ymd_opt(2024, 8, 15));
        assert_eq!(meta.currency, Some(Currency::Usd));
    }

    #[test]
    fn empty_and_garbage_input_yield_empty_results() {
        for text in ["", "INVALID RECEIPT CONTENT"] {
            let result = CostcoHandler.process_receipt(text);
            assert!(result.items.is_empty());
            assert_eq!(result.total, None);
        }
    }
}
