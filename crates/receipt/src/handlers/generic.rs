//! Vendor-agnostic fallback extraction.
//!
//! Works on any register tape: description-plus-price line patterns for
//! items, keyword-labeled lines for totals. Specialized handlers beat this
//! on their own chains; this one just has to never be useless.

use divvy_core::parse_amount;

use crate::re;
use crate::types::ExtractedItem;

use super::{
    contains_skip_keyword, detect_currency, detect_payment, extract_date, find_labeled_amount,
    guess_store_name, ExtractReceipt, Metadata, Totals,
};

pub struct GenericHandler;

re!(item_desc_price, r#"([\w\s'"&\-,\.\(\)/]+?)\s+(\d+[\.,]\d{2})$"#);
re!(
    item_desc_qty_at_price,
    r#"([\w\s'"&\-,\.\(\)/]+?)\s+(\d+)\s+(?:@\s+[$£€]?\s*[\d,\.]+)?\s+([$£€]?\s*\d+[\.,]\d{2})$"#
);
re!(
    item_desc_currency_price,
    r#"([\w\s'"&\-,\.\(\)/]+?)\s+([$£€]?\s*\d+[\.,]\d{2})$"#
);
re!(
    item_desc_qty_x_price,
    r#"([\w\s'"&\-,\.\(\)/]+?)\s+(\d+)\s*[xX]?\s*([$£€]?\s*\d+[\.,]\d{2})$"#
);
re!(table_header, r"^(?:item|qty|description|price|amount)$");

// Keywords are boundary-anchored so TOTAL never reads a SUBTOTAL line.
re!(sub_total_amount, r"\bsub[\s\-]*total\s*[$£€]?\s*([\d,\.]+)");
re!(sales_tax_amount, r"\bsales\s*tax\s*[$£€]?\s*([\d,\.]+)");
re!(vat_amount, r"\b(?:vat|gst|hst)\s*[$£€]?\s*([\d,\.]+)");
re!(tax_amount, r"\btax\s*[$£€]?\s*([\d,\.]+)");
re!(total_amount, r"\btotal\s*[$£€]?\s*([\d,\.]+)");
re!(amount_due, r"\b(?:amount|due)\s*[$£€]?\s*([\d,\.]+)");
re!(balance_amount, r"\bbalance\s*[$£€]?\s*([\d,\.]+)");
re!(sum_amount, r"\bsum\s*[$£€]?\s*([\d,\.]+)");

impl ExtractReceipt for GenericHandler {
    fn name(&self) -> &'static str {
        "generic"
    }

    fn extract_items(&self, text: &str) -> Vec<ExtractedItem> {
        let mut items = Vec::new();
        let mut seen = std::collections::HashSet::new();

        let patterns = [
            item_desc_price(),
            item_desc_qty_at_price(),
            item_desc_currency_price(),
            item_desc_qty_x_price(),
        ];

        for line in text.lines() {
            let line = line.trim();
            if line.chars().count() < 5 || contains_skip_keyword(line) {
                continue;
            }
            for pattern in patterns {
                let Some(caps) = pattern.captures(line) else { continue };
                let description = caps.get(1).map_or("", |m| m.as_str()).trim();
                if description.chars().count() < 3
                    || contains_skip_keyword(description)
                    || table_header().is_match(&description.to_lowercase())
                {
                    continue;
                }
                let Some(price) = caps
                    .iter()
                    .last()
                    .flatten()
                    .and_then(|m| parse_amount(m.as_str()))
                else {
                    continue;
                };
                // Only the three-group patterns carry a quantity in group 2.
                let quantity = caps
                    .get(2)
                    .filter(|_| caps.len() > 3)
                    .and_then(|m| m.as_str().parse::<f64>().ok())
                    .unwrap_or(1.0);
                if !seen.insert(description.to_lowercase()) {
                    continue;
                }
                items.push(ExtractedItem::new(description, price, quantity, 0.7));
                break;
            }
        }
        tracing::debug!(items = items.len(), "generic item extraction");
        items
    }

    fn extract_totals(&self, text: &str) -> Totals {
        // sales tax / vat before the bare keyword so the specific label wins.
        let subtotal = find_labeled_amount(text, &[sub_total_amount()]);
        let tax = find_labeled_amount(text, &[sales_tax_amount(), vat_amount(), tax_amount()]);
        // "SUB TOTAL" contains a boundary-clean "total"; drop those lines
        // before hunting the grand total.
        let total_patterns = [total_amount(), amount_due(), balance_amount(), sum_amount()];
        let total = text
            .lines()
            .map(str::to_lowercase)
            .filter(|l| !sub_total_amount().is_match(l))
            .find_map(|l| {
                total_patterns.iter().find_map(|p| {
                    p.captures(&l)
                        .and_then(|c| c.get(1))
                        .and_then(|m| parse_amount(m.as_str()))
                })
            });
        Totals { subtotal, tax, total }
    }

    fn extract_metadata(&self, text: &str) -> Metadata {
        if text.trim().is_empty() {
            return Metadata::default();
        }
        Metadata {
            store_name: guess_store_name(text),
            date: extract_date(text),
            payment_method: detect_payment(text),
            currency: Some(detect_currency(text)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::ExtractReceipt;

    const RECEIPT: &str = "\
CORNER GROCERY
123 MAIN AVE
05/12/2024
MILK 2 GAL 3.49
EGGS LARGE DOZEN 4.99
BREAD WH 2.29
SUBTOTAL 10.77
TAX 0.95
TOTAL 11.72
VISA ****1234
CHANGE 0.00";

    #[test]
    fn extracts_items_from_plain_receipt() {
        let items = GenericHandler.extract_items(RECEIPT);
        let descriptions: Vec<&str> = items.iter().map(|i| i.description.as_str()).collect();
        assert_eq!(descriptions, ["MILK 2 GAL", "EGGS LARGE DOZEN", "BREAD WH"]);
        assert_eq!(items[0].price, 3.49);
        assert!(items.iter().all(|i| i.description_confidence == 0.7));
    }

    #[test]
    fn extracts_labeled_totals() {
        let totals = GenericHandler.extract_totals(RECEIPT);
        assert_eq!(totals.subtotal, Some(10.77));
        assert_eq!(totals.tax, Some(0.95));
        assert_eq!(totals.total, Some(11.72));
    }

    #[test]
    fn total_not_read_from_subtotal_lines() {
        let totals = GenericHandler.extract_totals("SUBTOTAL 10.00\nSUB TOTAL 10.00\nTOTAL 10.88");
        assert_eq!(totals.subtotal, Some(10.00));
        assert_eq!(totals.total, Some(10.88));
    }

    #[test]
    fn skips_furniture_and_short_descriptions() {
        let items = GenericHandler.extract_items("HI 1.00\nTOTAL 10.00\nTHANK YOU 9.99");
        assert!(items.is_empty());
    }

    #[test]
    fn deduplicates_repeated_descriptions() {
        let items = GenericHandler.extract_items("APPLES GALA 2.99\napples gala 2.99");
        assert_eq!(items.len(), 1);
    }

    #[test]
    fn quantity_from_qty_at_unit_lines() {
        let items = GenericHandler.extract_items("SPARKLING WATER 3 @ 1.25 $4.50");
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].description, "SPARKLING WATER");
        assert_eq!(items[0].quantity, 3.0);
        assert_eq!(items[0].price, 4.50);
    }

    #[test]
    fn empty_input_yields_empty_result() {
        let result = GenericHandler.process_receipt("");
        assert!(result.items.is_empty());
        assert_eq!(result.subtotal, None);
        assert_eq!(result.tax, None);
        assert_eq!(result.total, None);
    }

    #[test]
    fn garbage_input_yields_empty_items() {
        let result = GenericHandler.process_receipt("INVALID RECEIPT CONTENT");
        assert!(result.items.is_empty());
        assert_eq!(result.total, None);
    }

    #[test]
    fn metadata_from_plain_receipt() {
        let meta = GenericHandler.extract_metadata(RECEIPT);
        assert_eq!(meta.store_name.as_deref(), Some("CORNER GROCERY"));
        assert_eq!(meta.date, chrono::NaiveDate::from_ymd_opt(2024, 5, 12));
        assert_eq!(meta.payment_method, Some(crate::types::PaymentMethod::Credit));
        assert_eq!(meta.currency, Some(divvy_core::Currency::Usd));
    }
}
