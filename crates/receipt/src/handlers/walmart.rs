//! Walmart receipts.
//!
//! Register tapes prefix items with a UPC or a department code, print tax
//! as `TAX <authority> <amount>`, and close with a TC transaction number.

use divvy_core::{round2, Currency};

use crate::re;
use crate::types::{ExtractedItem, PaymentMethod};

use super::{
    contains_skip_keyword, detect_payment, extract_date, ExtractReceipt, Metadata, Totals,
};

pub struct WalmartHandler;

re!(
    upc_line,
    r"^(?:\*+)?(\d{12,13})\s+([A-Z0-9\s\-'\.&]+?)\s+(\d+\.\d{2})$"
);
re!(
    standard_line,
    r"^(?:(\d{3,4})\s+)?([A-Z0-9\s\-'\.&]+?)\s+(\d+\.\d{2})$"
);
re!(qty_at_line, r"^(\d+)\s*@\s*([A-Z0-9\s\-'\.&]+?)\s+(\d+\.\d{2})$");
re!(
    weight_line,
    r"^([\d\.]+)\s*(?i:lb)\s*@\s*\$?([\d\.]+)/(?i:lb)\s+([A-Z0-9\s\-'\.&]+?)\s+(\d+\.\d{2})$"
);
re!(dept_prefix, r"^(\d{3,4})\s+(.+)$");
re!(subtotal_amount, r"\bSUB\s*TOTAL\s*\$?\s*(\d+\.\d{2})");
// The digit between TAX and the amount is the tax authority number.
re!(tax_amount, r"\bTAX\s*\d?\s*\$?\s*(\d+\.\d{2})");
re!(total_amount, r"\bTOTAL\s*\$?\s*(\d+\.\d{2})");
re!(tc_number, r"TC#\s*(\d+-\d+-\d+)");
re!(store_number, r"(?i)\bST#\s*(\d+)");
re!(walmart_pay, r"(?i)walmart\s*pay");

struct Candidate<'a> {
    description: &'a str,
    price: f64,
    quantity: f64,
    confidence: f32,
}

impl ExtractReceipt for WalmartHandler {
    fn name(&self) -> &'static str {
        "walmart"
    }

    fn extract_items(&self, text: &str) -> Vec<ExtractedItem> {
        let mut items = Vec::new();
        for line in text.lines() {
            let line = line.trim();
            if is_totals_furniture(line) {
                continue;
            }
            let Some(candidate) = parse_item_line(line) else {
                continue;
            };
            if candidate.price <= 0.0
                || candidate.quantity <= 0.0
                || contains_skip_keyword(candidate.description)
            {
                continue;
            }
            let mut confidence = candidate.confidence;
            if candidate.price > 1000.0 {
                tracing::warn!(line, price = candidate.price, "suspiciously large item price");
                confidence *= 0.5;
            }
            items.push(ExtractedItem::new(
                candidate.description,
                candidate.price,
                candidate.quantity,
                confidence,
            ));
        }
        items
    }

    fn extract_totals(&self, text: &str) -> Totals {
        let mut totals = Totals::default();
        let mut tax_sum = 0.0;
        let mut tax_seen = false;
        for line in text.lines() {
            let line = line.trim().to_uppercase();
            if totals.subtotal.is_none() {
                if let Some(v) = capture_amount(subtotal_amount(), &line) {
                    totals.subtotal = Some(v);
                    continue;
                }
            }
            if let Some(v) = capture_amount(tax_amount(), &line) {
                tax_sum += v;
                tax_seen = true;
                continue;
            }
            if totals.total.is_none() && !subtotal_amount().is_match(&line) {
                if let Some(v) = capture_amount(total_amount(), &line) {
                    totals.total = Some(v);
                }
            }
        }
        if tax_seen {
            totals.tax = Some(round2(tax_sum));
        }
        totals
    }

    fn extract_metadata(&self, text: &str) -> Metadata {
        if let Some(tc) = tc_number().captures(text).and_then(|c| c.get(1)) {
            tracing::debug!(tc = tc.as_str(), "transaction number on tape");
        }
        if let Some(store) = store_number().captures(text).and_then(|c| c.get(1)) {
            tracing::debug!(store = store.as_str(), "store number on tape");
        }
        let payment_method = if walmart_pay().is_match(text) {
            Some(PaymentMethod::Electronic)
        } else {
            detect_payment(text)
        };
        Metadata {
            store_name: Some("Walmart".to_string()),
            date: extract_date(text),
            payment_method,
            currency: Some(Currency::Usd),
        }
    }
}

fn parse_item_line(line: &str) -> Option<Candidate<'_>> {
    if let Some(caps) = upc_line().captures(line) {
        if let Some(upc) = caps.get(1) {
            tracing::debug!(upc = upc.as_str(), "item upc");
        }
        return Some(Candidate {
            description: caps.get(2)?.as_str().trim(),
            price: caps.get(3)?.as_str().parse().ok()?,
            quantity: 1.0,
            confidence: 0.95,
        });
    }
    if let Some(caps) = standard_line().captures(line) {
        if let Some(dept) = caps.get(1) {
            tracing::debug!(dept = dept.as_str(), "department code");
        }
        let mut description = caps.get(2)?.as_str().trim();
        // Department codes the optional prefix missed still lead the name.
        if let Some(dc) = dept_prefix().captures(description) {
            tracing::debug!(dept = &dc[1], "department code");
            if let Some(rest) = dc.get(2) {
                description = rest.as_str().trim();
            }
        }
        return Some(Candidate {
            description,
            price: caps.get(3)?.as_str().parse().ok()?,
            quantity: 1.0,
            confidence: 0.9,
        });
    }
    if let Some(caps) = qty_at_line().captures(line) {
        return Some(Candidate {
            description: caps.get(2)?.as_str().trim(),
            price: caps.get(3)?.as_str().parse().ok()?,
            quantity: caps.get(1)?.as_str().parse().ok()?,
            confidence: 0.85,
        });
    }
    if let Some(caps) = weight_line().captures(line) {
        return Some(Candidate {
            description: caps.get(3)?.as_str().trim(),
            price: caps.get(4)?.as_str().parse().ok()?,
            quantity: caps.get(1)?.as_str().parse().ok()?,
            confidence: 0.8,
        });
    }
    None
}

fn is_totals_furniture(line: &str) -> bool {
    let upper = line.to_uppercase();
    subtotal_amount().is_match(&upper)
        || tax_amount().is_match(&upper)
        || total_amount().is_match(&upper)
}

fn capture_amount(pattern: &regex::Regex, line: &str) -> Option<f64> {
    pattern
        .captures(line)
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::ExtractReceipt;
    use chrono::NaiveDate;

    const TAPE: &str = "\
WALMART
SAVE MONEY. LIVE BETTER.
ST# 2963 OP# 9044 TE# 44 TR# 1184
007874235689 GV WHOLE MILK 3.98
123 WONDER BREAD 2.48
2 @ GV EGGS LARGE 5.96
1.84 LB @ $0.98/LB BANANAS 1.80
SUBTOTAL 14.22
TAX 1 1.17
TOTAL 15.39
DEBIT TEND 15.39
CHANGE DUE 0.00
TC# 1234-5678-9012
08/02/24 18:22:41";

    #[test]
    fn upc_lines_extract_with_high_confidence() {
        let items = WalmartHandler.extract_items(TAPE);
        assert_eq!(items[0].description, "GV WHOLE MILK");
        assert_eq!(items[0].price, 3.98);
        assert_eq!(items[0].description_confidence, 0.95);
    }

    #[test]
    fn department_prefix_is_stripped_from_the_name() {
        let items = WalmartHandler.extract_items(TAPE);
        assert_eq!(items[1].description, "WONDER BREAD");
        assert_eq!(items[1].price, 2.48);
    }

    #[test]
    fn quantity_and_weight_shapes() {
        let items = WalmartHandler.extract_items(TAPE);
        assert_eq!(items.len(), 4);
        assert_eq!(items[2].quantity, 2.0);
        assert_eq!(items[3].description, "BANANAS");
        assert_eq!(items[3].quantity, 1.84);
    }

    #[test]
    fn tender_lines_never_become_items() {
        let items = WalmartHandler.extract_items(TAPE);
        assert!(items.iter().all(|i| !i.description.contains("TEND")));
        assert!(items.iter().all(|i| !i.description.contains("CHANGE")));
    }

    #[test]
    fn tax_reads_past_the_authority_number() {
        let totals = WalmartHandler.extract_totals(TAPE);
        assert_eq!(totals.subtotal, Some(14.22));
        assert_eq!(totals.tax, Some(1.17));
        assert_eq!(totals.total, Some(15.39));
    }

    #[test]
    fn metadata_fields() {
        let meta = WalmartHandler.extract_metadata(TAPE);
        assert_eq!(meta.store_name.as_deref(), Some("Walmart"));
        assert_eq!(meta.date, NaiveDate::from_ymd_opt(2024, 8, 2));
        assert_eq!(
            meta.payment_method,
            Some(crate::types::PaymentMethod::Debit)
        );
    }

    #[test]
    fn walmart_pay_reads_as_electronic() {
        let meta = WalmartHandler.extract_metadata("TOTAL 5.00\nWALMART PAY 5.00");
        assert_eq!(
            meta.payment_method,
            Some(crate::types::PaymentMethod::Electronic)
        );
    }

    #[test]
    fn empty_and_garbage_input_yield_empty_results() {
        for text in ["", "INVALID RECEIPT CONTENT"] {
            let result = WalmartHandler.process_receipt(text);
            assert!(result.items.is_empty());
            assert_eq!(result.total, None);
        }
    }
}
