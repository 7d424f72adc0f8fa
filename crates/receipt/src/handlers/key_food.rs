//! Key Food receipts.
//!
//! NYC-area tapes with loyalty pricing: an item line may carry the shelf
//! price, a savings amount and a `MEMBER SAVINGS` marker, in which case the
//! charged price is the difference. Tax can print as several lines (`TAX`,
//! `STATE TAX`) that add up.

use divvy_core::{round2, Currency};

use crate::re;
use crate::types::{ExtractedItem, PaymentMethod};

use super::{detect_payment, extract_date, ExtractReceipt, Metadata, Totals};

pub struct KeyFoodHandler;

re!(
    member_savings_line,
    r"^([A-Z0-9\s\-'\.&]+?)\s+(\d+\.\d{2})\s*-\s*(\d+\.\d{2})\s*MEMBER\s*SAVINGS?$"
);
re!(standard_line, r"^([A-Z0-9\s\-'\.&]+?)\s+(\d+\.\d{2})$");
re!(qty_at_line, r"^(\d+)\s*@\s*([A-Z0-9\s\-'\.&]+?)\s+(\d+\.\d{2})$");
re!(
    weight_line,
    r"^([\d\.]+)\s*(?i:lb)\s*@\s*\$?([\d\.]+)/(?i:lb)\s+([A-Z0-9\s\-'\.&]+?)\s+(\d+\.\d{2})$"
);
re!(total_amount, r"\bTOTAL\s*\$?\s*(\d+\.\d{2})");
re!(balance_due_amount, r"\bBALANCE\s*DUE\s*\$?\s*(\d+\.\d{2})");
re!(tax_amount, r"\bTAX\s*\$?\s*(\d+\.\d{2})");
re!(subtotal_amount, r"\bSUB\s*TOTAL\s*\$?\s*(\d+\.\d{2})");
re!(store_number, r"(?i)key\s*food\s*(?:store)?\s*#\s*(\d+)");
re!(card_tender, r"(?i)\b(?:visa|mastercard|amex|discover)\s*[*x]*\s*\d{4}");
re!(cash_tender, r"(?i)\bcash\b");
re!(debit_tender, r"(?i)\bdebit\b");
re!(ebt_tender, r"(?i)\bebt\b");

/// Candidate parse of one line, before validation.
struct Candidate<'a> {
    description: &'a str,
    price: f64,
    quantity: f64,
    confidence: f32,
}

impl ExtractReceipt for KeyFoodHandler {
    fn name(&self) -> &'static str {
        "key_food"
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
            if candidate.price <= 0.0 || candidate.quantity <= 0.0 {
                tracing::debug!(line, "item candidate failed validation");
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
                let found = capture_amount(total_amount(), &line)
                    .or_else(|| capture_amount(balance_due_amount(), &line));
                if let Some(v) = found {
                    if v <= 0.0 || v >= 10_000.0 {
                        tracing::warn!(total = v, "stated total outside plausible range");
                    }
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
        if let Some(store) = store_number().captures(text).and_then(|c| c.get(1)) {
            tracing::debug!(store = store.as_str(), "store number on tape");
        }
        Metadata {
            store_name: Some("Key Food".to_string()),
            date: extract_date(text),
            payment_method: tender_line_payment(text).or_else(|| detect_payment(text)),
            currency: Some(Currency::Usd),
        }
    }
}

/// Patterns are tried most-specific first so the loyalty-pricing shape is
/// not misread as a plain item ending in a price.
fn parse_item_line(line: &str) -> Option<Candidate<'_>> {
    if let Some(caps) = member_savings_line().captures(line) {
        let shelf: f64 = caps.get(2)?.as_str().parse().ok()?;
        let savings: f64 = caps.get(3)?.as_str().parse().ok()?;
        return Some(Candidate {
            description: caps.get(1)?.as_str().trim(),
            price: round2(shelf - savings),
            quantity: 1.0,
            confidence: 0.95,
        });
    }
    if let Some(caps) = standard_line().captures(line) {
        return Some(Candidate {
            description: caps.get(1)?.as_str().trim(),
            price: caps.get(2)?.as_str().parse().ok()?,
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
        || balance_due_amount().is_match(&upper)
}

fn capture_amount(pattern: &regex::Regex, line: &str) -> Option<f64> {
    pattern
        .captures(line)
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

fn tender_line_payment(text: &str) -> Option<PaymentMethod> {
    if card_tender().is_match(text) {
        Some(PaymentMethod::Credit)
    } else if cash_tender().is_match(text) {
        Some(PaymentMethod::Cash)
    } else if debit_tender().is_match(text) {
        Some(PaymentMethod::Debit)
    } else if ebt_tender().is_match(text) {
        Some(PaymentMethod::Electronic)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::ExtractReceipt;
    use chrono::NaiveDate;

    const TAPE: &str = "\
KEY FOOD STORE #112
46-02 QUEENS BLVD
MILK WHOLE GAL 4.99
2 @ YOGURT PLAIN 3.98
1.52 LB @ $2.99/LB BANANAS 4.54
ICE CREAM PINT 6.99 - 1.00 MEMBER SAVINGS
SUB TOTAL 19.50
STATE TAX 0.87
TOTAL 20.37
VISA ****4821
05/02/2024";

    #[test]
    fn member_savings_price_is_the_difference() {
        let items = KeyFoodHandler.extract_items(TAPE);
        let ice_cream = items
            .iter()
            .find(|i| i.description == "ICE CREAM PINT")
            .unwrap();
        assert_eq!(ice_cream.price, 5.99);
        assert_eq!(ice_cream.description_confidence, 0.95);
    }

    #[test]
    fn all_line_shapes_extract() {
        let items = KeyFoodHandler.extract_items(TAPE);
        assert_eq!(items.len(), 4);
        assert_eq!(items[0].description, "MILK WHOLE GAL");
        assert_eq!(items[1].description, "YOGURT PLAIN");
        assert_eq!(items[1].quantity, 2.0);
        assert_eq!(items[2].description, "BANANAS");
        assert_eq!(items[2].quantity, 1.52);
        assert_eq!(items[2].price, 4.54);
    }

    #[test]
    fn totals_lines_never_become_items() {
        let items = KeyFoodHandler.extract_items(TAPE);
        assert!(items.iter().all(|i| !i.description.contains("TOTAL")));
        assert!(items.iter().all(|i| !i.description.contains("TAX")));
    }

    #[test]
    fn tax_lines_sum_once_each() {
        let totals = KeyFoodHandler.extract_totals("TAX 0.50\nSTATE TAX 0.25\nTOTAL 10.00");
        assert_eq!(totals.tax, Some(0.75));
    }

    #[test]
    fn totals_from_tape() {
        let totals = KeyFoodHandler.extract_totals(TAPE);
        assert_eq!(totals.subtotal, Some(19.50));
        assert_eq!(totals.tax, Some(0.87));
        assert_eq!(totals.total, Some(20.37));
    }

    #[test]
    fn suspicious_price_halves_confidence() {
        let items = KeyFoodHandler.extract_items("CAVIAR TIN 1200.00");
        assert_eq!(items.len(), 1);
        assert!((items[0].description_confidence - 0.45).abs() < 1e-6);
    }

    #[test]
    fn metadata_fields() {
        let meta = KeyFoodHandler.extract_metadata(TAPE);
        assert_eq!(meta.store_name.as_deref(), Some("Key Food"));
        assert_eq!(meta.date, NaiveDate::from_ymd_opt(2024, 5, 2));
        assert_eq!(meta.payment_method, Some(PaymentMethod::Credit));
    }

    #[test]
    fn empty_and_garbage_input_yield_empty_results() {
        for text in ["", "INVALID RECEIPT CONTENT"] {
            let result = KeyFoodHandler.process_receipt(text);
            assert!(result.items.is_empty());
            assert_eq!(result.total, None);
        }
    }
}
