//! Confidence scoring for extraction results.
//!
//! Four sub-scores (items, totals, store, OCR quality) fold into one overall
//! number under fixed weights. Scoring is pure: the same text, result and
//! store match always produce the same report.

use crate::config::ScoreWeights;
use crate::re;
use crate::types::{
    ConfidenceReport, HandlerResult, ItemsScore, MatchSource, OcrQuality, OcrScore, StoreMatch,
    StoreScore, TotalsScore,
};

re!(price_shape, r"\d+\.\d{2}");
re!(totals_keyword, r"(?i)\b(?:total|subtotal|tax|balance|amount)\b");
re!(date_shape, r"\d{1,4}[/\.\-]\d{1,2}[/\.\-]\d{1,4}");

#[derive(Debug, Clone, Copy, Default)]
pub struct Scorer {
    weights: ScoreWeights,
}

impl Scorer {
    pub fn new(weights: ScoreWeights) -> Self {
        Self { weights }
    }

    pub fn score(
        &self,
        text: &str,
        result: &HandlerResult,
        store: &StoreMatch,
    ) -> ConfidenceReport {
        let items = score_items(result);
        let totals = score_totals(result);
        let store = score_store(result, store);
        let ocr = score_ocr(text);
        let overall = (self.weights.items * items.score
            + self.weights.totals * totals.score
            + self.weights.store * store.score
            + self.weights.ocr * ocr.score)
            .clamp(0.0, 1.0);
        ConfidenceReport { overall, items, totals, store, ocr }
    }

    /// Coarser single number for callers that don't want the full report:
    /// a field-presence baseline averaged with the overall confidence.
    pub fn extraction_quality(&self, result: &HandlerResult, report: &ConfidenceReport) -> f32 {
        let mut quality = 0.5;
        if result.total.is_some() {
            quality += 0.1;
        }
        if result.subtotal.is_some() {
            quality += 0.05;
        }
        if result.tax.is_some() {
            quality += 0.05;
        }
        quality += (result.items.len() as f32 / 20.0).min(0.2);
        ((quality + report.overall) / 2.0).min(1.0)
    }
}

fn score_items(result: &HandlerResult) -> ItemsScore {
    let total_items = result.items.len();
    if total_items == 0 {
        return ItemsScore {
            score: 0.0,
            valid_price_rate: 0.0,
            description_match_rate: 0.0,
            total_items: 0,
        };
    }
    let n = total_items as f32;
    let valid_price_rate = result.items.iter().filter(|i| i.price > 0.0).count() as f32 / n;
    let description_match_rate =
        result.items.iter().filter(|i| i.description_confidence > 0.4).count() as f32 / n;
    ItemsScore {
        score: 0.8 * valid_price_rate + 0.2 * description_match_rate,
        valid_price_rate,
        description_match_rate,
        total_items,
    }
}

fn score_totals(result: &HandlerResult) -> TotalsScore {
    let total_detected = result.total.is_some();
    let subtotal_detected = result.subtotal.is_some();
    // Sum comparison only means something when there are items to sum.
    let (sum_matches, difference_percent) = match result.total {
        Some(total) if total > 0.0 && !result.items.is_empty() => {
            let diff = (result.item_sum() - total).abs() / total;
            (diff <= 0.2, (diff * 100.0) as f32)
        }
        _ => (false, 0.0),
    };
    let mut score = 0.0;
    if total_detected {
        score += 0.5;
    }
    if sum_matches {
        score += 0.5;
    }
    TotalsScore { score, subtotal_detected, total_detected, sum_matches, difference_percent }
}

fn score_store(result: &HandlerResult, store: &StoreMatch) -> StoreScore {
    let pattern_matches = !store.is_unknown()
        && matches!(
            store.source,
            MatchSource::AliasExact
                | MatchSource::AliasPartial
                | MatchSource::Pattern
                | MatchSource::Hint
        );
    let name_detected = !store.is_unknown() || result.store_name.is_some();
    let score = if pattern_matches {
        0.9
    } else if name_detected {
        0.7
    } else {
        0.0
    };
    StoreScore { score, name_detected, pattern_matches }
}

/// Receipts are structured text; the fraction of lines showing receipt
/// structure (prices, totals keywords, dates) proxies for OCR fidelity.
fn score_ocr(text: &str) -> OcrScore {
    let lines: Vec<&str> = text.lines().map(str::trim).filter(|l| !l.is_empty()).collect();
    let line_count = lines.len();
    if line_count == 0 {
        return OcrScore { score: 0.0, quality: OcrQuality::Poor, line_count: 0, matched_lines: 0 };
    }
    let matched_lines = lines
        .iter()
        .filter(|l| {
            price_shape().is_match(l) || totals_keyword().is_match(l) || date_shape().is_match(l)
        })
        .count();
    let score = (matched_lines as f32 / line_count as f32 + 0.5).min(0.99);
    OcrScore { score, quality: OcrQuality::from_score(score), line_count, matched_lines }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ExtractedItem;

    fn good_result() -> HandlerResult {
        HandlerResult {
            items: vec![
                ExtractedItem::new("MILK", 10.0, 1.0, 0.9),
                ExtractedItem::new("EGGS", 20.0, 1.0, 0.9),
            ],
            subtotal: Some(30.0),
            tax: Some(0.0),
            total: Some(30.0),
            ..Default::default()
        }
    }

    const GOOD_TEXT: &str = "MILK 10.00\nEGGS 20.00\nTOTAL 30.00";

    #[test]
    fn overall_is_the_weighted_sum_of_sub_scores() {
        let scorer = Scorer::default();
        let store = StoreMatch::new("costco", 0.95, MatchSource::AliasExact);
        let report = scorer.score(GOOD_TEXT, &good_result(), &store);
        let w = ScoreWeights::default();
        let expected = w.items * report.items.score
            + w.totals * report.totals.score
            + w.store * report.store.score
            + w.ocr * report.ocr.score;
        assert!((report.overall - expected).abs() < 1e-6);
        assert!(report.overall > 0.9 && report.overall <= 1.0);
    }

    #[test]
    fn item_sum_within_20_percent_counts_as_match() {
        let scorer = Scorer::default();
        let report = scorer.score(GOOD_TEXT, &good_result(), &StoreMatch::unknown());
        assert!(report.totals.sum_matches);
        assert_eq!(report.totals.difference_percent, 0.0);
        assert_eq!(report.totals.score, 1.0);
    }

    #[test]
    fn item_sum_beyond_20_percent_does_not_match() {
        let scorer = Scorer::default();
        let result = HandlerResult {
            items: vec![ExtractedItem::new("MILK", 5.0, 1.0, 0.9)],
            total: Some(30.0),
            ..Default::default()
        };
        let report = scorer.score("MILK 5.00\nTOTAL 30.00", &result, &StoreMatch::unknown());
        assert!(!report.totals.sum_matches);
        assert!((report.totals.difference_percent - 83.333_34).abs() < 0.01);
        assert_eq!(report.totals.score, 0.5);
    }

    #[test]
    fn empty_everything_scores_zero() {
        let scorer = Scorer::default();
        let report = scorer.score("", &HandlerResult::default(), &StoreMatch::unknown());
        assert_eq!(report.overall, 0.0);
        assert_eq!(report.items.score, 0.0);
        assert_eq!(report.ocr.line_count, 0);
        assert_eq!(report.ocr.quality, OcrQuality::Poor);
    }

    #[test]
    fn store_score_tiers() {
        let known = StoreMatch::new("costco", 0.95, MatchSource::AliasExact);
        assert_eq!(score_store(&HandlerResult::default(), &known).score, 0.9);

        let guess = StoreMatch::new("sunny deli", 0.5, MatchSource::HeaderPosition);
        let tier = score_store(&HandlerResult::default(), &guess);
        assert_eq!(tier.score, 0.7);
        assert!(tier.name_detected && !tier.pattern_matches);

        assert_eq!(score_store(&HandlerResult::default(), &StoreMatch::unknown()).score, 0.0);
    }

    #[test]
    fn ocr_score_caps_below_one() {
        let report = score_ocr("TOTAL 5.00\n01/02/2024");
        assert_eq!(report.matched_lines, 2);
        assert_eq!(report.score, 0.99);
        assert_eq!(report.quality, OcrQuality::Excellent);
    }

    #[test]
    fn scoring_is_deterministic() {
        let scorer = Scorer::default();
        let store = StoreMatch::new("costco", 0.95, MatchSource::AliasExact);
        let first = scorer.score(GOOD_TEXT, &good_result(), &store);
        let second = scorer.score(GOOD_TEXT, &good_result(), &store);
        assert_eq!(first, second);
    }

    #[test]
    fn extraction_quality_blends_presence_and_overall() {
        let scorer = Scorer::default();
        let result = good_result();
        let store = StoreMatch::new("costco", 0.95, MatchSource::AliasExact);
        let report = scorer.score(GOOD_TEXT, &result, &store);
        let quality = scorer.extraction_quality(&result, &report);
        let presence = 0.5 + 0.1 + 0.05 + 0.05 + (2.0 / 20.0_f32);
        assert!((quality - (presence + report.overall) / 2.0).abs() < 1e-6);

        let zero = scorer.extraction_quality(&HandlerResult::default(), &ConfidenceReport::zero());
        assert!((zero - 0.25).abs() < 1e-6);
    }
}
