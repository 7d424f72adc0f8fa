use chrono::NaiveDate;
use divvy_core::Currency;
use serde::{Deserialize, Serialize};

// ── Store classification ──────────────────────────────────────────────────────

/// Which classification pass produced a [`StoreMatch`].
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MatchSource {
    AliasExact,
    AliasPartial,
    Pattern,
    HeaderPosition,
    Hint,
    Unknown,
}

impl std::fmt::Display for MatchSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MatchSource::AliasExact => write!(f, "alias_exact"),
            MatchSource::AliasPartial => write!(f, "alias_partial"),
            MatchSource::Pattern => write!(f, "pattern"),
            MatchSource::HeaderPosition => write!(f, "header_position"),
            MatchSource::Hint => write!(f, "hint"),
            MatchSource::Unknown => write!(f, "unknown"),
        }
    }
}

/// Outcome of store classification. Produced once per processing call.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StoreMatch {
    /// Canonical store id (`"costco"`) or, for header guesses, the raw name.
    pub store_id: String,
    pub confidence: f32,
    pub source: MatchSource,
}

impl StoreMatch {
    pub fn new(store_id: impl Into<String>, confidence: f32, source: MatchSource) -> Self {
        Self { store_id: store_id.into(), confidence: confidence.clamp(0.0, 1.0), source }
    }

    /// The no-signal result: `("unknown", 0.0)`.
    pub fn unknown() -> Self {
        Self::new("unknown", 0.0, MatchSource::Unknown)
    }

    pub fn is_unknown(&self) -> bool {
        self.store_id == "unknown"
    }
}

// ── Handler output ────────────────────────────────────────────────────────────

/// One line item pulled out of the receipt body.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExtractedItem {
    pub description: String,
    pub price: f64,
    pub quantity: f64,
    /// How confident the handler is that `description` is a real item name
    /// (0.0 = guessed, 1.0 = certain). Consumed by the scorer.
    pub description_confidence: f32,
}

impl ExtractedItem {
    pub fn new(
        description: impl Into<String>,
        price: f64,
        quantity: f64,
        description_confidence: f32,
    ) -> Self {
        Self {
            description: description.into(),
            price: price.max(0.0),
            quantity: quantity.max(0.0),
            description_confidence: description_confidence.clamp(0.0, 1.0),
        }
    }
}

/// Payment classes receipts advertise. Coarser than card brands; the
/// expense splitter only cares how the money moved.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    Credit,
    Debit,
    Cash,
    Electronic,
    Check,
    GiftCard,
}

impl std::fmt::Display for PaymentMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PaymentMethod::Credit => write!(f, "credit"),
            PaymentMethod::Debit => write!(f, "debit"),
            PaymentMethod::Cash => write!(f, "cash"),
            PaymentMethod::Electronic => write!(f, "electronic"),
            PaymentMethod::Check => write!(f, "check"),
            PaymentMethod::GiftCard => write!(f, "gift_card"),
        }
    }
}

/// Everything a handler managed to extract. Always a value: an unparseable
/// receipt yields the default (no items, no totals), never an error.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct HandlerResult {
    pub items: Vec<ExtractedItem>,
    pub subtotal: Option<f64>,
    pub tax: Option<f64>,
    pub total: Option<f64>,
    pub store_name: Option<String>,
    pub date: Option<NaiveDate>,
    pub payment_method: Option<PaymentMethod>,
    pub currency: Option<Currency>,
}

impl HandlerResult {
    /// Sum of item prices, used for subtotal backfill and totals scoring.
    pub fn item_sum(&self) -> f64 {
        self.items.iter().map(|i| i.price).sum()
    }
}

// ── Confidence report ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ItemsScore {
    pub score: f32,
    /// Fraction of items with a positive price.
    pub valid_price_rate: f32,
    /// Fraction of items whose description confidence clears 0.4.
    pub description_match_rate: f32,
    pub total_items: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TotalsScore {
    pub score: f32,
    pub subtotal_detected: bool,
    pub total_detected: bool,
    /// True when the item-price sum lands within 20% of the stated total.
    pub sum_matches: bool,
    pub difference_percent: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StoreScore {
    pub score: f32,
    pub name_detected: bool,
    pub pattern_matches: bool,
}

/// Qualitative band for the OCR sub-score, for human-readable summaries.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum OcrQuality {
    Poor,
    Fair,
    Good,
    Excellent,
}

impl OcrQuality {
    pub fn from_score(score: f32) -> Self {
        match score {
            s if s >= 0.9 => OcrQuality::Excellent,
            s if s >= 0.75 => OcrQuality::Good,
            s if s >= 0.6 => OcrQuality::Fair,
            _ => OcrQuality::Poor,
        }
    }
}

impl std::fmt::Display for OcrQuality {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OcrQuality::Poor => write!(f, "poor"),
            OcrQuality::Fair => write!(f, "fair"),
            OcrQuality::Good => write!(f, "good"),
            OcrQuality::Excellent => write!(f, "excellent"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OcrScore {
    pub score: f32,
    pub quality: OcrQuality,
    pub line_count: usize,
    pub matched_lines: usize,
}

/// Multi-category quality estimate for one extraction run.
/// `overall` is the fixed weighted sum of the four sub-scores.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConfidenceReport {
    pub overall: f32,
    pub items: ItemsScore,
    pub totals: TotalsScore,
    pub store: StoreScore,
    pub ocr: OcrScore,
}

impl ConfidenceReport {
    /// The all-zero report attached to terminal error results.
    pub fn zero() -> Self {
        Self {
            overall: 0.0,
            items: ItemsScore {
                score: 0.0,
                valid_price_rate: 0.0,
                description_match_rate: 0.0,
                total_items: 0,
            },
            totals: TotalsScore {
                score: 0.0,
                subtotal_detected: false,
                total_detected: false,
                sum_matches: false,
                difference_percent: 0.0,
            },
            store: StoreScore { score: 0.0, name_detected: false, pattern_matches: false },
            ocr: OcrScore {
                score: 0.0,
                quality: OcrQuality::Poor,
                line_count: 0,
                matched_lines: 0,
            },
        }
    }
}

// ── Final result ──────────────────────────────────────────────────────────────

/// The record handed back to callers. Built fresh per call; the pipeline
/// never retains it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessingResult {
    pub store: String,
    pub store_confidence: f32,
    pub store_source: MatchSource,
    /// Registry id of the handler that produced the kept result.
    pub handler: String,
    pub items: Vec<ExtractedItem>,
    pub subtotal: Option<f64>,
    pub tax: Option<f64>,
    pub total: Option<f64>,
    pub currency: Option<Currency>,
    pub date: Option<NaiveDate>,
    pub payment_method: Option<PaymentMethod>,
    pub confidence: ConfidenceReport,
    pub extraction_quality: f32,
    /// Wall-clock seconds spent in the pipeline.
    pub processing_time: f64,
    /// Opaque correlation id (UUID v4), unique per call.
    pub process_id: String,
    pub error: Option<String>,
}

impl ProcessingResult {
    /// Terminal error result: empty items, zeroed confidence, `error` set.
    pub fn failure(
        error: impl Into<String>,
        store: impl Into<String>,
        processing_time: f64,
        process_id: String,
    ) -> Self {
        Self {
            store: store.into(),
            store_confidence: 0.0,
            store_source: MatchSource::Unknown,
            handler: String::new(),
            items: vec![],
            subtotal: None,
            tax: None,
            total: None,
            currency: None,
            date: None,
            payment_method: None,
            confidence: ConfidenceReport::zero(),
            extraction_quality: 0.0,
            processing_time,
            process_id,
            error: Some(error.into()),
        }
    }

    pub fn is_failure(&self) -> bool {
        self.error.is_some()
    }
}
