use divvy_core::Currency;
use serde::{Deserialize, Serialize};

/// Weights folding the four sub-scores into `ConfidenceReport::overall`.
/// Empirically tuned; they must sum to 1.0.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ScoreWeights {
    pub items: f32,
    pub totals: f32,
    pub store: f32,
    pub ocr: f32,
}

impl Default for ScoreWeights {
    fn default() -> Self {
        Self { items: 0.6, totals: 0.1, store: 0.2, ocr: 0.1 }
    }
}

/// Classifier pass constants: short-circuit bars plus the fixed confidences
/// for the exact-alias hit and the two low-signal header guesses.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PassBars {
    /// Confidence assigned to a word-boundary alias hit.
    pub alias_exact: f32,
    /// Short-circuit bar after the alias passes.
    pub alias_bar: f32,
    /// Short-circuit bar after the vendor-pattern pass.
    pub pattern_bar: f32,
    /// Short-circuit bar after the header-position pass.
    pub header_bar: f32,
    /// Confidence for an unverified header-pattern capture.
    pub header_guess: f32,
    /// Confidence for the bare first-line guess.
    pub first_line_guess: f32,
}

impl Default for PassBars {
    fn default() -> Self {
        Self {
            alias_exact: 0.95,
            alias_bar: 0.8,
            pattern_bar: 0.7,
            header_bar: 0.6,
            header_guess: 0.5,
            first_line_guess: 0.4,
        }
    }
}

/// Pipeline-wide tuning, constructed once and shared by reference.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PipelineConfig {
    /// Fallback trigger: results scoring below this rerun with the generic
    /// handler.
    pub confidence_threshold: f32,
    pub weights: ScoreWeights,
    pub bars: PassBars,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            confidence_threshold: 0.5,
            weights: ScoreWeights::default(),
            bars: PassBars::default(),
        }
    }
}

impl PipelineConfig {
    pub fn from_toml(toml_content: &str) -> Result<Self, String> {
        toml::from_str(toml_content).map_err(|e| format!("Failed to parse TOML: {e}"))
    }
}

/// Per-call options recognized by the processing entry points.
#[derive(Debug, Clone, Default)]
pub struct ProcessOptions {
    /// Force a named handler; unregistered names fall back to normal
    /// resolution rather than erroring.
    pub force_handler: Option<String>,
    /// Overwrite the reported currency; never affects confidence.
    pub force_currency: Option<Currency>,
    /// Caller's prior knowledge of the store, folded into classification.
    pub store_hint: Option<String>,
    /// Per-call override of the configured fallback threshold.
    pub confidence_threshold: Option<f32>,
    /// Passed through to the OCR backend untouched.
    pub ocr_engine: Option<String>,
}

impl ProcessOptions {
    pub fn with_force_handler(mut self, handler: impl Into<String>) -> Self {
        self.force_handler = Some(handler.into());
        self
    }

    pub fn with_force_currency(mut self, currency: Currency) -> Self {
        self.force_currency = Some(currency);
        self
    }

    pub fn with_store_hint(mut self, hint: impl Into<String>) -> Self {
        self.store_hint = Some(hint.into());
        self
    }

    pub fn with_confidence_threshold(mut self, threshold: f32) -> Self {
        self.confidence_threshold = Some(threshold);
        self
    }

    pub fn with_ocr_engine(mut self, engine: impl Into<String>) -> Self {
        self.ocr_engine = Some(engine.into());
        self
    }
}
