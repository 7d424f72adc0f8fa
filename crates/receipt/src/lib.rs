pub mod classify;
pub mod config;
pub mod handlers;
pub mod hash;
pub mod pipeline;
pub mod recognizer;
pub mod registry;
pub mod score;
pub mod types;

pub use classify::{apply_store_hint, StoreClassifier};
pub use config::{PassBars, PipelineConfig, ProcessOptions, ScoreWeights};
pub use handlers::ExtractReceipt;
pub use hash::{artifact_key, sha256_bytes, to_hex};
pub use pipeline::{PipelineError, ReceiptProcessor};
pub use recognizer::{MockRecognizer, OcrBackend, OcrError};
pub use registry::HandlerRegistry;
pub use score::Scorer;
pub use types::{
    ConfidenceReport, ExtractedItem, HandlerResult, MatchSource, PaymentMethod,
    ProcessingResult, StoreMatch,
};

/// Compiled-regex cache: each use site gets a function returning a lazily
/// compiled `&'static Regex`.
macro_rules! re {
    ($name:ident, $pat:expr) => {
        fn $name() -> &'static regex::Regex {
            static R: std::sync::OnceLock<regex::Regex> = std::sync::OnceLock::new();
            R.get_or_init(|| regex::Regex::new($pat).expect("invalid regex"))
        }
    };
}
pub(crate) use re;
