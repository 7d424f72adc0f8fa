//! The processing pipeline.
//!
//! `obtain text → classify store → select handler → extract → score →
//! fallback check → finalize`. Every stage failure is absorbed into the
//! result record; the public entry points always hand back a
//! [`ProcessingResult`], never an error. Only the OCR stage may terminate
//! the run early, and it does so by filling the `error` field.

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use thiserror::Error;
use uuid::Uuid;

use crate::classify::{apply_store_hint, StoreClassifier};
use crate::config::{PipelineConfig, ProcessOptions};
use crate::hash::artifact_key;
use crate::recognizer::{OcrBackend, OcrError};
use crate::registry::HandlerRegistry;
use crate::score::Scorer;
use crate::types::ProcessingResult;

/// Upstream failures that terminate a run. Converted to the `error` string
/// on the result at the public boundary.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Failed to read image: {0}")]
    ImageRead(#[from] std::io::Error),
    #[error(transparent)]
    Ocr(#[from] OcrError),
    #[error("Processing timed out after {0:?}")]
    Timeout(Duration),
}

/// One shared instance serves concurrent calls: the classifier, registry and
/// scorer are immutable after construction and every call builds its own
/// result.
pub struct ReceiptProcessor<B> {
    backend: B,
    classifier: StoreClassifier,
    registry: HandlerRegistry,
    scorer: Scorer,
    config: PipelineConfig,
    debug_dir: Option<PathBuf>,
}

impl<B: OcrBackend> ReceiptProcessor<B> {
    pub fn new(backend: B) -> Self {
        Self::with_config(backend, PipelineConfig::default())
    }

    pub fn with_config(backend: B, config: PipelineConfig) -> Self {
        Self {
            backend,
            classifier: StoreClassifier::default().with_bars(config.bars),
            registry: HandlerRegistry::new(),
            scorer: Scorer::new(config.weights),
            config,
            debug_dir: None,
        }
    }

    /// Swap in a classifier, typically one loaded from an alias file.
    pub fn with_classifier(mut self, classifier: StoreClassifier) -> Self {
        self.classifier = classifier;
        self
    }

    /// Write per-input debug artifacts (raw OCR text, result summary) into
    /// this directory.
    pub fn with_debug_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.debug_dir = Some(dir.into());
        self
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// OCR an image file, then process the recognized text.
    pub async fn process_image(
        &self,
        path: impl AsRef<Path>,
        options: &ProcessOptions,
    ) -> ProcessingResult {
        let started = Instant::now();
        let process_id = Uuid::new_v4().to_string();
        let path = path.as_ref();
        match tokio::fs::read(path).await {
            Ok(bytes) => self.recognize_and_run(&bytes, options, started, process_id),
            Err(err) => {
                tracing::warn!(path = %path.display(), %err, "could not read receipt image");
                failure(PipelineError::ImageRead(err), started, process_id)
            }
        }
    }

    /// [`process_image`](Self::process_image) bounded by a wall-clock
    /// deadline. On timeout the in-flight work is dropped, not joined, and a
    /// structured timeout result comes back.
    pub async fn process_image_with_deadline(
        &self,
        path: impl AsRef<Path>,
        options: &ProcessOptions,
        deadline: Duration,
    ) -> ProcessingResult {
        let started = Instant::now();
        match tokio::time::timeout(deadline, self.process_image(path.as_ref(), options)).await {
            Ok(result) => result,
            Err(_) => failure(
                PipelineError::Timeout(deadline),
                started,
                Uuid::new_v4().to_string(),
            ),
        }
    }

    /// Process in-memory image bytes.
    pub async fn process_bytes(
        &self,
        image: &[u8],
        options: &ProcessOptions,
    ) -> ProcessingResult {
        let started = Instant::now();
        let process_id = Uuid::new_v4().to_string();
        self.recognize_and_run(image, options, started, process_id)
    }

    /// Process already-recognized receipt text, skipping OCR entirely.
    pub fn process_text(&self, text: &str, options: &ProcessOptions) -> ProcessingResult {
        let started = Instant::now();
        let process_id = Uuid::new_v4().to_string();
        self.run_stages(text, options, started, process_id)
    }

    fn recognize_and_run(
        &self,
        image: &[u8],
        options: &ProcessOptions,
        started: Instant,
        process_id: String,
    ) -> ProcessingResult {
        match self.backend.recognize_with(image, options.ocr_engine.as_deref()) {
            Ok(text) => self.run_stages(&text, options, started, process_id),
            Err(err) => {
                tracing::warn!(%err, "ocr failed");
                failure(PipelineError::Ocr(err), started, process_id)
            }
        }
    }

    fn run_stages(
        &self,
        text: &str,
        options: &ProcessOptions,
        started: Instant,
        process_id: String,
    ) -> ProcessingResult {
        let mut store = self.classifier.classify(text);
        if let Some(hint) = options.store_hint.as_deref() {
            store = apply_store_hint(store, hint);
        }
        tracing::debug!(
            store = %store.store_id,
            confidence = store.confidence,
            source = %store.source,
            "store classified"
        );

        let handler = match options.force_handler.as_deref() {
            Some(name) => self.registry.resolve_forced(name, &store.store_id),
            None => self.registry.resolve(&store.store_id),
        };
        let handler_name = handler.name();
        let result = handler.process_receipt(text);
        let report = self.scorer.score(text, &result, &store);

        let threshold = options
            .confidence_threshold
            .unwrap_or(self.config.confidence_threshold);
        let (handler_name, result, report) =
            if report.overall < threshold && handler_name != "generic" {
                tracing::info!(
                    handler = handler_name,
                    overall = report.overall,
                    threshold,
                    "low confidence, retrying with generic handler"
                );
                let generic_result = self.registry.resolve("generic").process_receipt(text);
                let generic_report = self.scorer.score(text, &generic_result, &store);
                // Ties keep the specific handler's result.
                if generic_report.overall > report.overall {
                    ("generic", generic_result, generic_report)
                } else {
                    (handler_name, result, report)
                }
            } else {
                (handler_name, result, report)
            };

        let extraction_quality = self.scorer.extraction_quality(&result, &report);
        let out = ProcessingResult {
            store: store.store_id,
            store_confidence: store.confidence,
            store_source: store.source,
            handler: handler_name.to_string(),
            currency: options.force_currency.clone().or(result.currency),
            items: result.items,
            subtotal: result.subtotal,
            tax: result.tax,
            total: result.total,
            date: result.date,
            payment_method: result.payment_method,
            confidence: report,
            extraction_quality,
            processing_time: started.elapsed().as_secs_f64(),
            process_id,
            error: None,
        };
        self.write_debug_artifacts(text, &out);
        tracing::info!(
            store = %out.store,
            handler = %out.handler,
            items = out.items.len(),
            overall = out.confidence.overall,
            "processing complete"
        );
        out
    }

    fn write_debug_artifacts(&self, text: &str, result: &ProcessingResult) {
        let Some(dir) = self.debug_dir.as_deref() else {
            return;
        };
        let key = artifact_key(text.as_bytes());
        match write_artifacts(dir, &key, text, result) {
            Ok(()) => tracing::debug!(key, dir = %dir.display(), "debug artifacts written"),
            Err(err) => tracing::warn!(%err, "failed to write debug artifacts"),
        }
    }
}

fn failure(err: PipelineError, started: Instant, process_id: String) -> ProcessingResult {
    ProcessingResult::failure(
        err.to_string(),
        "unknown",
        started.elapsed().as_secs_f64(),
        process_id,
    )
}

fn write_artifacts(
    dir: &Path,
    key: &str,
    text: &str,
    result: &ProcessingResult,
) -> std::io::Result<()> {
    std::fs::create_dir_all(dir)?;
    std::fs::write(dir.join(format!("ocr_{key}.txt")), text)?;
    let summary = serde_json::json!({
        "store": result.store,
        "store_confidence": result.store_confidence,
        "handler": result.handler,
        "item_count": result.items.len(),
        "first_items": result
            .items
            .iter()
            .take(5)
            .map(|i| i.description.as_str())
            .collect::<Vec<_>>(),
        "subtotal": result.subtotal,
        "tax": result.tax,
        "total": result.total,
        "overall_confidence": result.confidence.overall,
        "extraction_quality": result.extraction_quality,
    });
    let body = serde_json::to_string_pretty(&summary)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
    std::fs::write(dir.join(format!("summary_{key}.json")), body)
}
