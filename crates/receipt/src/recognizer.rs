use std::sync::Mutex;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum OcrError {
    #[error("Image decode error: {0}")]
    ImageDecode(String),
    #[error("OCR engine error: {0}")]
    Engine(String),
    #[error("Tesseract not available — build with `tesseract` feature")]
    NotAvailable,
}

/// Abstraction over an OCR backend.
/// Implementations accept raw PNG/JPEG image bytes and return the recognized
/// text. The pipeline treats that text as opaque.
pub trait OcrBackend: Send + Sync {
    fn recognize(&self, image_bytes: &[u8]) -> Result<String, OcrError>;

    /// [`recognize`](OcrBackend::recognize) with an optional caller-supplied
    /// engine name. Single-engine backends ignore the hint.
    fn recognize_with(
        &self,
        image_bytes: &[u8],
        engine: Option<&str>,
    ) -> Result<String, OcrError> {
        let _ = engine;
        self.recognize(image_bytes)
    }
}

// ── Mock backend (always available, used for tests) ───────────────────────────

/// Returns a pre-set string and records the last engine hint it saw, so
/// pipeline tests run without Tesseract installed.
pub struct MockRecognizer {
    pub text: String,
    seen_engine: Mutex<Option<String>>,
}

impl MockRecognizer {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into(), seen_engine: Mutex::new(None) }
    }

    /// The engine hint from the most recent `recognize_with` call.
    pub fn last_engine(&self) -> Option<String> {
        self.seen_engine.lock().ok().and_then(|g| g.clone())
    }
}

impl OcrBackend for MockRecognizer {
    fn recognize(&self, _image_bytes: &[u8]) -> Result<String, OcrError> {
        Ok(self.text.clone())
    }

    fn recognize_with(
        &self,
        image_bytes: &[u8],
        engine: Option<&str>,
    ) -> Result<String, OcrError> {
        if let Ok(mut guard) = self.seen_engine.lock() {
            *guard = engine.map(str::to_string);
        }
        self.recognize(image_bytes)
    }
}

// ── Tesseract backend (optional, gated behind `tesseract` feature) ─────────────

#[cfg(feature = "tesseract")]
pub mod tesseract_backend {
    use super::{OcrBackend, OcrError};
    use leptess::LepTess;

    pub struct TesseractRecognizer {
        data_path: Option<String>,
        lang: String,
    }

    impl TesseractRecognizer {
        pub fn new(data_path: Option<String>, lang: &str) -> Self {
            Self { data_path, lang: lang.to_string() }
        }
    }

    impl OcrBackend for TesseractRecognizer {
        fn recognize(&self, image_bytes: &[u8]) -> Result<String, OcrError> {
            let mut lt = LepTess::new(self.data_path.as_deref(), &self.lang)
                .map_err(|e| OcrError::Engine(e.to_string()))?;
            lt.set_image_from_mem(image_bytes)
                .map_err(|e| OcrError::ImageDecode(e.to_string()))?;
            lt.get_utf8_text().map_err(|e| OcrError::Engine(e.to_string()))
        }
    }
}
