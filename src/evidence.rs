//! Adapter around on-device text recognition.
//!
//! Images are decoded and recognised one at a time on the blocking pool.
//! Failing images are reported alongside the text that was recovered; the
//! call only fails when nothing could be read.

use std::sync::Arc;

use image::DynamicImage;

use crate::error::{ExtractionError, ImageFailure};

pub const IMAGE_SEPARATOR: &str = "\n\n---\n\n";

/// Platform text recognition for a single decoded image.
///
/// Returns recognised lines in reading order. Runs on a blocking thread.
pub trait TextRecognizer: Send + Sync + 'static {
    fn recognize_lines(&self, image: &DynamicImage) -> Result<Vec<String>, String>;
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct ExtractedEvidence {
    pub text: String,
    pub failures: Vec<ImageFailure>,
}

impl ExtractedEvidence {
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}

pub struct EvidenceExtractor<R: TextRecognizer> {
    recognizer: Arc<R>,
}

impl<R: TextRecognizer> Clone for EvidenceExtractor<R> {
    fn clone(&self) -> Self {
        Self {
            recognizer: Arc::clone(&self.recognizer),
        }
    }
}

impl<R: TextRecognizer> EvidenceExtractor<R> {
    pub fn new(recognizer: R) -> Self {
        Self {
            recognizer: Arc::new(recognizer),
        }
    }

    /// Recognises text in every encoded image (PNG, JPEG, ...).
    pub async fn extract_text(&self, images: &[Vec<u8>]) -> Result<ExtractedEvidence, ExtractionError> {
        if images.is_empty() {
            return Ok(ExtractedEvidence::default());
        }

        let mut texts = Vec::with_capacity(images.len());
        let mut failures = Vec::new();

        for (index, bytes) in images.iter().enumerate() {
            let recognizer = Arc::clone(&self.recognizer);
            let bytes = bytes.clone();
            let outcome = tokio::task::spawn_blocking(move || recognize_one(&*recognizer, index, &bytes))
                .await
                .map_err(|err| ExtractionError::Worker(err.to_string()))?;

            match outcome {
                Ok(text) => texts.push(text),
                Err(failure) => {
                    log::warn!("{failure}");
                    failures.push(failure);
                }
            }
        }

        if texts.is_empty() {
            return Err(ExtractionError::AllImagesFailed(failures));
        }

        Ok(ExtractedEvidence {
            text: texts.join(IMAGE_SEPARATOR),
            failures,
        })
    }
}

fn recognize_one<R: TextRecognizer>(
    recognizer: &R,
    index: usize,
    bytes: &[u8],
) -> Result<String, ImageFailure> {
    let image = image::load_from_memory(bytes).map_err(|err| ImageFailure::InvalidImage {
        index,
        reason: err.to_string(),
    })?;

    let lines = recognizer
        .recognize_lines(&image)
        .map_err(|reason| ImageFailure::RecognitionFailed { index, reason })?;

    let text = lines
        .iter()
        .map(|line| line.trim())
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n");

    if text.is_empty() {
        Err(ImageFailure::NoTextFound { index })
    } else {
        Ok(text)
    }
}
