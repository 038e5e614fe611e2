//! Text extraction from images
//!
//! This module provides a uniform interface over OCR engines:
//! - Tesseract via its command-line executable
//! - An in-memory mock for tests

pub mod mock;
pub mod tesseract;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use image::DynamicImage;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::OcrConfig;
use crate::error::PipelineError;
use crate::imaging::{ImageInfo, SourceFormat};

pub use mock::MockOcrEngine;
pub use tesseract::TesseractEngine;

/// A recognized word and where it sits on the page
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BoundingBox {
    pub text: String,
    pub left: u32,
    pub top: u32,
    pub width: u32,
    pub height: u32,
    /// Engine confidence in `[0, 1]`
    pub confidence: f32,
}

/// Raw engine output
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Recognition {
    pub text: String,
    pub words: Vec<BoundingBox>,
}

impl Recognition {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            words: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineOptions {
    pub language: String,
    pub page_segmentation_mode: u8,
    pub engine_mode: Option<u8>,
    pub dpi: Option<u32>,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            language: "eng".to_string(),
            page_segmentation_mode: 3,
            engine_mode: None,
            dpi: None,
        }
    }
}

impl From<&OcrConfig> for EngineOptions {
    fn from(config: &OcrConfig) -> Self {
        Self {
            language: config.language.clone(),
            page_segmentation_mode: config.page_segmentation_mode,
            engine_mode: config.engine_mode,
            dpi: config.dpi,
        }
    }
}

/// OCR engine interface
#[async_trait]
pub trait OcrEngine: Send + Sync {
    /// Engine name recorded in OCR metadata (e.g., "tesseract")
    fn name(&self) -> &str;

    /// Recognize text in an image.
    ///
    /// Blank images yield empty text, not an error.
    async fn recognize(
        &self,
        image: &DynamicImage,
        options: &EngineOptions,
    ) -> Result<Recognition, PipelineError>;
}

/// Recognized text plus metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OcrResult {
    pub text: String,
    pub metadata: OcrMetadata,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OcrMetadata {
    pub word_count: usize,
    pub character_count: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bounding_boxes: Option<Vec<BoundingBox>>,
    pub image: ImageInfo,
    pub engine: String,
}

/// Runs an [`OcrEngine`] with a deadline and shapes its output.
#[derive(Clone)]
pub struct TextExtractor {
    engine: Arc<dyn OcrEngine>,
    options: EngineOptions,
    timeout: Duration,
}

impl TextExtractor {
    pub fn new(engine: Arc<dyn OcrEngine>, options: EngineOptions, timeout: Duration) -> Self {
        Self {
            engine,
            options,
            timeout,
        }
    }

    pub fn engine_name(&self) -> &str {
        self.engine.name()
    }

    pub fn options(&self) -> &EngineOptions {
        &self.options
    }

    /// Extract trimmed text; blank images give `""`.
    pub async fn extract_text(
        &self,
        image: &DynamicImage,
        options: Option<&EngineOptions>,
    ) -> Result<String, PipelineError> {
        let recognition = self.run(image, options.unwrap_or(&self.options)).await?;
        Ok(recognition.text.trim().to_string())
    }

    /// Extract text with word/character counts and word boxes.
    pub async fn extract_with_metadata(
        &self,
        image: &DynamicImage,
        format: Option<SourceFormat>,
    ) -> Result<OcrResult, PipelineError> {
        let recognition = self.run(image, &self.options).await?;
        let text = recognition.text.trim().to_string();

        let metadata = OcrMetadata {
            word_count: text.split_whitespace().count(),
            character_count: text.chars().count(),
            bounding_boxes: if recognition.words.is_empty() {
                None
            } else {
                Some(recognition.words)
            },
            image: ImageInfo::describe(image, format),
            engine: self.engine.name().to_string(),
        };

        debug!(
            engine = %metadata.engine,
            words = metadata.word_count,
            chars = metadata.character_count,
            "OCR complete"
        );

        Ok(OcrResult { text, metadata })
    }

    async fn run(
        &self,
        image: &DynamicImage,
        options: &EngineOptions,
    ) -> Result<Recognition, PipelineError> {
        match tokio::time::timeout(self.timeout, self.engine.recognize(image, options)).await {
            Ok(result) => result,
            Err(_) => Err(PipelineError::EngineUnavailable(format!(
                "{} did not finish within {}s",
                self.engine.name(),
                self.timeout.as_secs_f32()
            ))),
        }
    }
}
