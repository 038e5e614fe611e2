//! Image-to-structured-data pipeline.
//!
//! # Stages
//!
//! ```text
//! ImageInput
//!     │
//!     ▼
//! validate ──── invalid ──────────────────────────► failed
//!     │
//!     ▼
//! preprocess (optional; errors fall back to the original image)
//!     │
//!     ▼
//! ocr ───────── no text / engine down ────────────► failed
//!     │         decode error: one retry on a preprocessed copy
//!     ▼
//! extract ───── model down ───────────────────────► failed (OCR kept)
//!     │         malformed reply / low confidence ─► partial
//!     ▼
//! success
//! ```
//!
//! Batches run the same state machine per image with bounded concurrency
//! and return results in input order.

mod progress;
mod types;

pub use progress::{BatchProgress, ProgressTracker, StageProgress};
pub use types::{PipelineResult, PipelineStatus, ProgressUpdate, ResultError, Stage};

use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use futures::stream::{self, StreamExt};
use image::DynamicImage;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::config::Config;
use crate::error::PipelineError;
use crate::extract::{ExtractionType, StructuredExtractor};
use crate::imaging::{self, ImageInput, ImageValidation, Preprocessor, SourceFormat};
use crate::llm::{build_provider, CompletionProvider};
use crate::ocr::{EngineOptions, OcrEngine, OcrResult, TesseractEngine, TextExtractor};

/// Orchestrates validation, preprocessing, OCR and extraction.
pub struct OcrPipeline {
    config: Arc<Config>,
    preprocessor: Preprocessor,
    text_extractor: TextExtractor,
    extractor: StructuredExtractor,
    progress: Option<ProgressTracker>,
}

impl OcrPipeline {
    /// Create a pipeline around an OCR engine and a language model.
    pub fn new(
        config: Arc<Config>,
        engine: Arc<dyn OcrEngine>,
        provider: Arc<dyn CompletionProvider>,
    ) -> Self {
        let preprocessor = Preprocessor::new(config.preprocess.clone());
        let text_extractor = TextExtractor::new(
            engine,
            EngineOptions::from(&config.ocr),
            config.ocr.timeout(),
        );
        let extractor = StructuredExtractor::new(provider, config.extraction.clone());

        Self {
            config,
            preprocessor,
            text_extractor,
            extractor,
            progress: None,
        }
    }

    /// Create a pipeline with Tesseract and the configured language model.
    pub fn from_config(config: Config) -> Result<Self> {
        let provider_config = config.provider.as_ref().context(
            "No language model configured; set GEMINI_API_KEY or ANTHROPIC_API_KEY, \
             or add a provider to the config file",
        )?;
        let provider = build_provider(provider_config, config.extraction.model_timeout())
            .context("Failed to create language model provider")?;
        let engine = Arc::new(TesseractEngine::new(&config.ocr.tesseract_cmd));

        tracing::info!(
            engine = %config.ocr.tesseract_cmd,
            provider = provider.provider_name(),
            model = provider.model_id(),
            "Pipeline configured"
        );

        Ok(Self::new(Arc::new(config), engine, provider))
    }

    /// Report stage progress to `tracker`
    pub fn with_progress(mut self, tracker: ProgressTracker) -> Self {
        self.progress = Some(tracker);
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn supported_extraction_types() -> [ExtractionType; 4] {
        ExtractionType::ALL
    }

    /// Check an image without processing it.
    pub async fn validate_image(&self, input: &ImageInput) -> ImageValidation {
        let input = input.clone();
        let limit = self.config.pipeline.large_file_warning_bytes;
        match tokio::task::spawn_blocking(move || imaging::validate_image(&input, limit)).await {
            Ok(validation) => validation,
            Err(e) => {
                let reason = format!("Validation task failed: {}", e);
                ImageValidation {
                    valid: false,
                    reason: Some(reason.clone()),
                    errors: vec![reason],
                    ..Default::default()
                }
            }
        }
    }

    /// Process one image end to end.
    pub async fn process_image(
        &self,
        input: ImageInput,
        extraction_type: ExtractionType,
        preprocess: bool,
    ) -> PipelineResult {
        self.process_image_with_cancel(input, extraction_type, preprocess, &CancellationToken::new())
            .await
    }

    /// Process one image, stopping early when `cancel` fires.
    ///
    /// Cancellation before OCR completes gives `failed`; after OCR it gives
    /// `partial` with the OCR result kept.
    pub async fn process_image_with_cancel(
        &self,
        input: ImageInput,
        extraction_type: ExtractionType,
        preprocess: bool,
        cancel: &CancellationToken,
    ) -> PipelineResult {
        let batch_id = Uuid::new_v4().to_string();
        self.begin(&batch_id, 1).await;
        let result = self
            .run(input, extraction_type, preprocess, cancel, &batch_id)
            .await;
        self.end(&batch_id).await;
        result
    }

    /// Process several images. Results are in input order, one per input.
    pub async fn process_batch(
        &self,
        inputs: Vec<ImageInput>,
        extraction_type: ExtractionType,
        preprocess: bool,
    ) -> Vec<PipelineResult> {
        self.process_batch_with_cancel(inputs, extraction_type, preprocess, &CancellationToken::new())
            .await
    }

    pub async fn process_batch_with_cancel(
        &self,
        inputs: Vec<ImageInput>,
        extraction_type: ExtractionType,
        preprocess: bool,
        cancel: &CancellationToken,
    ) -> Vec<PipelineResult> {
        let batch_id = Uuid::new_v4().to_string();
        let concurrency = self.config.pipeline.batch_concurrency.max(1);
        tracing::info!(
            batch_id = %batch_id,
            images = inputs.len(),
            concurrency,
            extraction_type = %extraction_type,
            "Starting batch"
        );

        self.begin(&batch_id, inputs.len()).await;

        let batch_ref = batch_id.as_str();
        let results: Vec<PipelineResult> = stream::iter(inputs)
            .map(move |input| self.run(input, extraction_type, preprocess, cancel, batch_ref))
            .buffered(concurrency)
            .collect()
            .await;
        self.end(&batch_id).await;

        let succeeded = results.iter().filter(|r| r.is_success()).count();
        tracing::info!(
            batch_id = %batch_id,
            total = results.len(),
            succeeded,
            "Batch complete"
        );
        results
    }

    async fn run(
        &self,
        input: ImageInput,
        extraction_type: ExtractionType,
        preprocess: bool,
        cancel: &CancellationToken,
        batch_id: &str,
    ) -> PipelineResult {
        let result = self
            .run_stages(input, extraction_type, preprocess, cancel, batch_id)
            .await;
        self.report(ProgressUpdate::Finished {
            batch_id: batch_id.to_string(),
            status: result.pipeline_status,
        })
        .await;
        result
    }

    /// Run the per-image state machine.
    async fn run_stages(
        &self,
        input: ImageInput,
        extraction_type: ExtractionType,
        preprocess: bool,
        cancel: &CancellationToken,
        batch_id: &str,
    ) -> PipelineResult {
        let started = Instant::now();
        let mut result = PipelineResult::new(input.display_name());
        tracing::debug!(image = %result.image_path, extraction_type = %extraction_type, "Processing image");

        // Validate
        self.started(batch_id, Stage::Validate).await;
        let limit = self.config.pipeline.large_file_warning_bytes;
        let inspection =
            tokio::task::spawn_blocking(move || imaging::inspect(&input, limit)).await;
        let (validation, decoded) = match inspection {
            Ok(inspection) => (inspection.validation, inspection.decoded),
            Err(e) => {
                let err = PipelineError::InvalidImage(format!("Validation task failed: {}", e));
                self.failed(batch_id, Stage::Validate, &err).await;
                return self.fail(result, started, Stage::Validate, err);
            }
        };
        result.warnings.extend(validation.warnings);
        let decoded = match (validation.valid, decoded) {
            (true, Some(decoded)) => decoded,
            _ => {
                let reason = validation
                    .reason
                    .unwrap_or_else(|| "Image failed validation".to_string());
                let err = PipelineError::InvalidImage(reason);
                self.failed(batch_id, Stage::Validate, &err).await;
                return self.fail(result, started, Stage::Validate, err);
            }
        };
        self.completed(batch_id, Stage::Validate).await;

        let format = decoded.info.format;
        let original = Arc::new(decoded.image);

        // Preprocess
        let mut ocr_image = original.clone();
        if preprocess {
            if cancel.is_cancelled() {
                return self.fail(result, started, Stage::Preprocess, PipelineError::Cancelled);
            }
            self.queue(batch_id, Stage::Preprocess).await;
            self.started(batch_id, Stage::Preprocess).await;
            match self.preprocess(original.clone()).await {
                Ok(image) => {
                    ocr_image = Arc::new(image);
                    result.preprocessed = true;
                    self.completed(batch_id, Stage::Preprocess).await;
                }
                Err(e) => {
                    tracing::warn!(image = %result.image_path, error = %e, "Preprocessing failed, using original image");
                    result
                        .warnings
                        .push(format!("Preprocessing failed, using original image: {}", e));
                    self.failed(batch_id, Stage::Preprocess, &e).await;
                }
            }
        }

        // OCR
        if cancel.is_cancelled() {
            return self.fail(result, started, Stage::Ocr, PipelineError::Cancelled);
        }
        self.queue(batch_id, Stage::Ocr).await;
        self.started(batch_id, Stage::Ocr).await;
        let mut ocr = self.recognize(&ocr_image, format, cancel).await;

        if matches!(ocr, Err(PipelineError::DecodeError(_))) && !result.preprocessed {
            tracing::warn!(image = %result.image_path, "OCR could not decode image, retrying on preprocessed copy");
            result
                .warnings
                .push("OCR engine could not decode the image; retried on a preprocessed copy".to_string());
            match self.preprocess(original.clone()).await {
                Ok(image) => {
                    result.preprocessed = true;
                    ocr = self.recognize(&image, format, cancel).await;
                }
                Err(e) => result
                    .warnings
                    .push(format!("Preprocessing for retry failed: {}", e)),
            }
        }

        let ocr_result = match ocr {
            Ok(ocr_result) => ocr_result,
            Err(e) => {
                self.failed(batch_id, Stage::Ocr, &e).await;
                return self.fail(result, started, Stage::Ocr, e);
            }
        };
        let text_is_empty = ocr_result.text.trim().is_empty();
        result.ocr_result = Some(ocr_result);
        if text_is_empty {
            self.failed(batch_id, Stage::Ocr, &PipelineError::NoText).await;
            return self.fail(result, started, Stage::Ocr, PipelineError::NoText);
        }
        self.completed(batch_id, Stage::Ocr).await;

        // Extract
        if cancel.is_cancelled() {
            return self.partial(result, started, Stage::Extract, PipelineError::Cancelled);
        }
        self.queue(batch_id, Stage::Extract).await;
        self.started(batch_id, Stage::Extract).await;

        let text = result
            .ocr_result
            .as_ref()
            .map(|o| o.text.clone())
            .unwrap_or_default();
        let extraction = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(PipelineError::Cancelled),
            extraction = self.extractor.extract(&text, extraction_type) => extraction,
        };

        match extraction {
            Ok(extraction) => {
                let malformed = extraction.parse_error.clone();
                let confidence = extraction.confidence_score;
                result.extracted_data = Some(extraction);

                if let Some(parse_error) = malformed {
                    let err = PipelineError::MalformedModelOutput(parse_error);
                    self.failed(batch_id, Stage::Extract, &err).await;
                    return self.partial(result, started, Stage::Extract, err);
                }

                self.completed(batch_id, Stage::Extract).await;
                if confidence <= self.config.pipeline.partial_threshold {
                    result.warnings.push(format!(
                        "Low extraction confidence: {:.2} (threshold {:.2})",
                        confidence, self.config.pipeline.partial_threshold
                    ));
                    return self.finish(result, started, PipelineStatus::Partial);
                }
                self.finish(result, started, PipelineStatus::Success)
            }
            Err(e) => {
                self.failed(batch_id, Stage::Extract, &e).await;
                if e == PipelineError::Cancelled {
                    self.partial(result, started, Stage::Extract, e)
                } else {
                    self.fail(result, started, Stage::Extract, e)
                }
            }
        }
    }

    async fn preprocess(&self, image: Arc<DynamicImage>) -> Result<DynamicImage, PipelineError> {
        let preprocessor = self.preprocessor.clone();
        tokio::task::spawn_blocking(move || preprocessor.preprocess(&image))
            .await
            .map_err(|e| PipelineError::InvalidImage(format!("Preprocessing task failed: {}", e)))?
    }

    async fn recognize(
        &self,
        image: &DynamicImage,
        format: Option<SourceFormat>,
        cancel: &CancellationToken,
    ) -> Result<OcrResult, PipelineError> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(PipelineError::Cancelled),
            ocr = self.text_extractor.extract_with_metadata(image, format) => ocr,
        }
    }

    /// Record `error` as fatal for the image.
    fn fail(
        &self,
        mut result: PipelineResult,
        started: Instant,
        stage: Stage,
        error: PipelineError,
    ) -> PipelineResult {
        tracing::warn!(image = %result.image_path, stage = %stage, error = %error, "Image failed");
        result.error = Some(ResultError::new(stage, &error));
        self.finish(result, started, PipelineStatus::Failed)
    }

    /// Record `error` while keeping the output gathered so far.
    fn partial(
        &self,
        mut result: PipelineResult,
        started: Instant,
        stage: Stage,
        error: PipelineError,
    ) -> PipelineResult {
        result.error = Some(ResultError::new(stage, &error));
        self.finish(result, started, PipelineStatus::Partial)
    }

    fn finish(
        &self,
        mut result: PipelineResult,
        started: Instant,
        status: PipelineStatus,
    ) -> PipelineResult {
        result.pipeline_status = status;
        result.duration_ms = started.elapsed().as_millis() as u64;
        tracing::info!(
            image = %result.image_path,
            status = ?status,
            duration_ms = result.duration_ms,
            "Image processed"
        );
        result
    }

    // Progress reporting

    async fn report(&self, update: ProgressUpdate) {
        if let Some(tracker) = &self.progress {
            tracker.apply(update).await;
        }
    }

    async fn begin(&self, batch_id: &str, images: usize) {
        if let Some(tracker) = &self.progress {
            tracker.begin(batch_id, images).await;
        }
    }

    async fn end(&self, batch_id: &str) {
        if let Some(tracker) = &self.progress {
            tracker.finish(batch_id).await;
        }
    }

    async fn queue(&self, batch_id: &str, stage: Stage) {
        self.report(ProgressUpdate::Queued {
            batch_id: batch_id.to_string(),
            stage,
        })
        .await;
    }

    async fn started(&self, batch_id: &str, stage: Stage) {
        self.report(ProgressUpdate::Started {
            batch_id: batch_id.to_string(),
            stage,
        })
        .await;
    }

    async fn completed(&self, batch_id: &str, stage: Stage) {
        self.report(ProgressUpdate::Completed {
            batch_id: batch_id.to_string(),
            stage,
        })
        .await;
    }

    async fn failed(&self, batch_id: &str, stage: Stage, error: &PipelineError) {
        self.report(ProgressUpdate::Failed {
            batch_id: batch_id.to_string(),
            stage,
            error: error.to_string(),
        })
        .await;
    }
}
