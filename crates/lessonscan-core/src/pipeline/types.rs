//! Pipeline result types and progress events.

use serde::{Deserialize, Serialize};

use crate::error::{ErrorKind, PipelineError};
use crate::extract::ExtractionResult;
use crate::ocr::OcrResult;

/// Processing stage in the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Validate,
    Preprocess,
    Ocr,
    Extract,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Stage::Validate => write!(f, "validate"),
            Stage::Preprocess => write!(f, "preprocess"),
            Stage::Ocr => write!(f, "ocr"),
            Stage::Extract => write!(f, "extract"),
        }
    }
}

/// Terminal state of one image
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PipelineStatus {
    /// OCR and extraction both produced usable output
    Success,
    /// Some output is usable (OCR text, or low-confidence/malformed extraction)
    Partial,
    Failed,
}

/// The error that decided a result's status
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultError {
    pub kind: ErrorKind,
    pub stage: Stage,
    pub message: String,
}

impl ResultError {
    pub fn new(stage: Stage, error: &PipelineError) -> Self {
        Self {
            kind: error.kind(),
            stage,
            message: error.to_string(),
        }
    }
}

/// Aggregate outcome of processing one image.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineResult {
    pub image_path: String,
    /// Whether OCR ran on a preprocessed image
    pub preprocessed: bool,
    pub pipeline_status: PipelineStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ocr_result: Option<OcrResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extracted_data: Option<ExtractionResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ResultError>,
    #[serde(default)]
    pub warnings: Vec<String>,
    pub duration_ms: u64,
}

impl PipelineResult {
    pub(crate) fn new(image_path: String) -> Self {
        Self {
            image_path,
            preprocessed: false,
            pipeline_status: PipelineStatus::Failed,
            ocr_result: None,
            extracted_data: None,
            error: None,
            warnings: Vec::new(),
            duration_ms: 0,
        }
    }

    pub fn is_success(&self) -> bool {
        self.pipeline_status == PipelineStatus::Success
    }

    pub fn error_kind(&self) -> Option<ErrorKind> {
        self.error.as_ref().map(|e| e.kind)
    }
}

/// Progress update from the pipeline.
#[derive(Debug, Clone)]
pub enum ProgressUpdate {
    /// Image entered a stage (-> pending).
    Queued { batch_id: String, stage: Stage },
    /// Stage started (pending -> active).
    Started { batch_id: String, stage: Stage },
    /// Stage completed successfully (active -> completed).
    Completed { batch_id: String, stage: Stage },
    /// Stage failed (active -> failed).
    Failed {
        batch_id: String,
        stage: Stage,
        error: String,
    },
    /// Image reached a terminal status.
    Finished {
        batch_id: String,
        status: PipelineStatus,
    },
}

impl ProgressUpdate {
    pub fn batch_id(&self) -> &str {
        match self {
            ProgressUpdate::Queued { batch_id, .. }
            | ProgressUpdate::Started { batch_id, .. }
            | ProgressUpdate::Completed { batch_id, .. }
            | ProgressUpdate::Failed { batch_id, .. }
            | ProgressUpdate::Finished { batch_id, .. } => batch_id,
        }
    }
}
