//! Lessonscan Core - OCR-to-structured-data pipeline for educational documents
//!
//! This crate contains the processing logic behind the `lessonscan` CLI:
//! - Image validation and OCR-oriented preprocessing (image, imageproc)
//! - Text recognition through the Tesseract executable
//! - Structured extraction through a remote language model (Gemini, Anthropic)
//! - The pipeline orchestrator with per-stage progress tracking
//! - Classroom coursework payloads built from extracted content

pub mod config;
pub mod coursework;
pub mod error;
pub mod extract;
pub mod imaging;
pub mod llm;
pub mod ocr;
pub mod pipeline;

pub use config::Config;
pub use coursework::{to_coursework, CourseWork, CourseWorkKind, DueDate};
pub use error::{ErrorKind, PipelineError};
pub use extract::{ExtractionResult, ExtractionType, StructuredData, StructuredExtractor};
pub use imaging::{ImageInput, ImageValidation, Preprocessor, SourceFormat};
pub use llm::{CompletionProvider, CompletionRequest, ProviderConfig};
pub use ocr::{OcrEngine, OcrResult, TextExtractor};
pub use pipeline::{
    BatchProgress, OcrPipeline, PipelineResult, PipelineStatus, ProgressTracker, Stage,
};
