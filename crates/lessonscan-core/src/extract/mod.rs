//! Structured data extraction from OCR text
//!
//! Each [`ExtractionType`] maps to a static schema. The schema renders the
//! prompt, and the model's reply is parsed, repaired once if needed, padded
//! with defaults for missing fields and scored.
//!
//! The confidence score is a heuristic, not a calibrated probability:
//! `clamp01((1 - w) * completeness + w * self_assessment)`, where
//! completeness is the share of schema fields with content and `w` is
//! [`ExtractionConfig::self_assessment_weight`].

mod parse;
pub mod schema;

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::config::ExtractionConfig;
use crate::error::PipelineError;
use crate::llm::{CompletionProvider, CompletionRequest};

pub use schema::{ExtractionSchema, FieldKind, SchemaField};

/// Extracted record keyed by schema field names
pub type StructuredData = Map<String, Value>;

const SYSTEM_INSTRUCTION: &str = "You extract structured data from OCR text of \
scanned educational documents. You reply with a single JSON object and nothing else.";

/// What kind of document the text came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractionType {
    EducationalContent,
    FormData,
    StudentWork,
    General,
}

impl ExtractionType {
    pub const ALL: [ExtractionType; 4] = [
        ExtractionType::EducationalContent,
        ExtractionType::FormData,
        ExtractionType::StudentWork,
        ExtractionType::General,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ExtractionType::EducationalContent => "educational_content",
            ExtractionType::FormData => "form_data",
            ExtractionType::StudentWork => "student_work",
            ExtractionType::General => "general",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            ExtractionType::EducationalContent => {
                "Worksheets, quizzes and notes: title, subject, topics, questions, answers"
            }
            ExtractionType::FormData => "Forms: form type, field values, checkboxes, dates, signatures",
            ExtractionType::StudentWork => {
                "Student submissions: name, assignment, responses, score, feedback"
            }
            ExtractionType::General => "Anything else: main content, key points, named entities",
        }
    }

    /// Parse a type name, falling back to `general` for unknown names.
    pub fn parse(name: &str) -> Self {
        let normalized = name.trim().to_ascii_lowercase().replace('-', "_");
        match normalized.as_str() {
            "educational_content" => ExtractionType::EducationalContent,
            "form_data" => ExtractionType::FormData,
            "student_work" => ExtractionType::StudentWork,
            "general" => ExtractionType::General,
            _ => {
                warn!(requested = %name, "Unknown extraction type, using general");
                ExtractionType::General
            }
        }
    }
}

impl std::fmt::Display for ExtractionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Output of one extraction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractionResult {
    pub structured_data: StructuredData,
    pub confidence_score: f64,
    pub extraction_type: ExtractionType,
    /// Schema fields absent from the reply (filled with defaults)
    pub missing_fields: Vec<String>,
    /// Schema fields present in the reply but without content
    pub empty_fields: Vec<String>,
    pub raw_response: String,
    pub raw_text_length: usize,
    /// Set when the reply could not be parsed as a JSON object
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parse_error: Option<String>,
}

impl ExtractionResult {
    pub fn is_malformed(&self) -> bool {
        self.parse_error.is_some()
    }
}

/// Calls the language model once per text and shapes the reply.
#[derive(Clone)]
pub struct StructuredExtractor {
    provider: Arc<dyn CompletionProvider>,
    config: ExtractionConfig,
}

impl StructuredExtractor {
    pub fn new(provider: Arc<dyn CompletionProvider>, config: ExtractionConfig) -> Self {
        Self { provider, config }
    }

    pub fn provider(&self) -> &dyn CompletionProvider {
        self.provider.as_ref()
    }

    /// Extract a structured record from `text`.
    ///
    /// Provider errors and timeouts are `ModelUnavailable`. A reply that is
    /// not a JSON object is still `Ok`, with `parse_error` set and empty data.
    pub async fn extract(
        &self,
        text: &str,
        extraction_type: ExtractionType,
    ) -> Result<ExtractionResult, PipelineError> {
        let schema = ExtractionSchema::for_type(extraction_type);
        let prompt_text = self.truncate(text);
        let request = CompletionRequest::new(schema.render_prompt(prompt_text))
            .with_system(SYSTEM_INSTRUCTION)
            .with_max_tokens(self.config.max_tokens);

        debug!(
            provider = self.provider.provider_name(),
            model = self.provider.model_id(),
            extraction_type = %extraction_type,
            "Requesting structured extraction"
        );

        let raw_response = match tokio::time::timeout(
            self.config.model_timeout(),
            self.provider.complete(&request),
        )
        .await
        {
            Ok(Ok(reply)) => reply,
            Ok(Err(e)) => return Err(PipelineError::ModelUnavailable(format!("{:#}", e))),
            Err(_) => {
                return Err(PipelineError::ModelUnavailable(format!(
                    "no reply within {}s",
                    self.config.model_timeout_secs
                )))
            }
        };

        Ok(self.shape(raw_response, text.chars().count(), schema))
    }

    fn truncate<'a>(&self, text: &'a str) -> &'a str {
        let limit = self.config.max_prompt_chars;
        match text.char_indices().nth(limit) {
            Some((cut, _)) => {
                warn!(
                    chars = text.chars().count(),
                    limit, "OCR text truncated before prompting"
                );
                &text[..cut]
            }
            None => text,
        }
    }

    fn shape(
        &self,
        raw_response: String,
        raw_text_length: usize,
        schema: &ExtractionSchema,
    ) -> ExtractionResult {
        let mut object = match parse::parse_object(&raw_response) {
            Ok(object) => object,
            Err(parse_error) => {
                warn!(error = %parse_error, "Model reply is not a JSON object");
                return ExtractionResult {
                    structured_data: Map::new(),
                    confidence_score: 0.0,
                    extraction_type: schema.extraction_type,
                    missing_fields: Vec::new(),
                    empty_fields: Vec::new(),
                    raw_response,
                    raw_text_length,
                    parse_error: Some(parse_error),
                };
            }
        };

        let self_score = parse::take_self_assessment(&mut object);
        let report = parse::fill_defaults(&mut object, schema);
        let confidence_score = parse::confidence_score(
            report.completeness(),
            self_score,
            self.config.self_assessment_weight,
        );

        debug!(
            confidence = confidence_score,
            missing = report.missing.len(),
            empty = report.empty.len(),
            "Extraction scored"
        );

        ExtractionResult {
            structured_data: object,
            confidence_score,
            extraction_type: schema.extraction_type,
            missing_fields: report.missing,
            empty_fields: report.empty,
            raw_response,
            raw_text_length,
            parse_error: None,
        }
    }
}
