use std::path::{Path, PathBuf};

use chrono::{DateTime, Local, NaiveDate};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use lessonscan_core::{
    imaging, to_coursework, BatchProgress, Config, CourseWork, CourseWorkKind, ExtractionType,
    ImageInput, ImageValidation, OcrPipeline, PipelineResult, PipelineStatus,
};

use crate::error::{CommandError, CommandResult, ResultExt};

/// Output of `process`: one result for one image, an array otherwise
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum ProcessOutput {
    Single(PipelineResult),
    Batch(Vec<PipelineResult>),
}

impl ProcessOutput {
    pub fn results(&self) -> &[PipelineResult] {
        match self {
            ProcessOutput::Single(result) => std::slice::from_ref(result),
            ProcessOutput::Batch(results) => results,
        }
    }

    /// True when no image produced any usable output
    pub fn all_failed(&self) -> bool {
        self.results()
            .iter()
            .all(|r| r.pipeline_status == PipelineStatus::Failed)
    }
}

/// Supported extraction type, as listed by `types`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionTypeInfo {
    pub name: String,
    pub description: String,
}

/// Load config from `path`, or from the default location when none is given
pub fn load_config(path: Option<&Path>) -> CommandResult<Config> {
    let loaded = match path {
        Some(path) => {
            if !path.is_file() {
                return Err(CommandError::file_not_found(path.display().to_string()));
            }
            Config::load(path)
        }
        None => Config::load_or_default(),
    };
    loaded.map_err(|e| CommandError::config(format!("{:#}", e)))
}

/// Build the Tesseract + language model pipeline from config
pub fn build_pipeline(config: Config) -> CommandResult<OcrPipeline> {
    if config.provider.is_none() {
        return Err(CommandError::provider_not_configured(
            "No language model configured. Set GEMINI_API_KEY or ANTHROPIC_API_KEY, \
             or add a provider to the config file.",
        ));
    }
    Ok(OcrPipeline::from_config(config)?)
}

/// Process one or more images
pub async fn process(
    pipeline: &OcrPipeline,
    images: Vec<PathBuf>,
    extraction_type: ExtractionType,
    preprocess: bool,
    cancel: &CancellationToken,
) -> CommandResult<ProcessOutput> {
    let mut inputs: Vec<ImageInput> = images.into_iter().map(ImageInput::from).collect();

    if inputs.len() > 1 {
        let results = pipeline
            .process_batch_with_cancel(inputs, extraction_type, preprocess, cancel)
            .await;
        return Ok(ProcessOutput::Batch(results));
    }

    let input = inputs
        .pop()
        .ok_or_else(|| CommandError::invalid_argument("At least one image is required"))?;
    let result = pipeline
        .process_image_with_cancel(input, extraction_type, preprocess, cancel)
        .await;
    Ok(ProcessOutput::Single(result))
}

/// Log batch progress each time an image finishes.
///
/// The task ends once every tracker feeding `rx` is dropped and yields the
/// last snapshot it saw.
pub fn spawn_progress_reporter(
    mut rx: mpsc::Receiver<BatchProgress>,
) -> JoinHandle<Option<BatchProgress>> {
    tokio::spawn(async move {
        let mut last: Option<BatchProgress> = None;
        while let Some(progress) = rx.recv().await {
            let previously_finished = last.as_ref().map_or(0, |p| p.finished());
            if progress.finished() > previously_finished {
                tracing::info!(
                    batch_id = %progress.batch_id,
                    finished = progress.finished(),
                    images = progress.images,
                    succeeded = progress.succeeded,
                    partial = progress.partial,
                    failed = progress.failed,
                    "Batch progress"
                );
            }
            last = Some(progress);
        }
        last
    })
}

/// Write the process output as pretty JSON
pub fn write_output(output: &ProcessOutput, path: &Path) -> CommandResult<()> {
    let json = serde_json::to_string_pretty(output)?;
    std::fs::write(path, json).storage_err()?;
    tracing::info!(path = %path.display(), "Wrote results");
    Ok(())
}

/// Save each result as `{type}_{timestamp}.json` in `dir`.
///
/// Batches get a 1-based index suffix so files from the same second don't collide.
pub fn save_results(
    dir: &Path,
    extraction_type: ExtractionType,
    results: &[PipelineResult],
    now: DateTime<Local>,
) -> CommandResult<Vec<PathBuf>> {
    std::fs::create_dir_all(dir).storage_err()?;

    let timestamp = now.format("%Y%m%d_%H%M%S");
    let mut saved = Vec::with_capacity(results.len());

    for (i, result) in results.iter().enumerate() {
        let name = if results.len() == 1 {
            format!("{}_{}.json", extraction_type, timestamp)
        } else {
            format!("{}_{}_{}.json", extraction_type, timestamp, i + 1)
        };
        let path = dir.join(name);
        let json = serde_json::to_string_pretty(result)?;
        std::fs::write(&path, json).storage_err()?;
        tracing::debug!(image = %result.image_path, path = %path.display(), "Saved result");
        saved.push(path);
    }

    tracing::info!(dir = %dir.display(), count = saved.len(), "Saved results");
    Ok(saved)
}

/// Validate an image without running OCR
pub async fn validate(config: &Config, image: PathBuf) -> CommandResult<ImageValidation> {
    let limit = config.pipeline.large_file_warning_bytes;
    let input = ImageInput::from(image);
    tokio::task::spawn_blocking(move || imaging::validate_image(&input, limit))
        .await
        .internal_err()
}

/// List supported extraction types
pub fn types() -> Vec<ExtractionTypeInfo> {
    OcrPipeline::supported_extraction_types()
        .iter()
        .map(|t| ExtractionTypeInfo {
            name: t.as_str().to_string(),
            description: t.description().to_string(),
        })
        .collect()
}

/// Convert a saved pipeline result into a coursework payload
pub fn coursework(
    result_file: &Path,
    kind: CourseWorkKind,
    due_days: Option<u32>,
    today: NaiveDate,
) -> CommandResult<CourseWork> {
    let path_str = result_file.display().to_string();
    if !result_file.is_file() {
        return Err(CommandError::file_not_found(path_str));
    }

    let contents = std::fs::read_to_string(result_file).storage_err()?;
    let result: PipelineResult = serde_json::from_str(&contents)
        .map_err(|e| CommandError::invalid_result_file(path_str.clone(), e))?;

    let extracted = result
        .extracted_data
        .ok_or_else(CommandError::extracted_data_not_found)?;

    if extracted.extraction_type != ExtractionType::EducationalContent {
        tracing::warn!(
            path = %path_str,
            extraction_type = %extracted.extraction_type,
            "Result was not extracted as educational content; fields may be missing"
        );
    }

    Ok(to_coursework(&extracted.structured_data, kind, due_days, today))
}

#[cfg(test)]
mod tests;
