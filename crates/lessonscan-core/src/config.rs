use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::llm::ProviderConfig;

/// Pipeline configuration
///
/// Loaded once with [`Config::load`] and handed to the pipeline in an `Arc`.
/// Every section falls back to its defaults when absent from the file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub ocr: OcrConfig,
    pub preprocess: PreprocessConfig,
    pub extraction: ExtractionConfig,
    pub pipeline: PipelineConfig,
    /// Language model used for structured extraction (None = not configured)
    pub provider: Option<ProviderConfig>,
}

/// Tesseract settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OcrConfig {
    /// Executable to run (name on PATH or absolute path)
    pub tesseract_cmd: String,
    pub language: String,
    /// Page segmentation mode (3 = fully automatic)
    pub page_segmentation_mode: u8,
    pub engine_mode: Option<u8>,
    pub dpi: Option<u32>,
    pub timeout_secs: u64,
}

impl Default for OcrConfig {
    fn default() -> Self {
        Self {
            tesseract_cmd: "tesseract".to_string(),
            language: "eng".to_string(),
            page_segmentation_mode: 3,
            engine_mode: None,
            dpi: None,
            timeout_secs: 60,
        }
    }
}

impl OcrConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PreprocessConfig {
    pub min_long_side: u32,
    pub max_long_side: u32,
    pub stretch_contrast: bool,
    /// Gaussian sigma of the unsharp mask; 0 disables sharpening
    pub sharpen_sigma: f32,
    pub sharpen_threshold: i32,
    pub binarize: bool,
}

impl Default for PreprocessConfig {
    fn default() -> Self {
        Self {
            min_long_side: 1000,
            max_long_side: 3500,
            stretch_contrast: true,
            sharpen_sigma: 1.0,
            sharpen_threshold: 3,
            binarize: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractionConfig {
    /// Weight of the model's self-assessment in the confidence score
    pub self_assessment_weight: f64,
    pub model_timeout_secs: u64,
    /// OCR text longer than this is truncated before prompting
    pub max_prompt_chars: usize,
    pub max_tokens: u32,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            self_assessment_weight: 0.3,
            model_timeout_secs: 90,
            max_prompt_chars: 20_000,
            max_tokens: 4096,
        }
    }
}

impl ExtractionConfig {
    pub fn model_timeout(&self) -> Duration {
        Duration::from_secs(self.model_timeout_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub batch_concurrency: usize,
    /// Results with confidence at or below this are `partial`
    pub partial_threshold: f64,
    pub large_file_warning_bytes: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            batch_concurrency: 4,
            partial_threshold: 0.0,
            large_file_warning_bytes: 10 * 1024 * 1024,
        }
    }
}

impl Config {
    /// Default location: `<config dir>/lessonscan/config.json`
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("lessonscan")
            .join("config.json")
    }

    /// Load configuration from a JSON file, then apply environment overrides.
    ///
    /// A missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self> {
        let mut config = if path.exists() {
            let contents = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file {}", path.display()))?;
            serde_json::from_str(&contents)
                .with_context(|| format!("Failed to parse config file {}", path.display()))?
        } else {
            tracing::debug!(path = %path.display(), "No config file, using defaults");
            Config::default()
        };
        config.apply_env();
        Ok(config)
    }

    /// Load from [`Config::default_path`]
    pub fn load_or_default() -> Result<Self> {
        Self::load(&Self::default_path())
    }

    pub fn apply_env(&mut self) {
        self.apply_env_from(|key| std::env::var(key).ok());
    }

    /// Apply overrides from a variable lookup.
    ///
    /// Recognized variables: `GEMINI_API_KEY` (or `GOOGLE_API_KEY`),
    /// `ANTHROPIC_API_KEY`, `LESSONSCAN_MODEL` and `TESSERACT_CMD`.
    /// An API key only selects a provider when none is configured.
    pub fn apply_env_from<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let lookup = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(cmd) = lookup("TESSERACT_CMD") {
            self.ocr.tesseract_cmd = cmd;
        }

        let gemini_key = lookup("GEMINI_API_KEY").or_else(|| lookup("GOOGLE_API_KEY"));
        let anthropic_key = lookup("ANTHROPIC_API_KEY");

        match &mut self.provider {
            Some(ProviderConfig::Gemini { api_key, .. }) => {
                if let Some(key) = gemini_key {
                    *api_key = key;
                }
            }
            Some(ProviderConfig::Anthropic { api_key, .. }) => {
                if let Some(key) = anthropic_key {
                    *api_key = key;
                }
            }
            None => {
                self.provider = if let Some(key) = gemini_key {
                    Some(ProviderConfig::gemini(key))
                } else {
                    anthropic_key.map(ProviderConfig::anthropic)
                };
            }
        }

        if let (Some(model), Some(provider)) = (lookup("LESSONSCAN_MODEL"), &mut self.provider) {
            provider.set_model(model);
        }
    }
}
