//! Image loading and validation.
//!
//! Images reach the pipeline either as a file path or as an in-memory byte
//! buffer. Both are decoded with the `image` crate; anything that does not
//! decode to a raster with non-zero dimensions is an invalid image.

pub mod preprocess;

use std::io::{BufRead, Cursor, Seek};
use std::path::{Path, PathBuf};

use image::{DynamicImage, ImageReader};
use serde::{Deserialize, Serialize};

use crate::error::PipelineError;

pub use preprocess::Preprocessor;

/// Raster formats the pipeline accepts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceFormat {
    Png,
    Jpeg,
    Tiff,
    Bmp,
    Gif,
}

impl SourceFormat {
    /// Parse a file extension (case-insensitive, without the dot)
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "png" => Some(SourceFormat::Png),
            "jpg" | "jpeg" => Some(SourceFormat::Jpeg),
            "tif" | "tiff" => Some(SourceFormat::Tiff),
            "bmp" => Some(SourceFormat::Bmp),
            "gif" => Some(SourceFormat::Gif),
            _ => None,
        }
    }

    /// Guess the format from a path's extension
    pub fn from_path(path: &Path) -> Option<Self> {
        path.extension()
            .and_then(|ext| ext.to_str())
            .and_then(Self::from_extension)
    }

    fn to_image_format(self) -> image::ImageFormat {
        match self {
            SourceFormat::Png => image::ImageFormat::Png,
            SourceFormat::Jpeg => image::ImageFormat::Jpeg,
            SourceFormat::Tiff => image::ImageFormat::Tiff,
            SourceFormat::Bmp => image::ImageFormat::Bmp,
            SourceFormat::Gif => image::ImageFormat::Gif,
        }
    }

    fn from_image_format(format: image::ImageFormat) -> Option<Self> {
        match format {
            image::ImageFormat::Png => Some(SourceFormat::Png),
            image::ImageFormat::Jpeg => Some(SourceFormat::Jpeg),
            image::ImageFormat::Tiff => Some(SourceFormat::Tiff),
            image::ImageFormat::Bmp => Some(SourceFormat::Bmp),
            image::ImageFormat::Gif => Some(SourceFormat::Gif),
            _ => None,
        }
    }
}

impl std::fmt::Display for SourceFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SourceFormat::Png => write!(f, "png"),
            SourceFormat::Jpeg => write!(f, "jpeg"),
            SourceFormat::Tiff => write!(f, "tiff"),
            SourceFormat::Bmp => write!(f, "bmp"),
            SourceFormat::Gif => write!(f, "gif"),
        }
    }
}

/// An image handed to the pipeline
#[derive(Debug, Clone)]
pub enum ImageInput {
    /// Image file on disk
    Path(PathBuf),
    /// Encoded image bytes, optionally with a declared format
    Bytes {
        data: Vec<u8>,
        format: Option<SourceFormat>,
    },
}

impl ImageInput {
    pub fn path(path: impl Into<PathBuf>) -> Self {
        ImageInput::Path(path.into())
    }

    pub fn bytes(data: Vec<u8>, format: Option<SourceFormat>) -> Self {
        ImageInput::Bytes { data, format }
    }

    /// Name used in logs and in `PipelineResult::image_path`
    pub fn display_name(&self) -> String {
        match self {
            ImageInput::Path(path) => path.display().to_string(),
            ImageInput::Bytes { .. } => "<memory>".to_string(),
        }
    }

    /// Format declared by the caller (explicitly, or via the file extension)
    pub fn declared_format(&self) -> Option<SourceFormat> {
        match self {
            ImageInput::Path(path) => SourceFormat::from_path(path),
            ImageInput::Bytes { format, .. } => *format,
        }
    }

    /// Decode the input into a raster image.
    pub fn decode(&self) -> Result<DecodedImage, PipelineError> {
        match self {
            ImageInput::Path(path) => {
                let reader = ImageReader::open(path)
                    .and_then(|r| r.with_guessed_format())
                    .map_err(|e| {
                        PipelineError::InvalidImage(format!(
                            "Cannot open {}: {}",
                            path.display(),
                            e
                        ))
                    })?;
                decode_reader(reader)
            }
            ImageInput::Bytes { data, format } => {
                if data.is_empty() {
                    return Err(PipelineError::InvalidImage(
                        "Image data is empty".to_string(),
                    ));
                }
                let mut reader = ImageReader::new(Cursor::new(data.as_slice()));
                match format {
                    Some(format) => reader.set_format(format.to_image_format()),
                    None => {
                        reader = reader.with_guessed_format().map_err(|e| {
                            PipelineError::InvalidImage(format!("Cannot read image data: {}", e))
                        })?;
                    }
                }
                decode_reader(reader)
            }
        }
    }
}

impl From<PathBuf> for ImageInput {
    fn from(path: PathBuf) -> Self {
        ImageInput::Path(path)
    }
}

impl From<&Path> for ImageInput {
    fn from(path: &Path) -> Self {
        ImageInput::Path(path.to_path_buf())
    }
}

impl From<&str> for ImageInput {
    fn from(path: &str) -> Self {
        ImageInput::Path(PathBuf::from(path))
    }
}

fn decode_reader<R: BufRead + Seek>(reader: ImageReader<R>) -> Result<DecodedImage, PipelineError> {
    let format = reader.format().and_then(SourceFormat::from_image_format);
    let image = reader
        .decode()
        .map_err(|e| PipelineError::InvalidImage(format!("Cannot decode image: {}", e)))?;

    if image.width() == 0 || image.height() == 0 {
        return Err(PipelineError::InvalidImage(
            "Image has zero width or height".to_string(),
        ));
    }

    let info = ImageInfo::describe(&image, format);
    Ok(DecodedImage { image, info })
}

/// Basic facts about a decoded image
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageInfo {
    pub width: u32,
    pub height: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub format: Option<SourceFormat>,
    pub color_type: String,
}

impl ImageInfo {
    pub fn describe(image: &DynamicImage, format: Option<SourceFormat>) -> Self {
        Self {
            width: image.width(),
            height: image.height(),
            format,
            color_type: format!("{:?}", image.color()),
        }
    }
}

/// A successfully decoded image plus its description
#[derive(Debug, Clone)]
pub struct DecodedImage {
    pub image: DynamicImage,
    pub info: ImageInfo,
}

/// Outcome of validating an image before processing
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageValidation {
    pub valid: bool,
    /// First error, when invalid
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_info: Option<ImageInfo>,
}

impl ImageValidation {
    fn reject(mut self, error: String) -> Self {
        if self.reason.is_none() {
            self.reason = Some(error.clone());
        }
        self.errors.push(error);
        self.valid = false;
        self
    }
}

/// Validation result plus the decoded image, so callers don't decode twice.
#[derive(Debug)]
pub struct Inspection {
    pub validation: ImageValidation,
    pub decoded: Option<DecodedImage>,
}

/// Validate an image: existence, extension, size, and that it decodes.
///
/// Files larger than `large_file_warning_bytes` are accepted with a warning.
pub fn inspect(input: &ImageInput, large_file_warning_bytes: u64) -> Inspection {
    let mut validation = ImageValidation::default();

    let size = match input {
        ImageInput::Path(path) => {
            let metadata = match std::fs::metadata(path) {
                Ok(m) => m,
                Err(_) => {
                    return Inspection {
                        validation: validation.reject("File does not exist".to_string()),
                        decoded: None,
                    };
                }
            };
            if !metadata.is_file() {
                return Inspection {
                    validation: validation.reject("Path is not a file".to_string()),
                    decoded: None,
                };
            }
            if SourceFormat::from_path(path).is_none() {
                let ext = path
                    .extension()
                    .map(|e| format!(".{}", e.to_string_lossy()))
                    .unwrap_or_else(|| "(none)".to_string());
                validation
                    .warnings
                    .push(format!("File extension {} may not be supported", ext));
            }
            metadata.len()
        }
        ImageInput::Bytes { data, .. } => data.len() as u64,
    };

    if size > large_file_warning_bytes {
        validation.warnings.push(format!(
            "Large file size: {:.1}MB may slow processing",
            size as f64 / (1024.0 * 1024.0)
        ));
    }

    match input.decode() {
        Ok(decoded) => {
            validation.valid = true;
            validation.image_info = Some(decoded.info.clone());
            Inspection {
                validation,
                decoded: Some(decoded),
            }
        }
        Err(e) => Inspection {
            validation: validation.reject(e.to_string()),
            decoded: None,
        },
    }
}

/// Validate an image without keeping the decoded pixels.
pub fn validate_image(input: &ImageInput, large_file_warning_bytes: u64) -> ImageValidation {
    inspect(input, large_file_warning_bytes).validation
}
