//! OCR-oriented image preprocessing.
//!
//! Steps, in order: grayscale, resize into the configured resolution band,
//! linear contrast stretch, unsharp mask, Otsu binarization. With the default
//! configuration the output is a two-level image whose longest side lies in
//! the band, so running it through again changes nothing.

use image::imageops::{self, FilterType};
use image::{DynamicImage, GrayImage};
use imageproc::contrast::{otsu_level, threshold_mut, ThresholdType};
use tracing::debug;

use super::ImageInput;
use crate::config::PreprocessConfig;
use crate::error::PipelineError;

#[derive(Debug, Clone, Default)]
pub struct Preprocessor {
    config: PreprocessConfig,
}

impl Preprocessor {
    pub fn new(config: PreprocessConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &PreprocessConfig {
        &self.config
    }

    /// Decode an input and preprocess it
    pub fn preprocess_input(&self, input: &ImageInput) -> Result<DynamicImage, PipelineError> {
        let decoded = input.decode()?;
        self.preprocess(&decoded.image)
    }

    /// Preprocess a decoded image. The result is always 8-bit grayscale.
    pub fn preprocess(&self, image: &DynamicImage) -> Result<DynamicImage, PipelineError> {
        if image.width() == 0 || image.height() == 0 {
            return Err(PipelineError::InvalidImage(
                "Image has zero width or height".to_string(),
            ));
        }

        let mut gray = self.resize_into_band(image.to_luma8());

        if self.config.stretch_contrast {
            stretch_contrast(&mut gray);
        }

        if self.config.sharpen_sigma > 0.0 {
            gray = imageops::unsharpen(
                &gray,
                self.config.sharpen_sigma,
                self.config.sharpen_threshold,
            );
        }

        if self.config.binarize {
            binarize(&mut gray);
        }

        Ok(DynamicImage::ImageLuma8(gray))
    }

    fn resize_into_band(&self, gray: GrayImage) -> GrayImage {
        let max_side = self.config.max_long_side.max(1);
        let min_side = self.config.min_long_side.min(max_side);
        let (width, height) = gray.dimensions();
        let long_side = width.max(height);

        let target = if long_side < min_side {
            min_side
        } else if long_side > max_side {
            max_side
        } else {
            return gray;
        };

        let scale = target as f64 / long_side as f64;
        let new_width = ((width as f64 * scale).round() as u32).max(1);
        let new_height = ((height as f64 * scale).round() as u32).max(1);
        debug!(
            from = %format!("{}x{}", width, height),
            to = %format!("{}x{}", new_width, new_height),
            "Resizing for OCR"
        );
        imageops::resize(&gray, new_width, new_height, FilterType::Lanczos3)
    }
}

/// Min and max luminance
fn luminance_range(image: &GrayImage) -> (u8, u8) {
    image
        .pixels()
        .fold((u8::MAX, u8::MIN), |(lo, hi), p| (lo.min(p[0]), hi.max(p[0])))
}

fn stretch_contrast(image: &mut GrayImage) {
    let (lo, hi) = luminance_range(image);
    if hi <= lo || (lo == 0 && hi == u8::MAX) {
        return;
    }

    let range = (hi - lo) as f32;
    for pixel in image.pixels_mut() {
        let stretched = (pixel[0] - lo) as f32 * 255.0 / range;
        pixel[0] = stretched.round().clamp(0.0, 255.0) as u8;
    }
}

fn binarize(image: &mut GrayImage) {
    let (lo, hi) = luminance_range(image);
    if hi <= lo {
        return;
    }
    let level = otsu_level(image);
    threshold_mut(image, level, ThresholdType::Binary);
}
