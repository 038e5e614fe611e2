//! Tesseract OCR engine
//!
//! Runs the `tesseract` executable with the image piped through stdin and
//! TSV output read from stdout, then rebuilds the page text from the word rows.

use std::io::Cursor;
use std::process::Stdio;

use async_trait::async_trait;
use image::{ColorType, DynamicImage};
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, warn};

use super::{BoundingBox, EngineOptions, OcrEngine, Recognition};
use crate::error::PipelineError;

/// stderr fragments that mean Tesseract could not read the image itself
const DECODE_FAILURE_MARKERS: &[&str] = &[
    "pixread",
    "cannot be read",
    "image file",
    "unsupported image",
    "error in pix",
];

/// TSV row level for words
const WORD_LEVEL: u32 = 5;

pub struct TesseractEngine {
    command: String,
}

impl TesseractEngine {
    /// Create an engine that runs `command` (name on PATH or absolute path)
    pub fn new(command: &str) -> Self {
        Self {
            command: command.to_string(),
        }
    }

    pub fn command(&self) -> &str {
        &self.command
    }

    /// Check if the executable can be started
    pub async fn is_available(&self) -> bool {
        Command::new(&self.command)
            .arg("--version")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await
            .map(|status| status.success())
            .unwrap_or(false)
    }

    fn build_command(&self, options: &EngineOptions) -> Command {
        let mut cmd = Command::new(&self.command);
        cmd.arg("stdin")
            .arg("stdout")
            .arg("-l")
            .arg(&options.language)
            .arg("--psm")
            .arg(options.page_segmentation_mode.to_string());
        if let Some(oem) = options.engine_mode {
            cmd.arg("--oem").arg(oem.to_string());
        }
        if let Some(dpi) = options.dpi {
            cmd.arg("--dpi").arg(dpi.to_string());
        }
        cmd.arg("tsv")
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        cmd
    }
}

#[async_trait]
impl OcrEngine for TesseractEngine {
    fn name(&self) -> &str {
        "tesseract"
    }

    async fn recognize(
        &self,
        image: &DynamicImage,
        options: &EngineOptions,
    ) -> Result<Recognition, PipelineError> {
        let png = encode_png(image)?;

        let mut child = self
            .build_command(options)
            .spawn()
            .map_err(|e| spawn_error(&self.command, e))?;

        let mut stdin = child.stdin.take().ok_or_else(|| {
            PipelineError::EngineUnavailable("tesseract stdin was not captured".to_string())
        })?;
        // Feed stdin concurrently so a full stdout pipe can't stall the child
        let writer = tokio::spawn(async move {
            stdin.write_all(&png).await?;
            stdin.shutdown().await
        });

        let output = child.wait_with_output().await.map_err(|e| {
            PipelineError::EngineUnavailable(format!("Failed to wait for tesseract: {}", e))
        })?;

        if let Ok(Err(e)) = writer.await {
            debug!("Writing image to tesseract failed: {}", e);
        }

        let stderr = String::from_utf8_lossy(&output.stderr);
        if !output.status.success() {
            return Err(exit_error(&output.status.to_string(), &stderr));
        }
        if !stderr.trim().is_empty() {
            debug!(stderr = %stderr.trim(), "tesseract diagnostics");
        }

        let tsv = String::from_utf8_lossy(&output.stdout);
        Ok(parse_tsv(&tsv))
    }
}

fn encode_png(image: &DynamicImage) -> Result<Vec<u8>, PipelineError> {
    let converted;
    let image = match image.color() {
        ColorType::L8 | ColorType::La8 | ColorType::Rgb8 | ColorType::Rgba8 => image,
        _ => {
            converted = DynamicImage::ImageRgba8(image.to_rgba8());
            &converted
        }
    };

    let mut buffer = Vec::new();
    image
        .write_to(&mut Cursor::new(&mut buffer), image::ImageFormat::Png)
        .map_err(|e| PipelineError::DecodeError(format!("Failed to encode image as PNG: {}", e)))?;
    Ok(buffer)
}

fn spawn_error(command: &str, err: std::io::Error) -> PipelineError {
    match err.kind() {
        std::io::ErrorKind::NotFound => PipelineError::EngineUnavailable(format!(
            "'{}' not found; is Tesseract installed and on PATH?",
            command
        )),
        std::io::ErrorKind::PermissionDenied => {
            PipelineError::EngineUnavailable(format!("'{}' is not executable", command))
        }
        _ => PipelineError::EngineUnavailable(format!("Failed to start '{}': {}", command, err)),
    }
}

fn exit_error(status: &str, stderr: &str) -> PipelineError {
    let detail = stderr.trim();
    let lower = detail.to_lowercase();
    if DECODE_FAILURE_MARKERS.iter().any(|m| lower.contains(m)) {
        PipelineError::DecodeError(detail.to_string())
    } else {
        warn!(status = %status, "tesseract failed");
        PipelineError::EngineUnavailable(format!("tesseract exited with {}: {}", status, detail))
    }
}

/// Parse Tesseract TSV output.
///
/// Columns: level, page_num, block_num, par_num, line_num, word_num, left,
/// top, width, height, conf, text. Only word rows with text and a
/// non-negative confidence are kept.
pub(crate) fn parse_tsv(tsv: &str) -> Recognition {
    let mut text = String::new();
    let mut words = Vec::new();
    let mut previous: Option<(u32, u32, u32, u32)> = None;

    for line in tsv.lines() {
        let columns: Vec<&str> = line.splitn(12, '\t').collect();
        if columns.len() < 12 {
            continue;
        }
        let number = |i: usize| columns[i].trim().parse::<u32>().ok();

        let Some(level) = number(0) else {
            continue; // header
        };
        if level != WORD_LEVEL {
            continue;
        }
        let word = columns[11].trim();
        let confidence = columns[10].trim().parse::<f32>().unwrap_or(-1.0);
        if word.is_empty() || confidence < 0.0 {
            continue;
        }

        let position = (
            number(1).unwrap_or(0),
            number(2).unwrap_or(0),
            number(3).unwrap_or(0),
            number(4).unwrap_or(0),
        );
        match previous {
            None => {}
            Some((page, block, par, _)) if (page, block, par) != (position.0, position.1, position.2) => {
                text.push_str("\n\n")
            }
            Some((_, _, _, line_num)) if line_num != position.3 => text.push('\n'),
            Some(_) => text.push(' '),
        }
        text.push_str(word);
        previous = Some(position);

        words.push(BoundingBox {
            text: word.to_string(),
            left: number(6).unwrap_or(0),
            top: number(7).unwrap_or(0),
            width: number(8).unwrap_or(0),
            height: number(9).unwrap_or(0),
            confidence: (confidence / 100.0).clamp(0.0, 1.0),
        });
    }

    Recognition { text, words }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GrayImage, Luma};

    const HEADER: &str =
        "level\tpage_num\tblock_num\tpar_num\tline_num\tword_num\tleft\ttop\twidth\theight\tconf\ttext";

    fn row(level: u32, block: u32, par: u32, line: u32, word: u32, conf: &str, text: &str) -> String {
        format!(
            "{}\t1\t{}\t{}\t{}\t{}\t{}\t20\t30\t12\t{}\t{}",
            level,
            block,
            par,
            line,
            word,
            word * 40,
            conf,
            text
        )
    }

    #[test]
    fn test_parse_tsv_rebuilds_layout() {
        let tsv = [
            HEADER.to_string(),
            row(1, 0, 0, 0, 0, "-1", ""),
            row(4, 1, 1, 1, 0, "-1", ""),
            row(5, 1, 1, 1, 1, "96.5", "Math"),
            row(5, 1, 1, 1, 2, "91", "Quiz"),
            row(5, 1, 1, 2, 1, "88", "Name:"),
            row(5, 2, 1, 1, 1, "90", "1."),
            row(5, 2, 1, 1, 2, "93", "2+2=?"),
        ]
        .join("\n");

        let recognition = parse_tsv(&tsv);

        assert_eq!(recognition.text, "Math Quiz\nName:\n\n1. 2+2=?");
        assert_eq!(recognition.words.len(), 5);
        assert_eq!(recognition.words[0].text, "Math");
        assert_eq!(recognition.words[0].left, 40);
        assert!((recognition.words[0].confidence - 0.965).abs() < 1e-6);
    }

    #[test]
    fn test_parse_tsv_skips_blank_and_unconfident_words() {
        let tsv = [
            HEADER.to_string(),
            row(5, 1, 1, 1, 1, "-1", "ghost"),
            row(5, 1, 1, 1, 2, "80", "   "),
            row(5, 1, 1, 1, 3, "80", "kept"),
        ]
        .join("\n");

        let recognition = parse_tsv(&tsv);
        assert_eq!(recognition.text, "kept");
        assert_eq!(recognition.words.len(), 1);
    }

    #[test]
    fn test_parse_tsv_blank_page() {
        let tsv = format!("{}\n{}\n", HEADER, row(1, 0, 0, 0, 0, "-1", ""));
        assert_eq!(parse_tsv(&tsv), Recognition::default());
    }

    #[test]
    fn test_exit_error_classification() {
        let decode = exit_error("exit status: 1", "Error in pixReadStream: Unknown format: no pix returned");
        assert!(matches!(decode, PipelineError::DecodeError(_)));

        let missing_lang = exit_error(
            "exit status: 1",
            "Failed loading language 'xyz'\nTesseract couldn't load any languages!",
        );
        assert!(matches!(missing_lang, PipelineError::EngineUnavailable(_)));
    }

    #[test]
    fn test_command_arguments() {
        let engine = TesseractEngine::new("tesseract");
        let options = EngineOptions {
            language: "eng+fra".to_string(),
            page_segmentation_mode: 6,
            engine_mode: Some(1),
            dpi: Some(300),
        };
        let cmd = engine.build_command(&options);
        let args: Vec<String> = cmd
            .as_std()
            .get_args()
            .map(|a| a.to_string_lossy().into_owned())
            .collect();

        assert_eq!(
            args,
            [
                "stdin", "stdout", "-l", "eng+fra", "--psm", "6", "--oem", "1", "--dpi", "300",
                "tsv"
            ]
        );
    }

    #[test]
    fn test_encode_png_handles_wide_pixels() {
        let img = DynamicImage::ImageRgb32F(image::Rgb32FImage::new(4, 4));
        let png = encode_png(&img).unwrap();
        assert!(png.starts_with(b"\x89PNG"));

        let gray = DynamicImage::ImageLuma8(GrayImage::from_pixel(4, 4, Luma([10])));
        assert!(encode_png(&gray).is_ok());
    }

    #[tokio::test]
    async fn test_missing_executable_is_engine_unavailable() {
        let engine = TesseractEngine::new("/nonexistent/bin/tesseract-lessonscan");
        let image = DynamicImage::ImageLuma8(GrayImage::from_pixel(8, 8, Luma([255])));

        let err = engine
            .recognize(&image, &EngineOptions::default())
            .await
            .unwrap_err();

        assert!(matches!(err, PipelineError::EngineUnavailable(_)));
        assert!(!engine.is_available().await);
    }
}
