use super::*;
use std::sync::Arc;

use chrono::TimeZone;
use image::{GrayImage, Luma};
use lessonscan_core::llm::MockProvider;
use lessonscan_core::ocr::MockOcrEngine;
use serde_json::json;

/// Create a white test page with one dark line of "text"
fn write_page(dir: &Path, name: &str) -> PathBuf {
    let img = GrayImage::from_fn(120, 60, |x, y| {
        if (10..110).contains(&x) && (25..35).contains(&y) {
            Luma([10])
        } else {
            Luma([245])
        }
    });
    let path = dir.join(name);
    img.save(&path).unwrap();
    path
}

/// Create a pipeline backed by mocks
fn create_test_pipeline(text: &str, reply: serde_json::Value) -> OcrPipeline {
    OcrPipeline::new(
        Arc::new(Config::default()),
        Arc::new(MockOcrEngine::with_text(text)),
        Arc::new(MockProvider::reply(reply.to_string())),
    )
}

fn quiz_reply() -> serde_json::Value {
    json!({
        "title": "Fractions",
        "subject": "Mathematics",
        "topics": ["halves", "quarters"],
        "questions": ["1/2 + 1/4 = ?", "3/4 - 1/2 = ?"],
        "answers": ["3/4", "1/4"],
        "difficultyLevel": "easy",
        "contentType": "quiz",
        "pageNumber": 1,
        "confidence": 0.9
    })
}

// ============================================================================
// Process Command Tests
// ============================================================================

#[tokio::test]
async fn test_process_single_image() {
    let temp_dir = tempfile::tempdir().unwrap();
    let image = write_page(temp_dir.path(), "quiz.png");
    let pipeline = create_test_pipeline("Fractions quiz", quiz_reply());

    let output = process(
        &pipeline,
        vec![image],
        ExtractionType::EducationalContent,
        false,
        &CancellationToken::new(),
    )
    .await
    .unwrap();

    let ProcessOutput::Single(result) = &output else {
        panic!("expected a single result");
    };
    assert_eq!(result.pipeline_status, PipelineStatus::Success);
    assert!(!output.all_failed());

    // Single results serialize as an object, not an array
    let json = serde_json::to_value(&output).unwrap();
    assert_eq!(json["pipelineStatus"], "success");
}

#[tokio::test]
async fn test_process_batch_keeps_order() {
    let temp_dir = tempfile::tempdir().unwrap();
    let first = write_page(temp_dir.path(), "a.png");
    let missing = temp_dir.path().join("missing.png");
    let pipeline = create_test_pipeline("Fractions quiz", quiz_reply());

    let output = process(
        &pipeline,
        vec![first.clone(), missing.clone()],
        ExtractionType::EducationalContent,
        false,
        &CancellationToken::new(),
    )
    .await
    .unwrap();

    let results = output.results();
    assert_eq!(results.len(), 2);
    assert_eq!(results[0].image_path, first.display().to_string());
    assert_eq!(results[0].pipeline_status, PipelineStatus::Success);
    assert_eq!(results[1].image_path, missing.display().to_string());
    assert_eq!(results[1].pipeline_status, PipelineStatus::Failed);
    assert!(!output.all_failed());

    let json = serde_json::to_value(&output).unwrap();
    assert!(json.is_array());
}

#[tokio::test]
async fn test_batch_progress_is_reported() {
    let temp_dir = tempfile::tempdir().unwrap();
    let first = write_page(temp_dir.path(), "a.png");
    let missing = temp_dir.path().join("missing.png");
    let (tracker, rx) = lessonscan_core::ProgressTracker::new();
    let pipeline = create_test_pipeline("Fractions quiz", quiz_reply()).with_progress(tracker);
    let reporter = spawn_progress_reporter(rx);

    process(
        &pipeline,
        vec![first, missing],
        ExtractionType::EducationalContent,
        false,
        &CancellationToken::new(),
    )
    .await
    .unwrap();
    drop(pipeline);

    let last = reporter.await.unwrap().unwrap();
    assert_eq!(last.images, 2);
    assert_eq!(last.finished(), 2);
    assert_eq!((last.succeeded, last.failed), (1, 1));
}

#[tokio::test]
async fn test_process_requires_an_image() {
    let pipeline = create_test_pipeline("unused", json!({}));

    let err = process(
        &pipeline,
        vec![],
        ExtractionType::General,
        false,
        &CancellationToken::new(),
    )
    .await
    .unwrap_err();

    assert!(matches!(err, CommandError::InvalidArgument { .. }));
}

#[tokio::test]
async fn test_process_cancelled_before_start_fails() {
    let temp_dir = tempfile::tempdir().unwrap();
    let image = write_page(temp_dir.path(), "quiz.png");
    let pipeline = create_test_pipeline("Fractions quiz", quiz_reply());
    let cancel = CancellationToken::new();
    cancel.cancel();

    let output = process(&pipeline, vec![image], ExtractionType::General, false, &cancel)
        .await
        .unwrap();

    assert!(output.all_failed());
}

#[tokio::test]
async fn test_write_output_and_save_results() {
    let temp_dir = tempfile::tempdir().unwrap();
    let a = write_page(temp_dir.path(), "a.png");
    let b = write_page(temp_dir.path(), "b.png");
    let pipeline = create_test_pipeline("Fractions quiz", quiz_reply());

    let output = process(
        &pipeline,
        vec![a, b],
        ExtractionType::EducationalContent,
        false,
        &CancellationToken::new(),
    )
    .await
    .unwrap();

    // --output
    let out_file = temp_dir.path().join("out.json");
    write_output(&output, &out_file).unwrap();
    let written: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&out_file).unwrap()).unwrap();
    assert_eq!(written.as_array().unwrap().len(), 2);

    // --save-dir
    let save_dir = temp_dir.path().join("processed_data");
    let now = chrono::Local.with_ymd_and_hms(2024, 3, 5, 14, 7, 9).unwrap();
    let saved = save_results(
        &save_dir,
        ExtractionType::EducationalContent,
        output.results(),
        now,
    )
    .unwrap();

    let names: Vec<_> = saved
        .iter()
        .map(|p| p.file_name().unwrap().to_string_lossy().to_string())
        .collect();
    assert_eq!(
        names,
        [
            "educational_content_20240305_140709_1.json",
            "educational_content_20240305_140709_2.json"
        ]
    );
    for path in &saved {
        let result: PipelineResult =
            serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap();
        assert!(result.is_success());
    }
}

#[test]
fn test_save_single_result_has_no_index() {
    let temp_dir = tempfile::tempdir().unwrap();
    let result: PipelineResult = serde_json::from_value(json!({
        "imagePath": "page.png",
        "preprocessed": false,
        "pipelineStatus": "failed",
        "durationMs": 3
    }))
    .unwrap();
    let now = chrono::Local.with_ymd_and_hms(2024, 3, 5, 14, 7, 9).unwrap();

    let saved = save_results(temp_dir.path(), ExtractionType::General, &[result], now).unwrap();

    assert_eq!(saved, [temp_dir.path().join("general_20240305_140709.json")]);
}

// ============================================================================
// Config Tests
// ============================================================================

#[test]
fn test_load_config_missing_file() {
    let temp_dir = tempfile::tempdir().unwrap();
    let err = load_config(Some(&temp_dir.path().join("nope.json"))).unwrap_err();
    assert!(matches!(err, CommandError::FileNotFound { .. }));
}

#[test]
fn test_load_config_invalid_json() {
    let temp_dir = tempfile::tempdir().unwrap();
    let path = temp_dir.path().join("config.json");
    std::fs::write(&path, "{ not json").unwrap();

    let err = load_config(Some(&path)).unwrap_err();
    assert!(matches!(err, CommandError::ConfigError { .. }));
}

#[test]
fn test_load_config_from_file() {
    let temp_dir = tempfile::tempdir().unwrap();
    let path = temp_dir.path().join("config.json");
    std::fs::write(&path, r#"{"ocr": {"language": "deu"}}"#).unwrap();

    let config = load_config(Some(&path)).unwrap();
    assert_eq!(config.ocr.language, "deu");
}

#[test]
fn test_build_pipeline_requires_provider() {
    let err = build_pipeline(Config::default()).err().unwrap();

    assert!(matches!(err, CommandError::ProviderNotConfigured { .. }));
    let json = serde_json::to_value(&err).unwrap();
    assert_eq!(json["code"], "provider_not_configured");
}

// ============================================================================
// Validate / Types Tests
// ============================================================================

#[tokio::test]
async fn test_validate_image() {
    let temp_dir = tempfile::tempdir().unwrap();
    let image = write_page(temp_dir.path(), "page.png");

    let validation = validate(&Config::default(), image).await.unwrap();
    assert!(validation.valid);
    assert_eq!(validation.image_info.unwrap().width, 120);

    let missing = validate(&Config::default(), temp_dir.path().join("gone.png"))
        .await
        .unwrap();
    assert!(!missing.valid);
    assert_eq!(missing.reason.as_deref(), Some("File does not exist"));
}

#[test]
fn test_types_lists_all_extraction_types() {
    let names: Vec<_> = types().into_iter().map(|t| t.name).collect();
    assert_eq!(
        names,
        ["educational_content", "form_data", "student_work", "general"]
    );
}

// ============================================================================
// Coursework Command Tests
// ============================================================================

#[tokio::test]
async fn test_coursework_from_saved_result() {
    let temp_dir = tempfile::tempdir().unwrap();
    let image = write_page(temp_dir.path(), "quiz.png");
    let pipeline = create_test_pipeline("Fractions quiz", quiz_reply());
    let output = process(
        &pipeline,
        vec![image],
        ExtractionType::EducationalContent,
        false,
        &CancellationToken::new(),
    )
    .await
    .unwrap();
    let result_file = temp_dir.path().join("result.json");
    write_output(&output, &result_file).unwrap();

    let today = NaiveDate::from_ymd_opt(2024, 5, 1).unwrap();
    let work = coursework(&result_file, CourseWorkKind::Quiz, Some(3), today).unwrap();

    assert_eq!(work.title, "Quiz: Fractions");
    assert_eq!(work.max_points, 20);
    assert!(work.description.contains("**Answer:** 3/4"));
    let due = work.due_date.unwrap();
    assert_eq!((due.year, due.month, due.day), (2024, 5, 4));
}

#[test]
fn test_coursework_rejects_other_json() {
    let temp_dir = tempfile::tempdir().unwrap();
    let path = temp_dir.path().join("other.json");
    std::fs::write(&path, r#"{"hello": "world"}"#).unwrap();
    let today = NaiveDate::from_ymd_opt(2024, 5, 1).unwrap();

    let err = coursework(&path, CourseWorkKind::Material, None, today).unwrap_err();
    assert!(matches!(err, CommandError::InvalidResultFile { .. }));

    let err = coursework(&temp_dir.path().join("none.json"), CourseWorkKind::Material, None, today)
        .unwrap_err();
    assert!(matches!(err, CommandError::FileNotFound { .. }));
}

#[test]
fn test_coursework_needs_extracted_data() {
    let temp_dir = tempfile::tempdir().unwrap();
    let path = temp_dir.path().join("failed.json");
    std::fs::write(
        &path,
        json!({
            "imagePath": "page.png",
            "preprocessed": false,
            "pipelineStatus": "failed",
            "durationMs": 12
        })
        .to_string(),
    )
    .unwrap();
    let today = NaiveDate::from_ymd_opt(2024, 5, 1).unwrap();

    let err = coursework(&path, CourseWorkKind::Assignment, None, today).unwrap_err();
    assert!(matches!(err, CommandError::ExtractedDataNotFound { .. }));
}
