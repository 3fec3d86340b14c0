//! End-to-end behaviour of `Analyzer` with mock collaborators.
//!
//! No pdfium, no network: extraction, generation and storage are all fakes
//! from `common`.

mod common;

use bloodtest_analyzer::pipeline::extract::TRUNCATION_MARKER;
use bloodtest_analyzer::{AnalysisConfig, AnalyzerError, DEFAULT_QUERY};
use common::*;
use futures::StreamExt;
use std::sync::atomic::Ordering;
use std::sync::Arc;

#[tokio::test]
async fn upload_runs_every_step_and_persists_one_record() {
    let data_dir = tempfile::tempdir().unwrap();
    let extractor = FakeExtractor::with_text(REPORT_TEXT);
    let generator = Arc::new(RecordingGenerator::default());
    let store = memory_store();
    let analyzer = analyzer(
        extractor,
        generator.clone(),
        store.clone(),
        fast_config(&["doctor", "verifier", "nutritionist"]),
    );

    let outcome = analyzer
        .analyze_upload(data_dir.path(), "cbc.pdf", FAKE_PDF, Some("  Is my iron low? "))
        .await
        .unwrap();

    assert_eq!(outcome.user_name, "Jane Doe");
    assert_eq!(outcome.query, "Is my iron low?");
    assert_eq!(
        outcome.analysis.roles().collect::<Vec<_>>(),
        vec!["doctor", "verifier", "nutritionist"]
    );
    assert_eq!(outcome.stats.succeeded_steps, 3);
    assert_eq!(outcome.stats.total_input_tokens, 30);
    assert_eq!(generator.call_count(), 3);

    let records = store.records().await;
    assert_eq!(records.len(), 1);
    assert_eq!(outcome.record_id, Some(records[0].id.to_string()));
    assert_eq!(records[0].report_id, outcome.report.id);
    assert_eq!(records[0].original_file_name, "cbc.pdf");
    assert_eq!(records[0].user_name, "Jane Doe");
}

#[tokio::test]
async fn outputs_are_cleaned_of_urls() {
    let data_dir = tempfile::tempdir().unwrap();
    let analyzer = analyzer(
        FakeExtractor::with_text(REPORT_TEXT),
        Arc::new(RecordingGenerator::default()),
        memory_store(),
        fast_config(&["doctor"]),
    );

    let outcome = analyzer
        .analyze_upload(data_dir.path(), "cbc.pdf", FAKE_PDF, None)
        .await
        .unwrap();

    let doctor = outcome.analysis.get("doctor").unwrap();
    assert_eq!(doctor.output, "doctor says: looks fine. See");
    assert!(!doctor.output.contains("http"));
}

#[tokio::test]
async fn blank_query_falls_back_to_default() {
    let data_dir = tempfile::tempdir().unwrap();
    let generator = Arc::new(RecordingGenerator::default());
    let analyzer = analyzer(
        FakeExtractor::with_text(REPORT_TEXT),
        generator.clone(),
        memory_store(),
        fast_config(&["doctor"]),
    );

    let outcome = analyzer
        .analyze_upload(data_dir.path(), "cbc.pdf", FAKE_PDF, Some("   "))
        .await
        .unwrap();

    assert_eq!(outcome.query, DEFAULT_QUERY);
    assert!(generator.prompts.lock().unwrap()[0].starts_with(&format!("Q: {DEFAULT_QUERY}")));
}

#[tokio::test]
async fn failing_step_does_not_disturb_the_others() {
    let data_dir = tempfile::tempdir().unwrap();
    let generator = Arc::new(RecordingGenerator::failing_for(&["verifier"]));
    let analyzer = analyzer(
        FakeExtractor::with_text(REPORT_TEXT),
        generator.clone(),
        memory_store(),
        fast_config(&["doctor", "verifier", "nutritionist"]),
    );

    let outcome = analyzer
        .analyze_upload(data_dir.path(), "cbc.pdf", FAKE_PDF, None)
        .await
        .unwrap();

    let verifier = outcome.analysis.get("verifier").unwrap();
    assert!(!verifier.success);
    assert_eq!(
        verifier.output,
        "An error occurred during analysis: step 'verifier': generation failed: verifier backend down"
    );
    for role in ["doctor", "nutritionist"] {
        let step = outcome.analysis.get(role).unwrap();
        assert!(step.success);
        assert_eq!(step.output, format!("{role} says: looks fine. See"));
    }
    assert_eq!(generator.call_count(), 3);
}

#[tokio::test]
async fn all_steps_failing_still_returns_full_mapping() {
    let data_dir = tempfile::tempdir().unwrap();
    let roles = ["a", "b", "c", "d"];
    let analyzer = analyzer(
        FakeExtractor::with_text(REPORT_TEXT),
        Arc::new(RecordingGenerator::failing_for(&roles)),
        memory_store(),
        fast_config(&roles),
    );

    let outcome = analyzer
        .analyze_upload(data_dir.path(), "cbc.pdf", FAKE_PDF, None)
        .await
        .unwrap();

    assert_eq!(outcome.analysis.len(), 4);
    assert_eq!(outcome.stats.failed_steps, 4);
    assert!(outcome.record_id.is_some());
}

#[tokio::test]
async fn extraction_failure_skips_generation_and_storage() {
    let data_dir = tempfile::tempdir().unwrap();
    let generator = Arc::new(RecordingGenerator::default());
    let store = memory_store();
    let analyzer = analyzer(
        FakeExtractor::failing(),
        generator.clone(),
        store.clone(),
        fast_config(&["doctor", "verifier"]),
    );

    let err = analyzer
        .analyze_upload(data_dir.path(), "cbc.pdf", FAKE_PDF, None)
        .await
        .unwrap_err();

    assert!(err.is_extraction_error());
    assert_eq!(generator.call_count(), 0);
    assert!(store.records().await.is_empty());
}

#[tokio::test]
async fn blank_document_is_an_extraction_error() {
    let data_dir = tempfile::tempdir().unwrap();
    let generator = Arc::new(RecordingGenerator::default());
    let analyzer = analyzer(
        FakeExtractor::with_text(" \n\n \n"),
        generator.clone(),
        memory_store(),
        fast_config(&["doctor"]),
    );

    let err = analyzer
        .analyze_upload(data_dir.path(), "scan.pdf", FAKE_PDF, None)
        .await
        .unwrap_err();

    assert!(matches!(err, AnalyzerError::EmptyExtraction { .. }));
    assert_eq!(generator.call_count(), 0);
}

#[tokio::test]
async fn rejected_upload_never_reaches_the_extractor() {
    let data_dir = tempfile::tempdir().unwrap();
    let extractor = FakeExtractor::with_text(REPORT_TEXT);
    let analyzer = analyzer(
        extractor.clone(),
        Arc::new(RecordingGenerator::default()),
        memory_store(),
        fast_config(&["doctor"]),
    );

    let err = analyzer
        .analyze_upload(data_dir.path(), "notes.txt", FAKE_PDF, None)
        .await
        .unwrap_err();
    assert!(matches!(err, AnalyzerError::UnsupportedFileType { .. }));

    let err = analyzer
        .analyze_upload(data_dir.path(), "fake.pdf", b"GIF89a....", None)
        .await
        .unwrap_err();
    assert!(matches!(err, AnalyzerError::NotAPdf { .. }));

    assert_eq!(extractor.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn store_failure_is_logged_not_fatal() {
    let data_dir = tempfile::tempdir().unwrap();
    let analyzer = analyzer(
        FakeExtractor::with_text(REPORT_TEXT),
        Arc::new(RecordingGenerator::default()),
        Arc::new(BrokenStore),
        fast_config(&["doctor"]),
    );

    let outcome = analyzer
        .analyze_upload(data_dir.path(), "cbc.pdf", FAKE_PDF, None)
        .await
        .unwrap();

    assert!(outcome.record_id.is_none());
    assert_eq!(outcome.analysis.len(), 1);
}

#[tokio::test]
async fn staged_upload_is_removed_after_extraction() {
    let data_dir = tempfile::tempdir().unwrap();
    let analyzer = analyzer(
        FakeExtractor::with_text(REPORT_TEXT),
        Arc::new(RecordingGenerator::default()),
        memory_store(),
        fast_config(&["doctor"]),
    );

    analyzer
        .analyze_upload(data_dir.path(), "cbc.pdf", FAKE_PDF, None)
        .await
        .unwrap();

    let leftovers = std::fs::read_dir(data_dir.path()).unwrap().count();
    assert_eq!(leftovers, 0);
}

#[tokio::test]
async fn long_reports_are_truncated_to_the_budget() {
    let data_dir = tempfile::tempdir().unwrap();
    let long_text = "Name: Bob\n".to_string() + &"x".repeat(10_000);
    let generator = Arc::new(RecordingGenerator::default());
    let config = AnalysisConfig::builder()
        .steps(steps(&["doctor"]))
        .step_delay_ms(0)
        .max_report_chars(500)
        .build()
        .unwrap();
    let analyzer = analyzer(
        FakeExtractor::with_text(&long_text),
        generator.clone(),
        memory_store(),
        config,
    );

    let outcome = analyzer
        .analyze_upload(data_dir.path(), "long.pdf", FAKE_PDF, None)
        .await
        .unwrap();

    assert!(outcome.report.truncated);
    assert_eq!(
        outcome.report.text.chars().count(),
        500 + TRUNCATION_MARKER.chars().count()
    );
    assert!(outcome.report.text.ends_with(TRUNCATION_MARKER));
    assert_eq!(outcome.user_name, "Bob");
    assert!(generator.prompts.lock().unwrap()[0].ends_with(TRUNCATION_MARKER));
}

#[tokio::test]
async fn local_path_input_and_stream_api() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("cbc.pdf");
    std::fs::write(&path, FAKE_PDF).unwrap();

    let generator = Arc::new(RecordingGenerator::failing_for(&["second"]));
    let analyzer = analyzer(
        FakeExtractor::with_text(REPORT_TEXT),
        generator.clone(),
        memory_store(),
        fast_config(&["first", "second", "third"]),
    );

    let stream = analyzer
        .analyze_stream(path.to_str().unwrap(), Some("trend?"))
        .await
        .unwrap();
    assert_eq!(stream.user_name, "Jane Doe");
    assert_eq!(stream.query, "trend?");
    assert_eq!(generator.call_count(), 0);

    let results: Vec<_> = stream.steps.collect().await;
    let flags: Vec<(&str, bool)> = results
        .iter()
        .map(|r| (r.role.as_str(), r.success))
        .collect();
    assert_eq!(
        flags,
        vec![("first", true), ("second", false), ("third", true)]
    );
}

#[tokio::test]
async fn missing_local_file_is_a_client_error() {
    let analyzer = analyzer(
        FakeExtractor::with_text(REPORT_TEXT),
        Arc::new(RecordingGenerator::default()),
        memory_store(),
        fast_config(&["doctor"]),
    );

    let err = analyzer
        .analyze_input("/definitely/not/here.pdf", None)
        .await
        .unwrap_err();
    assert!(err.is_client_error());
}
