//! End-to-end integration tests for edgequake-freight.
//!
//! These tests use real PDF files in `./test_cases/` and make live LLM API
//! calls. They are gated behind the `E2E_ENABLED` environment variable so
//! they do not run in CI unless explicitly requested.
//!
//! Run with:
//!   E2E_ENABLED=1 PDFIUM_LIB_PATH=/opt/pdfium/lib cargo test --test e2e -- --nocapture

use edgequake_freight::{
    extract, extract_from_bytes, extract_to_file, ExtractError, ExtractionConfig,
    ExtractionProgressCallback, NoopProgressCallback, NullExtractor,
};
use std::path::PathBuf;
use std::sync::Arc;

// ── Test helpers ─────────────────────────────────────────────────────────────

fn test_cases_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("test_cases")
}

fn output_dir() -> PathBuf {
    let d = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("test_cases/output");
    std::fs::create_dir_all(&d).ok();
    d
}

/// Skip this test if E2E_ENABLED is not set *or* no PDF file at `path`.
macro_rules! e2e_skip_unless_ready {
    ($path:expr) => {{
        if std::env::var("E2E_ENABLED").is_err() {
            println!("SKIP: set E2E_ENABLED=1 to run e2e tests");
            return;
        }
        let p: PathBuf = $path;
        if !p.exists() {
            println!("SKIP: test file not found: {}", p.display());
            return;
        }
        p
    }};
}

/// Every schema leaf is present with a confidence in [0, 1].
fn assert_record_shape(json: &serde_json::Value, context: &str) {
    let obj = json
        .as_object()
        .unwrap_or_else(|| panic!("[{context}] record is not an object"));
    for section in [
        "booking_details",
        "shipment_route",
        "cargo_information",
        "vessel_information",
        "parties_information",
    ] {
        assert!(obj.contains_key(section), "[{context}] missing {section}");
    }

    fn walk(v: &serde_json::Value, context: &str) {
        match v {
            serde_json::Value::Object(map) if map.contains_key("confidence") => {
                let c = map["confidence"].as_f64().expect("confidence is numeric");
                assert!((0.0..=1.0).contains(&c), "[{context}] confidence {c}");
                assert!(map["value"].is_string(), "[{context}] value is not a string");
            }
            serde_json::Value::Object(map) => map.values().for_each(|c| walk(c, context)),
            serde_json::Value::Array(items) => items.iter().for_each(|c| walk(c, context)),
            other => panic!("[{context}] unexpected leaf {other}"),
        }
    }
    walk(json, context);
}

// ── Input errors (no LLM needed) ─────────────────────────────────────────────

#[tokio::test]
async fn test_extract_nonexistent() {
    if std::env::var("E2E_ENABLED").is_err() {
        println!("SKIP: set E2E_ENABLED=1 to run e2e tests");
        return;
    }
    let result = extract("/tmp/does-not-exist-freight.pdf", &ExtractionConfig::default()).await;
    match result {
        Err(ExtractError::FileNotFound { .. }) | Err(ExtractError::ProviderNotConfigured { .. }) => {}
        other => panic!("expected FileNotFound or ProviderNotConfigured, got {other:?}"),
    }
}

// ── Live extraction ──────────────────────────────────────────────────────────

#[tokio::test]
async fn test_extract_booking_confirmation() {
    let pdf = e2e_skip_unless_ready!(test_cases_dir().join("booking_confirmation.pdf"));

    let output = extract(pdf.to_str().unwrap(), &ExtractionConfig::default())
        .await
        .expect("extraction should succeed");

    assert_record_shape(&output.record.to_json(), "booking_confirmation");
    assert!(output.stats.total_pages >= 1);
    assert_eq!(
        output.stats.fields_resolved,
        output.stats.local_answers + output.stats.fallback_answers
    );
    println!(
        "{} fields: {} local / {} fallback, {} failed sections",
        output.stats.fields_resolved,
        output.stats.local_answers,
        output.stats.fallback_answers,
        output.report.failed_sections.len()
    );
}

#[tokio::test]
async fn test_extract_without_local_extractor() {
    let pdf = e2e_skip_unless_ready!(test_cases_dir().join("booking_confirmation.pdf"));

    let config = ExtractionConfig::builder()
        .entity_extractor(Arc::new(NullExtractor))
        .build()
        .unwrap();
    let output = extract(pdf.to_str().unwrap(), &config).await.unwrap();

    assert_eq!(output.stats.local_answers, 0);
    assert_record_shape(&output.record.to_json(), "no_local");
}

#[tokio::test]
async fn test_extract_to_file_writes_record() {
    let pdf = e2e_skip_unless_ready!(test_cases_dir().join("booking_confirmation.pdf"));
    let out_path = output_dir().join("booking_confirmation.json");

    extract_to_file(pdf.to_str().unwrap(), &out_path, &ExtractionConfig::default())
        .await
        .unwrap();

    let raw = std::fs::read_to_string(&out_path).unwrap();
    let json: serde_json::Value = serde_json::from_str(&raw).unwrap();
    assert_record_shape(&json, "extract_to_file");
}

#[tokio::test]
async fn test_extract_from_bytes() {
    let pdf = e2e_skip_unless_ready!(test_cases_dir().join("booking_confirmation.pdf"));
    let bytes = std::fs::read(&pdf).unwrap();

    let output = extract_from_bytes(&bytes, &ExtractionConfig::default())
        .await
        .unwrap();
    assert_record_shape(&output.record.to_json(), "from_bytes");
}

#[tokio::test]
async fn test_callback_send_in_tokio_spawn() {
    let pdf = e2e_skip_unless_ready!(test_cases_dir().join("booking_confirmation.pdf"));

    struct Counting(std::sync::atomic::AtomicUsize);
    impl ExtractionProgressCallback for Counting {
        fn on_section_complete(&self, _section: &str, _fields: usize) {
            self.0.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        }
    }

    let cb = Arc::new(Counting(std::sync::atomic::AtomicUsize::new(0)));
    let config = ExtractionConfig::builder()
        .progress_callback(cb.clone())
        .build()
        .unwrap();

    let handle = tokio::spawn(async move { extract(pdf.to_str().unwrap(), &config).await });
    let output = handle.await.unwrap().unwrap();

    let completed = cb.0.load(std::sync::atomic::Ordering::SeqCst);
    assert_eq!(
        completed + output.report.failed_sections.len(),
        5,
        "every section reports exactly once"
    );
}

#[test]
fn test_noop_callback_is_send_sync() {
    fn assert_send_sync<T: Send + Sync>() {}
    assert_send_sync::<NoopProgressCallback>();
    assert_send_sync::<ExtractionConfig>();
}
