//! Stub-driven integration tests for the extraction pipeline.
//!
//! Every collaborator is replaced by a deterministic stub with call
//! counters, so these run offline and without pdfium.
//!
//! Run with:
//!   cargo test --test pipeline

use async_trait::async_trait;
use edgequake_freight::{
    ClientError, EntityCandidate, EntityExtractor, ExtractError, ExtractionConfig,
    ExtractionProgressCallback, ExtractionStatus, Extractor, FieldAnswer, GenerativeClient,
    RetryPolicy, ScoredText, ScoredTuple, SectionError, Translation,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

// ── Stubs ────────────────────────────────────────────────────────────────────

/// Generative stub.
///
/// * `translate` echoes the page (language "English") and fails the first
///   `translate_failures` calls.
/// * `isolate_sections` looks the page text up in `classification`.
/// * `answer_question` returns `answers[question]`, else `("", 0.1)`; fails
///   for questions containing `fail_questions_with`.
/// * `find_multiple_answers` returns `ports`.
#[derive(Default)]
struct StubLlm {
    classification: HashMap<String, Vec<(String, String)>>,
    answers: HashMap<String, ScoredText>,
    ports: Vec<ScoredTuple>,
    fail_questions_with: Option<&'static str>,
    translate_failures: usize,
    translate_calls: AtomicUsize,
    classify_calls: AtomicUsize,
    qa_calls: Mutex<Vec<(String, String)>>,
}

impl StubLlm {
    fn classify(mut self, page: &str, blocks: &[(&str, &str)]) -> Self {
        self.classification.insert(
            page.to_string(),
            blocks
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        );
        self
    }

    fn answer(mut self, question: &str, text: &str, score: f64) -> Self {
        self.answers
            .insert(question.to_string(), ScoredText::new(text, score));
        self
    }

    fn qa_questions(&self) -> Vec<String> {
        self.qa_calls
            .lock()
            .unwrap()
            .iter()
            .map(|(q, _)| q.clone())
            .collect()
    }
}

#[async_trait]
impl GenerativeClient for StubLlm {
    async fn translate(&self, text: &str) -> Result<Translation, ClientError> {
        let n = self.translate_calls.fetch_add(1, Ordering::SeqCst);
        if n < self.translate_failures {
            return Err(ClientError::provider("translate", "503 Service Unavailable"));
        }
        Ok(Translation {
            lang: "English".into(),
            text: text.to_string(),
        })
    }

    async fn isolate_sections(
        &self,
        _sections: &[String],
        text: &str,
    ) -> Result<Vec<(String, String)>, ClientError> {
        self.classify_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.classification.get(text).cloned().unwrap_or_default())
    }

    async fn answer_question(&self, question: &str, text: &str) -> Result<ScoredText, ClientError> {
        self.qa_calls
            .lock()
            .unwrap()
            .push((question.to_string(), text.to_string()));
        if self.fail_questions_with.is_some_and(|f| question.contains(f)) {
            return Err(ClientError::provider("answer_question", "connection reset"));
        }
        Ok(self
            .answers
            .get(question)
            .cloned()
            .unwrap_or_else(|| ScoredText::new("", 0.1)))
    }

    async fn find_multiple_answers(
        &self,
        _question: &str,
        _columns: &[String],
        _text: &str,
    ) -> Result<Vec<ScoredTuple>, ClientError> {
        Ok(self.ports.clone())
    }
}

/// Local extractor stub keyed by the question (first line of the input).
#[derive(Default)]
struct StubNer {
    by_question: HashMap<String, Vec<(String, f64)>>,
    inputs: Mutex<Vec<String>>,
}

impl StubNer {
    fn candidate(mut self, question: &str, text: &str, score: f64) -> Self {
        self.by_question
            .entry(question.to_string())
            .or_default()
            .push((text.to_string(), score));
        self
    }

    fn input_for(&self, question: &str) -> Option<String> {
        self.inputs
            .lock()
            .unwrap()
            .iter()
            .find(|i| i.lines().next() == Some(question))
            .cloned()
    }
}

#[async_trait]
impl EntityExtractor for StubNer {
    async fn extract(
        &self,
        text: &str,
        labels: &[&str],
    ) -> Result<Vec<EntityCandidate>, ClientError> {
        assert_eq!(labels, &["answer"]);
        self.inputs.lock().unwrap().push(text.to_string());
        let question = text.lines().next().unwrap_or_default();
        Ok(self
            .by_question
            .get(question)
            .map(|cands| {
                cands
                    .iter()
                    .map(|(t, s)| EntityCandidate {
                        text: t.clone(),
                        score: *s,
                        label: "answer".into(),
                    })
                    .collect()
            })
            .unwrap_or_default())
    }
}

fn fast_config() -> ExtractionConfig {
    ExtractionConfig::builder()
        .retry(RetryPolicy::new(3, 0))
        .build()
        .unwrap()
}

fn extractor(llm: &Arc<StubLlm>, ner: &Arc<StubNer>, config: ExtractionConfig) -> Extractor {
    Extractor::new(llm.clone(), ner.clone(), config)
}

const BOOKING_PAGE: &str = "Booking No: ABC123, Contract: XY-99";

fn booking_stubs() -> (Arc<StubLlm>, Arc<StubNer>) {
    let llm = StubLlm::default()
        .classify(BOOKING_PAGE, &[("booking_details", BOOKING_PAGE)])
        .answer("What is the service_contract_number?", "XY-99", 0.82);
    let ner = StubNer::default().candidate("What is the booking_number?", "ABC123", 0.95);
    (Arc::new(llm), Arc::new(ner))
}

// ── End-to-end scenario ──────────────────────────────────────────────────────

#[tokio::test]
async fn booking_page_resolves_locally_and_via_fallback() {
    let (llm, ner) = booking_stubs();
    let out = extractor(&llm, &ner, fast_config())
        .process_pages(vec![BOOKING_PAGE.to_string()])
        .await
        .unwrap();

    assert_eq!(
        out.record.field(&["booking_details", "booking_number"]),
        Some(&FieldAnswer::new("ABC123", 0.95))
    );
    assert_eq!(
        out.record.field(&["booking_details", "service_contract_number"]),
        Some(&FieldAnswer::new("XY-99", 0.82))
    );

    let questions = llm.qa_questions();
    assert!(!questions.contains(&"What is the booking_number?".to_string()));
    assert_eq!(
        questions
            .iter()
            .filter(|q| *q == "What is the service_contract_number?")
            .count(),
        1
    );
    assert!(out.is_complete());
}

#[tokio::test]
async fn record_has_every_schema_section_in_order() {
    let (llm, ner) = booking_stubs();
    let out = extractor(&llm, &ner, fast_config())
        .process_pages(vec![BOOKING_PAGE.to_string()])
        .await
        .unwrap();

    let json = out.record.to_json();
    let keys: Vec<_> = json.as_object().unwrap().keys().cloned().collect();
    assert_eq!(
        keys,
        vec![
            "booking_details",
            "shipment_route",
            "cargo_information",
            "vessel_information",
            "parties_information"
        ]
    );
    assert_eq!(json["shipment_route"]["transit_ports"], serde_json::json!([]));
    assert!(json["shipment_route"]["origin"]["terminal"]["confidence"].is_number());
}

// ── Confidence gate ──────────────────────────────────────────────────────────

#[tokio::test]
async fn confident_local_answer_never_calls_fallback() {
    let llm = Arc::new(StubLlm::default().classify("p", &[("vessel_information", "Vessel: MSC Anna")]));
    let ner = Arc::new(
        StubNer::default()
            .candidate("What is the vessel_name?", "MSC Anna", 0.97)
            .candidate("What is the vessel_name?", "Anna", 0.6),
    );
    let out = extractor(&llm, &ner, fast_config())
        .process_pages(vec!["p".into()])
        .await
        .unwrap();

    assert_eq!(
        out.record.field(&["vessel_information", "vessel_name"]).unwrap().value,
        "MSC Anna"
    );
    assert!(!llm
        .qa_questions()
        .iter()
        .any(|q| q == "What is the vessel_name?"));
}

#[tokio::test]
async fn low_confidence_escalates_once_over_whole_document() {
    let llm = Arc::new(
        StubLlm::default()
            .classify(
                "p",
                &[
                    ("vessel_information", "Vessel: MSC Anna"),
                    ("booking_details", "Booking: B1"),
                ],
            )
            .answer("What is the vessel_name?", "MSC ANNA", 0.88),
    );
    let ner = Arc::new(StubNer::default().candidate("What is the vessel_name?", "Anna", 0.89));
    let out = extractor(&llm, &ner, fast_config())
        .process_pages(vec!["p".into()])
        .await
        .unwrap();

    assert_eq!(
        out.record.field(&["vessel_information", "vessel_name"]),
        Some(&FieldAnswer::new("MSC ANNA", 0.88))
    );
    let calls: Vec<_> = llm
        .qa_calls
        .lock()
        .unwrap()
        .iter()
        .filter(|(q, _)| q == "What is the vessel_name?")
        .cloned()
        .collect();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].1, "Vessel: MSC Anna\nBooking: B1");
}

#[tokio::test]
async fn threshold_is_configurable() {
    let llm = Arc::new(StubLlm::default().classify("p", &[("vessel_information", "x")]));
    let ner = Arc::new(StubNer::default().candidate("What is the vessel_name?", "Anna", 0.6));
    let config = ExtractionConfig::builder()
        .retry(RetryPolicy::new(1, 0))
        .confidence_threshold(0.5)
        .build()
        .unwrap();
    let out = extractor(&llm, &ner, config)
        .process_pages(vec!["p".into()])
        .await
        .unwrap();

    assert_eq!(
        out.record.field(&["vessel_information", "vessel_name"]).unwrap().value,
        "Anna"
    );
    assert!(out.stats.local_answers >= 1);
}

// ── Aggregation ──────────────────────────────────────────────────────────────

#[tokio::test]
async fn sections_merge_in_page_order() {
    let llm = Arc::new(
        StubLlm::default()
            .classify("page one", &[("cargo_information", "T1")])
            .classify("page two", &[("cargo_information", "T2")]),
    );
    let ner = Arc::new(StubNer::default());
    let out = extractor(&llm, &ner, fast_config())
        .process_pages(vec!["page one".into(), "page two".into()])
        .await
        .unwrap();

    let input = ner.input_for("What is the cargo_type?").unwrap();
    assert_eq!(input, "What is the cargo_type?\nT1\nT2");
    assert_eq!(out.report.sections_found, vec!["cargo_information"]);
}

#[tokio::test]
async fn blank_pages_skip_translation_and_classification() {
    let (llm, ner) = booking_stubs();
    let out = extractor(&llm, &ner, fast_config())
        .process_pages(vec!["  \r\n".into(), BOOKING_PAGE.into()])
        .await
        .unwrap();

    assert_eq!(llm.translate_calls.load(Ordering::SeqCst), 1);
    assert_eq!(llm.classify_calls.load(Ordering::SeqCst), 1);
    assert_eq!(out.stats.blank_pages, 1);
    assert_eq!(out.report.pages[0].language, None);
    assert_eq!(out.report.pages[1].language.as_deref(), Some("English"));
}

// ── Missing sections ─────────────────────────────────────────────────────────

#[tokio::test]
async fn missing_parties_section_still_yields_every_field() {
    let (llm, ner) = booking_stubs();
    let out = extractor(&llm, &ner, fast_config())
        .process_pages(vec![BOOKING_PAGE.to_string()])
        .await
        .unwrap();

    for group in ["shipper", "carrier"] {
        for field in ["name", "contact_details"] {
            let answer = out
                .record
                .field(&["parties_information", group, field])
                .unwrap_or_else(|| panic!("missing {group}.{field}"));
            assert_eq!(answer, &FieldAnswer::new("", 0.1));
        }
    }
    assert!(llm
        .qa_questions()
        .contains(&"What is the name of the carrier of the parties_information?".to_string()));
    assert!(out
        .report
        .missing_sections
        .contains(&"parties_information".to_string()));
    assert_eq!(out.report.status, ExtractionStatus::Complete);
}

// ── Idempotence ──────────────────────────────────────────────────────────────

#[tokio::test]
async fn same_inputs_give_identical_records() {
    let (llm, ner) = booking_stubs();
    let ex = extractor(&llm, &ner, fast_config());

    let first = ex.process_pages(vec![BOOKING_PAGE.into()]).await.unwrap();
    let second = ex.process_pages(vec![BOOKING_PAGE.into()]).await.unwrap();

    assert_eq!(first.record, second.record);
    assert_eq!(
        serde_json::to_string(&first.record).unwrap(),
        serde_json::to_string(&second.record).unwrap()
    );
}

// ── Retries ──────────────────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn translation_recovers_after_two_failures() {
    let llm = Arc::new(StubLlm {
        translate_failures: 2,
        ..StubLlm::default()
    });
    let ner = Arc::new(StubNer::default());
    let config = ExtractionConfig::builder()
        .retry(RetryPolicy::new(3, 1000))
        .build()
        .unwrap();

    let start = tokio::time::Instant::now();
    let out = extractor(&llm, &ner, config)
        .process_pages(vec!["page".into()])
        .await
        .unwrap();

    let elapsed = start.elapsed().as_millis();
    assert!((2000..3000).contains(&elapsed), "elapsed {elapsed}ms");
    assert_eq!(llm.translate_calls.load(Ordering::SeqCst), 3);
    assert_eq!(out.report.pages[0].language.as_deref(), Some("English"));
}

#[tokio::test(start_paused = true)]
async fn exhausted_translation_aborts_the_document() {
    let llm = Arc::new(StubLlm {
        translate_failures: usize::MAX,
        ..StubLlm::default()
    });
    let ner = Arc::new(StubNer::default());
    let config = ExtractionConfig::builder()
        .retry(RetryPolicy::new(3, 1000))
        .build()
        .unwrap();

    let err = extractor(&llm, &ner, config)
        .process_pages(vec!["page".into()])
        .await
        .unwrap_err();

    assert_eq!(llm.translate_calls.load(Ordering::SeqCst), 3);
    match err {
        ExtractError::TranslationFailed { page, source } => {
            assert_eq!(page, 1);
            assert!(matches!(source, ClientError::Exhausted { attempts: 3, .. }));
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

// ── Section-scoped failure ───────────────────────────────────────────────────

#[tokio::test]
async fn failing_section_is_isolated_and_reported() {
    let llm = Arc::new(StubLlm {
        fail_questions_with: Some("vessel_voyage"),
        ..StubLlm::default()
    }
    .classify(BOOKING_PAGE, &[("booking_details", BOOKING_PAGE)])
    .answer("What is the service_contract_number?", "XY-99", 0.82));
    let ner = Arc::new(StubNer::default().candidate("What is the booking_number?", "ABC123", 0.95));

    let out = extractor(&llm, &ner, fast_config())
        .process_pages(vec![BOOKING_PAGE.into()])
        .await
        .unwrap();

    assert_eq!(out.report.status, ExtractionStatus::Partial);
    assert_eq!(out.report.failed_sections.len(), 1);
    let failure = &out.report.failed_sections[0];
    assert_eq!(failure.section, "vessel_information");
    assert!(matches!(
        failure.error,
        SectionError::CallFailed { attempts: 3, .. }
    ));

    assert_eq!(
        out.record.field(&["vessel_information", "vessel_name"]),
        Some(&FieldAnswer::placeholder())
    );
    assert_eq!(
        out.record.field(&["booking_details", "booking_number"]),
        Some(&FieldAnswer::new("ABC123", 0.95))
    );
    // Sections after the failed one are still attempted.
    assert!(out
        .record
        .field(&["parties_information", "shipper", "name"])
        .is_some());
    assert!(llm
        .qa_questions()
        .iter()
        .any(|q| q.ends_with("of the parties_information?")));
}

// ── Lists ────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn transit_ports_come_from_the_list_question() {
    let llm = Arc::new(StubLlm {
        ports: vec![
            vec![
                ("port_name".into(), ScoredText::new("Singapore", 0.9)),
                ("eta".into(), ScoredText::new("2024-05-01", 0.8)),
            ],
            vec![
                ("port_name".into(), ScoredText::new("Colombo", 0.7)),
                ("eta".into(), ScoredText::new("2024-05-09", 0.6)),
            ],
        ],
        ..StubLlm::default()
    });
    let ner = Arc::new(StubNer::default());
    let out = extractor(&llm, &ner, fast_config())
        .process_pages(vec!["route".into()])
        .await
        .unwrap();

    let ports = out
        .record
        .section("shipment_route")
        .and_then(|s| s.get("transit_ports"))
        .and_then(|p| p.as_list())
        .unwrap();
    assert_eq!(ports.len(), 2);
    assert_eq!(ports[1].get("port_name"), Some(&FieldAnswer::new("Colombo", 0.7)));
    assert_eq!(out.stats.list_entries, 2);
    assert!(ner.inputs.lock().unwrap().iter().all(|i| !i.contains("transit_ports")));
}

// ── Progress events ──────────────────────────────────────────────────────────

#[derive(Default)]
struct Events(Mutex<Vec<String>>);

impl ExtractionProgressCallback for Events {
    fn on_extraction_start(&self, total_pages: usize) {
        self.0.lock().unwrap().push(format!("start:{total_pages}"));
    }
    fn on_page_translated(&self, page_num: usize, _total: usize, _language: Option<&str>) {
        self.0.lock().unwrap().push(format!("page:{page_num}"));
    }
    fn on_section_complete(&self, section: &str, _fields: usize) {
        self.0.lock().unwrap().push(format!("ok:{section}"));
    }
    fn on_extraction_complete(&self, total_sections: usize, failed_sections: usize) {
        self.0
            .lock()
            .unwrap()
            .push(format!("done:{total_sections}/{failed_sections}"));
    }
}

#[tokio::test]
async fn progress_events_follow_the_stages() {
    let (llm, ner) = booking_stubs();
    let events = Arc::new(Events::default());
    let config = ExtractionConfig::builder()
        .retry(RetryPolicy::new(1, 0))
        .progress_callback(events.clone())
        .build()
        .unwrap();

    extractor(&llm, &ner, config)
        .process_pages(vec![BOOKING_PAGE.into()])
        .await
        .unwrap();

    assert_eq!(
        *events.0.lock().unwrap(),
        vec![
            "start:1",
            "page:1",
            "ok:booking_details",
            "ok:shipment_route",
            "ok:cargo_information",
            "ok:vessel_information",
            "ok:parties_information",
            "done:5/0",
        ]
    );
}

#[test]
fn extractor_future_is_send() {
    fn assert_send<T: Send>(_: &T) {}
    let (llm, ner) = booking_stubs();
    let ex = extractor(&llm, &ner, fast_config());
    let fut = ex.process_pages(Vec::new());
    assert_send(&fut);
}
