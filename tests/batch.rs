//! Tests for the bounded concurrent batch dispatcher.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;

use frameqa::ask::{FrameQuestion, SamplingParams};
use frameqa::batch::{BatchDispatcher, ItemCall};
use frameqa::dispatch::{InferenceProvider, InferenceRequest, InferenceResult};
use frameqa::error::FrameQaError;
use frameqa::extract::LetterExtraction;
use frameqa::frames::{FrameDirStore, MediaPart};
use frameqa::gate::ConcurrencyGate;
use frameqa::outcome::{Answer, ItemResult};
use frameqa::prompt::{EXTRACT_SYSTEM_PROMPT, PromptTemplate};
use frameqa::sink::{JsonDirSink, ResultSink};
use frameqa::work::WorkItem;

static TEST_COUNTER: AtomicU64 = AtomicU64::new(0);

fn unique_dir(name: &str) -> PathBuf {
    let id = TEST_COUNTER.fetch_add(1, Ordering::Relaxed);
    let dir = std::env::temp_dir().join(format!("frameqa_{name}_{id}_{}", std::process::id()));
    let _ = std::fs::remove_dir_all(&dir);
    std::fs::create_dir_all(&dir).unwrap();
    dir
}

fn items(n: usize) -> Vec<WorkItem> {
    (1..=n)
        .map(|i| WorkItem::new(format!("{i:05}"), format!("Q{i}")))
        .collect()
}

#[derive(Clone, Copy)]
enum Behavior {
    Answer,
    Fail,
    Panic,
    MissingInput,
}

/// Mock call: sleeps, records concurrency, and behaves per id.
#[derive(Default)]
struct ScriptedCall {
    behaviors: HashMap<String, Behavior>,
    delays: HashMap<String, Duration>,
    default_delay: Duration,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    called: Mutex<Vec<String>>,
}

impl ScriptedCall {
    fn with_delay(delay: Duration) -> Self {
        Self {
            default_delay: delay,
            ..Self::default()
        }
    }

    fn behave(mut self, id: &str, b: Behavior) -> Self {
        self.behaviors.insert(id.to_string(), b);
        self
    }

    fn delay(mut self, id: &str, d: Duration) -> Self {
        self.delays.insert(id.to_string(), d);
        self
    }

    fn called(&self) -> Vec<String> {
        self.called.lock().unwrap().clone()
    }
}

#[async_trait]
impl ItemCall for ScriptedCall {
    async fn precheck(&self, item: &WorkItem) -> Result<(), FrameQaError> {
        match self.behaviors.get(&item.id) {
            Some(Behavior::MissingInput) => Err(FrameQaError::missing_input(&item.id, "no frames found")),
            _ => Ok(()),
        }
    }

    async fn call(&self, item: &WorkItem) -> Result<Answer, FrameQaError> {
        self.called.lock().unwrap().push(item.id.clone());
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        let delay = self.delays.get(&item.id).copied().unwrap_or(self.default_delay);
        tokio::time::sleep(delay).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        match self.behaviors.get(&item.id).copied().unwrap_or(Behavior::Answer) {
            Behavior::Answer => Ok(Answer::text(format!("answer to {}", item.question))),
            Behavior::Fail => Err(FrameQaError::Upstream {
                provider: "mock".to_string(),
                message: "500 Internal Server Error".to_string(),
                status: Some(500),
            }),
            Behavior::Panic => panic!("mock provider blew up"),
            Behavior::MissingInput => unreachable!("precheck should have stopped this item"),
        }
    }
}

fn dispatcher(call: Arc<ScriptedCall>, n: usize) -> BatchDispatcher {
    BatchDispatcher::new(call, Arc::new(ConcurrencyGate::new(n)))
}

// ---------------------------------------------------------------------------
// One result per item, in input order
// ---------------------------------------------------------------------------

#[tokio::test]
async fn returns_one_result_per_item_in_input_order() {
    // Later items finish first
    let call = Arc::new(
        ScriptedCall::with_delay(Duration::from_millis(5))
            .delay("00001", Duration::from_millis(80))
            .delay("00002", Duration::from_millis(40)),
    );
    let batch = items(12);
    let results = dispatcher(call, 4).run(batch.clone()).await;

    assert_eq!(results.len(), batch.len());
    for (item, result) in batch.iter().zip(&results) {
        assert_eq!(item.id, result.id);
        assert_eq!(result.answer(), Some(format!("answer to {}", item.question).as_str()));
    }
}

#[tokio::test]
async fn empty_batch_returns_empty_results() {
    let call = Arc::new(ScriptedCall::default());
    let results = dispatcher(call.clone(), 3).run(Vec::new()).await;
    assert!(results.is_empty());
    assert!(call.called().is_empty());
}

// ---------------------------------------------------------------------------
// Concurrency cap
// ---------------------------------------------------------------------------

#[tokio::test]
async fn in_flight_calls_never_exceed_cap() {
    for cap in [1, 3, 5] {
        let mut call = ScriptedCall::with_delay(Duration::from_millis(10));
        // Uneven latencies
        for i in (1..=25).step_by(3) {
            call = call.delay(&format!("{i:05}"), Duration::from_millis(35));
        }
        let call = Arc::new(call);
        let d = dispatcher(call.clone(), cap);
        let results = d.run(items(25)).await;

        assert_eq!(results.len(), 25);
        let max = call.max_in_flight.load(Ordering::SeqCst);
        assert!(max <= cap, "cap {cap} exceeded: {max} in flight");
        assert_eq!(max, cap, "cap {cap} should be saturated with 25 items");
        assert_eq!(d.gate().available_permits(), cap, "all permits returned");
    }
}

#[tokio::test]
async fn cap_of_one_serializes_calls() {
    let call = Arc::new(ScriptedCall::with_delay(Duration::from_millis(20)));
    let start = Instant::now();
    let results = dispatcher(call.clone(), 1).run(items(4)).await;

    assert_eq!(results.len(), 4);
    assert_eq!(call.max_in_flight.load(Ordering::SeqCst), 1);
    assert!(start.elapsed() >= Duration::from_millis(80));
}

// ---------------------------------------------------------------------------
// Failure isolation
// ---------------------------------------------------------------------------

#[tokio::test]
async fn one_failure_does_not_affect_siblings() {
    let call = Arc::new(ScriptedCall::default().behave("00003", Behavior::Fail));
    let results = dispatcher(call, 2).run(items(5)).await;

    for r in &results {
        if r.id == "00003" {
            assert!(!r.is_success());
            assert_eq!(r.reason(), Some("upstream"));
            assert!(r.error().unwrap().contains("500"));
        } else {
            assert!(r.is_success(), "{} should succeed: {r:?}", r.id);
        }
    }
}

#[tokio::test]
async fn panicking_call_becomes_error_result() {
    let call = Arc::new(ScriptedCall::default().behave("00002", Behavior::Panic));
    let d = dispatcher(call, 1);
    let results = d.run(items(3)).await;

    assert_eq!(results.len(), 3);
    assert_eq!(results[1].id, "00002");
    assert_eq!(results[1].reason(), Some("panic"));
    assert!(results[0].is_success());
    assert!(results[2].is_success());
    // Permit released by unwinding, so the batch did not stall at N=1
    assert_eq!(d.gate().available_permits(), 1);
}

#[tokio::test]
async fn failed_precheck_skips_remote_call() {
    let call = Arc::new(ScriptedCall::default().behave("00002", Behavior::MissingInput));
    let results = dispatcher(call.clone(), 1).run(items(3)).await;

    assert_eq!(results[1].reason(), Some("missing_input"));
    assert!(results[1].error().unwrap().contains("no frames"));
    assert!(!call.called().contains(&"00002".to_string()));
    assert_eq!(call.called().len(), 2);
}

#[tokio::test]
async fn failures_are_not_retried() {
    let call = Arc::new(ScriptedCall::default().behave("00001", Behavior::Fail));
    let results = dispatcher(call.clone(), 2).run(items(1)).await;
    assert!(!results[0].is_success());
    assert_eq!(call.called(), vec!["00001".to_string()]);
}

// ---------------------------------------------------------------------------
// Sink
// ---------------------------------------------------------------------------

#[tokio::test]
async fn run_into_writes_one_artifact_per_id() {
    let dir = unique_dir("sink");
    let sink = JsonDirSink::create(&dir).await.unwrap();
    assert_eq!(sink.dir(), dir.as_path());
    assert_eq!(sink.path_for("00001"), dir.join("00001_result.json"));
    let call = Arc::new(ScriptedCall::default().behave("00002", Behavior::Fail));

    let report = dispatcher(call, 2).run_into(items(3), &sink).await;
    assert_eq!(report.succeeded, 2);
    assert_eq!(report.failed, 1);
    assert_eq!(report.persist_errors, 0);

    let ok: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(dir.join("00001_result.json")).unwrap())
            .unwrap();
    assert_eq!(ok["answer"], "answer to Q1");
    assert!(ok.get("id").is_none(), "id lives in the file name");
    assert!(ok["latency_ms"].is_u64());

    let err: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(dir.join("00002_result.json")).unwrap())
            .unwrap();
    assert!(err.get("answer").is_none());
    assert_eq!(err["reason"], "upstream");

    // No temp files left behind
    let leftovers: Vec<_> = std::fs::read_dir(&dir)
        .unwrap()
        .filter_map(|e| e.ok())
        .filter(|e| e.path().extension().is_some_and(|x| x == "tmp"))
        .collect();
    assert!(leftovers.is_empty());

    let _ = std::fs::remove_dir_all(&dir);
}

#[tokio::test]
async fn rerun_overwrites_same_artifact() {
    let dir = unique_dir("rerun");
    let sink = JsonDirSink::create(&dir).await.unwrap();

    let failing = Arc::new(ScriptedCall::default().behave("00001", Behavior::Fail));
    dispatcher(failing, 1).run_into(items(1), &sink).await;
    let first = std::fs::read_to_string(sink.path_for("00001")).unwrap();
    assert!(first.contains("\"error\""));

    let passing = Arc::new(ScriptedCall::default());
    dispatcher(passing, 1).run_into(items(1), &sink).await;
    let second = std::fs::read_to_string(sink.path_for("00001")).unwrap();
    assert!(second.contains("\"answer\""));
    assert!(!second.contains("\"error\""));

    let _ = std::fs::remove_dir_all(&dir);
}

struct BrokenSink;

#[async_trait]
impl ResultSink for BrokenSink {
    async fn write(&self, _result: &ItemResult) -> Result<(), FrameQaError> {
        Err(FrameQaError::Other("disk full".to_string()))
    }
}

#[tokio::test]
async fn sink_failure_keeps_in_memory_results() {
    let call = Arc::new(ScriptedCall::default());
    let report = dispatcher(call, 2).run_into(items(3), &BrokenSink).await;
    assert_eq!(report.results.len(), 3);
    assert_eq!(report.succeeded, 3);
    assert_eq!(report.persist_errors, 3);
}

// ---------------------------------------------------------------------------
// Cooldown
// ---------------------------------------------------------------------------

#[tokio::test]
async fn cooldown_pauses_after_every_k_calls() {
    let pause = Duration::from_millis(250);
    let gate = Arc::new(ConcurrencyGate::new(2).with_cooldown(2, pause));
    let call = Arc::new(ScriptedCall::default());
    let d = BatchDispatcher::new(call, gate.clone());

    let start = Instant::now();
    let results = d.run(items(4)).await;
    let elapsed = start.elapsed();

    assert!(results.iter().all(|r| r.is_success()));
    assert_eq!(gate.completed(), 4);
    // Calls 3 and 4 wait out the pause set by call 2
    assert!(elapsed >= pause, "expected at least {pause:?}, took {elapsed:?}");
}

// ---------------------------------------------------------------------------
// Frame questions end to end (mock provider)
// ---------------------------------------------------------------------------

#[derive(Default)]
struct RecordingProvider {
    requests: Mutex<Vec<InferenceRequest>>,
}

#[async_trait]
impl InferenceProvider for RecordingProvider {
    fn name(&self) -> &str {
        "mock"
    }

    fn model(&self) -> &str {
        "mock-vision"
    }

    async fn infer(&self, req: &InferenceRequest) -> Result<InferenceResult, FrameQaError> {
        self.requests.lock().unwrap().push(req.clone());
        Ok(InferenceResult {
            text: "Frame 1 shows a left-turn arrow. <answer>A</answer>".to_string(),
            finish_reason: Some("stop".to_string()),
            model: "mock-vision".to_string(),
            provider: "mock".to_string(),
        })
    }
}

#[tokio::test]
async fn missing_frames_fail_without_remote_call() {
    let frames = unique_dir("frames");
    let clip = frames.join("00001");
    std::fs::create_dir_all(&clip).unwrap();
    std::fs::write(clip.join("frame_2.jpg"), b"jpeg-two").unwrap();
    std::fs::write(clip.join("frame_1.jpg"), b"jpeg-one").unwrap();
    std::fs::write(clip.join("notes.txt"), b"ignored").unwrap();
    // 00002 has an empty directory
    std::fs::create_dir_all(frames.join("00002")).unwrap();

    let provider = Arc::new(RecordingProvider::default());
    let call = FrameQuestion::new(
        provider.clone(),
        Arc::new(FrameDirStore::new(&frames)),
        PromptTemplate::new("{frame_count} frames. {question}"),
        SamplingParams::default(),
    );
    let d = BatchDispatcher::new(Arc::new(call), Arc::new(ConcurrencyGate::new(1)));

    let results = d
        .run(vec![
            WorkItem::new("00001", "Q1"),
            WorkItem::new("00002", "Q2"),
        ])
        .await;

    assert_eq!(results[0].id, "00001");
    assert!(results[0].answer().unwrap().contains("<answer>A</answer>"));
    assert_eq!(results[1].id, "00002");
    assert!(results[1].error().unwrap().contains("no frames"));

    let requests = provider.requests.lock().unwrap();
    assert_eq!(requests.len(), 1, "no remote call for the item without frames");
    let req = &requests[0];
    assert_eq!(req.prompt, "2 frames. Q1");
    assert_eq!(req.temperature, Some(0.0));
    assert_eq!(
        req.media,
        vec![
            MediaPart::InlineImage {
                mime_type: "image/jpeg".to_string(),
                bytes: b"jpeg-one".to_vec(),
            },
            MediaPart::InlineImage {
                mime_type: "image/jpeg".to_string(),
                bytes: b"jpeg-two".to_vec(),
            },
        ],
        "frames sent in file-name order"
    );

    let _ = std::fs::remove_dir_all(&frames);
}

#[tokio::test]
async fn letter_extraction_sends_answer_text_with_system_prompt() {
    let provider = Arc::new(RecordingProvider::default());
    let call = LetterExtraction::new(
        provider.clone(),
        SamplingParams {
            temperature: Some(0.0),
            top_p: None,
            max_tokens: Some(50),
        },
    );
    let d = BatchDispatcher::new(Arc::new(call), Arc::new(ConcurrencyGate::new(10)));

    let results = d
        .run(vec![
            WorkItem::new("00051", "The car ahead brakes, so the answer is A."),
            WorkItem::new("00052", "   "),
        ])
        .await;

    assert_eq!(results[0].answer(), Some("Frame 1 shows a left-turn arrow. <answer>A</answer>"));
    assert_eq!(results[1].reason(), Some("missing_input"));

    let requests = provider.requests.lock().unwrap();
    assert_eq!(requests.len(), 1);
    let req = &requests[0];
    assert_eq!(req.prompt, "The car ahead brakes, so the answer is A.");
    assert_eq!(req.system_prompt.as_deref(), Some(EXTRACT_SYSTEM_PROMPT));
    assert!(req.media.is_empty());
    assert_eq!(req.max_tokens, Some(50));
    assert_eq!(req.top_p, None);
}
