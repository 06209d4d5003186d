use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use bass_cube::faces::{
    CompletionSummary, ContentKind, FaceResolver, ImageCache, ImageMode, ResolveState,
};
use bass_cube::preset::Face;
use bass_cube::services::{GenerateError, GeneratedImage, ImageGenerator, image_prompt};
use tokio::runtime::Handle;
use tokio::sync::oneshot;

const PNG_MAGIC: &[u8] = b"\x89PNG\r\n\x1a\n";

fn png() -> GeneratedImage {
    GeneratedImage::from_bytes(PNG_MAGIC, "image/png")
}

/// Holds each prompt until the test releases it.
#[derive(Default)]
struct GatedGenerator {
    gates: Mutex<HashMap<String, oneshot::Receiver<()>>>,
}

impl GatedGenerator {
    fn gate(&self, word: &str) -> oneshot::Sender<()> {
        let (tx, rx) = oneshot::channel();
        self.gates
            .lock()
            .expect("gates lock")
            .insert(image_prompt(word), rx);
        tx
    }
}

#[async_trait]
impl ImageGenerator for GatedGenerator {
    async fn generate(&self, prompt: &str) -> Result<GeneratedImage, GenerateError> {
        let gate = self.gates.lock().expect("gates lock").remove(prompt);
        if let Some(gate) = gate {
            let _ = gate.await;
        }
        Ok(png())
    }
}

#[derive(Default)]
struct CountingGenerator {
    calls: AtomicUsize,
}

#[async_trait]
impl ImageGenerator for CountingGenerator {
    async fn generate(&self, _prompt: &str) -> Result<GeneratedImage, GenerateError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(10)).await;
        Ok(png())
    }
}

/// Fails the first `failures` calls, then succeeds.
struct FlakyGenerator {
    failures: AtomicUsize,
    calls: AtomicUsize,
}

impl FlakyGenerator {
    fn failing(times: usize) -> Self {
        Self {
            failures: AtomicUsize::new(times),
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl ImageGenerator for FlakyGenerator {
    async fn generate(&self, _prompt: &str) -> Result<GeneratedImage, GenerateError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let left = self.failures.load(Ordering::SeqCst);
        if left > 0 {
            self.failures.store(left - 1, Ordering::SeqCst);
            return Err(GenerateError::Api {
                status: 503,
                message: "overloaded".to_string(),
            });
        }
        Ok(png())
    }
}

struct FixedGenerator(GeneratedImage);

#[async_trait]
impl ImageGenerator for FixedGenerator {
    async fn generate(&self, _prompt: &str) -> Result<GeneratedImage, GenerateError> {
        Ok(self.0.clone())
    }
}

fn resolver(generator: Arc<dyn ImageGenerator>) -> FaceResolver {
    FaceResolver::new(
        ImageCache::new(),
        ImageMode::Generate(generator),
        Handle::current(),
    )
}

/// Polls until `expected` completions have been reported.
async fn settle(faces: &mut FaceResolver, expected: usize) -> CompletionSummary {
    let mut total = CompletionSummary::default();
    for _ in 0..400 {
        let s = faces.poll_completions();
        total.applied += s.applied;
        total.stale += s.stale;
        total.failed += s.failed;
        if total.total() >= expected {
            return total;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("only {} of {expected} completions arrived", total.total());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn late_result_for_replaced_word_is_dropped() {
    let generator = Arc::new(GatedGenerator::default());
    let release_alpha = generator.gate("alpha");
    let release_beta = generator.gate("beta");
    let mut faces = resolver(generator.clone());

    assert_eq!(faces.resolve(Face::Left, "alpha"), ResolveState::Loading);
    assert_eq!(faces.resolve(Face::Left, "beta"), ResolveState::Loading);

    release_alpha.send(()).expect("alpha still waiting");
    let summary = settle(&mut faces, 1).await;
    assert_eq!(summary.stale, 1);
    let left = faces.get(Face::Left).expect("left face assigned");
    assert_eq!(left.key, "beta");
    assert_eq!(left.kind, ContentKind::Loading);

    release_beta.send(()).expect("beta still waiting");
    let summary = settle(&mut faces, 1).await;
    assert_eq!(summary.applied, 1);
    let left = faces.get(Face::Left).expect("left face assigned");
    assert_eq!(left.key, "beta");
    assert_eq!(left.kind, ContentKind::Image);
    assert!(left.payload.starts_with("data:image/png;base64,"));
    assert_eq!(faces.in_flight(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn a_word_is_generated_once_and_then_served_from_cache() {
    let generator = Arc::new(CountingGenerator::default());
    let mut faces = resolver(generator.clone());

    assert_eq!(faces.resolve(Face::Front, "neon"), ResolveState::Loading);
    // Same word on the same face while in flight: no second request.
    assert_eq!(faces.resolve(Face::Front, "neon"), ResolveState::Loading);
    // Same word on another face shares the in-flight generation.
    assert_eq!(faces.resolve(Face::Back, "neon"), ResolveState::Loading);

    let summary = settle(&mut faces, 2).await;
    assert_eq!(summary.applied, 2);
    assert_eq!(generator.calls.load(Ordering::SeqCst), 1);
    assert_eq!(faces.cache().len(), 1);

    faces.clear();
    assert_eq!(faces.resolve(Face::Top, "neon"), ResolveState::Ready);
    assert_eq!(
        faces.get(Face::Top).map(|c| c.kind),
        Some(ContentKind::Image)
    );
    assert_eq!(generator.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn failed_generation_keeps_loading_and_retries_on_next_request() {
    let generator = Arc::new(FlakyGenerator::failing(1));
    let mut faces = resolver(generator.clone());

    faces.resolve(Face::Right, "static");
    let summary = settle(&mut faces, 1).await;
    assert_eq!(summary.failed, 1);
    assert_eq!(
        faces.get(Face::Right).map(|c| c.kind),
        Some(ContentKind::Loading)
    );
    assert!(faces.cache().get("static").is_none());

    // A fresh assignment of the word asks again.
    assert_eq!(faces.resolve(Face::Top, "static"), ResolveState::Loading);
    let summary = settle(&mut faces, 1).await;
    assert_eq!(summary.applied, 1);
    assert_eq!(generator.calls.load(Ordering::SeqCst), 2);
    assert_eq!(
        faces.get(Face::Top).map(|c| c.kind),
        Some(ContentKind::Image)
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn same_face_retries_a_word_whose_generation_failed() {
    let generator = Arc::new(FlakyGenerator::failing(1));
    let mut faces = resolver(generator.clone());

    assert_eq!(faces.resolve(Face::Front, "la"), ResolveState::Loading);
    let summary = settle(&mut faces, 1).await;
    assert_eq!(summary.failed, 1);
    assert_eq!(faces.in_flight(), 0);

    // The chorus brings the word back to the same face.
    assert_eq!(faces.resolve(Face::Front, "la"), ResolveState::Loading);
    assert_eq!(faces.in_flight(), 1);
    let summary = settle(&mut faces, 1).await;
    assert_eq!(summary.applied, 1);
    assert_eq!(generator.calls.load(Ordering::SeqCst), 2);
    assert_eq!(
        faces.get(Face::Front).map(|c| c.kind),
        Some(ContentKind::Image)
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn malformed_payloads_count_as_failures() {
    let cases = [
        GeneratedImage {
            image_bytes: "%%% not base64 %%%".to_string(),
            mime_type: "image/png".to_string(),
        },
        GeneratedImage {
            image_bytes: String::new(),
            mime_type: "image/png".to_string(),
        },
        GeneratedImage::from_bytes(b"<html/>", "text/html"),
    ];
    for image in cases {
        let mut faces = resolver(Arc::new(FixedGenerator(image)));
        faces.resolve(Face::Front, "glass");
        let summary = settle(&mut faces, 1).await;
        assert_eq!(summary.failed, 1);
        assert!(faces.cache().is_empty());
    }
}

#[tokio::test]
async fn text_only_mode_resolves_immediately() {
    let mut faces = FaceResolver::new(ImageCache::new(), ImageMode::TextOnly, Handle::current());
    assert_eq!(faces.resolve(Face::Bottom, "echo"), ResolveState::Ready);
    let content = faces.get(Face::Bottom).expect("bottom assigned");
    assert_eq!(content.kind, ContentKind::Text);
    assert_eq!(&*content.payload, "echo");
    assert_eq!(faces.in_flight(), 0);
}

#[tokio::test]
async fn blank_words_are_rejected() {
    let mut faces = resolver(Arc::new(CountingGenerator::default()));
    assert_eq!(faces.resolve(Face::Front, "   "), ResolveState::Failed);
    assert!(faces.get(Face::Front).is_none());
    assert_eq!(faces.in_flight(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn clear_drops_results_still_in_flight() {
    let generator = Arc::new(GatedGenerator::default());
    let release = generator.gate("drift");
    let mut faces = resolver(generator.clone());

    faces.resolve(Face::Back, "drift");
    faces.clear();
    assert!(faces.get(Face::Back).is_none());

    release.send(()).expect("drift still waiting");
    let summary = settle(&mut faces, 1).await;
    assert_eq!(summary.stale, 1);
    assert!(faces.get(Face::Back).is_none());
    // The cache still keeps the image for next time.
    assert!(faces.cache().get("drift").is_some());
}
