use crate::preset::Face;
use crate::services::{GenerateError, ImageGenerator, image_prompt};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::runtime::Handle;
use tokio::sync::{OnceCell, mpsc};
use tracing::{debug, warn};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ContentKind {
    Text,
    Image,
    Loading,
}

/// What one face shows for the lyric word currently assigned to it.
///
/// `payload` is the word itself for `Text` and `Loading` (used as a caption),
/// and a `data:` locator for `Image`.
#[derive(Clone, Debug, PartialEq)]
pub struct DynamicFaceContent {
    pub key: String,
    pub kind: ContentKind,
    pub payload: Arc<str>,
}

impl DynamicFaceContent {
    fn text(word: &str) -> Self {
        Self {
            key: word.to_string(),
            kind: ContentKind::Text,
            payload: Arc::from(word),
        }
    }

    fn loading(word: &str) -> Self {
        Self {
            key: word.to_string(),
            kind: ContentKind::Loading,
            payload: Arc::from(word),
        }
    }

    fn image(word: &str, locator: Arc<str>) -> Self {
        Self {
            key: word.to_string(),
            kind: ContentKind::Image,
            payload: locator,
        }
    }
}

type Slot = Arc<OnceCell<Arc<str>>>;

/// Word -> image locator store shared by every resolver that holds a clone.
///
/// Entries are insert-only and never evicted. Each word has its own cell, so
/// at most one generation per word runs at a time; a failed generation leaves
/// the cell empty and the next caller tries again.
#[derive(Clone, Default)]
pub struct ImageCache {
    entries: Arc<Mutex<HashMap<String, Slot>>>,
}

impl ImageCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self, word: &str) -> Slot {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries
            .entry(word.to_string())
            .or_insert_with(|| Arc::new(OnceCell::new()))
            .clone()
    }

    pub fn get(&self, word: &str) -> Option<Arc<str>> {
        let entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.get(word).and_then(|cell| cell.get().cloned())
    }

    /// Number of resolved words.
    pub fn len(&self) -> usize {
        let entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.values().filter(|cell| cell.initialized()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the cached locator for `word`, generating it first if needed.
    /// Concurrent callers for the same word share a single generation.
    pub async fn get_or_generate(
        &self,
        word: &str,
        generator: &dyn ImageGenerator,
    ) -> Result<Arc<str>, GenerateError> {
        let cell = self.slot(word);
        cell.get_or_try_init(|| async {
            let image = generator.generate(&image_prompt(word)).await?;
            image.validate()?;
            Ok::<_, GenerateError>(Arc::from(image.data_url()))
        })
        .await
        .cloned()
    }
}

#[derive(Clone)]
pub enum ImageMode {
    Generate(Arc<dyn ImageGenerator>),
    /// Faces show the word as text; nothing is generated.
    TextOnly,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ResolveState {
    Loading,
    Ready,
    Failed,
}

/// Outcome counts from one [`FaceResolver::poll_completions`] call.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CompletionSummary {
    pub applied: usize,
    pub stale: usize,
    pub failed: usize,
}

impl CompletionSummary {
    pub fn total(&self) -> usize {
        self.applied + self.stale + self.failed
    }
}

struct Completion {
    epoch: u64,
    face: Face,
    word: String,
    result: Result<Arc<str>, GenerateError>,
}

/// The six dynamic face slots plus the machinery that fills them.
///
/// Generation runs on the runtime behind `handle`; results come back over a
/// channel and are only applied by [`poll_completions`](Self::poll_completions),
/// so the owner never waits on a request.
pub struct FaceResolver {
    slots: [Option<DynamicFaceContent>; Face::COUNT],
    epoch: u64,
    cache: ImageCache,
    mode: ImageMode,
    handle: Handle,
    tx: mpsc::UnboundedSender<Completion>,
    rx: mpsc::UnboundedReceiver<Completion>,
    in_flight: usize,
    /// Faces whose current word still has a generation outstanding.
    pending: [bool; Face::COUNT],
}

impl FaceResolver {
    pub fn new(cache: ImageCache, mode: ImageMode, handle: Handle) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            slots: Default::default(),
            epoch: 0,
            cache,
            mode,
            handle,
            tx,
            rx,
            in_flight: 0,
            pending: [false; Face::COUNT],
        }
    }

    pub fn cache(&self) -> &ImageCache {
        &self.cache
    }

    pub fn get(&self, face: Face) -> Option<&DynamicFaceContent> {
        self.slots[face.index()].as_ref()
    }

    pub fn key(&self, face: Face) -> Option<&str> {
        self.get(face).map(|c| c.key.as_str())
    }

    /// Requests that have not reported back yet.
    pub fn in_flight(&self) -> usize {
        self.in_flight
    }

    /// Assigns `word` to `face` and resolves its content.
    ///
    /// Cached words and text-only mode resolve immediately. Otherwise the face
    /// shows `Loading` and a generation is spawned. A blank word is ignored.
    ///
    /// Asking again for the word a face already holds is a no-op unless its
    /// last generation failed, in which case a new one is spawned.
    pub fn resolve(&mut self, face: Face, word: &str) -> ResolveState {
        let word = word.trim();
        if word.is_empty() {
            return ResolveState::Failed;
        }

        if let Some(current) = self.get(face) {
            if current.key == word {
                match current.kind {
                    ContentKind::Loading if self.pending[face.index()] => {
                        return ResolveState::Loading;
                    }
                    ContentKind::Loading => {}
                    _ => return ResolveState::Ready,
                }
            }
        }

        let generator = match &self.mode {
            ImageMode::TextOnly => {
                self.pending[face.index()] = false;
                self.slots[face.index()] = Some(DynamicFaceContent::text(word));
                return ResolveState::Ready;
            }
            ImageMode::Generate(generator) => Arc::clone(generator),
        };

        if let Some(locator) = self.cache.get(word) {
            self.pending[face.index()] = false;
            self.slots[face.index()] = Some(DynamicFaceContent::image(word, locator));
            return ResolveState::Ready;
        }

        self.slots[face.index()] = Some(DynamicFaceContent::loading(word));
        self.pending[face.index()] = true;
        self.in_flight += 1;
        debug!(face = face.label(), word, "face image requested");

        let cache = self.cache.clone();
        let tx = self.tx.clone();
        let epoch = self.epoch;
        let word = word.to_string();
        self.handle.spawn(async move {
            let result = cache.get_or_generate(&word, generator.as_ref()).await;
            // Receiver gone means the resolver was dropped; nothing to update.
            let _ = tx.send(Completion {
                epoch,
                face,
                word,
                result,
            });
        });
        ResolveState::Loading
    }

    /// Applies finished generations. A result lands only if its face still
    /// holds the same word and the board was not cleared in between.
    pub fn poll_completions(&mut self) -> CompletionSummary {
        let mut summary = CompletionSummary::default();
        while let Ok(done) = self.rx.try_recv() {
            self.in_flight = self.in_flight.saturating_sub(1);

            let current = done.epoch == self.epoch
                && self.key(done.face) == Some(done.word.as_str());
            if current {
                self.pending[done.face.index()] = false;
            }

            let locator = match done.result {
                Ok(locator) => locator,
                Err(err) => {
                    warn!(word = %done.word, "face image generation failed: {err}");
                    summary.failed += 1;
                    continue;
                }
            };

            if !current {
                debug!(face = done.face.label(), word = %done.word, "stale face image dropped");
                summary.stale += 1;
                continue;
            }

            self.slots[done.face.index()] = Some(DynamicFaceContent::image(&done.word, locator));
            summary.applied += 1;
        }
        summary
    }

    /// Empties every face. Requests still in flight will be dropped on arrival.
    pub fn clear(&mut self) {
        self.slots = Default::default();
        self.pending = [false; Face::COUNT];
        self.epoch = self.epoch.wrapping_add(1);
    }
}
