use std::collections::HashMap;
use std::f32::consts::PI;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bass_cube::catalog::CatalogPlaylist;
use bass_cube::faces::{ContentKind, FaceResolver, ImageCache, ImageMode};
use bass_cube::preset::{Face, Preset, builtin_presets};
use bass_cube::services::{
    GenerateError, GeneratedImage, ImageGenerator, PresetRemixer, ProceduralRemixer, RemixError,
    image_prompt,
};
use bass_cube::session::{
    BASS_DECAY_PER_S, FrameSnapshot, InputFocus, KeyCommand, RemixStatus, Session, SessionState,
};
use bass_cube::track::{Lyric, Track};
use bass_cube::transport::{Clip, MemoryTransport};
use tokio::runtime::Handle;
use tokio::sync::{Mutex, oneshot};

const SR: u32 = 8_000;
const DT: f32 = 1.0 / 30.0;

fn track(id: u32, lyrics: Vec<Lyric>) -> Track {
    Track {
        id,
        title: format!("Track {id}"),
        artist: "Tester".to_string(),
        description: "heavy bass test tone".to_string(),
        audio_src: format!("mem://{id}"),
        cover: String::new(),
        lyrics,
    }
}

fn sine_clip(seconds: f32) -> Clip {
    let n = (seconds * SR as f32) as usize;
    let samples = (0..n)
        .map(|i| (2.0 * PI * 110.0 * i as f32 / SR as f32).sin() * 0.8)
        .collect();
    Clip::new(SR, samples)
}

fn preset(id: &str) -> Preset {
    builtin_presets()
        .into_iter()
        .find(|p| p.id == id)
        .expect("builtin preset exists")
}

struct Rig {
    clock: MemoryTransport,
    tracks: Vec<Arc<Track>>,
    session: Session,
}

/// Three tracks, each with a clip of `clip_s` seconds, and a text-only board.
fn rig(clip_s: f32) -> Rig {
    rig_with(clip_s, ImageCache::new(), ImageMode::TextOnly)
}

fn rig_with(clip_s: f32, cache: ImageCache, mode: ImageMode) -> Rig {
    let tracks: Vec<Track> = (1..=3)
        .map(|id| {
            track(
                id,
                vec![
                    Lyric::new(0.0, format!("intro{id}")),
                    Lyric::new(2.0, "Stuck"),
                    Lyric::new(2.5, "in"),
                ],
            )
        })
        .collect();

    let clock = MemoryTransport::new();
    for t in &tracks {
        clock.insert_clip(t.audio_src.clone(), sine_clip(clip_s));
    }
    let faces = FaceResolver::new(cache, mode, Handle::current());
    let session = Session::new(
        Box::new(clock.clone()),
        Box::new(CatalogPlaylist::new(tracks.clone())),
        faces,
        preset("p1"),
    );
    Rig {
        clock,
        tracks: tracks.into_iter().map(Arc::new).collect(),
        session,
    }
}

fn assigned_faces(snap: &FrameSnapshot) -> usize {
    snap.faces.iter().filter(|f| f.is_some()).count()
}

async fn tick_until(
    session: &mut Session,
    mut done: impl FnMut(&FrameSnapshot) -> bool,
) -> FrameSnapshot {
    for _ in 0..400 {
        let snap = session.tick(DT);
        if done(&snap) {
            return snap;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("session never reached the expected frame");
}

#[tokio::test]
async fn autoplay_waits_for_the_next_tick() {
    let mut rig = rig(4.0);
    rig.session.assign_track(rig.tracks[0].clone());
    assert_eq!(rig.session.state(), SessionState::Loading);

    let snap = rig.session.tick(DT);
    assert_eq!(snap.state, SessionState::Playing);
    assert_eq!(snap.track.as_ref().map(|t| t.id), Some(1));
}

#[tokio::test]
async fn second_assignment_before_tick_wins() {
    let mut rig = rig(4.0);
    rig.session.assign_track(rig.tracks[0].clone());
    rig.session.tick(DT);
    rig.clock.advance(2.1);
    let snap = rig.session.tick(DT);
    assert!(assigned_faces(&snap) > 0);

    rig.session.assign_track(rig.tracks[1].clone());
    rig.session.assign_track(rig.tracks[2].clone());
    let snap = rig.session.tick(DT);

    assert_eq!(snap.state, SessionState::Playing);
    assert_eq!(snap.track.as_ref().map(|t| t.id), Some(3));
    assert_eq!(snap.position_s, 0.0);
    // Only the new track's first word is on the board.
    assert_eq!(assigned_faces(&snap), 1);
    let front = snap.faces[Face::Front.index()]
        .as_ref()
        .expect("front face shows the first word");
    assert_eq!(front.key, "intro3");
    assert_eq!(front.kind, ContentKind::Text);
}

#[tokio::test]
async fn active_word_lands_on_its_face() {
    let mut rig = rig(4.0);
    rig.session.assign_track(rig.tracks[0].clone());
    rig.session.tick(DT);
    rig.clock.advance(2.3);
    let snap = rig.session.tick(DT);

    let active = snap.active.expect("a word is active");
    assert_eq!(active.index, 1);
    assert_eq!(active.word, "Stuck");
    assert_eq!(active.face, Face::Back);
    let back = snap.faces[Face::Back.index()]
        .as_ref()
        .expect("back face assigned");
    assert_eq!(back.key, "Stuck");
}

#[tokio::test]
async fn lyric_offset_delays_words() {
    let mut rig = rig(4.0);
    rig.session.set_lyrics_offset(1.0);
    rig.session.assign_track(rig.tracks[0].clone());
    rig.session.tick(DT);
    rig.clock.advance(2.3);
    let snap = rig.session.tick(DT);
    assert_eq!(snap.active.map(|a| a.index), Some(0));
}

#[tokio::test]
async fn ended_track_advances_to_the_next() {
    let mut rig = rig(0.5);
    rig.session.assign_track(rig.tracks[0].clone());
    rig.session.tick(DT);
    rig.clock.advance(1.0);

    let snap = rig.session.tick(DT);
    assert_eq!(snap.state, SessionState::Loading);
    assert_eq!(snap.track.as_ref().map(|t| t.id), Some(2));

    let snap = rig.session.tick(DT);
    assert_eq!(snap.state, SessionState::Playing);
}

#[tokio::test]
async fn last_track_wraps_to_the_first() {
    let mut rig = rig(0.5);
    rig.session.assign_track(rig.tracks[2].clone());
    rig.session.tick(DT);
    rig.clock.advance(1.0);
    let snap = rig.session.tick(DT);
    assert_eq!(snap.track.as_ref().map(|t| t.id), Some(1));
}

#[tokio::test]
async fn rejected_autoplay_leaves_session_paused() {
    let mut rig = rig(4.0);
    rig.clock.set_play_rejected(true);
    rig.session.assign_track(rig.tracks[0].clone());
    let snap = rig.session.tick(DT);
    assert_eq!(snap.state, SessionState::Paused);

    // A user gesture later succeeds.
    rig.clock.set_play_rejected(false);
    assert!(rig.session.handle_key(KeyCommand::TogglePlay, InputFocus::Visualizer));
    assert_eq!(rig.session.state(), SessionState::Playing);
}

#[tokio::test]
async fn unknown_source_pauses_instead_of_failing() {
    let mut rig = rig(4.0);
    let mut missing = track(9, Vec::new());
    missing.audio_src = "mem://missing".to_string();
    rig.session.assign_track(Arc::new(missing));
    let snap = rig.session.tick(DT);
    assert_eq!(snap.state, SessionState::Paused);
    assert_eq!(snap.track.as_ref().map(|t| t.id), Some(9));
}

#[tokio::test]
async fn bass_decays_linearly_once_paused() {
    let mut rig = rig(4.0);
    rig.session.assign_track(rig.tracks[0].clone());
    rig.session.tick(DT);
    rig.clock.advance(0.5);
    let mut loud = 0.0;
    for _ in 0..40 {
        loud = rig.session.tick(DT).render.bass_level;
    }
    assert!(loud > 0.1, "bass while playing = {loud}");

    rig.session.pause();
    let snap = rig.session.tick(0.1);
    let expected = loud - BASS_DECAY_PER_S * 0.1;
    assert!((snap.render.bass_level - expected).abs() < 1e-5);
    assert!(snap.render.cube_scale < 1.0 + loud * snap.preset.bass_reaction.scale);

    let snap = rig.session.tick(10.0);
    assert_eq!(snap.render.bass_level, 0.0);
    assert_eq!(snap.render.cube_scale, 1.0);
}

#[tokio::test]
async fn keys_are_ignored_while_typing() {
    let mut rig = rig(4.0);
    rig.session.assign_track(rig.tracks[0].clone());
    rig.session.tick(DT);

    for key in [
        KeyCommand::TogglePlay,
        KeyCommand::NextTrack,
        KeyCommand::VolumeDown,
        KeyCommand::Close,
    ] {
        assert!(!rig.session.handle_key(key, InputFocus::TextInput));
    }
    assert_eq!(rig.session.state(), SessionState::Playing);
    assert_eq!(rig.session.track().map(|t| t.id), Some(1));
    assert_eq!(rig.session.volume(), 1.0);
}

#[tokio::test]
async fn track_keys_step_through_the_playlist() {
    let mut rig = rig(4.0);
    rig.session.assign_track(rig.tracks[0].clone());
    rig.session.tick(DT);

    rig.session.handle_key(KeyCommand::PreviousTrack, InputFocus::Visualizer);
    assert_eq!(rig.session.track().map(|t| t.id), Some(3));
    rig.session.handle_key(KeyCommand::NextTrack, InputFocus::Visualizer);
    rig.session.handle_key(KeyCommand::NextTrack, InputFocus::Visualizer);
    assert_eq!(rig.session.track().map(|t| t.id), Some(2));
}

#[tokio::test]
async fn volume_keys_step_and_clamp() {
    let mut rig = rig(4.0);
    rig.session.handle_key(KeyCommand::VolumeDown, InputFocus::Visualizer);
    assert!((rig.session.volume() - 0.9).abs() < 1e-6);
    rig.session.handle_key(KeyCommand::VolumeUp, InputFocus::Visualizer);
    rig.session.handle_key(KeyCommand::VolumeUp, InputFocus::Visualizer);
    assert_eq!(rig.session.volume(), 1.0);
    rig.session.set_volume(-3.0);
    assert_eq!(rig.session.volume(), 0.0);
}

#[tokio::test]
async fn close_is_idempotent_and_freezes_the_session() {
    let mut rig = rig(4.0);
    rig.session.assign_track(rig.tracks[0].clone());
    rig.session.tick(DT);

    rig.session.close();
    rig.session.close();
    assert!(rig.session.is_closed());

    rig.session.assign_track(rig.tracks[1].clone());
    assert!(!rig.session.play());
    assert!(!rig.session.handle_key(KeyCommand::TogglePlay, InputFocus::Visualizer));
    let snap = rig.session.tick(DT);
    assert_eq!(snap.state, SessionState::Closed);
    assert_eq!(snap.track.as_ref().map(|t| t.id), Some(1));
    assert_eq!(snap.render.bass_level, 0.0);
    assert_eq!(assigned_faces(&snap), 0);
}

#[tokio::test]
async fn close_key_closes() {
    let mut rig = rig(4.0);
    assert!(rig.session.handle_key(KeyCommand::Close, InputFocus::Visualizer));
    assert_eq!(rig.session.state(), SessionState::Closed);
}

#[tokio::test]
async fn remix_without_remixer_is_refused() {
    let mut rig = rig(4.0);
    assert!(!rig.session.request_remix());
    assert_eq!(rig.session.remix_status(), &RemixStatus::Idle);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn remix_replaces_the_whole_preset() {
    let rig = rig(4.0);
    let mut session = rig
        .session
        .with_remixer(Arc::new(ProceduralRemixer::with_seed(11)), Handle::current());
    session.assign_track(rig.tracks[0].clone());
    let before = session.preset().clone();

    assert!(session.request_remix());
    assert!(!session.request_remix(), "one remix at a time");

    let snap = tick_until(&mut session, |s| matches!(s.remix, RemixStatus::Applied(_))).await;
    let RemixStatus::Applied(id) = &snap.remix else {
        unreachable!()
    };
    assert_eq!(&snap.preset.id, id);
    assert!(snap.preset.is_remix());
    assert!(snap.preset.id.starts_with("remix-"));
    assert!(snap.preset.validate().is_ok());
    assert!(snap.preset.name.ends_with(" Remix"));
    assert_ne!(*snap.preset, *before);
    // The source preset is untouched.
    assert_eq!(before.id, "p1");
}

struct BrokenRemixer;

#[async_trait]
impl PresetRemixer for BrokenRemixer {
    async fn remix(&self, _snapshot: &str, _description: &str) -> Result<String, RemixError> {
        Ok("{\"id\": \"half a preset\"".to_string())
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn failed_remix_keeps_the_current_preset() {
    let rig = rig(4.0);
    let mut session = rig
        .session
        .with_remixer(Arc::new(BrokenRemixer), Handle::current());

    assert!(session.request_remix());
    let snap = tick_until(&mut session, |s| matches!(s.remix, RemixStatus::Failed(_))).await;
    assert_eq!(snap.preset.id, "p1");

    // Failure is not sticky.
    assert!(session.request_remix());
}

/// Waits for the test to release it, then returns the snapshot unchanged.
struct GatedRemixer {
    gate: Mutex<Option<oneshot::Receiver<()>>>,
}

#[async_trait]
impl PresetRemixer for GatedRemixer {
    async fn remix(&self, snapshot: &str, _description: &str) -> Result<String, RemixError> {
        let gate = self.gate.lock().await.take();
        if let Some(gate) = gate {
            let _ = gate.await;
        }
        Ok(snapshot.to_string())
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn preset_switch_discards_pending_remix() {
    let (release, gate) = oneshot::channel();
    let remixer = GatedRemixer {
        gate: Mutex::new(Some(gate)),
    };
    let rig = rig(4.0);
    let mut session = rig.session.with_remixer(Arc::new(remixer), Handle::current());

    assert!(session.request_remix());
    session.set_preset(preset("p3")).expect("builtin preset is valid");
    assert_eq!(session.remix_status(), &RemixStatus::Idle);

    release.send(()).expect("remixer still waiting");
    for _ in 0..20 {
        session.tick(DT);
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    assert_eq!(session.preset().id, "p3");
    assert_eq!(session.remix_status(), &RemixStatus::Idle);
}

#[tokio::test]
async fn invalid_preset_is_rejected() {
    let mut rig = rig(4.0);
    let mut bad = preset("p2");
    bad.cube_material.opacity = 3.0;
    assert!(rig.session.set_preset(bad).is_err());
    assert_eq!(rig.session.preset().id, "p1");
}

/// Holds the prompts registered with `gate` until released; others pass.
#[derive(Default)]
struct GatedGenerator {
    gates: std::sync::Mutex<HashMap<String, oneshot::Receiver<()>>>,
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
        Ok(GeneratedImage::from_bytes(b"\x89PNG\r\n\x1a\n", "image/png"))
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn image_for_previous_track_never_lands_on_the_new_board() {
    let generator = Arc::new(GatedGenerator::default());
    let release = generator.gate("Stuck");
    let cache = ImageCache::new();
    let mut rig = rig_with(4.0, cache.clone(), ImageMode::Generate(generator.clone()));

    rig.session.assign_track(rig.tracks[0].clone());
    rig.session.tick(DT);
    rig.clock.advance(2.1);
    let snap = rig.session.tick(DT);
    let stuck_face = snap.active.as_ref().map(|a| a.face).expect("Stuck is active");
    assert_eq!(
        snap.faces[stuck_face.index()].as_ref().map(|c| c.kind),
        Some(ContentKind::Loading)
    );

    rig.session.assign_track(rig.tracks[1].clone());
    let snap = rig.session.tick(DT);
    assert_eq!(snap.track.as_ref().map(|t| t.id), Some(2));

    release.send(()).expect("Stuck still generating");
    tick_until(&mut rig.session, |_| cache.get("Stuck").is_some()).await;
    let mut snap = rig.session.tick(DT);
    for _ in 0..10 {
        tokio::time::sleep(Duration::from_millis(5)).await;
        snap = rig.session.tick(DT);
    }
    assert_eq!(snap.track.as_ref().map(|t| t.id), Some(2));
    assert!(snap.faces[stuck_face.index()].is_none());
    assert!(
        snap.faces
            .iter()
            .flatten()
            .all(|content| content.key != "Stuck"),
        "track 1 image leaked onto track 2"
    );

    // Track 2 reaching the same word is served from the cache.
    rig.clock.advance(2.1);
    let snap = rig.session.tick(DT);
    let content = snap.faces[stuck_face.index()]
        .as_ref()
        .expect("Stuck assigned for track 2");
    assert_eq!(content.key, "Stuck");
    assert_eq!(content.kind, ContentKind::Image);
}
