//! Session controller: owns the transport and drives the analyzer, lyric
//! scheduler, face resolver and reaction model once per frame.

use crate::audio::BassAnalyzer;
use crate::catalog::PlaylistProvider;
use crate::faces::{DynamicFaceContent, FaceResolver};
use crate::lyrics;
use crate::preset::{Face, Preset, PresetError};
use crate::reaction::{self, RenderParams};
use crate::services::{PresetRemixer, RemixError, remix_preset};
use crate::track::Track;
use crate::transport::{PlaybackTransport, TransportEvent};
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Bass level lost per second while nothing is playing.
pub const BASS_DECAY_PER_S: f32 = 0.6;
pub const VOLUME_STEP: f32 = 0.1;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Loading,
    Playing,
    Paused,
    Ended,
    Closed,
}

impl SessionState {
    pub fn label(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Loading => "loading",
            Self::Playing => "playing",
            Self::Paused => "paused",
            Self::Ended => "ended",
            Self::Closed => "closed",
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum RemixStatus {
    Idle,
    Pending,
    Applied(String),
    Failed(String),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum KeyCommand {
    TogglePlay,
    NextTrack,
    PreviousTrack,
    Remix,
    VolumeUp,
    VolumeDown,
    Close,
}

/// Where keyboard input is going. Transport shortcuts only apply to the
/// visualizer; keys typed into a text field are left alone.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InputFocus {
    Visualizer,
    TextInput,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ActiveWord {
    pub index: usize,
    pub face: Face,
    pub word: String,
}

/// Everything a front end needs to draw one frame.
#[derive(Clone, Debug)]
pub struct FrameSnapshot {
    pub state: SessionState,
    pub position_s: f32,
    pub volume: f32,
    pub track: Option<Arc<Track>>,
    pub preset: Arc<Preset>,
    pub render: RenderParams,
    pub active: Option<ActiveWord>,
    pub faces: [Option<DynamicFaceContent>; Face::COUNT],
    pub remix: RemixStatus,
}

struct RemixDone {
    token: u64,
    result: Result<Preset, RemixError>,
}

struct Remixing {
    remixer: Arc<dyn PresetRemixer>,
    handle: Handle,
    tx: mpsc::UnboundedSender<RemixDone>,
    rx: mpsc::UnboundedReceiver<RemixDone>,
}

pub struct Session {
    state: SessionState,
    transport: Box<dyn PlaybackTransport>,
    analyzer: BassAnalyzer,
    playlist: Box<dyn PlaylistProvider>,
    faces: FaceResolver,
    track: Option<Arc<Track>>,
    preset: Arc<Preset>,
    bass: f32,
    autoplay_pending: bool,
    last_active: Option<usize>,
    lyrics_offset_s: f32,
    remixing: Option<Remixing>,
    remix_status: RemixStatus,
    remix_token: u64,
}

impl Session {
    pub fn new(
        transport: Box<dyn PlaybackTransport>,
        playlist: Box<dyn PlaylistProvider>,
        faces: FaceResolver,
        preset: Preset,
    ) -> Self {
        Self {
            state: SessionState::Idle,
            transport,
            analyzer: BassAnalyzer::new(),
            playlist,
            faces,
            track: None,
            preset: Arc::new(preset),
            bass: 0.0,
            autoplay_pending: false,
            last_active: None,
            lyrics_offset_s: 0.0,
            remixing: None,
            remix_status: RemixStatus::Idle,
            remix_token: 0,
        }
    }

    /// Enables [`request_remix`](Self::request_remix); requests run on `handle`.
    pub fn with_remixer(mut self, remixer: Arc<dyn PresetRemixer>, handle: Handle) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        self.remixing = Some(Remixing {
            remixer,
            handle,
            tx,
            rx,
        });
        self
    }

    /// Shifts the clock used for lyric lookup. Positive values show words later.
    pub fn set_lyrics_offset(&mut self, offset_s: f32) {
        self.lyrics_offset_s = if offset_s.is_finite() { offset_s } else { 0.0 };
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn track(&self) -> Option<&Arc<Track>> {
        self.track.as_ref()
    }

    pub fn preset(&self) -> &Arc<Preset> {
        &self.preset
    }

    pub fn bass_level(&self) -> f32 {
        self.bass
    }

    pub fn faces(&self) -> &FaceResolver {
        &self.faces
    }

    pub fn remix_status(&self) -> &RemixStatus {
        &self.remix_status
    }

    pub fn position(&self) -> f32 {
        self.transport.current_time()
    }

    pub fn volume(&self) -> f32 {
        self.transport.volume()
    }

    pub fn is_closed(&self) -> bool {
        self.state == SessionState::Closed
    }

    /// Switches to `track`: playback stops, position, bass and faces reset,
    /// and autoplay is attempted on the next tick. Assigning again before that
    /// tick simply replaces the pending track.
    pub fn assign_track(&mut self, track: Arc<Track>) {
        if self.is_closed() {
            warn!(track = %track.title, "track assigned to a closed session");
            return;
        }

        self.transport.pause();
        self.bass = 0.0;
        self.faces.clear();
        self.last_active = None;

        info!(id = track.id, title = %track.title, "track assigned");
        let loaded = self.transport.load(&track.audio_src);
        self.track = Some(track);
        match loaded {
            Ok(()) => {
                self.state = SessionState::Loading;
                self.autoplay_pending = true;
            }
            Err(err) => {
                warn!("track load failed: {err}");
                self.state = SessionState::Paused;
                self.autoplay_pending = false;
            }
        }
    }

    /// Starts or resumes playback. A rejected start leaves the session paused.
    pub fn play(&mut self) -> bool {
        match self.state {
            SessionState::Idle | SessionState::Closed => return false,
            SessionState::Playing => return true,
            SessionState::Ended => self.transport.seek(0.0),
            _ => {}
        }
        self.autoplay_pending = false;

        match self.transport.play() {
            Ok(()) => {
                self.state = SessionState::Playing;
                // The tap is only bound once playback has actually started.
                if let Err(err) = self.analyzer.attach(self.transport.as_mut()) {
                    warn!("analyzer attach failed: {err}");
                }
                true
            }
            Err(err) => {
                warn!("playback did not start: {err}");
                self.state = SessionState::Paused;
                false
            }
        }
    }

    pub fn pause(&mut self) {
        match self.state {
            SessionState::Playing | SessionState::Loading => {
                self.autoplay_pending = false;
                self.transport.pause();
                self.state = SessionState::Paused;
            }
            _ => {}
        }
    }

    pub fn toggle_play(&mut self) {
        if self.state == SessionState::Playing {
            self.pause();
        } else {
            self.play();
        }
    }

    pub fn next_track(&mut self) {
        self.skip(true);
    }

    pub fn previous_track(&mut self) {
        self.skip(false);
    }

    fn skip(&mut self, forward: bool) {
        if self.is_closed() {
            return;
        }
        let current = self.track.as_ref().map(|t| t.id).unwrap_or(0);
        let target = if forward {
            self.playlist.next(current)
        } else {
            self.playlist.previous(current)
        };
        match target {
            Some(track) => self.assign_track(track),
            None => debug!("playlist has no neighbour for track {current}"),
        }
    }

    pub fn set_volume(&mut self, volume: f32) {
        if self.is_closed() {
            return;
        }
        self.transport.set_volume(volume.clamp(0.0, 1.0));
    }

    /// Replaces the whole preset. Any remix still in flight is discarded on
    /// arrival.
    pub fn set_preset(&mut self, preset: Preset) -> Result<(), PresetError> {
        if self.is_closed() {
            return Ok(());
        }
        preset.validate()?;
        debug!(id = %preset.id, "preset switched");
        self.preset = Arc::new(preset);
        self.remix_token = self.remix_token.wrapping_add(1);
        if self.remix_status == RemixStatus::Pending {
            self.remix_status = RemixStatus::Idle;
        }
        Ok(())
    }

    /// Asks the remixer for a variant of the current preset. Returns `false`
    /// when no remixer is configured, one is already pending, or the session
    /// is closed.
    pub fn request_remix(&mut self) -> bool {
        if self.is_closed() || self.remix_status == RemixStatus::Pending {
            return false;
        }
        let Some(remixing) = self.remixing.as_ref() else {
            return false;
        };

        self.remix_token = self.remix_token.wrapping_add(1);
        let token = self.remix_token;
        let remixer = Arc::clone(&remixing.remixer);
        let tx = remixing.tx.clone();
        let current = Arc::clone(&self.preset);
        let description = self
            .track
            .as_ref()
            .map(|t| t.description.clone())
            .unwrap_or_default();

        remixing.handle.spawn(async move {
            let result = remix_preset(remixer.as_ref(), &current, &description).await;
            let _ = tx.send(RemixDone { token, result });
        });
        self.remix_status = RemixStatus::Pending;
        info!(from = %self.preset.id, "remix requested");
        true
    }

    /// Applies a transport shortcut. Returns whether the key was consumed;
    /// keys are never consumed while a text input has focus.
    pub fn handle_key(&mut self, command: KeyCommand, focus: InputFocus) -> bool {
        if focus == InputFocus::TextInput || self.is_closed() {
            return false;
        }
        match command {
            KeyCommand::TogglePlay => self.toggle_play(),
            KeyCommand::NextTrack => self.next_track(),
            KeyCommand::PreviousTrack => self.previous_track(),
            KeyCommand::Remix => {
                self.request_remix();
            }
            KeyCommand::VolumeUp => self.set_volume(self.volume() + VOLUME_STEP),
            KeyCommand::VolumeDown => self.set_volume(self.volume() - VOLUME_STEP),
            KeyCommand::Close => self.close(),
        }
        true
    }

    /// Tears down the analyzer and transport source. Further calls, ticks and
    /// commands have no effect.
    pub fn close(&mut self) {
        if self.is_closed() {
            return;
        }
        self.analyzer.close();
        self.transport.unload();
        self.faces.clear();
        self.autoplay_pending = false;
        self.last_active = None;
        self.bass = 0.0;
        self.state = SessionState::Closed;
        info!("session closed");
    }

    fn on_ended(&mut self) {
        self.state = SessionState::Ended;
        let current = self.track.as_ref().map(|t| t.id).unwrap_or(0);
        debug!(track = current, "track ended");
        if let Some(next) = self.playlist.next(current) {
            self.assign_track(next);
        }
    }

    fn update_bass(&mut self, dt_s: f32) {
        if self.state == SessionState::Playing {
            self.bass = self.analyzer.sample_bass_level();
        } else {
            self.bass = (self.bass - BASS_DECAY_PER_S * dt_s.max(0.0)).max(0.0);
        }
    }

    fn update_lyrics(&mut self) -> Option<ActiveWord> {
        let track = self.track.as_ref()?;
        let clock = self.transport.current_time() - self.lyrics_offset_s;
        let Some(active) = lyrics::active_lyric(&track.lyrics, clock) else {
            self.last_active = None;
            return None;
        };
        let active = ActiveWord {
            index: active.index,
            face: active.face,
            word: active.word.to_string(),
        };

        if self.last_active != Some(active.index) {
            self.last_active = Some(active.index);
            self.faces.resolve(active.face, &active.word);
        }
        Some(active)
    }

    fn apply_remixes(&mut self) {
        let Some(remixing) = self.remixing.as_mut() else {
            return;
        };
        while let Ok(done) = remixing.rx.try_recv() {
            if done.token != self.remix_token {
                debug!("stale remix result dropped");
                continue;
            }
            match done.result {
                Ok(preset) => {
                    info!(id = %preset.id, name = %preset.name, "remix applied");
                    self.remix_status = RemixStatus::Applied(preset.id.clone());
                    self.preset = Arc::new(preset);
                }
                Err(err) => {
                    warn!("remix failed: {err}");
                    self.remix_status = RemixStatus::Failed(err.to_string());
                }
            }
        }
    }

    /// Advances the session by one frame of `dt_s` seconds.
    pub fn tick(&mut self, dt_s: f32) -> FrameSnapshot {
        let mut active = None;
        if !self.is_closed() {
            if self.autoplay_pending {
                self.play();
            }

            for event in self.transport.poll_events() {
                if event == TransportEvent::Ended && self.state == SessionState::Playing {
                    self.on_ended();
                }
            }

            self.update_bass(dt_s);
            active = self.update_lyrics();
            self.faces.poll_completions();
            self.apply_remixes();
        }

        FrameSnapshot {
            state: self.state,
            position_s: self.transport.current_time(),
            volume: self.transport.volume(),
            track: self.track.clone(),
            preset: Arc::clone(&self.preset),
            render: reaction::react(self.bass, &self.preset),
            active,
            faces: Face::all().map(|face| self.faces.get(face).cloned()),
            remix: self.remix_status.clone(),
        }
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.close();
    }
}
