use crate::audio::{SampleTap, TapError, TapWriter, sample_tap};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{FromSample, SampleFormat, SizedSample};
use std::collections::HashMap;
use std::fmt;
use std::io::{self, Write};
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TransportEvent {
    TimeUpdate(f32),
    Ended,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PlaybackError {
    NoSource,
    Decode(String),
    Device(String),
    /// The environment refused to start playback (e.g. autoplay policy).
    Rejected(String),
}

impl fmt::Display for PlaybackError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoSource => write!(f, "no audio source loaded"),
            Self::Decode(msg) => write!(f, "decode error: {msg}"),
            Self::Device(msg) => write!(f, "audio device error: {msg}"),
            Self::Rejected(msg) => write!(f, "playback rejected: {msg}"),
        }
    }
}

impl std::error::Error for PlaybackError {}

/// Scheduled-media primitive the session drives: one source at a time, a
/// playback clock, and a single analysis tap that survives source changes.
pub trait PlaybackTransport {
    /// Replaces the source; playback stops and the position resets to 0.
    fn load(&mut self, src: &str) -> Result<(), PlaybackError>;
    fn unload(&mut self);
    fn play(&mut self) -> Result<(), PlaybackError>;
    fn pause(&mut self);
    fn is_playing(&self) -> bool;
    fn current_time(&self) -> f32;
    fn duration(&self) -> f32;
    fn seek(&mut self, time_s: f32);
    fn volume(&self) -> f32;
    fn set_volume(&mut self, volume: f32);
    fn poll_events(&mut self) -> Vec<TransportEvent>;
    /// Hands out the analysis tap. Fails once a tap has been bound.
    fn bind_tap(&mut self) -> Result<SampleTap, TapError>;
}

/// Decoded mono PCM.
#[derive(Clone, Debug)]
pub struct Clip {
    pub sample_rate: u32,
    pub samples: Arc<Vec<f32>>,
}

impl Clip {
    pub fn new(sample_rate: u32, samples: Vec<f32>) -> Self {
        Self {
            sample_rate: sample_rate.max(1),
            samples: Arc::new(samples),
        }
    }

    pub fn silence(sample_rate: u32, duration_s: f32) -> Self {
        let len = (duration_s.max(0.0) * sample_rate as f32) as usize;
        Self::new(sample_rate, vec![0.0; len])
    }

    pub fn duration(&self) -> f32 {
        self.samples.len() as f32 / self.sample_rate as f32
    }
}

pub fn decode_wav_mono(path: impl AsRef<Path>) -> Result<Clip, PlaybackError> {
    let path = path.as_ref();
    let reader = hound::WavReader::open(path)
        .map_err(|e| PlaybackError::Decode(format!("{}: {e}", path.display())))?;
    let spec = reader.spec();
    let channels = spec.channels.max(1) as usize;

    let interleaved: Vec<f32> = match spec.sample_format {
        hound::SampleFormat::Float => reader
            .into_samples::<f32>()
            .collect::<Result<_, _>>()
            .map_err(|e| PlaybackError::Decode(e.to_string()))?,
        hound::SampleFormat::Int => {
            let scale = 1.0 / (1u64 << (spec.bits_per_sample.clamp(1, 32) - 1)) as f32;
            reader
                .into_samples::<i32>()
                .map(|s| s.map(|v| v as f32 * scale))
                .collect::<Result<_, _>>()
                .map_err(|e| PlaybackError::Decode(e.to_string()))?
        }
    };

    let mono = interleaved
        .chunks(channels)
        .map(|frame| (frame.iter().sum::<f32>() / channels as f32).clamp(-1.0, 1.0))
        .collect();
    Ok(Clip::new(spec.sample_rate, mono))
}

pub fn list_output_devices() -> anyhow::Result<()> {
    use anyhow::Context;

    let host = cpal::default_host();
    let devices = host
        .output_devices()
        .context("enumerate output devices")?;

    let mut out = io::stdout();
    writeln!(out, "Output devices:")?;
    for dev in devices {
        let name = dev.name().unwrap_or_else(|_| "<unknown>".to_string());
        writeln!(out, "  - {}", name)?;
    }
    Ok(())
}

fn select_output_device(
    host: &cpal::Host,
    device_query: Option<&str>,
) -> Result<cpal::Device, PlaybackError> {
    let want = device_query.map(|s| s.to_lowercase());
    if let Some(want) = want.as_deref() {
        let devices = host
            .output_devices()
            .map_err(|e| PlaybackError::Device(e.to_string()))?;
        for dev in devices {
            if dev
                .name()
                .map(|n| n.to_lowercase().contains(want))
                .unwrap_or(false)
            {
                return Ok(dev);
            }
        }
        return Err(PlaybackError::Device(format!(
            "no output device matching: {want}"
        )));
    }

    host.default_output_device()
        .ok_or_else(|| PlaybackError::Device("no default output device found".to_string()))
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|e| e.into_inner())
}

/// State shared with the device callback.
struct PlayState {
    /// Clip position in source frames, as `f64` bits.
    position: AtomicU64,
    playing: AtomicBool,
    ended: AtomicBool,
    volume: AtomicU32,
}

impl PlayState {
    fn position(&self) -> f64 {
        f64::from_bits(self.position.load(Ordering::Acquire))
    }

    fn set_position(&self, frames: f64) {
        self.position.store(frames.to_bits(), Ordering::Release);
    }

    fn volume(&self) -> f32 {
        f32::from_bits(self.volume.load(Ordering::Relaxed))
    }
}

/// Plays WAV files through a cpal output stream.
pub struct WavTransport {
    device_query: Option<String>,
    clip: Option<Clip>,
    state: Arc<PlayState>,
    tap: Arc<Mutex<Option<TapWriter>>>,
    tap_reader: Option<SampleTap>,
    tap_bound: bool,
    stream: Option<cpal::Stream>,
    ended_reported: bool,
    last_reported_s: f32,
}

impl WavTransport {
    pub fn new(device_query: Option<&str>, volume: f32) -> Self {
        let (writer, reader) = sample_tap();
        Self {
            device_query: device_query.map(str::to_string),
            clip: None,
            state: Arc::new(PlayState {
                position: AtomicU64::new(0f64.to_bits()),
                playing: AtomicBool::new(false),
                ended: AtomicBool::new(false),
                volume: AtomicU32::new(volume.clamp(0.0, 1.0).to_bits()),
            }),
            tap: Arc::new(Mutex::new(Some(writer))),
            tap_reader: Some(reader),
            tap_bound: false,
            stream: None,
            ended_reported: false,
            last_reported_s: -1.0,
        }
    }

    fn build_stream(&self, clip: &Clip) -> Result<cpal::Stream, PlaybackError> {
        let host = cpal::default_host();
        let device = select_output_device(&host, self.device_query.as_deref())?;
        let supported = device
            .default_output_config()
            .map_err(|e| PlaybackError::Device(e.to_string()))?;
        let channels = supported.channels() as usize;
        let out_rate = supported.sample_rate().0;
        let config: cpal::StreamConfig = supported.clone().into();

        let render = Renderer {
            samples: Arc::clone(&clip.samples),
            step: clip.sample_rate as f64 / out_rate.max(1) as f64,
            channels,
            state: Arc::clone(&self.state),
            tap: Arc::clone(&self.tap),
        };

        let err_fn = |err| warn!("audio output stream error: {err}");

        let stream = match supported.sample_format() {
            SampleFormat::F32 => {
                let mut r = render;
                device.build_output_stream(
                    &config,
                    move |data: &mut [f32], _| r.fill(data),
                    err_fn,
                    None,
                )
            }
            SampleFormat::I16 => {
                let mut r = render;
                device.build_output_stream(
                    &config,
                    move |data: &mut [i16], _| r.fill(data),
                    err_fn,
                    None,
                )
            }
            SampleFormat::U16 => {
                let mut r = render;
                device.build_output_stream(
                    &config,
                    move |data: &mut [u16], _| r.fill(data),
                    err_fn,
                    None,
                )
            }
            fmt => {
                return Err(PlaybackError::Device(format!(
                    "unsupported sample format: {fmt:?}"
                )));
            }
        }
        .map_err(|e| PlaybackError::Device(e.to_string()))?;

        debug!(out_rate, channels, "output stream built");
        Ok(stream)
    }
}

struct Renderer {
    samples: Arc<Vec<f32>>,
    step: f64,
    channels: usize,
    state: Arc<PlayState>,
    tap: Arc<Mutex<Option<TapWriter>>>,
}

impl Renderer {
    fn fill<T: SizedSample + FromSample<f32>>(&mut self, data: &mut [T]) {
        let playing = self.state.playing.load(Ordering::Acquire);
        let volume = self.state.volume();
        let mut pos = self.state.position();
        let len = self.samples.len();
        let mut tap = self.tap.lock().ok();

        for frame in data.chunks_mut(self.channels.max(1)) {
            let mut s = 0.0f32;
            if playing {
                let idx = pos as usize;
                if idx + 1 < len {
                    let frac = (pos - idx as f64) as f32;
                    s = self.samples[idx] * (1.0 - frac) + self.samples[idx + 1] * frac;
                    pos += self.step;
                } else if idx < len {
                    s = self.samples[idx];
                    pos += self.step;
                } else {
                    self.state.playing.store(false, Ordering::Release);
                    self.state.ended.store(true, Ordering::Release);
                }
                s *= volume;
                if let Some(Some(writer)) = tap.as_deref_mut() {
                    writer.push(s);
                }
            }
            for out in frame.iter_mut() {
                *out = T::from_sample(s);
            }
        }

        if playing {
            self.state.set_position(pos.min(len as f64));
        }
    }
}

impl PlaybackTransport for WavTransport {
    fn load(&mut self, src: &str) -> Result<(), PlaybackError> {
        self.pause();
        self.stream = None;
        self.clip = None;
        self.state.set_position(0.0);
        self.state.ended.store(false, Ordering::Release);
        self.ended_reported = false;
        self.last_reported_s = -1.0;

        let clip = decode_wav_mono(src)?;
        debug!(src, duration_s = clip.duration(), "source loaded");
        self.clip = Some(clip);
        Ok(())
    }

    fn unload(&mut self) {
        self.pause();
        self.stream = None;
        self.clip = None;
        self.state.set_position(0.0);
    }

    fn play(&mut self) -> Result<(), PlaybackError> {
        let Some(clip) = self.clip.as_ref() else {
            return Err(PlaybackError::NoSource);
        };
        if self.stream.is_none() {
            self.stream = Some(self.build_stream(clip)?);
        }
        self.state.playing.store(true, Ordering::Release);
        if let Some(stream) = self.stream.as_ref() {
            if let Err(e) = stream.play() {
                self.state.playing.store(false, Ordering::Release);
                return Err(PlaybackError::Rejected(e.to_string()));
            }
        }
        Ok(())
    }

    fn pause(&mut self) {
        self.state.playing.store(false, Ordering::Release);
        if let Some(stream) = self.stream.as_ref() {
            let _ = stream.pause();
        }
    }

    fn is_playing(&self) -> bool {
        self.state.playing.load(Ordering::Acquire)
    }

    fn current_time(&self) -> f32 {
        match &self.clip {
            Some(clip) => (self.state.position() / clip.sample_rate as f64) as f32,
            None => 0.0,
        }
    }

    fn duration(&self) -> f32 {
        self.clip.as_ref().map(Clip::duration).unwrap_or(0.0)
    }

    fn seek(&mut self, time_s: f32) {
        if let Some(clip) = &self.clip {
            let frames = (time_s.clamp(0.0, clip.duration()) as f64) * clip.sample_rate as f64;
            self.state.set_position(frames);
            self.state.ended.store(false, Ordering::Release);
            self.ended_reported = false;
        }
    }

    fn volume(&self) -> f32 {
        self.state.volume()
    }

    fn set_volume(&mut self, volume: f32) {
        self.state
            .volume
            .store(volume.clamp(0.0, 1.0).to_bits(), Ordering::Relaxed);
    }

    fn poll_events(&mut self) -> Vec<TransportEvent> {
        let mut events = Vec::new();
        let t = self.current_time();
        if (t - self.last_reported_s).abs() > f32::EPSILON {
            self.last_reported_s = t;
            events.push(TransportEvent::TimeUpdate(t));
        }
        if !self.ended_reported && self.state.ended.load(Ordering::Acquire) {
            self.ended_reported = true;
            events.push(TransportEvent::Ended);
        }
        events
    }

    fn bind_tap(&mut self) -> Result<SampleTap, TapError> {
        if self.tap_bound {
            return Err(TapError::AlreadyBound);
        }
        let reader = self.tap_reader.take().ok_or(TapError::AlreadyBound)?;
        self.tap_bound = true;
        Ok(reader)
    }
}

impl Drop for WavTransport {
    fn drop(&mut self) {
        self.state.playing.store(false, Ordering::Release);
        // Dropping the stream stops the device callback.
        self.stream = None;
        lock(&self.tap).take();
    }
}

#[derive(Default)]
struct MemoryInner {
    clips: HashMap<String, Clip>,
    clip: Option<Clip>,
    position_s: f32,
    playing: bool,
    volume: f32,
    reject_play: bool,
    tap: Option<TapWriter>,
    tap_reader: Option<SampleTap>,
    tap_bound: bool,
    events: Vec<TransportEvent>,
}

/// In-memory transport advanced by an explicit clock. Clones share state, so
/// a caller can keep a handle to drive time while a session owns another.
#[derive(Clone)]
pub struct MemoryTransport {
    inner: Arc<Mutex<MemoryInner>>,
}

impl Default for MemoryTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryTransport {
    pub fn new() -> Self {
        let (writer, reader) = sample_tap();
        Self {
            inner: Arc::new(Mutex::new(MemoryInner {
                volume: 1.0,
                tap: Some(writer),
                tap_reader: Some(reader),
                ..MemoryInner::default()
            })),
        }
    }

    pub fn insert_clip(&self, src: impl Into<String>, clip: Clip) {
        lock(&self.inner).clips.insert(src.into(), clip);
    }

    /// Makes subsequent `play` calls fail, as a blocked autoplay would.
    pub fn set_play_rejected(&self, rejected: bool) {
        lock(&self.inner).reject_play = rejected;
    }

    /// Moves the clock forward by `dt_s`, feeding the tap with the audio
    /// that played in between.
    pub fn advance(&self, dt_s: f32) {
        let mut inner = lock(&self.inner);
        if !inner.playing {
            return;
        }
        let Some(clip) = inner.clip.clone() else {
            return;
        };

        let start_s = inner.position_s;
        let end_s = (start_s + dt_s.max(0.0)).min(clip.duration());
        let sr = clip.sample_rate as f32;
        let end = ((end_s * sr) as usize).min(clip.samples.len());
        // f32 seconds can round past the last sample on long clips.
        let start = ((start_s * sr) as usize).min(end);
        // Only the newest samples matter to the analyzer.
        let from = end.saturating_sub(crate::audio::TAP_CAPACITY).max(start);
        let volume = inner.volume;
        if let Some(writer) = inner.tap.as_mut() {
            for &s in &clip.samples[from..end] {
                writer.push(s * volume);
            }
        }

        inner.position_s = end_s;
        inner.events.push(TransportEvent::TimeUpdate(end_s));
        if end_s >= clip.duration() {
            inner.playing = false;
            inner.events.push(TransportEvent::Ended);
        }
    }
}

impl PlaybackTransport for MemoryTransport {
    fn load(&mut self, src: &str) -> Result<(), PlaybackError> {
        let mut inner = lock(&self.inner);
        inner.playing = false;
        inner.position_s = 0.0;
        inner.events.clear();
        inner.clip = inner.clips.get(src).cloned();
        if inner.clip.is_none() {
            return Err(PlaybackError::Decode(format!("unknown source: {src}")));
        }
        Ok(())
    }

    fn unload(&mut self) {
        let mut inner = lock(&self.inner);
        inner.playing = false;
        inner.position_s = 0.0;
        inner.clip = None;
        inner.events.clear();
    }

    fn play(&mut self) -> Result<(), PlaybackError> {
        let mut inner = lock(&self.inner);
        if inner.clip.is_none() {
            return Err(PlaybackError::NoSource);
        }
        if inner.reject_play {
            return Err(PlaybackError::Rejected(
                "play() requires a user gesture".to_string(),
            ));
        }
        inner.playing = true;
        Ok(())
    }

    fn pause(&mut self) {
        lock(&self.inner).playing = false;
    }

    fn is_playing(&self) -> bool {
        lock(&self.inner).playing
    }

    fn current_time(&self) -> f32 {
        lock(&self.inner).position_s
    }

    fn duration(&self) -> f32 {
        lock(&self.inner).clip.as_ref().map(Clip::duration).unwrap_or(0.0)
    }

    fn seek(&mut self, time_s: f32) {
        let mut inner = lock(&self.inner);
        let max = inner.clip.as_ref().map(Clip::duration).unwrap_or(0.0);
        inner.position_s = time_s.clamp(0.0, max);
    }

    fn volume(&self) -> f32 {
        lock(&self.inner).volume
    }

    fn set_volume(&mut self, volume: f32) {
        lock(&self.inner).volume = volume.clamp(0.0, 1.0);
    }

    fn poll_events(&mut self) -> Vec<TransportEvent> {
        std::mem::take(&mut lock(&self.inner).events)
    }

    fn bind_tap(&mut self) -> Result<SampleTap, TapError> {
        let mut inner = lock(&self.inner);
        if inner.tap_bound {
            return Err(TapError::AlreadyBound);
        }
        let reader = inner.tap_reader.take().ok_or(TapError::AlreadyBound)?;
        inner.tap_bound = true;
        Ok(reader)
    }
}
