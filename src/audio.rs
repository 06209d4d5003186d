use crate::transport::PlaybackTransport;
use ringbuf::HeapRb;
use ringbuf::traits::{Consumer as _, Producer as _, Split as _};
use rustfft::num_complex::Complex;
use rustfft::{Fft, FftPlanner};
use std::f32::consts::PI;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// Transform size; yields `BIN_COUNT` frequency bins.
pub const FFT_SIZE: usize = 256;
pub const BIN_COUNT: usize = FFT_SIZE / 2;
/// Share of the lowest bins averaged into the bass level.
pub const BASS_BIN_FRACTION: f32 = 0.2;
/// Samples buffered between the audio callback and the analyzer.
pub const TAP_CAPACITY: usize = 8192;

const SMOOTHING: f32 = 0.8;
const MIN_DB: f32 = -100.0;
const MAX_DB: f32 = -30.0;

pub fn bass_bin_count() -> usize {
    ((BIN_COUNT as f32) * BASS_BIN_FRACTION).floor() as usize
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TapError {
    /// The transport already handed its tap to another analyzer.
    AlreadyBound,
    Closed,
}

impl fmt::Display for TapError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AlreadyBound => write!(f, "transport already has an analysis tap bound"),
            Self::Closed => write!(f, "analyzer is closed"),
        }
    }
}

impl std::error::Error for TapError {}

/// Producer half of a sample tap, fed mono samples by the playback side.
pub struct TapWriter {
    prod: ringbuf::HeapProd<f32>,
}

impl TapWriter {
    pub fn push(&mut self, sample: f32) {
        let _ = self.prod.try_push(sample);
    }

    pub fn push_slice(&mut self, samples: &[f32]) {
        for &s in samples {
            let _ = self.prod.try_push(s);
        }
    }
}

/// Consumer half of a sample tap, owned by the analyzer once attached.
pub struct SampleTap {
    cons: ringbuf::HeapCons<f32>,
}

pub fn sample_tap() -> (TapWriter, SampleTap) {
    let rb = HeapRb::<f32>::new(TAP_CAPACITY);
    let (prod, cons) = rb.split();
    (TapWriter { prod }, SampleTap { cons })
}

struct AnalysisGraph {
    tap: SampleTap,
    scratch: Vec<f32>,
    write_pos: usize,
    window: Vec<f32>,
    fft: Arc<dyn Fft<f32>>,
    fft_buf: Vec<Complex<f32>>,
    smoothed: Vec<f32>,
    levels: Vec<f32>,
}

impl AnalysisGraph {
    fn new(tap: SampleTap) -> Self {
        let n = FFT_SIZE;
        // Blackman window.
        let window = (0..n)
            .map(|i| {
                let x = 2.0 * PI * i as f32 / n as f32;
                0.42 - 0.5 * x.cos() + 0.08 * (2.0 * x).cos()
            })
            .collect();
        let mut planner = FftPlanner::<f32>::new();
        Self {
            tap,
            scratch: vec![0.0; n],
            write_pos: 0,
            window,
            fft: planner.plan_fft_forward(n),
            fft_buf: vec![Complex { re: 0.0, im: 0.0 }; n],
            smoothed: vec![0.0; BIN_COUNT],
            levels: vec![0.0; BIN_COUNT],
        }
    }

    fn drain(&mut self) {
        let n = self.scratch.len();
        while let Some(s) = self.tap.cons.try_pop() {
            self.scratch[self.write_pos] = s;
            self.write_pos = (self.write_pos + 1) % n;
        }
    }

    /// Refreshes `levels` with the smoothed spectrum of the newest window,
    /// mapped from decibels to 0..1.
    fn snapshot(&mut self) -> &[f32] {
        self.drain();

        let n = self.fft_buf.len();
        for i in 0..n {
            let s = self.scratch[(self.write_pos + i) % n];
            self.fft_buf[i].re = s * self.window[i];
            self.fft_buf[i].im = 0.0;
        }
        self.fft.process(&mut self.fft_buf);

        let scale = 1.0 / n as f32;
        for (i, c) in self.fft_buf.iter().take(BIN_COUNT).enumerate() {
            let mag = (c.re * c.re + c.im * c.im).sqrt() * scale;
            self.smoothed[i] = SMOOTHING * self.smoothed[i] + (1.0 - SMOOTHING) * mag;
            let db = if self.smoothed[i] > 0.0 {
                20.0 * self.smoothed[i].log10()
            } else {
                f32::NEG_INFINITY
            };
            self.levels[i] = ((db - MIN_DB) / (MAX_DB - MIN_DB)).clamp(0.0, 1.0);
        }
        &self.levels
    }
}

enum AnalyzerState {
    Detached,
    Attached(Box<AnalysisGraph>),
    Closed,
}

/// Turns the playing audio into a bass-energy scalar.
///
/// The analyzer is a pure sampler: it never decays its own output while
/// playback is paused, that is left to the caller.
pub struct BassAnalyzer {
    state: AnalyzerState,
}

impl Default for BassAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}

impl BassAnalyzer {
    pub fn new() -> Self {
        Self {
            state: AnalyzerState::Detached,
        }
    }

    /// Binds the analysis graph to `transport`. Calling it again once attached
    /// is a no-op, so the transport's single-use tap is never requested twice.
    /// Call after playback has started.
    pub fn attach(&mut self, transport: &mut dyn PlaybackTransport) -> Result<(), TapError> {
        match self.state {
            AnalyzerState::Attached(_) => Ok(()),
            AnalyzerState::Closed => Err(TapError::Closed),
            AnalyzerState::Detached => {
                let tap = transport.bind_tap()?;
                debug!(fft_size = FFT_SIZE, bins = BIN_COUNT, "analyzer attached");
                self.state = AnalyzerState::Attached(Box::new(AnalysisGraph::new(tap)));
                Ok(())
            }
        }
    }

    pub fn is_attached(&self) -> bool {
        matches!(self.state, AnalyzerState::Attached(_))
    }

    pub fn is_closed(&self) -> bool {
        matches!(self.state, AnalyzerState::Closed)
    }

    /// Normalized (0..1) spectrum of the newest window, or `None` when detached.
    pub fn frequency_data(&mut self) -> Option<&[f32]> {
        match &mut self.state {
            AnalyzerState::Attached(graph) => Some(graph.snapshot()),
            _ => None,
        }
    }

    /// Average of the lowest `bass_bin_count()` bins; 0 when not attached.
    pub fn sample_bass_level(&mut self) -> f32 {
        let Some(levels) = self.frequency_data() else {
            return 0.0;
        };
        let bins = bass_bin_count().min(levels.len()).max(1);
        let sum: f32 = levels[..bins].iter().sum();
        (sum / bins as f32).clamp(0.0, 1.0)
    }

    /// Disconnects the graph. Closing twice is a no-op.
    pub fn close(&mut self) {
        if matches!(self.state, AnalyzerState::Closed) {
            return;
        }
        if self.is_attached() {
            debug!("analyzer disconnected");
        }
        self.state = AnalyzerState::Closed;
    }
}
