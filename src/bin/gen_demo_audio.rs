use std::f32::consts::PI;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Parser;

/// Writes the WAV files the built-in catalog points at.
#[derive(Parser, Debug)]
#[command(name = "gen_demo_audio")]
struct Args {
    #[arg(long, default_value = "assets")]
    out_dir: PathBuf,

    #[arg(long, default_value_t = 44_100)]
    sample_rate: u32,
}

struct Groove {
    file: &'static str,
    bpm: f32,
    root_hz: f32,
    /// Bars where the kick drops out, to give the bass meter something to fall to.
    breakdown: (usize, usize),
}

const GROOVES: &[Groove] = &[
    Groove {
        file: "cycle_cut.wav",
        bpm: 128.0,
        root_hz: 49.0,
        breakdown: (6, 7),
    },
    Groove {
        file: "mirror_break.wav",
        bpm: 140.0,
        root_hz: 55.0,
        breakdown: (4, 5),
    },
    Groove {
        file: "gone_with_the_drop.wav",
        bpm: 100.0,
        root_hz: 41.2,
        breakdown: (3, 5),
    },
];

const SECONDS: f32 = 24.0;

fn main() -> Result<()> {
    let args = Args::parse();
    let sr = args.sample_rate.clamp(8_000, 192_000);
    fs::create_dir_all(&args.out_dir)
        .with_context(|| format!("create dir {}", args.out_dir.display()))?;

    for groove in GROOVES {
        let path = args.out_dir.join(groove.file);
        let samples = render_groove(groove, sr);
        write_wav(&path, sr, &samples).with_context(|| format!("write {}", path.display()))?;
        println!(
            "generated: {} ({:.1}s @ {}Hz)",
            path.display(),
            samples.len() as f32 / sr as f32,
            sr
        );
    }
    Ok(())
}

fn render_groove(g: &Groove, sr: u32) -> Vec<f32> {
    let n = (SECONDS * sr as f32) as usize;
    let beat = 60.0 / g.bpm;
    let bar = beat * 4.0;
    let mut out = Vec::with_capacity(n);

    for i in 0..n {
        let t = i as f32 / sr as f32;
        let bar_idx = (t / bar) as usize;
        let in_break = (g.breakdown.0..=g.breakdown.1).contains(&bar_idx);

        let beat_t = t % beat;
        let kick = if in_break {
            0.0
        } else {
            // Pitch-dropping sine with a fast exponential decay.
            let f = g.root_hz * (1.0 + 3.0 * (-beat_t * 30.0).exp());
            (2.0 * PI * f * beat_t).sin() * (-beat_t * 7.0).exp() * 0.9
        };

        let sub = (2.0 * PI * g.root_hz * t).sin() * if in_break { 0.1 } else { 0.3 };

        let off_t = (t + beat * 0.5) % beat;
        let hat = pseudo_noise(i as u32) * (-off_t * 60.0).exp() * 0.12;

        let pad = (2.0 * PI * g.root_hz * 6.0 * t).sin() * 0.06 * (1.0 + (t * 0.25).sin());

        out.push((kick + sub + hat + pad).clamp(-1.0, 1.0));
    }
    out
}

fn pseudo_noise(x: u32) -> f32 {
    let mut n = x.wrapping_mul(374_761_393);
    n ^= n >> 13;
    n = n.wrapping_mul(1_274_126_177);
    n ^= n >> 16;
    (n & 0x00FF_FFFF) as f32 / 16_777_215.0 * 2.0 - 1.0
}

fn write_wav(path: &Path, sr: u32, samples: &[f32]) -> Result<()> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate: sr,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(path, spec)?;
    for &s in samples {
        writer.write_sample((s * i16::MAX as f32) as i16)?;
    }
    writer.finalize()?;
    Ok(())
}
