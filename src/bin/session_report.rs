use std::io::{BufWriter, Write};
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result, anyhow};
use bass_cube::catalog::{Catalog, CatalogPlaylist};
use bass_cube::faces::{FaceResolver, ImageCache, ImageMode};
use bass_cube::logging;
use bass_cube::services::ProceduralImageGenerator;
use bass_cube::session::{Session, SessionState};
use bass_cube::transport::{Clip, MemoryTransport, decode_wav_mono};
use clap::Parser;

/// Runs a session offline over a WAV file and prints one CSV row per frame.
#[derive(Parser, Debug)]
#[command(name = "session_report")]
struct Args {
    /// Audio to analyze. Without it the track plays as silence.
    #[arg(long)]
    audio: Option<PathBuf>,

    #[arg(long)]
    catalog: Option<PathBuf>,

    #[arg(long)]
    track: Option<String>,

    #[arg(long)]
    preset: Option<String>,

    #[arg(long, default_value_t = 30)]
    fps: u32,

    /// Seconds to report; defaults to the clip length.
    #[arg(long)]
    duration: Option<f32>,

    /// Resolve faces as text instead of generating images.
    #[arg(long, default_value_t = false)]
    text_faces: bool,

    #[arg(long, default_value = "warn")]
    log_level: String,
}

fn main() -> Result<()> {
    let args = Args::parse();
    logging::init_stderr(&args.log_level)?;

    let catalog = match &args.catalog {
        Some(path) => Catalog::load(path).with_context(|| format!("load {}", path.display()))?,
        None => Catalog::builtin(),
    };
    let track = match args.track.as_deref() {
        Some(q) => catalog.find_track(q).ok_or_else(|| anyhow!("no track matching: {q}"))?,
        None => catalog.tracks.first().ok_or_else(|| anyhow!("catalog has no tracks"))?,
    }
    .clone();
    let preset = match args.preset.as_deref() {
        Some(q) => catalog
            .find_preset(q)
            .ok_or_else(|| anyhow!("no preset matching: {q}"))?,
        None => catalog
            .presets
            .first()
            .ok_or_else(|| anyhow!("catalog has no presets"))?,
    }
    .clone();

    let clip = match &args.audio {
        Some(path) => decode_wav_mono(path).with_context(|| format!("decode {}", path.display()))?,
        None => {
            let last_word = track.lyrics.last().map(|l| l.time).unwrap_or(0.0);
            Clip::silence(44_100, last_word + 2.0)
        }
    };
    let duration = args.duration.unwrap_or(clip.duration()).min(clip.duration());

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(1)
        .enable_all()
        .build()
        .context("start async runtime")?;

    let clock = MemoryTransport::new();
    clock.insert_clip(track.audio_src.clone(), clip);

    let images = if args.text_faces {
        ImageMode::TextOnly
    } else {
        ImageMode::Generate(Arc::new(ProceduralImageGenerator))
    };
    let faces = FaceResolver::new(ImageCache::new(), images, runtime.handle().clone());
    let mut session = Session::new(
        Box::new(clock.clone()),
        Box::new(CatalogPlaylist::new([track.clone()])),
        faces,
        preset,
    );
    session.assign_track(Arc::new(track));

    let dt = 1.0 / args.fps.clamp(1, 240) as f32;
    let mut out = BufWriter::new(std::io::stdout().lock());
    writeln!(out, "time,state,bass,scale,rotation,glitch,fracture,bloom,word,face")?;

    for frame in 0usize.. {
        let snap = session.tick(dt);
        // One pass only: stop once the track has ended and the session moved on.
        if snap.state != SessionState::Playing {
            if frame == 0 {
                return Err(anyhow!("playback did not start ({})", snap.state.label()));
            }
            break;
        }
        if snap.position_s >= duration {
            break;
        }

        let r = &snap.render;
        let (word, face) = match &snap.active {
            Some(a) => (csv_field(&a.word), a.face.label()),
            None => (String::new(), ""),
        };
        writeln!(
            out,
            "{:.3},{},{:.4},{:.4},{:.4},{:.4},{:.4},{:.4},{},{}",
            snap.position_s,
            snap.state.label(),
            r.bass_level,
            r.cube_scale,
            r.rotation_speed,
            r.glitch_strength,
            r.fracture_strength,
            r.bloom_intensity,
            word,
            face
        )?;

        clock.advance(dt);
    }
    out.flush()?;

    session.close();
    Ok(())
}

fn csv_field(value: &str) -> String {
    if value.contains([',', '"', '\n']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}
