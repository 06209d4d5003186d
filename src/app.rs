use crate::catalog::{Catalog, CatalogPlaylist};
use crate::config::{Config, ImageSource};
use crate::faces::{FaceResolver, ImageCache, ImageMode};
use crate::hud::{build_hud, help_popup_text};
use crate::lyrics::load_lrc;
use crate::logging;
use crate::prefs::{AppPrefs, config_dir, prefs_storage_path};
use crate::preset::{Preset, builtin_presets};
use crate::render::{CubeView, Frame, HalfBlockRenderer};
use crate::services::{
    HttpImageGenerator, HttpRemixer, ImageGenerator, PresetRemixer, ProceduralImageGenerator,
    ProceduralRemixer,
};
use crate::session::{InputFocus, KeyCommand, Session, SessionState};
use crate::terminal::TerminalGuard;
use crate::track::Track;
use crate::transport::WavTransport;
use anyhow::{Context, anyhow};
use crossterm::event::{self, Event, KeyCode, KeyEventKind, KeyModifiers};
use std::io::BufWriter;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};

/// Track search prompt opened with `/`. While it is open keyboard focus is
/// in a text field.
#[derive(Default)]
struct SearchPrompt {
    query: String,
}

pub fn run(cfg: Config) -> anyhow::Result<()> {
    let log_path = cfg
        .log_file
        .as_ref()
        .map(PathBuf::from)
        .or_else(|| config_dir().map(|d| d.join("bass_cube.log")))
        .unwrap_or_else(|| PathBuf::from("bass_cube.log"));
    let _log_guard = logging::init_file(&cfg.log_level, &log_path)?;

    let prefs_path = prefs_storage_path();
    let mut prefs = AppPrefs::load(prefs_path.as_deref()).unwrap_or_else(|err| {
        warn!("ignoring unreadable prefs: {err}");
        AppPrefs::default()
    });

    let mut catalog = match &cfg.catalog {
        Some(path) => Catalog::load(path).with_context(|| format!("load catalog {path}"))?,
        None => Catalog::builtin(),
    };
    if catalog.tracks.is_empty() {
        return Err(anyhow!("catalog has no tracks"));
    }
    if catalog.presets.is_empty() {
        catalog.presets = builtin_presets();
    }

    let start_idx = match cfg.track.as_deref() {
        Some(query) => {
            let found = catalog
                .find_track(query)
                .ok_or_else(|| anyhow!("no track matching: {query}"))?;
            catalog
                .tracks
                .iter()
                .position(|t| t.id == found.id)
                .unwrap_or(0)
        }
        None => 0,
    };
    if let Some(path) = &cfg.lyrics_file {
        let lyrics = load_lrc(path)?;
        let track = &mut catalog.tracks[start_idx];
        info!(track = %track.title, words = lyrics.len(), "lyrics replaced from {path}");
        *track = track.with_lyrics(lyrics);
    }
    let start_track = Arc::new(catalog.tracks[start_idx].clone());

    let preset_query = cfg.preset.clone().or_else(|| prefs.preset.clone());
    let mut preset_cursor = preset_query
        .as_deref()
        .and_then(|q| catalog.find_preset(q))
        .and_then(|p| catalog.presets.iter().position(|x| x.id == p.id))
        .unwrap_or(0);
    let volume = cfg.volume.unwrap_or(prefs.volume).clamp(0.0, 1.0);

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .enable_all()
        .build()
        .context("start async runtime")?;

    let images = match cfg.images {
        ImageSource::Off => ImageMode::TextOnly,
        ImageSource::Procedural => {
            ImageMode::Generate(Arc::new(ProceduralImageGenerator) as Arc<dyn ImageGenerator>)
        }
        ImageSource::Http => {
            let endpoint = cfg
                .image_endpoint
                .clone()
                .ok_or_else(|| anyhow!("--images http needs --image-endpoint"))?;
            let generator = HttpImageGenerator::new(endpoint, cfg.api_key())
                .context("build image client")?;
            ImageMode::Generate(Arc::new(generator))
        }
    };
    let remixer: Arc<dyn PresetRemixer> = match &cfg.remix_endpoint {
        Some(endpoint) => Arc::new(
            HttpRemixer::new(endpoint.clone(), cfg.api_key()).context("build remix client")?,
        ),
        None => Arc::new(ProceduralRemixer::new()),
    };

    let faces = FaceResolver::new(ImageCache::new(), images, runtime.handle().clone());
    let transport = WavTransport::new(cfg.device.as_deref(), volume);
    let tracks: Vec<Track> = catalog.tracks.clone();
    let mut session = Session::new(
        Box::new(transport),
        Box::new(CatalogPlaylist::new(tracks)),
        faces,
        catalog.presets[preset_cursor].clone(),
    )
    .with_remixer(remixer, runtime.handle().clone());
    session.set_lyrics_offset(cfg.lyrics_offset_s());
    session.assign_track(start_track);

    let result = frame_loop(&cfg, &catalog, &mut session, &mut preset_cursor);

    prefs.volume = session.volume();
    if !session.preset().is_remix() {
        prefs.preset = Some(session.preset().id.clone());
    }
    session.close();
    if let Err(err) = prefs.save(prefs_path.as_deref()) {
        warn!("prefs not saved: {err}");
    }
    runtime.shutdown_timeout(Duration::from_millis(200));
    result
}

fn frame_loop(
    cfg: &Config,
    catalog: &Catalog,
    session: &mut Session,
    preset_cursor: &mut usize,
) -> anyhow::Result<()> {
    let _term = TerminalGuard::new()?;
    let mut out = BufWriter::new(TerminalGuard::stdout());

    let mut last_size = TerminalGuard::size()?;
    if last_size.1 < 4 || last_size.0 < 8 {
        return Err(anyhow!(
            "terminal too small (need at least 8x4, got {}x{})",
            last_size.0,
            last_size.1
        ));
    }

    let mut renderer = HalfBlockRenderer::new();
    let mut cube = CubeView::new();
    let mut pixels = Vec::new();
    let mut fps = FpsCounter::new();
    let mut prompt: Option<SearchPrompt> = None;
    let mut show_help = false;
    let mut last_frame = Instant::now();
    let target = Duration::from_secs_f32(1.0 / cfg.fps() as f32);

    loop {
        let now = Instant::now();

        while event::poll(Duration::from_millis(0))? {
            match event::read()? {
                Event::Key(k) if k.kind != KeyEventKind::Release => {
                    if k.modifiers.contains(KeyModifiers::CONTROL)
                        && matches!(k.code, KeyCode::Char('c'))
                    {
                        return Ok(());
                    }
                    let focus = if prompt.is_some() {
                        InputFocus::TextInput
                    } else {
                        InputFocus::Visualizer
                    };
                    if let Some(p) = prompt.as_mut() {
                        match k.code {
                            KeyCode::Char(c) => p.query.push(c),
                            KeyCode::Backspace => {
                                p.query.pop();
                            }
                            KeyCode::Enter => {
                                match catalog.find_track(&p.query) {
                                    Some(track) => session.assign_track(Arc::new(track.clone())),
                                    None => info!(query = %p.query, "no track found"),
                                }
                                prompt = None;
                            }
                            KeyCode::Esc => prompt = None,
                            _ => {}
                        }
                    } else {
                        match k.code {
                            KeyCode::Char('/') => prompt = Some(SearchPrompt::default()),
                            KeyCode::Char('?') => show_help = !show_help,
                            KeyCode::Char('[') => {
                                step_preset(session, &catalog.presets, preset_cursor, false)
                            }
                            KeyCode::Char(']') => {
                                step_preset(session, &catalog.presets, preset_cursor, true)
                            }
                            _ => {}
                        }
                    }
                    if let Some(command) = key_command(k.code) {
                        session.handle_key(command, focus);
                    }
                }
                Event::Resize(c, r) => last_size = (c, r),
                _ => {}
            }
        }

        let sz = TerminalGuard::size()?;
        if sz != last_size {
            last_size = sz;
        }

        let dt = now.duration_since(last_frame).as_secs_f32().max(1e-6);
        last_frame = now;

        let snap = session.tick(dt);
        if snap.state == SessionState::Closed {
            return Ok(());
        }

        let (term_cols, term_rows) = last_size;
        let hud_lines = build_hud(&snap, fps.fps(), term_cols as usize);
        let hud_rows = (hud_lines.len() as u16).min(term_rows.saturating_sub(2));
        let hud = hud_lines.join("\n");
        let visual_rows = term_rows.saturating_sub(hud_rows).max(1);
        let w = term_cols as usize;
        let h = visual_rows as usize * 2;

        cube.advance(dt, snap.render.rotation_speed);
        cube.draw(
            &snap.render,
            &snap.preset.environment,
            snap.active.as_ref().map(|a| a.face),
            w,
            h,
            &mut pixels,
        );

        let prompt_text = prompt
            .as_ref()
            .map(|p| format!("Search track\n> {}_", p.query));
        let overlay = match &prompt_text {
            Some(text) => Some(text.as_str()),
            None if show_help => Some(help_popup_text()),
            None => None,
        };

        let frame = Frame {
            term_cols,
            term_rows,
            visual_rows,
            pixel_width: w,
            pixel_height: h,
            pixels_rgba: &pixels,
            hud: &hud,
            hud_rows,
            overlay,
        };
        renderer.render(&frame, &mut out)?;
        fps.tick();

        let elapsed = now.elapsed();
        if elapsed < target {
            std::thread::sleep(target - elapsed);
        }
    }
}

fn key_command(code: KeyCode) -> Option<KeyCommand> {
    match code {
        KeyCode::Char(' ') => Some(KeyCommand::TogglePlay),
        KeyCode::Char('n') | KeyCode::Char('N') | KeyCode::Right => Some(KeyCommand::NextTrack),
        KeyCode::Char('p') | KeyCode::Char('P') | KeyCode::Left => {
            Some(KeyCommand::PreviousTrack)
        }
        KeyCode::Char('r') | KeyCode::Char('R') => Some(KeyCommand::Remix),
        KeyCode::Char('+') | KeyCode::Char('=') => Some(KeyCommand::VolumeUp),
        KeyCode::Char('-') => Some(KeyCommand::VolumeDown),
        KeyCode::Char('q') | KeyCode::Char('Q') | KeyCode::Esc => Some(KeyCommand::Close),
        _ => None,
    }
}

fn step_preset(session: &mut Session, presets: &[Preset], cursor: &mut usize, forward: bool) {
    if presets.is_empty() {
        return;
    }
    let len = presets.len();
    *cursor = if forward {
        (*cursor + 1) % len
    } else {
        (*cursor + len - 1) % len
    };
    if let Err(err) = session.set_preset(presets[*cursor].clone()) {
        warn!("preset rejected: {err}");
    }
}

struct FpsCounter {
    last: Instant,
    frames: u32,
    fps: f32,
}

impl FpsCounter {
    fn new() -> Self {
        Self {
            last: Instant::now(),
            frames: 0,
            fps: 0.0,
        }
    }

    fn tick(&mut self) {
        self.frames += 1;
        let dt = self.last.elapsed().as_secs_f32();
        if dt >= 0.5 {
            self.fps = self.frames as f32 / dt;
            self.frames = 0;
            self.last = Instant::now();
        }
    }

    fn fps(&self) -> f32 {
        self.fps
    }
}
