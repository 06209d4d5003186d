use clap::{Parser, ValueEnum};

#[derive(Parser, Debug, Clone)]
#[command(name = "bass_cube", version, about = "Audio-reactive lyric cube for the terminal")]
pub struct Config {
    /// Tracks and presets as JSON; the built-in catalog is used when absent.
    #[arg(long)]
    pub catalog: Option<String>,

    /// Starting track, by id or title substring.
    #[arg(long)]
    pub track: Option<String>,

    /// Starting preset, by id or name substring. Overrides the saved one.
    #[arg(long)]
    pub preset: Option<String>,

    /// LRC sheet replacing the starting track's lyrics.
    #[arg(long)]
    pub lyrics_file: Option<String>,

    #[arg(long, default_value_t = 0.0)]
    pub lyrics_offset_ms: f32,

    #[arg(long, default_value_t = 60)]
    pub fps: u32,

    /// Playback volume in 0..1. Defaults to the saved value.
    #[arg(long)]
    pub volume: Option<f32>,

    #[arg(long, value_enum, default_value_t = ImageSource::Procedural)]
    pub images: ImageSource,

    #[arg(long)]
    pub image_endpoint: Option<String>,

    /// Remix service URL; the offline remixer is used when absent.
    #[arg(long)]
    pub remix_endpoint: Option<String>,

    /// Bearer token sent to the image and remix services. Falls back to
    /// `BASS_CUBE_API_KEY`.
    #[arg(long)]
    pub api_key: Option<String>,

    #[arg(long, default_value = "info")]
    pub log_level: String,

    #[arg(long)]
    pub log_file: Option<String>,

    #[arg(long, default_value_t = false)]
    pub list_devices: bool,

    #[arg(long)]
    pub device: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ImageSource {
    #[value(alias = "local")]
    Procedural,
    #[value(alias = "remote")]
    Http,
    #[value(alias = "text", alias = "none")]
    Off,
}

impl Config {
    pub fn fps(&self) -> u32 {
        self.fps.clamp(1, 240)
    }

    pub fn api_key(&self) -> Option<String> {
        self.api_key
            .clone()
            .or_else(|| std::env::var("BASS_CUBE_API_KEY").ok())
            .filter(|k| !k.trim().is_empty())
    }

    pub fn lyrics_offset_s(&self) -> f32 {
        self.lyrics_offset_ms / 1000.0
    }
}
