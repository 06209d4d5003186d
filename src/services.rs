//! Remote collaborators: word-to-image generation and preset remixing.
//!
//! Both are async traits so the session can hand them to the runtime and
//! keep its frame loop running while a request is in flight. Each has a
//! procedural implementation that works offline and an HTTP one.

use crate::preset::{
    MaterialKind, Preset, PresetError, REMIX_ID_PREFIX, format_hex_color, parse_hex_color,
};
use async_trait::async_trait;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::debug;

/// Base64 image payload as returned by an image generator.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeneratedImage {
    pub image_bytes: String,
    pub mime_type: String,
}

impl GeneratedImage {
    pub fn from_bytes(bytes: &[u8], mime_type: &str) -> Self {
        Self {
            image_bytes: BASE64.encode(bytes),
            mime_type: mime_type.to_string(),
        }
    }

    /// Rejects empty or undecodable payloads and non-image mime types.
    pub fn validate(&self) -> Result<(), GenerateError> {
        if !self.mime_type.starts_with("image/") {
            return Err(GenerateError::Malformed(format!(
                "unexpected mime type: {}",
                self.mime_type
            )));
        }
        let decoded = BASE64
            .decode(self.image_bytes.trim())
            .map_err(|e| GenerateError::Malformed(format!("image bytes: {e}")))?;
        if decoded.is_empty() {
            return Err(GenerateError::Malformed("empty image".to_string()));
        }
        Ok(())
    }

    /// Renderable locator for the image.
    pub fn data_url(&self) -> String {
        format!("data:{};base64,{}", self.mime_type, self.image_bytes.trim())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum GenerateError {
    Request(String),
    Api { status: u16, message: String },
    Malformed(String),
}

impl fmt::Display for GenerateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Request(msg) => write!(f, "image request failed: {msg}"),
            Self::Api { status, message } => {
                write!(f, "image service returned {status}: {message}")
            }
            Self::Malformed(msg) => write!(f, "malformed image response: {msg}"),
        }
    }
}

impl std::error::Error for GenerateError {}

#[async_trait]
pub trait ImageGenerator: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<GeneratedImage, GenerateError>;
}

pub fn image_prompt(word: &str) -> String {
    format!("cinematic, abstract, cyberpunk art representing: \"{word}\"")
}

/// Draws an SVG tile from a hash of the prompt. Deterministic per prompt.
#[derive(Clone, Debug, Default)]
pub struct ProceduralImageGenerator;

#[async_trait]
impl ImageGenerator for ProceduralImageGenerator {
    async fn generate(&self, prompt: &str) -> Result<GeneratedImage, GenerateError> {
        let svg = procedural_svg(prompt);
        Ok(GeneratedImage::from_bytes(svg.as_bytes(), "image/svg+xml"))
    }
}

fn fnv1a(text: &str) -> u64 {
    let mut hash = 0xcbf2_9ce4_8422_2325u64;
    for b in text.bytes() {
        hash ^= b as u64;
        hash = hash.wrapping_mul(0x0100_0000_01b3);
    }
    hash
}

fn escape_xml(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            _ => out.push(c),
        }
    }
    out
}

fn procedural_svg(prompt: &str) -> String {
    let hash = fnv1a(prompt);
    let hue = (hash % 360) as f32;
    let from = format_hex_color(hsl_to_rgb(hue, 0.8, 0.45));
    let to = format_hex_color(hsl_to_rgb((hue + 140.0) % 360.0, 0.7, 0.15));
    let label = prompt
        .split('"')
        .nth(1)
        .filter(|s| !s.is_empty())
        .unwrap_or(prompt);
    let rings: String = (0..4)
        .map(|i| {
            let r = 20 + ((hash >> (i * 8)) & 0x3f) as u32;
            format!(
                "<circle cx=\"128\" cy=\"128\" r=\"{r}\" fill=\"none\" stroke=\"{from}\" stroke-opacity=\"0.{}\"/>",
                3 + i
            )
        })
        .collect();
    format!(
        "<svg xmlns=\"http://www.w3.org/2000/svg\" width=\"256\" height=\"256\">\
<defs><linearGradient id=\"g\" x1=\"0\" y1=\"0\" x2=\"1\" y2=\"1\">\
<stop offset=\"0\" stop-color=\"{from}\"/><stop offset=\"1\" stop-color=\"{to}\"/></linearGradient></defs>\
<rect width=\"256\" height=\"256\" fill=\"url(#g)\"/>{rings}\
<text x=\"128\" y=\"136\" text-anchor=\"middle\" fill=\"#ffffff\" font-size=\"28\">{}</text></svg>",
        escape_xml(label)
    )
}

/// Posts `{ "prompt": ... }` and expects a [`GeneratedImage`] back.
pub struct HttpImageGenerator {
    client: reqwest::Client,
    endpoint: String,
    api_key: Option<String>,
}

impl HttpImageGenerator {
    pub fn new(endpoint: impl Into<String>, api_key: Option<String>) -> Result<Self, GenerateError> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| GenerateError::Request(e.to_string()))?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
            api_key,
        })
    }
}

#[derive(Serialize)]
struct ImageRequest<'a> {
    prompt: &'a str,
}

#[async_trait]
impl ImageGenerator for HttpImageGenerator {
    async fn generate(&self, prompt: &str) -> Result<GeneratedImage, GenerateError> {
        let mut req = self.client.post(&self.endpoint).json(&ImageRequest { prompt });
        if let Some(key) = &self.api_key {
            req = req.bearer_auth(key);
        }
        let resp = req
            .send()
            .await
            .map_err(|e| GenerateError::Request(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            let message = resp.text().await.unwrap_or_default();
            return Err(GenerateError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let image: GeneratedImage = resp
            .json()
            .await
            .map_err(|e| GenerateError::Malformed(e.to_string()))?;
        image.validate()?;
        debug!(mime = %image.mime_type, "image generated");
        Ok(image)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum RemixError {
    Request(String),
    Api { status: u16, message: String },
    Malformed(String),
    Invalid(PresetError),
}

impl fmt::Display for RemixError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Request(msg) => write!(f, "remix request failed: {msg}"),
            Self::Api { status, message } => {
                write!(f, "remix service returned {status}: {message}")
            }
            Self::Malformed(msg) => write!(f, "malformed remix response: {msg}"),
            Self::Invalid(err) => write!(f, "remixed preset rejected: {err}"),
        }
    }
}

impl std::error::Error for RemixError {}

/// Proposes a new preset from a JSON snapshot of the current one and the
/// description of the track it plays over. Returns the proposal as JSON.
#[async_trait]
pub trait PresetRemixer: Send + Sync {
    async fn remix(&self, snapshot_json: &str, description: &str) -> Result<String, RemixError>;
}

static REMIX_SEQ: AtomicU64 = AtomicU64::new(0);

/// Fresh `remix-<millis>-<seq>` id.
pub fn next_remix_id() -> String {
    let millis = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or(0);
    let seq = REMIX_SEQ.fetch_add(1, Ordering::Relaxed);
    format!("{REMIX_ID_PREFIX}{millis}-{seq}")
}

/// Runs one remix round trip and returns a complete, validated preset with a
/// fresh remix id. The source preset is only read.
pub async fn remix_preset(
    remixer: &dyn PresetRemixer,
    current: &Preset,
    description: &str,
) -> Result<Preset, RemixError> {
    let snapshot = current.snapshot_json().map_err(RemixError::Invalid)?;
    let proposal = remixer.remix(&snapshot, description).await?;
    let mut preset: Preset = serde_json::from_str(proposal.trim())
        .map_err(|e| RemixError::Malformed(e.to_string()))?;
    preset.id = next_remix_id();
    preset.validate().map_err(RemixError::Invalid)?;
    debug!(id = %preset.id, name = %preset.name, "preset remixed");
    Ok(preset)
}

/// Offline remixer: rotates every colour by one random hue offset and
/// jitters the bass reaction within its valid ranges.
pub struct ProceduralRemixer {
    rng: Mutex<fastrand::Rng>,
}

impl Default for ProceduralRemixer {
    fn default() -> Self {
        Self::new()
    }
}

impl ProceduralRemixer {
    pub fn new() -> Self {
        Self {
            rng: Mutex::new(fastrand::Rng::new()),
        }
    }

    pub fn with_seed(seed: u64) -> Self {
        Self {
            rng: Mutex::new(fastrand::Rng::with_seed(seed)),
        }
    }

    fn rework(&self, mut preset: Preset, description: &str) -> Preset {
        let mut rng = self.rng.lock().unwrap_or_else(|e| e.into_inner());
        let shift = 60.0 + rng.f32() * 240.0;

        let recolor = |c: &mut String| {
            if let Some(rgb) = parse_hex_color(c) {
                *c = format_hex_color(rotate_hue(rgb, shift));
            }
        };
        recolor(&mut preset.cube_material.color);
        recolor(&mut preset.wireframe.color);
        recolor(&mut preset.environment.bg_color);
        recolor(&mut preset.environment.fog_color);
        recolor(&mut preset.environment.particle_color);
        recolor(&mut preset.lyrics_style.glow_color);

        // Heavier descriptions push the cube harder.
        let heavy = ["bass", "heavy", "glitch", "hard", "drop", "dark"]
            .iter()
            .any(|w| description.to_lowercase().contains(w));
        let push = if heavy { 1.2 } else { 1.0 };

        let r = &mut preset.bass_reaction;
        r.scale = (r.scale * (0.8 + rng.f32() * 0.5) * push).clamp(0.05, 0.4);
        r.rotation = (r.rotation * (0.8 + rng.f32() * 0.5)).clamp(0.0, 0.3);
        r.glitch = (r.glitch + (rng.f32() - 0.4) * 0.4).clamp(0.0, 1.0);

        let e = &mut preset.effects;
        e.chorus_bloom = (e.chorus_bloom * (0.8 + rng.f32() * 0.5)).clamp(0.0, 2.0);
        e.bass_fracture = (e.bass_fracture + (rng.f32() - 0.5) * 0.3).clamp(0.0, 1.0);

        if rng.u8(0..4) == 0 {
            let kinds = [
                MaterialKind::Glass,
                MaterialKind::Metallic,
                MaterialKind::Hologram,
                MaterialKind::Rock,
                MaterialKind::Standard,
            ];
            preset.cube_material.kind = kinds[rng.usize(0..kinds.len())];
        }

        let base = preset.name.trim_end_matches(" Remix").to_string();
        preset.name = format!("{base} Remix");
        preset
    }
}

#[async_trait]
impl PresetRemixer for ProceduralRemixer {
    async fn remix(&self, snapshot_json: &str, description: &str) -> Result<String, RemixError> {
        let current = Preset::from_json(snapshot_json).map_err(|e| match e {
            PresetError::Json(msg) => RemixError::Malformed(msg),
            other => RemixError::Invalid(other),
        })?;
        let remixed = self.rework(current, description);
        serde_json::to_string(&remixed).map_err(|e| RemixError::Malformed(e.to_string()))
    }
}

/// Posts the snapshot and description; the response body is the proposal.
pub struct HttpRemixer {
    client: reqwest::Client,
    endpoint: String,
    api_key: Option<String>,
}

impl HttpRemixer {
    pub fn new(endpoint: impl Into<String>, api_key: Option<String>) -> Result<Self, RemixError> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| RemixError::Request(e.to_string()))?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
            api_key,
        })
    }
}

#[derive(Serialize)]
struct RemixRequest<'a> {
    preset: serde_json::Value,
    description: &'a str,
}

#[async_trait]
impl PresetRemixer for HttpRemixer {
    async fn remix(&self, snapshot_json: &str, description: &str) -> Result<String, RemixError> {
        let preset: serde_json::Value = serde_json::from_str(snapshot_json)
            .map_err(|e| RemixError::Malformed(e.to_string()))?;
        let mut req = self.client.post(&self.endpoint).json(&RemixRequest {
            preset,
            description,
        });
        if let Some(key) = &self.api_key {
            req = req.bearer_auth(key);
        }
        let resp = req
            .send()
            .await
            .map_err(|e| RemixError::Request(e.to_string()))?;

        let status = resp.status();
        let body = resp
            .text()
            .await
            .map_err(|e| RemixError::Request(e.to_string()))?;
        if !status.is_success() {
            return Err(RemixError::Api {
                status: status.as_u16(),
                message: body,
            });
        }
        Ok(body)
    }
}

fn rotate_hue(rgb: (u8, u8, u8), degrees: f32) -> (u8, u8, u8) {
    let (h, s, l) = rgb_to_hsl(rgb);
    hsl_to_rgb((h + degrees).rem_euclid(360.0), s, l)
}

fn rgb_to_hsl((r, g, b): (u8, u8, u8)) -> (f32, f32, f32) {
    let r = r as f32 / 255.0;
    let g = g as f32 / 255.0;
    let b = b as f32 / 255.0;
    let max = r.max(g).max(b);
    let min = r.min(g).min(b);
    let l = (max + min) / 2.0;
    let d = max - min;
    if d <= f32::EPSILON {
        return (0.0, 0.0, l);
    }
    let s = d / (1.0 - (2.0 * l - 1.0).abs());
    let h = if max == r {
        60.0 * ((g - b) / d).rem_euclid(6.0)
    } else if max == g {
        60.0 * ((b - r) / d + 2.0)
    } else {
        60.0 * ((r - g) / d + 4.0)
    };
    (h, s.clamp(0.0, 1.0), l)
}

fn hsl_to_rgb(h: f32, s: f32, l: f32) -> (u8, u8, u8) {
    let c = (1.0 - (2.0 * l - 1.0).abs()) * s;
    let hp = h / 60.0;
    let x = c * (1.0 - (hp.rem_euclid(2.0) - 1.0).abs());
    let (r1, g1, b1) = match hp as u32 {
        0 => (c, x, 0.0),
        1 => (x, c, 0.0),
        2 => (0.0, c, x),
        3 => (0.0, x, c),
        4 => (x, 0.0, c),
        _ => (c, 0.0, x),
    };
    let m = l - c / 2.0;
    let to_u8 = |v: f32| ((v + m).clamp(0.0, 1.0) * 255.0).round() as u8;
    (to_u8(r1), to_u8(g1), to_u8(b1))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hue_rotation_keeps_grey() {
        assert_eq!(rotate_hue((0x80, 0x80, 0x80), 120.0), (0x80, 0x80, 0x80));
    }

    #[test]
    fn hue_rotation_cycles_primaries() {
        assert_eq!(rotate_hue((255, 0, 0), 120.0), (0, 255, 0));
        assert_eq!(rotate_hue((255, 0, 0), 240.0), (0, 0, 255));
    }

    #[test]
    fn svg_escapes_markup() {
        let svg = procedural_svg(&image_prompt("<b>&"));
        assert!(svg.contains("&lt;b&gt;&amp;"));
    }
}
