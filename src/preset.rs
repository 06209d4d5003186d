use serde::{Deserialize, Serialize};
use std::fmt;

/// Id prefix marking presets produced by the remix service.
pub const REMIX_ID_PREFIX: &str = "remix-";

/// The six cube faces, in slot order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Face {
    Front,
    Back,
    Left,
    Right,
    Top,
    Bottom,
}

impl Face {
    pub const COUNT: usize = 6;

    pub const fn all() -> [Self; Self::COUNT] {
        [
            Self::Front,
            Self::Back,
            Self::Left,
            Self::Right,
            Self::Top,
            Self::Bottom,
        ]
    }

    pub const fn index(self) -> usize {
        match self {
            Self::Front => 0,
            Self::Back => 1,
            Self::Left => 2,
            Self::Right => 3,
            Self::Top => 4,
            Self::Bottom => 5,
        }
    }

    pub fn from_index(idx: usize) -> Self {
        Self::all()[idx % Self::COUNT]
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Front => "front",
            Self::Back => "back",
            Self::Left => "left",
            Self::Right => "right",
            Self::Top => "top",
            Self::Bottom => "bottom",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum MaterialKind {
    Glass,
    Metallic,
    Hologram,
    Rock,
    Standard,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CubeMaterial {
    #[serde(rename = "type")]
    pub kind: MaterialKind,
    pub color: String,
    pub roughness: f32,
    pub metalness: f32,
    pub opacity: f32,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Wireframe {
    pub enabled: bool,
    pub color: String,
    pub thickness: f32,
}

impl Default for Wireframe {
    fn default() -> Self {
        Self {
            enabled: false,
            color: "#ffffff".to_string(),
            thickness: 1.0,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Edges {
    pub glow: f32,
    pub corner_radius: f32,
}

impl Default for Edges {
    fn default() -> Self {
        Self {
            glow: 0.0,
            corner_radius: 0.05,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FaceKind {
    Lyrics,
    AlbumArt,
    Social,
    Metadata,
    AiVisual,
    Controls,
    StaticText,
    None,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FaceContent {
    #[serde(rename = "type")]
    pub kind: FaceKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fields: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub elements: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub buttons: Option<Vec<String>>,
}

impl FaceContent {
    pub fn of(kind: FaceKind) -> Self {
        Self {
            kind,
            text: None,
            fields: None,
            elements: None,
            buttons: None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Faces {
    pub front: FaceContent,
    pub back: FaceContent,
    pub left: FaceContent,
    pub right: FaceContent,
    pub top: FaceContent,
    pub bottom: FaceContent,
}

impl Default for Faces {
    fn default() -> Self {
        Self {
            front: FaceContent::of(FaceKind::Lyrics),
            back: FaceContent::of(FaceKind::AlbumArt),
            left: FaceContent::of(FaceKind::Metadata),
            right: FaceContent::of(FaceKind::Social),
            top: FaceContent::of(FaceKind::AiVisual),
            bottom: FaceContent::of(FaceKind::Controls),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Effects {
    pub bass_fracture: f32,
    pub chorus_bloom: f32,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Environment {
    pub bg_color: String,
    pub fog_color: String,
    pub particle_color: String,
}

/// Multipliers applied to the bass level.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BassReaction {
    pub scale: f32,
    pub rotation: f32,
    pub glitch: f32,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LyricsStyle {
    pub font: String,
    pub color: String,
    pub glow_color: String,
}

/// A named bundle of visual parameters. Treated as an immutable value: the
/// session swaps whole presets and never patches one in place.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Preset {
    pub id: String,
    pub name: String,
    pub cube_material: CubeMaterial,
    #[serde(default)]
    pub wireframe: Wireframe,
    #[serde(default)]
    pub edges: Edges,
    #[serde(default)]
    pub faces: Faces,
    #[serde(default)]
    pub effects: Effects,
    pub environment: Environment,
    pub bass_reaction: BassReaction,
    pub lyrics_style: LyricsStyle,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PresetError {
    MissingField(&'static str),
    OutOfRange {
        field: &'static str,
        value: f32,
        min: f32,
        max: f32,
    },
    InvalidColor { field: &'static str, value: String },
    Json(String),
}

impl fmt::Display for PresetError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingField(field) => write!(f, "missing required field: {field}"),
            Self::OutOfRange {
                field,
                value,
                min,
                max,
            } => write!(f, "{field}={value} outside [{min}, {max}]"),
            Self::InvalidColor { field, value } => {
                write!(f, "{field} is not a #rrggbb color: '{value}'")
            }
            Self::Json(msg) => write!(f, "preset JSON error: {msg}"),
        }
    }
}

impl std::error::Error for PresetError {}

impl Preset {
    pub fn is_remix(&self) -> bool {
        self.id.starts_with(REMIX_ID_PREFIX)
    }

    /// Label used by pickers; remixed presets are tagged.
    pub fn display_name(&self) -> String {
        if self.is_remix() {
            format!("{} (AI)", self.name)
        } else {
            self.name.clone()
        }
    }

    pub fn validate(&self) -> Result<(), PresetError> {
        if self.id.trim().is_empty() {
            return Err(PresetError::MissingField("id"));
        }
        if self.name.trim().is_empty() {
            return Err(PresetError::MissingField("name"));
        }

        let m = &self.cube_material;
        check_range("cubeMaterial.roughness", m.roughness, 0.0, 1.0)?;
        check_range("cubeMaterial.metalness", m.metalness, 0.0, 1.0)?;
        check_range("cubeMaterial.opacity", m.opacity, 0.0, 1.0)?;
        check_color("cubeMaterial.color", &m.color)?;

        check_color("wireframe.color", &self.wireframe.color)?;
        if !self.wireframe.thickness.is_finite() || self.wireframe.thickness <= 0.0 {
            return Err(PresetError::OutOfRange {
                field: "wireframe.thickness",
                value: self.wireframe.thickness,
                min: f32::MIN_POSITIVE,
                max: f32::MAX,
            });
        }

        check_range("edges.glow", self.edges.glow, 0.0, 1.0)?;
        check_range("edges.cornerRadius", self.edges.corner_radius, 0.0, 0.5)?;
        check_range("effects.bassFracture", self.effects.bass_fracture, 0.0, 1.0)?;
        check_range("effects.chorusBloom", self.effects.chorus_bloom, 0.0, 2.0)?;

        let r = &self.bass_reaction;
        check_range("bassReaction.scale", r.scale, 0.0, f32::MAX)?;
        check_range("bassReaction.rotation", r.rotation, 0.0, f32::MAX)?;
        check_range("bassReaction.glitch", r.glitch, 0.0, 1.0)?;

        check_color("environment.bgColor", &self.environment.bg_color)?;
        check_color("environment.fogColor", &self.environment.fog_color)?;
        check_color("environment.particleColor", &self.environment.particle_color)?;
        check_color("lyricsStyle.color", &self.lyrics_style.color)?;
        check_color("lyricsStyle.glowColor", &self.lyrics_style.glow_color)?;
        Ok(())
    }

    /// Plain-data JSON snapshot handed to the remix service.
    pub fn snapshot_json(&self) -> Result<String, PresetError> {
        serde_json::to_string(self).map_err(|e| PresetError::Json(e.to_string()))
    }

    pub fn from_json(text: &str) -> Result<Self, PresetError> {
        let preset: Self = serde_json::from_str(text).map_err(|e| PresetError::Json(e.to_string()))?;
        preset.validate()?;
        Ok(preset)
    }
}

fn check_range(field: &'static str, value: f32, min: f32, max: f32) -> Result<(), PresetError> {
    if value.is_finite() && (min..=max).contains(&value) {
        return Ok(());
    }
    Err(PresetError::OutOfRange {
        field,
        value,
        min,
        max,
    })
}

fn check_color(field: &'static str, value: &str) -> Result<(), PresetError> {
    if parse_hex_color(value).is_some() {
        return Ok(());
    }
    Err(PresetError::InvalidColor {
        field,
        value: value.to_string(),
    })
}

/// Parses `#rrggbb`.
pub fn parse_hex_color(value: &str) -> Option<(u8, u8, u8)> {
    let hex = value.strip_prefix('#')?;
    if hex.len() != 6 || !hex.is_ascii() {
        return None;
    }
    let r = u8::from_str_radix(&hex[0..2], 16).ok()?;
    let g = u8::from_str_radix(&hex[2..4], 16).ok()?;
    let b = u8::from_str_radix(&hex[4..6], 16).ok()?;
    Some((r, g, b))
}

pub fn format_hex_color((r, g, b): (u8, u8, u8)) -> String {
    format!("#{r:02x}{g:02x}{b:02x}")
}

pub fn builtin_presets() -> Vec<Preset> {
    vec![
        Preset {
            id: "p1".to_string(),
            name: "Quantum Mirage".to_string(),
            cube_material: CubeMaterial {
                kind: MaterialKind::Glass,
                color: "#9f7aea".to_string(),
                roughness: 0.1,
                metalness: 0.0,
                opacity: 0.3,
            },
            wireframe: Wireframe {
                enabled: true,
                color: "#9f7aea".to_string(),
                thickness: 1.0,
            },
            edges: Edges {
                glow: 0.6,
                corner_radius: 0.1,
            },
            faces: Faces::default(),
            effects: Effects {
                bass_fracture: 0.2,
                chorus_bloom: 1.2,
            },
            environment: Environment {
                bg_color: "#000010".to_string(),
                fog_color: "#0a0a0a".to_string(),
                particle_color: "#9f7aea".to_string(),
            },
            bass_reaction: BassReaction {
                scale: 0.15,
                rotation: 0.05,
                glitch: 0.5,
            },
            lyrics_style: LyricsStyle {
                font: "/fonts/Inter-Bold.woff".to_string(),
                color: "#ffffff".to_string(),
                glow_color: "#9f7aea".to_string(),
            },
        },
        Preset {
            id: "p2".to_string(),
            name: "Echo Core".to_string(),
            cube_material: CubeMaterial {
                kind: MaterialKind::Metallic,
                color: "#f56565".to_string(),
                roughness: 0.3,
                metalness: 0.8,
                opacity: 1.0,
            },
            wireframe: Wireframe::default(),
            edges: Edges {
                glow: 0.3,
                corner_radius: 0.05,
            },
            faces: Faces::default(),
            effects: Effects {
                bass_fracture: 0.0,
                chorus_bloom: 0.8,
            },
            environment: Environment {
                bg_color: "#100000".to_string(),
                fog_color: "#0a0a0a".to_string(),
                particle_color: "#f56565".to_string(),
            },
            bass_reaction: BassReaction {
                scale: 0.2,
                rotation: 0.1,
                glitch: 0.0,
            },
            lyrics_style: LyricsStyle {
                font: "/fonts/ShareTechMono-Regular.woff".to_string(),
                color: "#f7fafc".to_string(),
                glow_color: "#f56565".to_string(),
            },
        },
        Preset {
            id: "p3".to_string(),
            name: "Bass Forge".to_string(),
            cube_material: CubeMaterial {
                kind: MaterialKind::Rock,
                color: "#4299e1".to_string(),
                roughness: 0.8,
                metalness: 0.1,
                opacity: 1.0,
            },
            wireframe: Wireframe {
                enabled: true,
                color: "#e2e8f0".to_string(),
                thickness: 2.0,
            },
            edges: Edges {
                glow: 0.1,
                corner_radius: 0.0,
            },
            faces: Faces::default(),
            effects: Effects {
                bass_fracture: 0.9,
                chorus_bloom: 0.4,
            },
            environment: Environment {
                bg_color: "#000515".to_string(),
                fog_color: "#0a0a0a".to_string(),
                particle_color: "#4299e1".to_string(),
            },
            bass_reaction: BassReaction {
                scale: 0.25,
                rotation: 0.0,
                glitch: 0.2,
            },
            lyrics_style: LyricsStyle {
                font: "/fonts/Orbitron-Bold.woff".to_string(),
                color: "#e2e8f0".to_string(),
                glow_color: "#4299e1".to_string(),
            },
        },
    ]
}
