use crate::preset::{Preset, PresetError, builtin_presets};
use crate::track::{Lyric, Track};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::path::Path;
use std::sync::Arc;

/// Tracks and presets available to a session. Loaded once at startup.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Catalog {
    pub tracks: Vec<Track>,
    pub presets: Vec<Preset>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum CatalogError {
    Io(String),
    Json(String),
    DuplicateTrackId(u32),
    DuplicatePresetId(String),
    UnorderedLyrics { track_id: u32 },
    InvalidPreset { id: String, source: PresetError },
}

impl fmt::Display for CatalogError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(msg) => write!(f, "I/O error: {msg}"),
            Self::Json(msg) => write!(f, "catalog JSON error: {msg}"),
            Self::DuplicateTrackId(id) => write!(f, "duplicate track id: {id}"),
            Self::DuplicatePresetId(id) => write!(f, "duplicate preset id: {id}"),
            Self::UnorderedLyrics { track_id } => {
                write!(f, "track {track_id}: lyric times must be non-decreasing")
            }
            Self::InvalidPreset { id, source } => write!(f, "preset '{id}': {source}"),
        }
    }
}

impl std::error::Error for CatalogError {}

impl Catalog {
    pub fn builtin() -> Self {
        Self {
            tracks: builtin_tracks(),
            presets: builtin_presets(),
        }
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, CatalogError> {
        let text = std::fs::read_to_string(path.as_ref())
            .map_err(|e| CatalogError::Io(e.to_string()))?;
        Self::parse(&text)
    }

    pub fn parse(text: &str) -> Result<Self, CatalogError> {
        let catalog: Self =
            serde_json::from_str(text).map_err(|e| CatalogError::Json(e.to_string()))?;
        catalog.validate()?;
        Ok(catalog)
    }

    pub fn to_json(&self) -> Result<String, CatalogError> {
        serde_json::to_string_pretty(self).map_err(|e| CatalogError::Json(e.to_string()))
    }

    pub fn validate(&self) -> Result<(), CatalogError> {
        let mut track_ids = HashSet::new();
        for track in &self.tracks {
            if !track_ids.insert(track.id) {
                return Err(CatalogError::DuplicateTrackId(track.id));
            }
            if !track.lyrics_are_ordered() {
                return Err(CatalogError::UnorderedLyrics { track_id: track.id });
            }
        }

        let mut preset_ids = HashSet::new();
        for preset in &self.presets {
            if !preset_ids.insert(preset.id.as_str()) {
                return Err(CatalogError::DuplicatePresetId(preset.id.clone()));
            }
            preset.validate().map_err(|source| CatalogError::InvalidPreset {
                id: preset.id.clone(),
                source,
            })?;
        }
        Ok(())
    }

    /// Matches an exact id first, then a case-insensitive title substring.
    pub fn find_track(&self, query: &str) -> Option<&Track> {
        let q = query.trim();
        if q.is_empty() {
            return None;
        }
        if let Ok(id) = q.parse::<u32>() {
            if let Some(track) = self.tracks.iter().find(|t| t.id == id) {
                return Some(track);
            }
        }
        let q_l = q.to_lowercase();
        self.tracks
            .iter()
            .find(|t| t.title.to_lowercase().contains(&q_l))
    }

    /// Matches an exact id first, then a case-insensitive name substring.
    pub fn find_preset(&self, query: &str) -> Option<&Preset> {
        let q = query.trim();
        if q.is_empty() {
            return None;
        }
        if let Some(p) = self.presets.iter().find(|p| p.id == q) {
            return Some(p);
        }
        let q_l = q.to_lowercase();
        self.presets
            .iter()
            .find(|p| p.name.to_lowercase().contains(&q_l))
    }
}

/// Supplies the neighbouring track on skip or when a track ends.
pub trait PlaylistProvider: Send {
    fn next(&self, current_id: u32) -> Option<Arc<Track>>;
    fn previous(&self, current_id: u32) -> Option<Arc<Track>>;
}

/// Cycles through the catalog order, wrapping at both ends.
#[derive(Clone, Debug)]
pub struct CatalogPlaylist {
    tracks: Vec<Arc<Track>>,
}

impl CatalogPlaylist {
    pub fn new(tracks: impl IntoIterator<Item = Track>) -> Self {
        Self {
            tracks: tracks.into_iter().map(Arc::new).collect(),
        }
    }

    pub fn tracks(&self) -> &[Arc<Track>] {
        &self.tracks
    }

    fn step(&self, current_id: u32, forward: bool) -> Option<Arc<Track>> {
        let len = self.tracks.len();
        if len == 0 {
            return None;
        }
        let Some(pos) = self.tracks.iter().position(|t| t.id == current_id) else {
            return self.tracks.first().cloned();
        };
        let idx = if forward {
            (pos + 1) % len
        } else {
            (pos + len - 1) % len
        };
        self.tracks.get(idx).cloned()
    }
}

impl PlaylistProvider for CatalogPlaylist {
    fn next(&self, current_id: u32) -> Option<Arc<Track>> {
        self.step(current_id, true)
    }

    fn previous(&self, current_id: u32) -> Option<Arc<Track>> {
        self.step(current_id, false)
    }
}

const CYCLE_CUT_LYRICS: &[(f32, &str)] = &[
    (2.0, "Stuck"),
    (2.5, "in"),
    (2.8, "the"),
    (3.2, "loop"),
    (4.0, "again"),
    (4.8, "Same"),
    (5.2, "old"),
    (5.5, "story"),
    (6.5, "no"),
    (6.8, "new"),
    (7.2, "friend"),
    (8.0, "Breaking"),
    (8.5, "free"),
    (9.0, "from"),
    (9.4, "this"),
    (9.8, "chain"),
    (10.8, "Glitch"),
    (11.2, "in"),
    (11.5, "the"),
    (11.9, "system"),
    (12.7, "Shedding"),
    (13.2, "the"),
    (13.5, "pain"),
    (14.5, "Cut"),
    (15.0, "the"),
    (15.3, "cycle"),
    (16.0, "now"),
    (16.8, "Bass"),
    (17.2, "drops"),
    (17.6, "loud"),
    (18.2, "Echoes"),
    (18.7, "fade"),
    (19.5, "New"),
    (19.8, "path"),
    (20.2, "is"),
    (20.6, "made"),
];

pub fn builtin_tracks() -> Vec<Track> {
    let cycle_cut: Vec<Lyric> = CYCLE_CUT_LYRICS
        .iter()
        .map(|&(time, word)| Lyric::new(time, word))
        .collect();

    let mirrored: Vec<Lyric> = cycle_cut
        .iter()
        .map(|l| Lyric::new(l.time, l.word.chars().rev().collect::<String>()))
        .collect();

    // Same timings, words in reverse order.
    let reversed: Vec<Lyric> = cycle_cut
        .iter()
        .zip(cycle_cut.iter().rev())
        .map(|(slot, word)| Lyric::new(slot.time, word.word.clone()))
        .collect();

    vec![
        Track {
            id: 1,
            title: "Cycle Cut".to_string(),
            artist: "Rudybtz".to_string(),
            description: "A dark, glitch-heavy anthem about breaking toxic patterns.".to_string(),
            audio_src: "assets/cycle_cut.wav".to_string(),
            cover: "assets/cycle_cut.png".to_string(),
            lyrics: cycle_cut,
        },
        Track {
            id: 2,
            title: "Mirror Break".to_string(),
            artist: "Rudybtz".to_string(),
            description: "Confronting the self with hard-hitting breaks and raw honesty."
                .to_string(),
            audio_src: "assets/mirror_break.wav".to_string(),
            cover: "assets/mirror_break.png".to_string(),
            lyrics: mirrored,
        },
        Track {
            id: 3,
            title: "Gone With the Drop".to_string(),
            artist: "Rudybtz".to_string(),
            description: "The powerful closer about letting go and moving forward.".to_string(),
            audio_src: "assets/gone_with_the_drop.wav".to_string(),
            cover: "assets/gone_with_the_drop.png".to_string(),
            lyrics: reversed,
        },
    ]
}
