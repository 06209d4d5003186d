use serde::{Deserialize, Serialize};

/// One time-stamped word of a lyric sheet.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Lyric {
    /// Seconds from the start of the track.
    pub time: f32,
    pub word: String,
}

impl Lyric {
    pub fn new(time: f32, word: impl Into<String>) -> Self {
        Self {
            time,
            word: word.into(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Track {
    pub id: u32,
    pub title: String,
    pub artist: String,
    #[serde(default)]
    pub description: String,
    pub audio_src: String,
    #[serde(default)]
    pub cover: String,
    /// Sorted ascending by `time`.
    #[serde(default)]
    pub lyrics: Vec<Lyric>,
}

impl Track {
    pub fn label(&self) -> String {
        format!("{} - {}", self.artist, self.title)
    }

    /// Lyric times must be finite, non-negative and non-decreasing.
    pub fn lyrics_are_ordered(&self) -> bool {
        let mut prev = 0.0f32;
        for lyric in &self.lyrics {
            if !lyric.time.is_finite() || lyric.time < prev {
                return false;
            }
            prev = lyric.time;
        }
        true
    }

    /// Returns a copy with `lyrics` replaced, sorted by time.
    pub fn with_lyrics(&self, mut lyrics: Vec<Lyric>) -> Self {
        lyrics.sort_by(|a, b| a.time.total_cmp(&b.time));
        Self {
            lyrics,
            ..self.clone()
        }
    }
}
