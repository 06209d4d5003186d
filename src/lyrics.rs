use crate::preset::Face;
use crate::track::Lyric;
use anyhow::{Context, Result, anyhow};
use std::fs;
use std::path::Path;

/// Spacing used for untimed lines, and the span given to the final timed line.
const LINE_CADENCE_S: f32 = 2.4;

/// Index of the lyric active at `time_s`.
///
/// A lyric is active from its own timestamp up to, but excluding, the next
/// lyric's timestamp; the last lyric stays active indefinitely. Returns `None`
/// for an empty sheet or a time before the first lyric. `lyrics` must be
/// sorted by time.
pub fn active_index(lyrics: &[Lyric], time_s: f32) -> Option<usize> {
    let idx = lyrics.partition_point(|lyric| lyric.time <= time_s);
    idx.checked_sub(1)
}

/// Lyrics are dealt onto the six faces in turn, so index `i` and `i + 6`
/// share a face.
pub fn face_for_index(index: usize) -> Face {
    Face::from_index(index)
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ActiveLyric<'a> {
    pub index: usize,
    pub face: Face,
    pub word: &'a str,
}

pub fn active_lyric(lyrics: &[Lyric], time_s: f32) -> Option<ActiveLyric<'_>> {
    let index = active_index(lyrics, time_s)?;
    let lyric = lyrics.get(index)?;
    Some(ActiveLyric {
        index,
        face: face_for_index(index),
        word: lyric.word.as_str(),
    })
}

pub fn load_lrc(path: impl AsRef<Path>) -> Result<Vec<Lyric>> {
    let path = path.as_ref();
    let raw =
        fs::read_to_string(path).with_context(|| format!("failed reading {}", path.display()))?;
    parse_lrc(&raw)
}

/// Parses an LRC sheet into word-level lyrics.
///
/// Each timed line is split on whitespace and its words are spread evenly
/// over the gap to the following line. Sheets without any timestamps fall
/// back to a fixed line cadence.
pub fn parse_lrc(input: &str) -> Result<Vec<Lyric>> {
    let mut timed = Vec::<(f32, String)>::new();
    let mut untimed = Vec::<String>::new();

    for raw_line in input.lines() {
        let line = raw_line.trim();
        if line.is_empty() {
            continue;
        }

        let tags = split_tags(line);
        let text = tags.text.trim();

        if !tags.times.is_empty() {
            if !text.is_empty() {
                timed.extend(tags.times.iter().map(|&t| (t, text.to_string())));
            }
            continue;
        }

        if !tags.tagged {
            untimed.push(text.to_string());
        }
    }

    if timed.is_empty() && untimed.is_empty() {
        return Err(anyhow!("no lyric lines found"));
    }

    if timed.is_empty() {
        for (i, text) in untimed.into_iter().enumerate() {
            timed.push((i as f32 * LINE_CADENCE_S, text));
        }
    }

    timed.sort_by(|a, b| a.0.total_cmp(&b.0));

    let mut words = Vec::<Lyric>::new();
    for (i, (start, text)) in timed.iter().enumerate() {
        let end = timed
            .get(i + 1)
            .map(|(next, _)| *next)
            .unwrap_or(start + LINE_CADENCE_S);
        let parts: Vec<&str> = text.split_whitespace().collect();
        let step = (end - start).max(0.0) / parts.len().max(1) as f32;
        for (k, word) in parts.iter().enumerate() {
            words.push(Lyric::new(start + step * k as f32, *word));
        }
    }

    Ok(words)
}

struct LineTags<'a> {
    times: Vec<f32>,
    text: &'a str,
    tagged: bool,
}

/// Peels leading `[...]` tags off a line.
fn split_tags(line: &str) -> LineTags<'_> {
    let mut tags = LineTags {
        times: Vec::new(),
        text: line,
        tagged: false,
    };
    while let Some((tag, rest)) = tags.text.strip_prefix('[').and_then(|s| s.split_once(']')) {
        tags.tagged = true;
        tags.times.extend(tag_seconds(tag));
        tags.text = rest;
    }
    tags
}

/// `mm:ss.xx` or `hh:mm:ss.xx`; `None` for metadata tags like `ti:` or `ar:`.
fn tag_seconds(tag: &str) -> Option<f32> {
    let (clock, secs) = tag.rsplit_once(':')?;
    let secs = secs
        .trim()
        .replace(',', ".")
        .parse::<f32>()
        .ok()
        .filter(|v| v.is_finite() && *v >= 0.0)?;
    let parts = clock
        .split(':')
        .map(|p| p.trim().parse::<u32>().ok())
        .collect::<Option<Vec<u32>>>()?;
    if parts.len() > 2 {
        return None;
    }
    let minutes = parts.iter().fold(0u32, |acc, p| acc * 60 + p);
    Some(minutes as f32 * 60.0 + secs)
}
