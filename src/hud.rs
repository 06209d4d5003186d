use crate::faces::ContentKind;
use crate::preset::Face;
use crate::session::{FrameSnapshot, RemixStatus};
use std::fmt::Write as _;

const METER_WIDTH: usize = 20;

pub fn build_hud(snap: &FrameSnapshot, fps: f32, cols: usize) -> Vec<String> {
    let mut lines = Vec::with_capacity(6);

    let track = snap
        .track
        .as_ref()
        .map(|t| t.label())
        .unwrap_or_else(|| "no track".to_string());
    lines.push(format!(
        "[{}] {}  {}  vol {:>3}%  preset: {}",
        snap.state.label(),
        track,
        format_clock(snap.position_s),
        (snap.volume * 100.0).round() as u32,
        snap.preset.display_name(),
    ));

    let r = &snap.render;
    lines.push(format!(
        "bass {} {:.2}  scale {:.3}  rot {:.2}  glitch {:.2}  fracture {:.2}  bloom {:.2}",
        meter(r.bass_level),
        r.bass_level,
        r.cube_scale,
        r.rotation_speed,
        r.glitch_strength,
        r.fracture_strength,
        r.bloom_intensity,
    ));

    let mut lyric = String::from("lyric: ");
    match &snap.active {
        Some(active) => {
            let _ = write!(lyric, "\"{}\" #{} on {}", active.word, active.index, active.face.label());
        }
        None => lyric.push('-'),
    }
    match &snap.remix {
        RemixStatus::Idle => {}
        RemixStatus::Pending => lyric.push_str("  | remixing..."),
        RemixStatus::Applied(id) => {
            let _ = write!(lyric, "  | remix {id}");
        }
        RemixStatus::Failed(err) => {
            let _ = write!(lyric, "  | remix failed: {err}");
        }
    }
    lines.push(lyric);

    let mut faces = String::from("faces:");
    for face in Face::all() {
        let cell = match &snap.faces[face.index()] {
            None => "-".to_string(),
            Some(c) => match c.kind {
                ContentKind::Text => c.payload.to_string(),
                ContentKind::Image => format!("{} [img]", c.key),
                ContentKind::Loading => format!("{} [...]", c.key),
            },
        };
        let _ = write!(faces, " {}={}", face.label(), cell);
    }
    lines.push(faces);

    lines.push(format!(
        "fps {:>4.1}  space play/pause  n/p track  [ ] preset  r remix  +/- vol  / search  ? help  q quit",
        fps
    ));

    wrap_hud_lines(cols, &lines)
}

pub fn help_popup_text() -> &'static str {
    "bass_cube keys\n\
space  play / pause\n\
n or right  next track\n\
p or left  previous track\n\
[ / ]  previous / next preset\n\
r  remix the current preset\n\
+ / -  volume up / down\n\
/  search a track by title (enter to pick, esc to cancel)\n\
?  toggle this help\n\
q or esc  quit"
}

pub fn format_clock(seconds: f32) -> String {
    let total = seconds.max(0.0) as u32;
    format!("{:02}:{:02}", total / 60, total % 60)
}

fn meter(level: f32) -> String {
    let filled = ((level.clamp(0.0, 1.0) * METER_WIDTH as f32).round()) as usize;
    format!("[{}{}]", "#".repeat(filled), ".".repeat(METER_WIDTH - filled))
}

pub fn wrap_hud_lines(cols: usize, lines: &[String]) -> Vec<String> {
    let width = cols.max(1);
    lines
        .iter()
        .flat_map(|line| hard_wrap_line(line, width))
        .collect()
}

pub fn hard_wrap_line(line: &str, width: usize) -> Vec<String> {
    if line.is_empty() {
        return vec![String::new()];
    }
    let chars: Vec<char> = line.chars().collect();
    chars
        .chunks(width.max(1))
        .map(|chunk| chunk.iter().collect())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wraps_on_char_boundaries() {
        assert_eq!(hard_wrap_line("abcdé", 2), vec!["ab", "cd", "é"]);
        assert_eq!(hard_wrap_line("", 4), vec![String::new()]);
    }

    #[test]
    fn meter_is_fixed_width() {
        assert_eq!(meter(0.0).chars().count(), METER_WIDTH + 2);
        assert_eq!(meter(2.0), format!("[{}]", "#".repeat(METER_WIDTH)));
    }

    #[test]
    fn clock_formats_minutes() {
        assert_eq!(format_clock(75.9), "01:15");
    }
}
