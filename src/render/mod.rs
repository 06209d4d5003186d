mod cube;
mod halfblock;

pub use cube::CubeView;
pub use halfblock::HalfBlockRenderer;

use std::io::Write;

/// One terminal frame: the cube pixels on top, HUD text below, and an
/// optional centered popup.
pub struct Frame<'a> {
    pub term_cols: u16,
    pub term_rows: u16,
    pub visual_rows: u16,
    pub pixel_width: usize,
    pub pixel_height: usize,
    pub pixels_rgba: &'a [u8],
    pub hud: &'a str,
    pub hud_rows: u16,
    pub overlay: Option<&'a str>,
}

/// Draws `text` in a bordered box centred on the screen. The first line is
/// the title. Only the box itself is painted.
pub fn draw_overlay_popup(
    out: &mut dyn Write,
    term_cols: u16,
    term_rows: u16,
    text: &str,
) -> anyhow::Result<()> {
    let (cols, rows) = (term_cols as usize, term_rows as usize);
    if text.trim().is_empty() || cols < 8 || rows < 4 {
        return Ok(());
    }

    let wrap_at = cols - 6;
    let mut lines: Vec<String> = text
        .lines()
        .flat_map(|raw| crate::hud::hard_wrap_line(raw, wrap_at))
        .collect();
    lines.truncate(rows - 3);
    if lines.is_empty() {
        return Ok(());
    }

    let inner = lines
        .iter()
        .map(|l| l.chars().count())
        .max()
        .unwrap_or(1)
        .clamp(1, wrap_at);
    let width = inner + 4;
    let height = lines.len() + 2;
    let left = (cols - width) / 2 + 1;
    let top = (rows.saturating_sub(height)) / 2 + 1;
    let rule = "\u{2500}".repeat(width - 2);

    const BODY: &str = "\x1b[0m\x1b[38;2;226;232;240m\x1b[48;2;12;10;28m";
    const TITLE: &str = "\x1b[1m\x1b[38;2;159;122;234m";

    out.write_all(BODY.as_bytes())?;
    write!(out, "\x1b[{top};{left}H\u{250c}{rule}\u{2510}")?;
    for (i, line) in lines.iter().enumerate() {
        let pad = inner - line.chars().count().min(inner);
        let style = if i == 0 { TITLE } else { "" };
        write!(
            out,
            "\x1b[{};{left}H\u{2502} {style}{line}{BODY}{} \u{2502}",
            top + 1 + i,
            " ".repeat(pad)
        )?;
    }
    write!(
        out,
        "\x1b[{};{left}H\u{2514}{rule}\u{2518}\x1b[0m",
        top + height - 1
    )?;
    Ok(())
}
