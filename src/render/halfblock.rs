use crate::render::{Frame, draw_overlay_popup};
use std::io::Write;

/// Paints two pixel rows per terminal row with `▀`: the foreground colour
/// is the top pixel and the background colour the bottom one.
#[derive(Default)]
pub struct HalfBlockRenderer {
    last_fg: Option<(u8, u8, u8)>,
    last_bg: Option<(u8, u8, u8)>,
}

impl HalfBlockRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    fn pixel(frame: &Frame<'_>, x: usize, y: usize) -> (u8, u8, u8) {
        let i = (y * frame.pixel_width + x) * 4;
        (
            frame.pixels_rgba[i],
            frame.pixels_rgba[i + 1],
            frame.pixels_rgba[i + 2],
        )
    }

    pub fn render(&mut self, frame: &Frame<'_>, out: &mut dyn Write) -> anyhow::Result<()> {
        let cols = frame.term_cols as usize;
        let visual_rows = frame.visual_rows as usize;
        let w = frame.pixel_width;
        let h = frame.pixel_height;

        if cols == 0 || visual_rows == 0 || w != cols || h != visual_rows * 2 {
            return Ok(());
        }
        if frame.pixels_rgba.len() < w * h * 4 {
            return Ok(());
        }

        // Synchronized update, home, reset, no autowrap while painting full rows.
        out.write_all(b"\x1b[?2026h\x1b[H\x1b[0m\x1b[?7l")?;
        self.last_fg = None;
        self.last_bg = None;

        for row in 0..visual_rows {
            for x in 0..cols {
                let top = Self::pixel(frame, x, row * 2);
                let bottom = Self::pixel(frame, x, row * 2 + 1);
                if self.last_fg != Some(top) {
                    write!(out, "\x1b[38;2;{};{};{}m", top.0, top.1, top.2)?;
                    self.last_fg = Some(top);
                }
                if self.last_bg != Some(bottom) {
                    write!(out, "\x1b[48;2;{};{};{}m", bottom.0, bottom.1, bottom.2)?;
                    self.last_bg = Some(bottom);
                }
                out.write_all("\u{2580}".as_bytes())?;
            }
            out.write_all(b"\r\n")?;
        }

        let mut hud_lines = frame.hud.lines();
        for i in 0..(frame.hud_rows as usize) {
            write!(out, "\x1b[{};1H\x1b[0m\x1b[2K", visual_rows + i + 1)?;
            if let Some(line) = hud_lines.next() {
                let clipped: String = line.chars().take(cols).collect();
                out.write_all(clipped.as_bytes())?;
            }
        }

        if let Some(text) = frame.overlay {
            draw_overlay_popup(out, frame.term_cols, frame.term_rows, text)?;
        }

        out.write_all(b"\x1b[?7h\x1b[?2026l")?;
        out.flush()?;
        Ok(())
    }
}
