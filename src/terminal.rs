use anyhow::Context;
use crossterm::{
    ExecutableCommand, cursor, execute,
    terminal::{self, ClearType},
};
use std::io::{Stdout, Write, stdout};

/// Raw mode plus alternate screen for the lifetime of the guard.
pub struct TerminalGuard {
    restored: bool,
}

impl TerminalGuard {
    pub fn new() -> anyhow::Result<Self> {
        terminal::enable_raw_mode().context("enable raw mode")?;
        // From here on Drop undoes raw mode even if a later step fails.
        let guard = Self { restored: false };

        let mut out = stdout();
        execute!(
            out,
            terminal::EnterAlternateScreen,
            terminal::Clear(ClearType::All),
            cursor::Hide
        )
        .context("prepare alternate screen")?;
        Ok(guard)
    }

    pub fn stdout() -> Stdout {
        stdout()
    }

    /// Current size as (cols, rows).
    pub fn size() -> anyhow::Result<(u16, u16)> {
        terminal::size().context("get terminal size")
    }

    fn restore(&mut self) {
        if self.restored {
            return;
        }
        self.restored = true;
        let _ = terminal::disable_raw_mode();
        let mut out = stdout();
        // Leave sync-output and no-autowrap modes if a frame was cut short.
        let _ = out.write_all(b"\x1b[?2026l\x1b[?7h\x1b[0m");
        let _ = out.flush();
        let _ = out
            .execute(cursor::Show)
            .and_then(|o| o.execute(terminal::LeaveAlternateScreen));
    }
}

impl Drop for TerminalGuard {
    fn drop(&mut self) {
        self.restore();
    }
}
