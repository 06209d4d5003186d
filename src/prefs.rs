use std::fmt;
use std::path::{Path, PathBuf};

const APP_DIR: &str = "bass_cube";

/// Settings remembered between runs.
#[derive(Debug, Clone, PartialEq)]
pub struct AppPrefs {
    pub preset: Option<String>,
    pub volume: f32,
}

impl Default for AppPrefs {
    fn default() -> Self {
        Self {
            preset: None,
            volume: 0.8,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PrefsError {
    Io(String),
    Parse { line: usize, message: String },
}

impl fmt::Display for PrefsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(msg) => write!(f, "I/O error: {msg}"),
            Self::Parse { line, message } => write!(f, "parse error at line {line}: {message}"),
        }
    }
}

impl std::error::Error for PrefsError {}

impl AppPrefs {
    /// Reads the prefs file at `path`. A missing file yields defaults.
    pub fn load(path: Option<&Path>) -> Result<Self, PrefsError> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        match std::fs::read_to_string(path) {
            Ok(text) => Self::parse(&text),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(err) => Err(PrefsError::Io(err.to_string())),
        }
    }

    /// `key=value` lines; `#` starts a comment and unknown keys are skipped.
    pub fn parse(text: &str) -> Result<Self, PrefsError> {
        let mut prefs = Self::default();
        let entries = text
            .lines()
            .enumerate()
            .map(|(idx, raw)| (idx + 1, raw.trim()))
            .filter(|(_, line)| !line.is_empty() && !line.starts_with('#'));
        for (line, entry) in entries {
            let (key, value) = entry.split_once('=').ok_or_else(|| PrefsError::Parse {
                line,
                message: "expected <key>=<value>".to_string(),
            })?;
            prefs.apply(key.trim(), value.trim(), line)?;
        }
        Ok(prefs)
    }

    fn apply(&mut self, key: &str, value: &str, line: usize) -> Result<(), PrefsError> {
        match key {
            "preset" if value.is_empty() => self.preset = None,
            "preset" => self.preset = Some(value.to_string()),
            "volume" => {
                self.volume = value
                    .parse::<f32>()
                    .ok()
                    .filter(|v| (0.0..=1.0).contains(v))
                    .ok_or_else(|| PrefsError::Parse {
                        line,
                        message: format!("volume must be a number in 0..1, got '{value}'"),
                    })?;
            }
            _ => {}
        }
        Ok(())
    }

    /// Writes atomically via a temp file and rename.
    pub fn save(&self, path: Option<&Path>) -> Result<(), PrefsError> {
        let Some(path) = path else {
            return Ok(());
        };
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| PrefsError::Io(e.to_string()))?;
        }
        let mut body = String::from("# bass_cube prefs v1\n");
        if let Some(preset) = &self.preset {
            body.push_str(&format!("preset={preset}\n"));
        }
        body.push_str(&format!("volume={:.2}\n", self.volume.clamp(0.0, 1.0)));

        let tmp = path.with_extension("tmp");
        std::fs::write(&tmp, &body).map_err(|e| PrefsError::Io(e.to_string()))?;
        std::fs::rename(&tmp, path).map_err(|e| PrefsError::Io(e.to_string()))
    }
}

/// `$XDG_CONFIG_HOME/bass_cube`, else `~/.config/bass_cube`.
pub fn config_dir() -> Option<PathBuf> {
    if let Ok(xdg) = std::env::var("XDG_CONFIG_HOME") {
        if !xdg.trim().is_empty() {
            return Some(PathBuf::from(xdg).join(APP_DIR));
        }
    }
    let home = std::env::var("HOME").ok()?;
    if home.trim().is_empty() {
        return None;
    }
    Some(PathBuf::from(home).join(".config").join(APP_DIR))
}

pub fn prefs_storage_path() -> Option<PathBuf> {
    config_dir().map(|dir| dir.join("prefs.txt"))
}
