use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

const DEFAULT_CONFIG: &str = include_str!("../config.toml");

/// Environment variable that overrides the configured MIDI port name.
pub const PORT_ENV_VAR: &str = "TEMPERA_PORT";

#[derive(Deserialize, Default)]
struct ConfigFile {
    #[serde(default)]
    midi: MidiConfig,
    #[serde(default)]
    playback: PlaybackConfig,
    #[serde(default)]
    grid: GridConfig,
}

#[derive(Deserialize, Default)]
struct MidiConfig {
    port: Option<String>,
    client_name: Option<String>,
    virtual_port: Option<bool>,
    global_channel: Option<u8>,
}

#[derive(Deserialize, Default)]
struct PlaybackConfig {
    note: Option<u8>,
    velocity: Option<u8>,
    gate_ratio: Option<f64>,
    step_duration: Option<f64>,
}

#[derive(Deserialize, Default)]
struct GridConfig {
    columns: Option<u8>,
    cells: Option<u8>,
}

/// Where and how to open the outbound MIDI channel.
#[derive(Debug, Clone, PartialEq)]
pub struct MidiSettings {
    pub port: String,
    pub client_name: String,
    pub virtual_port: bool,
    /// Channel (1-16) for global and track controls.
    pub global_channel: u8,
}

/// Note used for emitter activation and the step gate.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlaybackSettings {
    pub note: u8,
    pub velocity: u8,
    /// Fraction of a step an activated emitter sounds before it is released.
    pub gate_ratio: f64,
    pub step_duration: Duration,
}

impl Default for PlaybackSettings {
    fn default() -> Self {
        Self {
            note: 60,
            velocity: 127,
            gate_ratio: 0.999,
            step_duration: Duration::from_millis(500),
        }
    }
}

/// Grid dimensions: `columns` banks of `cells` cells each.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GridLayout {
    pub columns: u8,
    pub cells: u8,
}

impl GridLayout {
    pub fn step_count(&self) -> usize {
        self.columns as usize * self.cells as usize
    }
}

impl Default for GridLayout {
    fn default() -> Self {
        Self {
            columns: 8,
            cells: 8,
        }
    }
}

pub struct Config {
    midi: MidiConfig,
    playback: PlaybackConfig,
    grid: GridConfig,
}

impl Config {
    /// Embedded defaults merged with the user's config file, if any.
    pub fn load() -> Self {
        match user_config_path() {
            Some(path) => Self::load_with_override(&path),
            None => Self::defaults(),
        }
    }

    /// Embedded defaults merged with the file at `path`. A missing, unreadable
    /// or malformed file leaves the defaults in place.
    pub fn load_with_override(path: &Path) -> Self {
        let mut base = embedded();
        if path.exists() {
            match std::fs::read_to_string(path) {
                Ok(contents) => match toml::from_str::<ConfigFile>(&contents) {
                    Ok(user) => merge(&mut base, user),
                    Err(e) => {
                        log::warn!(target: "config", "ignoring malformed config {}: {}", path.display(), e)
                    }
                },
                Err(e) => {
                    log::warn!(target: "config", "could not read config {}: {}", path.display(), e)
                }
            }
        }
        Self::from_file(base)
    }

    pub fn defaults() -> Self {
        Self::from_file(embedded())
    }

    /// Defaults overridden by `contents`.
    pub fn from_toml_str(contents: &str) -> Result<Self, toml::de::Error> {
        let mut base = embedded();
        merge(&mut base, toml::from_str(contents)?);
        Ok(Self::from_file(base))
    }

    fn from_file(file: ConfigFile) -> Self {
        Config {
            midi: file.midi,
            playback: file.playback,
            grid: file.grid,
        }
    }

    /// MIDI settings; `TEMPERA_PORT` wins over the configured port.
    pub fn midi(&self) -> MidiSettings {
        let port = std::env::var(PORT_ENV_VAR)
            .ok()
            .filter(|p| !p.is_empty())
            .or_else(|| self.midi.port.clone())
            .unwrap_or_else(|| "Tempera".to_string());
        MidiSettings {
            port,
            client_name: self
                .midi
                .client_name
                .clone()
                .unwrap_or_else(|| "tempera".to_string()),
            virtual_port: self.midi.virtual_port.unwrap_or(false),
            global_channel: self.midi.global_channel.unwrap_or(1).clamp(1, 16),
        }
    }

    pub fn playback(&self) -> PlaybackSettings {
        let fallback = PlaybackSettings::default();
        let step_secs = self
            .playback
            .step_duration
            .filter(|s| s.is_finite() && *s > 0.0);
        PlaybackSettings {
            note: self.playback.note.unwrap_or(fallback.note).min(127),
            velocity: self.playback.velocity.unwrap_or(fallback.velocity).min(127),
            gate_ratio: self
                .playback
                .gate_ratio
                .unwrap_or(fallback.gate_ratio)
                .clamp(0.01, 1.0),
            step_duration: step_secs
                .map(Duration::from_secs_f64)
                .unwrap_or(fallback.step_duration),
        }
    }

    /// Grid layout (each dimension clamped to 1..=8, the device's grid).
    pub fn grid(&self) -> GridLayout {
        let fallback = GridLayout::default();
        GridLayout {
            columns: self.grid.columns.unwrap_or(fallback.columns).clamp(1, 8),
            cells: self.grid.cells.unwrap_or(fallback.cells).clamp(1, 8),
        }
    }
}

fn embedded() -> ConfigFile {
    toml::from_str(DEFAULT_CONFIG).expect("Failed to parse embedded config.toml")
}

pub fn user_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("tempera").join("config.toml"))
}

fn merge(base: &mut ConfigFile, user: ConfigFile) {
    merge_midi(&mut base.midi, user.midi);
    merge_playback(&mut base.playback, user.playback);
    merge_grid(&mut base.grid, user.grid);
}

fn merge_midi(base: &mut MidiConfig, user: MidiConfig) {
    if user.port.is_some() {
        base.port = user.port;
    }
    if user.client_name.is_some() {
        base.client_name = user.client_name;
    }
    if user.virtual_port.is_some() {
        base.virtual_port = user.virtual_port;
    }
    if user.global_channel.is_some() {
        base.global_channel = user.global_channel;
    }
}

fn merge_playback(base: &mut PlaybackConfig, user: PlaybackConfig) {
    if user.note.is_some() {
        base.note = user.note;
    }
    if user.velocity.is_some() {
        base.velocity = user.velocity;
    }
    if user.gate_ratio.is_some() {
        base.gate_ratio = user.gate_ratio;
    }
    if user.step_duration.is_some() {
        base.step_duration = user.step_duration;
    }
}

fn merge_grid(base: &mut GridConfig, user: GridConfig) {
    if user.columns.is_some() {
        base.columns = user.columns;
    }
    if user.cells.is_some() {
        base.cells = user.cells;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn embedded_defaults_parse() {
        let config = Config::defaults();
        let playback = config.playback();
        assert_eq!(playback.note, 60);
        assert_eq!(playback.velocity, 127);
        assert!((playback.gate_ratio - 0.999).abs() < 1e-9);
        assert_eq!(playback.step_duration, Duration::from_millis(500));
        assert_eq!(config.grid(), GridLayout::default());
        assert_eq!(config.grid().step_count(), 64);
    }

    #[test]
    fn user_values_override_only_what_they_set() {
        let config = Config::from_toml_str("[playback]\nnote = 48\n").unwrap();
        let playback = config.playback();
        assert_eq!(playback.note, 48);
        assert_eq!(playback.velocity, 127);
        assert_eq!(config.midi().client_name, "tempera");
    }

    #[test]
    fn out_of_range_values_are_clamped() {
        let config =
            Config::from_toml_str("[grid]\ncolumns = 12\ncells = 0\n[playback]\ngate_ratio = 3.0\n")
                .unwrap();
        assert_eq!(config.grid(), GridLayout { columns: 8, cells: 1 });
        assert_eq!(config.playback().gate_ratio, 1.0);
    }

    #[test]
    fn malformed_user_file_falls_back_to_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "this is = = not toml").unwrap();
        let config = Config::load_with_override(file.path());
        assert_eq!(config.playback().note, 60);
    }

    #[test]
    fn user_file_is_merged() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[midi]\nclient_name = \"studio\"\nglobal_channel = 3").unwrap();
        let config = Config::load_with_override(file.path());
        let midi = config.midi();
        assert_eq!(midi.client_name, "studio");
        assert_eq!(midi.global_channel, 3);
    }
}
