//! Persisted user settings.
//!
//! Settings are a flat map of string keys to string values, stored as a
//! JSON object. [`AppSettings`] is the typed view over that map.

use crate::config::{format_sequence, parse_sequence, secs_to_duration, PressConfig};
use crate::error::{KapError, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use tracing::debug;

pub const KEY_SEQUENCE: &str = "sequence";
pub const KEY_INTERVAL: &str = "interval";
pub const KEY_HOTKEY: &str = "hotkey";
pub const KEY_ON_TOP: &str = "on_top";
pub const KEY_THEME: &str = "theme";
pub const KEY_RANDOM_INTERVAL: &str = "random_interval";
pub const KEY_INTERVAL_MIN: &str = "interval_min";
pub const KEY_INTERVAL_MAX: &str = "interval_max";
pub const KEY_HOLD_TIME: &str = "hold_time";
pub const KEY_SHUFFLE: &str = "shuffle";

/// Every persisted key, in display order.
pub const ALL_KEYS: [&str; 10] = [
    KEY_SEQUENCE,
    KEY_INTERVAL,
    KEY_HOTKEY,
    KEY_ON_TOP,
    KEY_THEME,
    KEY_RANDOM_INTERVAL,
    KEY_INTERVAL_MIN,
    KEY_INTERVAL_MAX,
    KEY_HOLD_TIME,
    KEY_SHUFFLE,
];

pub const DEFAULT_HOTKEY: &str = "f8";

/// Durable string key/value storage.
pub trait SettingsStore {
    fn value(&self, key: &str) -> Option<String>;
    fn set_value(&mut self, key: &str, value: String);
    /// Makes pending writes durable.
    fn sync(&mut self) -> Result<()>;
}

/// In-memory store, for tests and throwaway runs.
#[derive(Debug, Default, Clone)]
pub struct MemorySettingsStore {
    values: BTreeMap<String, String>,
}

impl MemorySettingsStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SettingsStore for MemorySettingsStore {
    fn value(&self, key: &str) -> Option<String> {
        self.values.get(key).cloned()
    }

    fn set_value(&mut self, key: &str, value: String) {
        self.values.insert(key.to_string(), value);
    }

    fn sync(&mut self) -> Result<()> {
        Ok(())
    }
}

/// A value as found in a settings file. Files are written with string
/// values only, but hand-edited numbers and booleans are accepted.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawValue {
    Text(String),
    Number(f64),
    Flag(bool),
}

impl RawValue {
    fn into_string(self) -> String {
        match self {
            RawValue::Text(text) => text,
            RawValue::Number(number) => number.to_string(),
            RawValue::Flag(flag) => flag.to_string(),
        }
    }
}

/// Store backed by a JSON object of string values.
#[derive(Debug)]
pub struct JsonSettingsStore {
    path: PathBuf,
    values: BTreeMap<String, String>,
}

impl JsonSettingsStore {
    /// Opens the store at `path`. A missing file is an empty store.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let values = if path.exists() {
            let content = fs::read_to_string(&path)
                .map_err(|e| KapError::settings_load(path.display().to_string(), e.to_string()))?;
            let raw: BTreeMap<String, RawValue> = serde_json::from_str(&content)
                .map_err(|e| KapError::settings_load(path.display().to_string(), e.to_string()))?;
            raw.into_iter().map(|(k, v)| (k, v.into_string())).collect()
        } else {
            BTreeMap::new()
        };
        debug!(path = %path.display(), entries = values.len(), "opened settings");
        Ok(Self { path, values })
    }

    /// Opens the store at [`default_path`](Self::default_path).
    pub fn open_default() -> Result<Self> {
        Self::open(Self::default_path()?)
    }

    /// Platform config location:
    ///
    /// - Linux: `~/.config/KeyAutoPresser/settings.json`
    /// - macOS: `~/Library/Application Support/KeyAutoPresser/settings.json`
    /// - Windows: `%APPDATA%\KeyAutoPresser\settings.json`
    pub fn default_path() -> Result<PathBuf> {
        let dir = dirs::config_dir().ok_or_else(|| {
            KapError::settings_load("<config dir>", "cannot determine config directory")
        })?;
        Ok(dir.join("KeyAutoPresser").join("settings.json"))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn entries(&self) -> &BTreeMap<String, String> {
        &self.values
    }
}

impl SettingsStore for JsonSettingsStore {
    fn value(&self, key: &str) -> Option<String> {
        self.values.get(key).cloned()
    }

    fn set_value(&mut self, key: &str, value: String) {
        self.values.insert(key.to_string(), value);
    }

    fn sync(&mut self) -> Result<()> {
        let save_err = |reason: String| KapError::settings_save(self.path.display().to_string(), reason);
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|e| save_err(e.to_string()))?;
        }
        let content = serde_json::to_string_pretty(&self.values)?;
        fs::write(&self.path, content).map_err(|e| save_err(e.to_string()))?;
        debug!(path = %self.path.display(), "saved settings");
        Ok(())
    }
}

/// Colour theme of a graphical shell. Persisted for round-tripping only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Theme {
    #[default]
    Dark,
    Light,
    Neon,
}

impl fmt::Display for Theme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Theme::Dark => "Dark",
            Theme::Light => "Light",
            Theme::Neon => "Neon",
        };
        f.write_str(name)
    }
}

impl FromStr for Theme {
    type Err = KapError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "dark" => Ok(Theme::Dark),
            "light" => Ok(Theme::Light),
            "neon" => Ok(Theme::Neon),
            _ => Err(KapError::config_validation(format!(
                "unknown theme '{}', expected Dark, Light or Neon",
                s
            ))),
        }
    }
}

/// Typed view of every persisted setting.
#[derive(Debug, Clone, PartialEq)]
pub struct AppSettings {
    pub press: PressConfig,
    pub hotkey: String,
    pub on_top: bool,
    pub theme: Theme,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            press: PressConfig::default(),
            hotkey: DEFAULT_HOTKEY.to_string(),
            on_top: true,
            theme: Theme::Dark,
        }
    }
}

impl AppSettings {
    /// Reads settings, falling back to defaults for anything missing or
    /// unparsable.
    pub fn load(store: &dyn SettingsStore) -> Self {
        let defaults = Self::default();
        let duration = |key: &str, fallback: Duration| {
            store
                .value(key)
                .and_then(|v| v.trim().parse::<f64>().ok())
                .map(secs_to_duration)
                .filter(|d| !d.is_zero())
                .unwrap_or(fallback)
        };
        let flag = |key: &str, fallback: bool| {
            store.value(key).map(|v| v == "true").unwrap_or(fallback)
        };

        let mut press = PressConfig {
            sequence: store
                .value(KEY_SEQUENCE)
                .map(|v| parse_sequence(&v))
                .unwrap_or(defaults.press.sequence),
            base_interval: duration(KEY_INTERVAL, defaults.press.base_interval),
            randomized: flag(KEY_RANDOM_INTERVAL, defaults.press.randomized),
            interval_min: duration(KEY_INTERVAL_MIN, defaults.press.interval_min),
            interval_max: duration(KEY_INTERVAL_MAX, defaults.press.interval_max),
            hold_duration: duration(KEY_HOLD_TIME, defaults.press.hold_duration),
            shuffle: flag(KEY_SHUFFLE, defaults.press.shuffle),
        };
        press.commit();

        Self {
            press,
            hotkey: store
                .value(KEY_HOTKEY)
                .map(|v| normalize_hotkey(&v))
                .unwrap_or(defaults.hotkey),
            on_top: flag(KEY_ON_TOP, defaults.on_top),
            theme: store
                .value(KEY_THEME)
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.theme),
        }
    }

    /// Writes every setting and syncs the store.
    pub fn save(&self, store: &mut dyn SettingsStore) -> Result<()> {
        for key in ALL_KEYS {
            store.set_value(key, self.get(key)?);
        }
        store.sync()
    }

    /// Persisted string form of one setting.
    pub fn get(&self, key: &str) -> Result<String> {
        let p = &self.press;
        let value = match key {
            KEY_SEQUENCE => format_sequence(&p.sequence),
            KEY_INTERVAL => p.base_interval.as_secs_f64().to_string(),
            KEY_HOTKEY => self.hotkey.clone(),
            KEY_ON_TOP => self.on_top.to_string(),
            KEY_THEME => self.theme.to_string(),
            KEY_RANDOM_INTERVAL => p.randomized.to_string(),
            KEY_INTERVAL_MIN => p.interval_min.as_secs_f64().to_string(),
            KEY_INTERVAL_MAX => p.interval_max.as_secs_f64().to_string(),
            KEY_HOLD_TIME => p.hold_duration.as_secs_f64().to_string(),
            KEY_SHUFFLE => p.shuffle.to_string(),
            _ => return Err(unknown_key(key)),
        };
        Ok(value)
    }

    /// Updates one setting from its persisted string form.
    pub fn set(&mut self, key: &str, value: &str) -> Result<()> {
        match key {
            KEY_SEQUENCE => self.press.sequence = parse_sequence(value),
            KEY_INTERVAL => self.press.base_interval = parse_secs(key, value)?,
            KEY_HOTKEY => self.hotkey = normalize_hotkey(value),
            KEY_ON_TOP => self.on_top = parse_flag(key, value)?,
            KEY_THEME => self.theme = value.parse()?,
            KEY_RANDOM_INTERVAL => self.press.randomized = parse_flag(key, value)?,
            KEY_INTERVAL_MIN => self.press.interval_min = parse_secs(key, value)?,
            KEY_INTERVAL_MAX => self.press.interval_max = parse_secs(key, value)?,
            KEY_HOLD_TIME => self.press.hold_duration = parse_secs(key, value)?,
            KEY_SHUFFLE => self.press.shuffle = parse_flag(key, value)?,
            _ => return Err(unknown_key(key)),
        }
        self.press.commit();
        Ok(())
    }
}

/// Lowercased, trimmed hotkey name; blank falls back to `f8`.
pub fn normalize_hotkey(name: &str) -> String {
    let name = name.trim().to_lowercase();
    if name.is_empty() {
        DEFAULT_HOTKEY.to_string()
    } else {
        name
    }
}

fn unknown_key(key: &str) -> KapError {
    KapError::config_validation(format!(
        "unknown setting '{}', expected one of: {}",
        key,
        ALL_KEYS.join(", ")
    ))
}

fn parse_secs(key: &str, value: &str) -> Result<Duration> {
    let secs: f64 = value.trim().parse().map_err(|_| {
        KapError::config_validation(format!("{} must be a number of seconds, got '{}'", key, value))
    })?;
    let duration = secs_to_duration(secs);
    if duration.is_zero() {
        return Err(KapError::config_validation(format!(
            "{} must be positive, got '{}'",
            key, value
        )));
    }
    Ok(duration)
}

fn parse_flag(key: &str, value: &str) -> Result<bool> {
    match value.trim().to_lowercase().as_str() {
        "true" => Ok(true),
        "false" => Ok(false),
        _ => Err(KapError::config_validation(format!(
            "{} must be true or false, got '{}'",
            key, value
        ))),
    }
}
