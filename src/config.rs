//! Press timing configuration.
//!
//! [`PressConfig`] is the value object the engine reads on every cycle.
//! It is shared between the engine and whoever edits it through
//! [`SharedConfig`].

use crate::error::{KapError, Result};
use rand::Rng;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

/// Timing, order and keys of the auto-press loop.
#[derive(Debug, Clone, PartialEq)]
pub struct PressConfig {
    /// Keys pressed in order, one after another.
    pub sequence: Vec<String>,
    /// Delay after each key when `randomized` is off.
    pub base_interval: Duration,
    /// Draw each delay uniformly from `interval_min..=interval_max`.
    pub randomized: bool,
    pub interval_min: Duration,
    pub interval_max: Duration,
    /// How long each key stays down before it is released.
    pub hold_duration: Duration,
    /// Permute the sequence at the start of every pass.
    pub shuffle: bool,
}

impl Default for PressConfig {
    fn default() -> Self {
        Self {
            sequence: parse_sequence("wasd"),
            base_interval: Duration::from_millis(500),
            randomized: false,
            interval_min: Duration::from_millis(300),
            interval_max: Duration::from_millis(700),
            hold_duration: Duration::from_millis(50),
            shuffle: false,
        }
    }
}

impl PressConfig {
    /// Enforces `interval_min <= interval_max` by swapping an inverted range.
    ///
    /// Call this whenever a batch of edits is committed.
    pub fn commit(&mut self) {
        if self.interval_min > self.interval_max {
            std::mem::swap(&mut self.interval_min, &mut self.interval_max);
        }
    }

    /// Rejects zero durations. An empty sequence is allowed; the engine
    /// simply refuses to start with it.
    pub fn validate(&self) -> Result<()> {
        let durations = [
            ("interval", self.base_interval),
            ("interval_min", self.interval_min),
            ("interval_max", self.interval_max),
            ("hold_time", self.hold_duration),
        ];
        for (name, value) in durations {
            if value.is_zero() {
                return Err(KapError::config_validation(format!(
                    "{} must be positive",
                    name
                )));
            }
        }
        Ok(())
    }

    /// Delay to wait after a key has been released.
    pub fn next_delay<R: Rng + ?Sized>(&self, rng: &mut R) -> Duration {
        if !self.randomized {
            return self.base_interval;
        }
        let (low, high) = if self.interval_min <= self.interval_max {
            (self.interval_min, self.interval_max)
        } else {
            (self.interval_max, self.interval_min)
        };
        if low == high {
            return low;
        }
        let secs = rng.random_range(low.as_secs_f64()..=high.as_secs_f64());
        Duration::from_secs_f64(secs.max(0.0)).clamp(low, high)
    }
}

/// Handle to a [`PressConfig`] shared between the engine and its editors.
///
/// Reads see the latest committed values. Writers should keep their
/// critical sections short; the press loop takes the read lock at every
/// decision point.
#[derive(Debug, Clone, Default)]
pub struct SharedConfig {
    inner: Arc<RwLock<PressConfig>>,
}

impl SharedConfig {
    pub fn new(config: PressConfig) -> Self {
        Self {
            inner: Arc::new(RwLock::new(config)),
        }
    }

    /// Copy of the current configuration.
    pub fn snapshot(&self) -> PressConfig {
        self.read(PressConfig::clone)
    }

    /// Runs `f` against the current configuration under the read lock.
    pub fn read<T>(&self, f: impl FnOnce(&PressConfig) -> T) -> T {
        let guard = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        f(&guard)
    }

    /// Applies `f` and commits the result.
    pub fn update<T>(&self, f: impl FnOnce(&mut PressConfig) -> T) -> T {
        let mut guard = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        let out = f(&mut guard);
        guard.commit();
        out
    }

    /// Replaces the whole configuration.
    pub fn replace(&self, config: PressConfig) {
        self.update(|current| *current = config);
    }
}

/// Name of the `,` key in comma-separated sequence text.
pub const COMMA_KEY_NAME: &str = "comma";

/// Splits sequence text into key identifiers.
///
/// Text containing a comma is read as comma-separated key names
/// (`"space,f1,w"`); anything else is one key per character (`"wasd"`).
/// In name mode the comma key itself is written `comma`, and a lone named
/// key takes a trailing comma (`"space,"`). Blank text yields an empty
/// sequence.
pub fn parse_sequence(text: &str) -> Vec<String> {
    let text = text.trim();
    if text.is_empty() {
        return Vec::new();
    }

    if text.contains(',') {
        text.split(',')
            .map(|part| part.trim().to_lowercase())
            .filter(|part| !part.is_empty())
            .map(|part| {
                if part == COMMA_KEY_NAME {
                    ",".to_string()
                } else {
                    part
                }
            })
            .collect()
    } else {
        text.chars()
            .filter(|c| !c.is_whitespace())
            .map(|c| c.to_string())
            .collect()
    }
}

/// Inverse of [`parse_sequence`].
pub fn format_sequence(sequence: &[String]) -> String {
    if sequence.iter().all(|key| key.chars().count() == 1 && key != ",") {
        return sequence.concat();
    }

    let names: Vec<&str> = sequence
        .iter()
        .map(|key| if key == "," { COMMA_KEY_NAME } else { key.as_str() })
        .collect();
    let mut text = names.join(",");
    if names.len() == 1 {
        text.push(',');
    }
    text
}

/// Converts float seconds to a duration with microsecond precision.
///
/// Negative and non-finite input becomes zero.
pub fn secs_to_duration(secs: f64) -> Duration {
    if !secs.is_finite() || secs <= 0.0 {
        return Duration::ZERO;
    }
    Duration::from_micros((secs * 1_000_000.0).round() as u64)
}

/// Parses a human duration such as `"500ms"`, `"2s"`, `"1m"` or `"750"`
/// (bare numbers are milliseconds).
pub fn parse_duration(input: &str) -> Result<Duration> {
    let value = input.trim().to_lowercase();
    if value.is_empty() {
        return Err(KapError::invalid_duration(input, "empty value"));
    }

    let (number, unit) = match value.find(|c: char| !c.is_ascii_digit() && c != '.') {
        Some(idx) => value.split_at(idx),
        None => (value.as_str(), "ms"),
    };

    if number.is_empty() {
        return Err(KapError::invalid_duration(input, "missing number"));
    }

    let amount: f64 = number
        .parse()
        .map_err(|_| KapError::invalid_duration(input, "not a number"))?;

    let millis = match unit.trim() {
        "ms" => amount,
        "s" => amount * 1_000.0,
        "m" => amount * 60_000.0,
        other => {
            return Err(KapError::invalid_duration(
                input,
                format!("unknown unit '{}'", other),
            ))
        }
    };

    Ok(secs_to_duration(millis / 1_000.0))
}
