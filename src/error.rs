//! Custom error types for key-auto-presser.
//!
//! This module provides structured error types using `thiserror` for better
//! error handling and more informative error messages.

use std::io;
use thiserror::Error;

/// Main error type for key-auto-presser operations.
#[derive(Error, Debug)]
pub enum KapError {
    /// The specified key is invalid or unsupported.
    #[error("invalid key '{key}': {reason}")]
    InvalidKey { key: String, reason: String },

    /// Configuration or settings validation error.
    #[error("configuration error: {0}")]
    ConfigValidation(String),

    /// Error reading or parsing the settings file.
    #[error("failed to load settings from '{path}': {reason}")]
    SettingsLoad { path: String, reason: String },

    /// Error writing the settings file.
    #[error("failed to save settings to '{path}': {reason}")]
    SettingsSave { path: String, reason: String },

    /// Error parsing duration string.
    #[error("invalid duration '{value}': {reason}")]
    InvalidDuration { value: String, reason: String },

    /// Error registering or handling hotkey.
    #[error("hotkey error: {0}")]
    Hotkey(String),

    /// A single press or release could not be injected.
    #[error("failed to inject key '{key}': {reason}")]
    KeyInjection { key: String, reason: String },

    /// No async runtime available to drive the press loop.
    #[error("runtime error: {0}")]
    Runtime(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type alias for key-auto-presser operations.
pub type Result<T> = std::result::Result<T, KapError>;

impl KapError {
    /// Create a new InvalidKey error.
    pub fn invalid_key(key: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidKey {
            key: key.into(),
            reason: reason.into(),
        }
    }

    /// Create a new ConfigValidation error.
    pub fn config_validation(message: impl Into<String>) -> Self {
        Self::ConfigValidation(message.into())
    }

    /// Create a new SettingsLoad error.
    pub fn settings_load(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::SettingsLoad {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Create a new SettingsSave error.
    pub fn settings_save(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::SettingsSave {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Create a new InvalidDuration error.
    pub fn invalid_duration(value: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidDuration {
            value: value.into(),
            reason: reason.into(),
        }
    }

    /// Create a new Hotkey error.
    pub fn hotkey(message: impl Into<String>) -> Self {
        Self::Hotkey(message.into())
    }

    /// Create a new KeyInjection error.
    pub fn key_injection(key: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::KeyInjection {
            key: key.into(),
            reason: reason.into(),
        }
    }

    /// Create a new Runtime error.
    pub fn runtime(message: impl Into<String>) -> Self {
        Self::Runtime(message.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = KapError::key_injection("w", "no display");
        assert_eq!(err.to_string(), "failed to inject key 'w': no display");

        let err = KapError::invalid_key("xyz", "unknown key");
        assert_eq!(err.to_string(), "invalid key 'xyz': unknown key");

        let err = KapError::config_validation("hold_time must be positive");
        assert_eq!(
            err.to_string(),
            "configuration error: hold_time must be positive"
        );

        let err = KapError::settings_save("/tmp/settings.json", "read-only");
        assert_eq!(
            err.to_string(),
            "failed to save settings to '/tmp/settings.json': read-only"
        );
    }

    #[test]
    fn test_error_from_io() {
        let io_err = io::Error::new(io::ErrorKind::NotFound, "file not found");
        let kap_err: KapError = io_err.into();
        assert!(matches!(kap_err, KapError::Io(_)));
    }
}
