//! Key injection.
//!
//! The engine only talks to the [`KeyInjector`] trait. [`KeySender`] is
//! the OS binding, built on `enigo`.

use crate::error::{KapError, Result};
use enigo::{Direction, Enigo, Key, Keyboard, Settings};
use std::sync::{Mutex, PoisonError};

/// Presses and releases keys on the OS input stream.
///
/// Both calls may fail; callers treat a failure as affecting that one key
/// only.
pub trait KeyInjector: Send + Sync {
    fn press(&self, key: &str) -> Result<()>;
    fn release(&self, key: &str) -> Result<()>;
}

/// Sends synthetic key events through `enigo`.
pub struct KeySender {
    enigo: Mutex<Enigo>,
}

impl KeySender {
    pub fn new() -> Result<Self> {
        let enigo = Enigo::new(&Settings::default())
            .map_err(|e| KapError::runtime(format!("cannot open input backend: {}", e)))?;
        Ok(Self {
            enigo: Mutex::new(enigo),
        })
    }

    fn send(&self, key: &str, direction: Direction) -> Result<()> {
        let code = parse_key(key)?;
        let mut enigo = self.enigo.lock().unwrap_or_else(PoisonError::into_inner);
        enigo
            .key(code, direction)
            .map_err(|e| KapError::key_injection(key, e.to_string()))
    }
}

impl KeyInjector for KeySender {
    fn press(&self, key: &str) -> Result<()> {
        self.send(key, Direction::Press)
    }

    fn release(&self, key: &str) -> Result<()> {
        self.send(key, Direction::Release)
    }
}

/// Checks that every key of a sequence can be injected.
pub fn validate_sequence(sequence: &[String]) -> Result<()> {
    for key in sequence {
        parse_key(key)?;
    }
    Ok(())
}

/// Maps a key identifier to an `enigo` key.
///
/// Single characters are sent as themselves (ASCII letters lowercased);
/// longer identifiers are key names such as `space` or `f5`.
pub fn parse_key(key: &str) -> Result<Key> {
    let mut chars = key.chars();
    if let (Some(c), None) = (chars.next(), chars.next()) {
        if c.is_whitespace() {
            return Ok(Key::Space);
        }
        return Ok(Key::Unicode(c.to_ascii_lowercase()));
    }

    let name = key.trim().to_lowercase();
    let code = match name.as_str() {
        // Function keys
        "f1" => Key::F1,
        "f2" => Key::F2,
        "f3" => Key::F3,
        "f4" => Key::F4,
        "f5" => Key::F5,
        "f6" => Key::F6,
        "f7" => Key::F7,
        "f8" => Key::F8,
        "f9" => Key::F9,
        "f10" => Key::F10,
        "f11" => Key::F11,
        "f12" => Key::F12,

        // Special keys
        "space" => Key::Space,
        "enter" | "return" => Key::Return,
        "tab" => Key::Tab,
        "escape" | "esc" => Key::Escape,
        "backspace" => Key::Backspace,
        "delete" | "del" => Key::Delete,
        "home" => Key::Home,
        "end" => Key::End,
        "pageup" => Key::PageUp,
        "pagedown" => Key::PageDown,
        "comma" => Key::Unicode(','),

        // Arrow keys
        "up" | "arrowup" => Key::UpArrow,
        "down" | "arrowdown" => Key::DownArrow,
        "left" | "arrowleft" => Key::LeftArrow,
        "right" | "arrowright" => Key::RightArrow,

        // Modifiers
        "shift" => Key::Shift,
        "ctrl" | "control" => Key::Control,
        "alt" => Key::Alt,
        "meta" | "cmd" | "super" => Key::Meta,

        "" => return Err(KapError::invalid_key(key, "empty key name")),
        _ => return Err(KapError::invalid_key(key, "unsupported key name")),
    };

    Ok(code)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_characters() {
        assert_eq!(parse_key("w").unwrap(), Key::Unicode('w'));
        assert_eq!(parse_key("W").unwrap(), Key::Unicode('w'));
        assert_eq!(parse_key("7").unwrap(), Key::Unicode('7'));
        assert_eq!(parse_key(" ").unwrap(), Key::Space);
    }

    #[test]
    fn test_named_keys() {
        assert_eq!(parse_key("space").unwrap(), Key::Space);
        assert_eq!(parse_key("Enter").unwrap(), Key::Return);
        assert_eq!(parse_key("f12").unwrap(), Key::F12);
        assert_eq!(parse_key("left").unwrap(), Key::LeftArrow);
        assert_eq!(parse_key("ctrl").unwrap(), Key::Control);
        assert_eq!(parse_key(",").unwrap(), Key::Unicode(','));
        assert_eq!(parse_key("comma").unwrap(), Key::Unicode(','));
    }

    #[test]
    fn test_invalid_keys() {
        assert!(matches!(
            parse_key("invalid_key_xyz"),
            Err(KapError::InvalidKey { .. })
        ));
        assert!(parse_key("").is_err());
    }

    #[test]
    fn test_validate_sequence() {
        let good = vec!["w".to_string(), "space".to_string()];
        assert!(validate_sequence(&good).is_ok());

        let bad = vec!["w".to_string(), "nokey".to_string()];
        assert!(validate_sequence(&bad).is_err());
    }
}
