//! Global start/stop hotkey.

use crate::error::{KapError, Result};
use crate::settings::normalize_hotkey;
use global_hotkey::hotkey::{Code, HotKey, Modifiers};
use global_hotkey::{GlobalHotKeyEvent, GlobalHotKeyManager, HotKeyState};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// The configured toggle hotkey, by name (`"f8"`, `"ctrl+alt+p"`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HotkeyBinding {
    name: String,
}

impl HotkeyBinding {
    pub fn new(name: &str) -> Self {
        Self {
            name: normalize_hotkey(name),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn to_hotkey(&self) -> Result<HotKey> {
        parse_hotkey(&self.name)
    }
}

impl Default for HotkeyBinding {
    fn default() -> Self {
        Self::new("")
    }
}

pub struct HotkeyManager {
    manager: GlobalHotKeyManager,
    registered: Option<HotKey>,
    listening: Arc<AtomicBool>,
    listener: Option<JoinHandle<()>>,
}

impl HotkeyManager {
    pub fn new() -> Result<Self> {
        let manager = GlobalHotKeyManager::new()
            .map_err(|e| KapError::hotkey(format!("failed to create GlobalHotKeyManager: {}", e)))?;

        Ok(Self {
            manager,
            registered: None,
            listening: Arc::new(AtomicBool::new(false)),
            listener: None,
        })
    }

    /// Registers `binding`, replacing any previously registered hotkey.
    pub fn register(&mut self, binding: &HotkeyBinding) -> Result<()> {
        let hotkey = binding.to_hotkey()?;

        if let Some(previous) = self.registered.take() {
            if let Err(e) = self.manager.unregister(previous) {
                warn!(error = %e, "failed to unregister previous hotkey");
            }
        }

        self.manager.register(hotkey).map_err(|e| {
            KapError::hotkey(format!("failed to register hotkey '{}': {}", binding.name(), e))
        })?;
        self.registered = Some(hotkey);

        info!(hotkey = binding.name(), "global hotkey registered");
        Ok(())
    }

    /// Polls hotkey events on a blocking task and calls `on_trigger` each
    /// time the registered hotkey goes down. Runs until [`shutdown`].
    ///
    /// [`shutdown`]: Self::shutdown
    pub fn start_listener<F>(&mut self, on_trigger: F) -> Result<()>
    where
        F: Fn() + Send + 'static,
    {
        let hotkey_id = self
            .registered
            .map(|hotkey| hotkey.id())
            .ok_or_else(|| KapError::hotkey("no hotkey registered"))?;

        if self.listener.is_some() {
            return Err(KapError::hotkey("hotkey listener already running"));
        }

        let listening = Arc::clone(&self.listening);
        listening.store(true, Ordering::Relaxed);
        let receiver = GlobalHotKeyEvent::receiver();

        self.listener = Some(tokio::task::spawn_blocking(move || {
            while listening.load(Ordering::Relaxed) {
                // Timeout keeps the shutdown flag responsive.
                let Ok(event) = receiver.recv_timeout(Duration::from_millis(100)) else {
                    continue;
                };
                if event.id == hotkey_id && event.state == HotKeyState::Pressed {
                    debug!("toggle hotkey pressed");
                    on_trigger();
                }
            }
            debug!("hotkey listener stopped");
        }));
        Ok(())
    }

    /// Stops the listener and unregisters the hotkey. The polling task
    /// notices within one poll interval.
    pub fn shutdown(&mut self) {
        self.listening.store(false, Ordering::Relaxed);
        self.listener = None;
        if let Some(hotkey) = self.registered.take() {
            if let Err(e) = self.manager.unregister(hotkey) {
                warn!(error = %e, "failed to unregister hotkey");
            }
        }
    }
}

/// Parses `"f8"`, `"ctrl+shift+p"` and similar into a global hotkey.
pub fn parse_hotkey(hotkey_str: &str) -> Result<HotKey> {
    let binding = hotkey_str.to_lowercase();
    let parts: Vec<&str> = binding
        .split('+')
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .collect();

    if parts.is_empty() {
        return Err(KapError::hotkey("empty hotkey string"));
    }

    let mut modifiers = Modifiers::empty();
    let mut key_code = None;

    for part in &parts {
        match *part {
            "ctrl" | "control" => modifiers |= Modifiers::CONTROL,
            "alt" => modifiers |= Modifiers::ALT,
            "shift" => modifiers |= Modifiers::SHIFT,
            "meta" | "cmd" | "super" => modifiers |= Modifiers::SUPER,
            key => {
                if key_code.is_some() {
                    return Err(KapError::hotkey(format!(
                        "multiple keys specified in hotkey: {}",
                        hotkey_str
                    )));
                }
                key_code = Some(parse_key_code(key)?);
            }
        }
    }

    let code = key_code.ok_or_else(|| {
        KapError::hotkey(format!("no key specified in hotkey: {}", hotkey_str))
    })?;

    let modifiers = if modifiers.is_empty() {
        None
    } else {
        Some(modifiers)
    };
    Ok(HotKey::new(modifiers, code))
}

/// Maps a lowercase key name to its W3C code, e.g. `"a"` to `KeyA`.
fn parse_key_code(key: &str) -> Result<Code> {
    let unsupported = || KapError::hotkey(format!("unsupported key: {}", key));

    let mut chars = key.chars();
    let w3c_name = match (chars.next(), chars.next()) {
        (Some(c), None) if c.is_ascii_lowercase() => format!("Key{}", c.to_ascii_uppercase()),
        (Some(c), None) if c.is_ascii_digit() => format!("Digit{}", c),
        (Some('f'), Some(_)) if key[1..].parse::<u8>().is_ok_and(|n| (1..=24).contains(&n)) => {
            key.to_uppercase()
        }
        _ => match key {
            "space" => "Space",
            "enter" | "return" => "Enter",
            "tab" => "Tab",
            "escape" | "esc" => "Escape",
            "backspace" => "Backspace",
            "delete" => "Delete",
            "insert" => "Insert",
            "home" => "Home",
            "end" => "End",
            "pageup" => "PageUp",
            "pagedown" => "PageDown",
            "pause" => "Pause",
            "scrolllock" => "ScrollLock",
            "up" | "arrowup" => "ArrowUp",
            "down" | "arrowdown" => "ArrowDown",
            "left" | "arrowleft" => "ArrowLeft",
            "right" | "arrowright" => "ArrowRight",
            _ => return Err(unsupported()),
        }
        .to_string(),
    };

    w3c_name.parse::<Code>().map_err(|_| unsupported())
}
