//! # Key Auto Presser
//!
//! Presses a sequence of keys over and over at configurable intervals,
//! toggled on and off by a global hotkey.
//!
//! ## Features
//!
//! - Key sequences as characters (`wasd`) or key names (`space,f1,w`)
//! - Fixed or randomized delay between keys
//! - Configurable hold time for each key
//! - Optional per-pass shuffling of the sequence
//! - Global start/stop hotkey
//! - Settings persisted as a flat JSON key/value file
//!
//! ## Example
//!
//! ```no_run
//! use key_auto_presser::{KeySender, PressConfig, PressSequenceEngine, SharedConfig};
//! use std::sync::Arc;
//!
//! # async fn run() -> key_auto_presser::Result<()> {
//! let config = SharedConfig::new(PressConfig::default());
//! let engine = PressSequenceEngine::new(Arc::new(KeySender::new()?), config)?;
//!
//! let mut state = engine.watch_state();
//! engine.start();
//! assert_eq!(state.recv().await, Some(true));
//!
//! engine.shutdown().await;
//! # Ok(())
//! # }
//! ```
//!
//! ## Settings
//!
//! ```json
//! {
//!   "sequence": "wasd",
//!   "interval": "0.5",
//!   "hotkey": "f8",
//!   "random_interval": "false",
//!   "hold_time": "0.05"
//! }
//! ```

pub mod config;
pub mod engine;
pub mod error;
pub mod global_hotkey;
pub mod key_sender;
pub mod settings;

pub use config::{PressConfig, SharedConfig};
pub use engine::{PressSequenceEngine, StateObserver};
pub use error::{KapError, Result};
pub use global_hotkey::{HotkeyBinding, HotkeyManager};
pub use key_sender::{KeyInjector, KeySender};
pub use settings::{AppSettings, JsonSettingsStore, MemorySettingsStore, SettingsStore, Theme};
