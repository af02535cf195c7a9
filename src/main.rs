use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use colored::Colorize;
use key_auto_presser::config::{format_sequence, parse_duration, parse_sequence};
use key_auto_presser::key_sender::validate_sequence;
use key_auto_presser::settings::{ALL_KEYS, KEY_HOTKEY, KEY_SEQUENCE};
use key_auto_presser::{
    AppSettings, HotkeyBinding, HotkeyManager, JsonSettingsStore, KeySender, PressSequenceEngine,
    SharedConfig, StateObserver,
};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "kap",
    version,
    about = "Repeats a key sequence at configurable intervals, toggled by a global hotkey"
)]
struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Settings file to use instead of the platform default
    #[arg(long, global = true, value_name = "PATH")]
    settings: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the auto-presser (default)
    Run(RunArgs),
    /// Inspect or edit persisted settings
    Settings {
        #[command(subcommand)]
        action: SettingsAction,
    },
}

#[derive(Subcommand)]
enum SettingsAction {
    /// Print every setting
    Show,
    /// Print the settings file location
    Path,
    /// Restore defaults
    Reset,
    /// Change one setting, e.g. `kap settings set interval 0.25`
    Set { key: String, value: String },
}

#[derive(Args, Default)]
struct RunArgs {
    /// Keys to press, e.g. "wasd" or "space,f1,w". Any comma switches to
    /// key-name mode; write a comma key as "comma"
    #[arg(long)]
    sequence: Option<String>,

    /// Delay after each key, e.g. "500ms" or "1s"
    #[arg(long, value_parser = duration_arg)]
    interval: Option<Duration>,

    /// Draw each delay from the min/max range
    #[arg(long, overrides_with = "fixed_interval")]
    random_interval: bool,

    /// Use the fixed interval even if settings enable randomization
    #[arg(long, overrides_with = "random_interval")]
    fixed_interval: bool,

    #[arg(long, value_parser = duration_arg)]
    interval_min: Option<Duration>,

    #[arg(long, value_parser = duration_arg)]
    interval_max: Option<Duration>,

    /// How long each key is held down
    #[arg(long, value_parser = duration_arg)]
    hold: Option<Duration>,

    /// Shuffle the sequence on every pass
    #[arg(long, overrides_with = "no_shuffle")]
    shuffle: bool,

    /// Keep the sequence order even if settings enable shuffling
    #[arg(long, overrides_with = "shuffle")]
    no_shuffle: bool,

    /// Start/stop hotkey, e.g. "f8" or "ctrl+alt+p"
    #[arg(long)]
    hotkey: Option<String>,

    /// Start pressing immediately
    #[arg(long)]
    start: bool,

    /// Persist the effective settings on exit
    #[arg(long)]
    save: bool,
}

impl RunArgs {
    fn apply(&self, settings: &mut AppSettings) -> Result<()> {
        let press = &mut settings.press;
        if let Some(sequence) = &self.sequence {
            press.sequence = parse_sequence(sequence);
        }
        if let Some(interval) = self.interval {
            press.base_interval = interval;
        }
        if self.random_interval {
            press.randomized = true;
        } else if self.fixed_interval {
            press.randomized = false;
        }
        if let Some(min) = self.interval_min {
            press.interval_min = min;
        }
        if let Some(max) = self.interval_max {
            press.interval_max = max;
        }
        if let Some(hold) = self.hold {
            press.hold_duration = hold;
        }
        if self.shuffle {
            press.shuffle = true;
        } else if self.no_shuffle {
            press.shuffle = false;
        }
        press.commit();
        press.validate()?;
        validate_sequence(&press.sequence)?;

        if let Some(hotkey) = &self.hotkey {
            settings.set(KEY_HOTKEY, hotkey)?;
        }
        Ok(())
    }
}

fn duration_arg(value: &str) -> std::result::Result<Duration, String> {
    parse_duration(value).map_err(|e| e.to_string())
}

/// Prints engine state flips to the terminal.
struct ConsoleObserver;

impl StateObserver for ConsoleObserver {
    fn on_state_changed(&self, running: bool) {
        if running {
            println!("{}", "▶️  Running".green().bold());
        } else {
            println!("{}", "⏹️  Stopped".yellow().bold());
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let mut store = match &cli.settings {
        Some(path) => JsonSettingsStore::open(path)?,
        None => JsonSettingsStore::open_default()?,
    };

    match cli.command {
        Some(Command::Settings { action }) => settings_command(action, &mut store),
        Some(Command::Run(args)) => run(args, &mut store).await,
        None => run(RunArgs::default(), &mut store).await,
    }
}

fn init_tracing(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("key_auto_presser={level},kap={level}")));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

async fn run(args: RunArgs, store: &mut JsonSettingsStore) -> Result<()> {
    let mut settings = AppSettings::load(&*store);
    args.apply(&mut settings)?;

    let config = SharedConfig::new(settings.press.clone());
    let injector = Arc::new(KeySender::new().context("failed to initialise key injection")?);
    let engine = PressSequenceEngine::new(injector, config.clone())?;
    engine.subscribe(Arc::new(ConsoleObserver));

    let binding = HotkeyBinding::new(&settings.hotkey);
    let mut hotkeys = match start_hotkey(&binding, &engine) {
        Ok(manager) => Some(manager),
        Err(e) => {
            warn!(error = %e, "continuing without a global hotkey");
            None
        }
    };

    print_banner(&settings, hotkeys.is_some());
    if args.start {
        request_toggle(&engine);
    }

    let mut commands = spawn_stdin_reader();
    let mut stdin_open = true;
    loop {
        tokio::select! {
            result = tokio::signal::ctrl_c() => {
                if let Err(e) = result {
                    warn!(error = %e, "failed to listen for Ctrl+C");
                }
                break;
            }
            line = commands.recv(), if stdin_open => match line {
                Some(line) => match line.trim() {
                    "q" | "quit" | "exit" => break,
                    "s" | "status" => print_status(&engine),
                    _ => request_toggle(&engine),
                },
                None => stdin_open = false,
            },
        }
    }

    info!("shutting down");
    engine.shutdown().await;
    if let Some(manager) = hotkeys.as_mut() {
        manager.shutdown();
    }

    if args.save {
        settings.press = config.snapshot();
        settings.save(&mut *store)?;
        println!("💾 Settings saved to {}", store.path().display());
    }
    Ok(())
}

fn start_hotkey(binding: &HotkeyBinding, engine: &PressSequenceEngine) -> Result<HotkeyManager> {
    let mut manager = HotkeyManager::new()?;
    manager.register(binding)?;
    let engine = engine.clone();
    manager.start_listener(move || request_toggle(&engine))?;
    Ok(manager)
}

/// Toggles the engine, refusing to start with nothing to press.
fn request_toggle(engine: &PressSequenceEngine) {
    if !engine.is_running() && engine.config().read(|c| c.sequence.is_empty()) {
        println!(
            "{}",
            "⚠️  No key sequence configured. Set one with `kap settings set sequence wasd`."
                .red()
        );
        return;
    }
    engine.toggle();
}

/// Forwards stdin lines from a plain thread so a pending read never holds
/// up runtime shutdown.
fn spawn_stdin_reader() -> mpsc::UnboundedReceiver<String> {
    let (tx, rx) = mpsc::unbounded_channel();
    std::thread::spawn(move || {
        for line in std::io::stdin().lines() {
            let Ok(line) = line else { break };
            if tx.send(line).is_err() {
                break;
            }
        }
    });
    rx
}

fn print_banner(settings: &AppSettings, hotkey_active: bool) {
    let press = &settings.press;
    println!("{}", "Key Auto Presser".cyan().bold());
    println!("  sequence : {}", format_sequence(&press.sequence));
    if press.randomized {
        println!(
            "  interval : {:?} .. {:?} (random)",
            press.interval_min, press.interval_max
        );
    } else {
        println!("  interval : {:?}", press.base_interval);
    }
    println!("  hold     : {:?}", press.hold_duration);
    println!("  shuffle  : {}", press.shuffle);
    if hotkey_active {
        println!("🔥 Press '{}' to start/stop", settings.hotkey.bold());
    }
    println!("Enter toggles, 's' shows status, 'q' or Ctrl+C quits.");
}

fn print_status(engine: &PressSequenceEngine) {
    let state = if engine.is_running() {
        "running".green()
    } else {
        "stopped".yellow()
    };
    println!("Status: {}", state);
}

fn settings_command(action: SettingsAction, store: &mut JsonSettingsStore) -> Result<()> {
    match action {
        SettingsAction::Show => {
            let settings = AppSettings::load(&*store);
            println!("{}", store.path().display().to_string().dimmed());
            for key in ALL_KEYS {
                println!("{:>16} = {}", key.bold(), settings.get(key)?);
            }
        }
        SettingsAction::Path => println!("{}", store.path().display()),
        SettingsAction::Reset => {
            AppSettings::default().save(&mut *store)?;
            println!("Settings reset to defaults");
        }
        SettingsAction::Set { key, value } => {
            let mut settings = AppSettings::load(&*store);
            settings.set(&key, &value)?;
            if key == KEY_SEQUENCE {
                validate_sequence(&settings.press.sequence)?;
            }
            settings.save(&mut *store)?;
            println!("{} = {}", key.bold(), settings.get(&key)?);
        }
    }
    Ok(())
}
