use key_auto_presser::config::parse_sequence;
use key_auto_presser::{
    KapError, KeyInjector, PressConfig, PressSequenceEngine, Result, SharedConfig,
};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::time::Instant;

#[derive(Debug, Clone, PartialEq)]
enum KeyEvent {
    Press(String),
    Release(String),
}

/// Records every injection with its (virtual) timestamp; presses of the
/// keys in `failing` return an error.
#[derive(Default)]
struct RecordingInjector {
    events: Mutex<Vec<(Instant, KeyEvent)>>,
    failing: Vec<String>,
}

impl RecordingInjector {
    fn failing_on(keys: &[&str]) -> Self {
        Self {
            failing: keys.iter().map(|k| k.to_string()).collect(),
            ..Self::default()
        }
    }

    fn events(&self) -> Vec<KeyEvent> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .map(|(_, event)| event.clone())
            .collect()
    }

    fn presses(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                KeyEvent::Press(key) => Some(key),
                KeyEvent::Release(_) => None,
            })
            .collect()
    }

    fn press_times(&self) -> Vec<Instant> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter(|(_, event)| matches!(event, KeyEvent::Press(_)))
            .map(|(at, _)| *at)
            .collect()
    }
}

impl KeyInjector for RecordingInjector {
    fn press(&self, key: &str) -> Result<()> {
        if self.failing.iter().any(|k| k == key) {
            return Err(KapError::key_injection(key, "simulated failure"));
        }
        self.events
            .lock()
            .unwrap()
            .push((Instant::now(), KeyEvent::Press(key.to_string())));
        Ok(())
    }

    fn release(&self, key: &str) -> Result<()> {
        self.events
            .lock()
            .unwrap()
            .push((Instant::now(), KeyEvent::Release(key.to_string())));
        Ok(())
    }
}

fn config(sequence: &str) -> PressConfig {
    PressConfig {
        sequence: parse_sequence(sequence),
        base_interval: Duration::from_millis(500),
        hold_duration: Duration::from_millis(50),
        ..PressConfig::default()
    }
}

fn engine(injector: &Arc<RecordingInjector>, config: PressConfig) -> PressSequenceEngine {
    let injector: Arc<dyn KeyInjector> = injector.clone();
    PressSequenceEngine::new(injector, SharedConfig::new(config))
        .unwrap()
        .with_rng(StdRng::seed_from_u64(1234))
}

fn drain(rx: &mut UnboundedReceiver<bool>) -> Vec<bool> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

/// Every press is followed by a release of the same key before the next
/// press.
fn assert_balanced(events: &[KeyEvent]) {
    let mut held: Option<&str> = None;
    for event in events {
        match event {
            KeyEvent::Press(key) => {
                assert!(held.is_none(), "pressed {} while {:?} held", key, held);
                held = Some(key);
            }
            KeyEvent::Release(key) => {
                assert_eq!(held, Some(key.as_str()));
                held = None;
            }
        }
    }
    assert!(held.is_none(), "{:?} left pressed", held);
}

#[tokio::test(start_paused = true)]
async fn test_start_then_stop_notifies_once_each() {
    let injector = Arc::new(RecordingInjector::default());
    let engine = engine(&injector, config("wasd"));
    let mut rx = engine.watch_state();

    engine.start();
    engine.stop();
    engine.shutdown().await;

    assert_eq!(drain(&mut rx), vec![true, false]);
    assert!(!engine.is_running());
}

#[tokio::test(start_paused = true)]
async fn test_double_start_runs_one_loop() {
    let injector = Arc::new(RecordingInjector::default());
    let engine = engine(&injector, config("wasd"));
    let mut rx = engine.watch_state();

    engine.start();
    engine.start();
    tokio::time::sleep(Duration::from_millis(2_000)).await;
    engine.shutdown().await;

    assert_eq!(drain(&mut rx), vec![true, false]);
    // Presses at 0, 550, 1100 and 1650 ms; a second loop would double them.
    assert_eq!(injector.presses().len(), 4);
}

#[tokio::test(start_paused = true)]
async fn test_toggle_alternates_state() {
    let injector = Arc::new(RecordingInjector::default());
    let engine = engine(&injector, config("wasd"));
    let mut rx = engine.watch_state();

    engine.toggle();
    assert!(engine.is_running());
    engine.toggle();
    assert!(!engine.is_running());
    engine.shutdown().await;

    assert_eq!(drain(&mut rx), vec![true, false]);
}

#[tokio::test(start_paused = true)]
async fn test_presses_follow_sequence_order() {
    let injector = Arc::new(RecordingInjector::default());
    let engine = engine(&injector, config("wasd"));

    engine.start();
    tokio::time::sleep(Duration::from_millis(2_000)).await;
    engine.shutdown().await;

    assert_eq!(injector.presses(), vec!["w", "a", "s", "d"]);
    assert_balanced(&injector.events());
}

#[tokio::test(start_paused = true)]
async fn test_sequence_repeats_across_passes() {
    let injector = Arc::new(RecordingInjector::default());
    let engine = engine(&injector, config("ab"));

    engine.start();
    tokio::time::sleep(Duration::from_millis(2_000)).await;
    engine.shutdown().await;

    assert_eq!(injector.presses(), vec!["a", "b", "a", "b"]);
}

#[tokio::test(start_paused = true)]
async fn test_shuffle_permutes_each_pass() {
    let injector = Arc::new(RecordingInjector::default());
    let engine = engine(
        &injector,
        PressConfig {
            shuffle: true,
            ..config("wasd")
        },
    );

    engine.start();
    // Two full passes: 8 presses at 550 ms spacing.
    tokio::time::sleep(Duration::from_millis(4_000)).await;
    engine.shutdown().await;

    let presses = injector.presses();
    assert_eq!(presses.len(), 8);
    for pass in presses.chunks(4) {
        let mut sorted = pass.to_vec();
        sorted.sort();
        assert_eq!(sorted, vec!["a", "d", "s", "w"]);
    }
    assert_balanced(&injector.events());
}

#[tokio::test(start_paused = true)]
async fn test_random_delays_within_range() {
    let injector = Arc::new(RecordingInjector::default());
    let hold = Duration::from_millis(50);
    let engine = engine(
        &injector,
        PressConfig {
            randomized: true,
            interval_min: Duration::from_millis(100),
            interval_max: Duration::from_millis(200),
            hold_duration: hold,
            ..config("wasd")
        },
    );

    engine.start();
    tokio::time::sleep(Duration::from_secs(30)).await;
    engine.shutdown().await;

    let times = injector.press_times();
    assert!(times.len() > 100);
    for pair in times.windows(2) {
        let delay = pair[1] - pair[0] - hold;
        assert!(delay >= Duration::from_millis(100), "{:?}", delay);
        // Allow for the paused clock's millisecond timer granularity.
        assert!(delay <= Duration::from_millis(201), "{:?}", delay);
    }
}

#[tokio::test(start_paused = true)]
async fn test_empty_sequence_start_is_silent() {
    let injector = Arc::new(RecordingInjector::default());
    let engine = engine(&injector, config(""));
    let mut rx = engine.watch_state();

    engine.start();
    tokio::task::yield_now().await;

    assert!(!engine.is_running());
    assert!(drain(&mut rx).is_empty());
    assert!(injector.events().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_injection_failure_does_not_stop_pass() {
    let injector = Arc::new(RecordingInjector::failing_on(&["x"]));
    let engine = engine(&injector, config("wxd"));

    engine.start();
    tokio::time::sleep(Duration::from_millis(1_200)).await;
    engine.shutdown().await;

    let presses = injector.presses();
    assert_eq!(presses, vec!["w", "d"]);
    assert_balanced(&injector.events());
}

#[tokio::test(start_paused = true)]
async fn test_stop_mid_hold_releases_key() {
    let injector = Arc::new(RecordingInjector::default());
    let engine = engine(
        &injector,
        PressConfig {
            hold_duration: Duration::from_secs(1),
            ..config("wasd")
        },
    );

    engine.start();
    tokio::time::sleep(Duration::from_millis(100)).await;
    engine.stop();
    assert!(!engine.is_running());
    engine.shutdown().await;

    assert_eq!(
        injector.events(),
        vec![
            KeyEvent::Press("w".to_string()),
            KeyEvent::Release("w".to_string())
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn test_restart_during_hold_waits_for_release() {
    let injector = Arc::new(RecordingInjector::default());
    let engine = engine(
        &injector,
        PressConfig {
            hold_duration: Duration::from_secs(1),
            ..config("w")
        },
    );
    let mut rx = engine.watch_state();

    engine.start();
    tokio::time::sleep(Duration::from_millis(100)).await;
    engine.stop();
    engine.start();
    assert!(engine.is_running());
    tokio::time::sleep(Duration::from_millis(1_500)).await;
    engine.shutdown().await;

    let events = injector.events();
    assert_balanced(&events);
    assert_eq!(injector.presses(), vec!["w", "w"]);

    // Second press only after the first run released at 1 s.
    let times = injector.press_times();
    assert!(times[1] - times[0] >= Duration::from_secs(1));
    assert_eq!(drain(&mut rx), vec![true, false, true, false]);
}

#[tokio::test(start_paused = true)]
async fn test_restart_then_stop_during_hold_never_presses_twice() {
    let injector = Arc::new(RecordingInjector::default());
    let engine = engine(
        &injector,
        PressConfig {
            hold_duration: Duration::from_secs(1),
            ..config("w")
        },
    );

    engine.start();
    tokio::time::sleep(Duration::from_millis(100)).await;
    engine.stop();
    engine.start();
    tokio::time::sleep(Duration::from_millis(50)).await;
    engine.shutdown().await;

    assert_balanced(&injector.events());
    assert_eq!(injector.presses(), vec!["w"]);
}

#[tokio::test(start_paused = true)]
async fn test_emptied_sequence_stops_loop() {
    let injector = Arc::new(RecordingInjector::default());
    let engine = engine(&injector, config("w"));
    let mut rx = engine.watch_state();

    engine.start();
    assert_eq!(rx.recv().await, Some(true));

    engine.config().update(|c| c.sequence.clear());
    assert_eq!(rx.recv().await, Some(false));
    assert!(!engine.is_running());

    engine.stop();
    engine.shutdown().await;
    assert!(drain(&mut rx).is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_config_changes_apply_while_running() {
    let injector = Arc::new(RecordingInjector::default());
    let engine = engine(&injector, config("w"));

    engine.start();
    tokio::time::sleep(Duration::from_millis(10)).await;
    engine.config().update(|c| c.base_interval = Duration::from_millis(100));
    tokio::time::sleep(Duration::from_millis(1_000)).await;
    engine.shutdown().await;

    // First delay still 500 ms, then 150 ms per key.
    assert!(injector.presses().len() >= 4);
}
