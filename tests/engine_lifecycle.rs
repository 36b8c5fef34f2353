use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{anyhow, Result};
use image::RgbImage;

use camwall::placeholder::placeholder_frame;
use camwall::{Engine, EngineConfig, Grabber, GrabberFactory, Source, Status, StopOutcome};

fn test_config() -> EngineConfig {
    let mut config = EngineConfig::default();
    config.poll_interval = Duration::from_millis(5);
    config.stop_timeout = Duration::from_secs(2);
    config.capture.width = 64;
    config.capture.height = 48;
    config
}

fn stub_sources(count: usize) -> Vec<Source> {
    (0..count)
        .map(|i| Source::new(i, format!("stub://camera-{}", i + 1)))
        .collect()
}

fn unreachable_sources(count: usize) -> Vec<Source> {
    (0..count)
        .map(|i| Source::new(i, format!("down://camera-{}", i + 1)))
        .collect()
}

fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let start = Instant::now();
    while start.elapsed() < timeout {
        if condition() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(2));
    }
    condition()
}

/// Grabber that succeeds for a fixed number of pulls, then fails forever.
struct ScriptedGrabber {
    remaining: u32,
}

impl Grabber for ScriptedGrabber {
    fn grab(&mut self) -> Result<RgbImage> {
        if self.remaining == 0 {
            return Err(anyhow!("stream lost"));
        }
        self.remaining -= 1;
        Ok(RgbImage::new(64, 48))
    }
}

/// Factory whose source is reachable exactly once, for a bounded number of
/// pulls. Reopen attempts after the first open fail.
struct FlakyFactory {
    ok_pulls: u32,
    opened: AtomicBool,
}

impl FlakyFactory {
    fn new(ok_pulls: u32) -> Self {
        Self {
            ok_pulls,
            opened: AtomicBool::new(false),
        }
    }
}

impl GrabberFactory for FlakyFactory {
    fn open(&self, _address: &str) -> Result<Box<dyn Grabber>> {
        if self.opened.swap(true, Ordering::SeqCst) {
            return Err(anyhow!("source gone"));
        }
        Ok(Box::new(ScriptedGrabber {
            remaining: self.ok_pulls,
        }))
    }
}

#[test]
fn started_stub_source_becomes_connected_with_a_frame() {
    let engine = Engine::new(stub_sources(2), &test_config());
    engine.start(0).unwrap();

    assert!(wait_until(Duration::from_secs(2), || {
        engine.status(0) == Status::Connected
    }));
    let frame = engine.frame(0).expect("frame after first iteration");
    assert_eq!((frame.width(), frame.height()), (64, 48));

    // The second source was never started.
    assert_eq!(engine.status(1), Status::Unknown);
    assert!(engine.frame(1).is_none());
    assert_eq!(engine.running_count(), 1);
}

#[test]
fn start_is_idempotent() {
    let engine = Engine::new(stub_sources(1), &test_config());
    engine.start(0).unwrap();
    engine.start(0).unwrap();
    assert_eq!(engine.running_count(), 1);

    // A single stop tears down the single loop.
    assert_eq!(engine.stop(0), StopOutcome::Clean);
    assert_eq!(engine.running_count(), 0);
}

#[test]
fn start_rejects_unknown_index() {
    let engine = Engine::new(stub_sources(1), &test_config());
    assert!(engine.start(5).is_err());
}

#[test]
fn unreachable_sources_degrade_to_labeled_placeholder() {
    let engine = Engine::new(unreachable_sources(4), &test_config());
    engine.start_all().unwrap();

    assert!(wait_until(Duration::from_secs(2), || {
        (0..4).all(|i| engine.status(i) == Status::Disconnected)
    }));

    for (i, source) in engine.sources().iter().enumerate() {
        let frame = engine.frame(i).expect("placeholder frame");
        let expected = placeholder_frame(&source.label());
        assert_eq!(frame.image.dimensions(), expected.dimensions());
        // Compare above the timestamp overlay: gradient, label, and caption
        // all live in the top 200 rows.
        let row_bytes = (expected.width() * 3) as usize;
        assert_eq!(
            &frame.image.as_raw()[..row_bytes * 200],
            &expected.as_raw()[..row_bytes * 200],
            "source {} frame does not match its placeholder",
            i
        );
    }

    engine.stop_all();
}

#[test]
fn stop_freezes_frame_and_status() {
    let engine = Engine::new(stub_sources(1), &test_config());
    engine.start(0).unwrap();
    assert!(wait_until(Duration::from_secs(2), || {
        engine.status(0) == Status::Connected
    }));

    assert_eq!(engine.stop(0), StopOutcome::Clean);
    let (frame_a, status_a) = engine.snapshot(0);
    let frame_a = frame_a.expect("frame survives stop");

    // No further writes may happen after a clean stop.
    std::thread::sleep(Duration::from_millis(50));
    let (frame_b, status_b) = engine.snapshot(0);
    let frame_b = frame_b.expect("frame survives stop");

    assert_eq!(status_a, status_b);
    assert_eq!(status_a, Status::Connected);
    assert_eq!(frame_a.captured_at, frame_b.captured_at);
    assert_eq!(frame_a.image.as_raw(), frame_b.image.as_raw());
}

#[test]
fn stop_all_over_sixteen_sources_reaches_zero_running() {
    let engine = Engine::new(stub_sources(16), &test_config());
    engine.start_all().unwrap();
    assert_eq!(engine.running_count(), 16);

    let outcomes = engine.stop_all();
    assert_eq!(outcomes.len(), 16);
    assert!(outcomes.iter().all(|(_, outcome)| outcome.is_clean()));
    assert_eq!(engine.running_count(), 0);
}

#[test]
fn mid_run_failure_flips_to_disconnected_placeholder() {
    let config = test_config();
    let sources = vec![Source::new(0, "flaky://camera-1")];
    let engine = Engine::with_factory(sources, &config, Arc::new(FlakyFactory::new(3)));

    engine.start(0).unwrap();
    assert!(wait_until(Duration::from_secs(2), || {
        engine.status(0) == Status::Connected
    }));
    assert!(wait_until(Duration::from_secs(2), || {
        engine.status(0) == Status::Disconnected
    }));

    // The placeholder replaces the last real frame on the same iteration
    // that classified the failure.
    let (frame, status) = engine.snapshot(0);
    assert_eq!(status, Status::Disconnected);
    let frame = frame.expect("placeholder frame");
    let expected = placeholder_frame("Camera 1");
    assert_eq!(frame.image.dimensions(), expected.dimensions());

    engine.stop_all();
}

#[test]
fn connected_frame_encodes_to_decodable_png() {
    let engine = Engine::new(stub_sources(1), &test_config());
    engine.start(0).unwrap();
    assert!(wait_until(Duration::from_secs(2), || {
        engine.status(0) == Status::Connected
    }));

    let bytes = engine.encoded_frame(0).unwrap().expect("encoded frame");
    assert!(!bytes.is_empty());
    let decoded = image::load_from_memory(&bytes).unwrap();
    assert_eq!((decoded.width(), decoded.height()), (64, 48));

    // A source with no frame yet encodes to absent, not an error.
    let idle = Engine::new(stub_sources(1), &test_config());
    assert!(idle.encoded_frame(0).unwrap().is_none());
}

#[test]
fn restart_yields_a_running_source() {
    let engine = Engine::new(stub_sources(1), &test_config());
    engine.start(0).unwrap();
    assert!(wait_until(Duration::from_secs(2), || {
        engine.status(0) == Status::Connected
    }));

    let outcome = engine.restart(0).unwrap();
    assert!(outcome.is_clean());
    assert!(engine.is_running(0));
    assert!(wait_until(Duration::from_secs(2), || {
        engine.status(0) == Status::Connected
    }));
}
