// Capture sessions under concurrent traffic, bus errors and backpressure
use can_search_core::{CaptureConfig, CaptureSession, Frame, MemorySource, NoopObserver};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::io;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

fn fast_config() -> CaptureConfig {
    CaptureConfig::new()
        .with_poll_timeout(Duration::from_millis(5))
        .with_consumer_poll(Duration::from_millis(5))
        .with_error_log_interval(100)
}

fn traffic(n: u32) -> Vec<Frame> {
    (0..n)
        .map(|i| Frame::new(i % 0x800, (i as u16).to_be_bytes().to_vec()).unwrap())
        .collect()
}

fn wait_for(session: &CaptureSession, count: usize) {
    let deadline = Instant::now() + Duration::from_secs(10);
    while session.frames_so_far() < count && Instant::now() < deadline {
        thread::sleep(Duration::from_millis(2));
    }
}

#[test]
fn capture_is_ordered_and_lossless_under_jitter() {
    let _ = env_logger::builder().is_test(true).try_init();

    let source = Arc::new(MemorySource::new("vcan0"));
    let expected = traffic(500);

    let session = CaptureSession::start("jitter", source.clone(), &fast_config(), Arc::new(NoopObserver))
        .unwrap();

    let feeder = {
        let source = Arc::clone(&source);
        let frames = expected.clone();
        thread::spawn(move || {
            let mut rng = StdRng::seed_from_u64(7);
            for frame in frames {
                if rng.gen_bool(0.1) {
                    source.inject_error(io::ErrorKind::Other);
                }
                if rng.gen_bool(0.05) {
                    thread::sleep(Duration::from_millis(rng.gen_range(1..8)));
                }
                source.inject(frame);
            }
        })
    };
    feeder.join().unwrap();

    wait_for(&session, expected.len());
    let capture = session.stop().unwrap();

    assert_eq!(capture.frames, expected);
    assert_eq!(capture.stats.received, expected.len() as u64);
    assert!(capture.stats.errors > 0);
    assert_eq!(capture.stats.dropped, 0);
}

#[test]
fn slow_consumer_applies_backpressure() {
    let source = Arc::new(MemorySource::new("vcan0"));
    let expected = traffic(100);
    for frame in &expected {
        source.inject(frame.clone());
    }

    let slow = |_: &Frame| thread::sleep(Duration::from_micros(300));
    let config = fast_config().with_channel_capacity(2);
    let session = CaptureSession::start("slow", source.clone(), &config, Arc::new(slow)).unwrap();

    wait_for(&session, expected.len());
    let capture = session.stop().unwrap();

    assert_eq!(capture.frames, expected);
    assert_eq!(capture.stats.dropped, 0);
}

#[test]
fn early_stop_returns_an_ordered_prefix() {
    let source = Arc::new(MemorySource::new("vcan0"));
    let expected = traffic(2000);
    for frame in &expected {
        source.inject(frame.clone());
    }

    let config = fast_config().with_channel_capacity(8);
    let session = CaptureSession::start("early", source.clone(), &config, Arc::new(NoopObserver)).unwrap();
    thread::sleep(Duration::from_millis(5));
    let capture = session.stop().unwrap();

    let captured = capture.len();
    assert_eq!(capture.frames, expected[..captured].to_vec());
    // Every received frame is either captured or reported as dropped
    assert_eq!(capture.stats.received, captured as u64 + capture.stats.dropped);
}

#[test]
fn sessions_can_run_back_to_back_on_one_source() {
    let source = Arc::new(MemorySource::new("vcan0"));

    for round in 0..3u32 {
        let session =
            CaptureSession::start(&format!("round-{}", round), source.clone(), &fast_config(), Arc::new(NoopObserver))
                .unwrap();
        source.inject(Frame::new(round, vec![]).unwrap());
        wait_for(&session, 1);
        let capture = session.stop().unwrap();
        assert_eq!(capture.frames, vec![Frame::new(round, vec![]).unwrap()]);
    }
}
