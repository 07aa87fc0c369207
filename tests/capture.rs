//! Outbound media integration tests
//!
//! Capture and video sampling into the outbound sink, without hardware

use std::sync::Arc;
use std::time::{Duration, Instant};

use live_call::MediaDevices;
use live_call::codec;
use live_call::media::{MediaFrame, MediaKind};
use live_call::session::{OutboundSink, VIDEO_QUEUE_CAPACITY};
use live_call::video::{FrameSampler, Surface, VideoFrame, VideoSource};
use live_call::voice::CapturePipeline;
use tokio_test::assert_ok;
use tracing_subscriber::layer::SubscriberExt;

mod common;

use common::{FakeDevices, FakeInput, FakeSession, Monitor, WarnCounter, eventually};

#[tokio::test]
async fn test_capture_streams_fixed_blocks() {
    let monitor = Monitor::default();
    let (sink, gate) = OutboundSink::channel(16);
    let session = FakeSession::default();
    gate.attach(Arc::new(session.clone()));

    let mut capture = CapturePipeline::new(Box::new(FakeInput::new(&monitor, 16000)), sink, 4);
    assert_ok!(capture.start());

    monitor.feed_mic(&[0.25, -0.25, 0.5]);
    monitor.feed_mic(&[-0.5, 1.0, -1.0, 0.0, 0.0, 0.1]);

    assert!(eventually(|| session.sent().len() == 2).await);
    let sent = session.sent();
    assert_eq!(sent[0].payload, codec::encode_pcm16(&[0.25, -0.25, 0.5, -0.5]));
    assert_eq!(sent[1].payload, codec::encode_pcm16(&[1.0, -1.0, 0.0, 0.0]));
    assert!(sent.iter().all(|f| f.mime == "audio/pcm;rate=16000"));

    capture.stop();
    capture.stop();
    assert_eq!(Monitor::count(&monitor.input_closes), 1);
    assert!(!monitor.feed_mic(&[0.0; 4]));
}

#[tokio::test]
async fn test_frames_queue_until_session_attaches() {
    let monitor = Monitor::default();
    let (sink, gate) = OutboundSink::channel(16);

    let mut capture = CapturePipeline::new(Box::new(FakeInput::new(&monitor, 16000)), sink, 2);
    capture.start().unwrap();
    monitor.feed_mic(&[0.1; 6]);

    tokio::time::sleep(Duration::from_millis(20)).await;
    let session = FakeSession::default();
    gate.attach(Arc::new(session.clone()));

    assert!(eventually(|| session.sent().len() == 3).await);
}

#[tokio::test]
async fn test_full_queue_drops_audio_and_counts() {
    let (sink, _gate) = OutboundSink::channel(2);

    for _ in 0..5 {
        sink.send(codec::encode_audio_frame(&[0.0; 4], 16000));
    }
    for _ in 0..=VIDEO_QUEUE_CAPACITY {
        sink.send(MediaFrame::jpeg(vec![0xff, 0xd8]));
    }

    assert_eq!(sink.dropped_audio(), 3);
    assert_eq!(sink.dropped_images(), 1);
}

#[tokio::test]
async fn test_sampler_start_and_stop_are_idempotent() {
    let devices = FakeDevices::new().with_video();
    let source = devices.video_source().unwrap().unwrap();
    let (sink, gate) = OutboundSink::channel(64);
    let session = FakeSession::default();
    gate.attach(Arc::new(session.clone()));

    let mut sampler = FrameSampler::new(source, sink, Duration::from_millis(5), 80);
    assert!(!sampler.is_running());

    sampler.start();
    sampler.start();
    assert!(eventually(|| session.sent().len() >= 3).await);

    sampler.stop();
    assert!(!sampler.is_running());

    // Let an in-flight tick settle, then nothing more arrives
    tokio::time::sleep(Duration::from_millis(20)).await;
    let settled = session.sent().len();
    tokio::time::sleep(Duration::from_millis(30)).await;
    assert_eq!(session.sent().len(), settled);
    assert!(session.sent().iter().all(|f| f.kind == MediaKind::Image));
}

#[tokio::test]
async fn test_sampler_waits_quietly_for_first_frame() {
    let warnings = WarnCounter::default();
    let _guard =
        tracing::subscriber::set_default(tracing_subscriber::registry().with(warnings.clone()));

    let devices = FakeDevices::new().with_late_video(3);
    let monitor = devices.monitor();
    let source = devices.video_source().unwrap().unwrap();
    let (sink, gate) = OutboundSink::channel(64);
    let session = FakeSession::default();
    gate.attach(Arc::new(session.clone()));

    let mut sampler = FrameSampler::new(source, sink, Duration::from_millis(5), 80);
    sampler.start();

    // Blank polls send nothing
    assert!(eventually(|| Monitor::count(&monitor.video_polls) >= 3).await);
    let after_blank = session.sent().len();
    assert!(after_blank <= Monitor::count(&monitor.video_polls).saturating_sub(3));

    assert!(eventually(|| session.sent().len() >= 2).await);
    sampler.stop();

    let sent = session.sent();
    assert!(sent.iter().all(|f| f.kind == MediaKind::Image));
    assert_eq!(&sent[0].payload[..2], &[0xff, 0xd8]);
    assert_eq!(warnings.count(), 0);
}

/// Large noisy frame that is slow to compress
struct HeavySource(Arc<VideoFrame>);

impl HeavySource {
    fn new() -> Self {
        let (width, height) = (1920u32, 1080u32);
        #[allow(clippy::cast_possible_truncation)]
        let rgb = (0..width * height * 3)
            .map(|i| (i.wrapping_mul(2_654_435_761) >> 24) as u8)
            .collect();
        Self(Arc::new(VideoFrame { width, height, rgb }))
    }
}

impl VideoSource for HeavySource {
    fn current_frame(&self) -> Option<Arc<VideoFrame>> {
        Some(Arc::clone(&self.0))
    }
}

#[tokio::test]
async fn test_compression_does_not_stall_the_runtime() {
    let source = HeavySource::new();
    let started = Instant::now();
    Surface::default().encode(&source.0, 80).unwrap();
    let encode_time = started.elapsed();

    let (sink, gate) = OutboundSink::channel(64);
    let session = FakeSession::default();
    gate.attach(Arc::new(session.clone()));
    let mut sampler = FrameSampler::new(Arc::new(source), sink, Duration::from_millis(1), 80);
    sampler.start();

    // The test runtime has one worker; inline compression would block this loop
    let mut longest_gap = Duration::ZERO;
    let mut last = Instant::now();
    while session.sent().len() < 2 {
        tokio::time::sleep(Duration::from_millis(1)).await;
        longest_gap = longest_gap.max(last.elapsed());
        last = Instant::now();
    }
    sampler.stop();

    assert!(longest_gap < encode_time / 2, "{longest_gap:?} vs {encode_time:?}");
}
