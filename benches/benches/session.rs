use std::sync::Arc;

use cadenza_audio::{ManagerConfig, PcmFormat, StreamDeviceManager, StreamInfo, StreamPolicy, VirtualDriver};
use cadenza_focus::FocusArbiter;
use criterion::{criterion_group, criterion_main, Criterion};
use rand::Rng;

fn manager(dir: &tempfile::TempDir) -> StreamDeviceManager {
    let config = ManagerConfig {
        metadata_path: dir.path().join("audio_metadata.json"),
        period_size: 480,
        ..ManagerConfig::default()
    };
    StreamDeviceManager::new(
        config,
        Arc::new(VirtualDriver::standard()),
        Arc::new(FocusArbiter::new().expect("focus worker")),
    )
    .expect("manager")
}

fn playback(c: &mut Criterion) {
    let mut rng = rand::thread_rng();
    let block: Vec<i16> = (0..441 * 2).map(|_| rng.gen::<i16>()).collect();

    c.bench_function("stream_out_44k1_to_48k", |b| {
        let dir = tempfile::tempdir().expect("tempdir");
        let m = manager(&dir);
        let stream = StreamInfo::new(1, StreamPolicy::Media);
        m.set_stream_out(2, 44_100, PcmFormat::S16Le, stream)
            .expect("configure");
        b.iter(|| m.start_stream_out(stream.id, &block).expect("write"));
    });

    c.bench_function("two_stream_mix_48k", |b| {
        let dir = tempfile::tempdir().expect("tempdir");
        let m = manager(&dir);
        let media = StreamInfo::new(1, StreamPolicy::Media);
        let alert = StreamInfo::new(2, StreamPolicy::Notify);
        for stream in [media, alert] {
            m.set_stream_out(2, 48_000, PcmFormat::S16Le, stream)
                .expect("configure");
            m.set_output_audio_mixer(stream.id).expect("mixer");
        }
        let block = &block[..];
        b.iter(|| {
            m.start_stream_out(alert.id, block).expect("alert");
            m.start_stream_out(media.id, block).expect("media");
        });
    });
}

fn capture(c: &mut Criterion) {
    c.bench_function("stream_in_16k_to_44k1", |b| {
        let dir = tempfile::tempdir().expect("tempdir");
        let m = manager(&dir);
        m.set_stream_in(2, 44_100, PcmFormat::S16Le).expect("configure");
        let mut data = vec![0i16; 441 * 2];
        b.iter(|| m.start_stream_in(&mut data).expect("read"));
    });
}

criterion_group!(benches, playback, capture);
criterion_main!(benches);
