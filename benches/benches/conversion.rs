use std::time::Duration;

use cadenza_dsp::{rechannel, ChannelLayout, Quality, SampleRateConverter, SrcParams};
use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use rand::Rng;

fn noise(samples: usize) -> Vec<i16> {
    let mut rng = rand::thread_rng();
    (0..samples).map(|_| rng.gen::<i16>()).collect()
}

fn resample(c: &mut Criterion) {
    let mut group = c.benchmark_group("resample");
    group.measurement_time(Duration::from_secs(5));

    for (in_rate, out_rate) in [(48_000, 16_000), (16_000, 48_000), (44_100, 16_000)] {
        let params = SrcParams::new(in_rate, out_rate, 2);
        let frames = in_rate as usize / 100;
        let input = noise(frames * 2);
        let mut output = vec![0i16; params.output_capacity(frames) * 2];

        group.bench_with_input(
            BenchmarkId::from_parameter(format!("{in_rate}->{out_rate}")),
            &input,
            |b, input| {
                let mut converter = SampleRateConverter::new(Quality::DEFAULT);
                b.iter(|| {
                    converter
                        .process(params, input, &mut output)
                        .expect("conversion")
                });
            },
        );
    }
    group.finish();
}

fn downmix(c: &mut Criterion) {
    let input = noise(480 * 2);
    let mut output = vec![0i16; 480];
    c.bench_function("rechannel_stereo_to_mono_10ms", |b| {
        b.iter(|| rechannel(ChannelLayout::Stereo, ChannelLayout::Mono, &input, &mut output));
    });
}

criterion_group!(benches, resample, downmix);
criterion_main!(benches);
