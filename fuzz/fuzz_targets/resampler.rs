#![no_main]

use cadenza_audio::SUPPORTED_RATES;
use cadenza_dsp::{Quality, SampleRateConverter, SrcParams};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let [a, b, c, q, rest @ ..] = data else {
        return;
    };
    let in_rate = SUPPORTED_RATES[*a as usize % SUPPORTED_RATES.len()];
    let out_rate = SUPPORTED_RATES[*b as usize % SUPPORTED_RATES.len()];
    let channels = 1 + (*c as usize % 2);
    let params = SrcParams::new(in_rate, out_rate, channels);
    if params.validate().is_err() {
        return;
    }

    let samples: Vec<i16> = rest
        .chunks_exact(2)
        .map(|pair| i16::from_le_bytes([pair[0], pair[1]]))
        .collect();
    let frames = samples.len() / channels;
    let input = &samples[..frames * channels];

    let mut converter = SampleRateConverter::new(Quality::new(q % 11));
    let mut output = vec![0i16; params.output_capacity(frames) * channels];
    let progress = converter
        .process(params, input, &mut output)
        .expect("validated parameters");
    assert!(progress.consumed <= frames);
    assert!(progress.produced * channels <= output.len());
});
