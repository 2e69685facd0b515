use crate::converter::{Quality, SrcProgress};
use crate::fir::{FIR_HISTORY, FIR_TAPS};
use crate::rechannel::clip16;

/// Stateful conversion engine behind a [`crate::SampleRateConverter`].
///
/// Implementations consume interleaved frames from `input`, write at most
/// `output.len() / channels` frames and keep whatever they need to continue
/// seamlessly on the next call. Dropping a backend releases it.
pub trait ResamplerBackend: Send {
    fn process(&mut self, input: &[i16], output: &mut [i16]) -> SrcProgress;

    /// Forget carried history and phase, as if freshly created.
    fn reset(&mut self);

    fn name(&self) -> &'static str;
}

/// Downsampler for exact factors of 2 or 3.
pub struct FirDecimator {
    factor: usize,
    channels: usize,
    kernel: &'static [i32; FIR_TAPS],
    history: Vec<i16>,
    /// Input frames left before the next output frame is due.
    skip: usize,
}

impl FirDecimator {
    pub fn new(factor: usize, channels: usize, kernel: &'static [i32; FIR_TAPS]) -> Self {
        Self {
            factor,
            channels,
            kernel,
            history: vec![0; FIR_HISTORY * channels],
            skip: 0,
        }
    }

    #[inline]
    fn sample(&self, input: &[i16], frame: usize, back: usize, channel: usize) -> i32 {
        if back <= frame {
            input[(frame - back) * self.channels + channel] as i32
        } else {
            let idx = FIR_HISTORY + frame - back;
            self.history[idx * self.channels + channel] as i32
        }
    }

    fn carry_history(&mut self, input: &[i16], consumed: usize) {
        let ch = self.channels;
        if consumed >= FIR_HISTORY {
            let start = (consumed - FIR_HISTORY) * ch;
            self.history.copy_from_slice(&input[start..consumed * ch]);
        } else if consumed > 0 {
            self.history.copy_within(consumed * ch.., 0);
            let keep = (FIR_HISTORY - consumed) * ch;
            self.history[keep..].copy_from_slice(&input[..consumed * ch]);
        }
    }
}

impl ResamplerBackend for FirDecimator {
    fn process(&mut self, input: &[i16], output: &mut [i16]) -> SrcProgress {
        let ch = self.channels;
        let available = input.len() / ch;
        let capacity = output.len() / ch;
        let mut progress = SrcProgress::default();

        while progress.consumed < available {
            if self.skip == 0 {
                if progress.produced == capacity {
                    break;
                }
                let frame = progress.consumed;
                for channel in 0..ch {
                    let mut acc: i64 = 0;
                    for (back, coeff) in self.kernel[..FIR_TAPS - 1].iter().enumerate() {
                        acc += *coeff as i64 * self.sample(input, frame, back, channel) as i64;
                    }
                    let value = ((acc + (1 << 14)) >> 15) as i32;
                    output[progress.produced * ch + channel] = clip16(value);
                }
                progress.produced += 1;
                self.skip = self.factor;
            }
            self.skip -= 1;
            progress.consumed += 1;
        }

        self.carry_history(input, progress.consumed);
        progress
    }

    fn reset(&mut self) {
        self.history.fill(0);
        self.skip = 0;
    }

    fn name(&self) -> &'static str {
        "fir-decimator"
    }
}

const ONE: u64 = 1 << 16;
const FRAC_MASK: u64 = ONE - 1;

/// Input frames advanced per output frame, in 16.16 fixed point. Truncated,
/// so it can run slightly short of the exact ratio.
pub(crate) fn fixed_step(in_rate: u32, out_rate: u32) -> u64 {
    ((in_rate as u64) << 16) / out_rate.max(1) as u64
}

/// Linear interpolation with a 16.16 fixed-point read position.
///
/// The read position indexes a virtual sequence whose frame 0 is the last
/// input frame of the previous call, so interpolation is continuous across
/// call boundaries.
pub struct LinearInterpolator {
    channels: usize,
    step: u64,
    position: u64,
    precision_mask: u64,
    previous: Vec<i16>,
}

impl LinearInterpolator {
    pub fn new(in_rate: u32, out_rate: u32, channels: usize, quality: Quality) -> Self {
        let bits = quality.interpolation_bits();
        Self {
            channels,
            step: fixed_step(in_rate, out_rate),
            position: ONE,
            precision_mask: FRAC_MASK & !((1u64 << (16 - bits)) - 1),
            previous: vec![0; channels],
        }
    }

    /// Read step in 16.16 input frames per output frame.
    pub fn step(&self) -> u64 {
        self.step
    }

    /// Carried read position in 16.16 format, relative to the last consumed frame.
    pub fn phase(&self) -> u64 {
        self.position
    }
}

impl ResamplerBackend for LinearInterpolator {
    fn process(&mut self, input: &[i16], output: &mut [i16]) -> SrcProgress {
        let ch = self.channels;
        let available = input.len() / ch;
        let capacity = output.len() / ch;
        let mut produced = 0;

        loop {
            let idx = (self.position >> 16) as usize;
            if idx >= available || produced == capacity {
                break;
            }
            let frac = (self.position & self.precision_mask) as i64;
            for channel in 0..ch {
                let a = if idx == 0 {
                    self.previous[channel]
                } else {
                    input[(idx - 1) * ch + channel]
                } as i64;
                let b = input[idx * ch + channel] as i64;
                let value = a + (((b - a) * frac) >> 16);
                output[produced * ch + channel] = clip16(value as i32);
            }
            produced += 1;
            self.position += self.step;
        }

        let consumed = ((self.position >> 16) as usize).min(available);
        if consumed > 0 {
            self.previous
                .copy_from_slice(&input[(consumed - 1) * ch..consumed * ch]);
            self.position -= (consumed as u64) << 16;
        }
        SrcProgress { consumed, produced }
    }

    fn reset(&mut self) {
        self.previous.fill(0);
        self.position = ONE;
    }

    fn name(&self) -> &'static str {
        "linear-interpolator"
    }
}
