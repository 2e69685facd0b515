//! Low-pass kernels for the integral-ratio decimator.
//!
//! Hann-windowed sinc, Q15, cutoff at 90% of the decimated Nyquist. Each
//! table sums to exactly `1 << 15` so DC passes unchanged, and both end taps
//! are zero.

pub const FIR_TAPS: usize = 20;

/// Frames of input carried between calls. The oldest tap is zero, so the
/// convolution window only reaches back `FIR_TAPS - 2` frames.
pub const FIR_HISTORY: usize = FIR_TAPS - 2;

pub const DECIMATE_BY_2: [i32; FIR_TAPS] = [
    0, -17, -135, 85, 712, 98, -2029, -1338, 5566, 13442, 13442, 5566, -1338, -2029, 98, 712,
    85, -135, -17, 0,
];

pub const DECIMATE_BY_3: [i32; FIR_TAPS] = [
    0, 33, 104, -57, -640, -1121, -328, 2482, 6475, 9436, 9436, 6475, 2482, -328, -1121, -640,
    -57, 104, 33, 0,
];

/// Kernel for a decimation factor, if that factor has one.
pub fn kernel_for(factor: u32) -> Option<&'static [i32; FIR_TAPS]> {
    match factor {
        2 => Some(&DECIMATE_BY_2),
        3 => Some(&DECIMATE_BY_3),
        _ => None,
    }
}
