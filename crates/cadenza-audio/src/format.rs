use std::fmt;

use cadenza_dsp::SAMPLE_WIDTH;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Direction {
    Input,
    Output,
}

impl Direction {
    /// Suffix used in device node names.
    pub const fn suffix(self) -> char {
        match self {
            Direction::Input => 'c',
            Direction::Output => 'p',
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Direction::Input => "input",
            Direction::Output => "output",
        })
    }
}

/// Sample encodings a stream may ask for. Only 16-bit little endian is
/// carried end to end.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PcmFormat {
    S16Le,
    S24Le,
    S32Le,
}

impl PcmFormat {
    pub const fn width(self) -> usize {
        match self {
            PcmFormat::S16Le => 2,
            PcmFormat::S24Le => 3,
            PcmFormat::S32Le => 4,
        }
    }
}

/// Channel count and rate of one side of a conversion.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct StreamFormat {
    pub channels: usize,
    pub rate: u32,
}

impl StreamFormat {
    pub const fn new(channels: usize, rate: u32) -> Self {
        Self { channels, rate }
    }

    #[inline]
    pub const fn frames_to_bytes(&self, frames: usize) -> usize {
        frames * self.channels * SAMPLE_WIDTH
    }

    #[inline]
    pub const fn bytes_to_frames(&self, bytes: usize) -> usize {
        bytes / (self.channels * SAMPLE_WIDTH)
    }
}

/// Rates a card may advertise, in bit order of the capability mask.
pub const SUPPORTED_RATES: [u32; 8] = [8_000, 11_025, 16_000, 22_050, 32_000, 44_100, 48_000, 96_000];

/// Capability bit for `rate`, if it is one of [`SUPPORTED_RATES`].
pub fn rate_bit(rate: u32) -> Option<u32> {
    SUPPORTED_RATES
        .iter()
        .position(|&r| r == rate)
        .map(|idx| 1 << idx)
}

/// Capability mask covering every rate in `rates`; unknown rates are ignored.
pub fn rate_mask(rates: &[u32]) -> u32 {
    rates.iter().filter_map(|&r| rate_bit(r)).fold(0, |mask, bit| mask | bit)
}

/// Smallest rate in `mask` at or above `requested`, falling back to the
/// largest rate the card has.
pub fn closest_sample_rate(mask: u32, requested: u32) -> Option<u32> {
    let available = SUPPORTED_RATES
        .iter()
        .enumerate()
        .filter(|(idx, _)| mask & (1 << idx) != 0)
        .map(|(_, &rate)| rate);
    let mut largest = None;
    for rate in available {
        if rate >= requested {
            return Some(rate);
        }
        largest = Some(rate);
    }
    largest
}
