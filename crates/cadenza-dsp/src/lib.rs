//! Interleaved 16-bit PCM conversion primitives.
//!
//! Two building blocks live here: [`rechannel`] maps frames between the
//! supported channel layouts, and [`SampleRateConverter`] changes the sample
//! rate through a pluggable [`ResamplerBackend`].

pub mod backend;
pub mod converter;
pub mod error;
pub mod fir;
pub mod layout;
pub mod rechannel;

pub use backend::{FirDecimator, LinearInterpolator, ResamplerBackend};
pub use converter::{Quality, SampleRateConverter, SrcParams, SrcProgress};
pub use error::{DspError, Result};
pub use layout::ChannelLayout;
pub use rechannel::{clip16, rechannel, MIX_COEFF_Q15};

/// Bytes per sample handled by every conversion path.
pub const SAMPLE_WIDTH: usize = 2;
