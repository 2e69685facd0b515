use crate::backend::{fixed_step, FirDecimator, LinearInterpolator, ResamplerBackend};
use crate::error::{DspError, Result};
use crate::fir;
use crate::SAMPLE_WIDTH;

/// Largest rate change, in either direction, a converter accepts.
pub const MAX_RATIO: u32 = 3;

/// Negotiated conversion parameters. Fixed once a converter has been used.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SrcParams {
    pub in_rate: u32,
    pub out_rate: u32,
    pub channels: usize,
    /// Bytes per sample.
    pub width: usize,
}

impl SrcParams {
    pub fn new(in_rate: u32, out_rate: u32, channels: usize) -> Self {
        Self {
            in_rate,
            out_rate,
            channels,
            width: SAMPLE_WIDTH,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.in_rate == 0 || self.out_rate == 0 {
            return Err(DspError::InvalidRate);
        }
        if self.channels == 0 {
            return Err(DspError::UnsupportedChannels(0));
        }
        if self.width != SAMPLE_WIDTH {
            return Err(DspError::UnsupportedWidth(self.width));
        }
        let (from, to) = (self.in_rate as u64, self.out_rate as u64);
        if from > to * MAX_RATIO as u64 || to > from * MAX_RATIO as u64 {
            return Err(DspError::UnsupportedRatio {
                from: self.in_rate,
                to: self.out_rate,
            });
        }
        Ok(())
    }

    /// Whether one rate is an exact multiple of the other.
    pub fn is_integral(&self) -> bool {
        let (hi, lo) = if self.in_rate >= self.out_rate {
            (self.in_rate, self.out_rate)
        } else {
            (self.out_rate, self.in_rate)
        };
        lo != 0 && hi % lo == 0
    }

    /// Output frames `in_frames` of input can produce, plus one frame of
    /// slack for the carried phase. Bounded by the fixed-point read step the
    /// interpolator actually takes, which never undershoots the exact ratio.
    pub fn output_capacity(&self, in_frames: usize) -> usize {
        let step = fixed_step(self.in_rate, self.out_rate).max(1);
        (((in_frames as u64) << 16).div_ceil(step) + 1) as usize
    }
}

/// Trade-off between interpolation accuracy and cost, 0 ..= 10.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Quality(u8);

impl Quality {
    pub const MIN: Quality = Quality(0);
    pub const DEFAULT: Quality = Quality(5);
    pub const MAX: Quality = Quality(10);

    pub fn new(level: u8) -> Self {
        Quality(level.min(Self::MAX.0))
    }

    pub fn level(self) -> u8 {
        self.0
    }

    /// Fractional bits of the read position used by interpolation.
    #[inline]
    pub fn interpolation_bits(self) -> u32 {
        6 + self.0 as u32
    }

    /// Integral ratios always run at maximum quality.
    pub fn effective(self, params: &SrcParams) -> Self {
        if params.is_integral() {
            Self::MAX
        } else {
            self
        }
    }
}

impl Default for Quality {
    fn default() -> Self {
        Self::DEFAULT
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SrcProgress {
    pub consumed: usize,
    pub produced: usize,
}

/// Sample rate converter with lazily negotiated parameters.
///
/// The first call to [`SampleRateConverter::process`] fixes rate, channel
/// count and sample width; later calls must repeat them exactly. To convert
/// with different parameters, build a new converter.
pub struct SampleRateConverter {
    quality: Quality,
    params: Option<SrcParams>,
    backend: Option<Box<dyn ResamplerBackend>>,
}

impl SampleRateConverter {
    pub fn new(quality: Quality) -> Self {
        Self {
            quality,
            params: None,
            backend: None,
        }
    }

    /// Converter driven by an externally supplied backend, for example a
    /// vendor DSP resampler.
    pub fn with_backend(params: SrcParams, backend: Box<dyn ResamplerBackend>) -> Result<Self> {
        params.validate()?;
        Ok(Self {
            quality: Quality::MAX,
            params: Some(params),
            backend: Some(backend),
        })
    }

    pub fn params(&self) -> Option<SrcParams> {
        self.params
    }

    pub fn quality(&self) -> Quality {
        self.quality
    }

    pub fn backend_name(&self) -> Option<&'static str> {
        self.backend.as_ref().map(|backend| backend.name())
    }

    pub fn process(
        &mut self,
        params: SrcParams,
        input: &[i16],
        output: &mut [i16],
    ) -> Result<SrcProgress> {
        match self.params {
            Some(existing) if existing != params => return Err(DspError::ParamMismatch),
            Some(_) => {}
            None => self.negotiate(params)?,
        }
        if input.len() % params.channels != 0 {
            return Err(DspError::PartialFrame {
                len: input.len(),
                channels: params.channels,
            });
        }

        let Some(backend) = self.backend.as_mut() else {
            return Err(DspError::ParamMismatch);
        };
        Ok(backend.process(input, output))
    }

    /// Clear carried history and phase. Parameters stay fixed.
    pub fn reset(&mut self) {
        if let Some(backend) = self.backend.as_mut() {
            backend.reset();
        }
    }

    fn negotiate(&mut self, params: SrcParams) -> Result<()> {
        params.validate()?;
        self.quality = self.quality.effective(&params);
        let backend = select_backend(&params, self.quality);
        tracing::debug!(
            in_rate = params.in_rate,
            out_rate = params.out_rate,
            channels = params.channels,
            quality = self.quality.level(),
            backend = backend.name(),
            "resampler negotiated"
        );
        self.backend = Some(backend);
        self.params = Some(params);
        Ok(())
    }
}

fn select_backend(params: &SrcParams, quality: Quality) -> Box<dyn ResamplerBackend> {
    if params.in_rate > params.out_rate && params.in_rate % params.out_rate == 0 {
        let factor = params.in_rate / params.out_rate;
        if let Some(kernel) = fir::kernel_for(factor) {
            return Box::new(FirDecimator::new(factor as usize, params.channels, kernel));
        }
    }
    Box::new(LinearInterpolator::new(
        params.in_rate,
        params.out_rate,
        params.channels,
        quality,
    ))
}
