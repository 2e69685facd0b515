//! Per-stream format conversion between the user's format and the card's.

use cadenza_dsp::{rechannel, ChannelLayout, Quality, SampleRateConverter, SrcParams};

use crate::error::{AudioError, AudioResult};
use crate::format::{Direction, StreamFormat};

/// Conversion state of one configured stream.
///
/// Output streams convert user frames into card frames, input streams the
/// other way round. When both formats agree the context passes data through
/// untouched.
pub struct ResampleContext {
    direction: Direction,
    user: StreamFormat,
    card: StreamFormat,
    pipeline: Pipeline,
    capture: Vec<i16>,
}

struct Pipeline {
    source: StreamFormat,
    sink: StreamFormat,
    source_layout: ChannelLayout,
    sink_layout: ChannelLayout,
    params: SrcParams,
    converter: Option<SampleRateConverter>,
    rechanneled: Vec<i16>,
    resampled: Vec<i16>,
}

impl ResampleContext {
    /// Build a context and size its scratch buffers for `card_buffer_frames`.
    pub fn new(
        direction: Direction,
        user: StreamFormat,
        card: StreamFormat,
        card_buffer_frames: usize,
        quality: Quality,
    ) -> AudioResult<Self> {
        let (source, sink) = match direction {
            Direction::Output => (user, card),
            Direction::Input => (card, user),
        };
        let layout = |fmt: StreamFormat| {
            ChannelLayout::from_channels(fmt.channels).map_err(|_| AudioError::InvalidParam)
        };
        let params = SrcParams::new(source.rate, sink.rate, sink.channels);
        let converter = if source.rate != sink.rate {
            params.validate().map_err(|err| {
                tracing::warn!(?err, from = source.rate, to = sink.rate, "unsupported conversion");
                AudioError::ResampleFail
            })?;
            Some(SampleRateConverter::new(quality))
        } else {
            None
        };

        let mut ctx = Self {
            direction,
            user,
            card,
            pipeline: Pipeline {
                source,
                sink,
                source_layout: layout(source)?,
                sink_layout: layout(sink)?,
                params,
                converter,
                rechanneled: Vec::new(),
                resampled: Vec::new(),
            },
            capture: Vec::new(),
        };

        if ctx.is_necessary() {
            let card_frames = card_buffer_frames.max(1);
            let user_frames = scale_frames(card_frames, card.rate, user.rate) + 1;
            let (source_frames, sink_frames) = match direction {
                Direction::Output => (user_frames, card_frames),
                Direction::Input => (card_frames, user_frames),
            };
            ensure_len(&mut ctx.pipeline.rechanneled, source_frames * sink.channels)?;
            ensure_len(
                &mut ctx.pipeline.resampled,
                params.output_capacity(source_frames).max(sink_frames) * sink.channels,
            )?;
        }
        if direction == Direction::Input {
            ensure_len(&mut ctx.capture, card_buffer_frames.max(1) * card.channels)?;
        }
        tracing::debug!(
            %direction,
            user_rate = user.rate,
            user_channels = user.channels,
            card_rate = card.rate,
            card_channels = card.channels,
            necessary = ctx.is_necessary(),
            "resample context ready"
        );
        Ok(ctx)
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    pub fn user(&self) -> StreamFormat {
        self.user
    }

    pub fn card(&self) -> StreamFormat {
        self.card
    }

    /// Whether rate or channel count differ between user and card.
    pub fn is_necessary(&self) -> bool {
        self.user != self.card
    }

    /// Card rate over user rate.
    pub fn ratio(&self) -> f32 {
        self.card.rate as f32 / self.user.rate as f32
    }

    pub fn backend_name(&self) -> Option<&'static str> {
        self.pipeline
            .converter
            .as_ref()
            .and_then(SampleRateConverter::backend_name)
    }

    /// Drop carried history and phase, e.g. after a stop.
    pub fn reset(&mut self) {
        if let Some(converter) = self.pipeline.converter.as_mut() {
            converter.reset();
        }
    }

    /// Convert interleaved user frames to card frames.
    pub fn convert<'a>(&'a mut self, input: &'a [i16]) -> AudioResult<&'a [i16]> {
        if input.len() % self.pipeline.source.channels != 0 {
            return Err(AudioError::InvalidParam);
        }
        self.pipeline.run(input)
    }

    /// Card frames to read so that their conversion fits `user_frames`.
    pub fn capture_frames(&self, user_frames: usize) -> usize {
        if self.pipeline.converter.is_none() {
            return user_frames;
        }
        let params = &self.pipeline.params;
        let mut frames = scale_frames(user_frames, params.out_rate, params.in_rate);
        while frames > 0 && params.output_capacity(frames) > user_frames {
            frames -= 1;
        }
        frames
    }

    /// Scratch space for `frames` captured card frames.
    pub fn capture_buffer(&mut self, frames: usize) -> AudioResult<&mut [i16]> {
        let len = frames * self.card.channels;
        ensure_len(&mut self.capture, len)?;
        Ok(&mut self.capture[..len])
    }

    /// Convert the first `frames` frames of the capture buffer into
    /// `output`; returns user frames written.
    pub fn convert_captured(&mut self, frames: usize, output: &mut [i16]) -> AudioResult<usize> {
        let Self {
            pipeline, capture, ..
        } = self;
        let len = frames * pipeline.source.channels;
        if len > capture.len() {
            return Err(AudioError::InvalidParam);
        }
        let user_channels = pipeline.sink.channels;
        let converted = pipeline.run(&capture[..len])?;
        let produced = (converted.len() / user_channels).min(output.len() / user_channels);
        if produced * user_channels < converted.len() {
            tracing::warn!(
                dropped = converted.len() / user_channels - produced,
                "capture conversion overflowed the user buffer"
            );
        }
        let samples = produced * user_channels;
        output[..samples].copy_from_slice(&converted[..samples]);
        Ok(produced)
    }
}

impl Pipeline {
    fn run<'a>(&'a mut self, input: &'a [i16]) -> AudioResult<&'a [i16]> {
        let frames = input.len() / self.source.channels;

        let data: &[i16] = if self.source_layout != self.sink_layout {
            let len = frames * self.sink.channels;
            ensure_len(&mut self.rechanneled, len)?;
            let done = rechannel(
                self.source_layout,
                self.sink_layout,
                input,
                &mut self.rechanneled[..len],
            );
            if done != frames {
                tracing::warn!(done, frames, "rechannel came up short");
                return Err(AudioError::ResampleFail);
            }
            &self.rechanneled[..len]
        } else {
            input
        };

        let Some(converter) = self.converter.as_mut() else {
            return Ok(data);
        };
        let capacity = self.params.output_capacity(frames) * self.sink.channels;
        ensure_len(&mut self.resampled, capacity)?;
        let progress = converter
            .process(self.params, data, &mut self.resampled[..capacity])
            .map_err(|err| {
                tracing::warn!(?err, "sample rate conversion failed");
                AudioError::ResampleFail
            })?;
        if progress.consumed != frames {
            tracing::warn!(consumed = progress.consumed, frames, "converter left input behind");
            return Err(AudioError::ResampleFail);
        }
        Ok(&self.resampled[..progress.produced * self.sink.channels])
    }
}

fn scale_frames(frames: usize, to_rate: u32, from_rate: u32) -> usize {
    (frames as u64 * to_rate as u64 / from_rate.max(1) as u64) as usize
}

fn ensure_len(buf: &mut Vec<i16>, len: usize) -> AudioResult<()> {
    if buf.len() < len {
        buf.try_reserve_exact(len - buf.len()).map_err(|err| {
            tracing::warn!(?err, len, "conversion buffer allocation failed");
            AudioError::ResampleFail
        })?;
        buf.resize(len, 0);
    }
    Ok(())
}
