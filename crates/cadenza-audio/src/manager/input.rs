use cadenza_focus::{StreamId, StreamInfo};

use super::{
    control_error, read_some, rearm, resume_if_paused, validate_format, StreamDeviceManager,
};
use crate::card::CardStatus;
use crate::error::{AudioError, AudioResult};
use crate::format::{Direction, PcmFormat, StreamFormat};
use crate::resample::ResampleContext;

/// Identity of the single capture stream an input card carries.
pub const CAPTURE_STREAM: StreamId = StreamId(u32::MAX);

impl StreamDeviceManager {
    /// Configure the capture stream. An existing configuration is replaced,
    /// and kept when the new one cannot be set up.
    pub fn set_stream_in(&self, channels: usize, rate: u32, format: PcmFormat) -> AudioResult<()> {
        validate_format(channels, rate, format)?;
        let idx = self.actual(Direction::Input)?;
        let mut guard = self.input_cards[idx].lock();
        let card = &mut *guard;

        let policy = card.policy;
        let occupied: Vec<usize> = card.occupied().collect();
        let evicted = card.evict(&occupied);
        card.policy = policy;

        let user = StreamFormat::new(channels, rate);
        let resample = self.prepare_card(card, user).and_then(|card_format| {
            let buffer_frames = card
                .pcm
                .as_ref()
                .map(|pcm| pcm.buffer_frames())
                .unwrap_or(self.config.period_size * self.config.period_count);
            ResampleContext::new(
                Direction::Input,
                user,
                card_format,
                buffer_frames,
                self.config.quality(),
            )
        });
        let resample = match resample {
            Ok(ctx) => ctx,
            Err(err) => {
                self.reinstate(card, evicted);
                return Err(err);
            }
        };
        drop(evicted);

        let slot = &mut card.slots[0];
        slot.stream = StreamInfo {
            id: CAPTURE_STREAM,
            policy,
        };
        slot.status = CardStatus::Ready;
        slot.resample = Some(resample);
        card.make_main(0);
        card.set_status(CardStatus::Ready);
        if let Err(err) = self.apply_input_state(card) {
            tracing::debug!(?err, "input gain not applied");
        }
        tracing::info!(channels, rate, "input stream configured");
        Ok(())
    }

    /// Capture into `data`; returns the user frames written.
    pub fn start_stream_in(&self, data: &mut [i16]) -> AudioResult<usize> {
        let idx = self.actual(Direction::Input)?;
        let mut guard = self.input_cards[idx].lock();
        let card = &mut *guard;
        if card.is_empty() || card.pcm.is_none() {
            return Err(AudioError::CardNotReady);
        }
        let user_channels = card.slots[0]
            .resample
            .as_ref()
            .map(|ctx| ctx.user().channels)
            .ok_or(AudioError::CardNotReady)?;
        let frames = data.len() / user_channels;
        if frames == 0 {
            return Err(AudioError::InvalidParam);
        }

        resume_if_paused(card)?;
        card.set_status(CardStatus::Running);
        card.slots[0].status = CardStatus::Running;

        let retries = self.config.retry_count;
        let pcm = card.pcm.as_mut().ok_or(AudioError::CardNotReady)?.as_mut();
        let ctx = card.slots[0]
            .resample
            .as_mut()
            .ok_or(AudioError::CardNotReady)?;
        let wanted = ctx.capture_frames(frames).min(pcm.buffer_frames());
        if wanted == 0 {
            return Err(AudioError::InvalidParam);
        }
        let buf = ctx.capture_buffer(wanted)?;
        let read = read_some(pcm, buf, retries)?;
        ctx.convert_captured(read, &mut data[..frames * user_channels])
    }

    pub fn pause_stream_in(&self) -> AudioResult<()> {
        self.with_card(Direction::Input, |card| {
            match card.status() {
                CardStatus::Running => {}
                CardStatus::Pause => return Ok(()),
                _ => return Err(AudioError::CardNotReady),
            }
            let pcm = card.pcm.as_mut().ok_or(AudioError::CardNotReady)?;
            pcm.pause().map_err(control_error)?;
            card.set_status(CardStatus::Pause);
            card.slots[0].status = CardStatus::Pause;
            tracing::debug!("input stream paused");
            Ok(())
        })
    }

    /// Discard captured audio and return to `Ready`.
    pub fn stop_stream_in(&self) -> AudioResult<()> {
        self.with_card(Direction::Input, |card| {
            if card.is_empty() {
                return Err(AudioError::CardNotReady);
            }
            let pcm = card.pcm.as_mut().ok_or(AudioError::CardNotReady)?;
            pcm.drop_pending().map_err(control_error)?;
            rearm(card);
            if let Some(ctx) = card.slots[0].resample.as_mut() {
                ctx.reset();
            }
            card.set_status(CardStatus::Ready);
            card.slots[0].status = CardStatus::Ready;
            tracing::debug!("input stream stopped");
            Ok(())
        })
    }

    /// Close the capture stream and return the card to `Idle`.
    pub fn reset_stream_in(&self) -> AudioResult<()> {
        self.with_card(Direction::Input, |card| {
            card.release();
            tracing::debug!("input stream reset");
            Ok(())
        })
    }
}
