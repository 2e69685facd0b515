use cadenza_dsp::clip16;
use cadenza_focus::{StreamId, StreamInfo};

use super::{
    control_error, drain, rearm, resume_if_paused, validate_format, write_all, StreamDeviceManager,
};
use crate::card::{AudioCard, CardStatus, DuckSlot};
use crate::driver::PcmStream;
use crate::error::{AudioError, AudioResult};
use crate::format::{Direction, PcmFormat, StreamFormat};
use crate::resample::ResampleContext;
use crate::volume::DEFAULT_MIXER_GAIN;

impl StreamDeviceManager {
    /// Configure an output stream on the output card.
    ///
    /// A stream that is already configured is rebuilt in its own slot. A
    /// new stream takes the free slot when the current occupant mixes;
    /// otherwise the current occupant is reset. On failure the card keeps
    /// its previous streams.
    pub fn set_stream_out(
        &self,
        channels: usize,
        rate: u32,
        format: PcmFormat,
        stream: StreamInfo,
    ) -> AudioResult<()> {
        validate_format(channels, rate, format)?;
        if !stream.is_valid() {
            return Err(AudioError::InvalidParam);
        }
        let idx = self.actual(Direction::Output)?;
        let holder = self.arbiter.current_player_stream_info();

        let mut guard = self.output_cards[idx].lock();
        let card = &mut *guard;
        let displaced = displaced_slots(card, stream.id);
        let evicted = card.evict(&displaced);
        let Some(slot) = card.free_slot() else {
            self.reinstate(card, evicted);
            return Err(AudioError::AlreadyInUse);
        };
        let user = StreamFormat::new(channels, rate);

        let resample = self.prepare_card(card, user).and_then(|card_format| {
            let buffer_frames = card
                .pcm
                .as_ref()
                .map(|pcm| pcm.buffer_frames())
                .unwrap_or(self.config.period_size * self.config.period_count);
            ResampleContext::new(
                Direction::Output,
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

        for previous in evicted.streams().filter(|prev| prev.id != stream.id) {
            tracing::info!(previous = %previous.id, next = %stream.id, "replacing output stream");
        }
        if !evicted.is_empty() {
            let next = card.occupied().next();
            if let Some(other) = next {
                self.restore_slot(card, other);
            }
        }
        drop(evicted);

        let main = holder.map(|h| h.id == stream.id).unwrap_or(false) || card.main_slot().is_none();
        let entry = &mut card.slots[slot];
        entry.stream = stream;
        entry.status = CardStatus::Ready;
        entry.resample = Some(resample);
        entry.mixing = false;
        entry.mixer_gain = DEFAULT_MIXER_GAIN;
        entry.pending = None;
        if card.status() == CardStatus::Idle {
            card.set_status(CardStatus::Ready);
        }
        if main {
            self.restore_slot(card, slot);
        }
        card.update_ducking(self.config.ducking_ratio);
        tracing::info!(
            stream = %stream.id,
            policy = ?stream.policy,
            slot,
            main,
            channels,
            rate,
            "output stream configured"
        );
        Ok(())
    }

    /// Opt a configured stream into sharing the card with another one.
    pub fn set_output_audio_mixer(&self, stream: StreamId) -> AudioResult<()> {
        self.with_card(Direction::Output, |card| {
            let slot = card.slot_of(stream).ok_or(AudioError::InvalidParam)?;
            card.slots[slot].mixing = true;
            card.update_ducking(self.config.ducking_ratio);
            Ok(())
        })
    }

    /// Write interleaved user frames; returns the frames accepted.
    ///
    /// While two mixed streams run, the first one to arrive is parked and
    /// the second writes both in one go.
    pub fn start_stream_out(&self, stream: StreamId, data: &[i16]) -> AudioResult<usize> {
        if data.is_empty() {
            return Err(AudioError::InvalidParam);
        }
        let idx = self.actual(Direction::Output)?;
        let mut guard = self.output_cards[idx].lock();
        let card = &mut *guard;
        let slot = card.slot_of(stream).ok_or(AudioError::CardNotReady)?;
        let user_channels = card.slots[slot]
            .resample
            .as_ref()
            .map(|ctx| ctx.user().channels)
            .ok_or(AudioError::CardNotReady)?;
        if card.pcm.is_none() {
            return Err(AudioError::CardNotReady);
        }
        if data.len() % user_channels != 0 {
            return Err(AudioError::InvalidParam);
        }
        let frames = data.len() / user_channels;

        resume_if_paused(card)?;
        card.set_status(CardStatus::Running);
        card.slots[slot].status = CardStatus::Running;

        let period = self.config.period_size;
        let retries = self.config.retry_count;
        let AudioCard { slots, pcm, .. } = card;
        let pcm = pcm.as_mut().ok_or(AudioError::CardNotReady)?.as_mut();
        let (this, other) = split_slots(slots, slot);
        let mixing = this.mixing && other.mixing && other.is_active();

        if let Some(parked) = this.pending.take() {
            // our previous buffer never met a partner
            write_period(pcm, &parked, period, retries)?;
        }

        let gain = this.mixer_gain;
        let converted = this
            .resample
            .as_mut()
            .ok_or(AudioError::CardNotReady)?
            .convert(data)?;

        if mixing {
            match other.pending.take() {
                None => {
                    this.pending = Some(scaled(converted, gain));
                    tracing::trace!(stream = %stream, "output parked for mixing");
                }
                Some(parked) => {
                    let mixed = mix_into(parked, converted, gain);
                    write_period(pcm, &mixed, period, retries)?;
                }
            }
        } else if gain != DEFAULT_MIXER_GAIN {
            write_period(pcm, &scaled(converted, gain), period, retries)?;
        } else {
            write_period(pcm, converted, period, retries)?;
        }
        Ok(frames)
    }

    /// Drain and pause. With a second stream still running only this
    /// stream stops and the other one takes over the card.
    pub fn pause_stream_out(&self, stream: StreamId) -> AudioResult<()> {
        let idx = self.actual(Direction::Output)?;
        let mut guard = self.output_cards[idx].lock();
        let card = &mut *guard;
        let slot = card.slot_of(stream).ok_or(AudioError::CardNotReady)?;
        match card.slots[slot].status {
            CardStatus::Running => {}
            CardStatus::Pause => return Ok(()),
            _ => return Err(AudioError::CardNotReady),
        }
        let other = other_slot(slot);
        let other_active = card.slots[other].is_active();
        let retries = self.config.retry_count;

        {
            let pcm = card.pcm.as_mut().ok_or(AudioError::CardNotReady)?;
            drain(pcm.as_mut(), retries)?;
            if !other_active {
                pcm.pause().map_err(control_error)?;
            }
        }
        card.slots[slot].pending = None;
        card.slots[slot].status = CardStatus::Pause;
        if other_active {
            self.restore_slot(card, other);
        } else {
            card.set_status(CardStatus::Pause);
        }
        tracing::debug!(stream = %stream, "output stream paused");
        Ok(())
    }

    /// Stop a stream, draining queued audio when `drain_first` is set and
    /// discarding it otherwise.
    pub fn stop_stream_out(&self, stream: StreamId, drain_first: bool) -> AudioResult<()> {
        let idx = self.actual(Direction::Output)?;
        let mut guard = self.output_cards[idx].lock();
        let card = &mut *guard;
        let slot = card.slot_of(stream).ok_or(AudioError::CardNotReady)?;
        let other = other_slot(slot);
        let other_active = card.slots[other].is_active();
        let retries = self.config.retry_count;

        if let Some(pcm) = card.pcm.as_mut() {
            if drain_first {
                drain(pcm.as_mut(), retries)?;
            } else if !other_active {
                pcm.drop_pending().map_err(control_error)?;
            }
        }
        let entry = &mut card.slots[slot];
        entry.pending = None;
        entry.status = CardStatus::Ready;
        if let Some(ctx) = entry.resample.as_mut() {
            ctx.reset();
        }
        if other_active {
            self.restore_slot(card, other);
        } else {
            rearm(card);
            card.set_status(CardStatus::Ready);
        }
        tracing::debug!(stream = %stream, drain = drain_first, "output stream stopped");
        Ok(())
    }

    /// Free the stream's slot. Streams not on the card are ignored.
    pub fn reset_stream_out(&self, stream: StreamId) -> AudioResult<()> {
        self.with_card(Direction::Output, |card| {
            if let Some(slot) = card.slot_of(stream) {
                self.release_output_slot(card, slot);
                tracing::debug!(stream = %stream, "output stream reset");
            }
            Ok(())
        })
    }

    /// Make `stream` the card's main stream at full gain and re-apply its
    /// policy's volume and mute.
    pub fn restore_output_state(&self, stream: StreamId) -> AudioResult<()> {
        self.with_card(Direction::Output, |card| {
            let slot = card.slot_of(stream).ok_or(AudioError::InvalidParam)?;
            self.restore_slot(card, slot);
            Ok(())
        })
    }

    pub fn output_mixer_gain(&self, stream: StreamId) -> AudioResult<f32> {
        self.with_card(Direction::Output, |card| {
            let slot = card.slot_of(stream).ok_or(AudioError::InvalidParam)?;
            Ok(card.slots[slot].mixer_gain)
        })
    }

    pub fn set_output_mixer_gain(&self, stream: StreamId, gain: f32) -> AudioResult<()> {
        if !(0.0..=DEFAULT_MIXER_GAIN).contains(&gain) {
            return Err(AudioError::InvalidParam);
        }
        self.with_card(Direction::Output, |card| {
            let slot = card.slot_of(stream).ok_or(AudioError::InvalidParam)?;
            card.slots[slot].mixer_gain = gain;
            Ok(())
        })
    }

    /// Status of a configured output stream.
    pub fn stream_out_status(&self, stream: StreamId) -> AudioResult<CardStatus> {
        self.with_card(Direction::Output, |card| {
            let slot = card.slot_of(stream).ok_or(AudioError::InvalidParam)?;
            Ok(card.slots[slot].status)
        })
    }

    pub(super) fn restore_slot(&self, card: &mut AudioCard, slot: usize) {
        card.slots[slot].mixer_gain = DEFAULT_MIXER_GAIN;
        card.make_main(slot);
        let policy = card.slots[slot].stream.policy;
        card.policy = policy;
        if let Err(err) = self.apply_output_policy(card, policy) {
            tracing::debug!(?err, ?policy, "output volume not applied");
        }
    }

    fn release_output_slot(&self, card: &mut AudioCard, slot: usize) {
        card.slots[slot].clear();
        let next = card.occupied().next();
        match next {
            None => card.release(),
            Some(other) => self.restore_slot(card, other),
        }
    }
}

/// Slots a new configuration of `stream` displaces: its own slot, or the
/// occupants that did not opt into mixing.
fn displaced_slots(card: &AudioCard, stream: StreamId) -> Vec<usize> {
    if let Some(slot) = card.slot_of(stream) {
        return vec![slot];
    }
    card.occupied()
        .filter(|&idx| !card.slots[idx].mixing)
        .collect()
}

fn other_slot(slot: usize) -> usize {
    1 - slot
}

fn split_slots(slots: &mut [DuckSlot; 2], slot: usize) -> (&mut DuckSlot, &mut DuckSlot) {
    let [first, second] = slots;
    if slot == 0 {
        (first, second)
    } else {
        (second, first)
    }
}

fn scaled(samples: &[i16], gain: f32) -> Vec<i16> {
    samples
        .iter()
        .map(|&s| clip16((s as f32 * gain) as i32))
        .collect()
}

/// Add `fresh * gain` onto an already scaled buffer; the shorter input is
/// treated as silence past its end.
fn mix_into(mut parked: Vec<i16>, fresh: &[i16], gain: f32) -> Vec<i16> {
    if parked.len() < fresh.len() {
        parked.resize(fresh.len(), 0);
    }
    for (out, &s) in parked.iter_mut().zip(fresh) {
        *out = clip16(*out as i32 + (s as f32 * gain) as i32);
    }
    parked
}

/// Write `samples`, padding with silence up to one period.
fn write_period(
    pcm: &mut dyn PcmStream,
    samples: &[i16],
    period: usize,
    retries: u32,
) -> AudioResult<()> {
    let period_samples = period * pcm.config().channels;
    if samples.len() >= period_samples {
        return write_all(pcm, samples, retries);
    }
    let mut padded = Vec::with_capacity(period_samples);
    padded.extend_from_slice(samples);
    padded.resize(period_samples, 0);
    write_all(pcm, &padded, retries)
}
