use std::sync::Arc;

use cadenza_focus::StreamPolicy;

use super::{control_error, StreamDeviceManager};
use crate::card::AudioCard;
use crate::driver::Control;
use crate::error::{AudioError, AudioResult};
use crate::format::Direction;
use crate::metadata::PersistedAudioState;
use crate::volume::{hardware_volume, input_gain, MAX_VOLUME_LEVEL};

/// Told about every persisted mute change, with the policy and new state.
pub type MuteChangeCallback = Arc<dyn Fn(StreamPolicy, bool) + Send + Sync>;

impl StreamDeviceManager {
    pub fn max_volume(&self) -> u8 {
        MAX_VOLUME_LEVEL
    }

    pub fn input_volume(&self) -> AudioResult<u8> {
        self.with_card(Direction::Input, |card| Ok(card.volume))
    }

    /// Set the capture level. A muted microphone is unmuted.
    pub fn set_input_volume(&self, level: u8) -> AudioResult<()> {
        if level > MAX_VOLUME_LEVEL {
            return Err(AudioError::InvalidParam);
        }
        let idx = self.actual(Direction::Input)?;
        let mut guard = self.input_cards[idx].lock();
        let (unmuted, saved) = self.update_state(|state| {
            let unmuted = state.is_muted(StreamPolicy::VoiceRecord);
            state.set_muted(StreamPolicy::VoiceRecord, false);
            state.set_volume(StreamPolicy::VoiceRecord, level);
            unmuted
        });
        let applied = self.apply_input_state(&mut guard);
        drop(guard);

        if unmuted {
            self.notify_mute(StreamPolicy::VoiceRecord, false);
        }
        saved.and(applied)
    }

    /// Level of the policy currently driving the output card.
    pub fn output_volume(&self) -> AudioResult<u8> {
        self.with_card(Direction::Output, |card| Ok(card.volume))
    }

    /// Persist `level` for `policy`, unmuting it. Hardware follows only when
    /// `policy` is the one playing; otherwise the level waits until a
    /// stream of that policy becomes active.
    pub fn set_output_volume(&self, level: u8, policy: StreamPolicy) -> AudioResult<()> {
        if level > MAX_VOLUME_LEVEL || !policy.is_valid() {
            return Err(AudioError::InvalidParam);
        }
        let idx = self.actual(Direction::Output)?;
        let mut guard = self.output_cards[idx].lock();
        let (unmuted, saved) = self.update_state(|state| {
            let unmuted = state.is_muted(policy);
            state.set_muted(policy, false);
            state.set_volume(policy, level);
            unmuted
        });

        let card = &mut *guard;
        let applied = if card.policy == policy && !card.is_empty() {
            self.apply_output_policy(card, policy)
        } else {
            tracing::debug!(?policy, level, active = ?card.policy, "output volume deferred");
            Ok(())
        };
        drop(guard);

        if unmuted {
            self.notify_mute(policy, false);
        }
        saved.and(applied)
    }

    /// Persisted level of `policy`.
    pub fn output_stream_volume(&self, policy: StreamPolicy) -> AudioResult<u8> {
        self.state
            .lock()
            .volume(policy)
            .ok_or(AudioError::InvalidParam)
    }

    /// Make `policy` the output card's active policy and push its persisted
    /// volume and mute to hardware.
    pub fn set_output_stream_volume(&self, policy: StreamPolicy) -> AudioResult<()> {
        if !policy.is_valid() {
            return Err(AudioError::InvalidParam);
        }
        self.with_card(Direction::Output, |card| {
            card.policy = policy;
            self.apply_output_policy(card, policy)
        })
    }

    /// Persist a mute flag and apply it when `policy` is active on the card
    /// of `direction`. Input only carries [`StreamPolicy::VoiceRecord`].
    pub fn set_stream_mute(&self, policy: StreamPolicy, direction: Direction, mute: bool) -> AudioResult<()> {
        if !policy.is_valid() || (direction == Direction::Input && policy != StreamPolicy::VoiceRecord) {
            return Err(AudioError::InvalidParam);
        }
        let idx = self.actual(direction)?;
        let mut guard = self.cards(direction)[idx].lock();
        let (changed, saved) = self.update_state(|state| {
            let changed = state.is_muted(policy) != mute;
            state.set_muted(policy, mute);
            changed
        });

        let card = &mut *guard;
        let active = match direction {
            Direction::Input => true,
            Direction::Output => card.policy == policy && !card.is_empty(),
        };
        let applied = if active && card.muted != mute {
            self.driver
                .control(card.node(), Control::Mute(mute))
                .map_err(control_error)
                .map(|()| card.muted = mute)
        } else {
            Ok(())
        };
        drop(guard);

        if changed {
            self.notify_mute(policy, mute);
        }
        saved.and(applied)
    }

    pub fn stream_mute_state(&self, policy: StreamPolicy) -> AudioResult<bool> {
        if !policy.is_valid() {
            return Err(AudioError::InvalidParam);
        }
        Ok(self.state.lock().is_muted(policy))
    }

    pub fn set_mic_mute(&self, mute: bool) -> AudioResult<()> {
        self.set_stream_mute(StreamPolicy::VoiceRecord, Direction::Input, mute)
    }

    pub fn set_input_equalizer(&self, preset: u32) -> AudioResult<()> {
        self.set_equalizer(Direction::Input, preset)
    }

    pub fn set_output_equalizer(&self, preset: u32) -> AudioResult<()> {
        self.set_equalizer(Direction::Output, preset)
    }

    /// Last equalizer preset applied to the card of `direction`.
    pub fn equalizer(&self, direction: Direction) -> AudioResult<Option<u32>> {
        self.with_card(direction, |card| Ok(card.equalizer))
    }

    pub fn register_mute_change_listener(&self, listener: MuteChangeCallback) {
        *self.mute_listener.lock() = Some(listener);
    }

    pub fn deregister_mute_change_listener(&self) {
        *self.mute_listener.lock() = None;
    }

    /// Push the persisted volume and mute of `policy` to the output card.
    pub(super) fn apply_output_policy(&self, card: &mut AudioCard, policy: StreamPolicy) -> AudioResult<()> {
        let (level, muted) = {
            let state = self.state.lock();
            (state.volume(policy).unwrap_or_default(), state.is_muted(policy))
        };
        card.volume = level;
        let node = card.node();
        let volume = self
            .driver
            .control(node, Control::Volume(hardware_volume(policy, level)))
            .map_err(control_error);
        let mute = if card.muted != muted {
            self.driver
                .control(node, Control::Mute(muted))
                .map_err(control_error)
                .map(|()| card.muted = muted)
        } else {
            Ok(())
        };
        tracing::debug!(?policy, level, muted, "output volume applied");
        volume.and(mute)
    }

    /// Push the persisted capture level and microphone mute to the input card.
    pub(super) fn apply_input_state(&self, card: &mut AudioCard) -> AudioResult<()> {
        let (level, muted) = {
            let state = self.state.lock();
            (
                state.volume(StreamPolicy::VoiceRecord).unwrap_or_default(),
                state.is_muted(StreamPolicy::VoiceRecord),
            )
        };
        card.volume = level;
        let node = card.node();
        let gain = self
            .driver
            .control(node, Control::Gain(input_gain(level)))
            .map_err(control_error);
        let mute = if card.muted != muted {
            self.driver
                .control(node, Control::Mute(muted))
                .map_err(control_error)
                .map(|()| card.muted = muted)
        } else {
            Ok(())
        };
        gain.and(mute)
    }

    fn set_equalizer(&self, direction: Direction, preset: u32) -> AudioResult<()> {
        self.with_card(direction, |card| {
            self.driver
                .control(card.node(), Control::Equalizer(preset))
                .map_err(control_error)?;
            card.equalizer = Some(preset);
            Ok(())
        })
    }

    /// Mutate the persisted state and write it out. Returns `f`'s value and
    /// the outcome of the write.
    fn update_state<R>(&self, f: impl FnOnce(&mut PersistedAudioState) -> R) -> (R, AudioResult<()>) {
        let mut state = self.state.lock();
        let value = f(&mut *state);
        let saved = self.metadata.save(&state).map_err(|err| {
            tracing::warn!(?err, path = %self.metadata.path().display(), "saving audio metadata failed");
            AudioError::OperationFail
        });
        (value, saved)
    }

    fn notify_mute(&self, policy: StreamPolicy, muted: bool) {
        let Some(listener) = self.mute_listener.lock().clone() else {
            return;
        };
        let delivered = self
            .arbiter
            .worker()
            .submit_and_wait(move || listener(policy, muted));
        if let Err(err) = delivered {
            tracing::warn!(?err, ?policy, "mute change listener not notified");
        }
    }
}
