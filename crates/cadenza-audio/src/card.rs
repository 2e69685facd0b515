//! Card bookkeeping: device states, the open PCM stream and the two duck
//! slots that let a second stream share an output card.

use cadenza_focus::{StreamId, StreamInfo, StreamPolicy};

use crate::driver::{DeviceNode, PcmConfig, PcmStream};
use crate::format::Direction;
use crate::process::ProcessSlot;
use crate::resample::ResampleContext;
use crate::volume::DEFAULT_MIXER_GAIN;

/// Streams that may share one card.
pub const SLOT_COUNT: usize = 2;

/// Lifecycle of a device, and of a stream within a slot.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum CardStatus {
    /// Not present.
    #[default]
    None,
    Idle,
    Ready,
    Running,
    Pause,
}

#[derive(Debug, Default)]
pub(crate) struct DeviceState {
    pub(crate) status: CardStatus,
    pub(crate) process: ProcessSlot,
}

pub(crate) struct DuckSlot {
    pub(crate) stream: StreamInfo,
    pub(crate) status: CardStatus,
    pub(crate) resample: Option<ResampleContext>,
    pub(crate) main: bool,
    pub(crate) mixing: bool,
    pub(crate) mixer_gain: f32,
    /// Converted card frames waiting for the other mixed stream.
    pub(crate) pending: Option<Vec<i16>>,
}

impl DuckSlot {
    fn empty() -> Self {
        Self {
            stream: StreamInfo::RELEASED,
            status: CardStatus::Idle,
            resample: None,
            main: false,
            mixing: false,
            mixer_gain: DEFAULT_MIXER_GAIN,
            pending: None,
        }
    }

    pub(crate) fn is_occupied(&self) -> bool {
        self.stream.is_valid()
    }

    pub(crate) fn clear(&mut self) {
        *self = Self::empty();
    }

    pub(crate) fn is_active(&self) -> bool {
        self.is_occupied() && matches!(self.status, CardStatus::Running)
    }
}

pub(crate) struct AudioCard {
    pub(crate) direction: Direction,
    pub(crate) card_id: usize,
    pub(crate) device_id: usize,
    pub(crate) devices: Vec<DeviceState>,
    pub(crate) pcm: Option<Box<dyn PcmStream>>,
    pub(crate) policy: StreamPolicy,
    /// Level of the active policy as last applied to hardware.
    pub(crate) volume: u8,
    pub(crate) muted: bool,
    pub(crate) equalizer: Option<u32>,
    /// Hardware channel limit; zero until queried.
    pub(crate) channels: usize,
    pub(crate) rate_mask: u32,
    pub(crate) slots: [DuckSlot; SLOT_COUNT],
}

impl AudioCard {
    pub(crate) fn new(direction: Direction, card_id: usize, max_devices: usize) -> Self {
        Self {
            direction,
            card_id,
            device_id: 0,
            devices: (0..max_devices).map(|_| DeviceState::default()).collect(),
            pcm: None,
            policy: default_policy(direction),
            volume: 0,
            muted: false,
            equalizer: None,
            channels: 0,
            rate_mask: 0,
            slots: [DuckSlot::empty(), DuckSlot::empty()],
        }
    }

    pub(crate) fn node(&self) -> DeviceNode {
        DeviceNode::new(self.card_id, self.device_id, self.direction)
    }

    pub(crate) fn node_for(&self, device: usize) -> DeviceNode {
        DeviceNode::new(self.card_id, device, self.direction)
    }

    pub(crate) fn status(&self) -> CardStatus {
        self.devices
            .get(self.device_id)
            .map(|dev| dev.status)
            .unwrap_or_default()
    }

    pub(crate) fn set_status(&mut self, status: CardStatus) {
        if let Some(dev) = self.devices.get_mut(self.device_id) {
            dev.status = status;
        }
    }

    pub(crate) fn first_discovered_device(&self) -> Option<usize> {
        self.devices
            .iter()
            .position(|dev| dev.status != CardStatus::None)
    }

    pub(crate) fn is_discovered(&self, device: usize) -> bool {
        self.devices
            .get(device)
            .map(|dev| dev.status != CardStatus::None)
            .unwrap_or(false)
    }

    pub(crate) fn slot_of(&self, id: StreamId) -> Option<usize> {
        self.slots
            .iter()
            .position(|slot| slot.is_occupied() && slot.stream.id == id)
    }

    pub(crate) fn free_slot(&self) -> Option<usize> {
        self.slots.iter().position(|slot| !slot.is_occupied())
    }

    pub(crate) fn occupied(&self) -> impl Iterator<Item = usize> + '_ {
        self.slots
            .iter()
            .enumerate()
            .filter(|(_, slot)| slot.is_occupied())
            .map(|(idx, _)| idx)
    }

    pub(crate) fn main_slot(&self) -> Option<usize> {
        self.slots
            .iter()
            .position(|slot| slot.is_occupied() && slot.main)
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.occupied().next().is_none()
    }

    /// Both slots hold streams that opted into mixing.
    pub(crate) fn is_mixing(&self) -> bool {
        self.slots
            .iter()
            .all(|slot| slot.is_occupied() && slot.mixing)
    }

    /// Make `idx` the only main slot.
    pub(crate) fn make_main(&mut self, idx: usize) {
        for (pos, slot) in self.slots.iter_mut().enumerate() {
            slot.main = pos == idx;
        }
    }

    /// Recompute mixer gains of two mixed streams: the non-main one is
    /// ducked when the two policies differ.
    pub(crate) fn update_ducking(&mut self, ducking_ratio: f32) {
        if !self.is_mixing() {
            return;
        }
        let policies_differ = self.slots[0].stream.policy != self.slots[1].stream.policy;
        for slot in self.slots.iter_mut() {
            slot.mixer_gain = if slot.main || !policies_differ {
                DEFAULT_MIXER_GAIN
            } else {
                DEFAULT_MIXER_GAIN * ducking_ratio
            };
        }
    }

    /// Take `slots` off the card. A card left empty is released and its
    /// PCM stream closed.
    pub(crate) fn evict(&mut self, slots: &[usize]) -> Evicted {
        let mut evicted = Evicted {
            slots: Vec::with_capacity(slots.len()),
            closed: None,
            policy: self.policy,
            status: self.status(),
        };
        for &idx in slots {
            let slot = std::mem::replace(&mut self.slots[idx], DuckSlot::empty());
            evicted.slots.push((idx, slot));
        }
        if self.is_empty() {
            evicted.closed = self.pcm.as_ref().map(|pcm| *pcm.config());
            self.release();
        }
        evicted
    }

    /// Undo [`AudioCard::evict`]. `reopened` stands in for the PCM stream
    /// the eviction closed; it starts with nothing queued, so running or
    /// paused streams come back as `Ready`.
    pub(crate) fn reinstate(&mut self, evicted: Evicted, reopened: Option<Box<dyn PcmStream>>) {
        let fresh = reopened.is_some();
        if fresh {
            self.pcm = reopened;
        }
        let settle = |status: CardStatus| match status {
            CardStatus::Running | CardStatus::Pause if fresh => CardStatus::Ready,
            other => other,
        };
        for (idx, mut slot) in evicted.slots {
            if fresh {
                slot.pending = None;
                slot.status = settle(slot.status);
            }
            self.slots[idx] = slot;
        }
        self.policy = evicted.policy;
        if self.status() != CardStatus::None {
            self.set_status(settle(evicted.status));
        }
    }

    /// Reset to the unconfigured state, closing the PCM stream.
    pub(crate) fn release(&mut self) {
        for slot in self.slots.iter_mut() {
            slot.clear();
        }
        self.pcm = None;
        self.policy = default_policy(self.direction);
        if self.status() != CardStatus::None {
            self.set_status(CardStatus::Idle);
        }
    }
}

/// Streams taken off a card while it is reconfigured, held until the new
/// configuration is in place.
pub(crate) struct Evicted {
    slots: Vec<(usize, DuckSlot)>,
    /// Config of the PCM stream the eviction closed.
    closed: Option<PcmConfig>,
    policy: StreamPolicy,
    status: CardStatus,
}

impl Evicted {
    pub(crate) fn closed(&self) -> Option<&PcmConfig> {
        self.closed.as_ref()
    }

    pub(crate) fn streams(&self) -> impl Iterator<Item = &StreamInfo> + '_ {
        self.slots.iter().map(|(_, slot)| &slot.stream)
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

/// Policy a card falls back to once nothing is configured on it.
pub(crate) const fn default_policy(direction: Direction) -> StreamPolicy {
    match direction {
        Direction::Input => StreamPolicy::VoiceRecord,
        Direction::Output => StreamPolicy::Media,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn occupy(card: &mut AudioCard, idx: usize, id: u32, policy: StreamPolicy) {
        let slot = &mut card.slots[idx];
        slot.stream = StreamInfo::new(id, policy);
        slot.status = CardStatus::Ready;
        slot.mixing = true;
    }

    #[test]
    fn slots_are_found_by_stream() {
        let mut card = AudioCard::new(Direction::Output, 0, 3);
        assert_eq!(card.free_slot(), Some(0));
        occupy(&mut card, 0, 4, StreamPolicy::Media);
        assert_eq!(card.slot_of(StreamId(4)), Some(0));
        assert_eq!(card.slot_of(StreamId(5)), None);
        assert_eq!(card.free_slot(), Some(1));
        assert!(!card.is_mixing());
    }

    #[test]
    fn ducking_applies_to_the_non_main_slot_only() {
        let mut card = AudioCard::new(Direction::Output, 0, 3);
        occupy(&mut card, 0, 1, StreamPolicy::Media);
        occupy(&mut card, 1, 2, StreamPolicy::Notify);
        card.make_main(1);
        card.update_ducking(0.25);
        assert_eq!(card.slots[0].mixer_gain, 0.25);
        assert_eq!(card.slots[1].mixer_gain, DEFAULT_MIXER_GAIN);

        card.slots[1].stream.policy = StreamPolicy::Media;
        card.update_ducking(0.25);
        assert_eq!(card.slots[0].mixer_gain, DEFAULT_MIXER_GAIN);
    }

    #[test]
    fn eviction_of_the_last_stream_can_be_undone() {
        let mut card = AudioCard::new(Direction::Output, 0, 3);
        card.devices[0].status = CardStatus::Running;
        card.policy = StreamPolicy::Notify;
        occupy(&mut card, 1, 7, StreamPolicy::Notify);
        card.slots[1].status = CardStatus::Running;
        card.slots[1].pending = Some(vec![1, 2]);

        let evicted = card.evict(&[1]);
        assert!(card.is_empty());
        assert_eq!(card.status(), CardStatus::Idle);
        assert_eq!(card.policy, StreamPolicy::Media);
        assert_eq!(evicted.streams().map(|s| s.id).collect::<Vec<_>>(), vec![StreamId(7)]);
        assert!(evicted.closed().is_none());

        card.reinstate(evicted, None);
        assert_eq!(card.slot_of(StreamId(7)), Some(1));
        assert_eq!(card.slots[1].status, CardStatus::Running);
        assert!(card.slots[1].pending.is_some());
        assert_eq!(card.status(), CardStatus::Running);
        assert_eq!(card.policy, StreamPolicy::Notify);
    }

    #[test]
    fn evicting_one_of_two_streams_keeps_the_card() {
        let mut card = AudioCard::new(Direction::Output, 0, 3);
        card.devices[0].status = CardStatus::Ready;
        occupy(&mut card, 0, 1, StreamPolicy::Media);
        occupy(&mut card, 1, 2, StreamPolicy::Notify);
        let evicted = card.evict(&[0]);
        assert!(!evicted.is_empty());
        assert_eq!(card.free_slot(), Some(0));
        assert_eq!(card.status(), CardStatus::Ready);
    }

    #[test]
    fn release_returns_to_idle_defaults() {
        let mut card = AudioCard::new(Direction::Input, 1, 3);
        card.devices[0].status = CardStatus::Running;
        card.policy = StreamPolicy::Voip;
        occupy(&mut card, 0, 9, StreamPolicy::VoiceRecord);
        card.release();
        assert!(card.is_empty());
        assert_eq!(card.status(), CardStatus::Idle);
        assert_eq!(card.policy, StreamPolicy::VoiceRecord);
        assert_eq!(card.node().name(), "pcmC1D0c");
    }
}
