//! Stream and device management.
//!
//! [`StreamDeviceManager`] owns every card found at start-up. Each card sits
//! behind its own mutex; the persisted volume state has a separate lock that
//! is only ever taken while a card lock is already held, never the other way
//! round. Which card is in use per direction is tracked separately and is
//! read (and released) before any card lock is taken.

mod control;
mod input;
mod output;
mod process;

use std::sync::{Arc, Weak};

use cadenza_focus::{FocusArbiter, StreamInfo, StreamPolicy};
use parking_lot::Mutex;

use crate::card::{AudioCard, CardStatus, Evicted};
use crate::config::ManagerConfig;
use crate::driver::{AudioDriver, DeviceNode, PcmConfig, PcmStream, Query};
use crate::error::{AudioError, AudioResult, DriverError};
use crate::format::{closest_sample_rate, Direction, PcmFormat, StreamFormat};
use crate::metadata::{MetadataStore, PersistedAudioState};
use crate::volume::level_from_hardware;

pub use control::MuteChangeCallback;
pub use input::CAPTURE_STREAM;

/// Card buffer size reported when no stream is open, in bytes.
pub const DEFAULT_CARD_BUFFER_BYTES: usize = 1024 * 2;

pub struct StreamDeviceManager {
    config: ManagerConfig,
    driver: Arc<dyn AudioDriver>,
    arbiter: Arc<FocusArbiter>,
    metadata: MetadataStore,
    state: Mutex<PersistedAudioState>,
    input_cards: Vec<Mutex<AudioCard>>,
    output_cards: Vec<Mutex<AudioCard>>,
    actual_input: Mutex<Option<usize>>,
    actual_output: Mutex<Option<usize>>,
    mute_listener: Mutex<Option<MuteChangeCallback>>,
}

impl StreamDeviceManager {
    /// Discover devices, pick the card used per direction and load the
    /// persisted volume state.
    pub fn new(
        config: ManagerConfig,
        driver: Arc<dyn AudioDriver>,
        arbiter: Arc<FocusArbiter>,
    ) -> AudioResult<Self> {
        let cards = |direction, count| {
            (0..count)
                .map(|id| Mutex::new(AudioCard::new(direction, id, config.max_devices_per_card)))
                .collect::<Vec<_>>()
        };
        let manager = Self {
            input_cards: cards(Direction::Input, config.max_input_cards),
            output_cards: cards(Direction::Output, config.max_output_cards),
            metadata: MetadataStore::new(&config.metadata_path),
            state: Mutex::new(PersistedAudioState::with_default_volume(config.default_volume)),
            actual_input: Mutex::new(None),
            actual_output: Mutex::new(None),
            mute_listener: Mutex::new(None),
            config,
            driver,
            arbiter,
        };
        manager.discover()?;
        manager.load_metadata();
        manager.apply_initial_state();
        manager.log_card_info();
        Ok(manager)
    }

    /// Dump every discovered card with its devices and occupied slots at
    /// debug level. Returns how many cards were described.
    pub fn log_card_info(&self) -> usize {
        let mut described = 0;
        for direction in [Direction::Input, Direction::Output] {
            let actual = *self.actual_slot(direction).lock();
            for (idx, card) in self.cards(direction).iter().enumerate() {
                let card = card.lock();
                if card.first_discovered_device().is_none() {
                    continue;
                }
                described += 1;
                tracing::debug!(
                    %direction,
                    card = idx,
                    device = card.device_id,
                    in_use = actual == Some(idx),
                    status = ?card.status(),
                    policy = ?card.policy,
                    volume = card.volume,
                    muted = card.muted,
                    open = card.pcm.is_some(),
                    channels = card.channels,
                    rate_mask = card.rate_mask,
                    "audio card"
                );
                for (device, state) in card.devices.iter().enumerate() {
                    if state.status != CardStatus::None {
                        tracing::debug!(node = %card.node_for(device), status = ?state.status, process = ?state.process, "  device");
                    }
                }
                for slot in card.occupied() {
                    let entry = &card.slots[slot];
                    tracing::debug!(
                        slot,
                        stream = %entry.stream.id,
                        policy = ?entry.stream.policy,
                        status = ?entry.status,
                        main = entry.main,
                        mixing = entry.mixing,
                        gain = entry.mixer_gain,
                        parked = entry.pending.is_some(),
                        "  slot"
                    );
                }
            }
        }
        described
    }

    /// Keep the main output stream in step with the player focus holder.
    ///
    /// Claims the arbiter's player focus loss listener.
    pub fn follow_player_focus(self: &Arc<Self>) {
        let weak: Weak<Self> = Arc::downgrade(self);
        self.arbiter
            .register_player_focus_loss_listener(Arc::new(move |_previous: StreamInfo| {
                if let Some(manager) = weak.upgrade() {
                    manager.on_player_focus_changed();
                }
            }));
    }

    pub fn config(&self) -> &ManagerConfig {
        &self.config
    }

    pub fn arbiter(&self) -> &Arc<FocusArbiter> {
        &self.arbiter
    }

    /// Card and device in use for `direction`.
    pub fn actual_device(&self, direction: Direction) -> Option<(usize, usize)> {
        let idx = (*self.actual_slot(direction).lock())?;
        let device = self.cards(direction)[idx].lock().device_id;
        Some((idx, device))
    }

    pub fn card_status(&self, direction: Direction) -> AudioResult<CardStatus> {
        self.with_card(direction, |card| Ok(card.status()))
    }

    pub fn stream_policy(&self, direction: Direction) -> AudioResult<StreamPolicy> {
        self.with_card(direction, |card| Ok(card.policy))
    }

    pub fn set_stream_policy(&self, direction: Direction, policy: StreamPolicy) -> AudioResult<()> {
        if !policy.is_valid() {
            return Err(AudioError::InvalidParam);
        }
        self.with_card(direction, |card| {
            card.policy = policy;
            Ok(())
        })
    }

    pub fn change_stream_in_device(&self, card: usize, device: usize) -> AudioResult<()> {
        self.change_stream_device(Direction::Input, card, device)
    }

    pub fn change_stream_out_device(&self, card: usize, device: usize) -> AudioResult<()> {
        self.change_stream_device(Direction::Output, card, device)
    }

    /// User frames that fit one hardware buffer of the input card.
    pub fn input_frame_count(&self) -> AudioResult<usize> {
        self.frame_count(Direction::Input)
    }

    pub fn output_frame_count(&self) -> AudioResult<usize> {
        self.frame_count(Direction::Output)
    }

    pub fn card_frames_to_bytes(&self, direction: Direction, frames: usize) -> AudioResult<usize> {
        self.with_formats(direction, |_, card, _| Ok(card.frames_to_bytes(frames)))
    }

    pub fn user_frames_to_bytes(&self, direction: Direction, frames: usize) -> AudioResult<usize> {
        self.with_formats(direction, |user, _, _| Ok(user.frames_to_bytes(frames)))
    }

    pub fn bytes_to_user_frames(&self, direction: Direction, bytes: usize) -> AudioResult<usize> {
        self.with_formats(direction, |user, _, _| Ok(user.bytes_to_frames(bytes)))
    }

    /// Card rate over user rate of the main output stream.
    pub fn output_sample_rate_ratio(&self) -> AudioResult<f32> {
        self.with_formats(Direction::Output, |user, card, _| {
            Ok(card.rate as f32 / user.rate as f32)
        })
    }

    pub fn input_card_buffer_size(&self) -> AudioResult<usize> {
        self.card_buffer_size(Direction::Input)
    }

    pub fn output_card_buffer_size(&self) -> AudioResult<usize> {
        self.card_buffer_size(Direction::Output)
    }

    fn discover(&self) -> AudioResult<()> {
        let names = self.driver.probe().map_err(|err| {
            tracing::warn!(?err, dir = %self.config.device_dir.display(), "probing audio devices failed");
            AudioError::NoAvailableCard
        })?;

        for node in names.iter().filter_map(|name| DeviceNode::parse(name)) {
            let Some(card) = self.cards(node.direction).get(node.card) else {
                tracing::debug!(%node, "card beyond configured limit, ignored");
                continue;
            };
            let mut card = card.lock();
            match card.devices.get_mut(node.device) {
                Some(dev) => {
                    dev.status = CardStatus::Idle;
                    tracing::debug!(
                        path = %node.path(&self.config.device_dir).display(),
                        "audio device found"
                    );
                }
                None => tracing::debug!(%node, "device beyond configured limit, ignored"),
            }
        }

        for direction in [Direction::Input, Direction::Output] {
            let found = self.cards(direction).iter().enumerate().find_map(|(idx, card)| {
                let mut card = card.lock();
                let device = card.first_discovered_device()?;
                card.device_id = device;
                Some(idx)
            });
            *self.actual_slot(direction).lock() = found;
            match found {
                Some(card) => tracing::info!(%direction, card, "audio card selected"),
                None => tracing::warn!(%direction, "no audio card"),
            }
        }

        if self.actual_input.lock().is_none() && self.actual_output.lock().is_none() {
            return Err(AudioError::NoAvailableCard);
        }
        Ok(())
    }

    fn load_metadata(&self) {
        let default_volume = self.hardware_default_volume();
        let state = match self.metadata.load_or_create(default_volume) {
            Ok(state) => state,
            Err(err) => {
                tracing::warn!(
                    ?err,
                    path = %self.metadata.path().display(),
                    "audio metadata unavailable, keeping volumes in memory"
                );
                PersistedAudioState::with_default_volume(default_volume)
            }
        };
        *self.state.lock() = state;
    }

    fn hardware_default_volume(&self) -> u8 {
        let Ok(idx) = self.actual(Direction::Output) else {
            return self.config.default_volume;
        };
        let node = self.output_cards[idx].lock().node();
        match self.driver.query(node, Query::Volume) {
            Ok(value) => level_from_hardware(StreamPolicy::Base, value.min(100) as u8),
            Err(err) => {
                tracing::debug!(?err, %node, "hardware volume unknown");
                self.config.default_volume
            }
        }
    }

    fn apply_initial_state(&self) {
        if let Ok(idx) = self.actual(Direction::Output) {
            let mut card = self.output_cards[idx].lock();
            card.volume = self.state.lock().volume(card.policy).unwrap_or_default();
        }
        if let Ok(idx) = self.actual(Direction::Input) {
            let mut guard = self.input_cards[idx].lock();
            if let Err(err) = self.apply_input_state(&mut guard) {
                tracing::debug!(?err, "initial input state not applied");
            }
        }
    }

    fn change_stream_device(&self, direction: Direction, card_id: usize, device: usize) -> AudioResult<()> {
        let cards = self.cards(direction);
        if card_id >= cards.len() || device >= self.config.max_devices_per_card {
            return Err(AudioError::InvalidParam);
        }
        let mut actual = self.actual_slot(direction).lock();
        if *actual == Some(card_id) {
            return Err(AudioError::AlreadyInUse);
        }
        if let Some(current) = *actual {
            let current = cards[current].lock();
            if !current.is_empty() || current.status() != CardStatus::Idle {
                return Err(AudioError::CardNotReady);
            }
        }
        let mut target = cards[card_id].lock();
        if !target.is_discovered(device) {
            return Err(AudioError::NoAvailableCard);
        }
        target.device_id = device;
        *actual = Some(card_id);
        tracing::info!(%direction, card = card_id, device, "audio device changed");
        Ok(())
    }

    fn frame_count(&self, direction: Direction) -> AudioResult<usize> {
        self.with_formats(direction, |user, card, buffer_frames| {
            Ok((buffer_frames as u64 * user.rate as u64 / card.rate.max(1) as u64) as usize)
        })
    }

    fn card_buffer_size(&self, direction: Direction) -> AudioResult<usize> {
        self.with_card(direction, |card| {
            Ok(match card.pcm.as_ref() {
                Some(pcm) => StreamFormat::new(pcm.config().channels, pcm.config().rate)
                    .frames_to_bytes(pcm.buffer_frames()),
                None => DEFAULT_CARD_BUFFER_BYTES,
            })
        })
    }

    fn on_player_focus_changed(&self) {
        let Some(holder) = self.arbiter.current_player_stream_info() else {
            return;
        };
        let Ok(idx) = self.actual(Direction::Output) else {
            return;
        };
        let mut guard = self.output_cards[idx].lock();
        let card = &mut *guard;
        if let Some(slot) = card.slot_of(holder.id) {
            if !card.slots[slot].main {
                tracing::debug!(stream = %holder.id, "focus holder becomes main output stream");
                self.restore_slot(card, slot);
                card.update_ducking(self.config.ducking_ratio);
            }
        }
    }

    fn cards(&self, direction: Direction) -> &[Mutex<AudioCard>] {
        match direction {
            Direction::Input => &self.input_cards,
            Direction::Output => &self.output_cards,
        }
    }

    fn actual_slot(&self, direction: Direction) -> &Mutex<Option<usize>> {
        match direction {
            Direction::Input => &self.actual_input,
            Direction::Output => &self.actual_output,
        }
    }

    fn actual(&self, direction: Direction) -> AudioResult<usize> {
        (*self.actual_slot(direction).lock()).ok_or(AudioError::NoAvailableCard)
    }

    fn with_card<R>(
        &self,
        direction: Direction,
        f: impl FnOnce(&mut AudioCard) -> AudioResult<R>,
    ) -> AudioResult<R> {
        let idx = self.actual(direction)?;
        let mut guard = self.cards(direction)[idx].lock();
        f(&mut guard)
    }

    /// Run `f` with the user format, card format and hardware buffer frames
    /// of the card's main stream.
    fn with_formats<R>(
        &self,
        direction: Direction,
        f: impl FnOnce(StreamFormat, StreamFormat, usize) -> AudioResult<R>,
    ) -> AudioResult<R> {
        self.with_card(direction, |card| {
            let slot = card
                .main_slot()
                .or_else(|| card.occupied().next())
                .ok_or(AudioError::CardNotReady)?;
            let ctx = card.slots[slot]
                .resample
                .as_ref()
                .ok_or(AudioError::CardNotReady)?;
            let pcm = card.pcm.as_ref().ok_or(AudioError::CardNotReady)?;
            f(ctx.user(), ctx.card(), pcm.buffer_frames())
        })
    }

    /// Put back what a failed reconfigure evicted, reopening the PCM stream
    /// the eviction closed. Anything half-built is dropped first.
    fn reinstate(&self, card: &mut AudioCard, evicted: Evicted) {
        if card.is_empty() {
            card.release();
        }
        let reopened = match evicted.closed() {
            None => None,
            Some(config) => match self.driver.open(card.node(), config) {
                Ok(pcm) => Some(pcm),
                Err(err) => {
                    tracing::warn!(?err, node = %card.node(), "previous configuration could not be reopened");
                    return;
                }
            },
        };
        card.reinstate(evicted, reopened);
        tracing::debug!(node = %card.node(), "previous configuration reinstated");
    }

    /// Open the card for `user` unless it is already open, returning the
    /// format the hardware runs at.
    fn prepare_card(&self, card: &mut AudioCard, user: StreamFormat) -> AudioResult<StreamFormat> {
        if let Some(pcm) = card.pcm.as_ref() {
            let config = pcm.config();
            return Ok(StreamFormat::new(config.channels, config.rate));
        }

        let node = card.node();
        let caps = |query| {
            self.driver.query(node, query).map_err(|err| {
                tracing::warn!(?err, %node, ?query, "capability query failed");
                AudioError::DeviceFail
            })
        };
        card.channels = caps(Query::Channels)? as usize;
        card.rate_mask = caps(Query::SampleRates)?;

        let rate = closest_sample_rate(card.rate_mask, user.rate).ok_or_else(|| {
            tracing::warn!(%node, requested = user.rate, "no usable sample rate");
            AudioError::DeviceNotSupported
        })?;
        let channels = user.channels.min(card.channels).max(1);
        let config = PcmConfig {
            channels,
            rate,
            format: PcmFormat::S16Le,
            period_size: self.config.period_size,
            period_count: self.config.period_count,
        };
        let pcm = self.driver.open(node, &config).map_err(|err| {
            tracing::warn!(?err, %node, "opening audio device failed");
            match err {
                DriverError::AccessDenied | DriverError::NotImplemented => AudioError::DeviceNotSupported,
                DriverError::Busy => AudioError::AlreadyInUse,
                DriverError::InvalidArgument => AudioError::InvalidParam,
                _ => AudioError::DeviceFail,
            }
        })?;
        tracing::debug!(%node, channels, rate, "audio device opened");
        card.pcm = Some(pcm);
        Ok(StreamFormat::new(channels, rate))
    }
}

fn validate_format(channels: usize, rate: u32, format: PcmFormat) -> AudioResult<()> {
    if channels == 0 || channels > cadenza_dsp::ChannelLayout::MAX_CHANNELS || rate == 0 {
        return Err(AudioError::InvalidParam);
    }
    if format != PcmFormat::S16Le {
        return Err(AudioError::InvalidParam);
    }
    Ok(())
}

/// Map a failed read or write.
fn transfer_error(err: DriverError) -> AudioError {
    match err {
        DriverError::Pipe => AudioError::XrunState,
        DriverError::InvalidArgument => AudioError::InvalidParam,
        DriverError::Suspended => AudioError::DeviceSuspended,
        DriverError::Unreachable => AudioError::DeviceDead,
        DriverError::NotImplemented => AudioError::DeviceNotSupported,
        DriverError::Again => AudioError::Again,
        _ => AudioError::OperationFail,
    }
}

/// Map a failed control or stream state change.
fn control_error(err: DriverError) -> AudioError {
    match err {
        DriverError::NotImplemented | DriverError::AccessDenied => AudioError::DeviceNotSupported,
        DriverError::InvalidArgument => AudioError::InvalidParam,
        DriverError::Unreachable => AudioError::DeviceDead,
        DriverError::Suspended => AudioError::DeviceSuspended,
        _ => AudioError::DeviceFail,
    }
}

/// Write every sample, recovering from up to `retries` xruns.
fn write_all(pcm: &mut dyn PcmStream, samples: &[i16], retries: u32) -> AudioResult<()> {
    let channels = pcm.config().channels;
    let mut offset = 0;
    let mut retries_left = retries;
    while offset < samples.len() {
        match pcm.write(&samples[offset..]) {
            Ok(0) => return Err(AudioError::OperationFail),
            Ok(frames) => offset += frames * channels,
            Err(DriverError::Pipe) if retries_left > 0 => {
                retries_left -= 1;
                tracing::warn!(retries_left, "output xrun, preparing");
                pcm.prepare().map_err(|err| {
                    tracing::warn!(?err, "prepare after xrun failed");
                    AudioError::XrunState
                })?;
            }
            Err(DriverError::Pipe) => return Err(AudioError::XrunState),
            Err(err) => {
                tracing::warn!(?err, "output write failed");
                return Err(transfer_error(err));
            }
        }
    }
    Ok(())
}

/// Read one buffer, recovering from up to `retries` xruns.
fn read_some(pcm: &mut dyn PcmStream, samples: &mut [i16], retries: u32) -> AudioResult<usize> {
    let mut retries_left = retries;
    loop {
        match pcm.read(samples) {
            Ok(frames) => return Ok(frames),
            Err(DriverError::Pipe) => {
                if retries_left == 0 {
                    return Err(AudioError::XrunState);
                }
                retries_left -= 1;
                tracing::warn!(retries_left, "input xrun, preparing");
                pcm.prepare().map_err(|err| {
                    tracing::warn!(?err, "prepare after xrun failed");
                    AudioError::XrunState
                })?;
            }
            Err(err) => {
                tracing::warn!(?err, "input read failed");
                return Err(transfer_error(err));
            }
        }
    }
}

/// Let queued frames play out. An xrun while draining means the buffer
/// already ran dry.
fn drain(pcm: &mut dyn PcmStream, retries: u32) -> AudioResult<()> {
    let mut retries_left = retries;
    loop {
        match pcm.drain() {
            Ok(()) | Err(DriverError::Pipe) => return Ok(()),
            Err(DriverError::Again) if retries_left > 0 => {
                retries_left -= 1;
                std::thread::yield_now();
            }
            Err(err) => {
                tracing::warn!(?err, "drain failed");
                return Err(transfer_error(err));
            }
        }
    }
}

/// Resume a paused card before new data flows.
fn resume_if_paused(card: &mut AudioCard) -> AudioResult<()> {
    if card.status() != CardStatus::Pause {
        return Ok(());
    }
    let pcm = card.pcm.as_mut().ok_or(AudioError::CardNotReady)?;
    pcm.resume().map_err(control_error)?;
    tracing::debug!(node = %card.node(), "audio device resumed");
    Ok(())
}

/// Return a stopped stream to a writable state.
fn rearm(card: &mut AudioCard) {
    let node = card.node();
    if let Some(pcm) = card.pcm.as_mut() {
        if let Err(err) = pcm.prepare() {
            tracing::debug!(?err, %node, "prepare after stop failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::virtual_driver::{FaultPoint, VirtualDevice, VirtualDriver};

    pub(super) struct Fixture {
        pub(super) _dir: tempfile::TempDir,
        pub(super) driver: VirtualDriver,
        pub(super) manager: StreamDeviceManager,
    }

    pub(super) fn fixture_with(driver: VirtualDriver) -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let config = ManagerConfig {
            metadata_path: dir.path().join("audio_metadata.json"),
            period_size: 64,
            ..ManagerConfig::default()
        };
        let arbiter = Arc::new(FocusArbiter::new().unwrap());
        let manager = StreamDeviceManager::new(config, Arc::new(driver.clone()), arbiter).unwrap();
        Fixture {
            _dir: dir,
            driver,
            manager,
        }
    }

    pub(super) fn fixture() -> Fixture {
        fixture_with(VirtualDriver::standard())
    }

    #[test]
    fn discovery_picks_first_device_per_direction() {
        let driver = VirtualDriver::new()
            .with_device(
                DeviceNode::new(1, 2, Direction::Output),
                VirtualDevice::new(2, &[48_000]),
            )
            .with_device(
                DeviceNode::new(1, 1, Direction::Output),
                VirtualDevice::new(2, &[48_000]),
            )
            .with_device(
                DeviceNode::new(5, 0, Direction::Output),
                VirtualDevice::new(2, &[48_000]),
            );
        let fx = fixture_with(driver);
        assert_eq!(fx.manager.actual_device(Direction::Output), Some((1, 1)));
        assert_eq!(fx.manager.actual_device(Direction::Input), None);
        assert_eq!(fx.manager.card_status(Direction::Output), Ok(CardStatus::Idle));
        assert_eq!(
            fx.manager.card_status(Direction::Input),
            Err(AudioError::NoAvailableCard)
        );
    }

    #[test]
    fn card_info_describes_discovered_cards_only() {
        let driver = VirtualDriver::standard().with_device(
            DeviceNode::new(1, 1, Direction::Output),
            VirtualDevice::new(2, &[48_000]),
        );
        let fx = fixture_with(driver);
        assert_eq!(fx.manager.log_card_info(), 3);

        let stream = StreamInfo::new(1, StreamPolicy::Media);
        fx.manager
            .set_stream_out(2, 48_000, PcmFormat::S16Le, stream)
            .unwrap();
        assert_eq!(fx.manager.log_card_info(), 3);
    }

    #[test]
    fn no_devices_means_no_manager() {
        let dir = tempfile::tempdir().unwrap();
        let config = ManagerConfig {
            metadata_path: dir.path().join("meta.json"),
            ..ManagerConfig::default()
        };
        let arbiter = Arc::new(FocusArbiter::new().unwrap());
        let result = StreamDeviceManager::new(config, Arc::new(VirtualDriver::new()), arbiter);
        assert_eq!(result.err().map(|e| e.code()), Some(AudioError::NoAvailableCard.code()));
    }

    #[test]
    fn default_volume_comes_from_output_hardware() {
        let driver = VirtualDriver::new().with_device(
            DeviceNode::new(0, 0, Direction::Output),
            VirtualDevice::new(2, &[48_000]).volume(75),
        );
        let fx = fixture_with(driver);
        assert_eq!(fx.manager.output_stream_volume(StreamPolicy::Voip), Ok(4));
    }

    #[test]
    fn device_switch_checks_range_and_state() {
        let driver = VirtualDriver::standard().with_device(
            DeviceNode::new(1, 1, Direction::Output),
            VirtualDevice::new(2, &[48_000]),
        );
        let fx = fixture_with(driver);
        let m = &fx.manager;
        assert_eq!(m.change_stream_out_device(7, 0), Err(AudioError::InvalidParam));
        assert_eq!(m.change_stream_out_device(0, 0), Err(AudioError::AlreadyInUse));
        assert_eq!(m.change_stream_out_device(1, 0), Err(AudioError::NoAvailableCard));
        assert_eq!(m.change_stream_out_device(1, 1), Ok(()));
        assert_eq!(m.actual_device(Direction::Output), Some((1, 1)));
    }

    #[test]
    fn device_switch_refuses_busy_card() {
        let driver = VirtualDriver::standard().with_device(
            DeviceNode::new(1, 0, Direction::Output),
            VirtualDevice::new(2, &[48_000]),
        );
        let fx = fixture_with(driver);
        let stream = StreamInfo::new(1, StreamPolicy::Media);
        fx.manager
            .set_stream_out(2, 48_000, PcmFormat::S16Le, stream)
            .unwrap();
        assert_eq!(fx.manager.change_stream_out_device(1, 0), Err(AudioError::CardNotReady));
        fx.manager.reset_stream_out(stream.id).unwrap();
        assert_eq!(fx.manager.change_stream_out_device(1, 0), Ok(()));
    }

    #[test]
    fn buffer_size_falls_back_without_stream() {
        let fx = fixture();
        assert_eq!(fx.manager.output_card_buffer_size(), Ok(DEFAULT_CARD_BUFFER_BYTES));
        fx.manager
            .set_stream_in(1, 16_000, PcmFormat::S16Le)
            .unwrap();
        // virtual devices hold 4096 frames; one channel at 16 kHz
        assert_eq!(fx.manager.input_card_buffer_size(), Ok(4096 * 2));
        assert_eq!(fx.manager.input_frame_count(), Ok(4096));
        assert_eq!(fx.manager.user_frames_to_bytes(Direction::Input, 10), Ok(20));
        assert_eq!(fx.manager.bytes_to_user_frames(Direction::Input, 21), Ok(10));
        assert_eq!(
            fx.manager.output_frame_count(),
            Err(AudioError::CardNotReady)
        );
    }

    #[test]
    fn policy_defaults_follow_direction() {
        let fx = fixture();
        assert_eq!(fx.manager.stream_policy(Direction::Output), Ok(StreamPolicy::Media));
        assert_eq!(fx.manager.stream_policy(Direction::Input), Ok(StreamPolicy::VoiceRecord));
        fx.manager
            .set_stream_policy(Direction::Output, StreamPolicy::Voip)
            .unwrap();
        assert_eq!(fx.manager.stream_policy(Direction::Output), Ok(StreamPolicy::Voip));
        assert_eq!(
            fx.manager.set_stream_policy(Direction::Output, StreamPolicy::Invalid),
            Err(AudioError::InvalidParam)
        );
    }

    #[test]
    fn capability_failure_leaves_card_idle() {
        let fx = fixture();
        fx.driver
            .inject_fault(FaultPoint::Query, DriverError::Io("gone".into()));
        let stream = StreamInfo::new(3, StreamPolicy::Media);
        assert_eq!(
            fx.manager.set_stream_out(2, 48_000, PcmFormat::S16Le, stream),
            Err(AudioError::DeviceFail)
        );
        assert_eq!(fx.manager.card_status(Direction::Output), Ok(CardStatus::Idle));
        assert_eq!(fx.driver.open_streams(DeviceNode::new(0, 0, Direction::Output)), 0);
    }
}
