//! In-memory [`AudioDriver`] used by tests, benches and headless builds.
//!
//! Every write and control is recorded, reads return a configurable
//! constant, and faults can be queued per operation to exercise error paths.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use crossbeam_channel::Sender;
use parking_lot::Mutex;

use crate::driver::{AudioDriver, Control, DeviceNode, PcmConfig, PcmStream, Query};
use crate::error::DriverError;
use crate::format::{rate_mask, Direction};
use crate::process::SpeechEvent;

/// Operation a queued fault applies to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FaultPoint {
    Open,
    Write,
    Read,
    Prepare,
    Drain,
    Drop,
    Pause,
    Resume,
    Control,
    Query,
    RegisterProcess,
}

/// Capabilities of one virtual device.
#[derive(Clone, Debug)]
pub struct VirtualDevice {
    pub channels: u32,
    pub rate_mask: u32,
    /// Hardware volume, 0 ..= 100.
    pub volume: u8,
    pub gain: u8,
    pub muted: bool,
    pub buffer_frames: usize,
    pub keyword: Vec<u8>,
    pub keyword_sensitivity: u32,
    /// Whether volume, mute and equalizer controls exist.
    pub controls: bool,
}

impl VirtualDevice {
    pub fn new(channels: u32, rates: &[u32]) -> Self {
        Self {
            channels,
            rate_mask: rate_mask(rates),
            volume: 88,
            gain: 50,
            muted: false,
            buffer_frames: 4096,
            keyword: Vec::new(),
            keyword_sensitivity: 0,
            controls: true,
        }
    }

    pub fn volume(mut self, volume: u8) -> Self {
        self.volume = volume;
        self
    }

    pub fn without_controls(mut self) -> Self {
        self.controls = false;
        self
    }

    pub fn keyword(mut self, data: Vec<u8>) -> Self {
        self.keyword = data;
        self
    }
}

#[derive(Default)]
struct VirtualState {
    devices: HashMap<DeviceNode, VirtualDevice>,
    faults: VecDeque<(FaultPoint, DriverError)>,
    writes: Vec<(DeviceNode, Vec<i16>)>,
    controls: Vec<(DeviceNode, Control)>,
    open: HashMap<DeviceNode, usize>,
    prepares: usize,
    capture_value: i16,
    processes: HashMap<DeviceNode, Sender<SpeechEvent>>,
}

impl VirtualState {
    fn take_fault(&mut self, point: FaultPoint) -> Result<(), DriverError> {
        match self.faults.iter().position(|(p, _)| *p == point) {
            Some(idx) => match self.faults.remove(idx) {
                Some((_, err)) => Err(err),
                None => Ok(()),
            },
            None => Ok(()),
        }
    }

    fn device(&mut self, node: DeviceNode) -> Result<&mut VirtualDevice, DriverError> {
        self.devices.get_mut(&node).ok_or(DriverError::NotFound)
    }
}

/// Shared handle; clones observe the same devices and logs.
#[derive(Clone, Default)]
pub struct VirtualDriver {
    state: Arc<Mutex<VirtualState>>,
}

impl VirtualDriver {
    pub fn new() -> Self {
        Self::default()
    }

    /// One stereo playback device and one stereo capture device on card 0.
    pub fn standard() -> Self {
        Self::new()
            .with_device(
                DeviceNode::new(0, 0, Direction::Output),
                VirtualDevice::new(2, &[16_000, 44_100, 48_000]),
            )
            .with_device(
                DeviceNode::new(0, 0, Direction::Input),
                VirtualDevice::new(2, &[16_000]),
            )
    }

    pub fn with_device(self, node: DeviceNode, device: VirtualDevice) -> Self {
        self.state.lock().devices.insert(node, device);
        self
    }

    pub fn remove_device(&self, node: DeviceNode) {
        self.state.lock().devices.remove(&node);
    }

    /// Fail the next `point` operation with `err`.
    pub fn inject_fault(&self, point: FaultPoint, err: DriverError) {
        self.state.lock().faults.push_back((point, err));
    }

    pub fn inject_faults(&self, point: FaultPoint, err: DriverError, times: usize) {
        let mut state = self.state.lock();
        for _ in 0..times {
            state.faults.push_back((point, err.clone()));
        }
    }

    pub fn set_capture_value(&self, value: i16) {
        self.state.lock().capture_value = value;
    }

    /// Every write so far, in order.
    pub fn writes(&self) -> Vec<(DeviceNode, Vec<i16>)> {
        self.state.lock().writes.clone()
    }

    pub fn write_count(&self) -> usize {
        self.state.lock().writes.len()
    }

    pub fn controls(&self, node: DeviceNode) -> Vec<Control> {
        self.state
            .lock()
            .controls
            .iter()
            .filter(|(n, _)| *n == node)
            .map(|(_, c)| *c)
            .collect()
    }

    pub fn hardware_volume(&self, node: DeviceNode) -> Option<u8> {
        self.state.lock().devices.get(&node).map(|dev| dev.volume)
    }

    pub fn is_muted(&self, node: DeviceNode) -> Option<bool> {
        self.state.lock().devices.get(&node).map(|dev| dev.muted)
    }

    pub fn open_streams(&self, node: DeviceNode) -> usize {
        self.state.lock().open.get(&node).copied().unwrap_or(0)
    }

    pub fn prepare_count(&self) -> usize {
        self.state.lock().prepares
    }

    /// Push a detector event to whoever registered `node`.
    pub fn emit_event(&self, node: DeviceNode, event: SpeechEvent) -> bool {
        let sender = self.state.lock().processes.get(&node).cloned();
        match sender {
            Some(tx) => tx.try_send(event).is_ok(),
            None => false,
        }
    }
}

impl AudioDriver for VirtualDriver {
    fn probe(&self) -> Result<Vec<String>, DriverError> {
        let state = self.state.lock();
        let mut names: Vec<String> = state.devices.keys().map(DeviceNode::name).collect();
        names.sort();
        Ok(names)
    }

    fn query(&self, node: DeviceNode, query: Query) -> Result<u32, DriverError> {
        let mut state = self.state.lock();
        state.take_fault(FaultPoint::Query)?;
        let dev = state.device(node)?;
        let value = match query {
            Query::Channels => dev.channels,
            Query::SampleRates => dev.rate_mask,
            Query::Volume if dev.controls => dev.volume as u32,
            Query::Gain if dev.controls => dev.gain as u32,
            Query::Mute if dev.controls => dev.muted as u32,
            Query::KeywordBufferSize => dev.keyword.len() as u32,
            Query::KeywordSensitivity => dev.keyword_sensitivity,
            Query::Volume | Query::Gain | Query::Mute => return Err(DriverError::NotImplemented),
        };
        Ok(value)
    }

    fn control(&self, node: DeviceNode, control: Control) -> Result<(), DriverError> {
        let mut state = self.state.lock();
        state.take_fault(FaultPoint::Control)?;
        let dev = state.device(node)?;
        match control {
            Control::Volume(_) | Control::Gain(_) | Control::Mute(_) | Control::Equalizer(_)
                if !dev.controls =>
            {
                return Err(DriverError::NotImplemented)
            }
            Control::Volume(v) => dev.volume = v,
            Control::Gain(g) => dev.gain = g,
            Control::Mute(m) => dev.muted = m,
            Control::KeywordSensitivity(s) => dev.keyword_sensitivity = s,
            Control::Equalizer(_)
            | Control::ProcessType(..)
            | Control::ProcessStart(_)
            | Control::ProcessStop(_) => {}
        }
        state.controls.push((node, control));
        Ok(())
    }

    fn open(&self, node: DeviceNode, config: &PcmConfig) -> Result<Box<dyn PcmStream>, DriverError> {
        let mut state = self.state.lock();
        state.take_fault(FaultPoint::Open)?;
        let dev = state.device(node)?;
        if config.channels == 0 || config.channels > dev.channels as usize {
            return Err(DriverError::InvalidArgument);
        }
        let buffer_frames = dev.buffer_frames;
        *state.open.entry(node).or_default() += 1;
        Ok(Box::new(VirtualPcm {
            node,
            config: *config,
            buffer_frames,
            state: Arc::clone(&self.state),
        }))
    }

    fn register_process(
        &self,
        node: DeviceNode,
        events: Sender<SpeechEvent>,
    ) -> Result<(), DriverError> {
        let mut state = self.state.lock();
        state.take_fault(FaultPoint::RegisterProcess)?;
        state.device(node)?;
        if state.processes.contains_key(&node) {
            return Err(DriverError::Busy);
        }
        state.processes.insert(node, events);
        Ok(())
    }

    fn unregister_process(&self, node: DeviceNode) -> Result<(), DriverError> {
        self.state
            .lock()
            .processes
            .remove(&node)
            .map(|_| ())
            .ok_or(DriverError::NotFound)
    }

    fn keyword_data(&self, node: DeviceNode, buf: &mut [u8]) -> Result<usize, DriverError> {
        let mut state = self.state.lock();
        let dev = state.device(node)?;
        let len = dev.keyword.len().min(buf.len());
        buf[..len].copy_from_slice(&dev.keyword[..len]);
        Ok(len)
    }
}

struct VirtualPcm {
    node: DeviceNode,
    config: PcmConfig,
    buffer_frames: usize,
    state: Arc<Mutex<VirtualState>>,
}

impl VirtualPcm {
    fn check(&self, point: FaultPoint) -> Result<(), DriverError> {
        self.state.lock().take_fault(point)
    }
}

impl PcmStream for VirtualPcm {
    fn config(&self) -> &PcmConfig {
        &self.config
    }

    fn buffer_frames(&self) -> usize {
        self.buffer_frames
    }

    fn write(&mut self, samples: &[i16]) -> Result<usize, DriverError> {
        let mut state = self.state.lock();
        state.take_fault(FaultPoint::Write)?;
        state.writes.push((self.node, samples.to_vec()));
        Ok(samples.len() / self.config.channels)
    }

    fn read(&mut self, samples: &mut [i16]) -> Result<usize, DriverError> {
        let mut state = self.state.lock();
        state.take_fault(FaultPoint::Read)?;
        samples.fill(state.capture_value);
        Ok(samples.len() / self.config.channels)
    }

    fn prepare(&mut self) -> Result<(), DriverError> {
        let mut state = self.state.lock();
        state.take_fault(FaultPoint::Prepare)?;
        state.prepares += 1;
        Ok(())
    }

    fn drain(&mut self) -> Result<(), DriverError> {
        self.check(FaultPoint::Drain)
    }

    fn drop_pending(&mut self) -> Result<(), DriverError> {
        self.check(FaultPoint::Drop)
    }

    fn pause(&mut self) -> Result<(), DriverError> {
        self.check(FaultPoint::Pause)
    }

    fn resume(&mut self) -> Result<(), DriverError> {
        self.check(FaultPoint::Resume)
    }
}

impl Drop for VirtualPcm {
    fn drop(&mut self) {
        let mut state = self.state.lock();
        if let Some(count) = state.open.get_mut(&self.node) {
            *count = count.saturating_sub(1);
        }
    }
}
