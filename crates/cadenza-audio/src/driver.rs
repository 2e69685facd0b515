//! Seam between the manager and the PCM driver.
//!
//! Hardware access goes through [`AudioDriver`]; every opened stream is a
//! [`PcmStream`] that closes when dropped. [`crate::VirtualDriver`] provides
//! an in-memory implementation.

use std::fmt;
use std::path::{Path, PathBuf};

use crossbeam_channel::Sender;

use crate::error::DriverError;
use crate::format::{Direction, PcmFormat};
use crate::process::{ProcessSubtype, ProcessType, SpeechEvent};

/// One PCM device: card, device and direction.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct DeviceNode {
    pub card: usize,
    pub device: usize,
    pub direction: Direction,
}

impl DeviceNode {
    pub const fn new(card: usize, device: usize, direction: Direction) -> Self {
        Self {
            card,
            device,
            direction,
        }
    }

    /// File name under the device directory, e.g. `pcmC0D1p`.
    pub fn name(&self) -> String {
        format!("pcmC{}D{}{}", self.card, self.device, self.direction.suffix())
    }

    pub fn path(&self, device_dir: &Path) -> PathBuf {
        device_dir.join(self.name())
    }

    /// Parse a node name; anything that is not a PCM node yields `None`.
    pub fn parse(name: &str) -> Option<Self> {
        let rest = name.strip_prefix("pcmC")?;
        let (card, rest) = rest.split_once('D')?;
        let direction = match rest.chars().last()? {
            'c' => Direction::Input,
            'p' => Direction::Output,
            _ => return None,
        };
        let device = &rest[..rest.len() - 1];
        Some(Self {
            card: card.parse().ok()?,
            device: device.parse().ok()?,
            direction,
        })
    }
}

impl fmt::Display for DeviceNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name())
    }
}

/// Hardware parameters requested when opening a stream.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PcmConfig {
    pub channels: usize,
    pub rate: u32,
    pub format: PcmFormat,
    pub period_size: usize,
    pub period_count: usize,
}

/// Capability and state queries.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Query {
    /// Largest channel count.
    Channels,
    /// Bit mask over [`crate::format::SUPPORTED_RATES`].
    SampleRates,
    /// Current hardware volume, 0 ..= 100.
    Volume,
    /// Current capture gain, 0 ..= 100.
    Gain,
    Mute,
    KeywordBufferSize,
    KeywordSensitivity,
}

/// Control writes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Control {
    Volume(u8),
    Gain(u8),
    Mute(bool),
    Equalizer(u32),
    ProcessType(ProcessType, ProcessSubtype),
    ProcessStart(ProcessSubtype),
    ProcessStop(ProcessSubtype),
    KeywordSensitivity(u32),
}

/// Platform audio driver.
pub trait AudioDriver: Send + Sync {
    /// Names of the device nodes currently present.
    fn probe(&self) -> Result<Vec<String>, DriverError>;

    fn query(&self, node: DeviceNode, query: Query) -> Result<u32, DriverError>;

    fn control(&self, node: DeviceNode, control: Control) -> Result<(), DriverError>;

    fn open(&self, node: DeviceNode, config: &PcmConfig) -> Result<Box<dyn PcmStream>, DriverError>;

    /// Route speech detector events of `node` into `events`.
    fn register_process(
        &self,
        node: DeviceNode,
        events: Sender<SpeechEvent>,
    ) -> Result<(), DriverError>;

    fn unregister_process(&self, node: DeviceNode) -> Result<(), DriverError>;

    /// Copy the last detected keyword audio into `buf`; returns bytes copied.
    fn keyword_data(&self, node: DeviceNode, buf: &mut [u8]) -> Result<usize, DriverError>;
}

/// An open PCM stream. Frame counts are in the stream's own format.
pub trait PcmStream: Send {
    fn config(&self) -> &PcmConfig;

    /// Hardware ring size in frames.
    fn buffer_frames(&self) -> usize;

    fn write(&mut self, samples: &[i16]) -> Result<usize, DriverError>;

    fn read(&mut self, samples: &mut [i16]) -> Result<usize, DriverError>;

    /// Recover from an xrun.
    fn prepare(&mut self) -> Result<(), DriverError>;

    /// Block until queued frames have played.
    fn drain(&mut self) -> Result<(), DriverError>;

    /// Discard queued frames.
    fn drop_pending(&mut self) -> Result<(), DriverError>;

    fn pause(&mut self) -> Result<(), DriverError>;

    fn resume(&mut self) -> Result<(), DriverError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn node_names_round_trip() {
        let node = DeviceNode::new(1, 2, Direction::Input);
        assert_eq!(node.name(), "pcmC1D2c");
        assert_eq!(DeviceNode::parse("pcmC1D2c"), Some(node));
        assert_eq!(
            DeviceNode::parse("pcmC0D10p"),
            Some(DeviceNode::new(0, 10, Direction::Output))
        );
    }

    #[test]
    fn foreign_nodes_are_ignored() {
        for name in ["controlC0", "pcmC0D0x", "pcmCxD0p", "pcmC0D", "timer"] {
            assert_eq!(DeviceNode::parse(name), None, "{name}");
        }
    }
}
