//! Stream and device management for the Cadenza audio session layer.
//!
//! [`StreamDeviceManager`] owns the capture and playback cards found by an
//! [`AudioDriver`]. It converts user streams to the card format, shares a
//! playback card between two streams with ducking, and keeps per-policy
//! volume and mute in a JSON metadata file. [`VirtualDriver`] stands in for
//! real hardware in tests and headless builds.

pub mod card;
pub mod config;
pub mod driver;
pub mod error;
pub mod format;
pub mod manager;
pub mod metadata;
pub mod process;
pub mod resample;
pub mod virtual_driver;
pub mod volume;

pub use card::CardStatus;
pub use config::ManagerConfig;
pub use driver::{AudioDriver, Control, DeviceNode, PcmConfig, PcmStream, Query};
pub use error::{result_code, AudioError, AudioResult, DriverError, MetadataError};
pub use format::{closest_sample_rate, Direction, PcmFormat, StreamFormat, SUPPORTED_RATES};
pub use manager::{MuteChangeCallback, StreamDeviceManager, CAPTURE_STREAM};
pub use metadata::{MetadataStore, PersistedAudioState};
pub use process::{ProcessSubtype, ProcessType, SpeechEvent};
pub use resample::ResampleContext;
pub use virtual_driver::{FaultPoint, VirtualDevice, VirtualDriver};
pub use volume::MAX_VOLUME_LEVEL;

pub use cadenza_focus::{StreamId, StreamInfo, StreamPolicy};
