//! Volume curves mapping user levels to hardware percentages.

use cadenza_focus::StreamPolicy;

pub const MAX_VOLUME_LEVEL: u8 = 15;

/// Gain of a stream that is not being ducked.
pub const DEFAULT_MIXER_GAIN: f32 = 1.0;

type Curve = [u8; MAX_VOLUME_LEVEL as usize + 1];

const ALERT_CURVE: Curve = [0, 66, 69, 72, 75, 78, 81, 84, 86, 88, 90, 92, 94, 96, 98, 100];
const MEDIA_CURVE: Curve = [0, 54, 58, 65, 70, 73, 76, 79, 81, 84, 86, 88, 90, 92, 94, 97];
const VOIP_CURVE: Curve = [0, 54, 64, 69, 74, 79, 83, 88, 88, 88, 88, 88, 88, 88, 88, 88];
const SILENT_CURVE: Curve = [0; MAX_VOLUME_LEVEL as usize + 1];

pub fn curve(policy: StreamPolicy) -> &'static Curve {
    match policy {
        StreamPolicy::Media => &MEDIA_CURVE,
        StreamPolicy::Voip => &VOIP_CURVE,
        StreamPolicy::VoiceRecord | StreamPolicy::Invalid => &SILENT_CURVE,
        StreamPolicy::Base | StreamPolicy::Notify | StreamPolicy::Bixby | StreamPolicy::Emergency => {
            &ALERT_CURVE
        }
    }
}

/// Hardware percentage for `level` under `policy`.
pub fn hardware_volume(policy: StreamPolicy, level: u8) -> u8 {
    curve(policy)[level.min(MAX_VOLUME_LEVEL) as usize]
}

/// Highest level whose hardware value does not exceed `value`.
pub fn level_from_hardware(policy: StreamPolicy, value: u8) -> u8 {
    curve(policy)
        .iter()
        .rposition(|&v| v <= value)
        .unwrap_or(0) as u8
}

/// Capture gain percentage for an input level.
pub fn input_gain(level: u8) -> u8 {
    (level.min(MAX_VOLUME_LEVEL) as u32 * 100 / MAX_VOLUME_LEVEL as u32) as u8
}
