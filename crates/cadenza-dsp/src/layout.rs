use crate::error::{DspError, Result};

/// Interleaved channel arrangements understood by the rechannel tables.
///
/// Channel order inside a frame follows the usual WAV ordering:
/// fronts first, then centre, LFE and rears where present.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ChannelLayout {
    Mono,
    Stereo,
    /// L, R, LFE
    TwoPointOne,
    /// L, R, C, S
    Surround,
    /// FL, FR, RL, RR
    Quad,
    /// FL, FR, C, RL, RR
    FivePointZero,
    /// FL, FR, C, LFE, RL, RR
    FivePointOne,
}

impl ChannelLayout {
    pub const ALL: [ChannelLayout; 7] = [
        ChannelLayout::Mono,
        ChannelLayout::Stereo,
        ChannelLayout::TwoPointOne,
        ChannelLayout::Surround,
        ChannelLayout::Quad,
        ChannelLayout::FivePointZero,
        ChannelLayout::FivePointOne,
    ];

    /// Largest channel count any layout carries.
    pub const MAX_CHANNELS: usize = 6;

    /// Default layout for a raw channel count. Four channels map to quad;
    /// [`ChannelLayout::Surround`] must be chosen explicitly.
    pub fn from_channels(channels: usize) -> Result<Self> {
        match channels {
            1 => Ok(Self::Mono),
            2 => Ok(Self::Stereo),
            3 => Ok(Self::TwoPointOne),
            4 => Ok(Self::Quad),
            5 => Ok(Self::FivePointZero),
            6 => Ok(Self::FivePointOne),
            other => Err(DspError::UnsupportedChannels(other)),
        }
    }

    #[inline]
    pub const fn channels(self) -> usize {
        match self {
            Self::Mono => 1,
            Self::Stereo => 2,
            Self::TwoPointOne => 3,
            Self::Surround | Self::Quad => 4,
            Self::FivePointZero => 5,
            Self::FivePointOne => 6,
        }
    }

    #[inline]
    pub(crate) const fn center(self) -> Option<usize> {
        match self {
            Self::Surround | Self::FivePointZero | Self::FivePointOne => Some(2),
            _ => None,
        }
    }

    /// Rear pair. Surround has a single rear channel that feeds both sides.
    #[inline]
    pub(crate) const fn rears(self) -> Option<(usize, usize)> {
        match self {
            Self::Surround => Some((3, 3)),
            Self::Quad => Some((2, 3)),
            Self::FivePointZero => Some((3, 4)),
            Self::FivePointOne => Some((4, 5)),
            _ => None,
        }
    }

    #[inline]
    pub const fn has_lfe(self) -> bool {
        matches!(self, Self::TwoPointOne | Self::FivePointOne)
    }
}

impl TryFrom<usize> for ChannelLayout {
    type Error = DspError;

    fn try_from(channels: usize) -> Result<Self> {
        Self::from_channels(channels)
    }
}
