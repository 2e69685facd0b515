use std::fmt;

/// Identity of a logical stream.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StreamId(pub u32);

impl StreamId {
    pub const INVALID: StreamId = StreamId(0);

    #[inline]
    pub const fn is_valid(self) -> bool {
        self.0 != 0
    }
}

impl fmt::Display for StreamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Stream category driving volume curves, ducking and focus priority.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum StreamPolicy {
    Base,
    Media,
    Notify,
    Bixby,
    VoiceRecord,
    Voip,
    Emergency,
    Invalid,
}

/// Which focus list a policy competes in.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FocusTarget {
    Player,
    Recorder,
}

impl StreamPolicy {
    /// Every policy that can own a stream, in table order.
    pub const VALID: [StreamPolicy; 7] = [
        StreamPolicy::Base,
        StreamPolicy::Media,
        StreamPolicy::Notify,
        StreamPolicy::Bixby,
        StreamPolicy::VoiceRecord,
        StreamPolicy::Voip,
        StreamPolicy::Emergency,
    ];

    pub const COUNT: usize = Self::VALID.len();

    #[inline]
    pub const fn is_valid(self) -> bool {
        !matches!(self, StreamPolicy::Invalid)
    }

    /// Position in [`StreamPolicy::VALID`], used to index per-policy tables.
    pub const fn index(self) -> Option<usize> {
        match self {
            StreamPolicy::Base => Some(0),
            StreamPolicy::Media => Some(1),
            StreamPolicy::Notify => Some(2),
            StreamPolicy::Bixby => Some(3),
            StreamPolicy::VoiceRecord => Some(4),
            StreamPolicy::Voip => Some(5),
            StreamPolicy::Emergency => Some(6),
            StreamPolicy::Invalid => None,
        }
    }

    /// Focus priority; higher wins.
    pub const fn priority(self) -> u8 {
        match self {
            StreamPolicy::Emergency => 7,
            StreamPolicy::VoiceRecord => 6,
            StreamPolicy::Voip => 5,
            StreamPolicy::Bixby => 4,
            StreamPolicy::Notify => 3,
            StreamPolicy::Media => 2,
            StreamPolicy::Base => 1,
            StreamPolicy::Invalid => 0,
        }
    }

    /// Whether a holder of this policy lets `other` keep playing at reduced
    /// gain instead of silencing it.
    pub const fn ducks(self, other: StreamPolicy) -> bool {
        matches!(self, StreamPolicy::Notify | StreamPolicy::Bixby)
            && matches!(other, StreamPolicy::Media | StreamPolicy::Base)
    }

    pub const fn target(self) -> FocusTarget {
        match self {
            StreamPolicy::VoiceRecord => FocusTarget::Recorder,
            _ => FocusTarget::Player,
        }
    }

    /// Key used for this policy in the persisted audio state document.
    pub const fn key(self) -> &'static str {
        match self {
            StreamPolicy::Base => "STREAM_TYPE_BASE",
            StreamPolicy::Media => "STREAM_TYPE_MEDIA",
            StreamPolicy::Notify => "STREAM_TYPE_NOTIFY",
            StreamPolicy::Bixby => "STREAM_TYPE_BIXBY",
            StreamPolicy::VoiceRecord => "STREAM_TYPE_VOICE_RECORD",
            StreamPolicy::Voip => "STREAM_TYPE_VOIP",
            StreamPolicy::Emergency => "STREAM_TYPE_EMERGENCY",
            StreamPolicy::Invalid => "STREAM_TYPE_INVALID",
        }
    }
}

/// A stream's identity together with its policy.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct StreamInfo {
    pub id: StreamId,
    pub policy: StreamPolicy,
}

impl StreamInfo {
    pub const RELEASED: StreamInfo = StreamInfo {
        id: StreamId::INVALID,
        policy: StreamPolicy::Invalid,
    };

    pub const fn new(id: u32, policy: StreamPolicy) -> Self {
        Self {
            id: StreamId(id),
            policy,
        }
    }

    pub const fn is_valid(&self) -> bool {
        self.id.is_valid() && self.policy.is_valid()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn priority_is_a_total_order_over_valid_policies() {
        let mut priorities: Vec<_> = StreamPolicy::VALID.iter().map(|p| p.priority()).collect();
        priorities.sort_unstable();
        priorities.dedup();
        assert_eq!(priorities.len(), StreamPolicy::COUNT);
        assert!(StreamPolicy::Emergency.priority() > StreamPolicy::VoiceRecord.priority());
        assert!(StreamPolicy::VoiceRecord.priority() > StreamPolicy::Voip.priority());
    }

    #[test]
    fn indices_match_table_order() {
        for (idx, policy) in StreamPolicy::VALID.iter().enumerate() {
            assert_eq!(policy.index(), Some(idx));
        }
        assert_eq!(StreamPolicy::Invalid.index(), None);
    }

    #[test]
    fn only_alerts_duck_media() {
        assert!(StreamPolicy::Notify.ducks(StreamPolicy::Media));
        assert!(!StreamPolicy::Emergency.ducks(StreamPolicy::Media));
        assert!(!StreamPolicy::Notify.ducks(StreamPolicy::Voip));
    }
}
