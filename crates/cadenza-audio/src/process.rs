//! Speech detection processing attached to capture devices.

use crossbeam_channel::Receiver;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum ProcessType {
    #[default]
    None,
    SpeechDetector,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum ProcessSubtype {
    #[default]
    None,
    /// End of an utterance.
    EndPointDetect,
    /// Speech onset.
    SpeechDetect,
    KeywordDetect,
    /// Locally recognised command words.
    Local,
    /// Echo cancellation; runs without an event handler.
    Aec,
}

impl ProcessSubtype {
    pub const fn needs_handler(self) -> bool {
        !matches!(self, ProcessSubtype::Aec | ProcessSubtype::None)
    }
}

/// Highest local command index a detector reports.
pub const MAX_LOCAL_COMMAND: u8 = 7;

/// Event raised by a running speech detector.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SpeechEvent {
    EndPointDetected,
    SpeechDetected,
    KeywordDetected,
    LocalCommand(u8),
}

impl SpeechEvent {
    pub const fn subtype(self) -> ProcessSubtype {
        match self {
            SpeechEvent::EndPointDetected => ProcessSubtype::EndPointDetect,
            SpeechEvent::SpeechDetected => ProcessSubtype::SpeechDetect,
            SpeechEvent::KeywordDetected => ProcessSubtype::KeywordDetect,
            SpeechEvent::LocalCommand(_) => ProcessSubtype::Local,
        }
    }
}

/// Per-device processing registration.
#[derive(Debug, Default)]
pub(crate) struct ProcessSlot {
    pub(crate) kind: ProcessType,
    pub(crate) subtype: ProcessSubtype,
    /// Handler registrations sharing `events`.
    pub(crate) refs: usize,
    pub(crate) events: Option<Receiver<SpeechEvent>>,
}

impl ProcessSlot {
    pub(crate) fn has_handler(&self) -> bool {
        self.refs > 0 && self.events.is_some()
    }

    /// Drop a registration; returns `true` once nobody holds the handler.
    pub(crate) fn release(&mut self) -> bool {
        self.refs = self.refs.saturating_sub(1);
        if self.refs == 0 {
            self.events = None;
            self.kind = ProcessType::None;
            self.subtype = ProcessSubtype::None;
            true
        } else {
            false
        }
    }

    /// Discard events queued before a stop.
    pub(crate) fn drain_events(&self) -> usize {
        self.events
            .as_ref()
            .map(|rx| rx.try_iter().count())
            .unwrap_or(0)
    }
}
