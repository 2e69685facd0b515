use std::sync::Arc;

use crate::policy::{StreamId, StreamInfo, StreamPolicy};

/// Focus transitions delivered to a request's listener.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FocusChange {
    Gain,
    /// Regained by a request that was made transiently.
    GainTransient,
    Loss,
    /// Lost to a transient holder; focus comes back when it abandons.
    LossTransient,
    /// Like [`FocusChange::LossTransient`], but playback may continue ducked.
    LossTransientCanDuck,
}

impl FocusChange {
    pub const fn is_gain(self) -> bool {
        matches!(self, FocusChange::Gain | FocusChange::GainTransient)
    }
}

/// Receives focus transitions for one request.
pub trait FocusChangeListener: Send + Sync {
    fn on_focus_change(&self, change: FocusChange);
}

impl<F> FocusChangeListener for F
where
    F: Fn(FocusChange) + Send + Sync,
{
    fn on_focus_change(&self, change: FocusChange) {
        self(change)
    }
}

/// Outcome of a successful focus request.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FocusGrant {
    /// The request now owns focus.
    Granted,
    /// Queued behind a higher-priority holder; a gain follows later.
    Delayed,
}

impl FocusGrant {
    pub const fn code(self) -> i32 {
        match self {
            FocusGrant::Granted => 0,
            FocusGrant::Delayed => -2,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FocusState {
    Acquired,
    Released,
}

/// A caller's claim on playback or recording focus.
///
/// The caller owns the request; the arbiter keeps only a weak reference to
/// the listener and identifies the request by stream id.
#[derive(Clone)]
pub struct FocusRequest {
    stream: StreamInfo,
    listener: Option<Arc<dyn FocusChangeListener>>,
}

impl FocusRequest {
    pub fn builder() -> FocusRequestBuilder {
        FocusRequestBuilder::default()
    }

    pub fn stream_info(&self) -> StreamInfo {
        self.stream
    }

    pub fn id(&self) -> StreamId {
        self.stream.id
    }

    pub fn policy(&self) -> StreamPolicy {
        self.stream.policy
    }

    pub fn listener(&self) -> Option<&Arc<dyn FocusChangeListener>> {
        self.listener.as_ref()
    }
}

impl std::fmt::Debug for FocusRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FocusRequest")
            .field("stream", &self.stream)
            .field("has_listener", &self.listener.is_some())
            .finish()
    }
}

#[derive(Default)]
pub struct FocusRequestBuilder {
    stream: Option<StreamInfo>,
    listener: Option<Arc<dyn FocusChangeListener>>,
}

impl FocusRequestBuilder {
    pub fn stream_info(mut self, stream: StreamInfo) -> Self {
        self.stream = Some(stream);
        self
    }

    pub fn listener(mut self, listener: Arc<dyn FocusChangeListener>) -> Self {
        self.listener = Some(listener);
        self
    }

    pub fn build(self) -> FocusRequest {
        FocusRequest {
            stream: self.stream.unwrap_or(StreamInfo::RELEASED),
            listener: self.listener,
        }
    }
}
