//! Focus arbitration for playback and recording streams.
//!
//! [`FocusArbiter`] keeps one priority-ordered list per direction. The head
//! of a list owns that direction. Listener callbacks never run under the
//! arbiter's locks: they are handed to a [`NotificationWorker`] and the
//! requesting thread waits for them afterwards.

pub mod arbiter;
pub mod error;
pub mod notify;
pub mod policy;
pub mod request;

pub use arbiter::{FocusArbiter, FocusLossCallback};
pub use error::{FocusError, NotifyError};
pub use notify::{Completion, Deferred, NotificationWorker, Submitted};
pub use policy::{FocusTarget, StreamId, StreamInfo, StreamPolicy};
pub use request::{
    FocusChange, FocusChangeListener, FocusGrant, FocusRequest, FocusRequestBuilder, FocusState,
};
