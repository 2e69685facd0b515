use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::error::{FocusError, NotifyError};
use crate::notify::{Completion, Deferred, NotificationWorker, Submitted};
use crate::policy::{FocusTarget, StreamId, StreamInfo};
use crate::request::{FocusChange, FocusChangeListener, FocusGrant, FocusRequest, FocusState};

/// Passive observer told about the previous owner whenever a list's owner
/// changes.
pub type FocusLossCallback = Arc<dyn Fn(StreamInfo) + Send + Sync>;

struct FocusRequester {
    stream: StreamInfo,
    listener: Weak<dyn FocusChangeListener>,
    transient: bool,
    /// Whether the listener was last told it owns focus.
    holding: bool,
}

struct FocusList {
    target: FocusTarget,
    entries: Mutex<Vec<FocusRequester>>,
    /// Held from mutation until the resulting callbacks are queued, so they
    /// reach the worker in mutation order.
    dispatch: Mutex<()>,
    loss_listener: Mutex<Option<FocusLossCallback>>,
}

type Delivery = Box<dyn FnOnce() + Send + 'static>;

impl FocusList {
    fn new(target: FocusTarget) -> Self {
        Self {
            target,
            entries: Mutex::new(Vec::new()),
            dispatch: Mutex::new(()),
            loss_listener: Mutex::new(None),
        }
    }

    fn owner(&self) -> Option<StreamInfo> {
        self.entries.lock().first().map(|entry| entry.stream)
    }

    /// Apply `mutate` and collect the callbacks the change calls for.
    fn mutate<R>(&self, mutate: impl FnOnce(&mut Vec<FocusRequester>) -> R) -> (R, Vec<Delivery>) {
        let mut entries = self.entries.lock();
        let previous_owner = entries.first().map(|entry| entry.stream);
        let result = mutate(&mut entries);
        let mut deliveries = reconcile(&mut entries);

        let owner = entries.first().map(|entry| entry.stream);
        if let Some(previous) = previous_owner {
            if owner.map(|o| o.id) != Some(previous.id) {
                debug!(list = ?self.target, from = %previous.id, to = ?owner.map(|o| o.id), "focus owner changed");
                if let Some(callback) = self.loss_listener.lock().clone() {
                    deliveries.push(Box::new(move || callback(previous)));
                }
            }
        }
        (result, deliveries)
    }
}

/// Bring every entry's believed state in line with the list order: the head
/// holds focus, everybody else does not.
fn reconcile(entries: &mut [FocusRequester]) -> Vec<Delivery> {
    let Some((head, rest)) = entries.split_first_mut() else {
        return Vec::new();
    };
    let mut deliveries = Vec::new();

    if !head.holding {
        head.holding = true;
        let change = if head.transient {
            FocusChange::GainTransient
        } else {
            FocusChange::Gain
        };
        push_delivery(&mut deliveries, &head.listener, head.stream, change);
    }

    for entry in rest.iter_mut().filter(|entry| entry.holding) {
        entry.holding = false;
        let change = if !head.transient {
            FocusChange::Loss
        } else if head.stream.policy.ducks(entry.stream.policy) {
            FocusChange::LossTransientCanDuck
        } else {
            FocusChange::LossTransient
        };
        push_delivery(&mut deliveries, &entry.listener, entry.stream, change);
    }
    deliveries
}

fn push_delivery(
    deliveries: &mut Vec<Delivery>,
    listener: &Weak<dyn FocusChangeListener>,
    stream: StreamInfo,
    change: FocusChange,
) {
    match listener.upgrade() {
        Some(listener) => {
            debug!(stream = %stream.id, ?change, "queueing focus change");
            deliveries.push(Box::new(move || listener.on_focus_change(change)));
        }
        None => debug!(stream = %stream.id, ?change, "focus listener gone, skipping"),
    }
}

/// Arbitrates playback and recording focus between streams.
///
/// Player and recorder lists are locked independently. Listener callbacks
/// run on the shared [`NotificationWorker`]; the thread that caused them
/// waits until they have run, without holding any arbiter lock.
pub struct FocusArbiter {
    player: FocusList,
    recorder: FocusList,
    worker: Arc<NotificationWorker>,
}

impl FocusArbiter {
    pub fn new() -> Result<Self, NotifyError> {
        let worker = NotificationWorker::spawn("cadenza-focus")?;
        Ok(Self::with_worker(Arc::new(worker)))
    }

    pub fn with_worker(worker: Arc<NotificationWorker>) -> Self {
        Self {
            player: FocusList::new(FocusTarget::Player),
            recorder: FocusList::new(FocusTarget::Recorder),
            worker,
        }
    }

    pub fn worker(&self) -> &Arc<NotificationWorker> {
        &self.worker
    }

    pub fn request_focus(&self, request: &FocusRequest) -> Result<FocusGrant, FocusError> {
        self.request(request, false)
    }

    /// Like [`FocusArbiter::request_focus`], but the displaced holder is
    /// told the loss is temporary and regains focus once this request is
    /// abandoned.
    pub fn request_focus_transient(
        &self,
        request: &FocusRequest,
    ) -> Result<FocusGrant, FocusError> {
        self.request(request, true)
    }

    /// Remove the request with the same stream id from whichever list holds
    /// it. Unknown ids are ignored.
    pub fn abandon_focus(&self, request: &FocusRequest) {
        let id = request.id();
        for list in [&self.player, &self.recorder] {
            let pending = {
                let _order = list.dispatch.lock();
                let (removed, deliveries) = list.mutate(|entries| {
                    let before = entries.len();
                    entries.retain(|entry| entry.stream.id != id);
                    before != entries.len()
                });
                if !removed {
                    continue;
                }
                debug!(list = ?list.target, stream = %id, "focus abandoned");
                self.enqueue(deliveries)
            };
            pending.finish();
            return;
        }
        debug!(stream = %id, "abandon for unknown stream ignored");
    }

    pub fn current_player_stream_info(&self) -> Option<StreamInfo> {
        self.player.owner()
    }

    pub fn current_recorder_stream_info(&self) -> Option<StreamInfo> {
        self.recorder.owner()
    }

    pub fn player_focus_state(&self, id: StreamId) -> FocusState {
        focus_state(self.player.owner(), id)
    }

    pub fn recorder_focus_state(&self, id: StreamId) -> FocusState {
        focus_state(self.recorder.owner(), id)
    }

    pub fn register_player_focus_loss_listener(&self, callback: FocusLossCallback) {
        *self.player.loss_listener.lock() = Some(callback);
    }

    pub fn deregister_player_focus_loss_listener(&self) {
        self.player.loss_listener.lock().take();
    }

    pub fn register_recorder_focus_loss_listener(&self, callback: FocusLossCallback) {
        *self.recorder.loss_listener.lock() = Some(callback);
    }

    pub fn deregister_recorder_focus_loss_listener(&self) {
        self.recorder.loss_listener.lock().take();
    }

    fn list(&self, target: FocusTarget) -> &FocusList {
        match target {
            FocusTarget::Player => &self.player,
            FocusTarget::Recorder => &self.recorder,
        }
    }

    fn request(&self, request: &FocusRequest, transient: bool) -> Result<FocusGrant, FocusError> {
        let stream = request.stream_info();
        if !stream.policy.is_valid() {
            return Err(FocusError::InvalidPolicy(stream.policy));
        }
        if !stream.id.is_valid() {
            return Err(FocusError::InvalidStream);
        }
        let listener = request
            .listener()
            .map(Arc::downgrade)
            .ok_or(FocusError::MissingListener)?;

        let list = self.list(stream.policy.target());
        let (grant, pending) = {
            let _order = list.dispatch.lock();
            let (grant, deliveries) = list.mutate(|entries| {
                entries.retain(|entry| entry.stream.id != stream.id);
                let priority = stream.policy.priority();
                let position = entries
                    .iter()
                    .position(|entry| entry.stream.policy.priority() < priority)
                    .unwrap_or(entries.len());
                entries.insert(
                    position,
                    FocusRequester {
                        stream,
                        listener,
                        transient,
                        // the caller learns about an immediate grant from the return value
                        holding: position == 0,
                    },
                );
                if position == 0 {
                    FocusGrant::Granted
                } else {
                    FocusGrant::Delayed
                }
            });
            debug!(list = ?list.target, stream = %stream.id, policy = ?stream.policy, transient, ?grant, "focus requested");
            (grant, self.enqueue(deliveries))
        };
        pending.finish();
        Ok(grant)
    }

    fn enqueue(&self, deliveries: Vec<Delivery>) -> Pending {
        let mut pending = Pending::default();
        for delivery in deliveries {
            match self.worker.try_submit(delivery) {
                Ok(Submitted::Queued(completion)) => pending.completions.push(completion),
                Ok(Submitted::Deferred(deferred)) => pending.deferred.push(deferred),
                Err(err) => warn!(%err, "dropping focus notification"),
            }
        }
        pending
    }
}

/// Callbacks of one mutation, settled after the list locks are released.
#[derive(Default)]
struct Pending {
    completions: Vec<Completion>,
    /// Left over when the worker's queue was full; they run on this thread.
    deferred: Vec<Deferred>,
}

impl Pending {
    fn finish(self) {
        if !self.deferred.is_empty() {
            debug!(count = self.deferred.len(), "notification queue full, running focus callbacks inline");
        }
        for deferred in self.deferred {
            deferred.run();
        }
        for completion in self.completions {
            if let Err(err) = completion.wait() {
                warn!(%err, "focus notification was not delivered");
            }
        }
    }
}

fn focus_state(owner: Option<StreamInfo>, id: StreamId) -> FocusState {
    match owner {
        Some(owner) if owner.id == id => FocusState::Acquired,
        _ => FocusState::Released,
    }
}
