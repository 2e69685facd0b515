use std::panic::{self, AssertUnwindSafe};
use std::thread::{self, JoinHandle, ThreadId};

use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};

use crate::error::NotifyError;

/// Queue depth of the worker before submitters block.
pub const DEFAULT_QUEUE_DEPTH: usize = 64;

type Task = Box<dyn FnOnce() + Send + 'static>;

enum WorkerCommand {
    Run { task: Task, done: Sender<()> },
    Shutdown,
}

impl WorkerCommand {
    fn execute(self) {
        if let WorkerCommand::Run { task, done } = self {
            run_guarded(task);
            let _ = done.send(());
        }
    }
}

/// Background thread that runs listener callbacks away from the locks of
/// whoever triggered them.
pub struct NotificationWorker {
    commands: Sender<WorkerCommand>,
    handle: Option<JoinHandle<()>>,
    thread_id: ThreadId,
}

impl NotificationWorker {
    pub fn spawn(name: &str) -> Result<Self, NotifyError> {
        Self::with_capacity(name, DEFAULT_QUEUE_DEPTH)
    }

    pub fn with_capacity(name: &str, capacity: usize) -> Result<Self, NotifyError> {
        let (tx, rx) = bounded(capacity.max(1));
        let handle = thread::Builder::new()
            .name(name.into())
            .spawn(move || notification_worker(rx))?;
        let thread_id = handle.thread().id();
        Ok(Self {
            commands: tx,
            handle: Some(handle),
            thread_id,
        })
    }

    pub fn is_worker_thread(&self) -> bool {
        thread::current().id() == self.thread_id
    }

    /// Queue `task` and return a handle that resolves once it has run.
    ///
    /// Submissions made from the worker thread itself are queued behind the
    /// running task and their handle resolves immediately; waiting there
    /// would never finish. If that queue is full the task runs inline.
    pub fn submit<F>(&self, task: F) -> Result<Completion, NotifyError>
    where
        F: FnOnce() + Send + 'static,
    {
        match self.try_submit(task)? {
            Submitted::Queued(completion) => Ok(completion),
            Submitted::Deferred(deferred) => {
                tracing::debug!("notification queue full, running nested callback inline");
                deferred.run();
                Ok(Completion::ready())
            }
        }
    }

    /// Like [`NotificationWorker::submit`], except that a full queue on the
    /// worker thread hands the task back instead of running it. Callers
    /// holding locks the task may need run it once those are released.
    pub fn try_submit<F>(&self, task: F) -> Result<Submitted, NotifyError>
    where
        F: FnOnce() + Send + 'static,
    {
        let (done_tx, done_rx) = bounded(1);
        let command = WorkerCommand::Run {
            task: Box::new(task),
            done: done_tx,
        };

        if self.is_worker_thread() {
            return match self.commands.try_send(command) {
                Ok(()) => Ok(Submitted::Queued(Completion::ready())),
                Err(TrySendError::Full(command)) => Ok(Submitted::Deferred(Deferred(command))),
                Err(TrySendError::Disconnected(_)) => Err(NotifyError::WorkerExited),
            };
        }

        self.commands
            .send(command)
            .map_err(|_| NotifyError::WorkerExited)?;
        Ok(Submitted::Queued(Completion {
            receiver: Some(done_rx),
        }))
    }

    pub fn submit_and_wait<F>(&self, task: F) -> Result<(), NotifyError>
    where
        F: FnOnce() + Send + 'static,
    {
        self.submit(task)?.wait()
    }
}

impl Drop for NotificationWorker {
    fn drop(&mut self) {
        let _ = self.commands.send(WorkerCommand::Shutdown);
        if let Some(handle) = self.handle.take() {
            // the last owner may be a callback running on the worker itself
            if handle.thread().id() != thread::current().id() {
                let _ = handle.join();
            }
        }
    }
}

fn notification_worker(receiver: Receiver<WorkerCommand>) {
    while let Ok(command) = receiver.recv() {
        match command {
            WorkerCommand::Shutdown => break,
            command => command.execute(),
        }
    }
    tracing::debug!("notification worker stopped");
}

fn run_guarded(task: Task) {
    if panic::catch_unwind(AssertUnwindSafe(task)).is_err() {
        tracing::error!("notification callback panicked");
    }
}

/// Outcome of [`NotificationWorker::try_submit`].
pub enum Submitted {
    Queued(Completion),
    /// The worker's own queue was full.
    Deferred(Deferred),
}

/// A task the worker could not take; it runs on the caller's thread.
#[must_use]
pub struct Deferred(WorkerCommand);

impl Deferred {
    pub fn run(self) {
        self.0.execute();
    }
}

/// Handle for a submitted task.
#[must_use]
pub struct Completion {
    receiver: Option<Receiver<()>>,
}

impl Completion {
    fn ready() -> Self {
        Self { receiver: None }
    }

    /// Block until the task has run.
    pub fn wait(mut self) -> Result<(), NotifyError> {
        match self.receiver.take() {
            None => Ok(()),
            Some(rx) => rx.recv().map_err(|_| NotifyError::WorkerExited),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn submit_and_wait_runs_on_worker_thread() {
        let worker = NotificationWorker::spawn("notify-test").unwrap();
        let caller = thread::current().id();
        let (tx, rx) = bounded(1);
        worker
            .submit_and_wait(move || {
                let _ = tx.send(thread::current().id());
            })
            .unwrap();
        let ran_on = rx.recv().unwrap();
        assert_ne!(ran_on, caller);
    }

    #[test]
    fn tasks_run_in_submission_order() {
        let worker = NotificationWorker::spawn("notify-order").unwrap();
        let seen = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let completions: Vec<_> = (0..10)
            .map(|i| {
                let seen = Arc::clone(&seen);
                worker.submit(move || seen.lock().push(i)).unwrap()
            })
            .collect();
        for completion in completions {
            completion.wait().unwrap();
        }
        assert_eq!(*seen.lock(), (0..10).collect::<Vec<_>>());
    }

    #[test]
    fn nested_submission_does_not_deadlock() {
        let worker = Arc::new(NotificationWorker::spawn("notify-nested").unwrap());
        let counter = Arc::new(AtomicUsize::new(0));
        let (tx, rx) = bounded(1);
        let inner_worker = Arc::clone(&worker);
        let inner_counter = Arc::clone(&counter);
        worker
            .submit_and_wait(move || {
                let counter = Arc::clone(&inner_counter);
                inner_worker
                    .submit_and_wait(move || {
                        counter.fetch_add(1, Ordering::SeqCst);
                        let _ = tx.send(());
                    })
                    .unwrap();
                inner_counter.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap();
        rx.recv().unwrap();
        assert_eq!(counter.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn full_queue_hands_nested_task_back() {
        let worker = Arc::new(NotificationWorker::with_capacity("notify-full", 1).unwrap());
        let counter = Arc::new(AtomicUsize::new(0));
        let inner_worker = Arc::clone(&worker);
        let inner_counter = Arc::clone(&counter);
        let (tx, rx) = bounded(1);
        worker
            .submit_and_wait(move || {
                let queued = inner_worker.try_submit(|| {}).unwrap();
                assert!(matches!(queued, Submitted::Queued(_)));
                let counter = Arc::clone(&inner_counter);
                let deferred = match inner_worker.try_submit(move || {
                    counter.fetch_add(1, Ordering::SeqCst);
                }) {
                    Ok(Submitted::Deferred(deferred)) => deferred,
                    _ => panic!("expected the task back"),
                };
                let before = inner_counter.load(Ordering::SeqCst);
                deferred.run();
                let _ = tx.send((before, inner_counter.load(Ordering::SeqCst)));
            })
            .unwrap();
        assert_eq!(rx.recv().unwrap(), (0, 1));
    }

    #[test]
    fn panicking_task_does_not_kill_worker() {
        let worker = NotificationWorker::spawn("notify-panic").unwrap();
        worker.submit_and_wait(|| panic!("boom")).unwrap();
        let counter = Arc::new(AtomicUsize::new(0));
        let inner = Arc::clone(&counter);
        worker
            .submit_and_wait(move || {
                inner.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap();
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }
}
