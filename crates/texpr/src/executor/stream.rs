//! Ordered execution streams.
//!
//! A stream runs enqueued work strictly in enqueue order. Inline streams run work on the
//! caller's thread as it is enqueued; spawned streams hand it to a dedicated worker thread and
//! return immediately. Completion is observed through milestones.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::mpsc::{self, Sender};
use std::sync::{Arc, Condvar, Mutex};
use std::thread;

use crate::backend::spec::BackendError;
use crate::error::{ExprError, ExprResult};
use crate::tensor::{Buffer, Element};

type Work = Box<dyn FnOnce() -> ExprResult<()> + Send + 'static>;

/// A position in a stream. It is reached once all work enqueued before it has completed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Milestone(u64);

impl Milestone {
    pub fn position(self) -> u64 {
        self.0
    }
}

#[derive(Default)]
struct ProgressState {
    enqueued: u64,
    completed: u64,
    error: Option<ExprError>,
}

#[derive(Default)]
struct Progress {
    state: Mutex<ProgressState>,
    advanced: Condvar,
}

impl Progress {
    fn lock(&self) -> std::sync::MutexGuard<'_, ProgressState> {
        self.state.lock().expect("stream progress poisoned")
    }

    fn complete(&self, stream: &str, result: ExprResult<()>) {
        let mut state = self.lock();
        if let Err(err) = result {
            tracing::warn!(stream, error = %err, "stream work failed");
            if state.error.is_none() {
                state.error = Some(err);
            }
        }
        state.completed += 1;
        self.advanced.notify_all();
    }
}

enum Mode {
    Inline,
    Worker(Sender<Work>),
}

struct StreamInner {
    name: String,
    mode: Mode,
    progress: Arc<Progress>,
}

/// Cheaply clonable handle to an ordered execution stream.
#[derive(Clone)]
pub struct Stream {
    inner: Arc<StreamInner>,
}

impl std::fmt::Debug for Stream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Stream")
            .field("name", &self.inner.name)
            .field("inline", &self.is_inline())
            .finish()
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "stream work panicked".to_string()
    }
}

fn run(work: Work) -> ExprResult<()> {
    match panic::catch_unwind(AssertUnwindSafe(work)) {
        Ok(result) => result,
        Err(payload) => Err(ExprError::Backend(BackendError::execution(panic_message(payload)))),
    }
}

impl Stream {
    /// A stream that executes work synchronously on the enqueuing thread.
    pub fn inline() -> Self {
        Stream {
            inner: Arc::new(StreamInner {
                name: "inline".to_string(),
                mode: Mode::Inline,
                progress: Arc::new(Progress::default()),
            }),
        }
    }

    /// A stream backed by a dedicated worker thread.
    ///
    /// The worker exits once every handle to the stream has been dropped and the queue drained.
    pub fn spawn(name: impl Into<String>) -> Self {
        let name = name.into();
        let (sender, receiver) = mpsc::channel::<Work>();
        let progress = Arc::new(Progress::default());
        let worker_progress = Arc::clone(&progress);
        let worker_name = name.clone();
        thread::Builder::new()
            .name(format!("texpr-stream-{name}"))
            .spawn(move || {
                for work in receiver {
                    let skip = worker_progress.lock().error.is_some();
                    let result = if skip {
                        drop(work);
                        Ok(())
                    } else {
                        run(work)
                    };
                    worker_progress.complete(&worker_name, result);
                }
            })
            .expect("failed to spawn stream worker thread");
        Stream {
            inner: Arc::new(StreamInner {
                name,
                mode: Mode::Worker(sender),
                progress,
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn is_inline(&self) -> bool {
        matches!(self.inner.mode, Mode::Inline)
    }

    /// Whether two handles refer to the same stream.
    pub fn same(&self, other: &Stream) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Appends work to the stream.
    ///
    /// Inline streams run it immediately and return its result. Worker streams never block on
    /// completion; failures are recorded and reported by [`Stream::synchronize`], and work
    /// enqueued after a failure is skipped until the error has been taken.
    pub fn enqueue<F>(&self, work: F) -> ExprResult<()>
    where
        F: FnOnce() -> ExprResult<()> + Send + 'static,
    {
        match &self.inner.mode {
            Mode::Inline => {
                self.inner.progress.lock().enqueued += 1;
                let result = run(Box::new(work));
                let mut state = self.inner.progress.lock();
                state.completed += 1;
                result
            }
            Mode::Worker(sender) => {
                self.inner.progress.lock().enqueued += 1;
                sender.send(Box::new(work)).map_err(|_| {
                    self.inner.progress.lock().enqueued -= 1;
                    ExprError::Backend(BackendError::execution(format!(
                        "stream {} worker is gone",
                        self.inner.name
                    )))
                })
            }
        }
    }

    /// The position after all work enqueued so far.
    pub fn milestone(&self) -> Milestone {
        Milestone(self.inner.progress.lock().enqueued)
    }

    pub fn reached(&self, milestone: Milestone) -> bool {
        self.inner.progress.lock().completed >= milestone.0
    }

    /// Blocks until `milestone` has been reached.
    pub fn wait_for(&self, milestone: Milestone) {
        let progress = &self.inner.progress;
        let mut state = progress.lock();
        while state.completed < milestone.0 {
            state = progress.advanced.wait(state).expect("stream progress poisoned");
        }
    }

    /// Blocks until the stream is idle, then returns and clears the first recorded error.
    ///
    /// Work enqueued by other work (deferred releases) is waited for as well.
    pub fn synchronize(&self) -> ExprResult<()> {
        let progress = &self.inner.progress;
        let mut state = progress.lock();
        while state.completed < state.enqueued {
            state = progress.advanced.wait(state).expect("stream progress poisoned");
        }
        match state.error.take() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// Keeps `buffer` alive until all work enqueued so far has completed.
    pub fn release_after<T: Element>(&self, buffer: Buffer<T>) {
        if self.is_inline() {
            drop(buffer);
            return;
        }
        tracing::trace!(stream = self.name(), buffer = buffer.id(), "deferring buffer release");
        if let Err(err) = self.enqueue(move || {
            drop(buffer);
            Ok(())
        }) {
            // The worker is gone, so nothing can still be using the buffer.
            tracing::warn!(error = %err, "releasing buffer without stream ordering");
        }
    }
}
