//! Home execution contexts for connections.
//!
//! An [`EventLoop`] is a single tokio task draining a queue of closures. Every
//! connection is bound to one loop for its whole negotiation phase, and all
//! reads and writes of that connection's negotiation state happen inside
//! tasks run by that loop. Work submitted from anywhere else is posted with
//! [`EventLoop::execute`], so per-connection state is never touched by two
//! threads at once.
//!
//! Timers are scheduled with [`EventLoop::schedule`]. The callback runs on the
//! loop, and the returned [`TimeoutHandle`] guarantees that firing and
//! cancellation are mutually exclusive: a handle cancelled on the loop can
//! never fire afterwards.

use std::any::Any;
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, AtomicUsize, Ordering};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::AbortHandle;
use tracing::{debug, error, warn};


type Task = Box<dyn FnOnce() + Send + 'static>;

static NEXT_LOOP_ID: AtomicUsize = AtomicUsize::new(1);

tokio::task_local! {
	static CURRENT_LOOP: usize;
}

/// Handle to a serial executor. Cheap to clone.
#[derive(Clone)]
pub struct EventLoop {
	inner: Arc<LoopInner>,
}

struct LoopInner {
	id: usize,
	tx: mpsc::UnboundedSender<Task>,
}

impl EventLoop {
	/// Starts a new event loop on the current tokio runtime.
	///
	/// # Panics
	///
	/// Panics if called outside of a tokio runtime.
	pub fn start() -> Self {
		let id = NEXT_LOOP_ID.fetch_add(1, Ordering::Relaxed);
		let (tx, rx) = mpsc::unbounded_channel();
		tokio::spawn(CURRENT_LOOP.scope(id, run_loop(id, rx)));
		Self {
			inner: Arc::new(LoopInner { id, tx }),
		}
	}

	/// Process-unique identifier of this loop.
	pub fn id(&self) -> usize {
		self.inner.id
	}

	/// Returns true if the caller is running inside a task of this loop.
	pub fn in_event_loop(&self) -> bool {
		CURRENT_LOOP
			.try_with(|current| *current == self.inner.id)
			.unwrap_or(false)
	}

	/// Queues `task` to run on this loop after all previously queued tasks.
	///
	/// Returns false if the loop has shut down, in which case the task is
	/// dropped without running.
	pub fn execute<F>(&self, task: F) -> bool
	where
		F: FnOnce() + Send + 'static,
	{
		if self.inner.tx.send(Box::new(task)).is_err() {
			warn!(event_loop = self.inner.id, "Event loop is shut down, task dropped");
			return false;
		}
		true
	}

	/// Runs `task` on this loop once `delay` has elapsed, unless the returned
	/// handle is cancelled first.
	pub fn schedule<F>(&self, delay: Duration, task: F) -> TimeoutHandle
	where
		F: FnOnce() + Send + 'static,
	{
		let state = Arc::new(AtomicU8::new(TIMER_PENDING));
		let fire_state = Arc::clone(&state);
		let home = self.clone();

		let sleeper = tokio::spawn(async move {
			tokio::time::sleep(delay).await;
			home.execute(move || {
				if fire_state
					.compare_exchange(TIMER_PENDING, TIMER_FIRED, Ordering::AcqRel, Ordering::Acquire)
					.is_ok()
				{
					task();
				}
			});
		});

		TimeoutHandle {
			state,
			sleeper: sleeper.abort_handle(),
		}
	}
}

impl fmt::Debug for EventLoop {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("EventLoop").field("id", &self.inner.id).finish()
	}
}

async fn run_loop(id: usize, mut rx: mpsc::UnboundedReceiver<Task>) {
	debug!(event_loop = id, "Event loop started");
	while let Some(task) = rx.recv().await {
		if let Err(panic) = std::panic::catch_unwind(AssertUnwindSafe(task)) {
			error!(event_loop = id, "Event loop task panicked: {}", panic_message(&*panic));
		}
	}
	debug!(event_loop = id, "Event loop stopped");
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
	if let Some(s) = panic.downcast_ref::<&'static str>() {
		s
	} else if let Some(s) = panic.downcast_ref::<String>() {
		s
	} else {
		"<non-string panic payload>"
	}
}

const TIMER_PENDING: u8 = 0;
const TIMER_FIRED: u8 = 1;
const TIMER_CANCELLED: u8 = 2;

/// Cancellable task scheduled with [`EventLoop::schedule`].
///
/// Dropping the handle does not cancel the task.
#[derive(Debug)]
pub struct TimeoutHandle {
	state: Arc<AtomicU8>,
	sleeper: AbortHandle,
}

impl TimeoutHandle {
	/// Cancels the task. Returns true if this call prevented it from running,
	/// false if it already ran or was already cancelled.
	pub fn cancel(&self) -> bool {
		let cancelled = self
			.state
			.compare_exchange(TIMER_PENDING, TIMER_CANCELLED, Ordering::AcqRel, Ordering::Acquire)
			.is_ok();
		if cancelled {
			self.sleeper.abort();
		}
		cancelled
	}

	pub fn is_cancelled(&self) -> bool {
		self.state.load(Ordering::Acquire) == TIMER_CANCELLED
	}

	/// Returns true once the task has run or been cancelled.
	pub fn is_done(&self) -> bool {
		self.state.load(Ordering::Acquire) != TIMER_PENDING
	}
}

/// Fixed set of event loops that new connections are assigned to round-robin.
pub struct EventLoopGroup {
	loops: Vec<EventLoop>,
	next: AtomicUsize,
}

impl EventLoopGroup {
	/// Starts `count` loops (at least one) on the current tokio runtime.
	pub fn new(count: usize) -> Self {
		let loops: Vec<EventLoop> = (0..count.max(1)).map(|_| EventLoop::start()).collect();
		debug!(count = loops.len(), "Started event loop group");
		Self {
			loops,
			next: AtomicUsize::new(0),
		}
	}

	/// Picks the loop for the next connection.
	pub fn next(&self) -> EventLoop {
		let idx = self.next.fetch_add(1, Ordering::Relaxed) % self.loops.len();
		self.loops[idx].clone()
	}

	pub fn len(&self) -> usize {
		self.loops.len()
	}

	pub fn is_empty(&self) -> bool {
		self.loops.is_empty()
	}
}
