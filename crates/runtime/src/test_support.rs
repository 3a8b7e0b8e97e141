//! Scripted transport and negotiation handler shared by unit tests.

use std::collections::VecDeque;
use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use futures_util::FutureExt;
use futures_util::future::{self, BoxFuture};
use hsc_protocol::{Endpoint, SessionProtocol};
use parking_lot::Mutex;
use tokio::sync::oneshot;

use crate::connection::{Connection, ConnectionEvent};
use crate::error::NegotiationError;
use crate::event_loop::EventLoop;
use crate::options::TransportOptions;
use crate::template::{ConnectionTemplate, NegotiationHandler};
use crate::transport::{BoxedIo, Transport};

/// Handler that parks the stream and never negotiates.
pub(crate) struct NoopHandler;

impl NegotiationHandler for NoopHandler {
	fn install(&self, _protocol: SessionProtocol, connection: Arc<Connection>, io: BoxedIo) {
		connection.attach_io(io);
	}
}

/// A connection on its own loop, not produced by any factory.
pub(crate) fn detached_connection(protocol: SessionProtocol) -> Arc<Connection> {
	let template = Arc::new(ConnectionTemplate::new(
		protocol,
		TransportOptions::default(),
		Arc::new(NoopHandler),
	));
	Connection::new(Endpoint::new("127.0.0.1", 8080), template, EventLoop::start())
}

/// Runs `f` on `home` and returns its result.
pub(crate) async fn on_loop<T, F>(home: &EventLoop, f: F) -> T
where
	T: Send + 'static,
	F: FnOnce() -> T + Send + 'static,
{
	let (tx, rx) = oneshot::channel();
	home.execute(move || {
		let _ = tx.send(f());
	});
	rx.await.expect("event loop stopped")
}

/// Waits until everything queued on `home` so far has run.
pub(crate) async fn drain(home: &EventLoop) {
	on_loop(home, || ()).await
}

/// Transport handing out in-memory duplex streams.
#[derive(Default)]
pub(crate) struct MockTransport {
	connects: AtomicUsize,
	failures: Mutex<VecDeque<io::ErrorKind>>,
	attempts: Mutex<Vec<Endpoint>>,
	delay: Option<Duration>,
}

impl MockTransport {
	/// Connects complete synchronously.
	pub(crate) fn new() -> Arc<Self> {
		Arc::new(Self::default())
	}

	/// Connects complete after `delay`.
	pub(crate) fn with_delay(delay: Duration) -> Arc<Self> {
		Arc::new(Self {
			delay: Some(delay),
			..Self::default()
		})
	}

	/// Makes the next connect fail with `kind`.
	pub(crate) fn fail_next(&self, kind: io::ErrorKind) {
		self.failures.lock().push_back(kind);
	}

	pub(crate) fn connects(&self) -> usize {
		self.connects.load(Ordering::SeqCst)
	}

	pub(crate) fn attempts(&self) -> Vec<Endpoint> {
		self.attempts.lock().clone()
	}
}

impl Transport for MockTransport {
	fn connect(&self, endpoint: &Endpoint, _options: &TransportOptions) -> BoxFuture<'static, io::Result<BoxedIo>> {
		self.connects.fetch_add(1, Ordering::SeqCst);
		self.attempts.lock().push(endpoint.clone());

		if let Some(kind) = self.failures.lock().pop_front() {
			return future::ready(Err(io::Error::new(kind, "scripted connect failure"))).boxed();
		}

		let delay = self.delay;
		async move {
			if let Some(delay) = delay {
				tokio::time::sleep(delay).await;
			}
			let (client, _server) = tokio::io::duplex(64);
			Ok(Box::new(client) as BoxedIo)
		}
		.boxed()
	}
}

/// What the scripted handler does with the next connection it is installed on.
#[derive(Debug, Clone)]
pub(crate) enum Step {
	/// Establish the session with the requested protocol.
	Negotiate,
	/// Report a negotiation failure.
	Fail(&'static str),
	/// Request a downgrade retry.
	Retry,
	/// Never report anything.
	Silent,
	/// Run the inner step after a delay.
	After(Duration, Box<Step>),
}

impl Step {
	pub(crate) fn after(millis: u64, step: Step) -> Step {
		Step::After(Duration::from_millis(millis), Box::new(step))
	}
}

/// Negotiation handler following a script, one step per installed connection.
/// Connections beyond the script stay silent.
pub(crate) struct ScriptedHandler {
	steps: Mutex<VecDeque<Step>>,
	installed: Mutex<Vec<Arc<Connection>>>,
}

impl ScriptedHandler {
	pub(crate) fn new(steps: impl IntoIterator<Item = Step>) -> Arc<Self> {
		Arc::new(Self {
			steps: Mutex::new(steps.into_iter().collect()),
			installed: Mutex::new(Vec::new()),
		})
	}

	/// Connections the handler was installed on, oldest first.
	pub(crate) fn connections(&self) -> Vec<Arc<Connection>> {
		self.installed.lock().clone()
	}
}

impl NegotiationHandler for ScriptedHandler {
	fn install(&self, protocol: SessionProtocol, connection: Arc<Connection>, io: BoxedIo) {
		connection.attach_io(io);
		self.installed.lock().push(Arc::clone(&connection));
		let step = self.steps.lock().pop_front().unwrap_or(Step::Silent);
		run_step(step, protocol, connection);
	}
}

fn run_step(step: Step, protocol: SessionProtocol, connection: Arc<Connection>) {
	match step {
		Step::Negotiate => connection.session_established(protocol),
		Step::Fail(reason) => connection.fire_event(ConnectionEvent::NegotiationFailed(NegotiationError::new(
			protocol, reason,
		))),
		Step::Retry => connection.fire_event(ConnectionEvent::RetryWithDowngrade),
		Step::Silent => {}
		Step::After(delay, next) => {
			tokio::spawn(async move {
				tokio::time::sleep(delay).await;
				run_step(*next, protocol, connection);
			});
		}
	}
}
