//! Live connections and their event pipeline.
//!
//! A [`Connection`] is created once its transport is connected and stays
//! bound to one [`EventLoop`] (its home loop). Negotiation handlers report
//! progress by firing [`ConnectionEvent`]s on it; events always travel
//! through the pipeline on the home loop:
//!
//! 1. Each registered [`EventObserver`] sees the event in registration order
//!    and either consumes it or forwards it (possibly replaced).
//! 2. Events nobody consumed reach the tail, a broadcast channel anyone can
//!    [`subscribe`](Connection::subscribe) to.
//!
//! The negotiated protocol is recorded before the `Negotiated` event is
//! queued, so [`Connection::is_session_active`] already answers true for a
//! session whose event is still in flight.

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};

use hsc_protocol::{Endpoint, SessionProtocol};
use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::{Notify, broadcast};
use tracing::{debug, trace, warn};

use crate::error::NegotiationError;
use crate::event_loop::EventLoop;
use crate::template::ConnectionTemplate;
use crate::transport::BoxedIo;


static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

/// Out-of-band signal fired on a connection.
#[derive(Debug, Clone, PartialEq)]
pub enum ConnectionEvent {
	/// Negotiation concluded; the session speaks this protocol.
	Negotiated(SessionProtocol),
	/// Negotiation failed and the connection is unusable.
	NegotiationFailed(NegotiationError),
	/// The upgrade attempt was rejected; abandon this connection and retry
	/// with the requested protocol's downgrade variant.
	RetryWithDowngrade,
	/// Any other handler-defined event.
	Custom { name: Arc<str>, payload: Value },
}

impl ConnectionEvent {
	/// Creates a handler-defined event.
	pub fn custom(name: &str, payload: Value) -> Self {
		ConnectionEvent::Custom {
			name: Arc::from(name),
			payload,
		}
	}
}

/// Decision an [`EventObserver`] returns for an event.
#[derive(Debug)]
pub enum Flow {
	/// Pass this event on to the next observer.
	Forward(ConnectionEvent),
	/// Stop propagation.
	Consumed,
	/// Stop propagation and unregister the observer.
	Detach,
}

/// Interposed filter in a connection's event pipeline.
///
/// Always invoked on the connection's home loop.
pub trait EventObserver: Send + Sync + 'static {
	fn on_event(&self, connection: &Arc<Connection>, event: ConnectionEvent) -> Flow;
}

/// Handle identifying a registered observer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObserverId(u64);

/// A transport connection negotiating (or running) a session.
pub struct Connection {
	id: u64,
	endpoint: Endpoint,
	template: Arc<ConnectionTemplate>,
	home: EventLoop,
	negotiated: OnceLock<SessionProtocol>,
	closed: AtomicBool,
	close_notify: Notify,
	io: Mutex<Option<BoxedIo>>,
	// Touched only on the home loop; the lock is never contended.
	observers: Mutex<Vec<(ObserverId, Arc<dyn EventObserver>)>>,
	next_observer: AtomicU64,
	tail: broadcast::Sender<ConnectionEvent>,
	#[cfg(test)]
	close_calls: std::sync::atomic::AtomicUsize,
}

impl Connection {
	pub(crate) fn new(endpoint: Endpoint, template: Arc<ConnectionTemplate>, home: EventLoop) -> Arc<Self> {
		let (tail, _) = broadcast::channel(template.options().tail_capacity.max(1));
		Arc::new(Self {
			id: NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed),
			endpoint,
			template,
			home,
			negotiated: OnceLock::new(),
			closed: AtomicBool::new(false),
			close_notify: Notify::new(),
			io: Mutex::new(None),
			observers: Mutex::new(Vec::new()),
			next_observer: AtomicU64::new(1),
			tail,
			#[cfg(test)]
			close_calls: std::sync::atomic::AtomicUsize::new(0),
		})
	}

	/// Process-unique connection identifier.
	pub fn id(&self) -> u64 {
		self.id
	}

	pub fn endpoint(&self) -> &Endpoint {
		&self.endpoint
	}

	/// The protocol this connection was opened for.
	pub fn protocol(&self) -> SessionProtocol {
		self.template.protocol()
	}

	/// The template this connection was built from.
	pub fn template(&self) -> &Arc<ConnectionTemplate> {
		&self.template
	}

	/// The event loop that owns this connection's negotiation state.
	pub fn home(&self) -> &EventLoop {
		&self.home
	}

	/// The protocol concluded by negotiation, once known.
	pub fn negotiated_protocol(&self) -> Option<SessionProtocol> {
		self.negotiated.get().copied()
	}

	/// Returns true if negotiation concluded and the connection is still open.
	pub fn is_session_active(&self) -> bool {
		self.negotiated.get().is_some() && !self.is_closed()
	}

	/// Records the concluded protocol and fires [`ConnectionEvent::Negotiated`].
	///
	/// Called by negotiation handlers. Only the first call has any effect.
	pub fn session_established(self: &Arc<Self>, protocol: SessionProtocol) {
		if !self.record_negotiated(protocol) {
			warn!(conn = %self, %protocol, "Session already established, ignoring");
			return;
		}
		self.fire_event(ConnectionEvent::Negotiated(protocol));
	}

	/// Records the concluded protocol. Returns false if one was already recorded.
	pub(crate) fn record_negotiated(&self, protocol: SessionProtocol) -> bool {
		self.negotiated.set(protocol).is_ok()
	}

	/// Sends `event` through the pipeline on the home loop.
	///
	/// Dispatches inline when already on the home loop, otherwise queues the
	/// dispatch behind any work already posted to the loop.
	pub fn fire_event(self: &Arc<Self>, event: ConnectionEvent) {
		if self.home.in_event_loop() {
			self.dispatch(event);
		} else {
			let this = Arc::clone(self);
			self.home.execute(move || this.dispatch(event));
		}
	}

	fn dispatch(self: &Arc<Self>, event: ConnectionEvent) {
		let observers = self.observers.lock().clone();
		let mut event = event;

		for (id, observer) in observers {
			match observer.on_event(self, event) {
				Flow::Forward(next) => event = next,
				Flow::Consumed => return,
				Flow::Detach => {
					self.remove_observer(id);
					return;
				}
			}
		}

		trace!(conn = %self, ?event, "Event reached pipeline tail");
		// No subscribers is fine.
		let _ = self.tail.send(event);
	}

	/// Appends an observer to the end of the pipeline.
	pub fn add_observer(&self, observer: Arc<dyn EventObserver>) -> ObserverId {
		let id = ObserverId(self.next_observer.fetch_add(1, Ordering::Relaxed));
		self.observers.lock().push((id, observer));
		id
	}

	/// Unregisters an observer. Returns false if it was not registered.
	pub fn remove_observer(&self, id: ObserverId) -> bool {
		let mut observers = self.observers.lock();
		let before = observers.len();
		observers.retain(|(existing, _)| *existing != id);
		observers.len() != before
	}

	pub fn observer_count(&self) -> usize {
		self.observers.lock().len()
	}

	/// Subscribes to events that pass through every observer.
	pub fn subscribe(&self) -> broadcast::Receiver<ConnectionEvent> {
		self.tail.subscribe()
	}

	/// Parks the transport stream on the connection for the session's user.
	///
	/// The stream is dropped right away if the connection is already closed.
	pub fn attach_io(&self, io: BoxedIo) {
		if self.is_closed() {
			return;
		}
		*self.io.lock() = Some(io);
	}

	/// Takes the transport stream parked by the negotiation handler.
	pub fn take_io(&self) -> Option<BoxedIo> {
		self.io.lock().take()
	}

	/// Closes the connection, dropping any parked stream. Idempotent.
	pub fn close(&self) {
		#[cfg(test)]
		self.close_calls.fetch_add(1, Ordering::SeqCst);

		if self.closed.swap(true, Ordering::AcqRel) {
			return;
		}
		debug!(conn = %self, "Closing connection");
		drop(self.io.lock().take());
		self.close_notify.notify_waiters();
	}

	pub fn is_closed(&self) -> bool {
		self.closed.load(Ordering::Acquire)
	}

	/// Waits until the connection is closed.
	pub async fn closed(&self) {
		loop {
			let notified = self.close_notify.notified();
			if self.is_closed() {
				return;
			}
			notified.await;
		}
	}

	#[cfg(test)]
	pub(crate) fn close_calls(&self) -> usize {
		self.close_calls.load(Ordering::SeqCst)
	}
}

impl fmt::Display for Connection {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "conn#{} {} ({})", self.id, self.endpoint, self.protocol())
	}
}

impl fmt::Debug for Connection {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Connection")
			.field("id", &self.id)
			.field("endpoint", &self.endpoint)
			.field("protocol", &self.protocol())
			.field("negotiated", &self.negotiated_protocol())
			.field("closed", &self.is_closed())
			.field("home", &self.home)
			.finish()
	}
}
