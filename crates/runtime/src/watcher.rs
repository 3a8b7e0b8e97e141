//! Session activation watcher.
//!
//! Owns the state between "transport connected" and "session usable":
//!
//! ```text
//! Connecting ──► AwaitingNegotiation ──► Active   (Negotiated)
//!     ▲                  │          └──► Failed   (NegotiationFailed / timeout)
//!     └─── Retrying ◄────┘ (RetryWithDowngrade, same promise)
//! ```
//!
//! Everything here runs on the connection's home loop. The readiness check,
//! arming the timeout and registering the observer happen in one loop task,
//! so no event of the connection can slip in between them. Signal-driven
//! resolutions cancel the timeout first, and the timeout only closes the
//! connection if its own failure won the promise.

use std::sync::Arc;

use tracing::debug;

use crate::connection::{Connection, ConnectionEvent, EventObserver, Flow};
use crate::error::{Error, NegotiationError};
use crate::establisher::ConnectionEstablisher;
use crate::event_loop::TimeoutHandle;
use crate::promise::SessionPromise;

/// Enters `AwaitingNegotiation` for `connection`, on its home loop.
pub(crate) fn watch_session_active(
	establisher: &Arc<ConnectionEstablisher>,
	connection: &Arc<Connection>,
	promise: SessionPromise,
) {
	let home = connection.home();
	if home.in_event_loop() {
		watch_session_active0(establisher, connection, promise);
		return;
	}

	let establisher = Arc::clone(establisher);
	let conn = Arc::clone(connection);
	if !home.execute(move || watch_session_active0(&establisher, &conn, promise)) {
		// Promise dropped with the task; the caller sees ChannelClosed.
		connection.close();
	}
}

fn watch_session_active0(establisher: &Arc<ConnectionEstablisher>, connection: &Arc<Connection>, promise: SessionPromise) {
	debug_assert!(connection.home().in_event_loop());

	if connection.is_session_active() {
		debug!(conn = %connection, promise = promise.id(), "Session already active");
		if !promise.try_succeed(Arc::clone(connection)) {
			connection.close();
		}
		return;
	}

	let timeout = establisher.session_timeout();
	let timeout_handle = {
		let promise = promise.clone();
		let conn = Arc::clone(connection);
		connection.home().schedule(timeout, move || {
			let error = Error::SessionTimeout {
				connection: conn.to_string(),
				timeout_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
			};
			if promise.try_fail(error) {
				debug!(conn = %conn, promise = promise.id(), "Session creation timed out");
				conn.close();
			}
		})
	};

	debug!(conn = %connection, promise = promise.id(), ?timeout, "Awaiting negotiation");
	connection.add_observer(Arc::new(SessionActivationObserver {
		establisher: Arc::clone(establisher),
		promise,
		timeout: timeout_handle,
	}));
}

/// Pipeline observer arbitrating the three negotiation signals against the timeout.
struct SessionActivationObserver {
	establisher: Arc<ConnectionEstablisher>,
	promise: SessionPromise,
	timeout: TimeoutHandle,
}

impl EventObserver for SessionActivationObserver {
	fn on_event(&self, connection: &Arc<Connection>, event: ConnectionEvent) -> Flow {
		match event {
			ConnectionEvent::Negotiated(protocol) => {
				self.timeout.cancel();
				connection.record_negotiated(protocol);
				if self.promise.try_succeed(Arc::clone(connection)) {
					debug!(conn = %connection, %protocol, promise = self.promise.id(), "Session active");
				} else {
					debug!(conn = %connection, promise = self.promise.id(), "Session resolved elsewhere, closing");
					connection.close();
				}
				Flow::Detach
			}
			ConnectionEvent::NegotiationFailed(cause) => {
				self.timeout.cancel();
				debug!(conn = %connection, promise = self.promise.id(), %cause, "Negotiation failed");
				self.promise.try_fail(cause.into());
				connection.close();
				Flow::Detach
			}
			ConnectionEvent::RetryWithDowngrade => {
				self.timeout.cancel();
				connection.close();
				self.retry(connection);
				Flow::Detach
			}
			other => Flow::Forward(other),
		}
	}
}

impl SessionActivationObserver {
	fn retry(&self, connection: &Arc<Connection>) {
		if self.promise.is_done() {
			debug!(conn = %connection, promise = self.promise.id(), "Session already resolved, not retrying");
			return;
		}

		let requested = connection.protocol();
		match requested.downgrade() {
			Some(fallback) => {
				debug!(
					conn = %connection,
					promise = self.promise.id(),
					from = %requested,
					to = %fallback,
					"Upgrade rejected, retrying with downgrade protocol"
				);
				self.establisher
					.connect(connection.endpoint().clone(), fallback, self.promise.clone());
			}
			None => {
				self.promise.try_fail(
					NegotiationError::new(requested, "upgrade rejected and no downgrade protocol exists").into(),
				);
			}
		}
	}
}
