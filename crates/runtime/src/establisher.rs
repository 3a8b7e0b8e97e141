//! Transport connect for one `(endpoint, protocol)` attempt.

use std::io;
use std::sync::Arc;
use std::time::Duration;

use futures_util::FutureExt;
use hsc_protocol::{Endpoint, SessionProtocol};
use tokio::runtime::Handle;
use tracing::debug;

use crate::error::Error;
use crate::event_loop::{EventLoop, EventLoopGroup};
use crate::promise::SessionPromise;
use crate::template::{ConnectionTemplate, TemplateRegistry};
use crate::transport::{BoxedIo, Transport};
use crate::watcher;

/// Opens connections from cached templates and hands them to the
/// session activation watcher.
pub struct ConnectionEstablisher {
	registry: TemplateRegistry,
	transport: Arc<dyn Transport>,
	loops: EventLoopGroup,
	session_timeout: Duration,
	runtime: Handle,
}

impl ConnectionEstablisher {
	/// Binds the establisher to the tokio runtime it is created in. Connects
	/// may later be started from any thread.
	///
	/// # Panics
	///
	/// Panics if called outside of a tokio runtime.
	pub fn new(
		registry: TemplateRegistry,
		transport: Arc<dyn Transport>,
		loops: EventLoopGroup,
		session_timeout: Duration,
	) -> Self {
		Self {
			registry,
			transport,
			loops,
			session_timeout,
			runtime: Handle::current(),
		}
	}

	pub fn registry(&self) -> &TemplateRegistry {
		&self.registry
	}

	/// Time allowed between transport connect and session activation.
	pub fn session_timeout(&self) -> Duration {
		self.session_timeout
	}

	/// Starts one connection attempt whose outcome resolves `promise`.
	///
	/// A connect that is already complete when first polled is handled
	/// inline; otherwise completion is handled on a spawned task. Either way
	/// the outcome is handled exactly once. Transport failures fail the
	/// promise without retrying. Safe to call from threads outside the
	/// runtime.
	pub fn connect(self: &Arc<Self>, endpoint: Endpoint, protocol: SessionProtocol, promise: SessionPromise) {
		let _runtime = self.runtime.enter();
		let template = self.registry.template_for(protocol);
		let home = self.loops.next();
		debug!(
			%endpoint,
			%protocol,
			promise = promise.id(),
			event_loop = home.id(),
			"Connecting"
		);

		let mut connect = self.transport.connect(&endpoint, template.options());
		match (&mut connect).now_or_never() {
			Some(result) => self.on_connect_complete(result, endpoint, template, home, promise),
			None => {
				let this = Arc::clone(self);
				self.runtime.spawn(async move {
					let result = connect.await;
					this.on_connect_complete(result, endpoint, template, home, promise);
				});
			}
		}
	}

	fn on_connect_complete(
		self: &Arc<Self>,
		result: io::Result<BoxedIo>,
		endpoint: Endpoint,
		template: Arc<ConnectionTemplate>,
		home: EventLoop,
		promise: SessionPromise,
	) {
		match result {
			Ok(io) => {
				let connection = template.instantiate(endpoint, home);
				debug!(conn = %connection, promise = promise.id(), "Transport connected");
				// The watcher is queued on the home loop before the handler can
				// queue any event there.
				watcher::watch_session_active(self, &connection, promise);
				template.initialize(&connection, io);
			}
			Err(source) => {
				debug!(%endpoint, promise = promise.id(), error = %source, "Transport connect failed");
				if !promise.try_fail(Error::ConnectFailed { endpoint, source }) {
					debug!(promise = promise.id(), "Session already resolved, connect failure dropped");
				}
			}
		}
	}
}
