//! Connection factory, the public entry point.
//!
//! [`ConnectionFactory::acquire`] turns `(endpoint, protocol)` into a
//! [`PendingSession`]:
//!
//! 1. If the negotiation cache knows the endpoint rejects the protocol, the
//!    session fails immediately and nothing is connected.
//! 2. Otherwise a connection attempt is started and the pending session is
//!    returned without waiting for it.
//!
//! # Example
//!
//! ```ignore
//! let factory = ConnectionFactory::builder(Arc::new(PriorKnowledgeHandler))
//!     .options(ClientOptions::new().connect_timeout_millis(1000))
//!     .build()?;
//! let connection = factory
//!     .acquire(Endpoint::new("127.0.0.1", 8080), SessionProtocol::H1c)
//!     .await?;
//! let io = connection.take_io();
//! ```

use std::sync::Arc;

use hsc_protocol::{Endpoint, SessionProtocol};
use tracing::debug;

use crate::connection::Connection;
use crate::error::{Error, Result};
use crate::establisher::ConnectionEstablisher;
use crate::event_loop::EventLoopGroup;
use crate::negotiation_cache::{NegotiationCache, SessionProtocolNegotiationCache};
use crate::options::ClientOptions;
use crate::promise::{PendingSession, SessionPromise};
use crate::template::{NegotiationHandler, TemplateRegistry};
use crate::transport::{TcpTransport, Transport};


/// Produces protocol-negotiated connections.
pub struct ConnectionFactory {
	establisher: Arc<ConnectionEstablisher>,
	cache: Arc<dyn NegotiationCache>,
	options: ClientOptions,
}

impl ConnectionFactory {
	/// Starts building a factory whose connections are negotiated by `handler`.
	pub fn builder(handler: Arc<dyn NegotiationHandler>) -> ConnectionFactoryBuilder {
		ConnectionFactoryBuilder {
			handler,
			options: ClientOptions::default(),
			transport: None,
			cache: None,
		}
	}

	/// Requests a connection to `endpoint` speaking `protocol`.
	///
	/// Never blocks, and may be called from any thread, inside the runtime
	/// the factory was built in or not. The returned session resolves once
	/// negotiation concludes, after at most one transparent downgrade retry
	/// per upgrade-capable protocol.
	pub fn acquire(&self, endpoint: Endpoint, protocol: SessionProtocol) -> PendingSession {
		if self.cache.is_unsupported(&endpoint, protocol) {
			debug!(%endpoint, %protocol, "Protocol previously failed negotiation, failing fast");
			return PendingSession::failed(Error::NegotiationUnsupported {
				endpoint,
				protocol,
				reason: "previously failed negotiation".to_string(),
			});
		}

		let (promise, pending) = SessionPromise::new();
		self.establisher.connect(endpoint, protocol, promise);
		pending
	}

	/// Health check for pooled connections: the session is active and the
	/// connection is open.
	pub fn is_healthy(connection: &Connection) -> bool {
		connection.is_session_active()
	}

	pub fn options(&self) -> &ClientOptions {
		&self.options
	}

	/// The per-protocol template cache.
	pub fn templates(&self) -> &TemplateRegistry {
		self.establisher.registry()
	}
}

/// Builder for [`ConnectionFactory`].
pub struct ConnectionFactoryBuilder {
	handler: Arc<dyn NegotiationHandler>,
	options: ClientOptions,
	transport: Option<Arc<dyn Transport>>,
	cache: Option<Arc<dyn NegotiationCache>>,
}

impl ConnectionFactoryBuilder {
	/// Sets the client options.
	pub fn options(mut self, options: ClientOptions) -> Self {
		self.options = options;
		self
	}

	/// Sets the transport. Defaults to [`TcpTransport`].
	pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
		self.transport = Some(transport);
		self
	}

	/// Sets the negotiation cache. Defaults to
	/// [`SessionProtocolNegotiationCache::global`].
	pub fn cache(mut self, cache: Arc<dyn NegotiationCache>) -> Self {
		self.cache = Some(cache);
		self
	}

	/// Validates the options and starts the event loops.
	///
	/// Must be called inside a tokio runtime.
	pub fn build(self) -> Result<ConnectionFactory> {
		self.options.validate()?;

		let registry = TemplateRegistry::new(self.options.transport_options(), self.handler);
		let transport = self.transport.unwrap_or_else(|| Arc::new(TcpTransport));
		let cache = self
			.cache
			.unwrap_or_else(|| SessionProtocolNegotiationCache::global() as Arc<dyn NegotiationCache>);
		let loops = EventLoopGroup::new(self.options.resolved_event_loops());

		let establisher = Arc::new(ConnectionEstablisher::new(
			registry,
			transport,
			loops,
			self.options.connect_timeout(),
		));

		Ok(ConnectionFactory {
			establisher,
			cache,
			options: self.options,
		})
	}
}
