//! Per-protocol connection templates.
//!
//! A [`ConnectionTemplate`] binds the negotiation handler to one
//! [`SessionProtocol`] on top of a copy of the base [`TransportOptions`].
//! [`TemplateRegistry`] creates each template on first use and hands the same
//! instance to every later connect for that protocol. The key space is the
//! fixed protocol set, so the registry only ever grows and never evicts.

use std::fmt;
use std::sync::Arc;

use dashmap::DashMap;
use hsc_protocol::{Endpoint, SessionProtocol};
use tracing::debug;

use crate::connection::Connection;
use crate::event_loop::EventLoop;
use crate::options::TransportOptions;
use crate::transport::BoxedIo;

/// Performs the post-connect handshake for a connection.
///
/// Installed on every new connection by its template. Implementations take
/// ownership of the stream, run the handshake, and report the outcome on the
/// connection:
///
/// - success: [`Connection::session_established`]
/// - failure: [`ConnectionEvent::NegotiationFailed`](crate::ConnectionEvent::NegotiationFailed)
/// - rejected upgrade: [`ConnectionEvent::RetryWithDowngrade`](crate::ConnectionEvent::RetryWithDowngrade)
///
/// Once the session is usable the stream should be parked with
/// [`Connection::attach_io`] so the caller can take it.
pub trait NegotiationHandler: Send + Sync + 'static {
	fn install(&self, protocol: SessionProtocol, connection: Arc<Connection>, io: BoxedIo);
}

/// Immutable recipe for connections speaking one protocol.
pub struct ConnectionTemplate {
	protocol: SessionProtocol,
	options: TransportOptions,
	handler: Arc<dyn NegotiationHandler>,
}

impl ConnectionTemplate {
	pub fn new(protocol: SessionProtocol, options: TransportOptions, handler: Arc<dyn NegotiationHandler>) -> Self {
		Self {
			protocol,
			options,
			handler,
		}
	}

	pub fn protocol(&self) -> SessionProtocol {
		self.protocol
	}

	pub fn options(&self) -> &TransportOptions {
		&self.options
	}

	/// Creates a connection from this template, bound to `home`.
	pub(crate) fn instantiate(self: &Arc<Self>, endpoint: Endpoint, home: EventLoop) -> Arc<Connection> {
		Connection::new(endpoint, Arc::clone(self), home)
	}

	/// Hands the connected stream to the negotiation handler.
	pub(crate) fn initialize(&self, connection: &Arc<Connection>, io: BoxedIo) {
		self.handler.install(self.protocol, Arc::clone(connection), io);
	}
}

impl fmt::Debug for ConnectionTemplate {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("ConnectionTemplate")
			.field("protocol", &self.protocol)
			.field("options", &self.options)
			.finish_non_exhaustive()
	}
}

/// Lazily built, shared cache of one template per protocol.
pub struct TemplateRegistry {
	base: TransportOptions,
	handler: Arc<dyn NegotiationHandler>,
	templates: DashMap<SessionProtocol, Arc<ConnectionTemplate>>,
	#[cfg(test)]
	pub(crate) created: std::sync::atomic::AtomicUsize,
}

impl TemplateRegistry {
	pub fn new(base: TransportOptions, handler: Arc<dyn NegotiationHandler>) -> Self {
		Self {
			base,
			handler,
			templates: DashMap::new(),
			#[cfg(test)]
			created: std::sync::atomic::AtomicUsize::new(0),
		}
	}

	/// Returns the template for `protocol`, creating it on first request.
	///
	/// Concurrent first requests for the same protocol all receive the one
	/// instance that was inserted.
	pub fn template_for(&self, protocol: SessionProtocol) -> Arc<ConnectionTemplate> {
		if let Some(existing) = self.get(protocol) {
			return existing;
		}

		self.templates
			.entry(protocol)
			.or_insert_with(|| {
				debug!(%protocol, "Creating connection template");
				#[cfg(test)]
				self.created.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
				Arc::new(ConnectionTemplate::new(
					protocol,
					self.base.clone(),
					Arc::clone(&self.handler),
				))
			})
			.value()
			.clone()
	}

	/// Returns the template for `protocol` without creating it.
	pub fn get(&self, protocol: SessionProtocol) -> Option<Arc<ConnectionTemplate>> {
		self.templates.get(&protocol).map(|t| Arc::clone(t.value()))
	}

	/// Number of templates created so far.
	pub fn len(&self) -> usize {
		self.templates.len()
	}

	pub fn is_empty(&self) -> bool {
		self.templates.is_empty()
	}
}

#[cfg(test)]
mod tests {
	use std::sync::atomic::Ordering;
	use std::thread;

	use super::*;
	use crate::test_support::NoopHandler;

	fn registry() -> TemplateRegistry {
		TemplateRegistry::new(TransportOptions::default(), Arc::new(NoopHandler))
	}

	#[test]
	fn test_template_created_once_per_protocol() {
		let registry = registry();
		assert!(registry.get(SessionProtocol::H2c).is_none());

		let first = registry.template_for(SessionProtocol::H2c);
		let second = registry.template_for(SessionProtocol::H2c);
		assert!(Arc::ptr_eq(&first, &second));
		assert_eq!(first.protocol(), SessionProtocol::H2c);

		let other = registry.template_for(SessionProtocol::H1c);
		assert!(!Arc::ptr_eq(&first, &other));
		assert_eq!(registry.len(), 2);
		assert_eq!(registry.created.load(Ordering::SeqCst), 2);
	}

	#[test]
	fn test_templates_copy_base_options() {
		let base = TransportOptions {
			tcp_no_delay: false,
			..TransportOptions::default()
		};
		let registry = TemplateRegistry::new(base.clone(), Arc::new(NoopHandler));
		assert_eq!(registry.template_for(SessionProtocol::Https).options(), &base);
	}

	#[test]
	fn test_concurrent_first_use_builds_one_template() {
		let registry = Arc::new(registry());
		let threads: Vec<_> = (0..16)
			.map(|i| {
				let registry = Arc::clone(&registry);
				thread::spawn(move || {
					let protocol = SessionProtocol::ALL[i % 2];
					(protocol, registry.template_for(protocol))
				})
			})
			.collect();

		let results: Vec<_> = threads.into_iter().map(|t| t.join().unwrap()).collect();
		for (protocol, template) in &results {
			let canonical = registry.get(*protocol).unwrap();
			assert!(Arc::ptr_eq(template, &canonical));
		}
		assert_eq!(registry.len(), 2);
		assert_eq!(registry.created.load(Ordering::SeqCst), 2);
	}
}
