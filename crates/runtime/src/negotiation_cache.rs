//! Memory of protocols endpoints are known to reject.

use std::sync::{Arc, OnceLock};

use dashmap::DashSet;
use hsc_protocol::{Endpoint, SessionProtocol};
use tracing::debug;

/// Read-only view the connection factory consults before connecting.
///
/// Lookups must not block.
pub trait NegotiationCache: Send + Sync + 'static {
	/// Returns true if `endpoint` is known not to support `protocol`.
	fn is_unsupported(&self, endpoint: &Endpoint, protocol: SessionProtocol) -> bool;
}

/// In-memory negotiation cache.
///
/// The connection factory only reads it; negotiation handlers record
/// failures with [`set_unsupported`](Self::set_unsupported).
#[derive(Debug, Default)]
pub struct SessionProtocolNegotiationCache {
	unsupported: DashSet<(Endpoint, SessionProtocol)>,
}

impl SessionProtocolNegotiationCache {
	pub fn new() -> Self {
		Self::default()
	}

	/// Process-wide instance used when a factory is built without a cache.
	pub fn global() -> Arc<Self> {
		static GLOBAL: OnceLock<Arc<SessionProtocolNegotiationCache>> = OnceLock::new();
		Arc::clone(GLOBAL.get_or_init(|| Arc::new(SessionProtocolNegotiationCache::new())))
	}

	/// Records that `endpoint` rejected `protocol`. Returns false if already known.
	pub fn set_unsupported(&self, endpoint: Endpoint, protocol: SessionProtocol) -> bool {
		let inserted = self.unsupported.insert((endpoint.clone(), protocol));
		if inserted {
			debug!(%endpoint, %protocol, "Recorded unsupported session protocol");
		}
		inserted
	}

	/// Forgets a recorded failure. Returns false if nothing was recorded.
	pub fn remove(&self, endpoint: &Endpoint, protocol: SessionProtocol) -> bool {
		self.unsupported.remove(&(endpoint.clone(), protocol)).is_some()
	}

	pub fn clear(&self) {
		self.unsupported.clear();
	}

	pub fn len(&self) -> usize {
		self.unsupported.len()
	}

	pub fn is_empty(&self) -> bool {
		self.unsupported.is_empty()
	}
}

impl NegotiationCache for SessionProtocolNegotiationCache {
	fn is_unsupported(&self, endpoint: &Endpoint, protocol: SessionProtocol) -> bool {
		self.unsupported.contains(&(endpoint.clone(), protocol))
	}
}
