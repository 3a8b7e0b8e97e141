//! Negotiation handler for protocols that need no handshake.

use std::sync::Arc;

use hsc_protocol::SessionProtocol;
use tracing::debug;

use crate::connection::{Connection, ConnectionEvent};
use crate::template::NegotiationHandler;
use crate::transport::BoxedIo;

/// Activates sessions that pin an HTTP version with prior knowledge.
///
/// The session is established synchronously during installation, so the
/// activation watcher takes its fast path. Upgrade-capable protocols cannot
/// be negotiated without a codec, so they request a downgrade retry.
#[derive(Debug, Default, Clone, Copy)]
pub struct PriorKnowledgeHandler;

impl NegotiationHandler for PriorKnowledgeHandler {
	fn install(&self, protocol: SessionProtocol, connection: Arc<Connection>, io: BoxedIo) {
		if protocol.is_upgrade_capable() {
			debug!(conn = %connection, "No upgrade codec, requesting downgrade");
			connection.fire_event(ConnectionEvent::RetryWithDowngrade);
			return;
		}

		connection.attach_io(io);
		connection.session_established(protocol);
	}
}
