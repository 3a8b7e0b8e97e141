//! Error types for session acquisition.

use hsc_protocol::{Endpoint, SessionProtocol};
use thiserror::Error;

/// Result type alias for runtime operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Negotiation failure reported by a negotiation handler.
///
/// Carried by [`ConnectionEvent::NegotiationFailed`](crate::ConnectionEvent::NegotiationFailed)
/// and surfaced to the caller as [`Error::Negotiation`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Session protocol negotiation failed ({protocol}): {reason}")]
pub struct NegotiationError {
	/// Protocol the handler was trying to establish.
	pub protocol: SessionProtocol,
	/// Handler-supplied description of the failure.
	pub reason: String,
}

impl NegotiationError {
	pub fn new(protocol: SessionProtocol, reason: impl Into<String>) -> Self {
		Self {
			protocol,
			reason: reason.into(),
		}
	}
}

/// Errors surfaced through a [`PendingSession`](crate::PendingSession).
#[derive(Debug, Error)]
pub enum Error {
	/// The negotiation cache already knows the endpoint rejects the protocol.
	/// No connection was attempted.
	#[error("Session protocol '{protocol}' is not supported by {endpoint}: {reason}")]
	NegotiationUnsupported {
		endpoint: Endpoint,
		protocol: SessionProtocol,
		reason: String,
	},

	/// The transport-level connect failed.
	#[error("Failed to connect to {endpoint}: {source}")]
	ConnectFailed {
		endpoint: Endpoint,
		#[source]
		source: std::io::Error,
	},

	/// Transport connected but no negotiation outcome arrived in time.
	#[error("Connection established, but session creation timed out after {timeout_ms}ms: {connection}")]
	SessionTimeout { connection: String, timeout_ms: u64 },

	/// The negotiation handler reported failure.
	#[error(transparent)]
	Negotiation(#[from] NegotiationError),

	/// The pending session was abandoned without being resolved, which happens
	/// when the connection's event loop shuts down.
	#[error("Channel closed unexpectedly")]
	ChannelClosed,

	/// Invalid argument or configuration value.
	#[error("Invalid argument: {0}")]
	InvalidArgument(String),

	/// JSON deserialization error.
	#[error("JSON error: {0}")]
	Json(#[from] serde_json::Error),
}

impl Error {
	/// Returns true if this is a session activation timeout, or a transport
	/// connect that timed out.
	pub fn is_timeout(&self) -> bool {
		match self {
			Error::SessionTimeout { .. } => true,
			Error::ConnectFailed { source, .. } => source.kind() == std::io::ErrorKind::TimedOut,
			_ => false,
		}
	}

	/// Returns true if the endpoint rejected (or is known to reject) the protocol.
	pub fn is_negotiation_failure(&self) -> bool {
		matches!(self, Error::Negotiation(_) | Error::NegotiationUnsupported { .. })
	}

	/// Returns true if the transport could not connect.
	pub fn is_connect_failure(&self) -> bool {
		matches!(self, Error::ConnectFailed { .. })
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_connect_failure_keeps_source() {
		use std::error::Error as _;

		let err = Error::ConnectFailed {
			endpoint: Endpoint::new("localhost", 1),
			source: std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "refused"),
		};
		assert!(err.is_connect_failure());
		assert!(!err.is_timeout());
		let source = err.source().unwrap().downcast_ref::<std::io::Error>().unwrap();
		assert_eq!(source.kind(), std::io::ErrorKind::ConnectionRefused);
	}

	#[test]
	fn test_timeout_classification() {
		let session = Error::SessionTimeout {
			connection: "conn#1".into(),
			timeout_ms: 100,
		};
		assert!(session.is_timeout());
		assert!(session.to_string().contains("session creation timed out"));

		let connect = Error::ConnectFailed {
			endpoint: Endpoint::new("localhost", 1),
			source: std::io::Error::new(std::io::ErrorKind::TimedOut, "slow"),
		};
		assert!(connect.is_timeout());
	}

	#[test]
	fn test_negotiation_error_is_transparent() {
		let err: Error = NegotiationError::new(SessionProtocol::H2c, "GOAWAY").into();
		assert!(err.is_negotiation_failure());
		assert_eq!(err.to_string(), "Session protocol negotiation failed (h2c): GOAWAY");
	}
}
