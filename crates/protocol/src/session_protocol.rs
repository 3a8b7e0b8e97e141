//! Application-layer session protocols.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Session protocol requested for, or concluded on, a connection.
///
/// [`Http`](Self::Http) and [`Https`](Self::Https) are upgrade-capable: the
/// client attempts the best HTTP version the server supports and falls back
/// to HTTP/1 when the attempt is rejected. The remaining variants pin a
/// single HTTP version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionProtocol {
	/// Cleartext HTTP, upgraded to HTTP/2 when possible.
	Http,
	/// HTTP over TLS, negotiated to HTTP/2 when possible.
	Https,
	/// HTTP/1 over TLS.
	H1,
	/// HTTP/1 over cleartext.
	H1c,
	/// HTTP/2 over TLS.
	H2,
	/// HTTP/2 over cleartext.
	H2c,
}

impl SessionProtocol {
	/// Every protocol, in declaration order.
	pub const ALL: [SessionProtocol; 6] = [
		SessionProtocol::Http,
		SessionProtocol::Https,
		SessionProtocol::H1,
		SessionProtocol::H1c,
		SessionProtocol::H2,
		SessionProtocol::H2c,
	];

	/// Scheme-style name used in URIs and configuration.
	pub fn uri_text(self) -> &'static str {
		match self {
			SessionProtocol::Http => "http",
			SessionProtocol::Https => "https",
			SessionProtocol::H1 => "h1",
			SessionProtocol::H1c => "h1c",
			SessionProtocol::H2 => "h2",
			SessionProtocol::H2c => "h2c",
		}
	}

	/// Returns true if the protocol runs over TLS.
	pub fn is_tls(self) -> bool {
		matches!(self, SessionProtocol::Https | SessionProtocol::H1 | SessionProtocol::H2)
	}

	/// Returns true if the protocol negotiates its HTTP version after connecting.
	pub fn is_upgrade_capable(self) -> bool {
		self.downgrade().is_some()
	}

	/// The HTTP/1 variant to retry with when an upgrade attempt is rejected.
	///
	/// Returns `None` for protocols that already pin an HTTP version.
	pub fn downgrade(self) -> Option<SessionProtocol> {
		match self {
			SessionProtocol::Http => Some(SessionProtocol::H1c),
			SessionProtocol::Https => Some(SessionProtocol::H1),
			_ => None,
		}
	}

	/// Well-known port for the protocol's transport.
	pub fn default_port(self) -> u16 {
		if self.is_tls() { 443 } else { 80 }
	}
}

impl fmt::Display for SessionProtocol {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.uri_text())
	}
}

/// Error returned when a string names no known session protocol.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown session protocol: '{0}'")]
pub struct ParseSessionProtocolError(pub String);

impl FromStr for SessionProtocol {
	type Err = ParseSessionProtocolError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		let lower = s.trim().to_ascii_lowercase();
		SessionProtocol::ALL
			.into_iter()
			.find(|p| p.uri_text() == lower)
			.ok_or_else(|| ParseSessionProtocolError(s.to_string()))
	}
}
