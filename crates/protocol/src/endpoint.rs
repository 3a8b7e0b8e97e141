//! Remote transport addresses.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Remote `host:port` a connection is opened to.
///
/// Cheap to clone; the host is shared. Serialized as its `host:port` string.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Endpoint {
	host: Arc<str>,
	port: u16,
}

impl Endpoint {
	/// Creates an endpoint. IPv6 literals are given without brackets.
	pub fn new(host: impl AsRef<str>, port: u16) -> Self {
		Self {
			host: Arc::from(host.as_ref()),
			port,
		}
	}

	pub fn host(&self) -> &str {
		&self.host
	}

	pub fn port(&self) -> u16 {
		self.port
	}
}

impl fmt::Display for Endpoint {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		if self.host.contains(':') {
			write!(f, "[{}]:{}", self.host, self.port)
		} else {
			write!(f, "{}:{}", self.host, self.port)
		}
	}
}

/// Error returned when a string is not a valid `host:port`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseEndpointError {
	#[error("missing port in endpoint '{0}'")]
	MissingPort(String),
	#[error("invalid port in endpoint '{0}'")]
	InvalidPort(String),
	#[error("empty host in endpoint '{0}'")]
	EmptyHost(String),
}

impl FromStr for Endpoint {
	type Err = ParseEndpointError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		let (host, port) = if let Some(rest) = s.strip_prefix('[') {
			// [v6]:port
			let (host, tail) = rest
				.split_once(']')
				.ok_or_else(|| ParseEndpointError::MissingPort(s.to_string()))?;
			let port = tail
				.strip_prefix(':')
				.ok_or_else(|| ParseEndpointError::MissingPort(s.to_string()))?;
			(host, port)
		} else {
			s.rsplit_once(':')
				.ok_or_else(|| ParseEndpointError::MissingPort(s.to_string()))?
		};

		if host.is_empty() {
			return Err(ParseEndpointError::EmptyHost(s.to_string()));
		}
		let port = port
			.parse::<u16>()
			.map_err(|_| ParseEndpointError::InvalidPort(s.to_string()))?;

		Ok(Endpoint::new(host, port))
	}
}

impl TryFrom<String> for Endpoint {
	type Error = ParseEndpointError;

	fn try_from(value: String) -> Result<Self, Self::Error> {
		value.parse()
	}
}

impl From<Endpoint> for String {
	fn from(value: Endpoint) -> Self {
		value.to_string()
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_parse_host_and_port() {
		let ep: Endpoint = "example.com:8080".parse().unwrap();
		assert_eq!(ep.host(), "example.com");
		assert_eq!(ep.port(), 8080);
		assert_eq!(ep.to_string(), "example.com:8080");
	}

	#[test]
	fn test_ipv6_is_bracketed() {
		let ep: Endpoint = "[::1]:443".parse().unwrap();
		assert_eq!(ep.host(), "::1");
		assert_eq!(ep.to_string(), "[::1]:443");
		assert_eq!(Endpoint::new("fe80::1", 80).to_string(), "[fe80::1]:80");
	}

	#[test]
	fn test_parse_errors() {
		assert_eq!(
			"example.com".parse::<Endpoint>(),
			Err(ParseEndpointError::MissingPort("example.com".into()))
		);
		assert_eq!(
			"example.com:http".parse::<Endpoint>(),
			Err(ParseEndpointError::InvalidPort("example.com:http".into()))
		);
		assert_eq!(":80".parse::<Endpoint>(), Err(ParseEndpointError::EmptyHost(":80".into())));
		assert!("[::1]".parse::<Endpoint>().is_err());
	}

	#[test]
	fn test_serde_as_string() {
		let ep = Endpoint::new("10.0.0.1", 9000);
		assert_eq!(serde_json::to_string(&ep).unwrap(), "\"10.0.0.1:9000\"");
		let back: Endpoint = serde_json::from_str("\"10.0.0.1:9000\"").unwrap();
		assert_eq!(back, ep);
		assert!(serde_json::from_str::<Endpoint>("\"nope\"").is_err());
	}
}
