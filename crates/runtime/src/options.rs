//! Client configuration.
//!
//! [`ClientOptions`] is the user-facing configuration, deserializable from
//! JSON with camelCase keys. [`TransportOptions`] is the subset copied into
//! every [`ConnectionTemplate`](crate::ConnectionTemplate).

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Default session activation timeout in milliseconds.
pub const DEFAULT_CONNECT_TIMEOUT_MS: u64 = 3200;

/// Default capacity of a connection's forwarded-event channel.
pub const DEFAULT_TAIL_CAPACITY: usize = 16;

/// Options for a [`ConnectionFactory`](crate::ConnectionFactory).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ClientOptions {
	/// Budget for the transport connect and, separately, for session
	/// activation after the transport is connected.
	pub connect_timeout_millis: u64,

	/// Number of event loops connections are spread over. `0` uses the
	/// available parallelism.
	pub event_loops: usize,

	/// Sets `TCP_NODELAY` on new sockets.
	pub tcp_no_delay: bool,

	/// Capacity of each connection's forwarded-event broadcast channel.
	pub tail_capacity: usize,
}

impl Default for ClientOptions {
	fn default() -> Self {
		Self {
			connect_timeout_millis: DEFAULT_CONNECT_TIMEOUT_MS,
			event_loops: 0,
			tcp_no_delay: true,
			tail_capacity: DEFAULT_TAIL_CAPACITY,
		}
	}
}

impl ClientOptions {
	/// Creates new default options.
	pub fn new() -> Self {
		Self::default()
	}

	/// Parses and validates options from JSON. Missing keys take their defaults.
	pub fn from_json(json: &str) -> Result<Self> {
		let options: ClientOptions = serde_json::from_str(json)?;
		options.validate()?;
		Ok(options)
	}

	/// Sets the connect and session activation timeout.
	pub fn connect_timeout_millis(mut self, millis: u64) -> Self {
		self.connect_timeout_millis = millis;
		self
	}

	/// Sets the number of event loops.
	pub fn event_loops(mut self, count: usize) -> Self {
		self.event_loops = count;
		self
	}

	/// Sets `TCP_NODELAY`.
	pub fn tcp_no_delay(mut self, enabled: bool) -> Self {
		self.tcp_no_delay = enabled;
		self
	}

	/// Sets the forwarded-event channel capacity.
	pub fn tail_capacity(mut self, capacity: usize) -> Self {
		self.tail_capacity = capacity;
		self
	}

	/// Returns the connect timeout as a [`Duration`].
	pub fn connect_timeout(&self) -> Duration {
		Duration::from_millis(self.connect_timeout_millis)
	}

	/// Returns the number of event loops to start.
	pub fn resolved_event_loops(&self) -> usize {
		if self.event_loops > 0 {
			return self.event_loops;
		}
		std::thread::available_parallelism()
			.map(|n| n.get())
			.unwrap_or(1)
	}

	/// Rejects values the runtime cannot work with.
	pub fn validate(&self) -> Result<()> {
		if self.connect_timeout_millis == 0 {
			return Err(Error::InvalidArgument(
				"connectTimeoutMillis must be greater than zero".to_string(),
			));
		}
		if self.tail_capacity == 0 {
			return Err(Error::InvalidArgument(
				"tailCapacity must be greater than zero".to_string(),
			));
		}
		Ok(())
	}

	/// Transport settings copied into each connection template.
	pub fn transport_options(&self) -> TransportOptions {
		TransportOptions {
			connect_timeout: self.connect_timeout(),
			tcp_no_delay: self.tcp_no_delay,
			tail_capacity: self.tail_capacity,
		}
	}
}

/// Per-connection transport settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportOptions {
	/// Upper bound for the transport connect.
	pub connect_timeout: Duration,
	/// Sets `TCP_NODELAY` on new sockets.
	pub tcp_no_delay: bool,
	/// Capacity of the forwarded-event channel.
	pub tail_capacity: usize,
}

impl Default for TransportOptions {
	fn default() -> Self {
		ClientOptions::default().transport_options()
	}
}
