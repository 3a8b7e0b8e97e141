//! Shared value types for the hsc connection layer.
//!
//! This crate holds the pure data that both the connection runtime and its
//! callers (pools, clients) need to agree on:
//!
//! - [`SessionProtocol`] - the closed set of application-layer protocols a
//!   connection may be asked to speak, including upgrade/downgrade pairs
//! - [`Endpoint`] - the remote `host:port` a connection is opened to
//!
//! Types here carry no runtime behavior beyond parsing, formatting and
//! serde support.

pub mod endpoint;
pub mod session_protocol;

pub use endpoint::{Endpoint, ParseEndpointError};
pub use session_protocol::{ParseSessionProtocolError, SessionProtocol};
