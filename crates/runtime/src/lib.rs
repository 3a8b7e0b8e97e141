//! hsc runtime - session-negotiated connection establishment
//!
//! Given an endpoint and a [`SessionProtocol`], this crate produces a
//! connection whose session protocol has been negotiated:
//!
//! - **Factory**: [`ConnectionFactory::acquire`], the entry point
//! - **Negotiation cache**: fail fast for protocols an endpoint rejected before
//! - **Templates**: one cached [`ConnectionTemplate`] per protocol
//! - **Establisher**: transport connect and hand-off to the watcher
//! - **Activation watcher**: arbitrates negotiation signals against a timeout,
//!   and retries with the downgrade protocol on the same pending session
//! - **Event loops**: every connection's negotiation state lives on one
//!   [`EventLoop`]
//!
//! # Architecture
//!
//! ```text
//! acquire(endpoint, protocol)
//!     │ cache says unsupported ──► PendingSession (failed)
//!     ▼
//! ConnectionEstablisher::connect ──► Transport::connect
//!     │ connected
//!     ▼
//! home EventLoop: watcher ◄── ConnectionEvent ◄── NegotiationHandler
//!     │                              (Negotiated / NegotiationFailed /
//!     ▼                               RetryWithDowngrade)
//! SessionPromise resolved ──► PendingSession yields Arc<Connection>
//! ```

pub mod connection;
pub mod error;
pub mod establisher;
pub mod event_loop;
pub mod factory;
pub mod handler;
pub mod negotiation_cache;
pub mod options;
pub mod promise;
pub mod template;
pub mod transport;
mod watcher;

#[cfg(test)]
mod test_support;

// Re-export key types at crate root
pub use connection::{Connection, ConnectionEvent, EventObserver, Flow, ObserverId};
pub use error::{Error, NegotiationError, Result};
pub use establisher::ConnectionEstablisher;
pub use event_loop::{EventLoop, EventLoopGroup, TimeoutHandle};
pub use factory::{ConnectionFactory, ConnectionFactoryBuilder};
pub use handler::PriorKnowledgeHandler;
pub use hsc_protocol::{Endpoint, SessionProtocol};
pub use negotiation_cache::{NegotiationCache, SessionProtocolNegotiationCache};
pub use options::{ClientOptions, TransportOptions};
pub use promise::{PendingSession, SessionPromise};
pub use template::{ConnectionTemplate, NegotiationHandler, TemplateRegistry};
pub use transport::{AsyncIo, BoxedIo, TcpTransport, Transport};
