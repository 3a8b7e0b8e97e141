//! Transport-level connect.
//!
//! A [`Transport`] turns an [`Endpoint`] into a connected byte stream. It
//! knows nothing about session protocols; the stream is handed to the
//! negotiation handler of the connection's template afterwards.

use std::io;

use futures_util::FutureExt;
use futures_util::future::BoxFuture;
use hsc_protocol::Endpoint;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;

use crate::options::TransportOptions;

#[cfg(test)]
mod tests;

/// Byte stream a connection runs over.
pub trait AsyncIo: AsyncRead + AsyncWrite + Send + Unpin + 'static {}

impl<T> AsyncIo for T where T: AsyncRead + AsyncWrite + Send + Unpin + 'static {}

/// Type-erased connected stream.
pub type BoxedIo = Box<dyn AsyncIo>;

/// Opens transport connections.
pub trait Transport: Send + Sync + 'static {
	/// Connects to `endpoint`. The returned future may already be complete.
	fn connect(&self, endpoint: &Endpoint, options: &TransportOptions) -> BoxFuture<'static, io::Result<BoxedIo>>;
}

/// TCP transport backed by tokio.
#[derive(Debug, Default, Clone, Copy)]
pub struct TcpTransport;

impl Transport for TcpTransport {
	fn connect(&self, endpoint: &Endpoint, options: &TransportOptions) -> BoxFuture<'static, io::Result<BoxedIo>> {
		let host = endpoint.host().to_string();
		let port = endpoint.port();
		let timeout = options.connect_timeout;
		let no_delay = options.tcp_no_delay;

		async move {
			let stream = tokio::time::timeout(timeout, TcpStream::connect((host.as_str(), port)))
				.await
				.map_err(|_| {
					io::Error::new(
						io::ErrorKind::TimedOut,
						format!("connect to {host}:{port} timed out after {}ms", timeout.as_millis()),
					)
				})??;
			stream.set_nodelay(no_delay)?;
			Ok(Box::new(stream) as BoxedIo)
		}
		.boxed()
	}
}
