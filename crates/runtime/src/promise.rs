//! Exactly-once session resolution.
//!
//! A session request is split in two halves:
//!
//! - [`SessionPromise`] - the resolving side, cloned into every completion
//!   source (connect failure, timeout, negotiation observer, retry)
//! - [`PendingSession`] - the future handed to the caller
//!
//! Resolution is "try"-style: the first [`SessionPromise::try_succeed`] or
//! [`SessionPromise::try_fail`] wins and returns true, every later attempt is
//! a no-op returning false. Racing sources never panic and never overwrite.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::task::{Context, Poll};

use parking_lot::Mutex;
use tokio::sync::oneshot;
use tracing::{debug, warn};

use crate::connection::Connection;
use crate::error::{Error, Result};

type Outcome = Result<Arc<Connection>>;

static NEXT_PROMISE_ID: AtomicU64 = AtomicU64::new(1);

/// Resolving half of a session request. Cheap to clone; all clones share
/// one resolution.
#[derive(Clone)]
pub struct SessionPromise {
	inner: Arc<PromiseInner>,
}

struct PromiseInner {
	id: u64,
	tx: Mutex<Option<oneshot::Sender<Outcome>>>,
}

impl SessionPromise {
	/// Creates a linked promise/future pair.
	pub fn new() -> (SessionPromise, PendingSession) {
		let id = NEXT_PROMISE_ID.fetch_add(1, Ordering::Relaxed);
		let (tx, rx) = oneshot::channel();
		let promise = SessionPromise {
			inner: Arc::new(PromiseInner {
				id,
				tx: Mutex::new(Some(tx)),
			}),
		};
		(promise, PendingSession { id, rx })
	}

	/// Identifier shared with the linked [`PendingSession`].
	pub fn id(&self) -> u64 {
		self.inner.id
	}

	/// Resolves with `connection` unless already resolved.
	pub fn try_succeed(&self, connection: Arc<Connection>) -> bool {
		self.try_complete(Ok(connection))
	}

	/// Resolves with `error` unless already resolved.
	pub fn try_fail(&self, error: Error) -> bool {
		self.try_complete(Err(error))
	}

	/// Returns true once the promise has been resolved.
	pub fn is_done(&self) -> bool {
		self.inner.tx.lock().is_none()
	}

	/// Returns true if both handles resolve the same request.
	pub fn same_as(&self, other: &SessionPromise) -> bool {
		Arc::ptr_eq(&self.inner, &other.inner)
	}

	fn try_complete(&self, outcome: Outcome) -> bool {
		let Some(tx) = self.inner.tx.lock().take() else {
			return false;
		};

		if let Err(unclaimed) = tx.send(outcome) {
			// The caller dropped its PendingSession; nobody will close this.
			if let Ok(connection) = unclaimed {
				debug!(promise = self.inner.id, conn = %connection, "Session abandoned by caller, closing");
				connection.close();
			}
		}
		true
	}
}

impl Drop for PromiseInner {
	fn drop(&mut self) {
		if self.tx.get_mut().is_some() {
			warn!(promise = self.id, "Session promise dropped without being resolved");
		}
	}
}

impl fmt::Debug for SessionPromise {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("SessionPromise")
			.field("id", &self.inner.id)
			.field("done", &self.is_done())
			.finish()
	}
}

/// Future returned by [`ConnectionFactory::acquire`](crate::ConnectionFactory::acquire).
///
/// Resolves to the negotiated connection, or to the error that ended the
/// attempt. Resolves to [`Error::ChannelClosed`] if every [`SessionPromise`]
/// was dropped unresolved.
#[must_use = "a PendingSession does nothing unless awaited"]
pub struct PendingSession {
	id: u64,
	rx: oneshot::Receiver<Outcome>,
}

impl PendingSession {
	/// Returns a session that has already failed with `error`.
	pub fn failed(error: Error) -> Self {
		let (promise, pending) = SessionPromise::new();
		promise.try_fail(error);
		pending
	}

	/// Identifier shared with the linked [`SessionPromise`].
	pub fn id(&self) -> u64 {
		self.id
	}
}

impl Future for PendingSession {
	type Output = Outcome;

	fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
		Pin::new(&mut self.rx)
			.poll(cx)
			.map(|result| result.map_err(|_| Error::ChannelClosed).and_then(|r| r))
	}
}

impl fmt::Debug for PendingSession {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("PendingSession").field("id", &self.id).finish()
	}
}

#[cfg(test)]
mod tests {
	use futures_util::FutureExt;
	use hsc_protocol::{Endpoint, SessionProtocol};

	use super::*;
	use crate::test_support::detached_connection;

	#[tokio::test]
	async fn test_first_resolution_wins() {
		let (promise, pending) = SessionPromise::new();
		let conn = detached_connection(SessionProtocol::H1c);

		assert!(promise.try_succeed(Arc::clone(&conn)));
		assert!(!promise.try_fail(Error::ChannelClosed));
		assert!(!promise.clone().try_succeed(Arc::clone(&conn)));
		assert!(promise.is_done());

		let resolved = pending.await.unwrap();
		assert!(Arc::ptr_eq(&resolved, &conn));
	}

	#[tokio::test]
	async fn test_failure_then_success_is_noop() {
		let (promise, pending) = SessionPromise::new();
		assert!(promise.try_fail(Error::SessionTimeout {
			connection: "conn#1".into(),
			timeout_ms: 10,
		}));
		assert!(!promise.try_succeed(detached_connection(SessionProtocol::H2c)));

		let err = pending.await.unwrap_err();
		assert!(err.is_timeout());
	}

	#[test]
	fn test_pre_failed_session_is_ready() {
		let pending = PendingSession::failed(Error::NegotiationUnsupported {
			endpoint: Endpoint::new("example.com", 80),
			protocol: SessionProtocol::H2c,
			reason: "previously failed negotiation".into(),
		});
		let err = pending.now_or_never().expect("must be ready").unwrap_err();
		assert!(err.is_negotiation_failure());
	}

	#[tokio::test]
	async fn test_dropped_promise_reports_channel_closed() {
		let (promise, pending) = SessionPromise::new();
		drop(promise);
		assert!(matches!(pending.await, Err(Error::ChannelClosed)));
	}

	#[tokio::test]
	async fn test_abandoned_success_closes_connection() {
		let (promise, pending) = SessionPromise::new();
		drop(pending);
		let conn = detached_connection(SessionProtocol::H1c);

		assert!(promise.try_succeed(Arc::clone(&conn)));
		assert!(conn.is_closed());
	}

	#[test]
	fn test_clones_share_identity() {
		let (promise, pending) = SessionPromise::new();
		let clone = promise.clone();
		let (other, _other_pending) = SessionPromise::new();

		assert!(promise.same_as(&clone));
		assert!(!promise.same_as(&other));
		assert_eq!(clone.id(), pending.id());
		assert_ne!(other.id(), pending.id());
	}
}
