//! RAII wrapper guaranteeing a provider connection is released exactly once.

// self
use crate::{
	_prelude::*,
	auth::{Audience, PrincipalId},
	provider::{Credential, ProviderConnection, ProviderError},
};

/// Owns a [`ProviderConnection`] for the duration of one fetch.
///
/// The connection is closed by [`ScopedConnection::release`] or, if the owner is dropped first
/// (early return, panic unwind, or a cancelled future), by `Drop`. Both paths share the same
/// `Option::take`, so `close` runs once.
pub struct ScopedConnection {
	inner: Option<Box<dyn ProviderConnection>>,
}
impl ScopedConnection {
	/// Takes ownership of an open connection.
	pub fn new(connection: Box<dyn ProviderConnection>) -> Self {
		Self { inner: Some(connection) }
	}

	/// Forwards a credential request to the wrapped connection.
	pub async fn fetch_credential(
		&mut self,
		principal: &PrincipalId,
		audience: &Audience,
	) -> Result<Credential, ProviderError> {
		match self.inner.as_mut() {
			Some(connection) => connection.fetch_credential(principal, audience).await,
			None => Err(ProviderError::transport("connection already released")),
		}
	}

	/// Returns `true` once the connection has been closed.
	pub fn is_released(&self) -> bool {
		self.inner.is_none()
	}

	/// Closes the connection now.
	pub fn release(mut self) {
		self.close_once();
	}

	fn close_once(&mut self) {
		if let Some(mut connection) = self.inner.take() {
			connection.close();
		}
	}
}
impl Drop for ScopedConnection {
	fn drop(&mut self) {
		self.close_once();
	}
}
impl Debug for ScopedConnection {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("ScopedConnection").field("released", &self.is_released()).finish()
	}
}

#[cfg(test)]
mod tests {
	// std
	use std::sync::atomic::{AtomicUsize, Ordering};
	// self
	use super::*;
	use crate::provider::FetchFuture;

	struct Counted(Arc<AtomicUsize>);
	impl ProviderConnection for Counted {
		fn fetch_credential<'a>(
			&'a mut self,
			_principal: &'a PrincipalId,
			_audience: &'a Audience,
		) -> FetchFuture<'a> {
			Box::pin(async { Err(ProviderError::rejected("unused")) })
		}

		fn close(&mut self) {
			self.0.fetch_add(1, Ordering::SeqCst);
		}
	}

	#[test]
	fn release_then_drop_closes_once() {
		let closes = Arc::new(AtomicUsize::new(0));
		let scoped = ScopedConnection::new(Box::new(Counted(closes.clone())));

		assert!(!scoped.is_released());

		scoped.release();

		assert_eq!(closes.load(Ordering::SeqCst), 1);
	}

	#[test]
	fn drop_alone_closes_once() {
		let closes = Arc::new(AtomicUsize::new(0));

		drop(ScopedConnection::new(Box::new(Counted(closes.clone()))));

		assert_eq!(closes.load(Ordering::SeqCst), 1);
	}
}
