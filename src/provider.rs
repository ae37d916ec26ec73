//! Identity-provider seam: the traits a workload-identity client implements, the validated
//! endpoint it connects to, the credential it returns, and the scoped connection guard.
//!
//! The coordinator never talks to a wire protocol directly. Implementations of
//! [`IdentityProvider`] open a [`ProviderConnection`] per refresh; the coordinator wraps it in a
//! [`ScopedConnection`] so it is closed exactly once on every exit path, including cancellation
//! by the fetch deadline.

pub mod address;
pub mod connection;
pub mod credential;
#[cfg(feature = "spiffe")] pub mod workload;

pub use address::*;
pub use connection::*;
pub use credential::*;
#[cfg(feature = "spiffe")] pub use workload::*;

// self
use crate::{
	_prelude::*,
	auth::{Audience, PrincipalId},
};

type BoxError = Box<dyn StdError + Send + Sync>;

/// Boxed future returned by [`IdentityProvider::connect`].
pub type ConnectFuture<'a> =
	Pin<Box<dyn Future<Output = Result<Box<dyn ProviderConnection>, ProviderError>> + 'a + Send>>;
/// Boxed future returned by [`ProviderConnection::fetch_credential`].
pub type FetchFuture<'a> =
	Pin<Box<dyn Future<Output = Result<Credential, ProviderError>> + 'a + Send>>;

/// Factory for connections to a workload-identity provider.
///
/// Implementors must be `Send + Sync` so one provider can back many coordinators. Connecting
/// should not retry internally; the coordinator's deadline bounds the whole attempt.
pub trait IdentityProvider: Send + Sync {
	/// Opens a connection to the provider listening at `address`.
	fn connect<'a>(&'a self, address: &'a ProviderAddress) -> ConnectFuture<'a>;
}

/// A live connection to the identity provider; a scoped resource that must be closed.
pub trait ProviderConnection: Send {
	/// Requests a signed credential asserting `principal` for `audience`.
	fn fetch_credential<'a>(
		&'a mut self,
		principal: &'a PrincipalId,
		audience: &'a Audience,
	) -> FetchFuture<'a>;

	/// Releases the connection. Called exactly once by [`ScopedConnection`].
	fn close(&mut self);
}

/// Failure reported by a provider implementation.
#[derive(Debug, ThisError)]
pub enum ProviderError {
	/// Transport-level failure (socket missing, connection reset, stream closed).
	#[error("{message}")]
	Transport {
		/// Human-readable summary.
		message: String,
		/// Underlying transport error, when available.
		#[source]
		source: Option<BoxError>,
	},
	/// Provider answered but declined to issue a credential (e.g. attestation rejected).
	#[error("{message}")]
	Rejected {
		/// Provider-supplied reason.
		message: String,
	},
}
impl ProviderError {
	/// Builds a transport failure without an underlying source.
	pub fn transport(message: impl Into<String>) -> Self {
		Self::Transport { message: message.into(), source: None }
	}

	/// Builds a transport failure wrapping `source`.
	pub fn transport_with(
		message: impl Into<String>,
		source: impl 'static + Send + Sync + StdError,
	) -> Self {
		Self::Transport { message: message.into(), source: Some(Box::new(source)) }
	}

	/// Builds a rejection.
	pub fn rejected(message: impl Into<String>) -> Self {
		Self::Rejected { message: message.into() }
	}

	/// Returns `true` for transport failures.
	pub fn is_transport(&self) -> bool {
		matches!(self, Self::Transport { .. })
	}
}
impl From<CredentialParseError> for ProviderError {
	fn from(e: CredentialParseError) -> Self {
		Self::rejected(format!("provider returned an unusable credential: {e}"))
	}
}
