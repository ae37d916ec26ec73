//! Coordinator-level error types shared across the provider seam, token model, and client bridge.

// self
use crate::{_prelude::*, obs::RefreshPhase};

/// Crate-wide result type alias returning [`Error`] by default.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Canonical refresh error exposed by public APIs.
///
/// [`Error::ProviderUnreachable`] and [`Error::CredentialFetchFailed`] are runtime refresh
/// failures: the coordinator reports them through
/// [`TokenSink::set_token_failure`](crate::sink::TokenSink::set_token_failure) and the host is
/// expected to retry on its own cadence. [`Error::InvalidConfiguration`] is a startup error.
#[derive(Debug, ThisError)]
pub enum Error {
	/// Local configuration problem; fail fast at startup.
	#[error(transparent)]
	InvalidConfiguration(#[from] ConfigError),
	/// Blocking bridge could not start its private runtime.
	#[error("Unable to start the blocking refresh runtime.")]
	Runtime(#[source] std::io::Error),
	/// Blocking bridge was called on a current-thread runtime, where it cannot park the worker.
	#[error("Blocking refresh cannot run on a current-thread async runtime.")]
	BlockingInAsyncContext,

	/// Transport failure or deadline exceeded while contacting the identity provider.
	#[error("Identity provider at {address} is unreachable while {phase}: {reason}.")]
	ProviderUnreachable {
		/// Provider endpoint the coordinator tried to reach.
		address: String,
		/// Phase the refresh was in when it gave up.
		phase: RefreshPhase,
		/// Human-readable failure summary.
		reason: String,
		/// Whether the fetch deadline expired.
		timed_out: bool,
	},
	/// Provider was reachable but declined or failed to issue a credential.
	#[error("Identity provider failed to issue a credential: {reason}.")]
	CredentialFetchFailed {
		/// Provider- or coordinator-supplied reason string.
		reason: String,
	},
}
impl Error {
	/// Returns `true` for failures the host should treat as transient.
	pub fn is_recoverable(&self) -> bool {
		matches!(self, Self::ProviderUnreachable { .. } | Self::CredentialFetchFailed { .. })
	}

	/// Returns `true` when the failure was caused by the fetch deadline.
	pub fn is_timeout(&self) -> bool {
		matches!(self, Self::ProviderUnreachable { timed_out: true, .. })
	}
}

/// Configuration and validation failures raised before any network call.
#[derive(Debug, PartialEq, Eq, ThisError)]
pub enum ConfigError {
	/// Principal or audience identifier failed validation.
	#[error(transparent)]
	InvalidIdentifier(#[from] crate::auth::IdentifierError),
	/// Refresh request carried no audiences.
	#[error("Audience list cannot be empty.")]
	EmptyAudienceList,
	/// Provider address is empty, unparsable, or uses an unsupported scheme.
	#[error(transparent)]
	InvalidProviderAddress(#[from] crate::provider::AddressError),
	/// Extension attributes violate the SASL extension grammar.
	#[error(transparent)]
	InvalidExtensions(#[from] crate::auth::ExtensionError),
	/// Fetch deadline must be positive.
	#[error("Fetch timeout must be greater than zero.")]
	ZeroFetchTimeout,
}
