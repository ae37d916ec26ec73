//! Client boundary: where refresh results are delivered.
//!
//! A streaming client exposes two callbacks for OAUTHBEARER authentication: one that installs a
//! token and one that records why no token could be produced this cycle. [`TokenSink`] is that
//! contract; the coordinator calls exactly one of the two per refresh (falling back to
//! [`TokenSink::set_token_failure`] when the client rejects a token it was handed).

// self
use crate::{_prelude::*, auth::BearerToken};

/// Client rejected a token in [`TokenSink::set_token`] (e.g. invalid extensions or principal).
#[derive(Clone, Debug, PartialEq, Eq, ThisError)]
#[error("Client rejected the token: {reason}.")]
pub struct TokenRejected {
	/// Client-supplied reason.
	pub reason: String,
}
impl TokenRejected {
	/// Creates a rejection with the given reason.
	pub fn new(reason: impl Into<String>) -> Self {
		Self { reason: reason.into() }
	}
}

/// Callback surface of a client that authenticates with refreshed bearer tokens.
pub trait TokenSink: Send + Sync {
	/// Installs `token` for subsequent authentication attempts.
	fn set_token(&self, token: BearerToken) -> Result<(), TokenRejected>;

	/// Informs the client that no valid token could be obtained this cycle.
	///
	/// Clients must treat this as non-fatal and retry on their own cadence.
	fn set_token_failure(&self, reason: &str);
}
impl<S> TokenSink for Arc<S>
where
	S: ?Sized + TokenSink,
{
	fn set_token(&self, token: BearerToken) -> Result<(), TokenRejected> {
		(**self).set_token(token)
	}

	fn set_token_failure(&self, reason: &str) {
		(**self).set_token_failure(reason)
	}
}

/// What happened during one `handle_refresh` call.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RefreshOutcome {
	/// Client accepted a token expiring at `expires_at`.
	Delivered {
		/// Expiry of the installed token.
		expires_at: OffsetDateTime,
	},
	/// Client was told no token is available; `reason` is the text it received.
	Failed {
		/// Failure reason handed to [`TokenSink::set_token_failure`].
		reason: String,
	},
}
impl RefreshOutcome {
	/// Returns `true` when a token was installed.
	pub fn is_delivered(&self) -> bool {
		matches!(self, Self::Delivered { .. })
	}
}
