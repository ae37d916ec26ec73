//! Scriptable identity provider and recording client sink.

// std
use std::sync::atomic::{AtomicUsize, Ordering};
// self
use crate::{
	_prelude::*,
	auth::{Audience, BearerToken, PrincipalId},
	provider::{
		ConnectFuture, Credential, FetchFuture, IdentityProvider, ProviderAddress,
		ProviderConnection, ProviderError,
	},
	sink::{TokenRejected, TokenSink},
};

/// How a [`MockProvider`] answers.
#[derive(Clone, Debug)]
pub enum MockBehavior {
	/// Issue `token` expiring `ttl` after each fetch.
	Issue {
		/// Serialized token.
		token: String,
		/// Validity measured from the fetch instant.
		ttl: Duration,
	},
	/// Issue `token` with a fixed expiry.
	IssueUntil {
		/// Serialized token.
		token: String,
		/// Absolute expiry.
		expires_at: OffsetDateTime,
	},
	/// Fail to connect with a transport error.
	ConnectError(&'static str),
	/// Connect, then lose the transport while fetching.
	FetchTransportError(&'static str),
	/// Connect, then decline to issue a credential.
	Reject(&'static str),
	/// Never finish connecting.
	HangOnConnect,
	/// Connect, then never answer the fetch.
	HangOnFetch,
}

#[derive(Debug, Default)]
struct MockState {
	connect_attempts: AtomicUsize,
	connections: AtomicUsize,
	releases: AtomicUsize,
	audiences: Mutex<Vec<String>>,
	principals: Mutex<Vec<String>>,
}

/// In-process [`IdentityProvider`] with call counters.
#[derive(Debug)]
pub struct MockProvider {
	behavior: MockBehavior,
	state: Arc<MockState>,
}
impl MockProvider {
	/// Creates a provider that follows `behavior` on every call.
	pub fn new(behavior: MockBehavior) -> Self {
		Self { behavior, state: Default::default() }
	}

	/// Shorthand for [`MockBehavior::Issue`].
	pub fn issuing(token: impl Into<String>, ttl: Duration) -> Self {
		Self::new(MockBehavior::Issue { token: token.into(), ttl })
	}

	/// Shorthand for [`MockBehavior::IssueUntil`].
	pub fn issuing_until(token: impl Into<String>, expires_at: OffsetDateTime) -> Self {
		Self::new(MockBehavior::IssueUntil { token: token.into(), expires_at })
	}

	/// Calls to [`IdentityProvider::connect`], successful or not.
	pub fn connect_attempts(&self) -> usize {
		self.state.connect_attempts.load(Ordering::SeqCst)
	}

	/// Connections handed out.
	pub fn connections(&self) -> usize {
		self.state.connections.load(Ordering::SeqCst)
	}

	/// Connections closed.
	pub fn releases(&self) -> usize {
		self.state.releases.load(Ordering::SeqCst)
	}

	/// Audiences passed to `fetch_credential`, in call order.
	pub fn requested_audiences(&self) -> Vec<String> {
		self.state.audiences.lock().clone()
	}

	/// Principals passed to `fetch_credential`, in call order.
	pub fn requested_principals(&self) -> Vec<String> {
		self.state.principals.lock().clone()
	}
}
impl IdentityProvider for MockProvider {
	fn connect<'a>(&'a self, address: &'a ProviderAddress) -> ConnectFuture<'a> {
		Box::pin(async move {
			self.state.connect_attempts.fetch_add(1, Ordering::SeqCst);

			match &self.behavior {
				MockBehavior::ConnectError(message) =>
					Err(ProviderError::transport(format!("{address}: {message}"))),
				MockBehavior::HangOnConnect => std::future::pending().await,
				behavior => {
					self.state.connections.fetch_add(1, Ordering::SeqCst);

					let connection: Box<dyn ProviderConnection> = Box::new(MockConnection {
						behavior: behavior.clone(),
						state: self.state.clone(),
					});

					Ok(connection)
				},
			}
		})
	}
}

struct MockConnection {
	behavior: MockBehavior,
	state: Arc<MockState>,
}
impl ProviderConnection for MockConnection {
	fn fetch_credential<'a>(
		&'a mut self,
		principal: &'a PrincipalId,
		audience: &'a Audience,
	) -> FetchFuture<'a> {
		Box::pin(async move {
			self.state.principals.lock().push(principal.to_string());
			self.state.audiences.lock().push(audience.to_string());

			match &self.behavior {
				MockBehavior::Issue { token, ttl } =>
					Ok(Credential::new(token.clone(), OffsetDateTime::now_utc() + *ttl)),
				MockBehavior::IssueUntil { token, expires_at } =>
					Ok(Credential::new(token.clone(), *expires_at)),
				MockBehavior::FetchTransportError(message) =>
					Err(ProviderError::transport(*message)),
				MockBehavior::Reject(message) => Err(ProviderError::rejected(*message)),
				MockBehavior::HangOnFetch => std::future::pending().await,
				MockBehavior::ConnectError(_) | MockBehavior::HangOnConnect =>
					Err(ProviderError::transport("connection should not exist")),
			}
		})
	}

	fn close(&mut self) {
		self.state.releases.fetch_add(1, Ordering::SeqCst);
	}
}

/// [`TokenSink`] that records every callback.
#[derive(Debug, Default)]
pub struct RecordingSink {
	tokens: Mutex<Vec<BearerToken>>,
	failures: Mutex<Vec<String>>,
	reject_with: Option<String>,
}
impl RecordingSink {
	/// Sink whose `set_token` always fails with `reason`.
	pub fn rejecting(reason: impl Into<String>) -> Self {
		Self { reject_with: Some(reason.into()), ..Default::default() }
	}

	/// Tokens accepted so far.
	pub fn tokens(&self) -> Vec<BearerToken> {
		self.tokens.lock().clone()
	}

	/// Most recently accepted token.
	pub fn last_token(&self) -> Option<BearerToken> {
		self.tokens.lock().last().cloned()
	}

	/// Failure reasons received so far.
	pub fn failures(&self) -> Vec<String> {
		self.failures.lock().clone()
	}
}
impl TokenSink for RecordingSink {
	fn set_token(&self, token: BearerToken) -> Result<(), TokenRejected> {
		if let Some(reason) = &self.reject_with {
			return Err(TokenRejected::new(reason.clone()));
		}

		self.tokens.lock().push(token);

		Ok(())
	}

	fn set_token_failure(&self, reason: &str) {
		self.failures.lock().push(reason.to_owned());
	}
}
