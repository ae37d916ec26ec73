//! Optional in-process token reuse.
//!
//! Refresh events normally mean "fetch now". When a host raises them more often than needed
//! (several clients sharing one coordinator, or a client that refreshes on every reconnect),
//! a cached token is returned while it is still before its refresh point. Stale or expired
//! entries are never served.

// self
use crate::{
	_prelude::*,
	auth::{Audience, BearerToken, PrincipalId, TokenStatus},
	coordinator::RefreshRequest,
	provider::ProviderAddress,
};

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
struct CacheKey {
	principal: PrincipalId,
	audience: Audience,
	address: ProviderAddress,
}
impl CacheKey {
	fn new(request: &RefreshRequest) -> Self {
		Self {
			principal: request.principal().clone(),
			audience: request.audience().clone(),
			address: request.address().clone(),
		}
	}
}

/// Thread-safe token cache keyed by principal, audience, and provider address.
#[derive(Debug, Default)]
pub struct TokenCache(Mutex<HashMap<CacheKey, BearerToken>>);
impl TokenCache {
	/// Returns a cached token that is still [`TokenStatus::Active`] at `now`.
	///
	/// Entries that are stale or expired are evicted.
	pub fn lookup(&self, request: &RefreshRequest, now: OffsetDateTime) -> Option<BearerToken> {
		let key = CacheKey::new(request);
		let mut entries = self.0.lock();

		match entries.get(&key) {
			Some(token) if token.status_at(now) == TokenStatus::Active => Some(token.clone()),
			Some(_) => {
				entries.remove(&key);

				None
			},
			None => None,
		}
	}

	/// Stores `token`, keeping whichever of the old and new entries expires later.
	pub fn store(&self, request: &RefreshRequest, token: &BearerToken) {
		let key = CacheKey::new(request);
		let mut entries = self.0.lock();

		match entries.get(&key) {
			Some(existing) if existing.expires_at() > token.expires_at() => {},
			_ => {
				entries.insert(key, token.clone());
			},
		}
	}

	/// Drops every cached token.
	pub fn clear(&self) {
		self.0.lock().clear();
	}

	/// Number of cached tokens.
	pub fn len(&self) -> usize {
		self.0.lock().len()
	}

	/// Returns `true` when nothing is cached.
	pub fn is_empty(&self) -> bool {
		self.0.lock().is_empty()
	}
}
