//! Bounded-time workload-identity token refresh for OAUTHBEARER streaming clients: fetch, validate,
//! and hand JWT credentials to your consumer without stalling its poll loop.

#![deny(clippy::all, missing_docs, unused_crate_dependencies)]

pub mod auth;
pub mod coordinator;
pub mod error;
pub mod obs;
pub mod provider;
pub mod sink;
#[cfg(any(test, feature = "test"))]
pub mod _preludet {
	//! Convenience re-exports and helpers for integration tests; enabled via `cfg(test)` or the
	//! `test` crate feature.

	mod mock;

	pub use mock::*;

	pub use crate::_prelude::*;

	// self
	use crate::{
		auth::{Audience, Extensions, PrincipalId},
		coordinator::{CoordinatorConfig, RefreshCoordinator, RefreshRequest},
		provider::{IdentityProvider, ProviderAddress},
	};

	/// Socket address used by test fixtures.
	pub const TEST_SOCKET: &str = "unix:///tmp/spire-agent/public/api.sock";

	/// Builds a validated refresh request for `principal` against [`TEST_SOCKET`].
	pub fn test_request(principal: &str, audiences: &[&str]) -> RefreshRequest {
		RefreshRequest::new(
			PrincipalId::new(principal).expect("Test principal should be valid."),
			ProviderAddress::parse(TEST_SOCKET).expect("Test socket address should be valid."),
			audiences
				.iter()
				.map(|aud| Audience::new(aud).expect("Test audience should be valid."))
				.collect::<Vec<_>>(),
		)
		.expect("Test refresh request should be valid.")
	}

	/// Extensions matching the demo consumer's cluster routing hints.
	pub fn test_extensions() -> Extensions {
		Extensions::new([("logicalCluster", "lkc-0yoqvq"), ("identityPoolId", "pool-W9j5")])
			.expect("Test extensions should be valid.")
	}

	/// Constructs a [`RefreshCoordinator`] around `provider` with the given fetch timeout.
	pub fn build_test_coordinator<P>(
		provider: Arc<P>,
		fetch_timeout: StdDuration,
	) -> RefreshCoordinator<P>
	where
		P: ?Sized + IdentityProvider,
	{
		let config = CoordinatorConfig::default()
			.with_fetch_timeout(fetch_timeout)
			.with_extensions(test_extensions());

		RefreshCoordinator::new(provider, config).expect("Test coordinator config should be valid.")
	}
}

mod _prelude {
	pub use std::{
		collections::{BTreeMap, HashMap},
		error::Error as StdError,
		fmt::{Debug, Display, Formatter, Result as FmtResult},
		future::Future,
		pin::Pin,
		str::FromStr,
		sync::Arc,
		time::{Duration as StdDuration, Instant},
	};

	pub use parking_lot::Mutex;
	pub use serde::{Deserialize, Serialize};
	pub use thiserror::Error as ThisError;
	pub use time::{Duration, OffsetDateTime};
	pub use url::Url;

	pub use crate::error::{Error, Result};
}

#[cfg(feature = "spiffe")] pub use spiffe;
pub use url;
#[cfg(test)] use {color_eyre as _, tracing_subscriber as _};
