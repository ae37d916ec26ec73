//! Bearer tokens handed to the client, their lifecycle helpers, and the validating builder.

// self
use crate::{
	_prelude::*,
	auth::{Extensions, PrincipalId, token::secret::TokenSecret},
};

/// Percentage of a token's lifetime after which a client should ask for a new one.
pub const REFRESH_PERCENT: i128 = 80;

/// Lifecycle status of a bearer token at a given instant.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum TokenStatus {
	/// Token is valid and has not yet reached its refresh point.
	Active,
	/// Token is still valid but past its refresh point.
	Stale,
	/// Token reached its expiry instant.
	Expired,
}

/// Errors produced by [`BearerTokenBuilder`].
#[derive(Clone, Debug, PartialEq, Eq, ThisError)]
pub enum TokenBuildError {
	/// Issued when no token value was provided.
	#[error("Token value is required.")]
	MissingValue,
	/// Issued when no expiry was provided.
	#[error("Token expiry is required.")]
	MissingExpiry,
	/// Issued when the expiry is not strictly after the issuance instant.
	#[error("Token expiry {expires_at} is not after issuance at {issued_at}.")]
	ExpiryNotInFuture {
		/// Issuance instant used for the check.
		issued_at: OffsetDateTime,
		/// Rejected expiry instant.
		expires_at: OffsetDateTime,
	},
}

/// Short-lived bearer credential ready to be installed on a streaming client.
///
/// Instances can only be produced through [`BearerTokenBuilder`] (deserialization runs the same
/// checks), which guarantees that `expires_at` is strictly after `issued_at`.
#[derive(Clone, Serialize, Deserialize)]
#[serde(try_from = "BearerTokenFields", into = "BearerTokenFields")]
pub struct BearerToken {
	value: TokenSecret,
	expires_at: OffsetDateTime,
	principal: PrincipalId,
	extensions: Extensions,
	issued_at: OffsetDateTime,
}
impl BearerToken {
	/// Returns a builder for the given principal.
	pub fn builder(principal: PrincipalId) -> BearerTokenBuilder {
		BearerTokenBuilder::new(principal)
	}

	/// Serialized signed credential; callers must avoid logging it.
	pub fn value(&self) -> &TokenSecret {
		&self.value
	}

	/// Absolute expiry instant.
	pub fn expires_at(&self) -> OffsetDateTime {
		self.expires_at
	}

	/// Identity the token asserts.
	pub fn principal(&self) -> &PrincipalId {
		&self.principal
	}

	/// Extension attributes forwarded to the broker with the token.
	pub fn extensions(&self) -> &Extensions {
		&self.extensions
	}

	/// Local instant the credential was received.
	pub fn issued_at(&self) -> OffsetDateTime {
		self.issued_at
	}

	/// Total validity window observed locally.
	pub fn lifetime(&self) -> Duration {
		self.expires_at - self.issued_at
	}

	/// Instant at which [`REFRESH_PERCENT`] of the lifetime has elapsed.
	pub fn refresh_at(&self) -> OffsetDateTime {
		let nanos = self.lifetime().whole_nanoseconds() * REFRESH_PERCENT / 100;

		self.issued_at + Duration::nanoseconds(i64::try_from(nanos).unwrap_or(i64::MAX))
	}

	/// Computes the lifecycle status at a given instant.
	pub fn status_at(&self, instant: OffsetDateTime) -> TokenStatus {
		if instant >= self.expires_at {
			return TokenStatus::Expired;
		}
		if instant >= self.refresh_at() {
			return TokenStatus::Stale;
		}

		TokenStatus::Active
	}

	/// Returns `true` if the token has expired at the provided instant.
	pub fn is_expired_at(&self, instant: OffsetDateTime) -> bool {
		matches!(self.status_at(instant), TokenStatus::Expired)
	}

	/// Remaining lifetime in whole milliseconds at `instant`, clamped at zero.
	///
	/// Some client libraries take a relative lifetime rather than an absolute expiry.
	pub fn remaining_ms_at(&self, instant: OffsetDateTime) -> i64 {
		let remaining = self.expires_at - instant;

		i64::try_from(remaining.whole_milliseconds()).unwrap_or(i64::MAX).max(0)
	}

	/// Expiry as milliseconds since the Unix epoch.
	pub fn expires_at_unix_ms(&self) -> i64 {
		i64::try_from(self.expires_at.unix_timestamp_nanos() / 1_000_000).unwrap_or(i64::MAX)
	}
}
impl Debug for BearerToken {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("BearerToken")
			.field("value", &"<redacted>")
			.field("expires_at", &self.expires_at)
			.field("principal", &self.principal)
			.field("extensions", &self.extensions)
			.field("issued_at", &self.issued_at)
			.finish()
	}
}

#[derive(Serialize, Deserialize)]
struct BearerTokenFields {
	value: TokenSecret,
	expires_at: OffsetDateTime,
	principal: PrincipalId,
	#[serde(default)]
	extensions: Extensions,
	issued_at: OffsetDateTime,
}
impl TryFrom<BearerTokenFields> for BearerToken {
	type Error = TokenBuildError;

	fn try_from(fields: BearerTokenFields) -> Result<Self, Self::Error> {
		BearerToken::builder(fields.principal)
			.value(fields.value.into_exposed())
			.expires_at(fields.expires_at)
			.issued_at(fields.issued_at)
			.extensions(fields.extensions)
			.build()
	}
}
impl From<BearerToken> for BearerTokenFields {
	fn from(token: BearerToken) -> Self {
		Self {
			value: token.value,
			expires_at: token.expires_at,
			principal: token.principal,
			extensions: token.extensions,
			issued_at: token.issued_at,
		}
	}
}

/// Builder for [`BearerToken`].
#[derive(Clone, Debug)]
pub struct BearerTokenBuilder {
	principal: PrincipalId,
	value: Option<TokenSecret>,
	expires_at: Option<OffsetDateTime>,
	issued_at: Option<OffsetDateTime>,
	extensions: Extensions,
}
impl BearerTokenBuilder {
	fn new(principal: PrincipalId) -> Self {
		Self {
			principal,
			value: None,
			expires_at: None,
			issued_at: None,
			extensions: Extensions::default(),
		}
	}

	/// Provides the serialized token value.
	pub fn value(mut self, token: impl Into<String>) -> Self {
		self.value = Some(TokenSecret::new(token));

		self
	}

	/// Sets the absolute expiry instant.
	pub fn expires_at(mut self, instant: OffsetDateTime) -> Self {
		self.expires_at = Some(instant);

		self
	}

	/// Sets the issuance instant; defaults to the current clock.
	pub fn issued_at(mut self, instant: OffsetDateTime) -> Self {
		self.issued_at = Some(instant);

		self
	}

	/// Attaches extension attributes.
	pub fn extensions(mut self, extensions: Extensions) -> Self {
		self.extensions = extensions;

		self
	}

	/// Consumes the builder and produces a [`BearerToken`].
	pub fn build(self) -> Result<BearerToken, TokenBuildError> {
		let value = self.value.filter(|v| !v.is_empty()).ok_or(TokenBuildError::MissingValue)?;
		let expires_at = self.expires_at.ok_or(TokenBuildError::MissingExpiry)?;
		let issued_at = self.issued_at.unwrap_or_else(OffsetDateTime::now_utc);

		if expires_at <= issued_at {
			return Err(TokenBuildError::ExpiryNotInFuture { issued_at, expires_at });
		}

		Ok(BearerToken {
			value,
			expires_at,
			principal: self.principal,
			extensions: self.extensions,
			issued_at,
		})
	}
}

#[cfg(test)]
mod tests {
	// crates.io
	use time::macros;
	// self
	use super::*;

	fn principal() -> PrincipalId {
		PrincipalId::new("svc-a").expect("Principal fixture should be valid.")
	}

	#[test]
	fn status_walks_active_stale_expired() {
		let token = BearerToken::builder(principal())
			.value("tok123")
			.issued_at(macros::datetime!(2025-01-01 00:00 UTC))
			.expires_at(macros::datetime!(2025-01-01 01:40 UTC))
			.build()
			.expect("Token fixture should build.");

		assert_eq!(token.refresh_at(), macros::datetime!(2025-01-01 01:20 UTC));
		assert_eq!(token.status_at(macros::datetime!(2025-01-01 01:00 UTC)), TokenStatus::Active);
		assert_eq!(token.status_at(macros::datetime!(2025-01-01 01:20 UTC)), TokenStatus::Stale);
		assert_eq!(token.status_at(macros::datetime!(2025-01-01 01:40 UTC)), TokenStatus::Expired);
		assert_eq!(token.remaining_ms_at(macros::datetime!(2025-01-01 01:39 UTC)), 60_000);
		assert_eq!(token.remaining_ms_at(macros::datetime!(2025-01-01 02:00 UTC)), 0);
	}

	#[test]
	fn builder_rejects_past_or_missing_expiry() {
		let issued = macros::datetime!(2025-01-01 00:00 UTC);
		let err = BearerToken::builder(principal())
			.value("tok")
			.issued_at(issued)
			.expires_at(issued)
			.build()
			.expect_err("Expiry equal to issuance must be rejected.");

		assert_eq!(
			err,
			TokenBuildError::ExpiryNotInFuture { issued_at: issued, expires_at: issued }
		);
		assert_eq!(
			BearerToken::builder(principal())
				.value("tok")
				.build()
				.expect_err("Expiry is required."),
			TokenBuildError::MissingExpiry
		);
		assert_eq!(
			BearerToken::builder(principal())
				.value("")
				.expires_at(issued)
				.build()
				.expect_err("Empty value is rejected."),
			TokenBuildError::MissingValue
		);
	}

	#[test]
	fn debug_redacts_value_and_unix_ms_matches_expiry() {
		let token = BearerToken::builder(principal())
			.value("tok123")
			.issued_at(macros::datetime!(1970-01-01 00:00 UTC))
			.expires_at(macros::datetime!(1970-01-01 00:00:01 UTC))
			.build()
			.expect("Token fixture should build.");

		assert!(!format!("{token:?}").contains("tok123"));
		assert_eq!(token.expires_at_unix_ms(), 1_000);
	}

	#[test]
	fn deserialization_enforces_builder_invariants() {
		let token = BearerToken::builder(principal())
			.value("tok123")
			.issued_at(macros::datetime!(2025-01-01 00:00 UTC))
			.expires_at(macros::datetime!(2025-01-01 01:00 UTC))
			.build()
			.expect("Token fixture should build.");
		let json = serde_json::to_string(&token).expect("Token should serialize.");
		let restored: BearerToken =
			serde_json::from_str(&json).expect("Valid token should deserialize.");

		assert_eq!(restored.expires_at(), token.expires_at());
		assert_eq!(restored.value().expose(), "tok123");

		let expired = BearerToken::builder(principal())
			.value("old")
			.issued_at(macros::datetime!(2019-12-31 00:00 UTC))
			.expires_at(macros::datetime!(2020-01-01 00:00 UTC))
			.build()
			.expect("Expired fixture should build.");
		let mut backdated = serde_json::to_value(&token).expect("Token should serialize.");

		backdated["expires_at"] =
			serde_json::to_value(&expired).expect("Token should serialize.")["expires_at"].clone();

		let err = serde_json::from_value::<BearerToken>(backdated)
			.expect_err("Expiry before issuance must be rejected.");

		assert!(err.to_string().contains("is not after issuance"));
	}
}
