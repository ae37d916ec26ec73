//! Validated inputs for a refresh.

// self
use crate::{
	_prelude::*,
	auth::{Audience, PrincipalId},
	error::ConfigError,
	provider::ProviderAddress,
};

/// Principal, provider address, and audience list a refresh is served with.
///
/// Construction validates every field, so a misconfigured host fails at startup with
/// [`ConfigError`] instead of on its first refresh.
///
/// Only the first audience is sent to the provider (see [`RefreshRequest::audience`]). The full
/// list is kept so hosts can log or compare it, but it is never fanned out into multiple fetches.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RefreshRequest {
	principal: PrincipalId,
	address: ProviderAddress,
	audiences: Vec<Audience>,
}
impl RefreshRequest {
	/// Creates a request from already-validated parts.
	pub fn new(
		principal: PrincipalId,
		address: ProviderAddress,
		audiences: impl IntoIterator<Item = Audience>,
	) -> Result<Self, ConfigError> {
		let audiences = audiences.into_iter().collect::<Vec<_>>();

		if audiences.is_empty() {
			return Err(ConfigError::EmptyAudienceList);
		}

		Ok(Self { principal, address, audiences })
	}

	/// Validates raw strings, e.g. straight from command-line arguments.
	pub fn parse<A>(principal: &str, address: &str, audiences: &[A]) -> Result<Self, ConfigError>
	where
		A: AsRef<str>,
	{
		if audiences.is_empty() {
			return Err(ConfigError::EmptyAudienceList);
		}

		let principal = PrincipalId::new(principal)?;
		let address = ProviderAddress::parse(address)?;
		let audiences = audiences.iter().map(Audience::new).collect::<Result<Vec<_>, _>>()?;

		Self::new(principal, address, audiences)
	}

	/// Principal the token will assert.
	pub fn principal(&self) -> &PrincipalId {
		&self.principal
	}

	/// Identity-provider address.
	pub fn address(&self) -> &ProviderAddress {
		&self.address
	}

	/// Full configured audience list.
	pub fn audiences(&self) -> &[Audience] {
		&self.audiences
	}

	/// Audience actually requested from the provider: the first configured entry.
	pub fn audience(&self) -> &Audience {
		// `new` rejects empty lists.
		&self.audiences[0]
	}
}
