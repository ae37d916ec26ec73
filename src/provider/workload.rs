//! [`IdentityProvider`] backed by a SPIFFE Workload API agent (SPIRE or compatible).
//!
//! Each connection dials the agent's UNIX socket and requests one JWT-SVID for the refresh
//! audience. Principals written as SPIFFE IDs (`spiffe://...`) select that identity; any other
//! principal is only used as the token's principal and the agent returns the workload's default
//! identity.

// crates.io
use spiffe::{SpiffeId, WorkloadApiClient};
// self
use crate::{
	_prelude::*,
	auth::{Audience, PrincipalId},
	provider::{
		ConnectFuture, Credential, FetchFuture, IdentityProvider, ProviderAddress,
		ProviderConnection, ProviderError,
	},
};

/// Fetches JWT-SVIDs from the Workload API listening at the refresh request's address.
#[derive(Clone, Copy, Debug, Default)]
pub struct WorkloadApiProvider;
impl IdentityProvider for WorkloadApiProvider {
	fn connect<'a>(&'a self, address: &'a ProviderAddress) -> ConnectFuture<'a> {
		Box::pin(async move {
			let Some(path) = address.socket_path() else {
				return Err(ProviderError::transport(format!(
					"{address} is not a UNIX socket; the Workload API is only dialed over UNIX"
				)));
			};
			let endpoint = format!("unix:{}", path.display());
			let client = WorkloadApiClient::new_from_path(endpoint.as_str())
				.await
				.map_err(|e| ProviderError::transport_with(format!("{address}: {e}"), e))?;
			let connection: Box<dyn ProviderConnection> =
				Box::new(WorkloadApiConnection { client: Some(client) });

			Ok(connection)
		})
	}
}

struct WorkloadApiConnection {
	client: Option<WorkloadApiClient>,
}
impl ProviderConnection for WorkloadApiConnection {
	fn fetch_credential<'a>(
		&'a mut self,
		principal: &'a PrincipalId,
		audience: &'a Audience,
	) -> FetchFuture<'a> {
		Box::pin(async move {
			let spiffe_id = requested_identity(principal)?;
			let client = self
				.client
				.as_mut()
				.ok_or_else(|| ProviderError::transport("Workload API connection is closed"))?;
			let token = client
				.fetch_jwt_token(&[audience.as_str()], spiffe_id.as_ref())
				.await
				.map_err(|e| ProviderError::rejected(e.to_string()))?;

			Ok(Credential::from_jwt(token)?)
		})
	}

	fn close(&mut self) {
		self.client = None;
	}
}

fn requested_identity(principal: &PrincipalId) -> Result<Option<SpiffeId>, ProviderError> {
	if !principal.is_spiffe_id() {
		return Ok(None);
	}

	SpiffeId::new(principal.as_str())
		.map(Some)
		.map_err(|e| ProviderError::rejected(format!("{principal} is not a valid SPIFFE ID: {e}")))
}
