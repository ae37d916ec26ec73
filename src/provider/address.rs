//! Identity-provider endpoint parsing.
//!
//! Workload-identity agents listen on a local UNIX socket or a loopback TCP port. Addresses are
//! accepted as `unix:///path`, the shorthand `unix:/path`, a bare absolute path, or
//! `tcp://<ip>:<port>`.

// std
use std::{
	net::{IpAddr, SocketAddr},
	path::{Path, PathBuf},
};
// self
use crate::_prelude::*;

/// Environment variable conventionally holding the workload API socket.
pub const ENDPOINT_SOCKET_ENV: &str = "SPIFFE_ENDPOINT_SOCKET";

const UNIX_SCHEME: &str = "unix";
const TCP_SCHEME: &str = "tcp";

/// Errors returned by [`ProviderAddress::parse`].
#[derive(Clone, Debug, PartialEq, Eq, ThisError)]
pub enum AddressError {
	/// Address string was empty.
	#[error("Provider address cannot be empty.")]
	Empty,
	/// Address is not a valid URI.
	#[error("Provider address is not a valid URI: {0}.")]
	Parse(#[from] url::ParseError),
	/// Scheme other than `unix` or `tcp`.
	#[error("Provider address scheme `{0}` is not supported; use unix: or tcp:.")]
	UnsupportedScheme(String),
	/// User info, query, or fragment present.
	#[error("Provider address must not carry user info, query, or fragment.")]
	UnexpectedComponent,
	/// `unix:` address with a host or without a path.
	#[error("unix: provider address must be a host-less absolute socket path.")]
	InvalidUnixPath,
	/// `tcp:` address whose host is not an IP literal or that lacks a port.
	#[error("tcp: provider address must be an IP address with a port.")]
	InvalidTcpTarget,
	/// Environment variable is unset or not unicode.
	#[error("Environment variable {ENDPOINT_SOCKET_ENV} is not set.")]
	MissingEnv,
}

/// Parsed connection target of an identity provider.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum ProviderTarget {
	/// UNIX domain socket.
	Unix(PathBuf),
	/// Loopback or node-local TCP endpoint.
	Tcp(SocketAddr),
}

/// Validated identity-provider address.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct ProviderAddress {
	uri: String,
	target: ProviderTarget,
}
impl ProviderAddress {
	/// Parses and validates a provider address.
	pub fn parse(input: &str) -> Result<Self, AddressError> {
		let input = input.trim();

		if input.is_empty() {
			return Err(AddressError::Empty);
		}

		let normalized = normalize(input);
		let url = Url::parse(&normalized)?;

		if !url.username().is_empty()
			|| url.password().is_some()
			|| url.query().is_some()
			|| url.fragment().is_some()
		{
			return Err(AddressError::UnexpectedComponent);
		}

		let target = match url.scheme() {
			UNIX_SCHEME => {
				let path = url.path();

				if url.host_str().is_some_and(|h| !h.is_empty()) || path.is_empty() || path == "/"
				{
					return Err(AddressError::InvalidUnixPath);
				}

				ProviderTarget::Unix(PathBuf::from(path))
			},
			TCP_SCHEME => {
				let host = url
					.host_str()
					.map(|h| h.trim_start_matches('[').trim_end_matches(']'))
					.and_then(|h| h.parse::<IpAddr>().ok())
					.ok_or(AddressError::InvalidTcpTarget)?;
				let port = url.port().ok_or(AddressError::InvalidTcpTarget)?;

				if !url.path().is_empty() && url.path() != "/" {
					return Err(AddressError::InvalidTcpTarget);
				}

				ProviderTarget::Tcp(SocketAddr::new(host, port))
			},
			other => return Err(AddressError::UnsupportedScheme(other.to_owned())),
		};
		let uri = match &target {
			ProviderTarget::Unix(path) => format!("unix://{}", path.display()),
			ProviderTarget::Tcp(addr) => format!("tcp://{addr}"),
		};

		Ok(Self { uri, target })
	}

	/// Reads the address from [`ENDPOINT_SOCKET_ENV`].
	pub fn from_env() -> Result<Self, AddressError> {
		let raw = std::env::var(ENDPOINT_SOCKET_ENV).map_err(|_| AddressError::MissingEnv)?;

		Self::parse(&raw)
	}

	/// Normalized URI form (`unix:///path` or `tcp://ip:port`).
	pub fn as_str(&self) -> &str {
		&self.uri
	}

	/// Parsed connection target.
	pub fn target(&self) -> &ProviderTarget {
		&self.target
	}

	/// Socket path for `unix:` addresses.
	pub fn socket_path(&self) -> Option<&Path> {
		match &self.target {
			ProviderTarget::Unix(path) => Some(path),
			ProviderTarget::Tcp(_) => None,
		}
	}
}
impl Debug for ProviderAddress {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		write!(f, "ProviderAddress({})", self.uri)
	}
}
impl Display for ProviderAddress {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(&self.uri)
	}
}
impl FromStr for ProviderAddress {
	type Err = AddressError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		Self::parse(s)
	}
}

fn normalize(input: &str) -> String {
	if input.starts_with('/') {
		return format!("unix://{input}");
	}
	match input.strip_prefix("unix:/") {
		Some(path) if !path.starts_with('/') => format!("unix:///{path}"),
		_ => input.to_owned(),
	}
}
