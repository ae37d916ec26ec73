//! Credentials issued by an identity provider.
//!
//! Workload-identity agents hand out compact JWTs whose signature has already been checked on the
//! agent side, so [`Credential::from_jwt`] only decodes the claims it needs (`exp`, `sub`, `aud`)
//! and never verifies signatures.

// crates.io
use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
// self
use crate::{_prelude::*, auth::TokenSecret};

/// Errors raised while decoding a compact JWT credential.
#[derive(Debug, ThisError)]
pub enum CredentialParseError {
	/// Token does not have three non-empty dot-separated segments.
	#[error("Credential is not a compact JWT.")]
	Malformed,
	/// Payload segment is not valid base64url.
	#[error("Credential payload is not valid base64url.")]
	Base64(#[from] base64::DecodeError),
	/// Payload JSON is missing or mistyped a required claim.
	#[error("Credential claims could not be parsed.")]
	Claims(#[from] serde_path_to_error::Error<serde_json::Error>),
	/// `exp` claim is outside the representable range.
	#[error("Credential exp claim {0} is out of range.")]
	ExpiryOutOfRange(i64),
}

/// Signed identity credential returned by [`ProviderConnection::fetch_credential`].
///
/// [`ProviderConnection::fetch_credential`]: crate::provider::ProviderConnection::fetch_credential
#[derive(Clone)]
pub struct Credential {
	/// Serialized token exactly as issued.
	pub token: TokenSecret,
	/// Absolute expiry instant.
	pub expires_at: OffsetDateTime,
	/// `sub` claim, when known.
	pub subject: Option<String>,
	/// `aud` claim values, when known.
	pub audiences: Vec<String>,
}
impl Credential {
	/// Wraps an opaque token with an explicit expiry.
	pub fn new(token: impl Into<String>, expires_at: OffsetDateTime) -> Self {
		Self { token: TokenSecret::new(token), expires_at, subject: None, audiences: Vec::new() }
	}

	/// Decodes an unverified compact JWT and takes the expiry from its `exp` claim.
	pub fn from_jwt(token: impl Into<String>) -> Result<Self, CredentialParseError> {
		let token = token.into();
		let mut segments = token.split('.');
		let (Some(header), Some(payload), Some(signature), None) =
			(segments.next(), segments.next(), segments.next(), segments.next())
		else {
			return Err(CredentialParseError::Malformed);
		};

		if header.is_empty() || payload.is_empty() || signature.is_empty() {
			return Err(CredentialParseError::Malformed);
		}

		let bytes = URL_SAFE_NO_PAD.decode(payload.trim_end_matches('='))?;
		let claims: Claims =
			serde_path_to_error::deserialize(&mut serde_json::Deserializer::from_slice(&bytes))?;
		let expires_at = OffsetDateTime::from_unix_timestamp(claims.exp)
			.map_err(|_| CredentialParseError::ExpiryOutOfRange(claims.exp))?;
		let audiences = match claims.aud {
			Some(AudienceClaim::One(aud)) => vec![aud],
			Some(AudienceClaim::Many(auds)) => auds,
			None => Vec::new(),
		};

		Ok(Self { token: TokenSecret::new(token), expires_at, subject: claims.sub, audiences })
	}

	/// Overrides the subject.
	pub fn with_subject(mut self, subject: impl Into<String>) -> Self {
		self.subject = Some(subject.into());

		self
	}
}
impl Debug for Credential {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("Credential")
			.field("token", &"<redacted>")
			.field("expires_at", &self.expires_at)
			.field("subject", &self.subject)
			.field("audiences", &self.audiences)
			.finish()
	}
}

#[derive(Deserialize)]
struct Claims {
	exp: i64,
	#[serde(default)]
	sub: Option<String>,
	#[serde(default)]
	aud: Option<AudienceClaim>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum AudienceClaim {
	One(String),
	Many(Vec<String>),
}
