//! SASL OAUTHBEARER extension attributes carried alongside each token.
//!
//! Keys and values follow the `kvpair` grammar from RFC 7628 §3.1: keys are one or more ASCII
//! letters, values are printable ASCII plus space, horizontal tab, CR, and LF. The key `auth` is
//! reserved for the bearer token itself.

// self
use crate::_prelude::*;

const RESERVED_KEY: &str = "auth";

/// Errors produced while validating [`Extensions`].
#[derive(Clone, Debug, PartialEq, Eq, ThisError)]
pub enum ExtensionError {
	/// Key is empty or contains non-alphabetic characters.
	#[error("Extension key `{key}` must consist of ASCII letters only.")]
	InvalidKey {
		/// Offending key.
		key: String,
	},
	/// Key collides with the reserved `auth` attribute.
	#[error("Extension key `auth` is reserved.")]
	ReservedKey,
	/// Value is empty or contains characters outside the SASL value grammar.
	#[error("Extension value for `{key}` is empty or contains invalid characters.")]
	InvalidValue {
		/// Key whose value was rejected.
		key: String,
	},
}

/// Validated, ordered set of extension attributes (e.g. logical cluster or identity pool hints).
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "BTreeMap<String, String>", into = "BTreeMap<String, String>")]
pub struct Extensions(BTreeMap<String, String>);
impl Extensions {
	/// Builds an extension set from `(key, value)` pairs, validating each entry.
	///
	/// Later duplicates replace earlier ones.
	pub fn new<I, K, V>(pairs: I) -> Result<Self, ExtensionError>
	where
		I: IntoIterator<Item = (K, V)>,
		K: Into<String>,
		V: Into<String>,
	{
		let mut map = BTreeMap::new();

		for (key, value) in pairs {
			let (key, value) = (key.into(), value.into());

			validate_entry(&key, &value)?;
			map.insert(key, value);
		}

		Ok(Self(map))
	}

	/// Adds or replaces a single attribute.
	pub fn insert(
		&mut self,
		key: impl Into<String>,
		value: impl Into<String>,
	) -> Result<Option<String>, ExtensionError> {
		let (key, value) = (key.into(), value.into());

		validate_entry(&key, &value)?;

		Ok(self.0.insert(key, value))
	}

	/// Looks up a single attribute.
	pub fn get(&self, key: &str) -> Option<&str> {
		self.0.get(key).map(String::as_str)
	}

	/// Number of attributes.
	pub fn len(&self) -> usize {
		self.0.len()
	}

	/// Returns `true` when no attributes are configured.
	pub fn is_empty(&self) -> bool {
		self.0.is_empty()
	}

	/// Iterates attributes in key order.
	pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
		self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
	}
}
impl TryFrom<BTreeMap<String, String>> for Extensions {
	type Error = ExtensionError;

	fn try_from(map: BTreeMap<String, String>) -> Result<Self, Self::Error> {
		Self::new(map)
	}
}
impl From<Extensions> for BTreeMap<String, String> {
	fn from(value: Extensions) -> Self {
		value.0
	}
}

fn validate_entry(key: &str, value: &str) -> Result<(), ExtensionError> {
	if key.is_empty() || !key.bytes().all(|b| b.is_ascii_alphabetic()) {
		return Err(ExtensionError::InvalidKey { key: key.to_owned() });
	}
	if key == RESERVED_KEY {
		return Err(ExtensionError::ReservedKey);
	}
	if value.is_empty() || !value.bytes().all(is_value_byte) {
		return Err(ExtensionError::InvalidValue { key: key.to_owned() });
	}

	Ok(())
}

fn is_value_byte(b: u8) -> bool {
	matches!(b, 0x21..=0x7E | b' ' | b'\t' | b'\r' | b'\n')
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn cluster_hints_are_accepted_in_key_order() {
		let ext =
			Extensions::new([("logicalCluster", "lkc-0yoqvq"), ("identityPoolId", "pool-W9j5")])
				.expect("Cluster hints should be valid extensions.");

		assert_eq!(ext.len(), 2);
		assert_eq!(ext.get("logicalCluster"), Some("lkc-0yoqvq"));
		assert_eq!(
			ext.iter().map(|(k, _)| k).collect::<Vec<_>>(),
			vec!["identityPoolId", "logicalCluster"]
		);
	}

	#[test]
	fn grammar_violations_are_rejected() {
		assert_eq!(
			Extensions::new([("logical-cluster", "x")]),
			Err(ExtensionError::InvalidKey { key: "logical-cluster".into() })
		);
		assert_eq!(Extensions::new([("auth", "Bearer x")]), Err(ExtensionError::ReservedKey));
		assert_eq!(
			Extensions::new([("pool", "")]),
			Err(ExtensionError::InvalidValue { key: "pool".into() })
		);
		assert_eq!(
			Extensions::new([("pool", "caf\u{e9}")]),
			Err(ExtensionError::InvalidValue { key: "pool".into() })
		);

		let mut ext = Extensions::default();

		assert!(ext.insert("", "x").is_err());
		assert!(ext.is_empty());
	}

	#[test]
	fn deserialization_validates_entries() {
		let ext: Extensions = serde_json::from_str("{\"tenant\":\"acme\"}")
			.expect("Valid extension map should deserialize.");

		assert_eq!(ext.get("tenant"), Some("acme"));
		assert!(serde_json::from_str::<Extensions>("{\"auth\":\"x\"}").is_err());
	}
}
