//! Normalized scope sets used for delegation requests and cache keys.

// std
use std::{cmp::Ordering, collections::BTreeSet};
// crates.io
use base64::{Engine as _, engine::general_purpose::STANDARD_NO_PAD};
use serde::{Deserializer, Serializer, de::Error as DeError, ser::SerializeSeq};
use sha2::{Digest, Sha256};
// self
use crate::_prelude::*;

/// Errors emitted when validating scopes.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ThisError)]
pub enum ScopeValidationError {
	/// Empty scope entries are not allowed.
	#[error("Scope entries cannot be empty.")]
	Empty,
	/// Scopes cannot contain embedded whitespace characters.
	#[error("Scope contains whitespace: {scope}.")]
	ContainsWhitespace {
		/// The offending scope string.
		scope: String,
	},
}

/// Sorted, deduplicated scope list with a precomputed fingerprint.
///
/// Two sets built from the same scopes in any order compare, order, and hash identically. The
/// fingerprint is a base64 (no padding) SHA-256 digest of the space-joined scopes and is what
/// cache keys carry, so the scope strings themselves never need to be rehashed on lookup.
///
/// An empty set is representable; delegation engines reject it as an invalid request.
#[derive(Clone, Default)]
pub struct ScopeSet {
	scopes: Arc<[String]>,
	fingerprint: Arc<str>,
}
impl ScopeSet {
	/// Creates a normalized scope set from any iterator.
	pub fn new<I, S>(scopes: I) -> Result<Self, ScopeValidationError>
	where
		I: IntoIterator<Item = S>,
		S: Into<String>,
	{
		let scopes = normalize(scopes)?;
		let fingerprint = Arc::from(compute_fingerprint(&scopes));

		Ok(Self { scopes, fingerprint })
	}

	/// Number of distinct scopes.
	pub fn len(&self) -> usize {
		self.scopes.len()
	}

	/// Returns true if no scopes are defined.
	pub fn is_empty(&self) -> bool {
		self.scopes.is_empty()
	}

	/// Returns true if the set contains the provided scope.
	pub fn contains(&self, scope: &str) -> bool {
		self.scopes.binary_search_by(|candidate| candidate.as_str().cmp(scope)).is_ok()
	}

	/// Iterator over normalized scopes.
	pub fn iter(&self) -> impl Iterator<Item = &str> {
		self.scopes.iter().map(String::as_str)
	}

	/// Joins the scopes with `delimiter`, or returns `None` for an empty set.
	pub fn join(&self, delimiter: char) -> Option<String> {
		if self.scopes.is_empty() {
			return None;
		}

		let mut buf = String::new();

		for (idx, value) in self.scopes.iter().enumerate() {
			if idx > 0 {
				buf.push(delimiter);
			}

			buf.push_str(value);
		}

		Some(buf)
	}

	/// Stable fingerprint of the normalized scope list.
	pub fn fingerprint(&self) -> &str {
		if self.fingerprint.is_empty() {
			// `Default` skips hashing; an empty set always digests the empty string.
			return EMPTY_FINGERPRINT;
		}

		&self.fingerprint
	}

	/// Returns the underlying slice of scope strings.
	pub fn as_slice(&self) -> &[String] {
		&self.scopes
	}
}
impl PartialEq for ScopeSet {
	fn eq(&self, other: &Self) -> bool {
		self.scopes == other.scopes
	}
}
impl Eq for ScopeSet {}
impl PartialOrd for ScopeSet {
	fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
		Some(self.cmp(other))
	}
}
impl Ord for ScopeSet {
	fn cmp(&self, other: &Self) -> Ordering {
		self.scopes.cmp(&other.scopes)
	}
}
impl Hash for ScopeSet {
	fn hash<H: Hasher>(&self, state: &mut H) {
		self.fingerprint().hash(state);
	}
}
impl Debug for ScopeSet {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_tuple("ScopeSet").field(&self.scopes).finish()
	}
}
impl Display for ScopeSet {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(&self.join(' ').unwrap_or_default())
	}
}
impl TryFrom<Vec<String>> for ScopeSet {
	type Error = ScopeValidationError;

	fn try_from(value: Vec<String>) -> Result<Self, Self::Error> {
		Self::new(value)
	}
}
impl FromStr for ScopeSet {
	type Err = ScopeValidationError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		if s.is_empty() {
			return Ok(Self::default());
		}
		if s.chars().all(char::is_whitespace) {
			return Err(ScopeValidationError::Empty);
		}

		Self::new(s.split_whitespace())
	}
}
impl Serialize for ScopeSet {
	fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
	where
		S: Serializer,
	{
		let mut seq = serializer.serialize_seq(Some(self.scopes.len()))?;

		for scope in self.scopes.iter() {
			seq.serialize_element(scope)?;
		}

		seq.end()
	}
}
impl<'de> Deserialize<'de> for ScopeSet {
	fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
	where
		D: Deserializer<'de>,
	{
		let values = <Vec<String>>::deserialize(deserializer)?;

		ScopeSet::new(values).map_err(DeError::custom)
	}
}

// SHA-256 of "" in base64 without padding.
const EMPTY_FINGERPRINT: &str = "47DEQpj8HBSa+/TImW+5JCeuQeRkm5NMpJWZG3hSuFU";

fn normalize<I, S>(scopes: I) -> Result<Arc<[String]>, ScopeValidationError>
where
	I: IntoIterator<Item = S>,
	S: Into<String>,
{
	let mut set = BTreeSet::new();

	for scope in scopes {
		let owned: String = scope.into();

		if owned.is_empty() {
			return Err(ScopeValidationError::Empty);
		}
		if owned.chars().any(char::is_whitespace) {
			return Err(ScopeValidationError::ContainsWhitespace { scope: owned });
		}

		set.insert(owned);
	}

	Ok(Arc::from(set.into_iter().collect::<Vec<_>>()))
}

fn compute_fingerprint(scopes: &[String]) -> String {
	let mut hasher = Sha256::new();

	hasher.update(scopes.join(" ").as_bytes());

	STANDARD_NO_PAD.encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn scopes_normalize_and_fingerprint_stably() {
		let lhs = ScopeSet::new(["scope2", "scope1", "scope1"])
			.expect("Left-hand scope set should be valid.");
		let rhs = ScopeSet::new(["scope1", "scope2"]).expect("Right-hand scope set should be valid.");

		assert_eq!(lhs, rhs);
		assert_eq!(lhs.join(' ').as_deref(), Some("scope1 scope2"));
		assert_eq!(lhs.fingerprint(), rhs.fingerprint());
	}

	#[test]
	fn empty_sets_share_the_empty_digest() {
		let built = ScopeSet::new(Vec::<String>::new()).expect("Empty scope list should build.");
		let defaulted = ScopeSet::default();

		assert!(built.is_empty());
		assert_eq!(built.fingerprint(), EMPTY_FINGERPRINT);
		assert_eq!(defaulted.fingerprint(), EMPTY_FINGERPRINT);
		assert_eq!(built.join(','), None);
	}

	#[test]
	fn invalid_scopes_error() {
		assert_eq!(ScopeSet::new([""]), Err(ScopeValidationError::Empty));
		assert!(matches!(
			ScopeSet::new(["cloud platform"]),
			Err(ScopeValidationError::ContainsWhitespace { .. })
		));
		assert!(ScopeSet::from_str("   ").is_err(), "Whitespace-only input must be rejected.");
	}

	#[test]
	fn contains_and_custom_delimiters() {
		let scopes = ScopeSet::from_str("https://www.googleapis.com/auth/cloud-platform openid")
			.expect("Scope string should parse successfully.");

		assert!(scopes.contains("openid"));
		assert!(!scopes.contains("email"));
		assert_eq!(
			scopes.join(',').as_deref(),
			Some("https://www.googleapis.com/auth/cloud-platform,openid")
		);
	}

	#[test]
	fn serde_uses_sequences() {
		let scopes = ScopeSet::new(["b", "a"]).expect("Scope fixture should be valid.");
		let json = serde_json::to_string(&scopes).expect("Scope set should serialize.");

		assert_eq!(json, "[\"a\",\"b\"]");
		assert!(serde_json::from_str::<ScopeSet>("[\"has space\"]").is_err());
	}
}
