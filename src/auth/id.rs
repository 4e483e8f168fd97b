//! Validated identifiers for principals and credential origins.

// std
use std::{borrow::Borrow, ops::Deref};
// self
use crate::_prelude::*;

macro_rules! def_id {
	($name:ident, $doc:literal, $kind:literal) => {
		#[doc = $doc]
		#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
		#[serde(try_from = "String", into = "String")]
		pub struct $name(Arc<str>);
		impl $name {
			/// Creates a new identifier after validation.
			pub fn new(value: impl AsRef<str>) -> Result<Self, IdentifierError> {
				let view = value.as_ref();

				validate_view($kind, view)?;

				Ok(Self(Arc::from(view)))
			}
		}
		impl Deref for $name {
			type Target = str;

			fn deref(&self) -> &Self::Target {
				&self.0
			}
		}
		impl AsRef<str> for $name {
			fn as_ref(&self) -> &str {
				&self.0
			}
		}
		impl From<$name> for String {
			fn from(value: $name) -> Self {
				value.0.to_string()
			}
		}
		impl TryFrom<String> for $name {
			type Error = IdentifierError;

			fn try_from(value: String) -> Result<Self, Self::Error> {
				Self::new(value)
			}
		}
		impl Borrow<str> for $name {
			fn borrow(&self) -> &str {
				&self.0
			}
		}
		impl Debug for $name {
			fn fmt(&self, f: &mut Formatter) -> FmtResult {
				write!(f, concat!($kind, "({})"), self.0)
			}
		}
		impl Display for $name {
			fn fmt(&self, f: &mut Formatter) -> FmtResult {
				f.write_str(&self.0)
			}
		}
		impl FromStr for $name {
			type Err = IdentifierError;

			fn from_str(s: &str) -> Result<Self, Self::Err> {
				Self::new(s)
			}
		}
	};
}

// Long enough for workload identity audiences such as
// `//iam.googleapis.com/projects/<n>/locations/global/workloadIdentityPools/<pool>/providers/<p>`.
const IDENTIFIER_MAX_LEN: usize = 512;

/// Error returned when identifier validation fails.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, ThisError)]
pub enum IdentifierError {
	/// The identifier was empty.
	#[error("{kind} identifier cannot be empty.")]
	Empty {
		/// Kind of identifier (principal, source).
		kind: &'static str,
	},
	/// The identifier contains whitespace characters.
	#[error("{kind} identifier contains whitespace.")]
	ContainsWhitespace {
		/// Kind of identifier (principal, source).
		kind: &'static str,
	},
	/// The identifier contains control characters.
	#[error("{kind} identifier contains control characters.")]
	ContainsControl {
		/// Kind of identifier (principal, source).
		kind: &'static str,
	},
	/// The identifier exceeded the allowed byte length.
	#[error("{kind} identifier exceeds {max} bytes.")]
	TooLong {
		/// Kind of identifier (principal, source).
		kind: &'static str,
		/// Maximum permitted length.
		max: usize,
	},
}

def_id! {
	PrincipalId,
	"Target principal of a delegation: a service-account style email or a federation audience.",
	"Principal"
}
def_id! { SourceId, "Label naming the origin of a source credential.", "Source" }

fn validate_view(kind: &'static str, view: &str) -> Result<(), IdentifierError> {
	if view.is_empty() {
		return Err(IdentifierError::Empty { kind });
	}
	if view.chars().any(char::is_whitespace) {
		return Err(IdentifierError::ContainsWhitespace { kind });
	}
	if view.chars().any(char::is_control) {
		return Err(IdentifierError::ContainsControl { kind });
	}
	if view.len() > IDENTIFIER_MAX_LEN {
		return Err(IdentifierError::TooLong { kind, max: IDENTIFIER_MAX_LEN });
	}

	Ok(())
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn principals_accept_emails_and_audiences() {
		let email = PrincipalId::new("target-sa@example.iam.gserviceaccount.com")
			.expect("Service account email should be a valid principal.");

		assert_eq!(email.as_ref(), "target-sa@example.iam.gserviceaccount.com");

		PrincipalId::new(
			"//iam.googleapis.com/projects/123/locations/global/workloadIdentityPools/pool/providers/gh",
		)
		.expect("Workload identity audience should be a valid principal.");
	}

	#[test]
	fn principals_reject_empty_and_padded_values() {
		assert!(matches!(PrincipalId::new(""), Err(IdentifierError::Empty { kind: "Principal" })));
		assert!(PrincipalId::new(" svc@x").is_err(), "Leading whitespace must be rejected.");
		assert!(PrincipalId::new("svc@x\u{00A0}").is_err(), "Unicode whitespace must be rejected.");
		assert!(SourceId::new("env\u{0007}").is_err());
	}

	#[test]
	fn length_limit_is_enforced() {
		PrincipalId::new("a".repeat(IDENTIFIER_MAX_LEN)).expect("Exact length should succeed.");

		assert!(PrincipalId::new("a".repeat(IDENTIFIER_MAX_LEN + 1)).is_err());
	}

	#[test]
	fn serde_enforces_validation() {
		let principal: PrincipalId = serde_json::from_str("\"svc-a@x\"")
			.expect("Principal should deserialize successfully.");

		assert_eq!(principal.as_ref(), "svc-a@x");
		assert!(serde_json::from_str::<PrincipalId>("\"with space\"").is_err());
		assert_eq!(format!("{principal:?}"), "Principal(svc-a@x)");
	}

	#[test]
	fn borrow_supports_lookup_by_str() {
		let map: HashMap<SourceId, u8> = HashMap::from_iter([(
			SourceId::new("ambient").expect("Source label fixture should be valid."),
			3_u8,
		)]);

		assert_eq!(map.get("ambient"), Some(&3));
	}
}
