//! Broker-level error types shared across sources, engines, and the facade.

// self
use crate::{_prelude::*, auth::IdentityDescriptor, delegation::DelegationError};

/// Broker-wide result type alias returning [`Error`] by default.
pub type Result<T, E = Error> = std::result::Result<T, E>;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Canonical error exposed by public APIs that span construction and credential requests.
#[derive(Debug, ThisError)]
pub enum Error {
	/// Local configuration problem.
	#[error(transparent)]
	Config(#[from] ConfigError),
	/// A credential request failed.
	#[error(transparent)]
	Broker(#[from] BrokerError),
}

/// Configuration and validation failures raised while building broker components.
#[derive(Debug, ThisError)]
pub enum ConfigError {
	/// HTTP client could not be constructed.
	#[error("HTTP client could not be constructed.")]
	HttpClientBuild {
		/// Underlying transport builder failure.
		#[source]
		source: BoxError,
	},
	/// An endpoint URL could not be parsed.
	#[error("The {endpoint} endpoint is not a valid URL.")]
	InvalidEndpoint {
		/// Which endpoint failed validation.
		endpoint: &'static str,
		/// Underlying parsing failure.
		#[source]
		source: url::ParseError,
	},
	/// Endpoints must use HTTPS unless they point at a loopback host.
	#[error("The {endpoint} endpoint must use HTTPS: {url}.")]
	InsecureEndpoint {
		/// Which endpoint failed validation.
		endpoint: &'static str,
		/// Endpoint URL that failed validation.
		url: String,
	},
	/// A required builder field was not supplied.
	#[error("Missing required setting `{field}`.")]
	MissingSetting {
		/// Name of the missing field.
		field: &'static str,
	},
	/// A setting holds a value outside its permitted range.
	#[error("Setting `{field}` is invalid: {reason}.")]
	InvalidSetting {
		/// Name of the offending field.
		field: &'static str,
		/// Why the value was rejected.
		reason: &'static str,
	},
	/// Configuration document could not be parsed.
	#[error("Configuration could not be parsed.")]
	Parse {
		/// Path-aware parsing failure.
		#[source]
		source: serde_path_to_error::Error<serde_json::Error>,
	},
	/// Scope input cannot be normalized.
	#[error("Configured scopes are invalid.")]
	InvalidScope(#[from] crate::auth::ScopeValidationError),
	/// Identifier input failed validation.
	#[error("Configured identifier is invalid.")]
	InvalidIdentifier(#[from] crate::auth::IdentifierError),
}
impl ConfigError {
	/// Wraps a transport's builder failure inside [`ConfigError`].
	pub fn http_client_build(src: impl 'static + Send + Sync + std::error::Error) -> Self {
		Self::HttpClientBuild { source: Box::new(src) }
	}
}
#[cfg(feature = "reqwest")]
impl From<ReqwestError> for ConfigError {
	fn from(e: ReqwestError) -> Self {
		Self::http_client_build(e)
	}
}

/// Transport-level failures (network, IO, request construction).
///
/// Payloads are kept as strings so a single failure can be handed to every waiter of a refresh.
#[derive(Clone, Debug, PartialEq, Eq, ThisError)]
pub enum TransportError {
	/// The HTTP client reported a network failure.
	#[error("Network error while calling {endpoint}: {message}.")]
	Network {
		/// Endpoint label (token, sts, delegation).
		endpoint: &'static str,
		/// Transport-specific description.
		message: String,
		/// HTTP status code, when one was received.
		status: Option<u16>,
		/// Retry-After hint, when one was received.
		retry_after: Option<Duration>,
	},
	/// The request timed out.
	#[error("Request to {endpoint} timed out.")]
	Timeout {
		/// Endpoint label (token, sts, delegation).
		endpoint: &'static str,
	},
	/// Underlying IO failure surfaced during transport.
	#[error("I/O error while calling {endpoint}: {message}.")]
	Io {
		/// Endpoint label (token, sts, delegation).
		endpoint: &'static str,
		/// IO error description.
		message: String,
	},
	/// The outbound request could not be constructed.
	#[error("Request to {endpoint} could not be built: {message}.")]
	Request {
		/// Endpoint label (token, sts, delegation).
		endpoint: &'static str,
		/// Builder failure description.
		message: String,
	},
}
impl TransportError {
	/// Returns `true` for failures worth retrying.
	pub fn is_retryable(&self) -> bool {
		!matches!(self, Self::Request { .. })
	}

	/// Retry-After hint carried by the failure, if any.
	pub fn retry_after(&self) -> Option<Duration> {
		match self {
			Self::Network { retry_after, .. } => *retry_after,
			_ => None,
		}
	}

	/// HTTP status carried by the failure, if any.
	pub fn status(&self) -> Option<u16> {
		match self {
			Self::Network { status, .. } => *status,
			_ => None,
		}
	}
}

/// Stage at which a credential request failed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
	/// The base credential could not be obtained.
	SourceUnavailable,
	/// Request parameters are malformed.
	DelegationRequestInvalid,
	/// The trust broker refused to let the source act as the target.
	DelegationDenied,
	/// Transient upstream failure that outlasted the retry budget.
	UpstreamUnavailable,
	/// The caller's wait bound elapsed before the refresh finished.
	Timeout,
}
impl ErrorKind {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			ErrorKind::SourceUnavailable => "source_unavailable",
			ErrorKind::DelegationRequestInvalid => "delegation_request_invalid",
			ErrorKind::DelegationDenied => "delegation_denied",
			ErrorKind::UpstreamUnavailable => "upstream_unavailable",
			ErrorKind::Timeout => "timeout",
		}
	}
}
impl Display for ErrorKind {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Typed failure returned by [`Broker`](crate::broker::Broker) credential requests.
///
/// The descriptor is absent only when the request could not even be turned into a descriptor
/// (for example an empty principal passed to [`Broker::request`](crate::broker::Broker::request)).
#[derive(Clone, Debug)]
pub struct BrokerError {
	kind: ErrorKind,
	descriptor: Option<IdentityDescriptor>,
	cause: Option<DelegationError>,
	attempts: u32,
}
impl BrokerError {
	/// Creates an error of `kind` for `descriptor`.
	pub fn new(kind: ErrorKind, descriptor: Option<IdentityDescriptor>) -> Self {
		Self { kind, descriptor, cause: None, attempts: 0 }
	}

	/// Attaches the delegation-level cause.
	pub fn with_cause(mut self, cause: DelegationError) -> Self {
		self.cause = Some(cause);

		self
	}

	/// Records how many delegation attempts were made before giving up.
	pub fn with_attempts(mut self, attempts: u32) -> Self {
		self.attempts = attempts;

		self
	}

	/// Failure stage.
	pub fn kind(&self) -> ErrorKind {
		self.kind
	}

	/// Descriptor the request was made for.
	pub fn descriptor(&self) -> Option<&IdentityDescriptor> {
		self.descriptor.as_ref()
	}

	/// Underlying delegation failure, when one exists.
	pub fn cause(&self) -> Option<&DelegationError> {
		self.cause.as_ref()
	}

	/// Number of delegation attempts performed (0 when the request never reached the engine).
	pub fn attempts(&self) -> u32 {
		self.attempts
	}

	/// Authorization rejections should be alerted on separately from transient noise.
	pub fn is_security_relevant(&self) -> bool {
		matches!(self.kind, ErrorKind::DelegationDenied)
	}

	/// Returns `true` when retrying the request later may succeed.
	pub fn is_transient(&self) -> bool {
		matches!(self.kind, ErrorKind::UpstreamUnavailable | ErrorKind::Timeout)
	}
}
impl Display for BrokerError {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		match &self.descriptor {
			Some(descriptor) =>
				write!(f, "Credential request for {} failed: {}", descriptor.principal(), self.kind)?,
			None => write!(f, "Credential request failed: {}", self.kind)?,
		}

		if self.attempts > 1 {
			write!(f, " after {} attempts", self.attempts)?;
		}

		f.write_str(".")
	}
}
impl StdError for BrokerError {
	fn source(&self) -> Option<&(dyn StdError + 'static)> {
		self.cause.as_ref().map(|cause| cause as &(dyn StdError + 'static))
	}
}
