//! Transport primitives for credential exchanges.
//!
//! [`TokenHttpClient`] is the broker's only dependency on an HTTP stack. Sources and engines
//! ask it for short-lived [`AsyncHttpClient`] handles that publish the response status and any
//! `Retry-After` hint into a [`ResponseMetadataSlot`], which [`TransportErrorMapper`]
//! implementations read when classifying failures.

// crates.io
use oauth2::{AsyncHttpClient, HttpClientError, HttpRequest, HttpResponse};
#[cfg(feature = "reqwest")] use reqwest::header::{HeaderMap, RETRY_AFTER};
#[cfg(feature = "reqwest")] use std::ops::Deref;
use time::format_description::well_known::Rfc2822;
// self
use crate::{
	_prelude::*,
	error::{ConfigError, TransportError},
};

/// Abstraction over HTTP transports capable of executing credential exchanges while
/// publishing response metadata.
///
/// Implementations must be `Send + Sync + 'static` so one transport can back every source and
/// engine of a broker, and the futures returned by their handles must be `Send` so refreshes can
/// run on spawned tasks.
pub trait TokenHttpClient
where
	Self: 'static + Send + Sync,
{
	/// Concrete error emitted by the underlying transport.
	type TransportError: 'static + Send + Sync + StdError;

	/// [`AsyncHttpClient`] handle tied to a [`ResponseMetadataSlot`].
	type Handle: for<'c> AsyncHttpClient<
			'c,
			Error = HttpClientError<Self::TransportError>,
			Future: 'c + Send,
		>
		+ 'static
		+ Send
		+ Sync;

	/// Builds an [`AsyncHttpClient`] handle that records outcomes in `slot`.
	///
	/// # Metadata Contract
	///
	/// - Call [`ResponseMetadataSlot::take`] before submitting the HTTP request so stale
	///   information never leaks across retries.
	/// - Once a response provides a status, save it with [`ResponseMetadataSlot::store`].
	fn with_metadata(&self, slot: ResponseMetadataSlot) -> Self::Handle;
}

/// Maps transport failures into the broker's [`TransportError`].
pub trait TransportErrorMapper<E>
where
	Self: 'static + Send + Sync,
	E: 'static + Send + Sync + StdError,
{
	/// Converts an [`HttpClientError`] emitted while calling `endpoint`.
	fn map_transport_error(
		&self,
		endpoint: &'static str,
		metadata: Option<&ResponseMetadata>,
		error: HttpClientError<E>,
	) -> TransportError;
}

/// Metadata captured from the most recent HTTP response.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ResponseMetadata {
	/// HTTP status code, if available.
	pub status: Option<u16>,
	/// Retry-After hint expressed as a relative duration.
	pub retry_after: Option<Duration>,
}

/// Thread-safe slot for sharing [`ResponseMetadata`] between transport and error layers.
#[derive(Clone, Debug, Default)]
pub struct ResponseMetadataSlot(Arc<Mutex<Option<ResponseMetadata>>>);
impl ResponseMetadataSlot {
	/// Stores new metadata for the current request.
	pub fn store(&self, meta: ResponseMetadata) {
		*self.0.lock() = Some(meta);
	}

	/// Returns the captured metadata, if any, consuming it from the slot.
	pub fn take(&self) -> Option<ResponseMetadata> {
		self.0.lock().take()
	}
}

/// Sends `request` and returns the raw response along with whatever metadata the transport
/// captured. Non-2xx responses are returned as-is; only transport failures become errors.
pub(crate) async fn send<C, M>(
	client: &C,
	mapper: &M,
	endpoint: &'static str,
	request: HttpRequest,
) -> Result<(HttpResponse, Option<ResponseMetadata>), TransportError>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	let slot = ResponseMetadataSlot::default();
	let handle = client.with_metadata(slot.clone());

	match handle.call(request).await {
		Ok(response) => Ok((response, slot.take())),
		Err(err) => Err(mapper.map_transport_error(endpoint, slot.take().as_ref(), err)),
	}
}

/// Thin wrapper around [`ReqwestClient`] so shared HTTP behavior lives in one place.
///
/// Credential endpoints answer directly; configure any custom client to disable redirects.
#[cfg(feature = "reqwest")]
#[derive(Clone, Default)]
pub struct ReqwestHttpClient(pub ReqwestClient);
#[cfg(feature = "reqwest")]
impl ReqwestHttpClient {
	/// Wraps an existing reqwest [`ReqwestClient`].
	pub fn with_client(client: ReqwestClient) -> Self {
		Self(client)
	}
}
#[cfg(feature = "reqwest")]
impl AsRef<ReqwestClient> for ReqwestHttpClient {
	fn as_ref(&self) -> &ReqwestClient {
		&self.0
	}
}
#[cfg(feature = "reqwest")]
impl Deref for ReqwestHttpClient {
	type Target = ReqwestClient;

	fn deref(&self) -> &Self::Target {
		&self.0
	}
}
#[cfg(feature = "reqwest")]
impl TokenHttpClient for ReqwestHttpClient {
	type Handle = InstrumentedHandle;
	type TransportError = ReqwestError;

	fn with_metadata(&self, slot: ResponseMetadataSlot) -> Self::Handle {
		InstrumentedHandle(Arc::new(InstrumentedHttpClient { client: self.0.clone(), slot }))
	}
}

#[cfg(feature = "reqwest")]
struct InstrumentedHttpClient {
	client: ReqwestClient,
	slot: ResponseMetadataSlot,
}

/// Handle returned by [`ReqwestHttpClient`] that records response metadata.
#[cfg(feature = "reqwest")]
#[derive(Clone)]
pub struct InstrumentedHandle(Arc<InstrumentedHttpClient>);
#[cfg(feature = "reqwest")]
impl<'c> AsyncHttpClient<'c> for InstrumentedHandle {
	type Error = HttpClientError<ReqwestError>;
	type Future =
		Pin<Box<dyn Future<Output = Result<HttpResponse, Self::Error>> + 'c + Send + Sync>>;

	fn call(&'c self, request: HttpRequest) -> Self::Future {
		let inner = Arc::clone(&self.0);

		Box::pin(async move {
			inner.slot.take();

			let response = inner
				.client
				.execute(request.try_into().map_err(Box::new)?)
				.await
				.map_err(Box::new)?;
			let status = response.status();
			let headers = response.headers().to_owned();
			let retry_after = parse_retry_after(&headers);

			inner.slot.store(ResponseMetadata { status: Some(status.as_u16()), retry_after });

			let mut converted =
				HttpResponse::new(response.bytes().await.map_err(Box::new)?.to_vec());

			*converted.status_mut() = status;
			*converted.headers_mut() = headers;

			Ok(converted)
		})
	}
}

/// Default mapper for reqwest-backed transports.
#[cfg(feature = "reqwest")]
#[derive(Clone, Debug, Default)]
pub struct ReqwestTransportErrorMapper;
#[cfg(feature = "reqwest")]
impl TransportErrorMapper<ReqwestError> for ReqwestTransportErrorMapper {
	fn map_transport_error(
		&self,
		endpoint: &'static str,
		meta: Option<&ResponseMetadata>,
		err: HttpClientError<ReqwestError>,
	) -> TransportError {
		match err {
			HttpClientError::Reqwest(inner) => map_reqwest_error(endpoint, meta, *inner),
			HttpClientError::Http(inner) =>
				TransportError::Request { endpoint, message: inner.to_string() },
			HttpClientError::Io(inner) => TransportError::Io { endpoint, message: inner.to_string() },
			HttpClientError::Other(message) => network_error(endpoint, meta, message),
			_ => network_error(endpoint, meta, "unrecognized HTTP client failure"),
		}
	}
}

#[cfg(feature = "reqwest")]
fn map_reqwest_error(
	endpoint: &'static str,
	meta: Option<&ResponseMetadata>,
	err: ReqwestError,
) -> TransportError {
	if err.is_builder() {
		return TransportError::Request { endpoint, message: err.to_string() };
	}
	if err.is_timeout() {
		return TransportError::Timeout { endpoint };
	}

	let status = meta.and_then(|m| m.status).or_else(|| err.status().map(|code| code.as_u16()));

	TransportError::Network {
		endpoint,
		message: err.to_string(),
		status,
		retry_after: meta.and_then(|m| m.retry_after),
	}
}

/// Builds a [`TransportError::Network`] carrying whatever metadata the transport captured.
pub fn network_error(
	endpoint: &'static str,
	meta: Option<&ResponseMetadata>,
	message: impl Display,
) -> TransportError {
	TransportError::Network {
		endpoint,
		message: message.to_string(),
		status: meta.and_then(|m| m.status),
		retry_after: meta.and_then(|m| m.retry_after),
	}
}

/// Parses an endpoint URL, requiring HTTPS unless the host is a loopback address.
pub fn parse_endpoint(endpoint: &'static str, raw: &str) -> Result<Url, ConfigError> {
	let url = Url::parse(raw).map_err(|source| ConfigError::InvalidEndpoint { endpoint, source })?;

	match url.scheme() {
		"https" => Ok(url),
		"http" if is_loopback(&url) => Ok(url),
		_ => Err(ConfigError::InsecureEndpoint { endpoint, url: url.to_string() }),
	}
}

fn is_loopback(url: &Url) -> bool {
	match url.host() {
		Some(url::Host::Domain(domain)) => domain.eq_ignore_ascii_case("localhost"),
		Some(url::Host::Ipv4(ip)) => ip.is_loopback(),
		Some(url::Host::Ipv6(ip)) => ip.is_loopback(),
		None => false,
	}
}

/// Parses a `Retry-After` header value given either as delta-seconds or an HTTP date.
pub fn parse_retry_after_value(raw: &str, now: OffsetDateTime) -> Option<Duration> {
	let raw = raw.trim();

	if let Ok(secs) = raw.parse::<u32>() {
		return Some(Duration::seconds(i64::from(secs)));
	}

	let moment = OffsetDateTime::parse(raw, &Rfc2822).ok()?;
	let delta = moment - now;

	delta.is_positive().then_some(delta)
}

#[cfg(feature = "reqwest")]
fn parse_retry_after(headers: &HeaderMap) -> Option<Duration> {
	let raw = headers.get(RETRY_AFTER)?.to_str().ok()?;

	parse_retry_after_value(raw, OffsetDateTime::now_utc())
}

#[cfg(test)]
mod tests {
	// crates.io
	use time::macros;
	// self
	use super::*;

	#[test]
	fn retry_after_accepts_seconds_and_dates() {
		let now = macros::datetime!(2025-01-01 00:00 UTC);

		assert_eq!(parse_retry_after_value(" 7 ", now), Some(Duration::seconds(7)));
		assert_eq!(
			parse_retry_after_value("Wed, 01 Jan 2025 00:00:30 +0000", now),
			Some(Duration::seconds(30))
		);
		assert_eq!(parse_retry_after_value("Tue, 31 Dec 2024 23:00:00 +0000", now), None);
		assert_eq!(parse_retry_after_value("soon", now), None);
	}

	#[test]
	fn endpoints_require_https_except_loopback() {
		assert!(parse_endpoint("sts", "https://sts.example.com/v1/token").is_ok());
		assert!(parse_endpoint("sts", "http://127.0.0.1:8080/v1/token").is_ok());
		assert!(parse_endpoint("sts", "http://localhost/v1/token").is_ok());
		assert!(matches!(
			parse_endpoint("sts", "http://sts.example.com/v1/token"),
			Err(ConfigError::InsecureEndpoint { endpoint: "sts", .. })
		));
		assert!(matches!(
			parse_endpoint("sts", "not a url"),
			Err(ConfigError::InvalidEndpoint { endpoint: "sts", .. })
		));
	}

	#[test]
	fn metadata_slot_is_consumed_on_take() {
		let slot = ResponseMetadataSlot::default();

		slot.store(ResponseMetadata { status: Some(429), retry_after: None });

		assert_eq!(slot.take().and_then(|meta| meta.status), Some(429));
		assert!(slot.take().is_none());
	}
}
