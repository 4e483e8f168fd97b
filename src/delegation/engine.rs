// crates.io
use oauth2::http::{
	Method, Request,
	header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE},
};
use serde_json::{Map, Value};
use time::format_description::well_known::Rfc3339;
// self
use crate::{
	_prelude::*,
	auth::{Credential, IdentityDescriptor},
	delegation::{
		DefaultExchangeStrategy, DelegationEngine, DelegationError, DelegationFuture,
		ExchangeErrorContext, ExchangeErrorKind, ExchangeStrategy, TrustBrokerEndpoint,
		validate_descriptor,
	},
	http::{self, ResponseMetadata, TokenHttpClient, TransportErrorMapper},
	obs::{self, BrokerSpan, Outcome, Stage},
	source::SourceCredential,
};
#[cfg(feature = "reqwest")]
use crate::http::{ReqwestHttpClient, ReqwestTransportErrorMapper};

const ENDPOINT: &str = "delegation";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateAccessTokenResponse {
	access_token: String,
	expire_time: String,
}

/// Delegation engine speaking the `generateAccessToken` JSON exchange.
///
/// `POST <template with principal>` authorized with the source token as a bearer, body
/// `{"delegates"?, "scope": [...], "lifetime": "<secs>s"}`, response
/// `{"accessToken", "expireTime"}` with an RFC 3339 expiry.
pub struct HttpDelegationEngine<C, M>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	endpoint: TrustBrokerEndpoint,
	strategy: Arc<dyn ExchangeStrategy>,
	http_client: Arc<C>,
	error_mapper: Arc<M>,
}
impl<C, M> HttpDelegationEngine<C, M>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	/// Creates an engine backed by a caller-supplied transport and error mapper.
	pub fn with_http_client(
		endpoint: TrustBrokerEndpoint,
		http_client: impl Into<Arc<C>>,
		error_mapper: impl Into<Arc<M>>,
	) -> Self {
		Self {
			endpoint,
			strategy: Arc::new(DefaultExchangeStrategy),
			http_client: http_client.into(),
			error_mapper: error_mapper.into(),
		}
	}

	/// Replaces the failure classifier.
	pub fn with_strategy(mut self, strategy: Arc<dyn ExchangeStrategy>) -> Self {
		self.strategy = strategy;

		self
	}

	/// Configured endpoint.
	pub fn endpoint(&self) -> &TrustBrokerEndpoint {
		&self.endpoint
	}

	fn request_body(&self, descriptor: &IdentityDescriptor) -> Result<Vec<u8>, DelegationError> {
		let mut body = Map::new();

		if !self.endpoint.delegates().is_empty() {
			body.insert(
				"delegates".into(),
				self.endpoint.delegates().iter().map(|d| Value::from(&**d)).collect(),
			);
		}

		body.insert("scope".into(), descriptor.scopes().iter().map(Value::from).collect());
		body.insert(
			"lifetime".into(),
			Value::from(format!("{}s", descriptor.lifetime().whole_seconds())),
		);
		self.strategy.augment_request(&mut body);

		serde_json::to_vec(&body).map_err(|e| DelegationError::invalid(e.to_string()))
	}

	fn classify_failure(
		&self,
		status: u16,
		body: &[u8],
		meta: Option<&ResponseMetadata>,
	) -> DelegationError {
		let ctx = ExchangeErrorContext::from_response(status, body);
		let message = ctx.summary();

		match self.strategy.classify(&ctx) {
			ExchangeErrorKind::InvalidRequest => DelegationError::RequestInvalid { reason: message },
			ExchangeErrorKind::Denied => DelegationError::Denied { reason: message, status: Some(status) },
			ExchangeErrorKind::Transient => DelegationError::UpstreamUnavailable {
				message,
				status: Some(status),
				retry_after: meta.and_then(|m| m.retry_after),
			},
		}
	}

	async fn exchange(
		&self,
		source: &SourceCredential,
		descriptor: &IdentityDescriptor,
	) -> Result<Credential, DelegationError> {
		validate_descriptor(descriptor)?;

		let url = self.endpoint.url_for(descriptor.principal())?;
		let request = Request::builder()
			.method(Method::POST)
			.uri(url.as_str())
			.header(AUTHORIZATION, source.token().bearer())
			.header(CONTENT_TYPE, "application/json")
			.header(ACCEPT, "application/json")
			.body(self.request_body(descriptor)?)
			.map_err(|e| DelegationError::invalid(e.to_string()))?;
		let issued_at = OffsetDateTime::now_utc();
		let (response, meta) =
			http::send(self.http_client.as_ref(), self.error_mapper.as_ref(), ENDPOINT, request)
				.await?;
		let status = response.status();

		if !status.is_success() {
			return Err(self.classify_failure(status.as_u16(), response.body(), meta.as_ref()));
		}

		let mut deserializer = serde_json::Deserializer::from_slice(response.body());
		let parsed: GenerateAccessTokenResponse =
			serde_path_to_error::deserialize(&mut deserializer).map_err(|e| {
				DelegationError::unavailable(format!("malformed delegation response: {e}"))
			})?;
		let expires_at = OffsetDateTime::parse(&parsed.expire_time, &Rfc3339).map_err(|e| {
			DelegationError::unavailable(format!("malformed expireTime `{}`: {e}", parsed.expire_time))
		})?;

		Credential::builder(descriptor.clone())
			.token(parsed.access_token)
			.issued_at(issued_at)
			.expires_at(expires_at)
			.build()
			.map_err(|e| DelegationError::unavailable(format!("unusable delegated credential: {e}")))
	}
}
#[cfg(feature = "reqwest")]
impl HttpDelegationEngine<ReqwestHttpClient, ReqwestTransportErrorMapper> {
	/// Creates an engine backed by the default reqwest transport.
	pub fn new(endpoint: TrustBrokerEndpoint) -> Self {
		Self::with_http_client(endpoint, ReqwestHttpClient::default(), ReqwestTransportErrorMapper)
	}
}
impl<C, M> DelegationEngine for HttpDelegationEngine<C, M>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	fn delegate<'a>(
		&'a self,
		source: &'a SourceCredential,
		descriptor: &'a IdentityDescriptor,
	) -> DelegationFuture<'a> {
		let span = BrokerSpan::new(Stage::Delegate, descriptor.principal());

		Box::pin(span.instrument(async move {
			obs::record_outcome(Stage::Delegate, Outcome::Attempt);

			let result = self.exchange(source, descriptor).await;

			obs::record_outcome(
				Stage::Delegate,
				if result.is_ok() { Outcome::Success } else { Outcome::Failure },
			);

			result
		}))
	}
}
impl<C, M> Debug for HttpDelegationEngine<C, M>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("HttpDelegationEngine").field("endpoint", &self.endpoint).finish()
	}
}

#[cfg(all(test, feature = "reqwest"))]
mod tests {
	// crates.io
	use httpmock::prelude::*;
	use serde_json::json;
	// self
	use super::*;
	use crate::{_preludet::*, auth::SourceId, error::ErrorKind};

	type TestEngine = HttpDelegationEngine<ReqwestHttpClient, ReqwestTransportErrorMapper>;

	fn engine(server: &MockServer) -> TestEngine {
		let endpoint = TrustBrokerEndpoint::builder()
			.url_template(server.url("/v1/{principal}:generateAccessToken"))
			.build()
			.expect("Mock endpoint should be accepted.");
		let (http_client, mapper) = test_transport();

		HttpDelegationEngine::with_http_client(endpoint, http_client, mapper)
	}

	fn source() -> SourceCredential {
		SourceCredential::new(SourceId::new("static").expect("Source fixture should be valid."), "base")
	}

	#[tokio::test]
	async fn posts_the_generate_access_token_shape() {
		let server = MockServer::start_async().await;
		let mock = server
			.mock_async(|when, then| {
				when.method(POST)
					.path("/v1/svc-a@x:generateAccessToken")
					.header("authorization", "Bearer base")
					.json_body(json!({ "scope": ["scope1"], "lifetime": "3600s" }));
				then.status(200).json_body(json!({
					"accessToken": "tok1",
					"expireTime": "2999-01-01T00:00:00Z"
				}));
			})
			.await;
		let descriptor = test_descriptor("svc-a@x", &["scope1"], 3600);
		let credential = engine(&server)
			.delegate(&source(), &descriptor)
			.await
			.expect("Delegation should succeed.");

		mock.assert_async().await;

		assert_eq!(credential.token().expose(), "tok1");
		assert_eq!(credential.expires_at().year(), 2999);
		assert_eq!(credential.descriptor(), &descriptor);
	}

	#[tokio::test]
	async fn invalid_descriptors_never_reach_the_network() {
		let server = MockServer::start_async().await;
		let mock = server
			.mock_async(|when, then| {
				when.method(POST);
				then.status(500);
			})
			.await;
		let err = engine(&server)
			.delegate(&source(), &test_descriptor("svc-a@x", &[], 3600))
			.await
			.expect_err("Empty scopes should be rejected.");

		assert_eq!(err.kind(), ErrorKind::DelegationRequestInvalid);
		mock.assert_calls_async(0).await;
	}
}
