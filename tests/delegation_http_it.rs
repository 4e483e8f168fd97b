// std
use std::sync::Arc;
// crates.io
use httpmock::prelude::*;
use serde_json::json;
// self
use credential_broker::{
	_preludet::*,
	auth::{PrincipalId, SourceId},
	broker::Broker,
	config::BrokerConfig,
	delegation::{DelegationEngine, DelegationError, HttpDelegationEngine, TrustBrokerEndpoint},
	error::ErrorKind,
	http::{ReqwestHttpClient, ReqwestTransportErrorMapper},
	source::{SourceCredential, StaticSource},
};

type TestEngine = HttpDelegationEngine<ReqwestHttpClient, ReqwestTransportErrorMapper>;

const PATH: &str = "/v1/projects/-/serviceAccounts/svc-a@x:generateAccessToken";

fn endpoint(server: &MockServer) -> TrustBrokerEndpoint {
	TrustBrokerEndpoint::builder()
		.url_template(server.url("/v1/projects/-/serviceAccounts/{principal}:generateAccessToken"))
		.build()
		.expect("Mock delegation endpoint should be accepted.")
}

fn engine(server: &MockServer) -> TestEngine {
	let (http_client, mapper) = test_transport();

	HttpDelegationEngine::with_http_client(endpoint(server), http_client, mapper)
}

fn source_credential() -> SourceCredential {
	SourceCredential::new(
		SourceId::new("static").expect("Source identifier should be valid."),
		"base-token",
	)
}

async fn delegate_against(status: u16, body: &str) -> DelegationError {
	let server = MockServer::start_async().await;
	let body = body.to_owned();
	let mock = server
		.mock_async(move |when, then| {
			when.method(POST).path(PATH);
			then.status(status).header("content-type", "application/json").body(body);
		})
		.await;
	let err = engine(&server)
		.delegate(&source_credential(), &test_descriptor("svc-a@x", &["scope1"], 3600))
		.await
		.expect_err("Mock response should fail the delegation.");

	mock.assert_calls_async(1).await;

	err
}

#[tokio::test]
async fn delegates_travel_in_the_request_body() {
	let server = MockServer::start_async().await;
	let endpoint = TrustBrokerEndpoint::builder()
		.url_template(server.url("/v1/projects/-/serviceAccounts/{principal}:generateAccessToken"))
		.delegate(PrincipalId::new("hop@x").expect("Delegate identifier should be valid."))
		.build()
		.expect("Mock delegation endpoint should be accepted.");
	let (http_client, mapper) = test_transport();
	let engine: TestEngine = HttpDelegationEngine::with_http_client(endpoint, http_client, mapper);
	let mock = server
		.mock_async(|when, then| {
			when.method(POST)
				.path(PATH)
				.header("authorization", "Bearer base-token")
				.header("content-type", "application/json")
				.json_body(json!({
					"delegates": ["hop@x"],
					"scope": ["scope1", "scope2"],
					"lifetime": "900s"
				}));
			then.status(200).header("content-type", "application/json").json_body(json!({
				"accessToken": "delegated-token",
				"expireTime": "2999-06-01T12:00:00Z"
			}));
		})
		.await;
	let credential = engine
		.delegate(&source_credential(), &test_descriptor("svc-a@x", &["scope2", "scope1"], 900))
		.await
		.expect("Delegation through a delegate chain should succeed.");

	mock.assert_async().await;

	assert_eq!(credential.token().expose(), "delegated-token");
	assert_eq!(credential.expires_at().year(), 2999);
}

#[tokio::test]
async fn permission_failures_are_denials() {
	let err = delegate_against(
		403,
		r#"{"error":{"code":403,"message":"Permission 'iam.serviceAccounts.getAccessToken' denied","status":"PERMISSION_DENIED"}}"#,
	)
	.await;

	assert_eq!(err.kind(), ErrorKind::DelegationDenied);
	assert!(!err.is_retryable());
	assert!(matches!(err, DelegationError::Denied { status: Some(403), .. }));
}

#[tokio::test]
async fn malformed_requests_are_invalid() {
	let err = delegate_against(
		400,
		r#"{"error":{"code":400,"message":"Lifetime too long","status":"INVALID_ARGUMENT"}}"#,
	)
	.await;

	assert_eq!(err.kind(), ErrorKind::DelegationRequestInvalid);
	assert!(err.to_string().contains("Lifetime too long"));
}

#[tokio::test]
async fn server_errors_are_transient_and_carry_retry_after() {
	let server = MockServer::start_async().await;
	let mock = server
		.mock_async(|when, then| {
			when.method(POST).path(PATH);
			then.status(503).header("retry-after", "7").body("backend unavailable");
		})
		.await;
	let err = engine(&server)
		.delegate(&source_credential(), &test_descriptor("svc-a@x", &["scope1"], 3600))
		.await
		.expect_err("Unavailable upstream should fail the delegation.");

	mock.assert_async().await;

	assert_eq!(err.kind(), ErrorKind::UpstreamUnavailable);
	assert!(err.is_retryable());
	assert_eq!(err.retry_after(), Some(Duration::seconds(7)));
}

#[tokio::test]
async fn malformed_success_bodies_are_transient() {
	let server = MockServer::start_async().await;

	server
		.mock_async(|when, then| {
			when.method(POST).path(PATH);
			then.status(200).header("content-type", "application/json").body("{\"token\":1}");
		})
		.await;

	let err = engine(&server)
		.delegate(&source_credential(), &test_descriptor("svc-a@x", &["scope1"], 3600))
		.await
		.expect_err("Unparseable response should fail the delegation.");

	assert_eq!(err.kind(), ErrorKind::UpstreamUnavailable);
	assert!(err.to_string().contains("accessToken"));
}

#[tokio::test]
async fn broker_serves_http_delegations_from_cache() {
	let server = MockServer::start_async().await;
	let mock = server
		.mock_async(|when, then| {
			when.method(POST).path(PATH).header("authorization", "Bearer base-token");
			then.status(200).header("content-type", "application/json").json_body(json!({
				"accessToken": "tok1",
				"expireTime": "2999-01-01T00:00:00Z"
			}));
		})
		.await;
	let source =
		StaticSource::new(SourceId::new("static").expect("Source identifier should be valid."), "base-token");
	let broker = Broker::new(source, Arc::new(engine(&server)), BrokerConfig::default())
		.expect("Broker should build.");
	let (first, second) = tokio::join!(
		broker.request("svc-a@x", ["scope1"], 3600),
		broker.request("svc-a@x", ["scope1"], 3600),
	);
	let first = first.expect("First concurrent request should succeed.");
	let second = second.expect("Second concurrent request should succeed.");

	assert!(first.same_issue(&second));

	let third = broker.request("svc-a@x", ["scope1"], 3600).await.expect("Cached request should succeed.");

	assert_eq!(third.token().expose(), "tok1");

	mock.assert_calls_async(1).await;
}

#[tokio::test]
async fn broker_retries_http_unavailability_then_gives_up() {
	let server = MockServer::start_async().await;
	let mock = server
		.mock_async(|when, then| {
			when.method(POST).path(PATH);
			then.status(502).body("bad gateway");
		})
		.await;
	let source =
		StaticSource::new(SourceId::new("static").expect("Source identifier should be valid."), "base-token");
	let config = BrokerConfig::default()
		.with_max_retries(2)
		.with_backoff(Duration::milliseconds(1), Duration::milliseconds(5));
	let broker =
		Broker::new(source, Arc::new(engine(&server)), config).expect("Broker should build.");
	let err = broker
		.request("svc-a@x", ["scope1"], 3600)
		.await
		.expect_err("Persistent 502 responses should surface.");

	assert_eq!(err.kind(), ErrorKind::UpstreamUnavailable);
	assert_eq!(err.attempts(), 3);

	mock.assert_calls_async(3).await;
}
