//! Mints a base token with the client-credentials grant, memoizes it, and requests short-lived
//! delegated tokens under a configuration loaded from JSON.

// std
use std::sync::Arc;
// crates.io
use color_eyre::Result;
use httpmock::prelude::*;
use serde_json::json;
// self
use credential_broker::{
	auth::{IdentityDescriptor, PrincipalId, ScopeSet, SourceId},
	broker::Broker,
	config::BrokerConfig,
	delegation::{HttpDelegationEngine, TrustBrokerEndpoint},
	http::{ReqwestHttpClient, ReqwestTransportErrorMapper},
	reqwest::Client,
	source::{CachedSource, ClientCredentialsSource},
};

const CONFIG: &str = r#"{
	"safety_margin_secs": 120,
	"max_retries": 2,
	"backoff_base_ms": 100,
	"backoff_cap_ms": 2000,
	"wait_timeout_ms": 5000
}"#;

#[tokio::main]
async fn main() -> Result<()> {
	color_eyre::install()?;

	let server = MockServer::start_async().await;
	let token_mock = server
		.mock_async(|when, then| {
			when.method(POST).path("/token");
			then.status(200).header("content-type", "application/json").body(
				"{\"access_token\":\"ci-base\",\"token_type\":\"bearer\",\"expires_in\":3600}",
			);
		})
		.await;
	let delegation_mock = server
		.mock_async(|when, then| {
			when.method(POST)
				.path("/v1/projects/-/serviceAccounts/reader@demo.iam:generateAccessToken")
				.header("authorization", "Bearer ci-base")
				.json_body(json!({ "scope": ["storage.read"], "lifetime": "600s" }));
			then.status(200).header("content-type", "application/json").json_body(json!({
				"accessToken": "reader-access",
				"expireTime": "2999-01-01T00:00:00Z"
			}));
		})
		.await;
	let http_client = Arc::new(ReqwestHttpClient::with_client(
		Client::builder()
			.danger_accept_invalid_certs(true)
			.danger_accept_invalid_hostnames(true)
			.build()?,
	));
	let mapper = Arc::new(ReqwestTransportErrorMapper);
	let base = <ClientCredentialsSource<ReqwestHttpClient, ReqwestTransportErrorMapper>>::with_http_client(
		SourceId::new("ci-runner")?,
		&server.url("/token"),
		"ci-runner",
		"runner-secret",
		ScopeSet::new(["iam.delegate"])?,
		Arc::clone(&http_client),
		Arc::clone(&mapper),
	)?;
	let source = CachedSource::new(base);
	let endpoint = TrustBrokerEndpoint::builder()
		.url_template(server.url("/v1/projects/-/serviceAccounts/{principal}:generateAccessToken"))
		.build()?;
	let engine = <HttpDelegationEngine<ReqwestHttpClient, ReqwestTransportErrorMapper>>::with_http_client(
		endpoint,
		http_client,
		mapper,
	);
	let config = BrokerConfig::from_json_str(CONFIG)?;
	let broker = Broker::new(source, engine, config)?;
	let descriptor = IdentityDescriptor::with_lifetime_secs(
		PrincipalId::new("reader@demo.iam")?,
		ScopeSet::new(["storage.read"])?,
		600,
	);
	let credential = broker
		.get_credential_with_timeout(&descriptor, Some(time::Duration::seconds(2)))
		.await?;

	println!(
		"Short-lived token {} expires at {}; state is {:?}.",
		credential.token(),
		credential.expires_at(),
		broker.state(&descriptor)
	);

	token_mock.assert_calls_async(1).await;
	delegation_mock.assert_calls_async(1).await;

	Ok(())
}
