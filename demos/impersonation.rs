//! Impersonates a service principal through the HTTP delegation engine and shows that repeated
//! requests are served from the broker cache.

// std
use std::sync::Arc;
// crates.io
use color_eyre::Result;
use httpmock::prelude::*;
use serde_json::json;
// self
use credential_broker::{
	auth::SourceId,
	broker::Broker,
	config::BrokerConfig,
	delegation::{HttpDelegationEngine, TrustBrokerEndpoint},
	http::{ReqwestHttpClient, ReqwestTransportErrorMapper},
	reqwest::Client,
	source::StaticSource,
};

#[tokio::main]
async fn main() -> Result<()> {
	color_eyre::install()?;

	let server = MockServer::start_async().await;
	let delegation_mock = server
		.mock_async(|when, then| {
			when.method(POST)
				.path("/v1/projects/-/serviceAccounts/deployer@demo.iam:generateAccessToken")
				.header("authorization", "Bearer operator-token");
			then.status(200).header("content-type", "application/json").json_body(json!({
				"accessToken": "deployer-access",
				"expireTime": "2999-01-01T00:00:00Z"
			}));
		})
		.await;
	let endpoint = TrustBrokerEndpoint::builder()
		.url_template(server.url("/v1/projects/-/serviceAccounts/{principal}:generateAccessToken"))
		.build()?;
	let http_client = ReqwestHttpClient::with_client(
		Client::builder()
			.danger_accept_invalid_certs(true)
			.danger_accept_invalid_hostnames(true)
			.build()?,
	);
	let engine = <HttpDelegationEngine<ReqwestHttpClient, ReqwestTransportErrorMapper>>::with_http_client(
		endpoint,
		http_client,
		Arc::new(ReqwestTransportErrorMapper),
	);
	let source = StaticSource::new(SourceId::new("operator")?, "operator-token");
	let broker = Broker::new(source, engine, BrokerConfig::default())?;

	for _ in 0..3 {
		let credential = broker
			.request("deployer@demo.iam", ["https://www.googleapis.com/auth/cloud-platform"], 3600)
			.await?;

		println!("Delegated token {} expires at {}.", credential.token(), credential.expires_at());
	}

	println!("Broker activity: {:?}.", broker.metrics().snapshot());

	delegation_mock.assert_calls_async(1).await;

	Ok(())
}
