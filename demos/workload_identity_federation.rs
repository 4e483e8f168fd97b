//! Reads an OIDC subject token from a file, exchanges it at a security token service, then
//! impersonates a target principal through a delegate chain.

// std
use std::{env, sync::Arc};
// crates.io
use color_eyre::Result;
use httpmock::prelude::*;
use serde_json::json;
// self
use credential_broker::{
	auth::{PrincipalId, SourceId},
	broker::Broker,
	config::BrokerConfig,
	delegation::{HttpDelegationEngine, TrustBrokerEndpoint},
	http::{ReqwestHttpClient, ReqwestTransportErrorMapper},
	reqwest::Client,
	source::{CachedSource, FederatedSource, FileSource, StsEndpoint, SubjectTokenFormat},
};

const AUDIENCE: &str =
	"//iam.googleapis.com/projects/123/locations/global/workloadIdentityPools/ci/providers/github";

#[tokio::main]
async fn main() -> Result<()> {
	color_eyre::install()?;

	let server = MockServer::start_async().await;
	let sts_mock = server
		.mock_async(|when, then| {
			when.method(POST)
				.path("/v1/token")
				.form_urlencoded_tuple("audience", AUDIENCE)
				.form_urlencoded_tuple("subject_token", "oidc-jwt");
			then.status(200).header("content-type", "application/json").json_body(json!({
				"access_token": "federated-access",
				"issued_token_type": "urn:ietf:params:oauth:token-type:access_token",
				"token_type": "Bearer",
				"expires_in": 3600
			}));
		})
		.await;
	let delegation_mock = server
		.mock_async(|when, then| {
			when.method(POST)
				.path("/v1/projects/-/serviceAccounts/release@demo.iam:generateAccessToken")
				.header("authorization", "Bearer federated-access")
				.json_body(json!({
					"delegates": ["builder@demo.iam"],
					"scope": ["artifacts.write"],
					"lifetime": "1800s"
				}));
			then.status(200).header("content-type", "application/json").json_body(json!({
				"accessToken": "release-access",
				"expireTime": "2999-01-01T00:00:00Z"
			}));
		})
		.await;
	let token_path = env::temp_dir().join("credential-broker-demo-oidc.json");

	tokio::fs::write(&token_path, r#"{"id_token":"oidc-jwt"}"#).await?;

	let subject = FileSource::new(SourceId::new("github-oidc")?, &token_path).with_format(
		SubjectTokenFormat::Json { subject_token_field_name: "id_token".into() },
	);
	let http_client = Arc::new(ReqwestHttpClient::with_client(
		Client::builder()
			.danger_accept_invalid_certs(true)
			.danger_accept_invalid_hostnames(true)
			.build()?,
	));
	let mapper = Arc::new(ReqwestTransportErrorMapper);
	let sts = StsEndpoint::builder(AUDIENCE).token_url(server.url("/v1/token")).build()?;
	let federated = <FederatedSource<ReqwestHttpClient, ReqwestTransportErrorMapper>>::with_http_client(
		SourceId::new("workload-identity")?,
		sts,
		Arc::new(subject),
		Arc::clone(&http_client),
		Arc::clone(&mapper),
	);
	let source = CachedSource::new(federated);
	let endpoint = TrustBrokerEndpoint::builder()
		.url_template(server.url("/v1/projects/-/serviceAccounts/{principal}:generateAccessToken"))
		.delegate(PrincipalId::new("builder@demo.iam")?)
		.build()?;
	let engine = <HttpDelegationEngine<ReqwestHttpClient, ReqwestTransportErrorMapper>>::with_http_client(
		endpoint,
		http_client,
		mapper,
	);
	let broker = Broker::new(source, engine, BrokerConfig::default())?;
	let credential = broker.request("release@demo.iam", ["artifacts.write"], 1800).await?;

	println!("Release token {} expires at {}.", credential.token(), credential.expires_at());

	sts_mock.assert_async().await;
	delegation_mock.assert_async().await;
	tokio::fs::remove_file(&token_path).await?;

	Ok(())
}
