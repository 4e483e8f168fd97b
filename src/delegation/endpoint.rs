// self
use crate::{
	_prelude::*,
	auth::PrincipalId,
	delegation::DelegationError,
	error::ConfigError,
	http,
};

const PRINCIPAL_PLACEHOLDER: &str = "{principal}";

/// Where and how delegation requests are sent.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TrustBrokerEndpoint {
	url_template: String,
	delegates: Vec<PrincipalId>,
}
impl TrustBrokerEndpoint {
	/// Template of the public IAM Credentials `generateAccessToken` method.
	pub const IAM_CREDENTIALS_TEMPLATE: &'static str = "https://iamcredentials.googleapis.com/v1/projects/-/serviceAccounts/{principal}:generateAccessToken";

	/// Starts a builder.
	pub fn builder() -> TrustBrokerEndpointBuilder {
		TrustBrokerEndpointBuilder::default()
	}

	/// Endpoint for the public IAM Credentials API.
	pub fn iam_credentials() -> Result<Self, ConfigError> {
		Self::builder().url_template(Self::IAM_CREDENTIALS_TEMPLATE).build()
	}

	/// URL template containing `{principal}`.
	pub fn url_template(&self) -> &str {
		&self.url_template
	}

	/// Intermediate principals in the delegation chain.
	pub fn delegates(&self) -> &[PrincipalId] {
		&self.delegates
	}

	/// Resolves the template for `principal`.
	///
	/// Principals that would escape the path segment are rejected as invalid requests.
	pub fn url_for(&self, principal: &PrincipalId) -> Result<Url, DelegationError> {
		if principal.contains(['/', '?', '#', '%', '{', '}']) {
			return Err(DelegationError::invalid(format!(
				"principal `{principal}` contains reserved characters"
			)));
		}

		Url::parse(&self.url_template.replace(PRINCIPAL_PLACEHOLDER, principal))
			.map_err(|e| DelegationError::invalid(e.to_string()))
	}
}

/// Builder for [`TrustBrokerEndpoint`].
#[derive(Clone, Debug, Default)]
pub struct TrustBrokerEndpointBuilder {
	url_template: Option<String>,
	delegates: Vec<PrincipalId>,
}
impl TrustBrokerEndpointBuilder {
	/// Sets the URL template; `{principal}` is replaced by the target principal.
	pub fn url_template(mut self, template: impl Into<String>) -> Self {
		self.url_template = Some(template.into());

		self
	}

	/// Appends a delegate to the chain.
	pub fn delegate(mut self, principal: PrincipalId) -> Self {
		self.delegates.push(principal);

		self
	}

	/// Validates the template and produces the endpoint.
	pub fn build(self) -> Result<TrustBrokerEndpoint, ConfigError> {
		let url_template =
			self.url_template.ok_or(ConfigError::MissingSetting { field: "url_template" })?;

		if !url_template.contains(PRINCIPAL_PLACEHOLDER) {
			return Err(ConfigError::InvalidSetting {
				field: "url_template",
				reason: "must contain the {principal} placeholder",
			});
		}

		http::parse_endpoint("delegation", &url_template.replace(PRINCIPAL_PLACEHOLDER, "principal"))?;

		Ok(TrustBrokerEndpoint { url_template, delegates: self.delegates })
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	fn principal(value: &str) -> PrincipalId {
		PrincipalId::new(value).expect("Principal fixture should be valid.")
	}

	#[test]
	fn templates_resolve_per_principal() {
		let endpoint = TrustBrokerEndpoint::iam_credentials()
			.expect("IAM Credentials template should be valid.");
		let url = endpoint.url_for(&principal("svc-a@x")).expect("Principal should resolve.");

		assert_eq!(
			url.as_str(),
			"https://iamcredentials.googleapis.com/v1/projects/-/serviceAccounts/svc-a@x:generateAccessToken"
		);
		assert!(endpoint.url_for(&principal("../admin")).is_err());
	}

	#[test]
	fn builder_validates_templates() {
		assert!(matches!(
			TrustBrokerEndpoint::builder().build(),
			Err(ConfigError::MissingSetting { field: "url_template" })
		));
		assert!(matches!(
			TrustBrokerEndpoint::builder().url_template("https://broker.example.com/token").build(),
			Err(ConfigError::InvalidSetting { field: "url_template", .. })
		));
		assert!(matches!(
			TrustBrokerEndpoint::builder()
				.url_template("http://broker.example.com/{principal}:generate")
				.build(),
			Err(ConfigError::InsecureEndpoint { endpoint: "delegation", .. })
		));

		let endpoint = TrustBrokerEndpoint::builder()
			.url_template("http://127.0.0.1:9000/v1/{principal}:generateAccessToken")
			.delegate(principal("hop@x"))
			.build()
			.expect("Loopback templates should be accepted.");

		assert_eq!(endpoint.delegates(), &[principal("hop@x")]);
	}
}
