//! Delegated credential broker: expiry-aware caching, single-flight refresh, bounded retries,
//! and typed failure isolation for impersonated and federated identities.
//!
//! A [`broker::Broker`] sits between consumers and a trust broker. Consumers ask for a
//! credential by [`auth::IdentityDescriptor`]; the broker serves it from its cache or obtains a
//! base credential from a [`source::CredentialSource`] and exchanges it through a
//! [`delegation::DelegationEngine`], collapsing concurrent refreshes of the same key into one.

#![deny(clippy::all, missing_docs, unused_crate_dependencies)]

pub mod auth;
pub mod broker;
pub mod cache;
pub mod config;
pub mod coordinator;
pub mod delegation;
pub mod error;
pub mod http;
pub mod oauth;
pub mod obs;
pub mod source;
#[cfg(all(any(test, feature = "test"), feature = "reqwest"))]
pub mod _preludet {
	//! Convenience re-exports and helpers for tests; enabled via `cfg(test)` or the `test` crate
	//! feature.

	pub use crate::_prelude::*;

	// crates.io
	use reqwest::redirect::Policy;
	// self
	use crate::{
		auth::{IdentityDescriptor, PrincipalId, ScopeSet},
		http::{ReqwestHttpClient, ReqwestTransportErrorMapper},
	};

	/// Builds a reqwest HTTP client that never follows redirects and accepts the self-signed
	/// certificates produced by `httpmock`.
	pub fn test_reqwest_http_client() -> ReqwestHttpClient {
		let client = ReqwestClient::builder()
			.redirect(Policy::none())
			.danger_accept_invalid_certs(true)
			.danger_accept_invalid_hostnames(true)
			.build()
			.expect("Failed to build insecure Reqwest client for tests.");

		ReqwestHttpClient::with_client(client)
	}

	/// Shared transport pair for engines and sources under test.
	pub fn test_transport() -> (Arc<ReqwestHttpClient>, Arc<ReqwestTransportErrorMapper>) {
		(Arc::new(test_reqwest_http_client()), Arc::new(ReqwestTransportErrorMapper))
	}

	/// Descriptor fixture.
	pub fn test_descriptor(principal: &str, scopes: &[&str], lifetime_secs: i64) -> IdentityDescriptor {
		IdentityDescriptor::with_lifetime_secs(
			PrincipalId::new(principal).expect("Principal fixture should be valid."),
			ScopeSet::new(scopes.iter().copied()).expect("Scope fixture should be valid."),
			lifetime_secs,
		)
	}
}

mod _prelude {
	pub use std::{
		collections::HashMap,
		error::Error as StdError,
		fmt::{Debug, Display, Formatter, Result as FmtResult},
		future::Future,
		hash::{Hash, Hasher},
		pin::Pin,
		str::FromStr,
		sync::Arc,
	};

	pub use async_lock::Mutex as AsyncMutex;
	pub use parking_lot::{Mutex, RwLock};
	#[cfg(feature = "reqwest")]
	pub use reqwest::{Client as ReqwestClient, Error as ReqwestError};
	pub use serde::{Deserialize, Serialize};
	pub use thiserror::Error as ThisError;
	pub use time::{Duration, OffsetDateTime};
	pub use url::Url;

	pub use crate::error::{Error, Result};
}

#[cfg(feature = "reqwest")] pub use reqwest;
pub use url;
#[cfg(test)] use {color_eyre as _, httpmock as _};
