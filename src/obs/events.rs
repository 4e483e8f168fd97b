//! Structured events. Every helper takes only non-secret metadata.

// self
use crate::{
	_prelude::*,
	auth::{CacheKey, Credential},
	error::ErrorKind,
};

/// A fresh credential entered the cache.
pub fn credential_issued(credential: &Credential, attempts: u32) {
	#[cfg(feature = "tracing")]
	{
		tracing::debug!(
			principal = %credential.descriptor().principal(),
			scopes = %credential.descriptor().scopes(),
			expires_at = %credential.expires_at(),
			attempts,
			"credential issued"
		);
	}
	#[cfg(not(feature = "tracing"))]
	{
		let _ = (credential, attempts);
	}
}

/// A transient failure is about to be retried after `delay`.
pub fn retry_scheduled(key: &CacheKey, attempt: u32, delay: Duration) {
	#[cfg(feature = "tracing")]
	{
		tracing::debug!(
			principal = %key.principal,
			attempt,
			delay_ms = delay.whole_milliseconds() as u64,
			"retrying delegation after transient failure"
		);
	}
	#[cfg(not(feature = "tracing"))]
	{
		let _ = (key, attempt, delay);
	}
}

/// A refresh gave up.
pub fn refresh_failed(key: &CacheKey, kind: ErrorKind, attempts: u32) {
	#[cfg(feature = "tracing")]
	{
		if matches!(kind, ErrorKind::DelegationDenied) {
			tracing::warn!(principal = %key.principal, kind = kind.as_str(), attempts, "delegation denied");
		} else {
			tracing::debug!(principal = %key.principal, kind = kind.as_str(), attempts, "refresh failed");
		}
	}
	#[cfg(not(feature = "tracing"))]
	{
		let _ = (key, kind, attempts);
	}
}

/// Idle entries were dropped from the cache.
pub fn entries_evicted(count: usize) {
	#[cfg(feature = "tracing")]
	{
		if count > 0 {
			tracing::debug!(count, "evicted idle credentials");
		}
	}
	#[cfg(not(feature = "tracing"))]
	{
		let _ = count;
	}
}
