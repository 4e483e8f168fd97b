//! Optional observability helpers for broker calls.
//!
//! # Feature Flags
//!
//! - Enable `tracing` to emit spans named `credential_broker.call` with `stage` and `principal`
//!   fields, plus events carrying non-secret credential metadata (principal, expiry, attempt).
//! - Enable `metrics` to increment the `credential_broker_call_total` counter for every
//!   attempt/hit/success/failure, labeled by `stage` + `outcome`.
//!
//! Token values never reach either channel.

mod events;
mod metrics;
mod tracing;

pub use events::*;
pub use metrics::*;
pub use tracing::*;

// self
use crate::_prelude::*;

/// Broker stages observed by spans and counters.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Stage {
	/// Facade entry point (`get_credential`).
	Request,
	/// Source acquisition.
	Acquire,
	/// Delegation exchange with the trust broker.
	Delegate,
	/// Single-flight refresh including retries.
	Refresh,
}
impl Stage {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			Stage::Request => "request",
			Stage::Acquire => "acquire",
			Stage::Delegate => "delegate",
			Stage::Refresh => "refresh",
		}
	}
}
impl Display for Stage {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Outcome labels recorded per stage.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Outcome {
	/// Entry to a stage.
	Attempt,
	/// Served from cache without reaching upstream.
	CacheHit,
	/// Successful completion.
	Success,
	/// Failure propagated back to the caller.
	Failure,
}
impl Outcome {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			Outcome::Attempt => "attempt",
			Outcome::CacheHit => "cache_hit",
			Outcome::Success => "success",
			Outcome::Failure => "failure",
		}
	}
}
impl Display for Outcome {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}
