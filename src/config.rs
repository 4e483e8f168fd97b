//! Broker tuning knobs.

// self
use crate::{_prelude::*, error::ConfigError};

/// Settings supplied to [`Broker`](crate::broker::Broker) at construction.
///
/// Deserializes from JSON with per-field defaults:
///
/// ```
/// use credential_broker::config::BrokerConfig;
///
/// let config = BrokerConfig::from_json_str(r#"{"max_retries": 5, "wait_timeout_ms": 2000}"#)
/// 	.expect("Config should parse.");
///
/// assert_eq!(config.max_retries(), 5);
/// assert_eq!(config.safety_margin().whole_seconds(), 60);
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BrokerConfig {
	safety_margin_secs: u64,
	max_retries: u32,
	backoff_base_ms: u64,
	backoff_cap_ms: u64,
	idle_eviction_secs: u64,
	wait_timeout_ms: Option<u64>,
}
impl BrokerConfig {
	/// Parses a JSON document, reporting the path of any offending field, then validates it.
	pub fn from_json_str(raw: &str) -> Result<Self, ConfigError> {
		let mut deserializer = serde_json::Deserializer::from_str(raw);
		let config: Self = serde_path_to_error::deserialize(&mut deserializer)
			.map_err(|source| ConfigError::Parse { source })?;

		config.validate()?;

		Ok(config)
	}

	/// Rejects combinations the broker cannot operate with.
	pub fn validate(&self) -> Result<(), ConfigError> {
		if self.backoff_base_ms == 0 {
			return Err(ConfigError::InvalidSetting {
				field: "backoff_base_ms",
				reason: "must be greater than zero",
			});
		}
		if self.backoff_cap_ms < self.backoff_base_ms {
			return Err(ConfigError::InvalidSetting {
				field: "backoff_cap_ms",
				reason: "must not be lower than backoff_base_ms",
			});
		}
		if self.idle_eviction_secs == 0 {
			return Err(ConfigError::InvalidSetting {
				field: "idle_eviction_secs",
				reason: "must be greater than zero",
			});
		}
		if self.wait_timeout_ms == Some(0) {
			return Err(ConfigError::InvalidSetting {
				field: "wait_timeout_ms",
				reason: "must be greater than zero when set",
			});
		}

		Ok(())
	}

	/// Minimum remaining lifetime of a credential handed to a caller.
	pub fn safety_margin(&self) -> Duration {
		Duration::seconds(saturating_i64(self.safety_margin_secs))
	}

	/// Retries performed after the first attempt for transient failures.
	pub fn max_retries(&self) -> u32 {
		self.max_retries
	}

	/// Initial backoff delay.
	pub fn backoff_base(&self) -> Duration {
		Duration::milliseconds(saturating_i64(self.backoff_base_ms))
	}

	/// Upper bound for any single backoff delay.
	pub fn backoff_cap(&self) -> Duration {
		Duration::milliseconds(saturating_i64(self.backoff_cap_ms))
	}

	/// Entries not accessed for this long are evicted.
	pub fn idle_eviction(&self) -> Duration {
		Duration::seconds(saturating_i64(self.idle_eviction_secs))
	}

	/// Default bound on how long a caller waits for a refresh.
	pub fn wait_timeout(&self) -> Option<Duration> {
		self.wait_timeout_ms.map(|ms| Duration::milliseconds(saturating_i64(ms)))
	}

	/// Sets the safety margin; negative values clamp to zero.
	pub fn with_safety_margin(mut self, margin: Duration) -> Self {
		self.safety_margin_secs = non_negative(margin.whole_seconds());

		self
	}

	/// Sets the retry budget.
	pub fn with_max_retries(mut self, retries: u32) -> Self {
		self.max_retries = retries;

		self
	}

	/// Sets the backoff base and cap.
	pub fn with_backoff(mut self, base: Duration, cap: Duration) -> Self {
		self.backoff_base_ms = non_negative(base.whole_milliseconds());
		self.backoff_cap_ms = non_negative(cap.whole_milliseconds());

		self
	}

	/// Sets the idle eviction period.
	pub fn with_idle_eviction(mut self, period: Duration) -> Self {
		self.idle_eviction_secs = non_negative(period.whole_seconds());

		self
	}

	/// Sets (or clears) the default wait bound.
	pub fn with_wait_timeout(mut self, timeout: Option<Duration>) -> Self {
		self.wait_timeout_ms = timeout.map(|value| non_negative(value.whole_milliseconds()));

		self
	}
}
impl Default for BrokerConfig {
	fn default() -> Self {
		Self {
			safety_margin_secs: 60,
			max_retries: 3,
			backoff_base_ms: 200,
			backoff_cap_ms: 10_000,
			idle_eviction_secs: 1_800,
			wait_timeout_ms: None,
		}
	}
}

fn saturating_i64(value: u64) -> i64 {
	i64::try_from(value).unwrap_or(i64::MAX)
}

fn non_negative(value: impl TryInto<u64>) -> u64 {
	value.try_into().unwrap_or(0)
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn defaults_are_valid() {
		let config = BrokerConfig::default();

		assert!(config.validate().is_ok());
		assert_eq!(config.safety_margin(), Duration::seconds(60));
		assert_eq!(config.max_retries(), 3);
		assert_eq!(config.backoff_base(), Duration::milliseconds(200));
		assert_eq!(config.backoff_cap(), Duration::seconds(10));
		assert_eq!(config.idle_eviction(), Duration::minutes(30));
		assert_eq!(config.wait_timeout(), None);
	}

	#[test]
	fn json_errors_carry_the_field_path() {
		let err = BrokerConfig::from_json_str(r#"{"max_retries": "three"}"#)
			.expect_err("String retries should be rejected.");

		match err {
			ConfigError::Parse { source } => assert_eq!(source.path().to_string(), "max_retries"),
			other => panic!("Unexpected error: {other:?}"),
		}

		assert!(matches!(
			BrokerConfig::from_json_str(r#"{"unknown": 1}"#),
			Err(ConfigError::Parse { .. })
		));
	}

	#[test]
	fn validation_rejects_inconsistent_backoff() {
		assert!(matches!(
			BrokerConfig::from_json_str(r#"{"backoff_base_ms": 500, "backoff_cap_ms": 100}"#),
			Err(ConfigError::InvalidSetting { field: "backoff_cap_ms", .. })
		));
		assert!(matches!(
			BrokerConfig::default().with_backoff(Duration::ZERO, Duration::seconds(1)).validate(),
			Err(ConfigError::InvalidSetting { field: "backoff_base_ms", .. })
		));
		assert!(matches!(
			BrokerConfig::default().with_wait_timeout(Some(Duration::ZERO)).validate(),
			Err(ConfigError::InvalidSetting { field: "wait_timeout_ms", .. })
		));
	}

	#[test]
	fn setters_clamp_negative_values() {
		let config = BrokerConfig::default()
			.with_safety_margin(Duration::seconds(-5))
			.with_idle_eviction(Duration::minutes(5))
			.with_wait_timeout(Some(Duration::milliseconds(250)));

		assert_eq!(config.safety_margin(), Duration::ZERO);
		assert_eq!(config.idle_eviction(), Duration::minutes(5));
		assert_eq!(config.wait_timeout(), Some(Duration::milliseconds(250)));
	}
}
