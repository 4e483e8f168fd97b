// crates.io
use rand::Rng;
// self
use crate::_prelude::*;

/// Truncated exponential backoff with full jitter.
///
/// The delay before retry `n` (1-based) is drawn uniformly from `[0, min(base * 2^(n-1), cap)]`.
/// A `Retry-After` hint raises the delay to at least the hint, still bounded by the cap.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Backoff {
	base: Duration,
	cap: Duration,
}
impl Backoff {
	/// Creates a policy; a cap below the base is raised to the base.
	pub fn new(base: Duration, cap: Duration) -> Self {
		let base = if base.is_negative() { Duration::ZERO } else { base };

		Self { base, cap: if cap < base { base } else { cap } }
	}

	/// Upper bound of the jitter window for retry `retry` (1-based).
	pub fn ceiling(&self, retry: u32) -> Duration {
		let factor = 2_i32.saturating_pow(retry.saturating_sub(1).min(30));
		let scaled = self.base.checked_mul(factor).unwrap_or(self.cap);

		if scaled > self.cap { self.cap } else { scaled }
	}

	/// Delay before retry `retry`, using the thread-local RNG.
	pub fn delay(&self, retry: u32, retry_after: Option<Duration>) -> Duration {
		self.delay_with(retry, retry_after, &mut rand::rng())
	}

	/// Delay before retry `retry`, drawing jitter from `rng`.
	pub fn delay_with(
		&self,
		retry: u32,
		retry_after: Option<Duration>,
		rng: &mut impl Rng,
	) -> Duration {
		let ceiling = self.ceiling(retry).whole_milliseconds().max(0) as u64;
		let jittered = Duration::milliseconds(rng.random_range(0..=ceiling) as i64);

		match retry_after {
			Some(hint) if hint > jittered => if hint > self.cap { self.cap } else { hint },
			_ => jittered,
		}
	}
}

#[cfg(test)]
mod tests {
	// crates.io
	use rand::{SeedableRng, rngs::StdRng};
	// self
	use super::*;

	#[test]
	fn ceilings_grow_exponentially_until_the_cap() {
		let backoff = Backoff::new(Duration::milliseconds(200), Duration::seconds(1));

		assert_eq!(backoff.ceiling(1), Duration::milliseconds(200));
		assert_eq!(backoff.ceiling(2), Duration::milliseconds(400));
		assert_eq!(backoff.ceiling(3), Duration::milliseconds(800));
		assert_eq!(backoff.ceiling(4), Duration::seconds(1));
		assert_eq!(backoff.ceiling(64), Duration::seconds(1));
	}

	#[test]
	fn delays_stay_within_the_window() {
		let backoff = Backoff::new(Duration::milliseconds(100), Duration::seconds(2));
		let mut rng = StdRng::seed_from_u64(7);

		for retry in 1..=6 {
			let delay = backoff.delay_with(retry, None, &mut rng);

			assert!(delay >= Duration::ZERO && delay <= backoff.ceiling(retry), "retry {retry}");
		}
	}

	#[test]
	fn retry_after_raises_the_floor_up_to_the_cap() {
		let backoff = Backoff::new(Duration::milliseconds(10), Duration::seconds(3));
		let mut rng = StdRng::seed_from_u64(1);

		assert_eq!(backoff.delay_with(1, Some(Duration::seconds(2)), &mut rng), Duration::seconds(2));
		assert_eq!(backoff.delay_with(1, Some(Duration::minutes(1)), &mut rng), Duration::seconds(3));
		assert_eq!(Backoff::new(Duration::seconds(5), Duration::seconds(1)).ceiling(1), Duration::seconds(5));
	}
}
