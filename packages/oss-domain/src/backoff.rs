use std::time::Duration;

use rand::Rng;

/// Exponential ceiling for the given attempt count: `base * 2^(attempts-1)`,
/// capped.
pub fn backoff_ceiling(attempts: i32, base: Duration, cap: Duration) -> Duration {
	let attempts = attempts.max(1) as u32;
	let exp = attempts.saturating_sub(1).min(20);
	let scaled = base.as_secs().saturating_mul(1_u64 << exp);

	Duration::from_secs(scaled).min(cap)
}

/// Full jitter: a uniform draw in `[0, ceiling]`, with a one-second floor so
/// a retry never lands in the same scheduler tick.
pub fn backoff_with_jitter(attempts: i32, base: Duration, cap: Duration) -> Duration {
	let ceiling = backoff_ceiling(attempts, base, cap);
	let jittered = rand::thread_rng().gen_range(0..=ceiling.as_millis() as u64);

	Duration::from_millis(jittered.max(1_000))
}

#[cfg(test)]
mod tests {
	use super::*;

	const BASE: Duration = Duration::from_secs(30);
	const CAP: Duration = Duration::from_secs(900);

	#[test]
	fn ceiling_doubles_per_attempt() {
		assert_eq!(backoff_ceiling(1, BASE, CAP), Duration::from_secs(30));
		assert_eq!(backoff_ceiling(2, BASE, CAP), Duration::from_secs(60));
		assert_eq!(backoff_ceiling(3, BASE, CAP), Duration::from_secs(120));
	}

	#[test]
	fn ceiling_is_capped() {
		assert_eq!(backoff_ceiling(10, BASE, CAP), CAP);
		assert_eq!(backoff_ceiling(i32::MAX, BASE, CAP), CAP);
	}

	#[test]
	fn zero_and_negative_attempts_behave_like_the_first() {
		assert_eq!(backoff_ceiling(0, BASE, CAP), Duration::from_secs(30));
		assert_eq!(backoff_ceiling(-3, BASE, CAP), Duration::from_secs(30));
	}

	#[test]
	fn jitter_stays_within_bounds() {
		for attempts in 1..12 {
			let delay = backoff_with_jitter(attempts, BASE, CAP);

			assert!(delay >= Duration::from_secs(1));
			assert!(delay <= CAP.max(Duration::from_secs(1)));
		}
	}
}
