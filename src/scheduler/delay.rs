//! # Delay classification.
//!
//! Turns a requested delay into one of three cases before anything touches a clock:
//!
//! ```text
//! zero / negative                 ──► Immediate   (run synchronously)
//! fits i64 nanoseconds            ──► After(d)    (nanosecond domain)
//! beyond i64 ns, fits i64 millis  ──► After(d')   (millisecond domain, truncated)
//! beyond i64 millis               ──► Infinite    (never scheduled)
//! ```
//!
//! Every conversion is checked, so no delay can overflow later deadline arithmetic.

use std::time::{Duration, Instant};

/// Largest delay handled in the nanosecond domain.
const MAX_NANOS: u128 = i64::MAX as u128;
/// Largest delay handled in the millisecond domain; anything above is infinite.
const MAX_MILLIS: u128 = i64::MAX as u128;

/// A classified scheduling delay.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delay {
    /// Run now, on the caller's thread.
    Immediate,
    /// Run once this much time has passed.
    After(Duration),
    /// Never run.
    Infinite,
}

impl Delay {
    /// Classifies a non-negative duration.
    pub fn from_duration(d: Duration) -> Self {
        if d.is_zero() {
            return Delay::Immediate;
        }
        if d.as_nanos() <= MAX_NANOS {
            return Delay::After(d);
        }
        let millis = d.as_millis();
        if millis >= MAX_MILLIS {
            Delay::Infinite
        } else {
            // `millis < i64::MAX`, so the cast is lossless.
            Delay::After(Duration::from_millis(millis as u64))
        }
    }

    /// Classifies a signed millisecond count; zero and negative values are immediate.
    pub fn from_signed_millis(millis: i64) -> Self {
        match u64::try_from(millis) {
            Ok(0) | Err(_) => Delay::Immediate,
            Ok(ms) => Self::from_duration(Duration::from_millis(ms)),
        }
    }

    /// Returns the deadline for this delay measured from `now`.
    ///
    /// `None` means the delay never fires: it is [`Delay::Infinite`] or the deadline is not
    /// representable by the platform clock. Immediate delays return `now`.
    pub fn deadline_from(self, now: Instant) -> Option<Instant> {
        match self {
            Delay::Immediate => Some(now),
            Delay::After(d) => now.checked_add(d),
            Delay::Infinite => None,
        }
    }
}

impl From<Duration> for Delay {
    fn from(d: Duration) -> Self {
        Delay::from_duration(d)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_and_negative_are_immediate() {
        assert_eq!(Delay::from_duration(Duration::ZERO), Delay::Immediate);
        assert_eq!(Delay::from_signed_millis(0), Delay::Immediate);
        assert_eq!(Delay::from_signed_millis(-5), Delay::Immediate);
    }

    #[test]
    fn test_nanosecond_domain_is_exact() {
        let d = Duration::new(3, 123);
        assert_eq!(Delay::from_duration(d), Delay::After(d));
        assert_eq!(
            Delay::from_signed_millis(250),
            Delay::After(Duration::from_millis(250))
        );
    }

    #[test]
    fn test_millisecond_domain_beyond_nanos() {
        // i64::MAX ns is about 292 years; 1000 years overflows the nanosecond domain.
        let thousand_years = Duration::from_secs(1000 * 365 * 24 * 3600) + Duration::from_nanos(7);
        match Delay::from_duration(thousand_years) {
            Delay::After(d) => {
                assert_eq!(d.subsec_nanos() % 1_000_000, 0, "truncated to millis");
                assert_eq!(d.as_millis(), thousand_years.as_millis());
            }
            other => panic!("expected finite delay, got {other:?}"),
        }
    }

    #[test]
    fn test_max_is_infinite() {
        assert_eq!(Delay::from_duration(Duration::MAX), Delay::Infinite);
        assert_eq!(Delay::Infinite.deadline_from(Instant::now()), None);
    }

    #[test]
    fn test_deadline_never_panics() {
        let now = Instant::now();
        let huge = Delay::After(Duration::from_millis(i64::MAX as u64 - 1));
        // Either representable or not; must not overflow.
        let _ = huge.deadline_from(now);
        assert_eq!(Delay::Immediate.deadline_from(now), Some(now));
    }
}
