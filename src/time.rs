//! Validity intervals for triples and answers.
//!
//! A triple may be qualified with the time span during which it holds. The
//! interval is half-open, `[since, until)`, and either bound may be absent,
//! meaning unbounded in that direction.

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// A half-open validity interval `[since, until)`.
///
/// # Examples
///
/// ```
/// use knowbase::TimeInterval;
/// use chrono::{Duration, Utc};
///
/// let now = Utc::now();
/// let interval = TimeInterval::new(now, now + Duration::hours(1)).unwrap();
/// assert!(interval.contains(now));
/// assert!(!interval.contains(now + Duration::hours(1)));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct TimeInterval {
    /// Start of the interval (inclusive). None means unbounded.
    pub since: Option<DateTime<Utc>>,

    /// End of the interval (exclusive). None means open-ended.
    pub until: Option<DateTime<Utc>>,
}

impl TimeInterval {
    /// Creates a closed interval.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError::InvalidTimeInterval` if `since >= until`.
    pub fn new(since: DateTime<Utc>, until: DateTime<Utc>) -> Result<Self, ValidationError> {
        if since >= until {
            return Err(ValidationError::InvalidTimeInterval { since, until });
        }
        Ok(Self {
            since: Some(since),
            until: Some(until),
        })
    }

    /// Creates an open-ended interval starting at the given time.
    #[must_use]
    pub const fn starting_at(since: DateTime<Utc>) -> Self {
        Self {
            since: Some(since),
            until: None,
        }
    }

    /// Creates an interval that ends at the given time with no lower bound.
    #[must_use]
    pub const fn ending_at(until: DateTime<Utc>) -> Self {
        Self {
            since: None,
            until: Some(until),
        }
    }

    /// The unbounded interval.
    #[must_use]
    pub const fn always() -> Self {
        Self {
            since: None,
            until: None,
        }
    }

    /// True if neither bound is set.
    #[must_use]
    pub const fn is_unbounded(&self) -> bool {
        self.since.is_none() && self.until.is_none()
    }

    /// Check if a timestamp falls within this interval.
    #[must_use]
    pub fn contains(&self, time: DateTime<Utc>) -> bool {
        self.since.map_or(true, |since| time >= since) && self.until.map_or(true, |until| time < until)
    }

    /// True if the intervals share an instant.
    pub fn overlaps(&self, other: &Self) -> bool {
        let self_end = self.until.unwrap_or(DateTime::<Utc>::MAX_UTC);
        let other_end = other.until.unwrap_or(DateTime::<Utc>::MAX_UTC);
        let self_start = self.since.unwrap_or(DateTime::<Utc>::MIN_UTC);
        let other_start = other.since.unwrap_or(DateTime::<Utc>::MIN_UTC);
        self_start < other_end && other_start < self_end
    }

    /// Returns the intersection of two intervals, if any.
    #[must_use]
    pub fn intersection(&self, other: &Self) -> Option<Self> {
        if !self.overlaps(other) {
            return None;
        }

        let since = match (self.since, other.since) {
            (Some(a), Some(b)) => Some(a.max(b)),
            (a, None) => a,
            (None, b) => b,
        };
        let until = match (self.until, other.until) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, None) => a,
            (None, b) => b,
        };

        Some(Self { since, until })
    }

    /// Lower bound as epoch milliseconds, the encoding used in stored documents.
    #[must_use]
    pub fn since_millis(&self) -> Option<i64> {
        self.since.map(|t| t.timestamp_millis())
    }

    /// Upper bound as epoch milliseconds.
    #[must_use]
    pub fn until_millis(&self) -> Option<i64> {
        self.until.map(|t| t.timestamp_millis())
    }

    /// Rebuilds an interval from epoch millisecond bounds.
    #[must_use]
    pub fn from_millis(since: Option<i64>, until: Option<i64>) -> Self {
        let convert = |ms: i64| Utc.timestamp_millis_opt(ms).single();
        Self {
            since: since.and_then(convert),
            until: until.and_then(convert),
        }
    }
}

impl std::fmt::Display for TimeInterval {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match (self.since, self.until) {
            (Some(since), Some(until)) => write!(f, "[{since} → {until})"),
            (Some(since), None) => write!(f, "[{since} → ∞)"),
            (None, Some(until)) => write!(f, "(-∞ → {until})"),
            (None, None) => write!(f, "(-∞ → ∞)"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_interval_new_valid() {
        let now = Utc::now();
        let later = now + Duration::hours(1);
        let interval = TimeInterval::new(now, later).unwrap();

        assert_eq!(interval.since, Some(now));
        assert_eq!(interval.until, Some(later));
        assert!(!interval.is_unbounded());
    }

    #[test]
    fn test_interval_new_invalid() {
        let now = Utc::now();
        let earlier = now - Duration::hours(1);

        assert!(TimeInterval::new(now, earlier).is_err());
        assert!(TimeInterval::new(now, now).is_err());
    }

    #[test]
    fn test_interval_contains() {
        let start = Utc::now();
        let end = start + Duration::hours(1);
        let interval = TimeInterval::new(start, end).unwrap();

        assert!(interval.contains(start));
        assert!(interval.contains(start + Duration::minutes(30)));
        assert!(!interval.contains(end));
        assert!(!interval.contains(start - Duration::hours(1)));
    }

    #[test]
    fn test_always_contains_everything() {
        let interval = TimeInterval::always();
        assert!(interval.is_unbounded());
        assert!(interval.contains(Utc::now()));
        assert!(interval.contains(DateTime::UNIX_EPOCH));
    }

    #[test]
    fn test_interval_overlaps_half_bounded() {
        let now = Utc::now();

        let a = TimeInterval::ending_at(now);
        let b = TimeInterval::starting_at(now);
        let c = TimeInterval::starting_at(now - Duration::hours(1));

        assert!(!a.overlaps(&b));
        assert!(a.overlaps(&c));
        assert!(b.overlaps(&c));
    }

    #[test]
    fn test_interval_intersection() {
        let now = Utc::now();

        let a = TimeInterval::new(now, now + Duration::hours(3)).unwrap();
        let b = TimeInterval::starting_at(now + Duration::hours(1));

        let i = a.intersection(&b).unwrap();
        assert_eq!(i.since, Some(now + Duration::hours(1)));
        assert_eq!(i.until, Some(now + Duration::hours(3)));

        assert_eq!(TimeInterval::always().intersection(&a), Some(a));
    }

    #[test]
    fn test_interval_no_intersection() {
        let now = Utc::now();

        let a = TimeInterval::new(now, now + Duration::hours(1)).unwrap();
        let b = TimeInterval::new(now + Duration::hours(2), now + Duration::hours(3)).unwrap();

        assert!(a.intersection(&b).is_none());
    }

    #[test]
    fn test_millis_encoding() {
        let since = Utc.timestamp_millis_opt(1_700_000_000_123).single().unwrap();
        let interval = TimeInterval::starting_at(since);

        assert_eq!(interval.since_millis(), Some(1_700_000_000_123));
        assert_eq!(interval.until_millis(), None);
        assert_eq!(TimeInterval::from_millis(interval.since_millis(), None), interval);
    }

    #[test]
    fn test_interval_display() {
        let display = format!("{}", TimeInterval::starting_at(Utc::now()));
        assert!(display.contains("→"));
        assert!(display.contains("∞"));
    }
}
