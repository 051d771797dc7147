//! Clock skew between the local machine and a server.
//!
//! The skew is derived from the HTTP `Date` header and always reported as
//! `server - local`. The engine never adjusts any clock. A caller that wants
//! to can pass a [`ClockSync`] to [`SkewEstimator::maybe_resync`], which only
//! acts when the skew is beyond the configured threshold.

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, NaiveDateTime, Utc};

/// Source of local wall clock time.
pub trait LocalClock {
    /// The current time.
    fn now(&self) -> DateTime<Utc>;
}

/// The system clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl LocalClock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock stuck at one instant.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub DateTime<Utc>);

impl LocalClock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}

/// Action taken by the caller to correct its clock.
pub trait ClockSync {
    /// Move the local clock by `skew`.
    fn resync(&mut self, skew: Skew);
}

/// `server - local`, whole seconds. Positive means the server is ahead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Skew {
    seconds: i64,
}

impl Skew {
    /// Create from seconds.
    pub fn from_secs(seconds: i64) -> Self {
        Skew { seconds }
    }

    /// The signed number of seconds.
    pub fn seconds(&self) -> i64 {
        self.seconds
    }

    /// Size of the skew, without direction.
    pub fn magnitude(&self) -> Duration {
        Duration::from_secs(self.seconds.unsigned_abs())
    }
}

impl fmt::Display for Skew {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:+}s", self.seconds)
    }
}

/// Parse an HTTP date.
///
/// `IMF-fixdate` (and anything else RFC 2822 accepts), plus the obsolete
/// RFC 850 and asctime forms.
pub fn parse_http_date(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }

    if let Ok(v) = DateTime::parse_from_rfc2822(value) {
        return Some(v.with_timezone(&Utc));
    }

    // Sunday, 06-Nov-94 08:49:37 GMT
    if let Ok(v) = NaiveDateTime::parse_from_str(value, "%A, %d-%b-%y %H:%M:%S GMT") {
        return Some(v.and_utc());
    }

    // Sun Nov  6 08:49:37 1994
    NaiveDateTime::parse_from_str(value, "%a %b %e %H:%M:%S %Y")
        .ok()
        .map(|v| v.and_utc())
}

/// Derives skew from server dates, and tracks what was corrected.
#[derive(Debug, Clone)]
pub struct SkewEstimator {
    threshold: Duration,
    applied: i64,
}

impl SkewEstimator {
    /// Estimator that considers skews larger than `threshold` worth correcting.
    pub fn new(threshold: Duration) -> Self {
        SkewEstimator {
            threshold,
            applied: 0,
        }
    }

    /// `server - local`.
    pub fn estimate(&self, server: DateTime<Utc>, local: DateTime<Utc>) -> Skew {
        Skew::from_secs((server - local).num_seconds())
    }

    /// Estimate from a `Date` header value. `None` if the date does not parse.
    pub fn observe(&self, date_header: &str, local: DateTime<Utc>) -> Option<Skew> {
        let Some(server) = parse_http_date(date_header) else {
            debug!("Ignore unparsable date header: {}", date_header);
            return None;
        };

        let skew = self.estimate(server, local);
        trace!("Server date {} local {} skew {}", server, local, skew);

        Some(skew)
    }

    /// Tell if `skew` is large enough to correct.
    pub fn needs_resync(&self, skew: Skew) -> bool {
        skew.magnitude() > self.threshold
    }

    /// Correct the clock through `sync` if [`needs_resync`][Self::needs_resync].
    ///
    /// Returns whether a correction was made.
    pub fn maybe_resync(&mut self, skew: Skew, sync: &mut dyn ClockSync) -> bool {
        if !self.needs_resync(skew) {
            return false;
        }

        info!("Resync clock by {}", skew);
        sync.resync(skew);
        self.applied += skew.seconds();

        true
    }

    /// Sum of all corrections made through this estimator.
    pub fn applied(&self) -> Skew {
        Skew::from_secs(self.applied)
    }

    /// The configured threshold.
    pub fn threshold(&self) -> Duration {
        self.threshold
    }
}
