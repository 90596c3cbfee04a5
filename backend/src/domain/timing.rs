//! Wall-clock and monotonic timing for instrumented calls.

use std::future::Future;
use std::time::Duration;

use chrono::{DateTime, Utc};
use mockable::Clock;
use tokio::time::Instant;

/// Timing of a single call.
///
/// `start` and `end` come from the injected clock; `elapsed` is measured
/// monotonically and rounded to whole milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timing {
    /// UTC instant before the call.
    pub start: DateTime<Utc>,
    /// UTC instant after the call.
    pub end: DateTime<Utc>,
    /// Monotonic duration rounded to the nearest millisecond.
    pub elapsed: Duration,
}

impl Timing {
    /// Elapsed duration in whole milliseconds.
    pub fn elapsed_ms(&self) -> u64 {
        u64::try_from(self.elapsed.as_millis()).unwrap_or(u64::MAX)
    }
}

/// Round a duration to the nearest millisecond.
pub fn round_to_millis(elapsed: Duration) -> Duration {
    let micros = elapsed.as_micros().saturating_add(500);
    let millis = micros / 1_000;
    Duration::from_millis(u64::try_from(millis).unwrap_or(u64::MAX))
}

/// Await `fut`, capturing its start/end timestamps and elapsed duration.
///
/// # Examples
/// ```
/// use accounts::domain::timing::track;
/// use mockable::DefaultClock;
///
/// # tokio::runtime::Builder::new_current_thread().enable_time().build().unwrap().block_on(async {
/// let (value, timing) = track(&DefaultClock, async { 42 }).await;
/// assert_eq!(value, 42);
/// assert!(timing.end >= timing.start);
/// # });
/// ```
pub async fn track<F>(clock: &dyn Clock, fut: F) -> (F::Output, Timing)
where
    F: Future,
{
    let start = clock.utc();
    let started = Instant::now();
    let output = fut.await;
    let elapsed = round_to_millis(started.elapsed());
    let end = clock.utc();

    (
        output,
        Timing {
            start,
            end,
            elapsed,
        },
    )
}
