//! Tick-driven polling against a deadline.

use std::thread;
use std::time::{Duration, Instant};

/// Evaluate `probe` every `interval` until it yields a value or `timeout` elapses.
///
/// The probe runs once immediately and once more at the deadline, so a value that
/// appears during the final sleep is still observed. Returns `None` on timeout.
pub fn poll_until<T>(
    interval: Duration,
    timeout: Duration,
    mut probe: impl FnMut() -> Option<T>,
) -> Option<T> {
    let deadline = Instant::now() + timeout;

    loop {
        if let Some(value) = probe() {
            return Some(value);
        }

        let now = Instant::now();
        if now >= deadline {
            return None;
        }

        thread::sleep(interval.min(deadline - now));
    }
}
