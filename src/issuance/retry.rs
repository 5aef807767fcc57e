use log::{debug, warn};
use std::time::{Duration, Instant};

/// Outcome of polling a remote service for a condition.
#[derive(Debug)]
pub enum Polled<T> {
    Ready(T),
    TimedOut { elapsed: Duration, attempts: u32 },
}

/// Polls `probe` until it yields a value or `timeout` elapses.
///
/// The probe returns:
/// - `Ok(Some(value))` when the condition holds
/// - `Ok(None)` when it should be retried after `interval`
/// - `Err(_)` to stop immediately (no retry)
///
/// The probe always runs at least once, even with a zero timeout.
pub fn poll_until<T, E, F>(
    operation: &str,
    subject: &str,
    timeout: Duration,
    interval: Duration,
    mut probe: F,
) -> Result<Polled<T>, E>
where
    E: std::fmt::Display,
    F: FnMut() -> Result<Option<T>, E>,
{
    let started = Instant::now();
    let mut attempt = 0;

    loop {
        attempt += 1;
        debug!("[poll] {operation} attempt {attempt} for {subject}");

        match probe() {
            Ok(Some(value)) => {
                debug!(
                    "[poll] {} ready after {}ms (attempt {})",
                    operation,
                    started.elapsed().as_millis(),
                    attempt
                );
                return Ok(Polled::Ready(value));
            }
            Ok(None) => {
                let elapsed = started.elapsed();
                if elapsed >= timeout {
                    warn!(
                        "[poll] {} timeout for {} after {}ms (attempt {})",
                        operation,
                        subject,
                        elapsed.as_millis(),
                        attempt
                    );
                    return Ok(Polled::TimedOut {
                        elapsed,
                        attempts: attempt,
                    });
                }

                let remaining = timeout.saturating_sub(elapsed);
                debug!(
                    "[poll] {} not ready, waiting {}ms before next check ({}ms remaining)",
                    operation,
                    interval.as_millis(),
                    remaining.as_millis()
                );
                std::thread::sleep(interval.min(remaining));
            }
            Err(e) => {
                warn!("[poll] {operation} failed immediately for {subject}: {e}");
                return Err(e);
            }
        }
    }
}
