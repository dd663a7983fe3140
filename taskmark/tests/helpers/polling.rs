use std::fmt;
use std::thread;
use std::time::{Duration, Instant};

const INITIAL_DELAY_MS: u64 = 25;
const MAX_DELAY_MS: u64 = 500;

/// Error returned when a polled condition never became true.
#[derive(Debug)]
pub struct WaitError {
    what: String,
    attempts: u32,
    waited: Duration,
}

impl fmt::Display for WaitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Timed out after {} attempts over {:?} waiting for {}",
            self.attempts, self.waited, self.what
        )
    }
}

impl std::error::Error for WaitError {}

/// Poll `check` with exponential backoff until it yields a value or `timeout` passes.
pub fn wait_for<T, F>(what: &str, timeout: Duration, mut check: F) -> Result<T, WaitError>
where
    F: FnMut() -> Option<T>,
{
    let start = Instant::now();
    let mut delay = Duration::from_millis(INITIAL_DELAY_MS);
    let mut attempts = 0;

    loop {
        attempts += 1;
        if let Some(value) = check() {
            return Ok(value);
        }

        let remaining = timeout.saturating_sub(start.elapsed());
        if remaining.is_zero() {
            return Err(WaitError {
                what: what.to_string(),
                attempts,
                waited: start.elapsed(),
            });
        }

        thread::sleep(delay.min(remaining));
        delay = (delay * 2).min(Duration::from_millis(MAX_DELAY_MS));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wait_for_returns_first_value() {
        let mut calls = 0;
        let value = wait_for("third call", Duration::from_secs(1), || {
            calls += 1;
            (calls == 3).then_some(calls)
        })
        .unwrap();
        assert_eq!(value, 3);
    }

    #[test]
    fn wait_for_times_out_with_context() {
        let err = wait_for::<(), _>("nothing", Duration::from_millis(1), || None).unwrap_err();
        assert!(err.to_string().contains("waiting for nothing"));
    }
}
