//! Caller-side retry policy for state-changing RPCs (§4.6): retry on
//! transition-pending, short-circuit on already-done/invalid-id, a
//! linear-incrementing backoff.

use slurm_common::error::{Error, Result};
use slurm_wire::ResponseRc;
use std::time::Duration;

pub const MAX_CANCEL_RETRY: u32 = 10;

pub fn retry_delay(attempt: u32) -> Duration {
    Duration::from_secs(5 + attempt as u64)
}

pub fn is_retryable(err: &Error) -> bool {
    matches!(err, Error::TransitionPending)
}

pub fn short_circuits(err: &Error) -> bool {
    matches!(err, Error::AlreadyDone | Error::InvalidObjectId(_))
}

/// Drives `attempt_fn` up to `MAX_CANCEL_RETRY` times, sleeping
/// `retry_delay` between retryable failures.
pub fn retry_state_change<F>(attempt_fn: F) -> Result<ResponseRc>
where
    F: FnMut(u32) -> Result<ResponseRc>,
{
    retry_with_sleep(attempt_fn, std::thread::sleep)
}

fn retry_with_sleep<F, S>(mut attempt_fn: F, mut sleep_fn: S) -> Result<ResponseRc>
where
    F: FnMut(u32) -> Result<ResponseRc>,
    S: FnMut(Duration),
{
    let mut last_err = None;
    for attempt in 0..MAX_CANCEL_RETRY {
        match attempt_fn(attempt) {
            Ok(reply) => return Ok(reply),
            Err(err) if short_circuits(&err) => return Err(err),
            Err(err) if is_retryable(&err) => {
                last_err = Some(err);
                if attempt + 1 < MAX_CANCEL_RETRY {
                    sleep_fn(retry_delay(attempt));
                }
            }
            Err(err) => return Err(err),
        }
    }
    Err(last_err.expect("loop runs at least once and only exits early on Ok/non-retryable"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn succeeds_on_first_try() {
        let result = retry_state_change(|_attempt| Ok(ResponseRc::ok()));
        assert!(result.unwrap().is_success());
    }

    #[test]
    fn already_done_short_circuits_without_retry() {
        let mut calls = 0;
        let result = retry_state_change(|_attempt| {
            calls += 1;
            Err(Error::AlreadyDone)
        });
        assert!(matches!(result, Err(Error::AlreadyDone)));
        assert_eq!(calls, 1);
    }

    #[test]
    fn invalid_job_id_short_circuits_without_retry() {
        let mut calls = 0;
        let result = retry_state_change(|_attempt| {
            calls += 1;
            Err(Error::InvalidObjectId("42".into()))
        });
        assert!(result.is_err());
        assert_eq!(calls, 1);
    }

    #[test]
    fn retries_until_success() {
        let mut calls = 0;
        let mut sleeps = 0;
        let result = retry_with_sleep(
            |attempt| {
                calls += 1;
                if attempt < 2 {
                    Err(Error::TransitionPending)
                } else {
                    Ok(ResponseRc::ok())
                }
            },
            |_| sleeps += 1,
        );
        assert!(result.unwrap().is_success());
        assert_eq!(calls, 3);
        assert_eq!(sleeps, 2);
    }

    #[test]
    fn backoff_is_linear_increasing() {
        assert_eq!(retry_delay(0), Duration::from_secs(5));
        assert_eq!(retry_delay(1), Duration::from_secs(6));
        assert_eq!(retry_delay(9), Duration::from_secs(14));
    }
}
