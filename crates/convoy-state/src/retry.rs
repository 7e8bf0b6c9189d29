//! Bounded retry for read-modify-conditional-write sequences.

use tracing::debug;

use crate::error::{StateError, StateResult};

/// Run `attempt` until it succeeds or fails with a non-conflict
/// error. Version conflicts are retried up to `attempts` times; when
/// the budget runs out the caller gets [`StateError::RetriesExhausted`].
pub fn retry_conditional<T, F>(key: &str, attempts: u32, mut attempt: F) -> StateResult<T>
where
    F: FnMut() -> StateResult<T>,
{
    let mut last_conflict = None;
    for round in 0..attempts {
        match attempt() {
            Ok(value) => return Ok(value),
            Err(err) if err.is_conflict() => {
                debug!(%key, round, "conditional write lost the race, retrying");
                last_conflict = Some(err);
            }
            Err(err) => return Err(err),
        }
    }
    debug!(%key, attempts, ?last_conflict, "conditional write retries exhausted");
    Err(StateError::RetriesExhausted(key.to_string(), attempts))
}
