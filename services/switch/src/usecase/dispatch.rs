use std::time::Duration;

use tracing::warn;

use crate::domain::repository::Dispatcher;
use crate::domain::types::Dispatch;
use crate::error::DispatchError;

/// Bounds on code delivery: each attempt is cut off after `timeout`, and the
/// same message is sent at most `max_attempts` times.
#[derive(Debug, Clone, Copy)]
pub struct DispatchPolicy {
    pub timeout: Duration,
    pub max_attempts: u32,
}

impl Default for DispatchPolicy {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(10),
            max_attempts: 2,
        }
    }
}

/// Send `dispatch`, retrying the identical message on failure or timeout.
///
/// Resending never mints a new code, so a duplicate delivery is harmless.
pub async fn deliver<D: Dispatcher>(
    dispatcher: &D,
    dispatch: &Dispatch,
    policy: DispatchPolicy,
) -> Result<(), DispatchError> {
    let attempts = policy.max_attempts.max(1);
    let mut last_error = DispatchError::Failed("no delivery attempted".to_owned());
    for attempt in 1..=attempts {
        let outcome = match tokio::time::timeout(policy.timeout, dispatcher.send(dispatch)).await {
            Ok(result) => result,
            Err(_) => Err(DispatchError::Timeout(policy.timeout)),
        };
        match outcome {
            Ok(()) => return Ok(()),
            Err(e) => {
                warn!(
                    attempt,
                    max_attempts = attempts,
                    purpose = %dispatch.context.purpose,
                    error = %e,
                    "code delivery attempt failed"
                );
                last_error = e;
            }
        }
    }
    Err(last_error)
}
