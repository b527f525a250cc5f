use super::SimulationService;
use crate::error::{ArtifactError, RoundFetchError};
use crate::model::{RetryPolicy, RoundResult};
use std::future::Future;

/// Every attempt failed; carries the last error and how many attempts were made.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Exhausted<E> {
    pub attempts: u32,
    pub last: E,
}

/// Call `attempt` until it succeeds or the policy's budget runs out.
///
/// Attempts are numbered from 0. A fixed `policy.interval` separates consecutive
/// attempts; there is no wait after the final one.
pub async fn poll_until_ready<T, E, F, Fut>(
    policy: &RetryPolicy,
    mut attempt: F,
) -> Result<T, Exhausted<E>>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let budget = policy.attempts();
    let mut n = 0u32;
    loop {
        match attempt(n).await {
            Ok(v) => return Ok(v),
            Err(last) if n + 1 >= budget => {
                return Err(Exhausted {
                    attempts: budget,
                    last,
                })
            }
            Err(_) => {}
        }
        n += 1;
        tokio::time::sleep(policy.interval).await;
    }
}

/// Fetch the artifact for round `index`, treating absence and parse failures as
/// "not written yet" until the budget is spent.
pub async fn fetch_round<S>(
    service: &S,
    index: u32,
    policy: &RetryPolicy,
) -> Result<RoundResult, RoundFetchError>
where
    S: SimulationService + ?Sized,
{
    poll_until_ready(policy, |attempt| async move {
        let res = service.fetch_round(index).await;
        if let Err(e) = &res {
            log::debug!(
                "round {index}: attempt {}/{} not ready ({e})",
                attempt + 1,
                policy.attempts()
            );
        }
        res
    })
    .await
    .map_err(|ex: Exhausted<ArtifactError>| {
        RoundFetchError::from_last(index, ex.attempts, &ex.last)
    })
}
