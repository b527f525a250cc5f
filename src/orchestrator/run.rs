//! Run state machine.
//!
//! `Idle -> Loading -> {Succeeded, Failed} -> Loading -> ...`, with exactly one writer.

use crate::engine::{fetch_round, SimulationService};
use crate::error::RunRejected;
use crate::model::{Mode, RetryPolicy, RunConfig, RunRequest, RunResultSet, RunState};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

/// Timing policy for a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunPolicy {
    /// Wait after a successful start before the first artifact poll, so the
    /// engine has begun writing. Race mitigation only.
    pub settle_delay: Duration,
    pub retry: RetryPolicy,
}

impl Default for RunPolicy {
    fn default() -> Self {
        Self {
            settle_delay: Duration::from_millis(1000),
            retry: RetryPolicy::default(),
        }
    }
}

impl From<&RunConfig> for RunPolicy {
    fn from(cfg: &RunConfig) -> Self {
        Self {
            settle_delay: cfg.settle_delay,
            retry: cfg.retry,
        }
    }
}

/// Owns the single `RunState` and drives runs against a `SimulationService`.
pub struct RunOrchestrator {
    service: Arc<dyn SimulationService>,
    policy: RunPolicy,
    state_tx: Arc<watch::Sender<RunState>>,
}

impl RunOrchestrator {
    pub fn new(service: Arc<dyn SimulationService>, policy: RunPolicy) -> Self {
        let (state_tx, _) = watch::channel(RunState::Idle);
        Self {
            service,
            policy,
            state_tx: Arc::new(state_tx),
        }
    }

    /// Observe state transitions.
    pub fn subscribe(&self) -> watch::Receiver<RunState> {
        self.state_tx.subscribe()
    }

    pub fn state(&self) -> RunState {
        self.state_tx.borrow().clone()
    }

    /// Start a run from raw round-count input. Returns the terminal state.
    pub async fn start(&self, raw_rounds: &str, mode: Mode) -> Result<RunState, RunRejected> {
        self.start_request(RunRequest::from_raw(mode, raw_rounds))
            .await
    }

    /// Start a run for an already normalised request. Returns the terminal state.
    ///
    /// Dropping the future before it completes leaves the state `Failed`, never `Loading`.
    pub async fn start_request(&self, request: RunRequest) -> Result<RunState, RunRejected> {
        Ok(self.begin(request)?.run().await)
    }

    /// Enter `Loading` now and hand back the run to drive. Rejected while a run is in flight.
    pub fn begin(&self, request: RunRequest) -> Result<PendingRun, RunRejected> {
        let mut rejected = false;
        self.state_tx.send_if_modified(|state| {
            if state.is_loading() {
                rejected = true;
                return false;
            }
            *state = RunState::Loading { request };
            true
        });
        if rejected {
            log::debug!("start ignored: a run is already loading");
            return Err(RunRejected::AlreadyRunning);
        }
        log::info!(
            "run started: mode={} rounds={}",
            request.mode,
            request.rounds
        );
        Ok(PendingRun {
            service: self.service.clone(),
            policy: self.policy,
            guard: LoadingGuard {
                state_tx: self.state_tx.clone(),
                request,
                armed: true,
            },
        })
    }
}

/// A run that already owns the `Loading` state.
pub struct PendingRun {
    service: Arc<dyn SimulationService>,
    policy: RunPolicy,
    guard: LoadingGuard,
}

impl PendingRun {
    pub fn request(&self) -> RunRequest {
        self.guard.request
    }

    /// Drive the run to its terminal state and publish it.
    pub async fn run(self) -> RunState {
        let request = self.guard.request;
        let terminal = match execute(&*self.service, self.policy, request).await {
            Ok(results) => {
                log::info!("run succeeded: {} round(s)", results.rounds.len());
                RunState::Succeeded {
                    results: Box::new(results),
                }
            }
            Err(message) => {
                log::warn!("run failed: {message}");
                RunState::Failed { request, message }
            }
        };
        self.guard.finish(terminal.clone());
        terminal
    }
}

/// Publishes `Failed` if the run is dropped while still `Loading`.
struct LoadingGuard {
    state_tx: Arc<watch::Sender<RunState>>,
    request: RunRequest,
    armed: bool,
}

impl LoadingGuard {
    fn finish(mut self, terminal: RunState) {
        self.armed = false;
        self.state_tx.send_replace(terminal);
    }
}

impl Drop for LoadingGuard {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let request = self.request;
        log::warn!("run dropped before completion");
        self.state_tx.send_if_modified(|state| {
            if !state.is_loading() {
                return false;
            }
            *state = RunState::Failed {
                request,
                message: "Simulazione interrotta".into(),
            };
            true
        });
    }
}

async fn execute(
    service: &dyn SimulationService,
    policy: RunPolicy,
    request: RunRequest,
) -> Result<RunResultSet, String> {
    service.start(&request).await.map_err(|e| e.to_string())?;

    tokio::time::sleep(policy.settle_delay).await;

    let mut rounds = Vec::with_capacity(request.rounds as usize);
    for index in 1..=request.rounds {
        let round = fetch_round(service, index, &policy.retry)
            .await
            .map_err(|e| e.to_string())?;
        log::debug!("round {index}/{} fetched", request.rounds);
        rounds.push(round);
    }

    Ok(RunResultSet {
        request,
        rounds,
        completed_utc: time::OffsetDateTime::now_utc()
            .format(&time::format_description::well_known::Rfc3339)
            .unwrap_or_else(|_| "now".into()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::testing::FakeEngine;
    use crate::error::ArtifactError;
    use tokio::time::Instant;

    fn orchestrator(engine: &Arc<FakeEngine>) -> RunOrchestrator {
        RunOrchestrator::new(engine.clone(), RunPolicy::default())
    }

    #[tokio::test(start_paused = true)]
    async fn dynamic_three_rounds_succeed_in_order() {
        let engine = Arc::new(FakeEngine::ok("dynamic"));
        let orch = orchestrator(&engine);

        let state = orch.start("3", Mode::Dynamic).await.unwrap();
        let RunState::Succeeded { results } = &state else {
            panic!("expected success, got {state:?}");
        };
        assert_eq!(results.request.rounds, 3);
        let order: Vec<u32> = results.rounds.iter().map(|r| r.round).collect();
        assert_eq!(order, vec![1, 2, 3]);
        assert!(results.rounds.iter().all(|r| r.mode == "dynamic"));
        assert_eq!(engine.start_count(), 1);
        assert_eq!(engine.fetch_count(), 3);
        assert!(matches!(orch.state(), RunState::Succeeded { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn start_failure_makes_no_fetches() {
        let engine = Arc::new(FakeEngine::failing_start("HTTP 503"));
        let orch = orchestrator(&engine);

        let state = orch.start("1", Mode::Static).await.unwrap();
        match state {
            RunState::Failed { request, message } => {
                assert_eq!(request.mode, Mode::Static);
                assert_eq!(request.rounds, 1);
                assert!(message.starts_with("Impossibile avviare la simulazione"));
            }
            other => panic!("expected failure, got {other:?}"),
        }
        assert_eq!(engine.fetch_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn round_failure_aborts_remaining_rounds() {
        let engine = Arc::new(FakeEngine::ok("static").never(2));
        let orch = orchestrator(&engine);

        let state = orch.start("3", Mode::Static).await.unwrap();
        let RunState::Failed { message, .. } = &state else {
            panic!("expected failure, got {state:?}");
        };
        assert!(message.contains("round_2_results.json"));
        assert_eq!(engine.fetches_for(1), 1);
        assert_eq!(engine.fetches_for(2), 5);
        assert_eq!(engine.fetches_for(3), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn first_poll_waits_for_settle_delay() {
        let engine = Arc::new(FakeEngine::ok("static"));
        let orch = orchestrator(&engine);

        let started = Instant::now();
        orch.start("1", Mode::Static).await.unwrap();
        let first = engine.fetches.lock().unwrap()[0].1;
        assert_eq!(first - started, Duration::from_millis(1000));
    }

    #[tokio::test(start_paused = true)]
    async fn raw_input_is_normalised() {
        let engine = Arc::new(FakeEngine::ok("static"));
        let orch = orchestrator(&engine);

        orch.start("abc", Mode::Static).await.unwrap();
        assert_eq!(engine.starts.lock().unwrap()[0].rounds, 1);

        orch.start("25", Mode::Static).await.unwrap();
        assert_eq!(engine.starts.lock().unwrap()[1].rounds, 20);
        assert_eq!(engine.fetch_count(), 21);
    }

    #[tokio::test(start_paused = true)]
    async fn second_start_while_loading_is_rejected() {
        let engine = Arc::new(FakeEngine::ok("static"));
        let orch = Arc::new(orchestrator(&engine));
        let mut rx = orch.subscribe();

        let running = {
            let orch = orch.clone();
            tokio::spawn(async move { orch.start("2", Mode::Static).await })
        };
        rx.wait_for(|s| s.is_loading()).await.unwrap();

        let before = orch.state();
        assert_eq!(
            orch.start("5", Mode::Dynamic).await,
            Err(RunRejected::AlreadyRunning)
        );
        assert_eq!(orch.state(), before);
        assert_eq!(engine.start_count(), 1);

        let done = running.await.unwrap().unwrap();
        assert!(matches!(done, RunState::Succeeded { .. }));
        assert_eq!(engine.fetch_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_run_can_be_restarted() {
        // Round 1 misses exactly one full budget, then appears.
        let engine = Arc::new(
            FakeEngine::ok("static").script(1, vec![Err(ArtifactError::NotFound); 5]),
        );
        let orch = orchestrator(&engine);

        let first = orch.start("1", Mode::Static).await.unwrap();
        assert!(matches!(first, RunState::Failed { .. }));

        let second = orch.start("1", Mode::Static).await.unwrap();
        assert!(matches!(second, RunState::Succeeded { .. }));
        assert_eq!(engine.start_count(), 2);
        assert_eq!(engine.fetches_for(1), 6);
    }

    #[tokio::test(start_paused = true)]
    async fn subscribers_see_loading_then_terminal() {
        let engine = Arc::new(FakeEngine::ok("static"));
        let orch = Arc::new(orchestrator(&engine));
        let mut rx = orch.subscribe();
        assert_eq!(*rx.borrow(), RunState::Idle);

        let handle = {
            let orch = orch.clone();
            tokio::spawn(async move { orch.start("1", Mode::Static).await })
        };

        rx.changed().await.unwrap();
        assert!(rx.borrow_and_update().is_loading());
        rx.changed().await.unwrap();
        assert!(rx.borrow().is_terminal());
        handle.await.unwrap().unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn dropped_run_leaves_failed_and_can_restart() {
        let engine = Arc::new(FakeEngine::ok("static"));
        let orch = orchestrator(&engine);

        // The settle delay outlasts the timeout, so the run is dropped mid-flight.
        let timed_out =
            tokio::time::timeout(Duration::from_millis(100), orch.start("1", Mode::Static)).await;
        assert!(timed_out.is_err());
        match orch.state() {
            RunState::Failed { request, message } => {
                assert_eq!(request.rounds, 1);
                assert_eq!(message, "Simulazione interrotta");
            }
            other => panic!("expected failure, got {other:?}"),
        }

        let again = orch.start("1", Mode::Static).await.unwrap();
        assert!(matches!(again, RunState::Succeeded { .. }));
        assert_eq!(engine.start_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn begin_claims_loading_before_the_run_is_driven() {
        let engine = Arc::new(FakeEngine::ok("static"));
        let orch = orchestrator(&engine);
        let request = RunRequest {
            mode: Mode::Dynamic,
            rounds: 2,
        };

        let pending = orch.begin(request).unwrap();
        assert_eq!(pending.request(), request);
        assert!(orch.state().is_loading());
        assert!(matches!(orch.begin(request), Err(RunRejected::AlreadyRunning)));
        assert_eq!(engine.start_count(), 0);

        let done = pending.run().await;
        assert!(matches!(done, RunState::Succeeded { .. }));
        assert_eq!(orch.state(), done);
    }
}
