mod poller;
mod simulation;

pub use poller::{fetch_round, poll_until_ready, Exhausted};
pub use simulation::SimulationClient;

use crate::error::{ArtifactError, StartError};
use crate::model::{RoundResult, RunRequest};
use async_trait::async_trait;

/// Remote simulation engine plus the file server exposing its artifacts.
#[async_trait]
pub trait SimulationService: Send + Sync {
    /// Ask the engine to begin a run. Does not wait for the run to finish.
    async fn start(&self, request: &RunRequest) -> Result<(), StartError>;

    /// One attempt at fetching and parsing the artifact for `index`.
    async fn fetch_round(&self, index: u32) -> Result<RoundResult, ArtifactError>;
}

#[cfg(test)]
pub(crate) mod testing {
    //! Scripted in-memory engine for orchestrator and poller tests.

    use super::SimulationService;
    use crate::error::{ArtifactError, StartError};
    use crate::model::{RoundImages, RoundResult, RunRequest};
    use async_trait::async_trait;
    use std::collections::{HashMap, VecDeque};
    use std::sync::Mutex;
    use tokio::time::Instant;

    pub fn round(index: u32, mode: &str) -> RoundResult {
        RoundResult {
            round: index,
            mode: mode.to_string(),
            abbandono: 0.01 * index as f64,
            blocco: 0.1,
            utilizzo: 0.5,
            weights: vec![0.5, 0.5],
            images: RoundImages {
                cdf: format!("cdf_{index}.png"),
                hist: format!("hist_{index}.png"),
                fit: format!("fit_{index}.png"),
            },
        }
    }

    #[derive(Default)]
    pub struct FakeEngine {
        start_result: Mutex<Option<StartError>>,
        scripts: Mutex<HashMap<u32, VecDeque<Result<RoundResult, ArtifactError>>>>,
        default_mode: Mutex<String>,
        pub starts: Mutex<Vec<RunRequest>>,
        pub fetches: Mutex<Vec<(u32, Instant)>>,
    }

    impl FakeEngine {
        /// Engine whose rounds all succeed on the first attempt.
        pub fn ok(mode: &str) -> Self {
            let engine = Self::default();
            *engine.default_mode.lock().unwrap() = mode.to_string();
            engine
        }

        pub fn failing_start(cause: &str) -> Self {
            let engine = Self::ok("static");
            *engine.start_result.lock().unwrap() = Some(StartError::new(cause));
            engine
        }

        /// Queue attempt outcomes for `index`; once drained the round succeeds.
        pub fn script(self, index: u32, outcomes: Vec<Result<RoundResult, ArtifactError>>) -> Self {
            self.scripts
                .lock()
                .unwrap()
                .insert(index, outcomes.into_iter().collect());
            self
        }

        /// Make every attempt for `index` return not-found.
        pub fn never(self, index: u32) -> Self {
            self.script(index, vec![Err(ArtifactError::NotFound); 64])
        }

        pub fn start_count(&self) -> usize {
            self.starts.lock().unwrap().len()
        }

        pub fn fetches_for(&self, index: u32) -> usize {
            self.fetches
                .lock()
                .unwrap()
                .iter()
                .filter(|(i, _)| *i == index)
                .count()
        }

        pub fn fetch_count(&self) -> usize {
            self.fetches.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl SimulationService for FakeEngine {
        async fn start(&self, request: &RunRequest) -> Result<(), StartError> {
            self.starts.lock().unwrap().push(*request);
            match self.start_result.lock().unwrap().clone() {
                Some(e) => Err(e),
                None => Ok(()),
            }
        }

        async fn fetch_round(&self, index: u32) -> Result<RoundResult, ArtifactError> {
            self.fetches.lock().unwrap().push((index, Instant::now()));
            let scripted = self
                .scripts
                .lock()
                .unwrap()
                .get_mut(&index)
                .and_then(|q| q.pop_front());
            match scripted {
                Some(outcome) => outcome,
                None => Ok(round(index, &self.default_mode.lock().unwrap())),
            }
        }
    }
}
