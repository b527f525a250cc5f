use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Upper bound on rounds per run accepted by the engine.
pub const MAX_ROUNDS: u32 = 20;

#[derive(Debug, Clone)]
pub struct RunConfig {
    pub engine_url: String,
    pub artifact_url: String,
    pub settle_delay: Duration,
    pub retry: RetryPolicy,
    pub request_timeout: Duration,
    pub user_agent: String,
}

/// Fixed-interval retry budget for resources that become available eventually.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub interval: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            interval: Duration::from_millis(500),
        }
    }
}

impl RetryPolicy {
    /// Number of attempts actually made; a zero budget still tries once.
    pub fn attempts(&self) -> u32 {
        self.max_attempts.max(1)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    Static,
    Dynamic,
}

impl Mode {
    /// Value sent to the engine in the `mode` query parameter.
    pub fn as_query_str(self) -> &'static str {
        match self {
            Mode::Static => "static",
            Mode::Dynamic => "dynamic",
        }
    }

    pub fn toggled(self) -> Self {
        match self {
            Mode::Static => Mode::Dynamic,
            Mode::Dynamic => Mode::Static,
        }
    }
}

impl std::fmt::Display for Mode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_query_str())
    }
}

/// Parameters of one run, fixed from the moment it enters `Loading`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunRequest {
    pub mode: Mode,
    pub rounds: u32,
}

impl RunRequest {
    /// Build a request from raw user input for the round count.
    pub fn from_raw(mode: Mode, raw_rounds: &str) -> Self {
        Self {
            mode,
            rounds: crate::params::normalize_rounds(raw_rounds),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoundImages {
    pub cdf: String,
    pub hist: String,
    pub fit: String,
}

/// Parsed `round_<n>_results.json` artifact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoundResult {
    pub round: u32,
    pub mode: String,
    pub abbandono: f64,
    pub blocco: f64,
    pub utilizzo: f64,
    pub weights: Vec<f64>,
    pub images: RoundImages,
}

impl RoundResult {
    /// Reject artifacts the writer produced with non-finite numbers or a zero round.
    pub fn validate(&self) -> Result<(), String> {
        if self.round == 0 {
            return Err("round must be >= 1".into());
        }
        for (name, v) in [
            ("abbandono", self.abbandono),
            ("blocco", self.blocco),
            ("utilizzo", self.utilizzo),
        ] {
            if !v.is_finite() {
                return Err(format!("{name} is not a finite number"));
            }
        }
        if let Some(i) = self.weights.iter().position(|w| !w.is_finite()) {
            return Err(format!("weight W{} is not a finite number", i + 1));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunResultSet {
    pub request: RunRequest,
    pub rounds: Vec<RoundResult>,
    #[serde(default)]
    pub completed_utc: String,
}

/// Whether each image of a round could be served. Missing images never fail a round.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ImageAvailability {
    pub cdf: bool,
    pub hist: bool,
    pub fit: bool,
}

impl ImageAvailability {
    pub fn all_present(&self) -> bool {
        self.cdf && self.hist && self.fit
    }
}

/// Messages from the controller to presentation layers, alongside the watched `RunState`.
#[derive(Debug, Clone)]
pub enum DashboardEvent {
    Info(String),
    ImagesProbed {
        round: u32,
        availability: ImageAvailability,
    },
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum RunState {
    #[default]
    Idle,
    Loading {
        request: RunRequest,
    },
    Succeeded {
        // Box to keep RunState small; it is cloned on every watch borrow.
        results: Box<RunResultSet>,
    },
    Failed {
        request: RunRequest,
        message: String,
    },
}

impl RunState {
    pub fn is_loading(&self) -> bool {
        matches!(self, RunState::Loading { .. })
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, RunState::Succeeded { .. } | RunState::Failed { .. })
    }

    /// Short status label for status lines and logs.
    pub fn label(&self) -> &'static str {
        match self {
            RunState::Idle => "idle",
            RunState::Loading { .. } => "loading",
            RunState::Succeeded { .. } => "succeeded",
            RunState::Failed { .. } => "failed",
        }
    }
}
