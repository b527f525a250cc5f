use thiserror::Error;

/// The start request to the simulation engine did not succeed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Impossibile avviare la simulazione: {cause}")]
pub struct StartError {
    pub cause: String,
}

impl StartError {
    pub fn new(cause: impl Into<String>) -> Self {
        Self {
            cause: cause.into(),
        }
    }
}

/// Outcome of a single artifact fetch attempt. Every variant counts as "not yet available".
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ArtifactError {
    #[error("not found")]
    NotFound,
    #[error("HTTP {0}")]
    Status(u16),
    #[error("request failed: {0}")]
    Transport(String),
    #[error("malformed artifact: {0}")]
    Malformed(String),
}

impl ArtifactError {
    /// Whether the artifact appeared but could not be parsed.
    pub fn is_malformed(&self) -> bool {
        matches!(self, ArtifactError::Malformed(_))
    }
}

/// A round's artifact never became available within the attempt budget.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Manca round_{index}_results.json dopo {attempts} tentativi ({reason})")]
pub struct RoundFetchError {
    pub index: u32,
    pub attempts: u32,
    pub reason: String,
}

impl RoundFetchError {
    pub(crate) fn from_last(index: u32, attempts: u32, last: &ArtifactError) -> Self {
        let reason = if last.is_malformed() {
            format!("appeared but unparseable: {last}")
        } else {
            format!("never appeared: {last}")
        };
        Self {
            index,
            attempts,
            reason,
        }
    }
}

/// A start was requested while a run is still loading.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum RunRejected {
    #[error("a simulation is already running")]
    AlreadyRunning,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn start_error_message_keeps_cause() {
        let e = StartError::new("HTTP 500");
        assert_eq!(
            e.to_string(),
            "Impossibile avviare la simulazione: HTTP 500"
        );
    }

    #[test]
    fn round_fetch_error_distinguishes_cause_in_text() {
        let missing = RoundFetchError::from_last(3, 5, &ArtifactError::NotFound);
        let broken = RoundFetchError::from_last(3, 5, &ArtifactError::Malformed("eof".into()));
        assert_eq!(missing.index, 3);
        assert_eq!(missing.attempts, 5);
        assert!(missing.reason.starts_with("never appeared"));
        assert!(broken.reason.starts_with("appeared but unparseable"));
        assert!(missing.to_string().contains("round_3_results.json"));
    }
}
