use crate::engine::SimulationClient;
use crate::model::{ImageAvailability, Mode, RetryPolicy, RunConfig, RunRequest, RunState};
use crate::orchestrator::{process_run_completion, RunOrchestrator, RunPolicy};
use anyhow::{Context, Result};
use clap::Parser;
use std::collections::HashMap;
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

/// Output line routing for stdout/stderr writer.
enum OutputLine {
    Stdout(String),
    Stderr(String),
}

/// Spawn a blocking writer for stdout/stderr to avoid blocking async tasks.
fn spawn_output_writer() -> (
    mpsc::UnboundedSender<OutputLine>,
    tokio::task::JoinHandle<()>,
) {
    let (tx, mut rx) = mpsc::unbounded_channel::<OutputLine>();
    let handle = tokio::task::spawn_blocking(move || {
        let stdout = std::io::stdout();
        let stderr = std::io::stderr();
        let mut out = std::io::LineWriter::new(stdout.lock());
        let mut err = std::io::LineWriter::new(stderr.lock());

        while let Some(line) = rx.blocking_recv() {
            match line {
                OutputLine::Stdout(msg) => {
                    let _ = writeln!(out, "{}", msg);
                }
                OutputLine::Stderr(msg) => {
                    let _ = writeln!(err, "{}", msg);
                }
            }
        }

        let _ = out.flush();
        let _ = err.flush();
    });
    (tx, handle)
}

#[derive(Debug, Parser, Clone)]
#[command(
    name = "sim-dashboard",
    version,
    about = "Start BPH simulation runs and collect their per-round results"
)]
pub struct Cli {
    /// Base URL of the simulation engine
    #[arg(long, default_value = "http://localhost:8081")]
    pub engine_url: String,

    /// Base URL under which round artifacts and images are served
    #[arg(long, default_value = "http://localhost:3000/output")]
    pub artifact_url: String,

    /// Simulation mode
    #[arg(long, value_enum, default_value_t = Mode::Static)]
    pub mode: Mode,

    /// Number of rounds (clamped to 1..=20; invalid input counts as 1)
    #[arg(long, default_value = "1", allow_hyphen_values = true)]
    pub rounds: String,

    /// Wait after starting before the first artifact poll
    #[arg(long, default_value = "1s")]
    pub settle_delay: humantime::Duration,

    /// Fixed wait between artifact fetch attempts
    #[arg(long, default_value = "500ms")]
    pub poll_interval: humantime::Duration,

    /// Fetch attempts per round before the run fails
    #[arg(long, default_value_t = 5)]
    pub max_attempts: u32,

    /// Timeout for each HTTP request
    #[arg(long, default_value = "10s")]
    pub request_timeout: humantime::Duration,

    /// Print JSON result and exit (no TUI)
    #[arg(long)]
    pub json: bool,

    /// Print text summary and exit (no TUI)
    #[arg(long)]
    pub text: bool,

    /// Export the results of a successful run as JSON
    #[arg(long)]
    pub export_json: Option<std::path::PathBuf>,

    /// Start a run as soon as the dashboard opens
    #[arg(long, default_value_t = false, action = clap::ArgAction::Set)]
    pub run_on_launch: bool,
}

pub async fn run(args: Cli) -> Result<()> {
    if args.json && args.text {
        return Err(anyhow::anyhow!("--json and --text are mutually exclusive"));
    }

    if !args.json && !args.text {
        #[cfg(feature = "tui")]
        {
            return crate::tui::run(args).await;
        }
        #[cfg(not(feature = "tui"))]
        {
            // Fallback when built without TUI support.
            return run_text(args).await;
        }
    }

    if args.json {
        return run_json(args).await;
    }

    run_text(args).await
}

/// Build a `RunConfig` from CLI arguments.
pub fn build_config(args: &Cli) -> RunConfig {
    RunConfig {
        engine_url: args.engine_url.clone(),
        artifact_url: args.artifact_url.clone(),
        settle_delay: Duration::from(args.settle_delay),
        retry: RetryPolicy {
            max_attempts: args.max_attempts,
            interval: Duration::from(args.poll_interval),
        },
        request_timeout: Duration::from(args.request_timeout),
        user_agent: format!("sim-dashboard/{}", env!("CARGO_PKG_VERSION")),
    }
}

/// Build the HTTP client and an orchestrator driving it.
pub(crate) fn build_orchestrator(cfg: &RunConfig) -> Result<(SimulationClient, Arc<RunOrchestrator>)> {
    let client = SimulationClient::new(cfg)?;
    let orchestrator = Arc::new(RunOrchestrator::new(
        Arc::new(client.clone()),
        RunPolicy::from(cfg),
    ));
    Ok((client, orchestrator))
}

/// Run once to a terminal state, then probe images and export on success.
async fn run_once(
    args: &Cli,
    client: &SimulationClient,
    orchestrator: &RunOrchestrator,
) -> Result<(RunState, HashMap<u32, ImageAvailability>, Vec<String>)> {
    let request = RunRequest::from_raw(args.mode, &args.rounds);
    let state = orchestrator
        .start_request(request)
        .await
        .context("simulation could not be started")?;

    let (images, messages) = match &state {
        RunState::Succeeded { results } => {
            let processed =
                process_run_completion(client, args.export_json.as_deref(), results).await;
            (
                processed.images.into_iter().collect(),
                processed.export_messages,
            )
        }
        _ => (HashMap::new(), Vec::new()),
    };
    Ok((state, images, messages))
}

async fn run_json(args: Cli) -> Result<()> {
    let cfg = build_config(&args);
    let (client, orchestrator) = build_orchestrator(&cfg)?;
    let (out_tx, out_handle) = spawn_output_writer();

    let (state, _images, messages) = run_once(&args, &client, &orchestrator).await?;
    for msg in messages {
        let _ = out_tx.send(OutputLine::Stderr(msg));
    }

    let outcome = match &state {
        RunState::Succeeded { results } => {
            let out = serde_json::to_string_pretty(results)?;
            let _ = out_tx.send(OutputLine::Stdout(out));
            Ok(())
        }
        RunState::Failed { message, .. } => Err(anyhow::anyhow!("{message}")),
        other => Err(anyhow::anyhow!("run ended in unexpected state: {}", other.label())),
    };

    drop(out_tx);
    let _ = out_handle.await;
    outcome
}

async fn run_text(args: Cli) -> Result<()> {
    let cfg = build_config(&args);
    let (client, orchestrator) = build_orchestrator(&cfg)?;
    let (out_tx, out_handle) = spawn_output_writer();

    // Report transitions on stderr while the run progresses.
    let mut state_rx = orchestrator.subscribe();
    let progress_tx = out_tx.clone();
    let progress = tokio::spawn(async move {
        while state_rx.changed().await.is_ok() {
            let state = state_rx.borrow_and_update().clone();
            let line = match &state {
                RunState::Loading { request } => format!(
                    "== Simulazione... ({}, {} rounds) ==",
                    request.mode, request.rounds
                ),
                other => format!("== {} ==", other.label()),
            };
            let _ = progress_tx.send(OutputLine::Stderr(line));
            if state.is_terminal() {
                break;
            }
        }
    });

    let (state, images, messages) = run_once(&args, &client, &orchestrator).await?;
    let _ = progress.await;

    let summary = crate::text_summary::build_text_summary(&state, &images, |p| {
        client.artifact(p).to_string()
    });
    for line in summary.lines {
        let _ = out_tx.send(OutputLine::Stdout(line));
    }
    for msg in messages {
        let _ = out_tx.send(OutputLine::Stderr(msg));
    }

    drop(out_tx);
    let _ = out_handle.await;

    match state {
        RunState::Failed { message, .. } => Err(anyhow::anyhow!("{message}")),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_polling_policy() {
        let args = Cli::parse_from(["sim-dashboard"]);
        let cfg = build_config(&args);
        assert_eq!(cfg.settle_delay, Duration::from_millis(1000));
        assert_eq!(cfg.retry, RetryPolicy::default());
        assert_eq!(cfg.engine_url, "http://localhost:8081");
        assert_eq!(args.mode, Mode::Static);
        assert!(cfg.user_agent.starts_with("sim-dashboard/"));
    }

    #[test]
    fn flags_override_policy() {
        let args = Cli::parse_from([
            "sim-dashboard",
            "--mode",
            "dynamic",
            "--rounds",
            "-3",
            "--settle-delay",
            "2s",
            "--poll-interval",
            "250ms",
            "--max-attempts",
            "8",
        ]);
        let cfg = build_config(&args);
        assert_eq!(args.mode, Mode::Dynamic);
        assert_eq!(RunRequest::from_raw(args.mode, &args.rounds).rounds, 1);
        assert_eq!(cfg.settle_delay, Duration::from_secs(2));
        assert_eq!(cfg.retry.interval, Duration::from_millis(250));
        assert_eq!(cfg.retry.max_attempts, 8);
    }

    #[tokio::test]
    async fn json_and_text_are_exclusive() {
        let args = Cli::parse_from(["sim-dashboard", "--json", "--text"]);
        assert!(run(args).await.is_err());
    }
}
