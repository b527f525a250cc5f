//! Run lifecycle controller.
//!
//! Turns UI commands into orchestrator calls and emits events for presentation layers.

use super::post_process::process_run_completion;
use super::run::RunOrchestrator;
use crate::engine::SimulationClient;
use crate::error::RunRejected;
use crate::model::{DashboardEvent, Mode, RunRequest, RunResultSet, RunState};
use anyhow::Result;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;

/// Commands emitted by UI layers.
#[derive(Debug, Clone)]
pub(crate) enum UiCommand {
    Start { raw_rounds: String, mode: Mode },
    Quit,
}

type RunHandle = JoinHandle<RunState>;

/// Everything the controller needs besides its channels.
pub(crate) struct ControllerCtx {
    pub orchestrator: Arc<RunOrchestrator>,
    pub client: SimulationClient,
    pub export_json: Option<PathBuf>,
}

/// Claim `Loading` before returning, then drive the run on its own task.
fn spawn_run(
    orchestrator: &RunOrchestrator,
    raw_rounds: &str,
    mode: Mode,
) -> Result<RunHandle, RunRejected> {
    let pending = orchestrator.begin(RunRequest::from_raw(mode, raw_rounds))?;
    log::debug!("driving run of {} round(s)", pending.request().rounds);
    Ok(tokio::spawn(pending.run()))
}

/// Probe images and export off the command loop. Results arrive as events.
fn spawn_post_process(
    ctx: &ControllerCtx,
    results: Box<RunResultSet>,
    event_tx: UnboundedSender<DashboardEvent>,
) -> JoinHandle<()> {
    let client = ctx.client.clone();
    let export_json = ctx.export_json.clone();
    tokio::spawn(async move {
        let processed = process_run_completion(&client, export_json.as_deref(), &results).await;
        for (round, availability) in processed.images {
            let _ = event_tx.send(DashboardEvent::ImagesProbed { round, availability });
        }
        for msg in processed.export_messages {
            let _ = event_tx.send(DashboardEvent::Info(msg));
        }
    })
}

/// Serve UI commands until quit. At most one run is in flight at a time.
pub(crate) async fn run_controller(
    ctx: ControllerCtx,
    event_tx: UnboundedSender<DashboardEvent>,
    mut cmd_rx: UnboundedReceiver<UiCommand>,
) -> Result<()> {
    let mut handle: Option<RunHandle> = None;
    let mut post: Option<JoinHandle<()>> = None;

    loop {
        tokio::select! {
            cmd = cmd_rx.recv() => {
                match cmd {
                    Some(UiCommand::Start { raw_rounds, mode }) => {
                        match spawn_run(&ctx.orchestrator, &raw_rounds, mode) {
                            Ok(next) => {
                                // The previous run, if any, is already terminal; its
                                // completion is superseded and not post-processed.
                                if let Some(p) = post.take() {
                                    p.abort();
                                }
                                handle = Some(next);
                            }
                            Err(RunRejected::AlreadyRunning) => {
                                log::debug!("start rejected: state is {}", ctx.orchestrator.state().label());
                                let _ = event_tx.send(DashboardEvent::Info(
                                    "Simulazione già in corso".into(),
                                ));
                            }
                        }
                    }
                    // No cancellation: an in-flight run is dropped with the runtime.
                    Some(UiCommand::Quit) | None => {
                        if let Some(p) = post.take() {
                            p.abort();
                        }
                        break Ok(());
                    }
                }
            }
            // Keep the JoinHandle in place until this branch wins, or completion is lost.
            maybe_done = async {
                if let Some(h) = handle.as_mut() {
                    return Some(h.await);
                }
                futures::future::pending().await
            } => {
                handle = None;
                match maybe_done {
                    Some(Ok(RunState::Succeeded { results })) => {
                        post = Some(spawn_post_process(&ctx, results, event_tx.clone()));
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        let _ = event_tx.send(DashboardEvent::Info(format!("Run join failed: {e}")));
                    }
                    None => {}
                }
            }
        }
    }
}
