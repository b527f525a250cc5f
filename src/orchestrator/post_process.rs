//! Post-run processing utilities.
//!
//! Probes image artifacts and performs the optional JSON export after a run succeeds.

use crate::engine::SimulationClient;
use crate::model::{ImageAvailability, RoundResult, RunResultSet};
use anyhow::{Context, Result};
use std::path::Path;

/// Result of post-run processing, ready for presentation layers.
pub(crate) struct ProcessedRun {
    pub images: Vec<(u32, ImageAvailability)>,
    pub export_messages: Vec<String>,
}

/// Probe the three images of a round concurrently.
pub(crate) async fn probe_images(client: &SimulationClient, round: &RoundResult) -> ImageAvailability {
    let (cdf, hist, fit) = futures::join!(
        client.image_available(&round.images.cdf),
        client.image_available(&round.images.hist),
        client.image_available(&round.images.fit),
    );
    ImageAvailability { cdf, hist, fit }
}

/// Write the result set as pretty JSON.
pub(crate) fn export_json(path: &Path, results: &RunResultSet) -> Result<()> {
    let json = serde_json::to_string_pretty(results).context("serialize results")?;
    std::fs::write(path, json).with_context(|| format!("write {}", path.display()))?;
    Ok(())
}

/// Process a successful run: probe images round by round, then export if requested.
pub(crate) async fn process_run_completion(
    client: &SimulationClient,
    export_path: Option<&Path>,
    results: &RunResultSet,
) -> ProcessedRun {
    let mut images = Vec::with_capacity(results.rounds.len());
    for round in &results.rounds {
        let availability = probe_images(client, round).await;
        if !availability.all_present() {
            log::warn!("round {}: some images are missing", round.round);
        }
        images.push((round.round, availability));
    }

    let mut export_messages = Vec::new();
    if let Some(path) = export_path {
        match export_json(path, results) {
            Ok(()) => export_messages.push(format!("Exported JSON: {}", path.display())),
            Err(e) => export_messages.push(format!("Export JSON failed: {e:#}")),
        }
    }

    ProcessedRun {
        images,
        export_messages,
    }
}
