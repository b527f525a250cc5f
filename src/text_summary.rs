//! Text summary builder for CLI output.
//!
//! Formats human-readable lines for text mode from the terminal run state.

use crate::metrics;
use crate::model::{ImageAvailability, RunState};
use crate::projector::project_round;
use std::collections::HashMap;

/// Pre-formatted lines for text output.
pub(crate) struct TextSummary {
    pub lines: Vec<String>,
}

/// Build a text summary. `resolve` maps relative image paths to URLs.
pub(crate) fn build_text_summary(
    state: &RunState,
    images: &HashMap<u32, ImageAvailability>,
    resolve: impl Fn(&str) -> String,
) -> TextSummary {
    let mut lines = Vec::new();

    match state {
        RunState::Idle => lines.push("No simulation has been run.".into()),
        RunState::Loading { request } => lines.push(format!(
            "Simulation still running ({}, {} rounds)",
            request.mode, request.rounds
        )),
        RunState::Failed { request, message } => {
            lines.push(format!(
                "Simulation failed ({}, {} rounds)",
                request.mode, request.rounds
            ));
            lines.push(format!("Error: {message}"));
        }
        RunState::Succeeded { results } => {
            lines.push(format!(
                "Simulation completed: {} round(s), mode {} ({})",
                results.rounds.len(),
                results.request.mode,
                results.completed_utc
            ));
            for round in &results.rounds {
                let view = project_round(round, images.get(&round.round), &resolve);
                lines.push(String::new());
                lines.push(view.title);
                for (name, value) in view.metrics {
                    lines.push(format!("  {name}: {value}"));
                }
                lines.push(format!("  Pesi: {}", view.weights.join(", ")));
                for image in &view.images {
                    lines.push(format!("  {}: {}", image.label, image.display()));
                }
            }

            let agg = metrics::aggregate_rounds(&results.rounds);
            let stats = [
                ("Abbandono", agg.abbandono),
                ("Blocco", agg.blocco),
                ("Utilizzo", agg.utilizzo),
            ];
            if stats.iter().any(|(_, s)| s.is_some()) {
                lines.push(String::new());
                for (name, s) in stats {
                    if let Some((mean, median, p25, p75)) = s {
                        lines.push(format!(
                            "{name}: avg {mean:.4} med {median:.4} p25 {p25:.4} p75 {p75:.4}"
                        ));
                    }
                }
            }
        }
    }

    TextSummary { lines }
}
