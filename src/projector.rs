//! Display-ready projection of round results.
//!
//! Pure functions: no I/O, no state. Every presentation layer renders from these views.

use crate::model::{ImageAvailability, RoundResult};

/// Placeholder shown instead of an image that could not be served.
pub const MISSING_IMAGE: &str = "Immagine non disponibile";

#[derive(Debug, Clone, PartialEq)]
pub struct ImageView {
    pub label: &'static str,
    pub url: String,
    /// `None` until the artifact has been probed.
    pub available: Option<bool>,
}

impl ImageView {
    /// What to show for this image: its URL, or the placeholder when known to be missing.
    pub fn display(&self) -> &str {
        match self.available {
            Some(false) => MISSING_IMAGE,
            _ => &self.url,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RoundView {
    pub title: String,
    pub metrics: Vec<(&'static str, String)>,
    pub weights: Vec<String>,
    pub images: Vec<ImageView>,
}

pub fn format_metric(v: f64) -> String {
    format!("{v:.4}")
}

/// Project a round. `resolve` maps a relative artifact path to a fetchable location.
pub fn project_round(
    round: &RoundResult,
    availability: Option<&ImageAvailability>,
    resolve: impl Fn(&str) -> String,
) -> RoundView {
    let image = |label, path: &str, ok: Option<bool>| ImageView {
        label,
        url: resolve(path),
        available: ok,
    };

    RoundView {
        title: format!("Round {} – {}", round.round, round.mode),
        metrics: vec![
            ("Abbandono", format_metric(round.abbandono)),
            ("Blocco", format_metric(round.blocco)),
            ("Utilizzo", format_metric(round.utilizzo)),
        ],
        weights: round
            .weights
            .iter()
            .enumerate()
            .map(|(i, w)| format!("W{} = {}", i + 1, w))
            .collect(),
        images: vec![
            image("CDF", &round.images.cdf, availability.map(|a| a.cdf)),
            image(
                "Istogramma inter-arrivi",
                &round.images.hist,
                availability.map(|a| a.hist),
            ),
            image("BPH Fit", &round.images.fit, availability.map(|a| a.fit)),
        ],
    }
}
