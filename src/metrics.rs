use crate::model::RoundResult;

/// Compute metrics (mean, median, 25th percentile, 75th percentile) from samples
pub fn compute_metrics(samples: &[f64]) -> Option<(f64, f64, f64, f64)> {
    if samples.len() < 2 {
        return None;
    }
    let mut sorted = samples.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let n = sorted.len();
    let mean = samples.iter().sum::<f64>() / n as f64;
    let median = sorted[n / 2];
    let p25 = sorted[n / 4];
    let p75 = sorted[3 * n / 4];
    Some((mean, median, p25, p75))
}

/// Per-metric statistics across the rounds of one run.
#[derive(Debug, Clone, PartialEq)]
pub struct RunAggregate {
    pub abbandono: Option<(f64, f64, f64, f64)>,
    pub blocco: Option<(f64, f64, f64, f64)>,
    pub utilizzo: Option<(f64, f64, f64, f64)>,
}

pub fn aggregate_rounds(rounds: &[RoundResult]) -> RunAggregate {
    let column = |f: fn(&RoundResult) -> f64| -> Vec<f64> { rounds.iter().map(f).collect() };
    RunAggregate {
        abbandono: compute_metrics(&column(|r| r.abbandono)),
        blocco: compute_metrics(&column(|r| r.blocco)),
        utilizzo: compute_metrics(&column(|r| r.utilizzo)),
    }
}
