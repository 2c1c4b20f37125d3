use serde::{Deserialize, Serialize};

/// Distribution summary of one impact area across all trials.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SummaryStatistics {
    pub mean: f64,
    pub median: f64,
    /// Population standard deviation.
    pub std_dev: f64,
    #[serde(rename = "5th_percentile")]
    pub percentile_5: f64,
    #[serde(rename = "95th_percentile")]
    pub percentile_95: f64,
}

impl SummaryStatistics {
    /// Summarize `values`. Returns `None` for an empty slice.
    pub fn from_values(values: &[f64]) -> Option<Self> {
        if values.is_empty() {
            return None;
        }

        let mut sorted = values.to_vec();
        sorted.sort_by(f64::total_cmp);

        let n = sorted.len() as f64;
        let mean = sorted.iter().sum::<f64>() / n;
        let variance = sorted.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;

        Some(Self {
            mean,
            median: percentile(&sorted, 50.0),
            std_dev: variance.sqrt(),
            percentile_5: percentile(&sorted, 5.0),
            percentile_95: percentile(&sorted, 95.0),
        })
    }
}

/// Linear-interpolation percentile over ascending `sorted` values.
///
/// The rank is `p / 100 * (n - 1)`; the result interpolates between the
/// values at the floor and ceiling of that rank.
pub fn percentile(sorted: &[f64], p: f64) -> f64 {
    match sorted.len() {
        0 => f64::NAN,
        1 => sorted[0],
        n => {
            let rank = (p / 100.0).clamp(0.0, 1.0) * (n - 1) as f64;
            let lower = rank.floor() as usize;
            let upper = rank.ceil() as usize;
            let weight = rank - lower as f64;
            sorted[lower] + (sorted[upper] - sorted[lower]) * weight
        }
    }
}
