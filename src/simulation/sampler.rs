use rand::Rng;
use rand_distr::{Distribution as _, Normal, Triangular};
use std::fmt;
use std::str::FromStr;

use crate::error::{AnalysisError, AnalysisResult};

/// Supported assumption distributions.
///
/// Bounds are interpreted per kind:
/// - uniform: every value in `[min, max]` equally likely
/// - normal: mean at the midpoint, standard deviation `(max - min) / 6`, so
///   about 99.7% of draws land inside the bounds; draws are not clamped
/// - triangular: peak at the midpoint, support exactly `[min, max]`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DistributionKind {
    Uniform,
    Normal,
    Triangular,
}

impl DistributionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DistributionKind::Uniform => "uniform",
            DistributionKind::Normal => "normal",
            DistributionKind::Triangular => "triangular",
        }
    }
}

impl fmt::Display for DistributionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DistributionKind {
    type Err = AnalysisError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "uniform" => Ok(DistributionKind::Uniform),
            "normal" => Ok(DistributionKind::Normal),
            "triangular" => Ok(DistributionKind::Triangular),
            other => Err(AnalysisError::InvalidDistribution {
                name: other.to_string(),
            }),
        }
    }
}

/// Reject non-finite bounds, a span `max - min` that overflows, and
/// `min > max`. Equal bounds are allowed.
pub fn validate_bounds(min: f64, max: f64) -> AnalysisResult<()> {
    if !min.is_finite() || !max.is_finite() {
        return Err(AnalysisError::invalid_argument(format!(
            "bounds must be finite, got [{}, {}]",
            min, max
        )));
    }
    if min > max {
        return Err(AnalysisError::invalid_argument(format!(
            "min {} is greater than max {}",
            min, max
        )));
    }
    if !(max - min).is_finite() {
        return Err(AnalysisError::invalid_argument(format!(
            "span of [{}, {}] is not representable",
            min, max
        )));
    }
    Ok(())
}

/// Draw one value.
///
/// Equal bounds are degenerate and always return `min`.
pub fn sample<R: Rng + ?Sized>(
    rng: &mut R,
    kind: DistributionKind,
    min: f64,
    max: f64,
) -> AnalysisResult<f64> {
    validate_bounds(min, max)?;
    if min == max {
        return Ok(min);
    }

    let midpoint = (min + max) / 2.0;
    let value = match kind {
        DistributionKind::Uniform => rng.gen_range(min..=max),
        DistributionKind::Normal => Normal::new(midpoint, (max - min) / 6.0)
            .map_err(|e| AnalysisError::invalid_argument(e.to_string()))?
            .sample(rng),
        DistributionKind::Triangular => Triangular::new(min, max, midpoint)
            .map_err(|e| AnalysisError::invalid_argument(e.to_string()))?
            .sample(rng),
    };
    Ok(value)
}

/// Parse `distribution` and draw one value.
pub fn sample_named<R: Rng + ?Sized>(
    rng: &mut R,
    distribution: &str,
    min: f64,
    max: f64,
) -> AnalysisResult<f64> {
    let kind: DistributionKind = distribution.parse()?;
    sample(rng, kind, min, max)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_parse_kinds() {
        assert_eq!("uniform".parse::<DistributionKind>().unwrap(), DistributionKind::Uniform);
        assert_eq!("normal".parse::<DistributionKind>().unwrap(), DistributionKind::Normal);
        assert_eq!(
            "triangular".parse::<DistributionKind>().unwrap(),
            DistributionKind::Triangular
        );
    }

    #[test]
    fn test_unknown_kind_is_invalid_distribution() {
        let err = "exponential".parse::<DistributionKind>().unwrap_err();
        assert!(matches!(err, AnalysisError::InvalidDistribution { ref name } if name == "exponential"));
        assert_eq!(err.status_code(), 400);
    }

    #[test]
    fn test_uniform_and_triangular_stay_in_bounds() {
        let mut rng = StdRng::seed_from_u64(7);
        for kind in [DistributionKind::Uniform, DistributionKind::Triangular] {
            for _ in 0..10_000 {
                let v = sample(&mut rng, kind, 10.0, 20.0).unwrap();
                assert!((10.0..=20.0).contains(&v), "{} drew {}", kind, v);
            }
        }
    }

    #[test]
    fn test_normal_centers_on_midpoint() {
        let mut rng = StdRng::seed_from_u64(11);
        let n = 20_000;
        let mean: f64 = (0..n)
            .map(|_| sample(&mut rng, DistributionKind::Normal, 0.0, 60.0).unwrap())
            .sum::<f64>()
            / n as f64;
        // sd = 10, standard error of the mean ~ 0.07
        assert!((mean - 30.0).abs() < 0.5, "mean {}", mean);
    }

    #[test]
    fn test_equal_bounds_are_degenerate() {
        let mut rng = StdRng::seed_from_u64(3);
        for kind in [
            DistributionKind::Uniform,
            DistributionKind::Normal,
            DistributionKind::Triangular,
        ] {
            assert_eq!(sample(&mut rng, kind, 5.0, 5.0).unwrap(), 5.0);
        }
    }

    #[test]
    fn test_inverted_bounds_rejected() {
        let mut rng = StdRng::seed_from_u64(3);
        let err = sample(&mut rng, DistributionKind::Uniform, 2.0, 1.0).unwrap_err();
        assert!(matches!(err, AnalysisError::InvalidArgument { .. }));
    }

    #[test]
    fn test_non_finite_bounds_rejected() {
        assert!(validate_bounds(f64::NAN, 1.0).is_err());
        assert!(validate_bounds(0.0, f64::INFINITY).is_err());
        assert!(validate_bounds(-1.0, 1.0).is_ok());
    }

    #[test]
    fn test_overflowing_span_rejected() {
        let mut rng = StdRng::seed_from_u64(3);
        for kind in [
            DistributionKind::Uniform,
            DistributionKind::Normal,
            DistributionKind::Triangular,
        ] {
            let err = sample(&mut rng, kind, -1e308, 1e308).unwrap_err();
            assert!(
                matches!(err, AnalysisError::InvalidArgument { ref message } if message.contains("span")),
                "{}: {}",
                kind,
                err
            );
        }
        assert!(validate_bounds(-1e307, 1e307).is_ok());
    }

    #[test]
    fn test_sample_named_checks_name_first() {
        let mut rng = StdRng::seed_from_u64(3);
        let err = sample_named(&mut rng, "lognormal", 2.0, 1.0).unwrap_err();
        assert!(matches!(err, AnalysisError::InvalidDistribution { .. }));
    }
}
