//! Review score aggregation
//!
//! Pure functions only: dimension scores in, weighted confidence and floor
//! violations out. Weights come from the configured dimension set.

use crate::config::{DimensionSpec, GatePolicy, WEIGHT_TOLERANCE};
use crate::error::{Error, Result};
use crate::types::DimensionScore;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::debug;

/// A dimension that scored below its configured floor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DimensionViolation {
    /// Dimension name
    pub dimension: String,
    /// Reported value
    pub value: f64,
    /// Configured floor
    pub floor: f64,
}

/// Weighted aggregate of review dimension scores
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfidenceScore {
    /// Weighted sum in [0, 100]
    pub overall: f64,
    /// Floor violations, sorted by dimension name
    pub violations: Vec<DimensionViolation>,
}

impl ConfidenceScore {
    /// Whether any dimension is below its floor
    #[must_use]
    pub fn has_violations(&self) -> bool {
        !self.violations.is_empty()
    }
}

/// Aggregate dimension scores into a confidence score.
///
/// Every configured dimension must be scored exactly once, and each is
/// weighted by its configured weight. The weight an analyzer reports is
/// informational only. Dimensions are accumulated in name order so the
/// result does not depend on the order analyzers reported them in.
///
/// # Errors
/// `Error::Config` if a configured dimension is missing or scored twice, an
/// unknown dimension is reported, a value is outside [0, 100], or the
/// configured weights don't sum to 1.0.
pub fn aggregate(scores: &[DimensionScore], policy: &GatePolicy) -> Result<ConfidenceScore> {
    let mut reported: HashMap<&str, &DimensionScore> = HashMap::with_capacity(scores.len());
    for score in scores {
        if !policy.dimensions.iter().any(|d| d.name == score.dimension) {
            return Err(Error::Config(format!(
                "dimension '{}' is not configured",
                score.dimension
            )));
        }
        if reported.insert(score.dimension.as_str(), score).is_some() {
            return Err(Error::Config(format!(
                "dimension '{}' scored more than once",
                score.dimension
            )));
        }
    }

    let mut configured: Vec<&DimensionSpec> = policy.dimensions.iter().collect();
    configured.sort_by(|a, b| a.name.cmp(&b.name));

    let mut weight_sum = 0.0;
    let mut overall = 0.0;
    let mut violations = Vec::new();

    for spec in configured {
        let score = reported.get(spec.name.as_str()).ok_or_else(|| {
            Error::Config(format!("dimension '{}' was not scored", spec.name))
        })?;
        if !(0.0..=100.0).contains(&score.value) {
            return Err(Error::Config(format!(
                "dimension '{}' value {} is outside [0, 100]",
                spec.name, score.value
            )));
        }
        if (score.weight - spec.weight).abs() > WEIGHT_TOLERANCE {
            debug!(
                dimension = %spec.name,
                reported = score.weight,
                configured = spec.weight,
                "Ignoring reported weight"
            );
        }

        weight_sum += spec.weight;
        overall += score.value * spec.weight;

        if let Some(floor) = policy.floor_for(&spec.name) {
            if score.value < floor {
                violations.push(DimensionViolation {
                    dimension: spec.name.clone(),
                    value: score.value,
                    floor,
                });
            }
        }
    }

    if (weight_sum - 1.0).abs() > WEIGHT_TOLERANCE {
        return Err(Error::Config(format!(
            "dimension weights sum to {weight_sum}, expected 1.0"
        )));
    }

    Ok(ConfidenceScore {
        overall,
        violations,
    })
}
