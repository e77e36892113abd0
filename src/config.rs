//! Engine configuration
//!
//! The policy (review dimensions, thresholds, authority matrix and escalation
//! ladder) is read from a TOML file and validated once at load. Any problem is
//! a fatal [`Error::Config`].

use crate::authorize::{AuthorityLevel, ViolationClass};
use crate::error::{Error, Result};
use crate::escalation::EscalationLadder;
use crate::types::Gate;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

/// Tolerance for the dimension-weight sum
pub const WEIGHT_TOLERANCE: f64 = 1e-6;

/// Dimensions whose floor is always enforced
pub const HARD_FLOOR_DIMENSIONS: [&str; 2] = ["security", "functional-correctness"];

/// Dimension whose floor violation can never be overridden
pub const SECURITY_DIMENSION: &str = "security";

/// Directory name used under the platform data dir
const STATE_DIR_NAME: &str = "pr-gates";

const fn default_review_threshold() -> f64 {
    80.0
}

const fn default_floor() -> f64 {
    70.0
}

const fn default_authority_level() -> AuthorityLevel {
    AuthorityLevel(4)
}

const fn default_poll_interval_secs() -> u64 {
    60
}

const fn default_scheduler_max_sleep_secs() -> u64 {
    300
}

/// A configured review dimension
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DimensionSpec {
    /// Dimension name as reported by analyzers
    pub name: String,
    /// Weight in [0, 1]
    pub weight: f64,
    /// Optional hard floor in [0, 100]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub floor: Option<f64>,
}

impl DimensionSpec {
    fn new(name: &str, weight: f64, floor: Option<f64>) -> Self {
        Self {
            name: name.to_string(),
            weight,
            floor,
        }
    }
}

/// One row of the override authority matrix
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorityRule {
    /// Gate the rule applies to
    pub gate: Gate,
    /// Class of violation being waived
    pub violation: ViolationClass,
    /// Minimum authority level that may waive it
    pub min_level: AuthorityLevel,
}

impl AuthorityRule {
    const fn new(gate: Gate, violation: ViolationClass, min_level: u8) -> Self {
        Self {
            gate,
            violation,
            min_level: AuthorityLevel(min_level),
        }
    }
}

/// Gate policy: thresholds, dimensions, authority matrix and ladder
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GatePolicy {
    /// Minimum overall confidence for the review gate
    #[serde(default = "default_review_threshold")]
    pub review_threshold: f64,
    /// Floor applied to hard-floor dimensions that omit one
    #[serde(default = "default_floor")]
    pub default_floor: f64,
    /// Review dimensions with weights and optional floors
    #[serde(default = "default_dimensions")]
    pub dimensions: Vec<DimensionSpec>,
    /// Override authority matrix
    #[serde(default = "default_authority_matrix")]
    pub authority: Vec<AuthorityRule>,
    /// Level required for (gate, violation) pairs missing from the matrix
    #[serde(default = "default_authority_level")]
    pub default_authority_level: AuthorityLevel,
    /// Escalation ladder per gate
    #[serde(default)]
    pub ladder: EscalationLadder,
}

fn default_dimensions() -> Vec<DimensionSpec> {
    vec![
        DimensionSpec::new("functional-correctness", 0.20, Some(default_floor())),
        DimensionSpec::new("security", 0.20, Some(default_floor())),
        DimensionSpec::new("test-coverage", 0.15, None),
        DimensionSpec::new("architecture", 0.10, None),
        DimensionSpec::new("performance", 0.10, None),
        DimensionSpec::new("maintainability", 0.10, None),
        DimensionSpec::new("readability", 0.10, None),
        DimensionSpec::new("documentation", 0.05, None),
    ]
}

fn default_authority_matrix() -> Vec<AuthorityRule> {
    use ViolationClass as V;
    vec![
        AuthorityRule::new(Gate::PreReview, V::MissingDescription, 1),
        AuthorityRule::new(Gate::PreReview, V::ChecksIncomplete, 2),
        AuthorityRule::new(Gate::PreReview, V::CheckFailure, 2),
        AuthorityRule::new(Gate::Review, V::ScoresMissing, 3),
        AuthorityRule::new(Gate::Review, V::ConfidenceBelowThreshold, 3),
        AuthorityRule::new(Gate::Review, V::DimensionFloor, 3),
        AuthorityRule::new(Gate::PreMerge, V::ChecksIncomplete, 3),
        AuthorityRule::new(Gate::PreMerge, V::CheckFailure, 3),
        AuthorityRule::new(Gate::PreMerge, V::ApprovalStale, 2),
        AuthorityRule::new(Gate::PreMerge, V::ApprovalInvalid, 3),
        AuthorityRule::new(Gate::PreMerge, V::MergeabilityUnknown, 3),
        AuthorityRule::new(Gate::PreMerge, V::MergeConflict, 4),
        AuthorityRule::new(Gate::PostMerge, V::ChecksIncomplete, 4),
        AuthorityRule::new(Gate::PostMerge, V::CheckFailure, 4),
        AuthorityRule::new(Gate::PostMerge, V::MainBranchFailure, 4),
        AuthorityRule::new(Gate::PostMerge, V::Regression, 4),
    ]
}

impl Default for GatePolicy {
    fn default() -> Self {
        Self {
            review_threshold: default_review_threshold(),
            default_floor: default_floor(),
            dimensions: default_dimensions(),
            authority: default_authority_matrix(),
            default_authority_level: default_authority_level(),
            ladder: EscalationLadder::default(),
        }
    }
}

impl GatePolicy {
    /// Validate weights, floors, thresholds and the authority matrix.
    ///
    /// Hard-floor dimensions without an explicit floor get `default_floor`.
    pub fn validate(mut self) -> Result<Self> {
        if !(0.0..=100.0).contains(&self.review_threshold) {
            return Err(Error::Config(format!(
                "review_threshold {} is outside [0, 100]",
                self.review_threshold
            )));
        }
        if !(0.0..=100.0).contains(&self.default_floor) {
            return Err(Error::Config(format!(
                "default_floor {} is outside [0, 100]",
                self.default_floor
            )));
        }

        let mut seen = HashSet::new();
        let mut weight_sum = 0.0;
        for dim in &self.dimensions {
            if !seen.insert(dim.name.as_str()) {
                return Err(Error::Config(format!("duplicate dimension '{}'", dim.name)));
            }
            if !(0.0..=1.0).contains(&dim.weight) {
                return Err(Error::Config(format!(
                    "dimension '{}' weight {} is outside [0, 1]",
                    dim.name, dim.weight
                )));
            }
            if let Some(floor) = dim.floor {
                if !(0.0..=100.0).contains(&floor) {
                    return Err(Error::Config(format!(
                        "dimension '{}' floor {floor} is outside [0, 100]",
                        dim.name
                    )));
                }
            }
            weight_sum += dim.weight;
        }
        if (weight_sum - 1.0).abs() > WEIGHT_TOLERANCE {
            return Err(Error::Config(format!(
                "dimension weights sum to {weight_sum}, expected 1.0"
            )));
        }

        for required in HARD_FLOOR_DIMENSIONS {
            if !seen.contains(required) {
                return Err(Error::Config(format!(
                    "hard-floor dimension '{required}' is not configured"
                )));
            }
        }
        let default_floor = self.default_floor;
        for dim in &mut self.dimensions {
            if dim.floor.is_none() && HARD_FLOOR_DIMENSIONS.contains(&dim.name.as_str()) {
                dim.floor = Some(default_floor);
            }
        }

        if self.default_authority_level.0 == 0 {
            return Err(Error::Config(
                "default_authority_level must be at least 1".to_string(),
            ));
        }
        if let Some(rule) = self.authority.iter().find(|r| r.min_level.0 == 0) {
            return Err(Error::Config(format!(
                "authority rule for {} / {} must require level 1 or above",
                rule.gate, rule.violation
            )));
        }

        self.ladder.validate()?;
        Ok(self)
    }

    /// Floor for a dimension, if one is enforced
    #[must_use]
    pub fn floor_for(&self, dimension: &str) -> Option<f64> {
        self.dimensions
            .iter()
            .find(|d| d.name == dimension)
            .and_then(|d| d.floor)
            .or_else(|| {
                HARD_FLOOR_DIMENSIONS
                    .contains(&dimension)
                    .then_some(self.default_floor)
            })
    }

    /// Minimum authority for waiving `violation` at `gate`
    #[must_use]
    pub fn required_authority(&self, gate: Gate, violation: ViolationClass) -> AuthorityLevel {
        self.authority
            .iter()
            .find(|r| r.gate == gate && r.violation == violation)
            .map_or(self.default_authority_level, |r| r.min_level)
    }
}

/// Top-level engine configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Where PR records are persisted (None = platform data dir)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state_dir: Option<PathBuf>,
    /// Seconds between hosting-API polls
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
    /// Upper bound on how long the escalation scheduler sleeps
    #[serde(default = "default_scheduler_max_sleep_secs")]
    pub scheduler_max_sleep_secs: u64,
    /// Gate policy
    #[serde(default)]
    pub policy: GatePolicy,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            state_dir: None,
            poll_interval_secs: default_poll_interval_secs(),
            scheduler_max_sleep_secs: default_scheduler_max_sleep_secs(),
            policy: GatePolicy::default(),
        }
    }
}

impl EngineConfig {
    /// Parse and validate a TOML document
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let mut config: Self = toml::from_str(content)
            .map_err(|e| Error::Config(format!("failed to parse config: {e}")))?;
        if config.scheduler_max_sleep_secs == 0 {
            return Err(Error::Config(
                "scheduler_max_sleep_secs must be positive".to_string(),
            ));
        }
        config.policy = config.policy.validate()?;
        Ok(config)
    }

    /// Resolve the state directory, falling back to the platform data dir
    pub fn resolved_state_dir(&self) -> Result<PathBuf> {
        if let Some(dir) = &self.state_dir {
            return Ok(dir.clone());
        }
        dirs::data_dir()
            .map(|d| d.join(STATE_DIR_NAME))
            .ok_or_else(|| Error::Config("could not determine a data directory".to_string()))
    }
}

/// Load and validate configuration from a TOML file.
///
/// Returns the default configuration if the file doesn't exist.
pub fn load_config(path: &Path) -> Result<EngineConfig> {
    if !path.exists() {
        return Ok(EngineConfig {
            policy: GatePolicy::default().validate()?,
            ..EngineConfig::default()
        });
    }

    let content = fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("failed to read {}: {e}", path.display())))?;
    EngineConfig::from_toml_str(&content)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::escalation::LadderStep;
    use tempfile::TempDir;

    #[test]
    fn test_default_policy_is_valid() {
        let policy = GatePolicy::default().validate().unwrap();
        assert_eq!(policy.dimensions.len(), 8);
        assert_eq!(policy.floor_for("security"), Some(70.0));
        assert_eq!(policy.floor_for("functional-correctness"), Some(70.0));
        assert_eq!(policy.floor_for("readability"), None);
    }

    #[test]
    fn test_weights_must_sum_to_one() {
        let mut policy = GatePolicy::default();
        policy.dimensions[0].weight = 0.25;
        match policy.validate() {
            Err(Error::Config(msg)) => assert!(msg.contains("sum to")),
            other => panic!("Expected Config error, got: {other:?}"),
        }
    }

    #[test]
    fn test_missing_hard_floor_dimension_rejected() {
        let toml = r#"
            [[policy.dimensions]]
            name = "functional-correctness"
            weight = 0.5

            [[policy.dimensions]]
            name = "readability"
            weight = 0.5
        "#;
        let err = EngineConfig::from_toml_str(toml).unwrap_err();
        assert!(err.to_string().contains("'security'"));
    }

    #[test]
    fn test_hard_floor_defaults_applied() {
        let toml = r#"
            [policy]
            default_floor = 65.0

            [[policy.dimensions]]
            name = "security"
            weight = 0.6

            [[policy.dimensions]]
            name = "functional-correctness"
            weight = 0.4
            floor = 75.0
        "#;
        let config = EngineConfig::from_toml_str(toml).unwrap();
        assert_eq!(config.policy.floor_for("security"), Some(65.0));
        assert_eq!(config.policy.floor_for("functional-correctness"), Some(75.0));
    }

    #[test]
    fn test_duplicate_dimension_rejected() {
        let mut policy = GatePolicy::default();
        policy.dimensions[7].name = "security".to_string();
        assert!(matches!(policy.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn test_authority_lookup_falls_back_to_default() {
        let mut policy = GatePolicy::default();
        policy.authority.clear();
        assert_eq!(
            policy.required_authority(Gate::Review, ViolationClass::DimensionFloor),
            AuthorityLevel(4)
        );
    }

    #[test]
    fn test_authority_matrix_from_toml() {
        let toml = r#"
            [[policy.authority]]
            gate = "pre-merge"
            violation = "approval-stale"
            min_level = 1
        "#;
        let config = EngineConfig::from_toml_str(toml).unwrap();
        assert_eq!(
            config
                .policy
                .required_authority(Gate::PreMerge, ViolationClass::ApprovalStale),
            AuthorityLevel(1)
        );
    }

    #[test]
    fn test_ladder_override_from_toml() {
        let toml = r#"
            [policy.ladder]
            pre-review = [{ step = "after", secs = 60 }, { step = "manual" }]
        "#;
        let config = EngineConfig::from_toml_str(toml).unwrap();
        assert_eq!(
            config.policy.ladder.step(Gate::PreReview, 1),
            Some(&LadderStep::After { secs: 60 })
        );
        // Unmentioned gates keep the built-in table
        assert_eq!(
            config.policy.ladder.step(Gate::Review, 1),
            Some(&LadderStep::After { secs: 48 * 3600 })
        );
    }

    #[test]
    fn test_load_missing_file_returns_default() {
        let temp = TempDir::new().unwrap();
        let config = load_config(&temp.path().join("gates.toml")).unwrap();
        assert_eq!(config.poll_interval_secs, 60);
        assert_eq!(config.policy, GatePolicy::default().validate().unwrap());
    }

    #[test]
    fn test_load_from_file() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("gates.toml");
        fs::write(
            &path,
            "state_dir = \"/tmp/gates\"\npoll_interval_secs = 15\n\n[policy]\nreview_threshold = 85.0\n",
        )
        .unwrap();

        let config = load_config(&path).unwrap();
        assert_eq!(config.poll_interval_secs, 15);
        assert_eq!(config.policy.review_threshold, 85.0);
        assert_eq!(
            config.resolved_state_dir().unwrap(),
            PathBuf::from("/tmp/gates")
        );
    }

    #[test]
    fn test_invalid_threshold_rejected() {
        let err = EngineConfig::from_toml_str("[policy]\nreview_threshold = 120.0\n").unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }
}
