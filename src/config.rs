use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::Path;

use crate::common::error::{PipelineError, Result};
use crate::domain::Tier;

/// Threshold configuration consumed at run start. Invalid values fail the
/// run before any processing begins; no partial output is produced.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineThresholds {
    /// Minimum fuzzy-match score for a candidate to be accepted.
    pub fuzzy_min_confidence: f64,
    /// A fuzzy match is rejected as ambiguous when a second candidate scores
    /// within this margin of the top score.
    pub fuzzy_ambiguity_margin: f64,
    /// Overlapping shifts within this tolerance are merged; beyond it the
    /// longer interval wins and the shorter is superseded.
    pub shift_overlap_tolerance_seconds: f64,
    /// When true, near-miss goal combinations (type Goal without detail
    /// Goal_Scored, type Shot with detail "Goal") emit Warning findings.
    /// Goal counting itself always uses the exact conjunction.
    pub goal_filter_strict: bool,
    /// Unresolved-mention rate (per game) above which Tier 2 flags the run.
    pub unresolved_warning_ratio: f64,
    /// Optional re-tiering of named Tier 2 rules. Tier 1 invariants are not
    /// overridable.
    pub severity_overrides: HashMap<String, Tier>,
}

impl Default for PipelineThresholds {
    fn default() -> Self {
        Self {
            fuzzy_min_confidence: 0.75,
            fuzzy_ambiguity_margin: 0.05,
            shift_overlap_tolerance_seconds: 2.0,
            goal_filter_strict: true,
            unresolved_warning_ratio: 0.1,
            severity_overrides: HashMap::new(),
        }
    }
}

impl PipelineThresholds {
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            PipelineError::Config(format!("failed to read config file '{}': {}", path.display(), e))
        })?;
        let thresholds: PipelineThresholds = toml::from_str(&content)?;
        thresholds.validate()?;
        Ok(thresholds)
    }

    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.fuzzy_min_confidence) {
            return Err(PipelineError::Config(format!(
                "fuzzy_min_confidence must be within [0, 1], got {}",
                self.fuzzy_min_confidence
            )));
        }
        if !(0.0..=1.0).contains(&self.fuzzy_ambiguity_margin) {
            return Err(PipelineError::Config(format!(
                "fuzzy_ambiguity_margin must be within [0, 1], got {}",
                self.fuzzy_ambiguity_margin
            )));
        }
        if self.shift_overlap_tolerance_seconds < 0.0
            || !self.shift_overlap_tolerance_seconds.is_finite()
        {
            return Err(PipelineError::Config(format!(
                "shift_overlap_tolerance_seconds must be a non-negative number, got {}",
                self.shift_overlap_tolerance_seconds
            )));
        }
        if !(0.0..=1.0).contains(&self.unresolved_warning_ratio) {
            return Err(PipelineError::Config(format!(
                "unresolved_warning_ratio must be within [0, 1], got {}",
                self.unresolved_warning_ratio
            )));
        }
        for (rule_id, tier) in &self.severity_overrides {
            if *tier == Tier::Blocking {
                return Err(PipelineError::Config(format!(
                    "severity override for '{}' cannot promote to Blocking",
                    rule_id
                )));
            }
        }
        Ok(())
    }

    /// Effective tier for a rule after severity overrides.
    pub fn tier_for(&self, rule_id: &str, default: Tier) -> Tier {
        if default == Tier::Blocking {
            return default;
        }
        self.severity_overrides
            .get(rule_id)
            .copied()
            .unwrap_or(default)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_validate() {
        assert!(PipelineThresholds::default().validate().is_ok());
    }

    #[test]
    fn out_of_range_confidence_is_rejected() {
        let thresholds = PipelineThresholds {
            fuzzy_min_confidence: 1.5,
            ..Default::default()
        };
        assert!(thresholds.validate().is_err());
    }

    #[test]
    fn negative_tolerance_is_rejected() {
        let thresholds = PipelineThresholds {
            shift_overlap_tolerance_seconds: -1.0,
            ..Default::default()
        };
        assert!(thresholds.validate().is_err());
    }

    #[test]
    fn blocking_override_is_rejected() {
        let mut thresholds = PipelineThresholds::default();
        thresholds
            .severity_overrides
            .insert("unresolved_rate".to_string(), Tier::Blocking);
        assert!(thresholds.validate().is_err());
    }

    #[test]
    fn load_round_trips_through_toml() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "fuzzy_min_confidence = 0.8\nfuzzy_ambiguity_margin = 0.1\nshift_overlap_tolerance_seconds = 3.0\ngoal_filter_strict = false"
        )
        .unwrap();

        let thresholds = PipelineThresholds::load(file.path()).unwrap();
        assert_eq!(thresholds.fuzzy_min_confidence, 0.8);
        assert_eq!(thresholds.fuzzy_ambiguity_margin, 0.1);
        assert_eq!(thresholds.shift_overlap_tolerance_seconds, 3.0);
        assert!(!thresholds.goal_filter_strict);
        // Unspecified options keep their defaults.
        assert_eq!(thresholds.unresolved_warning_ratio, 0.1);
    }

    #[test]
    fn tier_overrides_never_touch_blocking_rules() {
        let mut thresholds = PipelineThresholds::default();
        thresholds
            .severity_overrides
            .insert("unresolved_rate".to_string(), Tier::Informational);

        assert_eq!(
            thresholds.tier_for("unresolved_rate", Tier::Warning),
            Tier::Informational
        );
        assert_eq!(
            thresholds.tier_for("goal_count_invariant", Tier::Blocking),
            Tier::Blocking
        );
    }
}
