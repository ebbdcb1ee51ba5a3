//! Metrics module for the warehouse pipeline.
//!
//! Provides a straightforward API for recording per-stage counters and
//! histograms using standard Prometheus naming conventions. Recording goes
//! through the `metrics` facade; wiring an exporter is up to the embedding
//! process.

use once_cell::sync::Lazy;
use std::fmt;

/// Enum representing all metric names used in the system.
/// This eliminates magic strings and provides compile-time safety.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MetricName {
    // Enhancer metrics
    EnhanceEventsProcessed,
    EnhanceEventsMalformed,
    EnhanceDerivedDetails,

    // Shift metrics
    ShiftsProcessed,
    ShiftsMerged,
    ShiftsSuperseded,

    // Segmenter metrics
    SegmentSequencesOpened,
    SegmentPlaysOpened,

    // Resolver metrics
    ResolveExact,
    ResolveAlias,
    ResolveFuzzy,
    ResolveUnresolved,
    ResolveCacheHits,
    ResolveFuzzyScore,

    // Stats metrics
    StatsFactsEmitted,
    StatsSkipped,

    // Validation metrics
    ValidateFindings,
    ValidateRulesEvaluated,
}

impl MetricName {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::EnhanceEventsProcessed => "rinkhouse_enhance_events_processed_total",
            Self::EnhanceEventsMalformed => "rinkhouse_enhance_events_malformed_total",
            Self::EnhanceDerivedDetails => "rinkhouse_enhance_derived_details_total",
            Self::ShiftsProcessed => "rinkhouse_shifts_processed_total",
            Self::ShiftsMerged => "rinkhouse_shifts_merged_total",
            Self::ShiftsSuperseded => "rinkhouse_shifts_superseded_total",
            Self::SegmentSequencesOpened => "rinkhouse_segment_sequences_opened_total",
            Self::SegmentPlaysOpened => "rinkhouse_segment_plays_opened_total",
            Self::ResolveExact => "rinkhouse_resolve_exact_total",
            Self::ResolveAlias => "rinkhouse_resolve_alias_total",
            Self::ResolveFuzzy => "rinkhouse_resolve_fuzzy_total",
            Self::ResolveUnresolved => "rinkhouse_resolve_unresolved_total",
            Self::ResolveCacheHits => "rinkhouse_resolve_cache_hits_total",
            Self::ResolveFuzzyScore => "rinkhouse_resolve_fuzzy_score",
            Self::StatsFactsEmitted => "rinkhouse_stats_facts_emitted_total",
            Self::StatsSkipped => "rinkhouse_stats_skipped_total",
            Self::ValidateFindings => "rinkhouse_validate_findings_total",
            Self::ValidateRulesEvaluated => "rinkhouse_validate_rules_evaluated_total",
        }
    }
}

impl fmt::Display for MetricName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Catalog of every metric the pipeline records, for dashboards and tests.
pub static METRIC_CATALOG: Lazy<Vec<MetricName>> = Lazy::new(|| {
    vec![
        MetricName::EnhanceEventsProcessed,
        MetricName::EnhanceEventsMalformed,
        MetricName::EnhanceDerivedDetails,
        MetricName::ShiftsProcessed,
        MetricName::ShiftsMerged,
        MetricName::ShiftsSuperseded,
        MetricName::SegmentSequencesOpened,
        MetricName::SegmentPlaysOpened,
        MetricName::ResolveExact,
        MetricName::ResolveAlias,
        MetricName::ResolveFuzzy,
        MetricName::ResolveUnresolved,
        MetricName::ResolveCacheHits,
        MetricName::ResolveFuzzyScore,
        MetricName::StatsFactsEmitted,
        MetricName::StatsSkipped,
        MetricName::ValidateFindings,
        MetricName::ValidateRulesEvaluated,
    ]
});

// ============================================================================
// Enhancer Metrics
// ============================================================================

pub mod enhance {
    use super::MetricName;

    pub fn event_processed() {
        ::metrics::counter!(MetricName::EnhanceEventsProcessed.as_str()).increment(1);
    }

    pub fn event_malformed() {
        ::metrics::counter!(MetricName::EnhanceEventsMalformed.as_str()).increment(1);
    }

    pub fn detail_derived() {
        ::metrics::counter!(MetricName::EnhanceDerivedDetails.as_str()).increment(1);
    }
}

// ============================================================================
// Shift Metrics
// ============================================================================

pub mod shifts {
    use super::MetricName;

    pub fn shift_processed() {
        ::metrics::counter!(MetricName::ShiftsProcessed.as_str()).increment(1);
    }

    pub fn shifts_merged() {
        ::metrics::counter!(MetricName::ShiftsMerged.as_str()).increment(1);
    }

    pub fn shift_superseded() {
        ::metrics::counter!(MetricName::ShiftsSuperseded.as_str()).increment(1);
    }
}

// ============================================================================
// Segmenter Metrics
// ============================================================================

pub mod segment {
    use super::MetricName;

    pub fn sequence_opened() {
        ::metrics::counter!(MetricName::SegmentSequencesOpened.as_str()).increment(1);
    }

    pub fn play_opened() {
        ::metrics::counter!(MetricName::SegmentPlaysOpened.as_str()).increment(1);
    }
}

// ============================================================================
// Resolver Metrics
// ============================================================================

pub mod resolve {
    use super::MetricName;
    use crate::domain::MatchConfidence;

    pub fn resolution_recorded(confidence: MatchConfidence) {
        let metric = match confidence {
            MatchConfidence::Exact => MetricName::ResolveExact,
            MatchConfidence::Alias => MetricName::ResolveAlias,
            MatchConfidence::Fuzzy => MetricName::ResolveFuzzy,
            MatchConfidence::Unresolved => MetricName::ResolveUnresolved,
        };
        ::metrics::counter!(metric.as_str()).increment(1);
    }

    pub fn cache_hit() {
        ::metrics::counter!(MetricName::ResolveCacheHits.as_str()).increment(1);
    }

    pub fn fuzzy_score_recorded(score: f64) {
        ::metrics::histogram!(MetricName::ResolveFuzzyScore.as_str()).record(score);
    }
}

// ============================================================================
// Stats Metrics
// ============================================================================

pub mod stats {
    use super::MetricName;

    pub fn facts_emitted(count: usize) {
        ::metrics::counter!(MetricName::StatsFactsEmitted.as_str()).increment(count as u64);
    }

    pub fn statistic_skipped(statistic: &str) {
        ::metrics::counter!(
            MetricName::StatsSkipped.as_str(),
            "statistic" => statistic.to_string()
        )
        .increment(1);
    }
}

// ============================================================================
// Validation Metrics
// ============================================================================

pub mod validate {
    use super::MetricName;
    use crate::domain::Tier;

    pub fn finding_recorded(tier: Tier) {
        let tier_label = match tier {
            Tier::Blocking => "blocking",
            Tier::Warning => "warning",
            Tier::Informational => "informational",
        };
        ::metrics::counter!(
            MetricName::ValidateFindings.as_str(),
            "tier" => tier_label
        )
        .increment(1);
    }

    pub fn rule_evaluated() {
        ::metrics::counter!(MetricName::ValidateRulesEvaluated.as_str()).increment(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn metric_names_are_unique() {
        let names: HashSet<&'static str> = METRIC_CATALOG.iter().map(|m| m.as_str()).collect();
        assert_eq!(names.len(), METRIC_CATALOG.len());
    }

    #[test]
    fn metric_names_follow_prometheus_conventions() {
        for metric in METRIC_CATALOG.iter() {
            let name = metric.as_str();
            assert!(name.starts_with("rinkhouse_"), "bad prefix: {}", name);
            assert!(
                name.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_'),
                "bad characters: {}",
                name
            );
        }
    }
}
