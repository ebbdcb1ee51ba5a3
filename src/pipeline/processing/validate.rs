use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fs;
use std::path::Path;
use uuid::Uuid;

use crate::common::error::{PipelineError, Result};
use crate::config::PipelineThresholds;
use crate::domain::{
    EntityKind, Finding, GameWarehouse, MatchConfidence, RunStatus, ShiftStatus, Tier,
};
use crate::observability::metrics;
use crate::registry::DimensionRegistry;

/// Everything the validator can see: all produced game tables, the dimension
/// registry snapshot they were resolved against, and the run thresholds.
#[derive(Debug, Clone, Copy)]
pub struct WarehouseSnapshot<'a> {
    pub games: &'a [GameWarehouse],
    pub registry: &'a DimensionRegistry,
    pub thresholds: &'a PipelineThresholds,
}

/// One independent validation rule. Rules only read the snapshot and emit
/// findings; they never mutate data.
pub trait ValidationRule: Send + Sync {
    fn rule_id(&self) -> &'static str;
    fn tier(&self) -> Tier;
    fn evaluate(&self, snapshot: &WarehouseSnapshot) -> Vec<Finding>;
}

/// Referential integrity (Tier 1): every dimension key on a fact row must
/// exist in the registry.
pub struct ReferentialIntegrityRule;

impl ValidationRule for ReferentialIntegrityRule {
    fn rule_id(&self) -> &'static str {
        "referential_integrity"
    }

    fn tier(&self) -> Tier {
        Tier::Blocking
    }

    fn evaluate(&self, snapshot: &WarehouseSnapshot) -> Vec<Finding> {
        let mut findings = Vec::new();
        for game in snapshot.games {
            for fact in &game.facts {
                for (column, key) in &fact.keys {
                    let kind = match column.as_str() {
                        "player_key" | "player_key_1" | "player_key_2" => EntityKind::Player,
                        "team_key" => EntityKind::Team,
                        _ => continue,
                    };
                    if !snapshot.registry.contains_key(kind, key) {
                        findings.push(Finding::blocking(
                            self.rule_id(),
                            "facts",
                            Some(format!("{}/{}", game.game_id, fact.statistic)),
                            format!(
                                "fact key {}='{}' does not exist in the {} dimension",
                                column,
                                key,
                                kind.as_str()
                            ),
                        ));
                    }
                }
            }
        }
        findings
    }
}

/// Canonical goal-count invariant (Tier 1): goal totals computed from the
/// fact table must equal the canonical filter applied to the event table.
pub struct GoalCountInvariantRule;

impl ValidationRule for GoalCountInvariantRule {
    fn rule_id(&self) -> &'static str {
        "goal_count_invariant"
    }

    fn tier(&self) -> Tier {
        Tier::Blocking
    }

    fn evaluate(&self, snapshot: &WarehouseSnapshot) -> Vec<Finding> {
        let mut findings = Vec::new();
        for game in snapshot.games {
            // Independent recomputation from the event table, scoped to the
            // goal events attributable at each grain.
            let player_event_goals = game
                .events
                .iter()
                .filter(|e| e.event.is_goal() && e.player_keys[0].is_some())
                .count() as f64;
            let team_event_goals = game
                .events
                .iter()
                .filter(|e| e.event.is_goal() && e.team_key.is_some())
                .count() as f64;

            let fact_goals: f64 = game
                .facts
                .iter()
                .filter(|f| f.statistic == "goals")
                .map(|f| f.value)
                .sum();
            if fact_goals != player_event_goals {
                findings.push(Finding::blocking(
                    self.rule_id(),
                    "facts",
                    Some(game.game_id.clone()),
                    format!(
                        "player goal total {} disagrees with canonical event count {}",
                        fact_goals, player_event_goals
                    ),
                ));
            }

            let team_goals: f64 = game
                .facts
                .iter()
                .filter(|f| f.statistic == "team_goals")
                .map(|f| f.value)
                .sum();
            if team_goals != team_event_goals {
                findings.push(Finding::blocking(
                    self.rule_id(),
                    "facts",
                    Some(game.game_id.clone()),
                    format!(
                        "team goal total {} disagrees with canonical event count {}",
                        team_goals, team_event_goals
                    ),
                ));
            }
        }
        findings
    }
}

/// Sequence/play partition completeness (Tier 1): concatenating plays within
/// sequences, in order, must reconstruct the full event stream exactly once.
pub struct SequencePartitionRule;

impl ValidationRule for SequencePartitionRule {
    fn rule_id(&self) -> &'static str {
        "sequence_partition"
    }

    fn tier(&self) -> Tier {
        Tier::Blocking
    }

    fn evaluate(&self, snapshot: &WarehouseSnapshot) -> Vec<Finding> {
        let mut findings = Vec::new();
        for game in snapshot.games {
            let mut closed_sequences: HashSet<u32> = HashSet::new();
            let mut closed_plays: HashSet<u32> = HashSet::new();
            let mut play_to_sequence: HashMap<u32, u32> = HashMap::new();
            let mut current: Option<(u32, u32)> = None;

            for event in &game.events {
                let row_ref = format!("{}#{}", game.game_id, event.event.event_index);
                let (Some(sequence_id), Some(play_id)) =
                    (event.event.sequence_id, event.event.play_id)
                else {
                    findings.push(Finding::blocking(
                        self.rule_id(),
                        "events",
                        Some(row_ref),
                        "event was never assigned to a sequence and play",
                    ));
                    continue;
                };

                match play_to_sequence.get(&play_id) {
                    Some(owner) if *owner != sequence_id => {
                        findings.push(Finding::blocking(
                            self.rule_id(),
                            "events",
                            Some(row_ref.clone()),
                            format!("play {} spans sequences {} and {}", play_id, owner, sequence_id),
                        ));
                    }
                    None => {
                        play_to_sequence.insert(play_id, sequence_id);
                    }
                    _ => {}
                }

                if let Some((open_sequence, open_play)) = current {
                    if sequence_id != open_sequence {
                        closed_sequences.insert(open_sequence);
                        closed_plays.insert(open_play);
                    } else if play_id != open_play {
                        closed_plays.insert(open_play);
                    }
                }
                // A closed sequence or play must never reopen later in the
                // stream; a reopen means the partition has a gap.
                if closed_sequences.contains(&sequence_id) || closed_plays.contains(&play_id) {
                    findings.push(Finding::blocking(
                        self.rule_id(),
                        "events",
                        Some(row_ref),
                        format!(
                            "sequence {} / play {} reopened out of order",
                            sequence_id, play_id
                        ),
                    ));
                }
                current = Some((sequence_id, play_id));
            }

            if let Some(first) = game.events.first() {
                if first.event.sequence_id != Some(1) {
                    findings.push(Finding::blocking(
                        self.rule_id(),
                        "events",
                        Some(game.game_id.clone()),
                        "first event of the game does not open sequence 1",
                    ));
                }
            }
        }
        findings
    }
}

/// Unresolved-mention rate (Tier 2): flags games where resolution failed for
/// more than the configured share of mentions.
pub struct UnresolvedRateRule;

impl ValidationRule for UnresolvedRateRule {
    fn rule_id(&self) -> &'static str {
        "unresolved_rate"
    }

    fn tier(&self) -> Tier {
        Tier::Warning
    }

    fn evaluate(&self, snapshot: &WarehouseSnapshot) -> Vec<Finding> {
        let mut findings = Vec::new();
        let threshold = snapshot.thresholds.unresolved_warning_ratio;
        for game in snapshot.games {
            if game.resolutions.is_empty() {
                continue;
            }
            let unresolved = game
                .resolutions
                .iter()
                .filter(|r| r.confidence == MatchConfidence::Unresolved)
                .count();
            let ratio = unresolved as f64 / game.resolutions.len() as f64;
            if ratio > threshold {
                findings.push(Finding::warning(
                    self.rule_id(),
                    "resolutions",
                    Some(game.game_id.clone()),
                    format!(
                        "{} of {} mentions unresolved ({:.0}%), above {:.0}% threshold",
                        unresolved,
                        game.resolutions.len(),
                        ratio * 100.0,
                        threshold * 100.0
                    ),
                ));
            }
        }
        findings
    }
}

/// Shift corrections applied during enhancement (Tier 2).
pub struct ShiftCorrectionRule;

impl ValidationRule for ShiftCorrectionRule {
    fn rule_id(&self) -> &'static str {
        "shift_corrections"
    }

    fn tier(&self) -> Tier {
        Tier::Warning
    }

    fn evaluate(&self, snapshot: &WarehouseSnapshot) -> Vec<Finding> {
        let mut findings = Vec::new();
        for game in snapshot.games {
            let superseded = game
                .shifts
                .iter()
                .filter(|s| s.shift.status == ShiftStatus::Superseded)
                .count();
            if superseded > 0 {
                findings.push(Finding::warning(
                    self.rule_id(),
                    "shifts",
                    Some(game.game_id.clone()),
                    format!("{} shift(s) superseded by overlap resolution", superseded),
                ));
            }
        }
        findings
    }
}

/// Unusual statistic distributions (Tier 2): implausible per-player values
/// that usually indicate tracking mistakes rather than heroics.
pub struct StatDistributionRule;

impl ValidationRule for StatDistributionRule {
    fn rule_id(&self) -> &'static str {
        "stat_distribution"
    }

    fn tier(&self) -> Tier {
        Tier::Warning
    }

    fn evaluate(&self, snapshot: &WarehouseSnapshot) -> Vec<Finding> {
        let mut findings = Vec::new();
        for game in snapshot.games {
            for fact in &game.facts {
                let suspicious = match fact.statistic.as_str() {
                    "goals" => fact.value > 5.0,
                    "toi_seconds" => fact.value > 3600.0,
                    _ => false,
                };
                if suspicious {
                    findings.push(Finding::warning(
                        self.rule_id(),
                        "facts",
                        Some(format!("{}/{}", game.game_id, fact.statistic)),
                        format!(
                            "unusual value {} for {} at keys {:?}",
                            fact.value, fact.statistic, fact.keys
                        ),
                    ));
                }
            }
        }
        findings
    }
}

/// Tier 3 placeholder: cross-checking against the league feed needs a data
/// source that is not wired up yet.
pub struct LeagueFeedCrossCheckRule;

impl ValidationRule for LeagueFeedCrossCheckRule {
    fn rule_id(&self) -> &'static str {
        "league_feed_cross_check"
    }

    fn tier(&self) -> Tier {
        Tier::Informational
    }

    fn evaluate(&self, snapshot: &WarehouseSnapshot) -> Vec<Finding> {
        if snapshot.games.is_empty() {
            return Vec::new();
        }
        vec![Finding::new(
            Tier::Informational,
            self.rule_id(),
            "facts",
            None,
            "official league feed cross-check pending: no feed configured for these games",
        )]
    }
}

/// One independently curated reference value for a known game.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExpectedFact {
    pub game_id: String,
    pub statistic: String,
    pub keys: BTreeMap<String, String>,
    pub value: f64,
}

/// Curated reference dataset for ground-truth comparison runs.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GroundTruthSet {
    pub expected: Vec<ExpectedFact>,
}

impl GroundTruthSet {
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            PipelineError::Config(format!(
                "failed to read ground truth file '{}': {}",
                path.display(),
                e
            ))
        })?;
        Ok(serde_json::from_str(&content)?)
    }
}

/// Ground-truth comparison (Tier 1, ground-truth runs only): computed fact
/// values must match the curated reference for known games.
pub struct GroundTruthRule {
    pub reference: GroundTruthSet,
}

impl ValidationRule for GroundTruthRule {
    fn rule_id(&self) -> &'static str {
        "ground_truth"
    }

    fn tier(&self) -> Tier {
        Tier::Blocking
    }

    fn evaluate(&self, snapshot: &WarehouseSnapshot) -> Vec<Finding> {
        let mut findings = Vec::new();
        for expected in &self.reference.expected {
            let Some(game) = snapshot.games.iter().find(|g| g.game_id == expected.game_id) else {
                // Reference rows for games outside this run are not errors.
                continue;
            };
            let actual = game
                .facts
                .iter()
                .find(|f| f.statistic == expected.statistic && f.keys == expected.keys);
            match actual {
                Some(fact) if fact.value == expected.value => {}
                Some(fact) => findings.push(Finding::blocking(
                    self.rule_id(),
                    "facts",
                    Some(format!("{}/{}", expected.game_id, expected.statistic)),
                    format!(
                        "computed {} disagrees with ground truth {} at keys {:?}",
                        fact.value, expected.value, expected.keys
                    ),
                )),
                None => findings.push(Finding::blocking(
                    self.rule_id(),
                    "facts",
                    Some(format!("{}/{}", expected.game_id, expected.statistic)),
                    format!(
                        "no computed fact for ground truth row at keys {:?}",
                        expected.keys
                    ),
                )),
            }
        }
        findings
    }
}

/// Outcome of a validation run: every finding from every tier, reported
/// together, plus the derived run status.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationReport {
    pub run_id: Uuid,
    pub findings: Vec<Finding>,
    pub evaluated_rules: Vec<String>,
    pub status: RunStatus,
}

impl ValidationReport {
    pub fn findings_at(&self, tier: Tier) -> impl Iterator<Item = &Finding> {
        self.findings.iter().filter(move |f| f.tier == tier)
    }
}

/// Composes independent rules into one run. Tiers are evaluated
/// independently and all findings are reported together.
pub struct ValidationRunner {
    rules: Vec<Box<dyn ValidationRule>>,
}

impl ValidationRunner {
    /// The standard rule set for ordinary pipeline runs.
    pub fn standard() -> Self {
        Self {
            rules: vec![
                Box::new(ReferentialIntegrityRule),
                Box::new(GoalCountInvariantRule),
                Box::new(SequencePartitionRule),
                Box::new(UnresolvedRateRule),
                Box::new(ShiftCorrectionRule),
                Box::new(StatDistributionRule),
                Box::new(LeagueFeedCrossCheckRule),
            ],
        }
    }

    /// Standard rules plus the ground-truth comparison.
    pub fn with_ground_truth(reference: GroundTruthSet) -> Self {
        let mut runner = Self::standard();
        runner.add_rule(Box::new(GroundTruthRule { reference }));
        runner
    }

    pub fn add_rule(&mut self, rule: Box<dyn ValidationRule>) {
        self.rules.push(rule);
    }

    pub fn run(&self, snapshot: &WarehouseSnapshot) -> ValidationReport {
        let mut findings: Vec<Finding> = Vec::new();

        // Phase findings recorded while building the tables come first, with
        // severity overrides applied the same way as rule findings.
        for game in snapshot.games {
            findings.extend(game.findings.iter().cloned());
        }

        let mut evaluated_rules = Vec::new();
        for rule in &self.rules {
            metrics::validate::rule_evaluated();
            evaluated_rules.push(rule.rule_id().to_string());
            findings.extend(rule.evaluate(snapshot));
        }

        for finding in &mut findings {
            finding.tier = snapshot.thresholds.tier_for(&finding.rule_id, finding.tier);
            metrics::validate::finding_recorded(finding.tier);
        }

        let status = RunStatus::from_findings(&findings);
        ValidationReport {
            run_id: Uuid::new_v4(),
            findings,
            evaluated_rules,
            status,
        }
    }
}
