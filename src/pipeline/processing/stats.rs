use std::collections::BTreeMap;

use crate::domain::{
    EventType, FactRow, Finding, Grain, ResolvedEvent, ResolvedShift, ShiftStatus,
};
use crate::observability::metrics;

/// Read-only view over one game's fully resolved, segmented tables. This is
/// the only input a statistic function sees, which keeps them pure.
#[derive(Debug, Clone, Copy)]
pub struct ResolvedGameView<'a> {
    pub game_id: &'a str,
    pub events: &'a [ResolvedEvent],
    pub shifts: &'a [ResolvedShift],
}

impl<'a> ResolvedGameView<'a> {
    fn canonical_shifts(&self) -> impl Iterator<Item = &'a ResolvedShift> {
        self.shifts
            .iter()
            .filter(|s| s.shift.status != ShiftStatus::Superseded)
    }
}

/// A pure statistic function: same resolved event set in, same fact rows out.
pub type StatFn = fn(&ResolvedGameView) -> Vec<FactRow>;

/// Registration record for one named statistic.
pub struct StatSpec {
    pub name: &'static str,
    pub grain: Grain,
    /// Logical columns the statistic needs; when a game's tables carry none
    /// of a required column the statistic is skipped with a Warning finding.
    pub required_columns: &'static [&'static str],
    pub compute: StatFn,
}

/// Enumerable registry of statistic functions. New statistics are added by
/// registering a spec, not by touching the aggregation control flow.
pub struct StatRegistry {
    specs: Vec<StatSpec>,
}

impl Default for StatRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

impl StatRegistry {
    pub fn empty() -> Self {
        Self { specs: Vec::new() }
    }

    pub fn with_builtins() -> Self {
        let mut registry = Self::empty();
        registry.register(StatSpec {
            name: "goals",
            grain: Grain::PlayerGame,
            required_columns: &["event.player_key"],
            compute: player_goals,
        });
        registry.register(StatSpec {
            name: "shot_attempts",
            grain: Grain::PlayerGame,
            required_columns: &["event.player_key"],
            compute: player_shot_attempts,
        });
        registry.register(StatSpec {
            name: "faceoffs_won",
            grain: Grain::PlayerGame,
            required_columns: &["event.player_key"],
            compute: player_faceoffs_won,
        });
        registry.register(StatSpec {
            name: "takeaways",
            grain: Grain::PlayerGame,
            required_columns: &["event.player_key"],
            compute: player_takeaways,
        });
        registry.register(StatSpec {
            name: "giveaways",
            grain: Grain::PlayerGame,
            required_columns: &["event.player_key"],
            compute: player_giveaways,
        });
        registry.register(StatSpec {
            name: "team_goals",
            grain: Grain::TeamGame,
            required_columns: &["event.team_key"],
            compute: team_goals,
        });
        registry.register(StatSpec {
            name: "toi_seconds",
            grain: Grain::PlayerGame,
            required_columns: &["shift.player_key"],
            compute: player_toi_seconds,
        });
        registry.register(StatSpec {
            name: "shared_ice_seconds",
            grain: Grain::PlayerPairGame,
            required_columns: &["shift.player_key"],
            compute: pair_shared_ice_seconds,
        });
        registry
    }

    pub fn register(&mut self, spec: StatSpec) {
        self.specs.push(spec);
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.specs.iter().map(|s| s.name).collect()
    }

    /// Compute every registered statistic over a game. Output rows are
    /// sorted so serialization is stable across rebuilds.
    pub fn build(&self, view: &ResolvedGameView) -> (Vec<FactRow>, Vec<Finding>) {
        let mut facts = Vec::new();
        let mut findings = Vec::new();

        for spec in &self.specs {
            if let Some(missing) = spec
                .required_columns
                .iter()
                .find(|column| !column_available(view, column))
            {
                metrics::stats::statistic_skipped(spec.name);
                findings.push(Finding::warning(
                    "stat_skipped",
                    "facts",
                    None,
                    format!(
                        "statistic '{}' skipped for game {}: required column '{}' unavailable",
                        spec.name, view.game_id, missing
                    ),
                ));
                continue;
            }

            let mut rows = (spec.compute)(view);
            debug_assert!(rows.iter().all(|r| r.statistic == spec.name && r.grain == spec.grain));
            facts.append(&mut rows);
        }

        facts.sort_by(|a, b| (&a.statistic, &a.keys).cmp(&(&b.statistic, &b.keys)));
        metrics::stats::facts_emitted(facts.len());
        (facts, findings)
    }
}

/// Whether a game's tables carry any value for a logical column.
fn column_available(view: &ResolvedGameView, column: &str) -> bool {
    match column {
        "event.player_key" => view.events.iter().any(|e| e.player_keys[0].is_some()),
        "event.team_key" => view.events.iter().any(|e| e.team_key.is_some()),
        "shift.player_key" => view
            .shifts
            .iter()
            .any(|s| s.shift.status != ShiftStatus::Superseded && s.player_key.is_some()),
        _ => false,
    }
}

fn fact(
    statistic: &'static str,
    grain: Grain,
    keys: impl IntoIterator<Item = (&'static str, String)>,
    value: f64,
) -> FactRow {
    FactRow {
        statistic: statistic.to_string(),
        grain,
        keys: keys
            .into_iter()
            .map(|(k, v)| (k.to_string(), v))
            .collect::<BTreeMap<_, _>>(),
        value,
    }
}

fn count_by_player<F>(view: &ResolvedGameView, statistic: &'static str, predicate: F) -> Vec<FactRow>
where
    F: Fn(&ResolvedEvent) -> bool,
{
    let mut counts: BTreeMap<String, f64> = BTreeMap::new();
    for event in view.events {
        if predicate(event) {
            if let Some(player_key) = &event.player_keys[0] {
                *counts.entry(player_key.clone()).or_default() += 1.0;
            }
        }
    }
    counts
        .into_iter()
        .map(|(player_key, value)| {
            fact(
                statistic,
                Grain::PlayerGame,
                [("game_id", view.game_id.to_string()), ("player_key", player_key)],
                value,
            )
        })
        .collect()
}

/// Goals per player, using the canonical goal filter.
fn player_goals(view: &ResolvedGameView) -> Vec<FactRow> {
    count_by_player(view, "goals", |e| e.event.is_goal())
}

/// Shot attempts per player: any Shot plus every counted goal.
fn player_shot_attempts(view: &ResolvedGameView) -> Vec<FactRow> {
    count_by_player(view, "shot_attempts", |e| {
        e.event.event_type == Some(EventType::Shot) || e.event.is_goal()
    })
}

fn player_faceoffs_won(view: &ResolvedGameView) -> Vec<FactRow> {
    count_by_player(view, "faceoffs_won", |e| {
        e.event.event_type == Some(EventType::Faceoff) && e.event.success == Some(true)
    })
}

fn player_takeaways(view: &ResolvedGameView) -> Vec<FactRow> {
    count_by_player(view, "takeaways", |e| {
        e.event.event_type == Some(EventType::Takeaway) && e.event.success == Some(true)
    })
}

/// Giveaways credit the acting player on Giveaway events and the opposing
/// player when a reciprocal play-detail slot names one.
fn player_giveaways(view: &ResolvedGameView) -> Vec<FactRow> {
    let mut counts: BTreeMap<String, f64> = BTreeMap::new();
    for event in view.events {
        if event.event.event_type == Some(EventType::Giveaway) {
            if let Some(player_key) = &event.player_keys[0] {
                *counts.entry(player_key.clone()).or_default() += 1.0;
            }
        }
        let opponent_giveaway = event.event.play_details[1]
            .as_ref()
            .map(|d| d.label == "Giveaway")
            .unwrap_or(false);
        if opponent_giveaway {
            if let Some(player_key) = &event.player_keys[1] {
                *counts.entry(player_key.clone()).or_default() += 1.0;
            }
        }
    }
    counts
        .into_iter()
        .map(|(player_key, value)| {
            fact(
                "giveaways",
                Grain::PlayerGame,
                [("game_id", view.game_id.to_string()), ("player_key", player_key)],
                value,
            )
        })
        .collect()
}

fn team_goals(view: &ResolvedGameView) -> Vec<FactRow> {
    let mut counts: BTreeMap<String, f64> = BTreeMap::new();
    for event in view.events {
        if event.event.is_goal() {
            if let Some(team_key) = &event.team_key {
                *counts.entry(team_key.clone()).or_default() += 1.0;
            }
        }
    }
    counts
        .into_iter()
        .map(|(team_key, value)| {
            fact(
                "team_goals",
                Grain::TeamGame,
                [("game_id", view.game_id.to_string()), ("team_key", team_key)],
                value,
            )
        })
        .collect()
}

fn player_toi_seconds(view: &ResolvedGameView) -> Vec<FactRow> {
    let mut totals: BTreeMap<String, f64> = BTreeMap::new();
    for shift in view.canonical_shifts() {
        if let Some(player_key) = &shift.player_key {
            *totals.entry(player_key.clone()).or_default() += shift.shift.duration_seconds() as f64;
        }
    }
    totals
        .into_iter()
        .map(|(player_key, value)| {
            fact(
                "toi_seconds",
                Grain::PlayerGame,
                [("game_id", view.game_id.to_string()), ("player_key", player_key)],
                value,
            )
        })
        .collect()
}

/// Seconds two same-team players spent on the ice together.
fn pair_shared_ice_seconds(view: &ResolvedGameView) -> Vec<FactRow> {
    let shifts: Vec<&ResolvedShift> = view
        .canonical_shifts()
        .filter(|s| s.player_key.is_some())
        .collect();

    let mut totals: BTreeMap<(String, String), f64> = BTreeMap::new();
    for (i, a) in shifts.iter().enumerate() {
        for b in shifts.iter().skip(i + 1) {
            if a.team_key != b.team_key || a.shift.period != b.shift.period {
                continue;
            }
            let key_a = a.player_key.as_ref().unwrap();
            let key_b = b.player_key.as_ref().unwrap();
            if key_a == key_b {
                continue;
            }
            let overlap_start = a.shift.start.seconds.max(b.shift.start.seconds);
            let overlap_end = a.shift.end.seconds.min(b.shift.end.seconds);
            if overlap_end > overlap_start {
                let pair = if key_a < key_b {
                    (key_a.clone(), key_b.clone())
                } else {
                    (key_b.clone(), key_a.clone())
                };
                *totals.entry(pair).or_default() += (overlap_end - overlap_start) as f64;
            }
        }
    }

    totals
        .into_iter()
        .map(|((first, second), value)| {
            fact(
                "shared_ice_seconds",
                Grain::PlayerPairGame,
                [
                    ("game_id", view.game_id.to_string()),
                    ("player_key_1", first),
                    ("player_key_2", second),
                ],
                value,
            )
        })
        .collect()
}
