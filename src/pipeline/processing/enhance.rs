use crate::domain::{
    ActorSlot, DetailOrigin, EnhancedEvent, EventType, Finding, GameClock, PlayDetail,
    RawEventRow, RawGameTable,
};
use crate::observability::metrics;

/// Output of the enhancement phase: the enhanced event table plus the
/// data-quality findings produced while deriving fields. Malformed rows are
/// passed through with nulled derived fields, never dropped.
#[derive(Debug, Clone, Default)]
pub struct EnhancedEventTable {
    pub events: Vec<EnhancedEvent>,
    pub findings: Vec<Finding>,
}

/// Trait for deriving per-event semantics from raw tracked rows.
pub trait EventEnhancer {
    fn enhance(&self, game: &RawGameTable) -> EnhancedEventTable;
}

/// Default enhancer: normalizes success markers, applies context rules and
/// fills reciprocal play-detail slots for opposing players.
pub struct DefaultEventEnhancer {
    /// When true, near-miss goal combinations emit Warning findings.
    pub goal_advisories: bool,
}

impl Default for DefaultEventEnhancer {
    fn default() -> Self {
        Self { goal_advisories: true }
    }
}

/// Normalize a raw success marker to a two-valued flag. Markers are
/// case-insensitive and may be abbreviated.
fn normalize_success_marker(raw: &str) -> Option<bool> {
    match raw.trim().to_lowercase().as_str() {
        "s" | "y" | "yes" | "success" | "successful" | "true" | "1" => Some(true),
        "f" | "n" | "no" | "fail" | "failure" | "unsuccessful" | "false" | "0" => Some(false),
        _ => None,
    }
}

/// Whether an event type carries success semantics at all. Administrative
/// events (stoppages, period changes) legitimately have no flag.
fn expects_success(event_type: EventType) -> bool {
    !matches!(
        event_type,
        EventType::GameStart | EventType::PeriodChange | EventType::Stoppage | EventType::Penalty
    )
}

/// Context rules applied when no explicit success marker is present.
fn derive_success_from_context(event_type: EventType, detail: Option<&str>) -> Option<bool> {
    match (event_type, detail) {
        (EventType::Goal, Some("Goal_Scored")) => Some(true),
        (EventType::Faceoff, Some("Won")) => Some(true),
        (EventType::Faceoff, Some("Lost")) => Some(false),
        (EventType::Takeaway, _) => Some(true),
        (EventType::Giveaway, _) => Some(false),
        (EventType::Shot, Some("On_Net")) | (EventType::Shot, Some("Goal")) => Some(true),
        (EventType::Shot, Some("Wide")) | (EventType::Shot, Some("Missed")) => Some(false),
        (EventType::Shot, Some("Blocked")) => Some(false),
        (EventType::Pass, Some("Completed")) => Some(true),
        (EventType::Pass, Some("Incomplete")) | (EventType::Pass, Some("Intercepted")) => {
            Some(false)
        }
        (EventType::ZoneEntry, Some("Carried")) | (EventType::ZoneEntry, Some("Passed")) => {
            Some(true)
        }
        (EventType::ZoneEntry, Some("Dumped")) => Some(false),
        _ => None,
    }
}

/// A successful possession-change action implies the reciprocal action for
/// the opposing player.
fn reciprocal_detail(event_type: EventType, success: Option<bool>) -> Option<(String, bool)> {
    match (event_type, success) {
        (EventType::Takeaway, Some(true)) => Some(("Giveaway".to_string(), false)),
        (EventType::Giveaway, _) => Some(("Takeaway".to_string(), true)),
        _ => None,
    }
}

impl DefaultEventEnhancer {
    fn enhance_row(
        &self,
        index: usize,
        row: &RawEventRow,
        findings: &mut Vec<Finding>,
    ) -> EnhancedEvent {
        metrics::enhance::event_processed();
        let row_ref = format!("{}#{}", row.game_id, index);

        if row.event_type.trim().is_empty() {
            findings.push(Finding::warning(
                "missing_event_type",
                "events",
                Some(row_ref.clone()),
                "row is missing the event type column",
            ));
        }

        let clock = GameClock::parse(row.period, &row.clock).unwrap_or_else(|| {
            findings.push(Finding::warning(
                "malformed_clock",
                "events",
                Some(row_ref.clone()),
                format!("unparseable game clock '{}', using period start", row.clock),
            ));
            GameClock::new(row.period, 0)
        });

        let event_type = EventType::parse(&row.event_type);
        if event_type.is_none() && !row.event_type.trim().is_empty() {
            metrics::enhance::event_malformed();
            findings.push(Finding::warning(
                "unknown_event_type",
                "events",
                Some(row_ref.clone()),
                format!("unknown event type '{}', success flag nulled", row.event_type),
            ));
        }

        let detail = row.event_detail.as_deref().map(str::trim).filter(|d| !d.is_empty());

        // Explicit marker first; context rules only when the marker is absent.
        let mut success = None;
        if let Some(event_type) = event_type {
            success = match row.success.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
                Some(marker) => {
                    let normalized = normalize_success_marker(marker);
                    if normalized.is_none() {
                        findings.push(Finding::warning(
                            "unknown_success_marker",
                            "events",
                            Some(row_ref.clone()),
                            format!("unrecognized success marker '{}'", marker),
                        ));
                    }
                    normalized
                }
                None => derive_success_from_context(event_type, detail),
            };

            if success.is_none() && expects_success(event_type) {
                findings.push(Finding::warning(
                    "underivable_success",
                    "events",
                    Some(row_ref.clone()),
                    format!(
                        "success flag absent and not derivable for {} / {:?}",
                        event_type.as_str(),
                        detail
                    ),
                ));
            }

            if self.goal_advisories {
                if event_type == EventType::Goal && detail != Some("Goal_Scored") {
                    findings.push(Finding::warning(
                        "goal_detail_mismatch",
                        "events",
                        Some(row_ref.clone()),
                        format!(
                            "type Goal with detail {:?} does not count as a goal",
                            detail
                        ),
                    ));
                } else if event_type == EventType::Shot && detail == Some("Goal") {
                    findings.push(Finding::warning(
                        "shot_goal_detail",
                        "events",
                        Some(row_ref.clone()),
                        "type Shot with detail 'Goal' is a shot attempt, not a goal",
                    ));
                }
            }
        }

        // Human-entered play details occupy their slots first. Slot 0 is the
        // acting player, slot 1 the opponent. Human input supreme: a derived
        // value may only fill an empty slot.
        let mut play_details: [Option<PlayDetail>; 2] = [None, None];
        if let Some(label) = row.play_detail_1.as_deref().map(str::trim).filter(|d| !d.is_empty()) {
            play_details[0] = Some(PlayDetail {
                label: label.to_string(),
                attributed_to: ActorSlot::Actor,
                success,
                origin: DetailOrigin::Human,
            });
        }
        if let Some(label) = row.play_detail_2.as_deref().map(str::trim).filter(|d| !d.is_empty()) {
            // An explicit opposing-player detail overrides inheritance: its
            // success reflects the reciprocal of the actor's outcome.
            play_details[1] = Some(PlayDetail {
                label: label.to_string(),
                attributed_to: ActorSlot::Opponent,
                success: success.map(|s| !s),
                origin: DetailOrigin::Human,
            });
        }

        if play_details[1].is_none() && row.player_2.is_some() {
            if let Some(event_type) = event_type {
                if let Some((label, derived_success)) = reciprocal_detail(event_type, success) {
                    metrics::enhance::detail_derived();
                    play_details[1] = Some(PlayDetail {
                        label,
                        attributed_to: ActorSlot::Opponent,
                        success: Some(derived_success),
                        origin: DetailOrigin::Derived,
                    });
                }
            }
        }

        EnhancedEvent {
            event_index: index,
            game_id: row.game_id.clone(),
            clock,
            event_type,
            raw_type: row.event_type.clone(),
            detail: detail.map(str::to_string),
            play_details,
            zone: row.zone.clone(),
            team: row.team.clone(),
            players: [row.player_1.clone(), row.player_2.clone()],
            success,
            sequence_id: None,
            play_id: None,
        }
    }
}

impl EventEnhancer for DefaultEventEnhancer {
    fn enhance(&self, game: &RawGameTable) -> EnhancedEventTable {
        let mut findings = Vec::new();
        let mut events: Vec<EnhancedEvent> = game
            .events
            .iter()
            .enumerate()
            .map(|(index, row)| self.enhance_row(index, row, &mut findings))
            .collect();

        // Chronological order; input order breaks clock ties.
        events.sort_by_key(|e| (e.clock, e.event_index));
        for (index, event) in events.iter_mut().enumerate() {
            event.event_index = index;
        }

        EnhancedEventTable { events, findings }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw_event(event_type: &str, detail: Option<&str>) -> RawEventRow {
        RawEventRow {
            game_id: "g1".to_string(),
            period: 1,
            clock: "05:00".to_string(),
            event_type: event_type.to_string(),
            event_detail: detail.map(str::to_string),
            ..Default::default()
        }
    }

    fn enhance_single(row: RawEventRow) -> EnhancedEventTable {
        let game = RawGameTable {
            game_id: "g1".to_string(),
            events: vec![row],
            shifts: Vec::new(),
        };
        DefaultEventEnhancer::default().enhance(&game)
    }

    #[test]
    fn explicit_marker_beats_context_rules() {
        let mut row = raw_event("Shot", Some("Wide"));
        row.success = Some("Y".to_string());
        let table = enhance_single(row);
        assert_eq!(table.events[0].success, Some(true));
    }

    #[test]
    fn marker_normalization_is_case_insensitive_and_abbreviated() {
        for (marker, expected) in [("s", true), ("SUCCESS", true), ("f", false), ("No", false)] {
            let mut row = raw_event("Pass", None);
            row.success = Some(marker.to_string());
            let table = enhance_single(row);
            assert_eq!(table.events[0].success, Some(expected), "marker {}", marker);
        }
    }

    #[test]
    fn success_derived_from_context_when_marker_absent() {
        let table = enhance_single(raw_event("Faceoff", Some("Won")));
        assert_eq!(table.events[0].success, Some(true));

        let table = enhance_single(raw_event("Giveaway", None));
        assert_eq!(table.events[0].success, Some(false));
    }

    #[test]
    fn underivable_success_produces_warning_not_default() {
        let table = enhance_single(raw_event("Shot", None));
        assert_eq!(table.events[0].success, None);
        assert!(table
            .findings
            .iter()
            .any(|f| f.rule_id == "underivable_success"));
    }

    #[test]
    fn administrative_events_skip_success_warning() {
        let table = enhance_single(raw_event("Stoppage", None));
        assert_eq!(table.events[0].success, None);
        assert!(table.findings.is_empty());
    }

    #[test]
    fn unknown_event_type_passes_through_with_null_success() {
        let mut row = raw_event("Interpretive_Skate", None);
        row.success = Some("y".to_string());
        let table = enhance_single(row);
        assert_eq!(table.events.len(), 1);
        assert_eq!(table.events[0].event_type, None);
        assert_eq!(table.events[0].success, None);
        assert!(table
            .findings
            .iter()
            .any(|f| f.rule_id == "unknown_event_type"));
    }

    #[test]
    fn successful_takeaway_derives_opponent_giveaway() {
        let mut row = raw_event("Takeaway", None);
        row.player_1 = Some("Alice Carter".to_string());
        row.player_2 = Some("Dana Webb".to_string());
        let table = enhance_single(row);

        let detail = table.events[0].play_details[1].as_ref().unwrap();
        assert_eq!(detail.label, "Giveaway");
        assert_eq!(detail.attributed_to, ActorSlot::Opponent);
        assert_eq!(detail.success, Some(false));
        assert_eq!(detail.origin, DetailOrigin::Derived);
    }

    #[test]
    fn derivation_never_overwrites_human_slot() {
        let mut row = raw_event("Takeaway", None);
        row.player_1 = Some("Alice Carter".to_string());
        row.player_2 = Some("Dana Webb".to_string());
        row.play_detail_2 = Some("Stick_Lifted".to_string());
        let table = enhance_single(row);

        let detail = table.events[0].play_details[1].as_ref().unwrap();
        assert_eq!(detail.label, "Stick_Lifted");
        assert_eq!(detail.origin, DetailOrigin::Human);
    }

    #[test]
    fn derivation_requires_an_opponent_mention() {
        let mut row = raw_event("Takeaway", None);
        row.player_1 = Some("Alice Carter".to_string());
        let table = enhance_single(row);
        assert!(table.events[0].play_details[1].is_none());
    }

    #[test]
    fn goal_advisories_flag_near_misses() {
        let table = enhance_single(raw_event("Shot", Some("Goal")));
        assert!(!table.events[0].is_goal());
        assert!(table.findings.iter().any(|f| f.rule_id == "shot_goal_detail"));

        let table = enhance_single(raw_event("Goal", Some("Goal")));
        assert!(!table.events[0].is_goal());
        assert!(table
            .findings
            .iter()
            .any(|f| f.rule_id == "goal_detail_mismatch"));
    }

    #[test]
    fn goal_advisories_can_be_silenced() {
        let game = RawGameTable {
            game_id: "g1".to_string(),
            events: vec![raw_event("Shot", Some("Goal"))],
            shifts: Vec::new(),
        };
        let enhancer = DefaultEventEnhancer { goal_advisories: false };
        let table = enhancer.enhance(&game);
        assert!(!table.findings.iter().any(|f| f.rule_id == "shot_goal_detail"));
    }

    #[test]
    fn events_are_sorted_chronologically_with_stable_ties() {
        let mut first = raw_event("Faceoff", Some("Won"));
        first.clock = "10:00".to_string();
        let mut second = raw_event("Shot", Some("Wide"));
        second.clock = "02:00".to_string();
        let mut third = raw_event("Pass", Some("Completed"));
        third.clock = "02:00".to_string();

        let game = RawGameTable {
            game_id: "g1".to_string(),
            events: vec![first, second, third],
            shifts: Vec::new(),
        };
        let table = DefaultEventEnhancer::default().enhance(&game);

        assert_eq!(table.events[0].raw_type, "Shot");
        assert_eq!(table.events[1].raw_type, "Pass");
        assert_eq!(table.events[2].raw_type, "Faceoff");
        assert_eq!(
            table.events.iter().map(|e| e.event_index).collect::<Vec<_>>(),
            vec![0, 1, 2]
        );
    }

    #[test]
    fn malformed_clock_warns_and_uses_period_start() {
        let mut row = raw_event("Shot", Some("Wide"));
        row.clock = "whenever".to_string();
        let table = enhance_single(row);
        assert_eq!(table.events[0].clock, GameClock::new(1, 0));
        assert!(table.findings.iter().any(|f| f.rule_id == "malformed_clock"));
    }
}
