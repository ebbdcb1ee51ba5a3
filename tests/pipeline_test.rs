//! End-to-end pipeline tests: raw tracked rows in, validated warehouse
//! tables out.

use std::collections::BTreeMap;

use rinkhouse::config::PipelineThresholds;
use rinkhouse::domain::{
    DimensionEntry, EntityKind, RawEventRow, RawGameTable, RawShiftRow, RunStatus, Tier,
};
use rinkhouse::pipeline::orchestrator::PipelineOrchestrator;
use rinkhouse::pipeline::processing::validate::{ExpectedFact, GroundTruthSet};
use rinkhouse::registry::DimensionRegistry;

fn entry(key: &str, variants: &[&str]) -> DimensionEntry {
    DimensionEntry {
        key: key.to_string(),
        potential_values: variants.iter().map(|s| s.to_string()).collect(),
        old_equivalents: Vec::new(),
    }
}

fn test_registry() -> DimensionRegistry {
    let mut registry = DimensionRegistry::new();
    registry.insert(EntityKind::Team, entry("Ice Owls", &["A", "Owls"]));
    registry.insert(EntityKind::Team, entry("Polar Kings", &["B", "Kings"]));
    registry.insert(EntityKind::Zone, entry("Offensive", &["Off", "O"]));
    registry.insert(EntityKind::Zone, entry("Neutral", &["Neu", "N"]));
    registry.insert(EntityKind::Zone, entry("Defensive", &["Def", "D"]));
    registry.insert(EntityKind::Player, entry("Carter, Alice", &["Alice Carter"]));
    registry.insert(EntityKind::Player, entry("Webb, Dana", &["Dana Webb"]));
    registry.set_roster(
        "Ice Owls",
        vec!["Carter, Alice".to_string(), "Webb, Dana".to_string()],
    );
    registry
}

fn event(
    clock: &str,
    event_type: &str,
    detail: Option<&str>,
    zone: Option<&str>,
    team: Option<&str>,
    player: Option<&str>,
) -> RawEventRow {
    RawEventRow {
        game_id: "g1".to_string(),
        period: 1,
        clock: clock.to_string(),
        event_type: event_type.to_string(),
        event_detail: detail.map(str::to_string),
        zone: zone.map(str::to_string),
        team: team.map(str::to_string),
        player_1: player.map(str::to_string),
        ..Default::default()
    }
}

/// The walkthrough game from the tracking handbook: a goal off a won
/// faceoff, with shifts for two skaters.
fn tracked_game(game_id: &str) -> RawGameTable {
    let mut events = vec![
        event("00:00", "GameStart", None, None, None, None),
        event("00:05", "Faceoff", Some("Won"), Some("Neutral"), Some("A"), Some("Alice Carter")),
        event("00:12", "Pass", Some("Completed"), Some("Neutral"), Some("A"), Some("Alice Carter")),
        event("00:31", "Shot", Some("On_Net"), Some("Off"), Some("A"), Some("Alice Carter")),
        event("00:48", "Goal", Some("Goal_Scored"), Some("Off"), Some("A"), Some("Alice Carter")),
        event("00:49", "Stoppage", None, None, None, None),
    ];
    for e in &mut events {
        e.game_id = game_id.to_string();
    }
    RawGameTable {
        game_id: game_id.to_string(),
        events,
        shifts: vec![
            RawShiftRow {
                game_id: game_id.to_string(),
                period: 1,
                player: "Alice Carter".to_string(),
                team: "A".to_string(),
                start_clock: "00:00".to_string(),
                end_clock: "01:00".to_string(),
            },
            RawShiftRow {
                game_id: game_id.to_string(),
                period: 1,
                player: "Dana Webb".to_string(),
                team: "A".to_string(),
                start_clock: "00:30".to_string(),
                end_clock: "01:30".to_string(),
            },
        ],
    }
}

fn orchestrator() -> PipelineOrchestrator {
    PipelineOrchestrator::new(test_registry(), PipelineThresholds::default()).unwrap()
}

#[tokio::test]
async fn boundary_rule_yields_four_sequences_and_one_goal() {
    // Boundary events (GameStart, Faceoff, Goal, Stoppage) each open a new
    // sequence and are its first member; the Shot attaches to the faceoff's
    // sequence.
    let game = RawGameTable {
        game_id: "g1".to_string(),
        events: vec![
            event("00:00", "GameStart", None, None, None, None),
            event("00:05", "Faceoff", Some("Won"), Some("Neutral"), Some("A"), None),
            event("00:31", "Shot", Some("Wide"), Some("Off"), Some("A"), None),
            event("00:48", "Goal", Some("Goal_Scored"), Some("Off"), Some("A"), None),
            event("00:49", "Stoppage", None, None, None, None),
        ],
        shifts: Vec::new(),
    };

    let result = orchestrator().run_full(vec![game]).await.unwrap();
    let warehouse = &result.games[0];

    let sequence_ids: Vec<u32> = warehouse
        .events
        .iter()
        .map(|e| e.event.sequence_id.unwrap())
        .collect();
    assert_eq!(sequence_ids, vec![1, 2, 2, 3, 4]);

    let goals = warehouse.events.iter().filter(|e| e.event.is_goal()).count();
    assert_eq!(goals, 1);

    assert_eq!(result.report.findings_at(Tier::Blocking).count(), 0);
    assert_ne!(result.status(), RunStatus::Failed);
}

#[tokio::test]
async fn full_pipeline_produces_consistent_facts() {
    let result = orchestrator().run_full(vec![tracked_game("g1")]).await.unwrap();
    assert_eq!(result.status(), RunStatus::Passed);

    let warehouse = &result.games[0];
    let fact = |statistic: &str, key_column: &str, key: &str| -> Option<f64> {
        warehouse
            .facts
            .iter()
            .find(|f| f.statistic == statistic && f.keys.get(key_column).map(String::as_str) == Some(key))
            .map(|f| f.value)
    };

    assert_eq!(fact("goals", "player_key", "Carter, Alice"), Some(1.0));
    assert_eq!(fact("shot_attempts", "player_key", "Carter, Alice"), Some(2.0));
    assert_eq!(fact("faceoffs_won", "player_key", "Carter, Alice"), Some(1.0));
    assert_eq!(fact("team_goals", "team_key", "Ice Owls"), Some(1.0));
    assert_eq!(fact("toi_seconds", "player_key", "Carter, Alice"), Some(60.0));
    assert_eq!(fact("toi_seconds", "player_key", "Webb, Dana"), Some(60.0));
    // Both skaters overlapped for 30 seconds.
    let shared = warehouse
        .facts
        .iter()
        .find(|f| f.statistic == "shared_ice_seconds")
        .unwrap();
    assert_eq!(shared.value, 30.0);
    assert_eq!(shared.keys["player_key_1"], "Carter, Alice");
    assert_eq!(shared.keys["player_key_2"], "Webb, Dana");
}

#[tokio::test]
async fn full_rebuild_is_idempotent() {
    let first = orchestrator()
        .run_full(vec![tracked_game("g1"), tracked_game("g2")])
        .await
        .unwrap();
    let second = orchestrator()
        .run_full(vec![tracked_game("g2"), tracked_game("g1")])
        .await
        .unwrap();

    // Identical raw sources and registry converge to identical tables and
    // an identical Tier 1 finding set, regardless of input order.
    assert_eq!(first.digest, second.digest);
    let tier1 = |r: &rinkhouse::pipeline::orchestrator::PipelineRunResult| {
        r.report
            .findings_at(Tier::Blocking)
            .map(|f| (f.rule_id.clone(), f.row_ref.clone()))
            .collect::<Vec<_>>()
    };
    assert_eq!(tier1(&first), tier1(&second));
}

#[tokio::test]
async fn unresolved_required_key_fails_the_run() {
    let mut game = tracked_game("g1");
    game.events[4].team = Some("Mystery Squad".to_string());

    let result = orchestrator().run_full(vec![game]).await.unwrap();
    assert_eq!(result.status(), RunStatus::Failed);
    assert!(result
        .report
        .findings_at(Tier::Blocking)
        .any(|f| f.rule_id == "unresolved_mention"));
}

#[tokio::test]
async fn rebuild_verification_flags_divergence() {
    let games = vec![tracked_game("g1")];

    let diverged = orchestrator()
        .verify_rebuild(games.clone(), Some("not-the-real-digest"), false)
        .await
        .unwrap();
    assert_eq!(diverged.status(), RunStatus::Failed);
    assert!(diverged
        .report
        .findings_at(Tier::Blocking)
        .any(|f| f.rule_id == "snapshot_divergence"));

    // An explicitly accepted divergence does not block.
    let accepted = orchestrator()
        .verify_rebuild(games, Some("not-the-real-digest"), true)
        .await
        .unwrap();
    assert_ne!(accepted.status(), RunStatus::Failed);
}

#[tokio::test]
async fn incremental_run_processes_only_changed_games() {
    let result = orchestrator()
        .run_incremental(
            vec![tracked_game("g1"), tracked_game("g2")],
            &["g2".to_string()],
        )
        .await
        .unwrap();
    assert_eq!(result.games.len(), 1);
    assert_eq!(result.games[0].game_id, "g2");
}

#[tokio::test]
async fn ground_truth_run_checks_reference_values() {
    let keys: BTreeMap<String, String> = [
        ("game_id".to_string(), "g1".to_string()),
        ("player_key".to_string(), "Carter, Alice".to_string()),
    ]
    .into_iter()
    .collect();

    let matching = GroundTruthSet {
        expected: vec![ExpectedFact {
            game_id: "g1".to_string(),
            statistic: "goals".to_string(),
            keys: keys.clone(),
            value: 1.0,
        }],
    };
    let result = orchestrator()
        .run_ground_truth(vec![tracked_game("g1")], matching)
        .await
        .unwrap();
    assert_eq!(result.status(), RunStatus::Passed);

    let disagreeing = GroundTruthSet {
        expected: vec![ExpectedFact {
            game_id: "g1".to_string(),
            statistic: "goals".to_string(),
            keys,
            value: 3.0,
        }],
    };
    let result = orchestrator()
        .run_ground_truth(vec![tracked_game("g1")], disagreeing)
        .await
        .unwrap();
    assert_eq!(result.status(), RunStatus::Failed);
}
