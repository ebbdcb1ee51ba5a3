//! Runs a small tracked game through the complete pipeline and prints what
//! each phase produced. Useful for demos and for eyeballing segmentation.

use rinkhouse::config::PipelineThresholds;
use rinkhouse::domain::{DimensionEntry, EntityKind, RawEventRow, RawGameTable, Tier};
use rinkhouse::pipeline::orchestrator::PipelineOrchestrator;
use rinkhouse::registry::DimensionRegistry;

fn entry(key: &str, variants: &[&str]) -> DimensionEntry {
    DimensionEntry {
        key: key.to_string(),
        potential_values: variants.iter().map(|s| s.to_string()).collect(),
        old_equivalents: Vec::new(),
    }
}

fn event(clock: &str, event_type: &str, detail: Option<&str>, zone: Option<&str>, team: Option<&str>) -> RawEventRow {
    RawEventRow {
        game_id: "demo-1".to_string(),
        period: 1,
        clock: clock.to_string(),
        event_type: event_type.to_string(),
        event_detail: detail.map(str::to_string),
        zone: zone.map(str::to_string),
        team: team.map(str::to_string),
        ..Default::default()
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let mut registry = DimensionRegistry::new();
    registry.insert(EntityKind::Team, entry("Ice Owls", &["A", "Owls"]));
    registry.insert(EntityKind::Zone, entry("Offensive", &["Off", "O"]));
    registry.insert(EntityKind::Zone, entry("Neutral", &["Neu", "N"]));
    registry.insert(EntityKind::Zone, entry("Defensive", &["Def", "D"]));

    let game = RawGameTable {
        game_id: "demo-1".to_string(),
        events: vec![
            event("00:00", "GameStart", None, None, None),
            event("00:05", "Faceoff", Some("Won"), Some("Neutral"), Some("A")),
            event("00:31", "Shot", Some("Wide"), Some("Off"), Some("A")),
            event("00:48", "Goal", Some("Goal_Scored"), Some("Off"), Some("A")),
            event("00:49", "Stoppage", None, None, None),
        ],
        shifts: Vec::new(),
    };

    let orchestrator = PipelineOrchestrator::new(registry, PipelineThresholds::default())?;
    let result = orchestrator.run_full(vec![game]).await?;

    println!("🏒 demo game through the full pipeline\n");
    for resolved in &result.games[0].events {
        let event = &resolved.event;
        println!(
            "   {} {:<12} seq {} play {}  zone {:?}",
            event.clock,
            event.raw_type,
            event.sequence_id.unwrap_or(0),
            event.play_id.unwrap_or(0),
            resolved.zone_key
        );
    }

    let goals = result.games[0]
        .events
        .iter()
        .filter(|e| e.event.is_goal())
        .count();
    println!("\n   goals (canonical filter): {}", goals);
    println!("   status: {}", result.status());
    println!(
        "   blocking findings: {}",
        result.report.findings_at(Tier::Blocking).count()
    );
    println!("   snapshot digest: {}", result.digest);

    Ok(())
}
