use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;

use crate::config::PipelineThresholds;
use crate::domain::{FactRow, Finding, GameWarehouse, RawGameTable};
use crate::pipeline::processing::enhance::{
    DefaultEventEnhancer, EnhancedEventTable, EventEnhancer,
};
use crate::pipeline::processing::resolve::{DimensionResolver, ResolvedGameTable};
use crate::pipeline::processing::segment::PlaySegmenter;
use crate::pipeline::processing::shifts::{
    DefaultShiftEnhancer, EnhancedShiftTable, ShiftEnhancer,
};
use crate::pipeline::processing::stats::{ResolvedGameView, StatRegistry};
use crate::registry::DimensionRegistry;

/// Shared, read-only context every step runs against. The registry is loaded
/// once per run and never mutated during processing, so games can share it
/// across tasks.
#[derive(Clone)]
pub struct PipelineContext {
    pub registry: Arc<DimensionRegistry>,
    pub thresholds: PipelineThresholds,
    pub stats: Arc<StatRegistry>,
}

/// In-memory state of one game as it moves through the pipeline. Each phase
/// materializes its output fully before the next phase starts.
#[derive(Debug, Default)]
pub struct GameState {
    pub raw: RawGameTable,
    pub events: Option<EnhancedEventTable>,
    pub shifts: Option<EnhancedShiftTable>,
    pub resolved: Option<ResolvedGameTable>,
    pub facts: Option<Vec<FactRow>>,
    /// Findings accumulated by every phase, handed to the validator intact.
    pub findings: Vec<Finding>,
}

impl GameState {
    pub fn new(raw: RawGameTable) -> Self {
        Self { raw, ..Default::default() }
    }

    /// Collapse the finished state into the warehouse tables for this game.
    pub fn into_warehouse(self) -> Result<GameWarehouse> {
        let resolved = self
            .resolved
            .ok_or_else(|| anyhow::anyhow!("game {} was never resolved", self.raw.game_id))?;
        Ok(GameWarehouse {
            game_id: self.raw.game_id,
            events: resolved.events,
            shifts: resolved.shifts,
            resolutions: resolved.resolutions,
            facts: self.facts.unwrap_or_default(),
            findings: self.findings,
        })
    }
}

/// Common trait for all per-game pipeline steps.
#[async_trait]
pub trait PipelineStep: Send + Sync {
    /// Execute this step against one game's state.
    async fn execute(&self, game: &mut GameState, ctx: &PipelineContext) -> Result<StepResult>;

    /// Get the name of this pipeline step.
    fn step_name(&self) -> &'static str;

    /// Steps that must have completed before this one can run.
    fn dependencies(&self) -> Vec<&'static str>;
}

/// Result of executing a pipeline step.
#[derive(Debug, Clone)]
pub struct StepResult {
    pub success: bool,
    pub processed_count: usize,
    pub warning_count: usize,
    pub message: String,
}

impl StepResult {
    pub fn success(processed: usize, message: String) -> Self {
        Self { success: true, processed_count: processed, warning_count: 0, message }
    }

    pub fn with_warnings(processed: usize, warnings: usize, message: String) -> Self {
        Self { success: true, processed_count: processed, warning_count: warnings, message }
    }

    pub fn failure(message: String) -> Self {
        Self { success: false, processed_count: 0, warning_count: 0, message }
    }
}

/// Derives success flags and play-detail slots from the raw event rows.
pub struct EnhanceStep;

#[async_trait]
impl PipelineStep for EnhanceStep {
    async fn execute(&self, game: &mut GameState, ctx: &PipelineContext) -> Result<StepResult> {
        let enhancer = DefaultEventEnhancer {
            goal_advisories: ctx.thresholds.goal_filter_strict,
        };
        let mut table = enhancer.enhance(&game.raw);
        let warnings = table.findings.len();
        let processed = table.events.len();
        game.findings.append(&mut table.findings);
        game.events = Some(table);
        Ok(StepResult::with_warnings(
            processed,
            warnings,
            format!("enhanced {} events", processed),
        ))
    }

    fn step_name(&self) -> &'static str {
        "enhance"
    }

    fn dependencies(&self) -> Vec<&'static str> {
        vec![]
    }
}

/// Normalizes raw shift rows into overlap-resolved intervals.
pub struct ShiftStep;

#[async_trait]
impl PipelineStep for ShiftStep {
    async fn execute(&self, game: &mut GameState, ctx: &PipelineContext) -> Result<StepResult> {
        let enhancer = DefaultShiftEnhancer {
            overlap_tolerance_seconds: ctx.thresholds.shift_overlap_tolerance_seconds,
        };
        let mut table = enhancer.enhance(&game.raw);
        let warnings = table.findings.len();
        let processed = table.shifts.len();
        game.findings.append(&mut table.findings);
        game.shifts = Some(table);
        Ok(StepResult::with_warnings(
            processed,
            warnings,
            format!("normalized {} shifts", processed),
        ))
    }

    fn step_name(&self) -> &'static str {
        "shifts"
    }

    fn dependencies(&self) -> Vec<&'static str> {
        vec![]
    }
}

/// Assigns sequence and play identifiers over the enhanced event stream.
pub struct SegmentStep;

#[async_trait]
impl PipelineStep for SegmentStep {
    async fn execute(&self, game: &mut GameState, _ctx: &PipelineContext) -> Result<StepResult> {
        let table = game
            .events
            .as_mut()
            .ok_or_else(|| anyhow::anyhow!("segment step requires enhanced events"))?;
        PlaySegmenter::segment_game(&mut table.events);
        let sequences = table
            .events
            .iter()
            .filter_map(|e| e.sequence_id)
            .max()
            .unwrap_or(0);
        Ok(StepResult::success(
            table.events.len(),
            format!("segmented {} events into {} sequences", table.events.len(), sequences),
        ))
    }

    fn step_name(&self) -> &'static str {
        "segment"
    }

    fn dependencies(&self) -> Vec<&'static str> {
        vec!["enhance"]
    }
}

/// Resolves every entity mention against the dimension registry.
pub struct ResolveStep;

#[async_trait]
impl PipelineStep for ResolveStep {
    async fn execute(&self, game: &mut GameState, ctx: &PipelineContext) -> Result<StepResult> {
        let events = game
            .events
            .take()
            .ok_or_else(|| anyhow::anyhow!("resolve step requires enhanced events"))?;
        let shifts = game
            .shifts
            .take()
            .ok_or_else(|| anyhow::anyhow!("resolve step requires enhanced shifts"))?;

        let mut resolver = DimensionResolver::new(
            ctx.registry.as_ref(),
            ctx.thresholds.fuzzy_min_confidence,
            ctx.thresholds.fuzzy_ambiguity_margin,
        );
        let mut table = resolver.resolve_game(&game.raw.game_id, events.events, shifts.shifts);
        let warnings = table.findings.len();
        let processed = table.resolutions.len();
        game.findings.append(&mut table.findings);
        game.resolved = Some(table);
        Ok(StepResult::with_warnings(
            processed,
            warnings,
            format!("resolved {} mentions", processed),
        ))
    }

    fn step_name(&self) -> &'static str {
        "resolve"
    }

    fn dependencies(&self) -> Vec<&'static str> {
        vec!["segment", "shifts"]
    }
}

/// Computes every registered statistic over the resolved tables.
pub struct StatsStep;

#[async_trait]
impl PipelineStep for StatsStep {
    async fn execute(&self, game: &mut GameState, ctx: &PipelineContext) -> Result<StepResult> {
        let resolved = game
            .resolved
            .as_ref()
            .ok_or_else(|| anyhow::anyhow!("stats step requires resolved tables"))?;
        let view = ResolvedGameView {
            game_id: &game.raw.game_id,
            events: &resolved.events,
            shifts: &resolved.shifts,
        };
        let (facts, mut findings) = ctx.stats.build(&view);
        let warnings = findings.len();
        let processed = facts.len();
        game.findings.append(&mut findings);
        game.facts = Some(facts);
        Ok(StepResult::with_warnings(
            processed,
            warnings,
            format!("computed {} fact rows", processed),
        ))
    }

    fn step_name(&self) -> &'static str {
        "stats"
    }

    fn dependencies(&self) -> Vec<&'static str> {
        vec!["resolve"]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{DimensionEntry, EntityKind, RawEventRow};

    fn test_context() -> PipelineContext {
        let mut registry = DimensionRegistry::new();
        registry.insert(
            EntityKind::Team,
            DimensionEntry {
                key: "Ice Owls".to_string(),
                potential_values: Vec::new(),
                old_equivalents: Vec::new(),
            },
        );
        PipelineContext {
            registry: Arc::new(registry),
            thresholds: PipelineThresholds::default(),
            stats: Arc::new(StatRegistry::with_builtins()),
        }
    }

    #[tokio::test]
    async fn segment_before_enhance_is_an_error() {
        let ctx = test_context();
        let mut game = GameState::new(RawGameTable {
            game_id: "g1".to_string(),
            events: Vec::new(),
            shifts: Vec::new(),
        });
        assert!(SegmentStep.execute(&mut game, &ctx).await.is_err());
    }

    #[tokio::test]
    async fn steps_chain_through_game_state() {
        let ctx = test_context();
        let raw = RawGameTable {
            game_id: "g1".to_string(),
            events: vec![RawEventRow {
                game_id: "g1".to_string(),
                period: 1,
                clock: "00:10".to_string(),
                event_type: "Faceoff".to_string(),
                event_detail: Some("Won".to_string()),
                team: Some("Ice Owls".to_string()),
                ..Default::default()
            }],
            shifts: Vec::new(),
        };
        let mut game = GameState::new(raw);

        EnhanceStep.execute(&mut game, &ctx).await.unwrap();
        ShiftStep.execute(&mut game, &ctx).await.unwrap();
        SegmentStep.execute(&mut game, &ctx).await.unwrap();
        ResolveStep.execute(&mut game, &ctx).await.unwrap();
        StatsStep.execute(&mut game, &ctx).await.unwrap();

        let warehouse = game.into_warehouse().unwrap();
        assert_eq!(warehouse.events.len(), 1);
        assert_eq!(warehouse.events[0].team_key.as_deref(), Some("Ice Owls"));
        assert_eq!(warehouse.events[0].event.sequence_id, Some(1));
    }
}
