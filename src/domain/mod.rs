use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// One raw tracked-event row as delivered by the source layer.
/// All categorical columns are free text; nothing here is validated yet.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawEventRow {
    pub game_id: String,
    pub period: u8,
    /// Elapsed game clock within the period, "MM:SS".
    pub clock: String,
    pub event_type: String,
    pub event_detail: Option<String>,
    pub play_detail_1: Option<String>,
    pub play_detail_2: Option<String>,
    pub zone: Option<String>,
    pub team: Option<String>,
    pub player_1: Option<String>,
    pub player_2: Option<String>,
    /// Raw success marker, e.g. "s", "Y", "successful".
    pub success: Option<String>,
}

/// One raw shift row: an interval of ice time for one player.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawShiftRow {
    pub game_id: String,
    pub period: u8,
    pub player: String,
    pub team: String,
    pub start_clock: String,
    pub end_clock: String,
}

/// The per-game input handed over by the ingestion boundary.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawGameTable {
    pub game_id: String,
    pub events: Vec<RawEventRow>,
    pub shifts: Vec<RawShiftRow>,
}

static CLOCK_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(\d{1,3}):([0-5]\d)$").unwrap());

/// A point on the game clock: elapsed seconds within a period.
/// Ordering is chronological: first by period, then by seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct GameClock {
    pub period: u8,
    pub seconds: u32,
}

impl GameClock {
    pub fn new(period: u8, seconds: u32) -> Self {
        Self { period, seconds }
    }

    /// Parse an "MM:SS" elapsed-clock string for the given period.
    pub fn parse(period: u8, clock: &str) -> Option<Self> {
        let caps = CLOCK_RE.captures(clock.trim())?;
        let minutes: u32 = caps.get(1)?.as_str().parse().ok()?;
        let seconds: u32 = caps.get(2)?.as_str().parse().ok()?;
        Some(Self {
            period,
            seconds: minutes * 60 + seconds,
        })
    }
}

impl fmt::Display for GameClock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "P{} {:02}:{:02}", self.period, self.seconds / 60, self.seconds % 60)
    }
}

/// Recognized tracked-event categories. Raw strings that parse to none of
/// these pass through with a null success flag and a Warning finding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventType {
    GameStart,
    PeriodChange,
    Faceoff,
    Shot,
    Goal,
    Stoppage,
    Pass,
    Takeaway,
    Giveaway,
    Hit,
    Penalty,
    ZoneEntry,
}

impl EventType {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_lowercase().as_str() {
            "gamestart" | "game_start" | "game start" => Some(Self::GameStart),
            "periodchange" | "period_change" | "period change" => Some(Self::PeriodChange),
            "faceoff" | "face_off" | "face-off" => Some(Self::Faceoff),
            "shot" => Some(Self::Shot),
            "goal" => Some(Self::Goal),
            "stoppage" => Some(Self::Stoppage),
            "pass" => Some(Self::Pass),
            "takeaway" => Some(Self::Takeaway),
            "giveaway" => Some(Self::Giveaway),
            "hit" => Some(Self::Hit),
            "penalty" => Some(Self::Penalty),
            "zoneentry" | "zone_entry" | "zone entry" => Some(Self::ZoneEntry),
            _ => None,
        }
    }

    /// Whether this event type closes the current possession chain and
    /// opens a new sequence.
    pub fn is_sequence_boundary(&self) -> bool {
        matches!(
            self,
            Self::Faceoff | Self::Goal | Self::PeriodChange | Self::Stoppage | Self::GameStart
        )
    }

    /// Whether this event type marks a change of possession within a sequence.
    pub fn is_possession_change(&self) -> bool {
        matches!(self, Self::Takeaway | Self::Giveaway)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::GameStart => "GameStart",
            Self::PeriodChange => "PeriodChange",
            Self::Faceoff => "Faceoff",
            Self::Shot => "Shot",
            Self::Goal => "Goal",
            Self::Stoppage => "Stoppage",
            Self::Pass => "Pass",
            Self::Takeaway => "Takeaway",
            Self::Giveaway => "Giveaway",
            Self::Hit => "Hit",
            Self::Penalty => "Penalty",
            Self::ZoneEntry => "ZoneEntry",
        }
    }
}

/// Which tracked player a play detail is attributed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ActorSlot {
    /// The acting player (player_1 on the raw row).
    Actor,
    /// The opposing player (player_2 on the raw row).
    Opponent,
}

/// Provenance of a play-detail slot. Human annotations are never overwritten
/// by auto-derived values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DetailOrigin {
    Human,
    Derived,
}

/// One of the (at most two) play-detail slots on an event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayDetail {
    pub label: String,
    pub attributed_to: ActorSlot,
    pub success: Option<bool>,
    pub origin: DetailOrigin,
}

/// An event after semantic enhancement and segmentation. Immutable once the
/// segmenter has assigned sequence and play ids.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnhancedEvent {
    /// Ordinal of this event in the game's chronological stream.
    pub event_index: usize,
    pub game_id: String,
    pub clock: GameClock,
    pub event_type: Option<EventType>,
    pub raw_type: String,
    pub detail: Option<String>,
    pub play_details: [Option<PlayDetail>; 2],
    pub zone: Option<String>,
    pub team: Option<String>,
    pub players: [Option<String>; 2],
    pub success: Option<bool>,
    pub sequence_id: Option<u32>,
    pub play_id: Option<u32>,
}

impl EnhancedEvent {
    /// The canonical goal rule: an event is a goal only if its type is Goal
    /// AND its detail is Goal_Scored. A Shot with detail "Goal" is a shot
    /// attempt, never a goal.
    pub fn is_goal(&self) -> bool {
        self.event_type == Some(EventType::Goal)
            && self.detail.as_deref() == Some("Goal_Scored")
    }
}

/// Outcome of shift overlap resolution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ShiftStatus {
    Canonical,
    /// Canonical interval absorbed this many contiguous raw shifts.
    Merged { absorbed: usize },
    /// Overlapped a longer shift beyond tolerance; retained for audit only.
    Superseded,
}

/// A normalized shift interval for one player within one period.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnhancedShift {
    pub game_id: String,
    pub period: u8,
    pub player: String,
    pub team: String,
    pub start: GameClock,
    pub end: GameClock,
    pub status: ShiftStatus,
}

impl EnhancedShift {
    pub fn duration_seconds(&self) -> u32 {
        self.end.seconds.saturating_sub(self.start.seconds)
    }
}

/// Entity types the dimension registry can resolve against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntityKind {
    Player,
    Team,
    Zone,
    Position,
    Venue,
}

impl EntityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Player => "player",
            Self::Team => "team",
            Self::Zone => "zone",
            Self::Position => "position",
            Self::Venue => "venue",
        }
    }
}

/// One canonical dimension entry with its accepted textual variants and
/// legacy aliases. Read-only during pipeline processing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DimensionEntry {
    pub key: String,
    #[serde(default)]
    pub potential_values: Vec<String>,
    #[serde(default)]
    pub old_equivalents: Vec<String>,
}

/// Confidence tier of an entity-mention match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MatchConfidence {
    Exact,
    Alias,
    Fuzzy,
    Unresolved,
}

/// Write-once record of one mention -> dimension key resolution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Resolution {
    pub mention: String,
    pub kind: EntityKind,
    pub key: Option<String>,
    pub confidence: MatchConfidence,
    pub score: Option<f64>,
    /// Populated for unresolved mentions: why no match was accepted.
    pub reason: Option<String>,
}

/// Aggregation grain of a fact row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Grain {
    PlayerGame,
    PlayerPairGame,
    TeamGame,
}

impl Grain {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PlayerGame => "player_game",
            Self::PlayerPairGame => "player_pair_game",
            Self::TeamGame => "team_game",
        }
    }
}

/// One aggregated statistic value at a declared grain. Keys are kept sorted
/// so serialized output is stable across rebuilds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FactRow {
    pub statistic: String,
    pub grain: Grain,
    pub keys: BTreeMap<String, String>,
    pub value: f64,
}

/// Severity tier of a validation finding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Tier {
    Blocking,
    Warning,
    Informational,
}

/// One validation finding. Findings are write-once outputs; they never
/// mutate the data they describe.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Finding {
    pub tier: Tier,
    pub rule_id: String,
    pub table: String,
    pub row_ref: Option<String>,
    pub message: String,
}

impl Finding {
    pub fn new(
        tier: Tier,
        rule_id: impl Into<String>,
        table: impl Into<String>,
        row_ref: Option<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            tier,
            rule_id: rule_id.into(),
            table: table.into(),
            row_ref,
            message: message.into(),
        }
    }

    pub fn warning(
        rule_id: impl Into<String>,
        table: impl Into<String>,
        row_ref: Option<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::new(Tier::Warning, rule_id, table, row_ref, message)
    }

    pub fn blocking(
        rule_id: impl Into<String>,
        table: impl Into<String>,
        row_ref: Option<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::new(Tier::Blocking, rule_id, table, row_ref, message)
    }
}

/// Overall outcome of a pipeline run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunStatus {
    Passed,
    PassedWithWarnings,
    Failed,
}

impl RunStatus {
    pub fn from_findings(findings: &[Finding]) -> Self {
        if findings.iter().any(|f| f.tier == Tier::Blocking) {
            Self::Failed
        } else if findings.iter().any(|f| f.tier == Tier::Warning) {
            Self::PassedWithWarnings
        } else {
            Self::Passed
        }
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Passed => "Passed",
            Self::PassedWithWarnings => "PassedWithWarnings",
            Self::Failed => "Failed",
        };
        write!(f, "{}", s)
    }
}

/// An event with its entity mentions resolved to canonical dimension keys.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolvedEvent {
    pub event: EnhancedEvent,
    pub team_key: Option<String>,
    pub zone_key: Option<String>,
    pub player_keys: [Option<String>; 2],
}

/// A shift with its entity mentions resolved to canonical dimension keys.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolvedShift {
    pub shift: EnhancedShift,
    pub player_key: Option<String>,
    pub team_key: Option<String>,
}

/// All tables produced for one game, plus the findings accumulated while
/// producing them. This is the unit the validator and exporter consume.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GameWarehouse {
    pub game_id: String,
    pub events: Vec<ResolvedEvent>,
    pub shifts: Vec<ResolvedShift>,
    pub resolutions: Vec<Resolution>,
    pub facts: Vec<FactRow>,
    pub findings: Vec<Finding>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clock_parses_elapsed_minutes_and_seconds() {
        let clock = GameClock::parse(2, "12:34").unwrap();
        assert_eq!(clock.period, 2);
        assert_eq!(clock.seconds, 12 * 60 + 34);
    }

    #[test]
    fn clock_rejects_malformed_input() {
        assert!(GameClock::parse(1, "12:99").is_none());
        assert!(GameClock::parse(1, "half past").is_none());
        assert!(GameClock::parse(1, "").is_none());
    }

    #[test]
    fn clock_orders_by_period_then_seconds() {
        let early = GameClock::new(1, 500);
        let late = GameClock::new(2, 10);
        assert!(early < late);
    }

    #[test]
    fn event_type_parse_is_case_insensitive() {
        assert_eq!(EventType::parse("FACEOFF"), Some(EventType::Faceoff));
        assert_eq!(EventType::parse("game_start"), Some(EventType::GameStart));
        assert_eq!(EventType::parse("ritual dance"), None);
    }

    #[test]
    fn goal_requires_type_and_detail_conjunction() {
        let mut event = EnhancedEvent {
            event_index: 0,
            game_id: "g1".to_string(),
            clock: GameClock::new(1, 0),
            event_type: Some(EventType::Goal),
            raw_type: "Goal".to_string(),
            detail: Some("Goal_Scored".to_string()),
            play_details: [None, None],
            zone: None,
            team: None,
            players: [None, None],
            success: None,
            sequence_id: None,
            play_id: None,
        };
        assert!(event.is_goal());

        // A Shot with detail "Goal" is a shot attempt, never a goal.
        event.event_type = Some(EventType::Shot);
        event.detail = Some("Goal".to_string());
        assert!(!event.is_goal());

        // Type alone is not enough either.
        event.event_type = Some(EventType::Goal);
        event.detail = Some("Goal".to_string());
        assert!(!event.is_goal());
    }

    #[test]
    fn run_status_reflects_worst_tier() {
        let warning = Finding::warning("r1", "events", None, "w");
        let blocking = Finding::blocking("r2", "facts", None, "b");
        assert_eq!(RunStatus::from_findings(&[]), RunStatus::Passed);
        assert_eq!(
            RunStatus::from_findings(&[warning.clone()]),
            RunStatus::PassedWithWarnings
        );
        assert_eq!(
            RunStatus::from_findings(&[warning, blocking]),
            RunStatus::Failed
        );
    }
}
