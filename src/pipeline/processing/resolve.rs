use std::collections::{HashMap, HashSet};

use crate::domain::{
    EnhancedEvent, EnhancedShift, EntityKind, Finding, MatchConfidence, Resolution,
    ResolvedEvent, ResolvedShift, Tier,
};
use crate::observability::metrics;
use crate::registry::DimensionRegistry;

/// Pluggable similarity scoring for fuzzy matching. Implementations must be
/// pure: the same pair always yields the same score.
pub trait NameScorer: Send + Sync {
    /// Similarity of a raw mention against a candidate string, in [0, 1].
    fn score(&self, mention: &str, candidate: &str) -> f64;
}

/// Default scorer: token-set overlap blended with character-bigram overlap,
/// after normalization. Token overlap carries multi-word names; the bigram
/// component catches misspellings within single tokens.
pub struct TokenOverlapScorer;

impl NameScorer for TokenOverlapScorer {
    fn score(&self, mention: &str, candidate: &str) -> f64 {
        let normalized1 = normalize_mention(mention);
        let normalized2 = normalize_mention(candidate);

        if normalized1.is_empty() || normalized2.is_empty() {
            return 0.0;
        }
        if normalized1 == normalized2 {
            return 1.0;
        }

        let tokens1: HashSet<&str> = normalized1.split_whitespace().collect();
        let tokens2: HashSet<&str> = normalized2.split_whitespace().collect();
        let intersection = tokens1.intersection(&tokens2).count();
        let union = tokens1.union(&tokens2).count();
        let token_overlap = intersection as f64 / union as f64;

        let bigrams1 = bigrams(&normalized1);
        let bigrams2 = bigrams(&normalized2);
        let bigram_overlap = if bigrams1.is_empty() || bigrams2.is_empty() {
            0.0
        } else {
            let shared = bigrams1.intersection(&bigrams2).count();
            (2 * shared) as f64 / (bigrams1.len() + bigrams2.len()) as f64
        };

        0.5 * token_overlap + 0.5 * bigram_overlap
    }
}

/// Normalize a mention for matching: lowercase, punctuation to spaces,
/// collapsed whitespace.
pub fn normalize_mention(raw: &str) -> String {
    let lowered = raw.to_lowercase().replace('&', " and ");
    let mapped: String = lowered
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect();
    mapped.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn bigrams(text: &str) -> HashSet<(char, char)> {
    let chars: Vec<char> = text.chars().filter(|c| !c.is_whitespace()).collect();
    chars.windows(2).map(|w| (w[0], w[1])).collect()
}

/// Fuzzy-match scope: bounds the candidate search space so mentions cannot
/// collide across teams or games.
#[derive(Debug, Clone, Default)]
pub struct ResolutionScope {
    pub game_id: String,
    /// When resolving players and the team is known, only that team's
    /// roster is searched.
    pub roster_team: Option<String>,
}

impl ResolutionScope {
    fn cache_key(&self) -> String {
        match &self.roster_team {
            Some(team) => format!("{}/{}", self.game_id, team),
            None => self.game_id.clone(),
        }
    }
}

/// Output of the resolution phase for one game.
#[derive(Debug, Clone, Default)]
pub struct ResolvedGameTable {
    pub events: Vec<ResolvedEvent>,
    pub shifts: Vec<ResolvedShift>,
    pub resolutions: Vec<Resolution>,
    pub findings: Vec<Finding>,
}

/// Maps free-text entity mentions to canonical dimension keys via exact,
/// alias, then fuzzy matching. Deterministic for a fixed registry snapshot
/// and thresholds; results are memoized per (mention, kind, scope).
pub struct DimensionResolver<'r> {
    registry: &'r DimensionRegistry,
    scorer: Box<dyn NameScorer>,
    min_confidence: f64,
    ambiguity_margin: f64,
    cache: HashMap<(EntityKind, String, String), Resolution>,
}

impl<'r> DimensionResolver<'r> {
    pub fn new(registry: &'r DimensionRegistry, min_confidence: f64, ambiguity_margin: f64) -> Self {
        Self {
            registry,
            scorer: Box::new(TokenOverlapScorer),
            min_confidence,
            ambiguity_margin,
            cache: HashMap::new(),
        }
    }

    pub fn with_scorer(mut self, scorer: Box<dyn NameScorer>) -> Self {
        self.scorer = scorer;
        self
    }

    /// Resolve one mention. Repeated mentions within the same scope resolve
    /// once and come back from the cache.
    pub fn resolve(&mut self, mention: &str, kind: EntityKind, scope: &ResolutionScope) -> Resolution {
        let cache_key = (kind, scope.cache_key(), normalize_mention(mention));
        if let Some(cached) = self.cache.get(&cache_key) {
            metrics::resolve::cache_hit();
            return cached.clone();
        }

        let resolution = self.resolve_uncached(mention, kind, scope);
        metrics::resolve::resolution_recorded(resolution.confidence);
        self.cache.insert(cache_key, resolution.clone());
        resolution
    }

    fn resolve_uncached(&self, mention: &str, kind: EntityKind, scope: &ResolutionScope) -> Resolution {
        let trimmed = mention.trim();
        if trimmed.is_empty() {
            return Resolution {
                mention: mention.to_string(),
                kind,
                key: None,
                confidence: MatchConfidence::Unresolved,
                score: None,
                reason: Some("empty mention".to_string()),
            };
        }

        let candidates = self.candidate_entries(kind, scope);

        // 1. Exact match against the canonical key or a legacy alias.
        for entry in &candidates {
            if entry.key == trimmed || entry.old_equivalents.iter().any(|a| a == trimmed) {
                return Resolution {
                    mention: mention.to_string(),
                    kind,
                    key: Some(entry.key.clone()),
                    confidence: MatchConfidence::Exact,
                    score: Some(1.0),
                    reason: None,
                };
            }
        }

        // 2. Variant match after normalization.
        let normalized = normalize_mention(trimmed);
        for entry in &candidates {
            let matches_variant = normalize_mention(&entry.key) == normalized
                || entry
                    .potential_values
                    .iter()
                    .any(|v| normalize_mention(v) == normalized)
                || entry
                    .old_equivalents
                    .iter()
                    .any(|a| normalize_mention(a) == normalized);
            if matches_variant {
                return Resolution {
                    mention: mention.to_string(),
                    kind,
                    key: Some(entry.key.clone()),
                    confidence: MatchConfidence::Alias,
                    score: Some(1.0),
                    reason: None,
                };
            }
        }

        // 3. Fuzzy match over the scoped candidate set. Candidates are
        // scanned in key order, so ties are stable across runs.
        let mut best: Option<(&str, f64)> = None;
        let mut runner_up: f64 = 0.0;
        for entry in &candidates {
            let entry_score = std::iter::once(entry.key.as_str())
                .chain(entry.potential_values.iter().map(String::as_str))
                .chain(entry.old_equivalents.iter().map(String::as_str))
                .map(|candidate| self.scorer.score(trimmed, candidate))
                .fold(0.0f64, f64::max);

            match best {
                Some((_, best_score)) if entry_score > best_score => {
                    runner_up = best_score;
                    best = Some((entry.key.as_str(), entry_score));
                }
                Some(_) => runner_up = runner_up.max(entry_score),
                None => best = Some((entry.key.as_str(), entry_score)),
            }
        }

        match best {
            Some((key, score)) if score >= self.min_confidence => {
                metrics::resolve::fuzzy_score_recorded(score);
                if score - runner_up < self.ambiguity_margin {
                    // Two candidates within the margin: never broken by
                    // order, always unresolved.
                    Resolution {
                        mention: mention.to_string(),
                        kind,
                        key: None,
                        confidence: MatchConfidence::Unresolved,
                        score: Some(score),
                        reason: Some(format!(
                            "ambiguous fuzzy match: runner-up within {:.2} of top score {:.2}",
                            self.ambiguity_margin, score
                        )),
                    }
                } else {
                    Resolution {
                        mention: mention.to_string(),
                        kind,
                        key: Some(key.to_string()),
                        confidence: MatchConfidence::Fuzzy,
                        score: Some(score),
                        reason: None,
                    }
                }
            }
            best => Resolution {
                mention: mention.to_string(),
                kind,
                key: None,
                confidence: MatchConfidence::Unresolved,
                score: best.map(|(_, s)| s),
                reason: Some(format!(
                    "no candidate above threshold {:.2} (best {:.2})",
                    self.min_confidence,
                    best.map(|(_, s)| s).unwrap_or(0.0)
                )),
            },
        }
    }

    /// The candidate entries for a kind, restricted to the roster when one
    /// is in scope.
    fn candidate_entries(
        &self,
        kind: EntityKind,
        scope: &ResolutionScope,
    ) -> Vec<&crate::domain::DimensionEntry> {
        let entries = self.registry.entries(kind);
        if kind == EntityKind::Player {
            if let Some(roster) = scope.roster_team.as_deref().and_then(|t| self.registry.roster(t)) {
                return entries.iter().filter(|e| roster.binary_search(&e.key).is_ok()).collect();
            }
        }
        entries.iter().collect()
    }

    /// Resolve every entity mention in a game's enhanced events and shifts.
    /// Unresolved mentions propagate as explicit nulls with a finding;
    /// mentions required for fact grain keys escalate to Blocking.
    pub fn resolve_game(
        &mut self,
        game_id: &str,
        events: Vec<EnhancedEvent>,
        shifts: Vec<EnhancedShift>,
    ) -> ResolvedGameTable {
        let mut table = ResolvedGameTable::default();
        let game_scope = ResolutionScope {
            game_id: game_id.to_string(),
            roster_team: None,
        };

        for event in events {
            let row_ref = format!("{}#{}", game_id, event.event_index);

            let team_key = event.team.as_deref().map(|mention| {
                self.record(mention, EntityKind::Team, &game_scope, &row_ref, true, &mut table)
            });
            let zone_key = event.zone.as_deref().map(|mention| {
                self.record(mention, EntityKind::Zone, &game_scope, &row_ref, false, &mut table)
            });

            let player_scope = ResolutionScope {
                game_id: game_id.to_string(),
                roster_team: team_key.clone().flatten(),
            };
            let actor_key = event.players[0].as_deref().map(|mention| {
                self.record(mention, EntityKind::Player, &player_scope, &row_ref, true, &mut table)
            });
            let opponent_key = event.players[1].as_deref().map(|mention| {
                // Opponents belong to the other team; search the full
                // player dimension rather than the acting team's roster.
                self.record(mention, EntityKind::Player, &game_scope, &row_ref, false, &mut table)
            });

            table.events.push(ResolvedEvent {
                event,
                team_key: team_key.flatten(),
                zone_key: zone_key.flatten(),
                player_keys: [actor_key.flatten(), opponent_key.flatten()],
            });
        }

        for (index, shift) in shifts.into_iter().enumerate() {
            let row_ref = format!("{}/shift#{}", game_id, index);
            let team_key =
                self.record(&shift.team, EntityKind::Team, &game_scope, &row_ref, true, &mut table);
            let player_scope = ResolutionScope {
                game_id: game_id.to_string(),
                roster_team: team_key.clone(),
            };
            let player_key = self.record(
                &shift.player,
                EntityKind::Player,
                &player_scope,
                &row_ref,
                true,
                &mut table,
            );

            table.shifts.push(ResolvedShift { shift, player_key, team_key });
        }

        table
    }

    fn record(
        &mut self,
        mention: &str,
        kind: EntityKind,
        scope: &ResolutionScope,
        row_ref: &str,
        grain_required: bool,
        table: &mut ResolvedGameTable,
    ) -> Option<String> {
        let resolution = self.resolve(mention, kind, scope);
        if resolution.confidence == MatchConfidence::Unresolved {
            let tier = if grain_required { Tier::Blocking } else { Tier::Warning };
            table.findings.push(Finding::new(
                tier,
                "unresolved_mention",
                "resolutions",
                Some(row_ref.to_string()),
                format!(
                    "{} mention '{}' unresolved in game {}: {}",
                    kind.as_str(),
                    mention,
                    scope.game_id,
                    resolution.reason.as_deref().unwrap_or("no reason recorded")
                ),
            ));
        }
        let key = resolution.key.clone();
        table.resolutions.push(resolution);
        key
    }
}
