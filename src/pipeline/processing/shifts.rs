use std::collections::BTreeMap;

use crate::domain::{EnhancedShift, Finding, GameClock, RawGameTable, ShiftStatus};
use crate::observability::metrics;

/// Output of shift normalization: period-bounded, overlap-resolved intervals
/// plus the findings recorded while resolving them. Superseded shifts stay in
/// the table for audit.
#[derive(Debug, Clone, Default)]
pub struct EnhancedShiftTable {
    pub shifts: Vec<EnhancedShift>,
    pub findings: Vec<Finding>,
}

impl EnhancedShiftTable {
    /// The overlap-resolved intervals that downstream statistics consume.
    pub fn canonical(&self) -> impl Iterator<Item = &EnhancedShift> {
        self.shifts
            .iter()
            .filter(|s| s.status != ShiftStatus::Superseded)
    }
}

/// Trait for normalizing raw shift rows into non-overlapping intervals.
pub trait ShiftEnhancer {
    fn enhance(&self, game: &RawGameTable) -> EnhancedShiftTable;
}

/// Default shift enhancer. Overlapping shifts for the same player within a
/// period are merged when contiguous within the tolerance; a larger overlap
/// keeps the longer interval as canonical and marks the shorter superseded.
pub struct DefaultShiftEnhancer {
    pub overlap_tolerance_seconds: f64,
}

impl Default for DefaultShiftEnhancer {
    fn default() -> Self {
        Self { overlap_tolerance_seconds: 2.0 }
    }
}

impl ShiftEnhancer for DefaultShiftEnhancer {
    fn enhance(&self, game: &RawGameTable) -> EnhancedShiftTable {
        let mut findings = Vec::new();
        let tolerance = self.overlap_tolerance_seconds;

        // Group parsed intervals per player and period. BTreeMap keeps the
        // output order stable across rebuilds.
        let mut grouped: BTreeMap<(String, u8), Vec<EnhancedShift>> = BTreeMap::new();

        for (index, row) in game.shifts.iter().enumerate() {
            metrics::shifts::shift_processed();
            let row_ref = format!("{}#{}", row.game_id, index);

            let start = GameClock::parse(row.period, &row.start_clock);
            let end = GameClock::parse(row.period, &row.end_clock);
            let (mut start, mut end) = match (start, end) {
                (Some(s), Some(e)) => (s, e),
                _ => {
                    findings.push(Finding::warning(
                        "malformed_shift_clock",
                        "shifts",
                        Some(row_ref),
                        format!(
                            "unparseable shift bounds '{}'..'{}' for {}, interval excluded",
                            row.start_clock, row.end_clock, row.player
                        ),
                    ));
                    continue;
                }
            };

            if end < start {
                findings.push(Finding::warning(
                    "inverted_shift_bounds",
                    "shifts",
                    Some(row_ref),
                    format!("shift for {} ends before it starts, bounds swapped", row.player),
                ));
                std::mem::swap(&mut start, &mut end);
            }

            grouped
                .entry((row.player.clone(), row.period))
                .or_default()
                .push(EnhancedShift {
                    game_id: row.game_id.clone(),
                    period: row.period,
                    player: row.player.clone(),
                    team: row.team.clone(),
                    start,
                    end,
                    status: ShiftStatus::Canonical,
                });
        }

        let mut shifts = Vec::new();
        for ((player, period), mut intervals) in grouped {
            intervals.sort_by_key(|s| (s.start, s.end));

            let mut superseded: Vec<EnhancedShift> = Vec::new();
            let mut resolved: Vec<EnhancedShift> = Vec::new();

            for shift in intervals {
                let Some(current) = resolved.last_mut() else {
                    resolved.push(shift);
                    continue;
                };

                let gap = shift.start.seconds as f64 - current.end.seconds as f64;
                if gap > tolerance {
                    // Disjoint beyond tolerance: a genuine new shift.
                    resolved.push(shift);
                } else if gap >= -tolerance {
                    // Contiguous or overlapping within tolerance: merge to
                    // the union of both intervals.
                    metrics::shifts::shifts_merged();
                    current.end = current.end.max(shift.end);
                    let absorbed = match current.status {
                        ShiftStatus::Merged { absorbed } => absorbed + 1,
                        _ => 1,
                    };
                    current.status = ShiftStatus::Merged { absorbed };
                } else {
                    // Overlap beyond tolerance: data-quality problem. The
                    // longer interval wins; the shorter is kept as superseded.
                    metrics::shifts::shift_superseded();
                    findings.push(Finding::warning(
                        "shift_overlap",
                        "shifts",
                        Some(format!("{}/{}/P{}", shift.game_id, player, period)),
                        format!(
                            "shifts {}..{} and {}..{} overlap beyond {}s tolerance",
                            current.start, current.end, shift.start, shift.end, tolerance
                        ),
                    ));
                    if shift.duration_seconds() > current.duration_seconds() {
                        let mut losing = shift.clone();
                        std::mem::swap(current, &mut losing);
                        losing.status = ShiftStatus::Superseded;
                        superseded.push(losing);
                    } else {
                        let mut losing = shift;
                        losing.status = ShiftStatus::Superseded;
                        superseded.push(losing);
                    }
                }
            }

            shifts.extend(resolved);
            shifts.extend(superseded);
        }

        EnhancedShiftTable { shifts, findings }
    }
}
