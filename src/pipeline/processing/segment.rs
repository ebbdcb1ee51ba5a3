use crate::domain::EnhancedEvent;
use crate::observability::metrics;

/// Explicit state of the possession segmenter between events.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SegmenterState {
    pub current_sequence_id: u32,
    pub current_play_id: u32,
    pub current_zone: Option<String>,
    pub current_team: Option<String>,
}

/// Assigns possession-chain (sequence) and single-zone-possession (play)
/// identifiers to a chronologically ordered event stream.
///
/// Sequences partition all events of a game with no gaps or overlaps; every
/// play belongs to exactly one sequence. Ids are monotonic within a game.
#[derive(Debug, Default)]
pub struct PlaySegmenter {
    state: SegmenterState,
    next_sequence_id: u32,
    next_play_id: u32,
}

impl PlaySegmenter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> &SegmenterState {
        &self.state
    }

    /// Advance the state machine by one event and return the
    /// (sequence id, play id) the event belongs to.
    pub fn step(&mut self, event: &EnhancedEvent) -> (u32, u32) {
        let first_event = self.next_sequence_id == 0;
        let boundary = event
            .event_type
            .map(|t| t.is_sequence_boundary())
            .unwrap_or(false);
        let possession_change = event
            .event_type
            .map(|t| t.is_possession_change())
            .unwrap_or(false);
        // A zone change needs zone information on both sides; an event that
        // first introduces a zone after a zoneless boundary only seeds it.
        let zone_change = match (&self.state.current_zone, &event.zone) {
            (Some(current), Some(zone)) => current != zone,
            _ => false,
        };

        if first_event || boundary {
            // Close the current play and sequence, open fresh ones seeded
            // from this event. The boundary event is the first member of the
            // sequence it opens.
            self.next_sequence_id += 1;
            self.next_play_id += 1;
            metrics::segment::sequence_opened();
            metrics::segment::play_opened();
            self.state = SegmenterState {
                current_sequence_id: self.next_sequence_id,
                current_play_id: self.next_play_id,
                current_zone: event.zone.clone(),
                current_team: event.team.clone(),
            };
        } else if zone_change || possession_change {
            // One boundary even when both conditions fire together: the
            // event opens exactly one new play within the same sequence.
            self.next_play_id += 1;
            metrics::segment::play_opened();
            self.state.current_play_id = self.next_play_id;
            if event.zone.is_some() {
                self.state.current_zone = event.zone.clone();
            }
            if event.team.is_some() {
                self.state.current_team = event.team.clone();
            }
        } else {
            // Attach to the open play; adopt late-arriving zone/team info.
            if self.state.current_zone.is_none() {
                self.state.current_zone = event.zone.clone();
            }
            if self.state.current_team.is_none() {
                self.state.current_team = event.team.clone();
            }
        }

        (self.state.current_sequence_id, self.state.current_play_id)
    }

    /// Assign sequence/play ids over a whole game's ordered event stream.
    /// The last play and sequence simply have no successor; nothing is left
    /// implicitly open.
    pub fn segment_game(events: &mut [EnhancedEvent]) {
        let mut segmenter = Self::new();
        for event in events.iter_mut() {
            let (sequence_id, play_id) = segmenter.step(event);
            event.sequence_id = Some(sequence_id);
            event.play_id = Some(play_id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{EventType, GameClock};

    fn event(event_type: Option<EventType>, zone: Option<&str>, team: Option<&str>) -> EnhancedEvent {
        EnhancedEvent {
            event_index: 0,
            game_id: "g1".to_string(),
            clock: GameClock::new(1, 0),
            event_type,
            raw_type: event_type.map(|t| t.as_str().to_string()).unwrap_or_default(),
            detail: None,
            play_details: [None, None],
            zone: zone.map(str::to_string),
            team: team.map(str::to_string),
            players: [None, None],
            success: None,
            sequence_id: None,
            play_id: None,
        }
    }

    fn ids(events: &[EnhancedEvent]) -> Vec<(u32, u32)> {
        events
            .iter()
            .map(|e| (e.sequence_id.unwrap(), e.play_id.unwrap()))
            .collect()
    }

    #[test]
    fn first_event_opens_sequence_one_even_without_boundary_type() {
        let mut events = vec![event(Some(EventType::Pass), Some("Neutral"), Some("A"))];
        PlaySegmenter::segment_game(&mut events);
        assert_eq!(ids(&events), vec![(1, 1)]);
    }

    #[test]
    fn boundary_events_open_new_sequences_as_first_member() {
        let mut events = vec![
            event(Some(EventType::GameStart), None, None),
            event(Some(EventType::Faceoff), Some("Neutral"), Some("A")),
            event(Some(EventType::Shot), Some("Neutral"), Some("A")),
            event(Some(EventType::Goal), Some("Offensive"), Some("A")),
            event(Some(EventType::Stoppage), None, None),
        ];
        PlaySegmenter::segment_game(&mut events);
        assert_eq!(
            ids(&events),
            vec![(1, 1), (2, 2), (2, 2), (3, 3), (4, 4)]
        );
    }

    #[test]
    fn zone_change_opens_new_play_in_same_sequence() {
        let mut events = vec![
            event(Some(EventType::Faceoff), Some("Neutral"), Some("A")),
            event(Some(EventType::Pass), Some("Neutral"), Some("A")),
            event(Some(EventType::Pass), Some("Offensive"), Some("A")),
        ];
        PlaySegmenter::segment_game(&mut events);
        assert_eq!(ids(&events), vec![(1, 1), (1, 1), (1, 2)]);
    }

    #[test]
    fn possession_change_opens_new_play_and_updates_team() {
        let mut events = vec![
            event(Some(EventType::Faceoff), Some("Neutral"), Some("A")),
            event(Some(EventType::Takeaway), Some("Neutral"), Some("B")),
            event(Some(EventType::Pass), Some("Neutral"), Some("B")),
        ];
        let mut segmenter = PlaySegmenter::new();
        for e in events.iter_mut() {
            let (s, p) = segmenter.step(e);
            e.sequence_id = Some(s);
            e.play_id = Some(p);
        }
        assert_eq!(ids(&events), vec![(1, 1), (1, 2), (1, 2)]);
        assert_eq!(segmenter.state().current_team.as_deref(), Some("B"));
    }

    #[test]
    fn possession_change_with_zone_change_opens_single_play() {
        // Both boundary conditions on one event: exactly one new play.
        let mut events = vec![
            event(Some(EventType::Faceoff), Some("Neutral"), Some("A")),
            event(Some(EventType::Takeaway), Some("Defensive"), Some("B")),
            event(Some(EventType::Pass), Some("Defensive"), Some("B")),
        ];
        PlaySegmenter::segment_game(&mut events);
        assert_eq!(ids(&events), vec![(1, 1), (1, 2), (1, 2)]);
    }

    #[test]
    fn zone_introduced_after_zoneless_boundary_is_not_a_change() {
        let mut events = vec![
            event(Some(EventType::Stoppage), None, None),
            event(Some(EventType::Pass), Some("Defensive"), Some("A")),
            event(Some(EventType::Pass), Some("Defensive"), Some("A")),
        ];
        PlaySegmenter::segment_game(&mut events);
        assert_eq!(ids(&events), vec![(1, 1), (1, 1), (1, 1)]);
    }

    #[test]
    fn unknown_event_types_attach_to_the_open_play() {
        let mut events = vec![
            event(Some(EventType::Faceoff), Some("Neutral"), Some("A")),
            event(None, Some("Neutral"), Some("A")),
        ];
        PlaySegmenter::segment_game(&mut events);
        assert_eq!(ids(&events), vec![(1, 1), (1, 1)]);
    }

    #[test]
    fn sequences_partition_events_in_order() {
        let mut events = vec![
            event(Some(EventType::GameStart), None, None),
            event(Some(EventType::Faceoff), Some("Neutral"), Some("A")),
            event(Some(EventType::Pass), Some("Offensive"), Some("A")),
            event(Some(EventType::Giveaway), Some("Offensive"), Some("B")),
            event(Some(EventType::Stoppage), None, None),
            event(Some(EventType::Faceoff), Some("Defensive"), Some("B")),
        ];
        PlaySegmenter::segment_game(&mut events);

        // Every event belongs to exactly one sequence and play.
        assert!(events.iter().all(|e| e.sequence_id.is_some() && e.play_id.is_some()));
        // Sequence ids never decrease along the stream.
        let sequence_ids: Vec<u32> = events.iter().map(|e| e.sequence_id.unwrap()).collect();
        assert!(sequence_ids.windows(2).all(|w| w[0] <= w[1]));
        // Play ids are consistent with chronology as well.
        let play_ids: Vec<u32> = events.iter().map(|e| e.play_id.unwrap()).collect();
        assert!(play_ids.windows(2).all(|w| w[0] <= w[1]));
    }
}
