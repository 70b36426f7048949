//! Match outcome: single-survivor detection and winner idempotency

use crate::store::PlayerStore;
use log::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchPhase {
    Active,
    /// A survivor was found this tick; the winner event is being sent
    WinnerDeclared,
    Ended,
}

#[derive(Debug)]
pub struct OutcomeTracker {
    phase: MatchPhase,
    expected_participants: usize,
    winner: Option<String>,
}

impl OutcomeTracker {
    pub fn new(expected_participants: usize) -> Self {
        Self {
            phase: MatchPhase::Active,
            expected_participants: expected_participants.max(1),
            winner: None,
        }
    }

    pub fn phase(&self) -> MatchPhase {
        self.phase
    }

    pub fn winner(&self) -> Option<&str> {
        self.winner.as_deref()
    }

    pub fn is_ended(&self) -> bool {
        self.phase == MatchPhase::Ended
    }

    /// The roster counts as complete once it holds at least as many
    /// participants as the session expects.
    pub fn roster_complete(&self, store: &PlayerStore) -> bool {
        store.roster_size() >= self.expected_participants
    }

    /// Checks for a lone survivor while the match is active. On success the
    /// tracker moves to `WinnerDeclared` and returns the survivor's id.
    pub fn evaluate(&mut self, store: &PlayerStore) -> Option<String> {
        if self.phase != MatchPhase::Active {
            return None;
        }
        if store.alive_count() != 1 || !self.roster_complete(store) {
            return None;
        }

        let survivor = store.alive_ids().into_iter().next()?;
        info!("Last player standing: {}", survivor);
        self.phase = MatchPhase::WinnerDeclared;
        self.winner = Some(survivor.clone());
        Some(survivor)
    }

    /// Called after the winner event went out.
    pub fn finish(&mut self) {
        self.phase = MatchPhase::Ended;
    }

    /// Accepts a winner announced by the authority. Ignored once a winner is
    /// known, so only the first distinct id ever reaches the host.
    pub fn accept_remote_winner(&mut self, participant_id: &str) -> bool {
        if self.phase != MatchPhase::Active {
            debug!(
                "Ignoring winner {} in phase {:?}",
                participant_id, self.phase
            );
            return false;
        }
        info!("Winner announced by session: {}", participant_id);
        self.winner = Some(participant_id.to_string());
        self.phase = MatchPhase::Ended;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::{PlayerState, Vec2};

    fn store_with(ids: &[&str]) -> PlayerStore {
        let mut store = PlayerStore::new(PlayerState::new("me", Vec2::new(10.0, 10.0)));
        for id in ids {
            store.upsert_remote(PlayerState::new(*id, Vec2::new(50.0, 50.0)));
        }
        store
    }

    #[test]
    fn test_no_winner_before_roster_is_complete() {
        let store = store_with(&[]);
        let mut outcome = OutcomeTracker::new(2);
        assert_eq!(outcome.evaluate(&store), None);
        assert_eq!(outcome.phase(), MatchPhase::Active);
    }

    #[test]
    fn test_declares_last_survivor_once() {
        let mut store = store_with(&["a", "b"]);
        let mut outcome = OutcomeTracker::new(3);
        assert_eq!(outcome.evaluate(&store), None);

        store.mark_eliminated("a");
        store.mark_eliminated("b");
        assert_eq!(outcome.evaluate(&store), Some("me".to_string()));
        assert_eq!(outcome.phase(), MatchPhase::WinnerDeclared);
        assert_eq!(outcome.evaluate(&store), None);

        outcome.finish();
        assert!(outcome.is_ended());
        assert_eq!(outcome.winner(), Some("me"));
    }

    #[test]
    fn test_remote_survivor_is_declared() {
        let mut store = store_with(&["a"]);
        store.local_mut().hp = 0;
        store.local_mut().alive = false;

        let mut outcome = OutcomeTracker::new(2);
        assert_eq!(outcome.evaluate(&store), Some("a".to_string()));
    }

    #[test]
    fn test_second_remote_winner_ignored() {
        let mut outcome = OutcomeTracker::new(2);
        assert!(outcome.accept_remote_winner("a"));
        assert!(!outcome.accept_remote_winner("b"));
        assert!(!outcome.accept_remote_winner("a"));
        assert_eq!(outcome.winner(), Some("a"));
    }

    #[test]
    fn test_local_declaration_blocks_remote_winner() {
        let mut store = store_with(&["a"]);
        store.mark_eliminated("a");
        let mut outcome = OutcomeTracker::new(2);
        outcome.evaluate(&store);
        outcome.finish();

        assert!(!outcome.accept_remote_winner("a"));
        assert_eq!(outcome.winner(), Some("me"));
    }
}
