//! Local player state plus the last-known state of every remote participant
//!
//! The local entry is written only by the simulation step; remote entries are
//! written only by inbound dispatch and reconciliation.

use shared::{PlayerState, Vec2};
use std::collections::{BTreeMap, BTreeSet};

/// A remote participant: the latest authoritative state and where it is drawn.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteEntry {
    pub state: PlayerState,
    pub rendered: Vec2,
}

impl RemoteEntry {
    /// First appearance renders at the authoritative position.
    pub fn new(state: PlayerState) -> Self {
        Self {
            rendered: state.position,
            state,
        }
    }

    /// Copy of the authoritative state positioned where it is drawn.
    pub fn render_state(&self) -> PlayerState {
        let mut state = self.state.clone();
        state.position = self.rendered;
        state
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Upsert {
    Inserted,
    Updated,
    /// Stored, and the entry is now known to be out of the match
    Eliminated,
    Ignored,
}

#[derive(Debug, Clone)]
pub struct PlayerStore {
    local: PlayerState,
    remotes: BTreeMap<String, RemoteEntry>,
    ready: BTreeSet<String>,
}

impl PlayerStore {
    pub fn new(local: PlayerState) -> Self {
        Self {
            local,
            remotes: BTreeMap::new(),
            ready: BTreeSet::new(),
        }
    }

    pub fn local_id(&self) -> &str {
        &self.local.id
    }

    pub fn local(&self) -> &PlayerState {
        &self.local
    }

    pub fn local_mut(&mut self) -> &mut PlayerState {
        &mut self.local
    }

    pub fn remote(&self, id: &str) -> Option<&RemoteEntry> {
        self.remotes.get(id)
    }

    pub fn remotes(&self) -> impl Iterator<Item = &RemoteEntry> {
        self.remotes.values()
    }

    pub fn remotes_mut(&mut self) -> impl Iterator<Item = &mut RemoteEntry> {
        self.remotes.values_mut()
    }

    /// Splits the borrow so the local entry can be mutated against the remotes.
    pub fn split_mut(&mut self) -> (&mut PlayerState, impl Iterator<Item = &mut RemoteEntry>) {
        (&mut self.local, self.remotes.values_mut())
    }

    pub fn remote_count(&self) -> usize {
        self.remotes.len()
    }

    /// Known roster size, local participant included.
    pub fn roster_size(&self) -> usize {
        self.remotes.len() + 1
    }

    pub fn alive_count(&self) -> usize {
        let remote_alive = self.remotes.values().filter(|r| r.state.alive).count();
        remote_alive + usize::from(self.local.is_alive())
    }

    /// Survivors in roster order, local participant first.
    pub fn alive_ids(&self) -> Vec<String> {
        let mut ids = Vec::new();
        if self.local.is_alive() {
            ids.push(self.local.id.clone());
        }
        ids.extend(
            self.remotes
                .values()
                .filter(|r| r.state.alive)
                .map(|r| r.state.id.clone()),
        );
        ids
    }

    /// Replaces every remote entry with `states`, skipping the local id.
    pub fn replace_remotes(&mut self, states: Vec<PlayerState>) -> Vec<String> {
        self.remotes.clear();
        let mut inserted = Vec::new();
        for state in states {
            if state.id == self.local.id {
                continue;
            }
            inserted.push(state.id.clone());
            self.remotes.insert(state.id.clone(), RemoteEntry::new(state));
        }
        inserted
    }

    /// Inserts or refreshes one remote entry.
    ///
    /// Updates for the local id and for entries already eliminated are ignored;
    /// an eliminated remote keeps its last known state until it is removed.
    /// Returns `Eliminated` when this state is the first to show the remote dead.
    pub fn upsert_remote(&mut self, mut state: PlayerState) -> Upsert {
        if state.id == self.local.id {
            return Upsert::Ignored;
        }

        let dead = !state.alive;
        let upsert = match self.remotes.get_mut(&state.id) {
            Some(entry) if !entry.state.alive => return Upsert::Ignored,
            Some(entry) => {
                state.trail = std::mem::take(&mut entry.state.trail);
                entry.state = state;
                Upsert::Updated
            }
            None => {
                self.remotes
                    .insert(state.id.clone(), RemoteEntry::new(state));
                Upsert::Inserted
            }
        };

        if dead {
            Upsert::Eliminated
        } else {
            upsert
        }
    }

    /// Moves a remote's rendered position onto its authoritative one.
    pub fn snap_remote(&mut self, id: &str) -> bool {
        match self.remotes.get_mut(id) {
            Some(entry) => {
                entry.rendered = entry.state.position;
                true
            }
            None => false,
        }
    }

    /// Records that a participant is ready. False for the local id and repeats.
    pub fn mark_ready(&mut self, id: &str) -> bool {
        id != self.local.id && self.ready.insert(id.to_string())
    }

    pub fn is_ready(&self, id: &str) -> bool {
        self.ready.contains(id)
    }

    /// Remote participants that reported ready.
    pub fn ready_count(&self) -> usize {
        self.ready.len()
    }

    /// Flags a remote as eliminated. Returns false for unknown ids, the local
    /// id, or entries that were already eliminated.
    pub fn mark_eliminated(&mut self, id: &str) -> bool {
        match self.remotes.get_mut(id) {
            Some(entry) if entry.state.alive => {
                entry.state.alive = false;
                true
            }
            _ => false,
        }
    }

    pub fn remove_remote(&mut self, id: &str) -> bool {
        self.ready.remove(id);
        self.remotes.remove(id).is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> PlayerStore {
        PlayerStore::new(PlayerState::new("me", Vec2::new(100.0, 100.0)))
    }

    #[test]
    fn test_replace_excludes_local() {
        let mut store = store();
        store.upsert_remote(PlayerState::new("stale", Vec2::ZERO));

        let inserted = store.replace_remotes(vec![
            PlayerState::new("me", Vec2::ZERO),
            PlayerState::new("a", Vec2::new(1.0, 2.0)),
            PlayerState::new("b", Vec2::new(3.0, 4.0)),
        ]);

        assert_eq!(inserted, vec!["a".to_string(), "b".to_string()]);
        assert_eq!(store.remote_count(), 2);
        assert!(store.remote("stale").is_none());
        assert!(store.remote("me").is_none());
        assert_eq!(store.remote("a").unwrap().rendered, Vec2::new(1.0, 2.0));
    }

    #[test]
    fn test_upsert_keeps_rendered_and_trail() {
        let mut store = store();
        assert_eq!(
            store.upsert_remote(PlayerState::new("a", Vec2::new(10.0, 10.0))),
            Upsert::Inserted
        );
        store
            .remotes_mut()
            .next()
            .unwrap()
            .state
            .record_trail(Vec2::new(10.0, 10.0), 5);

        assert_eq!(
            store.upsert_remote(PlayerState::new("a", Vec2::new(50.0, 10.0))),
            Upsert::Updated
        );
        let entry = store.remote("a").unwrap();
        assert_eq!(entry.rendered, Vec2::new(10.0, 10.0));
        assert_eq!(entry.state.position, Vec2::new(50.0, 10.0));
        assert_eq!(entry.state.trail.len(), 1);
    }

    #[test]
    fn test_local_updates_are_ignored() {
        let mut store = store();
        assert_eq!(
            store.upsert_remote(PlayerState::new("me", Vec2::ZERO)),
            Upsert::Ignored
        );
        assert_eq!(store.remote_count(), 0);
        assert_eq!(store.local().position, Vec2::new(100.0, 100.0));
    }

    #[test]
    fn test_elimination_is_one_way() {
        let mut store = store();
        store.upsert_remote(PlayerState::new("a", Vec2::new(7.0, 8.0)));

        assert!(store.mark_eliminated("a"));
        assert!(!store.mark_eliminated("a"));
        assert!(!store.mark_eliminated("nobody"));

        let mut revived = PlayerState::new("a", Vec2::new(99.0, 99.0));
        revived.alive = true;
        assert_eq!(store.upsert_remote(revived), Upsert::Ignored);

        let entry = store.remote("a").unwrap();
        assert!(!entry.state.alive);
        assert_eq!(entry.state.position, Vec2::new(7.0, 8.0));
    }

    #[test]
    fn test_dead_update_reports_elimination_once() {
        let mut store = store();
        store.upsert_remote(PlayerState::new("a", Vec2::ZERO));

        let mut dead = PlayerState::new("a", Vec2::new(5.0, 5.0));
        dead.alive = false;
        dead.hp = 0;
        assert_eq!(store.upsert_remote(dead.clone()), Upsert::Eliminated);
        assert_eq!(store.upsert_remote(dead), Upsert::Ignored);
        assert!(!store.mark_eliminated("a"));
        assert_eq!(store.alive_count(), 1);
    }

    #[test]
    fn test_snap_and_ready() {
        let mut store = store();
        store.upsert_remote(PlayerState::new("a", Vec2::ZERO));
        store.upsert_remote(PlayerState::new("a", Vec2::new(80.0, 0.0)));
        assert_eq!(store.remote("a").unwrap().rendered, Vec2::ZERO);

        assert!(store.snap_remote("a"));
        assert_eq!(store.remote("a").unwrap().rendered, Vec2::new(80.0, 0.0));
        assert!(!store.snap_remote("nobody"));

        assert!(store.mark_ready("a"));
        assert!(!store.mark_ready("a"));
        assert!(!store.mark_ready("me"));
        assert_eq!(store.ready_count(), 1);

        store.remove_remote("a");
        assert!(!store.is_ready("a"));
    }

    #[test]
    fn test_alive_count_and_ids() {
        let mut store = store();
        store.upsert_remote(PlayerState::new("a", Vec2::ZERO));
        store.upsert_remote(PlayerState::new("b", Vec2::ZERO));
        assert_eq!(store.alive_count(), 3);
        assert_eq!(store.roster_size(), 3);

        store.mark_eliminated("a");
        store.local_mut().hp = 0;
        store.local_mut().alive = false;
        assert_eq!(store.alive_count(), 1);
        assert_eq!(store.alive_ids(), vec!["b".to_string()]);
    }
}
