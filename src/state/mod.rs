// State management module
//
// Reader-side view of the game library. The frame loop feeds every collection it gets from
// the snapshot reader into the StateManager, which tracks what changed and emits events for
// whoever renders the library.

use crate::models::{Collection, GameRecord, InstallState};
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tokio::sync::broadcast;

/// Change events emitted when state is modified
#[derive(Clone, Debug, PartialEq)]
pub enum StateChange {
    /// A newer collection was applied
    CollectionChanged { generation: u64, records: usize },

    /// The selected game changed
    SelectionChanged { id: Option<u64> },

    /// An install state was resolved (not served from memo)
    InstallStateResolved { id: u64 },

    /// State has been reset
    StateReset,
}

/// Install state memo entry
#[derive(Clone, Debug, PartialEq)]
pub struct ResolvedInstall {
    /// Collection generation the state was resolved against
    pub generation: u64,
    pub state: InstallState,
}

/// Reader-side launcher state
#[derive(Clone, Debug, Default, PartialEq)]
pub struct LauncherState {
    /// Generation of the last applied collection
    pub generation: u64,

    /// Records in the last applied collection
    pub record_count: usize,

    /// Currently selected game
    pub selected: Option<u64>,

    /// Install states by game id
    pub install_states: HashMap<u64, ResolvedInstall>,
}

impl LauncherState {
    /// Memoized install state, if it was resolved against `generation`
    pub fn memoized(&self, id: u64, generation: u64) -> Option<&InstallState> {
        self.install_states
            .get(&id)
            .filter(|entry| entry.generation == generation)
            .map(|entry| &entry.state)
    }
}

/// Thread-safe state manager with event emission
///
/// - Provides shared access to [`LauncherState`] via `Arc<RwLock<T>>`
/// - Detects state changes and emits [`StateChange`] events
/// - Memoizes install states per game and collection generation
///
/// Subscribers receive events over a tokio broadcast channel; it's fine for nobody to listen.
pub struct StateManager {
    state: Arc<RwLock<LauncherState>>,
    state_tx: broadcast::Sender<StateChange>,
}

impl StateManager {
    /// Create a new StateManager with a broadcast buffer of 100 events
    pub fn new() -> Self {
        let (state_tx, _) = broadcast::channel(100);
        Self {
            state: Arc::new(RwLock::new(LauncherState::default())),
            state_tx,
        }
    }

    fn read_lock(&self) -> RwLockReadGuard<'_, LauncherState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_lock(&self) -> RwLockWriteGuard<'_, LauncherState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Clone of the current state
    pub fn snapshot(&self) -> LauncherState {
        self.read_lock().clone()
    }

    /// Execute a function with read access to the state
    pub fn read<F, R>(&self, f: F) -> R
    where
        F: FnOnce(&LauncherState) -> R,
    {
        f(&self.read_lock())
    }

    /// Mutate the state, then emit an event for each detected change
    ///
    /// # Returns
    /// The events that were emitted
    pub fn update<F>(&self, update_fn: F) -> Vec<StateChange>
    where
        F: FnOnce(&mut LauncherState),
    {
        let mut state = self.write_lock();
        let old_state = state.clone();

        update_fn(&mut state);

        let changes = detect_changes(&old_state, &state);
        for change in &changes {
            // no subscribers is fine
            let _ = self.state_tx.send(change.clone());
        }

        changes
    }

    /// Subscribe to state change events
    pub fn subscribe(&self) -> broadcast::Receiver<StateChange> {
        self.state_tx.subscribe()
    }

    /// Apply a collection read from the snapshot reader
    ///
    /// Re-applying the same generation is a no-op. Memo entries of games that are gone are
    /// dropped, and the selection is cleared if the selected game disappeared.
    pub fn apply_collection(&self, collection: &Collection) -> Vec<StateChange> {
        if self.read(|state| state.generation) == collection.generation {
            return Vec::new();
        }

        self.update(|state| {
            state.generation = collection.generation;
            state.record_count = collection.len();
            state
                .install_states
                .retain(|id, _| collection.find(*id).is_some());

            if let Some(id) = state.selected {
                if collection.find(id).is_none() {
                    tracing::debug!("Selected game {} no longer in library", id);
                    state.selected = None;
                }
            }
        })
    }

    /// Set the selected game
    pub fn select_game(&self, id: Option<u64>) -> Vec<StateChange> {
        self.update(|state| state.selected = id)
    }

    /// Install state of `record` as of collection `generation`
    ///
    /// Served from the memo when it was already resolved in this generation, else taken from
    /// the record itself when the refresh worker resolved it, else computed with `resolve`.
    /// Nothing is locked while `resolve` runs.
    pub fn install_state<F>(&self, record: &GameRecord, generation: u64, resolve: F) -> InstallState
    where
        F: FnOnce(&GameRecord) -> InstallState,
    {
        if let Some(memo) = self.read(|state| state.memoized(record.id, generation).cloned()) {
            return memo;
        }

        let install = match &record.specialk.injection {
            Some(resolved) => resolved.clone(),
            None => resolve(record),
        };

        self.write_lock().install_states.insert(
            record.id,
            ResolvedInstall {
                generation,
                state: install.clone(),
            },
        );

        let _ = self
            .state_tx
            .send(StateChange::InstallStateResolved { id: record.id });

        install
    }

    /// Forget everything, including the selection
    pub fn reset(&self) -> Vec<StateChange> {
        let mut changes = self.update(|state| *state = LauncherState::default());

        let reset_event = StateChange::StateReset;
        let _ = self.state_tx.send(reset_event.clone());
        changes.push(reset_event);

        changes
    }
}

/// Detect what changed between two states
fn detect_changes(old: &LauncherState, new: &LauncherState) -> Vec<StateChange> {
    let mut changes = Vec::new();

    if old.generation != new.generation || old.record_count != new.record_count {
        changes.push(StateChange::CollectionChanged {
            generation: new.generation,
            records: new.record_count,
        });
    }

    if old.selected != new.selected {
        changes.push(StateChange::SelectionChanged { id: new.selected });
    }

    changes
}

impl Default for StateManager {
    fn default() -> Self {
        Self::new()
    }
}

// Clones share the same state and channel
impl Clone for StateManager {
    fn clone(&self) -> Self {
        Self {
            state: Arc::clone(&self.state),
            state_tx: self.state_tx.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Bitness, InjectionType, LaunchConfig, StoreOrigin};
    use std::cell::Cell;

    fn collection(generation: u64, ids: &[u64]) -> Collection {
        let mut collection = Collection::new();
        for &id in ids {
            collection.push(
                GameRecord::new(id, StoreOrigin::Steam, format!("Game {id}"), "/games")
                    .with_launch_config(LaunchConfig::new("/games/game.exe")),
            );
        }
        collection.generation = generation;
        collection
    }

    fn resolved(bitness: Bitness) -> InstallState {
        InstallState {
            bitness,
            injection_type: InjectionType::Global,
            ..Default::default()
        }
    }

    #[test]
    fn test_new_state_manager() {
        let manager = StateManager::new();
        let state = manager.snapshot();

        assert_eq!(state.generation, 0);
        assert_eq!(state.selected, None);
        assert!(state.install_states.is_empty());
    }

    #[test]
    fn test_apply_collection_emits_change() {
        let manager = StateManager::new();

        let changes = manager.apply_collection(&collection(1, &[1, 2]));

        assert_eq!(
            changes,
            vec![StateChange::CollectionChanged {
                generation: 1,
                records: 2
            }]
        );
        assert_eq!(manager.read(|s| s.record_count), 2);
    }

    #[test]
    fn test_same_generation_is_noop() {
        let manager = StateManager::new();
        let games = collection(3, &[1]);

        manager.apply_collection(&games);
        assert!(manager.apply_collection(&games).is_empty());
    }

    #[test]
    fn test_selection_cleared_when_game_disappears() {
        let manager = StateManager::new();
        manager.apply_collection(&collection(1, &[1, 2]));
        manager.select_game(Some(2));

        let changes = manager.apply_collection(&collection(2, &[1]));

        assert!(changes.contains(&StateChange::SelectionChanged { id: None }));
        assert_eq!(manager.read(|s| s.selected), None);
    }

    #[test]
    fn test_install_state_memoized_per_generation() {
        let manager = StateManager::new();
        let games = collection(1, &[7]);
        let record = &games.records[0];
        let calls = Cell::new(0);
        let resolve = |_: &GameRecord| {
            calls.set(calls.get() + 1);
            resolved(Bitness::Bits64)
        };

        let first = manager.install_state(record, 1, resolve);
        let second = manager.install_state(record, 1, resolve);
        assert_eq!(first, second);
        assert_eq!(calls.get(), 1);

        // a newer generation resolves again
        manager.install_state(record, 2, resolve);
        assert_eq!(calls.get(), 2);
    }

    #[test]
    fn test_install_state_prefers_worker_result() {
        let manager = StateManager::new();
        let mut games = collection(1, &[7]);
        games.records[0].specialk.injection = Some(resolved(Bitness::Bits32));

        let install = manager.install_state(&games.records[0], 1, |_| {
            panic!("resolver should not run when the record is already resolved")
        });

        assert_eq!(install.bitness, Bitness::Bits32);
    }

    #[test]
    fn test_memo_pruned_for_removed_games() {
        let manager = StateManager::new();
        let games = collection(1, &[1, 2]);
        manager.apply_collection(&games);
        for record in &games {
            manager.install_state(record, 1, |_| resolved(Bitness::Bits64));
        }

        manager.apply_collection(&collection(2, &[2]));

        let state = manager.snapshot();
        assert!(!state.install_states.contains_key(&1));
        assert!(state.install_states.contains_key(&2));
        assert!(state.memoized(2, 2).is_none());
    }

    #[test]
    fn test_reset() {
        let manager = StateManager::new();
        manager.apply_collection(&collection(1, &[1]));
        manager.select_game(Some(1));

        let changes = manager.reset();

        assert!(changes.iter().any(|c| matches!(c, StateChange::StateReset)));
        assert_eq!(manager.snapshot(), LauncherState::default());
    }

    #[test]
    fn test_subscribe_to_changes() {
        let manager = StateManager::new();
        let mut rx = manager.subscribe();

        manager.select_game(Some(4));

        let event = rx.try_recv();
        assert!(matches!(
            event,
            Ok(StateChange::SelectionChanged { id: Some(4) })
        ));
    }

    #[test]
    fn test_multiple_subscribers() {
        let manager = StateManager::new();
        let mut rx1 = manager.subscribe();
        let mut rx2 = manager.subscribe();

        manager.apply_collection(&collection(1, &[1]));

        assert!(rx1.try_recv().is_ok());
        assert!(rx2.try_recv().is_ok());
    }

    #[test]
    fn test_clone_state_manager() {
        let manager1 = StateManager::new();
        let manager2 = manager1.clone();

        manager1.select_game(Some(10));

        assert_eq!(manager2.snapshot().selected, Some(10));
    }
}
