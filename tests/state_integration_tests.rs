//! Integration tests for StateManager with state change events
//!
//! These tests verify that the StateManager correctly:
//! - Emits state change events when collections and selections change
//! - Supports multiple subscribers
//! - Handles concurrent access from multiple threads
//! - Tracks collections published by a live refresh worker

use skif::models::{Collection, GameRecord, StoreOrigin};
use skif::publisher::{PublisherOptions, SnapshotPublisher};
use skif::services::{CatalogCollector, CollectorError, CollectorPriority};
use skif::{StateChange, StateManager};
use std::sync::Arc;
use tokio::time::{Duration, timeout};

fn collection(generation: u64, count: u64) -> Collection {
    let mut collection = Collection::new();
    for id in 0..count {
        collection.push(GameRecord::new(id, StoreOrigin::Epic, format!("Game {id}"), "/games"));
    }
    collection.generation = generation;
    collection
}

struct Growing {
    count: u64,
}

impl CatalogCollector for Growing {
    fn name(&self) -> &str {
        "growing"
    }

    fn priority(&self) -> CollectorPriority {
        CollectorPriority::Storefront
    }

    fn collect(&mut self, out: &mut Collection) -> Result<(), CollectorError> {
        self.count += 1;
        for id in 0..self.count {
            out.push(GameRecord::new(id, StoreOrigin::Gog, "growing", "/games"));
        }
        Ok(())
    }
}

#[tokio::test]
async fn test_collection_change_event_emitted() {
    let state = Arc::new(StateManager::new());
    let mut rx = state.subscribe();

    state.apply_collection(&collection(1, 3));

    let event = timeout(Duration::from_millis(100), rx.recv())
        .await
        .expect("Timeout waiting for event")
        .expect("Channel closed");

    assert_eq!(
        event,
        StateChange::CollectionChanged {
            generation: 1,
            records: 3
        }
    );
}

#[tokio::test]
async fn test_multiple_subscribers_receive_events() {
    let state = Arc::new(StateManager::new());
    let mut rx1 = state.subscribe();
    let mut rx2 = state.subscribe();
    let mut rx3 = state.subscribe();

    state.select_game(Some(9));

    for rx in [&mut rx1, &mut rx2, &mut rx3] {
        let event = timeout(Duration::from_millis(100), rx.recv())
            .await
            .expect("Timeout")
            .expect("Channel closed");
        assert_eq!(event, StateChange::SelectionChanged { id: Some(9) });
    }
}

#[tokio::test]
async fn test_event_sequence_for_library_update() {
    let state = Arc::new(StateManager::new());
    let mut rx = state.subscribe();

    state.apply_collection(&collection(1, 2));
    state.select_game(Some(1));
    state.apply_collection(&collection(2, 1));
    state.reset();

    let mut events = Vec::new();
    while let Ok(Ok(event)) = timeout(Duration::from_millis(50), rx.recv()).await {
        events.push(event);
    }

    assert_eq!(
        events,
        vec![
            StateChange::CollectionChanged {
                generation: 1,
                records: 2
            },
            StateChange::SelectionChanged { id: Some(1) },
            StateChange::CollectionChanged {
                generation: 2,
                records: 1
            },
            StateChange::SelectionChanged { id: None },
            StateChange::CollectionChanged {
                generation: 0,
                records: 0
            },
            StateChange::StateReset,
        ]
    );
}

#[tokio::test]
async fn test_concurrent_selection_updates() {
    let state = Arc::new(StateManager::new());

    let mut handles = Vec::new();
    for id in 0..10u64 {
        let state = Arc::clone(&state);
        handles.push(tokio::task::spawn_blocking(move || {
            for _ in 0..100 {
                state.select_game(Some(id));
            }
        }));
    }

    for handle in handles {
        handle.await.unwrap();
    }

    let selected = state.snapshot().selected;
    assert!(matches!(selected, Some(id) if id < 10));
}

#[tokio::test]
async fn test_tracks_live_publisher() {
    let state = StateManager::new();
    let mut rx = state.subscribe();

    let (publisher, mut reader) = SnapshotPublisher::spawn(
        vec![Box::new(Growing { count: 0 })],
        PublisherOptions::default(),
    )
    .unwrap();

    for expected in 1..=3u64 {
        publisher.request_refresh();

        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        while reader.get_latest().generation < expected {
            assert!(tokio::time::Instant::now() < deadline, "cycle {expected} never published");
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        state.apply_collection(&reader.get_latest());

        let event = timeout(Duration::from_millis(100), rx.recv())
            .await
            .expect("Timeout")
            .expect("Channel closed");
        assert_eq!(
            event,
            StateChange::CollectionChanged {
                generation: expected,
                records: expected as usize
            }
        );
    }
}
