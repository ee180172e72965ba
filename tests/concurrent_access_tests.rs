/// Concurrent access tests
///
/// Competing writers against one record store.
/// Run with: cargo test --test concurrent_access_tests
use chrono::NaiveDate;
use futures::future::join_all;
use mortuary::occupancy::{ChamberTarget, NewChamber, NewDeceased};
use mortuary::{
    Chamber, ChamberName, Database, DatabaseOptions, MortuaryError, OccupancyManager, StoreError,
};
use std::sync::Arc;
use tokio::sync::Barrier;

fn name(raw: &str) -> ChamberName {
    raw.parse().unwrap()
}

fn person(first_name: String) -> NewDeceased {
    NewDeceased {
        first_name,
        last_name: "Concurrent".to_string(),
        date_of_birth: None,
        date_of_death: NaiveDate::from_ymd_opt(2025, 1, 15).unwrap(),
        cause_of_death: None,
        target: None,
    }
}

/// One chamber plus `waiting` unplaced records.
///
/// Every placement commit writes the chamber row, so a writer can lose at most
/// `capacity` commits to it; that many retries let every contender see a
/// final answer instead of a write conflict.
async fn setup(capacity: u32, waiting: usize) -> (OccupancyManager, Vec<uuid::Uuid>) {
    let db = Database::open(DatabaseOptions::in_memory().commit_retries(capacity)).unwrap();
    let manager = OccupancyManager::new(db);
    manager
        .create_chamber(NewChamber {
            name: name("A"),
            capacity,
            status: None,
        })
        .await
        .unwrap();

    let mut ids = Vec::with_capacity(waiting);
    for i in 0..waiting {
        let record = manager
            .create_deceased(person(format!("Waiting{i}")))
            .await
            .unwrap();
        ids.push(record.id);
    }
    (manager, ids)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_two_assignments_race_for_last_unit() {
    let (manager, ids) = setup(1, 2).await;
    let barrier = Arc::new(Barrier::new(ids.len()));

    let handles = ids.iter().map(|&id| {
        let manager = manager.clone();
        let barrier = Arc::clone(&barrier);
        tokio::spawn(async move {
            barrier.wait().await;
            manager.assign(id, ChamberTarget::Named(name("A"))).await
        })
    });

    let results: Vec<_> = join_all(handles)
        .await
        .into_iter()
        .map(|joined| joined.unwrap())
        .collect();

    let succeeded = results.iter().filter(|result| result.is_ok()).count();
    assert_eq!(succeeded, 1, "exactly one assignment must win");

    for err in results.iter().filter_map(|result| result.as_ref().err()) {
        assert!(
            matches!(err, MortuaryError::ChamberUnavailable { .. }),
            "loser should see a full chamber, got {err:?}"
        );
    }

    let chamber = manager.get_chamber(name("A")).await.unwrap().chamber;
    assert_eq!(chamber.current_occupancy, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_many_writers_never_oversubscribe() {
    let capacity = 5;
    let (manager, ids) = setup(capacity, 12).await;
    let barrier = Arc::new(Barrier::new(ids.len()));

    let handles = ids.iter().map(|&id| {
        let manager = manager.clone();
        let barrier = Arc::clone(&barrier);
        tokio::spawn(async move {
            barrier.wait().await;
            manager.assign(id, ChamberTarget::AnyAvailable).await
        })
    });

    let results: Vec<_> = join_all(handles)
        .await
        .into_iter()
        .map(|joined| joined.unwrap())
        .collect();

    let placed: Vec<u32> = results
        .iter()
        .filter_map(|result| result.as_ref().ok())
        .filter_map(|record| record.placement.map(|p| p.unit))
        .collect();
    assert_eq!(placed.len(), capacity as usize, "every unit should be filled");

    let losers: Vec<_> = results
        .iter()
        .filter_map(|result| result.as_ref().err())
        .collect();
    assert_eq!(losers.len(), ids.len() - capacity as usize);
    for err in losers {
        assert!(
            matches!(err, MortuaryError::AllChambersUnavailable),
            "loser should see no accepting chamber, got {err:?}"
        );
    }

    let mut units = placed.clone();
    units.sort_unstable();
    units.dedup();
    assert_eq!(units.len(), placed.len(), "a unit was handed out twice");

    let chamber = manager.get_chamber(name("A")).await.unwrap().chamber;
    assert_eq!(chamber.current_occupancy as usize, placed.len());
}

#[tokio::test]
async fn test_interleaved_transactions_conflict_at_commit() {
    let db = Database::open(DatabaseOptions::in_memory().commit_retries(0)).unwrap();
    let manager = OccupancyManager::new(db.clone());
    manager
        .create_chamber(NewChamber {
            name: name("A"),
            capacity: 3,
            status: None,
        })
        .await
        .unwrap();

    let mut first = db.begin().await;
    let mut second = db.begin().await;

    for txn in [&mut first, &mut second] {
        let mut chamber = txn.tables().chamber(name("A")).cloned().unwrap();
        chamber.capacity += 1;
        txn.update_chamber(chamber).unwrap();
    }

    db.commit(first).await.unwrap();
    let err = db.commit(second).await.unwrap_err();
    assert!(matches!(err, StoreError::SerializationFailure { .. }));

    let chamber = manager.get_chamber(name("A")).await.unwrap().chamber;
    assert_eq!(chamber.capacity, 4);
    assert_eq!(db.stats().conflicts, 1);
}

#[tokio::test]
async fn test_stale_transaction_loses_to_committed_writer() {
    let db = Database::in_memory();

    let mut stale = db.begin().await;
    db.transaction(|txn| txn.insert_chamber(Chamber::new(name("C"), 1, None)))
        .await
        .unwrap();

    // The stale copy has no chamber C yet, so the insert passes locally.
    stale
        .insert_chamber(Chamber::new(name("C"), 7, None))
        .unwrap();
    let err = MortuaryError::from(db.commit(stale).await.unwrap_err());
    assert!(err.is_retryable());
    let capacity = db
        .read(|tables| tables.chamber(name("C")).map(|chamber| chamber.capacity))
        .await;
    assert_eq!(capacity, Some(1));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_unrelated_writers_commit_without_retries() {
    let db = Database::open(DatabaseOptions::in_memory().commit_retries(0)).unwrap();
    let manager = OccupancyManager::new(db.clone());
    let writers = 32;
    let barrier = Arc::new(Barrier::new(writers));

    let handles = (0..writers).map(|i| {
        let manager = manager.clone();
        let barrier = Arc::clone(&barrier);
        tokio::spawn(async move {
            barrier.wait().await;
            manager.create_deceased(person(format!("Intake{i}"))).await
        })
    });

    for joined in join_all(handles).await {
        let result = joined.unwrap();
        assert!(result.is_ok(), "unrelated insert failed: {result:?}");
    }

    assert_eq!(manager.list_deceased(Default::default()).await.len(), writers);
    assert_eq!(db.version().await, writers as u64);
    assert_eq!(db.stats().conflicts, 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_reads_see_committed_state() {
    let (manager, _) = setup(2, 0).await;

    let handles = (0..8).map(|_| {
        let manager = manager.clone();
        tokio::spawn(async move {
            for _ in 0..50 {
                let chambers = manager.list_chambers().await;
                assert_eq!(chambers.len(), 1);
                assert_eq!(chambers[0].available_units.len(), 2);
            }
        })
    });

    for handle in join_all(handles).await {
        handle.unwrap();
    }
}
