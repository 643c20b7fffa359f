//! Assignment Service Tests
//!
//! Round-robin ordering, concurrency and audit trail behaviour against the
//! in-memory store.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use cohort::experiment::{AssignmentRecord, ExperimentId, Owner};
use cohort::kv::{KvStore, MemoryKvStore};
use cohort::{AssignmentService, Error, RetryPolicy};

fn service() -> AssignmentService<MemoryKvStore> {
    AssignmentService::builder(MemoryKvStore::new())
        .retry_policy(RetryPolicy::immediate())
        .build()
}

// =============================================================================
// Sequential ordering
// =============================================================================

#[tokio::test]
async fn test_sequential_assignments_follow_cycle() {
    for n in [1u32, 2, 3, 5, 8] {
        let service = service();
        let id = service
            .create_experiment(None, "cycle", i64::from(n))
            .await
            .unwrap();

        for i in 0..(3 * n + 1) {
            let group = service.assign_next_group(id, "", "").await.unwrap();
            assert_eq!(group, i % n, "call {i} with {n} groups");
        }
    }
}

#[tokio::test]
async fn test_three_groups_four_calls_scenario() {
    let service = service();
    let id = service
        .create_experiment(Some(Owner::new("owner@example.com")), "Scenario", 3)
        .await
        .unwrap();

    let mut results = Vec::new();
    for i in 0..4 {
        let addr = format!("192.0.2.{i}");
        results.push(service.assign_next_group(id, &addr, "agent").await.unwrap());
    }

    assert_eq!(results, vec![0, 1, 2, 0]);
    assert_eq!(service.experiment(id).await.unwrap().counter(), 1);

    let records = service.assignments(id).await.unwrap();
    let values: Vec<_> = records.iter().map(AssignmentRecord::return_value).collect();
    assert_eq!(values, vec![0, 1, 2, 0]);

    let addrs: Vec<_> = records.iter().map(AssignmentRecord::remote_addr).collect();
    assert_eq!(addrs, vec!["192.0.2.0", "192.0.2.1", "192.0.2.2", "192.0.2.3"]);
    assert!(records.iter().all(|r| r.experiment_id() == id));
    assert!(records.windows(2).all(|w| w[0].created() <= w[1].created()));
}

#[tokio::test]
async fn test_single_group_always_zero() {
    let service = service();
    let id = service.create_experiment(None, "solo", 1).await.unwrap();

    for _ in 0..10 {
        assert_eq!(service.assign_next_group(id, "", "").await.unwrap(), 0);
        assert_eq!(service.experiment(id).await.unwrap().counter(), 0);
    }
}

#[tokio::test]
async fn test_experiments_are_independent() {
    let service = service();
    let a = service.create_experiment(None, "a", 2).await.unwrap();
    let b = service.create_experiment(None, "b", 3).await.unwrap();

    assert_eq!(service.assign_next_group(a, "", "").await.unwrap(), 0);
    assert_eq!(service.assign_next_group(a, "", "").await.unwrap(), 1);
    assert_eq!(service.assign_next_group(b, "", "").await.unwrap(), 0);
    assert_eq!(service.assign_next_group(a, "", "").await.unwrap(), 0);

    assert_eq!(service.assignments(a).await.unwrap().len(), 3);
    assert_eq!(service.assignments(b).await.unwrap().len(), 1);
}

// =============================================================================
// Validation and lookup failures
// =============================================================================

#[tokio::test]
async fn test_create_rejects_non_positive_group_count() {
    let service = service();

    for bad in [0, -1, -100, i64::MIN] {
        let err = service.create_experiment(None, "bad", bad).await.unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)), "group_count {bad}");
    }

    assert!(service.store().kv().is_empty());
}

#[tokio::test]
async fn test_unknown_experiment_leaves_no_trace() {
    let service = service();
    let known = service.create_experiment(None, "known", 2).await.unwrap();
    let unknown = ExperimentId::new();

    let err = service.assign_next_group(unknown, "x", "y").await.unwrap_err();

    assert!(matches!(err, Error::NotFound(id) if id == unknown));
    assert_eq!(service.store().kv().len(), 1);
    assert_eq!(service.store().kv().stream_len(&format!("assignments/{unknown}")), 0);
    assert_eq!(service.experiment(known).await.unwrap().counter(), 0);
}

#[tokio::test]
async fn test_experiment_fields_persisted() {
    let service = service();
    let id = service
        .create_experiment(Some(Owner::new("carol")), "Landing page", 4)
        .await
        .unwrap();

    let experiment = service.experiment(id).await.unwrap();

    assert_eq!(experiment.id(), id);
    assert_eq!(experiment.title(), "Landing page");
    assert_eq!(experiment.owner(), Some(&Owner::new("carol")));
    assert_eq!(experiment.group_count().get(), 4);
    assert!(experiment.created().timestamp() > 0);
}

// =============================================================================
// Concurrency
// =============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn test_concurrent_assignments_cover_every_group_once() {
    for n in [2u32, 3, 16, 64] {
        let service = Arc::new(AssignmentService::new(MemoryKvStore::new()));
        let id = service
            .create_experiment(None, "race", i64::from(n))
            .await
            .unwrap();

        let mut handles = Vec::new();
        for _ in 0..n {
            let service = Arc::clone(&service);
            handles.push(tokio::spawn(async move {
                service.assign_next_group(id, "", "").await.unwrap()
            }));
        }

        let mut groups = Vec::new();
        for handle in handles {
            groups.push(handle.await.unwrap());
        }
        groups.sort_unstable();

        assert_eq!(groups, (0..n).collect::<Vec<_>>(), "{n} groups");
        assert_eq!(service.experiment(id).await.unwrap().counter(), 0);
        assert_eq!(service.assignments(id).await.unwrap().len(), n as usize);
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn test_concurrent_laps_balance_groups() {
    const GROUPS: u32 = 5;
    const LAPS: u32 = 20;

    let service = Arc::new(service());
    let id = service
        .create_experiment(None, "laps", i64::from(GROUPS))
        .await
        .unwrap();

    let mut handles = Vec::new();
    for _ in 0..(GROUPS * LAPS) {
        let service = Arc::clone(&service);
        handles.push(tokio::spawn(async move {
            service.assign_next_group(id, "", "").await.unwrap()
        }));
    }

    let mut counts = [0u32; GROUPS as usize];
    for handle in handles {
        counts[handle.await.unwrap() as usize] += 1;
    }

    assert_eq!(counts, [LAPS; GROUPS as usize]);
    assert_eq!(service.experiment(id).await.unwrap().counter(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn test_concurrent_single_group_stays_zero() {
    let service = Arc::new(service());
    let id = service.create_experiment(None, "solo", 1).await.unwrap();

    let mut handles = Vec::new();
    for _ in 0..50 {
        let service = Arc::clone(&service);
        handles.push(tokio::spawn(async move {
            service.assign_next_group(id, "", "").await.unwrap()
        }));
    }

    for handle in handles {
        assert_eq!(handle.await.unwrap(), 0);
    }
    assert_eq!(service.experiment(id).await.unwrap().counter(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_counter_never_observed_out_of_range() {
    const GROUPS: u32 = 3;

    let service = Arc::new(service());
    let id = service
        .create_experiment(None, "observe", i64::from(GROUPS))
        .await
        .unwrap();
    let done = Arc::new(AtomicBool::new(false));

    let reader = {
        let service = Arc::clone(&service);
        let done = Arc::clone(&done);
        tokio::spawn(async move {
            let mut reads = 0u32;
            while !done.load(Ordering::Acquire) {
                let experiment = service.experiment(id).await.unwrap();
                assert!(experiment.counter() < GROUPS);
                reads += 1;
                tokio::task::yield_now().await;
            }
            reads
        })
    };

    let mut writers = Vec::new();
    for _ in 0..4 {
        let service = Arc::clone(&service);
        writers.push(tokio::spawn(async move {
            for _ in 0..25 {
                service.assign_next_group(id, "", "").await.unwrap();
            }
        }));
    }
    for writer in writers {
        writer.await.unwrap();
    }
    done.store(true, Ordering::Release);

    assert!(reader.await.unwrap() > 0);
    // 100 assignments = 33 full laps + 1
    assert_eq!(service.experiment(id).await.unwrap().counter(), 1);
}

#[tokio::test]
async fn test_store_is_shared_through_kv_trait() {
    let service = service();
    let id = service.create_experiment(None, "raw", 2).await.unwrap();

    let raw = service
        .store()
        .kv()
        .get(&format!("experiment/{id}"))
        .await
        .unwrap()
        .unwrap();
    let document: serde_json::Value = serde_json::from_slice(&raw.value).unwrap();

    assert_eq!(raw.version, 1);
    assert_eq!(document["counter"], 0);
    assert_eq!(document["group_count"], 2);
    assert_eq!(document["title"], "raw");
}
