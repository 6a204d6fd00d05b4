//! Property tests for the interaction cache over random operation sequences

use proptest::prelude::*;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use gigwork::writeback::WriteBack;
use gigwork::{CacheError, InteractionCache, MemoryReconsiderationStore, Policies};

#[derive(Debug, Clone)]
enum Op {
    Applied(String),
    Rejected(String),
    RejectedFast(String),
    Reconsidered(String),
    Mode(bool),
}

fn arb_job_id() -> impl Strategy<Value = String> {
    prop::sample::select(&["J1", "J2", "J3", "J4", "J5"][..]).prop_map(str::to_string)
}

fn arb_op() -> impl Strategy<Value = Op> {
    prop_oneof![
        arb_job_id().prop_map(Op::Applied),
        arb_job_id().prop_map(Op::Rejected),
        arb_job_id().prop_map(Op::RejectedFast),
        arb_job_id().prop_map(Op::Reconsidered),
        any::<bool>().prop_map(Op::Mode),
    ]
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Last {
    Applied,
    Rejected,
}

/// Apply `ops` then the mode `toggles` to a fresh cache.
///
/// Returns the cache plus the last mark per job and every reconsidered id.
/// The actor stops with the runtime; its last snapshot stays readable.
fn run(ops: &[Op], toggles: &[bool]) -> (InteractionCache, HashMap<String, Last>, HashSet<String>) {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap();
    runtime.block_on(async {
        let cache = InteractionCache::spawn(
            Arc::new(MemoryReconsiderationStore::new()),
            WriteBack::new(),
            Policies::default(),
            256,
        );
        let mut last = HashMap::new();
        let mut reconsidered = HashSet::new();
        for op in ops {
            match op {
                Op::Applied(id) => {
                    cache.mark_applied(id).await.unwrap();
                    last.insert(id.clone(), Last::Applied);
                }
                Op::Rejected(id) => {
                    cache.mark_rejected(id).await.unwrap();
                    last.insert(id.clone(), Last::Rejected);
                }
                Op::RejectedFast(id) => {
                    match cache.mark_rejected_fast(id) {
                        Ok(()) => {}
                        Err(CacheError::Busy) => cache.mark_rejected(id).await.unwrap(),
                        Err(e) => panic!("fast path failed: {}", e),
                    }
                    last.insert(id.clone(), Last::Rejected);
                }
                Op::Reconsidered(id) => {
                    cache.mark_reconsidered(id).await.unwrap();
                    reconsidered.insert(id.clone());
                }
                Op::Mode(enabled) => cache.set_reconsideration_mode(*enabled).await.unwrap(),
            }
            check_partition(&cache);
        }
        // An awaited command drains any fast-path writes still queued
        cache.set_reconsideration_mode(true).await.unwrap();
        for enabled in toggles {
            cache.set_reconsideration_mode(*enabled).await.unwrap();
            check_partition(&cache);
        }
        (cache, last, reconsidered)
    })
}

fn check_partition(cache: &InteractionCache) {
    let snapshot = cache.snapshot();
    for id in ["J1", "J2", "J3", "J4", "J5"] {
        assert!(!(snapshot.is_applied(id) && snapshot.is_rejected(id)), "{} in both sets", id);
        assert_eq!(
            snapshot.is_processed(id),
            snapshot.is_applied(id) || snapshot.is_rejected(id),
            "processed view out of step for {}",
            id
        );
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// Every published snapshot keeps the sets disjoint and processed = applied + rejected
    #[test]
    fn prop_snapshots_stay_partitioned(ops in prop::collection::vec(arb_op(), 0..40)) {
        let (cache, _, _) = run(&ops, &[]);
        check_partition(&cache);
    }

    /// The last mark on each job decides its bucket
    #[test]
    fn prop_last_write_wins(ops in prop::collection::vec(arb_op(), 0..40)) {
        let (cache, last, _) = run(&ops, &[]);
        let snapshot = cache.snapshot();
        for (id, mark) in &last {
            prop_assert_eq!(snapshot.is_applied(id), *mark == Last::Applied);
            prop_assert_eq!(snapshot.is_rejected(id), *mark == Last::Rejected);
        }
        prop_assert_eq!(snapshot.applied_count() + snapshot.rejected_count(), last.len());
    }

    /// Reconsidered jobs are never offered again, whatever the mode history
    #[test]
    fn prop_reconsidered_never_eligible(
        ops in prop::collection::vec(arb_op(), 0..40),
        toggles in prop::collection::vec(any::<bool>(), 0..6),
    ) {
        let (cache, _, reconsidered) = run(&ops, &toggles);
        let eligible: HashSet<String> = cache.eligible_for_reconsideration().into_iter().collect();
        prop_assert!(eligible.is_disjoint(&reconsidered));
    }
}

#[test]
fn test_applied_rejected_applied_converges() {
    let ops = vec![
        Op::Applied("J1".to_string()),
        Op::Rejected("J1".to_string()),
        Op::Applied("J1".to_string()),
    ];
    let (cache, _, _) = run(&ops, &[]);
    let snapshot = cache.snapshot();
    assert!(snapshot.is_applied("J1"));
    assert!(!snapshot.is_rejected("J1"));
    assert_eq!(snapshot.applied_count(), 1);
    assert_eq!(snapshot.rejected_count(), 0);
}
