//! Stress helpers for nnmeta.
//!
//! These run many workers against one [`TestCluster`], each with its own
//! entity manager, to exercise conflict detection and the retry path.

use crate::fixtures::{scenarios, TestCluster};
use nnmeta_core::counters::{next_counter_value, CounterId};
use nnmeta_core::{CoreError, INodeFinder, INodeListFinder, OperationKind};
use nnmeta_storage::INode;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

/// Result of a stress test run.
#[derive(Debug, Clone)]
pub struct StressTestResult {
    /// Total operations performed.
    pub total_ops: usize,
    /// Successful operations.
    pub successful_ops: usize,
    /// Failed operations.
    pub failed_ops: usize,
    /// Total duration.
    pub duration: Duration,
    /// Operations per second.
    pub ops_per_second: f64,
}

impl StressTestResult {
    /// Creates a new result.
    pub fn new(successful: usize, failed: usize, duration: Duration) -> Self {
        let total = successful + failed;
        let ops_per_second = if duration.as_secs_f64() > 0.0 {
            total as f64 / duration.as_secs_f64()
        } else {
            0.0
        };

        Self {
            total_ops: total,
            successful_ops: successful,
            failed_ops: failed,
            duration,
            ops_per_second,
        }
    }

    /// Prints a summary of the test.
    pub fn print_summary(&self, name: &str) {
        println!("\n=== {} ===", name);
        println!("Total operations: {}", self.total_ops);
        println!("Successful: {}", self.successful_ops);
        println!("Failed: {}", self.failed_ops);
        println!("Duration: {:?}", self.duration);
        println!("Throughput: {:.2} ops/sec", self.ops_per_second);
    }
}

/// Configuration for stress tests.
#[derive(Debug, Clone)]
pub struct StressConfig {
    /// Operations per thread.
    pub operations: usize,
    /// Number of concurrent threads.
    pub threads: usize,
}

impl Default for StressConfig {
    fn default() -> Self {
        Self {
            operations: 200,
            threads: 4,
        }
    }
}

fn run_threads<F>(config: &StressConfig, work: F) -> StressTestResult
where
    F: Fn(usize, usize) -> Result<(), CoreError> + Send + Sync + 'static,
{
    let work = Arc::new(work);
    let successful = Arc::new(AtomicUsize::new(0));
    let failed = Arc::new(AtomicUsize::new(0));
    let operations = config.operations;

    let start = Instant::now();
    let handles: Vec<_> = (0..config.threads)
        .map(|t| {
            let work = Arc::clone(&work);
            let successful = Arc::clone(&successful);
            let failed = Arc::clone(&failed);
            thread::spawn(move || {
                for i in 0..operations {
                    match work(t, i) {
                        Ok(()) => {
                            successful.fetch_add(1, Ordering::Relaxed);
                        }
                        Err(_) => {
                            failed.fetch_add(1, Ordering::Relaxed);
                        }
                    }
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().expect("Thread panicked");
    }

    StressTestResult::new(
        successful.load(Ordering::Relaxed),
        failed.load(Ordering::Relaxed),
        start.elapsed(),
    )
}

/// Increments the generation stamp counter from every thread at once.
///
/// Every successful increment is committed exactly once, so the final
/// counter value equals `successful_ops`.
pub fn stress_counter_increments(cluster: &TestCluster, config: &StressConfig) -> StressTestResult {
    let store = cluster.store.clone();
    run_threads(config, move |_, _| {
        let mut em = store.entity_manager();
        store
            .transactional(OperationKind::SetGenerationStamp)
            .handle(&mut em, |em| next_counter_value(em, CounterId::GenerationStamp))
            .map(drop)
    })
}

/// Lists directories of a populated namespace from every thread.
pub fn stress_namespace_reads(cluster: &TestCluster, config: &StressConfig) -> StressTestResult {
    const DIRS: i64 = 8;
    const FILES: i64 = 4;
    scenarios::populated_namespace(cluster, DIRS, FILES);

    let store = cluster.store.clone();
    run_threads(config, move |t, i| {
        let mut em = store.entity_manager();
        let dir = scenarios::ROOT_ID + 1 + ((t + i) as i64 % DIRS) * (FILES + 1);
        store
            .transactional(OperationKind::GetListing)
            .handle(&mut em, |em| {
                let parent = em.find::<INode>(&INodeFinder::ById(dir))?;
                let children = em.find_list::<INode>(&INodeListFinder::ByParentId(dir))?;
                if parent.is_none() || children.is_empty() {
                    return Err(CoreError::domain(format!("directory {dir} incomplete")));
                }
                Ok(())
            })
    })
}

/// Creates and deletes private directories, aborting every third
/// transaction.
///
/// Each thread works under its own parent, so no two transactions write the
/// same row.
pub fn stress_create_delete(cluster: &TestCluster, config: &StressConfig) -> StressTestResult {
    let store = cluster.store.clone();
    run_threads(config, move |t, i| {
        let mut em = store.entity_manager();
        let parent = 1_000 + t as i64;
        let id = parent * 100_000 + i as i64;
        store
            .transactional(OperationKind::Mkdirs)
            .handle(&mut em, |em| {
                let dir = em.add(INode::directory(id, format!("d{i}"), parent))?;
                if i % 3 == 0 {
                    return Err(CoreError::invalid_operation("aborted"));
                }
                if i % 3 == 1 {
                    em.remove(&*dir)?;
                }
                Ok(())
            })
            .or_else(|err| match err {
                CoreError::InvalidOperation { .. } => Ok(()),
                other => Err(other),
            })
    })
}

/// Observations of a concurrent election run.
#[derive(Debug, Clone)]
pub struct ElectionStressResult {
    /// Final id of each namenode thread.
    pub final_ids: Vec<i64>,
    /// Leader seen by each thread after each of its rounds.
    pub observed_leaders: Vec<Vec<i64>>,
    /// Rounds that failed after retries.
    pub failed_rounds: usize,
}

/// Runs `threads` namenodes heartbeating `rounds` times concurrently.
pub fn stress_concurrent_election(
    cluster: &TestCluster,
    threads: usize,
    rounds: usize,
) -> ElectionStressResult {
    let failed = Arc::new(AtomicUsize::new(0));
    let handles: Vec<_> = (0..threads)
        .map(|t| {
            let mut nn = cluster.namenode(&format!("nn{t}:8020"));
            let failed = Arc::clone(&failed);
            thread::spawn(move || {
                let mut leaders = Vec::with_capacity(rounds);
                for round in 0..rounds {
                    let result = if round == 0 {
                        nn.election.initialize(&mut nn.em)
                    } else {
                        nn.election.heartbeat(&mut nn.em)
                    };
                    match result {
                        Ok(leader) => leaders.push(leader),
                        Err(_) => {
                            failed.fetch_add(1, Ordering::Relaxed);
                        }
                    }
                }
                (nn.id(), leaders)
            })
        })
        .collect();

    let (final_ids, observed_leaders) = handles
        .into_iter()
        .map(|handle| handle.join().expect("Thread panicked"))
        .unzip();

    ElectionStressResult {
        final_ids,
        observed_leaders,
        failed_rounds: failed.load(Ordering::Relaxed),
    }
}
