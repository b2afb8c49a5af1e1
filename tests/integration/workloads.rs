//! Workload integration tests

use parking_lot::Mutex;
use workpool::pool::TaskError;
use workpool::workloads::{fib, sleep, FibTask};
use workpool::{Backend, PoolConfig, PoolError, SchedulingPolicy, TaskPool};

#[test]
fn test_fib_same_sum_for_every_backend() {
    let expected: u64 = fib::random_inputs(200, 25, 99)
        .unwrap()
        .into_iter()
        .map(|n| fib::fib(n).unwrap())
        .sum();

    for backend in [Backend::Threads, Backend::Rayon] {
        for policy in [SchedulingPolicy::StaticChunked, SchedulingPolicy::Dynamic] {
            for parallelism in [1, 3, 16] {
                let config = PoolConfig::new(parallelism)
                    .with_backend(backend)
                    .with_policy(policy);
                let pool = TaskPool::new(config).unwrap();
                assert_eq!(fib::run(&pool, 200, 25, 99).unwrap(), expected);
            }
        }
    }
}

#[test]
fn test_fib_depth_out_of_range() {
    let pool = TaskPool::with_parallelism(2).unwrap();
    let err = pool
        .reduce(&[3, fib::MAX_FIB_INPUT + 1, 4], &FibTask)
        .unwrap_err();
    match err {
        PoolError::TaskFailure { index, source } => {
            assert_eq!(index, 1);
            assert!(matches!(source, TaskError::InputOutOfRange { .. }));
        },
        other => panic!("unexpected error: {:?}", other),
    }
}

#[test]
fn test_sleepers_with_one_worker() {
    let pool = TaskPool::with_parallelism(1).unwrap();
    let out = Mutex::new(Vec::new());
    let report = sleep::run(&pool, "solo", 4, 0, &out).unwrap();
    assert!(report.all_done());
    assert_eq!(pool.stats().peak_parallelism(), 1);

    let text = String::from_utf8(out.into_inner()).unwrap();
    assert!(text.starts_with("started solo\n"));
    assert!(text.ends_with("ended solo\n"));
    assert_eq!(text.matches("finished normally").count(), 4);
}

#[test]
fn test_no_sleepers() {
    let pool = TaskPool::with_parallelism(4).unwrap();
    let out = Mutex::new(Vec::new());
    let report = sleep::run(&pool, "none", 0, 1, &out).unwrap();
    assert!(report.is_empty());
    let text = String::from_utf8(out.into_inner()).unwrap();
    assert_eq!(text, "started none\nended none\n");
}
