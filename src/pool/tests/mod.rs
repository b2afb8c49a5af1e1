//! Task pool unit tests
//!
//! Worker slots, configuration, and the executor across both backends and
//! both scheduling policies.


use crate::pool::{
    task_fn, Backend, PoolConfig, PoolError, SchedulingPolicy, TaskContext, TaskError, TaskPool,
    TaskStatus, WorkerSlot, WorkerState,
};

/// Every backend/policy combination with the given parallelism.
pub(super) fn all_configs(parallelism: usize) -> Vec<PoolConfig> {
    let mut configs = Vec::new();
    for backend in [Backend::Threads, Backend::Rayon] {
        for policy in [SchedulingPolicy::StaticChunked, SchedulingPolicy::Dynamic] {
            configs.push(
                PoolConfig::new(parallelism)
                    .with_backend(backend)
                    .with_policy(policy),
            );
        }
    }
    configs
}

#[cfg(test)]
mod worker_state_tests {
    use super::*;

    #[test]
    fn test_worker_state_roundtrip() {
        for state in [WorkerState::Idle, WorkerState::Running, WorkerState::Done] {
            assert_eq!(WorkerState::from_u8(state.as_u8()), state);
        }
    }

    #[test]
    fn test_worker_slot_lifecycle() {
        let slot = WorkerSlot::new(3);
        assert_eq!(slot.id(), 3);
        assert_eq!(slot.state(), WorkerState::Idle);

        assert!(slot.start());
        assert_eq!(slot.state(), WorkerState::Running);
        slot.record_task();
        slot.record_task();
        assert_eq!(slot.tasks_run(), 2);

        assert!(slot.finish());
        assert_eq!(slot.state(), WorkerState::Done);
    }

    #[test]
    fn test_worker_slot_no_reentry() {
        let slot = WorkerSlot::new(0);
        assert!(!slot.finish());
        assert!(slot.start());
        assert!(!slot.start());
        assert!(slot.finish());
        assert!(!slot.start());
        assert_eq!(slot.state(), WorkerState::Done);
    }
}

#[cfg(test)]
mod pool_config_tests {
    use super::*;

    #[test]
    fn test_pool_config_default() {
        let config = PoolConfig::default();
        assert!(config.parallelism >= 1);
        assert_eq!(config.policy, SchedulingPolicy::Dynamic);
        assert_eq!(config.backend, Backend::Threads);
    }

    #[test]
    fn test_zero_parallelism_rejected() {
        let err = TaskPool::new(PoolConfig::new(0)).unwrap_err();
        assert!(matches!(err, PoolError::InvalidConfig(_)));
    }

    #[test]
    fn test_negative_task_count_rejected() {
        assert_eq!(PoolConfig::task_count(7).unwrap(), 7);
        assert_eq!(PoolConfig::task_count(0).unwrap(), 0);
        assert!(matches!(
            PoolConfig::task_count(-1),
            Err(PoolError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_policy_and_backend_parse() {
        assert_eq!(
            "static-chunked".parse::<SchedulingPolicy>().unwrap(),
            SchedulingPolicy::StaticChunked
        );
        assert_eq!(
            "dynamic".parse::<SchedulingPolicy>().unwrap(),
            SchedulingPolicy::Dynamic
        );
        assert!("guided".parse::<SchedulingPolicy>().is_err());
        assert_eq!("rayon".parse::<Backend>().unwrap(), Backend::Rayon);
        assert_eq!(Backend::Threads.to_string(), "threads");
        assert!("fibers".parse::<Backend>().is_err());
    }

    #[test]
    fn test_pool_config_toml() {
        let config: PoolConfig =
            toml::from_str("parallelism = 3\npolicy = \"static-chunked\"\nbackend = \"rayon\"\n")
                .unwrap();
        assert_eq!(
            config,
            PoolConfig::new(3)
                .with_policy(SchedulingPolicy::StaticChunked)
                .with_backend(Backend::Rayon)
        );
    }
}

#[cfg(test)]
mod reduce_tests {
    use super::*;

    #[test]
    fn test_constant_tasks_sum() {
        let inputs = vec![0; 5];
        for config in all_configs(3) {
            let pool = TaskPool::new(config.clone()).unwrap();
            let sum = pool.reduce(&inputs, &task_fn(|_, _| Ok(1u64))).unwrap();
            assert_eq!(sum, 5, "{:?}", config);
        }
    }

    #[test]
    fn test_empty_run_spawns_nothing() {
        for config in all_configs(4) {
            let pool = TaskPool::new(config).unwrap();
            let sum = pool.reduce(&[], &task_fn(|_, n| Ok(n))).unwrap();
            assert_eq!(sum, 0);
            assert_eq!(pool.stats().runs(), 1);
            assert_eq!(pool.stats().workers_spawned(), 0);
        }
    }

    #[test]
    fn test_no_lost_updates() {
        let inputs = vec![7; 10_000];
        for config in all_configs(8) {
            let pool = TaskPool::new(config).unwrap();
            let sum = pool.reduce(&inputs, &task_fn(|_, n| Ok(n))).unwrap();
            assert_eq!(sum, 70_000);
            assert_eq!(pool.stats().tasks_completed(), 10_000);
        }
    }

    #[test]
    fn test_failure_at_index_two() {
        let inputs = vec![1; 5];
        let task = task_fn(|ctx: TaskContext, n| {
            if ctx.index == 2 {
                Err(TaskError::other("boom"))
            } else {
                Ok(n)
            }
        });
        for config in all_configs(2) {
            let pool = TaskPool::new(config).unwrap();
            let err = pool.reduce(&inputs, &task).unwrap_err();
            assert_eq!(
                err,
                PoolError::TaskFailure {
                    index: 2,
                    source: TaskError::other("boom"),
                }
            );
            assert_eq!(pool.stats().tasks_failed(), 1);
            assert_eq!(pool.stats().tasks_completed(), 4);
        }
    }

    #[test]
    fn test_lowest_failed_index_reported() {
        let inputs: Vec<u64> = (0..50).collect();
        let task = task_fn(|_, n| {
            if n % 10 == 7 {
                Err(TaskError::InputOutOfRange { input: n, max: 6 })
            } else {
                Ok(n)
            }
        });
        for config in all_configs(4) {
            let err = TaskPool::new(config).unwrap().reduce(&inputs, &task).unwrap_err();
            assert!(matches!(err, PoolError::TaskFailure { index: 7, .. }));
        }
    }

    #[test]
    fn test_panicking_task_is_a_failure() {
        let inputs = vec![0, 1, 2];
        let task = task_fn(|_, n| {
            if n == 1 {
                panic!("task exploded");
            }
            Ok(n)
        });
        let pool = TaskPool::with_parallelism(2).unwrap();
        match pool.reduce(&inputs, &task) {
            Err(PoolError::TaskFailure {
                index: 1,
                source: TaskError::Panicked(message),
            }) => assert!(message.contains("task exploded")),
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_sum_overflow() {
        let inputs = vec![u64::MAX, 1];
        let pool = TaskPool::with_parallelism(2).unwrap();
        let err = pool.reduce(&inputs, &task_fn(|_, n| Ok(n))).unwrap_err();
        assert_eq!(err, PoolError::SumOverflow);
    }

    #[test]
    fn test_signed_sum_same_for_every_config() {
        // Inputs 0..6 map to +100 for even indices and -100 for odd ones, so
        // some fold orders pass through values outside i8.
        let inputs: Vec<u64> = (0..7).collect();
        let task = task_fn(|_, n| Ok(if n % 2 == 0 { 100i8 } else { -100i8 }));
        for config in all_configs(3) {
            let pool = TaskPool::new(config.clone()).unwrap();
            assert_eq!(pool.reduce(&inputs, &task).unwrap(), 100, "config {:?}", config);
        }
    }

    #[test]
    fn test_repeated_runs_agree() {
        let inputs: Vec<u64> = (0..200).map(|i| i * 31 % 97).collect();
        let pool = TaskPool::new(PoolConfig::new(6)).unwrap();
        let task = task_fn(|_, n| Ok(n * n));
        let first = pool.reduce(&inputs, &task).unwrap();
        for _ in 0..5 {
            assert_eq!(pool.reduce(&inputs, &task).unwrap(), first);
        }
        assert_eq!(pool.stats().runs(), 6);
    }

    #[test]
    fn test_workers_capped_by_task_count() {
        let pool = TaskPool::new(PoolConfig::new(16)).unwrap();
        let sum = pool.reduce(&[1, 2, 3], &task_fn(|_, n| Ok(n))).unwrap();
        assert_eq!(sum, 6);
        assert_eq!(pool.stats().workers_spawned(), 3);
        assert!(pool.stats().peak_parallelism() <= 3);
    }

    #[test]
    fn test_free_run_function() {
        let sum = crate::pool::run::<_, crate::pool::Sum<u64>>(
            &[2, 4, 6],
            &task_fn(|_, n| Ok(n)),
            PoolConfig::new(2),
        )
        .unwrap();
        assert_eq!(sum, 12);

        let err = crate::pool::run::<_, crate::pool::Sum<u64>>(
            &[1],
            &task_fn(|_, n| Ok(n)),
            PoolConfig::new(0),
        )
        .unwrap_err();
        assert!(matches!(err, PoolError::InvalidConfig(_)));
    }
}

#[cfg(test)]
mod fan_out_tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_three_sleepers_done() {
        let inputs = vec![0; 3];
        let task = task_fn(|_, secs| {
            std::thread::sleep(Duration::from_secs(secs));
            Ok(())
        });
        for config in all_configs(3) {
            let report = TaskPool::new(config).unwrap().fan_out(&inputs, &task).unwrap();
            assert_eq!(report.len(), 3);
            assert_eq!(report.done_count(), 3);
            assert!(report.all_done());
            let indices: Vec<usize> = report.records.iter().map(|r| r.index).collect();
            assert_eq!(indices, vec![0, 1, 2]);
        }
    }

    #[test]
    fn test_failure_recorded_without_aborting_siblings() {
        let inputs: Vec<u64> = (0..6).collect();
        let task = task_fn(|_, n| {
            if n == 4 {
                Err(TaskError::other("no sleep for you"))
            } else {
                Ok(())
            }
        });
        for config in all_configs(2) {
            let report = TaskPool::new(config).unwrap().fan_out(&inputs, &task).unwrap();
            assert_eq!(report.len(), 6);
            assert_eq!(report.done_count(), 5);
            let failed: Vec<_> = report.failures().collect();
            assert_eq!(failed.len(), 1);
            assert_eq!(failed[0].index, 4);
            assert_eq!(
                failed[0].status,
                TaskStatus::Failed {
                    reason: "no sleep for you".to_string()
                }
            );
        }
    }

    #[test]
    fn test_empty_fan_out() {
        let pool = TaskPool::with_parallelism(3).unwrap();
        let report = pool.fan_out(&[], &task_fn(|_, _| Ok(()))).unwrap();
        assert!(report.is_empty());
        assert_eq!(pool.stats().workers_spawned(), 0);
    }

    #[test]
    fn test_static_blocks_stay_on_one_worker() {
        let inputs = vec![0; 9];
        let config = PoolConfig::new(3).with_policy(SchedulingPolicy::StaticChunked);
        let report = TaskPool::new(config)
            .unwrap()
            .fan_out(&inputs, &task_fn(|_, _| Ok(())))
            .unwrap();
        for block in report.records.chunks(3) {
            assert!(block.iter().all(|r| r.worker == block[0].worker));
        }
    }

    #[test]
    fn test_dynamic_tasks_run_concurrently() {
        let inputs = vec![0; 4];
        let barrier = std::sync::Barrier::new(4);
        let task = task_fn(|_, _| {
            barrier.wait();
            Ok(())
        });
        let pool = TaskPool::new(PoolConfig::new(4)).unwrap();
        let report = pool.fan_out(&inputs, &task).unwrap();
        assert!(report.all_done());
        assert_eq!(pool.stats().peak_parallelism(), 4);
    }
}

#[cfg(test)]
mod allocation_failure_tests {
    use super::*;
    use crate::pool::spawn_fault;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[test]
    fn test_spawn_failure_aborts_run() {
        let calls = AtomicUsize::new(0);
        let task = task_fn(|_, n| {
            calls.fetch_add(1, Ordering::SeqCst);
            std::thread::sleep(Duration::from_millis(1));
            Ok(n)
        });
        let inputs = vec![1; 400];
        let pool = TaskPool::new(PoolConfig::new(4)).unwrap();

        spawn_fault::fail_at(Some(2));
        let result = pool.reduce(&inputs, &task);
        spawn_fault::fail_at(None);

        match result {
            Err(PoolError::AllocationFailure(message)) => {
                assert!(message.contains("worker 2"));
            },
            other => panic!("unexpected result: {:?}", other),
        }
        assert_eq!(pool.stats().workers_spawned(), 2);
        // Workers already running stop after their current task.
        assert!(calls.load(Ordering::SeqCst) < inputs.len());
    }

    #[test]
    fn test_first_spawn_failure_runs_nothing() {
        let calls = AtomicUsize::new(0);
        let task = task_fn(|_, _| {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });
        let pool = TaskPool::new(PoolConfig::new(3).with_policy(SchedulingPolicy::StaticChunked))
            .unwrap();

        spawn_fault::fail_at(Some(0));
        let result = pool.fan_out(&[0; 9], &task);
        spawn_fault::fail_at(None);

        assert!(matches!(result, Err(PoolError::AllocationFailure(_))));
        assert_eq!(pool.stats().workers_spawned(), 0);
        assert_eq!(pool.stats().tasks_completed(), 0);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_pool_usable_after_spawn_failure() {
        let pool = TaskPool::with_parallelism(2).unwrap();
        let task = task_fn(|_, n| Ok(n));

        spawn_fault::fail_at(Some(1));
        assert!(pool.reduce(&[1, 2, 3, 4], &task).is_err());
        spawn_fault::fail_at(None);

        assert_eq!(pool.reduce(&[1, 2, 3, 4], &task).unwrap(), 10);
    }
}
