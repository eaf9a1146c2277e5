/*!
 * Scheduler Tests
 * Dispatch order, preemption, lifecycle and concurrency of the CFS scheduler
 */

use cfs_kernel::scheduler::RunQueue;
use cfs_kernel::{
    Membership, ProcessState, Scheduler, SchedulerConfig, SchedulerError, TickOutcome, WaitStatus,
};
use pretty_assertions::assert_eq;
use proptest::prelude::*;
use std::thread;
use std::time::Duration;

fn scheduler(ncpu: usize) -> Scheduler {
    Scheduler::new(SchedulerConfig::default().with_ncpu(ncpu)).unwrap()
}

#[test]
fn test_select_runnable_among_mixed_states() {
    let mut rq = RunQueue::with_membership(8, Membership::IncludeRunning);
    let mut ids = Vec::new();
    for (name, key) in [("a", 3), ("b", 1), ("c", 5)] {
        let id = rq.procs_mut().alloc(name, None, 0).unwrap();
        rq.set_vruntime(id, key).unwrap();
        rq.procs_mut().set_state(id, ProcessState::Runnable).unwrap();
        rq.insert(id).unwrap();
        ids.push(id);
    }

    // b blocks but stays linked
    rq.procs_mut().set_state(ids[1], ProcessState::Running).unwrap();
    rq.procs_mut().set_state(ids[1], ProcessState::Sleeping).unwrap();

    let picked = rq.select_next_runnable().unwrap();
    assert_eq!(rq.procs().get(picked).vruntime(), 3);
    assert_eq!(picked, ids[0]);
}

#[test]
fn test_dispatch_order_follows_vruntime() {
    let s = scheduler(1);
    let a = s.spawn("a", None, 0).unwrap();
    let b = s.spawn("b", None, 0).unwrap();
    let c = s.spawn("c", None, 0).unwrap();

    let quantum = s.config().quantum();
    let mut order = vec![s.schedule(0).unwrap().unwrap()];
    for _ in 0..5 {
        order.push(s.tick(0, quantum).unwrap().running().unwrap());
    }
    assert_eq!(order, vec![a, b, c, a, b, c]);
}

#[test]
fn test_multi_cpu_dispatch_is_disjoint() {
    let s = scheduler(2);
    let a = s.spawn("a", None, 0).unwrap();
    let b = s.spawn("b", None, 0).unwrap();

    assert_eq!(s.schedule(0), Ok(Some(a)));
    assert_eq!(s.schedule(1), Ok(Some(b)));
    assert_eq!(s.runnable_len(), 0);

    // Nothing else to run: each keeps its CPU after a full quantum
    let quantum = s.config().quantum();
    assert_eq!(s.tick(0, quantum), Ok(TickOutcome::Continue(a)));
    assert_eq!(s.tick(1, quantum), Ok(TickOutcome::Continue(b)));
}

#[test]
fn test_woken_sleeper_does_not_monopolize() {
    let s = scheduler(1);
    let sleeper = s.spawn("sleeper", None, 0).unwrap();
    let worker = s.spawn("worker", None, 0).unwrap();

    assert_eq!(s.schedule(0), Ok(Some(sleeper)));
    assert_eq!(s.sleep(0, 5), Ok(Some(worker)));
    for _ in 0..100 {
        s.tick(0, Duration::from_millis(1)).unwrap();
    }
    s.wakeup(5).unwrap();

    // Placed at min_vruntime instead of keeping its stale low key
    let info = s.process_info(sleeper).unwrap();
    assert_eq!(info.vruntime, s.min_vruntime());
    assert!(info.vruntime > 0);
}

#[test]
fn test_full_lifecycle() {
    let s = scheduler(1);
    let init = s.spawn("init", None, 0).unwrap();
    let child = s.spawn("child", Some(init), 0).unwrap();

    assert_eq!(s.schedule(0), Ok(Some(init)));
    assert_eq!(s.wait(0), Ok(WaitStatus::Sleeping));
    assert_eq!(s.current(0), Ok(Some(child)));

    assert_eq!(s.exit(0, 42), Ok(Some(init)));
    assert_eq!(
        s.wait(0),
        Ok(WaitStatus::Reaped {
            pid: child,
            exit_status: 42
        })
    );
    assert_eq!(s.process_count(), 1);
    assert!(s.check_invariants().is_ok());
}

#[test]
fn test_table_full() {
    let s = Scheduler::new(SchedulerConfig::default().with_nproc(2)).unwrap();
    s.spawn("a", None, 0).unwrap();
    s.spawn("b", None, 0).unwrap();
    assert_eq!(s.spawn("c", None, 0), Err(SchedulerError::TableFull(2)));
    assert!(!s.is_halted());
}

#[test]
fn test_threads_share_one_domain() {
    let s = scheduler(4);
    let handles: Vec<_> = (0..4)
        .map(|t| {
            let s = s.clone();
            thread::spawn(move || {
                for i in 0..8 {
                    s.spawn(&format!("t{}-{}", t, i), None, 0).unwrap();
                }
                for _ in 0..100 {
                    s.tick(t, Duration::from_millis(2)).unwrap();
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(s.process_count(), 32);
    assert!(s.check_invariants().is_ok());
    let stats = s.stats();
    assert!(stats.total_scheduled >= 4);
    assert_eq!(stats.runnable, 28);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_async_cpus_drain_workload() {
    let s = scheduler(2);
    let init = s.spawn("init", None, 0).unwrap();
    for i in 0..6 {
        s.spawn(&format!("w{}", i), Some(init), 0).unwrap();
    }

    let tasks: Vec<_> = (0..2)
        .map(|cpu| {
            let s = s.clone();
            tokio::spawn(async move {
                for _ in 0..2_000 {
                    let outcome = s.tick(cpu, Duration::from_millis(1)).unwrap();
                    match outcome.running() {
                        Some(pid) if pid == init => {
                            if s.wait(cpu).unwrap() == WaitStatus::NoChildren {
                                return;
                            }
                        }
                        Some(pid) => {
                            if s.process_info(pid).unwrap().cpu_time() >= Duration::from_millis(20) {
                                s.exit(cpu, 0).unwrap();
                            }
                        }
                        None if !s.has_children(init) => return,
                        None => {}
                    }
                    tokio::task::yield_now().await;
                }
            })
        })
        .collect();
    for task in tasks {
        task.await.unwrap();
    }

    assert!(!s.has_children(init));
    assert_eq!(s.process_count(), 1);
    assert!(s.check_invariants().is_ok());
}

#[derive(Debug, Clone)]
enum Op {
    Spawn(i8),
    Tick(usize, u64),
    Yield(usize),
    Sleep(usize, u64),
    Wakeup(u64),
    Exit(usize),
    Kill(u32),
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        3 => (-20i8..20).prop_map(Op::Spawn),
        6 => (0usize..2, 1u64..15_000).prop_map(|(c, us)| Op::Tick(c, us)),
        1 => (0usize..2).prop_map(Op::Yield),
        2 => (0usize..2, 0u64..3).prop_map(|(c, ch)| Op::Sleep(c, ch)),
        2 => (0u64..3).prop_map(Op::Wakeup),
        1 => (0usize..2).prop_map(Op::Exit),
        1 => (1u32..20).prop_map(Op::Kill),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn prop_random_ops_keep_invariants(
        ops in prop::collection::vec(op_strategy(), 1..150),
        include_running in any::<bool>(),
    ) {
        let membership = if include_running {
            Membership::IncludeRunning
        } else {
            Membership::RunnableOnly
        };
        let config = SchedulerConfig::default()
            .with_ncpu(2)
            .with_nproc(16)
            .with_membership(membership);
        let s = Scheduler::new(config).unwrap();
        let mut last_min = 0;

        for op in ops {
            let result = match op {
                Op::Spawn(nice) => s.spawn("p", None, nice).map(|_| ()),
                Op::Tick(cpu, us) => s.tick(cpu, Duration::from_micros(us)).map(|_| ()),
                Op::Yield(cpu) => s.yield_cpu(cpu).map(|_| ()),
                Op::Sleep(cpu, chan) => s.sleep(cpu, chan).map(|_| ()),
                Op::Wakeup(chan) => s.wakeup(chan).map(|_| ()),
                Op::Exit(cpu) => s.exit(cpu, 0).map(|_| ()),
                Op::Kill(pid) => s.kill(pid),
            };
            if let Err(e) = result {
                prop_assert!(!e.is_fatal(), "fatal error {:?}", e);
            }

            prop_assert!(s.check_invariants().is_ok());

            let dump = s.procdump();
            let runnable = dump.iter().filter(|p| p.state == ProcessState::Runnable).count();
            prop_assert_eq!(s.runnable_len(), runnable);
            for p in &dump {
                let running = p.state == ProcessState::Running;
                prop_assert_eq!(running, p.cpu.is_some());
            }

            let min = s.min_vruntime();
            prop_assert!(min >= last_min);
            last_min = min;
        }
    }
}
