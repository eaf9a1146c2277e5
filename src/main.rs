/*!
 * CFS Kernel - Main Entry Point
 *
 * Boots a scheduling domain and drives it with simulated hardware:
 * - one tokio task per CPU delivering timer ticks
 * - a device task waking sleepers on I/O channels
 * - init waiting on its children until every worker is reaped
 */

use cfs_kernel::core::limits::DEFAULT_NICE;
use cfs_kernel::core::types::{Channel, CpuId, KernelResult};
use cfs_kernel::{
    generate_run_id, init_tracing, span_cpu, span_run, Pid, Scheduler, SchedulerConfig,
    TickOutcome, WaitStatus,
};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{info, warn, Instrument};

/// Simulated timer interrupt period
const TICK: Duration = Duration::from_millis(1);
/// Upper bound on ticks per CPU before the run is cut short
const MAX_TICKS: u64 = 5_000;
/// CPU time a worker consumes before exiting
const WORK_BUDGET: Duration = Duration::from_millis(60);
/// Workers block on I/O every this many ticks
const IO_EVERY: u64 = 7;
const IO_CHANNEL_BASE: Channel = 1_000;
const IO_CHANNELS: u64 = 3;
/// Nice values cycled over the spawned workers
const WORKER_NICE: [i8; 5] = [0, -5, 5, 0, 10];

#[tokio::main]
async fn main() -> miette::Result<()> {
    init_tracing();

    let run_id = generate_run_id();
    run(SchedulerConfig::from_env()?)
        .instrument(span_run(&run_id))
        .await?;
    Ok(())
}

async fn run(config: SchedulerConfig) -> KernelResult<()> {
    info!("CFS kernel starting...");
    let scheduler = Scheduler::new(config)?;

    let init = scheduler.spawn("init", None, DEFAULT_NICE)?;
    let workers = scheduler.ncpu() * 2 + 2;
    let mut worker_pids = Vec::with_capacity(workers);
    for i in 0..workers {
        let nice = WORKER_NICE[i % WORKER_NICE.len()];
        worker_pids.push(scheduler.spawn(&format!("worker-{}", i), Some(init), nice)?);
    }
    info!(workers, ncpu = scheduler.ncpu(), "workload spawned");

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let mut cpus: Vec<JoinHandle<KernelResult<u64>>> = Vec::new();
    for cpu in 0..scheduler.ncpu() {
        let scheduler = scheduler.clone();
        let shutdown = shutdown_rx.clone();
        cpus.push(tokio::spawn(
            cpu_loop(scheduler, cpu, init, shutdown).instrument(span_cpu(cpu)),
        ));
    }

    let device = tokio::spawn(device_loop(
        scheduler.clone(),
        worker_pids.last().copied(),
        shutdown_rx.clone(),
    ));

    let interrupt = tokio::spawn({
        let shutdown_tx = shutdown_tx.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("interrupted, shutting down");
                let _ = shutdown_tx.send(true);
            }
        }
    });

    let mut ticks = 0;
    for handle in cpus {
        ticks += handle.await??;
    }
    let _ = shutdown_tx.send(true);
    device.await??;
    interrupt.abort();

    let height = scheduler.check_invariants()?;
    info!(ticks, black_height = height, "simulation finished");

    println!("{}", serde_json::to_string_pretty(&scheduler.stats())?);
    println!("{}", serde_json::to_string_pretty(&scheduler.procdump())?);
    Ok(())
}

/// Timer interrupts for one CPU. Returns the number of ticks delivered.
async fn cpu_loop(
    scheduler: Scheduler,
    cpu: CpuId,
    init: Pid,
    mut shutdown: watch::Receiver<bool>,
) -> KernelResult<u64> {
    let mut interval = tokio::time::interval(TICK);
    let mut ticks = 0;

    while ticks < MAX_TICKS {
        tokio::select! {
            _ = interval.tick() => {}
            _ = shutdown.changed() => break,
        }
        ticks += 1;

        let outcome = scheduler.tick(cpu, TICK)?;
        if let TickOutcome::Killed { pid, .. } = outcome {
            info!(pid, "killed process exited");
        }
        let Some(pid) = outcome.running() else {
            if scheduler.process_count() == 1 && !scheduler.has_children(init) {
                break;
            }
            continue;
        };

        if pid == init {
            match scheduler.wait(cpu)? {
                WaitStatus::Reaped { pid, exit_status } => {
                    info!(child = pid, exit_status, "init reaped child");
                }
                WaitStatus::Sleeping => {}
                WaitStatus::NoChildren => {
                    info!("all workers reaped");
                    break;
                }
            }
            continue;
        }

        let info = scheduler.process_info(pid)?;
        if info.cpu_time() >= WORK_BUDGET {
            scheduler.exit(cpu, 0)?;
        } else if ticks % IO_EVERY == 0 {
            let chan = IO_CHANNEL_BASE + (u64::from(pid) % IO_CHANNELS);
            scheduler.sleep(cpu, chan)?;
        }
    }
    Ok(ticks)
}

/// Device completions: wakes one I/O channel per period and kills a victim
/// part way through the run
async fn device_loop(
    scheduler: Scheduler,
    victim: Option<Pid>,
    mut shutdown: watch::Receiver<bool>,
) -> KernelResult<()> {
    let mut interval = tokio::time::interval(TICK * 3);
    let mut round: u64 = 0;

    loop {
        tokio::select! {
            _ = interval.tick() => {}
            _ = shutdown.changed() => break,
        }
        round += 1;

        scheduler.wakeup(IO_CHANNEL_BASE + round % IO_CHANNELS)?;
        if round == 10 {
            if let Some(victim) = victim {
                match scheduler.kill(victim) {
                    Ok(()) => info!(victim, "victim killed"),
                    Err(e) => warn!(victim, error = %e, "kill failed"),
                }
            }
        }
    }

    // Nobody is left to deliver completions
    for chan in 0..IO_CHANNELS {
        scheduler.wakeup(IO_CHANNEL_BASE + chan)?;
    }
    Ok(())
}
