//! Host-level statistics source backed by sysinfo
//!
//! Used by the bundled binary: CPU and memory figures of the machine, the
//! resident memory of this process, plus whatever counters the process
//! recorded in its `CounterRegistry`. sysinfo scans block, so they run on
//! the blocking pool.

use crate::counters::{Counter, CounterKind, CounterRegistry, CounterStorage};
use crate::documents::MetricsSnapshot;
use crate::scheduler::StatsSource;
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;
use sysinfo::{Pid, System};
use tracing::{debug, warn};

pub struct HostStatsSource {
    system: Arc<Mutex<System>>,
    pid: Pid,
    registry: CounterRegistry,
}

impl HostStatsSource {
    pub fn new(registry: CounterRegistry) -> Result<Self> {
        let pid = sysinfo::get_current_pid().map_err(|e| anyhow!("Failed to get current pid: {}", e))?;

        let mut system = System::new();
        // first CPU refresh only primes the usage computation
        system.refresh_cpu();
        system.refresh_memory();

        registry.register("Runtime.Uptime", CounterStorage::LogAndTable, CounterKind::Absolute);
        registry.register("Runtime.ProcessCount", CounterStorage::LogOnly, CounterKind::Absolute);

        Ok(Self {
            system: Arc::new(Mutex::new(system)),
            pid,
            registry,
        })
    }

    pub fn registry(&self) -> &CounterRegistry {
        &self.registry
    }

    fn record_host_counters(&self, process_count: usize) {
        self.registry
            .register("Runtime.Uptime", CounterStorage::LogAndTable, CounterKind::Absolute)
            .set(System::uptime() as i64);
        self.registry
            .register("Runtime.ProcessCount", CounterStorage::LogOnly, CounterKind::Absolute)
            .set(process_count as i64);
    }
}

fn collect(system: &Mutex<System>, pid: Pid) -> Result<MetricsSnapshot> {
    let mut sys = system.lock();
    sys.refresh_cpu();
    sys.refresh_memory();

    let cpu_usage = f64::from(sys.global_cpu_info().cpu_usage());
    let total = sys.total_memory();
    let available = sys.available_memory();

    let memory_usage = if sys.refresh_process(pid) {
        sys.process(pid).map(|p| p.memory()).unwrap_or(0)
    } else {
        0
    };

    debug!(
        "Host metrics: cpu {:.1}%, memory {}/{} bytes available, process {} bytes",
        cpu_usage, available, total, memory_usage
    );

    Ok(MetricsSnapshot {
        cpu_usage,
        total_physical_memory: to_i64(total)?,
        available_physical_memory: to_i64(available)?,
        memory_usage: to_i64(memory_usage)?,
        ..Default::default()
    })
}

fn count_processes(system: &Mutex<System>) -> usize {
    let mut sys = system.lock();
    sys.refresh_processes();
    sys.processes().len()
}

fn to_i64(bytes: u64) -> Result<i64> {
    i64::try_from(bytes).map_err(|_| anyhow!("memory figure {} does not fit in i64", bytes))
}

#[async_trait]
impl StatsSource for HostStatsSource {
    async fn metrics(&self) -> Result<MetricsSnapshot> {
        let system = self.system.clone();
        let pid = self.pid;
        tokio::task::spawn_blocking(move || collect(&system, pid))
            .await
            .context("Metrics collection task failed")?
    }

    async fn counters(&self) -> Vec<Counter> {
        let system = self.system.clone();
        match tokio::task::spawn_blocking(move || count_processes(&system)).await {
            Ok(process_count) => self.record_host_counters(process_count),
            Err(e) => warn!("Process scan task failed: {}", e),
        }
        self.registry.snapshot()
    }
}
