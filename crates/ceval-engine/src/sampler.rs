//! Window-edged resource sampling for the router container
//!
//! Counter probes read cgroup files inside the container: v2 paths
//! first, v1 fallbacks second. Each load window takes edge reads at
//! start and end; the end also takes one instantaneous stats sample so
//! the dual estimators in `ceval_core::resource` always have a
//! fallback. Every probe failure degrades, never aborts.

use crate::deploy::DeploymentDriver;
use ceval_core::resource::{
    parse_bytes, parse_cpu_stat_usec, parse_cpuacct_usage_usec, parse_stats_sample,
};
use ceval_core::{CpuEstimate, MemoryEstimate, ProbeError};
use std::time::Instant;

const CPU_STAT_V2: &str = "cat /sys/fs/cgroup/cpu.stat";
const CPUACCT_V1: &str = "cat /sys/fs/cgroup/cpuacct/cpuacct.usage";
const MEM_PEAK_V2: &str = "cat /sys/fs/cgroup/memory.peak";
const MEM_PEAK_V1: &str = "cat /sys/fs/cgroup/memory/memory.max_usage_in_bytes";
const MEM_CURRENT_V2: &str = "cat /sys/fs/cgroup/memory.current";
const MEM_CURRENT_V1: &str = "cat /sys/fs/cgroup/memory/memory.usage_in_bytes";

async fn read_cpu_counter_usec(driver: &dyn DeploymentDriver) -> Result<u64, ProbeError> {
    if let Ok(text) = driver.probe_capture(CPU_STAT_V2).await {
        if let Ok(usec) = parse_cpu_stat_usec(&text) {
            return Ok(usec);
        }
    }
    let text = driver.probe_capture(CPUACCT_V1).await?;
    parse_cpuacct_usage_usec(&text)
}

async fn read_two_tier_bytes(
    driver: &dyn DeploymentDriver,
    v2: &str,
    v1: &str,
) -> Result<u64, ProbeError> {
    if let Ok(text) = driver.probe_capture(v2).await {
        if let Ok(bytes) = parse_bytes(&text) {
            return Ok(bytes);
        }
    }
    let text = driver.probe_capture(v1).await?;
    parse_bytes(&text)
}

/// Edge reads taken at the start of a load window.
#[derive(Debug)]
pub struct WindowStart {
    cpu_counter_usec: Result<u64, ProbeError>,
    memory_peak_bytes: Result<u64, ProbeError>,
    started: Instant,
}

/// CPU and memory figures for one completed window.
#[derive(Debug, Clone, Copy)]
pub struct ResourceSample {
    /// CPU estimate with its method tag
    pub cpu: CpuEstimate,
    /// Memory figures
    pub memory: MemoryEstimate,
}

/// Take the start-of-window edge reads.
pub async fn window_start(driver: &dyn DeploymentDriver) -> WindowStart {
    let cpu_counter_usec = read_cpu_counter_usec(driver).await;
    let memory_peak_bytes = read_two_tier_bytes(driver, MEM_PEAK_V2, MEM_PEAK_V1).await;
    if cpu_counter_usec.is_err() {
        tracing::debug!("cpu counter probe unavailable, will fall back to stats sample");
    }
    WindowStart {
        cpu_counter_usec,
        memory_peak_bytes,
        started: Instant::now(),
    }
}

/// Take the end-of-window reads and assemble the estimates.
pub async fn window_finish(driver: &dyn DeploymentDriver, start: WindowStart) -> ResourceSample {
    let elapsed_secs = start.started.elapsed().as_secs_f64();
    let cpu_end = read_cpu_counter_usec(driver).await;
    let peak_end = read_two_tier_bytes(driver, MEM_PEAK_V2, MEM_PEAK_V1).await;
    let current_end = read_two_tier_bytes(driver, MEM_CURRENT_V2, MEM_CURRENT_V1).await;

    let instantaneous = match driver.stats_sample().await {
        Ok(line) => parse_stats_sample(&line),
        Err(err) => Err(err),
    };
    let (instant_cpu, instant_mem) = match instantaneous {
        Ok((cpu, mem)) => (Ok(cpu), Ok(mem)),
        Err(err) => (Err(err.clone()), Err(err)),
    };

    ResourceSample {
        cpu: CpuEstimate::select(start.cpu_counter_usec, cpu_end, elapsed_secs, instant_cpu),
        memory: MemoryEstimate::select(
            start.memory_peak_bytes,
            peak_end,
            current_end,
            instant_mem,
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::EngineError;
    use async_trait::async_trait;
    use ceval_core::CpuSampleMethod;
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// Maps probe commands to a queue of canned responses.
    struct StubDriver {
        responses: Mutex<HashMap<String, Vec<Result<String, ProbeError>>>>,
        stats: Result<String, ProbeError>,
    }

    impl StubDriver {
        fn new(stats: Result<String, ProbeError>) -> Self {
            Self {
                responses: Mutex::new(HashMap::new()),
                stats,
            }
        }

        fn push(&self, command: &str, response: Result<String, ProbeError>) {
            self.responses
                .lock()
                .unwrap()
                .entry(command.to_string())
                .or_default()
                .push(response);
        }
    }

    #[async_trait]
    impl DeploymentDriver for StubDriver {
        async fn start_backends(&self) -> Result<(), EngineError> {
            Ok(())
        }

        async fn apply_router(&self, _mode_name: &str) -> Result<(), EngineError> {
            Ok(())
        }

        async fn probe_capture(&self, command: &str) -> Result<String, ProbeError> {
            let mut map = self.responses.lock().unwrap();
            match map.get_mut(command) {
                Some(queue) if !queue.is_empty() => queue.remove(0),
                _ => Err(ProbeError::Empty),
            }
        }

        async fn stats_sample(&self) -> Result<String, ProbeError> {
            self.stats.clone()
        }
    }

    #[tokio::test]
    async fn counter_delta_from_v2_probes() {
        let driver = StubDriver::new(Ok("50.0%,2GiB / 8GiB".to_string()));
        driver.push(CPU_STAT_V2, Ok("usage_usec 1000000\n".to_string()));
        driver.push(CPU_STAT_V2, Ok("usage_usec 1500000\n".to_string()));
        driver.push(MEM_PEAK_V2, Ok("104857600".to_string()));
        driver.push(MEM_PEAK_V2, Ok("209715200".to_string()));
        driver.push(MEM_CURRENT_V2, Ok("157286400".to_string()));

        let start = window_start(&driver).await;
        let sample = window_finish(&driver, start).await;

        assert_eq!(sample.cpu.method, CpuSampleMethod::CounterDelta);
        assert!(sample.cpu.percent.is_some());
        assert_eq!(sample.memory.peak_delta_mib, Some(100.0));
        assert_eq!(sample.memory.current_mib, Some(150.0));
    }

    #[tokio::test]
    async fn v1_fallback_when_v2_missing() {
        let driver = StubDriver::new(Err(ProbeError::Empty));
        // v2 paths never answer; v1 counters do
        driver.push(CPUACCT_V1, Ok("2000000000\n".to_string()));
        driver.push(CPUACCT_V1, Ok("4000000000\n".to_string()));
        driver.push(MEM_PEAK_V1, Ok("1048576".to_string()));
        driver.push(MEM_PEAK_V1, Ok("2097152".to_string()));
        driver.push(MEM_CURRENT_V1, Ok("1048576".to_string()));

        let start = window_start(&driver).await;
        let sample = window_finish(&driver, start).await;

        assert_eq!(sample.cpu.method, CpuSampleMethod::CounterDelta);
        assert_eq!(sample.memory.peak_delta_mib, Some(1.0));
    }

    #[tokio::test]
    async fn stats_fallback_when_counters_unavailable() {
        let driver = StubDriver::new(Ok("7.50%,512MiB / 4GiB".to_string()));

        let start = window_start(&driver).await;
        let sample = window_finish(&driver, start).await;

        assert_eq!(sample.cpu.method, CpuSampleMethod::Instantaneous);
        assert_eq!(sample.cpu.percent, Some(7.5));
        assert_eq!(sample.memory.sample_mib, Some(512.0));
        assert_eq!(sample.memory.peak_delta_mib, None);
    }

    #[tokio::test]
    async fn everything_failing_degrades_to_unavailable() {
        let driver = StubDriver::new(Err(ProbeError::Empty));

        let start = window_start(&driver).await;
        let sample = window_finish(&driver, start).await;

        assert_eq!(sample.cpu.method, CpuSampleMethod::Unavailable);
        assert_eq!(sample.cpu.percent, None);
        assert_eq!(sample.memory.sample_mib, None);
    }
}
