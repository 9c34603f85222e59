//! Dual-estimator CPU and memory sampling
//!
//! Two independent CPU estimators: (a) the delta of a cumulative
//! CPU-time counter divided by the observed wall-clock window, and
//! (b) an instantaneous single-point utilization sample. (a) wins
//! whenever both window-edge counter reads succeeded and did not go
//! backwards; otherwise (b). Memory is a peak delta when both edge
//! samples exist, an absolute sample otherwise. Probe failures degrade
//! to an explicit unavailable state, never an abort.

use crate::error::ProbeError;
use serde::{Deserialize, Serialize};

const BYTES_PER_MIB: f64 = 1024.0 * 1024.0;

/// How a CPU figure was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CpuSampleMethod {
    /// Cumulative counter delta over the wall-clock window
    CounterDelta,
    /// Single-point utilization sample
    Instantaneous,
    /// No estimator produced a figure
    Unavailable,
}

/// CPU utilization estimate for one load window.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CpuEstimate {
    /// Percent of one CPU, when available
    pub percent: Option<f64>,
    /// Estimator that produced the figure
    pub method: CpuSampleMethod,
}

impl CpuEstimate {
    /// No estimator available.
    #[inline]
    #[must_use]
    pub fn unavailable() -> Self {
        Self {
            percent: None,
            method: CpuSampleMethod::Unavailable,
        }
    }

    /// Pick the counter-delta estimator when both edge reads succeeded
    /// and `end >= start`; fall back to the instantaneous sample.
    #[must_use]
    pub fn select(
        counter_start_usec: Result<u64, ProbeError>,
        counter_end_usec: Result<u64, ProbeError>,
        elapsed_secs: f64,
        instantaneous_percent: Result<f64, ProbeError>,
    ) -> Self {
        if let (Ok(start), Ok(end)) = (&counter_start_usec, &counter_end_usec) {
            if end >= start && elapsed_secs > 0.0 {
                let cpu_secs = (end - start) as f64 / 1_000_000.0;
                return Self {
                    percent: Some(cpu_secs / elapsed_secs * 100.0),
                    method: CpuSampleMethod::CounterDelta,
                };
            }
        }
        match instantaneous_percent {
            Ok(percent) => Self {
                percent: Some(percent),
                method: CpuSampleMethod::Instantaneous,
            },
            Err(_) => Self::unavailable(),
        }
    }
}

/// Memory figures for one load window, in MiB.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct MemoryEstimate {
    /// End-of-window peak (or instantaneous fallback)
    pub sample_mib: Option<f64>,
    /// End-of-window current usage
    pub current_mib: Option<f64>,
    /// End peak minus start peak, floored at zero
    pub peak_delta_mib: Option<f64>,
}

impl MemoryEstimate {
    /// Assemble from window-edge peak reads plus end-of-window current
    /// usage and an instantaneous fallback sample.
    #[must_use]
    pub fn select(
        peak_start_bytes: Result<u64, ProbeError>,
        peak_end_bytes: Result<u64, ProbeError>,
        current_end_bytes: Result<u64, ProbeError>,
        instantaneous_mib: Result<f64, ProbeError>,
    ) -> Self {
        let peak_delta_mib = match (&peak_start_bytes, &peak_end_bytes) {
            (Ok(start), Ok(end)) => Some(end.saturating_sub(*start) as f64 / BYTES_PER_MIB),
            _ => None,
        };
        let sample_mib = match peak_end_bytes {
            Ok(end) => Some(end as f64 / BYTES_PER_MIB),
            Err(_) => instantaneous_mib.ok(),
        };
        Self {
            sample_mib,
            current_mib: current_end_bytes.ok().map(|b| b as f64 / BYTES_PER_MIB),
            peak_delta_mib,
        }
    }
}

/// Parse a cumulative CPU-time counter out of cgroup v2 `cpu.stat` text
/// (`usage_usec` preferred, `usage_nsec` divided down).
pub fn parse_cpu_stat_usec(text: &str) -> Result<u64, ProbeError> {
    if text.trim().is_empty() {
        return Err(ProbeError::Empty);
    }
    for line in text.lines() {
        let mut parts = line.split_whitespace();
        let (Some(key), Some(raw)) = (parts.next(), parts.next()) else {
            continue;
        };
        match key {
            "usage_usec" => {
                if let Ok(v) = raw.parse::<u64>() {
                    return Ok(v);
                }
            }
            "usage_nsec" => {
                if let Ok(v) = raw.parse::<u64>() {
                    return Ok(v / 1000);
                }
            }
            _ => {}
        }
    }
    Err(ProbeError::Unparsable(text.trim().to_string()))
}

/// Parse a cgroup v1 `cpuacct.usage` value (nanoseconds) to microseconds.
pub fn parse_cpuacct_usage_usec(text: &str) -> Result<u64, ProbeError> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(ProbeError::Empty);
    }
    trimmed
        .parse::<u64>()
        .map(|nsec| nsec / 1000)
        .map_err(|_| ProbeError::Unparsable(trimmed.to_string()))
}

/// Parse a plain byte counter (`memory.current`, `memory.peak`).
pub fn parse_bytes(text: &str) -> Result<u64, ProbeError> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(ProbeError::Empty);
    }
    trimmed
        .parse::<u64>()
        .map_err(|_| ProbeError::Unparsable(trimmed.to_string()))
}

/// Parse an instantaneous stats line `"<cpu>%,<mem> / <limit>"` into
/// (cpu percent, memory MiB).
pub fn parse_stats_sample(text: &str) -> Result<(f64, f64), ProbeError> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(ProbeError::Empty);
    }
    let (cpu_raw, mem_raw) = trimmed
        .split_once(',')
        .ok_or_else(|| ProbeError::Unparsable(trimmed.to_string()))?;
    let cpu: f64 = cpu_raw
        .trim()
        .trim_end_matches('%')
        .trim()
        .parse()
        .map_err(|_| ProbeError::Unparsable(cpu_raw.to_string()))?;
    let usage = mem_raw.split('/').next().unwrap_or("").trim();
    let mem = parse_size_to_mib(usage)
        .ok_or_else(|| ProbeError::Unparsable(mem_raw.to_string()))?;
    Ok((cpu, mem))
}

/// Parse a human-readable size (`"1.5GiB"`, `"512MB"`, `"42"` bytes) to MiB.
#[must_use]
pub fn parse_size_to_mib(value: &str) -> Option<f64> {
    let raw = value.trim().replace("iB", "B");
    if raw.is_empty() {
        return None;
    }
    let units = [
        ("GB", 1024.0),
        ("MB", 1.0),
        ("KB", 1.0 / 1024.0),
        ("B", 1.0 / (1024.0 * 1024.0)),
    ];
    for (unit, factor) in units {
        if let Some(number) = raw.strip_suffix(unit) {
            return number.trim().parse::<f64>().ok().map(|n| n * factor);
        }
    }
    raw.parse::<f64>().ok().map(|n| n / (1024.0 * 1024.0))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cpu_counter_delta_preferred() {
        // 500,000 usec over a 2.0 s window => 25.00%
        let estimate = CpuEstimate::select(Ok(1_000_000), Ok(1_500_000), 2.0, Ok(99.0));
        assert_eq!(estimate.method, CpuSampleMethod::CounterDelta);
        assert!((estimate.percent.unwrap() - 25.0).abs() < 1e-9);
    }

    #[test]
    fn cpu_falls_back_when_counter_went_backwards() {
        let estimate = CpuEstimate::select(Ok(2_000_000), Ok(1_000_000), 2.0, Ok(12.5));
        assert_eq!(estimate.method, CpuSampleMethod::Instantaneous);
        assert_eq!(estimate.percent, Some(12.5));
    }

    #[test]
    fn cpu_falls_back_when_edge_read_failed() {
        let estimate =
            CpuEstimate::select(Err(ProbeError::Empty), Ok(1_000_000), 2.0, Ok(7.0));
        assert_eq!(estimate.method, CpuSampleMethod::Instantaneous);
        assert_eq!(estimate.percent, Some(7.0));
    }

    #[test]
    fn cpu_unavailable_when_everything_failed() {
        let estimate = CpuEstimate::select(
            Err(ProbeError::Empty),
            Err(ProbeError::Empty),
            2.0,
            Err(ProbeError::Empty),
        );
        assert_eq!(estimate.method, CpuSampleMethod::Unavailable);
        assert_eq!(estimate.percent, None);
    }

    #[test]
    fn memory_peak_delta_floored_at_zero() {
        let mem = MemoryEstimate::select(
            Ok(200 * 1024 * 1024),
            Ok(150 * 1024 * 1024),
            Err(ProbeError::Empty),
            Err(ProbeError::Empty),
        );
        assert_eq!(mem.peak_delta_mib, Some(0.0));
        assert_eq!(mem.sample_mib, Some(150.0));
    }

    #[test]
    fn memory_instantaneous_fallback() {
        let mem = MemoryEstimate::select(
            Err(ProbeError::Empty),
            Err(ProbeError::Empty),
            Err(ProbeError::Empty),
            Ok(64.0),
        );
        assert_eq!(mem.peak_delta_mib, None);
        assert_eq!(mem.sample_mib, Some(64.0));
    }

    #[test]
    fn cpu_stat_usec_and_nsec() {
        let v2 = "usage_usec 123456\nuser_usec 100\n";
        assert_eq!(parse_cpu_stat_usec(v2).unwrap(), 123_456);
        let nsec_only = "usage_nsec 2000000\n";
        assert_eq!(parse_cpu_stat_usec(nsec_only).unwrap(), 2000);
        assert!(parse_cpu_stat_usec("").is_err());
        assert!(parse_cpu_stat_usec("nothing relevant 5").is_err());
    }

    #[test]
    fn cpuacct_usage_is_nanoseconds() {
        assert_eq!(parse_cpuacct_usage_usec("5000000\n").unwrap(), 5000);
        assert!(matches!(
            parse_cpuacct_usage_usec("x"),
            Err(ProbeError::Unparsable(_))
        ));
    }

    #[test]
    fn stats_sample_line() {
        let (cpu, mem) = parse_stats_sample("12.34%,1.5GiB / 7.7GiB").unwrap();
        assert!((cpu - 12.34).abs() < 1e-9);
        assert!((mem - 1536.0).abs() < 1e-6);
    }

    #[test]
    fn size_parsing_units() {
        assert_eq!(parse_size_to_mib("512MiB"), Some(512.0));
        assert_eq!(parse_size_to_mib("1GB"), Some(1024.0));
        assert_eq!(parse_size_to_mib("2048KB"), Some(2.0));
        assert_eq!(parse_size_to_mib("1048576"), Some(1.0));
        assert_eq!(parse_size_to_mib(""), None);
        assert_eq!(parse_size_to_mib("junk"), None);
    }
}
