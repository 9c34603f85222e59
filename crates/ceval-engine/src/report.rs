//! Per-mode summaries and the baseline-relative report outputs
//!
//! One [`ModeSummary`] per scenario is assembled from the load outcome,
//! the reconciled counter deltas and the resource sample. A second pass
//! fills in the deltas against the canonical baseline scenario; a
//! missing baseline degrades those deltas to zero instead of failing
//! the report. Outputs: `summary.json`, `summary.csv` with fixed
//! columns, and a `summary.md` narrative.

use crate::error::EngineError;
use crate::load::LoadOutcome;
use crate::runcfg::RunConfig;
use crate::sampler::ResourceSample;
use ceval_config::{PolicyMode, BASELINE_SCENARIO};
use ceval_core::stats::{mean, percentile};
use ceval_core::{CounterDelta, CpuSampleMethod, FixtureExpectation};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::path::Path;

/// Fixed column order for `summary.csv`.
pub const SUMMARY_CSV_HEADER: &str = "scenario,carbon_aware,requests,ok_count,error_count,\
synthetic_failures,error_rate_percent,latency_avg_ms,latency_p95_ms,\
carbon_exposure_mean_g_per_kwh,co2e_total_g,cross_region_reroutes,east_to_west_reroutes,\
west_to_east_reroutes,expected_cross_eligible,expected_cross_hits,\
expected_cross_rate_percent,cpu_percent,cpu_method,memory_sample_mib,memory_current_mib,\
memory_peak_delta_mib,\
carbon_exposure_saved_vs_baseline_g_per_kwh,carbon_exposure_saved_vs_baseline_percent,\
co2e_saved_vs_baseline_g,co2e_saved_vs_baseline_percent,latency_p95_delta_vs_baseline_ms";

/// Everything the report records for one scenario.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModeSummary {
    /// Scenario name
    pub scenario: String,
    /// Whether the mode routed with carbon awareness
    pub carbon_aware: bool,
    /// Request-counter delta for the filtered route
    pub requests: f64,
    /// Non-server-error responses observed by the load loop
    pub ok_count: u64,
    /// Server errors, synthetic failures included
    pub error_count: u64,
    /// Requests without an HTTP response
    pub synthetic_failures: u64,
    /// Errors over attempted requests
    pub error_rate_percent: f64,
    /// Mean latency
    pub latency_avg_ms: f64,
    /// Nearest-rank p95 latency
    pub latency_p95_ms: f64,
    /// Exposure-counter delta divided by the request delta
    pub carbon_exposure_mean_g_per_kwh: f64,
    /// CO2e-counter delta
    pub co2e_total_g: f64,
    /// Mean selected intensity reported by response headers
    pub mean_selected_intensity_g_per_kwh: Option<f64>,
    /// Per-zone request-counter deltas
    pub zone_requests: BTreeMap<String, f64>,
    /// Per-zone tally of the zones the responses themselves named
    pub zone_responses: BTreeMap<String, u64>,
    /// Zone with the largest request delta
    pub dominant_zone: Option<String>,
    /// Cross-region outcomes, any direction
    pub cross_region_reroutes: u64,
    /// us-east origins landing in us-west
    pub east_to_west_reroutes: u64,
    /// us-west origins landing in us-east
    pub west_to_east_reroutes: u64,
    /// Requests from the fixture's expected source region
    pub expected_cross_eligible: u64,
    /// Eligible requests landing at the expected target
    pub expected_cross_hits: u64,
    /// Hit rate as a percentage
    pub expected_cross_rate_percent: f64,
    /// Decision-brief tally
    pub decision_briefs: BTreeMap<String, u64>,
    /// CPU estimate
    pub cpu_percent: Option<f64>,
    /// Which estimator produced the CPU figure
    pub cpu_method: CpuSampleMethod,
    /// Memory sample (end-of-window peak or instantaneous)
    pub memory_sample_mib: Option<f64>,
    /// End-of-window current usage
    pub memory_current_mib: Option<f64>,
    /// End peak minus start peak
    pub memory_peak_delta_mib: Option<f64>,

    // Baseline-relative figures, filled by the second pass.
    /// Baseline exposure minus this mode's exposure
    #[serde(default)]
    pub carbon_exposure_saved_vs_baseline_g_per_kwh: f64,
    /// Exposure saving as a percentage of the baseline
    #[serde(default)]
    pub carbon_exposure_saved_vs_baseline_percent: f64,
    /// Baseline CO2e minus this mode's CO2e
    #[serde(default)]
    pub co2e_saved_vs_baseline_g: f64,
    /// CO2e saving as a percentage of the baseline
    #[serde(default)]
    pub co2e_saved_vs_baseline_percent: f64,
    /// This mode's p95 minus the baseline p95
    #[serde(default)]
    pub latency_p95_delta_vs_baseline_ms: f64,
    /// CPU delta when both figures exist
    #[serde(default)]
    pub cpu_delta_vs_baseline_percent: Option<f64>,
    /// Memory delta when both figures exist
    #[serde(default)]
    pub memory_delta_vs_baseline_mib: Option<f64>,
}

impl ModeSummary {
    /// Assemble one scenario's summary from its window artifacts.
    #[must_use]
    pub fn assemble(
        mode: &PolicyMode,
        outcome: &LoadOutcome,
        request_delta: &CounterDelta,
        exposure_delta: &CounterDelta,
        co2e_delta: &CounterDelta,
        resources: &ResourceSample,
    ) -> Self {
        let attempted = outcome.ok_count + outcome.error_count;
        let error_rate_percent = if attempted == 0 {
            0.0
        } else {
            outcome.error_count as f64 / attempted as f64 * 100.0
        };
        let exposure_mean = if request_delta.total > 0.0 {
            exposure_delta.total / request_delta.total
        } else {
            0.0
        };
        let dominant_zone = request_delta
            .by_zone
            .iter()
            .filter(|(zone, _)| !zone.is_empty())
            .max_by(|a, b| a.1.partial_cmp(b.1).unwrap_or(std::cmp::Ordering::Equal))
            .filter(|(_, delta)| **delta > 0.0)
            .map(|(zone, _)| zone.clone());

        Self {
            scenario: mode.name.clone(),
            carbon_aware: mode.is_carbon_aware(),
            requests: request_delta.total,
            ok_count: outcome.ok_count,
            error_count: outcome.error_count,
            synthetic_failures: outcome.synthetic_failures,
            error_rate_percent,
            latency_avg_ms: mean(&outcome.latencies_ms),
            latency_p95_ms: percentile(&outcome.latencies_ms, 95.0),
            carbon_exposure_mean_g_per_kwh: exposure_mean,
            co2e_total_g: co2e_delta.total,
            mean_selected_intensity_g_per_kwh: outcome.mean_selected_intensity,
            zone_requests: request_delta.by_zone.clone(),
            zone_responses: outcome.zone_counts.clone(),
            dominant_zone,
            cross_region_reroutes: outcome.reroutes.cross_region,
            east_to_west_reroutes: outcome.reroutes.east_to_west,
            west_to_east_reroutes: outcome.reroutes.west_to_east,
            expected_cross_eligible: outcome.expected_cross.eligible,
            expected_cross_hits: outcome.expected_cross.hits,
            expected_cross_rate_percent: outcome.expected_cross.rate_percent(),
            decision_briefs: outcome.brief_counts.clone(),
            cpu_percent: resources.cpu.percent,
            cpu_method: resources.cpu.method,
            memory_sample_mib: resources.memory.sample_mib,
            memory_current_mib: resources.memory.current_mib,
            memory_peak_delta_mib: resources.memory.peak_delta_mib,
            carbon_exposure_saved_vs_baseline_g_per_kwh: 0.0,
            carbon_exposure_saved_vs_baseline_percent: 0.0,
            co2e_saved_vs_baseline_g: 0.0,
            co2e_saved_vs_baseline_percent: 0.0,
            latency_p95_delta_vs_baseline_ms: 0.0,
            cpu_delta_vs_baseline_percent: None,
            memory_delta_vs_baseline_mib: None,
        }
    }

    fn csv_row(&self) -> String {
        let opt = |v: Option<f64>| v.map_or_else(String::new, |v| format!("{v:.3}"));
        [
            self.scenario.clone(),
            self.carbon_aware.to_string(),
            format!("{:.0}", self.requests),
            self.ok_count.to_string(),
            self.error_count.to_string(),
            self.synthetic_failures.to_string(),
            format!("{:.2}", self.error_rate_percent),
            format!("{:.3}", self.latency_avg_ms),
            format!("{:.3}", self.latency_p95_ms),
            format!("{:.3}", self.carbon_exposure_mean_g_per_kwh),
            format!("{:.3}", self.co2e_total_g),
            self.cross_region_reroutes.to_string(),
            self.east_to_west_reroutes.to_string(),
            self.west_to_east_reroutes.to_string(),
            self.expected_cross_eligible.to_string(),
            self.expected_cross_hits.to_string(),
            format!("{:.2}", self.expected_cross_rate_percent),
            opt(self.cpu_percent),
            cpu_method_label(self.cpu_method).to_string(),
            opt(self.memory_sample_mib),
            opt(self.memory_current_mib),
            opt(self.memory_peak_delta_mib),
            format!("{:.3}", self.carbon_exposure_saved_vs_baseline_g_per_kwh),
            format!("{:.2}", self.carbon_exposure_saved_vs_baseline_percent),
            format!("{:.3}", self.co2e_saved_vs_baseline_g),
            format!("{:.2}", self.co2e_saved_vs_baseline_percent),
            format!("{:.3}", self.latency_p95_delta_vs_baseline_ms),
        ]
        .join(",")
    }
}

fn cpu_method_label(method: CpuSampleMethod) -> &'static str {
    match method {
        CpuSampleMethod::CounterDelta => "counter_delta",
        CpuSampleMethod::Instantaneous => "instantaneous",
        CpuSampleMethod::Unavailable => "unavailable",
    }
}

/// Fill baseline-relative deltas against [`BASELINE_SCENARIO`].
///
/// Positive savings mean this mode exposed less carbon than the
/// baseline. Without a baseline row everything stays at its zero
/// default.
pub fn enrich_with_baseline(summaries: &mut [ModeSummary]) {
    let Some(baseline) = summaries
        .iter()
        .find(|s| s.scenario == BASELINE_SCENARIO)
        .cloned()
    else {
        tracing::warn!(
            baseline = BASELINE_SCENARIO,
            "baseline scenario absent, baseline-relative deltas stay zero"
        );
        return;
    };

    for summary in summaries.iter_mut() {
        let exposure_saved =
            baseline.carbon_exposure_mean_g_per_kwh - summary.carbon_exposure_mean_g_per_kwh;
        summary.carbon_exposure_saved_vs_baseline_g_per_kwh = exposure_saved;
        summary.carbon_exposure_saved_vs_baseline_percent =
            if baseline.carbon_exposure_mean_g_per_kwh > 0.0 {
                exposure_saved / baseline.carbon_exposure_mean_g_per_kwh * 100.0
            } else {
                0.0
            };

        let co2e_saved = baseline.co2e_total_g - summary.co2e_total_g;
        summary.co2e_saved_vs_baseline_g = co2e_saved;
        summary.co2e_saved_vs_baseline_percent = if baseline.co2e_total_g > 0.0 {
            co2e_saved / baseline.co2e_total_g * 100.0
        } else {
            0.0
        };

        summary.latency_p95_delta_vs_baseline_ms =
            summary.latency_p95_ms - baseline.latency_p95_ms;
        summary.cpu_delta_vs_baseline_percent =
            match (summary.cpu_percent, baseline.cpu_percent) {
                (Some(own), Some(base)) => Some(own - base),
                _ => None,
            };
        summary.memory_delta_vs_baseline_mib =
            match (summary.memory_sample_mib, baseline.memory_sample_mib) {
                (Some(own), Some(base)) => Some(own - base),
                _ => None,
            };
    }
}

/// Write `summary.json`.
pub fn write_json(path: &Path, summaries: &[ModeSummary]) -> Result<(), EngineError> {
    let text = serde_json::to_string_pretty(summaries)
        .map_err(|e| EngineError::io(path, std::io::Error::other(e)))?;
    std::fs::write(path, text + "\n").map_err(|e| EngineError::io(path, e))
}

/// Write `summary.csv` with the fixed column set.
pub fn write_csv(path: &Path, summaries: &[ModeSummary]) -> Result<(), EngineError> {
    let mut text = String::from(SUMMARY_CSV_HEADER);
    text.push('\n');
    for summary in summaries {
        text.push_str(&summary.csv_row());
        text.push('\n');
    }
    std::fs::write(path, text).map_err(|e| EngineError::io(path, e))
}

fn fmt_opt(v: Option<f64>) -> String {
    v.map_or_else(|| "n/a".to_string(), |v| format!("{v:.2}"))
}

/// Write the `summary.md` narrative.
pub fn write_markdown(
    path: &Path,
    cfg: &RunConfig,
    summaries: &[ModeSummary],
    expectation: Option<&FixtureExpectation>,
) -> Result<(), EngineError> {
    let mut md = String::new();
    let _ = writeln!(md, "# Comparative evaluation");
    let _ = writeln!(md);
    let _ = writeln!(
        md,
        "Run of {} against `{}`, {} requests per region per scenario, route `{}` \
(counters filtered on `{}`).",
        chrono::Utc::now().format("%Y-%m-%d %H:%M UTC"),
        cfg.base_url,
        cfg.requests_per_region,
        cfg.route,
        cfg.metric_filter_route,
    );
    let _ = writeln!(
        md,
        "Region input `{}`, variance profile `{}`, failure scenario {}, provider {}. \
Baseline: `{}`.",
        cfg.region_input.as_str(),
        cfg.variance.as_str(),
        if cfg.failure_scenario { "on" } else { "off" },
        cfg.carbon_overrides
            .provider
            .as_deref()
            .map_or_else(|| "from config".to_string(), |p| format!("`{p}`")),
        BASELINE_SCENARIO,
    );
    match expectation {
        Some(expectation) => {
            let _ = writeln!(
                md,
                "Fixture expectation: `{}` is greener, carbon-aware modes should reroute `{}`.",
                expectation.greener_region,
                expectation.direction_label(),
            );
        }
        None => {
            let _ = writeln!(
                md,
                "No fixture expectation available; expected-cross columns stay at zero.",
            );
        }
    }
    let _ = writeln!(md);

    let _ = writeln!(
        md,
        "| scenario | carbon aware | requests | errors % | avg ms | p95 ms | p95 vs baseline ms | \
exposure g/kWh | co2e g | e->w | w->e | expected-cross % | cpu % | mem MiB | \
exposure saved vs baseline % | co2e saved vs baseline % |",
    );
    let _ = writeln!(
        md,
        "|---|---|---:|---:|---:|---:|---:|---:|---:|---:|---:|---:|---:|---:|---:|---:|",
    );
    for s in summaries {
        let _ = writeln!(
            md,
            "| {} | {} | {:.0} | {:.2} | {:.1} | {:.1} | {:+.1} | {:.1} | {:.2} | {} | {} | \
{:.1} | {} | {} | {:.2} | {:.2} |",
            s.scenario,
            if s.carbon_aware { "yes" } else { "no" },
            s.requests,
            s.error_rate_percent,
            s.latency_avg_ms,
            s.latency_p95_ms,
            s.latency_p95_delta_vs_baseline_ms,
            s.carbon_exposure_mean_g_per_kwh,
            s.co2e_total_g,
            s.east_to_west_reroutes,
            s.west_to_east_reroutes,
            s.expected_cross_rate_percent,
            fmt_opt(s.cpu_percent),
            fmt_opt(s.memory_sample_mib),
            s.carbon_exposure_saved_vs_baseline_percent,
            s.co2e_saved_vs_baseline_percent,
        );
    }
    let _ = writeln!(md);

    if let Some(expectation) = expectation {
        let _ = writeln!(md, "## Expected reroute direction");
        let _ = writeln!(md);
        let _ = writeln!(
            md,
            "`{}` is the greener region; carbon-aware modes are expected to send \
`{}`-originated traffic cross-region (`{}`).",
            expectation.greener_region,
            expectation.expected_from,
            expectation.direction_label(),
        );
        for s in summaries.iter().filter(|s| s.carbon_aware) {
            let _ = writeln!(
                md,
                "- {}: {}/{} eligible requests landed as expected ({:.1}%).",
                s.scenario,
                s.expected_cross_hits,
                s.expected_cross_eligible,
                s.expected_cross_rate_percent,
            );
        }
        let _ = writeln!(md);
    }

    for s in summaries {
        let _ = writeln!(md, "## {}", s.scenario);
        let _ = writeln!(md);
        if let Some(zone) = &s.dominant_zone {
            let share = s
                .zone_requests
                .get(zone)
                .map(|z| if s.requests > 0.0 { z / s.requests * 100.0 } else { 0.0 })
                .unwrap_or(0.0);
            let _ = writeln!(md, "Dominant zone `{zone}` took {share:.1}% of the traffic.");
        }
        if !s.zone_requests.is_empty() {
            let split: Vec<String> = s
                .zone_requests
                .iter()
                .filter(|(zone, _)| !zone.is_empty())
                .map(|(zone, count)| format!("{zone}: {count:.0}"))
                .collect();
            if !split.is_empty() {
                let _ = writeln!(md, "Zone split (counters): {}.", split.join(", "));
            }
        }
        if !s.zone_responses.is_empty() {
            let observed: Vec<String> = s
                .zone_responses
                .iter()
                .map(|(zone, count)| format!("{zone}: {count}"))
                .collect();
            let _ = writeln!(md, "Zone split (responses): {}.", observed.join(", "));
        }
        if !s.decision_briefs.is_empty() {
            let briefs: Vec<String> = s
                .decision_briefs
                .iter()
                .map(|(brief, count)| format!("{brief}: {count}"))
                .collect();
            let _ = writeln!(md, "Decisions: {}.", briefs.join(", "));
        }
        if s.synthetic_failures > 0 {
            let _ = writeln!(
                md,
                "{} request(s) never got a response and were recorded with status 599.",
                s.synthetic_failures,
            );
        }
        let _ = writeln!(md);
    }

    std::fs::write(path, md).map_err(|e| EngineError::io(path, e))
}
