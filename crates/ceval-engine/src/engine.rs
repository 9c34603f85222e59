//! The sequential evaluation pipeline
//!
//! One run walks the scenario matrix in order. Per mode: mutate the
//! configuration, recreate the router, wait for readiness, snapshot the
//! counters, run the load window between resource edge reads, snapshot
//! again, reconcile and summarize. The configuration guard restores the
//! original document whether the run succeeds or aborts; fatal errors
//! propagate only after restoration.

use crate::deploy::{wait_ready, DeploymentDriver};
use crate::error::EngineError;
use crate::load::{run_load, RecordWriter};
use crate::report::{enrich_with_baseline, write_csv, write_json, write_markdown, ModeSummary};
use crate::runcfg::RunConfig;
use crate::sampler::{window_finish, window_start};
use ceval_config::{
    apply_carbon_overrides, apply_mode, apply_variance_profile, build_matrix, ConfigError,
    ConfigGuard, ConfigView, PolicyMode,
};
use ceval_core::{CounterDelta, CounterScan, FixtureExpectation, ZoneRegionMap};
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Request counter scanned for the evaluated route.
pub const METRIC_REQUESTS: &str = "requests_total";
/// Cumulative carbon-intensity exposure counter.
pub const METRIC_EXPOSURE: &str = "carbon_intensity_exposure_total";
/// Cumulative estimated-CO2e counter.
pub const METRIC_CO2E: &str = "co2e_estimated_total";

const RESULTS_DIR_PREFIX: &str = "comparative-";
const HTTP_TIMEOUT: Duration = Duration::from_secs(10);

/// Remove previous run directories and create a fresh timestamped one.
pub fn prepare_results_dir(cfg: &RunConfig) -> Result<PathBuf, EngineError> {
    fs::create_dir_all(&cfg.results_base)
        .map_err(|e| EngineError::io(cfg.results_base.clone(), e))?;

    if cfg.clean_results {
        let entries = fs::read_dir(&cfg.results_base)
            .map_err(|e| EngineError::io(cfg.results_base.clone(), e))?;
        for entry in entries.flatten() {
            let name = entry.file_name();
            if name.to_string_lossy().starts_with(RESULTS_DIR_PREFIX) {
                let path = entry.path();
                tracing::debug!(path = %path.display(), "removing previous results");
                if path.is_dir() {
                    fs::remove_dir_all(&path).map_err(|e| EngineError::io(path, e))?;
                } else {
                    fs::remove_file(&path).map_err(|e| EngineError::io(path, e))?;
                }
            }
        }
    }

    let stamp = chrono::Utc::now().format("%Y%m%d-%H%M%S");
    let out_dir = cfg.results_base.join(format!("{RESULTS_DIR_PREFIX}{stamp}"));
    fs::create_dir_all(&out_dir).map_err(|e| EngineError::io(out_dir.clone(), e))?;
    Ok(out_dir)
}

/// Snapshot of the three scanned counters at one instant.
struct MetricsSnapshot {
    requests: CounterScan,
    exposure: CounterScan,
    co2e: CounterScan,
}

impl MetricsSnapshot {
    fn scan(text: &str, route_filter: &str) -> Self {
        Self {
            requests: CounterScan::scan(text, METRIC_REQUESTS, route_filter),
            exposure: CounterScan::scan(text, METRIC_EXPOSURE, route_filter),
            co2e: CounterScan::scan(text, METRIC_CO2E, route_filter),
        }
    }
}

/// The evaluation engine, generic over the deployment driver.
pub struct Engine<D> {
    cfg: RunConfig,
    driver: D,
    client: reqwest::Client,
}

impl<D: DeploymentDriver> Engine<D> {
    /// Build an engine around an immutable run configuration.
    pub fn new(cfg: RunConfig, driver: D) -> Result<Self, EngineError> {
        let client = reqwest::Client::builder()
            .timeout(HTTP_TIMEOUT)
            .build()?;
        Ok(Self {
            cfg,
            driver,
            client,
        })
    }

    /// Run the full matrix; returns the results directory.
    pub async fn run(&self) -> Result<PathBuf, EngineError> {
        let out_dir = prepare_results_dir(&self.cfg)?;
        tracing::info!(dir = %out_dir.display(), "starting comparative run");

        let mut guard = ConfigGuard::capture(&self.cfg.config_path)?;
        let outcome = self.run_matrix(&mut guard, &out_dir).await;
        let restored = guard.restore();
        // a pipeline failure is the more useful error to surface
        outcome?;
        restored?;

        tracing::info!(dir = %out_dir.display(), "comparative run complete");
        Ok(out_dir)
    }

    async fn run_matrix(
        &self,
        guard: &mut ConfigGuard,
        out_dir: &Path,
    ) -> Result<(), EngineError> {
        let base: Value =
            serde_json::from_str(guard.original()).map_err(ConfigError::from)?;
        let base = apply_variance_profile(&base, self.cfg.variance)?;
        let base = apply_carbon_overrides(&base, &self.cfg.carbon_overrides)?;

        let view = ConfigView::parse(guard.original()).map_err(ConfigError::from)?;
        let zones = view.zone_region_map();

        let expectation = match FixtureExpectation::load(&self.cfg.fixture_path) {
            Ok(expectation) => expectation,
            Err(err) => {
                tracing::warn!(
                    path = %self.cfg.fixture_path.display(),
                    %err,
                    "fixture unavailable, running without an expectation"
                );
                None
            }
        };

        let matrix = build_matrix(self.cfg.failure_scenario, expectation.as_ref());
        let mut writer = RecordWriter::create(out_dir.join("requests.csv"))?;

        self.driver.start_backends().await?;

        let mut summaries = Vec::with_capacity(matrix.len());
        for mode in &matrix {
            let summary = self
                .run_mode(guard, &base, mode, &zones, expectation.as_ref(), &mut writer, out_dir)
                .await?;
            tracing::info!(
                scenario = %summary.scenario,
                requests = summary.requests,
                exposure = summary.carbon_exposure_mean_g_per_kwh,
                cross_region = summary.cross_region_reroutes,
                "scenario complete"
            );
            summaries.push(summary);
        }

        enrich_with_baseline(&mut summaries);
        write_json(&out_dir.join("summary.json"), &summaries)?;
        write_csv(&out_dir.join("summary.csv"), &summaries)?;
        write_markdown(&out_dir.join("summary.md"), &self.cfg, &summaries, expectation.as_ref())?;
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    async fn run_mode(
        &self,
        guard: &ConfigGuard,
        base: &Value,
        mode: &PolicyMode,
        zones: &ZoneRegionMap,
        expectation: Option<&FixtureExpectation>,
        writer: &mut RecordWriter,
        out_dir: &Path,
    ) -> Result<ModeSummary, EngineError> {
        let doc = apply_mode(base, mode)?;
        let text = serde_json::to_string_pretty(&doc).map_err(ConfigError::from)?;
        guard.write_mutated(&(text + "\n"))?;

        self.driver.apply_router(&mode.name).await?;
        wait_ready(
            &self.client,
            &self.cfg.metrics_url(),
            &mode.name,
            self.cfg.readiness_attempts,
            self.cfg.readiness_delay,
        )
        .await?;

        let before_text = self.fetch_metrics().await;
        let before = MetricsSnapshot::scan(&before_text, &self.cfg.metric_filter_route);

        let window = window_start(&self.driver).await;
        let outcome =
            run_load(&self.client, &self.cfg, mode, zones, expectation, writer).await?;
        let resources = window_finish(&self.driver, window).await;

        let after_text = self.fetch_metrics().await;
        let after = MetricsSnapshot::scan(&after_text, &self.cfg.metric_filter_route);

        let capture_path = out_dir.join(format!("metrics-{}.prom", mode.name));
        fs::write(&capture_path, &after_text).map_err(|e| EngineError::io(capture_path, e))?;

        Ok(ModeSummary::assemble(
            mode,
            &outcome,
            &CounterDelta::between(&before.requests, &after.requests),
            &CounterDelta::between(&before.exposure, &after.exposure),
            &CounterDelta::between(&before.co2e, &after.co2e),
            &resources,
        ))
    }

    /// Fetch the exposition text; degrades to empty on failure so one
    /// flaky scrape costs a zero delta, not the run.
    async fn fetch_metrics(&self) -> String {
        match self.client.get(self.cfg.metrics_url()).send().await {
            Ok(response) => match response.text().await {
                Ok(text) => text,
                Err(err) => {
                    tracing::warn!(%err, "metrics body unreadable");
                    String::new()
                }
            },
            Err(err) => {
                tracing::warn!(%err, "metrics endpoint unreachable");
                String::new()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn prepare_cleans_previous_runs_only() {
        let dir = tempdir().unwrap();
        let base = dir.path().join("results");
        fs::create_dir_all(base.join("comparative-20260101-000000")).unwrap();
        fs::write(base.join("comparative-20260101-000000/summary.json"), "{}").unwrap();
        fs::write(base.join("notes.txt"), "keep me").unwrap();

        let cfg = RunConfig {
            results_base: base.clone(),
            clean_results: true,
            ..RunConfig::default()
        };
        let out_dir = prepare_results_dir(&cfg).unwrap();

        assert!(out_dir.starts_with(&base));
        assert!(!base.join("comparative-20260101-000000").exists());
        assert!(base.join("notes.txt").exists());
        assert!(out_dir.is_dir());
    }

    #[test]
    fn prepare_keeps_previous_runs_when_cleaning_disabled() {
        let dir = tempdir().unwrap();
        let base = dir.path().join("results");
        fs::create_dir_all(base.join("comparative-20260101-000000")).unwrap();

        let cfg = RunConfig {
            results_base: base.clone(),
            clean_results: false,
            ..RunConfig::default()
        };
        let _ = prepare_results_dir(&cfg).unwrap();
        assert!(base.join("comparative-20260101-000000").exists());
    }

    #[test]
    fn snapshot_scans_all_three_counters() {
        let text = "\
requests_total{route=\"/\",zone=\"zone-a\"} 10\n\
carbon_intensity_exposure_total{route=\"/\",zone=\"zone-a\"} 1200\n\
co2e_estimated_total{route=\"/\",zone=\"zone-a\"} 3.5\n";
        let snapshot = MetricsSnapshot::scan(text, "/");
        assert_eq!(snapshot.requests.total, 10.0);
        assert_eq!(snapshot.exposure.total, 1200.0);
        assert_eq!(snapshot.co2e.total, 3.5);
    }
}
