//! Run configuration
//!
//! Built once from the environment (with CLI overrides layered on top in
//! `main`) and treated as immutable for the whole run. Every knob has a
//! default so a bare `ceval` invocation against a local deployment works.

use crate::error::EngineError;
use ceval_config::{CarbonOverrides, VarianceProfile};
use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// How the per-request region header is chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RegionInputMode {
    /// Send the loop's nominal region unchanged
    #[default]
    PassThrough,
    /// Pin every request to us-east
    FixedEast,
    /// Pin every request to us-west
    FixedWest,
    /// Coin-flip per request
    Random,
}

impl RegionInputMode {
    /// Canonical setting value.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::PassThrough => "pass-through",
            Self::FixedEast => "fixed-east",
            Self::FixedWest => "fixed-west",
            Self::Random => "random",
        }
    }
}

impl FromStr for RegionInputMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "passthrough" | "pass-through" => Ok(Self::PassThrough),
            "fixed-east" | "east" => Ok(Self::FixedEast),
            "fixed-west" | "west" => Ok(Self::FixedWest),
            "random" => Ok(Self::Random),
            other => Err(format!("unknown region input mode `{other}`")),
        }
    }
}

/// When the router image is rebuilt during a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BuildMode {
    /// Never rebuild, reuse whatever image exists
    #[default]
    Reuse,
    /// Rebuild once, on the first mode only
    BuildOnce,
    /// Rebuild before every mode
    BuildPerMode,
}

impl FromStr for BuildMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "reuse" | "none" => Ok(Self::Reuse),
            "once" | "build-once" => Ok(Self::BuildOnce),
            "per-mode" | "always" => Ok(Self::BuildPerMode),
            other => Err(format!("unknown build mode `{other}`")),
        }
    }
}

/// Immutable settings for one evaluation run.
#[derive(Debug, Clone)]
pub struct RunConfig {
    /// Router configuration file driven by the mutator
    pub config_path: PathBuf,
    /// Compose file of the deployment
    pub compose_file: PathBuf,
    /// Compose service name of the router
    pub router_service: String,
    /// Compose service names of the backends, started once up front
    pub backend_services: Vec<String>,
    /// Directory results land under
    pub results_base: PathBuf,
    /// Remove previous results before the run
    pub clean_results: bool,
    /// Route path the synthetic load targets
    pub route: String,
    /// Route label value the counter scans filter on
    pub metric_filter_route: String,
    /// Requests sent per canonical region per mode
    pub requests_per_region: u32,
    /// Router base URL for load and readiness
    pub base_url: String,
    /// Region header selection
    pub region_input: RegionInputMode,
    /// Carbon-variance profile for the base document
    pub variance: VarianceProfile,
    /// Include the provider-timeout failure scenario
    pub failure_scenario: bool,
    /// Run-level carbon-provider overrides
    pub carbon_overrides: CarbonOverrides,
    /// Carbon-intensity fixture the expectation derives from
    pub fixture_path: PathBuf,
    /// Attempts for each orchestration command
    pub orchestration_attempts: u32,
    /// Fixed delay between orchestration retries
    pub orchestration_retry_delay: Duration,
    /// Readiness polling attempts per mode
    pub readiness_attempts: u32,
    /// Delay between readiness polls
    pub readiness_delay: Duration,
    /// Router image rebuild policy
    pub build_mode: BuildMode,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            config_path: PathBuf::from("config/router.json"),
            compose_file: PathBuf::from("docker-compose.yml"),
            router_service: "router".to_string(),
            backend_services: vec!["app-east".to_string(), "app-west".to_string()],
            results_base: PathBuf::from("results"),
            clean_results: true,
            route: "/".to_string(),
            metric_filter_route: "/".to_string(),
            requests_per_region: 150,
            base_url: "http://127.0.0.1:18080".to_string(),
            region_input: RegionInputMode::PassThrough,
            variance: VarianceProfile::Default,
            failure_scenario: false,
            carbon_overrides: CarbonOverrides::default(),
            fixture_path: PathBuf::from("traces/carbon_fixture.json"),
            orchestration_attempts: 3,
            orchestration_retry_delay: Duration::from_secs(2),
            readiness_attempts: 90,
            readiness_delay: Duration::from_millis(500),
            build_mode: BuildMode::Reuse,
        }
    }
}

fn var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn parse_var<T: FromStr>(name: &str) -> Result<Option<T>, EngineError> {
    match var(name) {
        None => Ok(None),
        Some(raw) => raw.trim().parse::<T>().map(Some).map_err(|_| {
            EngineError::InvalidSetting {
                name: name.to_string(),
                value: raw,
            }
        }),
    }
}

fn parse_bool_var(name: &str) -> Result<Option<bool>, EngineError> {
    match var(name) {
        None => Ok(None),
        Some(raw) => match raw.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(Some(true)),
            "0" | "false" | "no" | "off" => Ok(Some(false)),
            _ => Err(EngineError::InvalidSetting {
                name: name.to_string(),
                value: raw,
            }),
        },
    }
}

impl RunConfig {
    /// Build the run configuration from `CEVAL_*` environment variables,
    /// falling back to defaults for everything unset.
    pub fn from_env() -> Result<Self, EngineError> {
        let mut cfg = Self::default();

        if let Some(v) = var("CEVAL_CONFIG_PATH") {
            cfg.config_path = PathBuf::from(v);
        }
        if let Some(v) = var("CEVAL_COMPOSE_FILE") {
            cfg.compose_file = PathBuf::from(v);
        }
        if let Some(v) = var("CEVAL_ROUTER_SERVICE") {
            cfg.router_service = v;
        }
        if let Some(v) = var("CEVAL_BACKEND_SERVICES") {
            cfg.backend_services = v
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();
        }
        if let Some(v) = var("CEVAL_RESULTS_DIR") {
            cfg.results_base = PathBuf::from(v);
        }
        if let Some(v) = parse_bool_var("CEVAL_CLEAN_RESULTS")? {
            cfg.clean_results = v;
        }
        if let Some(v) = var("CEVAL_ROUTE") {
            cfg.metric_filter_route.clone_from(&v);
            cfg.route = v;
        }
        if let Some(v) = var("CEVAL_METRIC_FILTER_ROUTE") {
            cfg.metric_filter_route = v;
        }
        if let Some(v) = parse_var::<u32>("CEVAL_REQUESTS_PER_REGION")? {
            cfg.requests_per_region = v;
        }
        if let Some(v) = var("CEVAL_BASE_URL") {
            cfg.base_url = v.trim_end_matches('/').to_string();
        }
        if let Some(v) = parse_var::<RegionInputMode>("CEVAL_REGION_INPUT")? {
            cfg.region_input = v;
        }
        if let Some(v) = parse_bool_var("CEVAL_HIGH_VARIANCE")? {
            cfg.variance = if v {
                VarianceProfile::HighVariance
            } else {
                VarianceProfile::Default
            };
        }
        if let Some(v) = parse_bool_var("CEVAL_FAILURE_SCENARIO")? {
            cfg.failure_scenario = v;
        }
        cfg.carbon_overrides = CarbonOverrides {
            provider: var("CEVAL_CARBON_PROVIDER"),
            fixture_path: var("CEVAL_CARBON_FIXTURE"),
            api_key: var("CEVAL_CARBON_API_KEY"),
            base_url: var("CEVAL_CARBON_BASE_URL"),
        };
        if let Some(v) = var("CEVAL_FIXTURE_PATH") {
            cfg.fixture_path = PathBuf::from(v);
        } else if let Some(v) = &cfg.carbon_overrides.fixture_path {
            cfg.fixture_path = PathBuf::from(v);
        }
        if let Some(v) = parse_var::<u32>("CEVAL_ORCH_ATTEMPTS")? {
            cfg.orchestration_attempts = v.max(1);
        }
        if let Some(v) = parse_var::<u64>("CEVAL_ORCH_RETRY_DELAY_MS")? {
            cfg.orchestration_retry_delay = Duration::from_millis(v);
        }
        if let Some(v) = parse_var::<u32>("CEVAL_READINESS_ATTEMPTS")? {
            cfg.readiness_attempts = v.max(1);
        }
        if let Some(v) = parse_var::<u64>("CEVAL_READINESS_DELAY_MS")? {
            cfg.readiness_delay = Duration::from_millis(v);
        }
        if let Some(v) = parse_var::<BuildMode>("CEVAL_BUILD_MODE")? {
            cfg.build_mode = v;
        }

        Ok(cfg)
    }

    /// Router metrics endpoint.
    #[must_use]
    pub fn metrics_url(&self) -> String {
        format!("{}/metrics", self.base_url)
    }

    /// Load-target URL for the evaluated route.
    #[must_use]
    pub fn route_url(&self) -> String {
        format!("{}{}", self.base_url, self.route)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn region_input_mode_parsing() {
        assert_eq!(
            "passthrough".parse::<RegionInputMode>().unwrap(),
            RegionInputMode::PassThrough
        );
        assert_eq!(
            "fixed-east".parse::<RegionInputMode>().unwrap(),
            RegionInputMode::FixedEast
        );
        assert_eq!(
            "Random".parse::<RegionInputMode>().unwrap(),
            RegionInputMode::Random
        );
        assert!("sideways".parse::<RegionInputMode>().is_err());
    }

    #[test]
    fn build_mode_parsing() {
        assert_eq!("reuse".parse::<BuildMode>().unwrap(), BuildMode::Reuse);
        assert_eq!("once".parse::<BuildMode>().unwrap(), BuildMode::BuildOnce);
        assert_eq!(
            "per-mode".parse::<BuildMode>().unwrap(),
            BuildMode::BuildPerMode
        );
        assert!("never-ever".parse::<BuildMode>().is_err());
    }

    #[test]
    fn urls_compose_from_base() {
        let cfg = RunConfig {
            base_url: "http://localhost:9999".to_string(),
            route: "/search".to_string(),
            ..RunConfig::default()
        };
        assert_eq!(cfg.metrics_url(), "http://localhost:9999/metrics");
        assert_eq!(cfg.route_url(), "http://localhost:9999/search");
    }

    #[test]
    fn defaults_are_sane() {
        let cfg = RunConfig::default();
        assert_eq!(cfg.requests_per_region, 150);
        assert_eq!(cfg.region_input, RegionInputMode::PassThrough);
        assert!(cfg.clean_results);
        assert_eq!(cfg.build_mode, BuildMode::Reuse);
    }
}
