//! Scenario matrix construction
//!
//! Builds the ordered list of policy modes one evaluation run walks
//! through: the three carbon-aware priority modes, conditionally a
//! provider-timeout failure scenario and an explicit cross-region-to-
//! green mode, then the non-carbon-aware baselines. Order matters: the
//! canonical baseline must exist for baseline-relative deltas to be
//! meaningful, though its absence only degrades the deltas to zero.

use ceval_core::FixtureExpectation;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Canonical baseline scenario name all "saved" deltas are computed against.
pub const BASELINE_SCENARIO: &str = "baseline_no_carbon_balanced";

/// Router priority mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PriorityMode {
    /// Carbon weight dominates
    CarbonFirst,
    /// Default weight mix
    Balanced,
    /// Latency weight dominates
    LatencyFirst,
}

impl PriorityMode {
    /// Wire value used in the router configuration.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::CarbonFirst => "carbon-first",
            Self::Balanced => "balanced",
            Self::LatencyFirst => "latency-first",
        }
    }
}

/// One evaluated routing-policy configuration.
///
/// Immutable once built; consumed exactly once by the configuration
/// mutator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicyMode {
    /// Scenario name (also the report row key)
    pub name: String,
    /// Whether carbon awareness is enabled
    pub enabled: bool,
    /// Priority mode to configure
    pub priority_mode: PriorityMode,
    /// Route-class override, when the mode pins one
    #[serde(default)]
    pub route_class: Option<String>,
    /// Constraint bounds merged into the policy's constraints map
    #[serde(default)]
    pub constraints_override: BTreeMap<String, f64>,
    /// Weights merged into the policy's weights map
    #[serde(default)]
    pub weights_override: BTreeMap<String, f64>,
    /// Carbon provider override (failure scenario)
    #[serde(default)]
    pub provider: Option<String>,
    /// Provider timeout override in milliseconds (failure scenario)
    #[serde(default)]
    pub provider_timeout_ms: Option<u64>,
}

impl PolicyMode {
    /// Plain mode with no overrides.
    #[must_use]
    pub fn new(name: impl Into<String>, enabled: bool, priority_mode: PriorityMode) -> Self {
        Self {
            name: name.into(),
            enabled,
            priority_mode,
            route_class: None,
            constraints_override: BTreeMap::new(),
            weights_override: BTreeMap::new(),
            provider: None,
            provider_timeout_ms: None,
        }
    }

    /// With a route-class override.
    #[must_use]
    pub fn with_route_class(mut self, route_class: impl Into<String>) -> Self {
        self.route_class = Some(route_class.into());
        self
    }

    /// Whether this is one of the non-carbon-aware baselines.
    #[inline]
    #[must_use]
    pub fn is_baseline(&self) -> bool {
        self.name.starts_with("baseline_no_carbon_")
    }

    /// Whether this mode routes with carbon awareness.
    #[inline]
    #[must_use]
    pub fn is_carbon_aware(&self) -> bool {
        self.enabled
    }
}

fn explicit_cross_region_mode() -> PolicyMode {
    let mut mode = PolicyMode::new(
        "explicit_cross_region_to_green",
        true,
        PriorityMode::CarbonFirst,
    )
    .with_route_class("flexible");
    mode.constraints_override = BTreeMap::from([
        ("max_added_latency_ms".to_string(), 1000.0),
        ("max_error_rate".to_string(), 1.0),
        ("max_request_share_percent".to_string(), 100.0),
    ]);
    mode.weights_override = BTreeMap::from([
        ("w_carbon".to_string(), 1.0),
        ("w_latency".to_string(), 0.0),
        ("w_errors".to_string(), 0.0),
        ("w_cost".to_string(), 0.0),
    ]);
    mode
}

fn provider_timeout_mode() -> PolicyMode {
    let mut mode = PolicyMode::new(
        "carbon_first_provider_timeout",
        true,
        PriorityMode::CarbonFirst,
    )
    .with_route_class("flexible");
    mode.provider = Some("slow-mock".to_string());
    mode.provider_timeout_ms = Some(5);
    mode
}

/// Build the ordered scenario matrix.
///
/// The provider-timeout failure scenario is gated by `failure_scenario`;
/// the explicit cross-region mode by the existence of a non-trivial
/// fixture expectation.
#[must_use]
pub fn build_matrix(
    failure_scenario: bool,
    expectation: Option<&FixtureExpectation>,
) -> Vec<PolicyMode> {
    let mut modes = vec![
        PolicyMode::new("carbon_first", true, PriorityMode::CarbonFirst),
        PolicyMode::new("balanced", true, PriorityMode::Balanced),
        PolicyMode::new("latency_first", true, PriorityMode::LatencyFirst),
    ];
    if failure_scenario {
        modes.push(provider_timeout_mode());
    }
    if expectation.is_some() {
        modes.push(explicit_cross_region_mode());
    }
    modes.push(
        PolicyMode::new(
            "baseline_no_carbon_strict_local",
            false,
            PriorityMode::LatencyFirst,
        )
        .with_route_class("strict-local"),
    );
    modes.push(
        PolicyMode::new(
            "baseline_no_carbon_latency_first",
            false,
            PriorityMode::LatencyFirst,
        )
        .with_route_class("flexible"),
    );
    modes.push(
        PolicyMode::new(BASELINE_SCENARIO, false, PriorityMode::Balanced)
            .with_route_class("flexible"),
    );
    modes
}

#[cfg(test)]
mod tests {
    use super::*;
    use ceval_core::{REGION_EAST, REGION_WEST};

    fn expectation() -> FixtureExpectation {
        FixtureExpectation {
            greener_region: REGION_EAST.to_string(),
            expected_from: REGION_WEST.to_string(),
            expected_to: REGION_EAST.to_string(),
        }
    }

    #[test]
    fn full_matrix_order() {
        let modes = build_matrix(true, Some(&expectation()));
        let names: Vec<&str> = modes.iter().map(|m| m.name.as_str()).collect();
        assert_eq!(
            names,
            vec![
                "carbon_first",
                "balanced",
                "latency_first",
                "carbon_first_provider_timeout",
                "explicit_cross_region_to_green",
                "baseline_no_carbon_strict_local",
                "baseline_no_carbon_latency_first",
                "baseline_no_carbon_balanced",
            ]
        );
    }

    #[test]
    fn failure_scenario_gated() {
        let modes = build_matrix(false, None);
        assert!(modes
            .iter()
            .all(|m| m.name != "carbon_first_provider_timeout"));
        assert!(modes
            .iter()
            .all(|m| m.name != "explicit_cross_region_to_green"));
        assert_eq!(modes.len(), 6);
    }

    #[test]
    fn baseline_always_present_and_last() {
        let modes = build_matrix(true, Some(&expectation()));
        assert_eq!(modes.last().unwrap().name, BASELINE_SCENARIO);
        assert!(modes.last().unwrap().is_baseline());
        assert!(!modes.last().unwrap().is_carbon_aware());
    }

    #[test]
    fn explicit_cross_mode_overrides() {
        let modes = build_matrix(false, Some(&expectation()));
        let mode = modes
            .iter()
            .find(|m| m.name == "explicit_cross_region_to_green")
            .unwrap();
        assert_eq!(mode.weights_override.get("w_carbon"), Some(&1.0));
        assert_eq!(
            mode.constraints_override.get("max_added_latency_ms"),
            Some(&1000.0)
        );
        assert_eq!(mode.route_class.as_deref(), Some("flexible"));
    }

    #[test]
    fn timeout_mode_provider_override() {
        let modes = build_matrix(true, None);
        let mode = modes
            .iter()
            .find(|m| m.name == "carbon_first_provider_timeout")
            .unwrap();
        assert_eq!(mode.provider.as_deref(), Some("slow-mock"));
        assert_eq!(mode.provider_timeout_ms, Some(5));
    }
}
