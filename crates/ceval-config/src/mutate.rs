//! Configuration mutation for one policy mode
//!
//! Operates on the raw JSON document so fields the evaluation does not
//! know about survive untouched. Every mutation works on a deep copy;
//! the on-disk original is only ever restored from the captured text
//! (see [`crate::guard::ConfigGuard`]).
//!
//! Per mode the mutator disables the router's adaptive-stickiness
//! plugin and zeroes hysteresis and the minimum switch interval, so
//! routing decisions are stateless and reproducible per request.

use crate::error::ConfigError;
use crate::scenario::PolicyMode;
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;

/// Carbon-variance profile applied to the base configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum VarianceProfile {
    /// Leave the configured intensities alone
    #[default]
    Default,
    /// Spread the two regions far apart to make reroutes unambiguous
    HighVariance,
}

impl VarianceProfile {
    /// Canonical setting value.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Default => "default",
            Self::HighVariance => "high-variance",
        }
    }
}

/// Optional carbon-provider overrides applied once to the base document.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CarbonOverrides {
    /// Provider identifier
    pub provider: Option<String>,
    /// Local fixture path
    pub fixture_path: Option<String>,
    /// Provider API key
    pub api_key: Option<String>,
    /// Provider base URL
    pub base_url: Option<String>,
}

impl CarbonOverrides {
    /// Whether any override is set.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.provider.is_none()
            && self.fixture_path.is_none()
            && self.api_key.is_none()
            && self.base_url.is_none()
    }
}

fn carbon_block(doc: &mut Value) -> Result<&mut Map<String, Value>, ConfigError> {
    let root = doc
        .as_object_mut()
        .ok_or_else(|| ConfigError::Shape("top level is not an object".to_string()))?;
    root.entry("carbon")
        .or_insert_with(|| Value::Object(Map::new()))
        .as_object_mut()
        .ok_or_else(|| ConfigError::Shape("carbon block is not an object".to_string()))
}

/// Apply the carbon-variance profile to a copy of the base document.
pub fn apply_variance_profile(
    base: &Value,
    profile: VarianceProfile,
) -> Result<Value, ConfigError> {
    let mut doc = base.clone();
    if profile == VarianceProfile::HighVariance {
        let carbon = carbon_block(&mut doc)?;
        carbon.insert(
            "zone_current".to_string(),
            json!({ "us-east": 120, "us-west": 780 }),
        );
        carbon.insert(
            "zone_forecast_next".to_string(),
            json!({ "us-east": 110, "us-west": 700 }),
        );
    }
    Ok(doc)
}

/// Apply run-level carbon-provider overrides to a copy of the document.
pub fn apply_carbon_overrides(
    base: &Value,
    overrides: &CarbonOverrides,
) -> Result<Value, ConfigError> {
    let mut doc = base.clone();
    if overrides.is_empty() {
        return Ok(doc);
    }
    let carbon = carbon_block(&mut doc)?;
    let fields = [
        ("provider", &overrides.provider),
        ("fixture_path", &overrides.fixture_path),
        ("api_key", &overrides.api_key),
        ("base_url", &overrides.base_url),
    ];
    for (key, value) in fields {
        if let Some(value) = value {
            carbon.insert(key.to_string(), Value::String(value.clone()));
        }
    }
    Ok(doc)
}

fn merge_numeric_map(policy: &mut Map<String, Value>, key: &str, overrides: &BTreeMap<String, f64>) {
    if overrides.is_empty() {
        return;
    }
    let target = policy
        .entry(key)
        .or_insert_with(|| Value::Object(Map::new()));
    if !target.is_object() {
        *target = Value::Object(Map::new());
    }
    if let Some(map) = target.as_object_mut() {
        for (name, value) in overrides {
            map.insert(name.clone(), json!(value));
        }
    }
}

/// Apply one policy mode onto a deep copy of the base document.
pub fn apply_mode(base: &Value, mode: &PolicyMode) -> Result<Value, ConfigError> {
    let mut doc = base.clone();

    if mode.provider.is_some() || mode.provider_timeout_ms.is_some() {
        let carbon = carbon_block(&mut doc)?;
        if let Some(provider) = &mode.provider {
            carbon.insert("provider".to_string(), Value::String(provider.clone()));
        }
        if let Some(timeout) = mode.provider_timeout_ms {
            carbon.insert("provider_timeout_ms".to_string(), json!(timeout));
        }
    }

    let proxies = doc
        .get_mut("proxies")
        .and_then(Value::as_array_mut)
        .ok_or_else(|| ConfigError::Shape("proxies is not an array".to_string()))?;

    for proxy in proxies {
        let entry = proxy
            .as_object_mut()
            .ok_or_else(|| ConfigError::Shape("proxy entry is not an object".to_string()))?;
        let policy = entry
            .entry("policy")
            .or_insert_with(|| Value::Object(Map::new()))
            .as_object_mut()
            .ok_or_else(|| ConfigError::Shape("policy block is not an object".to_string()))?;

        // Deterministic, stateless per-request decisions.
        policy.insert("plugin_enabled".to_string(), Value::Bool(false));
        policy.insert("hysteresis_delta".to_string(), json!(0.0));
        policy.insert("min_switch_interval_secs".to_string(), json!(0));

        policy.insert("carbon_aware_enabled".to_string(), Value::Bool(mode.enabled));
        policy.insert(
            "priority_mode".to_string(),
            Value::String(mode.priority_mode.as_str().to_string()),
        );
        if let Some(route_class) = &mode.route_class {
            policy.insert("route_class".to_string(), Value::String(route_class.clone()));
        }
        merge_numeric_map(policy, "constraints", &mode.constraints_override);
        merge_numeric_map(policy, "weights", &mode.weights_override);
    }

    Ok(doc)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scenario::{build_matrix, PriorityMode};
    use pretty_assertions::assert_eq;

    fn base() -> Value {
        serde_json::from_str(
            r#"{
            "proxies": [
                {
                    "app_name": "search",
                    "custom_field": "survives",
                    "policy": {
                        "plugin_enabled": true,
                        "hysteresis_delta": 0.05,
                        "min_switch_interval_secs": 30,
                        "carbon_aware_enabled": false,
                        "priority_mode": "balanced",
                        "route_class": "flexible",
                        "constraints": { "max_candidates": 8, "max_error_rate": 0.2 },
                        "weights": { "w_carbon": 0.5, "w_latency": 0.35 }
                    }
                }
            ],
            "carbon": { "provider": "mock", "provider_timeout_ms": 75 }
        }"#,
        )
        .unwrap()
    }

    #[test]
    fn mode_disables_stickiness() {
        let mode = PolicyMode::new("carbon_first", true, PriorityMode::CarbonFirst);
        let doc = apply_mode(&base(), &mode).unwrap();
        let policy = &doc["proxies"][0]["policy"];
        assert_eq!(policy["plugin_enabled"], json!(false));
        assert_eq!(policy["hysteresis_delta"], json!(0.0));
        assert_eq!(policy["min_switch_interval_secs"], json!(0));
        assert_eq!(policy["carbon_aware_enabled"], json!(true));
        assert_eq!(policy["priority_mode"], json!("carbon-first"));
    }

    #[test]
    fn overrides_merge_never_replace() {
        let mut mode = PolicyMode::new("x", true, PriorityMode::Balanced);
        mode.constraints_override = BTreeMap::from([("max_error_rate".to_string(), 1.0)]);
        mode.weights_override = BTreeMap::from([("w_carbon".to_string(), 1.0)]);
        let doc = apply_mode(&base(), &mode).unwrap();
        let policy = &doc["proxies"][0]["policy"];
        // pre-existing keys survive the merge
        assert_eq!(policy["constraints"]["max_candidates"], json!(8));
        assert_eq!(policy["constraints"]["max_error_rate"], json!(1.0));
        assert_eq!(policy["weights"]["w_latency"], json!(0.35));
        assert_eq!(policy["weights"]["w_carbon"], json!(1.0));
    }

    #[test]
    fn unknown_fields_survive() {
        let mode = PolicyMode::new("x", false, PriorityMode::LatencyFirst);
        let doc = apply_mode(&base(), &mode).unwrap();
        assert_eq!(doc["proxies"][0]["custom_field"], json!("survives"));
    }

    #[test]
    fn base_document_untouched() {
        let original = base();
        let mode = PolicyMode::new("x", true, PriorityMode::CarbonFirst);
        let _ = apply_mode(&original, &mode).unwrap();
        assert_eq!(original, base());
    }

    #[test]
    fn provider_timeout_mode_lands_in_carbon_block() {
        let modes = build_matrix(true, None);
        let mode = modes
            .iter()
            .find(|m| m.name == "carbon_first_provider_timeout")
            .unwrap();
        let doc = apply_mode(&base(), mode).unwrap();
        assert_eq!(doc["carbon"]["provider"], json!("slow-mock"));
        assert_eq!(doc["carbon"]["provider_timeout_ms"], json!(5));
    }

    #[test]
    fn variance_profile_high() {
        let doc = apply_variance_profile(&base(), VarianceProfile::HighVariance).unwrap();
        assert_eq!(doc["carbon"]["zone_current"]["us-east"], json!(120));
        assert_eq!(doc["carbon"]["zone_forecast_next"]["us-west"], json!(700));
    }

    #[test]
    fn variance_profile_default_is_identity() {
        let doc = apply_variance_profile(&base(), VarianceProfile::Default).unwrap();
        assert_eq!(doc, base());
    }

    #[test]
    fn carbon_overrides_partial() {
        let overrides = CarbonOverrides {
            provider: Some("electricitymap-local".to_string()),
            fixture_path: Some("traces/sample.json".to_string()),
            api_key: None,
            base_url: None,
        };
        let doc = apply_carbon_overrides(&base(), &overrides).unwrap();
        assert_eq!(doc["carbon"]["provider"], json!("electricitymap-local"));
        assert_eq!(doc["carbon"]["fixture_path"], json!("traces/sample.json"));
        // untouched field keeps its base value
        assert_eq!(doc["carbon"]["provider_timeout_ms"], json!(75));
    }

    #[test]
    fn shape_error_on_non_array_proxies() {
        let bad: Value = serde_json::from_str(r#"{ "proxies": 7 }"#).unwrap();
        let mode = PolicyMode::new("x", true, PriorityMode::Balanced);
        let err = apply_mode(&bad, &mode).unwrap_err();
        assert!(matches!(err, ConfigError::Shape(_)));
    }
}
