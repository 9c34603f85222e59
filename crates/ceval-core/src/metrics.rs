//! Counter-exposition parsing and before/after reconciliation
//!
//! The router exposes plaintext counters, one sample per line:
//! `name{label="value",...} number`. The reconciler sums a metric across
//! all lines matching a required `route` label (any label order, extra
//! labels tolerated) while keeping a per-`zone` breakdown, and computes
//! clamped non-negative deltas between two snapshots so a restarted
//! router (counters reset to zero) reports zero rather than a negative
//! delta.

use crate::error::LineError;
use std::collections::BTreeMap;

/// Label carrying the route filter.
pub const ROUTE_LABEL: &str = "route";
/// Label carrying the zone breakdown key.
pub const ZONE_LABEL: &str = "zone";

/// One successfully parsed exposition line.
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    /// Metric name before the label block
    pub name: String,
    /// Label pairs in file order
    pub labels: Vec<(String, String)>,
    /// Sample value
    pub value: f64,
}

impl Sample {
    /// Value of a label, if present.
    #[must_use]
    pub fn label(&self, key: &str) -> Option<&str> {
        self.labels
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

/// Parse a single exposition line.
///
/// Comment and blank lines are not an error; they yield `Ok(None)`.
pub fn parse_line(raw: &str) -> Result<Option<Sample>, LineError> {
    let line = raw.trim();
    if line.is_empty() || line.starts_with('#') {
        return Ok(None);
    }

    let open = line.find('{').ok_or(LineError::MissingLabels)?;
    let close = line[open..]
        .find('}')
        .map(|i| open + i)
        .ok_or(LineError::MissingLabels)?;

    let name = line[..open].trim().to_string();
    if name.is_empty() {
        return Err(LineError::MissingLabels);
    }

    let mut labels = Vec::new();
    let label_block = &line[open + 1..close];
    for pair in label_block.split(',') {
        let pair = pair.trim();
        if pair.is_empty() {
            continue;
        }
        let (key, value) = pair
            .split_once('=')
            .ok_or_else(|| LineError::MalformedLabel(pair.to_string()))?;
        let value = value
            .strip_prefix('"')
            .and_then(|v| v.strip_suffix('"'))
            .ok_or_else(|| LineError::MalformedLabel(pair.to_string()))?;
        labels.push((key.trim().to_string(), value.to_string()));
    }

    let value_str = line[close + 1..].trim();
    let value_str = value_str.split_whitespace().next().unwrap_or("");
    let value: f64 = value_str
        .parse()
        .map_err(|_| LineError::BadValue(value_str.to_string()))?;
    if !value.is_finite() {
        return Err(LineError::BadValue(value_str.to_string()));
    }

    Ok(Some(Sample {
        name,
        labels,
        value,
    }))
}

/// Summed counter snapshot for one metric name under one route filter.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CounterScan {
    /// Sum across all matching lines
    pub total: f64,
    /// Per-zone partial sums (zone label may be empty)
    pub by_zone: BTreeMap<String, f64>,
}

impl CounterScan {
    /// Scan exposition text for `metric_name` restricted to lines whose
    /// `route` label equals `route_filter` exactly.
    ///
    /// Unparsable and non-matching lines are skipped; they never abort
    /// the scan.
    #[must_use]
    pub fn scan(text: &str, metric_name: &str, route_filter: &str) -> Self {
        let mut out = Self::default();
        for raw in text.lines() {
            let sample = match parse_line(raw) {
                Ok(Some(sample)) => sample,
                Ok(None) => continue,
                Err(err) => {
                    tracing::trace!(line = raw, %err, "skipping exposition line");
                    continue;
                }
            };
            if sample.name != metric_name {
                continue;
            }
            if sample.label(ROUTE_LABEL) != Some(route_filter) {
                continue;
            }
            let zone = sample.label(ZONE_LABEL).unwrap_or("").to_string();
            *out.by_zone.entry(zone).or_insert(0.0) += sample.value;
            out.total += sample.value;
        }
        out
    }
}

/// Clamped non-negative delta between two counter snapshots.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CounterDelta {
    /// `max(after.total - before.total, 0)`
    pub total: f64,
    /// Per-zone clamped deltas, keyed by the after-snapshot zones
    pub by_zone: BTreeMap<String, f64>,
}

impl CounterDelta {
    /// Reconcile a before/after snapshot pair.
    ///
    /// A counter that went backwards (process restart or reset) clamps
    /// to zero, overall and per zone.
    #[must_use]
    pub fn between(before: &CounterScan, after: &CounterScan) -> Self {
        let total = (after.total - before.total).max(0.0);
        let by_zone = after
            .by_zone
            .iter()
            .map(|(zone, after_value)| {
                let before_value = before.by_zone.get(zone).copied().unwrap_or(0.0);
                (zone.clone(), (after_value - before_value).max(0.0))
            })
            .collect();
        Self { total, by_zone }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const TEXT: &str = r#"
# TYPE requests_total counter
requests_total{route="/",zone="zone-a"} 12
requests_total{zone="zone-b",route="/"} 7
requests_total{route="/other",zone="zone-a"} 99
errors_total{route="/",zone="zone-a"} 1
requests_total{route="/"} 3
garbage line without labels
requests_total{route="/",zone="zone-a"} not-a-number
"#;

    #[test]
    fn scan_sums_matching_lines_any_label_order() {
        let scan = CounterScan::scan(TEXT, "requests_total", "/");
        assert_eq!(scan.total, 22.0);
        assert_eq!(scan.by_zone.get("zone-a"), Some(&12.0));
        assert_eq!(scan.by_zone.get("zone-b"), Some(&7.0));
        assert_eq!(scan.by_zone.get(""), Some(&3.0));
    }

    #[test]
    fn scan_skips_malformed_and_non_matching() {
        // the arithmetic sum of the three matching lines, nothing else
        let scan = CounterScan::scan(TEXT, "requests_total", "/");
        let manual: f64 = 12.0 + 7.0 + 3.0;
        assert_eq!(scan.total, manual);
    }

    #[test]
    fn scan_tolerates_extra_labels() {
        let text = r#"requests_total{extra="x",route="/",zone="z",more="y"} 5"#;
        let scan = CounterScan::scan(text, "requests_total", "/");
        assert_eq!(scan.total, 5.0);
        assert_eq!(scan.by_zone.get("z"), Some(&5.0));
    }

    #[test]
    fn parse_line_comment_and_blank() {
        assert_eq!(parse_line("# HELP something").unwrap(), None);
        assert_eq!(parse_line("   ").unwrap(), None);
    }

    #[test]
    fn parse_line_rejects_bad_value() {
        let err = parse_line(r#"m{route="/"} nan-ish"#).unwrap_err();
        assert!(matches!(err, LineError::BadValue(_)));
    }

    #[test]
    fn parse_line_rejects_missing_labels() {
        let err = parse_line("just_a_name 5").unwrap_err();
        assert_eq!(err, LineError::MissingLabels);
    }

    #[test]
    fn delta_clamps_counter_reset_to_zero() {
        let before = CounterScan {
            total: 120.0,
            by_zone: BTreeMap::from([("z".to_string(), 120.0)]),
        };
        let after = CounterScan {
            total: 80.0,
            by_zone: BTreeMap::from([("z".to_string(), 80.0)]),
        };
        let delta = CounterDelta::between(&before, &after);
        assert_eq!(delta.total, 0.0);
        assert_eq!(delta.by_zone.get("z"), Some(&0.0));
    }

    #[test]
    fn delta_normal_growth() {
        let before = CounterScan::scan(r#"m{route="/",zone="a"} 10"#, "m", "/");
        let after = CounterScan::scan(
            "m{route=\"/\",zone=\"a\"} 25\nm{route=\"/\",zone=\"b\"} 4",
            "m",
            "/",
        );
        let delta = CounterDelta::between(&before, &after);
        assert_eq!(delta.total, 19.0);
        assert_eq!(delta.by_zone.get("a"), Some(&15.0));
        assert_eq!(delta.by_zone.get("b"), Some(&4.0));
    }
}
