//! Per-request routing classification
//!
//! Pure, stateless functions that map region names and response metadata
//! to region relations, reroute directions, expected-cross-to-green hit
//! accounting, carbon-saved-vs-local figures and a decision brief —
//! independent of whatever reason the router reports for itself.

use crate::region::{Direction, RegionRelation, ZoneRegionMap};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Filter reason the router attaches to zones it kept in the running.
pub const REASON_ELIGIBLE: &str = "eligible";
/// Raw decision reason marking a score-based win.
pub const REASON_BEST_SCORE: &str = "best-score";

/// Parse delimited `zone:value` pairs (`"zoneA:100;zoneB:50"`).
///
/// Pairs that do not split or do not carry a finite number are dropped.
#[must_use]
pub fn parse_zone_intensities(raw: &str) -> Vec<(String, f64)> {
    raw.split(';')
        .filter_map(|pair| {
            let (zone, value) = pair.trim().split_once(':')?;
            let value: f64 = value.trim().parse().ok()?;
            if zone.trim().is_empty() || !value.is_finite() {
                return None;
            }
            Some((zone.trim().to_string(), value))
        })
        .collect()
}

/// Parse delimited `zone:reason` pairs (`"zoneA:eligible;zoneB:capacity>8"`).
#[must_use]
pub fn parse_zone_reasons(raw: &str) -> Vec<(String, String)> {
    raw.split(';')
        .filter_map(|pair| {
            let (zone, reason) = pair.trim().split_once(':')?;
            if zone.trim().is_empty() || reason.trim().is_empty() {
                return None;
            }
            Some((zone.trim().to_string(), reason.trim().to_string()))
        })
        .collect()
}

/// Carbon saved versus the best candidate in the requester's own region.
///
/// Baseline (non-carbon-aware) scenarios force the `NotApplicable`
/// sentinel instead of computing a comparison that has no meaning there.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum CarbonSavings {
    /// Baseline scenario; the comparison is not meaningful
    NotApplicable,
    /// Computed savings against the local-best candidate
    Computed {
        /// `max(local_best - selected, 0)` in g/kWh
        saved_g_per_kwh: f64,
        /// `saved / local_best * 100`
        saved_percent: f64,
    },
}

impl CarbonSavings {
    /// Zero-valued computed savings.
    #[inline]
    #[must_use]
    pub fn zero() -> Self {
        Self::Computed {
            saved_g_per_kwh: 0.0,
            saved_percent: 0.0,
        }
    }

    /// CSV rendering: `n/a` for the sentinel, fixed precision otherwise.
    #[must_use]
    pub fn csv_fields(&self) -> (String, String) {
        match self {
            Self::NotApplicable => ("n/a".to_string(), "n/a".to_string()),
            Self::Computed {
                saved_g_per_kwh,
                saved_percent,
            } => (
                format!("{saved_g_per_kwh:.3}"),
                format!("{saved_percent:.2}"),
            ),
        }
    }
}

/// Carbon saved against the requester's local-best eligible zone.
///
/// `eligible_intensities` is the delimited `zone:value` header; only
/// zones mapping to `requested_region` are candidates. Yields zero when
/// no local candidate exists, when the local best is non-positive, or
/// when the selected intensity is unknown.
#[must_use]
pub fn carbon_saved_vs_local(
    requested_region: &str,
    selected_intensity: Option<f64>,
    eligible_intensities: &str,
    zones: &ZoneRegionMap,
) -> CarbonSavings {
    let local_best = parse_zone_intensities(eligible_intensities)
        .into_iter()
        .filter(|(zone, _)| zones.region_for(zone) == Some(requested_region))
        .map(|(_, v)| v)
        .fold(None, |acc: Option<f64>, v| {
            Some(acc.map_or(v, |best| best.min(v)))
        });

    let (Some(local_best), Some(selected)) = (local_best, selected_intensity) else {
        return CarbonSavings::zero();
    };
    if local_best <= 0.0 {
        return CarbonSavings::zero();
    }
    let saved = (local_best - selected).max(0.0);
    CarbonSavings::Computed {
        saved_g_per_kwh: saved,
        saved_percent: saved / local_best * 100.0,
    }
}

/// Classify the router's decision independently of its raw reason.
///
/// A local-region zone filtered for any reason other than `eligible`
/// combined with a cross-region outcome is a forced fallback; otherwise
/// the raw reason decides between the green and plain variants.
#[must_use]
pub fn decision_brief(
    requested_region: &str,
    relation: RegionRelation,
    raw_reason: &str,
    zone_filter_reasons: &str,
    zones: &ZoneRegionMap,
) -> String {
    let filtered_local: BTreeSet<String> = parse_zone_reasons(zone_filter_reasons)
        .into_iter()
        .filter(|(zone, reason)| {
            reason != REASON_ELIGIBLE && zones.region_for(zone) == Some(requested_region)
        })
        .map(|(_, reason)| reason)
        .collect();

    let score_win = raw_reason == REASON_BEST_SCORE;
    match relation {
        RegionRelation::CrossRegion if !filtered_local.is_empty() => {
            let reasons: Vec<String> = filtered_local.into_iter().collect();
            format!("reroute-fallback({})", reasons.join(","))
        }
        RegionRelation::CrossRegion if score_win => "reroute-green".to_string(),
        RegionRelation::CrossRegion => "reroute".to_string(),
        RegionRelation::Local if score_win => "local-green".to_string(),
        RegionRelation::Local => "local".to_string(),
        RegionRelation::Unknown if raw_reason.is_empty() => "unknown".to_string(),
        RegionRelation::Unknown => raw_reason.to_string(),
    }
}

/// Running tally of expected-cross-to-green eligibility and hits.
///
/// Eligible: the requested region equals the fixture's expected source.
/// Hit: additionally cross-region with the destination equal to the
/// expected target. Unknown-region destinations stay in the denominator
/// as misses.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExpectedCrossTracker {
    /// Requests whose requested region matched the expected source
    pub eligible: u64,
    /// Eligible requests that landed cross-region at the expected target
    pub hits: u64,
}

impl ExpectedCrossTracker {
    /// Account one request against an `(expected_from, expected_to)`
    /// direction. A `None` expectation records nothing.
    pub fn observe(
        &mut self,
        expectation: Option<(&str, &str)>,
        requested_region: &str,
        selected_region: Option<&str>,
        relation: RegionRelation,
    ) {
        let Some((expected_from, expected_to)) = expectation else {
            return;
        };
        if requested_region != expected_from {
            return;
        }
        self.eligible += 1;
        if relation.is_cross_region() && selected_region == Some(expected_to) {
            self.hits += 1;
        }
    }

    /// Hit rate as a percentage; zero when nothing was eligible.
    #[must_use]
    pub fn rate_percent(&self) -> f64 {
        if self.eligible == 0 {
            0.0
        } else {
            self.hits as f64 / self.eligible as f64 * 100.0
        }
    }
}

/// Direction-specific reroute tally for the two canonical regions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RerouteCounts {
    /// All cross-region outcomes, any direction
    pub cross_region: u64,
    /// us-east origins landing in us-west
    pub east_to_west: u64,
    /// us-west origins landing in us-east
    pub west_to_east: u64,
}

impl RerouteCounts {
    /// Account one request outcome.
    pub fn observe(
        &mut self,
        requested_region: &str,
        selected_region: Option<&str>,
        relation: RegionRelation,
    ) {
        if !relation.is_cross_region() {
            return;
        }
        self.cross_region += 1;
        if let Some(selected) = selected_region {
            match Direction::between(requested_region, selected) {
                Some(Direction::EastToWest) => self.east_to_west += 1,
                Some(Direction::WestToEast) => self.west_to_east += 1,
                None => {}
            }
        }
    }
}
