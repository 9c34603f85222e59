//! Zone-to-region mapping and region relation classification
//!
//! The router selects *zones*; the evaluation reasons about *regions*.
//! The map is derived once from the router configuration, with a
//! substring heuristic covering zones the config leaves unmapped.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Canonical eastern region name.
pub const REGION_EAST: &str = "us-east";
/// Canonical western region name.
pub const REGION_WEST: &str = "us-west";

/// The two declared origin regions synthetic load is generated for.
pub const CANONICAL_REGIONS: [&str; 2] = [REGION_EAST, REGION_WEST];

/// Zone name to region name lookup, derived from the configuration.
#[derive(Debug, Clone, Default)]
pub struct ZoneRegionMap {
    entries: HashMap<String, String>,
}

impl ZoneRegionMap {
    /// Build from explicit (zone, region) pairs.
    #[must_use]
    pub fn from_pairs<I>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let entries = pairs
            .into_iter()
            .filter(|(zone, region)| !zone.is_empty() && !region.is_empty())
            .collect();
        Self { entries }
    }

    /// Region for a zone.
    ///
    /// Falls back to an "east"/"west" substring heuristic when the zone is
    /// unmapped; returns `None` when neither applies.
    #[must_use]
    pub fn region_for(&self, zone: &str) -> Option<&str> {
        if let Some(region) = self.entries.get(zone) {
            return Some(region.as_str());
        }
        let z = zone.to_ascii_lowercase();
        if z.contains("east") {
            Some(REGION_EAST)
        } else if z.contains("west") {
            Some(REGION_WEST)
        } else {
            None
        }
    }

    /// Number of explicitly mapped zones.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no zones are explicitly mapped.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Relation between the requested region and the selected zone's region.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RegionRelation {
    /// Selected zone sits in the requester's own region
    Local,
    /// Both regions known and different
    CrossRegion,
    /// Either side unknown
    Unknown,
}

impl RegionRelation {
    /// Classify a requested region against a selected region.
    #[must_use]
    pub fn classify(requested: &str, selected: Option<&str>) -> Self {
        let Some(selected) = selected.filter(|s| !s.is_empty()) else {
            return Self::Unknown;
        };
        if requested.is_empty() {
            return Self::Unknown;
        }
        if requested == selected {
            Self::Local
        } else {
            Self::CrossRegion
        }
    }

    /// True for the cross-region variant.
    #[inline]
    #[must_use]
    pub fn is_cross_region(self) -> bool {
        matches!(self, Self::CrossRegion)
    }
}

impl std::fmt::Display for RegionRelation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Local => "local",
            Self::CrossRegion => "cross-region",
            Self::Unknown => "unknown",
        };
        write!(f, "{s}")
    }
}

/// Canonical reroute direction between the two known regions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Direction {
    /// us-east origin landed in us-west
    EastToWest,
    /// us-west origin landed in us-east
    WestToEast,
}

impl Direction {
    /// Direction for a cross-region pair, only for the two canonical
    /// regions; any other pair yields `None`.
    #[must_use]
    pub fn between(requested: &str, selected: &str) -> Option<Self> {
        match (requested, selected) {
            (REGION_EAST, REGION_WEST) => Some(Self::EastToWest),
            (REGION_WEST, REGION_EAST) => Some(Self::WestToEast),
            _ => None,
        }
    }

    /// Parse an `"a->b"` direction string.
    #[must_use]
    pub fn parse(direction: &str) -> Option<(String, String)> {
        let (from, to) = direction.split_once("->")?;
        let from = from.trim();
        let to = to.trim();
        if from.is_empty() || to.is_empty() {
            return None;
        }
        Some((from.to_string(), to.to_string()))
    }
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::EastToWest => "us-east->us-west",
            Self::WestToEast => "us-west->us-east",
        };
        write!(f, "{s}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_map() -> ZoneRegionMap {
        ZoneRegionMap::from_pairs(vec![
            ("zone-a".to_string(), REGION_EAST.to_string()),
            ("zone-b".to_string(), REGION_WEST.to_string()),
        ])
    }

    #[test]
    fn explicit_mapping_wins() {
        let map = sample_map();
        assert_eq!(map.region_for("zone-a"), Some(REGION_EAST));
        assert_eq!(map.region_for("zone-b"), Some(REGION_WEST));
    }

    #[test]
    fn substring_fallback() {
        let map = ZoneRegionMap::default();
        assert_eq!(map.region_for("eu-east-2"), Some(REGION_EAST));
        assert_eq!(map.region_for("WEST-edge"), Some(REGION_WEST));
        assert_eq!(map.region_for("central-1"), None);
    }

    #[test]
    fn relation_cross_region() {
        assert_eq!(
            RegionRelation::classify(REGION_EAST, Some(REGION_WEST)),
            RegionRelation::CrossRegion
        );
    }

    #[test]
    fn relation_local() {
        assert_eq!(
            RegionRelation::classify(REGION_EAST, Some(REGION_EAST)),
            RegionRelation::Local
        );
    }

    #[test]
    fn relation_unknown() {
        assert_eq!(
            RegionRelation::classify(REGION_EAST, None),
            RegionRelation::Unknown
        );
        assert_eq!(
            RegionRelation::classify(REGION_EAST, Some("")),
            RegionRelation::Unknown
        );
        assert_eq!(
            RegionRelation::classify("", Some(REGION_WEST)),
            RegionRelation::Unknown
        );
    }

    #[test]
    fn direction_only_for_canonical_pairs() {
        assert_eq!(
            Direction::between(REGION_EAST, REGION_WEST),
            Some(Direction::EastToWest)
        );
        assert_eq!(
            Direction::between(REGION_WEST, REGION_EAST),
            Some(Direction::WestToEast)
        );
        assert_eq!(Direction::between(REGION_EAST, "eu-central"), None);
        assert_eq!(Direction::between(REGION_EAST, REGION_EAST), None);
    }

    #[test]
    fn direction_parse() {
        assert_eq!(
            Direction::parse("us-west->us-east"),
            Some((REGION_WEST.to_string(), REGION_EAST.to_string()))
        );
        assert_eq!(Direction::parse("none"), None);
        assert_eq!(Direction::parse("->us-east"), None);
    }
}
