//! Read-only typed views over the router configuration document
//!
//! The configuration is mutated as raw `serde_json::Value` so unknown
//! router fields survive round-trips; these views exist only for the
//! parts the evaluation reads: zone/region pairs and the carbon block.

use ceval_core::ZoneRegionMap;
use serde::Deserialize;

/// One backend zone under a proxy entry.
#[derive(Debug, Clone, Deserialize)]
pub struct ZoneView {
    /// Zone name as the router selects it
    #[serde(default)]
    pub name: String,
    /// Region the zone belongs to
    #[serde(default)]
    pub region: Option<String>,
}

/// One proxy entry.
#[derive(Debug, Clone, Deserialize)]
pub struct ProxyView {
    /// Backend zones routable from this entry
    #[serde(default)]
    pub zones: Vec<ZoneView>,
}

/// Carbon provider block.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CarbonView {
    /// Provider identifier
    #[serde(default)]
    pub provider: Option<String>,
    /// Path of the local carbon-intensity fixture
    #[serde(default)]
    pub fixture_path: Option<String>,
}

/// The parts of the configuration document the evaluation reads.
#[derive(Debug, Clone, Deserialize)]
pub struct ConfigView {
    /// Proxy entries
    #[serde(default)]
    pub proxies: Vec<ProxyView>,
    /// Carbon provider block
    #[serde(default)]
    pub carbon: CarbonView,
}

impl ConfigView {
    /// Parse the view out of configuration text.
    pub fn parse(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    /// Derive the zone-to-region map from all proxy entries.
    #[must_use]
    pub fn zone_region_map(&self) -> ZoneRegionMap {
        ZoneRegionMap::from_pairs(self.proxies.iter().flat_map(|proxy| {
            proxy.zones.iter().filter_map(|zone| {
                let region = zone.region.clone()?;
                Some((zone.name.clone(), region))
            })
        }))
    }
}
