//! Carbon-intensity fixture expectations
//!
//! The fixture is a JSON document with a `zones` map, each zone carrying
//! a current (and optionally forecast) carbon intensity. An expectation
//! exists only when both canonical regions are covered and their
//! intensities differ; everything else degrades to "no expectation".

use crate::error::FixtureError;
use crate::region::{REGION_EAST, REGION_WEST};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;

/// One zone entry in the fixture document.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FixtureZone {
    /// Current carbon intensity in g CO2e/kWh
    pub carbon_intensity: Option<f64>,
    /// Forecast intensity for the next window
    #[serde(default)]
    pub carbon_intensity_forecast: Option<f64>,
}

/// The fixture document.
#[derive(Debug, Clone, Deserialize)]
pub struct FixtureDoc {
    /// Zone name to intensity data
    #[serde(default)]
    pub zones: HashMap<String, FixtureZone>,
}

/// Derived expectation: which region is greener and which cross-region
/// direction carbon-aware modes should therefore favour.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FixtureExpectation {
    /// The region with the lower current intensity
    pub greener_region: String,
    /// Expected source region of the reroute
    pub expected_from: String,
    /// Expected target region of the reroute
    pub expected_to: String,
}

impl FixtureExpectation {
    /// The expected direction as an `(from, to)` borrow pair.
    #[inline]
    #[must_use]
    pub fn direction(&self) -> (&str, &str) {
        (self.expected_from.as_str(), self.expected_to.as_str())
    }

    /// `"from->to"` rendering for reports.
    #[must_use]
    pub fn direction_label(&self) -> String {
        format!("{}->{}", self.expected_from, self.expected_to)
    }

    /// Derive from a parsed fixture document.
    ///
    /// `None` when either canonical region is missing an intensity or
    /// the two intensities tie.
    #[must_use]
    pub fn derive(doc: &FixtureDoc) -> Option<Self> {
        let east = doc.zones.get(REGION_EAST)?.carbon_intensity?;
        let west = doc.zones.get(REGION_WEST)?.carbon_intensity?;
        if east < west {
            Some(Self {
                greener_region: REGION_EAST.to_string(),
                expected_from: REGION_WEST.to_string(),
                expected_to: REGION_EAST.to_string(),
            })
        } else if west < east {
            Some(Self {
                greener_region: REGION_WEST.to_string(),
                expected_from: REGION_EAST.to_string(),
                expected_to: REGION_WEST.to_string(),
            })
        } else {
            None
        }
    }

    /// Load a fixture file and derive the expectation.
    ///
    /// I/O and parse failures surface as errors so the caller can log
    /// once and degrade; an intact fixture with tie or missing regions
    /// yields `Ok(None)`.
    pub fn load(path: &Path) -> Result<Option<Self>, FixtureError> {
        let text = std::fs::read_to_string(path)?;
        let doc: FixtureDoc = serde_json::from_str(&text)?;
        Ok(Self::derive(&doc))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(east: Option<f64>, west: Option<f64>) -> FixtureDoc {
        let mut zones = HashMap::new();
        if let Some(v) = east {
            zones.insert(
                REGION_EAST.to_string(),
                FixtureZone {
                    carbon_intensity: Some(v),
                    carbon_intensity_forecast: None,
                },
            );
        }
        if let Some(v) = west {
            zones.insert(
                REGION_WEST.to_string(),
                FixtureZone {
                    carbon_intensity: Some(v),
                    carbon_intensity_forecast: None,
                },
            );
        }
        FixtureDoc { zones }
    }

    #[test]
    fn east_greener() {
        let expectation = FixtureExpectation::derive(&doc(Some(100.0), Some(500.0))).unwrap();
        assert_eq!(expectation.greener_region, REGION_EAST);
        assert_eq!(expectation.direction(), (REGION_WEST, REGION_EAST));
        assert_eq!(expectation.direction_label(), "us-west->us-east");
    }

    #[test]
    fn west_greener() {
        let expectation = FixtureExpectation::derive(&doc(Some(700.0), Some(80.0))).unwrap();
        assert_eq!(expectation.greener_region, REGION_WEST);
        assert_eq!(expectation.direction(), (REGION_EAST, REGION_WEST));
    }

    #[test]
    fn tie_yields_none() {
        assert_eq!(FixtureExpectation::derive(&doc(Some(300.0), Some(300.0))), None);
    }

    #[test]
    fn missing_region_yields_none() {
        assert_eq!(FixtureExpectation::derive(&doc(Some(300.0), None)), None);
        assert_eq!(FixtureExpectation::derive(&doc(None, None)), None);
    }

    #[test]
    fn fixture_json_shape() {
        let text = r#"{
            "zones": {
                "us-east": { "carbonIntensity": 120, "carbonIntensityForecast": 110 },
                "us-west": { "carbonIntensity": 780 }
            }
        }"#;
        let doc: FixtureDoc = serde_json::from_str(text).unwrap();
        let expectation = FixtureExpectation::derive(&doc).unwrap();
        assert_eq!(expectation.greener_region, REGION_EAST);
    }

    #[test]
    fn load_missing_file_is_an_error() {
        let err = FixtureExpectation::load(Path::new("/nonexistent/fixture.json"));
        assert!(matches!(err, Err(FixtureError::Io(_))));
    }
}
