//! ceval-core — leaf algorithms for the comparative evaluation engine
//!
//! Pure building blocks with no I/O of their own:
//! - Routing classification (region relations, reroute directions,
//!   expected-cross-to-green accounting, carbon-saved-vs-local)
//! - Counter-exposition parsing and clamped before/after reconciliation
//! - Dual-estimator CPU/memory resource figures
//! - Carbon-fixture expectation derivation
//! - Latency statistics

#![warn(unreachable_pub)]

pub mod classify;
pub mod error;
pub mod fixture;
pub mod metrics;
pub mod region;
pub mod resource;
pub mod stats;

// Re-exports for convenience
pub use classify::{
    carbon_saved_vs_local, decision_brief, parse_zone_intensities, parse_zone_reasons,
    CarbonSavings, ExpectedCrossTracker, RerouteCounts, REASON_BEST_SCORE, REASON_ELIGIBLE,
};
pub use error::{FixtureError, LineError, ProbeError};
pub use fixture::{FixtureDoc, FixtureExpectation, FixtureZone};
pub use metrics::{CounterDelta, CounterScan, Sample};
pub use region::{
    Direction, RegionRelation, ZoneRegionMap, CANONICAL_REGIONS, REGION_EAST, REGION_WEST,
};
pub use resource::{CpuEstimate, CpuSampleMethod, MemoryEstimate};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
