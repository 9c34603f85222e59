//! ceval-engine — the comparative evaluation pipeline
//!
//! Orchestrates one run end to end:
//! - Deployment driving through the [`deploy::DeploymentDriver`] seam
//! - Per-mode configuration mutation with guaranteed restore
//! - Sequential synthetic load with per-request classification
//! - Counter snapshots around each load window, reconciled to clamped
//!   deltas
//! - Window-edged resource sampling
//! - Baseline-relative `summary.json` / `summary.csv` / `summary.md`

#![warn(unreachable_pub)]

pub mod deploy;
pub mod engine;
pub mod error;
pub mod load;
pub mod report;
pub mod runcfg;
pub mod sampler;

// Re-exports for convenience
pub use deploy::{ComposeDriver, DeploymentDriver};
pub use engine::{Engine, METRIC_CO2E, METRIC_EXPOSURE, METRIC_REQUESTS};
pub use error::EngineError;
pub use load::{LoadOutcome, RecordWriter, RequestRecord, SYNTHETIC_FAILURE_STATUS};
pub use report::{enrich_with_baseline, ModeSummary};
pub use runcfg::{BuildMode, RegionInputMode, RunConfig};
pub use sampler::ResourceSample;

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
