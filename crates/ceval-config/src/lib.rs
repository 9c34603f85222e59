//! ceval-config — router configuration handling
//!
//! Covers everything that touches the router's configuration document:
//! - Typed read-only views (zone/region pairs, carbon block)
//! - Per-mode mutation on the raw JSON document (merge, never replace)
//! - Guaranteed byte-for-byte restoration of the original file
//! - The ordered scenario matrix of policy modes

#![warn(unreachable_pub)]

pub mod error;
pub mod guard;
pub mod model;
pub mod mutate;
pub mod scenario;

// Re-exports for convenience
pub use error::ConfigError;
pub use guard::ConfigGuard;
pub use model::{CarbonView, ConfigView, ProxyView, ZoneView};
pub use mutate::{
    apply_carbon_overrides, apply_mode, apply_variance_profile, CarbonOverrides, VarianceProfile,
};
pub use scenario::{build_matrix, PolicyMode, PriorityMode, BASELINE_SCENARIO};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
