//! Capability detection
//!
//! Detects what the host runtime can do, once, at bootstrap. Facet lists are
//! resolved against the resulting [`CapabilityIndex`], which is immutable for
//! the rest of the process lifetime.
//!
//! # Usage
//!
//! ```ignore
//! let engine = Engine::builder()
//!     .probe(StaticProbe::new(Feature::Titles, true))
//!     .bootstrap()
//!     .await?;
//!
//! if engine.capabilities().supported(Feature::BossBars) {
//!     // native boss bars available
//! }
//! ```

mod diagnostics;
mod probe;

pub use diagnostics::{capability_summary, log_bootstrap_diagnostics, BuildInfo};
pub use probe::{CapabilityIndex, CapabilityProbe, Feature, ProbeError, StaticProbe};
