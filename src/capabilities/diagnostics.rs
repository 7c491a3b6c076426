//! Capability diagnostics and bootstrap reporting.

use tracing::info;

use super::probe::{CapabilityIndex, Feature};

/// Compile-time build identification.
#[derive(Debug, Clone, Copy)]
pub struct BuildInfo {
    /// Build date (YYYY-MM-DD).
    pub date: &'static str,
    /// Short git revision.
    pub git_hash: &'static str,
}

impl BuildInfo {
    /// Values baked in by the build script.
    pub fn current() -> Self {
        Self {
            date: env!("BUILD_DATE"),
            git_hash: env!("GIT_HASH"),
        }
    }
}

/// Render the boxed capability summary shown at bootstrap.
pub fn capability_summary(index: &CapabilityIndex) -> String {
    let mut summary = String::new();

    summary.push_str("╭─────────────────────────────────────────╮\n");
    summary.push_str("│           Capability Summary            │\n");
    summary.push_str("├─────────────────────────────────────────┤\n");

    for feature in Feature::ALL {
        let mark = if index.supported(*feature) { "✅" } else { "❌" };
        summary.push_str(&format!("│  {} {:32}   │\n", mark, feature.name()));
    }

    summary.push_str("├─────────────────────────────────────────┤\n");
    summary.push_str(&format!(
        "│  {}/{} features supported               │\n",
        index.supported_count(),
        Feature::ALL.len()
    ));
    summary.push_str("╰─────────────────────────────────────────╯");

    summary
}

/// Log the bootstrap diagnostics: build identification plus the summary box.
pub fn log_bootstrap_diagnostics(index: &CapabilityIndex) {
    let build = BuildInfo::current();
    info!(
        "viewcast {} (built {} / {})",
        env!("CARGO_PKG_VERSION"),
        build.date,
        build.git_hash
    );
    info!("capabilities probed at {}", index.probed_at);
    for line in capability_summary(index).lines() {
        info!("{line}");
    }
}
