//! Capability probes and the memoized capability index.
//!
//! Each probe answers one question about the host environment. Probes run
//! exactly once, during engine bootstrap; the host environment is assumed
//! immutable for the process lifetime, so results are memoized forever. A
//! probe that errors degrades to "unsupported" with a single diagnostic
//! line. Probes never panic and never propagate into the caller.

use std::collections::HashMap;
use std::fmt;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

/// A host feature a probe can answer for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Feature {
    /// Structured chat delivery.
    ChatMessages,
    /// Transient bar above the hotbar.
    ActionBar,
    /// Full-screen titles.
    Titles,
    /// Native boss bars.
    BossBars,
    /// Sound playback.
    Sounds,
    /// Targeted sound stop.
    SoundStop,
    /// Paginated book opening.
    Books,
    /// Surrogate entity injection, backing the phantom fallback.
    SurrogateEntities,
    /// Per-viewer movement events, backing relative phantom anchoring.
    ViewerMovementEvents,
    /// Per-viewer locale reporting.
    Localization,
}

impl Feature {
    /// Every known feature, in report order.
    pub const ALL: &'static [Feature] = &[
        Feature::ChatMessages,
        Feature::ActionBar,
        Feature::Titles,
        Feature::BossBars,
        Feature::Sounds,
        Feature::SoundStop,
        Feature::Books,
        Feature::SurrogateEntities,
        Feature::ViewerMovementEvents,
        Feature::Localization,
    ];

    /// Short stable name.
    pub fn name(&self) -> &'static str {
        match self {
            Self::ChatMessages => "chat-messages",
            Self::ActionBar => "action-bar",
            Self::Titles => "titles",
            Self::BossBars => "boss-bars",
            Self::Sounds => "sounds",
            Self::SoundStop => "sound-stop",
            Self::Books => "books",
            Self::SurrogateEntities => "surrogate-entities",
            Self::ViewerMovementEvents => "viewer-movement-events",
            Self::Localization => "localization",
        }
    }
}

impl fmt::Display for Feature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Error during probing.
#[derive(Debug, Error)]
pub enum ProbeError {
    /// The probed interface does not exist on this host.
    #[error("not found: {0}")]
    NotFound(String),

    /// The host rejected the introspection query.
    #[error("host rejected query: {0}")]
    Rejected(String),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Other error.
    #[error("{0}")]
    Other(String),
}

/// One-shot capability check.
#[async_trait]
pub trait CapabilityProbe: Send + Sync {
    /// The feature this probe answers for.
    fn feature(&self) -> Feature;

    /// Run the check. Called once per feature at bootstrap.
    async fn probe(&self) -> Result<bool, ProbeError>;
}

/// Probe backed by a precomputed answer.
///
/// Useful when the host already knows the outcome (version table lookups)
/// and in tests.
pub struct StaticProbe {
    feature: Feature,
    supported: bool,
}

impl StaticProbe {
    /// A probe that always reports `supported`.
    pub fn new(feature: Feature, supported: bool) -> Self {
        Self { feature, supported }
    }
}

#[async_trait]
impl CapabilityProbe for StaticProbe {
    fn feature(&self) -> Feature {
        self.feature
    }

    async fn probe(&self) -> Result<bool, ProbeError> {
        Ok(self.supported)
    }
}

/// Immutable, memoized probe results.
///
/// Built once at bootstrap and read-only thereafter; dispatch consults it
/// without locking.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CapabilityIndex {
    /// When the probes ran.
    pub probed_at: DateTime<Utc>,
    features: HashMap<Feature, bool>,
}

impl CapabilityIndex {
    /// Run every probe once and memoize the outcomes.
    ///
    /// Duplicate probes for the same feature keep the first result. A probe
    /// error degrades to `false` with one warning line.
    pub async fn detect(probes: &[Box<dyn CapabilityProbe>]) -> Self {
        let mut features = HashMap::new();

        for probe in probes {
            let feature = probe.feature();
            if features.contains_key(&feature) {
                debug!("duplicate probe for {feature}, keeping first result");
                continue;
            }

            let supported = match probe.probe().await {
                Ok(answer) => answer,
                Err(e) => {
                    warn!("probe for {feature} failed, treating as unsupported: {e}");
                    false
                }
            };

            debug!(
                "probed {feature}: {}",
                if supported { "supported" } else { "unsupported" }
            );
            features.insert(feature, supported);
        }

        Self {
            probed_at: Utc::now(),
            features,
        }
    }

    /// An index with no probed features: everything unsupported.
    pub fn empty() -> Self {
        Self {
            probed_at: Utc::now(),
            features: HashMap::new(),
        }
    }

    /// Is `feature` supported? Unprobed features are unsupported.
    pub fn supported(&self, feature: Feature) -> bool {
        self.features.get(&feature).copied().unwrap_or(false)
    }

    /// Number of features that were probed at all.
    pub fn probed_count(&self) -> usize {
        self.features.len()
    }

    /// Number of features that probed supported.
    pub fn supported_count(&self) -> usize {
        self.features.values().filter(|v| **v).count()
    }

    /// JSON representation of the probe outcomes.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}
