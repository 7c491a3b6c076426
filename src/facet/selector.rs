//! Facet list resolution and selection.
//!
//! Each operation family declares an ordered candidate list, most specific
//! first. Resolution filters it once against the capability index; selection
//! scans the survivors in declaration order for the first facet applicable
//! to the viewer, memoizing the outcome per viewer kind.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use thiserror::Error;
use tracing::{debug, info};

use super::Facet;
use crate::capabilities::CapabilityIndex;
use crate::viewer::{Viewer, ViewerKind};

/// Packaging defect detected at bootstrap. A family with no resolvable facet
/// can never dispatch, so resolution fails fast instead of surfacing later as
/// silent data loss.
#[derive(Debug, Error)]
pub enum ConfigurationError {
    /// The declared candidate list does not end in a terminal facet.
    #[error("operation family `{family}` declares no terminal facet")]
    MissingTerminal {
        /// Affected family.
        family: &'static str,
    },

    /// Environment filtering left the family without any facet.
    #[error("operation family `{family}` has no environment-supported facet")]
    NoSupportedFacet {
        /// Affected family.
        family: &'static str,
    },
}

/// Resolved, ordered facet list for one operation family.
pub struct FacetList<M> {
    family: &'static str,
    active: Vec<Arc<dyn Facet<M>>>,
    /// First-applicable index memo, keyed by viewer kind.
    memo: RwLock<HashMap<ViewerKind, Option<usize>>>,
}

impl<M> std::fmt::Debug for FacetList<M> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FacetList")
            .field("family", &self.family)
            .field(
                "active",
                &self.active.iter().map(|facet| facet.name()).collect::<Vec<_>>(),
            )
            .finish_non_exhaustive()
    }
}

impl<M> FacetList<M> {
    /// Filter `candidates` to the environment-supported ones, once.
    /// Declaration order is priority order.
    pub fn resolve(
        family: &'static str,
        candidates: Vec<Arc<dyn Facet<M>>>,
        capabilities: &CapabilityIndex,
    ) -> Result<Self, ConfigurationError> {
        let has_terminal = candidates.last().map(|f| f.terminal()).unwrap_or(false);
        if !has_terminal {
            return Err(ConfigurationError::MissingTerminal { family });
        }

        let active: Vec<_> = candidates
            .into_iter()
            .filter(|facet| {
                let supported = facet.environment_supported(capabilities);
                if !supported {
                    debug!(
                        "{family}: facet `{}` not supported in this environment",
                        facet.name()
                    );
                }
                supported
            })
            .collect();

        if active.is_empty() {
            return Err(ConfigurationError::NoSupportedFacet { family });
        }

        if active.len() == 1 && active[0].terminal() {
            info!("{family}: no native support, operations degrade to no-op");
        } else {
            debug!(
                "{family}: resolved {} facet(s), preferred `{}`",
                active.len(),
                active[0].name()
            );
        }

        Ok(Self {
            family,
            active,
            memo: RwLock::new(HashMap::new()),
        })
    }

    /// Family name.
    pub fn family(&self) -> &'static str {
        self.family
    }

    /// The environment-supported facets, in priority order.
    pub fn facets(&self) -> &[Arc<dyn Facet<M>>] {
        &self.active
    }

    /// Index of the first applicable facet for this viewer, memoized per
    /// viewer kind.
    pub fn select_index(&self, viewer: &dyn Viewer) -> Option<usize> {
        let kind = viewer.kind();
        if let Some(cached) = self.memo.read().get(&kind) {
            return *cached;
        }
        let chosen = self.active.iter().position(|facet| facet.applicable(viewer));
        self.memo.write().insert(kind, chosen);
        chosen
    }

    /// The facet that will service this viewer, if any is applicable.
    pub fn select(&self, viewer: &dyn Viewer) -> Option<&Arc<dyn Facet<M>>> {
        self.select_index(viewer).map(|i| &self.active[i])
    }

    /// True when only the terminal no-op survived environment filtering.
    pub fn degraded_to_noop(&self) -> bool {
        self.active.len() == 1 && self.active[0].terminal()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capabilities::{CapabilityIndex, Feature, StaticProbe};
    use crate::capabilities::CapabilityProbe;
    use crate::facet::{DispatchFault, NoOpFacet, Payload};
    use crate::testutil::FakeViewer;

    struct KindFacet {
        name: &'static str,
        feature: Feature,
        kind: ViewerKind,
    }

    impl Facet<String> for KindFacet {
        fn name(&self) -> &'static str {
            self.name
        }

        fn environment_supported(&self, capabilities: &CapabilityIndex) -> bool {
            capabilities.supported(self.feature)
        }

        fn applicable(&self, viewer: &dyn Viewer) -> bool {
            viewer.kind() == self.kind
        }

        fn build(&self, message: &String) -> Payload {
            Payload::bytes(self.name, message.clone().into_bytes())
        }

        fn apply(&self, viewer: &dyn Viewer, payload: &Payload) -> Result<(), DispatchFault> {
            viewer
                .connection()
                .send(payload)
                .map_err(DispatchFault::Connection)
        }
    }

    async fn index(supported: &[Feature]) -> CapabilityIndex {
        let probes: Vec<Box<dyn CapabilityProbe>> = supported
            .iter()
            .map(|f| Box::new(StaticProbe::new(*f, true)) as Box<dyn CapabilityProbe>)
            .collect();
        CapabilityIndex::detect(&probes).await
    }

    fn candidates() -> Vec<Arc<dyn Facet<String>>> {
        vec![
            Arc::new(KindFacet {
                name: "test/primary",
                feature: Feature::ChatMessages,
                kind: ViewerKind::Primary,
            }),
            Arc::new(KindFacet {
                name: "test/console",
                feature: Feature::Titles,
                kind: ViewerKind::Console,
            }),
            Arc::new(NoOpFacet::new("test/no-op")),
        ]
    }

    #[tokio::test]
    async fn missing_terminal_is_fatal() {
        let caps = index(&[]).await;
        let only_native: Vec<Arc<dyn Facet<String>>> = vec![Arc::new(KindFacet {
            name: "test/primary",
            feature: Feature::ChatMessages,
            kind: ViewerKind::Primary,
        })];
        let err = FacetList::resolve("test", only_native, &caps).unwrap_err();
        assert!(matches!(err, ConfigurationError::MissingTerminal { .. }));
    }

    #[tokio::test]
    async fn empty_declaration_is_fatal() {
        let caps = index(&[]).await;
        let err = FacetList::<String>::resolve("test", Vec::new(), &caps).unwrap_err();
        assert!(matches!(err, ConfigurationError::MissingTerminal { .. }));
    }

    #[tokio::test]
    async fn zero_capabilities_still_resolve_to_noop() {
        let caps = index(&[]).await;
        let list = FacetList::resolve("test", candidates(), &caps).unwrap();
        assert!(list.degraded_to_noop());

        let viewer = FakeViewer::primary("a");
        let facet = list.select(&viewer).expect("terminal always applicable");
        assert_eq!(facet.name(), "test/no-op");
    }

    #[tokio::test]
    async fn selection_is_deterministic_in_declaration_order() {
        let caps = index(&[Feature::ChatMessages, Feature::Titles]).await;
        let list = FacetList::resolve("test", candidates(), &caps).unwrap();

        let primary = FakeViewer::primary("a");
        let console = FakeViewer::console();
        for _ in 0..3 {
            assert_eq!(list.select(&primary).unwrap().name(), "test/primary");
            assert_eq!(list.select(&console).unwrap().name(), "test/console");
        }
    }

    #[tokio::test]
    async fn environment_filter_happens_once_at_resolution() {
        // Titles unsupported: the console facet must be filtered out, so a
        // console viewer falls through to the terminal no-op.
        let caps = index(&[Feature::ChatMessages]).await;
        let list = FacetList::resolve("test", candidates(), &caps).unwrap();
        assert_eq!(list.facets().len(), 2);

        let console = FakeViewer::console();
        assert_eq!(list.select(&console).unwrap().name(), "test/no-op");
    }

    #[tokio::test]
    async fn inapplicable_facet_skipped_per_viewer_not_family_wide() {
        let caps = index(&[Feature::ChatMessages, Feature::Titles]).await;
        let list = FacetList::resolve("test", candidates(), &caps).unwrap();

        // The primary facet stays selectable for primaries even though it is
        // inapplicable to consoles.
        let console = FakeViewer::console();
        assert_eq!(list.select(&console).unwrap().name(), "test/console");
        let primary = FakeViewer::primary("b");
        assert_eq!(list.select(&primary).unwrap().name(), "test/primary");
    }
}
