//! Audience provider: canonical viewer registry and lifecycle.
//!
//! One provider per logical owner, created through the engine. All lifecycle
//! operations are idempotent and may arrive from host callback contexts that
//! are not necessarily single-threaded; the registry tolerates concurrent
//! add/remove by handing out snapshots for iteration.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use tracing::{debug, info, warn};

use super::{Audience, ViewerFilter};
use crate::engine::{EngineShared, OwnerId};
use crate::viewer::{Position, Viewer, ViewerId};

/// Metadata the provider tracks per registered viewer.
#[derive(Debug, Clone)]
pub struct ViewerMetadata {
    /// Effective locale. Defaulted at join, corrected on the first
    /// metadata-change event.
    pub locale: String,
    /// When the viewer joined.
    pub joined_at: DateTime<Utc>,
}

/// Partial metadata update; `None` fields are left untouched.
#[derive(Debug, Clone, Default)]
pub struct MetadataUpdate {
    /// New effective locale.
    pub locale: Option<String>,
}

struct RegisteredViewer {
    viewer: Arc<dyn Viewer>,
    metadata: ViewerMetadata,
}

pub(crate) struct ProviderInner {
    owner: OwnerId,
    engine: Arc<EngineShared>,
    registry: RwLock<HashMap<ViewerId, RegisteredViewer>>,
    closed: AtomicBool,
}

impl ProviderInner {
    pub(crate) fn engine(&self) -> &EngineShared {
        &self.engine
    }

    /// Snapshot the live member set for one broadcast. Filters delegate to
    /// the viewer's own predicate methods, never to concrete types.
    pub(crate) fn snapshot(
        &self,
        only: Option<ViewerId>,
        filters: &[ViewerFilter],
    ) -> Vec<Arc<dyn Viewer>> {
        if self.closed.load(Ordering::Acquire) {
            return Vec::new();
        }
        let registry = self.registry.read();
        registry
            .iter()
            .filter(|(id, _)| only.map_or(true, |wanted| **id == wanted))
            .map(|(_, entry)| entry.viewer.clone())
            .filter(|viewer| filters.iter().all(|f| f.matches(viewer.as_ref())))
            .collect()
    }
}

/// Owns canonical viewer state and produces filtered audiences.
#[derive(Clone)]
pub struct AudienceProvider {
    inner: Arc<ProviderInner>,
}

impl AudienceProvider {
    pub(crate) fn new(owner: OwnerId, engine: Arc<EngineShared>) -> Self {
        Self {
            inner: Arc::new(ProviderInner {
                owner,
                engine,
                registry: RwLock::new(HashMap::new()),
                closed: AtomicBool::new(false),
            }),
        }
    }

    /// Owner this provider was created for.
    pub fn owner(&self) -> &OwnerId {
        &self.inner.owner
    }

    /// Register a viewer, making it visible to [`AudienceProvider::all`].
    ///
    /// Idempotent: re-joining an already-registered identity keeps the
    /// existing entry, and re-joining the same identity-less handle returns
    /// the identity minted for it the first time. The returned identity
    /// never changes for the viewer's lifetime.
    pub fn on_join(&self, viewer: Arc<dyn Viewer>) -> ViewerId {
        // The closed flag is checked under the registry lock so a concurrent
        // close cannot admit an entry it will never release.
        let mut registry = self.inner.registry.write();
        if self.inner.closed.load(Ordering::Acquire) {
            warn!("join ignored: provider {} is closed", self.inner.owner);
            return viewer.id().unwrap_or_else(ViewerId::random);
        }

        let id = match viewer.id() {
            Some(id) => id,
            None => {
                let known = registry
                    .iter()
                    .find(|(_, entry)| Arc::ptr_eq(&entry.viewer, &viewer))
                    .map(|(id, _)| *id);
                match known {
                    Some(id) => return id,
                    None => {
                        let minted = ViewerId::random();
                        debug!("viewer without host identity, assigned {minted}");
                        minted
                    }
                }
            }
        };

        let default_locale = self.inner.engine.config.default_locale.clone();
        registry.entry(id).or_insert_with(|| {
            let locale = viewer.locale().unwrap_or(default_locale);
            debug!("viewer {id} joined provider {} ({locale})", self.inner.owner);
            RegisteredViewer {
                viewer,
                metadata: ViewerMetadata {
                    locale,
                    joined_at: Utc::now(),
                },
            }
        });
        id
    }

    /// Unregister a viewer and release its phantom visibility. Idempotent.
    pub fn on_leave(&self, id: ViewerId) {
        let removed = self.inner.registry.write().remove(&id).is_some();
        if removed {
            self.inner.engine.tracker.release_viewer(id);
            debug!("viewer {id} left provider {}", self.inner.owner);
        }
    }

    /// Update stored metadata in place. Cached [`Audience`] references and
    /// the viewer entry itself keep their identity. Unknown ids are ignored.
    pub fn on_metadata_changed(&self, id: ViewerId, update: MetadataUpdate) {
        let mut registry = self.inner.registry.write();
        if let Some(entry) = registry.get_mut(&id) {
            if let Some(locale) = update.locale {
                debug!("viewer {id} locale changed to {locale}");
                entry.metadata.locale = locale;
            }
        }
    }

    /// Forward one host movement event into the phantom subsystem. Only has
    /// an effect while a relative-mode phantom exists.
    pub fn on_viewer_moved(&self, id: ViewerId, position: Position) {
        if self.inner.closed.load(Ordering::Acquire) {
            return;
        }
        self.inner.engine.tracker.viewer_moved(id, position);
    }

    /// Stored metadata for a registered viewer.
    pub fn metadata(&self, id: ViewerId) -> Option<ViewerMetadata> {
        self.inner
            .registry
            .read()
            .get(&id)
            .map(|entry| entry.metadata.clone())
    }

    /// Number of registered viewers.
    pub fn viewer_count(&self) -> usize {
        self.inner.registry.read().len()
    }

    /// Audience of every registered viewer. The view is live.
    pub fn all(&self) -> Audience {
        Audience::new(self.inner.clone(), None, Vec::new())
    }

    /// Audience of a single viewer. Live: empty while the identity is not
    /// registered.
    pub fn viewer(&self, id: ViewerId) -> Audience {
        Audience::new(self.inner.clone(), Some(id), Vec::new())
    }

    /// Audience narrowed by a predicate. The view is live.
    pub fn filter(&self, filter: ViewerFilter) -> Audience {
        Audience::new(self.inner.clone(), None, vec![filter])
    }

    /// Tear down: release every viewer's phantom state, clear the registry,
    /// and unregister from the engine. Calling twice is a no-op.
    pub fn close(&self) {
        if self.inner.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        let ids: Vec<ViewerId> = self.inner.registry.read().keys().copied().collect();
        for id in &ids {
            self.inner.engine.tracker.release_viewer(*id);
        }
        self.inner.registry.write().clear();
        self.inner.engine.remove_provider(&self.inner.owner);
        info!(
            "provider {} closed ({} viewer(s) released)",
            self.inner.owner,
            ids.len()
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audience::ViewerFilter;
    use crate::engine::Engine;
    use crate::testutil::FakeViewer;
    use crate::viewer::SegmentKey;

    async fn engine() -> Engine {
        Engine::builder().bootstrap().await.unwrap()
    }

    #[tokio::test]
    async fn join_is_idempotent_and_keeps_identity() {
        let engine = engine().await;
        let provider = engine.create_provider("test-owner");

        let viewer = Arc::new(FakeViewer::primary("a"));
        let first = provider.on_join(viewer.clone());
        let second = provider.on_join(viewer);
        assert_eq!(first, second);
        assert_eq!(provider.viewer_count(), 1);
    }

    #[tokio::test]
    async fn rejoining_same_identityless_handle_keeps_minted_identity() {
        let engine = engine().await;
        let provider = engine.create_provider("test-owner");

        let console: Arc<dyn Viewer> = Arc::new(FakeViewer::console());
        let first = provider.on_join(console.clone());
        let second = provider.on_join(console);
        assert_eq!(first, second);
        assert_eq!(provider.viewer_count(), 1);
    }

    #[tokio::test]
    async fn join_after_close_registers_nothing() {
        let engine = engine().await;
        let provider = engine.create_provider("test-owner");
        provider.on_join(Arc::new(FakeViewer::primary("a")));
        provider.close();

        provider.on_join(Arc::new(FakeViewer::primary("late")));
        assert_eq!(provider.viewer_count(), 0);
        assert_eq!(provider.all().count(), 0);
    }

    #[tokio::test]
    async fn identity_minted_for_console_viewers() {
        let engine = engine().await;
        let provider = engine.create_provider("test-owner");

        let id = provider.on_join(Arc::new(FakeViewer::console()));
        assert_eq!(provider.viewer_count(), 1);
        assert!(provider.metadata(id).is_some());
    }

    #[tokio::test]
    async fn locale_defaults_then_corrects_in_place() {
        let engine = engine().await;
        let provider = engine.create_provider("test-owner");

        let id = provider.on_join(Arc::new(FakeViewer::primary("a")));
        assert_eq!(provider.metadata(id).unwrap().locale, "en_US");

        provider.on_metadata_changed(
            id,
            MetadataUpdate {
                locale: Some("de_DE".into()),
            },
        );
        assert_eq!(provider.metadata(id).unwrap().locale, "de_DE");
    }

    #[tokio::test]
    async fn host_locale_hint_wins_over_default() {
        let engine = engine().await;
        let provider = engine.create_provider("test-owner");

        let id = provider.on_join(Arc::new(FakeViewer::primary("a").with_locale("fr_FR")));
        assert_eq!(provider.metadata(id).unwrap().locale, "fr_FR");
    }

    #[tokio::test]
    async fn leave_is_idempotent() {
        let engine = engine().await;
        let provider = engine.create_provider("test-owner");

        let id = provider.on_join(Arc::new(FakeViewer::primary("a")));
        provider.on_leave(id);
        provider.on_leave(id);
        assert_eq!(provider.viewer_count(), 0);
    }

    #[tokio::test]
    async fn filtered_audience_is_live() {
        let engine = engine().await;
        let provider = engine.create_provider("test-owner");
        let staff = provider.filter(ViewerFilter::Permission("staff".into()));

        assert_eq!(staff.count(), 0);

        let admin = Arc::new(FakeViewer::primary("admin").with_permission("staff"));
        let guest = Arc::new(FakeViewer::primary("guest"));
        let admin_id = provider.on_join(admin);
        provider.on_join(guest);
        assert_eq!(staff.count(), 1);
        assert_eq!(provider.all().count(), 2);

        provider.on_leave(admin_id);
        assert_eq!(staff.count(), 0);
    }

    #[tokio::test]
    async fn membership_filter_delegates_to_viewer() {
        let engine = engine().await;
        let provider = engine.create_provider("test-owner");

        let lobby = SegmentKey::Instance("lobby".into());
        provider.on_join(Arc::new(
            FakeViewer::primary("a").with_segment(lobby.clone()),
        ));
        provider.on_join(Arc::new(FakeViewer::primary("b")));

        assert_eq!(provider.filter(ViewerFilter::Membership(lobby)).count(), 1);
    }

    #[tokio::test]
    async fn single_viewer_audience_is_live() {
        let engine = engine().await;
        let provider = engine.create_provider("test-owner");

        let viewer = Arc::new(FakeViewer::primary("a"));
        let id = viewer.id().unwrap();
        let single = provider.viewer(id);
        assert_eq!(single.count(), 0);

        provider.on_join(viewer);
        assert_eq!(single.count(), 1);
    }

    #[tokio::test]
    async fn close_twice_is_noop_and_empties_audiences() {
        let engine = engine().await;
        let provider = engine.create_provider("test-owner");
        provider.on_join(Arc::new(FakeViewer::primary("a")));
        let all = provider.all();

        provider.close();
        provider.close();
        assert_eq!(all.count(), 0);
        assert_eq!(provider.viewer_count(), 0);
    }
}
