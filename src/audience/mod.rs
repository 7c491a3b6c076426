//! Audiences: viewer sets bound to resolved facets.
//!
//! An audience is a *live view* over a provider's registry: narrowing with
//! [`Audience::filter`] recomputes membership against the current registry
//! on every call, so viewer join/leave is reflected without refresh. The
//! broadcast path snapshots the viewer set before iterating and never
//! mutates the collection it walks.

mod provider;

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::trace;

pub use provider::{AudienceProvider, MetadataUpdate, ViewerMetadata};

use crate::content::{
    Book, BossBar, BossBarCommand, RichText, SoundCommand, SoundSpec, SoundStop, TitleCommand,
    TitleSpec,
};
use crate::engine::MisuseError;
use crate::facet::FacetList;
use crate::telemetry::FaultLog;
use crate::viewer::{SegmentKey, Viewer, ViewerId};

/// Narrowing predicate, delegated to the viewer's own predicate methods.
#[derive(Debug, Clone)]
pub enum ViewerFilter {
    /// Keep viewers holding a permission node.
    Permission(String),
    /// Keep viewers belonging to a membership tag.
    Membership(SegmentKey),
}

impl ViewerFilter {
    pub(crate) fn matches(&self, viewer: &dyn Viewer) -> bool {
        match self {
            Self::Permission(node) => viewer.has_permission(node),
            Self::Membership(segment) => viewer.in_segment(segment),
        }
    }
}

/// A set of viewers exposing the uniform operation surface.
///
/// Send-type methods cannot fail observably: unsupported capabilities
/// degrade to no-ops and individual dispatch faults are logged, never
/// surfaced. Only handle misuse escapes, deliberately.
#[derive(Clone)]
pub struct Audience {
    inner: Arc<provider::ProviderInner>,
    only: Option<ViewerId>,
    filters: Vec<ViewerFilter>,
}

impl Audience {
    pub(crate) fn new(
        inner: Arc<provider::ProviderInner>,
        only: Option<ViewerId>,
        filters: Vec<ViewerFilter>,
    ) -> Self {
        Self {
            inner,
            only,
            filters,
        }
    }

    /// Narrow to viewers matching `filter`. The result stays live.
    pub fn filter(&self, filter: ViewerFilter) -> Audience {
        let mut filters = self.filters.clone();
        filters.push(filter);
        Audience {
            inner: self.inner.clone(),
            only: self.only,
            filters,
        }
    }

    /// Snapshot of the current member viewers.
    pub fn viewers(&self) -> Vec<Arc<dyn Viewer>> {
        self.inner.snapshot(self.only, &self.filters)
    }

    /// Current member count.
    pub fn count(&self) -> usize {
        self.viewers().len()
    }

    fn faults(&self) -> &FaultLog {
        &self.inner.engine().faults
    }

    /// Deliver a chat message.
    pub fn send_message(&self, text: &RichText) {
        broadcast(
            &self.inner.engine().suite.chat,
            text,
            &self.viewers(),
            self.faults(),
        );
    }

    /// Show a transient bar above the hotbar.
    pub fn show_action_bar(&self, text: &RichText) {
        broadcast(
            &self.inner.engine().suite.action_bar,
            text,
            &self.viewers(),
            self.faults(),
        );
    }

    /// Show a full-screen title.
    pub fn show_title(&self, title: &TitleSpec) {
        broadcast(
            &self.inner.engine().suite.title,
            &TitleCommand::Show(title.clone()),
            &self.viewers(),
            self.faults(),
        );
    }

    /// Remove the current title, keeping timings.
    pub fn clear_title(&self) {
        broadcast(
            &self.inner.engine().suite.title,
            &TitleCommand::Clear,
            &self.viewers(),
            self.faults(),
        );
    }

    /// Remove the current title and restore default timings.
    pub fn reset_title(&self) {
        broadcast(
            &self.inner.engine().suite.title,
            &TitleCommand::Reset,
            &self.viewers(),
            self.faults(),
        );
    }

    /// Make a boss bar visible to this audience.
    ///
    /// # Errors
    ///
    /// Rejects handles not created by this engine; silently ignoring a
    /// foreign handle would hide an integration bug.
    pub fn show_boss_bar(&self, bar: &BossBar) -> Result<(), MisuseError> {
        self.check_bar(bar)?;
        broadcast(
            &self.inner.engine().suite.boss_bar,
            &BossBarCommand::Show(bar.clone()),
            &self.viewers(),
            self.faults(),
        );
        Ok(())
    }

    /// Remove a boss bar from this audience.
    ///
    /// # Errors
    ///
    /// Rejects handles not created by this engine.
    pub fn hide_boss_bar(&self, bar: &BossBar) -> Result<(), MisuseError> {
        self.check_bar(bar)?;
        broadcast(
            &self.inner.engine().suite.boss_bar,
            &BossBarCommand::Hide(bar.clone()),
            &self.viewers(),
            self.faults(),
        );
        Ok(())
    }

    /// Start sound playback.
    pub fn play_sound(&self, sound: &SoundSpec) {
        broadcast(
            &self.inner.engine().suite.sound,
            &SoundCommand::Play(sound.clone()),
            &self.viewers(),
            self.faults(),
        );
    }

    /// Stop matching sound playback.
    pub fn stop_sound(&self, stop: &SoundStop) {
        broadcast(
            &self.inner.engine().suite.sound,
            &SoundCommand::Stop(stop.clone()),
            &self.viewers(),
            self.faults(),
        );
    }

    /// Open a paginated book.
    ///
    /// # Errors
    ///
    /// Rejects handles not created by this engine.
    pub fn open_book(&self, book: &Book) -> Result<(), MisuseError> {
        if book.engine_id() != self.inner.engine().id {
            return Err(MisuseError::ForeignBook { id: book.id() });
        }
        broadcast(
            &self.inner.engine().suite.book,
            book,
            &self.viewers(),
            self.faults(),
        );
        Ok(())
    }

    fn check_bar(&self, bar: &BossBar) -> Result<(), MisuseError> {
        if bar.engine_id() != self.inner.engine().id {
            return Err(MisuseError::ForeignBossBar { id: bar.id() });
        }
        Ok(())
    }
}

/// One-to-many dispatch through a resolved facet list.
///
/// Viewers are partitioned by the facet that services them; `build` runs
/// once per group, `apply` once per viewer. Unserviceable viewers are
/// silently skipped and a single fault never aborts the rest.
fn broadcast<M>(list: &FacetList<M>, message: &M, viewers: &[Arc<dyn Viewer>], faults: &FaultLog) {
    let mut groups: BTreeMap<usize, Vec<&Arc<dyn Viewer>>> = BTreeMap::new();
    for viewer in viewers {
        match list.select_index(viewer.as_ref()) {
            Some(index) => groups.entry(index).or_default().push(viewer),
            None => trace!("{}: no applicable facet, viewer skipped", list.family()),
        }
    }

    for (index, members) in groups {
        let facet = &list.facets()[index];
        let payload = facet.build(message);
        for viewer in members {
            if let Err(fault) = facet.apply(viewer.as_ref(), &payload) {
                faults.report(list.family(), &fault);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use super::*;
    use crate::capabilities::CapabilityIndex;
    use crate::facet::{DispatchFault, Facet, NoOpFacet, Payload};
    use crate::testutil::FakeViewer;
    use crate::viewer::ViewerKind;

    /// Facet counting builds/applies, applicable to one viewer kind.
    struct CountingFacet {
        name: &'static str,
        kind: ViewerKind,
        builds: AtomicUsize,
        applies: AtomicUsize,
    }

    impl CountingFacet {
        fn new(name: &'static str, kind: ViewerKind) -> Arc<Self> {
            Arc::new(Self {
                name,
                kind,
                builds: AtomicUsize::new(0),
                applies: AtomicUsize::new(0),
            })
        }
    }

    impl Facet<RichText> for CountingFacet {
        fn name(&self) -> &'static str {
            self.name
        }

        fn environment_supported(&self, _capabilities: &CapabilityIndex) -> bool {
            true
        }

        fn applicable(&self, viewer: &dyn Viewer) -> bool {
            viewer.kind() == self.kind
        }

        fn build(&self, _message: &RichText) -> Payload {
            self.builds.fetch_add(1, Ordering::SeqCst);
            Payload::bytes(self.name, self.name.as_bytes().to_vec())
        }

        fn apply(&self, viewer: &dyn Viewer, payload: &Payload) -> Result<(), DispatchFault> {
            self.applies.fetch_add(1, Ordering::SeqCst);
            viewer
                .connection()
                .send(payload)
                .map_err(DispatchFault::Connection)
        }
    }

    fn list_of(facets: Vec<Arc<dyn Facet<RichText>>>) -> FacetList<RichText> {
        FacetList::resolve("chat", facets, &CapabilityIndex::empty()).unwrap()
    }

    #[test]
    fn one_build_n_applies_per_group() {
        let facet = CountingFacet::new("chat/test", ViewerKind::Primary);
        let list = list_of(vec![facet.clone(), Arc::new(NoOpFacet::new("chat/no-op"))]);
        let faults = FaultLog::new(Duration::from_secs(30));

        let viewers: Vec<Arc<dyn Viewer>> = (0..4)
            .map(|i| Arc::new(FakeViewer::primary(&format!("v{i}"))) as Arc<dyn Viewer>)
            .collect();

        broadcast(&list, &RichText::plain("hi"), &viewers, &faults);

        assert_eq!(facet.builds.load(Ordering::SeqCst), 1);
        assert_eq!(facet.applies.load(Ordering::SeqCst), 4);
        assert_eq!(faults.recorded(), 0);
    }

    #[test]
    fn fault_on_one_viewer_does_not_abort_the_rest() {
        let facet = CountingFacet::new("chat/test", ViewerKind::Primary);
        let list = list_of(vec![facet.clone(), Arc::new(NoOpFacet::new("chat/no-op"))]);
        let faults = FaultLog::new(Duration::from_secs(30));

        let healthy_before = FakeViewer::primary("a");
        let broken = FakeViewer::primary("b");
        broken.connection_handle().set_failing(true);
        let healthy_after = FakeViewer::primary("c");

        let before_conn = healthy_before.connection_handle();
        let after_conn = healthy_after.connection_handle();

        let viewers: Vec<Arc<dyn Viewer>> = vec![
            Arc::new(healthy_before),
            Arc::new(broken),
            Arc::new(healthy_after),
        ];

        broadcast(&list, &RichText::plain("hi"), &viewers, &faults);

        assert_eq!(before_conn.sent_count(), 1);
        assert_eq!(after_conn.sent_count(), 1);
        assert_eq!(facet.applies.load(Ordering::SeqCst), 3);
        assert_eq!(faults.recorded(), 1);
    }

    #[test]
    fn disjoint_facets_never_cross_apply() {
        let primary_facet = CountingFacet::new("chat/primary", ViewerKind::Primary);
        let console_facet = CountingFacet::new("chat/console", ViewerKind::Console);
        let list = list_of(vec![
            primary_facet.clone(),
            console_facet.clone(),
            Arc::new(NoOpFacet::new("chat/no-op")),
        ]);
        let faults = FaultLog::new(Duration::from_secs(30));

        let a = FakeViewer::primary("a");
        let b = FakeViewer::console();
        let a_conn = a.connection_handle();
        let b_conn = b.connection_handle();
        let viewers: Vec<Arc<dyn Viewer>> = vec![Arc::new(a), Arc::new(b)];

        broadcast(&list, &RichText::plain("hi"), &viewers, &faults);

        // Each facet built once and applied exactly once, to its own viewer.
        assert_eq!(primary_facet.builds.load(Ordering::SeqCst), 1);
        assert_eq!(primary_facet.applies.load(Ordering::SeqCst), 1);
        assert_eq!(console_facet.builds.load(Ordering::SeqCst), 1);
        assert_eq!(console_facet.applies.load(Ordering::SeqCst), 1);

        let a_sent = a_conn.sent();
        let b_sent = b_conn.sent();
        assert_eq!(a_sent.len(), 1);
        assert_eq!(b_sent.len(), 1);
        assert_eq!(a_sent[0].tag(), "chat/primary");
        assert_eq!(b_sent[0].tag(), "chat/console");
    }
}
