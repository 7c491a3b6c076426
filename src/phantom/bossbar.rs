//! Phantom boss-bar facet.
//!
//! Fallback for hosts without native boss bars: the bar is simulated by a
//! surrogate object anchored relative to each viewer, its caption carrying
//! the bar state. Registered after any host-native facets and before the
//! terminal no-op.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use serde_json::json;
use tracing::trace;

use super::{Anchor, PhantomObject, PhantomTracker, RemoveOutcome};
use crate::capabilities::{CapabilityIndex, Feature};
use crate::content::{BarId, BossBar, BossBarCommand};
use crate::facet::{DispatchFault, Facet, Payload};
use crate::viewer::{Position, Viewer, ViewerKind};

const FACET_NAME: &str = "boss-bar/phantom";

/// Surrogate offset: in front of and above the viewer's eye line.
const BAR_ANCHOR_OFFSET: Position = Position {
    x: 0.0,
    y: 2.5,
    z: 8.0,
};

/// Boss-bar fallback driving the phantom tracker.
pub struct PhantomBossBarFacet {
    tracker: Arc<PhantomTracker>,
    bars: RwLock<HashMap<BarId, super::PhantomId>>,
}

impl PhantomBossBarFacet {
    /// A facet backed by `tracker`.
    pub fn new(tracker: Arc<PhantomTracker>) -> Self {
        Self {
            tracker,
            bars: RwLock::new(HashMap::new()),
        }
    }

    fn encode_state(bar: &BossBar) -> Payload {
        let state = bar.state();
        let value = json!({
            "title": state.title.as_value(),
            "progress": state.progress,
            "color": state.color,
            "overlay": state.overlay,
        });
        Payload::bytes(FACET_NAME, serde_json::to_vec(&value).unwrap_or_default())
    }

    /// Live phantom for `bar`, created on first use.
    fn object_for(&self, bar: &BossBar) -> Arc<PhantomObject> {
        if let Some(id) = self.bars.read().get(&bar.id()) {
            if let Some(object) = self.tracker.get(*id) {
                return object;
            }
        }
        // Stale or missing entry: (re)create under the write lock.
        let mut bars = self.bars.write();
        if let Some(id) = bars.get(&bar.id()) {
            if let Some(object) = self.tracker.get(*id) {
                return object;
            }
        }
        let object = self
            .tracker
            .create(Anchor::RelativeToViewer(BAR_ANCHOR_OFFSET), Self::encode_state(bar));
        bars.insert(bar.id(), object.id());
        object
    }
}

impl Facet<BossBarCommand> for PhantomBossBarFacet {
    fn name(&self) -> &'static str {
        FACET_NAME
    }

    fn environment_supported(&self, capabilities: &CapabilityIndex) -> bool {
        capabilities.supported(Feature::SurrogateEntities)
    }

    fn applicable(&self, viewer: &dyn Viewer) -> bool {
        viewer.kind() == ViewerKind::Primary
    }

    fn build(&self, message: &BossBarCommand) -> Payload {
        Payload::value(FACET_NAME, message.clone())
    }

    fn apply(&self, viewer: &dyn Viewer, payload: &Payload) -> Result<(), DispatchFault> {
        let command = payload
            .downcast_ref::<BossBarCommand>()
            .ok_or_else(|| DispatchFault::Surrogate("payload is not a boss-bar command".into()))?;

        let Some(viewer_id) = viewer.id() else {
            // Identity-less viewers cannot be tracked in a visibility set.
            trace!("{FACET_NAME}: viewer without identity skipped");
            return Ok(());
        };

        match command {
            BossBarCommand::Show(bar) => {
                let object = self.object_for(bar);
                object.set_state(Self::encode_state(bar));
                if !object.add(viewer_id) {
                    // Already visible: deliver the current state as a delta
                    // instead of a duplicate create.
                    object.refresh(viewer_id);
                }
            }
            BossBarCommand::Hide(bar) => {
                let object = {
                    let bars = self.bars.read();
                    bars.get(&bar.id()).and_then(|id| self.tracker.get(*id))
                };
                if let Some(object) = object {
                    if self.tracker.remove_viewer(&object, viewer_id) == RemoveOutcome::Emptied {
                        self.bars.write().remove(&bar.id());
                    }
                }
            }
        }
        Ok(())
    }
}
