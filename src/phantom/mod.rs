//! Phantom objects: simulated stand-ins for capabilities the host lacks.
//!
//! When no native facet exists for an operation, a phantom object is
//! injected through a host-supplied [`SurrogateSpawner`] and shown per
//! viewer. Each object is a small state machine:
//!
//! ```text
//! Unspawned ──add(first viewer)──▶ Spawned { visible_to }
//!     ▲                                   │
//!     └────────remove(last viewer)────────┘
//! ```
//!
//! The simulation logic is host-agnostic; all host mechanics live behind the
//! spawner trait, so the subsystem is unit-testable without any real host.

mod bossbar;

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

pub use bossbar::PhantomBossBarFacet;

use crate::facet::{DispatchFault, Payload};
use crate::telemetry::FaultLog;
use crate::viewer::{Position, ViewerId};

/// Phantom object identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PhantomId(Uuid);

impl PhantomId {
    fn random() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for PhantomId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// How a phantom object is positioned.
#[derive(Debug, Clone)]
pub enum Anchor {
    /// Fixed world position.
    Absolute(Position),
    /// Offset from each viewer's own position. Requires movement events.
    RelativeToViewer(Position),
}

/// Everything a host needs to materialize a phantom for one viewer.
#[derive(Debug, Clone)]
pub struct PhantomDescriptor {
    /// Object identity.
    pub id: PhantomId,
    /// Positioning mode.
    pub anchor: Anchor,
    /// Current state payload.
    pub payload: Payload,
}

/// Incremental change broadcast to a phantom's visibility set.
#[derive(Debug, Clone)]
pub enum PhantomDelta {
    /// The object moved.
    Position(Position),
    /// The object's state payload changed.
    State(Payload),
}

/// Host collaborator that materializes phantom objects per viewer.
///
/// Calls are fire-and-forget; the host resolves viewer identities to live
/// connections itself. Failures are dispatch faults, not aborts.
pub trait SurrogateSpawner: Send + Sync {
    /// Send one "create" notification to a viewer.
    fn spawn(&self, viewer: ViewerId, descriptor: &PhantomDescriptor) -> Result<(), DispatchFault>;

    /// Send one "destroy" notification to a viewer.
    fn destroy(&self, viewer: ViewerId, object: PhantomId) -> Result<(), DispatchFault>;

    /// Send one state-delta notification to a viewer.
    fn update(
        &self,
        viewer: ViewerId,
        object: PhantomId,
        delta: &PhantomDelta,
    ) -> Result<(), DispatchFault>;
}

/// Spawner used when the host registers none. Every call silently succeeds;
/// facets gated on `SurrogateEntities` never select into it unless the probe
/// lied.
pub struct NullSpawner;

impl SurrogateSpawner for NullSpawner {
    fn spawn(&self, _viewer: ViewerId, _descriptor: &PhantomDescriptor) -> Result<(), DispatchFault> {
        Ok(())
    }

    fn destroy(&self, _viewer: ViewerId, _object: PhantomId) -> Result<(), DispatchFault> {
        Ok(())
    }

    fn update(
        &self,
        _viewer: ViewerId,
        _object: PhantomId,
        _delta: &PhantomDelta,
    ) -> Result<(), DispatchFault> {
        Ok(())
    }
}

/// Host hook toggling per-viewer movement event delivery.
///
/// Subscribed only while at least one relative-mode phantom exists, so the
/// per-tick cost is zero when the feature is unused.
pub trait MovementEvents: Send + Sync {
    /// Start delivering movement events to the tracker.
    fn subscribe(&self);

    /// Stop delivering movement events.
    fn unsubscribe(&self);
}

enum Lifecycle {
    Unspawned,
    Spawned { visible_to: HashSet<ViewerId> },
}

/// One tracked phantom object.
pub struct PhantomObject {
    id: PhantomId,
    anchor: Anchor,
    payload: RwLock<Payload>,
    state: Mutex<Lifecycle>,
    spawner: Arc<dyn SurrogateSpawner>,
    faults: Arc<FaultLog>,
}

impl PhantomObject {
    fn new(
        anchor: Anchor,
        payload: Payload,
        spawner: Arc<dyn SurrogateSpawner>,
        faults: Arc<FaultLog>,
    ) -> Self {
        Self {
            id: PhantomId::random(),
            anchor,
            payload: RwLock::new(payload),
            state: Mutex::new(Lifecycle::Unspawned),
            spawner,
            faults,
        }
    }

    /// Object identity.
    pub fn id(&self) -> PhantomId {
        self.id
    }

    /// True for relative-mode objects.
    pub fn is_relative(&self) -> bool {
        matches!(self.anchor, Anchor::RelativeToViewer(_))
    }

    /// Is the object currently materialized for anyone?
    pub fn is_spawned(&self) -> bool {
        matches!(&*self.state.lock(), Lifecycle::Spawned { .. })
    }

    /// Snapshot of the visibility set.
    pub fn visible_snapshot(&self) -> Vec<ViewerId> {
        match &*self.state.lock() {
            Lifecycle::Unspawned => Vec::new(),
            Lifecycle::Spawned { visible_to } => visible_to.iter().copied().collect(),
        }
    }

    /// Is `viewer` in the visibility set?
    pub fn contains(&self, viewer: ViewerId) -> bool {
        match &*self.state.lock() {
            Lifecycle::Unspawned => false,
            Lifecycle::Spawned { visible_to } => visible_to.contains(&viewer),
        }
    }

    fn descriptor(&self) -> PhantomDescriptor {
        PhantomDescriptor {
            id: self.id,
            anchor: self.anchor.clone(),
            payload: self.payload.read().clone(),
        }
    }

    /// Add `viewer` to the visibility set.
    ///
    /// Idempotent: a viewer already in the set gets no second create
    /// notification. Returns whether a create notification was sent.
    pub fn add(&self, viewer: ViewerId) -> bool {
        let inserted = {
            let mut state = self.state.lock();
            match &mut *state {
                Lifecycle::Unspawned => {
                    let mut visible_to = HashSet::new();
                    visible_to.insert(viewer);
                    *state = Lifecycle::Spawned { visible_to };
                    debug!("phantom {} spawned for first viewer {viewer}", self.id);
                    true
                }
                Lifecycle::Spawned { visible_to } => visible_to.insert(viewer),
            }
        };

        if inserted {
            let descriptor = self.descriptor();
            if let Err(fault) = self.spawner.spawn(viewer, &descriptor) {
                self.faults.report("phantom", &fault);
            }
        }
        inserted
    }

    /// Remove `viewer` from the visibility set.
    ///
    /// A viewer never added is a no-op with no notification. Returns the
    /// outcome so the tracker can finalize emptied objects.
    pub fn remove(&self, viewer: ViewerId) -> RemoveOutcome {
        let emptied = {
            let mut state = self.state.lock();
            let Lifecycle::Spawned { visible_to } = &mut *state else {
                return RemoveOutcome::NotPresent;
            };
            if !visible_to.remove(&viewer) {
                return RemoveOutcome::NotPresent;
            }
            if visible_to.is_empty() {
                *state = Lifecycle::Unspawned;
                debug!("phantom {} despawned", self.id);
                true
            } else {
                false
            }
        };

        if let Err(fault) = self.spawner.destroy(viewer, self.id) {
            self.faults.report("phantom", &fault);
        }

        if emptied {
            RemoveOutcome::Emptied
        } else {
            RemoveOutcome::Removed
        }
    }

    /// Broadcast a delta to every viewer currently in the visibility set.
    /// No-op while unspawned.
    pub fn update(&self, delta: &PhantomDelta) {
        if let PhantomDelta::State(payload) = delta {
            *self.payload.write() = payload.clone();
        }

        let targets = self.visible_snapshot();
        for viewer in targets {
            if let Err(fault) = self.spawner.update(viewer, self.id, delta) {
                self.faults.report("phantom", &fault);
            }
        }
    }

    /// Replace the state payload without notifying anyone. Subsequent
    /// spawns and refreshes carry the new state.
    pub fn set_state(&self, payload: Payload) {
        *self.payload.write() = payload;
    }

    /// Re-send the current state to one viewer already in the set.
    pub fn refresh(&self, viewer: ViewerId) {
        if !self.contains(viewer) {
            return;
        }
        let delta = PhantomDelta::State(self.payload.read().clone());
        if let Err(fault) = self.spawner.update(viewer, self.id, &delta) {
            self.faults.report("phantom", &fault);
        }
    }

    fn viewer_moved(&self, viewer: ViewerId, position: Position) {
        let Anchor::RelativeToViewer(offset) = &self.anchor else {
            return;
        };
        if !self.contains(viewer) {
            return;
        }
        let delta = PhantomDelta::Position(position.offset(offset));
        if let Err(fault) = self.spawner.update(viewer, self.id, &delta) {
            self.faults.report("phantom", &fault);
        }
    }
}

/// Result of a visibility-set removal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoveOutcome {
    /// Viewer was not in the set; nothing happened.
    NotPresent,
    /// Viewer removed; others remain visible.
    Removed,
    /// Viewer removed and the set emptied; the object despawned.
    Emptied,
}

/// Registry of live phantom objects plus the movement subscription.
pub struct PhantomTracker {
    spawner: Arc<dyn SurrogateSpawner>,
    movement: Option<Arc<dyn MovementEvents>>,
    relative_alive: Mutex<usize>,
    objects: RwLock<HashMap<PhantomId, Arc<PhantomObject>>>,
    faults: Arc<FaultLog>,
}

impl PhantomTracker {
    /// A tracker driving `spawner`, optionally wired to movement events.
    pub fn new(
        spawner: Arc<dyn SurrogateSpawner>,
        movement: Option<Arc<dyn MovementEvents>>,
        faults: Arc<FaultLog>,
    ) -> Self {
        Self {
            spawner,
            movement,
            relative_alive: Mutex::new(0),
            objects: RwLock::new(HashMap::new()),
            faults,
        }
    }

    /// Create and register a phantom object in the `Unspawned` state.
    pub fn create(&self, anchor: Anchor, payload: Payload) -> Arc<PhantomObject> {
        let object = Arc::new(PhantomObject::new(
            anchor,
            payload,
            self.spawner.clone(),
            self.faults.clone(),
        ));
        if object.is_relative() {
            self.retain_movement();
        }
        self.objects.write().insert(object.id(), object.clone());
        debug!("phantom {} created", object.id());
        object
    }

    /// Look up a live object.
    pub fn get(&self, id: PhantomId) -> Option<Arc<PhantomObject>> {
        self.objects.read().get(&id).cloned()
    }

    /// Number of live objects.
    pub fn object_count(&self) -> usize {
        self.objects.read().len()
    }

    /// Is the movement subscription currently enabled?
    pub fn movement_active(&self) -> bool {
        *self.relative_alive.lock() > 0
    }

    /// Remove `viewer` from `object`, finalizing the object if the visibility
    /// set emptied.
    pub fn remove_viewer(&self, object: &Arc<PhantomObject>, viewer: ViewerId) -> RemoveOutcome {
        let outcome = object.remove(viewer);
        if outcome == RemoveOutcome::Emptied {
            self.finalize(object.id());
        }
        outcome
    }

    /// Owner-initiated destruction: notify every visible viewer and release
    /// the object.
    pub fn dispose(&self, id: PhantomId) {
        let Some(object) = self.get(id) else {
            return;
        };
        for viewer in object.visible_snapshot() {
            object.remove(viewer);
        }
        self.finalize(id);
    }

    /// Drop a viewer from every object's visibility set. Called by providers
    /// on leave and close.
    pub fn release_viewer(&self, viewer: ViewerId) {
        let snapshot: Vec<_> = self.objects.read().values().cloned().collect();
        for object in snapshot {
            self.remove_viewer(&object, viewer);
        }
    }

    /// Feed one viewer movement event through to relative-mode objects.
    pub fn viewer_moved(&self, viewer: ViewerId, position: Position) {
        let snapshot: Vec<_> = self.objects.read().values().cloned().collect();
        for object in snapshot {
            object.viewer_moved(viewer, position);
        }
    }

    fn finalize(&self, id: PhantomId) {
        if let Some(object) = self.objects.write().remove(&id) {
            debug!("phantom {id} released");
            if object.is_relative() {
                self.release_movement();
            }
        }
    }

    // The refcount guard is released before the host callback runs: a host
    // that synchronously re-enters the tracker from subscribe/unsubscribe
    // must not deadlock.
    fn retain_movement(&self) {
        let became_active = {
            let mut alive = self.relative_alive.lock();
            *alive += 1;
            *alive == 1
        };
        if became_active {
            debug!("enabling movement subscription (first relative phantom)");
            if let Some(movement) = &self.movement {
                movement.subscribe();
            }
        }
    }

    fn release_movement(&self) {
        let went_idle = {
            let mut alive = self.relative_alive.lock();
            debug_assert!(*alive > 0, "movement refcount underflow");
            *alive = alive.saturating_sub(1);
            *alive == 0
        };
        if went_idle {
            debug!("disabling movement subscription (no relative phantoms left)");
            if let Some(movement) = &self.movement {
                movement.unsubscribe();
            }
        }
    }
}
