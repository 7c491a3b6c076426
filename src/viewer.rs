//! Viewer abstraction
//!
//! Viewers are the addressable receivers the engine dispatches to. The host
//! supplies them; the core only sees this boundary: identity, kind, locale
//! hint, the viewer's own predicate methods, and a raw outgoing channel.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::facet::Payload;

/// Stable viewer identity.
///
/// Once assigned, an identity never changes for the viewer's lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ViewerId(Uuid);

impl ViewerId {
    /// Mint a fresh random identity.
    pub fn random() -> Self {
        Self(Uuid::new_v4())
    }

    /// Underlying UUID.
    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl fmt::Display for ViewerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Viewer kind classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ViewerKind {
    /// A fully connected interactive receiver.
    Primary,
    /// The host console.
    Console,
    /// A forwarding receiver that must first be resolved to a concrete
    /// target (command blocks, remote relays). Most facets exclude these.
    Indirect,
}

impl ViewerKind {
    /// Can this viewer be addressed directly, without resolution?
    pub fn is_direct(&self) -> bool {
        !matches!(self, Self::Indirect)
    }
}

impl fmt::Display for ViewerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Primary => write!(f, "primary"),
            Self::Console => write!(f, "console"),
            Self::Indirect => write!(f, "indirect"),
        }
    }
}

/// Membership tag a viewer can belong to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SegmentKey {
    /// A host instance (one of possibly several the process serves).
    Instance(String),
    /// A named viewer segment within an instance.
    Segment(String),
}

impl fmt::Display for SegmentKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Instance(name) => write!(f, "instance:{name}"),
            Self::Segment(name) => write!(f, "segment:{name}"),
        }
    }
}

/// World-space position, used for phantom object anchoring.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Position {
    /// X coordinate.
    pub x: f64,
    /// Y coordinate.
    pub y: f64,
    /// Z coordinate.
    pub z: f64,
}

impl Position {
    /// Construct a position.
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    /// This position translated by `delta`.
    pub fn offset(&self, delta: &Position) -> Position {
        Position {
            x: self.x + delta.x,
            y: self.y + delta.y,
            z: self.z + delta.z,
        }
    }
}

/// Raw outgoing channel of a viewer.
///
/// Writes are fire-and-forget: a failed write means this one viewer did not
/// receive this payload, nothing more. The engine never retries.
pub trait ViewerConnection: Send + Sync {
    /// Write one built payload to the viewer.
    fn send(&self, payload: &Payload) -> anyhow::Result<()>;
}

/// Host-supplied viewer handle.
pub trait Viewer: Send + Sync {
    /// Stable identity, if the host assigned one. Viewers without an
    /// identity are minted one when they join a provider.
    fn id(&self) -> Option<ViewerId>;

    /// Kind classification. Facet applicability keys off this.
    fn kind(&self) -> ViewerKind;

    /// Raw locale hint as reported by the host, if any.
    fn locale(&self) -> Option<String> {
        None
    }

    /// Permission predicate, delegated to the host.
    fn has_permission(&self, node: &str) -> bool;

    /// Membership predicate, delegated to the host.
    fn in_segment(&self, segment: &SegmentKey) -> bool;

    /// The raw channel facet `apply` implementations write to.
    fn connection(&self) -> &dyn ViewerConnection;

    /// Current position, for relative phantom anchoring.
    fn position(&self) -> Option<Position> {
        None
    }
}
