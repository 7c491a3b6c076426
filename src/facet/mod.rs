//! Facets: one implementation of one operation family.
//!
//! A facet is gated twice. `environment_supported` is call-invariant and is
//! consulted exactly once, when the family's candidate list is resolved at
//! bootstrap. `applicable` is viewer-dependent and is consulted per call.
//! Keeping the two gates separate means the environment is never re-probed
//! on the dispatch path.

mod selector;

use std::fmt;
use std::sync::Arc;

use thiserror::Error;

pub use selector::{ConfigurationError, FacetList};

use crate::capabilities::CapabilityIndex;
use crate::viewer::Viewer;

/// Build product of a facet, shared across every viewer of one broadcast
/// group.
///
/// A payload is either encoded bytes destined for a raw channel, a typed
/// value for facets that act through a collaborator instead of the channel
/// (the phantom fallback), or a bare marker for no-ops.
#[derive(Clone)]
pub struct Payload {
    tag: &'static str,
    body: PayloadBody,
}

#[derive(Clone)]
enum PayloadBody {
    Marker,
    Bytes(Arc<[u8]>),
    Value(Arc<dyn std::any::Any + Send + Sync>),
}

impl Payload {
    /// Encoded bytes ready for a viewer connection.
    pub fn bytes(tag: &'static str, bytes: Vec<u8>) -> Self {
        Self {
            tag,
            body: PayloadBody::Bytes(bytes.into()),
        }
    }

    /// A typed value carried to `apply` without encoding.
    pub fn value<T: Send + Sync + 'static>(tag: &'static str, value: T) -> Self {
        Self {
            tag,
            body: PayloadBody::Value(Arc::new(value)),
        }
    }

    /// An empty marker payload.
    pub fn marker(tag: &'static str) -> Self {
        Self {
            tag,
            body: PayloadBody::Marker,
        }
    }

    /// Payload tag, typically the producing facet's name.
    pub fn tag(&self) -> &'static str {
        self.tag
    }

    /// Encoded bytes, if this is a byte payload.
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match &self.body {
            PayloadBody::Bytes(bytes) => Some(bytes),
            _ => None,
        }
    }

    /// Typed value, if this is a value payload of type `T`.
    pub fn downcast_ref<T: Send + Sync + 'static>(&self) -> Option<&T> {
        match &self.body {
            PayloadBody::Value(value) => value.downcast_ref(),
            _ => None,
        }
    }
}

impl fmt::Debug for Payload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match &self.body {
            PayloadBody::Marker => "marker".to_string(),
            PayloadBody::Bytes(bytes) => format!("{} bytes", bytes.len()),
            PayloadBody::Value(_) => "value".to_string(),
        };
        write!(f, "Payload({}, {kind})", self.tag)
    }
}

/// Per-viewer dispatch failure.
///
/// Caught at the facet boundary and logged rate-limited; never escapes an
/// audience method.
#[derive(Debug, Error)]
pub enum DispatchFault {
    /// The viewer's raw channel rejected the write.
    #[error("connection write failed: {0}")]
    Connection(#[source] anyhow::Error),

    /// The viewer no longer has a live channel.
    #[error("viewer has no live channel")]
    ChannelClosed,

    /// A surrogate collaborator call failed.
    #[error("surrogate call failed: {0}")]
    Surrogate(String),
}

impl DispatchFault {
    /// Stable kind name, used as the rate-limit key.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Connection(_) => "connection",
            Self::ChannelClosed => "channel-closed",
            Self::Surrogate(_) => "surrogate",
        }
    }
}

/// One implementation of one operation family.
pub trait Facet<M>: Send + Sync {
    /// Human-readable name, `family/variant` by convention.
    fn name(&self) -> &'static str;

    /// Call-invariant environment gate. Consulted once, at list resolution.
    fn environment_supported(&self, capabilities: &CapabilityIndex) -> bool;

    /// Per-call viewer gate. Must be a pure function of the viewer's kind;
    /// selection results are memoized per kind.
    fn applicable(&self, _viewer: &dyn Viewer) -> bool {
        true
    }

    /// Construct the payload once per broadcast group. Pure and
    /// side-effect-free; the result is shared across many viewers.
    fn build(&self, message: &M) -> Payload;

    /// Deliver the payload to one viewer. Failures are faults, not panics.
    fn apply(&self, viewer: &dyn Viewer, payload: &Payload) -> Result<(), DispatchFault>;

    /// Terminal facets close a family's candidate list and make selection
    /// total. Exactly one, declared last, is required per family.
    fn terminal(&self) -> bool {
        false
    }
}

/// Terminal no-op facet: always supported, applies to every viewer, sends
/// nothing. Guarantees that every call resolves to some facet.
pub struct NoOpFacet {
    name: &'static str,
}

impl NoOpFacet {
    /// A no-op named `name` (conventionally `family/no-op`).
    pub fn new(name: &'static str) -> Self {
        Self { name }
    }
}

impl<M> Facet<M> for NoOpFacet {
    fn name(&self) -> &'static str {
        self.name
    }

    fn environment_supported(&self, _capabilities: &CapabilityIndex) -> bool {
        true
    }

    fn build(&self, _message: &M) -> Payload {
        Payload::marker(self.name)
    }

    fn apply(&self, _viewer: &dyn Viewer, _payload: &Payload) -> Result<(), DispatchFault> {
        Ok(())
    }

    fn terminal(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::RichText;

    #[test]
    fn payload_bytes_accessors() {
        let payload = Payload::bytes("test", vec![1, 2, 3]);
        assert_eq!(payload.as_bytes(), Some(&[1u8, 2, 3][..]));
        assert!(payload.downcast_ref::<u32>().is_none());
    }

    #[test]
    fn payload_value_downcast() {
        let payload = Payload::value("test", 42u32);
        assert_eq!(payload.downcast_ref::<u32>(), Some(&42));
        assert!(payload.as_bytes().is_none());
    }

    #[test]
    fn noop_builds_marker() {
        let noop = NoOpFacet::new("chat/no-op");
        let payload = Facet::<RichText>::build(&noop, &RichText::plain("hi"));
        assert_eq!(payload.tag(), "chat/no-op");
        assert!(payload.as_bytes().is_none());
        assert!(Facet::<RichText>::terminal(&noop));
    }
}
