//! # viewcast
//!
//! Capability-negotiated content dispatch for heterogeneous viewers.
//!
//! A host embeds one [`Engine`]; plugins request [`AudienceProvider`]s from
//! it and address [`Audience`]s (live, filterable viewer sets) with a
//! uniform operation surface: chat, action bars, titles, boss bars, sounds,
//! and books. Each operation family is backed by a priority-ordered list of
//! [`Facet`] strategies; the engine probes the host environment once at
//! bootstrap and every call thereafter resolves to the best facet that can
//! actually service the target viewer, degrading to a no-op instead of
//! failing.
//!
//! # Architecture
//!
//! ```text
//! viewcast
//!   ├─> Capability Index (probes run once at bootstrap, memoized)
//!   ├─> Facet Lists (per family, environment-filtered, no-op terminal)
//!   ├─> Audience Providers (owner-keyed viewer registries)
//!   ├─> Phantom Tracker (simulated objects backing fallback facets)
//!   └─> Fault Log (rate-limited dispatch fault telemetry)
//! ```
//!
//! # Dispatch Flow
//!
//! **Send Path:** Audience → snapshot viewers → group by servicing facet →
//! build once per group → apply per viewer
//!
//! **Fallback Path:** facet unsupported at bootstrap → filtered from the
//! list; inapplicable per viewer → next facet; no facet → no-op
//!
//! # Bootstrap
//!
//! ```ignore
//! let engine = Engine::builder()
//!     .probe(host_probes())
//!     .chat_facet(Arc::new(NativeChat::new(handle.clone())))
//!     .surrogate_spawner(Arc::new(EntitySpawner::new(handle)))
//!     .bootstrap()
//!     .await?;
//!
//! let provider = engine.create_provider("my-plugin");
//! provider.all().send_message(&RichText::plain("server restarting"));
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

/// Audience providers and the uniform operation surface
pub mod audience;

/// Capability probing and the bootstrap-time capability index
pub mod capabilities;

/// Engine configuration
pub mod config;

/// Message content types: rich text, titles, sounds, boss bars, books
pub mod content;

/// Engine bootstrap, handle branding, and the provider factory
pub mod engine;

/// The facet abstraction: capability-gated dispatch strategies
pub mod facet;

/// Phantom objects: simulated entities backing fallback facets
pub mod phantom;

/// Telemetry: rate-limited dispatch fault logging
pub mod telemetry;

/// Viewer abstraction: identity, kind, predicates, connection
pub mod viewer;

#[cfg(test)]
mod testutil;

pub use audience::{Audience, AudienceProvider, MetadataUpdate, ViewerFilter, ViewerMetadata};
pub use capabilities::{CapabilityIndex, CapabilityProbe, Feature, ProbeError, StaticProbe};
pub use config::EngineConfig;
pub use content::{
    BarColor, BarOverlay, Book, BookSpec, BossBar, BossBarSpec, RichText, SoundSource, SoundSpec,
    SoundStop, TitleSpec, TitleTimes,
};
pub use engine::{Engine, EngineBuilder, MisuseError, OwnerId};
pub use facet::{ConfigurationError, DispatchFault, Facet, NoOpFacet, Payload};
pub use phantom::{Anchor, MovementEvents, PhantomDelta, PhantomDescriptor, SurrogateSpawner};
pub use viewer::{Position, SegmentKey, Viewer, ViewerConnection, ViewerId, ViewerKind};
