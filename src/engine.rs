//! Engine bootstrap and provider factory.
//!
//! The engine is the explicit owner of everything that used to be a
//! process-wide singleton in systems like this: the capability index, the
//! resolved facet lists, the phantom tracker, and the owner-keyed provider
//! map. Bootstrap is the single initialization path; after it returns, facet
//! resolution is immutable and dispatch takes no locks on it.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;
use thiserror::Error;
use tracing::{debug, info};
use uuid::Uuid;

use crate::audience::AudienceProvider;
use crate::capabilities::{
    log_bootstrap_diagnostics, CapabilityIndex, CapabilityProbe,
};
use crate::config::EngineConfig;
use crate::content::{
    BarId, Book, BookId, BookSpec, BossBar, BossBarCommand, BossBarSpec, RichText, SoundCommand,
    TitleCommand,
};
use crate::facet::{ConfigurationError, Facet, FacetList, NoOpFacet};
use crate::phantom::{
    MovementEvents, NullSpawner, PhantomBossBarFacet, PhantomTracker, SurrogateSpawner,
};
use crate::telemetry::FaultLog;

/// Brand identifying the engine that issued a handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EngineId(Uuid);

impl EngineId {
    pub(crate) fn random() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for EngineId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identity of a provider's logical owner.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct OwnerId(String);

impl OwnerId {
    /// Wrap an owner name.
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }
}

impl From<&str> for OwnerId {
    fn from(name: &str) -> Self {
        Self(name.to_string())
    }
}

impl From<String> for OwnerId {
    fn from(name: String) -> Self {
        Self(name)
    }
}

impl fmt::Display for OwnerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A handle was passed into an engine that did not produce it.
///
/// Surfaced immediately: silently ignoring a foreign handle would hide an
/// integration bug.
#[derive(Debug, Error)]
pub enum MisuseError {
    /// Boss bar handle from another engine.
    #[error("boss bar {id} was not created by this engine")]
    ForeignBossBar {
        /// Offending handle.
        id: BarId,
    },

    /// Book handle from another engine.
    #[error("book {id} was not created by this engine")]
    ForeignBook {
        /// Offending handle.
        id: BookId,
    },
}

/// Resolved facet lists, one per operation family.
pub(crate) struct FacetSuite {
    pub(crate) chat: FacetList<RichText>,
    pub(crate) action_bar: FacetList<RichText>,
    pub(crate) title: FacetList<TitleCommand>,
    pub(crate) boss_bar: FacetList<BossBarCommand>,
    pub(crate) sound: FacetList<SoundCommand>,
    pub(crate) book: FacetList<Book>,
}

pub(crate) struct EngineShared {
    pub(crate) id: EngineId,
    pub(crate) config: EngineConfig,
    pub(crate) capabilities: CapabilityIndex,
    pub(crate) suite: FacetSuite,
    pub(crate) tracker: Arc<PhantomTracker>,
    pub(crate) faults: Arc<FaultLog>,
    providers: RwLock<HashMap<OwnerId, AudienceProvider>>,
}

impl EngineShared {
    pub(crate) fn remove_provider(&self, owner: &OwnerId) {
        self.providers.write().remove(owner);
    }
}

/// The capability-negotiation and dispatch engine.
#[derive(Clone)]
pub struct Engine {
    shared: Arc<EngineShared>,
}

impl Engine {
    /// Start assembling an engine.
    pub fn builder() -> EngineBuilder {
        EngineBuilder::default()
    }

    /// The memoized capability index.
    pub fn capabilities(&self) -> &CapabilityIndex {
        &self.shared.capabilities
    }

    /// Active configuration.
    pub fn config(&self) -> &EngineConfig {
        &self.shared.config
    }

    /// Provider for `owner`, created on first request.
    ///
    /// Idempotent: requesting a provider for an already-registered owner
    /// returns the existing instance.
    pub fn create_provider(&self, owner: impl Into<OwnerId>) -> AudienceProvider {
        let owner = owner.into();
        if let Some(existing) = self.shared.providers.read().get(&owner) {
            return existing.clone();
        }
        let mut providers = self.shared.providers.write();
        providers
            .entry(owner.clone())
            .or_insert_with(|| {
                debug!("creating audience provider for owner {owner}");
                AudienceProvider::new(owner, self.shared.clone())
            })
            .clone()
    }

    /// Number of live providers.
    pub fn provider_count(&self) -> usize {
        self.shared.providers.read().len()
    }

    /// Issue a boss bar handle accepted by this engine's audiences.
    pub fn create_boss_bar(&self, spec: BossBarSpec) -> BossBar {
        BossBar::new(self.shared.id, spec)
    }

    /// Issue a book handle accepted by this engine's audiences.
    pub fn create_book(&self, spec: BookSpec) -> Book {
        Book::new(self.shared.id, spec)
    }

    /// Total dispatch faults recorded since bootstrap.
    pub fn fault_count(&self) -> u64 {
        self.shared.faults.recorded()
    }
}

/// Collects probes and per-family facet declarations, then bootstraps.
///
/// Facet declaration order is priority order, most specific first. Built-in
/// fallbacks (the phantom boss bar) and the terminal no-ops are appended
/// after the declared facets, so hosts never need to register them.
#[derive(Default)]
pub struct EngineBuilder {
    config: EngineConfig,
    probes: Vec<Box<dyn CapabilityProbe>>,
    spawner: Option<Arc<dyn SurrogateSpawner>>,
    movement: Option<Arc<dyn MovementEvents>>,
    chat: Vec<Arc<dyn Facet<RichText>>>,
    action_bar: Vec<Arc<dyn Facet<RichText>>>,
    title: Vec<Arc<dyn Facet<TitleCommand>>>,
    boss_bar: Vec<Arc<dyn Facet<BossBarCommand>>>,
    sound: Vec<Arc<dyn Facet<SoundCommand>>>,
    book: Vec<Arc<dyn Facet<Book>>>,
}

impl EngineBuilder {
    /// Use `config` instead of the defaults.
    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Register a capability probe. Runs once during bootstrap.
    pub fn probe(mut self, probe: impl CapabilityProbe + 'static) -> Self {
        self.probes.push(Box::new(probe));
        self
    }

    /// Register the host's surrogate spawner, enabling phantom fallbacks.
    pub fn surrogate_spawner(mut self, spawner: Arc<dyn SurrogateSpawner>) -> Self {
        self.spawner = Some(spawner);
        self
    }

    /// Register the host's movement event hook for relative phantoms.
    pub fn movement_events(mut self, movement: Arc<dyn MovementEvents>) -> Self {
        self.movement = Some(movement);
        self
    }

    /// Declare a chat facet.
    pub fn chat_facet(mut self, facet: Arc<dyn Facet<RichText>>) -> Self {
        self.chat.push(facet);
        self
    }

    /// Declare an action bar facet.
    pub fn action_bar_facet(mut self, facet: Arc<dyn Facet<RichText>>) -> Self {
        self.action_bar.push(facet);
        self
    }

    /// Declare a title facet.
    pub fn title_facet(mut self, facet: Arc<dyn Facet<TitleCommand>>) -> Self {
        self.title.push(facet);
        self
    }

    /// Declare a boss bar facet. The phantom fallback is appended after all
    /// declared facets.
    pub fn boss_bar_facet(mut self, facet: Arc<dyn Facet<BossBarCommand>>) -> Self {
        self.boss_bar.push(facet);
        self
    }

    /// Declare a sound facet.
    pub fn sound_facet(mut self, facet: Arc<dyn Facet<SoundCommand>>) -> Self {
        self.sound.push(facet);
        self
    }

    /// Declare a book facet.
    pub fn book_facet(mut self, facet: Arc<dyn Facet<Book>>) -> Self {
        self.book.push(facet);
        self
    }

    /// Run every probe once, resolve every facet list, and assemble the
    /// engine.
    ///
    /// # Errors
    ///
    /// Fails only on a packaging defect ([`ConfigurationError`]); missing
    /// host capabilities degrade instead of failing.
    pub async fn bootstrap(mut self) -> Result<Engine, ConfigurationError> {
        info!("bootstrapping viewcast engine ({} probe(s))", self.probes.len());

        let capabilities = CapabilityIndex::detect(&self.probes).await;
        log_bootstrap_diagnostics(&capabilities);

        let faults = Arc::new(FaultLog::new(self.config.fault_log_window()));
        let spawner = self
            .spawner
            .take()
            .unwrap_or_else(|| Arc::new(NullSpawner));
        let tracker = Arc::new(PhantomTracker::new(
            spawner,
            self.movement.take(),
            faults.clone(),
        ));

        // Built-in boss bar fallback sits between host natives and the
        // terminal no-op.
        self.boss_bar
            .push(Arc::new(PhantomBossBarFacet::new(tracker.clone())));

        let config = self.config;
        let suite = FacetSuite {
            chat: Self::resolve("chat", "chat/no-op", self.chat, &config, &capabilities)?,
            action_bar: Self::resolve(
                "action-bar",
                "action-bar/no-op",
                self.action_bar,
                &config,
                &capabilities,
            )?,
            title: Self::resolve("title", "title/no-op", self.title, &config, &capabilities)?,
            boss_bar: Self::resolve(
                "boss-bar",
                "boss-bar/no-op",
                self.boss_bar,
                &config,
                &capabilities,
            )?,
            sound: Self::resolve("sound", "sound/no-op", self.sound, &config, &capabilities)?,
            book: Self::resolve("book", "book/no-op", self.book, &config, &capabilities)?,
        };

        info!("engine ready");
        Ok(Engine {
            shared: Arc::new(EngineShared {
                id: EngineId::random(),
                config,
                capabilities,
                suite,
                tracker,
                faults,
                providers: RwLock::new(HashMap::new()),
            }),
        })
    }

    fn resolve<M>(
        family: &'static str,
        noop_name: &'static str,
        mut candidates: Vec<Arc<dyn Facet<M>>>,
        config: &EngineConfig,
        capabilities: &CapabilityIndex,
    ) -> Result<FacetList<M>, ConfigurationError>
    where
        M: 'static,
    {
        if config.family_disabled(family) {
            info!("{family}: disabled by configuration");
            candidates.clear();
        }
        candidates.push(Arc::new(NoOpFacet::new(noop_name)));
        FacetList::resolve(family, candidates, capabilities)
    }
}
