//! Content value types
//!
//! The rich-text value is opaque: the engine passes it to facet builders and
//! never inspects its internals. Handles produced here (boss bars, books)
//! carry the issuing engine's brand so foreign handles can be rejected.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::engine::EngineId;

/// Opaque, immutable structured message.
#[derive(Debug, Clone)]
pub struct RichText {
    inner: Arc<Value>,
}

impl RichText {
    /// Wrap an externally built structured value.
    pub fn from_value(value: Value) -> Self {
        Self {
            inner: Arc::new(value),
        }
    }

    /// Plain unstyled text.
    pub fn plain(text: impl Into<String>) -> Self {
        Self::from_value(Value::String(text.into()))
    }

    /// The structured value, for facet builders only.
    pub fn as_value(&self) -> &Value {
        &self.inner
    }
}

impl PartialEq for RichText {
    fn eq(&self, other: &Self) -> bool {
        self.inner == other.inner
    }
}

/// Title fade timings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TitleTimes {
    /// Fade-in duration.
    pub fade_in: Duration,
    /// On-screen duration.
    pub stay: Duration,
    /// Fade-out duration.
    pub fade_out: Duration,
}

impl Default for TitleTimes {
    fn default() -> Self {
        Self {
            fade_in: Duration::from_millis(500),
            stay: Duration::from_millis(3500),
            fade_out: Duration::from_millis(1000),
        }
    }
}

/// Full-screen title.
#[derive(Debug, Clone)]
pub struct TitleSpec {
    /// Main line.
    pub title: RichText,
    /// Optional subtitle line.
    pub subtitle: Option<RichText>,
    /// Fade timings; `None` keeps the host defaults.
    pub times: Option<TitleTimes>,
}

/// Title-family operation. Show, clear, and reset share one facet list.
#[derive(Debug, Clone)]
pub enum TitleCommand {
    /// Display a title.
    Show(TitleSpec),
    /// Remove the current title, keeping configured timings.
    Clear,
    /// Remove the current title and restore default timings.
    Reset,
}

/// Sound channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SoundSource {
    /// Master channel.
    Master,
    /// Background music.
    Music,
    /// Ambient effects.
    Ambient,
    /// Voice/speech.
    Voice,
}

/// A playable sound effect.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SoundSpec {
    /// Namespaced sound identifier.
    pub name: String,
    /// Channel to play on.
    pub source: SoundSource,
    /// Volume, 0.0..=1.0.
    pub volume: f32,
    /// Pitch multiplier.
    pub pitch: f32,
}

/// Selector for stopping sounds. Empty fields match everything.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SoundStop {
    /// Stop only this sound, if set.
    pub name: Option<String>,
    /// Stop only this channel, if set.
    pub source: Option<SoundSource>,
}

/// Sound-family operation.
#[derive(Debug, Clone)]
pub enum SoundCommand {
    /// Start playback.
    Play(SoundSpec),
    /// Stop matching playback.
    Stop(SoundStop),
}

/// Boss bar color.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[allow(missing_docs)]
pub enum BarColor {
    Pink,
    Blue,
    Red,
    Green,
    Yellow,
    Purple,
    White,
}

/// Boss bar segmentation overlay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[allow(missing_docs)]
pub enum BarOverlay {
    Progress,
    Notched6,
    Notched10,
    Notched12,
    Notched20,
}

/// Mutable boss bar state.
#[derive(Debug, Clone)]
pub struct BossBarSpec {
    /// Bar caption.
    pub title: RichText,
    /// Fill fraction, 0.0..=1.0.
    pub progress: f32,
    /// Bar color.
    pub color: BarColor,
    /// Segmentation overlay.
    pub overlay: BarOverlay,
}

/// Boss bar handle identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BarId(Uuid);

impl fmt::Display for BarId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A boss bar handle issued by an engine.
///
/// Only handles created through [`Engine::create_boss_bar`] are accepted by
/// audience methods; foreign handles are rejected as a misuse error.
///
/// [`Engine::create_boss_bar`]: crate::engine::Engine::create_boss_bar
#[derive(Clone)]
pub struct BossBar {
    engine: EngineId,
    id: BarId,
    state: Arc<RwLock<BossBarSpec>>,
}

impl BossBar {
    pub(crate) fn new(engine: EngineId, spec: BossBarSpec) -> Self {
        Self {
            engine,
            id: BarId(Uuid::new_v4()),
            state: Arc::new(RwLock::new(spec)),
        }
    }

    /// Handle identity.
    pub fn id(&self) -> BarId {
        self.id
    }

    pub(crate) fn engine_id(&self) -> EngineId {
        self.engine
    }

    /// Snapshot of the current state.
    pub fn state(&self) -> BossBarSpec {
        self.state.read().clone()
    }

    /// Replace the caption. Takes effect on the next show/refresh.
    pub fn set_title(&self, title: RichText) {
        self.state.write().title = title;
    }

    /// Set the fill fraction, clamped to 0.0..=1.0.
    pub fn set_progress(&self, progress: f32) {
        self.state.write().progress = progress.clamp(0.0, 1.0);
    }

    /// Set the bar color.
    pub fn set_color(&self, color: BarColor) {
        self.state.write().color = color;
    }

    /// Set the segmentation overlay.
    pub fn set_overlay(&self, overlay: BarOverlay) {
        self.state.write().overlay = overlay;
    }
}

impl fmt::Debug for BossBar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BossBar").field("id", &self.id).finish()
    }
}

/// Boss-bar-family operation.
#[derive(Debug, Clone)]
pub enum BossBarCommand {
    /// Make the bar visible to the target viewers.
    Show(BossBar),
    /// Remove the bar from the target viewers.
    Hide(BossBar),
}

impl BossBarCommand {
    /// The handle this command operates on.
    pub fn bar(&self) -> &BossBar {
        match self {
            Self::Show(bar) | Self::Hide(bar) => bar,
        }
    }
}

/// Book handle identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BookId(Uuid);

impl fmt::Display for BookId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Immutable paginated document content.
#[derive(Debug, Clone)]
pub struct BookSpec {
    /// Cover title.
    pub title: RichText,
    /// Author line.
    pub author: RichText,
    /// Page contents, in order.
    pub pages: Vec<RichText>,
}

/// A book handle issued by an engine.
#[derive(Clone)]
pub struct Book {
    engine: EngineId,
    id: BookId,
    spec: Arc<BookSpec>,
}

impl Book {
    pub(crate) fn new(engine: EngineId, spec: BookSpec) -> Self {
        Self {
            engine,
            id: BookId(Uuid::new_v4()),
            spec: Arc::new(spec),
        }
    }

    /// Handle identity.
    pub fn id(&self) -> BookId {
        self.id
    }

    pub(crate) fn engine_id(&self) -> EngineId {
        self.engine
    }

    /// Document content.
    pub fn spec(&self) -> &BookSpec {
        &self.spec
    }
}

impl fmt::Debug for Book {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Book")
            .field("id", &self.id)
            .field("pages", &self.spec.pages.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rich_text_plain_roundtrip() {
        let text = RichText::plain("hello");
        assert_eq!(text.as_value(), &Value::String("hello".into()));
        assert_eq!(text, RichText::plain("hello"));
    }

    #[test]
    fn boss_bar_progress_clamped() {
        let bar = BossBar::new(
            EngineId::random(),
            BossBarSpec {
                title: RichText::plain("raid"),
                progress: 0.5,
                color: BarColor::Red,
                overlay: BarOverlay::Progress,
            },
        );
        bar.set_progress(1.7);
        assert_eq!(bar.state().progress, 1.0);
        bar.set_progress(-0.2);
        assert_eq!(bar.state().progress, 0.0);
    }

    #[test]
    fn boss_bar_state_shared_across_clones() {
        let bar = BossBar::new(
            EngineId::random(),
            BossBarSpec {
                title: RichText::plain("raid"),
                progress: 1.0,
                color: BarColor::Blue,
                overlay: BarOverlay::Notched10,
            },
        );
        let alias = bar.clone();
        bar.set_progress(0.25);
        assert_eq!(alias.state().progress, 0.25);
        assert_eq!(alias.id(), bar.id());
    }
}
