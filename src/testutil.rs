//! Shared test fixtures.

#![allow(dead_code)]

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::facet::Payload;
use crate::viewer::{Position, SegmentKey, Viewer, ViewerConnection, ViewerId, ViewerKind};

/// Connection that records every payload it is asked to send.
#[derive(Default)]
pub struct RecordingConnection {
    sent: Mutex<Vec<Payload>>,
    fail: AtomicBool,
}

impl RecordingConnection {
    pub fn sent(&self) -> Vec<Payload> {
        self.sent.lock().clone()
    }

    pub fn sent_count(&self) -> usize {
        self.sent.lock().len()
    }

    pub fn set_failing(&self, failing: bool) {
        self.fail.store(failing, Ordering::Relaxed);
    }
}

impl ViewerConnection for RecordingConnection {
    fn send(&self, payload: &Payload) -> anyhow::Result<()> {
        if self.fail.load(Ordering::Relaxed) {
            anyhow::bail!("connection refused");
        }
        self.sent.lock().push(payload.clone());
        Ok(())
    }
}

/// Configurable in-memory viewer.
pub struct FakeViewer {
    pub label: String,
    id: Option<ViewerId>,
    kind: ViewerKind,
    locale: Option<String>,
    permissions: HashSet<String>,
    segments: HashSet<SegmentKey>,
    position: Option<Position>,
    connection: Arc<RecordingConnection>,
}

impl FakeViewer {
    pub fn primary(label: &str) -> Self {
        Self {
            label: label.to_string(),
            id: Some(ViewerId::random()),
            kind: ViewerKind::Primary,
            locale: None,
            permissions: HashSet::new(),
            segments: HashSet::new(),
            position: None,
            connection: Arc::new(RecordingConnection::default()),
        }
    }

    /// Console viewers carry no host identity; providers mint one at join.
    pub fn console() -> Self {
        Self {
            id: None,
            kind: ViewerKind::Console,
            ..Self::primary("console")
        }
    }

    pub fn indirect(label: &str) -> Self {
        Self {
            kind: ViewerKind::Indirect,
            ..Self::primary(label)
        }
    }

    pub fn with_permission(mut self, node: &str) -> Self {
        self.permissions.insert(node.to_string());
        self
    }

    pub fn with_segment(mut self, segment: SegmentKey) -> Self {
        self.segments.insert(segment);
        self
    }

    pub fn with_locale(mut self, locale: &str) -> Self {
        self.locale = Some(locale.to_string());
        self
    }

    pub fn with_position(mut self, position: Position) -> Self {
        self.position = Some(position);
        self
    }

    pub fn connection_handle(&self) -> Arc<RecordingConnection> {
        self.connection.clone()
    }
}

impl Viewer for FakeViewer {
    fn id(&self) -> Option<ViewerId> {
        self.id
    }

    fn kind(&self) -> ViewerKind {
        self.kind
    }

    fn locale(&self) -> Option<String> {
        self.locale.clone()
    }

    fn has_permission(&self, node: &str) -> bool {
        self.permissions.contains(node)
    }

    fn in_segment(&self, segment: &SegmentKey) -> bool {
        self.segments.contains(segment)
    }

    fn connection(&self) -> &dyn ViewerConnection {
        self.connection.as_ref()
    }

    fn position(&self) -> Option<Position> {
        self.position
    }
}
