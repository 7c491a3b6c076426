//! Dispatch telemetry.
//!
//! Individual apply failures are expected under churn (a viewer can
//! disconnect mid-broadcast), so faults are counted and logged rate-limited
//! per family and fault kind instead of flooding the log.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tracing::warn;

/// Rate-limited dispatch fault log.
pub struct FaultLog {
    window: Duration,
    recorded: AtomicU64,
    seen: Mutex<HashMap<(&'static str, &'static str), WindowEntry>>,
}

struct WindowEntry {
    last_logged: Instant,
    suppressed: u64,
}

impl FaultLog {
    /// A log that emits at most one line per family+kind per `window`.
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            recorded: AtomicU64::new(0),
            seen: Mutex::new(HashMap::new()),
        }
    }

    /// Record one fault against `family`.
    pub fn report(&self, family: &'static str, fault: &crate::facet::DispatchFault) {
        self.recorded.fetch_add(1, Ordering::Relaxed);

        let key = (family, fault.kind());
        let now = Instant::now();
        let mut seen = self.seen.lock();

        match seen.get_mut(&key) {
            Some(entry) if now.duration_since(entry.last_logged) < self.window => {
                entry.suppressed += 1;
            }
            Some(entry) => {
                warn!(
                    "{family}: dispatch fault ({}): {fault} ({} suppressed since last report)",
                    fault.kind(),
                    entry.suppressed
                );
                entry.last_logged = now;
                entry.suppressed = 0;
            }
            None => {
                warn!("{family}: dispatch fault ({}): {fault}", fault.kind());
                seen.insert(
                    key,
                    WindowEntry {
                        last_logged: now,
                        suppressed: 0,
                    },
                );
            }
        }
    }

    /// Total faults recorded since construction, logged or suppressed.
    pub fn recorded(&self) -> u64 {
        self.recorded.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::facet::DispatchFault;

    #[test]
    fn every_fault_is_counted() {
        let log = FaultLog::new(Duration::from_secs(30));
        for _ in 0..5 {
            log.report("chat", &DispatchFault::ChannelClosed);
        }
        log.report("sound", &DispatchFault::Surrogate("gone".into()));
        assert_eq!(log.recorded(), 6);
    }

    #[test]
    fn suppression_tracks_per_family_and_kind() {
        let log = FaultLog::new(Duration::from_secs(30));
        log.report("chat", &DispatchFault::ChannelClosed);
        log.report("chat", &DispatchFault::ChannelClosed);
        log.report("chat", &DispatchFault::Surrogate("x".into()));

        let seen = log.seen.lock();
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[&("chat", "channel-closed")].suppressed, 1);
        assert_eq!(seen[&("chat", "surrogate")].suppressed, 0);
    }
}
