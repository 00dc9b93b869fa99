//! Realtime-safe single-slot publish/read handoff for completed scans.
//!
//! The hot path here is one publish per completed scan rather than per
//! packet, so a single `parking_lot::Mutex` guarding an `Arc<Scan>` is a
//! better fit than a lock-free ring buffer: the writer still never blocks
//! under realistic contention (one writer, short-lived reader critical
//! sections), and readers get a cheap `Arc::clone` of a consistent snapshot.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::scan::Scan;

/// Single-slot publisher. The writer overwrites the slot on every completed
/// scan; readers take a snapshot with [`RealtimeHandoff::latest`].
#[derive(Default)]
pub struct RealtimeHandoff {
    slot: Mutex<Option<Arc<Scan>>>,
}

impl RealtimeHandoff {
    pub fn new() -> Self {
        Self {
            slot: Mutex::new(None),
        }
    }

    /// Publish a newly completed scan, replacing whatever was there.
    pub fn publish(&self, scan: Scan) -> Arc<Scan> {
        let scan = Arc::new(scan);
        *self.slot.lock() = Some(Arc::clone(&scan));
        scan
    }

    /// Snapshot of the most recently published scan, if any.
    pub fn latest(&self) -> Option<Arc<Scan>> {
        self.slot.lock().clone()
    }
}
