//! Per-source stream state registry.
//!
//! The store is the only state shared between acquisition loops and
//! consumers. It is fully partitioned by source index: each slot carries its
//! own lock, so no source ever waits on another. Per slot there is exactly
//! one writer (the owning acquisition loop) and arbitrarily many readers.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use crate::{Frame, Status};

#[derive(Debug, Default)]
struct Observation {
    frame: Option<Frame>,
    status: Status,
}

/// State for one source index: latest frame, status, and running flag.
///
/// Frame and status live behind a single mutex so readers always observe a
/// consistent pair from the same acquisition cycle. Critical sections only
/// copy or replace a reference-sized value.
#[derive(Debug, Default)]
pub struct StreamSlot {
    observation: Mutex<Observation>,
    running: AtomicBool,
}

impl StreamSlot {
    fn lock(&self) -> MutexGuard<'_, Observation> {
        // A poisoned slot mutex means a writer panicked mid-publish; the
        // stored pair is still a complete previous observation.
        match self.observation.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Publish a new (frame, status) pair, replacing the previous one.
    pub fn publish(&self, frame: Frame, status: Status) {
        let mut obs = self.lock();
        obs.frame = Some(frame);
        obs.status = status;
    }

    pub fn frame(&self) -> Option<Frame> {
        self.lock().frame.clone()
    }

    pub fn status(&self) -> Status {
        self.lock().status
    }

    /// Consistent point-in-time copy of the (frame, status) pair.
    pub fn snapshot(&self) -> (Option<Frame>, Status) {
        let obs = self.lock();
        (obs.frame.clone(), obs.status)
    }

    pub fn set_running(&self, running: bool) {
        self.running.store(running, Ordering::SeqCst);
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}

/// Registry of stream slots, one per configured source index.
///
/// Slots are created when the registry is built and never removed; stopping
/// a source clears its running flag but leaves the last frame and status
/// visible for inspection.
#[derive(Debug)]
pub struct StreamStore {
    slots: Vec<Arc<StreamSlot>>,
}

impl StreamStore {
    pub fn new(source_count: usize) -> Self {
        Self {
            slots: (0..source_count).map(|_| Arc::new(StreamSlot::default())).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn slot(&self, index: usize) -> Option<Arc<StreamSlot>> {
        self.slots.get(index).cloned()
    }

    pub fn frame(&self, index: usize) -> Option<Frame> {
        self.slots.get(index).and_then(|slot| slot.frame())
    }

    pub fn status(&self, index: usize) -> Status {
        self.slots
            .get(index)
            .map(|slot| slot.status())
            .unwrap_or(Status::Unknown)
    }

    pub fn is_running(&self, index: usize) -> bool {
        self.slots
            .get(index)
            .map(|slot| slot.is_running())
            .unwrap_or(false)
    }

    pub fn running_count(&self) -> usize {
        self.slots.iter().filter(|slot| slot.is_running()).count()
    }

    pub fn connected_count(&self) -> usize {
        self.slots
            .iter()
            .filter(|slot| slot.status().is_connected())
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::RgbImage;

    fn test_frame(width: u32) -> Frame {
        Frame::new(RgbImage::new(width, 10))
    }

    #[test]
    fn new_slots_start_unknown_and_empty() {
        let store = StreamStore::new(3);
        assert_eq!(store.len(), 3);
        assert_eq!(store.status(0), Status::Unknown);
        assert!(store.frame(0).is_none());
        assert!(!store.is_running(0));
    }

    #[test]
    fn publish_replaces_previous_pair() {
        let store = StreamStore::new(1);
        let slot = store.slot(0).unwrap();
        slot.publish(test_frame(8), Status::Connected);
        slot.publish(test_frame(16), Status::Disconnected);

        let (frame, status) = slot.snapshot();
        assert_eq!(frame.unwrap().width(), 16);
        assert_eq!(status, Status::Disconnected);
    }

    #[test]
    fn out_of_range_index_reads_as_absent() {
        let store = StreamStore::new(1);
        assert!(store.frame(9).is_none());
        assert_eq!(store.status(9), Status::Unknown);
        assert!(!store.is_running(9));
    }

    #[test]
    fn running_count_tracks_flags() {
        let store = StreamStore::new(4);
        store.slot(0).unwrap().set_running(true);
        store.slot(2).unwrap().set_running(true);
        assert_eq!(store.running_count(), 2);
        store.slot(0).unwrap().set_running(false);
        assert_eq!(store.running_count(), 1);
    }

    #[test]
    fn concurrent_reads_see_complete_pairs() {
        let store = Arc::new(StreamStore::new(1));
        let slot = store.slot(0).unwrap();

        let writer = {
            let slot = slot.clone();
            std::thread::spawn(move || {
                for i in 0..200u32 {
                    let status = if i % 2 == 0 {
                        Status::Connected
                    } else {
                        Status::Disconnected
                    };
                    // Even widths are published connected, odd disconnected.
                    slot.publish(test_frame(i + 1), status);
                }
            })
        };

        for _ in 0..200 {
            let (frame, status) = slot.snapshot();
            if let Some(frame) = frame {
                let expected = if frame.width() % 2 == 1 {
                    Status::Connected
                } else {
                    Status::Disconnected
                };
                assert_eq!(status, expected);
            } else {
                assert_eq!(status, Status::Unknown);
            }
        }

        writer.join().unwrap();
    }
}
