//! Cache invalidation signal.
//!
//! Every successful graph mutation tells a downstream read cache (the
//! rendered node listing, typically) that its data is stale. Delivery is
//! fire-and-forget: a failing invalidator is logged by the caller and never
//! turns a successful mutation into a failed one.

use anyhow::Result;

use crate::models::EntityId;

/// What changed, for logging and targeted invalidation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invalidation {
    pub entity_ids: Vec<EntityId>,
    pub reason: &'static str,
}

impl Invalidation {
    pub fn new(reason: &'static str, entity_ids: Vec<EntityId>) -> Self {
        Self { entity_ids, reason }
    }
}

/// Receiver of cache invalidation signals.
pub trait CacheInvalidator: Send + Sync {
    fn invalidate(&self, signal: &Invalidation) -> Result<()>;
}

#[cfg(test)]
pub(crate) mod testing {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    use super::*;

    /// Invalidator that records every signal it receives.
    #[derive(Debug, Default)]
    pub struct RecordingInvalidator {
        signals: Mutex<Vec<Invalidation>>,
        count: AtomicUsize,
    }

    impl RecordingInvalidator {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn count(&self) -> usize {
            self.count.load(Ordering::SeqCst)
        }

        pub fn signals(&self) -> Vec<Invalidation> {
            self.signals
                .lock()
                .map(|s| s.clone())
                .unwrap_or_default()
        }
    }

    impl CacheInvalidator for RecordingInvalidator {
        fn invalidate(&self, signal: &Invalidation) -> Result<()> {
            self.count.fetch_add(1, Ordering::SeqCst);
            if let Ok(mut signals) = self.signals.lock() {
                signals.push(signal.clone());
            }
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::RecordingInvalidator;
    use super::*;

    #[test]
    fn test_recording_invalidator_keeps_order() {
        let recorder = RecordingInvalidator::new();
        recorder
            .invalidate(&Invalidation::new("create_link", vec![1, 2]))
            .unwrap();
        recorder
            .invalidate(&Invalidation::new("save_position", vec![3]))
            .unwrap();
        assert_eq!(recorder.count(), 2);
        let signals = recorder.signals();
        assert_eq!(signals[0].reason, "create_link");
        assert_eq!(signals[1].entity_ids, vec![3]);
    }
}
