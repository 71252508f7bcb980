//! Change notification for status observers
//!
//! The controller marks the bus dirty after every successful mutation.
//! Each observer (one per display runner) owns its own [`UpdateFlag`], so
//! one observer consuming a change never hides it from another.
//!
//! # Example
//!
//! ```no_run
//! use usbode::events::UpdateBus;
//!
//! let bus = UpdateBus::new();
//! let flag = bus.subscribe();
//!
//! bus.mark_dirty();
//! bus.mark_dirty();
//!
//! assert!(flag.consume_if_dirty());
//! assert!(!flag.consume_if_dirty());
//! ```

mod flag;

pub use flag::UpdateFlag;

use parking_lot::RwLock;
use std::sync::Arc;

/// Fan-out registry of per-observer dirty flags
#[derive(Clone, Default)]
pub struct UpdateBus {
    flags: Arc<RwLock<Vec<Arc<UpdateFlag>>>>,
}

impl UpdateBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new observer and hand back its flag
    ///
    /// The flag starts dirty so the observer renders once on startup.
    pub fn subscribe(&self) -> Arc<UpdateFlag> {
        let flag = Arc::new(UpdateFlag::new());
        flag.mark_dirty();
        self.flags.write().push(flag.clone());
        flag
    }

    /// Drop an observer's flag
    pub fn unsubscribe(&self, flag: &Arc<UpdateFlag>) {
        self.flags.write().retain(|f| !Arc::ptr_eq(f, flag));
    }

    /// Mark every observer dirty
    pub fn mark_dirty(&self) {
        for flag in self.flags.read().iter() {
            flag.mark_dirty();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_observers_are_independent() {
        let bus = UpdateBus::new();
        let a = bus.subscribe();
        let b = bus.subscribe();

        // Initial render
        assert!(a.consume_if_dirty());
        assert!(b.consume_if_dirty());

        bus.mark_dirty();
        assert!(a.consume_if_dirty());
        assert!(!a.consume_if_dirty());
        assert!(b.consume_if_dirty());
    }

    #[test]
    fn test_unsubscribe() {
        let bus = UpdateBus::new();
        let a = bus.subscribe();
        assert!(a.consume_if_dirty());

        bus.unsubscribe(&a);
        assert!(bus.flags.read().is_empty());

        bus.mark_dirty();
        assert!(!a.consume_if_dirty());
    }

    #[test]
    fn test_no_subscribers() {
        let bus = UpdateBus::new();
        bus.mark_dirty();
        assert!(bus.flags.read().is_empty());
    }
}
