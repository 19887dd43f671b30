use std::sync::Arc;

use parking_lot::RwLock;

/// Receives the Busy → Idle notification of an idle resource.
pub trait ResourceCallback: Send + Sync {
    fn on_transition_to_idle(&self);
}

impl<F> ResourceCallback for F
where
    F: Fn() + Send + Sync,
{
    fn on_transition_to_idle(&self) {
        self()
    }
}

/// Holds at most one callback. Registering replaces the previous one.
#[derive(Default)]
pub(crate) struct CallbackSlot {
    current: RwLock<Option<Arc<dyn ResourceCallback>>>,
}

impl CallbackSlot {
    pub(crate) fn replace(&self, callback: Arc<dyn ResourceCallback>) {
        *self.current.write() = Some(callback);
    }

    pub(crate) fn is_registered(&self) -> bool {
        self.current.read().is_some()
    }

    /// Invokes the registered callback, if any, without holding the slot lock.
    /// Returns whether a callback ran.
    pub(crate) fn notify(&self) -> bool {
        let callback = self.current.read().clone();
        match callback {
            Some(callback) => {
                callback.on_transition_to_idle();
                true
            }
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn notify_without_callback_is_dropped() {
        let slot = CallbackSlot::default();
        assert!(!slot.is_registered());
        assert!(!slot.notify());
    }

    #[test]
    fn replacing_drops_the_old_callback() {
        let first = Arc::new(AtomicUsize::new(0));
        let second = Arc::new(AtomicUsize::new(0));
        let slot = CallbackSlot::default();

        let counter = Arc::clone(&first);
        slot.replace(Arc::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        }));
        assert!(slot.notify());

        let counter = Arc::clone(&second);
        slot.replace(Arc::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        }));
        assert!(slot.notify());
        assert!(slot.notify());

        assert_eq!(first.load(Ordering::SeqCst), 1);
        assert_eq!(second.load(Ordering::SeqCst), 2);
        // The slot was the only owner of the first closure's Arc clone.
        assert_eq!(Arc::strong_count(&first), 1);
    }

    #[test]
    fn callback_may_reenter_the_slot() {
        let slot = Arc::new(CallbackSlot::default());
        let inner = Arc::clone(&slot);
        slot.replace(Arc::new(move || {
            assert!(inner.is_registered());
        }));
        assert!(slot.notify());
    }
}
