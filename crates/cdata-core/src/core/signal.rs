use slotmap::{SlotMap, new_key_type};
use std::fmt;

new_key_type! {
    pub struct SubscriptionId;
}

pub type Slot<T> = Box<dyn Fn(&T) + Send + Sync>;

/// A typed publish/subscribe channel.
///
/// Subscribers are plain callbacks; emitting never fails and never requires a
/// subscriber to be present.
pub struct Signal<T> {
    slots: SlotMap<SubscriptionId, Slot<T>>,
}

impl<T> Default for Signal<T> {
    fn default() -> Self {
        Self {
            slots: SlotMap::with_key(),
        }
    }
}

impl<T> fmt::Debug for Signal<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Signal")
            .field("subscribers", &self.slots.len())
            .finish()
    }
}

impl<T> Signal<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn connect<F>(&mut self, slot: F) -> SubscriptionId
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        self.slots.insert(Box::new(slot))
    }

    /// Returns `false` if the subscription was already gone.
    pub fn disconnect(&mut self, id: SubscriptionId) -> bool {
        self.slots.remove(id).is_some()
    }

    #[inline]
    pub fn emit(&self, event: &T) {
        for slot in self.slots.values() {
            slot(event);
        }
    }

    pub fn clear(&mut self) {
        self.slots.clear();
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}
