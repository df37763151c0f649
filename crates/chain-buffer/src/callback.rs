//! Change-notification registry for [`crate::ChainBuffer`].
//!
//! Modeled as an arena of slots (`Vec<Option<Entry>>`) rather than a linked
//! list: a callback is identified by its slot index, dispatch snapshots the
//! occupied slots before invoking anything, and a callback that wants to
//! remove itself (or another registered callback) does so by recording the
//! request in a [`PendingRemovals`] collector passed in as an argument
//! rather than by reaching back into the registry. That sidesteps the
//! aliasing problem a linked list with "remove while iterating" runs into
//! under the borrow checker, while keeping the same observable guarantee:
//! removals requested during dispatch never corrupt the in-flight
//! iteration, and take effect before the next change notification fires.

/// Opaque handle to a registered change-notification callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CallbackId(usize);

/// Collects removal requests made from inside a firing callback.
///
/// A callback may ask to remove itself or any other still-registered
/// callback; the requests are applied once the whole notification round
/// completes.
#[derive(Default)]
pub struct PendingRemovals(Vec<usize>);

impl PendingRemovals {
    pub fn remove(&mut self, id: CallbackId) {
        self.0.push(id.0);
    }
}

type ChangeCallback = Box<dyn FnMut(usize, usize, &mut PendingRemovals)>;

struct Entry {
    callback: ChangeCallback,
    enabled: bool,
}

/// Registry of change-notification callbacks attached to a single
/// [`crate::ChainBuffer`]. Every mutation that changes `total_len` calls
/// [`CallbackRegistry::fire`] exactly once, after the buffer's invariants
/// have been restored.
#[derive(Default)]
pub struct CallbackRegistry {
    entries: Vec<Option<Entry>>,
}

impl CallbackRegistry {
    pub fn add<F>(&mut self, callback: F) -> CallbackId
    where
        F: FnMut(usize, usize, &mut PendingRemovals) + 'static,
    {
        let entry = Entry { callback: Box::new(callback), enabled: true };
        if let Some(slot) = self.entries.iter_mut().position(Option::is_none) {
            self.entries[slot] = Some(entry);
            CallbackId(slot)
        } else {
            self.entries.push(Some(entry));
            CallbackId(self.entries.len() - 1)
        }
    }

    pub fn remove(&mut self, id: CallbackId) {
        if let Some(slot) = self.entries.get_mut(id.0) {
            *slot = None;
        }
    }

    pub fn set_enabled(&mut self, id: CallbackId, enabled: bool) {
        if let Some(Some(entry)) = self.entries.get_mut(id.0) {
            entry.enabled = enabled;
        }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.iter().all(Option::is_none)
    }

    /// Invoke every enabled callback with `(old_size, new_size)`, in
    /// registration order, then apply any removals the callbacks requested.
    ///
    /// No-op when `old_size == new_size`, per the "fires only when the size
    /// actually changed" rule.
    pub fn fire(&mut self, old_size: usize, new_size: usize) {
        if old_size == new_size {
            return;
        }
        let snapshot: Vec<usize> =
            self.entries.iter().enumerate().filter_map(|(i, e)| e.is_some().then_some(i)).collect();

        let mut pending = PendingRemovals::default();
        for idx in snapshot {
            let fire = matches!(self.entries.get(idx), Some(Some(e)) if e.enabled);
            if !fire {
                continue;
            }
            let Some(Some(entry)) = self.entries.get_mut(idx) else { continue };
            (entry.callback)(old_size, new_size, &mut pending);
        }

        for idx in pending.0 {
            if let Some(slot) = self.entries.get_mut(idx) {
                *slot = None;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fires_only_on_size_change() {
        let mut reg = CallbackRegistry::default();
        let calls = std::rc::Rc::new(std::cell::RefCell::new(Vec::new()));
        let calls2 = calls.clone();
        reg.add(move |old, new, _| calls2.borrow_mut().push((old, new)));
        reg.fire(0, 0);
        assert!(calls.borrow().is_empty());
        reg.fire(0, 5);
        assert_eq!(*calls.borrow(), vec![(0, 5)]);
    }

    #[test]
    fn callback_can_remove_itself() {
        let mut reg = CallbackRegistry::default();
        let count = std::rc::Rc::new(std::cell::Cell::new(0));
        let count2 = count.clone();
        let self_id: std::rc::Rc<std::cell::Cell<Option<CallbackId>>> =
            std::rc::Rc::new(std::cell::Cell::new(None));
        let self_id2 = self_id.clone();
        let id = reg.add(move |_old, _new, pending| {
            count2.set(count2.get() + 1);
            if let Some(id) = self_id2.get() {
                pending.remove(id);
            }
        });
        self_id.set(Some(id));

        reg.fire(0, 1);
        reg.fire(1, 2);
        assert_eq!(count.get(), 1, "callback removed itself after first firing");
    }

    #[test]
    fn callback_can_remove_another_callback() {
        let mut reg = CallbackRegistry::default();
        let other_fired = std::rc::Rc::new(std::cell::Cell::new(0));
        let other_fired2 = other_fired.clone();
        let other_id = reg.add(move |_, _, _| other_fired2.set(other_fired2.get() + 1));
        reg.add(move |_, _, pending| pending.remove(other_id));

        reg.fire(0, 1);
        assert_eq!(other_fired.get(), 1);
        reg.fire(1, 2);
        assert_eq!(other_fired.get(), 1, "removed callback must not fire again");
    }

    #[test]
    fn disabled_callback_does_not_fire() {
        let mut reg = CallbackRegistry::default();
        let fired = std::rc::Rc::new(std::cell::Cell::new(false));
        let fired2 = fired.clone();
        let id = reg.add(move |_, _, _| fired2.set(true));
        reg.set_enabled(id, false);
        reg.fire(0, 1);
        assert!(!fired.get());
    }

    #[test]
    fn reused_slot_gets_a_fresh_id() {
        let mut reg = CallbackRegistry::default();
        let id_a = reg.add(|_, _, _| {});
        reg.remove(id_a);
        let id_b = reg.add(|_, _, _| {});
        assert_eq!(id_a, id_b, "freed slots are reused by index");
    }
}
