//! Shared reactive store
//!
//! [`Store`] wraps a [`ReactiveGraph`] for single-threaded shared access and
//! takes care of notification: after a write it releases the graph, then
//! calls each subscriber of every recomputed derived value synchronously with
//! the new value. Subscribers may write to the store from inside their
//! callback. Such a write is queued and delivered by the outermost
//! notification pass, and every callback reads the value current at the
//! moment it runs, so the last value a subscriber sees is always the
//! settled one.
//!
//! ```rust
//! use bumper_core::store::Store;
//! use std::cell::RefCell;
//! use std::rc::Rc;
//!
//! let store = Store::new();
//! let width = store.signal(500.0f32);
//! let height = store.signal(500.0f32);
//!
//! let (w, h) = (width.signal(), height.signal());
//! let area = store.derived(&[width.id(), height.id()], move |g| {
//!     g.get(w).unwrap_or(0.0) * g.get(h).unwrap_or(0.0)
//! });
//!
//! let seen = Rc::new(RefCell::new(Vec::new()));
//! let seen_clone = seen.clone();
//! let _sub = area.subscribe(move |a: &f32| seen_clone.borrow_mut().push(*a));
//!
//! width.set(2.0);
//! assert_eq!(*seen.borrow(), vec![250_000.0, 1_000.0]);
//! ```

use crate::reactive::{
    Changed, Derived, DerivedId, ErasedCallback, ReactiveGraph, ReactiveStats, Signal, SignalId,
    SubscriptionId,
};
use smallvec::SmallVec;
use std::any::Any;
use std::cell::{Cell, RefCell, RefMut};
use std::collections::VecDeque;
use std::rc::{Rc, Weak};

#[derive(Default)]
struct StoreInner {
    graph: RefCell<ReactiveGraph>,
    /// Derived values whose subscribers still have to be notified
    pending: RefCell<VecDeque<DerivedId>>,
    /// Set while the outermost `notify` drains `pending`
    notifying: Cell<bool>,
    /// Subscriptions dropped while the graph was borrowed
    released: RefCell<SmallVec<[SubscriptionId; 4]>>,
}

/// Shared handle to a reactive graph (cheap to clone)
#[derive(Clone, Default)]
pub struct Store {
    inner: Rc<StoreInner>,
}

impl Store {
    /// Create a store with an empty graph
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a writable cell bound to this store
    pub fn signal<T: 'static>(&self, initial: T) -> State<T> {
        let signal = self.graph_mut().create_signal(initial);
        State {
            signal,
            store: self.clone(),
        }
    }

    /// Create a derived value bound to this store
    pub fn derived<T, F>(&self, dependencies: &[SignalId], compute: F) -> Readable<T>
    where
        T: 'static,
        F: Fn(&ReactiveGraph) -> T + 'static,
    {
        let derived = self.graph_mut().create_derived(dependencies, compute);
        Readable {
            derived,
            store: self.clone(),
        }
    }

    /// Read a signal
    pub fn get<T: Clone + 'static>(&self, signal: Signal<T>) -> Option<T> {
        self.inner.graph.borrow().get(signal)
    }

    /// Write a signal and notify the subscribers of every affected derived value
    pub fn set<T: 'static>(&self, signal: Signal<T>, value: T) {
        let changed = self.graph_mut().set(signal, value);
        self.notify(&changed);
    }

    /// Write a signal through a function of its current value
    pub fn update<T: Clone + 'static>(&self, signal: Signal<T>, f: impl FnOnce(T) -> T) {
        let changed = self.graph_mut().update(signal, f);
        self.notify(&changed);
    }

    /// Read a derived value
    pub fn get_derived<T: Clone + 'static>(&self, derived: Derived<T>) -> Option<T> {
        self.graph_mut().get_derived(derived)
    }

    /// Subscribe to a derived value
    ///
    /// The callback runs once immediately with the current value, then after
    /// every write that changes it. The returned guard unsubscribes on drop.
    pub fn subscribe<T, F>(&self, derived: Derived<T>, mut callback: F) -> Subscription
    where
        T: 'static,
        F: FnMut(&T) + 'static,
    {
        let erased: ErasedCallback = Rc::new(RefCell::new(move |value: &dyn Any| {
            if let Some(value) = value.downcast_ref::<T>() {
                callback(value);
            }
        }));

        let id = self.graph_mut().subscribe(derived.id(), erased);
        if let Some(id) = id {
            let initial = self.inner.graph.borrow().subscription(id);
            if let Some((value, callback)) = initial {
                invoke(&callback, &*value);
            }
        } else {
            tracing::debug!("subscribe on disposed derived {:?}", derived.id());
        }

        Subscription {
            id,
            store: Rc::downgrade(&self.inner),
        }
    }

    /// Run several writes as one update
    ///
    /// Derived values are recomputed and subscribers notified once, when the
    /// outermost batch ends.
    pub fn batch<R>(&self, f: impl FnOnce(&Store) -> R) -> R {
        self.graph_mut().batch_start();
        let result = f(self);
        let changed = self.graph_mut().batch_end();
        self.notify(&changed);
        result
    }

    /// Get statistics about the underlying graph
    pub fn stats(&self) -> ReactiveStats {
        self.graph_mut().stats()
    }

    /// Borrow the graph mutably, first unsubscribing guards that were
    /// dropped while it was busy
    fn graph_mut(&self) -> RefMut<'_, ReactiveGraph> {
        let mut graph = self.inner.graph.borrow_mut();
        let released = std::mem::take(&mut *self.inner.released.borrow_mut());
        for id in released {
            graph.unsubscribe(id);
        }
        graph
    }

    fn notify(&self, changed: &Changed) {
        {
            let mut pending = self.inner.pending.borrow_mut();
            for &id in changed {
                if !pending.contains(&id) {
                    pending.push_back(id);
                }
            }
        }

        // A pass further up the stack delivers what was just queued
        if self.inner.notifying.replace(true) {
            return;
        }
        let _draining = Draining(&self.inner.notifying);

        loop {
            let next = self.inner.pending.borrow_mut().pop_front();
            let Some(id) = next else {
                break;
            };
            let subscribers = self.graph_mut().subscribers(id);
            tracing::trace!(
                "notifying {} subscriber(s) of {:?}",
                subscribers.len(),
                id
            );
            for sub in subscribers {
                // Re-read per callback: an earlier subscriber may have
                // written, or dropped this subscription
                let current = self.graph_mut().subscription(sub);
                if let Some((value, callback)) = current {
                    invoke(&callback, &*value);
                }
            }
        }
    }
}

/// Clears the notifying flag when the draining pass ends, even by unwinding
struct Draining<'a>(&'a Cell<bool>);

impl Drop for Draining<'_> {
    fn drop(&mut self) {
        self.0.set(false);
    }
}

fn invoke(callback: &ErasedCallback, value: &dyn Any) {
    match callback.try_borrow_mut() {
        Ok(mut f) => (&mut *f)(value),
        Err(_) => tracing::warn!("skipping re-entrant subscriber notification"),
    }
}

/// Guard for a subscription created by [`Store::subscribe`]
///
/// Dropping the guard unsubscribes. If the store is busy at that moment the
/// unsubscribe is deferred to its next access; the callback is not invoked
/// again either way.
#[must_use = "dropping a Subscription unsubscribes immediately"]
#[derive(Debug)]
pub struct Subscription {
    id: Option<SubscriptionId>,
    store: Weak<StoreInner>,
}

impl Subscription {
    /// The subscription ID, or `None` if the derived value was already disposed
    pub fn id(&self) -> Option<SubscriptionId> {
        self.id
    }

    /// Unsubscribe now
    pub fn unsubscribe(mut self) {
        self.release();
    }

    /// Keep the callback subscribed for the lifetime of the store
    pub fn detach(mut self) {
        self.id = None;
    }

    fn release(&mut self) {
        let Some(id) = self.id.take() else {
            return;
        };
        let Some(inner) = self.store.upgrade() else {
            return;
        };
        let unsubscribed = match inner.graph.try_borrow_mut() {
            Ok(mut graph) => {
                graph.unsubscribe(id);
                true
            }
            Err(_) => false,
        };
        if !unsubscribed {
            tracing::debug!("store busy, deferring unsubscribe of {:?}", id);
            inner.released.borrow_mut().push(id);
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.release();
    }
}

/// A writable cell bound to its store
///
/// ```ignore
/// let width: State<f32> = store.signal(500.0);
/// width.set(width.get() * 2.0);
/// ```
pub struct State<T> {
    signal: Signal<T>,
    store: Store,
}

impl<T> Clone for State<T> {
    fn clone(&self) -> Self {
        Self {
            signal: self.signal,
            store: self.store.clone(),
        }
    }
}

impl<T: Clone + 'static> State<T> {
    /// Get the current value
    pub fn get(&self) -> T
    where
        T: Default,
    {
        self.store.get(self.signal).unwrap_or_default()
    }

    /// Get the current value, returning None if not found
    pub fn try_get(&self) -> Option<T> {
        self.store.get(self.signal)
    }

    /// Replace the value, notifying subscribers of dependent derived values
    pub fn set(&self, value: T) {
        self.store.set(self.signal, value);
    }

    /// Update the value using a function
    pub fn update(&self, f: impl FnOnce(T) -> T) {
        self.store.update(self.signal, f);
    }
}

impl<T> State<T> {
    /// Get the underlying signal
    pub fn signal(&self) -> Signal<T> {
        self.signal
    }

    /// Get the signal ID (for declaring derived dependencies)
    pub fn id(&self) -> SignalId {
        self.signal.id()
    }
}

/// A read-only derived value bound to its store
pub struct Readable<T> {
    derived: Derived<T>,
    store: Store,
}

impl<T> Clone for Readable<T> {
    fn clone(&self) -> Self {
        Self {
            derived: self.derived,
            store: self.store.clone(),
        }
    }
}

impl<T: 'static> Readable<T> {
    /// Get the current value
    pub fn get(&self) -> T
    where
        T: Clone + Default,
    {
        self.store.get_derived(self.derived).unwrap_or_default()
    }

    /// Get the current value, returning None if the value was disposed
    pub fn try_get(&self) -> Option<T>
    where
        T: Clone,
    {
        self.store.get_derived(self.derived)
    }

    /// Subscribe to changes, see [`Store::subscribe`]
    pub fn subscribe<F>(&self, callback: F) -> Subscription
    where
        F: FnMut(&T) + 'static,
    {
        self.store.subscribe(self.derived, callback)
    }

    /// Get the underlying derived handle
    pub fn derived(&self) -> Derived<T> {
        self.derived
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    fn sum_of(store: &Store, a: &State<i32>, b: &State<i32>) -> Readable<i32> {
        let (sa, sb) = (a.signal(), b.signal());
        store.derived(&[a.id(), b.id()], move |g| {
            g.get(sa).unwrap_or(0) + g.get(sb).unwrap_or(0)
        })
    }

    #[test]
    fn test_state_get_set() {
        let store = Store::new();
        let count = store.signal(1i32);

        assert_eq!(count.get(), 1);
        count.set(5);
        assert_eq!(count.get(), 5);
        count.update(|c| c * 2);
        assert_eq!(count.try_get(), Some(10));
    }

    #[test]
    fn test_subscriber_called_immediately_and_on_change() {
        let store = Store::new();
        let a = store.signal(1i32);
        let b = store.signal(2i32);
        let sum = sum_of(&store, &a, &b);

        let seen = Rc::new(RefCell::new(Vec::new()));
        let seen_clone = seen.clone();
        let _sub = sum.subscribe(move |v: &i32| seen_clone.borrow_mut().push(*v));

        a.set(10);
        b.set(20);
        assert_eq!(*seen.borrow(), vec![3, 12, 30]);
    }

    #[test]
    fn test_dropping_subscription_unsubscribes() {
        let store = Store::new();
        let a = store.signal(1i32);
        let b = store.signal(2i32);
        let sum = sum_of(&store, &a, &b);

        let calls = Rc::new(Cell::new(0));
        let calls_clone = calls.clone();
        let sub = sum.subscribe(move |_: &i32| calls_clone.set(calls_clone.get() + 1));
        assert_eq!(calls.get(), 1);

        drop(sub);
        a.set(5);
        assert_eq!(calls.get(), 1);
        assert_eq!(store.stats().subscription_count, 0);
    }

    #[test]
    fn test_detached_subscription_stays() {
        let store = Store::new();
        let a = store.signal(1i32);
        let b = store.signal(2i32);
        let sum = sum_of(&store, &a, &b);

        let calls = Rc::new(Cell::new(0));
        let calls_clone = calls.clone();
        sum.subscribe(move |_: &i32| calls_clone.set(calls_clone.get() + 1))
            .detach();

        a.set(5);
        assert_eq!(calls.get(), 2);
    }

    #[test]
    fn test_batch_notifies_once() {
        let store = Store::new();
        let a = store.signal(1i32);
        let b = store.signal(2i32);
        let sum = sum_of(&store, &a, &b);

        let seen = Rc::new(RefCell::new(Vec::new()));
        let seen_clone = seen.clone();
        let _sub = sum.subscribe(move |v: &i32| seen_clone.borrow_mut().push(*v));

        let returned = store.batch(|_| {
            a.set(100);
            b.set(200);
            // Reads inside the batch are never stale
            sum.get()
        });

        assert_eq!(returned, 300);
        assert_eq!(*seen.borrow(), vec![3, 300]);
    }

    #[test]
    fn test_reentrant_write_from_subscriber() {
        let store = Store::new();
        let a = store.signal(1i32);
        let b = store.signal(0i32);
        let sum = sum_of(&store, &a, &b);

        // Keep b mirroring a; the write happens from inside the notification
        let b_clone = b.clone();
        let a_signal = a.signal();
        let inner_store = store.clone();
        let _sub = sum.subscribe(move |_: &i32| {
            let a_now = inner_store.get(a_signal).unwrap_or(0);
            if b_clone.get() != a_now {
                b_clone.set(a_now);
            }
        });

        a.set(7);
        assert_eq!(b.get(), 7);
        assert_eq!(sum.get(), 14);
    }

    #[test]
    fn test_reentrant_write_reaches_later_subscribers() {
        let store = Store::new();
        let a = store.signal(1i32);
        let b = store.signal(0i32);
        let sum = sum_of(&store, &a, &b);

        // First subscriber keeps b mirroring a from inside its callback
        let b_clone = b.clone();
        let a_signal = a.signal();
        let inner_store = store.clone();
        let _mirror = sum.subscribe(move |_: &i32| {
            let a_now = inner_store.get(a_signal).unwrap_or(0);
            if b_clone.get() != a_now {
                b_clone.set(a_now);
            }
        });

        let seen = Rc::new(RefCell::new(Vec::new()));
        let seen_clone = seen.clone();
        let _observer = sum.subscribe(move |v: &i32| seen_clone.borrow_mut().push(*v));

        a.set(7);
        assert_eq!(sum.get(), 14);
        // The intermediate 8 (a = 7, b = 1) is never delivered after 14
        assert_eq!(seen.borrow().last(), Some(&14));
        assert!(!seen.borrow().contains(&8));
    }

    #[test]
    fn test_subscriber_dropped_by_earlier_subscriber() {
        let store = Store::new();
        let a = store.signal(1i32);
        let b = store.signal(2i32);
        let sum = sum_of(&store, &a, &b);

        let victim: Rc<RefCell<Option<Subscription>>> = Rc::new(RefCell::new(None));
        let victim_clone = victim.clone();
        let _killer = sum.subscribe(move |v: &i32| {
            if *v > 10 {
                victim_clone.borrow_mut().take();
            }
        });

        let calls = Rc::new(Cell::new(0));
        let calls_clone = calls.clone();
        *victim.borrow_mut() =
            Some(sum.subscribe(move |_: &i32| calls_clone.set(calls_clone.get() + 1)));
        assert_eq!(calls.get(), 1);

        a.set(20);
        assert_eq!(calls.get(), 1);
        assert_eq!(store.stats().subscription_count, 1);
    }

    #[test]
    fn test_drop_while_store_busy_is_deferred() {
        let store = Store::new();
        let a = store.signal(1i32);
        let b = store.signal(2i32);
        let sum = sum_of(&store, &a, &b);

        let calls = Rc::new(Cell::new(0));
        let calls_clone = calls.clone();
        let sub = sum.subscribe(move |_: &i32| calls_clone.set(calls_clone.get() + 1));
        assert_eq!(calls.get(), 1);

        {
            let _busy = store.inner.graph.borrow();
            drop(sub);
        }

        a.set(5);
        assert_eq!(calls.get(), 1);
        assert_eq!(store.stats().subscription_count, 0);
    }

    #[test]
    fn test_subscription_outlives_store() {
        let store = Store::new();
        let a = store.signal(1i32);
        let b = store.signal(2i32);
        let sum = sum_of(&store, &a, &b);
        let sub = sum.subscribe(|_: &i32| {});

        drop(sum);
        drop(a);
        drop(b);
        drop(store);
        // Graph is gone; dropping the guard must be a no-op
        drop(sub);
    }
}
