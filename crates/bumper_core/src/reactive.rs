//! Reactive signal graph
//!
//! The graph owns three kinds of nodes:
//! - **Signals** hold independently settable values
//! - **Derived** values combine signals through an explicit dependency list
//!   and are recomputed eagerly after every write to one of their sources
//! - **Subscriptions** observe a derived value
//!
//! The graph never calls subscriber callbacks itself. [`ReactiveGraph::set`]
//! returns the derived values that changed and the caller (normally
//! [`Store`](crate::store::Store)) delivers notifications once it no longer
//! holds a borrow of the graph. This keeps re-entrant writes from inside a
//! subscriber sound on a single thread.
//!
//! ```rust
//! use bumper_core::reactive::ReactiveGraph;
//!
//! let mut graph = ReactiveGraph::new();
//! let width = graph.create_signal(500.0f32);
//! let height = graph.create_signal(250.0f32);
//!
//! let area = graph.create_derived(&[width.id(), height.id()], move |g| {
//!     g.get(width).unwrap_or(0.0) * g.get(height).unwrap_or(0.0)
//! });
//!
//! graph.set(width, 2.0);
//! assert_eq!(graph.get_derived(area), Some(500.0));
//! ```

use slotmap::{new_key_type, SlotMap};
use smallvec::SmallVec;
use std::any::Any;
use std::cell::RefCell;
use std::marker::PhantomData;
use std::rc::Rc;

new_key_type! {
    /// Unique identifier for a signal
    pub struct SignalId;
    /// Unique identifier for a derived value
    pub struct DerivedId;
    /// Unique identifier for a subscription to a derived value
    pub struct SubscriptionId;
}

/// Derived values whose cached value changed as the result of a write
pub type Changed = SmallVec<[DerivedId; 4]>;

/// Type-erased subscriber callback
pub(crate) type ErasedCallback = Rc<RefCell<dyn FnMut(&dyn Any)>>;

type ComputeFn = Rc<dyn Fn(&ReactiveGraph) -> Rc<dyn Any>>;

/// A reactive signal handle (cheap to copy)
#[derive(Debug)]
pub struct Signal<T> {
    id: SignalId,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Clone for Signal<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Signal<T> {}

impl<T> Signal<T> {
    /// Get the signal's internal ID
    pub fn id(&self) -> SignalId {
        self.id
    }
}

/// A derived value handle
#[derive(Debug)]
pub struct Derived<T> {
    id: DerivedId,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Clone for Derived<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Derived<T> {}

impl<T> Derived<T> {
    pub fn id(&self) -> DerivedId {
        self.id
    }
}

struct SignalNode {
    value: Box<dyn Any>,
    /// Bumped on every write
    version: u64,
    /// Derived values that list this signal as a dependency
    dependents: SmallVec<[DerivedId; 4]>,
}

struct DerivedNode {
    /// Shared so notifications can outlive a borrow of the graph
    value: Rc<dyn Any>,
    compute: ComputeFn,
    dependencies: SmallVec<[SignalId; 4]>,
    subscribers: SmallVec<[SubscriptionId; 4]>,
    /// Set when a dependency was written inside a batch
    dirty: bool,
    version: u64,
}

struct SubscriptionNode {
    target: DerivedId,
    callback: ErasedCallback,
}

/// The reactive graph that manages signals, derived values and subscriptions
pub struct ReactiveGraph {
    signals: SlotMap<SignalId, SignalNode>,
    derived: SlotMap<DerivedId, DerivedNode>,
    subscriptions: SlotMap<SubscriptionId, SubscriptionNode>,
    /// Dirty derived values waiting for the outermost batch to end
    pending: SmallVec<[DerivedId; 4]>,
    /// Current batch depth (> 0 means we're in a batch)
    batch_depth: u32,
    global_version: u64,
}

impl ReactiveGraph {
    /// Create an empty reactive graph
    pub fn new() -> Self {
        Self {
            signals: SlotMap::with_key(),
            derived: SlotMap::with_key(),
            subscriptions: SlotMap::with_key(),
            pending: SmallVec::new(),
            batch_depth: 0,
            global_version: 0,
        }
    }

    // =========================================================================
    // SIGNALS
    // =========================================================================

    /// Create a new signal with an initial value
    pub fn create_signal<T: 'static>(&mut self, initial: T) -> Signal<T> {
        let id = self.signals.insert(SignalNode {
            value: Box::new(initial),
            version: 0,
            dependents: SmallVec::new(),
        });
        Signal {
            id,
            _marker: PhantomData,
        }
    }

    /// Get a clone of the current value of a signal
    pub fn get<T: Clone + 'static>(&self, signal: Signal<T>) -> Option<T> {
        self.with(signal, T::clone)
    }

    /// Borrow the current value of a signal
    pub fn with<T: 'static, R>(&self, signal: Signal<T>, f: impl FnOnce(&T) -> R) -> Option<R> {
        self.signals
            .get(signal.id)
            .and_then(|node| node.value.downcast_ref::<T>())
            .map(f)
    }

    /// Replace the value of a signal
    ///
    /// Outside a batch every dependent derived value is recomputed before this
    /// returns, and the recomputed ones are reported back so the caller can
    /// notify their subscribers. Inside a batch the dependents are only
    /// marked dirty and the returned list is empty.
    pub fn set<T: 'static>(&mut self, signal: Signal<T>, value: T) -> Changed {
        let Some(node) = self.signals.get_mut(signal.id) else {
            tracing::trace!("set on disposed signal {:?}", signal.id);
            return Changed::new();
        };

        node.value = Box::new(value);
        node.version += 1;
        self.global_version += 1;

        let dependents = node.dependents.clone();
        for id in dependents {
            self.mark_dirty(id);
        }

        if self.batch_depth == 0 {
            self.flush()
        } else {
            Changed::new()
        }
    }

    /// Update a signal using a function of its current value
    pub fn update<T: Clone + 'static>(
        &mut self,
        signal: Signal<T>,
        f: impl FnOnce(T) -> T,
    ) -> Changed {
        match self.get(signal) {
            Some(current) => self.set(signal, f(current)),
            None => Changed::new(),
        }
    }

    /// Get the version of a signal (for change detection)
    pub fn signal_version(&self, id: SignalId) -> Option<u64> {
        self.signals.get(id).map(|n| n.version)
    }

    // =========================================================================
    // DERIVED VALUES
    // =========================================================================

    /// Create a derived value over an explicit list of signal dependencies
    ///
    /// The value is computed once immediately, then again after every write
    /// to any of `dependencies`. Reads performed by `compute` on signals not
    /// listed in `dependencies` are not tracked.
    pub fn create_derived<T, F>(&mut self, dependencies: &[SignalId], compute: F) -> Derived<T>
    where
        T: 'static,
        F: Fn(&ReactiveGraph) -> T + 'static,
    {
        let compute: ComputeFn = Rc::new(move |graph: &ReactiveGraph| -> Rc<dyn Any> {
            Rc::new(compute(graph))
        });
        let value = compute(self);

        let mut deps: SmallVec<[SignalId; 4]> = SmallVec::new();
        for &dep in dependencies {
            if !deps.contains(&dep) && self.signals.contains_key(dep) {
                deps.push(dep);
            }
        }

        let id = self.derived.insert(DerivedNode {
            value,
            compute,
            dependencies: deps.clone(),
            subscribers: SmallVec::new(),
            dirty: false,
            version: 0,
        });

        for dep in deps {
            if let Some(sig) = self.signals.get_mut(dep) {
                sig.dependents.push(id);
            }
        }

        Derived {
            id,
            _marker: PhantomData,
        }
    }

    /// Get the current value of a derived
    ///
    /// A value left dirty by an open batch is recomputed first, so reads are
    /// never stale.
    pub fn get_derived<T: Clone + 'static>(&mut self, derived: Derived<T>) -> Option<T> {
        if self.derived.get(derived.id)?.dirty {
            self.recompute(derived.id);
        }
        self.derived
            .get(derived.id)
            .and_then(|node| node.value.downcast_ref::<T>().cloned())
    }

    /// Get the version of a derived value (bumped on every recomputation)
    pub fn derived_version(&self, id: DerivedId) -> Option<u64> {
        self.derived.get(id).map(|n| n.version)
    }

    /// Remove a derived value together with its subscriptions
    pub fn dispose_derived<T>(&mut self, derived: Derived<T>) {
        let Some(node) = self.derived.remove(derived.id) else {
            return;
        };
        for dep in &node.dependencies {
            if let Some(sig) = self.signals.get_mut(*dep) {
                sig.dependents.retain(|d| *d != derived.id);
            }
        }
        for sub in &node.subscribers {
            self.subscriptions.remove(*sub);
        }
        self.pending.retain(|d| *d != derived.id);
    }

    // =========================================================================
    // SUBSCRIPTIONS
    // =========================================================================

    /// Attach a type-erased callback to a derived value
    ///
    /// Returns `None` if the derived value has been disposed.
    pub(crate) fn subscribe(
        &mut self,
        derived: DerivedId,
        callback: ErasedCallback,
    ) -> Option<SubscriptionId> {
        if !self.derived.contains_key(derived) {
            return None;
        }
        let id = self.subscriptions.insert(SubscriptionNode {
            target: derived,
            callback,
        });
        if let Some(node) = self.derived.get_mut(derived) {
            node.subscribers.push(id);
        }
        Some(id)
    }

    /// Detach a subscription. Returns false if it was already gone.
    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let Some(sub) = self.subscriptions.remove(id) else {
            return false;
        };
        if let Some(node) = self.derived.get_mut(sub.target) {
            node.subscribers.retain(|s| *s != id);
        }
        true
    }

    /// Subscriptions observing a derived value, in subscription order
    pub(crate) fn subscribers(&self, derived: DerivedId) -> SmallVec<[SubscriptionId; 4]> {
        self.derived
            .get(derived)
            .map(|node| node.subscribers.clone())
            .unwrap_or_default()
    }

    /// The current value a subscription observes, and its callback
    pub(crate) fn subscription(
        &self,
        id: SubscriptionId,
    ) -> Option<(Rc<dyn Any>, ErasedCallback)> {
        let sub = self.subscriptions.get(id)?;
        let node = self.derived.get(sub.target)?;
        Some((Rc::clone(&node.value), Rc::clone(&sub.callback)))
    }

    // =========================================================================
    // BATCHING
    // =========================================================================

    /// Start a batch - recomputation is deferred until the batch ends
    pub fn batch_start(&mut self) {
        self.batch_depth += 1;
    }

    /// End a batch, recomputing dirty derived values when the outermost
    /// batch closes
    pub fn batch_end(&mut self) -> Changed {
        match self.batch_depth {
            0 => Changed::new(),
            1 => {
                self.batch_depth = 0;
                self.flush()
            }
            depth => {
                self.batch_depth = depth - 1;
                Changed::new()
            }
        }
    }

    /// Whether a batch is currently open
    pub fn in_batch(&self) -> bool {
        self.batch_depth > 0
    }

    // =========================================================================
    // INTERNAL
    // =========================================================================

    fn mark_dirty(&mut self, id: DerivedId) {
        if let Some(node) = self.derived.get_mut(id) {
            if !node.dirty {
                node.dirty = true;
                self.pending.push(id);
            }
        }
    }

    /// Recompute every pending derived value, in the order it became dirty
    fn flush(&mut self) -> Changed {
        let pending = std::mem::take(&mut self.pending);
        let mut changed = Changed::new();
        for id in pending {
            let Some(dirty) = self.derived.get(id).map(|n| n.dirty) else {
                continue;
            };
            // A read inside the batch may already have refreshed it
            if dirty {
                self.recompute(id);
            }
            changed.push(id);
        }
        changed
    }

    fn recompute(&mut self, id: DerivedId) {
        let Some(compute) = self.derived.get(id).map(|n| Rc::clone(&n.compute)) else {
            return;
        };
        let value = compute(self);
        if let Some(node) = self.derived.get_mut(id) {
            node.value = value;
            node.dirty = false;
            node.version += 1;
        }
    }

    /// Get statistics about the reactive graph
    pub fn stats(&self) -> ReactiveStats {
        ReactiveStats {
            signal_count: self.signals.len(),
            derived_count: self.derived.len(),
            subscription_count: self.subscriptions.len(),
            global_version: self.global_version,
        }
    }
}

impl Default for ReactiveGraph {
    fn default() -> Self {
        Self::new()
    }
}

/// Statistics about the reactive graph
#[derive(Debug, Clone)]
pub struct ReactiveStats {
    pub signal_count: usize,
    pub derived_count: usize,
    pub subscription_count: usize,
    pub global_version: u64,
}
