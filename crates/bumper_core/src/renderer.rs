//! Per-state renderer registration
//!
//! UI fragments contribute per-frame callbacks for a particular state key.
//! Each registration produces a [`RenderDescriptor`] that lives in a
//! [`RendererRegistry`] under its key for as long as the fragment holds the
//! returned [`RendererHandle`]:
//!
//! - [`add_renderer`] adds the descriptor immediately, before mount
//! - [`RendererHandle::mount`] flips `mounted` on
//! - [`RendererHandle::unmount`] (or dropping the handle) flips `mounted` off
//!   and removes the descriptor from the registry, exactly once
//!
//! The frame driver reads [`Registry::active`] for the current state key,
//! runs each descriptor's setup once, marks it ready, and calls
//! [`RenderDescriptor::render`] every frame.
//!
//! # Example
//!
//! ```rust
//! use bumper_core::renderer::{add_render_fn, Registry};
//! use std::rc::Rc;
//!
//! let registry = Rc::new(Registry::new());
//!
//! let handle = add_render_fn(registry.clone(), "2", |props, dt| {
//!     let _ = (props.time, dt);
//! });
//! handle.mount();
//! assert_eq!(registry.active("2").len(), 1);
//!
//! handle.unmount();
//! assert!(registry.get("2").is_empty());
//! ```

use crate::error::Result;
use crate::game_state::{GameProps, StateKey};
use rustc_hash::FxHashMap;
use smallvec::SmallVec;
use std::cell::{Cell, RefCell};
use std::fmt;
use std::future::Future;
use std::hash::Hash;
use std::pin::Pin;
use std::rc::Rc;

/// Future returned by a setup callback
pub type SetupFuture = Pin<Box<dyn Future<Output = Result<()>>>>;

/// One-shot setup callback, run before the first render
pub type SetupFn = Box<dyn FnOnce(GameProps) -> SetupFuture>;

/// Per-frame render callback: `(props, delta_time_seconds)`
pub type RenderFn = Box<dyn FnMut(&GameProps, f32)>;

/// Shared reference to a registered descriptor
///
/// Descriptors are compared by identity ([`Rc::ptr_eq`]).
pub type DescriptorRef = Rc<RenderDescriptor>;

/// The callbacks a fragment contributes for a state key
///
/// Either field may be absent; a `RendererHooks::new()` with neither yields a
/// descriptor that never does anything.
#[derive(Default)]
pub struct RendererHooks {
    setup: Option<SetupFn>,
    render: Option<RenderFn>,
}

impl RendererHooks {
    /// Hooks with neither setup nor render
    pub fn new() -> Self {
        Self::default()
    }

    /// Hooks consisting of only a per-frame render function
    pub fn render_fn<F>(render: F) -> Self
    where
        F: FnMut(&GameProps, f32) + 'static,
    {
        Self::new().with_render(render)
    }

    /// Set the per-frame render callback
    pub fn with_render<F>(mut self, render: F) -> Self
    where
        F: FnMut(&GameProps, f32) + 'static,
    {
        self.render = Some(Box::new(render));
        self
    }

    /// Set the asynchronous setup callback
    pub fn with_setup<F, Fut>(mut self, setup: F) -> Self
    where
        F: FnOnce(GameProps) -> Fut + 'static,
        Fut: Future<Output = Result<()>> + 'static,
    {
        self.setup = Some(Box::new(move |props| -> SetupFuture { Box::pin(setup(props)) }));
        self
    }
}

impl fmt::Debug for RendererHooks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RendererHooks")
            .field("setup", &self.setup.is_some())
            .field("render", &self.render.is_some())
            .finish()
    }
}

/// Lifecycle record of one registration
///
/// `mounted` is owned by the registering fragment through its
/// [`RendererHandle`]. `ready` is owned by the frame driver, which sets it
/// once setup has completed.
pub struct RenderDescriptor {
    setup: RefCell<Option<SetupFn>>,
    render: RefCell<Option<RenderFn>>,
    ready: Cell<bool>,
    mounted: Cell<bool>,
}

impl RenderDescriptor {
    /// Build an unmounted, not-ready descriptor from the given hooks
    pub fn new(hooks: RendererHooks) -> Self {
        Self {
            setup: RefCell::new(hooks.setup),
            render: RefCell::new(hooks.render),
            ready: Cell::new(false),
            mounted: Cell::new(false),
        }
    }

    pub fn is_mounted(&self) -> bool {
        self.mounted.get()
    }

    pub fn is_ready(&self) -> bool {
        self.ready.get()
    }

    /// Whether a setup callback is present and has not been started yet
    pub fn has_setup(&self) -> bool {
        self.setup.borrow().is_some()
    }

    pub fn has_render(&self) -> bool {
        self.render.borrow().is_some()
    }

    /// Start the setup callback with a snapshot of `props`
    ///
    /// The callback is handed out only once; later calls (and descriptors
    /// without setup) return `None`.
    pub fn setup(&self, props: &GameProps) -> Option<SetupFuture> {
        let setup = self.setup.borrow_mut().take()?;
        Some(setup(props.clone()))
    }

    /// Record that setup has completed
    ///
    /// Ignored once the owning fragment has unmounted, so a setup that
    /// resolves after unmount never marks the descriptor ready. Returns
    /// whether the flag was set.
    pub fn mark_ready(&self) -> bool {
        if !self.mounted.get() {
            tracing::debug!("ignoring ready for unmounted renderer");
            return false;
        }
        self.ready.set(true);
        true
    }

    /// Run the render callback, returning whether one ran
    pub fn render(&self, props: &GameProps, dt: f32) -> bool {
        let Ok(mut render) = self.render.try_borrow_mut() else {
            tracing::warn!("skipping re-entrant render call");
            return false;
        };
        match render.as_mut() {
            Some(render) => {
                render(props, dt);
                true
            }
            None => false,
        }
    }

    fn set_mounted(&self, mounted: bool) {
        self.mounted.set(mounted);
    }
}

impl fmt::Debug for RenderDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RenderDescriptor")
            .field("setup", &self.has_setup())
            .field("render", &self.has_render())
            .field("ready", &self.is_ready())
            .field("mounted", &self.is_mounted())
            .finish()
    }
}

/// Capability required of any renderer registry
pub trait RendererRegistry {
    /// Append `descriptor` to the collection for `key`
    fn add(&self, key: &StateKey, descriptor: DescriptorRef);

    /// Remove `descriptor` from the collection for `key`; absent entries are a no-op
    fn remove(&self, key: &StateKey, descriptor: &DescriptorRef);
}

/// Default registry: state key -> descriptors in registration order
///
/// `remove` takes out the first entry that is the same descriptor (by
/// identity). Duplicates are allowed, so a descriptor added twice needs two
/// removals.
#[derive(Default)]
pub struct Registry {
    entries: RefCell<FxHashMap<StateKey, SmallVec<[DescriptorRef; 4]>>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// All descriptors registered under `key`, in registration order
    pub fn get<Q>(&self, key: &Q) -> Vec<DescriptorRef>
    where
        StateKey: std::borrow::Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.entries
            .borrow()
            .get(key)
            .map(|list| list.to_vec())
            .unwrap_or_default()
    }

    /// Mounted descriptors under `key`, in registration order
    pub fn active<Q>(&self, key: &Q) -> Vec<DescriptorRef>
    where
        StateKey: std::borrow::Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.entries
            .borrow()
            .get(key)
            .map(|list| list.iter().filter(|d| d.is_mounted()).cloned().collect())
            .unwrap_or_default()
    }

    /// Number of descriptors under `key`
    pub fn count<Q>(&self, key: &Q) -> usize
    where
        StateKey: std::borrow::Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.entries.borrow().get(key).map_or(0, |list| list.len())
    }

    /// Whether `descriptor` is registered under `key`
    pub fn contains<Q>(&self, key: &Q, descriptor: &DescriptorRef) -> bool
    where
        StateKey: std::borrow::Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.entries
            .borrow()
            .get(key)
            .is_some_and(|list| list.iter().any(|d| Rc::ptr_eq(d, descriptor)))
    }

    /// Keys with at least one descriptor
    pub fn keys(&self) -> Vec<StateKey> {
        self.entries.borrow().keys().cloned().collect()
    }

    /// Total number of descriptors across all keys
    pub fn len(&self) -> usize {
        self.entries.borrow().values().map(|list| list.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.borrow().is_empty()
    }
}

impl RendererRegistry for Registry {
    fn add(&self, key: &StateKey, descriptor: DescriptorRef) {
        self.entries
            .borrow_mut()
            .entry(key.clone())
            .or_default()
            .push(descriptor);
        tracing::debug!("renderer added for state {}", key);
    }

    fn remove(&self, key: &StateKey, descriptor: &DescriptorRef) {
        // Dropped after the borrow ends; the descriptor's callbacks may own
        // handles that unregister from this registry.
        let removed = {
            let mut entries = self.entries.borrow_mut();
            let Some(list) = entries.get_mut(key) else {
                return;
            };
            let removed = list
                .iter()
                .position(|d| Rc::ptr_eq(d, descriptor))
                .map(|index| list.remove(index));
            if list.is_empty() {
                entries.remove(key);
            }
            removed
        };
        if removed.is_some() {
            tracing::debug!("renderer removed for state {}", key);
        }
    }
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map()
            .entries(
                self.entries
                    .borrow()
                    .iter()
                    .map(|(key, list)| (key.clone(), list.len())),
            )
            .finish()
    }
}

/// Register `hooks` under `key`
///
/// The descriptor is added to `registry` right away, unmounted. The returned
/// handle ties its lifetime to the caller: [`RendererHandle::mount`] when the
/// fragment mounts, [`RendererHandle::unmount`] (or drop) when it goes away.
pub fn add_renderer(
    registry: Rc<dyn RendererRegistry>,
    key: impl Into<StateKey>,
    hooks: RendererHooks,
) -> RendererHandle {
    let key = key.into();
    let descriptor = Rc::new(RenderDescriptor::new(hooks));
    registry.add(&key, Rc::clone(&descriptor));

    RendererHandle {
        key,
        descriptor,
        registry,
        released: false,
    }
}

/// Register a bare per-frame render function under `key`
pub fn add_render_fn<F>(
    registry: Rc<dyn RendererRegistry>,
    key: impl Into<StateKey>,
    render: F,
) -> RendererHandle
where
    F: FnMut(&GameProps, f32) + 'static,
{
    add_renderer(registry, key, RendererHooks::render_fn(render))
}

/// Keeps a renderer registered; releases it on [`unmount`](Self::unmount) or drop
#[must_use = "dropping a RendererHandle unregisters the renderer"]
pub struct RendererHandle {
    key: StateKey,
    descriptor: DescriptorRef,
    registry: Rc<dyn RendererRegistry>,
    released: bool,
}

impl RendererHandle {
    pub fn key(&self) -> &StateKey {
        &self.key
    }

    pub fn descriptor(&self) -> &DescriptorRef {
        &self.descriptor
    }

    /// Mark the renderer mounted
    pub fn mount(&self) {
        if !self.descriptor.is_mounted() {
            self.descriptor.set_mounted(true);
            tracing::debug!("renderer mounted for state {}", self.key);
        }
    }

    /// Mark the renderer unmounted and remove it from the registry
    pub fn unmount(mut self) {
        self.release();
    }

    fn release(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        self.descriptor.set_mounted(false);
        self.registry.remove(&self.key, &self.descriptor);
        tracing::debug!("renderer unmounted for state {}", self.key);
    }
}

impl Drop for RendererHandle {
    fn drop(&mut self) {
        self.release();
    }
}

impl fmt::Debug for RendererHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RendererHandle")
            .field("key", &self.key)
            .field("descriptor", &self.descriptor)
            .finish()
    }
}
