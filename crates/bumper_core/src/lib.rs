//! Bumper Core
//!
//! This crate bridges a declarative UI layer and an imperative 3D render loop:
//!
//! - **Reactive Store**: independently settable cells plus derived values
//!   recomputed synchronously on every write, with push subscriptions
//! - **Game State**: the game's cells (canvas size, time, scene handles,
//!   bumpers, items, ...) and their [`GameProps`] aggregate
//! - **Renderer Registry**: per-state-key registration of setup/render
//!   callbacks whose lifetime follows the registering UI fragment
//!
//! # Example
//!
//! ```rust
//! use bumper_core::{add_renderer, GameState, Registry, RendererHooks};
//! use std::rc::Rc;
//!
//! let game = GameState::new();
//! let registry = Rc::new(Registry::new());
//!
//! let handle = add_renderer(
//!     registry.clone(),
//!     "1",
//!     RendererHooks::new().with_render(|props, dt| {
//!         let _spin = props.time * dt;
//!     }),
//! );
//! handle.mount();
//!
//! // One frame, as the driver would run it
//! game.time.set(0.016);
//! let props = game.props();
//! for renderer in registry.active(props.state.as_str()) {
//!     renderer.render(&props, 0.016);
//! }
//!
//! handle.unmount();
//! assert!(registry.is_empty());
//! ```

pub mod config;
pub mod error;
pub mod game_state;
pub mod handles;
pub mod logging;
pub mod reactive;
pub mod renderer;
pub mod store;

pub use config::GameConfig;
pub use error::{BridgeError, Result};
pub use game_state::{GameProps, GameState, StateKey};
pub use handles::{
    CameraHandle, CanvasHandle, GroupHandle, Item, MeshHandle, SceneHandle, TextureHandle,
};
pub use logging::{init_logging, LoggingConfig};
pub use reactive::{
    Changed, Derived, DerivedId, ReactiveGraph, ReactiveStats, Signal, SignalId, SubscriptionId,
};
pub use renderer::{
    add_render_fn, add_renderer, DescriptorRef, RenderDescriptor, RenderFn, RendererHandle,
    RendererHooks, RendererRegistry, Registry, SetupFn, SetupFuture,
};
pub use store::{Readable, State, Store, Subscription};
