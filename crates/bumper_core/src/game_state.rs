//! Shared game state
//!
//! [`GameState`] holds the mutable view/simulation state as individual cells
//! (canvas size, elapsed time, scene handles, bumpers, items, ...) and a
//! single derived [`GameProps`] aggregate that is recomputed synchronously
//! after any cell write. The frame driver and registered renderers consume
//! the aggregate; UI code writes the cells.
//!
//! ```rust
//! use bumper_core::game_state::GameState;
//!
//! let game = GameState::new();
//! game.width.set(800.0);
//! game.height.set(600.0);
//!
//! let props = game.props();
//! assert_eq!((props.width, props.height), (800.0, 600.0));
//! ```

use crate::config::GameConfig;
use crate::handles::{CameraHandle, CanvasHandle, Item, MeshHandle, SceneHandle, TextureHandle};
use crate::store::{Readable, State, Store, Subscription};
use serde::Deserialize;
use std::fmt;

/// Identifier selecting which renderers are active (e.g. the current level)
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Deserialize)]
#[serde(transparent)]
pub struct StateKey(String);

impl StateKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for StateKey {
    fn from(key: &str) -> Self {
        Self::new(key)
    }
}

impl From<String> for StateKey {
    fn from(key: String) -> Self {
        Self(key)
    }
}

impl std::borrow::Borrow<str> for StateKey {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for StateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Read-only snapshot of every game cell
#[derive(Clone, Debug, Default, PartialEq)]
pub struct GameProps {
    pub width: f32,
    pub height: f32,
    /// Elapsed time in seconds
    pub time: f32,
    pub state: StateKey,
    pub canvas: Option<CanvasHandle>,
    pub prev_canvas: Option<TextureHandle>,
    pub scene: Option<SceneHandle>,
    pub camera: Option<CameraHandle>,
    pub bumpers: Vec<MeshHandle>,
    pub items: Vec<Item>,
    /// Indices into `items` that have been collected
    pub collected: Vec<usize>,
    pub orig_camera_pos_z: f32,
}

impl GameProps {
    /// Canvas aspect ratio (width / height), 1.0 for a degenerate canvas
    pub fn aspect_ratio(&self) -> f32 {
        if self.height > 0.0 {
            self.width / self.height
        } else {
            1.0
        }
    }

    pub fn is_collected(&self, index: usize) -> bool {
        self.collected.contains(&index)
    }

    /// Items that have not been collected yet, with their indices
    pub fn remaining_items(&self) -> impl Iterator<Item = (usize, &Item)> + '_ {
        self.items
            .iter()
            .enumerate()
            .filter(|(index, _)| !self.is_collected(*index))
    }
}

/// The game's reactive cells plus their [`GameProps`] aggregate
///
/// Cells are public; writing one (`game.time.set(t)`) recomputes the
/// aggregate and notifies its subscribers before returning. Cloning a
/// `GameState` yields another handle to the same cells.
#[derive(Clone)]
pub struct GameState {
    store: Store,
    pub width: State<f32>,
    pub height: State<f32>,
    pub time: State<f32>,
    pub orig_camera_pos_z: State<f32>,
    pub state: State<StateKey>,
    pub canvas: State<Option<CanvasHandle>>,
    pub prev_canvas: State<Option<TextureHandle>>,
    pub scene: State<Option<SceneHandle>>,
    pub camera: State<Option<CameraHandle>>,
    pub bumpers: State<Vec<MeshHandle>>,
    pub items: State<Vec<Item>>,
    pub collected: State<Vec<usize>>,
    props: Readable<GameProps>,
}

impl GameState {
    /// Create the game state with default initial values
    pub fn new() -> Self {
        Self::with_config(&GameConfig::default())
    }

    /// Create the game state with initial values from `config`
    pub fn with_config(config: &GameConfig) -> Self {
        let store = Store::new();

        let width = store.signal(config.width);
        let height = store.signal(config.height);
        let time = store.signal(0.0f32);
        let orig_camera_pos_z = store.signal(config.orig_camera_pos_z);
        let state = store.signal(config.initial_state.clone());
        let canvas = store.signal(None::<CanvasHandle>);
        let prev_canvas = store.signal(None::<TextureHandle>);
        let scene = store.signal(None::<SceneHandle>);
        let camera = store.signal(None::<CameraHandle>);
        let bumpers = store.signal(Vec::<MeshHandle>::new());
        let items = store.signal(Vec::<Item>::new());
        let collected = store.signal(Vec::<usize>::new());

        let dependencies = [
            width.id(),
            height.id(),
            time.id(),
            orig_camera_pos_z.id(),
            state.id(),
            canvas.id(),
            prev_canvas.id(),
            scene.id(),
            camera.id(),
            bumpers.id(),
            items.id(),
            collected.id(),
        ];

        let props = {
            let width = width.signal();
            let height = height.signal();
            let time = time.signal();
            let orig_camera_pos_z = orig_camera_pos_z.signal();
            let state = state.signal();
            let canvas = canvas.signal();
            let prev_canvas = prev_canvas.signal();
            let scene = scene.signal();
            let camera = camera.signal();
            let bumpers = bumpers.signal();
            let items = items.signal();
            let collected = collected.signal();

            store.derived(&dependencies, move |g| GameProps {
                width: g.get(width).unwrap_or_default(),
                height: g.get(height).unwrap_or_default(),
                time: g.get(time).unwrap_or_default(),
                state: g.get(state).unwrap_or_default(),
                canvas: g.get(canvas).flatten(),
                prev_canvas: g.get(prev_canvas).flatten(),
                scene: g.get(scene).flatten(),
                camera: g.get(camera).flatten(),
                bumpers: g.get(bumpers).unwrap_or_default(),
                items: g.get(items).unwrap_or_default(),
                collected: g.get(collected).unwrap_or_default(),
                orig_camera_pos_z: g.get(orig_camera_pos_z).unwrap_or_default(),
            })
        };

        tracing::debug!(
            "game state created ({}x{}, state {})",
            config.width,
            config.height,
            config.initial_state
        );

        Self {
            store,
            width,
            height,
            time,
            orig_camera_pos_z,
            state,
            canvas,
            prev_canvas,
            scene,
            camera,
            bumpers,
            items,
            collected,
            props,
        }
    }

    /// The current aggregate
    pub fn props(&self) -> GameProps {
        self.props.get()
    }

    /// The aggregate as a readable handle
    pub fn aggregate(&self) -> &Readable<GameProps> {
        &self.props
    }

    /// The currently active state key
    pub fn state_key(&self) -> StateKey {
        self.state.get()
    }

    /// Subscribe to the aggregate
    ///
    /// `callback` runs immediately with the current props and then
    /// synchronously after every cell write.
    pub fn subscribe<F>(&self, callback: F) -> Subscription
    where
        F: FnMut(&GameProps) + 'static,
    {
        self.props.subscribe(callback)
    }

    /// Apply several cell writes as a single update
    pub fn batch<R>(&self, f: impl FnOnce(&GameState) -> R) -> R {
        self.store.batch(|_| f(self))
    }

    /// The store backing the cells
    pub fn store(&self) -> &Store {
        &self.store
    }
}

impl Default for GameState {
    fn default() -> Self {
        Self::new()
    }
}
