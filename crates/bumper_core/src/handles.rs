//! Opaque handles to objects owned by the rendering environment
//!
//! The bridge never looks inside these; it stores them in cells and
//! republishes them through [`GameProps`](crate::game_state::GameProps).

/// Handle to the output canvas
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct CanvasHandle(pub u64);

/// Handle to a texture (e.g. the previous frame captured from the canvas)
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct TextureHandle(pub u64);

/// Handle to a 3D scene graph
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SceneHandle(pub u64);

/// Handle to a perspective camera
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct CameraHandle(pub u64);

/// Handle to a mesh
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct MeshHandle(pub u64);

/// Handle to a group of objects loaded as one model
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct GroupHandle(pub u64);

/// A collectible placed in the scene
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Item {
    /// The loaded model
    pub model: GroupHandle,
    /// Game-defined item type
    pub kind: u32,
}

impl Item {
    pub fn new(model: GroupHandle, kind: u32) -> Self {
        Self { model, kind }
    }
}
