//! Backend abstraction for the rendering system
//!
//! This module defines the trait that graphics backends must implement to
//! drive the deferred pipeline. The high-level renderer never talks to a
//! graphics API directly; it issues state-setting and draw calls through
//! [`GraphicsDevice`] and refers to GPU resources by opaque handles.

mod device;
mod state;

pub use device::{
    FramebufferId, FramebufferStatus, GraphicsDevice, MeshId, ProgramId, TextureId,
    UniformLocation, UniformValue,
};
pub use state::{
    BlendMode, ClearMask, CompareFunc, CullMode, DepthState, StencilFace, StencilOp,
    StencilState, TextureFormat,
};
