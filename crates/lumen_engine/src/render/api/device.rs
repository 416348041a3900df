//! The [`GraphicsDevice`] trait and its handle types

use slotmap::new_key_type;
use std::any::Any;

use super::state::{
    BlendMode, ClearMask, CullMode, DepthState, StencilState, TextureFormat,
};
use crate::core::config::ShaderConfig;
use crate::foundation::math::{Mat4, Vec2, Vec3, Vec4};
use crate::render::mesh::Vertex;
use crate::render::RenderResult;

new_key_type! {
    /// Handle to a texture resource stored in the backend
    pub struct TextureId;

    /// Handle to a framebuffer object stored in the backend
    pub struct FramebufferId;

    /// Handle to a compiled shader program stored in the backend
    pub struct ProgramId;

    /// Handle to an uploaded mesh stored in the backend
    pub struct MeshId;
}

/// Location of a named uniform within a compiled program
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct UniformLocation(pub u32);

/// A value assignable to a uniform slot
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum UniformValue {
    /// Scalar float
    Float(f32),
    /// Scalar integer
    Int(i32),
    /// Two-component vector
    Vec2(Vec2),
    /// Three-component vector
    Vec3(Vec3),
    /// Four-component vector
    Vec4(Vec4),
    /// 4x4 matrix
    Mat4(Mat4),
    /// Texture unit binding for a sampler uniform
    Sampler(u32),
}

/// Completeness status reported by a framebuffer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FramebufferStatus {
    /// All attachments are consistent and renderable
    Complete,
    /// An attachment is missing or has mismatched dimensions
    IncompleteAttachment,
    /// The driver rejects this combination of attachment formats
    Unsupported,
}

/// Abstraction over the graphics API driving the deferred pipeline
///
/// Implementations own all GPU resources and map the handle types to real
/// API objects. The trait surface is deliberately close to the pipeline's
/// needs rather than to any one API: multi-target framebuffers with
/// completeness reporting, draw-buffer selection, stencil/depth/blend/cull
/// state, named-uniform programs, and a blit to the default framebuffer.
///
/// All methods must be called from a single rendering thread; backends are
/// not required to be thread-safe.
pub trait GraphicsDevice {
    /// Allocate a texture with the given format and dimensions
    fn create_texture(
        &mut self,
        label: &str,
        format: TextureFormat,
        width: u32,
        height: u32,
    ) -> RenderResult<TextureId>;

    /// Reallocate a texture's storage in place, preserving its handle
    fn resize_texture(&mut self, texture: TextureId, width: u32, height: u32) -> RenderResult<()>;

    /// Current dimensions of a texture
    fn texture_size(&self, texture: TextureId) -> RenderResult<(u32, u32)>;

    /// Release a texture's storage; a stale handle is ignored
    fn destroy_texture(&mut self, texture: TextureId);

    /// Create an empty framebuffer object
    fn create_framebuffer(&mut self, label: &str) -> RenderResult<FramebufferId>;

    /// Attach a color texture at the given attachment slot
    fn attach_color(
        &mut self,
        framebuffer: FramebufferId,
        slot: usize,
        texture: TextureId,
    ) -> RenderResult<()>;

    /// Attach a depth or depth-stencil texture
    fn attach_depth_stencil(
        &mut self,
        framebuffer: FramebufferId,
        texture: TextureId,
    ) -> RenderResult<()>;

    /// Query the completeness status of a framebuffer
    fn framebuffer_status(&self, framebuffer: FramebufferId) -> RenderResult<FramebufferStatus>;

    /// Release a framebuffer object, leaving its attachments alive; a stale
    /// handle is ignored
    fn destroy_framebuffer(&mut self, framebuffer: FramebufferId);

    /// Bind a framebuffer for drawing; `None` selects the default framebuffer
    fn bind_framebuffer(&mut self, framebuffer: Option<FramebufferId>);

    /// Select which color attachments of the bound framebuffer receive draws
    ///
    /// An empty slice disables color output entirely (stencil-only passes).
    fn set_draw_buffers(&mut self, slots: &[usize]);

    /// Bind a texture for sampling at the given texture unit
    fn bind_texture(&mut self, unit: u32, texture: TextureId);

    /// Set the viewport dimensions
    fn set_viewport(&mut self, width: u32, height: u32);

    /// Set the depth test/write state
    fn set_depth(&mut self, state: DepthState);

    /// Set the stencil state
    fn set_stencil(&mut self, state: StencilState);

    /// Set the framebuffer blend mode
    fn set_blend(&mut self, mode: BlendMode);

    /// Set the face-culling mode
    fn set_cull(&mut self, mode: CullMode);

    /// Clear the selected buffers of the bound framebuffer
    fn clear(&mut self, mask: ClearMask, color: [f32; 4]);

    /// Compile and link a shader program from the given stage sources
    ///
    /// Fails with a message naming the offending files when any stage cannot
    /// be read or compiled.
    fn compile_program(&mut self, label: &str, stages: &ShaderConfig) -> RenderResult<ProgramId>;

    /// Release a compiled program; a stale handle is ignored
    fn destroy_program(&mut self, program: ProgramId);

    /// Resolve a named uniform slot, if the program declares it
    fn uniform_location(&self, program: ProgramId, name: &str) -> Option<UniformLocation>;

    /// Names of every uniform the program declares
    fn program_uniforms(&self, program: ProgramId) -> RenderResult<Vec<String>>;

    /// Assign a value to a uniform slot
    fn set_uniform(&mut self, program: ProgramId, location: UniformLocation, value: UniformValue);

    /// Select the program used by subsequent draws
    fn use_program(&mut self, program: ProgramId);

    /// Upload an indexed mesh
    fn create_mesh(&mut self, label: &str, vertices: &[Vertex], indices: &[u32])
        -> RenderResult<MeshId>;

    /// Release an uploaded mesh; a stale handle is ignored
    fn destroy_mesh(&mut self, mesh: MeshId);

    /// Issue one indexed draw of the given mesh with the current state
    fn draw_mesh(&mut self, mesh: MeshId) -> RenderResult<()>;

    /// Blit a color attachment of a framebuffer to the default framebuffer
    fn blit_to_default(
        &mut self,
        framebuffer: FramebufferId,
        slot: usize,
        width: u32,
        height: u32,
    ) -> RenderResult<()>;

    /// Downcast to the concrete backend type
    fn as_any(&self) -> &dyn Any;

    /// Downcast to the mutable concrete backend type
    fn as_any_mut(&mut self) -> &mut dyn Any;
}
