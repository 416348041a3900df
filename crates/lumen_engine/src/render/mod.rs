//! # Rendering System
//!
//! Deferred, G-buffer-based rendering pipeline. A frame is rendered in
//! strictly ordered phases: a geometry pass writes per-pixel attributes into
//! the G-buffer, each light then shades the pixels it can affect (with a
//! stencil pre-pass culling point/spot lights to their volumes), and a final
//! post-processing pass presents the accumulated lit color.
//!
//! The pipeline never talks to a graphics API directly. All GPU work goes
//! through the [`GraphicsDevice`](api::GraphicsDevice) trait, so the same
//! orchestration code runs against any backend, including the headless
//! reference backend used by the test suite.

pub mod api;
pub mod backends;
pub mod camera;
pub mod gbuffer;
pub mod lighting;
pub mod matrix_pipeline;
pub mod mesh;
pub mod renderer;
pub mod shader;
pub mod shadow;

#[cfg(test)]
mod pipeline_tests;

pub use api::{FramebufferStatus, GraphicsDevice, TextureFormat};
pub use camera::Camera;
pub use gbuffer::GBuffer;
pub use lighting::{AmbientLight, Attenuation, DirectionalLight, Light, PointLight, SpotLight};
pub use matrix_pipeline::MatrixPipeline;
pub use mesh::{Mesh, Vertex};
pub use renderer::{DeferredRenderer, FramePhase, FrameStats};
pub use shader::{ShaderProgram, ShaderSet, ShaderVariant};

use thiserror::Error;

/// Errors produced by the rendering system
///
/// Every variant is fatal to the operation that produced it: resource
/// failures abort construction or resize, and are never retried with the
/// same parameters.
#[derive(Debug, Error)]
pub enum RenderError {
    /// A framebuffer's attachment set was rejected by the driver
    #[error("framebuffer '{label}' incomplete: {status:?}")]
    FramebufferIncomplete {
        /// Label of the offending framebuffer
        label: String,
        /// The reported status
        status: FramebufferStatus,
    },

    /// A texture or buffer allocation failed
    #[error("resource allocation failed: {0}")]
    ResourceAllocation(String),

    /// A shader program failed to compile or link
    #[error("shader compilation failed for {files:?}: {log}")]
    ShaderCompilation {
        /// Source files of the offending program
        files: Vec<String>,
        /// Compiler/linker output
        log: String,
    },

    /// A named uniform was looked up but the program does not declare it
    ///
    /// Treated as a programming error (shader/engine mismatch), not a
    /// recoverable runtime condition; ignoring it would silently corrupt
    /// the output.
    #[error("uniform '{name}' not found in program '{program}'")]
    UniformNotFound {
        /// Label of the program searched
        program: String,
        /// The missing uniform name
        name: String,
    },

    /// A light was given parameters that would break volume sizing
    #[error("invalid light parameters: {0}")]
    InvalidLightParameters(String),

    /// A frame phase was requested out of order
    #[error("illegal phase transition from {from:?} to {to:?}")]
    PhaseOrder {
        /// Phase the renderer was in
        from: renderer::FramePhase,
        /// Phase that was requested
        to: renderer::FramePhase,
    },

    /// A backend-specific failure
    #[error("backend error: {0}")]
    Backend(String),
}

/// Result type for rendering operations
pub type RenderResult<T> = Result<T, RenderError>;
