//! # Lumen Engine
//!
//! A deferred-rendering pipeline built around an explicit G-buffer.
//!
//! ## Features
//!
//! - **Deferred Shading**: geometry attributes first, lighting per light
//! - **Stencil-Culled Light Volumes**: point and spot lights shade only the
//!   pixels inside their cutoff-radius proxy volume
//! - **Shadow Maps**: directional and spot shadow buffers with fitted
//!   light-space projections
//! - **Checked Frame Phases**: out-of-order pass calls fail loudly instead
//!   of issuing wrong GPU state
//! - **Backend Agnostic**: all GPU work goes through the
//!   [`GraphicsDevice`](render::api::GraphicsDevice) trait; a headless CPU
//!   backend ships for testing
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use lumen_engine::prelude::*;
//! use lumen_engine::render::backends::HeadlessDevice;
//! use lumen_engine::render::ShaderSet;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = RendererConfig::default();
//!     let mut device = Box::new(HeadlessDevice::new());
//!     let shaders = ShaderSet::load(device.as_mut(), &config.shader_dir)?;
//!     let camera = Camera::default();
//!     let mut renderer = DeferredRenderer::new(device, shaders, camera, &config)?;
//!
//!     let world = World::new();
//!     let mut submission = FrameSubmission::new();
//!     let mut lights = Vec::new();
//!     while !renderer.should_close() {
//!         renderer.render_frame(&world, &mut submission, &mut lights)?;
//!     }
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions, clippy::similar_names, clippy::too_many_arguments)]

pub mod core;
pub mod foundation;
pub mod render;
pub mod scene;

/// Common imports for pipeline users
pub mod prelude {
    pub use crate::core::config::{RendererConfig, ShaderConfig};
    pub use crate::foundation::{
        math::{Aabb, Mat4, Transform, Vec3, Vec4},
        time::Timer,
    };
    pub use crate::render::{
        AmbientLight, Attenuation, Camera, DeferredRenderer, DirectionalLight, FramePhase,
        FrameStats, GBuffer, Light, PointLight, RenderError, RenderResult, SpotLight,
    };
    pub use crate::scene::{
        Drawable, EntityId, FrameSubmission, Material, SceneEntity, World,
    };
}
