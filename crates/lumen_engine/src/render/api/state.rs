//! Pipeline state types shared between the renderer and backends

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

/// Render-target texel formats
///
/// These are the wire formats of the pipeline: position and normal targets
/// are high-precision floating point, albedo targets are 8-bit-per-channel,
/// and the depth-stencil target packs a 32-bit float depth with an 8-bit
/// stencil. Reducing these precisions produces visibly different lighting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TextureFormat {
    /// Three-channel 32-bit float (world positions, encoded normals)
    Rgb32F,
    /// Four-channel 16-bit float (lit-color accumulation)
    Rgba16F,
    /// Four-channel 8-bit unsigned normalized (diffuse, specular+shininess)
    Rgba8,
    /// 32-bit float depth only (shadow maps)
    Depth32F,
    /// Combined 32-bit float depth and 8-bit stencil
    Depth32FStencil8,
}

impl TextureFormat {
    /// Whether the format can be attached as a color render target
    pub fn is_color(self) -> bool {
        matches!(self, Self::Rgb32F | Self::Rgba16F | Self::Rgba8)
    }

    /// Whether the format carries a depth channel
    pub fn has_depth(self) -> bool {
        matches!(self, Self::Depth32F | Self::Depth32FStencil8)
    }

    /// Whether the format carries a stencil channel
    pub fn has_stencil(self) -> bool {
        matches!(self, Self::Depth32FStencil8)
    }
}

bitflags! {
    /// Which buffers a clear call affects
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct ClearMask: u8 {
        /// Clear the currently selected color draw buffers
        const COLOR = 1 << 0;
        /// Clear the depth buffer
        const DEPTH = 1 << 1;
        /// Clear the stencil buffer
        const STENCIL = 1 << 2;
    }
}

/// Stencil-buffer update operations
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StencilOp {
    /// Leave the stencil value unchanged
    Keep,
    /// Set the stencil value to zero
    Zero,
    /// Increment with wraparound
    IncrementWrap,
    /// Decrement with wraparound
    DecrementWrap,
}

/// Comparison functions for depth and stencil tests
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareFunc {
    /// Always passes
    Always,
    /// Never passes
    Never,
    /// Passes when the incoming value differs from the stored value
    NotEqual,
    /// Passes when the incoming value is less than the stored value
    Less,
    /// Passes when the incoming value is less than or equal
    LessEqual,
}

/// Per-face stencil configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StencilFace {
    /// Stencil test function
    pub func: CompareFunc,
    /// Reference value for the test
    pub reference: i32,
    /// Operation when the stencil test fails
    pub stencil_fail: StencilOp,
    /// Operation when the stencil test passes but the depth test fails
    pub depth_fail: StencilOp,
    /// Operation when both tests pass
    pub pass: StencilOp,
}

impl StencilFace {
    /// A face that always passes and never writes
    pub fn keep() -> Self {
        Self {
            func: CompareFunc::Always,
            reference: 0,
            stencil_fail: StencilOp::Keep,
            depth_fail: StencilOp::Keep,
            pass: StencilOp::Keep,
        }
    }
}

/// Full stencil state: enable flag plus independent front/back faces
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StencilState {
    /// Whether the stencil test is enabled at all
    pub enabled: bool,
    /// Configuration for front-facing fragments
    pub front: StencilFace,
    /// Configuration for back-facing fragments
    pub back: StencilFace,
}

impl StencilState {
    /// Stencil test fully disabled
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            front: StencilFace::keep(),
            back: StencilFace::keep(),
        }
    }
}

/// Depth test and write configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DepthState {
    /// Whether incoming fragments are depth-tested
    pub test: bool,
    /// Whether passing fragments update the depth buffer
    pub write: bool,
}

/// Framebuffer blend configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlendMode {
    /// Overwrite the destination
    Disabled,
    /// Sum source and destination (light accumulation)
    Additive,
}

/// Face culling configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CullMode {
    /// No culling (stencil pre-pass needs both faces rasterized)
    None,
    /// Cull back faces
    Back,
    /// Cull front faces (light volumes that may enclose the camera)
    Front,
}
