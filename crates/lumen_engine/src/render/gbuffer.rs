//! Geometry buffer for deferred shading
//!
//! Owns the multi-target framebuffer every pass of the pipeline renders
//! into or reads from: world position, diffuse albedo, specular+shininess,
//! encoded normal, the lit-color accumulation target, and a combined
//! depth-stencil target. All targets share one size and are resized
//! together; the framebuffer must report complete after construction and
//! after every resize or the operation fails.
//!
//! The phase-transition methods only issue state-setting calls and cannot
//! fail; their valid ordering (geometry, then stencil/light pairs, then
//! post-processing) is enforced by the renderer's frame state machine.

use crate::render::api::{
    BlendMode, ClearMask, CompareFunc, CullMode, DepthState, FramebufferId, FramebufferStatus,
    GraphicsDevice, StencilFace, StencilOp, StencilState, TextureFormat, TextureId,
};
use crate::render::{RenderError, RenderResult};

/// Color-attachment slot of the world-position target
pub const POSITION_SLOT: usize = 0;
/// Color-attachment slot of the diffuse-albedo target
pub const DIFFUSE_SLOT: usize = 1;
/// Color-attachment slot of the specular+shininess target
pub const SPECULAR_SLOT: usize = 2;
/// Color-attachment slot of the encoded-normal target
pub const NORMAL_SLOT: usize = 3;
/// Color-attachment slot of the lit-color accumulation target
pub const LIT_SLOT: usize = 4;

/// The geometry-phase draw targets, in attachment order
const GEOMETRY_SLOTS: [usize; 4] = [POSITION_SLOT, DIFFUSE_SLOT, SPECULAR_SLOT, NORMAL_SLOT];

const TARGET_FORMATS: [(usize, &str, TextureFormat); 5] = [
    (POSITION_SLOT, "gbuffer_position", TextureFormat::Rgb32F),
    (DIFFUSE_SLOT, "gbuffer_diffuse", TextureFormat::Rgba8),
    (SPECULAR_SLOT, "gbuffer_specular", TextureFormat::Rgba8),
    (NORMAL_SLOT, "gbuffer_normal", TextureFormat::Rgb32F),
    (LIT_SLOT, "gbuffer_lit", TextureFormat::Rgba16F),
];

/// Multi-target G-buffer with phase-transition operations
pub struct GBuffer {
    framebuffer: FramebufferId,
    targets: [TextureId; 5],
    depth_stencil: TextureId,
    width: u32,
    height: u32,
    lit_cleared: bool,
    frame_clear: [f32; 4],
}

impl GBuffer {
    /// Allocate all render targets at the given size and validate completeness
    pub fn new(device: &mut dyn GraphicsDevice, width: u32, height: u32) -> RenderResult<Self> {
        let framebuffer = device.create_framebuffer("gbuffer")?;

        let mut targets = [TextureId::default(); 5];
        for (slot, label, format) in TARGET_FORMATS {
            let texture = device.create_texture(label, format, width, height)?;
            device.attach_color(framebuffer, slot, texture)?;
            targets[slot] = texture;
        }

        let depth_stencil = device.create_texture(
            "gbuffer_depth_stencil",
            TextureFormat::Depth32FStencil8,
            width,
            height,
        )?;
        device.attach_depth_stencil(framebuffer, depth_stencil)?;

        let gbuffer = Self {
            framebuffer,
            targets,
            depth_stencil,
            width,
            height,
            lit_cleared: false,
            frame_clear: [0.0; 4],
        };
        gbuffer.validate(device, "gbuffer")?;

        log::info!("gbuffer created at {width}x{height}");
        Ok(gbuffer)
    }

    fn validate(&self, device: &dyn GraphicsDevice, label: &str) -> RenderResult<()> {
        match device.framebuffer_status(self.framebuffer)? {
            FramebufferStatus::Complete => Ok(()),
            status => Err(RenderError::FramebufferIncomplete {
                label: label.to_string(),
                status,
            }),
        }
    }

    /// Reallocate every target's storage in place and re-validate
    ///
    /// The framebuffer object and all texture handles survive; only the
    /// storage behind them changes.
    pub fn resize(
        &mut self,
        device: &mut dyn GraphicsDevice,
        width: u32,
        height: u32,
    ) -> RenderResult<()> {
        for target in self.targets {
            device.resize_texture(target, width, height)?;
        }
        device.resize_texture(self.depth_stencil, width, height)?;
        self.width = width;
        self.height = height;
        self.validate(device, "gbuffer")?;
        log::debug!("gbuffer resized to {width}x{height}");
        Ok(())
    }

    /// Release every render target and the framebuffer object
    ///
    /// Called by the renderer on teardown; the buffer must not be used
    /// afterwards.
    pub fn release(&mut self, device: &mut dyn GraphicsDevice) {
        device.destroy_framebuffer(self.framebuffer);
        for target in self.targets {
            device.destroy_texture(target);
        }
        device.destroy_texture(self.depth_stencil);
        log::debug!("gbuffer released");
    }

    /// Reset per-frame state; called once at the top of each frame
    pub fn begin_frame(&mut self) {
        self.lit_cleared = false;
    }

    /// Bind for geometry-attribute writing and clear color+depth
    ///
    /// Until the next phase transition, draws write world-space geometry
    /// attributes into the first four targets, not final color. The clear
    /// color is remembered for the lit target's once-per-frame clear, so a
    /// frame that shades zero lights still presents it instead of stale
    /// accumulation.
    pub fn prepare_geometry_phase(&mut self, device: &mut dyn GraphicsDevice, clear_color: [f32; 4]) {
        self.frame_clear = clear_color;
        device.bind_framebuffer(Some(self.framebuffer));
        device.set_draw_buffers(&GEOMETRY_SLOTS);
        device.set_viewport(self.width, self.height);
        device.set_depth(DepthState { test: true, write: true });
        device.set_stencil(StencilState::disabled());
        device.set_blend(BlendMode::Disabled);
        device.set_cull(CullMode::Back);
        device.clear(ClearMask::COLOR | ClearMask::DEPTH, clear_color);
    }

    /// Switch to a stencil-only pass marking a light volume
    ///
    /// Color output is disabled and both faces rasterize: front-facing
    /// fragments increment the stencil value where the depth test fails,
    /// back-facing fragments decrement it. A pixel inside the volume ends
    /// up non-zero even when the volume encloses the camera.
    pub fn begin_stencil_pass(&self, device: &mut dyn GraphicsDevice) {
        // Rebind: a shadow collection pass may have bound its own target.
        device.bind_framebuffer(Some(self.framebuffer));
        device.set_draw_buffers(&[]);
        device.set_depth(DepthState { test: true, write: false });
        device.set_cull(CullMode::None);
        device.set_stencil(StencilState {
            enabled: true,
            front: StencilFace {
                func: CompareFunc::Always,
                reference: 0,
                stencil_fail: StencilOp::Keep,
                depth_fail: StencilOp::IncrementWrap,
                pass: StencilOp::Keep,
            },
            back: StencilFace {
                func: CompareFunc::Always,
                reference: 0,
                stencil_fail: StencilOp::Keep,
                depth_fail: StencilOp::DecrementWrap,
                pass: StencilOp::Keep,
            },
        });
        device.clear(ClearMask::STENCIL, [0.0; 4]);
    }

    /// Bind the lit-color target for accumulation and the attribute targets
    /// for sampling
    ///
    /// The accumulation target is cleared exactly once per frame, on the
    /// first lighting-phase entry; later lights blend on top additively.
    /// When `stenciled` is set, only pixels whose stencil value is non-zero
    /// (inside the preceding stencil pass's volume) are shaded.
    pub fn prepare_lighting_phase(&mut self, device: &mut dyn GraphicsDevice, stenciled: bool) {
        device.bind_framebuffer(Some(self.framebuffer));
        device.set_draw_buffers(&[LIT_SLOT]);

        if !self.lit_cleared {
            device.clear(ClearMask::COLOR, self.frame_clear);
            self.lit_cleared = true;
        }

        let stencil = if stenciled {
            let test = StencilFace {
                func: CompareFunc::NotEqual,
                reference: 0,
                stencil_fail: StencilOp::Keep,
                depth_fail: StencilOp::Keep,
                pass: StencilOp::Keep,
            };
            StencilState { enabled: true, front: test, back: test }
        } else {
            StencilState::disabled()
        };
        device.set_stencil(stencil);
        device.set_depth(DepthState { test: false, write: false });
        device.set_blend(BlendMode::Additive);
        // Volumes may enclose the camera; shading back faces covers that.
        device.set_cull(if stenciled { CullMode::Front } else { CullMode::Back });

        for slot in GEOMETRY_SLOTS {
            device.bind_texture(slot as u32, self.targets[slot]);
        }
    }

    /// Unbind the G-buffer and expose the lit-color target for sampling
    pub fn prepare_post_processing_phase(&self, device: &mut dyn GraphicsDevice) {
        device.bind_framebuffer(None);
        device.set_stencil(StencilState::disabled());
        device.set_depth(DepthState { test: false, write: false });
        device.set_blend(BlendMode::Disabled);
        device.set_cull(CullMode::Back);
        device.bind_texture(0, self.targets[LIT_SLOT]);
    }

    /// Blit the lit-color target to the window's framebuffer
    pub fn finalize(
        &self,
        device: &mut dyn GraphicsDevice,
        width: u32,
        height: u32,
    ) -> RenderResult<()> {
        device.blit_to_default(self.framebuffer, LIT_SLOT, width, height)
    }

    /// Current width of every target
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Current height of every target
    pub fn height(&self) -> u32 {
        self.height
    }

    /// The framebuffer handle
    pub fn framebuffer(&self) -> FramebufferId {
        self.framebuffer
    }

    /// The texture handle for a color slot
    pub fn target(&self, slot: usize) -> TextureId {
        self.targets[slot]
    }

    /// The depth-stencil texture handle
    pub fn depth_stencil(&self) -> TextureId {
        self.depth_stencil
    }
}
