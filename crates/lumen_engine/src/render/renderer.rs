//! Deferred renderer orchestration
//!
//! [`DeferredRenderer`] owns the device, the G-buffer, the matrix pipeline,
//! and the light-volume proxy meshes, and drives a frame through its phases
//! in the only legal order:
//!
//! ```text
//! Idle -> Geometry -> (Stencil -> Light)* -> PostProcess -> Idle
//! ```
//!
//! The phase is an explicit state machine. Every pass method first checks
//! the transition and fails with [`RenderError::PhaseOrder`] when called out
//! of order, instead of silently issuing GPU state for the wrong pass.
//!
//! The shader set is injected at construction rather than looked up from
//! process-wide state, so ownership and teardown order are the caller's and
//! tests can build a renderer entirely against the headless backend.

use crate::core::config::RendererConfig;
use crate::foundation::math::{Aabb, Transform, Vec3};
use crate::foundation::time::Timer;
use crate::render::api::{GraphicsDevice, MeshId};
use crate::render::gbuffer::GBuffer;
use crate::render::lighting::{self, Light, ShineContext, VolumeDraw, VolumeMeshes};
use crate::render::matrix_pipeline::MatrixPipeline;
use crate::render::mesh::Mesh;
use crate::render::shader::{ShaderSet, ShaderVariant};
use crate::render::shadow::ShadowCaster;
use crate::render::{Camera, RenderError, RenderResult};
use crate::scene::{Drawable, FrameSubmission, World};

/// Phase of the frame state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FramePhase {
    /// Between frames; the only phase a frame may start from
    Idle,
    /// Geometry attributes being written into the G-buffer
    Geometry,
    /// Stencil pre-pass marking one light's volume
    Stencil,
    /// A light accumulating into the lit-color target
    Light,
    /// Lit color being presented
    PostProcess,
}

impl FramePhase {
    /// Whether the machine may move from `self` to `to`
    fn permits(self, to: Self) -> bool {
        matches!(
            (self, to),
            (Self::Idle, Self::Geometry)
                | (Self::Geometry, Self::Stencil)
                | (Self::Geometry, Self::Light)
                | (Self::Geometry, Self::PostProcess)
                | (Self::Stencil, Self::Light)
                | (Self::Light, Self::Stencil)
                | (Self::Light, Self::Light)
                | (Self::Light, Self::PostProcess)
                | (Self::PostProcess, Self::Idle)
        )
    }
}

/// Per-frame counters, reset at the start of each frame
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameStats {
    /// Mesh draws issued, across all passes
    pub draw_calls: u32,
    /// Lights whose lit pass ran
    pub lights_shaded: u32,
    /// Stencil pre-passes issued
    pub stencil_passes: u32,
    /// Casters rendered into shadow maps
    pub shadow_casters: u32,
}

/// The deferred rendering pipeline's orchestrator
pub struct DeferredRenderer {
    device: Box<dyn GraphicsDevice>,
    shaders: ShaderSet,
    gbuffer: GBuffer,
    matrices: MatrixPipeline,
    camera: Camera,
    volumes: VolumeMeshes,
    clear_color: [f32; 4],
    shadow_map_size: u32,
    phase: FramePhase,
    width: u32,
    height: u32,
    timer: Timer,
    stats: FrameStats,
    closing: bool,
}

impl DeferredRenderer {
    /// Build the pipeline against an already-initialized device
    ///
    /// Allocates the G-buffer at the configured size and uploads the shared
    /// light-volume proxy meshes. The shader set is compiled by the caller
    /// (against the same device) and handed in.
    pub fn new(
        mut device: Box<dyn GraphicsDevice>,
        shaders: ShaderSet,
        camera: Camera,
        config: &RendererConfig,
    ) -> RenderResult<Self> {
        let gbuffer = GBuffer::new(device.as_mut(), config.width, config.height)?;

        let quad = Mesh::full_screen_quad();
        let sphere = Mesh::unit_sphere(16, 12);
        let cone = Mesh::unit_cone(16);
        let volumes = VolumeMeshes {
            quad: device.create_mesh("light_quad", &quad.vertices, &quad.indices)?,
            sphere: device.create_mesh("light_sphere", &sphere.vertices, &sphere.indices)?,
            cone: device.create_mesh("light_cone", &cone.vertices, &cone.indices)?,
        };

        log::info!(
            "deferred renderer initialized at {}x{}",
            config.width,
            config.height
        );
        Ok(Self {
            device,
            shaders,
            gbuffer,
            matrices: MatrixPipeline::new(),
            camera,
            volumes,
            clear_color: config.clear_color,
            shadow_map_size: config.shadow_map_size,
            phase: FramePhase::Idle,
            width: config.width,
            height: config.height,
            timer: Timer::new(),
            stats: FrameStats::default(),
            closing: false,
        })
    }

    fn transition(&mut self, to: FramePhase) -> RenderResult<()> {
        if !self.phase.permits(to) {
            return Err(RenderError::PhaseOrder {
                from: self.phase,
                to,
            });
        }
        self.phase = to;
        Ok(())
    }

    /// The current frame phase
    pub fn phase(&self) -> FramePhase {
        self.phase
    }

    /// Counters for the frame in flight (or the last completed frame)
    pub fn stats(&self) -> FrameStats {
        self.stats
    }

    /// The camera driving the view and projection matrices
    pub fn camera(&self) -> &Camera {
        &self.camera
    }

    /// Replace the camera; the view matrix is re-derived at the next frame
    pub fn set_camera(&mut self, camera: Camera) {
        self.camera = camera;
    }

    /// Seconds between the last two frames
    pub fn delta_time(&self) -> f32 {
        self.timer.delta_time()
    }

    /// The device, for resource creation by the owning application
    pub fn device_mut(&mut self) -> &mut dyn GraphicsDevice {
        self.device.as_mut()
    }

    /// The device, read-only
    pub fn device(&self) -> &dyn GraphicsDevice {
        self.device.as_ref()
    }

    /// Stop issuing new frames; the frame in flight still completes
    pub fn close(&mut self) {
        self.closing = true;
    }

    /// Whether the owning application asked the renderer to stop
    pub fn should_close(&self) -> bool {
        self.closing
    }

    /// Resize the viewport: G-buffer storage and projection both follow
    pub fn resize(&mut self, width: u32, height: u32) -> RenderResult<()> {
        self.gbuffer.resize(self.device.as_mut(), width, height)?;
        self.camera.set_aspect(width, height);
        self.width = width;
        self.height = height;
        Ok(())
    }

    /// Request a light's shadow buffer at the configured resolution
    pub fn enable_light_shadows(&mut self, light: &mut Light) -> RenderResult<()> {
        light.enable_shadows(self.device.as_mut(), self.shadow_map_size)
    }

    /// Release a light's shadow buffer before the light is dropped
    pub fn disable_light_shadows(&mut self, light: &mut Light) {
        light.disable_shadows(self.device.as_mut());
    }

    /// Open the frame and bind the G-buffer for geometry writing
    pub fn begin_geometry_pass(&mut self) -> RenderResult<()> {
        self.transition(FramePhase::Geometry)?;
        self.timer.update();
        self.stats = FrameStats::default();

        self.matrices.set_view(self.camera.view_matrix());
        self.matrices.set_projection(self.camera.projection_matrix());

        self.gbuffer.begin_frame();
        self.gbuffer
            .prepare_geometry_phase(self.device.as_mut(), self.clear_color);
        Ok(())
    }

    /// Draw opaque geometry into the G-buffer's attribute targets
    ///
    /// Each drawable's model matrix feeds the matrix pipeline, which hands
    /// the geometry program its MVP and normal matrices. Drawables whose
    /// entity has been despawned are skipped.
    pub fn draw_geometry(&mut self, world: &World, drawables: &[Drawable]) -> RenderResult<()> {
        if self.phase != FramePhase::Geometry {
            return Err(RenderError::PhaseOrder {
                from: self.phase,
                to: FramePhase::Geometry,
            });
        }

        let program = self.shaders.get(ShaderVariant::Geometry);
        program.bind(self.device.as_mut());

        for drawable in drawables {
            let Some(entity) = world.get(drawable.entity) else {
                log::warn!("drawable references despawned entity, skipping");
                continue;
            };
            self.matrices.set_model(entity.transform.matrix());
            let mvp = self.matrices.model_view_projection();
            let normal = self.matrices.normal_matrix().to_homogeneous();

            program.set_mat4(self.device.as_mut(), "u_mvp", &mvp)?;
            program.set_mat4(self.device.as_mut(), "u_model", self.matrices.model())?;
            program.set_mat4(self.device.as_mut(), "u_normal_matrix", &normal)?;
            program.set_vec4(self.device.as_mut(), "u_diffuse_color", drawable.material.diffuse)?;
            program.set_vec3(
                self.device.as_mut(),
                "u_specular_color",
                drawable.material.specular,
            )?;
            program.set_f32(self.device.as_mut(), "u_shininess", drawable.material.shininess)?;

            self.device.draw_mesh(drawable.mesh)?;
            self.stats.draw_calls += 1;
        }
        Ok(())
    }

    /// Render every shadow-enabled light's depth map
    ///
    /// Runs between the geometry pass and the first light, while no lighting
    /// state is bound; the first light pass rebinds the G-buffer.
    pub fn collect_shadows(
        &mut self,
        world: &World,
        lights: &mut [Light],
        drawables: &[Drawable],
    ) -> RenderResult<()> {
        if self.phase != FramePhase::Geometry {
            return Err(RenderError::PhaseOrder {
                from: self.phase,
                to: FramePhase::Geometry,
            });
        }

        let casters = shadow_casters(world, drawables);
        if casters.is_empty() {
            return Ok(());
        }

        let depth_program = self.shaders.get(ShaderVariant::ShadowDepth);
        for light in lights.iter_mut() {
            if !light.casts_shadows() {
                continue;
            }
            let Some(entity) = world.get(light.entity()) else {
                log::warn!("shadow light references despawned entity, skipping");
                continue;
            };
            let transform = entity.transform.clone();
            light.collect_shadows(self.device.as_mut(), depth_program, &transform, &casters)?;
            self.stats.shadow_casters += casters.len() as u32;
            self.stats.draw_calls += casters.len() as u32;
        }
        Ok(())
    }

    /// Shade one light into the lit-color accumulation target
    ///
    /// Volume lights (point/spot) get a stencil pre-pass marking the pixels
    /// inside their proxy volume; their lit pass then shades only those.
    /// Quad lights (ambient/directional) shade every pixel directly.
    pub fn shine(&mut self, world: &World, light: &mut Light) -> RenderResult<()> {
        let entity = world
            .get(light.entity())
            .ok_or_else(|| {
                RenderError::InvalidLightParameters("light references a despawned entity".into())
            })?;
        let transform = entity.transform.clone();

        let ctx = ShineContext {
            view_projection: self.camera.projection_matrix() * self.camera.view_matrix(),
            eye_position: self.camera.position,
            screen_width: self.gbuffer.width(),
            screen_height: self.gbuffer.height(),
        };
        let plan = light.plan(&transform, &ctx);

        let stenciled = light.uses_stencil_volume();
        if stenciled {
            self.transition(FramePhase::Stencil)?;
            self.gbuffer.begin_stencil_pass(self.device.as_mut());

            let stencil_program = self.shaders.get(ShaderVariant::Stencil);
            stencil_program.bind(self.device.as_mut());
            if let Some(mvp) = plan.volume_mvp() {
                stencil_program.set_mat4(self.device.as_mut(), "u_mvp", &mvp)?;
            }
            let volume = self.volume_mesh(&plan.draw);
            self.device.draw_mesh(volume)?;
            self.stats.stencil_passes += 1;
            self.stats.draw_calls += 1;
        }

        self.transition(FramePhase::Light)?;
        self.gbuffer
            .prepare_lighting_phase(self.device.as_mut(), stenciled);
        light.bind_shadow_textures(self.device.as_mut());
        lighting::execute_plan(self.device.as_mut(), &self.shaders, &self.volumes, &plan)?;
        self.stats.lights_shaded += 1;
        self.stats.draw_calls += 1;
        Ok(())
    }

    fn volume_mesh(&self, draw: &VolumeDraw) -> MeshId {
        match draw {
            VolumeDraw::Quad => self.volumes.quad,
            VolumeDraw::Sphere(_) => self.volumes.sphere,
            VolumeDraw::Cone(_) => self.volumes.cone,
        }
    }

    /// Unbind the G-buffer and expose the accumulated lit color
    pub fn begin_post_processing(&mut self) -> RenderResult<()> {
        // A frame with zero lights still needs the lit target cleared
        // before presentation.
        if self.phase == FramePhase::Geometry {
            self.gbuffer.prepare_lighting_phase(self.device.as_mut(), false);
        }
        self.transition(FramePhase::PostProcess)?;
        self.gbuffer.prepare_post_processing_phase(self.device.as_mut());
        Ok(())
    }

    /// Present the lit color and close the frame
    pub fn end_frame(&mut self) -> RenderResult<FrameStats> {
        if self.phase != FramePhase::PostProcess {
            return Err(RenderError::PhaseOrder {
                from: self.phase,
                to: FramePhase::Idle,
            });
        }
        self.gbuffer
            .finalize(self.device.as_mut(), self.width, self.height)?;
        self.transition(FramePhase::Idle)?;
        Ok(self.stats)
    }

    /// Run one complete frame in the contract's order
    ///
    /// Swaps in the pending drawable submission, writes geometry, collects
    /// shadow maps, shades every light, and presents. Equivalent to calling
    /// the pass methods individually in their legal sequence.
    pub fn render_frame(
        &mut self,
        world: &World,
        submission: &mut FrameSubmission,
        lights: &mut [Light],
    ) -> RenderResult<FrameStats> {
        submission.swap();

        self.begin_geometry_pass()?;
        let drawables: Vec<Drawable> = submission.current().to_vec();
        self.draw_geometry(world, &drawables)?;
        self.collect_shadows(world, lights, &drawables)?;
        for light in lights.iter_mut() {
            self.shine(world, light)?;
        }
        self.begin_post_processing()?;
        self.end_frame()
    }
}

impl Drop for DeferredRenderer {
    /// Return the renderer's device resources: the G-buffer targets, every
    /// pipeline program, and the light-volume meshes
    ///
    /// Shadow buffers belong to their lights and are released through
    /// [`DeferredRenderer::disable_light_shadows`].
    fn drop(&mut self) {
        self.gbuffer.release(self.device.as_mut());
        self.shaders.release(self.device.as_mut());
        self.device.destroy_mesh(self.volumes.quad);
        self.device.destroy_mesh(self.volumes.sphere);
        self.device.destroy_mesh(self.volumes.cone);
    }
}

fn shadow_casters(world: &World, drawables: &[Drawable]) -> Vec<ShadowCaster> {
    drawables
        .iter()
        .filter(|d| d.casts_shadow)
        .filter_map(|d| {
            let entity = world.get(d.entity)?;
            let bounds = entity.bounds.map_or_else(
                || unit_bounds_at(entity.transform.position),
                |local| world_bounds(&local, &entity.transform),
            );
            Some(ShadowCaster {
                mesh: d.mesh,
                model: entity.transform.matrix(),
                bounds,
            })
        })
        .collect()
}

fn unit_bounds_at(position: Vec3) -> Aabb {
    Aabb::new(
        position - Vec3::from_element(1.0),
        position + Vec3::from_element(1.0),
    )
}

/// Transform an object-space box into a world-space enclosing box
fn world_bounds(local: &Aabb, transform: &Transform) -> Aabb {
    let matrix = transform.matrix();
    let corners: Vec<Vec3> = local
        .corners()
        .iter()
        .map(|c| matrix.transform_point(&nalgebra::Point3::from(*c)).coords)
        .collect();
    // The corner set is never empty, but fall back to a unit box anyway
    // rather than unwrapping.
    Aabb::from_points(&corners).unwrap_or_else(|| unit_bounds_at(transform.position))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn phase_machine_permits_only_the_documented_edges() {
        use FramePhase::*;
        let legal = [
            (Idle, Geometry),
            (Geometry, Stencil),
            (Geometry, Light),
            (Geometry, PostProcess),
            (Stencil, Light),
            (Light, Stencil),
            (Light, Light),
            (Light, PostProcess),
            (PostProcess, Idle),
        ];
        let all = [Idle, Geometry, Stencil, Light, PostProcess];
        for from in all {
            for to in all {
                assert_eq!(
                    from.permits(to),
                    legal.contains(&(from, to)),
                    "edge {from:?} -> {to:?}"
                );
            }
        }
    }
}
