//! Shadow-map buffers, one variant per light type
//!
//! Each variant owns a depth-only render target and a cached light-space
//! view-projection. The projection is refit lazily: the owning light marks
//! it stale when a relevant parameter changes, and the renderer resolves it
//! before the next shadow collection. Framebuffer incompleteness at
//! construction is fatal, exactly as for the G-buffer.

use crate::foundation::math::{Aabb, Mat4, Mat4Ext, Vec3};
use crate::render::api::{
    BlendMode, ClearMask, CullMode, DepthState, FramebufferId, FramebufferStatus, GraphicsDevice,
    MeshId, StencilState, TextureFormat, TextureId,
};
use crate::render::shader::ShaderProgram;
use crate::render::{RenderError, RenderResult};

/// Texture unit the light pass samples shadow maps from
///
/// Units 0-3 carry the G-buffer attribute targets.
pub const SHADOW_TEXTURE_UNIT: u32 = 4;

/// One shadow-casting drawable, flattened to what the depth pass needs
#[derive(Debug, Clone, Copy)]
pub struct ShadowCaster {
    /// Mesh to render into the depth map
    pub mesh: MeshId,
    /// World transform of the caster
    pub model: Mat4,
    /// World-space bounds of the caster, for directional volume fitting
    pub bounds: Aabb,
}

/// Depth-only render target shared by every shadow-map variant
struct ShadowTarget {
    framebuffer: FramebufferId,
    depth: TextureId,
    size: u32,
}

impl ShadowTarget {
    fn new(device: &mut dyn GraphicsDevice, label: &str, size: u32) -> RenderResult<Self> {
        let framebuffer = device.create_framebuffer(label)?;
        let depth = device.create_texture(
            &format!("{label}_depth"),
            TextureFormat::Depth32F,
            size,
            size,
        )?;
        device.attach_depth_stencil(framebuffer, depth)?;

        match device.framebuffer_status(framebuffer)? {
            FramebufferStatus::Complete => Ok(Self { framebuffer, depth, size }),
            status => Err(RenderError::FramebufferIncomplete {
                label: label.to_string(),
                status,
            }),
        }
    }

    fn release(&self, device: &mut dyn GraphicsDevice) {
        device.destroy_framebuffer(self.framebuffer);
        device.destroy_texture(self.depth);
    }

    fn collect(
        &self,
        device: &mut dyn GraphicsDevice,
        depth_program: &ShaderProgram,
        view_projection: &Mat4,
        casters: &[ShadowCaster],
    ) -> RenderResult<()> {
        device.bind_framebuffer(Some(self.framebuffer));
        device.set_draw_buffers(&[]);
        device.set_viewport(self.size, self.size);
        device.set_depth(DepthState { test: true, write: true });
        device.set_stencil(StencilState::disabled());
        device.set_blend(BlendMode::Disabled);
        device.set_cull(CullMode::Back);
        device.clear(ClearMask::DEPTH, [0.0; 4]);

        depth_program.bind(device);
        for caster in casters {
            let light_mvp = view_projection * caster.model;
            depth_program.set_mat4(device, "u_light_mvp", &light_mvp)?;
            device.draw_mesh(caster.mesh)?;
        }
        Ok(())
    }
}

/// Common contract of the shadow-map variants
pub trait ShadowMap {
    /// Render the caster set into the depth target from the light's view
    fn collect(
        &mut self,
        device: &mut dyn GraphicsDevice,
        depth_program: &ShaderProgram,
        casters: &[ShadowCaster],
    ) -> RenderResult<()>;

    /// Bind the depth texture(s) for sampling by the light pass
    fn bind_depth_textures(&self, device: &mut dyn GraphicsDevice);

    /// The cached light-space view-projection matrix
    fn projection_matrix(&self) -> Mat4;

    /// Release the depth target; the map must not be used afterwards
    fn release(&mut self, device: &mut dyn GraphicsDevice);
}

/// Orthographic shadow map for a directional light
///
/// The projection extent is re-fit to the bounding volume of the caster set
/// whenever the set or the light's direction changes.
pub struct DirectionalShadowMap {
    target: ShadowTarget,
    view_projection: Mat4,
}

impl DirectionalShadowMap {
    /// Allocate the depth target
    pub fn new(device: &mut dyn GraphicsDevice, size: u32) -> RenderResult<Self> {
        Ok(Self {
            target: ShadowTarget::new(device, "shadow_directional", size)?,
            view_projection: Mat4::identity(),
        })
    }

    /// Re-fit the orthographic volume around the caster bounds
    pub fn refit(&mut self, direction: Vec3, caster_bounds: &Aabb) {
        let center = (caster_bounds.min + caster_bounds.max) * 0.5;
        let radius = (caster_bounds.max - caster_bounds.min).norm() * 0.5;
        let direction = direction.normalize();

        // Pick an up vector not parallel to the light direction
        let up = if direction.y.abs() > 0.99 { Vec3::z() } else { Vec3::y() };
        let eye = center - direction * radius;
        let view = Mat4::look_at(eye, center, up);

        let corners = caster_bounds.corners();
        let in_light: Vec<Vec3> = corners
            .iter()
            .map(|c| view.transform_point(&nalgebra::Point3::from(*c)).coords)
            .collect();
        let fit = Aabb::from_points(&in_light).unwrap_or(Aabb::new(Vec3::zeros(), Vec3::zeros()));

        let projection = Mat4::orthographic(
            fit.min.x,
            fit.max.x,
            fit.min.y,
            fit.max.y,
            -fit.max.z,
            -fit.min.z,
        );
        self.view_projection = projection * view;
    }
}

impl ShadowMap for DirectionalShadowMap {
    fn collect(
        &mut self,
        device: &mut dyn GraphicsDevice,
        depth_program: &ShaderProgram,
        casters: &[ShadowCaster],
    ) -> RenderResult<()> {
        self.target
            .collect(device, depth_program, &self.view_projection, casters)
    }

    fn bind_depth_textures(&self, device: &mut dyn GraphicsDevice) {
        device.bind_texture(SHADOW_TEXTURE_UNIT, self.target.depth);
    }

    fn projection_matrix(&self) -> Mat4 {
        self.view_projection
    }

    fn release(&mut self, device: &mut dyn GraphicsDevice) {
        self.target.release(device);
    }
}

/// Perspective shadow map for a spot light
///
/// Field of view is twice the spot's cutoff half-angle; the far plane sits
/// at the cutoff radius, beyond which the light contributes nothing.
pub struct SpotShadowMap {
    target: ShadowTarget,
    view_projection: Mat4,
}

impl SpotShadowMap {
    /// Allocate the depth target
    pub fn new(device: &mut dyn GraphicsDevice, size: u32) -> RenderResult<Self> {
        Ok(Self {
            target: ShadowTarget::new(device, "shadow_spot", size)?,
            view_projection: Mat4::identity(),
        })
    }

    /// Recompute the perspective projection from the spot parameters
    pub fn refit(&mut self, position: Vec3, direction: Vec3, half_angle: f32, cutoff_radius: f32) {
        let direction = direction.normalize();
        let up = if direction.y.abs() > 0.99 { Vec3::z() } else { Vec3::y() };
        let view = Mat4::look_at(position, position + direction, up);
        let projection = Mat4::perspective(2.0 * half_angle, 1.0, 0.1, cutoff_radius.max(0.2));
        self.view_projection = projection * view;
    }
}

impl ShadowMap for SpotShadowMap {
    fn collect(
        &mut self,
        device: &mut dyn GraphicsDevice,
        depth_program: &ShaderProgram,
        casters: &[ShadowCaster],
    ) -> RenderResult<()> {
        self.target
            .collect(device, depth_program, &self.view_projection, casters)
    }

    fn bind_depth_textures(&self, device: &mut dyn GraphicsDevice) {
        device.bind_texture(SHADOW_TEXTURE_UNIT, self.target.depth);
    }

    fn projection_matrix(&self) -> Mat4 {
        self.view_projection
    }

    fn release(&mut self, device: &mut dyn GraphicsDevice) {
        self.target.release(device);
    }
}

/// Placeholder shadow map for point lights
///
/// A real implementation needs six perspective projections (one per cube
/// face) or an equivalent omnidirectional depth representation. This
/// variant keeps the interface of the other two but exposes an identity
/// projection and collects depth from a single fixed view, so point-light
/// shadows darken nothing. Kept deliberately: promoting it to cube-map
/// shadows changes the sampling contract for every light shader.
pub struct PointShadowMap {
    target: ShadowTarget,
}

impl PointShadowMap {
    /// Allocate the depth target
    pub fn new(device: &mut dyn GraphicsDevice, size: u32) -> RenderResult<Self> {
        Ok(Self {
            target: ShadowTarget::new(device, "shadow_point", size)?,
        })
    }
}

impl ShadowMap for PointShadowMap {
    fn collect(
        &mut self,
        device: &mut dyn GraphicsDevice,
        depth_program: &ShaderProgram,
        casters: &[ShadowCaster],
    ) -> RenderResult<()> {
        self.target
            .collect(device, depth_program, &Mat4::identity(), casters)
    }

    fn bind_depth_textures(&self, device: &mut dyn GraphicsDevice) {
        device.bind_texture(SHADOW_TEXTURE_UNIT, self.target.depth);
    }

    fn projection_matrix(&self) -> Mat4 {
        Mat4::identity()
    }

    fn release(&mut self, device: &mut dyn GraphicsDevice) {
        self.target.release(device);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::backends::HeadlessDevice;
    use approx::assert_relative_eq;

    #[test]
    fn shadow_target_framebuffer_is_complete() {
        let mut device = HeadlessDevice::new();
        let map = DirectionalShadowMap::new(&mut device, 1024).unwrap();
        assert_eq!(
            device.framebuffer_status(map.target.framebuffer).unwrap(),
            FramebufferStatus::Complete
        );
    }

    #[test]
    fn release_frees_the_depth_target() {
        let mut device = HeadlessDevice::new();
        let mut map = DirectionalShadowMap::new(&mut device, 256).unwrap();
        assert_eq!(device.texture_count(), 1);
        assert_eq!(device.framebuffer_count(), 1);

        map.release(&mut device);
        assert_eq!(device.texture_count(), 0);
        assert_eq!(device.framebuffer_count(), 0);
    }

    #[test]
    fn directional_fit_encloses_caster_bounds() {
        let mut device = HeadlessDevice::new();
        let mut map = DirectionalShadowMap::new(&mut device, 512).unwrap();
        let bounds = Aabb::new(Vec3::new(-3.0, 0.0, -3.0), Vec3::new(3.0, 4.0, 3.0));
        map.refit(Vec3::new(0.0, -1.0, 0.0), &bounds);

        // Every corner must land inside the clip volume
        let vp = map.projection_matrix();
        for corner in bounds.corners() {
            let clip = vp * corner.push(1.0);
            let ndc = clip / clip.w;
            assert!(ndc.x >= -1.001 && ndc.x <= 1.001, "x out of volume: {ndc}");
            assert!(ndc.y >= -1.001 && ndc.y <= 1.001, "y out of volume: {ndc}");
            assert!(ndc.z >= -1.001 && ndc.z <= 1.001, "z out of volume: {ndc}");
        }
    }

    #[test]
    fn directional_refit_tracks_direction_changes() {
        let mut device = HeadlessDevice::new();
        let mut map = DirectionalShadowMap::new(&mut device, 512).unwrap();
        let bounds = Aabb::new(Vec3::new(-1.0, -1.0, -1.0), Vec3::new(1.0, 1.0, 1.0));

        map.refit(Vec3::new(0.0, -1.0, 0.0), &bounds);
        let first = map.projection_matrix();
        map.refit(Vec3::new(1.0, -1.0, 0.0), &bounds);
        assert_ne!(first, map.projection_matrix());
    }

    #[test]
    fn spot_projection_far_plane_sits_at_cutoff_radius() {
        let mut device = HeadlessDevice::new();
        let mut map = SpotShadowMap::new(&mut device, 512).unwrap();
        let half_angle = 30.0_f32.to_radians();
        map.refit(Vec3::zeros(), Vec3::new(0.0, 0.0, -1.0), half_angle, 20.0);

        // A point on the light axis at the cutoff radius maps to the far plane
        let clip = map.projection_matrix() * Vec3::new(0.0, 0.0, -20.0).push(1.0);
        let ndc_z = clip.z / clip.w;
        assert_relative_eq!(ndc_z, 1.0, epsilon = 1e-3);
    }

    #[test]
    fn point_shadow_map_is_a_documented_identity_stub() {
        let mut device = HeadlessDevice::new();
        let map = PointShadowMap::new(&mut device, 512).unwrap();
        assert_eq!(map.projection_matrix(), Mat4::identity());
    }

    #[test]
    fn collect_draws_every_caster_depth_only() {
        let mut device = HeadlessDevice::new();
        let mut map = SpotShadowMap::new(&mut device, 256).unwrap();
        map.refit(Vec3::zeros(), Vec3::new(0.0, 0.0, -1.0), 0.5, 10.0);

        let program = crate::render::shader::ShaderProgram::new(
            &mut device,
            "shadow_depth",
            &crate::render::shader::ShaderVariant::ShadowDepth
                .sources(std::path::Path::new("shaders")),
        )
        .unwrap();

        let mesh_data = crate::render::mesh::Mesh::unit_sphere(4, 3);
        let mesh = device
            .create_mesh("caster", &mesh_data.vertices, &mesh_data.indices)
            .unwrap();
        let bounds = Aabb::new(Vec3::new(-1.0, -1.0, -1.0), Vec3::new(1.0, 1.0, 1.0));
        let casters = [
            ShadowCaster { mesh, model: Mat4::identity(), bounds },
            ShadowCaster { mesh, model: Mat4::new_translation(&Vec3::x()), bounds },
        ];

        map.collect(&mut device, &program, &casters).unwrap();
        assert_eq!(device.draws().len(), 2);
        for draw in device.draws() {
            assert!(draw.draw_buffers.is_empty());
            assert!(draw.depth.write);
        }
    }
}
