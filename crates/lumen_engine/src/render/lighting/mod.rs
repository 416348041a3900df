//! Light hierarchy and per-light shading
//!
//! Four light variants share a common `shine` contract: read the owning
//! entity's world transform, pick the shader variant matching the light's
//! capability set (shadowed or not), upload the light's uniforms, and issue
//! exactly one draw — a full-screen quad for ambient/directional lights, or
//! a bounding proxy volume sized to the cutoff radius for point/spot lights
//! (drawn a second time by the renderer's stencil pre-pass).
//!
//! Shine is split into a pure planning step and a device executor so the
//! per-variant logic is testable without any backend: planning is a pure
//! function of (light parameters, world transform, shadow state).

mod attenuation;
mod plan;

pub use attenuation::{cutoff_radius, Attenuation};
pub use plan::{ShineContext, ShinePlan, VolumeDraw};

use crate::foundation::math::{Aabb, Transform, Vec4};
use crate::render::api::GraphicsDevice;
use crate::render::shader::{ShaderProgram, ShaderSet, ShaderVariant};
use crate::render::shadow::{
    DirectionalShadowMap, PointShadowMap, ShadowCaster, ShadowMap, SpotShadowMap,
};
use crate::render::{RenderError, RenderResult};
use crate::scene::EntityId;

/// Shadow lifecycle of a single light
///
/// `NoBuffer` until shadow casting is first requested, then the projection
/// alternates between stale (a relevant parameter changed) and valid
/// (refit before the last collection) — the same dirty-flag discipline the
/// matrix pipeline uses.
enum ShadowSlot<M: ShadowMap> {
    NoBuffer,
    Allocated { map: M, stale: bool },
}

impl<M: ShadowMap> ShadowSlot<M> {
    fn mark_stale(&mut self) {
        if let Self::Allocated { stale, .. } = self {
            *stale = true;
        }
    }

    fn is_allocated(&self) -> bool {
        matches!(self, Self::Allocated { .. })
    }

    fn release(&mut self, device: &mut dyn GraphicsDevice) {
        if let Self::Allocated { map, .. } = self {
            map.release(device);
        }
        *self = Self::NoBuffer;
    }
}

/// Ambient fill light affecting every pixel uniformly
pub struct AmbientLight {
    entity: EntityId,
    intensity: Vec4,
}

impl AmbientLight {
    /// Create an ambient light attached to an entity
    pub fn new(entity: EntityId, intensity: Vec4) -> Self {
        Self { entity, intensity }
    }

    /// RGB color plus scalar brightness
    pub fn intensity(&self) -> Vec4 {
        self.intensity
    }

    /// Update the intensity vector
    pub fn set_intensity(&mut self, intensity: Vec4) {
        self.intensity = intensity;
    }
}

/// Directional light with parallel rays (sunlight)
pub struct DirectionalLight {
    entity: EntityId,
    intensity: Vec4,
    shadow: ShadowSlot<DirectionalShadowMap>,
}

impl DirectionalLight {
    /// Create a directional light attached to an entity
    ///
    /// The light's direction is the entity's forward vector, read at
    /// shine-time.
    pub fn new(entity: EntityId, intensity: Vec4) -> Self {
        Self {
            entity,
            intensity,
            shadow: ShadowSlot::NoBuffer,
        }
    }

    /// RGB color plus scalar brightness
    pub fn intensity(&self) -> Vec4 {
        self.intensity
    }

    /// Update the intensity vector
    pub fn set_intensity(&mut self, intensity: Vec4) {
        self.intensity = intensity;
    }
}

/// Omnidirectional light with distance attenuation
pub struct PointLight {
    entity: EntityId,
    intensity: Vec4,
    attenuation: Attenuation,
    cutoff_threshold: f32,
    cutoff_radius: f32,
    shadow: ShadowSlot<PointShadowMap>,
}

impl PointLight {
    /// Create a point light attached to an entity
    ///
    /// `cutoff_threshold` is the intensity fraction below which the light's
    /// contribution is treated as zero; it sizes the bounding sphere.
    pub fn new(
        entity: EntityId,
        intensity: Vec4,
        attenuation: Attenuation,
        cutoff_threshold: f32,
    ) -> Self {
        let cutoff_radius = cutoff_radius(&attenuation, intensity.w, cutoff_threshold);
        Self {
            entity,
            intensity,
            attenuation,
            cutoff_threshold,
            cutoff_radius,
            shadow: ShadowSlot::NoBuffer,
        }
    }

    /// RGB color plus scalar brightness
    pub fn intensity(&self) -> Vec4 {
        self.intensity
    }

    /// The attenuation coefficients
    pub fn attenuation(&self) -> &Attenuation {
        &self.attenuation
    }

    /// Distance beyond which this light's contribution is negligible
    ///
    /// Cached; recomputed only when brightness or attenuation changes,
    /// never per-frame.
    pub fn cutoff_radius(&self) -> f32 {
        self.cutoff_radius
    }

    /// Update the intensity, recomputing the cutoff radius
    pub fn set_intensity(&mut self, intensity: Vec4) {
        self.intensity = intensity;
        self.cutoff_radius = cutoff_radius(&self.attenuation, intensity.w, self.cutoff_threshold);
        self.shadow.mark_stale();
    }

    /// Update the attenuation, recomputing the cutoff radius
    pub fn set_attenuation(&mut self, attenuation: Attenuation) {
        self.attenuation = attenuation;
        self.cutoff_radius =
            cutoff_radius(&self.attenuation, self.intensity.w, self.cutoff_threshold);
        self.shadow.mark_stale();
    }
}

/// Cone-shaped light with distance attenuation and angular falloff
pub struct SpotLight {
    entity: EntityId,
    intensity: Vec4,
    attenuation: Attenuation,
    half_angle: f32,
    cutoff_threshold: f32,
    cutoff_radius: f32,
    shadow: ShadowSlot<SpotShadowMap>,
}

impl SpotLight {
    /// Create a spot light attached to an entity
    ///
    /// The cone opens along the entity's forward vector. `half_angle` is
    /// the cutoff half-angle in radians and must be positive and below a
    /// right angle.
    pub fn new(
        entity: EntityId,
        intensity: Vec4,
        attenuation: Attenuation,
        half_angle: f32,
        cutoff_threshold: f32,
    ) -> RenderResult<Self> {
        Self::validate_half_angle(half_angle)?;
        let cutoff_radius = cutoff_radius(&attenuation, intensity.w, cutoff_threshold);
        Ok(Self {
            entity,
            intensity,
            attenuation,
            half_angle,
            cutoff_threshold,
            cutoff_radius,
            shadow: ShadowSlot::NoBuffer,
        })
    }

    fn validate_half_angle(half_angle: f32) -> RenderResult<()> {
        if !(half_angle > 0.0 && half_angle < std::f32::consts::FRAC_PI_2) {
            return Err(RenderError::InvalidLightParameters(format!(
                "spot cutoff half-angle must be in (0, pi/2), got {half_angle}"
            )));
        }
        Ok(())
    }

    /// RGB color plus scalar brightness
    pub fn intensity(&self) -> Vec4 {
        self.intensity
    }

    /// The attenuation coefficients
    pub fn attenuation(&self) -> &Attenuation {
        &self.attenuation
    }

    /// The cutoff half-angle in radians
    pub fn half_angle(&self) -> f32 {
        self.half_angle
    }

    /// Distance beyond which this light's contribution is negligible
    pub fn cutoff_radius(&self) -> f32 {
        self.cutoff_radius
    }

    /// Update the intensity, recomputing the cutoff radius
    pub fn set_intensity(&mut self, intensity: Vec4) {
        self.intensity = intensity;
        self.cutoff_radius = cutoff_radius(&self.attenuation, intensity.w, self.cutoff_threshold);
        self.shadow.mark_stale();
    }

    /// Update the attenuation, recomputing the cutoff radius
    pub fn set_attenuation(&mut self, attenuation: Attenuation) {
        self.attenuation = attenuation;
        self.cutoff_radius =
            cutoff_radius(&self.attenuation, self.intensity.w, self.cutoff_threshold);
        self.shadow.mark_stale();
    }

    /// Update the cutoff half-angle
    pub fn set_half_angle(&mut self, half_angle: f32) -> RenderResult<()> {
        Self::validate_half_angle(half_angle)?;
        self.half_angle = half_angle;
        self.shadow.mark_stale();
        Ok(())
    }
}

/// A scene light of any variant
pub enum Light {
    /// Uniform fill light
    Ambient(AmbientLight),
    /// Parallel-ray light
    Directional(DirectionalLight),
    /// Omnidirectional attenuated light
    Point(PointLight),
    /// Cone light
    Spot(SpotLight),
}

impl Light {
    /// The entity whose world transform positions this light
    pub fn entity(&self) -> EntityId {
        match self {
            Self::Ambient(l) => l.entity,
            Self::Directional(l) => l.entity,
            Self::Point(l) => l.entity,
            Self::Spot(l) => l.entity,
        }
    }

    /// Whether this light's lit pass is gated by a stencil pre-pass
    pub fn uses_stencil_volume(&self) -> bool {
        matches!(self, Self::Point(_) | Self::Spot(_))
    }

    /// Whether this light currently renders a shadow map
    pub fn casts_shadows(&self) -> bool {
        match self {
            Self::Ambient(_) => false,
            Self::Directional(l) => l.shadow.is_allocated(),
            Self::Point(l) => l.shadow.is_allocated(),
            Self::Spot(l) => l.shadow.is_allocated(),
        }
    }

    /// Allocate this light's shadow buffer, the first time shadows are
    /// requested
    ///
    /// Idempotent once allocated. Ambient lights have no shadow concept and
    /// reject the request.
    pub fn enable_shadows(
        &mut self,
        device: &mut dyn GraphicsDevice,
        map_size: u32,
    ) -> RenderResult<()> {
        match self {
            Self::Ambient(_) => Err(RenderError::InvalidLightParameters(
                "ambient lights cannot cast shadows".to_string(),
            )),
            Self::Directional(l) => {
                if !l.shadow.is_allocated() {
                    l.shadow = ShadowSlot::Allocated {
                        map: DirectionalShadowMap::new(device, map_size)?,
                        stale: true,
                    };
                }
                Ok(())
            }
            Self::Point(l) => {
                if !l.shadow.is_allocated() {
                    l.shadow = ShadowSlot::Allocated {
                        map: PointShadowMap::new(device, map_size)?,
                        stale: true,
                    };
                }
                Ok(())
            }
            Self::Spot(l) => {
                if !l.shadow.is_allocated() {
                    l.shadow = ShadowSlot::Allocated {
                        map: SpotShadowMap::new(device, map_size)?,
                        stale: true,
                    };
                }
                Ok(())
            }
        }
    }

    /// Release this light's shadow buffer, if one is allocated
    ///
    /// The buffer lives in the device, not the light, so dropping a
    /// shadow-casting light without calling this leaks its depth target.
    pub fn disable_shadows(&mut self, device: &mut dyn GraphicsDevice) {
        match self {
            Self::Ambient(_) => {}
            Self::Directional(l) => l.shadow.release(device),
            Self::Point(l) => l.shadow.release(device),
            Self::Spot(l) => l.shadow.release(device),
        }
    }

    /// Mark the cached shadow projection stale (entity moved or turned)
    pub fn invalidate_shadow_projection(&mut self) {
        match self {
            Self::Ambient(_) => {}
            Self::Directional(l) => l.shadow.mark_stale(),
            Self::Point(l) => l.shadow.mark_stale(),
            Self::Spot(l) => l.shadow.mark_stale(),
        }
    }

    /// Render the shadow-caster set into this light's shadow map
    ///
    /// Refits the light-space projection first if it is stale. No-op for
    /// lights without an allocated shadow buffer.
    pub fn collect_shadows(
        &mut self,
        device: &mut dyn GraphicsDevice,
        depth_program: &ShaderProgram,
        transform: &Transform,
        casters: &[ShadowCaster],
    ) -> RenderResult<()> {
        match self {
            Self::Ambient(_) => Ok(()),
            Self::Directional(l) => {
                if let ShadowSlot::Allocated { map, stale } = &mut l.shadow {
                    if *stale {
                        let bounds = caster_world_bounds(casters);
                        map.refit(transform.forward(), &bounds);
                        *stale = false;
                    }
                    map.collect(device, depth_program, casters)?;
                }
                Ok(())
            }
            Self::Point(l) => {
                if let ShadowSlot::Allocated { map, stale } = &mut l.shadow {
                    *stale = false;
                    map.collect(device, depth_program, casters)?;
                }
                Ok(())
            }
            Self::Spot(l) => {
                if let ShadowSlot::Allocated { map, stale } = &mut l.shadow {
                    if *stale {
                        map.refit(
                            transform.position,
                            transform.forward(),
                            l.half_angle,
                            l.cutoff_radius,
                        );
                        *stale = false;
                    }
                    map.collect(device, depth_program, casters)?;
                }
                Ok(())
            }
        }
    }

    /// Bind this light's shadow map for sampling by its lit pass
    pub fn bind_shadow_textures(&self, device: &mut dyn GraphicsDevice) {
        match self {
            Self::Ambient(_) => {}
            Self::Directional(l) => {
                if let ShadowSlot::Allocated { map, .. } = &l.shadow {
                    map.bind_depth_textures(device);
                }
            }
            Self::Point(l) => {
                if let ShadowSlot::Allocated { map, .. } = &l.shadow {
                    map.bind_depth_textures(device);
                }
            }
            Self::Spot(l) => {
                if let ShadowSlot::Allocated { map, .. } = &l.shadow {
                    map.bind_depth_textures(device);
                }
            }
        }
    }

    /// Build this light's shine plan: shader variant, uniform set, and draw
    ///
    /// Pure with respect to the device; the renderer executes the plan once
    /// for the stencil pre-pass (volume lights) and once for the lit pass.
    pub fn plan(&self, transform: &Transform, ctx: &ShineContext) -> ShinePlan {
        match self {
            Self::Ambient(l) => plan::ambient(l.intensity),
            Self::Directional(l) => plan::directional(
                l.intensity,
                transform.forward(),
                shadow_projection(&l.shadow),
                ctx,
            ),
            Self::Point(l) => plan::point(
                l.intensity,
                transform.position,
                &l.attenuation,
                l.cutoff_radius,
                shadow_projection(&l.shadow),
                ctx,
            ),
            Self::Spot(l) => plan::spot(
                l.intensity,
                transform,
                &l.attenuation,
                l.half_angle,
                l.cutoff_radius,
                shadow_projection(&l.shadow),
                ctx,
            ),
        }
    }
}

fn shadow_projection<M: ShadowMap>(slot: &ShadowSlot<M>) -> Option<crate::foundation::math::Mat4> {
    match slot {
        ShadowSlot::NoBuffer => None,
        ShadowSlot::Allocated { map, .. } => Some(map.projection_matrix()),
    }
}

fn caster_world_bounds(casters: &[ShadowCaster]) -> Aabb {
    casters
        .iter()
        .map(|c| c.bounds)
        .reduce(|a, b| a.merged(&b))
        .unwrap_or(Aabb::new(
            crate::foundation::math::Vec3::from_element(-1.0),
            crate::foundation::math::Vec3::from_element(1.0),
        ))
}

/// Proxy meshes shared by every volume light
#[derive(Debug, Clone, Copy)]
pub struct VolumeMeshes {
    /// Full-screen quad in NDC
    pub quad: crate::render::api::MeshId,
    /// Unit sphere for point volumes
    pub sphere: crate::render::api::MeshId,
    /// Unit cone for spot volumes
    pub cone: crate::render::api::MeshId,
}

/// Execute a shine plan: bind the variant's program, upload its uniforms,
/// bind the G-buffer samplers, and issue the single draw call
pub fn execute_plan(
    device: &mut dyn GraphicsDevice,
    shaders: &ShaderSet,
    meshes: &VolumeMeshes,
    plan: &ShinePlan,
) -> RenderResult<()> {
    let program = shaders.get(plan.variant);
    program.bind(device);

    for (name, value) in &plan.uniforms {
        program.set(device, name, *value)?;
    }
    if let Some(mvp) = plan.volume_mvp() {
        program.set_mat4(device, "u_mvp", &mvp)?;
    }
    bind_gbuffer_samplers(device, program)?;
    if matches!(
        plan.variant,
        ShaderVariant::DirectionalShadow | ShaderVariant::PointShadow | ShaderVariant::SpotShadow
    ) {
        program.set_sampler(device, "u_shadow_map", crate::render::shadow::SHADOW_TEXTURE_UNIT)?;
    }

    match plan.draw {
        VolumeDraw::Quad => device.draw_mesh(meshes.quad),
        VolumeDraw::Sphere(_) => device.draw_mesh(meshes.sphere),
        VolumeDraw::Cone(_) => device.draw_mesh(meshes.cone),
    }
}

fn bind_gbuffer_samplers(
    device: &mut dyn GraphicsDevice,
    program: &ShaderProgram,
) -> RenderResult<()> {
    for (name, unit) in [
        ("u_position_map", 0),
        ("u_diffuse_map", 1),
        ("u_specular_map", 2),
        ("u_normal_map", 3),
    ] {
        program.set_sampler(device, name, unit)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::foundation::math::Vec3;
    use crate::render::backends::HeadlessDevice;
    use crate::scene::{SceneEntity, World};
    use approx::assert_relative_eq;

    const THRESHOLD: f32 = 1.0 / 256.0;

    fn some_entity() -> EntityId {
        World::new().spawn(SceneEntity::default())
    }

    #[test]
    fn point_light_radius_tracks_intensity_changes() {
        let att = Attenuation::new(0.0, 2.0, 0.0).unwrap();
        let mut light = PointLight::new(
            some_entity(),
            Vec4::new(1.0, 1.0, 1.0, 1.0),
            att,
            THRESHOLD,
        );
        let before = light.cutoff_radius();
        assert_relative_eq!(before, 128.0);

        light.set_intensity(Vec4::new(1.0, 1.0, 1.0, 4.0));
        assert_relative_eq!(light.cutoff_radius(), 512.0);

        light.set_intensity(Vec4::new(1.0, 1.0, 1.0, 1.0));
        assert_relative_eq!(light.cutoff_radius(), before);
    }

    #[test]
    fn set_attenuation_reads_back_and_is_idempotent() {
        let initial = Attenuation::new(1.0, 0.5, 0.1).unwrap();
        let mut light = PointLight::new(
            some_entity(),
            Vec4::new(1.0, 1.0, 1.0, 3.0),
            initial,
            THRESHOLD,
        );

        let replacement = Attenuation::new(0.5, 1.0, 0.02).unwrap();
        light.set_attenuation(replacement);
        assert_eq!(*light.attenuation(), replacement);
        let radius = light.cutoff_radius();
        assert!(radius > 0.0);

        // Re-setting the same coefficients must not perturb the cache
        light.set_attenuation(replacement);
        assert_eq!(light.cutoff_radius().to_bits(), radius.to_bits());

        light.set_attenuation(initial);
        assert_eq!(*light.attenuation(), initial);
    }

    #[test]
    fn spot_light_rejects_degenerate_half_angles() {
        let att = Attenuation::new(0.0, 1.0, 0.0).unwrap();
        for bad in [0.0, -0.3, std::f32::consts::FRAC_PI_2, f32::NAN] {
            assert!(SpotLight::new(
                some_entity(),
                Vec4::new(1.0, 1.0, 1.0, 1.0),
                att,
                bad,
                THRESHOLD,
            )
            .is_err());
        }
    }

    #[test]
    fn ambient_light_rejects_shadow_request() {
        let mut device = HeadlessDevice::new();
        let mut light = Light::Ambient(AmbientLight::new(
            some_entity(),
            Vec4::new(0.1, 0.1, 0.1, 1.0),
        ));
        assert!(light.enable_shadows(&mut device, 1024).is_err());
        assert!(!light.casts_shadows());
    }

    #[test]
    fn enabling_shadows_allocates_once_and_switches_variant() {
        let mut device = HeadlessDevice::new();
        let mut light = Light::Directional(DirectionalLight::new(
            some_entity(),
            Vec4::new(1.0, 1.0, 1.0, 1.0),
        ));
        assert!(!light.casts_shadows());

        light.enable_shadows(&mut device, 1024).unwrap();
        light.enable_shadows(&mut device, 1024).unwrap();
        assert!(light.casts_shadows());

        let ctx = ShineContext {
            view_projection: crate::foundation::math::Mat4::identity(),
            eye_position: Vec3::zeros(),
            screen_width: 640,
            screen_height: 480,
        };
        let plan = light.plan(&Transform::identity(), &ctx);
        assert_eq!(plan.variant, ShaderVariant::DirectionalShadow);
    }

    #[test]
    fn disabling_shadows_frees_the_buffer_and_reverts_the_variant() {
        let mut device = HeadlessDevice::new();
        let mut light = Light::Directional(DirectionalLight::new(
            some_entity(),
            Vec4::new(1.0, 1.0, 1.0, 1.0),
        ));
        light.enable_shadows(&mut device, 1024).unwrap();
        assert_eq!(device.texture_count(), 1);
        assert_eq!(device.framebuffer_count(), 1);

        light.disable_shadows(&mut device);
        assert!(!light.casts_shadows());
        assert_eq!(device.texture_count(), 0);
        assert_eq!(device.framebuffer_count(), 0);

        // Safe to call on a light that never had a buffer
        light.disable_shadows(&mut device);

        let ctx = ShineContext {
            view_projection: crate::foundation::math::Mat4::identity(),
            eye_position: Vec3::zeros(),
            screen_width: 640,
            screen_height: 480,
        };
        let plan = light.plan(&Transform::identity(), &ctx);
        assert_eq!(plan.variant, ShaderVariant::Directional);
    }

    #[test]
    fn volume_lights_are_stenciled_and_quad_lights_are_not() {
        let att = Attenuation::new(0.0, 1.0, 0.0).unwrap();
        let ambient = Light::Ambient(AmbientLight::new(
            some_entity(),
            Vec4::new(0.1, 0.1, 0.1, 1.0),
        ));
        let point = Light::Point(PointLight::new(
            some_entity(),
            Vec4::new(1.0, 1.0, 1.0, 1.0),
            att,
            THRESHOLD,
        ));
        assert!(!ambient.uses_stencil_volume());
        assert!(point.uses_stencil_volume());
    }
}
