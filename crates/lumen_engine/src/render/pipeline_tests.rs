//! End-to-end pipeline tests against the headless backend
//!
//! These drive the full deferred pipeline the way an application would and
//! assert on the device's recorded draws, clears, and blits. The shader
//! sources are the real GLSL files shipped with the crate, so uniform
//! resolution here matches what a live driver would report.

use std::path::PathBuf;

use approx::assert_relative_eq;

use crate::core::config::RendererConfig;
use crate::foundation::math::{Aabb, Transform, Vec3, Vec4};
use crate::render::api::{BlendMode, ClearMask, CompareFunc, CullMode, MeshId, StencilOp, UniformValue};
use crate::render::backends::{DrawRecord, HeadlessDevice};
use crate::render::gbuffer::LIT_SLOT;
use crate::render::lighting::{
    AmbientLight, Attenuation, DirectionalLight, Light, PointLight, SpotLight,
};
use crate::render::mesh::Mesh;
use crate::render::renderer::{DeferredRenderer, FramePhase};
use crate::render::shader::{ShaderSet, ShaderVariant};
use crate::render::{Camera, RenderError};
use crate::scene::{Drawable, FrameSubmission, Material, SceneEntity, World};

const THRESHOLD: f32 = 1.0 / 256.0;

fn shader_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("shaders")
}

fn test_config() -> RendererConfig {
    RendererConfig {
        clear_color: [0.2, 0.3, 0.4, 1.0],
        shader_dir: shader_dir(),
        ..RendererConfig::default()
    }
}

struct Rig {
    renderer: DeferredRenderer,
    world: World,
    /// Program ids per variant, captured before the set moved into the renderer
    program_ids: Vec<(ShaderVariant, crate::render::api::ProgramId)>,
}

impl Rig {
    fn new() -> Self {
        crate::foundation::logging::try_init();
        let mut device = Box::new(HeadlessDevice::new());
        let config = test_config();
        let shaders = ShaderSet::load(device.as_mut(), &config.shader_dir).unwrap();
        let program_ids = [
            ShaderVariant::Geometry,
            ShaderVariant::Ambient,
            ShaderVariant::Directional,
            ShaderVariant::DirectionalShadow,
            ShaderVariant::Point,
            ShaderVariant::Spot,
            ShaderVariant::ShadowDepth,
            ShaderVariant::Stencil,
        ]
        .into_iter()
        .map(|v| (v, shaders.get(v).id()))
        .collect();

        let camera = Camera::perspective(Vec3::new(0.0, 2.0, 8.0), 60.0, 800.0 / 600.0, 0.1, 500.0);
        let renderer = DeferredRenderer::new(device, shaders, camera, &config).unwrap();
        Self {
            renderer,
            world: World::new(),
            program_ids,
        }
    }

    fn program_id(&self, variant: ShaderVariant) -> crate::render::api::ProgramId {
        self.program_ids
            .iter()
            .find(|(v, _)| *v == variant)
            .map(|(_, id)| *id)
            .unwrap()
    }

    fn device(&self) -> &HeadlessDevice {
        self.renderer
            .device()
            .as_any()
            .downcast_ref::<HeadlessDevice>()
            .unwrap()
    }

    fn spawn_at(&mut self, position: Vec3) -> crate::scene::EntityId {
        self.world.spawn(SceneEntity {
            transform: Transform::from_position(position),
            bounds: Some(Aabb::new(Vec3::from_element(-1.0), Vec3::from_element(1.0))),
        })
    }

    fn upload_cube(&mut self) -> MeshId {
        // A sphere serves fine as stand-in geometry for a drawable
        let mesh = Mesh::unit_sphere(6, 4);
        self.renderer
            .device_mut()
            .create_mesh("test_geometry", &mesh.vertices, &mesh.indices)
            .unwrap()
    }

    fn draws_with_program(&self, variant: ShaderVariant) -> Vec<DrawRecord> {
        let id = self.program_id(variant);
        self.device()
            .draws()
            .iter()
            .filter(|d| d.program == Some(id))
            .cloned()
            .collect()
    }
}

// Scenario: a frame with zero geometry and zero lights presents the clear
// color, not stale or uninitialized target contents.
#[test]
fn empty_frame_presents_the_clear_color() {
    let mut rig = Rig::new();

    rig.renderer.begin_geometry_pass().unwrap();
    rig.renderer.begin_post_processing().unwrap();
    let stats = rig.renderer.end_frame().unwrap();

    assert_eq!(stats.draw_calls, 0);
    assert_eq!(stats.lights_shaded, 0);

    let device = rig.device();
    // Geometry clear wrote the clear color into the attribute targets
    let geometry_clear = device
        .clears()
        .iter()
        .find(|c| c.mask.contains(ClearMask::COLOR | ClearMask::DEPTH))
        .expect("geometry clear missing");
    assert_eq!(geometry_clear.color, [0.2, 0.3, 0.4, 1.0]);

    // The lit target was cleared to the same color before presentation
    let lit_clear = device
        .clears()
        .iter()
        .find(|c| c.draw_buffers == [LIT_SLOT])
        .expect("lit-target clear missing");
    assert_eq!(lit_clear.color, [0.2, 0.3, 0.4, 1.0]);

    // And presentation blitted the lit slot at the full viewport
    let blit = device.blits().last().expect("no blit recorded");
    assert_eq!(blit.slot, LIT_SLOT);
    assert_eq!((blit.width, blit.height), (800, 600));
}

// Scenario: an unshadowed directional light of intensity (1,1,1,1) shades
// every pixel once, additively, with no stencil gating.
#[test]
fn directional_light_shades_the_whole_screen() {
    let mut rig = Rig::new();
    let entity = rig.spawn_at(Vec3::zeros());
    let mut light = Light::Directional(DirectionalLight::new(
        entity,
        Vec4::new(1.0, 1.0, 1.0, 1.0),
    ));

    let world = std::mem::take(&mut rig.world);
    rig.renderer.begin_geometry_pass().unwrap();
    rig.renderer.shine(&world, &mut light).unwrap();
    rig.renderer.begin_post_processing().unwrap();
    rig.renderer.end_frame().unwrap();

    let draws = rig.draws_with_program(ShaderVariant::Directional);
    assert_eq!(draws.len(), 1);
    let draw = &draws[0];
    assert_eq!(draw.draw_buffers, [LIT_SLOT]);
    assert_eq!(draw.blend, BlendMode::Additive);
    assert!(!draw.stencil.enabled);
    assert_eq!(
        draw.uniforms.get("u_light_color"),
        Some(&UniformValue::Vec4(Vec4::new(1.0, 1.0, 1.0, 1.0)))
    );
}

// A point light's lit pass is preceded by a stencil-only volume pass and
// then gated on non-zero stencil with front-face culling.
#[test]
fn point_light_is_stencil_culled_to_its_volume() {
    let mut rig = Rig::new();
    let entity = rig.spawn_at(Vec3::new(0.0, 1.0, 0.0));
    let attenuation = Attenuation::new(1.0, 0.7, 1.8).unwrap();
    let mut light = Light::Point(PointLight::new(
        entity,
        Vec4::new(1.0, 0.5, 0.2, 2.0),
        attenuation,
        THRESHOLD,
    ));

    rig.renderer.begin_geometry_pass().unwrap();
    let world = std::mem::take(&mut rig.world);
    rig.renderer.shine(&world, &mut light).unwrap();
    rig.renderer.begin_post_processing().unwrap();
    let stats = rig.renderer.end_frame().unwrap();
    assert_eq!(stats.stencil_passes, 1);

    let stencil_draws = rig.draws_with_program(ShaderVariant::Stencil);
    assert_eq!(stencil_draws.len(), 1);
    let pre = &stencil_draws[0];
    assert!(pre.draw_buffers.is_empty());
    assert!(pre.stencil.enabled);
    assert_eq!(pre.stencil.front.depth_fail, StencilOp::IncrementWrap);
    assert_eq!(pre.stencil.back.depth_fail, StencilOp::DecrementWrap);
    assert_eq!(pre.cull, CullMode::None);
    assert!(!pre.depth.write);

    let lit_draws = rig.draws_with_program(ShaderVariant::Point);
    assert_eq!(lit_draws.len(), 1);
    let lit = &lit_draws[0];
    assert_eq!(lit.draw_buffers, [LIT_SLOT]);
    assert!(lit.stencil.enabled);
    assert_eq!(lit.stencil.front.func, CompareFunc::NotEqual);
    assert_eq!(lit.blend, BlendMode::Additive);
    assert_eq!(lit.cull, CullMode::Front);
    assert_eq!(
        lit.uniforms.get("u_attenuation"),
        Some(&UniformValue::Vec3(Vec3::new(1.0, 0.7, 1.8)))
    );
}

// Spot cutoff radius: the bounding cone's far cap must sit exactly where
// the attenuated intensity crosses the threshold.
#[test]
fn spot_cutoff_radius_brackets_the_threshold_crossing() {
    let mut world = World::new();
    let entity = world.spawn(SceneEntity::default());
    let attenuation = Attenuation::new(1.0, 0.0, 0.01).unwrap();
    let brightness = 10.0;
    let light = SpotLight::new(
        entity,
        Vec4::new(1.0, 1.0, 1.0, brightness),
        attenuation,
        30.0_f32.to_radians(),
        THRESHOLD,
    )
    .unwrap();

    let radius = light.cutoff_radius();
    assert!(radius > 0.0);

    let intensity_at = |r: f32| brightness / attenuation.denominator_at(r);
    // Just inside the cap the light is still above threshold, just outside
    // it has fallen below.
    assert!(intensity_at(radius * 0.999) > THRESHOLD);
    assert!(intensity_at(radius * 1.001) < THRESHOLD);
    assert_relative_eq!(intensity_at(radius), THRESHOLD, epsilon = 1e-5);
}

// Out-of-order phase calls fail loudly instead of issuing wrong GPU state.
#[test]
fn phase_machine_rejects_out_of_order_calls() {
    let mut rig = Rig::new();
    let entity = rig.spawn_at(Vec3::zeros());
    let mut light = Light::Ambient(AmbientLight::new(entity, Vec4::new(0.1, 0.1, 0.1, 1.0)));
    let world = std::mem::take(&mut rig.world);

    // Shading before the geometry pass is illegal
    assert!(matches!(
        rig.renderer.shine(&world, &mut light),
        Err(RenderError::PhaseOrder { from: FramePhase::Idle, .. })
    ));

    // So is closing a frame that was never opened
    assert!(matches!(
        rig.renderer.end_frame(),
        Err(RenderError::PhaseOrder { .. })
    ));

    rig.renderer.begin_geometry_pass().unwrap();
    // Opening the geometry pass twice is illegal
    assert!(matches!(
        rig.renderer.begin_geometry_pass(),
        Err(RenderError::PhaseOrder {
            from: FramePhase::Geometry,
            to: FramePhase::Geometry,
        })
    ));

    // The legal remainder of the frame still completes
    rig.renderer.shine(&world, &mut light).unwrap();
    rig.renderer.begin_post_processing().unwrap();
    rig.renderer.end_frame().unwrap();
    assert_eq!(rig.renderer.phase(), FramePhase::Idle);
}

// A shadow-enabled directional light renders casters depth-only and its
// lit pass switches to the shadow-sampling shader variant.
#[test]
fn shadowed_directional_light_collects_and_samples_the_map() {
    let mut rig = Rig::new();
    let mesh = rig.upload_cube();
    let caster_entity = rig.spawn_at(Vec3::new(0.0, 1.0, 0.0));
    let light_entity = rig.spawn_at(Vec3::new(0.0, 10.0, 0.0));

    let mut light = Light::Directional(DirectionalLight::new(
        light_entity,
        Vec4::new(1.0, 1.0, 1.0, 1.0),
    ));
    rig.renderer.enable_light_shadows(&mut light).unwrap();
    assert!(light.casts_shadows());

    let drawables = vec![Drawable {
        entity: caster_entity,
        mesh,
        material: Material::default(),
        casts_shadow: true,
    }];

    let world = std::mem::take(&mut rig.world);
    rig.renderer.begin_geometry_pass().unwrap();
    rig.renderer.draw_geometry(&world, &drawables).unwrap();
    rig.renderer
        .collect_shadows(&world, std::slice::from_mut(&mut light), &drawables)
        .unwrap();
    rig.renderer.shine(&world, &mut light).unwrap();
    rig.renderer.begin_post_processing().unwrap();
    let stats = rig.renderer.end_frame().unwrap();
    assert_eq!(stats.shadow_casters, 1);

    // Depth-only collection: no color draw buffers, depth writes on
    let depth_draws = rig.draws_with_program(ShaderVariant::ShadowDepth);
    assert_eq!(depth_draws.len(), 1);
    assert!(depth_draws[0].draw_buffers.is_empty());
    assert!(depth_draws[0].depth.write);
    assert!(depth_draws[0].uniforms.contains_key("u_light_mvp"));

    // The lit pass used the shadow variant and bound the map at its unit
    let lit_draws = rig.draws_with_program(ShaderVariant::DirectionalShadow);
    assert_eq!(lit_draws.len(), 1);
    assert!(lit_draws[0].uniforms.contains_key("u_light_view_projection"));
    assert_eq!(
        lit_draws[0].uniforms.get("u_shadow_map"),
        Some(&UniformValue::Sampler(crate::render::shadow::SHADOW_TEXTURE_UNIT))
    );
}

// A light's depth target lives in the device and is reclaimed when the
// renderer releases it on the light's behalf.
#[test]
fn disabling_light_shadows_reclaims_the_depth_target() {
    let mut rig = Rig::new();
    let light_entity = rig.spawn_at(Vec3::new(0.0, 10.0, 0.0));
    let mut light = Light::Directional(DirectionalLight::new(
        light_entity,
        Vec4::new(1.0, 1.0, 1.0, 1.0),
    ));

    let textures_before = rig.device().texture_count();
    let framebuffers_before = rig.device().framebuffer_count();

    rig.renderer.enable_light_shadows(&mut light).unwrap();
    assert_eq!(rig.device().texture_count(), textures_before + 1);
    assert_eq!(rig.device().framebuffer_count(), framebuffers_before + 1);

    rig.renderer.disable_light_shadows(&mut light);
    assert!(!light.casts_shadows());
    assert_eq!(rig.device().texture_count(), textures_before);
    assert_eq!(rig.device().framebuffer_count(), framebuffers_before);
}

// Geometry draws consult the matrix pipeline per drawable and upload the
// material's G-buffer inputs.
#[test]
fn geometry_pass_uploads_per_drawable_matrices_and_material() {
    let mut rig = Rig::new();
    let mesh = rig.upload_cube();
    let near = rig.spawn_at(Vec3::new(-2.0, 0.0, 0.0));
    let far = rig.spawn_at(Vec3::new(5.0, 0.0, -10.0));
    let world = std::mem::take(&mut rig.world);

    let drawables = vec![
        Drawable {
            entity: near,
            mesh,
            material: Material {
                diffuse: Vec4::new(1.0, 0.0, 0.0, 1.0),
                ..Material::default()
            },
            casts_shadow: false,
        },
        Drawable {
            entity: far,
            mesh,
            material: Material::default(),
            casts_shadow: false,
        },
    ];

    rig.renderer.begin_geometry_pass().unwrap();
    rig.renderer.draw_geometry(&world, &drawables).unwrap();

    let draws = rig.draws_with_program(ShaderVariant::Geometry);
    assert_eq!(draws.len(), 2);
    assert_eq!(
        draws[0].uniforms.get("u_diffuse_color"),
        Some(&UniformValue::Vec4(Vec4::new(1.0, 0.0, 0.0, 1.0)))
    );
    // Different entities, different MVPs
    let mvp = |d: &DrawRecord| match d.uniforms.get("u_mvp") {
        Some(UniformValue::Mat4(m)) => *m,
        other => panic!("u_mvp missing or mistyped: {other:?}"),
    };
    assert_ne!(mvp(&draws[0]), mvp(&draws[1]));
}

// The one-call orchestration runs the whole contract: swap, geometry,
// shadows, lights, post-processing, present.
#[test]
fn render_frame_runs_the_full_contract() {
    let mut rig = Rig::new();
    let mesh = rig.upload_cube();
    let geometry_entity = rig.spawn_at(Vec3::zeros());
    let ambient_entity = rig.spawn_at(Vec3::zeros());
    let point_entity = rig.spawn_at(Vec3::new(3.0, 2.0, 0.0));
    let world = std::mem::take(&mut rig.world);

    let mut submission = FrameSubmission::new();
    submission.submit(vec![Drawable {
        entity: geometry_entity,
        mesh,
        material: Material::default(),
        casts_shadow: false,
    }]);

    let attenuation = Attenuation::new(1.0, 0.35, 0.44).unwrap();
    let mut lights = vec![
        Light::Ambient(AmbientLight::new(
            ambient_entity,
            Vec4::new(0.1, 0.1, 0.1, 1.0),
        )),
        Light::Point(PointLight::new(
            point_entity,
            Vec4::new(1.0, 0.9, 0.8, 3.0),
            attenuation,
            THRESHOLD,
        )),
    ];

    let stats = rig
        .renderer
        .render_frame(&world, &mut submission, &mut lights)
        .unwrap();

    assert_eq!(rig.renderer.phase(), FramePhase::Idle);
    assert_eq!(stats.lights_shaded, 2);
    assert_eq!(stats.stencil_passes, 1);
    // 1 geometry draw + 1 stencil draw + 2 lit draws
    assert_eq!(stats.draw_calls, 4);
    assert_eq!(rig.device().blits().len(), 1);

    // A second frame starts clean
    let stats2 = rig
        .renderer
        .render_frame(&world, &mut submission, &mut lights)
        .unwrap();
    assert_eq!(stats2.lights_shaded, 2);
}

// Resizing rebuilds the G-buffer storage and keeps the next frame valid.
#[test]
fn resize_survives_a_round_trip_and_keeps_rendering() {
    let mut rig = Rig::new();
    rig.renderer.resize(1920, 1080).unwrap();
    rig.renderer.resize(800, 600).unwrap();
    assert_relative_eq!(rig.renderer.camera().aspect, 800.0 / 600.0);

    rig.renderer.begin_geometry_pass().unwrap();
    rig.renderer.begin_post_processing().unwrap();
    rig.renderer.end_frame().unwrap();

    let blit = rig.device().blits().last().unwrap();
    assert_eq!((blit.width, blit.height), (800, 600));
}

// close() is a request, not an interrupt: the frame in flight completes.
#[test]
fn close_request_does_not_interrupt_the_frame() {
    let mut rig = Rig::new();
    assert!(!rig.renderer.should_close());

    rig.renderer.begin_geometry_pass().unwrap();
    rig.renderer.close();
    assert!(rig.renderer.should_close());

    rig.renderer.begin_post_processing().unwrap();
    rig.renderer.end_frame().unwrap();
    assert_eq!(rig.renderer.phase(), FramePhase::Idle);
}
