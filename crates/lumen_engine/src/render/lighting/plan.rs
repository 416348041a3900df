//! Pure per-variant shine planning
//!
//! Each planner turns light parameters plus the owning entity's transform
//! into a [`ShinePlan`]: the shader variant to bind, the uniform values to
//! upload, and the single draw to issue. No device handle is involved, so
//! every variant's uniform set is directly assertable in tests.

use crate::foundation::math::{Mat4, Transform, Vec2, Vec3, Vec4};
use crate::render::api::UniformValue;
use crate::render::mesh::{point_volume_transform, spot_volume_transform};
use crate::render::shader::ShaderVariant;

/// Per-frame values shared by every light's plan
#[derive(Debug, Clone, Copy)]
pub struct ShineContext {
    /// Camera view-projection matrix, for proxy-volume placement
    pub view_projection: Mat4,
    /// Camera world position, for specular terms
    pub eye_position: Vec3,
    /// Lit-target width in pixels
    pub screen_width: u32,
    /// Lit-target height in pixels
    pub screen_height: u32,
}

/// The geometry a light's passes rasterize
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum VolumeDraw {
    /// Full-screen quad, no transform
    Quad,
    /// Unit sphere scaled to the cutoff radius; carries the proxy MVP
    Sphere(Mat4),
    /// Unit cone scaled to the cutoff cone; carries the proxy MVP
    Cone(Mat4),
}

/// Everything one light needs rendered, minus the device
pub struct ShinePlan {
    /// Shader variant for the lit pass
    pub variant: ShaderVariant,
    /// Uniform values the lit pass uploads
    pub uniforms: Vec<(&'static str, UniformValue)>,
    /// Proxy geometry shared by the stencil pre-pass and the lit pass
    pub draw: VolumeDraw,
}

impl ShinePlan {
    /// Proxy MVP for the stencil pre-pass, if this plan uses a volume
    pub fn volume_mvp(&self) -> Option<Mat4> {
        match self.draw {
            VolumeDraw::Quad => None,
            VolumeDraw::Sphere(mvp) | VolumeDraw::Cone(mvp) => Some(mvp),
        }
    }
}

pub(super) fn ambient(intensity: Vec4) -> ShinePlan {
    ShinePlan {
        variant: ShaderVariant::Ambient,
        uniforms: vec![("u_light_color", UniformValue::Vec4(intensity))],
        draw: VolumeDraw::Quad,
    }
}

pub(super) fn directional(
    intensity: Vec4,
    direction: Vec3,
    shadow_projection: Option<Mat4>,
    ctx: &ShineContext,
) -> ShinePlan {
    let mut uniforms = vec![
        ("u_eye_position", UniformValue::Vec3(ctx.eye_position)),
        ("u_light_color", UniformValue::Vec4(intensity)),
        ("u_light_direction", UniformValue::Vec3(direction)),
    ];
    let variant = match shadow_projection {
        Some(vp) => {
            uniforms.push(("u_light_view_projection", UniformValue::Mat4(vp)));
            ShaderVariant::DirectionalShadow
        }
        None => ShaderVariant::Directional,
    };
    ShinePlan {
        variant,
        uniforms,
        draw: VolumeDraw::Quad,
    }
}

pub(super) fn point(
    intensity: Vec4,
    position: Vec3,
    attenuation: &super::Attenuation,
    cutoff_radius: f32,
    shadow_projection: Option<Mat4>,
    ctx: &ShineContext,
) -> ShinePlan {
    let mut uniforms = volume_uniforms(intensity, position, attenuation, ctx);
    let variant = match shadow_projection {
        Some(vp) => {
            uniforms.push(("u_light_view_projection", UniformValue::Mat4(vp)));
            ShaderVariant::PointShadow
        }
        None => ShaderVariant::Point,
    };
    let model = point_volume_transform(position, cutoff_radius);
    ShinePlan {
        variant,
        uniforms,
        draw: VolumeDraw::Sphere(ctx.view_projection * model),
    }
}

pub(super) fn spot(
    intensity: Vec4,
    transform: &Transform,
    attenuation: &super::Attenuation,
    half_angle: f32,
    cutoff_radius: f32,
    shadow_projection: Option<Mat4>,
    ctx: &ShineContext,
) -> ShinePlan {
    let mut uniforms = volume_uniforms(intensity, transform.position, attenuation, ctx);
    uniforms.push(("u_spot_direction", UniformValue::Vec3(transform.forward())));
    uniforms.push((
        "u_spot_cutoff_cos",
        UniformValue::Float(half_angle.cos()),
    ));
    let variant = match shadow_projection {
        Some(vp) => {
            uniforms.push(("u_light_view_projection", UniformValue::Mat4(vp)));
            ShaderVariant::SpotShadow
        }
        None => ShaderVariant::Spot,
    };
    let model = spot_volume_transform(&transform.matrix(), cutoff_radius, half_angle);
    ShinePlan {
        variant,
        uniforms,
        draw: VolumeDraw::Cone(ctx.view_projection * model),
    }
}

fn volume_uniforms(
    intensity: Vec4,
    position: Vec3,
    attenuation: &super::Attenuation,
    ctx: &ShineContext,
) -> Vec<(&'static str, UniformValue)> {
    vec![
        (
            "u_screen_size",
            UniformValue::Vec2(Vec2::new(ctx.screen_width as f32, ctx.screen_height as f32)),
        ),
        ("u_eye_position", UniformValue::Vec3(ctx.eye_position)),
        ("u_light_color", UniformValue::Vec4(intensity)),
        ("u_light_position", UniformValue::Vec3(position)),
        (
            "u_attenuation",
            UniformValue::Vec3(Vec3::new(
                attenuation.constant,
                attenuation.linear,
                attenuation.quadratic,
            )),
        ),
    ]
}
