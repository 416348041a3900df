//! Shader program abstraction
//!
//! A [`ShaderProgram`] owns one compiled GPU program and the table of named
//! uniform slots it declares, resolved once at construction. Setters are
//! typed and fail fast with [`RenderError::UniformNotFound`] when asked for
//! a name the program does not declare — a shader/engine mismatch is a
//! programming error, and silently ignoring it corrupts the output.
//!
//! [`ShaderSet`] owns one program instance per pipeline variant and is
//! constructed by the application and handed to the renderer, which gives a
//! single place for init/teardown ordering instead of process-wide shader
//! singletons.

use std::collections::HashMap;
use std::path::Path;

use crate::core::config::ShaderConfig;
use crate::foundation::math::{Mat4, Vec3, Vec4};
use crate::render::api::{GraphicsDevice, ProgramId, UniformLocation, UniformValue};
use crate::render::{RenderError, RenderResult};

/// The shader variants the deferred pipeline dispatches between
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShaderVariant {
    /// Geometry pass: writes position/diffuse/specular/normal attributes
    Geometry,
    /// Ambient light over a full-screen quad
    Ambient,
    /// Directional light over a full-screen quad
    Directional,
    /// Directional light sampling a shadow map
    DirectionalShadow,
    /// Point light over a sphere volume
    Point,
    /// Point light sampling a shadow map
    PointShadow,
    /// Spot light over a cone volume
    Spot,
    /// Spot light sampling a shadow map
    SpotShadow,
    /// Depth-only pass rendering shadow casters from the light
    ShadowDepth,
    /// Null program for the stencil pre-pass (position only, no color)
    Stencil,
}

impl ShaderVariant {
    /// Every pipeline variant, in compile order
    pub const ALL: [Self; 10] = [
        Self::Geometry,
        Self::Ambient,
        Self::Directional,
        Self::DirectionalShadow,
        Self::Point,
        Self::PointShadow,
        Self::Spot,
        Self::SpotShadow,
        Self::ShadowDepth,
        Self::Stencil,
    ];

    /// Conventional stage sources for this variant under a shader directory
    pub fn sources(self, shader_dir: &Path) -> ShaderConfig {
        let (vertex, fragment) = match self {
            Self::Geometry => ("geometry.vert", "geometry.frag"),
            Self::Ambient => ("quad.vert", "light_ambient.frag"),
            Self::Directional => ("quad.vert", "light_directional.frag"),
            Self::DirectionalShadow => ("quad.vert", "light_directional_shadow.frag"),
            Self::Point => ("volume.vert", "light_point.frag"),
            Self::PointShadow => ("volume.vert", "light_point_shadow.frag"),
            Self::Spot => ("volume.vert", "light_spot.frag"),
            Self::SpotShadow => ("volume.vert", "light_spot_shadow.frag"),
            Self::ShadowDepth => ("shadow_depth.vert", "shadow_depth.frag"),
            Self::Stencil => ("volume.vert", "null.frag"),
        };
        ShaderConfig::pair(shader_dir.join(vertex), shader_dir.join(fragment))
    }
}

/// A compiled GPU program with its named uniform slots resolved
pub struct ShaderProgram {
    label: String,
    program: ProgramId,
    uniforms: HashMap<String, UniformLocation>,
}

impl ShaderProgram {
    /// Compile and link a program, resolving every declared uniform
    pub fn new(
        device: &mut dyn GraphicsDevice,
        label: &str,
        stages: &ShaderConfig,
    ) -> RenderResult<Self> {
        let program = device.compile_program(label, stages)?;

        let mut uniforms = HashMap::new();
        for name in device.program_uniforms(program)? {
            if let Some(location) = device.uniform_location(program, &name) {
                uniforms.insert(name, location);
            }
        }

        log::debug!(
            "program '{}' linked with {} uniform(s)",
            label,
            uniforms.len()
        );
        Ok(Self {
            label: label.to_string(),
            program,
            uniforms,
        })
    }

    /// The backend handle for this program
    pub fn id(&self) -> ProgramId {
        self.program
    }

    /// The program's label (used in error messages)
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Whether the program declares the given uniform
    pub fn has_uniform(&self, name: &str) -> bool {
        self.uniforms.contains_key(name)
    }

    /// Make this program current on the device
    pub fn bind(&self, device: &mut dyn GraphicsDevice) {
        device.use_program(self.program);
    }

    fn location(&self, name: &str) -> RenderResult<UniformLocation> {
        self.uniforms
            .get(name)
            .copied()
            .ok_or_else(|| RenderError::UniformNotFound {
                program: self.label.clone(),
                name: name.to_string(),
            })
    }

    /// Assign any uniform value by name
    pub fn set(
        &self,
        device: &mut dyn GraphicsDevice,
        name: &str,
        value: UniformValue,
    ) -> RenderResult<()> {
        let location = self.location(name)?;
        device.set_uniform(self.program, location, value);
        Ok(())
    }

    /// Assign a float uniform
    pub fn set_f32(&self, device: &mut dyn GraphicsDevice, name: &str, v: f32) -> RenderResult<()> {
        self.set(device, name, UniformValue::Float(v))
    }

    /// Assign a vec3 uniform
    pub fn set_vec3(
        &self,
        device: &mut dyn GraphicsDevice,
        name: &str,
        v: Vec3,
    ) -> RenderResult<()> {
        self.set(device, name, UniformValue::Vec3(v))
    }

    /// Assign a vec4 uniform
    pub fn set_vec4(
        &self,
        device: &mut dyn GraphicsDevice,
        name: &str,
        v: Vec4,
    ) -> RenderResult<()> {
        self.set(device, name, UniformValue::Vec4(v))
    }

    /// Assign a mat4 uniform
    pub fn set_mat4(
        &self,
        device: &mut dyn GraphicsDevice,
        name: &str,
        v: &Mat4,
    ) -> RenderResult<()> {
        self.set(device, name, UniformValue::Mat4(*v))
    }

    /// Bind a sampler uniform to a texture unit
    pub fn set_sampler(
        &self,
        device: &mut dyn GraphicsDevice,
        name: &str,
        unit: u32,
    ) -> RenderResult<()> {
        self.set(device, name, UniformValue::Sampler(unit))
    }
}

/// The full set of pipeline shader programs, one instance per variant
///
/// Built once at startup and injected into the renderer's constructor.
pub struct ShaderSet {
    geometry: ShaderProgram,
    ambient: ShaderProgram,
    directional: ShaderProgram,
    directional_shadow: ShaderProgram,
    point: ShaderProgram,
    point_shadow: ShaderProgram,
    spot: ShaderProgram,
    spot_shadow: ShaderProgram,
    shadow_depth: ShaderProgram,
    stencil: ShaderProgram,
}

impl ShaderSet {
    /// Compile every pipeline variant from sources under `shader_dir`
    pub fn load(device: &mut dyn GraphicsDevice, shader_dir: &Path) -> RenderResult<Self> {
        let compile = |device: &mut dyn GraphicsDevice, variant: ShaderVariant, label: &str| {
            ShaderProgram::new(device, label, &variant.sources(shader_dir))
        };

        log::info!("loading pipeline shaders from {}", shader_dir.display());
        Ok(Self {
            geometry: compile(device, ShaderVariant::Geometry, "geometry")?,
            ambient: compile(device, ShaderVariant::Ambient, "light_ambient")?,
            directional: compile(device, ShaderVariant::Directional, "light_directional")?,
            directional_shadow: compile(
                device,
                ShaderVariant::DirectionalShadow,
                "light_directional_shadow",
            )?,
            point: compile(device, ShaderVariant::Point, "light_point")?,
            point_shadow: compile(device, ShaderVariant::PointShadow, "light_point_shadow")?,
            spot: compile(device, ShaderVariant::Spot, "light_spot")?,
            spot_shadow: compile(device, ShaderVariant::SpotShadow, "light_spot_shadow")?,
            shadow_depth: compile(device, ShaderVariant::ShadowDepth, "shadow_depth")?,
            stencil: compile(device, ShaderVariant::Stencil, "stencil_null")?,
        })
    }

    /// The program for a given variant
    pub fn get(&self, variant: ShaderVariant) -> &ShaderProgram {
        match variant {
            ShaderVariant::Geometry => &self.geometry,
            ShaderVariant::Ambient => &self.ambient,
            ShaderVariant::Directional => &self.directional,
            ShaderVariant::DirectionalShadow => &self.directional_shadow,
            ShaderVariant::Point => &self.point,
            ShaderVariant::PointShadow => &self.point_shadow,
            ShaderVariant::Spot => &self.spot,
            ShaderVariant::SpotShadow => &self.spot_shadow,
            ShaderVariant::ShadowDepth => &self.shadow_depth,
            ShaderVariant::Stencil => &self.stencil,
        }
    }

    /// Destroy every program in the set
    ///
    /// Called by the renderer on teardown; the set must not be used
    /// afterwards.
    pub fn release(&self, device: &mut dyn GraphicsDevice) {
        for variant in ShaderVariant::ALL {
            device.destroy_program(self.get(variant).id());
        }
    }
}
