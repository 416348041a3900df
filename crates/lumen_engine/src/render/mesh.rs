//! Mesh data and procedural light-volume geometry
//!
//! The deferred pipeline needs three pieces of proxy geometry it cannot get
//! from the asset importer: a full-screen quad for ambient/directional
//! lights, a unit sphere for point-light volumes, and a unit cone for
//! spot-light volumes. The unit meshes are scaled per light by its cutoff
//! radius at draw time, so one instance of each serves every light.

use bytemuck::{Pod, Zeroable};

use crate::foundation::math::{Mat4, Vec3};

/// A single mesh vertex
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct Vertex {
    /// Object-space position
    pub position: [f32; 3],
    /// Object-space normal
    pub normal: [f32; 3],
    /// Texture coordinates
    pub uv: [f32; 2],
}

impl Vertex {
    /// Create a vertex from a position with a zero normal and UV
    pub fn from_position(position: Vec3) -> Self {
        Self {
            position: [position.x, position.y, position.z],
            normal: [0.0; 3],
            uv: [0.0; 2],
        }
    }
}

/// CPU-side indexed mesh data
#[derive(Debug, Clone, PartialEq)]
pub struct Mesh {
    /// Vertex data
    pub vertices: Vec<Vertex>,
    /// Triangle indices
    pub indices: Vec<u32>,
}

impl Mesh {
    /// Number of triangles in this mesh
    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }

    /// Full-screen quad in normalized device coordinates
    ///
    /// Two triangles spanning [-1, 1] in X and Y at Z = 0, with UVs mapping
    /// the G-buffer targets across the whole screen.
    pub fn full_screen_quad() -> Self {
        let vertices = vec![
            Vertex { position: [-1.0, -1.0, 0.0], normal: [0.0, 0.0, 1.0], uv: [0.0, 0.0] },
            Vertex { position: [1.0, -1.0, 0.0], normal: [0.0, 0.0, 1.0], uv: [1.0, 0.0] },
            Vertex { position: [1.0, 1.0, 0.0], normal: [0.0, 0.0, 1.0], uv: [1.0, 1.0] },
            Vertex { position: [-1.0, 1.0, 0.0], normal: [0.0, 0.0, 1.0], uv: [0.0, 1.0] },
        ];
        let indices = vec![0, 1, 2, 2, 3, 0];
        Self { vertices, indices }
    }

    /// Unit UV-sphere centered at the origin with radius 1
    ///
    /// `segments` is the longitudinal resolution, `rings` the latitudinal.
    /// Light volumes do not need to be smooth, they only need to enclose the
    /// cutoff radius, so callers typically keep the resolution low.
    pub fn unit_sphere(segments: u32, rings: u32) -> Self {
        let segments = segments.max(3);
        let rings = rings.max(2);
        let mut vertices = Vec::new();
        let mut indices = Vec::new();

        for ring in 0..=rings {
            let phi = std::f32::consts::PI * ring as f32 / rings as f32;
            let (sin_phi, cos_phi) = phi.sin_cos();
            for segment in 0..=segments {
                let theta = std::f32::consts::TAU * segment as f32 / segments as f32;
                let (sin_theta, cos_theta) = theta.sin_cos();
                let position = [sin_phi * cos_theta, cos_phi, sin_phi * sin_theta];
                vertices.push(Vertex {
                    position,
                    normal: position,
                    uv: [
                        segment as f32 / segments as f32,
                        ring as f32 / rings as f32,
                    ],
                });
            }
        }

        let stride = segments + 1;
        for ring in 0..rings {
            for segment in 0..segments {
                let a = ring * stride + segment;
                let b = a + stride;
                indices.extend_from_slice(&[a, b, a + 1, a + 1, b, b + 1]);
            }
        }

        Self { vertices, indices }
    }

    /// Unit cone with its apex at the origin, opening along -Z
    ///
    /// The base is a circle of radius 1 at Z = -1, capped so the volume is
    /// closed for stencil counting. Scaled at draw time so the slant
    /// encloses a spot light's cutoff cone.
    pub fn unit_cone(segments: u32) -> Self {
        let segments = segments.max(3);
        let mut vertices = vec![Vertex {
            position: [0.0, 0.0, 0.0],
            normal: [0.0, 0.0, 1.0],
            uv: [0.5, 0.5],
        }];
        // Base center for the cap
        vertices.push(Vertex {
            position: [0.0, 0.0, -1.0],
            normal: [0.0, 0.0, -1.0],
            uv: [0.5, 0.5],
        });

        for segment in 0..=segments {
            let theta = std::f32::consts::TAU * segment as f32 / segments as f32;
            let (sin_theta, cos_theta) = theta.sin_cos();
            vertices.push(Vertex {
                position: [cos_theta, sin_theta, -1.0],
                normal: [cos_theta, sin_theta, 0.0],
                uv: [cos_theta * 0.5 + 0.5, sin_theta * 0.5 + 0.5],
            });
        }

        let mut indices = Vec::new();
        for segment in 0..segments {
            let rim = 2 + segment;
            // Side triangle from the apex
            indices.extend_from_slice(&[0, rim, rim + 1]);
            // Cap triangle from the base center, wound to face outward
            indices.extend_from_slice(&[1, rim + 1, rim]);
        }

        Self { vertices, indices }
    }
}

/// Model matrix scaling the unit sphere to a point light's cutoff radius
pub fn point_volume_transform(light_position: Vec3, cutoff_radius: f32) -> Mat4 {
    Mat4::new_translation(&light_position)
        * Mat4::new_scaling(cutoff_radius)
}

/// Model matrix scaling the unit cone to a spot light's cutoff geometry
///
/// The cone's length becomes the cutoff radius and the base flares by the
/// tangent of the cutoff half-angle, so every point whose attenuated
/// contribution exceeds the threshold lies inside the volume.
pub fn spot_volume_transform(light_transform: &Mat4, cutoff_radius: f32, half_angle: f32) -> Mat4 {
    let flare = cutoff_radius * half_angle.tan();
    light_transform
        * Mat4::new_nonuniform_scaling(&Vec3::new(flare, flare, cutoff_radius))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn full_screen_quad_spans_ndc() {
        let quad = Mesh::full_screen_quad();
        assert_eq!(quad.triangle_count(), 2);
        for v in &quad.vertices {
            assert!(v.position[0].abs() <= 1.0 && v.position[1].abs() <= 1.0);
        }
    }

    #[test]
    fn unit_sphere_vertices_lie_on_unit_radius() {
        let sphere = Mesh::unit_sphere(8, 6);
        for v in &sphere.vertices {
            let r = (v.position[0].powi(2) + v.position[1].powi(2) + v.position[2].powi(2)).sqrt();
            assert_relative_eq!(r, 1.0, epsilon = 1e-5);
        }
        assert!(sphere.triangle_count() > 0);
    }

    #[test]
    fn unit_cone_is_closed() {
        let cone = Mesh::unit_cone(12);
        // 12 side triangles + 12 cap triangles
        assert_eq!(cone.triangle_count(), 24);
        // Apex at origin, base at z = -1
        assert_eq!(cone.vertices[0].position, [0.0, 0.0, 0.0]);
        for v in &cone.vertices[2..] {
            assert_relative_eq!(v.position[2], -1.0);
        }
    }

    #[test]
    fn point_volume_transform_scales_to_radius() {
        let m = point_volume_transform(Vec3::new(1.0, 2.0, 3.0), 5.0);
        let p = m.transform_point(&nalgebra::Point3::new(1.0, 0.0, 0.0));
        assert_relative_eq!(p.x, 6.0);
        assert_relative_eq!(p.y, 2.0);
        assert_relative_eq!(p.z, 3.0);
    }

    #[test]
    fn spot_volume_cone_reaches_cutoff_radius() {
        let m = spot_volume_transform(&Mat4::identity(), 10.0, 30.0_f32.to_radians());
        // The base center of the unit cone is at (0, 0, -1)
        let base = m.transform_point(&nalgebra::Point3::new(0.0, 0.0, -1.0));
        assert_relative_eq!(base.z, -10.0, epsilon = 1e-4);
    }
}
