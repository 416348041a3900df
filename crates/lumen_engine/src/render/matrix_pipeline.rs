//! Matrix pipeline with dirty-flag lazy recomputation
//!
//! Tracks the model, view, and projection matrices and derives their
//! composites (model-view, model-view-projection) and the normal matrix on
//! first read after a mutation. Recomputation is a pure function of the
//! three current inputs; there are no partial updates, so the cached values
//! are observationally identical to multiplying fresh every read.

use crate::foundation::math::{Mat3, Mat4};

/// Derived-matrix cache with independent dirty tracking
#[derive(Debug, Clone)]
pub struct MatrixPipeline {
    model: Mat4,
    view: Mat4,
    projection: Mat4,

    model_view: Mat4,
    model_view_projection: Mat4,
    normal: Mat3,

    model_view_dirty: bool,
    model_view_projection_dirty: bool,
    normal_dirty: bool,
}

impl Default for MatrixPipeline {
    fn default() -> Self {
        Self::new()
    }
}

impl MatrixPipeline {
    /// Create a pipeline with all matrices at identity
    pub fn new() -> Self {
        Self {
            model: Mat4::identity(),
            view: Mat4::identity(),
            projection: Mat4::identity(),
            model_view: Mat4::identity(),
            model_view_projection: Mat4::identity(),
            normal: Mat3::identity(),
            model_view_dirty: false,
            model_view_projection_dirty: false,
            normal_dirty: false,
        }
    }

    /// Set the model (local-to-world) matrix
    pub fn set_model(&mut self, model: Mat4) {
        self.model = model;
        self.model_view_dirty = true;
        self.model_view_projection_dirty = true;
        self.normal_dirty = true;
    }

    /// Set the view (world-to-camera) matrix
    pub fn set_view(&mut self, view: Mat4) {
        self.view = view;
        self.model_view_dirty = true;
        self.model_view_projection_dirty = true;
        self.normal_dirty = true;
    }

    /// Set the projection (camera-to-clip) matrix
    pub fn set_projection(&mut self, projection: Mat4) {
        self.projection = projection;
        self.model_view_projection_dirty = true;
    }

    /// The current model matrix
    pub fn model(&self) -> &Mat4 {
        &self.model
    }

    /// The current view matrix
    pub fn view(&self) -> &Mat4 {
        &self.view
    }

    /// The current projection matrix
    pub fn projection(&self) -> &Mat4 {
        &self.projection
    }

    /// The model-view composite, recomputed if stale
    pub fn model_view(&mut self) -> Mat4 {
        if self.model_view_dirty {
            self.model_view = compute_model_view(&self.model, &self.view);
            self.model_view_dirty = false;
        }
        self.model_view
    }

    /// The model-view-projection composite, recomputed if stale
    pub fn model_view_projection(&mut self) -> Mat4 {
        if self.model_view_projection_dirty {
            self.model_view_projection =
                compute_model_view_projection(&self.model, &self.view, &self.projection);
            self.model_view_projection_dirty = false;
        }
        self.model_view_projection
    }

    /// The normal matrix, recomputed if stale
    ///
    /// Inverse-transpose of the upper-left 3x3 of model-view, which keeps
    /// normals perpendicular under non-uniform scale. The inverse is
    /// computed unconditionally; a singular model-view produces NaNs that
    /// propagate to the shader rather than being special-cased.
    pub fn normal_matrix(&mut self) -> Mat3 {
        if self.normal_dirty {
            let model_view = self.model_view();
            self.normal = compute_normal_matrix(&model_view);
            self.normal_dirty = false;
        }
        self.normal
    }
}

/// Pure model-view composition
pub fn compute_model_view(model: &Mat4, view: &Mat4) -> Mat4 {
    view * model
}

/// Pure model-view-projection composition
pub fn compute_model_view_projection(model: &Mat4, view: &Mat4, projection: &Mat4) -> Mat4 {
    projection * view * model
}

/// Pure normal-matrix derivation from a model-view matrix
///
/// Inverts the upper 3x3 via the adjugate so a zero determinant yields
/// non-finite entries instead of an error path.
pub fn compute_normal_matrix(model_view: &Mat4) -> Mat3 {
    let m = model_view.fixed_view::<3, 3>(0, 0).into_owned();
    let det = m.determinant();
    let adjugate = Mat3::new(
        m[(1, 1)] * m[(2, 2)] - m[(1, 2)] * m[(2, 1)],
        m[(0, 2)] * m[(2, 1)] - m[(0, 1)] * m[(2, 2)],
        m[(0, 1)] * m[(1, 2)] - m[(0, 2)] * m[(1, 1)],
        m[(1, 2)] * m[(2, 0)] - m[(1, 0)] * m[(2, 2)],
        m[(0, 0)] * m[(2, 2)] - m[(0, 2)] * m[(2, 0)],
        m[(0, 2)] * m[(1, 0)] - m[(0, 0)] * m[(1, 2)],
        m[(1, 0)] * m[(2, 1)] - m[(1, 1)] * m[(2, 0)],
        m[(0, 1)] * m[(2, 0)] - m[(0, 0)] * m[(2, 1)],
        m[(0, 0)] * m[(1, 1)] - m[(0, 1)] * m[(1, 0)],
    );
    (adjugate / det).transpose()
}
