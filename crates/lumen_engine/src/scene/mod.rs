//! Scene entities and frame submission
//!
//! The pipeline's inputs are a table of entities with world transforms and
//! a per-frame list of drawables referencing them. Lights and drawables
//! hold non-owning [`EntityId`] handles into the table, never pointers, so
//! a component can reference its owner without an ownership cycle.

use slotmap::{new_key_type, SlotMap};
use std::sync::Mutex;

use crate::foundation::math::{Aabb, Transform, Vec3, Vec4};
use crate::render::api::MeshId;

new_key_type! {
    /// Non-owning handle to a scene entity
    pub struct EntityId;
}

/// A scene entity: a world transform plus an optional bounding box
#[derive(Debug, Clone, Default)]
pub struct SceneEntity {
    /// World transform of this entity
    pub transform: Transform,
    /// Object-space bounding box, used to fit directional shadow volumes
    pub bounds: Option<Aabb>,
}

/// Table of scene entities addressed by [`EntityId`]
#[derive(Debug, Default)]
pub struct World {
    entities: SlotMap<EntityId, SceneEntity>,
}

impl World {
    /// Create an empty world
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert an entity and return its handle
    pub fn spawn(&mut self, entity: SceneEntity) -> EntityId {
        self.entities.insert(entity)
    }

    /// Remove an entity
    pub fn despawn(&mut self, id: EntityId) -> Option<SceneEntity> {
        self.entities.remove(id)
    }

    /// Look up an entity
    pub fn get(&self, id: EntityId) -> Option<&SceneEntity> {
        self.entities.get(id)
    }

    /// Look up an entity mutably
    pub fn get_mut(&mut self, id: EntityId) -> Option<&mut SceneEntity> {
        self.entities.get_mut(id)
    }

    /// Number of live entities
    pub fn len(&self) -> usize {
        self.entities.len()
    }

    /// Whether the world has no entities
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }
}

/// Surface material sampled into the G-buffer by the geometry pass
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Material {
    /// Diffuse albedo (RGBA)
    pub diffuse: Vec4,
    /// Specular reflectance (RGB)
    pub specular: Vec3,
    /// Specular exponent
    pub shininess: f32,
}

impl Default for Material {
    fn default() -> Self {
        Self {
            diffuse: Vec4::new(1.0, 1.0, 1.0, 1.0),
            specular: Vec3::new(0.04, 0.04, 0.04),
            shininess: 32.0,
        }
    }
}

/// One drawable submitted for a frame
#[derive(Debug, Clone, Copy)]
pub struct Drawable {
    /// Entity whose transform positions this drawable
    pub entity: EntityId,
    /// Uploaded mesh to draw
    pub mesh: MeshId,
    /// Surface material
    pub material: Material,
    /// Whether this drawable is rendered into shadow maps
    pub casts_shadow: bool,
}

/// Double-buffered drawable list handed from simulation to rendering
///
/// Simulation threads submit the next frame's drawables at any time; the
/// render thread swaps the pending list in at frame start. The swap is the
/// only cross-thread boundary in the pipeline, so a slow simulation tick
/// never stalls a frame mid-flight.
#[derive(Debug, Default)]
pub struct FrameSubmission {
    future: Mutex<Option<Vec<Drawable>>>,
    current: Vec<Drawable>,
}

impl FrameSubmission {
    /// Create an empty submission queue
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the pending drawable list for the next frame
    ///
    /// Callable from any thread. A second submission before the next swap
    /// replaces the first; frames always render a consistent list.
    pub fn submit(&self, drawables: Vec<Drawable>) {
        let mut future = self.future.lock().unwrap_or_else(|e| e.into_inner());
        *future = Some(drawables);
    }

    /// Swap any pending list into the current one; render thread only
    pub fn swap(&mut self) {
        let pending = {
            let mut future = self.future.lock().unwrap_or_else(|e| e.into_inner());
            future.take()
        };
        if let Some(drawables) = pending {
            self.current = drawables;
        }
    }

    /// The drawable list for the frame being rendered
    pub fn current(&self) -> &[Drawable] {
        &self.current
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn world_spawn_and_lookup() {
        let mut world = World::new();
        let id = world.spawn(SceneEntity {
            transform: Transform::from_position(Vec3::new(1.0, 2.0, 3.0)),
            bounds: None,
        });
        assert_eq!(world.get(id).unwrap().transform.position.y, 2.0);
        world.despawn(id);
        assert!(world.get(id).is_none());
    }

    #[test]
    fn submission_is_invisible_until_swapped() {
        let mut submission = FrameSubmission::new();
        let mut world = World::new();
        let entity = world.spawn(SceneEntity::default());

        submission.submit(vec![Drawable {
            entity,
            mesh: MeshId::default(),
            material: Material::default(),
            casts_shadow: false,
        }]);
        assert!(submission.current().is_empty());

        submission.swap();
        assert_eq!(submission.current().len(), 1);

        // No pending list: swap keeps the current frame's drawables
        submission.swap();
        assert_eq!(submission.current().len(), 1);
    }

    #[test]
    fn later_submission_replaces_earlier_one() {
        let mut submission = FrameSubmission::new();
        submission.submit(Vec::new());
        submission.submit(vec![
            Drawable {
                entity: EntityId::default(),
                mesh: MeshId::default(),
                material: Material::default(),
                casts_shadow: true,
            };
            2
        ]);
        submission.swap();
        assert_eq!(submission.current().len(), 2);
    }
}
