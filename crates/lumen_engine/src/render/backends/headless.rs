//! Headless reference backend
//!
//! Implements [`GraphicsDevice`] entirely on the CPU: resources are records
//! in slotmap arenas, state-setting calls mutate a tracked pipeline state,
//! and draws/clears/blits append to inspection logs instead of touching a
//! GPU. Framebuffer completeness follows the same rules a driver applies
//! (matching dimensions, color formats in color slots, depth formats in the
//! depth slot), which is what makes the pipeline's failure paths testable
//! without a graphics context.
//!
//! Shader "compilation" reads the real GLSL sources and scans them for
//! `uniform` declarations, so uniform resolution behaves like a live driver:
//! a name the source never declares resolves to nothing.

use slotmap::SlotMap;
use std::any::Any;
use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use crate::core::config::ShaderConfig;
use crate::render::api::{
    BlendMode, ClearMask, CullMode, DepthState, FramebufferId, FramebufferStatus, GraphicsDevice,
    MeshId, ProgramId, StencilState, TextureFormat, TextureId, UniformLocation, UniformValue,
};
use crate::render::mesh::Vertex;
use crate::render::{RenderError, RenderResult};

/// Maximum texture edge the headless device will allocate
///
/// Mirrors a typical driver limit so oversized requests surface as
/// allocation failures rather than silently succeeding.
const MAX_TEXTURE_SIZE: u32 = 16384;

#[derive(Debug, Clone)]
struct TextureRecord {
    label: String,
    format: TextureFormat,
    width: u32,
    height: u32,
}

#[derive(Debug, Clone, Default)]
struct FramebufferRecord {
    label: String,
    colors: BTreeMap<usize, TextureId>,
    depth_stencil: Option<TextureId>,
}

#[derive(Debug, Clone)]
struct ProgramRecord {
    label: String,
    uniforms: HashMap<String, UniformLocation>,
    values: HashMap<UniformLocation, UniformValue>,
}

#[derive(Debug, Clone)]
struct MeshRecord {
    label: String,
    vertex_count: usize,
    index_count: usize,
}

/// One recorded draw call with the state it was issued under
#[derive(Debug, Clone)]
pub struct DrawRecord {
    /// Program in use
    pub program: Option<ProgramId>,
    /// Mesh drawn
    pub mesh: MeshId,
    /// Bound framebuffer (`None` = default)
    pub framebuffer: Option<FramebufferId>,
    /// Active color draw buffers
    pub draw_buffers: Vec<usize>,
    /// Stencil state at draw time
    pub stencil: StencilState,
    /// Depth state at draw time
    pub depth: DepthState,
    /// Blend mode at draw time
    pub blend: BlendMode,
    /// Cull mode at draw time
    pub cull: CullMode,
    /// Uniform values of the program at draw time, by name
    pub uniforms: HashMap<String, UniformValue>,
}

/// One recorded clear call
#[derive(Debug, Clone)]
pub struct ClearRecord {
    /// Bound framebuffer (`None` = default)
    pub framebuffer: Option<FramebufferId>,
    /// Buffers cleared
    pub mask: ClearMask,
    /// Clear color used
    pub color: [f32; 4],
    /// Active color draw buffers at clear time
    pub draw_buffers: Vec<usize>,
}

/// One recorded blit to the default framebuffer
#[derive(Debug, Clone)]
pub struct BlitRecord {
    /// Source framebuffer
    pub framebuffer: FramebufferId,
    /// Source color slot
    pub slot: usize,
    /// Destination width
    pub width: u32,
    /// Destination height
    pub height: u32,
}

/// CPU-only [`GraphicsDevice`] used as the reference backend and in tests
pub struct HeadlessDevice {
    textures: SlotMap<TextureId, TextureRecord>,
    framebuffers: SlotMap<FramebufferId, FramebufferRecord>,
    programs: SlotMap<ProgramId, ProgramRecord>,
    meshes: SlotMap<MeshId, MeshRecord>,

    bound_framebuffer: Option<FramebufferId>,
    draw_buffers: Vec<usize>,
    bound_textures: HashMap<u32, TextureId>,
    current_program: Option<ProgramId>,
    viewport: (u32, u32),
    depth: DepthState,
    stencil: StencilState,
    blend: BlendMode,
    cull: CullMode,

    draws: Vec<DrawRecord>,
    clears: Vec<ClearRecord>,
    blits: Vec<BlitRecord>,
}

impl Default for HeadlessDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl HeadlessDevice {
    /// Create an empty headless device
    pub fn new() -> Self {
        Self {
            textures: SlotMap::default(),
            framebuffers: SlotMap::default(),
            programs: SlotMap::default(),
            meshes: SlotMap::default(),
            bound_framebuffer: None,
            draw_buffers: Vec::new(),
            bound_textures: HashMap::new(),
            current_program: None,
            viewport: (0, 0),
            depth: DepthState { test: true, write: true },
            stencil: StencilState::disabled(),
            blend: BlendMode::Disabled,
            cull: CullMode::Back,
            draws: Vec::new(),
            clears: Vec::new(),
            blits: Vec::new(),
        }
    }

    /// Recorded draw calls, in issue order
    pub fn draws(&self) -> &[DrawRecord] {
        &self.draws
    }

    /// Recorded clear calls, in issue order
    pub fn clears(&self) -> &[ClearRecord] {
        &self.clears
    }

    /// Recorded blits to the default framebuffer
    pub fn blits(&self) -> &[BlitRecord] {
        &self.blits
    }

    /// Currently bound framebuffer (`None` = default)
    pub fn bound_framebuffer(&self) -> Option<FramebufferId> {
        self.bound_framebuffer
    }

    /// Texture bound at the given unit, if any
    pub fn bound_texture(&self, unit: u32) -> Option<TextureId> {
        self.bound_textures.get(&unit).copied()
    }

    /// Currently active color draw buffers
    pub fn active_draw_buffers(&self) -> &[usize] {
        &self.draw_buffers
    }

    /// Number of live texture allocations
    pub fn texture_count(&self) -> usize {
        self.textures.len()
    }

    /// Number of live framebuffer objects
    pub fn framebuffer_count(&self) -> usize {
        self.framebuffers.len()
    }

    /// Number of live compiled programs
    pub fn program_count(&self) -> usize {
        self.programs.len()
    }

    /// Number of live mesh uploads
    pub fn mesh_count(&self) -> usize {
        self.meshes.len()
    }

    /// Forget all recorded draws, clears, and blits
    pub fn clear_logs(&mut self) {
        self.draws.clear();
        self.clears.clear();
        self.blits.clear();
    }

    fn texture(&self, id: TextureId) -> RenderResult<&TextureRecord> {
        self.textures
            .get(id)
            .ok_or_else(|| RenderError::Backend("unknown texture handle".to_string()))
    }

    fn framebuffer(&self, id: FramebufferId) -> RenderResult<&FramebufferRecord> {
        self.framebuffers
            .get(id)
            .ok_or_else(|| RenderError::Backend("unknown framebuffer handle".to_string()))
    }

    fn compute_status(&self, record: &FramebufferRecord) -> FramebufferStatus {
        if record.colors.is_empty() && record.depth_stencil.is_none() {
            return FramebufferStatus::IncompleteAttachment;
        }

        let mut size: Option<(u32, u32)> = None;
        let mut check = |texture: &TextureRecord| -> Option<FramebufferStatus> {
            match size {
                None => {
                    size = Some((texture.width, texture.height));
                    None
                }
                Some(expected) if expected == (texture.width, texture.height) => None,
                Some(_) => Some(FramebufferStatus::IncompleteAttachment),
            }
        };

        for texture_id in record.colors.values() {
            let Some(texture) = self.textures.get(*texture_id) else {
                return FramebufferStatus::IncompleteAttachment;
            };
            if !texture.format.is_color() {
                return FramebufferStatus::Unsupported;
            }
            if let Some(status) = check(texture) {
                return status;
            }
        }

        if let Some(depth_id) = record.depth_stencil {
            let Some(texture) = self.textures.get(depth_id) else {
                return FramebufferStatus::IncompleteAttachment;
            };
            if !texture.format.has_depth() {
                return FramebufferStatus::Unsupported;
            }
            if let Some(status) = check(texture) {
                return status;
            }
        }

        FramebufferStatus::Complete
    }

    /// Scan a GLSL source for `uniform` declarations, in declaration order
    fn scan_uniforms(source: &str, names: &mut Vec<String>) {
        for line in source.lines() {
            let line = line.trim();
            let Some(rest) = line.strip_prefix("uniform ") else {
                continue;
            };
            // `uniform <type> <name>[<n>];` — the name is the last token
            let Some(declaration) = rest.split(';').next() else {
                continue;
            };
            let Some(raw_name) = declaration.split_whitespace().last() else {
                continue;
            };
            let name = raw_name
                .split('[')
                .next()
                .unwrap_or(raw_name)
                .to_string();
            if !name.is_empty() && !names.contains(&name) {
                names.push(name);
            }
        }
    }
}

impl GraphicsDevice for HeadlessDevice {
    fn create_texture(
        &mut self,
        label: &str,
        format: TextureFormat,
        width: u32,
        height: u32,
    ) -> RenderResult<TextureId> {
        if width == 0 || height == 0 || width > MAX_TEXTURE_SIZE || height > MAX_TEXTURE_SIZE {
            return Err(RenderError::ResourceAllocation(format!(
                "texture '{label}' has unsupported dimensions {width}x{height}"
            )));
        }
        log::debug!("creating texture '{label}' {width}x{height} {format:?}");
        Ok(self.textures.insert(TextureRecord {
            label: label.to_string(),
            format,
            width,
            height,
        }))
    }

    fn resize_texture(&mut self, texture: TextureId, width: u32, height: u32) -> RenderResult<()> {
        if width == 0 || height == 0 || width > MAX_TEXTURE_SIZE || height > MAX_TEXTURE_SIZE {
            return Err(RenderError::ResourceAllocation(format!(
                "unsupported texture dimensions {width}x{height}"
            )));
        }
        let record = self
            .textures
            .get_mut(texture)
            .ok_or_else(|| RenderError::Backend("unknown texture handle".to_string()))?;
        record.width = width;
        record.height = height;
        Ok(())
    }

    fn texture_size(&self, texture: TextureId) -> RenderResult<(u32, u32)> {
        let record = self.texture(texture)?;
        Ok((record.width, record.height))
    }

    fn destroy_texture(&mut self, texture: TextureId) {
        if self.textures.remove(texture).is_some() {
            self.bound_textures.retain(|_, bound| *bound != texture);
        }
    }

    fn create_framebuffer(&mut self, label: &str) -> RenderResult<FramebufferId> {
        log::debug!("creating framebuffer '{label}'");
        Ok(self.framebuffers.insert(FramebufferRecord {
            label: label.to_string(),
            ..FramebufferRecord::default()
        }))
    }

    fn attach_color(
        &mut self,
        framebuffer: FramebufferId,
        slot: usize,
        texture: TextureId,
    ) -> RenderResult<()> {
        self.texture(texture)?;
        let record = self
            .framebuffers
            .get_mut(framebuffer)
            .ok_or_else(|| RenderError::Backend("unknown framebuffer handle".to_string()))?;
        record.colors.insert(slot, texture);
        Ok(())
    }

    fn attach_depth_stencil(
        &mut self,
        framebuffer: FramebufferId,
        texture: TextureId,
    ) -> RenderResult<()> {
        self.texture(texture)?;
        let record = self
            .framebuffers
            .get_mut(framebuffer)
            .ok_or_else(|| RenderError::Backend("unknown framebuffer handle".to_string()))?;
        record.depth_stencil = Some(texture);
        Ok(())
    }

    fn framebuffer_status(&self, framebuffer: FramebufferId) -> RenderResult<FramebufferStatus> {
        let record = self.framebuffer(framebuffer)?;
        Ok(self.compute_status(record))
    }

    fn destroy_framebuffer(&mut self, framebuffer: FramebufferId) {
        if self.framebuffers.remove(framebuffer).is_some()
            && self.bound_framebuffer == Some(framebuffer)
        {
            self.bound_framebuffer = None;
        }
    }

    fn bind_framebuffer(&mut self, framebuffer: Option<FramebufferId>) {
        self.bound_framebuffer = framebuffer;
    }

    fn set_draw_buffers(&mut self, slots: &[usize]) {
        self.draw_buffers = slots.to_vec();
    }

    fn bind_texture(&mut self, unit: u32, texture: TextureId) {
        self.bound_textures.insert(unit, texture);
    }

    fn set_viewport(&mut self, width: u32, height: u32) {
        self.viewport = (width, height);
    }

    fn set_depth(&mut self, state: DepthState) {
        self.depth = state;
    }

    fn set_stencil(&mut self, state: StencilState) {
        self.stencil = state;
    }

    fn set_blend(&mut self, mode: BlendMode) {
        self.blend = mode;
    }

    fn set_cull(&mut self, mode: CullMode) {
        self.cull = mode;
    }

    fn clear(&mut self, mask: ClearMask, color: [f32; 4]) {
        self.clears.push(ClearRecord {
            framebuffer: self.bound_framebuffer,
            mask,
            color,
            draw_buffers: self.draw_buffers.clone(),
        });
    }

    fn compile_program(&mut self, label: &str, stages: &ShaderConfig) -> RenderResult<ProgramId> {
        let files: Vec<String> = stages
            .stage_paths()
            .iter()
            .map(|p| p.display().to_string())
            .collect();

        let mut names = Vec::new();
        for path in stages.stage_paths() {
            let source = read_stage(path).map_err(|log| RenderError::ShaderCompilation {
                files: files.clone(),
                log,
            })?;
            Self::scan_uniforms(&source, &mut names);
        }

        let uniforms = names
            .into_iter()
            .enumerate()
            .map(|(i, name)| (name, UniformLocation(i as u32)))
            .collect();

        log::debug!("compiled program '{label}' from {files:?}");
        Ok(self.programs.insert(ProgramRecord {
            label: label.to_string(),
            uniforms,
            values: HashMap::new(),
        }))
    }

    fn destroy_program(&mut self, program: ProgramId) {
        if self.programs.remove(program).is_some() && self.current_program == Some(program) {
            self.current_program = None;
        }
    }

    fn uniform_location(&self, program: ProgramId, name: &str) -> Option<UniformLocation> {
        self.programs
            .get(program)
            .and_then(|record| record.uniforms.get(name).copied())
    }

    fn program_uniforms(&self, program: ProgramId) -> RenderResult<Vec<String>> {
        let record = self
            .programs
            .get(program)
            .ok_or_else(|| RenderError::Backend("unknown program handle".to_string()))?;
        Ok(record.uniforms.keys().cloned().collect())
    }

    fn set_uniform(&mut self, program: ProgramId, location: UniformLocation, value: UniformValue) {
        if let Some(record) = self.programs.get_mut(program) {
            record.values.insert(location, value);
        }
    }

    fn use_program(&mut self, program: ProgramId) {
        self.current_program = Some(program);
    }

    fn create_mesh(
        &mut self,
        label: &str,
        vertices: &[Vertex],
        indices: &[u32],
    ) -> RenderResult<MeshId> {
        if vertices.is_empty() || indices.is_empty() {
            return Err(RenderError::ResourceAllocation(format!(
                "mesh '{label}' has no geometry"
            )));
        }
        if let Some(bad) = indices.iter().find(|&&i| i as usize >= vertices.len()) {
            return Err(RenderError::ResourceAllocation(format!(
                "mesh '{label}' index {bad} out of range"
            )));
        }
        Ok(self.meshes.insert(MeshRecord {
            label: label.to_string(),
            vertex_count: vertices.len(),
            index_count: indices.len(),
        }))
    }

    fn destroy_mesh(&mut self, mesh: MeshId) {
        self.meshes.remove(mesh);
    }

    fn draw_mesh(&mut self, mesh: MeshId) -> RenderResult<()> {
        if !self.meshes.contains_key(mesh) {
            return Err(RenderError::Backend("unknown mesh handle".to_string()));
        }
        if let Some(framebuffer) = self.bound_framebuffer {
            let record = self.framebuffer(framebuffer)?;
            let status = self.compute_status(record);
            if status != FramebufferStatus::Complete {
                return Err(RenderError::Backend(format!(
                    "draw to incomplete framebuffer '{}'",
                    record.label
                )));
            }
        }

        let uniforms = self
            .current_program
            .and_then(|p| self.programs.get(p))
            .map(|record| {
                record
                    .uniforms
                    .iter()
                    .filter_map(|(name, location)| {
                        record.values.get(location).map(|v| (name.clone(), *v))
                    })
                    .collect()
            })
            .unwrap_or_default();

        self.draws.push(DrawRecord {
            program: self.current_program,
            mesh,
            framebuffer: self.bound_framebuffer,
            draw_buffers: self.draw_buffers.clone(),
            stencil: self.stencil,
            depth: self.depth,
            blend: self.blend,
            cull: self.cull,
            uniforms,
        });
        Ok(())
    }

    fn blit_to_default(
        &mut self,
        framebuffer: FramebufferId,
        slot: usize,
        width: u32,
        height: u32,
    ) -> RenderResult<()> {
        let record = self.framebuffer(framebuffer)?;
        if !record.colors.contains_key(&slot) {
            return Err(RenderError::Backend(format!(
                "blit source slot {slot} has no attachment on '{}'",
                record.label
            )));
        }
        self.blits.push(BlitRecord {
            framebuffer,
            slot,
            width,
            height,
        });
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

fn read_stage(path: &Path) -> Result<String, String> {
    std::fs::read_to_string(path)
        .map_err(|e| format!("cannot read shader stage {}: {e}", path.display()))
}
