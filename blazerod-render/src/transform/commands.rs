//! Recorded frame commands
//!
//! Renderers do not talk to the graphics API directly: they fill the shader
//! data pools and record dispatches, barriers and draws into a
//! [`FrameCommands`] list that the host replays in order.

use std::sync::Arc;

use blazerod_model::scene::Texture;
use glam::{Mat4, Vec4};
use smallvec::SmallVec;

use crate::error::{RenderError, Result};
use crate::material::MaterialDescriptor;
use crate::pipeline::{ComputeVariant, VertexVariant};
use crate::pool::ShaderDataSlice;
use crate::scene::RenderScene;

bitflags::bitflags! {
    /// Memory barrier scope
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct BarrierFlags: u32 {
        /// Storage buffer writes visible to later shader reads
        const STORAGE = 1 << 0;
        /// Buffer writes visible to vertex fetch
        const VERTEX = 1 << 1;
        const UNIFORM = 1 << 2;
    }
}

/// Which of a renderer's pools a slice belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PoolRole {
    /// Matrices, joints and morph data
    Data,
    Uniform,
    Vertex,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BufferRef {
    Pooled { role: PoolRole, slice: ShaderDataSlice },
    /// Static vertex buffer of a scene primitive, indexed into [`FrameCommands::scenes`]
    Primitive { scene: usize, primitive: usize },
}

impl BufferRef {
    pub fn overlaps(&self, other: &BufferRef) -> bool {
        match (self, other) {
            (
                BufferRef::Pooled { role, slice },
                BufferRef::Pooled {
                    role: other_role,
                    slice: other_slice,
                },
            ) => role == other_role && slice.overlaps(other_slice),
            (BufferRef::Primitive { .. }, BufferRef::Primitive { .. }) => self == other,
            _ => false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BindingKind {
    Storage,
    Uniform,
    Texel,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Binding {
    /// Name the shader declares the binding under
    pub name: &'static str,
    pub kind: BindingKind,
    pub buffer: BufferRef,
}

impl Binding {
    pub fn storage(name: &'static str, buffer: BufferRef) -> Self {
        Self {
            name,
            kind: BindingKind::Storage,
            buffer,
        }
    }

    pub fn uniform(name: &'static str, buffer: BufferRef) -> Self {
        Self {
            name,
            kind: BindingKind::Uniform,
            buffer,
        }
    }

    pub fn texel(name: &'static str, buffer: BufferRef) -> Self {
        Self {
            name,
            kind: BindingKind::Texel,
            buffer,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PipelineId {
    /// The host's entity pipeline for already transformed vertices
    Entity,
    Vertex {
        material: MaterialDescriptor,
        variant: VertexVariant,
    },
    Compute {
        material: MaterialDescriptor,
        variant: ComputeVariant,
    },
}

pub type Bindings = SmallVec<[Binding; 8]>;

#[derive(Debug, Clone, PartialEq)]
pub struct Dispatch {
    pub label: String,
    pub pipeline: PipelineId,
    pub workgroups: [u32; 3],
    pub bindings: Bindings,
    /// Buffer the dispatch writes
    pub target: BufferRef,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Draw {
    pub label: String,
    pub pipeline: PipelineId,
    pub vertex_buffer: BufferRef,
    pub vertex_stride: u64,
    pub vertex_count: u32,
    /// Drawn with the primitive's index buffer when set
    pub index_count: Option<u32>,
    pub scene: usize,
    pub primitive: usize,
    pub instance_count: u32,
    pub bindings: Bindings,
    pub model_matrix: Mat4,
    pub base_color: Vec4,
    pub texture: Option<Arc<Texture>>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Dispatch(Dispatch),
    MemoryBarrier(BarrierFlags),
    Draw(Draw),
}

/// Commands of one frame plus the scenes their primitive buffers refer to
#[derive(Debug, Default)]
pub struct FrameCommands {
    scenes: Vec<Arc<RenderScene>>,
    commands: Vec<Command>,
}

impl FrameCommands {
    pub fn new() -> Self {
        Self::default()
    }

    /// Index of `scene` in this frame, registering it on first use
    pub fn scene_index(&mut self, scene: &Arc<RenderScene>) -> usize {
        match self.scenes.iter().position(|known| Arc::ptr_eq(known, scene)) {
            Some(index) => index,
            None => {
                self.scenes.push(Arc::clone(scene));
                self.scenes.len() - 1
            }
        }
    }

    pub fn scenes(&self) -> &[Arc<RenderScene>] {
        &self.scenes
    }

    pub fn push(&mut self, command: Command) {
        self.commands.push(command);
    }

    pub fn commands(&self) -> &[Command] {
        &self.commands
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    pub fn draws(&self) -> impl Iterator<Item = &Draw> {
        self.commands.iter().filter_map(|command| match command {
            Command::Draw(draw) => Some(draw),
            _ => None,
        })
    }

    pub fn dispatches(&self) -> impl Iterator<Item = &Dispatch> {
        self.commands.iter().filter_map(|command| match command {
            Command::Dispatch(dispatch) => Some(dispatch),
            _ => None,
        })
    }

    pub fn barrier_count(&self) -> usize {
        self.commands
            .iter()
            .filter(|command| matches!(command, Command::MemoryBarrier(_)))
            .count()
    }

    /// Check that no draw reads a buffer a dispatch wrote without a
    /// `STORAGE | VERTEX` barrier in between
    pub fn validate_barriers(&self) -> Result<()> {
        let mut pending: Vec<BufferRef> = Vec::new();
        for command in &self.commands {
            match command {
                Command::Dispatch(dispatch) => pending.push(dispatch.target),
                Command::MemoryBarrier(flags) => {
                    if flags.contains(BarrierFlags::STORAGE | BarrierFlags::VERTEX) {
                        pending.clear();
                    }
                }
                Command::Draw(draw) => {
                    let mut reads = std::iter::once(&draw.vertex_buffer)
                        .chain(draw.bindings.iter().map(|binding| &binding.buffer));
                    if reads.any(|read| pending.iter().any(|written| written.overlaps(read))) {
                        return Err(RenderError::MissingBarrier {
                            draw: draw.label.clone(),
                        });
                    }
                }
            }
        }
        Ok(())
    }

    /// Drop all commands and scene references
    pub fn clear(&mut self) {
        self.scenes.clear();
        self.commands.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::BufferId;

    fn vertex_slice(offset: u64) -> BufferRef {
        BufferRef::Pooled {
            role: PoolRole::Vertex,
            slice: ShaderDataSlice {
                buffer: Some(BufferId(0)),
                offset,
                size: 64,
            },
        }
    }

    fn dispatch(target: BufferRef) -> Command {
        Command::Dispatch(Dispatch {
            label: "transform".to_string(),
            pipeline: PipelineId::Entity,
            workgroups: [1, 1, 1],
            bindings: Bindings::new(),
            target,
        })
    }

    fn draw(vertex_buffer: BufferRef) -> Command {
        Command::Draw(Draw {
            label: "draw".to_string(),
            pipeline: PipelineId::Entity,
            vertex_buffer,
            vertex_stride: 48,
            vertex_count: 1,
            index_count: None,
            scene: 0,
            primitive: 0,
            instance_count: 1,
            bindings: Bindings::new(),
            model_matrix: Mat4::IDENTITY,
            base_color: Vec4::ONE,
            texture: None,
        })
    }

    #[test]
    fn test_draw_after_dispatch_needs_barrier() {
        let mut frame = FrameCommands::new();
        frame.push(dispatch(vertex_slice(0)));
        frame.push(draw(vertex_slice(0)));
        assert!(matches!(
            frame.validate_barriers(),
            Err(RenderError::MissingBarrier { .. })
        ));

        let mut frame = FrameCommands::new();
        frame.push(dispatch(vertex_slice(0)));
        frame.push(Command::MemoryBarrier(BarrierFlags::STORAGE | BarrierFlags::VERTEX));
        frame.push(draw(vertex_slice(0)));
        assert!(frame.validate_barriers().is_ok());
        assert_eq!(frame.barrier_count(), 1);
    }

    #[test]
    fn test_partial_barrier_is_not_enough() {
        let mut frame = FrameCommands::new();
        frame.push(dispatch(vertex_slice(0)));
        frame.push(Command::MemoryBarrier(BarrierFlags::STORAGE));
        frame.push(draw(vertex_slice(0)));
        assert!(frame.validate_barriers().is_err());
    }

    #[test]
    fn test_unrelated_buffers_need_no_barrier() {
        let mut frame = FrameCommands::new();
        frame.push(dispatch(vertex_slice(0)));
        frame.push(draw(vertex_slice(64)));
        frame.push(draw(BufferRef::Primitive {
            scene: 0,
            primitive: 0,
        }));
        assert!(frame.validate_barriers().is_ok());
        assert_eq!(frame.draws().count(), 2);
        assert_eq!(frame.dispatches().count(), 1);
    }
}
