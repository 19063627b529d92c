//! Mip pyramids and their per-level synchronization state.
use crate::core::Error;
use crate::sync::{Access, AccessFlags, Barrier, BarrierScope, ImageLayout, PipelineStages};
use std::ops::Range;
use thiserror::Error;

pub use crate::util::{max_mip_levels, mip_extent};

/// Identifies a pyramid inside recorded command sequences.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PyramidId(pub usize);

/// Why a recorded command is not ordered after what it depends on.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum HazardKind {
    #[error("level is in layout `{tracked:?}` but `{requested:?}` was requested")]
    LayoutMismatch {
        tracked: ImageLayout,
        requested: ImageLayout,
    },
    #[error("`{next:?}` follows `{previous:?}` without a barrier")]
    Unsynchronized {
        previous: AccessFlags,
        next: AccessFlags,
    },
    #[error("`{next:?}` is not made visible by the last barrier")]
    NotVisible { next: AccessFlags },
    #[error("barrier source scope does not cover pending `{pending:?}`")]
    UncoveredSource { pending: AccessFlags },
    #[error("level is out of range for a pyramid with {levels} levels")]
    LevelOutOfRange { levels: u32 },
}

/// Tracked state of one mip level.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LevelState {
    pub layout: ImageLayout,
    /// Union of accesses recorded since the last barrier that covered them.
    pending: Option<Access>,
    /// Destination scope of the last barrier that covered this level.
    visible: Option<Access>,
}

impl Default for LevelState {
    fn default() -> Self {
        Self {
            layout: ImageLayout::Undefined,
            pending: None,
            visible: None,
        }
    }
}

impl LevelState {
    pub fn pending(&self) -> Option<Access> {
        self.pending
    }

    pub fn visible(&self) -> Option<Access> {
        self.visible
    }

    /// Source side of a barrier that has to follow the pending accesses.
    /// Only writes need to be made available, reads only need an
    /// execution dependency.
    pub fn as_source(&self) -> Access {
        match self.pending {
            Some(pending) => Access::new(
                pending.stages,
                pending.access & AccessFlags::WRITES,
                self.layout,
            ),
            None => Access::new(
                PipelineStages::TOP_OF_PIPE,
                AccessFlags::empty(),
                self.layout,
            ),
        }
    }

    pub fn is_visible_to(&self, need: &Access) -> bool {
        self.visible.map_or(false, |visible| visible.covers(need))
    }

    /// Whether `to` can follow without any barrier.
    pub fn is_settled_for(&self, to: &Access) -> bool {
        self.pending.is_none() && self.layout == to.layout && self.is_visible_to(to)
    }

    fn source_covered_by(&self, barrier: &Barrier) -> Result<(), HazardKind> {
        match self.pending {
            Some(pending)
                if !barrier.src_stages.contains(pending.stages)
                    || !barrier
                        .src_access
                        .contains(pending.access & AccessFlags::WRITES) =>
            {
                Err(HazardKind::UncoveredSource {
                    pending: pending.access,
                })
            }
            _ => Ok(()),
        }
    }

    fn record(&mut self, need: Access) -> Result<(), HazardKind> {
        if self.layout != need.layout {
            return Err(HazardKind::LayoutMismatch {
                tracked: self.layout,
                requested: need.layout,
            });
        }
        if let Some(pending) = self.pending {
            if pending.access.has_write() || need.access.has_write() {
                return Err(HazardKind::Unsynchronized {
                    previous: pending.access,
                    next: need.access,
                });
            }
        }
        if !self.is_visible_to(&need) {
            return Err(HazardKind::NotVisible { next: need.access });
        }
        self.pending = Some(match self.pending {
            Some(pending) => Access::new(
                pending.stages | need.stages,
                pending.access | need.access,
                self.layout,
            ),
            None => need,
        });
        Ok(())
    }
}

/// Host-side model of a mip pyramid: its extents and what every level went
/// through since the last barrier.
#[derive(Debug, Clone)]
pub struct MipPyramid {
    id: PyramidId,
    width: u32,
    height: u32,
    states: Vec<LevelState>,
}

impl MipPyramid {
    pub fn new(id: PyramidId, width: u32, height: u32) -> Self {
        let levels = max_mip_levels(width, height);
        Self {
            id,
            width,
            height,
            states: vec![LevelState::default(); levels as usize],
        }
    }

    pub fn id(&self) -> PyramidId {
        self.id
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn levels(&self) -> u32 {
        self.states.len() as u32
    }

    pub fn extent(&self, level: u32) -> (u32, u32) {
        mip_extent(self.width, self.height, level)
    }

    /// # Panics
    /// If `level` is not a level of this pyramid.
    pub fn level_state(&self, level: u32) -> &LevelState {
        &self.states[level as usize]
    }

    pub(crate) fn level_state_mut(&mut self, level: u32) -> &mut LevelState {
        &mut self.states[level as usize]
    }

    fn hazard(&self, level: u32, kind: HazardKind) -> Error {
        Error::Hazard {
            pyramid: self.id.0,
            level,
            kind,
        }
    }

    fn checked_state_mut(&mut self, level: u32) -> Result<&mut LevelState, Error> {
        let levels = self.levels();
        if level >= levels {
            return Err(self.hazard(level, HazardKind::LevelOutOfRange { levels }));
        }
        Ok(&mut self.states[level as usize])
    }

    /// Records that a command performs `need` on `level`.
    pub fn record_access(&mut self, level: u32, need: Access) -> Result<(), Error> {
        let state = self.checked_state_mut(level)?;
        state.record(need).map_err(|kind| self.hazard(level, kind))
    }

    /// Applies `barrier` to the tracked state. Image barriers must name this
    /// pyramid, match the tracked layout (or discard from `Undefined`) and
    /// cover everything pending on their levels. Memory barriers settle the
    /// pending accesses they cover and leave the others pending.
    pub fn apply_barrier(&mut self, barrier: &Barrier) -> Result<(), Error> {
        match &barrier.scope {
            BarrierScope::Image {
                pyramid,
                levels,
                old_layout,
                new_layout,
            } => {
                if *pyramid != self.id {
                    return Err(Error::UnknownPyramid(pyramid.0));
                }
                self.apply_image_barrier(barrier, levels.clone(), *old_layout, *new_layout)
            }
            BarrierScope::Memory => {
                for state in self.states.iter_mut() {
                    if state.pending.is_some() && state.source_covered_by(barrier).is_ok() {
                        state.pending = None;
                        state.visible = Some(barrier.dst(state.layout));
                    }
                }
                Ok(())
            }
        }
    }

    fn apply_image_barrier(
        &mut self,
        barrier: &Barrier,
        levels: Range<u32>,
        old_layout: ImageLayout,
        new_layout: ImageLayout,
    ) -> Result<(), Error> {
        // every level is checked before any is touched
        for level in levels.clone() {
            let state = self.checked_state_mut(level)?;
            if old_layout != ImageLayout::Undefined && old_layout != state.layout {
                let kind = HazardKind::LayoutMismatch {
                    tracked: state.layout,
                    requested: old_layout,
                };
                return Err(self.hazard(level, kind));
            }
            if let Err(kind) = state.source_covered_by(barrier) {
                return Err(self.hazard(level, kind));
            }
        }
        for level in levels {
            let state = &mut self.states[level as usize];
            state.layout = new_layout;
            state.pending = None;
            state.visible = Some(barrier.dst(new_layout));
        }
        Ok(())
    }

    /// The host waited for the queue to go idle: every recorded access is
    /// complete, but nothing is visible to later commands until a barrier.
    pub fn join(&mut self) {
        for state in self.states.iter_mut() {
            state.pending = None;
            state.visible = None;
        }
    }
}

/// A mip pyramid on the device: an RGBA8 texture with the full chain and
/// the tracker describing it.
#[derive(Debug)]
pub struct GpuPyramid {
    texture: wgpu::Texture,
    usage: wgpu::TextureUsages,
    state: MipPyramid,
}

impl GpuPyramid {
    pub const FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8Unorm;

    pub fn new(
        device: &wgpu::Device,
        id: PyramidId,
        width: u32,
        height: u32,
        usage: wgpu::TextureUsages,
        label: &str,
    ) -> Self {
        let state = MipPyramid::new(id, width, height);
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some(label),
            size: wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
            mip_level_count: state.levels(),
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: Self::FORMAT,
            usage,
            view_formats: &[],
        });
        Self {
            texture,
            usage,
            state,
        }
    }

    pub fn id(&self) -> PyramidId {
        self.state.id()
    }

    pub fn texture(&self) -> &wgpu::Texture {
        &self.texture
    }

    pub fn usage(&self) -> wgpu::TextureUsages {
        self.usage
    }

    pub fn state(&self) -> &MipPyramid {
        &self.state
    }

    pub fn state_mut(&mut self) -> &mut MipPyramid {
        &mut self.state
    }

    pub fn extent3d(&self, level: u32) -> wgpu::Extent3d {
        let (width, height) = self.state.extent(level);
        wgpu::Extent3d {
            width,
            height,
            depth_or_array_layers: 1,
        }
    }

    /// View of a single mip level.
    pub fn level_view(&self, level: u32) -> wgpu::TextureView {
        self.levels_view(level..level + 1)
    }

    /// View of a contiguous range of mip levels.
    pub fn levels_view(&self, levels: Range<u32>) -> wgpu::TextureView {
        self.texture.create_view(&wgpu::TextureViewDescriptor {
            label: None,
            base_mip_level: levels.start,
            mip_level_count: Some(levels.end - levels.start),
            ..Default::default()
        })
    }
}
