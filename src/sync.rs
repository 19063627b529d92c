//! Vulkan-model synchronization primitives.
//!
//! wgpu emits the real device barriers itself, but the benchmark keeps an
//! explicit plan of every producer/consumer edge so the three strategies can
//! be compared barrier for barrier. Strategies never build [`Barrier`] values
//! by hand; they go through [`BarrierBuilder`].
use crate::pyramid::{MipPyramid, PyramidId};
use bitflags::bitflags;
use std::ops::Range;

bitflags! {
    /// Pipeline stages that can appear on either side of a barrier.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct PipelineStages: u32 {
        const TOP_OF_PIPE = 1 << 0;
        const TRANSFER = 1 << 1;
        const COMPUTE_SHADER = 1 << 2;
        const FRAGMENT_SHADER = 1 << 3;
        const COLOR_ATTACHMENT_OUTPUT = 1 << 4;
        const BOTTOM_OF_PIPE = 1 << 5;
        const HOST = 1 << 6;
    }
}

bitflags! {
    /// Memory access kinds.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct AccessFlags: u32 {
        const TRANSFER_READ = 1 << 0;
        const TRANSFER_WRITE = 1 << 1;
        const SHADER_READ = 1 << 2;
        const SHADER_WRITE = 1 << 3;
        const COLOR_ATTACHMENT_WRITE = 1 << 4;
        const HOST_READ = 1 << 5;
        const HOST_WRITE = 1 << 6;
    }
}

impl AccessFlags {
    /// Access kinds that modify memory.
    pub const WRITES: Self = Self::TRANSFER_WRITE
        .union(Self::SHADER_WRITE)
        .union(Self::COLOR_ATTACHMENT_WRITE)
        .union(Self::HOST_WRITE);

    pub fn has_write(self) -> bool {
        self.intersects(Self::WRITES)
    }
}

/// Image layouts a mip level can be in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ImageLayout {
    /// Contents are undefined and may be discarded by the next transition.
    Undefined,
    TransferSrc,
    TransferDst,
    /// Readable and writable by compute shaders.
    General,
}

/// One side of a synchronization edge: where, what kind of access, and in
/// which layout the level must be.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Access {
    pub stages: PipelineStages,
    pub access: AccessFlags,
    pub layout: ImageLayout,
}

impl Access {
    pub const fn new(stages: PipelineStages, access: AccessFlags, layout: ImageLayout) -> Self {
        Self {
            stages,
            access,
            layout,
        }
    }

    /// Nothing to wait for, contents undefined.
    pub const NONE: Self = Self::new(
        PipelineStages::TOP_OF_PIPE,
        AccessFlags::empty(),
        ImageLayout::Undefined,
    );
    pub const TRANSFER_READ: Self = Self::new(
        PipelineStages::TRANSFER,
        AccessFlags::TRANSFER_READ,
        ImageLayout::TransferSrc,
    );
    pub const TRANSFER_WRITE: Self = Self::new(
        PipelineStages::TRANSFER,
        AccessFlags::TRANSFER_WRITE,
        ImageLayout::TransferDst,
    );
    pub const COMPUTE_READ: Self = Self::new(
        PipelineStages::COMPUTE_SHADER,
        AccessFlags::SHADER_READ,
        ImageLayout::General,
    );
    pub const COMPUTE_WRITE: Self = Self::new(
        PipelineStages::COMPUTE_SHADER,
        AccessFlags::SHADER_WRITE,
        ImageLayout::General,
    );
    pub const COMPUTE_READ_WRITE: Self = Self::new(
        PipelineStages::COMPUTE_SHADER,
        AccessFlags::SHADER_READ.union(AccessFlags::SHADER_WRITE),
        ImageLayout::General,
    );

    /// The same access with a different layout.
    pub const fn in_layout(self, layout: ImageLayout) -> Self {
        Self::new(self.stages, self.access, layout)
    }

    /// Whether this access, used as a barrier destination, makes memory
    /// visible to `other`.
    pub fn covers(&self, other: &Access) -> bool {
        self.stages.contains(other.stages) && self.access.contains(other.access)
    }
}

/// What a barrier applies to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BarrierScope {
    /// Global memory barrier, no layout change.
    Memory,
    /// Image barrier over a contiguous level range of one pyramid.
    Image {
        pyramid: PyramidId,
        levels: Range<u32>,
        old_layout: ImageLayout,
        new_layout: ImageLayout,
    },
}

/// A synchronization edge between preceding and following accesses.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Barrier {
    pub src_stages: PipelineStages,
    pub src_access: AccessFlags,
    pub dst_stages: PipelineStages,
    pub dst_access: AccessFlags,
    pub scope: BarrierScope,
}

impl Barrier {
    /// Source side as an [`Access`] in `layout`.
    pub fn src(&self, layout: ImageLayout) -> Access {
        Access::new(self.src_stages, self.src_access, layout)
    }

    /// Destination side as an [`Access`] in `layout`.
    pub fn dst(&self, layout: ImageLayout) -> Access {
        Access::new(self.dst_stages, self.dst_access, layout)
    }

    pub fn is_layout_transition(&self) -> bool {
        matches!(
            self.scope,
            BarrierScope::Image { old_layout, new_layout, .. } if old_layout != new_layout
        )
    }
}

/// Builds barriers from access descriptions.
pub struct BarrierBuilder;

impl BarrierBuilder {
    /// Image barrier moving `levels` of `pyramid` from `from` to `to`.
    pub fn image(pyramid: &MipPyramid, levels: Range<u32>, from: Access, to: Access) -> Barrier {
        Barrier {
            src_stages: from.stages,
            src_access: from.access,
            dst_stages: to.stages,
            dst_access: to.access,
            scope: BarrierScope::Image {
                pyramid: pyramid.id(),
                levels,
                old_layout: from.layout,
                new_layout: to.layout,
            },
        }
    }

    /// Global memory barrier. Layouts of `from` and `to` are ignored.
    pub fn memory(from: Access, to: Access) -> Barrier {
        Barrier {
            src_stages: from.stages,
            src_access: from.access,
            dst_stages: to.stages,
            dst_access: to.access,
            scope: BarrierScope::Memory,
        }
    }

    /// Barriers moving `levels` of `pyramid` from whatever they currently are
    /// to `to`. Contiguous levels sharing a layout and pending accesses are
    /// merged into one barrier. Levels already in `to.layout` with nothing
    /// pending are skipped.
    pub fn transition(pyramid: &MipPyramid, levels: Range<u32>, to: Access) -> Vec<Barrier> {
        let mut barriers: Vec<Barrier> = Vec::new();
        let mut run: Option<(Range<u32>, Access)> = None;
        for level in levels {
            let state = pyramid.level_state(level);
            let from = state.as_source();
            if state.is_settled_for(&to) {
                if let Some((range, from)) = run.take() {
                    barriers.push(Self::image(pyramid, range, from, to));
                }
                continue;
            }
            run = match run.take() {
                Some((range, prev)) if prev == from && range.end == level => {
                    Some((range.start..level + 1, prev))
                }
                Some((range, prev)) => {
                    barriers.push(Self::image(pyramid, range, prev, to));
                    Some((level..level + 1, from))
                }
                None => Some((level..level + 1, from)),
            };
        }
        if let Some((range, from)) = run {
            barriers.push(Self::image(pyramid, range, from, to));
        }
        barriers
    }
}
