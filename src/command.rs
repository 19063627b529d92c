//! Recorded command sequences.
//!
//! A [`CommandSequence`] is built against the [`MipPyramid`] trackers of the
//! pyramids it touches, so every command is checked against the barriers
//! recorded before it. Only a sequence that recorded cleanly is lowered onto
//! a `wgpu::CommandEncoder`.
use crate::core::Error;
use crate::pyramid::{MipPyramid, PyramidId};
use crate::sync::{Access, Barrier};
use log::debug;
use std::ops::Range;

/// Parameters pushed before a dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushConstants {
    PerLevel {
        src_level: u32,
    },
    Subgroup {
        base_level: u32,
        remaining_mip_levels: u32,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Barrier(Barrier),
    /// Copy the staging buffer into `level`.
    CopyBufferToImage { pyramid: PyramidId, level: u32 },
    /// Copy `level` into its region of the destaging buffer.
    CopyImageToBuffer { pyramid: PyramidId, level: u32 },
    /// Linear-filtered rescale of the full `src_level` into `dst_level`.
    Blit {
        pyramid: PyramidId,
        src_level: u32,
        dst_level: u32,
    },
    PushConstants(PushConstants),
    /// Reads `src_level` and writes every level in `dst_levels`.
    Dispatch {
        pyramid: PyramidId,
        src_level: u32,
        dst_levels: Range<u32>,
        group_count: [u32; 3],
    },
}

/// An ordered list of commands whose ordering was validated while recording.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CommandSequence {
    commands: Vec<Command>,
}

impl CommandSequence {
    pub fn new() -> Self {
        Self::default()
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

    pub fn barrier_count(&self) -> usize {
        self.count(|command| matches!(command, Command::Barrier(_)))
    }

    pub fn count(&self, predicate: impl Fn(&Command) -> bool) -> usize {
        self.commands.iter().filter(|command| predicate(command)).count()
    }

    /// Runs of commands between barriers. Each run can be lowered into one
    /// pass, since nothing inside it depends on anything else inside it.
    pub fn passes(&self) -> impl Iterator<Item = &[Command]> {
        self.commands
            .split(|command| matches!(command, Command::Barrier(_)))
            .filter(|pass| !pass.is_empty())
    }

    pub fn barrier(&mut self, pyramid: &mut MipPyramid, barrier: Barrier) -> Result<(), Error> {
        pyramid.apply_barrier(&barrier)?;
        debug!("barrier {:?}", barrier);
        self.commands.push(Command::Barrier(barrier));
        Ok(())
    }

    pub fn barriers(
        &mut self,
        pyramid: &mut MipPyramid,
        barriers: impl IntoIterator<Item = Barrier>,
    ) -> Result<(), Error> {
        for barrier in barriers {
            self.barrier(pyramid, barrier)?;
        }
        Ok(())
    }

    pub fn copy_buffer_to_image(&mut self, pyramid: &mut MipPyramid, level: u32) -> Result<(), Error> {
        pyramid.record_access(level, Access::TRANSFER_WRITE)?;
        self.commands.push(Command::CopyBufferToImage {
            pyramid: pyramid.id(),
            level,
        });
        Ok(())
    }

    pub fn copy_image_to_buffer(&mut self, pyramid: &mut MipPyramid, level: u32) -> Result<(), Error> {
        pyramid.record_access(level, Access::TRANSFER_READ)?;
        self.commands.push(Command::CopyImageToBuffer {
            pyramid: pyramid.id(),
            level,
        });
        Ok(())
    }

    pub fn blit(
        &mut self,
        pyramid: &mut MipPyramid,
        src_level: u32,
        dst_level: u32,
    ) -> Result<(), Error> {
        pyramid.record_access(src_level, Access::TRANSFER_READ)?;
        pyramid.record_access(dst_level, Access::TRANSFER_WRITE)?;
        self.commands.push(Command::Blit {
            pyramid: pyramid.id(),
            src_level,
            dst_level,
        });
        Ok(())
    }

    pub fn push_constants(&mut self, constants: PushConstants) {
        self.commands.push(Command::PushConstants(constants));
    }

    pub fn dispatch(
        &mut self,
        pyramid: &mut MipPyramid,
        src_level: u32,
        dst_levels: Range<u32>,
        group_count: [u32; 3],
    ) -> Result<(), Error> {
        pyramid.record_access(src_level, Access::COMPUTE_READ)?;
        for level in dst_levels.clone() {
            pyramid.record_access(level, Access::COMPUTE_WRITE)?;
        }
        self.commands.push(Command::Dispatch {
            pyramid: pyramid.id(),
            src_level,
            dst_levels,
            group_count,
        });
        Ok(())
    }
}
