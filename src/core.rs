use crate::benchmark::{BenchmarkEvent, BenchmarkState};
use crate::command::CommandSequence;
use crate::context::{GpuContext, QueueRole};
use crate::pyramid::{GpuPyramid, HazardKind, MipPyramid};
use crate::sync::Access;
use thiserror::Error;

/// MipmapStrategy describes one way of filling levels `1..levels` of a
/// pyramid from level 0.
///
/// A strategy is used in three steps: [`prepare`](MipmapStrategy::prepare)
/// creates pipelines and bindings for one pyramid,
/// [`record_commands`](MipmapStrategy::record_commands) records a validated
/// [`CommandSequence`] against the pyramid's tracker and
/// [`encode`](MipmapStrategy::encode) lowers that sequence onto an encoder.
pub trait MipmapStrategy {
    /// Label used when reporting timings.
    fn name(&self) -> &'static str;

    /// File written into the output directory for this strategy's atlas.
    fn output_file_name(&self) -> &'static str;

    /// Texture usage the pyramid must be created with, on top of the copy
    /// usages needed for staging and destaging.
    fn required_usage(&self) -> wgpu::TextureUsages;

    /// Access every level must be transitioned to before
    /// [`record_commands`](MipmapStrategy::record_commands) runs, or `None`
    /// when the strategy handles layouts itself.
    fn required_initial_layout(&self) -> Option<Access>;

    /// Queue role the generated commands are submitted to.
    fn queue_role(&self) -> QueueRole {
        QueueRole::Compute
    }

    /// Creates the device objects needed to generate mipmaps for `pyramid`.
    fn prepare(&mut self, ctx: &GpuContext, pyramid: &GpuPyramid) -> Result<(), Error>;

    /// Records the commands generating every level after the first.
    fn record_commands(
        &self,
        seq: &mut CommandSequence,
        pyramid: &mut MipPyramid,
    ) -> Result<(), Error>;

    /// Encodes a sequence produced by
    /// [`record_commands`](MipmapStrategy::record_commands).
    ///
    /// Expectations:
    /// - `prepare` was called with the same `pyramid`.
    fn encode(
        &self,
        ctx: &GpuContext,
        pyramid: &GpuPyramid,
        seq: &CommandSequence,
        encoder: &mut wgpu::CommandEncoder,
    ) -> Result<(), Error>;
}

/// An error that occurred while benchmarking.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum Error {
    #[error("No device passes the eligibility gate.\nA device must support timestamp queries inside encoders, push constants and subgroup shuffles with a subgroup size of at least 8.")]
    DeviceUnsupported,
    #[error("No queue family offers the `{0:?}` capability.")]
    QueueFamilyMissing(QueueRole),
    #[error("Failed to open the device: {0}")]
    RequestDevice(String),
    #[error("Unsupported subgroup size `{0}`. Subgroup sizes must be a power of two between 8 and 128.")]
    UnsupportedSubgroupSize(u32),
    #[error("Unsupported image extent `{width}x{height}`. Extents must be between 1 and {max}.")]
    UnsupportedExtent { width: u32, height: u32, max: u32 },
    #[error("Unsupported texture usage `{0:?}`.")]
    UnsupportedUsage(wgpu::TextureUsages),
    #[error("Failed to decode image: {0}")]
    DecodeFailure(String),
    #[error("Failed to encode image: {0}")]
    EncodeFailure(String),
    #[error("Failed to get timestamp query: {0}")]
    TimestampReadFailure(String),
    #[error("Failed to read back pyramid: {0}")]
    ReadbackFailure(String),
    #[error("Hazard on pyramid {pyramid} level {level}: {kind}")]
    Hazard {
        pyramid: usize,
        level: u32,
        kind: HazardKind,
    },
    #[error("Pyramid {0} is not known to this sequence.")]
    UnknownPyramid(usize),
    #[error("`{strategy}` cannot encode `{command}`. Was the sequence recorded by a different strategy?")]
    UnsupportedCommand {
        strategy: &'static str,
        command: String,
    },
    #[error("`{0}` was encoded before it was prepared.")]
    NotPrepared(&'static str),
    #[error("Invalid benchmark transition `{event:?}` from state `{from:?}`.")]
    InvalidTransition {
        from: BenchmarkState,
        event: BenchmarkEvent,
    },
}
