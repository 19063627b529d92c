use super::{check_pyramid, check_usage, group_count, sampled_entry, storage_entry, unsupported};
use crate::command::{Command, CommandSequence, PushConstants};
use crate::context::GpuContext;
use crate::core::*;
use crate::pyramid::{GpuPyramid, MipPyramid};
use crate::sync::{Access, BarrierBuilder};
use bytemuck::{Pod, Zeroable};
use log::debug;
use wgpu::{
    BindGroup, BindGroupDescriptor, BindGroupEntry, BindGroupLayoutDescriptor, BindingResource,
    CommandEncoder, ComputePassDescriptor, ComputePipeline, ComputePipelineDescriptor,
    PipelineLayoutDescriptor, PushConstantRange, ShaderModuleDescriptor, ShaderSource,
    ShaderStages, TextureUsages,
};

#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
struct PerLevelParams {
    src_level: u32,
}

/// Generates mipmaps with one compute dispatch per level, separated by a
/// memory barrier. All levels stay in the `General` layout.
#[derive(Debug, Default)]
pub struct PerLevelComputeStrategy {
    prepared: Option<Prepared>,
}

#[derive(Debug)]
struct Prepared {
    pipeline: ComputePipeline,
    /// Indexed by source level.
    bind_groups: Vec<BindGroup>,
}

impl PerLevelComputeStrategy {
    const NAME: &'static str = "Compute shader mipmap generation with per-level barriers";
}

impl MipmapStrategy for PerLevelComputeStrategy {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn output_file_name(&self) -> &'static str {
        "compute_per_level_barriers.png"
    }

    fn required_usage(&self) -> TextureUsages {
        TextureUsages::TEXTURE_BINDING | TextureUsages::STORAGE_BINDING
    }

    fn required_initial_layout(&self) -> Option<Access> {
        Some(Access::COMPUTE_READ_WRITE)
    }

    fn prepare(&mut self, ctx: &GpuContext, pyramid: &GpuPyramid) -> Result<(), Error> {
        check_usage(self.required_usage(), pyramid)?;
        let device = ctx.device();
        let bind_group_layout = device.create_bind_group_layout(&BindGroupLayoutDescriptor {
            label: Some("mipmap-bench-per-level-bg-layout"),
            entries: &[sampled_entry(0, ShaderStages::COMPUTE), storage_entry(1)],
        });
        let pipeline_layout = device.create_pipeline_layout(&PipelineLayoutDescriptor {
            label: None,
            bind_group_layouts: &[&bind_group_layout],
            push_constant_ranges: &[PushConstantRange {
                stages: ShaderStages::COMPUTE,
                range: 0..std::mem::size_of::<PerLevelParams>() as u32,
            }],
        });
        let module = device.create_shader_module(ShaderModuleDescriptor {
            label: Some("mipmap-bench-per-level-shader"),
            source: ShaderSource::Wgsl(include_str!("shaders/mipmap.wgsl").into()),
        });
        let pipeline = device.create_compute_pipeline(&ComputePipelineDescriptor {
            label: Some("mipmap-bench-per-level-pipeline"),
            layout: Some(&pipeline_layout),
            module: &module,
            entry_point: "main",
            compilation_options: Default::default(),
            cache: None,
        });
        let bind_groups = (1..pyramid.state().levels())
            .map(|dst_level| {
                let src_view = pyramid.levels_view(0..dst_level);
                let dst_view = pyramid.level_view(dst_level);
                device.create_bind_group(&BindGroupDescriptor {
                    label: None,
                    layout: &bind_group_layout,
                    entries: &[
                        BindGroupEntry {
                            binding: 0,
                            resource: BindingResource::TextureView(&src_view),
                        },
                        BindGroupEntry {
                            binding: 1,
                            resource: BindingResource::TextureView(&dst_view),
                        },
                    ],
                })
            })
            .collect();
        self.prepared = Some(Prepared {
            pipeline,
            bind_groups,
        });
        Ok(())
    }

    fn record_commands(
        &self,
        seq: &mut CommandSequence,
        pyramid: &mut MipPyramid,
    ) -> Result<(), Error> {
        for src_level in 0..pyramid.levels().saturating_sub(1) {
            let dst_level = src_level + 1;
            if src_level != 0 {
                let barrier = BarrierBuilder::memory(Access::COMPUTE_WRITE, Access::COMPUTE_READ);
                seq.barrier(pyramid, barrier)?;
            }
            seq.push_constants(PushConstants::PerLevel { src_level });
            let groups = group_count(pyramid.extent(dst_level));
            seq.dispatch(pyramid, src_level, dst_level..dst_level + 1, groups)?;
        }
        Ok(())
    }

    fn encode(
        &self,
        _ctx: &GpuContext,
        pyramid: &GpuPyramid,
        seq: &CommandSequence,
        encoder: &mut CommandEncoder,
    ) -> Result<(), Error> {
        let prepared = self.prepared.as_ref().ok_or(Error::NotPrepared(Self::NAME))?;
        for commands in seq.passes() {
            let mut pass = encoder.begin_compute_pass(&ComputePassDescriptor {
                label: None,
                timestamp_writes: None,
            });
            pass.set_pipeline(&prepared.pipeline);
            for command in commands {
                match command {
                    &Command::PushConstants(PushConstants::PerLevel { src_level }) => {
                        let params = PerLevelParams { src_level };
                        pass.set_push_constants(0, bytemuck::bytes_of(&params));
                    }
                    Command::Dispatch {
                        pyramid: id,
                        src_level,
                        group_count: [x, y, z],
                        ..
                    } => {
                        check_pyramid(pyramid, *id)?;
                        debug!("dispatch level {} with {}x{} groups", src_level, x, y);
                        pass.set_bind_group(0, &prepared.bind_groups[*src_level as usize], &[]);
                        pass.dispatch_workgroups(*x, *y, *z);
                    }
                    other => return Err(unsupported(Self::NAME, other)),
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pyramid::PyramidId;
    use crate::sync::{AccessFlags, BarrierScope, ImageLayout, PipelineStages};

    fn general(width: u32, height: u32) -> MipPyramid {
        let mut pyramid = MipPyramid::new(PyramidId(1), width, height);
        pyramid.level_state_mut(0).layout = ImageLayout::TransferDst;
        let mut seq = CommandSequence::new();
        let barriers =
            BarrierBuilder::transition(&pyramid, 0..pyramid.levels(), Access::COMPUTE_READ_WRITE);
        seq.barriers(&mut pyramid, barriers).unwrap();
        pyramid
    }

    fn dispatches(seq: &CommandSequence) -> Vec<(u32, [u32; 3])> {
        seq.commands()
            .iter()
            .filter_map(|c| match c {
                Command::Dispatch {
                    src_level,
                    group_count,
                    ..
                } => Some((*src_level, *group_count)),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn one_dispatch_per_level() {
        let mut pyramid = general(256, 256);
        let mut seq = CommandSequence::new();
        PerLevelComputeStrategy::default()
            .record_commands(&mut seq, &mut pyramid)
            .unwrap();
        assert_eq!(
            dispatches(&seq),
            vec![
                (0, [8, 8, 1]),
                (1, [4, 4, 1]),
                (2, [2, 2, 1]),
                (3, [1, 1, 1]),
                (4, [1, 1, 1]),
                (5, [1, 1, 1]),
                (6, [1, 1, 1]),
                (7, [1, 1, 1]),
            ]
        );
        assert_eq!(seq.barrier_count(), 7);
        assert_eq!(seq.passes().count(), 8);
    }

    #[test]
    fn barriers_are_memory_only() {
        let mut pyramid = general(64, 32);
        let mut seq = CommandSequence::new();
        PerLevelComputeStrategy::default()
            .record_commands(&mut seq, &mut pyramid)
            .unwrap();
        // the first command is the first dispatch's parameters, not a barrier
        assert_eq!(
            seq.commands()[0],
            Command::PushConstants(PushConstants::PerLevel { src_level: 0 })
        );
        for command in seq.commands() {
            if let Command::Barrier(barrier) = command {
                assert_eq!(barrier.scope, BarrierScope::Memory);
                assert_eq!(barrier.src_stages, PipelineStages::COMPUTE_SHADER);
                assert_eq!(barrier.src_access, AccessFlags::SHADER_WRITE);
                assert_eq!(barrier.dst_access, AccessFlags::SHADER_READ);
            }
        }
        assert!((0..pyramid.levels()).all(|l| pyramid.level_state(l).layout == ImageLayout::General));
    }

    #[test]
    fn odd_extents_round_up() {
        let mut pyramid = general(100, 37);
        let mut seq = CommandSequence::new();
        PerLevelComputeStrategy::default()
            .record_commands(&mut seq, &mut pyramid)
            .unwrap();
        // level 1 is 50x18
        assert_eq!(dispatches(&seq)[0], (0, [4, 2, 1]));
    }

    #[test]
    fn needs_general_layout() {
        let mut pyramid = MipPyramid::new(PyramidId(1), 16, 16);
        let mut seq = CommandSequence::new();
        let err = PerLevelComputeStrategy::default()
            .record_commands(&mut seq, &mut pyramid)
            .unwrap_err();
        assert!(matches!(err, Error::Hazard { level: 0, .. }));
    }
}
