use super::{check_pyramid, check_usage, group_count, sampled_entry, storage_entry, unsupported};
use crate::command::{Command, CommandSequence, PushConstants};
use crate::context::GpuContext;
use crate::core::*;
use crate::pyramid::{GpuPyramid, MipPyramid};
use crate::sync::{Access, BarrierBuilder};
use bytemuck::{Pod, Zeroable};
use log::{debug, info};
use std::collections::HashMap;
use std::ops::Range;

/// Levels written by one dispatch.
pub const MIPS_PER_DISPATCH: u32 = 5;

#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
struct SubgroupParams {
    base_level: u32,
    remaining_mip_levels: u32,
}

/// Splits levels `1..levels` into ranges of at most [`MIPS_PER_DISPATCH`]
/// levels, in generation order. Ranges are cut from the smallest level
/// upwards, so only the first range can be short.
///
/// ```
/// # use mipmap_bench::chunkify;
/// assert_eq!(chunkify(13), vec![1..3, 3..8, 8..13]);
/// assert_eq!(chunkify(6), vec![1..6]);
/// assert!(chunkify(1).is_empty());
/// ```
pub fn chunkify(levels: u32) -> Vec<Range<u32>> {
    let mut chunks = Vec::new();
    let mut end = levels;
    while end > 1 {
        let start = end.saturating_sub(MIPS_PER_DISPATCH).max(1);
        chunks.push(start..end);
        end = start;
    }
    chunks.reverse();
    chunks
}

/// Reductions after the first one that fit inside a subgroup of `size`
/// invocations, `floor(log4(size))`.
pub fn subgroup_steps(size: u32) -> Result<u32, Error> {
    match size {
        8 => Ok(1),
        16 | 32 => Ok(2),
        64 | 128 => Ok(3),
        _ => Err(Error::UnsupportedSubgroupSize(size)),
    }
}

/// Generates up to five levels per dispatch, reducing inside subgroups
/// where the quads allow it. Dispatches are separated by memory barriers
/// and every level stays in the `General` layout.
#[derive(Debug, Default)]
pub struct SubgroupComputeStrategy {
    prepared: Option<Prepared>,
}

#[derive(Debug)]
struct Prepared {
    pipeline: wgpu::ComputePipeline,
    /// Keyed by the base level of each dispatch.
    bind_groups: HashMap<u32, wgpu::BindGroup>,
    // keeps the unused output slots alive
    _sinks: Vec<wgpu::Texture>,
}

impl SubgroupComputeStrategy {
    const NAME: &'static str = "Compute shader mipmap generation with subgroup operation";

    /// 1×1 targets bound to the output slots a short dispatch never writes.
    /// Every slot gets its own texture, a texture may only be bound once as
    /// a writable storage texture.
    fn create_sinks(device: &wgpu::Device) -> Vec<wgpu::Texture> {
        (0..MIPS_PER_DISPATCH - 1)
            .map(|_| {
                device.create_texture(&wgpu::TextureDescriptor {
                    label: Some("mipmap-bench-subgroup-sink"),
                    size: wgpu::Extent3d {
                        width: 1,
                        height: 1,
                        depth_or_array_layers: 1,
                    },
                    mip_level_count: 1,
                    sample_count: 1,
                    dimension: wgpu::TextureDimension::D2,
                    format: GpuPyramid::FORMAT,
                    usage: wgpu::TextureUsages::STORAGE_BINDING,
                    view_formats: &[],
                })
            })
            .collect()
    }
}

impl MipmapStrategy for SubgroupComputeStrategy {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn output_file_name(&self) -> &'static str {
        "compute_subgroup.png"
    }

    fn required_usage(&self) -> wgpu::TextureUsages {
        wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::STORAGE_BINDING
    }

    fn required_initial_layout(&self) -> Option<Access> {
        Some(Access::COMPUTE_READ_WRITE)
    }

    fn prepare(&mut self, ctx: &GpuContext, pyramid: &GpuPyramid) -> Result<(), Error> {
        check_usage(self.required_usage(), pyramid)?;
        let subgroup_size = ctx.capabilities().min_subgroup_size;
        let steps = subgroup_steps(subgroup_size)?;
        info!(
            "subgroup size {} allows {} in-subgroup reductions",
            subgroup_size, steps
        );
        let device = ctx.device();

        let mut entries = vec![sampled_entry(0, wgpu::ShaderStages::COMPUTE)];
        entries.extend((1..=MIPS_PER_DISPATCH).map(storage_entry));
        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("mipmap-bench-subgroup-bg-layout"),
            entries: &entries,
        });
        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: None,
            bind_group_layouts: &[&bind_group_layout],
            push_constant_ranges: &[wgpu::PushConstantRange {
                stages: wgpu::ShaderStages::COMPUTE,
                range: 0..std::mem::size_of::<SubgroupParams>() as u32,
            }],
        });
        let module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("mipmap-bench-subgroup-shader"),
            source: wgpu::ShaderSource::Wgsl(include_str!("shaders/subgroup_mipmap.wgsl").into()),
        });
        let constants = HashMap::from([("SUBGROUP_STEPS".to_string(), steps as f64)]);
        let pipeline = device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
            label: Some("mipmap-bench-subgroup-pipeline"),
            layout: Some(&pipeline_layout),
            module: &module,
            entry_point: "main",
            compilation_options: wgpu::PipelineCompilationOptions {
                constants: &constants,
                ..Default::default()
            },
            cache: None,
        });

        let sinks = Self::create_sinks(device);
        let sink_views: Vec<_> = sinks
            .iter()
            .map(|sink| sink.create_view(&wgpu::TextureViewDescriptor::default()))
            .collect();
        let mut bind_groups = HashMap::new();
        for chunk in chunkify(pyramid.state().levels()) {
            let base_level = chunk.start - 1;
            let remaining = chunk.end - chunk.start;
            let src_view = pyramid.levels_view(0..base_level + 1);
            let dst_views: Vec<_> = (1..=MIPS_PER_DISPATCH)
                .filter(|slot| *slot <= remaining)
                .map(|slot| pyramid.level_view(base_level + slot))
                .collect();
            let mut entries = vec![wgpu::BindGroupEntry {
                binding: 0,
                resource: wgpu::BindingResource::TextureView(&src_view),
            }];
            for slot in 1..=MIPS_PER_DISPATCH {
                let view = match dst_views.get(slot as usize - 1) {
                    Some(view) => view,
                    None => &sink_views[slot as usize - 2],
                };
                entries.push(wgpu::BindGroupEntry {
                    binding: slot,
                    resource: wgpu::BindingResource::TextureView(view),
                });
            }
            let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: None,
                layout: &bind_group_layout,
                entries: &entries,
            });
            bind_groups.insert(base_level, bind_group);
        }
        self.prepared = Some(Prepared {
            pipeline,
            bind_groups,
            _sinks: sinks,
        });
        Ok(())
    }

    fn record_commands(
        &self,
        seq: &mut CommandSequence,
        pyramid: &mut MipPyramid,
    ) -> Result<(), Error> {
        for (i, chunk) in chunkify(pyramid.levels()).into_iter().enumerate() {
            if i != 0 {
                let barrier = BarrierBuilder::memory(Access::COMPUTE_WRITE, Access::COMPUTE_READ);
                seq.barrier(pyramid, barrier)?;
            }
            let base_level = chunk.start - 1;
            seq.push_constants(PushConstants::Subgroup {
                base_level,
                remaining_mip_levels: chunk.end - chunk.start,
            });
            let groups = group_count(pyramid.extent(chunk.start));
            seq.dispatch(pyramid, base_level, chunk, groups)?;
        }
        Ok(())
    }

    fn encode(
        &self,
        _ctx: &GpuContext,
        pyramid: &GpuPyramid,
        seq: &CommandSequence,
        encoder: &mut wgpu::CommandEncoder,
    ) -> Result<(), Error> {
        let prepared = self.prepared.as_ref().ok_or(Error::NotPrepared(Self::NAME))?;
        for commands in seq.passes() {
            let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: None,
                timestamp_writes: None,
            });
            pass.set_pipeline(&prepared.pipeline);
            for command in commands {
                match command {
                    &Command::PushConstants(PushConstants::Subgroup {
                        base_level,
                        remaining_mip_levels,
                    }) => {
                        let params = SubgroupParams {
                            base_level,
                            remaining_mip_levels,
                        };
                        pass.set_push_constants(0, bytemuck::bytes_of(&params));
                    }
                    Command::Dispatch {
                        pyramid: id,
                        src_level,
                        dst_levels,
                        group_count: [x, y, z],
                    } => {
                        check_pyramid(pyramid, *id)?;
                        let bind_group = prepared
                            .bind_groups
                            .get(src_level)
                            .ok_or_else(|| unsupported(Self::NAME, command))?;
                        debug!(
                            "dispatch levels {:?} from {} with {}x{} groups",
                            dst_levels, src_level, x, y
                        );
                        pass.set_bind_group(0, bind_group, &[]);
                        pass.dispatch_workgroups(*x, *y, *z);
                    }
                    other => return Err(unsupported(Self::NAME, other)),
                }
            }
        }
        Ok(())
    }
}
