use super::{check_pyramid, check_usage, sampled_entry, unsupported};
use crate::command::{Command, CommandSequence};
use crate::context::{GpuContext, QueueRole};
use crate::core::*;
use crate::pyramid::{GpuPyramid, MipPyramid};
use crate::sync::{Access, BarrierBuilder, ImageLayout};
use log::debug;

/// Generates mipmaps with the fixed-function rescale, one level at a time.
///
/// Before every blit the source level moves to `TransferSrc` and the
/// destination level to `TransferDst`, so level `k + 1` never starts before
/// level `k` is written.
#[derive(Debug, Default)]
pub struct BlitStrategy {
    prepared: Option<Prepared>,
}

#[derive(Debug)]
struct Prepared {
    pipeline: wgpu::RenderPipeline,
    /// Indexed by source level.
    bind_groups: Vec<wgpu::BindGroup>,
    /// Indexed by level.
    targets: Vec<wgpu::TextureView>,
}

impl BlitStrategy {
    const NAME: &'static str = "Blit based mipmap generation";
}

impl MipmapStrategy for BlitStrategy {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn output_file_name(&self) -> &'static str {
        "blit.png"
    }

    fn required_usage(&self) -> wgpu::TextureUsages {
        wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::RENDER_ATTACHMENT
    }

    fn required_initial_layout(&self) -> Option<Access> {
        None
    }

    fn queue_role(&self) -> QueueRole {
        QueueRole::Graphics
    }

    fn prepare(&mut self, ctx: &GpuContext, pyramid: &GpuPyramid) -> Result<(), Error> {
        check_usage(self.required_usage(), pyramid)?;
        let device = ctx.device();
        // A linear filter sampling the shared corner of four texels is a box filter.
        // In practice, the final result may be implementation dependent
        // - [Vulkan](https://www.khronos.org/registry/vulkan/specs/1.2-extensions/html/vkspec.html#textures-texel-linear-filtering)
        // - [Metal](https://developer.apple.com/documentation/metal/mtlsamplerminmagfilter/linear)
        // - [DX12](https://docs.microsoft.com/en-us/windows/win32/api/d3d12/ne-d3d12-d3d12_filter)
        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("mipmap-bench-blit-sampler"),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            address_mode_w: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            mipmap_filter: wgpu::FilterMode::Nearest,
            ..Default::default()
        });
        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("mipmap-bench-blit-bg-layout"),
            entries: &[
                sampled_entry(0, wgpu::ShaderStages::FRAGMENT),
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                    count: None,
                },
            ],
        });
        let layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: None,
            bind_group_layouts: &[&bind_group_layout],
            push_constant_ranges: &[],
        });
        let module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("mipmap-bench-blit-shader"),
            source: wgpu::ShaderSource::Wgsl(include_str!("shaders/blit.wgsl").into()),
        });
        let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("mipmap-bench-blit-pipeline"),
            layout: Some(&layout),
            vertex: wgpu::VertexState {
                module: &module,
                entry_point: "vs_main",
                compilation_options: Default::default(),
                buffers: &[],
            },
            fragment: Some(wgpu::FragmentState {
                module: &module,
                entry_point: "fs_main",
                compilation_options: Default::default(),
                targets: &[Some(GpuPyramid::FORMAT.into())],
            }),
            primitive: wgpu::PrimitiveState {
                topology: wgpu::PrimitiveTopology::TriangleList,
                cull_mode: None,
                ..Default::default()
            },
            depth_stencil: None,
            multisample: wgpu::MultisampleState::default(),
            multiview: None,
            cache: None,
        });

        let levels = pyramid.state().levels();
        let targets = (0..levels)
            .map(|level| pyramid.level_view(level))
            .collect::<Vec<_>>();
        let bind_groups = targets
            .iter()
            .take(levels.saturating_sub(1) as usize)
            .map(|src_view| {
                device.create_bind_group(&wgpu::BindGroupDescriptor {
                    label: None,
                    layout: &bind_group_layout,
                    entries: &[
                        wgpu::BindGroupEntry {
                            binding: 0,
                            resource: wgpu::BindingResource::TextureView(src_view),
                        },
                        wgpu::BindGroupEntry {
                            binding: 1,
                            resource: wgpu::BindingResource::Sampler(&sampler),
                        },
                    ],
                })
            })
            .collect();
        self.prepared = Some(Prepared {
            pipeline,
            bind_groups,
            targets,
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
            // level 0 was left in TransferDst by staging, and the host has
            // waited for that copy
            let src_from = if src_level == 0 {
                Access::NONE.in_layout(ImageLayout::TransferDst)
            } else {
                Access::TRANSFER_WRITE
            };
            let to_src =
                BarrierBuilder::image(pyramid, src_level..dst_level, src_from, Access::TRANSFER_READ);
            let to_dst = BarrierBuilder::image(
                pyramid,
                dst_level..dst_level + 1,
                Access::NONE,
                Access::TRANSFER_WRITE,
            );
            seq.barriers(pyramid, [to_src, to_dst])?;
            seq.blit(pyramid, src_level, dst_level)?;
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
        for command in seq.commands() {
            match command {
                Command::Barrier(_) => {}
                &Command::Blit {
                    pyramid: id,
                    src_level,
                    dst_level,
                } => {
                    check_pyramid(pyramid, id)?;
                    debug!("blit {} -> {}", src_level, dst_level);
                    let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                        label: None,
                        color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                            view: &prepared.targets[dst_level as usize],
                            resolve_target: None,
                            ops: wgpu::Operations {
                                // the whole level is overwritten
                                load: wgpu::LoadOp::Clear(wgpu::Color::TRANSPARENT),
                                store: wgpu::StoreOp::Store,
                            },
                        })],
                        depth_stencil_attachment: None,
                        timestamp_writes: None,
                        occlusion_query_set: None,
                    });
                    pass.set_pipeline(&prepared.pipeline);
                    pass.set_bind_group(0, &prepared.bind_groups[src_level as usize], &[]);
                    pass.draw(0..3, 0..1);
                }
                other => return Err(unsupported(Self::NAME, other)),
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pyramid::PyramidId;
    use crate::sync::{AccessFlags, BarrierScope, PipelineStages};

    fn staged(width: u32, height: u32) -> MipPyramid {
        let mut pyramid = MipPyramid::new(PyramidId(0), width, height);
        pyramid.level_state_mut(0).layout = ImageLayout::TransferDst;
        pyramid
    }

    #[test]
    fn one_blit_per_level() {
        let mut pyramid = staged(256, 256);
        let mut seq = CommandSequence::new();
        BlitStrategy::default()
            .record_commands(&mut seq, &mut pyramid)
            .unwrap();
        let blits: Vec<_> = seq
            .commands()
            .iter()
            .filter_map(|c| match c {
                Command::Blit {
                    src_level,
                    dst_level,
                    ..
                } => Some((*src_level, *dst_level)),
                _ => None,
            })
            .collect();
        assert_eq!(blits, (0..8).map(|l| (l, l + 1)).collect::<Vec<_>>());
        assert_eq!(seq.barrier_count(), 16);
        // every blit is its own pass
        assert_eq!(seq.passes().count(), 8);
    }

    #[test]
    fn barriers_serialize_levels() {
        let mut pyramid = staged(8, 8);
        let mut seq = CommandSequence::new();
        BlitStrategy::default()
            .record_commands(&mut seq, &mut pyramid)
            .unwrap();
        let barriers: Vec<_> = seq
            .commands()
            .iter()
            .filter_map(|c| match c {
                Command::Barrier(b) => Some(b.clone()),
                _ => None,
            })
            .collect();
        // level 0 comes from staging with nothing to wait for
        assert_eq!(barriers[0].src_stages, PipelineStages::TOP_OF_PIPE);
        assert!(barriers[0].src_access.is_empty());
        assert_eq!(
            barriers[0].scope,
            BarrierScope::Image {
                pyramid: PyramidId(0),
                levels: 0..1,
                old_layout: ImageLayout::TransferDst,
                new_layout: ImageLayout::TransferSrc,
            }
        );
        // later sources wait for the previous blit's write
        assert_eq!(barriers[2].src_stages, PipelineStages::TRANSFER);
        assert_eq!(barriers[2].src_access, AccessFlags::TRANSFER_WRITE);
        assert_eq!(barriers[2].dst_access, AccessFlags::TRANSFER_READ);
        assert_eq!(
            barriers[3].scope,
            BarrierScope::Image {
                pyramid: PyramidId(0),
                levels: 2..3,
                old_layout: ImageLayout::Undefined,
                new_layout: ImageLayout::TransferDst,
            }
        );
        assert_eq!(pyramid.level_state(3).layout, ImageLayout::TransferDst);
        assert_eq!(pyramid.level_state(2).layout, ImageLayout::TransferSrc);
    }

    #[test]
    fn single_level_records_nothing() {
        let mut pyramid = staged(1, 1);
        let mut seq = CommandSequence::new();
        BlitStrategy::default()
            .record_commands(&mut seq, &mut pyramid)
            .unwrap();
        assert!(seq.is_empty());
    }

    #[test]
    fn requires_a_staged_base_level() {
        let mut pyramid = MipPyramid::new(PyramidId(0), 8, 8);
        let mut seq = CommandSequence::new();
        let err = BlitStrategy::default()
            .record_commands(&mut seq, &mut pyramid)
            .unwrap_err();
        assert!(matches!(err, Error::Hazard { level: 0, .. }));
    }
}
