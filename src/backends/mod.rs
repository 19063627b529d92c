mod blit;
mod compute;
mod subgroup;

pub use blit::*;
pub use compute::*;
pub use subgroup::*;

use crate::command::Command;
use crate::core::*;
use crate::pyramid::{GpuPyramid, PyramidId};

/// Side of the square tile of destination texels one workgroup covers.
pub const WORKGROUP_TILE: u32 = 16;

/// Workgroups needed to cover an extent, rounding up.
pub fn group_count((width, height): (u32, u32)) -> [u32; 3] {
    [
        (width + WORKGROUP_TILE - 1) / WORKGROUP_TILE,
        (height + WORKGROUP_TILE - 1) / WORKGROUP_TILE,
        1,
    ]
}

/// Every strategy, in the order they are benchmarked.
pub fn all_strategies() -> Vec<Box<dyn MipmapStrategy>> {
    vec![
        Box::new(BlitStrategy::default()),
        Box::new(PerLevelComputeStrategy::default()),
        Box::new(SubgroupComputeStrategy::default()),
    ]
}

fn check_usage(required: wgpu::TextureUsages, pyramid: &GpuPyramid) -> Result<(), Error> {
    if !pyramid.usage().contains(required) {
        return Err(Error::UnsupportedUsage(pyramid.usage()));
    }
    Ok(())
}

fn check_pyramid(pyramid: &GpuPyramid, id: PyramidId) -> Result<(), Error> {
    if pyramid.id() != id {
        return Err(Error::UnknownPyramid(id.0));
    }
    Ok(())
}

fn unsupported(strategy: &'static str, command: &Command) -> Error {
    Error::UnsupportedCommand {
        strategy,
        command: format!("{:?}", command),
    }
}

fn storage_entry(binding: u32) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::COMPUTE,
        ty: wgpu::BindingType::StorageTexture {
            access: wgpu::StorageTextureAccess::WriteOnly,
            format: GpuPyramid::FORMAT,
            view_dimension: wgpu::TextureViewDimension::D2,
        },
        count: None,
    }
}

fn sampled_entry(binding: u32, visibility: wgpu::ShaderStages) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility,
        ty: wgpu::BindingType::Texture {
            sample_type: wgpu::TextureSampleType::Float { filterable: true },
            view_dimension: wgpu::TextureViewDimension::D2,
            multisampled: false,
        },
        count: None,
    }
}
