//! Host to device staging, device to host destaging and the mip atlas the
//! destaged levels are packed into.
use crate::command::{Command, CommandSequence};
use crate::context::GpuContext;
use crate::core::Error;
use crate::pyramid::{GpuPyramid, MipPyramid};
use crate::sync::{Access, BarrierBuilder};
use crate::util::{align_to, mip_extent, MipBuffer, MipBufferDimensions, BYTES_PER_PIXEL};
use log::debug;

fn copy_buffer<'a>(
    buffer: &'a wgpu::Buffer,
    offset: u64,
    dims: &MipBufferDimensions,
) -> wgpu::ImageCopyBuffer<'a> {
    wgpu::ImageCopyBuffer {
        buffer,
        layout: wgpu::ImageDataLayout {
            offset,
            bytes_per_row: Some(dims.padded_bytes_per_row as u32),
            rows_per_image: Some(dims.height as u32),
        },
    }
}

fn copy_texture(pyramid: &GpuPyramid, level: u32) -> wgpu::ImageCopyTexture<'_> {
    wgpu::ImageCopyTexture {
        texture: pyramid.texture(),
        mip_level: level,
        origin: wgpu::Origin3d::ZERO,
        aspect: wgpu::TextureAspect::All,
    }
}

/// The decoded base image in a device buffer with padded rows, copied into
/// level 0 of every pyramid.
#[derive(Debug)]
pub struct StagingBuffer {
    buffer: wgpu::Buffer,
    dimensions: MipBufferDimensions,
}

impl StagingBuffer {
    /// Uploads tightly packed RGBA8 `pixels` of a `width`×`height` image.
    pub fn new(ctx: &GpuContext, width: u32, height: u32, pixels: &[u8]) -> Self {
        let dimensions = MipBufferDimensions::for_level(width, height, 0);
        let padded = dimensions.pad(pixels);
        let buffer = ctx.create_buffer_init(
            "mipmap-bench-staging",
            &padded,
            wgpu::BufferUsages::COPY_SRC,
        );
        Self { buffer, dimensions }
    }

    pub fn dimensions(&self) -> &MipBufferDimensions {
        &self.dimensions
    }

    /// Records the upload into level 0 of `pyramid`. The previous contents
    /// of the level are discarded.
    pub fn record(seq: &mut CommandSequence, pyramid: &mut MipPyramid) -> Result<(), Error> {
        let barrier = BarrierBuilder::image(pyramid, 0..1, Access::NONE, Access::TRANSFER_WRITE);
        seq.barrier(pyramid, barrier)?;
        seq.copy_buffer_to_image(pyramid, 0)
    }

    /// Encodes the uploads of a sequence recorded with [`record`](Self::record)
    /// against any of `pyramids`.
    pub fn encode(
        &self,
        pyramids: &[&GpuPyramid],
        seq: &CommandSequence,
        encoder: &mut wgpu::CommandEncoder,
    ) -> Result<(), Error> {
        for command in seq.commands() {
            match *command {
                Command::Barrier(_) => {}
                Command::CopyBufferToImage { pyramid: id, level } => {
                    let pyramid = pyramids
                        .iter()
                        .find(|pyramid| pyramid.id() == id)
                        .ok_or(Error::UnknownPyramid(id.0))?;
                    debug!("staging into pyramid {} level {}", id.0, level);
                    encoder.copy_buffer_to_texture(
                        copy_buffer(&self.buffer, 0, &self.dimensions),
                        copy_texture(pyramid, level),
                        pyramid.extent3d(level),
                    );
                }
                ref other => {
                    return Err(Error::UnsupportedCommand {
                        strategy: "staging",
                        command: format!("{:?}", other),
                    })
                }
            }
        }
        Ok(())
    }
}

/// Where one level lands in a destaging buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LevelRegion {
    pub offset: u64,
    pub dimensions: MipBufferDimensions,
}

/// Regions of every level of a `width`×`height` pyramid, back to back with
/// each offset aligned for texture copies.
pub fn destaging_regions(width: u32, height: u32) -> (Vec<LevelRegion>, u64) {
    let levels = crate::util::max_mip_levels(width, height);
    let mut offset = 0;
    let regions = (0..levels)
        .map(|level| {
            let dimensions = MipBufferDimensions::for_level(width, height, level);
            let region = LevelRegion {
                offset: offset as u64,
                dimensions,
            };
            offset = align_to(
                offset + dimensions.padded_size(),
                wgpu::COPY_BYTES_PER_ROW_ALIGNMENT as usize,
            );
            region
        })
        .collect();
    (regions, offset as u64)
}

/// A mappable buffer receiving every level of one pyramid.
#[derive(Debug)]
pub struct DestagingBuffer {
    buffer: wgpu::Buffer,
    regions: Vec<LevelRegion>,
}

impl DestagingBuffer {
    pub fn new(ctx: &GpuContext, pyramid: &MipPyramid) -> Self {
        let (regions, size) = destaging_regions(pyramid.width(), pyramid.height());
        let buffer = ctx.create_buffer(
            "mipmap-bench-destaging",
            size,
            wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
        );
        Self { buffer, regions }
    }

    pub fn regions(&self) -> &[LevelRegion] {
        &self.regions
    }

    /// Records moving every level to `TransferSrc` and copying it out.
    pub fn record(seq: &mut CommandSequence, pyramid: &mut MipPyramid) -> Result<(), Error> {
        let barriers = BarrierBuilder::transition(pyramid, 0..pyramid.levels(), Access::TRANSFER_READ);
        seq.barriers(pyramid, barriers)?;
        for level in 0..pyramid.levels() {
            seq.copy_image_to_buffer(pyramid, level)?;
        }
        Ok(())
    }

    pub fn encode(
        &self,
        pyramid: &GpuPyramid,
        seq: &CommandSequence,
        encoder: &mut wgpu::CommandEncoder,
    ) -> Result<(), Error> {
        for command in seq.commands() {
            match *command {
                Command::Barrier(_) => {}
                Command::CopyImageToBuffer { pyramid: id, level } if id == pyramid.id() => {
                    let region = self
                        .regions
                        .get(level as usize)
                        .ok_or(Error::UnknownPyramid(id.0))?;
                    encoder.copy_texture_to_buffer(
                        copy_texture(pyramid, level),
                        copy_buffer(&self.buffer, region.offset, &region.dimensions),
                        pyramid.extent3d(level),
                    );
                }
                Command::CopyImageToBuffer { pyramid: id, .. } => {
                    return Err(Error::UnknownPyramid(id.0))
                }
                ref other => {
                    return Err(Error::UnsupportedCommand {
                        strategy: "destaging",
                        command: format!("{:?}", other),
                    })
                }
            }
        }
        Ok(())
    }

    /// Maps the buffer and returns every level with the row padding removed.
    /// Call after the encoder that filled it has completed.
    pub fn read(&self, ctx: &GpuContext) -> Result<Vec<MipBuffer>, Error> {
        let data = ctx.read_buffer(&self.buffer).map_err(Error::ReadbackFailure)?;
        self.regions
            .iter()
            .enumerate()
            .map(|(level, region)| {
                let start = region.offset as usize;
                let end = start + region.dimensions.padded_size();
                let padded = data.get(start..end).ok_or_else(|| {
                    Error::ReadbackFailure(format!("level {} is past the mapped range", level))
                })?;
                Ok(MipBuffer {
                    buffer: region.dimensions.unpad(padded),
                    dimensions: region.dimensions,
                    level: level as u32,
                })
            })
            .collect()
    }
}

/// Every level of a pyramid packed into one RGBA8 image.
///
/// The base level fills the left of a `width * 3 / 2`×`height` canvas.
/// Level 1 starts at the top of the column to its right and every later
/// level sits directly below the previous one. Texels that would fall
/// outside the canvas are dropped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MipAtlas {
    width: u32,
    height: u32,
    pixels: Vec<u8>,
}

impl MipAtlas {
    pub fn canvas_size(width: u32, height: u32) -> (u32, u32) {
        (width * 3 / 2, height)
    }

    /// Top-left corner of `level` in the atlas of a `width`×`height` base.
    pub fn level_origin(width: u32, height: u32, level: u32) -> (u32, u32) {
        if level == 0 {
            return (0, 0);
        }
        let y = (1..level).map(|l| mip_extent(width, height, l).1).sum();
        (width, y)
    }

    /// Packs `levels`, ordered from the base level, into a new atlas.
    pub fn compose(width: u32, height: u32, levels: &[MipBuffer]) -> Self {
        let (canvas_width, canvas_height) = Self::canvas_size(width, height);
        let canvas_stride = canvas_width as usize * BYTES_PER_PIXEL;
        let mut pixels = vec![0u8; canvas_stride * canvas_height as usize];
        for mip in levels {
            let (x0, y0) = Self::level_origin(width, height, mip.level);
            if x0 >= canvas_width || y0 >= canvas_height {
                continue;
            }
            let dims = &mip.dimensions;
            let columns = dims.width.min((canvas_width - x0) as usize);
            let rows = dims.height.min((canvas_height - y0) as usize);
            for (y, row) in mip
                .buffer
                .chunks_exact(dims.unpadded_bytes_per_row)
                .take(rows)
                .enumerate()
            {
                let start = (y0 as usize + y) * canvas_stride + x0 as usize * BYTES_PER_PIXEL;
                let len = columns * BYTES_PER_PIXEL;
                pixels[start..start + len].copy_from_slice(&row[..len]);
            }
        }
        Self {
            width: canvas_width,
            height: canvas_height,
            pixels,
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    pub fn texel(&self, x: u32, y: u32) -> [u8; 4] {
        let i = (y as usize * self.width as usize + x as usize) * BYTES_PER_PIXEL;
        [
            self.pixels[i],
            self.pixels[i + 1],
            self.pixels[i + 2],
            self.pixels[i + 3],
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pyramid::PyramidId;
    use crate::sync::ImageLayout;
    use crate::util::solid_rgba8;

    fn level(width: u32, height: u32, level: u32, color: [u8; 4]) -> MipBuffer {
        let dimensions = MipBufferDimensions::for_level(width, height, level);
        MipBuffer {
            buffer: solid_rgba8(dimensions.width as u32, dimensions.height as u32, color),
            dimensions,
            level,
        }
    }

    #[test]
    fn atlas_layout() {
        assert_eq!(MipAtlas::canvas_size(256, 256), (384, 256));
        assert_eq!(MipAtlas::level_origin(256, 256, 0), (0, 0));
        assert_eq!(MipAtlas::level_origin(256, 256, 1), (256, 0));
        assert_eq!(MipAtlas::level_origin(256, 256, 2), (256, 128));
        assert_eq!(MipAtlas::level_origin(256, 256, 3), (256, 192));
        assert_eq!(MipAtlas::level_origin(256, 256, 8), (256, 254));
    }

    #[test]
    fn compose_places_levels() {
        let levels: Vec<_> = (0..4)
            .map(|l| level(8, 8, l, [l as u8 * 10, 0, 0, 255]))
            .collect();
        let atlas = MipAtlas::compose(8, 8, &levels);
        assert_eq!((atlas.width(), atlas.height()), (12, 8));
        assert_eq!(atlas.texel(7, 7), [0, 0, 0, 255]);
        assert_eq!(atlas.texel(8, 0), [10, 0, 0, 255]);
        assert_eq!(atlas.texel(11, 3), [10, 0, 0, 255]);
        assert_eq!(atlas.texel(8, 4), [20, 0, 0, 255]);
        assert_eq!(atlas.texel(9, 5), [20, 0, 0, 255]);
        assert_eq!(atlas.texel(8, 6), [30, 0, 0, 255]);
        // nothing is written right of level 3 or below it
        assert_eq!(atlas.texel(9, 6), [0, 0, 0, 0]);
        assert_eq!(atlas.texel(8, 7), [0, 0, 0, 0]);
    }

    #[test]
    fn compose_clips_to_the_canvas() {
        // every level is one row tall, so levels past 1 fall below the canvas
        let levels: Vec<_> = (0..4).map(|l| level(8, 1, l, [l as u8, 1, 2, 3])).collect();
        let atlas = MipAtlas::compose(8, 1, &levels);
        assert_eq!((atlas.width(), atlas.height()), (12, 1));
        assert_eq!(atlas.texel(0, 0), [0, 1, 2, 3]);
        assert_eq!(atlas.texel(11, 0), [1, 1, 2, 3]);

        // level 1 of a 3 wide base starts at the last column
        let levels: Vec<_> = (0..2).map(|l| level(3, 2, l, [9, 9, 9, 9])).collect();
        let atlas = MipAtlas::compose(3, 2, &levels);
        assert_eq!((atlas.width(), atlas.height()), (4, 2));
        assert_eq!(atlas.texel(3, 0), [9, 9, 9, 9]);
        assert_eq!(atlas.texel(3, 1), [0, 0, 0, 0]);
    }

    #[test]
    fn staging_discards_level_zero() {
        let mut pyramid = MipPyramid::new(PyramidId(3), 4, 4);
        let mut seq = CommandSequence::new();
        StagingBuffer::record(&mut seq, &mut pyramid).unwrap();
        assert_eq!(seq.len(), 2);
        assert_eq!(
            seq.commands()[1],
            Command::CopyBufferToImage {
                pyramid: PyramidId(3),
                level: 0
            }
        );
        assert_eq!(pyramid.level_state(0).layout, ImageLayout::TransferDst);
        assert_eq!(pyramid.level_state(1).layout, ImageLayout::Undefined);
    }

    #[test]
    fn one_texel_atlas() {
        let atlas = MipAtlas::compose(1, 1, &[level(1, 1, 0, [128, 128, 128, 255])]);
        assert_eq!((atlas.width(), atlas.height()), (1, 1));
        assert_eq!(atlas.pixels(), &[128, 128, 128, 255]);
    }

    #[test]
    fn regions_are_aligned() {
        let (regions, size) = destaging_regions(100, 30);
        assert_eq!(regions.len(), 7);
        assert_eq!(regions[0].offset, 0);
        // 400 byte rows pad to 512
        assert_eq!(regions[0].dimensions.padded_bytes_per_row, 512);
        assert_eq!(regions[1].offset, 512 * 30);
        for pair in regions.windows(2) {
            assert_eq!(pair[1].offset % 256, 0);
            assert!(pair[1].offset >= pair[0].offset + pair[0].dimensions.padded_size() as u64);
        }
        let last = regions.last().unwrap();
        assert_eq!(size, last.offset + 256);
    }

    #[test]
    fn destage_transitions_every_level() {
        let mut pyramid = MipPyramid::new(PyramidId(0), 16, 16);
        pyramid.level_state_mut(0).layout = ImageLayout::TransferDst;
        pyramid.level_state_mut(4).layout = ImageLayout::General;
        let (regions, _) = destaging_regions(16, 16);
        assert_eq!(regions.len(), 5);

        let mut seq = CommandSequence::new();
        DestagingBuffer::record(&mut seq, &mut pyramid).unwrap();
        assert_eq!(seq.barrier_count(), 3);
        assert_eq!(
            seq.count(|c| matches!(c, Command::CopyImageToBuffer { .. })),
            5
        );
        assert!((0..5).all(|l| pyramid.level_state(l).layout == ImageLayout::TransferSrc));
    }

    #[test]
    #[ignore = "requires a GPU adapter"]
    fn buffers_follow_the_level_layout() {
        let _ = env_logger::builder().is_test(true).try_init();
        let ctx = GpuContext::new().unwrap();
        let staging = StagingBuffer::new(&ctx, 100, 37, &solid_rgba8(100, 37, [1, 2, 3, 4]));
        assert_eq!(
            staging.dimensions(),
            &MipBufferDimensions::for_level(100, 37, 0)
        );
        let pyramid = MipPyramid::new(PyramidId(0), 100, 37);
        let destaging = DestagingBuffer::new(&ctx, &pyramid);
        assert_eq!(destaging.regions(), &destaging_regions(100, 37).0[..]);
        assert_eq!(destaging.regions().len() as u32, pyramid.levels());
    }
}
