/// utilities used throughout the project. Not part of the official API.

/// Bytes per RGBA8 texel.
pub const BYTES_PER_PIXEL: usize = 4;

/// Number of levels in a full mip chain for a `width`×`height` base image:
/// `floor(log2(max(width, height))) + 1`.
pub fn max_mip_levels(width: u32, height: u32) -> u32 {
    32 - width.max(height).max(1).leading_zeros()
}

/// Extent of mip level `level`. Never smaller than 1×1.
pub fn mip_extent(width: u32, height: u32, level: u32) -> (u32, u32) {
    let shrink = |v: u32| v.checked_shr(level).unwrap_or(0).max(1);
    (shrink(width), shrink(height))
}

/// Rounds `value` up to the next multiple of `alignment`.
pub fn align_to(value: usize, alignment: usize) -> usize {
    (value + alignment - 1) / alignment * alignment
}

#[derive(Debug)]
pub struct MipBuffer {
    pub buffer: Vec<u8>,
    pub dimensions: MipBufferDimensions,
    pub level: u32,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct MipBufferDimensions {
    pub width: usize,
    pub height: usize,
    pub bytes_per_pixel: usize,
    pub unpadded_bytes_per_row: usize,
    pub padded_bytes_per_row: usize,
}

impl MipBufferDimensions {
    pub fn new(width: usize, height: usize, bytes_per_pixel: usize) -> Self {
        let width = width.max(1);
        let height = height.max(1);
        let unpadded_bytes_per_row = width * bytes_per_pixel;
        let padded_bytes_per_row = align_to(
            unpadded_bytes_per_row,
            wgpu::COPY_BYTES_PER_ROW_ALIGNMENT as usize,
        );
        Self {
            width,
            height,
            bytes_per_pixel,
            unpadded_bytes_per_row,
            padded_bytes_per_row,
        }
    }

    /// Dimensions of mip `level` of an RGBA8 image.
    pub fn for_level(width: u32, height: u32, level: u32) -> Self {
        let (w, h) = mip_extent(width, height, level);
        Self::new(w as usize, h as usize, BYTES_PER_PIXEL)
    }

    /// Size of the padded buffer region holding this level.
    pub fn padded_size(&self) -> usize {
        self.padded_bytes_per_row * self.height
    }

    /// Copies tightly packed rows into a buffer with padded rows.
    pub fn pad(&self, unpadded: &[u8]) -> Vec<u8> {
        let mut padded = vec![0u8; self.padded_size()];
        for (src, dst) in unpadded
            .chunks_exact(self.unpadded_bytes_per_row)
            .zip(padded.chunks_exact_mut(self.padded_bytes_per_row))
        {
            dst[..self.unpadded_bytes_per_row].copy_from_slice(src);
        }
        padded
    }

    /// The buffer we get back is padded, so only extract what we need.
    pub fn unpad(&self, padded: &[u8]) -> Vec<u8> {
        let mut exact = Vec::with_capacity(self.unpadded_bytes_per_row * self.height);
        for y in 0..self.height {
            let row_beg = y * self.padded_bytes_per_row;
            let row_end = row_beg + self.unpadded_bytes_per_row;
            exact.extend_from_slice(&padded[row_beg..row_end]);
        }
        exact
    }
}

#[doc(hidden)]
pub fn checkerboard_rgba8(width: u32, height: u32, n: u32) -> Vec<u8> {
    use std::iter;

    (0..width * height)
        .flat_map(|id| {
            let x = id % width;
            let y = id / width;
            let v = (((x / n + y / n) % 2) * 255) as u8;
            iter::once(v)
                .chain(iter::once(v))
                .chain(iter::once(v))
                .chain(iter::once(255))
        })
        .collect()
}

#[doc(hidden)]
pub fn solid_rgba8(width: u32, height: u32, color: [u8; 4]) -> Vec<u8> {
    color
        .iter()
        .copied()
        .cycle()
        .take((width * height) as usize * BYTES_PER_PIXEL)
        .collect()
}

/// 2×2 box downsample of an RGBA8 level on the CPU, flooring odd extents.
/// Used as the reference the GPU strategies are checked against.
#[doc(hidden)]
pub fn box_downsample_rgba8(src: &[u8], width: u32, height: u32) -> Vec<u8> {
    let (dst_w, dst_h) = mip_extent(width, height, 1);
    let texel = |x: u32, y: u32, c: usize| {
        let x = x.min(width - 1) as usize;
        let y = y.min(height - 1) as usize;
        src[(y * width as usize + x) * BYTES_PER_PIXEL + c] as u32
    };
    let mut dst = Vec::with_capacity((dst_w * dst_h) as usize * BYTES_PER_PIXEL);
    for y in 0..dst_h {
        for x in 0..dst_w {
            for c in 0..BYTES_PER_PIXEL {
                let sum = texel(2 * x, 2 * y, c)
                    + texel(2 * x + 1, 2 * y, c)
                    + texel(2 * x, 2 * y + 1, c)
                    + texel(2 * x + 1, 2 * y + 1, c);
                dst.push(((sum + 2) / 4) as u8);
            }
        }
    }
    dst
}

/// Mean of every channel of an RGBA8 buffer.
#[doc(hidden)]
pub fn channel_means(pixels: &[u8]) -> [f64; 4] {
    let mut sums = [0f64; 4];
    for texel in pixels.chunks_exact(BYTES_PER_PIXEL) {
        for (sum, &v) in sums.iter_mut().zip(texel) {
            *sum += v as f64;
        }
    }
    let count = (pixels.len() / BYTES_PER_PIXEL).max(1) as f64;
    sums.map(|s| s / count)
}
