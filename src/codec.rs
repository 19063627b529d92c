//! Image decode and PNG encode around the `image` crate.
use crate::core::Error;
use crate::util::BYTES_PER_PIXEL;
use image::DynamicImage;
use log::debug;
use std::path::Path;

/// Channel depth requested from the decoder. The output always has four
/// channels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PixelDepth {
    U8,
    U16,
    F32,
}

/// Decoded texels, tightly packed RGBA.
#[derive(Debug, Clone, PartialEq)]
pub enum DecodedPixels {
    U8(Vec<u8>),
    U16(Vec<u16>),
    F32(Vec<f32>),
}

impl DecodedPixels {
    pub fn depth(&self) -> PixelDepth {
        match self {
            DecodedPixels::U8(_) => PixelDepth::U8,
            DecodedPixels::U16(_) => PixelDepth::U16,
            DecodedPixels::F32(_) => PixelDepth::F32,
        }
    }

    pub fn as_u8(&self) -> Option<&[u8]> {
        match self {
            DecodedPixels::U8(pixels) => Some(pixels),
            _ => None,
        }
    }
}

type Convert = fn(DynamicImage) -> DecodedPixels;

fn to_u8(image: DynamicImage) -> DecodedPixels {
    DecodedPixels::U8(image.into_rgba8().into_raw())
}

fn to_u16(image: DynamicImage) -> DecodedPixels {
    DecodedPixels::U16(image.into_rgba16().into_raw())
}

fn to_f32(image: DynamicImage) -> DecodedPixels {
    DecodedPixels::F32(image.into_rgba32f().into_raw())
}

impl PixelDepth {
    pub const ALL: [PixelDepth; 3] = [PixelDepth::U8, PixelDepth::U16, PixelDepth::F32];

    fn convert(self) -> Convert {
        match self {
            PixelDepth::U8 => to_u8,
            PixelDepth::U16 => to_u16,
            PixelDepth::F32 => to_f32,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DecodedImage {
    pub width: u32,
    pub height: u32,
    pub channels: u32,
    pub pixels: DecodedPixels,
}

impl DecodedImage {
    fn from_dynamic(image: DynamicImage, depth: PixelDepth) -> Self {
        let (width, height) = (image.width(), image.height());
        debug!("decoded {}x{} image as {:?}", width, height, depth);
        Self {
            width,
            height,
            channels: BYTES_PER_PIXEL as u32,
            pixels: depth.convert()(image),
        }
    }
}

/// Decodes the image at `path` into RGBA texels of `depth`.
pub fn decode_file<P: AsRef<Path>>(path: P, depth: PixelDepth) -> Result<DecodedImage, Error> {
    let path = path.as_ref();
    let image = image::open(path)
        .map_err(|e| Error::DecodeFailure(format!("{}: {}", path.display(), e)))?;
    Ok(DecodedImage::from_dynamic(image, depth))
}

/// Decodes an in-memory encoded image into RGBA texels of `depth`.
pub fn decode_bytes(bytes: &[u8], depth: PixelDepth) -> Result<DecodedImage, Error> {
    let image =
        image::load_from_memory(bytes).map_err(|e| Error::DecodeFailure(e.to_string()))?;
    Ok(DecodedImage::from_dynamic(image, depth))
}

/// Writes RGBA8 `pixels` to `path` as a PNG. `stride` is the distance in
/// bytes between the starts of two rows.
pub fn encode_png<P: AsRef<Path>>(
    path: P,
    pixels: &[u8],
    width: u32,
    height: u32,
    stride: usize,
    channels: u32,
) -> Result<(), Error> {
    if channels as usize != BYTES_PER_PIXEL {
        return Err(Error::EncodeFailure(format!(
            "expected {} channels, got {}",
            BYTES_PER_PIXEL, channels
        )));
    }
    let row_bytes = width as usize * BYTES_PER_PIXEL;
    if stride < row_bytes {
        return Err(Error::EncodeFailure(format!(
            "stride {} is shorter than a {} byte row",
            stride, row_bytes
        )));
    }
    let needed = match height as usize {
        0 => 0,
        rows => stride * (rows - 1) + row_bytes,
    };
    if pixels.len() < needed {
        return Err(Error::EncodeFailure(format!(
            "{} bytes cannot hold a {}x{} image with stride {}",
            pixels.len(),
            width,
            height,
            stride
        )));
    }
    let tight: Vec<u8>;
    let packed = if stride == row_bytes {
        &pixels[..needed]
    } else {
        tight = (0..height as usize)
            .flat_map(|y| &pixels[y * stride..y * stride + row_bytes])
            .copied()
            .collect();
        &tight
    };
    let path = path.as_ref();
    image::save_buffer_with_format(
        path,
        packed,
        width,
        height,
        image::ColorType::Rgba8,
        image::ImageFormat::Png,
    )
    .map_err(|e| Error::EncodeFailure(format!("{}: {}", path.display(), e)))?;
    debug!("wrote {}", path.display());
    Ok(())
}
