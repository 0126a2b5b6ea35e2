use anyhow::{bail, Context as AnyhowContext, Result};
use ::image::RgbImage;
use ndarray as nd;

use crate::my_types::*;

/// Row-major grayscale image storage
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Image {
    pub data: Vec<u8>,
    pub width: usize,
    pub height: usize,
}

/// Interleaved RGB frame, shape (height, width, 3)
pub type ColorImage = nd::Array3<u8>;

impl Image {
    /// Create an empty image
    pub fn empty() -> Image {
        Image {
            data: vec![],
            width: 0,
            height: 0,
        }
    }

    /// Create a black image
    pub fn new(width: usize, height: usize) -> Image {
        Image {
            data: vec![0; width * height],
            width,
            height,
        }
    }

    pub fn from_vec(width: usize, height: usize, data: Vec<u8>) -> Result<Image> {
        if data.len() != width * height {
            bail!(
                "image buffer holds {} bytes, expected {width} x {height}",
                data.len()
            );
        }
        Ok(Image {
            data,
            width,
            height,
        })
    }

    /// Clear the image storage
    pub fn clear(&mut self) {
        self.data.clear();
        self.width = 0;
        self.height = 0;
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    pub fn dims(&self) -> Size {
        Size::new(self.width, self.height)
    }

    #[inline(always)]
    pub fn value(&self, x: usize, y: usize) -> u8 {
        self.data[y * self.width + x]
    }

    /// Pixel value with coordinates clamped to the image border
    #[inline(always)]
    pub fn value_clamped(&self, x: i32, y: i32) -> u8 {
        let x = x.clamp(0, self.width as i32 - 1);
        let y = y.clamp(0, self.height as i32 - 1);
        self.data[y as usize * self.width + x as usize]
    }

    #[inline(always)]
    pub fn set_value(&mut self, x: usize, y: usize, value: u8) {
        self.data[y * self.width + x] = value;
    }

    /// Copy `patch` with its top-left corner at (x, y), clipping at the border
    pub fn set_sub_image_i32(&mut self, x: i32, y: i32, patch: &Image) {
        for py in 0..patch.height as i32 {
            for px in 0..patch.width as i32 {
                let (tx, ty) = (x + px, y + py);
                if tx < 0 || ty < 0 || tx >= self.width as i32 || ty >= self.height as i32 {
                    continue;
                }
                self.set_value(tx as usize, ty as usize, patch.value(px as usize, py as usize));
            }
        }
    }

    /// Sample at a sub-pixel location, intensities scaled to [0, 1].
    /// Neighbours outside the image are clamped to the border.
    pub fn bilinear(&self, p: Vector2d) -> f64 {
        let x0 = p.x.floor();
        let y0 = p.y.floor();
        let ax = p.x - x0;
        let ay = p.y - y0;
        let (x0, y0) = (x0 as i32, y0 as i32);
        let v = |x: i32, y: i32| self.value_clamped(x, y) as f64;
        let top = (1. - ax) * v(x0, y0) + ax * v(x0 + 1, y0);
        let bottom = (1. - ax) * v(x0, y0 + 1) + ax * v(x0 + 1, y0 + 1);
        ((1. - ay) * top + ay * bottom) / 255.
    }

    /// Grayscale image replicated into three channels
    pub fn to_color(&self) -> ColorImage {
        nd::Array3::from_shape_fn((self.height, self.width, 3), |(y, x, _)| self.value(x, y))
    }
}

/// One tick of input from a frame source.
#[derive(Clone, Debug)]
pub enum Frame {
    Gray(Image),
    Color(ColorImage),
}

impl Frame {
    pub fn dims(&self) -> Size {
        match self {
            Frame::Gray(image) => image.dims(),
            Frame::Color(color) => Size::new(color.dim().1, color.dim().0),
        }
    }

    /// Luma of a color frame; grayscale frames pass through unchanged.
    pub fn to_grayscale(&self) -> Image {
        match self {
            Frame::Gray(image) => image.clone(),
            Frame::Color(color) => rgb_to_gray(color),
        }
    }

    /// Three-channel copy suitable as a drawing canvas
    pub fn to_color(&self) -> ColorImage {
        match self {
            Frame::Gray(image) => image.to_color(),
            Frame::Color(color) => color.clone(),
        }
    }
}

/// Copy into an `image` buffer, `None` unless the array has three channels.
pub fn to_rgb_image(color: &ColorImage) -> Option<RgbImage> {
    let (height, width, channels) = color.dim();
    if channels != 3 {
        return None;
    }
    RgbImage::from_raw(width as u32, height as u32, color.iter().copied().collect())
}

pub fn from_rgb_image(rgb: RgbImage) -> Result<ColorImage> {
    let (width, height) = rgb.dimensions();
    nd::Array3::from_shape_vec((height as usize, width as usize, 3), rgb.into_raw())
        .context("rgb buffer does not match its dimensions")
}

#[cfg(not(feature = "opencv"))]
fn rgb_to_gray(color: &ColorImage) -> Image {
    let Some(rgb) = to_rgb_image(color) else {
        return Image::empty();
    };
    let gray = ::image::imageops::grayscale(&rgb);
    Image {
        width: gray.width() as usize,
        height: gray.height() as usize,
        data: gray.into_raw(),
    }
}

#[cfg(feature = "opencv")]
fn rgb_to_gray(color: &ColorImage) -> Image {
    crate::cv::rgb_to_gray(color).unwrap_or_else(|err| {
        tracing::warn!("cvt_color failed: {err:#}");
        Image::empty()
    })
}
