use anyhow::{bail, Result};

use crate::image::Image;

#[derive(Debug, Clone)]
pub struct Pyramid {
    /// levels[i] is the parent downscaled 2^(i+1) times
    pub levels: Vec<Image>,
}

impl Pyramid {
    pub fn empty() -> Self {
        Self { levels: vec![] }
    }

    pub fn compute(&mut self, frame: &Image, level_count: usize) -> Result<()> {
        self.levels.resize_with(level_count, Image::empty);
        if level_count == 0 {
            return Ok(());
        }
        downscale(frame, &mut self.levels[0])?;
        for i in 0..(level_count - 1) {
            let rest = &mut self.levels[i..];
            if let Some((parent, rest)) = rest.split_first_mut() {
                downscale(parent, &mut rest[0])?;
            }
        }
        Ok(())
    }
}

/// downscale the parent image and store the result in child.
/// An odd trailing row or column is dropped.
fn downscale(parent: &Image, child: &mut Image) -> Result<()> {
    let w = parent.width as i32;
    let h = parent.height as i32;
    if w < 2 || h < 2 {
        bail!("cannot downscale image with shape {w} x {h}");
    }

    let w_half = w / 2;
    let h_half = h / 2;
    child.data.clear();
    child.width = w_half as usize;
    child.height = h_half as usize;

    let v = |x: i32, y: i32| -> u16 { parent.value_clamped(x, y) as u16 };

    for y in 0..h_half {
        let y2 = 2 * y;
        for x in 0..w_half {
            let x2 = 2 * x;
            // 3x3 binomial kernel, weights sum to 16
            let value = (4 * v(x2, y2)
                + 2 * (v(x2 + 1, y2) + v(x2 - 1, y2) + v(x2, y2 + 1) + v(x2, y2 - 1))
                + v(x2 + 1, y2 + 1)
                + v(x2 - 1, y2 - 1)
                + v(x2 - 1, y2 + 1)
                + v(x2 + 1, y2 - 1)
                + 8)
                / 16;
            child.data.push(value as u8);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_sizes() {
        let image = Image::new(640, 480);
        let mut pyramid = Pyramid::empty();
        pyramid.compute(&image, 2).unwrap();
        assert_eq!(pyramid.levels.len(), 2);
        assert_eq!((pyramid.levels[0].width, pyramid.levels[0].height), (320, 240));
        assert_eq!((pyramid.levels[1].width, pyramid.levels[1].height), (160, 120));
    }

    #[test]
    fn test_odd_sizes_floor() {
        let image = Image::new(33, 17);
        let mut pyramid = Pyramid::empty();
        pyramid.compute(&image, 2).unwrap();
        assert_eq!((pyramid.levels[0].width, pyramid.levels[0].height), (16, 8));
        assert_eq!((pyramid.levels[1].width, pyramid.levels[1].height), (8, 4));
    }

    #[test]
    fn test_constant_image_stays_constant() {
        let image = Image::from_vec(8, 8, vec![200; 64]).unwrap();
        let mut pyramid = Pyramid::empty();
        pyramid.compute(&image, 2).unwrap();
        assert!(pyramid.levels[1].data.iter().all(|v| *v == 200));
    }

    #[test]
    fn test_too_small_fails() {
        let mut pyramid = Pyramid::empty();
        assert!(pyramid.compute(&Image::new(1, 8), 1).is_err());
        assert!(pyramid.compute(&Image::empty(), 1).is_err());
        assert!(pyramid.compute(&Image::empty(), 0).is_ok());
    }
}
