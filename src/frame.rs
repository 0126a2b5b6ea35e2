use anyhow::Result;

use crate::image::Image;
use crate::pyramid::Pyramid;

#[derive(Debug)]
pub struct PyramidFrame<'a> {
    /// original image
    pub image: &'a Image,
    /// downsized images
    pub pyramid: Pyramid,
}

impl<'a> PyramidFrame<'a> {
    pub fn new(image: &'a Image, level_count: usize) -> Result<PyramidFrame<'a>> {
        let mut pyramid = Pyramid::empty();
        pyramid.compute(image, level_count)?;
        Ok(PyramidFrame { image, pyramid })
    }

    pub fn get_image_at_level(&self, level: usize) -> &Image {
        if level == 0 {
            self.image
        } else {
            &self.pyramid.levels[level - 1]
        }
    }

    /// number of usable levels including the original image
    pub fn level_count(&self) -> usize {
        self.pyramid.levels.len() + 1
    }
}
