//! OpenCV backed collaborators: a capture device source plus the library's
//! own Lucas-Kanade and good-features-to-track.

use cv2::prelude::*;
use opencv as cv2;

use anyhow::{bail, Context as AnyhowContext, Result};
use ndarray as nd;
use tracing::warn;

use crate::config::{DetectorConfig, FlowConfig};
use crate::dataset::FrameSource;
use crate::detector::CornerDetector;
use crate::image::{ColorImage, Frame, Image};
use crate::my_types::*;
use crate::optical_flow::{FlowResult, FlowSolver};
use crate::visualization::*;

trait AsArray {
    fn try_as_array(&self) -> Result<nd::Array3<u8>>;
}

impl AsArray for cv2::core::Mat {
    fn try_as_array(&self) -> Result<nd::Array3<u8>> {
        let bytes = self.data_bytes()?;
        let size = self.size()?;
        let a = nd::ArrayView3::from_shape((size.height as usize, size.width as usize, 3), bytes)?;
        Ok(a.to_owned())
    }
}

/// Wraps the image buffer without copying, the Mat must not outlive `img`.
pub fn grayscale_to_cv_8u(img: &Image) -> Result<cv2::core::Mat> {
    let mat = unsafe {
        cv2::core::Mat::new_rows_cols_with_data(
            img.height as i32,
            img.width as i32,
            cv2::core::CV_8U,
            img.data.as_ptr() as *mut std::ffi::c_void,
            cv2::core::Mat_AUTO_STEP,
        )?
    };
    Ok(mat)
}

/// Copy an RGB array into a three-channel Mat.
pub fn color_to_cv_8uc3(color: &ColorImage) -> Result<cv2::core::Mat> {
    let (height, width, channels) = color.dim();
    if channels != 3 {
        bail!("expected three channels, got {channels}");
    }
    let mut mat = cv2::core::Mat::new_rows_cols_with_default(
        height as i32,
        width as i32,
        cv2::core::CV_8UC3,
        cv2::core::Scalar::all(0.),
    )?;
    for (dst, src) in mat.data_bytes_mut()?.iter_mut().zip(color.iter()) {
        *dst = *src;
    }
    Ok(mat)
}

pub fn rgb_to_gray(color: &ColorImage) -> Result<Image> {
    if color.is_empty() {
        return Ok(Image::empty());
    }
    let rgb = color_to_cv_8uc3(color)?;
    let mut gray = cv2::core::Mat::default();
    cv2::imgproc::cvt_color(&rgb, &mut gray, cv2::imgproc::COLOR_RGB2GRAY, 0)?;
    let size = gray.size()?;
    Image::from_vec(size.width as usize, size.height as usize, gray.data_bytes()?.to_vec())
}

fn scalar([r, g, b]: Rgb) -> cv2::core::Scalar {
    // the canvas is RGB, so channels go in that order
    cv2::core::Scalar::new(r as f64, g as f64, b as f64, 0.)
}

fn cv_point(p: &Vector2d) -> cv2::core::Point {
    cv2::core::Point::new(p.x as i32, p.y as i32)
}

/// Overlay drawn with imgproc: motion segments, feature dots, object boxes
/// and outlined id labels.
pub fn draw_overlay(canvas: ColorImage, overlay: &Overlay) -> Result<ColorImage> {
    if canvas.is_empty() {
        return Ok(canvas);
    }
    let mut mat = color_to_cv_8uc3(&canvas)?;

    for (p0, p1) in &overlay.motions {
        cv2::imgproc::line(
            &mut mat,
            cv_point(p0),
            cv_point(p1),
            scalar(FLOW_COLOR),
            1,
            cv2::imgproc::LINE_8,
            0,
        )?;
        cv2::imgproc::circle(
            &mut mat,
            cv_point(p1),
            2,
            scalar(FEATURE_COLOR),
            cv2::imgproc::FILLED,
            cv2::imgproc::LINE_8,
            0,
        )?;
    }

    for (id, rect) in &overlay.objects {
        let r = cv2::core::Rect::new(rect.x, rect.y, rect.width, rect.height);
        cv2::imgproc::rectangle(&mut mat, r, scalar(OBJECT_COLOR), 2, cv2::imgproc::LINE_8, 0)?;

        let label = object_label(*id);
        let anchor = cv2::core::Point::new(rect.x + LABEL_OFFSET.0, rect.y + LABEL_OFFSET.1);
        for dy in -2..=2 {
            for dx in -2..=2 {
                let shifted = cv2::core::Point::new(anchor.x + dx, anchor.y + dy);
                put_label(&mut mat, &label, shifted, scalar(LABEL_OUTLINE_COLOR))?;
            }
        }
        put_label(&mut mat, &label, anchor, scalar(LABEL_COLOR))?;
    }

    mat.try_as_array()
}

fn put_label(
    mat: &mut cv2::core::Mat,
    label: &str,
    origin: cv2::core::Point,
    color: cv2::core::Scalar,
) -> Result<()> {
    cv2::imgproc::put_text(
        mat,
        label,
        origin,
        cv2::imgproc::FONT_HERSHEY_SIMPLEX,
        0.7,
        color,
        2,
        cv2::imgproc::LINE_AA,
        false,
    )?;
    Ok(())
}

fn to_cv_points(points: &[Vector2d]) -> cv2::core::Vector<cv2::core::Point2f> {
    points
        .iter()
        .map(|p| cv2::core::Point2f::new(p.x as f32, p.y as f32))
        .collect()
}

#[derive(Debug)]
pub struct OpenCvFlow {
    config: FlowConfig,
}

impl OpenCvFlow {
    pub fn new(config: &FlowConfig) -> Self {
        OpenCvFlow {
            config: config.clone(),
        }
    }

    fn try_track(&self, prev: &Image, next: &Image, points: &[Vector2d]) -> Result<FlowResult> {
        let prev_mat = grayscale_to_cv_8u(prev)?;
        let next_mat = grayscale_to_cv_8u(next)?;
        let prev_pts = to_cv_points(points);
        let mut next_pts = cv2::core::Vector::<cv2::core::Point2f>::new();
        let mut status = cv2::core::Vector::<u8>::new();
        let mut errors = cv2::core::Vector::<f32>::new();
        let win = self.config.win_size as i32;
        let criteria = cv2::core::TermCriteria::new(
            cv2::core::TermCriteria_COUNT + cv2::core::TermCriteria_EPS,
            self.config.max_iterations as i32,
            self.config.epsilon,
        )?;

        cv2::video::calc_optical_flow_pyr_lk(
            &prev_mat,
            &next_mat,
            &prev_pts,
            &mut next_pts,
            &mut status,
            &mut errors,
            cv2::core::Size::new(win, win),
            self.config.max_level as i32,
            criteria,
            0,
            self.config.min_eig_threshold,
        )?;

        Ok(FlowResult {
            points: next_pts
                .iter()
                .map(|p| Vector2d::new(p.x as f64, p.y as f64))
                .collect(),
            status: status.iter().map(|s| s != 0).collect(),
            errors: errors.iter().map(|e| e as f64).collect(),
        })
    }
}

impl FlowSolver for OpenCvFlow {
    fn track(&mut self, prev: &Image, next: &Image, points: &[Vector2d]) -> FlowResult {
        if points.is_empty() || prev.is_empty() || prev.dims() != next.dims() {
            return FlowResult::lost(points);
        }
        match self.try_track(prev, next, points) {
            Ok(result) if result.points.len() == points.len() => result,
            Ok(_) => {
                warn!("calc_optical_flow_pyr_lk returned a mismatched point count");
                FlowResult::lost(points)
            }
            Err(err) => {
                warn!("calc_optical_flow_pyr_lk failed: {err:#}");
                FlowResult::lost(points)
            }
        }
    }
}

#[derive(Debug)]
pub struct OpenCvCorners {
    config: DetectorConfig,
}

impl OpenCvCorners {
    pub fn new(config: &DetectorConfig) -> Self {
        OpenCvCorners {
            config: config.clone(),
        }
    }

    fn try_detect(&self, image: &Image, max_corners: usize) -> Result<Vec<Vector2d>> {
        let mat = grayscale_to_cv_8u(image)?;
        let mut corners = cv2::core::Vector::<cv2::core::Point2f>::new();
        cv2::imgproc::good_features_to_track(
            &mat,
            &mut corners,
            max_corners as i32,
            self.config.quality_level,
            self.config.min_distance,
            &cv2::core::no_array(),
            self.config.block_size as i32,
            self.config.use_harris,
            self.config.harris_k,
        )?;
        Ok(corners
            .iter()
            .map(|p| Vector2d::new(p.x as f64, p.y as f64))
            .collect())
    }
}

impl CornerDetector for OpenCvCorners {
    fn detect(&mut self, image: &Image, max_corners: usize) -> Vec<Vector2d> {
        if image.is_empty() || max_corners == 0 {
            return vec![];
        }
        self.try_detect(image, max_corners).unwrap_or_else(|err| {
            warn!("good_features_to_track failed: {err:#}");
            vec![]
        })
    }
}

/// Frames from a capture device, converted to RGB.
pub struct CameraSource {
    capture: cv2::videoio::VideoCapture,
    bgr: cv2::core::Mat,
}

impl CameraSource {
    pub fn open(device: i32) -> Result<CameraSource> {
        let capture = cv2::videoio::VideoCapture::new(device, cv2::videoio::CAP_ANY)
            .with_context(|| format!("cannot open capture device {device}"))?;
        if !cv2::videoio::VideoCapture::is_opened(&capture)? {
            bail!("capture device {device} is not available");
        }
        Ok(CameraSource {
            capture,
            bgr: cv2::core::Mat::default(),
        })
    }
}

impl FrameSource for CameraSource {
    fn next_frame(&mut self) -> Result<Option<Frame>> {
        if !self.capture.read(&mut self.bgr)? {
            return Ok(None);
        }
        let size = self.bgr.size()?;
        if size.width == 0 || size.height == 0 {
            return Ok(None);
        }
        let mut rgb = cv2::core::Mat::default();
        cv2::imgproc::cvt_color(&self.bgr, &mut rgb, cv2::imgproc::COLOR_BGR2RGB, 0)?;
        Ok(Some(Frame::Color(rgb.try_as_array()?)))
    }
}
