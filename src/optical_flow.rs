use std::fmt::Debug;

use nalgebra as na;
use tracing::warn;

use crate::config::FlowConfig;
use crate::frame::PyramidFrame;
use crate::image::*;
use crate::my_types::*;

/// Coarsest pyramid level must be at least this large in both dimensions.
const MIN_LEVEL_SIZE: usize = 8;

/// Output of one correspondence pass, index-aligned with the input points.
#[derive(Clone, Debug, Default)]
pub struct FlowResult {
    pub points: Vec<Vector2d>,
    pub status: Vec<bool>,
    pub errors: Vec<f64>,
}

impl FlowResult {
    /// Every point untracked, positions carried over unchanged.
    pub fn lost(points: &[Vector2d]) -> FlowResult {
        FlowResult {
            points: points.to_vec(),
            status: vec![false; points.len()],
            errors: vec![0.; points.len()],
        }
    }
}

/// Sparse correspondence between two grayscale frames.
pub trait FlowSolver: Debug + Send {
    /// Locate each of `points` (given in `prev`) in `next`.
    fn track(&mut self, prev: &Image, next: &Image, points: &[Vector2d]) -> FlowResult;
}

/// Pyramidal Lucas-Kanade.
#[derive(Debug)]
pub struct PyramidalLk {
    lk_iters: usize,
    lk_levels: usize,
    lk_win_size: usize,
    lk_term: f64,
    lk_min_eig: f64,
    ix: Matrixd,
    iy: Matrixd,
    it: Matrixd,
    grid: Matrixd,
}

impl PyramidalLk {
    pub fn new(config: &FlowConfig) -> PyramidalLk {
        // the window is centered on the point, so it must be odd
        let lk_win_size = config.win_size.max(3) | 1;
        PyramidalLk {
            lk_iters: config.max_iterations.max(1),
            lk_levels: config.max_level,
            lk_win_size,
            lk_term: config.epsilon,
            lk_min_eig: config.min_eig_threshold,
            ix: na::DMatrix::zeros(lk_win_size, lk_win_size),
            iy: na::DMatrix::zeros(lk_win_size, lk_win_size),
            it: na::DMatrix::zeros(lk_win_size, lk_win_size),
            grid: na::DMatrix::zeros(lk_win_size + 2, lk_win_size + 2),
        }
    }

    fn level_count(&self, image: &Image) -> usize {
        let mut levels = 0;
        while levels < self.lk_levels
            && (image.width >> (levels + 1)) >= MIN_LEVEL_SIZE
            && (image.height >> (levels + 1)) >= MIN_LEVEL_SIZE
        {
            levels += 1;
        }
        levels
    }

    /// ref http://robots.stanford.edu/cs223b04/algo_tracking.pdf
    fn process_feature(
        &mut self,
        pyramid_frame0: &PyramidFrame,
        pyramid_frame1: &PyramidFrame,
        point0: Vector2d,
    ) -> Option<(Vector2d, f64)> {
        let lk_term2 = self.lk_term.powi(2);
        let r = (self.lk_win_size - 1) / 2;
        let area = (self.lk_win_size * self.lk_win_size) as f64;
        let top = pyramid_frame0.level_count() - 1;

        let mut g = Vector2d::zeros();
        let mut d = Vector2d::zeros();
        let mut residual = 0.;
        for level in (0..=top).rev() {
            let level0 = pyramid_frame0.get_image_at_level(level);
            let level1 = pyramid_frame1.get_image_at_level(level);
            let u = point0 / u32::pow(2, level as u32) as f64;
            if !is_inside(level0, u) {
                return None;
            }
            // compute the derivative
            scharr(level0, u, r, &mut self.ix, &mut self.iy, &mut self.grid);
            let gradient = spatial_gradient(&self.ix, &self.iy);
            if min_eigenvalue(&gradient) / area < self.lk_min_eig {
                return None;
            }
            let inv_g = gradient.try_inverse()?;

            let mut nu = Vector2d::zeros();
            for _ in 0..self.lk_iters {
                image_difference(r, &self.grid, &mut self.it, level1, u + g + nu);
                let eta = flow_vector(&inv_g, &self.ix, &self.iy, &self.it);
                nu += eta;
                if eta.norm_squared() < lk_term2 {
                    break;
                }
            }
            residual = self.it.iter().map(|v| v.abs()).sum::<f64>() / area;

            d = nu;
            if level > 0 {
                g = 2. * (g + d)
            }
        }

        let point1 = point0 + g + d;
        if !is_inside(pyramid_frame1.image, point1) {
            return None;
        }
        Some((point1, residual))
    }
}

impl FlowSolver for PyramidalLk {
    fn track(&mut self, prev: &Image, next: &Image, points: &[Vector2d]) -> FlowResult {
        if points.is_empty() {
            return FlowResult::default();
        }
        if prev.is_empty() || next.is_empty() {
            return FlowResult::lost(points);
        }
        if prev.dims() != next.dims() {
            warn!(
                "frame size changed from {:?} to {:?}, dropping correspondences",
                prev.dims(),
                next.dims()
            );
            return FlowResult::lost(points);
        }
        let levels = self.level_count(prev);
        let frames = PyramidFrame::new(prev, levels)
            .and_then(|frame0| Ok((frame0, PyramidFrame::new(next, levels)?)));
        let (frame0, frame1) = match frames {
            Ok(frames) => frames,
            Err(err) => {
                warn!("cannot build image pyramid: {err:#}");
                return FlowResult::lost(points);
            }
        };

        let mut result = FlowResult::lost(points);
        for (i, point0) in points.iter().enumerate() {
            if let Some((point1, residual)) = self.process_feature(&frame0, &frame1, *point0) {
                result.points[i] = point1;
                result.status[i] = true;
                result.errors[i] = residual;
            }
        }
        result
    }
}

fn is_inside(level: &Image, p: Vector2d) -> bool {
    p.x >= 0. && p.y >= 0. && p.x <= (level.width - 1) as f64 && p.y <= (level.height - 1) as f64
}

fn min_eigenvalue(m: &Matrix2d) -> f64 {
    let half_trace = 0.5 * (m[(0, 0)] + m[(1, 1)]);
    let half_diff = 0.5 * (m[(0, 0)] - m[(1, 1)]);
    half_trace - (half_diff * half_diff + m[(0, 1)] * m[(1, 0)]).sqrt()
}

fn flow_vector(inv_g: &Matrix2d, ix: &Matrixd, iy: &Matrixd, it: &Matrixd) -> Vector2d {
    let mut b = Vector2d::zeros();

    for y in 0..iy.nrows() {
        for x in 0..ix.ncols() {
            b[0] += it[(y, x)] * ix[(y, x)];
            b[1] += it[(y, x)] * iy[(y, x)];
        }
    }

    inv_g * b
}

/// `it = I0 - I1` over the window, I0 read from the padded grid
fn image_difference(r: usize, i0: &Matrixd, it: &mut Matrixd, level: &Image, center: Vector2d) {
    fill_grid(level, r as i32, center, it);
    let shape = (it.nrows(), it.ncols());
    *it *= -1.;
    *it += i0.view((1, 1), shape);
}

fn spatial_gradient(ix: &Matrixd, iy: &Matrixd) -> Matrix2d {
    assert_eq!(ix.nrows(), iy.nrows());
    assert_eq!(ix.ncols(), iy.ncols());

    let mut x2 = 0.;
    let mut y2 = 0.;
    let mut xy = 0.;

    for y in 0..iy.nrows() {
        for x in 0..ix.ncols() {
            x2 += ix[(y, x)] * ix[(y, x)];
            y2 += iy[(y, x)] * iy[(y, x)];
            xy += ix[(y, x)] * iy[(y, x)];
        }
    }

    Matrix2d::new(x2, xy, xy, y2)
}

/// ref https://theailearner.com/tag/scharr-operator/
fn scharr(
    level: &Image,
    center: Vector2d,
    r: usize,
    out_x: &mut Matrixd,
    out_y: &mut Matrixd,
    grid: &mut Matrixd,
) {
    fill_grid(level, r as i32 + 1, center, grid);

    *out_x = Matrixd::zeros(grid.nrows() - 2, grid.ncols() - 2);
    *out_y = Matrixd::zeros(grid.nrows() - 2, grid.ncols() - 2);
    for y in 1..(grid.nrows() - 1) {
        for x in 1..(grid.ncols() - 1) {
            out_x[(y - 1, x - 1)] =
                (10. * grid[(y, x + 1)] + 3. * grid[(y + 1, x + 1)] + 3. * grid[(y - 1, x + 1)]
                    - 10. * grid[(y, x - 1)]
                    - 3. * grid[(y + 1, x - 1)]
                    - 3. * grid[(y - 1, x - 1)])
                    / 32.;
            out_y[(y - 1, x - 1)] =
                (10. * grid[(y + 1, x)] + 3. * grid[(y + 1, x + 1)] + 3. * grid[(y + 1, x - 1)]
                    - 10. * grid[(y - 1, x)]
                    - 3. * grid[(y - 1, x + 1)]
                    - 3. * grid[(y - 1, x - 1)])
                    / 32.;
        }
    }
}

/// Sample the (2r+1)^2 neighbourhood of `center`
fn fill_grid(level: &Image, r: i32, center: Vector2d, grid: &mut Matrixd) {
    let n = (2 * r + 1) as usize;
    if grid.nrows() != n || grid.ncols() != n {
        *grid = na::DMatrix::zeros(n, n);
    }

    for (y_ind, y) in (-r..=r).enumerate() {
        for (x_ind, x) in (-r..=r).enumerate() {
            grid[(y_ind, x_ind)] = level.bilinear(center + Vector2d::new(x as f64, y as f64));
        }
    }
}
