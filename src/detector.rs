use std::fmt::Debug;

use crate::config::DetectorConfig;
use crate::image::Image;
use crate::my_types::*;

/// Strong-corner detection on a grayscale frame.
pub trait CornerDetector: Debug + Send {
    /// Up to `max_corners` corners, strongest first.
    fn detect(&mut self, image: &Image, max_corners: usize) -> Vec<Vector2d>;
}

/// Shi-Tomasi "good features to track", or Harris when enabled.
#[derive(Debug)]
pub struct GoodFeatures {
    quality_level: f64,
    min_distance: f64,
    block_size: usize,
    use_harris: bool,
    harris_k: f64,
    response: Vec<f64>,
}

#[derive(Clone, Copy, Debug)]
struct Candidate {
    x: usize,
    y: usize,
    score: f64,
}

impl GoodFeatures {
    pub fn new(config: &DetectorConfig) -> Self {
        GoodFeatures {
            quality_level: config.quality_level,
            min_distance: config.min_distance,
            block_size: config.block_size.max(1),
            use_harris: config.use_harris,
            harris_k: config.harris_k,
            response: vec![],
        }
    }

    /// Corner response at every pixel, stored row-major in `self.response`
    fn compute_response(&mut self, image: &Image) {
        let (w, h) = (image.width, image.height);
        let v = |x: i32, y: i32| image.value_clamped(x, y) as f64;

        // Sobel products
        let mut products = vec![[0f64; 3]; w * h];
        for y in 0..h as i32 {
            for x in 0..w as i32 {
                let dx = (v(x + 1, y - 1) + 2. * v(x + 1, y) + v(x + 1, y + 1))
                    - (v(x - 1, y - 1) + 2. * v(x - 1, y) + v(x - 1, y + 1));
                let dy = (v(x - 1, y + 1) + 2. * v(x, y + 1) + v(x + 1, y + 1))
                    - (v(x - 1, y - 1) + 2. * v(x, y - 1) + v(x + 1, y - 1));
                products[y as usize * w + x as usize] = [dx * dx, dx * dy, dy * dy];
            }
        }

        // box sum over the block, border clamped
        let r0 = (self.block_size as i32 - 1) / 2;
        let r1 = self.block_size as i32 / 2;
        self.response.clear();
        self.response.reserve(w * h);
        for y in 0..h as i32 {
            for x in 0..w as i32 {
                let mut m = [0f64; 3];
                for by in (y - r0)..=(y + r1) {
                    let by = by.clamp(0, h as i32 - 1) as usize;
                    for bx in (x - r0)..=(x + r1) {
                        let bx = bx.clamp(0, w as i32 - 1) as usize;
                        let p = &products[by * w + bx];
                        m[0] += p[0];
                        m[1] += p[1];
                        m[2] += p[2];
                    }
                }
                let [a, b, c] = m;
                let score = if self.use_harris {
                    a * c - b * b - self.harris_k * (a + c) * (a + c)
                } else {
                    0.5 * (a + c) - (0.25 * (a - c) * (a - c) + b * b).sqrt()
                };
                self.response.push(score);
            }
        }
    }

    fn is_local_max(&self, w: usize, h: usize, x: usize, y: usize) -> bool {
        let score = self.response[y * w + x];
        for ny in y.saturating_sub(1)..=(y + 1).min(h - 1) {
            for nx in x.saturating_sub(1)..=(x + 1).min(w - 1) {
                if self.response[ny * w + nx] > score {
                    return false;
                }
            }
        }
        true
    }

    fn candidates(&self, w: usize, h: usize) -> Vec<Candidate> {
        let max_score = self.response.iter().cloned().fold(0., f64::max);
        if max_score <= 0. {
            return vec![];
        }
        let threshold = max_score * self.quality_level;

        let mut candidates = vec![];
        for y in 0..h {
            for x in 0..w {
                let score = self.response[y * w + x];
                if score > threshold && self.is_local_max(w, h, x, y) {
                    candidates.push(Candidate { x, y, score });
                }
            }
        }
        // stable, so equal scores keep raster order
        candidates.sort_by(|a, b| b.score.total_cmp(&a.score));
        candidates
    }

    /// Greedy selection keeping corners at least `min_distance` apart
    fn select(&self, candidates: &[Candidate], w: usize, h: usize, max_corners: usize) -> Vec<Vector2d> {
        let mut corners: Vec<Vector2d> = vec![];
        if self.min_distance < 1. {
            corners.extend(
                candidates
                    .iter()
                    .take(max_corners)
                    .map(|c| Vector2d::new(c.x as f64, c.y as f64)),
            );
            return corners;
        }

        let cell = self.min_distance.ceil() as usize;
        let grid_cols = (w + cell - 1) / cell;
        let grid_rows = (h + cell - 1) / cell;
        let mut grid: Vec<Vec<usize>> = vec![vec![]; grid_cols * grid_rows];
        let min_distance2 = self.min_distance * self.min_distance;

        for c in candidates {
            if corners.len() >= max_corners {
                break;
            }
            let p = Vector2d::new(c.x as f64, c.y as f64);
            let (col, row) = (c.x / cell, c.y / cell);
            let mut free = true;
            'search: for gy in row.saturating_sub(1)..=(row + 1).min(grid_rows - 1) {
                for gx in col.saturating_sub(1)..=(col + 1).min(grid_cols - 1) {
                    for &j in &grid[gy * grid_cols + gx] {
                        if (corners[j] - p).norm_squared() < min_distance2 {
                            free = false;
                            break 'search;
                        }
                    }
                }
            }
            if free {
                grid[row * grid_cols + col].push(corners.len());
                corners.push(p);
            }
        }
        corners
    }
}

impl CornerDetector for GoodFeatures {
    fn detect(&mut self, image: &Image, max_corners: usize) -> Vec<Vector2d> {
        if image.width < 3 || image.height < 3 || max_corners == 0 {
            return vec![];
        }
        self.compute_response(image);
        let candidates = self.candidates(image.width, image.height);
        self.select(&candidates, image.width, image.height, max_corners)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_chessboard(img_size: usize, cell_size: usize, lo: u8, hi: u8) -> Image {
        let mut img = Image::new(img_size, img_size);
        for y in 0..img_size {
            for x in 0..img_size {
                let val = if (x / cell_size + y / cell_size) % 2 == 0 { lo } else { hi };
                img.set_value(x, y, val);
            }
        }
        img
    }

    fn make_square() -> Image {
        let mut img = Image::from_vec(64, 64, vec![30; 64 * 64]).unwrap();
        let square = Image::from_vec(20, 20, vec![220; 400]).unwrap();
        img.set_sub_image_i32(20, 20, &square);
        img
    }

    #[test]
    fn test_square_has_four_corners() {
        let mut detector = GoodFeatures::new(&DetectorConfig::default());
        let corners = detector.detect(&make_square(), 100);
        assert_eq!(corners.len(), 4, "{corners:?}");
        let truth = [(19.5, 19.5), (39.5, 19.5), (19.5, 39.5), (39.5, 39.5)];
        for c in &corners {
            assert!(truth
                .iter()
                .any(|(x, y)| (c - Vector2d::new(*x, *y)).norm() < 3.));
        }
    }

    #[test]
    fn test_chessboard_corners_near_junctions() {
        let cell = 10;
        let img = make_chessboard(80, cell, 20, 230);
        let mut detector = GoodFeatures::new(&DetectorConfig::default());
        let corners = detector.detect(&img, 1000);
        assert!(corners.len() >= 10, "got {}", corners.len());

        let tolerance = cell as f64 / 2.;
        for c in &corners {
            let nearest = (c / cell as f64).map(|v| v.round()) * cell as f64;
            assert!((c - nearest).norm() <= tolerance, "corner {c:?} far from junction");
        }
    }

    #[test]
    fn test_min_distance_and_cap() {
        let img = make_chessboard(80, 10, 20, 230);
        let config = DetectorConfig {
            min_distance: 15.,
            ..Default::default()
        };
        let mut detector = GoodFeatures::new(&config);
        let corners = detector.detect(&img, 1000);
        for i in 0..corners.len() {
            for j in (i + 1)..corners.len() {
                assert!((corners[i] - corners[j]).norm() >= 15.);
            }
        }
        assert_eq!(detector.detect(&img, 3).len(), 3);
    }

    #[test]
    fn test_harris_mode_finds_junctions() {
        let img = make_chessboard(80, 10, 20, 230);
        let config = DetectorConfig {
            use_harris: true,
            ..Default::default()
        };
        let mut detector = GoodFeatures::new(&config);
        assert!(!detector.detect(&img, 1000).is_empty());
    }

    #[test]
    fn test_flat_and_degenerate_images() {
        let mut detector = GoodFeatures::new(&DetectorConfig::default());
        let flat = Image::from_vec(40, 40, vec![128; 1600]).unwrap();
        assert!(detector.detect(&flat, 1000).is_empty());
        assert!(detector.detect(&Image::empty(), 1000).is_empty());
        assert!(detector.detect(&make_square(), 0).is_empty());
    }
}
