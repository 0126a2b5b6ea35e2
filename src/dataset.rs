use std::collections::VecDeque;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use anyhow::{Context as AnyhowContext, Result};
use log::{debug, warn};
use rand::{Rng, SeedableRng};
use rand_xoshiro::Xoshiro256PlusPlus;
use serde::Deserialize;

use crate::controller::Command;
use crate::image::{Frame, Image};
use crate::my_types::*;

/// Anything that yields frames in order. `None` ends the stream.
pub trait FrameSource {
    fn next_frame(&mut self) -> Result<Option<Frame>>;
}

/// A random block texture sliding at constant velocity, wrapping around
/// the frame borders.
pub struct SyntheticScene {
    texture: Image,
    velocity: Vector2d,
    frame_index: u64,
}

impl SyntheticScene {
    pub const BLOCK_SIZE: usize = 8;

    pub fn new(width: usize, height: usize, velocity: Vector2d, seed: u64) -> SyntheticScene {
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(seed);
        let blocks_x = (width + Self::BLOCK_SIZE - 1) / Self::BLOCK_SIZE;
        let blocks_y = (height + Self::BLOCK_SIZE - 1) / Self::BLOCK_SIZE;
        let shades: Vec<u8> = (0..blocks_x * blocks_y).map(|_| rng.gen()).collect();

        let mut texture = Image::new(width, height);
        for y in 0..height {
            for x in 0..width {
                let block = (y / Self::BLOCK_SIZE) * blocks_x + x / Self::BLOCK_SIZE;
                texture.set_value(x, y, shades[block]);
            }
        }
        SyntheticScene {
            texture,
            velocity,
            frame_index: 0,
        }
    }

    /// Shift of the content in frame `index` relative to frame 0.
    pub fn offset(&self, index: u64) -> Point {
        let d = self.velocity * index as f64;
        Point::new(d.x.round() as i32, d.y.round() as i32)
    }

    fn render(&self, index: u64) -> Image {
        let (w, h) = (self.texture.width as i64, self.texture.height as i64);
        let offset = self.offset(index);
        let mut image = Image::new(self.texture.width, self.texture.height);
        for y in 0..h {
            for x in 0..w {
                let sx = (x - offset.x as i64).rem_euclid(w) as usize;
                let sy = (y - offset.y as i64).rem_euclid(h) as usize;
                image.set_value(x as usize, y as usize, self.texture.value(sx, sy));
            }
        }
        image
    }
}

impl FrameSource for SyntheticScene {
    fn next_frame(&mut self) -> Result<Option<Frame>> {
        if self.texture.is_empty() {
            return Ok(None);
        }
        let image = self.render(self.frame_index);
        self.frame_index += 1;
        Ok(Some(Frame::Gray(image)))
    }
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct ScriptEntry {
    pub frame: u64,
    pub command: Command,
}

/// Commands to replay at given frame numbers, read from JSON lines.
#[derive(Debug, Default)]
pub struct CommandScript {
    entries: VecDeque<ScriptEntry>,
}

impl CommandScript {
    pub fn load(path: &Path) -> Result<CommandScript> {
        let file = File::open(path)
            .with_context(|| format!("cannot open command script {}", path.display()))?;
        Self::from_reader(BufReader::new(file))
    }

    pub fn from_reader<R: BufRead>(reader: R) -> Result<CommandScript> {
        let mut entries = vec![];
        for (number, line) in reader.lines().enumerate() {
            let line = line.context("failed to read command script")?;
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<ScriptEntry>(&line) {
                Ok(entry) => entries.push(entry),
                Err(err) => warn!("skipping script line {}: {}", number + 1, err),
            }
        }
        // replay in frame order, keeping file order within a frame
        entries.sort_by_key(|e| e.frame);
        debug!("loaded {} scripted commands", entries.len());
        Ok(CommandScript {
            entries: entries.into(),
        })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Commands due at `frame`, including any whose frame was skipped.
    pub fn take_due(&mut self, frame: u64) -> Vec<Command> {
        let mut due = vec![];
        while let Some(entry) = self.entries.front() {
            if entry.frame > frame {
                break;
            }
            if let Some(entry) = self.entries.pop_front() {
                due.push(entry.command);
            }
        }
        due
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_synthetic_scene_translates() {
        let mut scene = SyntheticScene::new(64, 48, Vector2d::new(2., -1.), 7);
        let first = scene.next_frame().unwrap().unwrap().to_grayscale();
        let second = scene.next_frame().unwrap().unwrap().to_grayscale();
        assert_eq!(first.dims(), Size::new(64, 48));
        for y in 5..40 {
            for x in 5..60 {
                assert_eq!(second.value(x, y - 1), first.value(x - 2, y));
            }
        }
    }

    #[test]
    fn test_synthetic_scene_is_seeded() {
        let mut a = SyntheticScene::new(32, 32, Vector2d::zeros(), 3);
        let mut b = SyntheticScene::new(32, 32, Vector2d::zeros(), 3);
        let mut c = SyntheticScene::new(32, 32, Vector2d::zeros(), 4);
        let a = a.next_frame().unwrap().unwrap().to_grayscale();
        let b = b.next_frame().unwrap().unwrap().to_grayscale();
        let c = c.next_frame().unwrap().unwrap().to_grayscale();
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_empty_scene_ends_immediately() {
        let mut scene = SyntheticScene::new(0, 0, Vector2d::zeros(), 0);
        assert!(scene.next_frame().unwrap().is_none());
    }

    #[test]
    fn test_script_skips_bad_lines_and_orders_by_frame() {
        let text = r#"{"frame": 5, "command": {"type": "clear"}}
not json
{"frame": 2, "command": {"type": "click", "x": 10, "y": 20}}

{"frame": 2, "command": {"type": "toggle_draw_mode"}}
{"frame": 9, "command": {"type": "teleport"}}
"#;
        let mut script = CommandScript::from_reader(text.as_bytes()).unwrap();
        assert_eq!(script.len(), 3);
        assert!(script.take_due(1).is_empty());
        assert_eq!(
            script.take_due(3),
            vec![Command::Click { x: 10, y: 20 }, Command::ToggleDrawMode]
        );
        assert_eq!(script.take_due(10), vec![Command::Clear]);
        assert!(script.is_empty());
    }

    #[test]
    fn test_missing_script_is_an_error() {
        assert!(CommandScript::load(Path::new("/nonexistent/script.jsonl")).is_err());
    }
}
