use std::path::Path;

use anyhow::{Context as AnyhowContext, Result};
use ndarray as nd;
use rerun::{RecordingStream, RecordingStreamBuilder};

#[cfg(not(feature = "opencv"))]
use ab_glyph::FontRef;
#[cfg(not(feature = "opencv"))]
use imageproc::drawing::{
    draw_filled_circle_mut, draw_hollow_rect_mut, draw_line_segment_mut, draw_text_mut,
};
#[cfg(not(feature = "opencv"))]
use imageproc::rect::Rect as PixelRect;

use crate::controller::{Command, Controller, DrawMode};
use crate::flowing_object::ObjectId;
#[cfg(not(feature = "opencv"))]
use crate::image::{from_rgb_image, to_rgb_image};
use crate::image::{ColorImage, Frame};
use crate::my_types::*;

pub(crate) type Rgb = [u8; 3];

pub(crate) const FLOW_COLOR: Rgb = [0, 255, 0];
pub(crate) const FEATURE_COLOR: Rgb = [255, 0, 0];
pub(crate) const OBJECT_COLOR: Rgb = [255, 0, 255];
pub(crate) const LABEL_COLOR: Rgb = [255, 255, 255];
pub(crate) const LABEL_OUTLINE_COLOR: Rgb = [0, 0, 0];

/// Label anchor relative to the top-left corner of its rectangle.
pub(crate) const LABEL_OFFSET: (i32, i32) = (-20, -10);

/// Everything drawn on top of a frame for one tick.
#[derive(Clone, Debug, Default)]
pub struct Overlay {
    /// (previous, current) for each tracked feature, empty when hidden
    pub motions: Vec<(Vector2d, Vector2d)>,
    pub objects: Vec<(ObjectId, Rect)>,
}

impl Overlay {
    pub fn collect(controller: &Controller) -> Overlay {
        let motions = if controller.draw_mode().contains(DrawMode::FEATURE_POINTS) {
            controller.tracker().tracked_motions()
        } else {
            vec![]
        };
        let objects = controller
            .regions()
            .iter()
            .filter(|o| !o.is_disposed())
            .map(|o| (o.id(), o.rect()))
            .collect();
        Overlay { motions, objects }
    }
}

pub fn object_label(id: ObjectId) -> String {
    format!("obj_id={id}")
}

/// Draw the overlay onto a black canvas, on top of the frame if the mode
/// asks for it.
pub fn render(frame: &Frame, overlay: &Overlay, mode: DrawMode) -> Result<ColorImage> {
    let size = frame.dims();
    let canvas = if mode.contains(DrawMode::CAPTURE_IMAGE) {
        frame.to_color()
    } else {
        nd::Array3::zeros((size.height, size.width, 3))
    };
    draw_overlay(canvas, overlay)
}

#[cfg(feature = "opencv")]
fn draw_overlay(canvas: ColorImage, overlay: &Overlay) -> Result<ColorImage> {
    crate::cv::draw_overlay(canvas, overlay)
}

#[cfg(not(feature = "opencv"))]
fn draw_overlay(canvas: ColorImage, overlay: &Overlay) -> Result<ColorImage> {
    if canvas.is_empty() {
        return Ok(canvas);
    }
    let mut rgb = to_rgb_image(&canvas).context("canvas must have three channels")?;
    let font = FontRef::try_from_slice(LABEL_FONT).context("cannot load the label font")?;

    for (p0, p1) in &overlay.motions {
        draw_line_segment_mut(
            &mut rgb,
            (p0.x as f32, p0.y as f32),
            (p1.x as f32, p1.y as f32),
            ::image::Rgb(FLOW_COLOR),
        );
        draw_filled_circle_mut(&mut rgb, (p1.x as i32, p1.y as i32), 2, ::image::Rgb(FEATURE_COLOR));
    }
    for (id, rect) in &overlay.objects {
        draw_object(&mut rgb, &font, *id, rect);
    }
    from_rgb_image(rgb)
}

#[cfg(not(feature = "opencv"))]
const LABEL_FONT: &[u8] = include_bytes!("../assets/fonts/DejaVuSansMono.ttf");

#[cfg(not(feature = "opencv"))]
const LABEL_SCALE: f32 = 16.;

/// Magenta box two pixels thick, id label above its top-left corner.
#[cfg(not(feature = "opencv"))]
fn draw_object(rgb: &mut ::image::RgbImage, font: &FontRef, id: ObjectId, rect: &Rect) {
    for t in 0..2 {
        let (width, height) = (rect.width - 2 * t, rect.height - 2 * t);
        if width <= 0 || height <= 0 {
            break;
        }
        let outline = PixelRect::at(rect.x + t, rect.y + t).of_size(width as u32, height as u32);
        draw_hollow_rect_mut(rgb, outline, ::image::Rgb(OBJECT_COLOR));
    }

    // text is placed by its top edge, the anchor is its baseline
    let label = object_label(id);
    let x = rect.x + LABEL_OFFSET.0;
    let y = rect.y + LABEL_OFFSET.1 - LABEL_SCALE as i32;
    for dy in -1..=1 {
        for dx in -1..=1 {
            let color = ::image::Rgb(LABEL_OUTLINE_COLOR);
            draw_text_mut(rgb, color, x + dx, y + dy, LABEL_SCALE, font, &label);
        }
    }
    draw_text_mut(rgb, ::image::Rgb(LABEL_COLOR), x, y, LABEL_SCALE, font, &label);
}

/// Where annotated frames are presented.
pub trait DisplaySink {
    fn show(&mut self, canvas: &ColorImage, overlay: &Overlay) -> Result<()>;
}

/// One tick of the frame loop: track, present, then apply the input that
/// arrived while the frame was on screen.
pub fn show_frame(
    controller: &mut Controller,
    frame: &Frame,
    commands: Vec<Command>,
    sink: &mut dyn DisplaySink,
) -> Result<()> {
    controller.process(frame);

    let overlay = Overlay::collect(controller);
    let canvas = render(frame, &overlay, controller.draw_mode())?;
    sink.show(&canvas, &overlay)?;

    for command in commands {
        controller.handle(command);
    }
    Ok(())
}

/// Logs every frame to a rerun recording, one step on the "frame" timeline
/// per call.
pub struct RerunSink {
    recorder: RecordingStream,
    frame_number: i64,
}

impl RerunSink {
    pub fn save(path: &Path) -> Result<RerunSink> {
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("cannot create {}", dir.display()))?;
        }
        let recorder = RecordingStreamBuilder::new("flow_objects")
            .save(path)
            .with_context(|| format!("cannot record to {}", path.display()))?;
        Ok(RerunSink {
            recorder,
            frame_number: 0,
        })
    }
}

impl DisplaySink for RerunSink {
    fn show(&mut self, canvas: &ColorImage, overlay: &Overlay) -> Result<()> {
        self.recorder.set_time_sequence("frame", self.frame_number);
        self.frame_number += 1;

        self.recorder
            .log("camera/image", &rerun::Image::try_from(canvas.clone())?)?;

        let mins: Vec<[f32; 2]> = overlay
            .objects
            .iter()
            .map(|(_, r)| [r.x as f32, r.y as f32])
            .collect();
        let sizes: Vec<[f32; 2]> = overlay
            .objects
            .iter()
            .map(|(_, r)| [r.width as f32, r.height as f32])
            .collect();
        let labels: Vec<String> = overlay.objects.iter().map(|(id, _)| object_label(*id)).collect();
        let [r, g, b] = OBJECT_COLOR;
        self.recorder.log(
            "camera/objects",
            &rerun::Boxes2D::from_mins_and_sizes(mins, sizes)
                .with_labels(labels)
                .with_colors([rerun::Color::from_rgb(r, g, b)]),
        )?;

        let strips: Vec<[[f32; 2]; 2]> = overlay
            .motions
            .iter()
            .map(|(p0, p1)| [[p0.x as f32, p0.y as f32], [p1.x as f32, p1.y as f32]])
            .collect();
        let [r, g, b] = FLOW_COLOR;
        self.recorder.log(
            "camera/flow",
            &rerun::LineStrips2D::new(strips).with_colors([rerun::Color::from_rgb(r, g, b)]),
        )?;
        Ok(())
    }
}
