use anyhow::Result;
use clap::Parser;

use indicatif::ProgressStyle;
use tracing::{info, info_span, warn};
use tracing_indicatif::span_ext::IndicatifSpanExt;
use tracing_indicatif::IndicatifLayer;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{filter::LevelFilter, prelude::*};

use flow_objects::config::*;
use flow_objects::controller::Controller;
use flow_objects::dataset::*;
use flow_objects::my_types::*;
use flow_objects::visualization::*;

const SCENE_WIDTH: usize = 640;
const SCENE_HEIGHT: usize = 480;

fn open_source(app: &AppConfig) -> Result<Box<dyn FrameSource>> {
    let synthetic = || -> Box<dyn FrameSource> {
        Box::new(SyntheticScene::new(
            SCENE_WIDTH,
            SCENE_HEIGHT,
            Vector2d::new(1.5, 0.5),
            app.seed,
        ))
    };
    match app.device {
        #[cfg(feature = "opencv")]
        Some(device) => Ok(Box::new(flow_objects::cv::CameraSource::open(device)?)),
        #[cfg(not(feature = "opencv"))]
        Some(device) => {
            warn!(device, "built without the opencv feature, using the synthetic scene");
            Ok(synthetic())
        }
        None => Ok(synthetic()),
    }
}

#[cfg(feature = "opencv")]
fn build_controller(app: &AppConfig, config: &TrackerConfig) -> Controller {
    use flow_objects::clock::MonotonicClock;
    use flow_objects::cv::{OpenCvCorners, OpenCvFlow};
    use flow_objects::{FeatureTracker, TrackedRegionSet};

    if app.device.is_none() {
        return Controller::new(config, app.region_size);
    }
    let tracker = FeatureTracker::with_parts(
        config,
        Box::new(OpenCvFlow::new(&config.flow)),
        Box::new(OpenCvCorners::new(&config.detector)),
        Box::new(MonotonicClock::new()),
    );
    Controller::with_parts(
        tracker,
        TrackedRegionSet::default(),
        Box::new(MonotonicClock::new()),
        app.region_size,
    )
}

#[cfg(not(feature = "opencv"))]
fn build_controller(app: &AppConfig, config: &TrackerConfig) -> Controller {
    Controller::new(config, app.region_size)
}

fn main() -> Result<()> {
    // parse the config
    let app = AppConfig::parse();
    let tracker_config = app.tracker_config()?;

    // setup logging
    let indicatif_layer = IndicatifLayer::new();
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(indicatif_layer.get_stdout_writer())
                .with_filter(LevelFilter::INFO),
        )
        .with(indicatif_layer)
        .init();

    let mut source = open_source(&app)?;
    let mut script = match &app.script {
        Some(path) => CommandScript::load(path)?,
        None => CommandScript::default(),
    };
    let mut sink = RerunSink::save(&app.recording)?;
    let mut controller = build_controller(&app, &tracker_config);

    let header_span = info_span!("header");
    header_span.pb_set_style(&ProgressStyle::default_bar());
    if app.frames > 0 {
        header_span.pb_set_length(app.frames);
    }
    let header_span_enter = header_span.enter();

    let mut frame_number = 0;
    while app.frames == 0 || frame_number < app.frames {
        let Some(frame) = source.next_frame()? else {
            info!("frame source ended");
            break;
        };

        show_frame(
            &mut controller,
            &frame,
            script.take_due(frame_number),
            &mut sink,
        )?;

        frame_number += 1;
        header_span.pb_inc(1);
    }

    std::mem::drop(header_span_enter);
    std::mem::drop(header_span);

    info!(
        frames = frame_number,
        features = controller.tracker().size(),
        objects = controller.regions().len(),
        "done"
    );
    Ok(())
}
