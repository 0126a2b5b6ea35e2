pub mod clock;
pub mod config;
pub mod controller;
#[cfg(feature = "opencv")]
pub mod cv;
pub mod dataset;
pub mod detector;
pub mod feature;
pub mod flowing_object;
pub mod frame;
pub mod image;
pub mod my_types;
pub mod optical_flow;
pub mod pyramid;
pub mod region_set;
pub mod tracker;
pub mod visualization;

#[cfg(test)]
mod test_utils;

pub use controller::{Command, Controller, DrawMode};
pub use flowing_object::{FlowingObject, ObjectId};
pub use region_set::TrackedRegionSet;
pub use tracker::FeatureTracker;
