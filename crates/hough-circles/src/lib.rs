#![deny(missing_docs)]
//! # Hough circles
//!
//! Gradient directed Hough transform for detecting circles in 2D images.
//!
//! Pixels brighter than a threshold vote for the centers lying along their gradient direction,
//! at every radius of a configured range. The strongest cells of the smoothed vote accumulator
//! are then extracted one by one, clearing a disc around each of them.

/// Circle hypotheses returned by the detector.
pub mod circle;

/// Detector configuration.
pub mod config;

/// The circle detector and its result cache.
pub mod detector;

/// Error types for circle detection.
pub mod error;

/// Peak extraction from the vote accumulator.
pub mod extraction;

/// Vote casting into the accumulator.
pub mod voting;

pub use circle::Circle;
pub use config::HoughCirclesConfig;
pub use detector::{AccumulatorVersion, HoughCircles};
pub use error::HoughError;
