use hough_imgproc::parallel::{ExecutionStrategy, ParallelError};

use crate::error::HoughError;

/// Parameters of the circle detector.
///
/// Lengths (`minimum_radius`, `maximum_radius`, `sigma_gradient`) are expressed in the physical
/// units of the input image when `use_image_spacing` is set, in pixels otherwise.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct HoughCirclesConfig {
    /// Smallest radius that receives votes.
    pub minimum_radius: f64,
    /// Largest radius that receives votes.
    pub maximum_radius: f64,
    /// Pixels must be strictly brighter than this value to vote.
    pub threshold: f64,
    /// Scale of the gradient estimation.
    pub sigma_gradient: f64,
    /// Angular tolerance around the gradient direction, in radians.
    pub sweep_angle: f64,
    /// Variance of the gaussian applied to the accumulator before extraction, in pixels squared.
    pub variance: f64,
    /// Maximum number of circles to extract.
    pub number_of_circles: usize,
    /// Multiplier of the circle radius giving the suppression disc around each peak.
    pub disc_radius_ratio: f64,
    /// Convert physical lengths to pixels using the input spacing.
    pub use_image_spacing: bool,
    /// Execution strategy of the vote caster and of the gradient and smoothing operators.
    pub strategy: ExecutionStrategy,
}

impl Default for HoughCirclesConfig {
    fn default() -> Self {
        Self {
            minimum_radius: 0.0,
            maximum_radius: 10.0,
            threshold: 0.0,
            sigma_gradient: 1.0,
            sweep_angle: 0.0,
            variance: 10.0,
            number_of_circles: 1,
            disc_radius_ratio: 1.0,
            use_image_spacing: true,
            strategy: ExecutionStrategy::default(),
        }
    }
}

/// The subset of the configuration that only affects peak extraction.
///
/// Changing any of these invalidates the cached circles but not the accumulator.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct ExtractionParams {
    pub variance: f64,
    pub number_of_circles: usize,
    pub disc_radius_ratio: f64,
}

impl HoughCirclesConfig {
    /// Set both radius bounds to `radius`, so that a single radius is searched.
    pub fn with_radius(mut self, radius: f64) -> Self {
        self.minimum_radius = radius;
        self.maximum_radius = radius;
        self
    }

    /// Check that every parameter is usable.
    ///
    /// # Errors
    ///
    /// * [`HoughError::InvalidParameter`] for negative or non-finite lengths, angles or ratios,
    ///   and for a NaN threshold.
    /// * [`HoughError::InvalidRadiusRange`] when `minimum_radius > maximum_radius`.
    /// * [`HoughError::Parallel`] for a fixed pool of zero threads.
    pub fn validate(&self) -> Result<(), HoughError> {
        let non_negative = [
            ("minimum_radius", self.minimum_radius),
            ("maximum_radius", self.maximum_radius),
            ("sigma_gradient", self.sigma_gradient),
            ("sweep_angle", self.sweep_angle),
            ("variance", self.variance),
            ("disc_radius_ratio", self.disc_radius_ratio),
        ];
        for (name, value) in non_negative {
            if !value.is_finite() || value < 0.0 {
                return Err(HoughError::InvalidParameter { name, value });
            }
        }

        if self.threshold.is_nan() {
            return Err(HoughError::InvalidParameter {
                name: "threshold",
                value: self.threshold,
            });
        }

        if self.minimum_radius > self.maximum_radius {
            return Err(HoughError::InvalidRadiusRange {
                min: self.minimum_radius,
                max: self.maximum_radius,
            });
        }

        if let ExecutionStrategy::Fixed(0) = self.strategy {
            return Err(ParallelError::InvalidThreadCount(0).into());
        }

        Ok(())
    }

    /// Whether switching from `other` to `self` requires the votes to be cast again.
    pub(crate) fn voting_differs(&self, other: &Self) -> bool {
        self.minimum_radius != other.minimum_radius
            || self.maximum_radius != other.maximum_radius
            || self.threshold != other.threshold
            || self.sigma_gradient != other.sigma_gradient
            || self.sweep_angle != other.sweep_angle
            || self.use_image_spacing != other.use_image_spacing
    }

    pub(crate) fn extraction_params(&self) -> ExtractionParams {
        ExtractionParams {
            variance: self.variance,
            number_of_circles: self.number_of_circles,
            disc_radius_ratio: self.disc_radius_ratio,
        }
    }
}
