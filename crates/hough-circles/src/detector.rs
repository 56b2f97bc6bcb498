use std::time::Instant;

use hough_image::Image;
use hough_imgproc::filter::{GaussianSmoother, Smoother};
use hough_imgproc::gradient::{DerivativeOfGaussian, GradientOperator};
use hough_imgproc::threshold::candidates_above;
use num_traits::AsPrimitive;

use crate::circle::Circle;
use crate::config::{ExtractionParams, HoughCirclesConfig};
use crate::error::HoughError;
use crate::extraction::PeakExtractor;
use crate::voting::{cast_votes, VoteGeometry};

/// Identifies one run of the vote caster.
///
/// Every completed run produces a new version, strictly greater than the previous ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct AccumulatorVersion(u64);

impl AccumulatorVersion {
    /// The raw counter value.
    pub fn get(&self) -> u64 {
        self.0
    }
}

/// Output of one vote run.
#[derive(Debug, Clone)]
struct VoteResult {
    accumulator: Image<f32, 1>,
    radius: Image<f32, 1>,
    version: AccumulatorVersion,
}

/// Circles extracted from a given accumulator version.
#[derive(Debug, Clone)]
struct CachedCircles {
    version: AccumulatorVersion,
    params: ExtractionParams,
    circles: Vec<Circle>,
    suppressed: Image<f32, 1>,
}

/// Hough transform circle detector.
///
/// The detector owns its input image and two stages of results: the vote accumulator with its
/// radius image, and the circles extracted from them. Each stage is recomputed only when
/// something it depends on has changed.
///
/// # Examples
///
/// ```
/// use hough_circles::{HoughCircles, HoughCirclesConfig};
/// use hough_image::Image;
///
/// // a bright ring of radius 6 centered at (16, 16)
/// let data = (0..32 * 32)
///     .map(|i| {
///         let (x, y) = ((i % 32) as f64 - 16.0, (i / 32) as f64 - 16.0);
///         let d = x.hypot(y) - 6.0;
///         (255.0 * (-d * d / 4.5).exp()) as u8
///     })
///     .collect();
/// let image = Image::<u8, 1>::new([32, 32].into(), data).unwrap();
///
/// let config = HoughCirclesConfig {
///     minimum_radius: 4.0,
///     maximum_radius: 8.0,
///     threshold: 100.0,
///     variance: 1.0,
///     ..Default::default()
/// };
/// let mut detector = HoughCircles::new(config).unwrap();
/// detector.set_input(image);
///
/// let circles = detector.circles().unwrap();
/// assert_eq!(circles.len(), 1);
/// ```
pub struct HoughCircles<T, G = DerivativeOfGaussian, S = GaussianSmoother> {
    config: HoughCirclesConfig,
    gradient: G,
    smoother: S,
    input: Option<Image<T, 1>>,
    votes: Option<VoteResult>,
    cache: Option<CachedCircles>,
    runs: u64,
}

impl<T> HoughCircles<T>
where
    T: AsPrimitive<f64>,
{
    /// Create a detector using a derivative of gaussian gradient and a gaussian smoother.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid, see [`HoughCirclesConfig::validate`].
    pub fn new(config: HoughCirclesConfig) -> Result<Self, HoughError> {
        // spacing is resolved by the detector before the gradient runs
        let gradient = DerivativeOfGaussian {
            use_image_spacing: true,
            ..Default::default()
        };
        Self::with_operators(config, gradient, GaussianSmoother::default())
    }
}

impl<T, G, S> HoughCircles<T, G, S>
where
    T: AsPrimitive<f64>,
    G: GradientOperator,
    S: Smoother,
{
    /// Create a detector with custom gradient and smoothing operators.
    ///
    /// Both operators are switched to the execution strategy of `config`.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn with_operators(
        config: HoughCirclesConfig,
        mut gradient: G,
        mut smoother: S,
    ) -> Result<Self, HoughError> {
        config.validate()?;
        gradient.set_strategy(config.strategy);
        smoother.set_strategy(config.strategy);
        Ok(Self {
            config,
            gradient,
            smoother,
            input: None,
            votes: None,
            cache: None,
            runs: 0,
        })
    }

    /// The current configuration.
    pub fn config(&self) -> &HoughCirclesConfig {
        &self.config
    }

    /// Replace the configuration.
    ///
    /// The accumulator is discarded when a voting parameter changed; extraction parameters only
    /// invalidate the extracted circles. The execution strategy is passed on to the operators
    /// and invalidates nothing.
    ///
    /// # Errors
    ///
    /// Returns an error and keeps the previous configuration if `config` is invalid.
    pub fn set_config(&mut self, config: HoughCirclesConfig) -> Result<(), HoughError> {
        config.validate()?;
        if config.voting_differs(&self.config) {
            self.votes = None;
        }
        self.gradient.set_strategy(config.strategy);
        self.smoother.set_strategy(config.strategy);
        self.config = config;
        Ok(())
    }

    /// Set the image to detect circles in, discarding previous results.
    pub fn set_input(&mut self, image: Image<T, 1>) {
        self.input = Some(image);
        self.votes = None;
    }

    /// Cast the votes of the input image, rebuilding the accumulator and the radius image.
    ///
    /// Returns the version of the new accumulator.
    ///
    /// # Errors
    ///
    /// * [`HoughError::MissingInput`] if no input image was set.
    /// * Any error of the configuration or of the gradient operator.
    pub fn update(&mut self) -> Result<AccumulatorVersion, HoughError> {
        let input = self.input.as_ref().ok_or(HoughError::MissingInput)?;
        self.config.validate()?;

        let start = Instant::now();

        let spacing = if self.config.use_image_spacing {
            input.spacing()
        } else {
            [1.0, 1.0]
        };

        let image = input.map(|v| v.as_() as f32).with_spacing(spacing)?;
        let field = self
            .gradient
            .compute(&image, self.config.sigma_gradient as f32)?;

        let geometry = VoteGeometry::new(&self.config, spacing, input.size())?;
        let grid = cast_votes(
            candidates_above(input, self.config.threshold),
            &field,
            &geometry,
            input.size(),
            self.config.strategy,
        )?;
        let (accumulator, radius) = grid.into_images(input, &geometry)?;

        self.runs += 1;
        let version = AccumulatorVersion(self.runs);
        self.votes = Some(VoteResult {
            accumulator,
            radius,
            version,
        });

        log::debug!(
            "accumulator version {} built for {} image in {:?}",
            version.get(),
            input.size(),
            start.elapsed()
        );

        Ok(version)
    }

    /// Extract the circles, running the vote caster first if the accumulator is stale.
    ///
    /// Extraction is cached: as long as neither the accumulator nor the extraction parameters
    /// change, every call returns the same list without recomputing it.
    ///
    /// # Errors
    ///
    /// * [`HoughError::MissingInput`] if no input image was set.
    /// * Any error of the vote caster or of the smoother. The previous cache is kept.
    pub fn circles(&mut self) -> Result<&[Circle], HoughError> {
        let version = match &self.votes {
            Some(votes) => votes.version,
            None => self.update()?,
        };
        let params = self.config.extraction_params();

        let fresh = matches!(
            &self.cache,
            Some(cache) if cache.version == version && cache.params == params
        );
        if !fresh {
            let cache = self.extract(params)?;
            self.cache = Some(cache);
        }

        Ok(self
            .cache
            .as_ref()
            .map(|cache| cache.circles.as_slice())
            .unwrap_or_default())
    }

    fn extract(&self, params: ExtractionParams) -> Result<CachedCircles, HoughError> {
        let votes = self.votes.as_ref().ok_or(HoughError::MissingInput)?;
        let start = Instant::now();

        let mut smoothed = votes.accumulator.full_like(0.0f32);
        self.smoother
            .smooth(&votes.accumulator, &mut smoothed, params.variance as f32)?;
        // the extractor relies on a non-negative accumulator
        smoothed
            .as_slice_mut()
            .iter_mut()
            .for_each(|v| *v = v.max(0.0));

        let spacing = if self.config.use_image_spacing {
            smoothed.spacing()
        } else {
            [1.0, 1.0]
        };

        let circles = PeakExtractor::new(
            &mut smoothed,
            &votes.radius,
            params.number_of_circles,
            params.disc_radius_ratio,
            spacing,
        )
        .collect::<Vec<_>>();

        log::info!(
            "extracted {} of {} requested circles in {:?}",
            circles.len(),
            params.number_of_circles,
            start.elapsed()
        );

        Ok(CachedCircles {
            version: votes.version,
            params,
            circles,
            suppressed: smoothed,
        })
    }

    /// The raw vote accumulator of the last run, if any.
    pub fn accumulator(&self) -> Option<&Image<f32, 1>> {
        self.votes.as_ref().map(|v| &v.accumulator)
    }

    /// The mean voted radius of every accumulator cell, if the votes were cast.
    pub fn radius_image(&self) -> Option<&Image<f32, 1>> {
        self.votes.as_ref().map(|v| &v.radius)
    }

    /// The smoothed accumulator after the suppression discs of the cached circles were cleared.
    pub fn suppressed_accumulator(&self) -> Option<&Image<f32, 1>> {
        self.cache.as_ref().map(|c| &c.suppressed)
    }

    /// The version of the current accumulator, if the votes were cast.
    pub fn version(&self) -> Option<AccumulatorVersion> {
        self.votes.as_ref().map(|v| v.version)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hough_image::{ImageError, ImageSize};
    use hough_imgproc::gradient::GradientField;
    use hough_imgproc::parallel::ExecutionStrategy;
    use std::cell::Cell;

    /// Gradient pointing away from a fixed point, whatever the image content.
    struct RadialGradient {
        center: [f32; 2],
    }

    impl GradientOperator for RadialGradient {
        fn compute(&self, src: &Image<f32, 1>, _sigma: f32) -> Result<GradientField, ImageError> {
            let cols = src.cols();
            let gx = (0..src.size().area())
                .map(|i| (i % cols) as f32 - self.center[0])
                .collect();
            let gy = (0..src.size().area())
                .map(|i| (i / cols) as f32 - self.center[1])
                .collect();
            Ok(GradientField {
                gx: Image::new(src.size(), gx)?,
                gy: Image::new(src.size(), gy)?,
            })
        }
    }

    /// Copies the accumulator and counts how many times it ran. Fails while `fail` is set.
    #[derive(Default)]
    struct CountingSmoother {
        calls: Cell<usize>,
        fail: Cell<bool>,
        strategy: Option<ExecutionStrategy>,
    }

    impl Smoother for CountingSmoother {
        fn smooth(
            &self,
            src: &Image<f32, 1>,
            dst: &mut Image<f32, 1>,
            _variance: f32,
        ) -> Result<(), ImageError> {
            self.calls.set(self.calls.get() + 1);
            if self.fail.get() {
                return Err(ImageError::ExecutionError("smoother failed".to_string()));
            }
            dst.as_slice_mut().copy_from_slice(src.as_slice());
            Ok(())
        }

        fn set_strategy(&mut self, strategy: ExecutionStrategy) {
            self.strategy = Some(strategy);
        }
    }

    /// An image with the pixels at distance `radius` of `center` set to 1.
    fn ring(size: ImageSize, center: [f32; 2], radius: f32) -> Result<Image<u8, 1>, ImageError> {
        let data = (0..size.area())
            .map(|i| {
                let dx = (i % size.width) as f32 - center[0];
                let dy = (i / size.width) as f32 - center[1];
                u8::from((dx.hypot(dy) - radius).abs() < 0.5)
            })
            .collect();
        Image::new(size, data)
    }

    fn stub_detector(
        config: HoughCirclesConfig,
        center: [f32; 2],
    ) -> Result<HoughCircles<u8, RadialGradient, CountingSmoother>, HoughError> {
        HoughCircles::with_operators(config, RadialGradient { center }, CountingSmoother::default())
    }

    fn config() -> HoughCirclesConfig {
        HoughCirclesConfig {
            minimum_radius: 5.0,
            maximum_radius: 5.0,
            threshold: 0.0,
            variance: 0.0,
            number_of_circles: 3,
            strategy: ExecutionStrategy::Serial,
            ..Default::default()
        }
    }

    #[test]
    fn test_missing_input() -> Result<(), HoughError> {
        let mut detector = HoughCircles::<u8>::new(HoughCirclesConfig::default())?;
        assert!(matches!(detector.update(), Err(HoughError::MissingInput)));
        assert!(matches!(detector.circles(), Err(HoughError::MissingInput)));
        assert!(detector.accumulator().is_none());
        assert!(detector.version().is_none());
        Ok(())
    }

    #[test]
    fn test_invalid_config_is_rejected() -> Result<(), HoughError> {
        let bad = HoughCirclesConfig {
            minimum_radius: 3.0,
            maximum_radius: 2.0,
            ..Default::default()
        };
        assert!(matches!(
            HoughCircles::<u8>::new(bad),
            Err(HoughError::InvalidRadiusRange { .. })
        ));

        let mut detector = HoughCircles::<u8>::new(HoughCirclesConfig::default())?;
        assert!(detector.set_config(bad).is_err());
        assert_eq!(detector.config(), &HoughCirclesConfig::default());
        Ok(())
    }

    #[test]
    fn test_stub_gradient_finds_ring() -> Result<(), Box<dyn std::error::Error>> {
        let size = ImageSize {
            width: 21,
            height: 21,
        };
        let mut detector = stub_detector(config(), [10.0, 10.0])?;
        detector.set_input(ring(size, [10.0, 10.0], 5.0)?);

        let circles = detector.circles()?;
        let first = *circles.first().ok_or("no circle")?;
        assert_eq!(first.center, [10, 10]);
        assert_eq!(first.radius, 5.0);

        let accumulator = detector.accumulator().ok_or("no accumulator")?;
        assert!(accumulator.as_slice().iter().all(|&v| v >= 0.0));
        assert_eq!(accumulator.max_value(), Some(first.votes));

        // every populated radius cell holds the single sampled radius
        let radius = detector.radius_image().ok_or("no radius image")?;
        for (&r, &v) in radius.as_slice().iter().zip(accumulator.as_slice()) {
            if v > 0.0 {
                assert_eq!(r, 5.0);
            } else {
                assert_eq!(r, 0.0);
            }
        }

        Ok(())
    }

    #[test]
    fn test_circles_is_cached() -> Result<(), Box<dyn std::error::Error>> {
        let size = ImageSize {
            width: 21,
            height: 21,
        };
        let mut detector = stub_detector(config(), [10.0, 10.0])?;
        detector.set_input(ring(size, [10.0, 10.0], 5.0)?);

        let first = detector.circles()?.to_vec();
        let first_ptr = detector.circles()?.as_ptr();
        let second = detector.circles()?.to_vec();

        assert_eq!(first, second);
        assert_eq!(detector.circles()?.as_ptr(), first_ptr);
        assert_eq!(detector.smoother.calls.get(), 1);
        assert_eq!(detector.version().map(|v| v.get()), Some(1));

        Ok(())
    }

    #[test]
    fn test_cache_invalidation() -> Result<(), Box<dyn std::error::Error>> {
        let size = ImageSize {
            width: 21,
            height: 21,
        };
        let mut detector = stub_detector(config(), [10.0, 10.0])?;
        detector.set_input(ring(size, [10.0, 10.0], 5.0)?);
        detector.circles()?;
        assert_eq!(detector.smoother.calls.get(), 1);

        // a new vote run advances the version and forces a new extraction
        let version = detector.update()?;
        assert_eq!(version.get(), 2);
        detector.circles()?;
        assert_eq!(detector.smoother.calls.get(), 2);

        // an extraction parameter alone does not recast the votes
        detector.set_config(HoughCirclesConfig {
            number_of_circles: 1,
            ..*detector.config()
        })?;
        assert_eq!(detector.circles()?.len(), 1);
        assert_eq!(detector.smoother.calls.get(), 3);
        assert_eq!(detector.version(), Some(version));

        // a voting parameter discards the accumulator
        detector.set_config(HoughCirclesConfig {
            threshold: 0.5,
            ..*detector.config()
        })?;
        assert!(detector.accumulator().is_none());
        detector.circles()?;
        assert_eq!(detector.version().map(|v| v.get()), Some(3));
        assert_eq!(detector.smoother.calls.get(), 4);

        // so does a new input
        detector.set_input(ring(size, [10.0, 10.0], 5.0)?);
        assert!(detector.version().is_none());
        detector.circles()?;
        assert_eq!(detector.version().map(|v| v.get()), Some(4));

        Ok(())
    }

    #[test]
    fn test_suppressed_accumulator() -> Result<(), Box<dyn std::error::Error>> {
        let size = ImageSize {
            width: 21,
            height: 21,
        };
        let mut detector = stub_detector(config(), [10.0, 10.0])?;
        detector.set_input(ring(size, [10.0, 10.0], 5.0)?);
        assert!(detector.suppressed_accumulator().is_none());

        let circles = detector.circles()?.to_vec();
        let suppressed = detector.suppressed_accumulator().ok_or("not extracted")?;

        assert!(circles.len() <= 3);
        for circle in &circles {
            let reach = circle.radius * detector.config().disc_radius_ratio;
            for y in 0..size.height {
                for x in 0..size.width {
                    let d = (x as f64 - circle.center[0] as f64)
                        .hypot(y as f64 - circle.center[1] as f64);
                    if d <= reach {
                        assert_eq!(*suppressed.get_pixel(x, y, 0)?, 0.0);
                    }
                }
            }
        }

        Ok(())
    }

    #[test]
    fn test_empty_when_threshold_above_max() -> Result<(), Box<dyn std::error::Error>> {
        let size = ImageSize {
            width: 21,
            height: 21,
        };
        let mut detector = stub_detector(
            HoughCirclesConfig {
                threshold: 1.0,
                ..config()
            },
            [10.0, 10.0],
        )?;
        detector.set_input(ring(size, [10.0, 10.0], 5.0)?);

        assert!(detector.circles()?.is_empty());
        let accumulator = detector.accumulator().ok_or("no accumulator")?;
        assert!(accumulator.as_slice().iter().all(|&v| v == 0.0));

        Ok(())
    }

    #[test]
    fn test_ignore_image_spacing() -> Result<(), Box<dyn std::error::Error>> {
        let size = ImageSize {
            width: 21,
            height: 21,
        };
        let image = ring(size, [10.0, 10.0], 5.0)?.with_spacing([3.0, 3.0])?;

        let mut detector = stub_detector(
            HoughCirclesConfig {
                use_image_spacing: false,
                ..config()
            },
            [10.0, 10.0],
        )?;
        detector.set_input(image);

        let circles = detector.circles()?;
        let first = circles.first().ok_or("no circle")?;
        assert_eq!(first.center, [10, 10]);
        // the physical center still follows the image geometry
        assert_eq!(first.center_point, [30.0, 30.0]);

        Ok(())
    }

    #[test]
    fn test_huge_maximum_radius() -> Result<(), Box<dyn std::error::Error>> {
        let size = ImageSize {
            width: 16,
            height: 16,
        };
        let mut detector = stub_detector(
            HoughCirclesConfig {
                minimum_radius: 0.0,
                maximum_radius: 1e20,
                ..config()
            },
            [8.0, 8.0],
        )?;
        detector.set_input(ring(size, [8.0, 8.0], 5.0)?);

        let circles = detector.circles()?;
        let first = circles.first().ok_or("no circle")?;
        assert_eq!(first.center, [8, 8]);

        // radii are sampled up to the diagonal of the grid only
        let radius = detector.radius_image().ok_or("no radius image")?;
        assert!(radius.as_slice().iter().all(|&r| r <= 16.0 * 2f32.sqrt()));

        Ok(())
    }

    #[test]
    fn test_too_many_radii_is_an_error() -> Result<(), Box<dyn std::error::Error>> {
        let size = ImageSize {
            width: 16,
            height: 16,
        };
        let mut detector = stub_detector(
            HoughCirclesConfig {
                minimum_radius: 0.0,
                maximum_radius: 10.0,
                ..config()
            },
            [8.0, 8.0],
        )?;
        // one radius step per 1e-12 units
        detector.set_input(ring(size, [8.0, 8.0], 5.0)?.with_spacing([1.0, 1e-12])?);

        assert!(matches!(
            detector.circles(),
            Err(HoughError::InvalidParameter {
                name: "maximum_radius",
                ..
            })
        ));
        assert!(detector.accumulator().is_none());

        Ok(())
    }

    #[test]
    fn test_failed_extraction_keeps_cache() -> Result<(), Box<dyn std::error::Error>> {
        let size = ImageSize {
            width: 21,
            height: 21,
        };
        let mut detector = stub_detector(config(), [10.0, 10.0])?;
        detector.set_input(ring(size, [10.0, 10.0], 5.0)?);
        let circles = detector.circles()?.to_vec();

        detector.smoother.fail.set(true);
        detector.set_config(HoughCirclesConfig {
            number_of_circles: 1,
            ..*detector.config()
        })?;
        assert!(matches!(detector.circles(), Err(HoughError::Image(_))));
        assert!(detector.suppressed_accumulator().is_some());

        // the previous parameters still hit the surviving cache
        detector.set_config(HoughCirclesConfig {
            number_of_circles: 3,
            ..*detector.config()
        })?;
        assert_eq!(detector.circles()?, circles.as_slice());
        assert_eq!(detector.smoother.calls.get(), 2);

        Ok(())
    }

    #[test]
    fn test_strategy_reaches_operators() -> Result<(), Box<dyn std::error::Error>> {
        let size = ImageSize {
            width: 21,
            height: 21,
        };
        let mut detector = stub_detector(config(), [10.0, 10.0])?;
        assert_eq!(detector.smoother.strategy, Some(ExecutionStrategy::Serial));

        detector.set_input(ring(size, [10.0, 10.0], 5.0)?);
        detector.circles()?;
        let version = detector.version();

        detector.set_config(HoughCirclesConfig {
            strategy: ExecutionStrategy::Fixed(2),
            ..*detector.config()
        })?;
        assert_eq!(detector.smoother.strategy, Some(ExecutionStrategy::Fixed(2)));
        assert_eq!(detector.version(), version);
        detector.circles()?;
        assert_eq!(detector.smoother.calls.get(), 1);

        let mut detector = HoughCircles::<u8>::new(HoughCirclesConfig {
            strategy: ExecutionStrategy::Fixed(3),
            ..Default::default()
        })?;
        assert_eq!(detector.gradient.strategy, ExecutionStrategy::Fixed(3));
        assert_eq!(detector.smoother.strategy, ExecutionStrategy::Fixed(3));

        detector.set_config(HoughCirclesConfig {
            strategy: ExecutionStrategy::Serial,
            ..Default::default()
        })?;
        assert_eq!(detector.gradient.strategy, ExecutionStrategy::Serial);
        assert_eq!(detector.smoother.strategy, ExecutionStrategy::Serial);

        Ok(())
    }
}
