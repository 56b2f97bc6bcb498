use hough_image::{Image, ImageError};

use super::{kernels, separable_filter_with_strategy};
use crate::parallel::ExecutionStrategy;

/// Smoothing pass applied to a vote accumulator.
///
/// Implementations must keep the extent of the grid and must not produce negative values
/// from non-negative input.
pub trait Smoother {
    /// Smooth `src` into `dst` with a gaussian of the given `variance` (pixels squared).
    fn smooth(
        &self,
        src: &Image<f32, 1>,
        dst: &mut Image<f32, 1>,
        variance: f32,
    ) -> Result<(), ImageError>;

    /// Run the following passes with the given strategy. Ignored by default.
    fn set_strategy(&mut self, _strategy: ExecutionStrategy) {}
}

/// Separable gaussian smoothing with a kernel covering `±3 sigma`.
///
/// Pixels outside the grid count as zero, so a non-negative grid stays non-negative.
/// A zero variance copies the input unchanged.
#[derive(Debug, Clone, Copy, Default)]
pub struct GaussianSmoother {
    /// Execution strategy of the two filter passes.
    pub strategy: ExecutionStrategy,
}

impl Smoother for GaussianSmoother {
    fn set_strategy(&mut self, strategy: ExecutionStrategy) {
        self.strategy = strategy;
    }

    fn smooth(
        &self,
        src: &Image<f32, 1>,
        dst: &mut Image<f32, 1>,
        variance: f32,
    ) -> Result<(), ImageError> {
        if src.size() != dst.size() {
            return Err(ImageError::InvalidImageSize(
                src.cols(),
                src.rows(),
                dst.cols(),
                dst.rows(),
            ));
        }

        if variance <= 0.0 {
            dst.as_slice_mut().copy_from_slice(src.as_slice());
            return Ok(());
        }

        let sigma = variance.sqrt();
        let kernel = kernels::gaussian_kernel_1d(kernels::kernel_size_from_sigma(sigma), sigma);
        separable_filter_with_strategy(src, dst, &kernel, &kernel, self.strategy)
    }
}
