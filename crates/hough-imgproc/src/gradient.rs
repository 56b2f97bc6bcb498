//! Gradient estimation.
//!
//! The Hough voting only needs a direction per pixel, so the estimator is exposed as the
//! [`GradientOperator`] trait and callers can swap the default derivative of gaussian for a
//! deterministic field in tests.

use hough_image::{Image, ImageError};

use crate::filter::{kernels, separable_filter_with_strategy};
use crate::parallel::ExecutionStrategy;

/// Gradients with a norm at or below this value carry no usable direction.
pub const GRADIENT_EPSILON: f32 = 1e-6;

/// Dense gradient of an image, xy-ordered per pixel.
#[derive(Debug, Clone, PartialEq)]
pub struct GradientField {
    /// Derivative along x (columns).
    pub gx: Image<f32, 1>,
    /// Derivative along y (rows).
    pub gy: Image<f32, 1>,
}

impl GradientField {
    /// Gradient vector `[gx, gy]` at pixel `(x, y)`.
    ///
    /// PRECONDITION: `(x, y)` lies inside the field.
    #[inline]
    pub fn at(&self, x: usize, y: usize) -> [f32; 2] {
        let idx = y * self.gx.cols() + x;
        [self.gx.as_slice()[idx], self.gy.as_slice()[idx]]
    }

    /// Unit direction of the gradient at `(x, y)`, or `None` when the norm is negligible.
    pub fn direction(&self, x: usize, y: usize) -> Option<[f32; 2]> {
        let [gx, gy] = self.at(x, y);
        let norm = gx.hypot(gy);
        if norm.is_finite() && norm > GRADIENT_EPSILON {
            Some([gx / norm, gy / norm])
        } else {
            None
        }
    }
}

/// Estimates the gradient of an image at a given scale.
pub trait GradientOperator {
    /// Compute the gradient field of `src` smoothed at scale `sigma` (physical units).
    fn compute(&self, src: &Image<f32, 1>, sigma: f32) -> Result<GradientField, ImageError>;

    /// Run the following computations with the given strategy. Ignored by default.
    fn set_strategy(&mut self, _strategy: ExecutionStrategy) {}
}

/// Derivative of gaussian gradient estimator.
///
/// Each component is a separable correlation with a gaussian derivative along its own axis
/// and a gaussian along the other one.
#[derive(Debug, Clone, Copy)]
pub struct DerivativeOfGaussian {
    /// Interpret `sigma` in physical units and return derivatives per unit length.
    pub use_image_spacing: bool,
    /// Execution strategy of the filter passes.
    pub strategy: ExecutionStrategy,
}

impl Default for DerivativeOfGaussian {
    fn default() -> Self {
        Self {
            use_image_spacing: true,
            strategy: ExecutionStrategy::default(),
        }
    }
}

impl GradientOperator for DerivativeOfGaussian {
    fn set_strategy(&mut self, strategy: ExecutionStrategy) {
        self.strategy = strategy;
    }

    fn compute(&self, src: &Image<f32, 1>, sigma: f32) -> Result<GradientField, ImageError> {
        let spacing = if self.use_image_spacing {
            src.spacing()
        } else {
            [1.0, 1.0]
        };

        let sigma_x = sigma / spacing[0] as f32;
        let sigma_y = sigma / spacing[1] as f32;

        let smooth_x = kernels::gaussian_kernel_1d(kernels::kernel_size_from_sigma(sigma_x), sigma_x);
        let smooth_y = kernels::gaussian_kernel_1d(kernels::kernel_size_from_sigma(sigma_y), sigma_y);
        let deriv_x = scaled(
            kernels::gaussian_derivative_kernel_1d(kernels::kernel_size_from_sigma(sigma_x), sigma_x),
            spacing[0],
        );
        let deriv_y = scaled(
            kernels::gaussian_derivative_kernel_1d(kernels::kernel_size_from_sigma(sigma_y), sigma_y),
            spacing[1],
        );

        let mut gx = src.full_like(0.0f32);
        separable_filter_with_strategy(src, &mut gx, &deriv_x, &smooth_y, self.strategy)?;

        let mut gy = src.full_like(0.0f32);
        separable_filter_with_strategy(src, &mut gy, &smooth_x, &deriv_y, self.strategy)?;

        Ok(GradientField { gx, gy })
    }
}

/// Convert a per-pixel derivative kernel into a per-unit-length one.
fn scaled(mut kernel: Vec<f32>, spacing: f64) -> Vec<f32> {
    kernel.iter_mut().for_each(|k| *k /= spacing as f32);
    kernel
}
