use hough_image::ImageError;
use hough_imgproc::parallel::ParallelError;

/// Errors that can occur when detecting circles.
#[derive(Debug, thiserror::Error)]
pub enum HoughError {
    /// Error related to image.
    #[error(transparent)]
    Image(#[from] ImageError),

    /// Error related to the execution strategy.
    #[error(transparent)]
    Parallel(#[from] ParallelError),

    /// The minimum radius is greater than the maximum radius.
    #[error("Minimum radius ({min}) is greater than maximum radius ({max})")]
    InvalidRadiusRange {
        /// The configured minimum radius.
        min: f64,
        /// The configured maximum radius.
        max: f64,
    },

    /// A parameter is negative or not finite.
    #[error("Invalid value for {name}: {value}")]
    InvalidParameter {
        /// Name of the offending parameter.
        name: &'static str,
        /// The rejected value.
        value: f64,
    },

    /// The detector was run before an input image was set.
    #[error("No input image has been set")]
    MissingInput,
}
