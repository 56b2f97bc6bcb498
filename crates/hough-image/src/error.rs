/// An error type for the image module.
#[derive(thiserror::Error, Debug, PartialEq)]
pub enum ImageError {
    /// Error when the data length does not match the image size.
    #[error("Data length ({0}) does not match the image size ({1})")]
    InvalidChannelShape(usize, usize),

    /// Error when two images that must share a size do not.
    #[error("Image size mismatch: {0}x{1} vs {2}x{3}")]
    InvalidImageSize(usize, usize, usize, usize),

    /// Error when the pixel coordinates are out of bounds.
    #[error("Pixel coordinates ({0}, {1}) are out of bounds ({2}, {3})")]
    PixelIndexOutOfBounds(usize, usize, usize, usize),

    /// Error when the channel index is out of bounds.
    #[error("Channel index ({0}) is out of bounds ({1})")]
    ChannelIndexOutOfBounds(usize, usize),

    /// Error when a filter kernel is empty.
    #[error("Invalid kernel length: ({0}, {1})")]
    InvalidKernelLength(usize, usize),

    /// Error when the pixel spacing is not strictly positive and finite.
    #[error("Invalid pixel spacing ({0}, {1})")]
    InvalidSpacing(f64, f64),

    /// Error when the work could not be scheduled on a thread pool.
    #[error("Failed to execute the operation: {0}")]
    ExecutionError(String),
}
