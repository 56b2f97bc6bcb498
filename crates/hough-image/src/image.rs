use crate::error::ImageError;

/// Image size in pixels
///
/// A struct to represent the size of an image in pixels.
///
/// # Examples
///
/// ```
/// use hough_image::ImageSize;
///
/// let image_size = ImageSize {
///   width: 10,
///   height: 20,
/// };
///
/// assert_eq!(image_size.width, 10);
/// assert_eq!(image_size.height, 20);
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ImageSize {
    /// Width of the image in pixels
    pub width: usize,
    /// Height of the image in pixels
    pub height: usize,
}

impl ImageSize {
    /// Number of pixels covered by the size.
    pub fn area(&self) -> usize {
        self.width * self.height
    }
}

impl std::fmt::Display for ImageSize {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(
            f,
            "ImageSize {{ width: {}, height: {} }}",
            self.width, self.height
        )
    }
}

impl From<[usize; 2]> for ImageSize {
    fn from(size: [usize; 2]) -> Self {
        ImageSize {
            width: size[0],
            height: size[1],
        }
    }
}

/// Represents an image with pixel data and its physical sampling.
///
/// The pixel data is stored row-major with interleaved channels, i.e. with shape (H, W, C).
/// Every image carries a per-axis `spacing` (physical length of one pixel along x and y)
/// and an `origin` (physical position of the pixel at index `(0, 0)`), so that lengths
/// given in physical units can be mapped to pixel offsets.
#[derive(Clone, Debug, PartialEq)]
pub struct Image<T, const CHANNELS: usize> {
    data: Vec<T>,
    size: ImageSize,
    spacing: [f64; 2],
    origin: [f64; 2],
}

impl<T, const CHANNELS: usize> Image<T, CHANNELS> {
    /// Create a new image from pixel data.
    ///
    /// The image gets a unit spacing and a zero origin.
    ///
    /// # Arguments
    ///
    /// * `size` - The size of the image in pixels.
    /// * `data` - The pixel data of the image.
    ///
    /// # Errors
    ///
    /// If the length of the pixel data does not match the image size, an error is returned.
    ///
    /// # Examples
    ///
    /// ```
    /// use hough_image::{Image, ImageSize};
    ///
    /// let image = Image::<u8, 3>::new(
    ///    ImageSize {
    ///       width: 10,
    ///       height: 20,
    ///    },
    ///    vec![0u8; 10 * 20 * 3],
    /// ).unwrap();
    ///
    /// assert_eq!(image.size().width, 10);
    /// assert_eq!(image.size().height, 20);
    /// assert_eq!(image.num_channels(), 3);
    /// ```
    pub fn new(size: ImageSize, data: Vec<T>) -> Result<Self, ImageError> {
        // check if the data length matches the image size
        if data.len() != size.width * size.height * CHANNELS {
            return Err(ImageError::InvalidChannelShape(
                data.len(),
                size.width * size.height * CHANNELS,
            ));
        }

        Ok(Self {
            data,
            size,
            spacing: [1.0, 1.0],
            origin: [0.0, 0.0],
        })
    }

    /// Create a new image with the given size and default pixel data.
    ///
    /// # Arguments
    ///
    /// * `size` - The size of the image in pixels.
    /// * `val` - The default value of the pixel data.
    ///
    /// # Examples
    ///
    /// ```
    /// use hough_image::{Image, ImageSize};
    ///
    /// let image = Image::<u8, 1>::from_size_val([10, 20].into(), 0u8).unwrap();
    ///
    /// assert_eq!(image.size().width, 10);
    /// assert_eq!(image.size().height, 20);
    /// ```
    pub fn from_size_val(size: ImageSize, val: T) -> Result<Self, ImageError>
    where
        T: Clone,
    {
        let data = vec![val; size.width * size.height * CHANNELS];
        Image::new(size, data)
    }

    /// Create a new image sharing size, spacing and origin with `self`, filled with `val`.
    pub fn full_like<U: Clone>(&self, val: U) -> Image<U, CHANNELS> {
        Image {
            data: vec![val; self.data.len()],
            size: self.size,
            spacing: self.spacing,
            origin: self.origin,
        }
    }

    /// Set the physical spacing of the image, xy-ordered.
    ///
    /// # Errors
    ///
    /// Returns [`ImageError::InvalidSpacing`] when a component is not strictly positive and finite.
    pub fn with_spacing(mut self, spacing: [f64; 2]) -> Result<Self, ImageError> {
        if !spacing.iter().all(|s| s.is_finite() && *s > 0.0) {
            return Err(ImageError::InvalidSpacing(spacing[0], spacing[1]));
        }
        self.spacing = spacing;
        Ok(self)
    }

    /// Set the physical origin of the image, xy-ordered.
    pub fn with_origin(mut self, origin: [f64; 2]) -> Self {
        self.origin = origin;
        self
    }

    /// Get the physical spacing of the image, xy-ordered.
    pub fn spacing(&self) -> [f64; 2] {
        self.spacing
    }

    /// Get the physical origin of the image, xy-ordered.
    pub fn origin(&self) -> [f64; 2] {
        self.origin
    }

    /// Map a pixel index to its physical position.
    pub fn index_to_physical(&self, x: usize, y: usize) -> [f64; 2] {
        [
            self.origin[0] + x as f64 * self.spacing[0],
            self.origin[1] + y as f64 * self.spacing[1],
        ]
    }

    /// Get the size of the image in pixels.
    pub fn size(&self) -> ImageSize {
        self.size
    }

    /// Get the number of columns of the image.
    pub fn cols(&self) -> usize {
        self.width()
    }

    /// Get the number of rows of the image.
    pub fn rows(&self) -> usize {
        self.height()
    }

    /// Get the width of the image in pixels.
    pub fn width(&self) -> usize {
        self.size.width
    }

    /// Get the height of the image in pixels.
    pub fn height(&self) -> usize {
        self.size.height
    }

    /// Get the number of channels in the image.
    pub fn num_channels(&self) -> usize {
        CHANNELS
    }

    /// Get the pixel data as a flat slice.
    pub fn as_slice(&self) -> &[T] {
        &self.data
    }

    /// Get the pixel data as a flat mutable slice.
    pub fn as_slice_mut(&mut self) -> &mut [T] {
        &mut self.data
    }

    /// Get the pixel value at the given coordinates.
    ///
    /// # Arguments
    ///
    /// * `x` - The x-coordinate of the pixel.
    /// * `y` - The y-coordinate of the pixel.
    /// * `ch` - The channel index of the pixel.
    pub fn get_pixel(&self, x: usize, y: usize, ch: usize) -> Result<&T, ImageError> {
        if x >= self.width() || y >= self.height() {
            return Err(ImageError::PixelIndexOutOfBounds(
                x,
                y,
                self.width(),
                self.height(),
            ));
        }

        if ch >= CHANNELS {
            return Err(ImageError::ChannelIndexOutOfBounds(ch, CHANNELS));
        }

        Ok(&self.data[(y * self.width() + x) * CHANNELS + ch])
    }

    /// Set the pixel value at the given coordinates.
    pub fn set_pixel(&mut self, x: usize, y: usize, ch: usize, val: T) -> Result<(), ImageError> {
        if x >= self.width() || y >= self.height() {
            return Err(ImageError::PixelIndexOutOfBounds(
                x,
                y,
                self.width(),
                self.height(),
            ));
        }

        if ch >= CHANNELS {
            return Err(ImageError::ChannelIndexOutOfBounds(ch, CHANNELS));
        }

        let width = self.width();
        self.data[(y * width + x) * CHANNELS + ch] = val;
        Ok(())
    }

    /// Apply `f` to every element, keeping size, spacing and origin.
    pub fn map<U, F>(&self, f: F) -> Image<U, CHANNELS>
    where
        F: Fn(&T) -> U,
    {
        Image {
            data: self.data.iter().map(f).collect(),
            size: self.size,
            spacing: self.spacing,
            origin: self.origin,
        }
    }

    /// Maximum pixel value, ignoring NaNs. `None` for an empty image.
    pub fn max_value(&self) -> Option<T>
    where
        T: Copy + PartialOrd,
    {
        self.data
            .iter()
            .copied()
            // NaN is the only value not comparable with itself
            .filter(|v| v.partial_cmp(v).is_some())
            .fold(None, |acc, v| match acc {
                Some(m) if m >= v => Some(m),
                _ => Some(v),
            })
    }
}
