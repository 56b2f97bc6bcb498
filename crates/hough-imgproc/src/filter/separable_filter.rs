use hough_image::{Image, ImageError};
use rayon::prelude::*;

use crate::parallel::ExecutionStrategy;

/// Trait for floating point casting
pub trait FloatConversion {
    /// Convert the type to f32
    fn to_f32(&self) -> f32;
    /// Convert the type from f32
    fn from_f32(val: f32) -> Self;
}

impl FloatConversion for f32 {
    fn to_f32(&self) -> f32 {
        *self
    }

    fn from_f32(val: f32) -> Self {
        val
    }
}

impl FloatConversion for u8 {
    fn to_f32(&self) -> f32 {
        *self as f32
    }

    fn from_f32(val: f32) -> Self {
        val.round().clamp(0.0, 255.0) as u8
    }
}

/// A separable 2D filter that applies horizontal and vertical 1D correlations sequentially.
///
/// Samples outside the image are treated as zero.
struct SeparableFilter<'a> {
    kernel_x: &'a [f32],
    kernel_y: &'a [f32],
    offsets_x: Vec<isize>,
    offsets_y: Vec<isize>,
}

impl<'a> SeparableFilter<'a> {
    fn new(kernel_x: &'a [f32], kernel_y: &'a [f32]) -> Self {
        let half_x = (kernel_x.len() / 2) as isize;
        let half_y = (kernel_y.len() / 2) as isize;

        Self {
            kernel_x,
            kernel_y,
            offsets_x: (0..kernel_x.len() as isize).map(|i| i - half_x).collect(),
            offsets_y: (0..kernel_y.len() as isize).map(|i| i - half_y).collect(),
        }
    }

    /// Horizontal pass of one row into `row_temp`.
    fn filter_row<T: FloatConversion, const C: usize>(
        &self,
        src_row: &[T],
        row_temp: &mut [f32],
        cols: usize,
    ) {
        for c in 0..cols {
            let mut acc = [0.0f32; C];
            for (&k, &off) in self.kernel_x.iter().zip(self.offsets_x.iter()) {
                let x = c as isize + off;
                if x >= 0 && x < cols as isize {
                    let idx = x as usize * C;
                    for (ch, acc_val) in acc.iter_mut().enumerate() {
                        *acc_val += src_row[idx + ch].to_f32() * k;
                    }
                }
            }
            row_temp[c * C..(c + 1) * C].copy_from_slice(&acc);
        }
    }

    /// Vertical pass producing output row `r` from the horizontally filtered buffer.
    fn filter_col<T: FloatConversion, const C: usize>(
        &self,
        temp: &[f32],
        row_dst: &mut [T],
        r: usize,
        rows: usize,
        cols: usize,
    ) {
        for c in 0..cols {
            let mut acc = [0.0f32; C];
            for (&k, &off) in self.kernel_y.iter().zip(self.offsets_y.iter()) {
                let y = r as isize + off;
                if y >= 0 && y < rows as isize {
                    let idx = y as usize * cols * C + c * C;
                    for (ch, acc_val) in acc.iter_mut().enumerate() {
                        *acc_val += temp[idx + ch] * k;
                    }
                }
            }
            for (ch, &acc_val) in acc.iter().enumerate() {
                row_dst[c * C + ch] = T::from_f32(acc_val);
            }
        }
    }

    fn apply<T, const C: usize>(
        &self,
        src: &Image<T, C>,
        dst: &mut Image<T, C>,
        strategy: ExecutionStrategy,
    ) -> Result<(), ImageError>
    where
        T: FloatConversion + Send + Sync,
    {
        let rows = src.rows();
        let cols = src.cols();
        let stride = cols * C;
        if rows == 0 || stride == 0 {
            return Ok(());
        }

        let src_data = src.as_slice();
        let dst_data = dst.as_slice_mut();
        let mut temp = vec![0.0f32; src_data.len()];

        let run = |parallel: bool| {
            if parallel {
                temp.par_chunks_mut(stride)
                    .zip(src_data.par_chunks(stride))
                    .for_each(|(row_temp, src_row)| {
                        self.filter_row::<T, C>(src_row, row_temp, cols)
                    });
                let temp = &temp;
                dst_data
                    .par_chunks_mut(stride)
                    .enumerate()
                    .for_each(|(r, row_dst)| self.filter_col::<T, C>(temp, row_dst, r, rows, cols));
            } else {
                temp.chunks_mut(stride)
                    .zip(src_data.chunks(stride))
                    .for_each(|(row_temp, src_row)| {
                        self.filter_row::<T, C>(src_row, row_temp, cols)
                    });
                dst_data
                    .chunks_mut(stride)
                    .enumerate()
                    .for_each(|(r, row_dst)| self.filter_col::<T, C>(&temp, row_dst, r, rows, cols));
            }
        };

        strategy
            .install(run)
            .map_err(|e| ImageError::ExecutionError(e.to_string()))
    }
}

/// Apply a separable filter with execution strategy control.
///
/// # Arguments
///
/// * `src` - The source image with shape (H, W, C).
/// * `dst` - The destination image with shape (H, W, C).
/// * `kernel_x` - The horizontal kernel.
/// * `kernel_y` - The vertical kernel.
/// * `strategy` - Execution strategy used for both passes.
pub fn separable_filter_with_strategy<T, const C: usize>(
    src: &Image<T, C>,
    dst: &mut Image<T, C>,
    kernel_x: &[f32],
    kernel_y: &[f32],
    strategy: ExecutionStrategy,
) -> Result<(), ImageError>
where
    T: FloatConversion + Send + Sync,
{
    if kernel_x.is_empty() || kernel_y.is_empty() {
        return Err(ImageError::InvalidKernelLength(
            kernel_x.len(),
            kernel_y.len(),
        ));
    }

    if src.size() != dst.size() {
        return Err(ImageError::InvalidImageSize(
            src.cols(),
            src.rows(),
            dst.cols(),
            dst.rows(),
        ));
    }

    SeparableFilter::new(kernel_x, kernel_y).apply(src, dst, strategy)
}
