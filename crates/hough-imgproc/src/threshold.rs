use hough_image::Image;
use num_traits::AsPrimitive;

/// A lazy iterator over the pixels of a single channel image whose value is strictly
/// greater than a threshold.
///
/// Pixels are visited in row-major order and yielded as `[x, y]`. The iterator borrows the
/// image, has no side effects and can be restarted by cloning it before consumption.
#[derive(Debug, Clone)]
pub struct CandidateIter<'a, T> {
    data: &'a [T],
    cols: usize,
    threshold: f64,
    next_index: usize,
}

impl<T> Iterator for CandidateIter<'_, T>
where
    T: AsPrimitive<f64>,
{
    type Item = [usize; 2];

    fn next(&mut self) -> Option<Self::Item> {
        while self.next_index < self.data.len() {
            let idx = self.next_index;
            self.next_index += 1;
            if self.data[idx].as_() > self.threshold {
                return Some([idx % self.cols, idx / self.cols]);
            }
        }
        None
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (0, Some(self.data.len() - self.next_index))
    }
}

impl<T> std::iter::FusedIterator for CandidateIter<'_, T> where T: AsPrimitive<f64> {}

/// Select the pixels of `src` whose value is strictly greater than `threshold`.
///
/// A threshold above the image maximum yields an empty sequence.
///
/// # Examples
///
/// ```
/// use hough_image::Image;
/// use hough_imgproc::threshold::candidates_above;
///
/// let data = vec![100u8, 200, 50, 150, 200, 250];
/// let image = Image::<_, 1>::new([2, 3].into(), data).unwrap();
///
/// let candidates = candidates_above(&image, 150.0).collect::<Vec<_>>();
/// assert_eq!(candidates, vec![[1, 0], [0, 2], [1, 2]]);
/// ```
pub fn candidates_above<T>(src: &Image<T, 1>, threshold: f64) -> CandidateIter<'_, T>
where
    T: AsPrimitive<f64>,
{
    CandidateIter {
        data: src.as_slice(),
        cols: src.cols(),
        threshold,
        next_index: 0,
    }
}
