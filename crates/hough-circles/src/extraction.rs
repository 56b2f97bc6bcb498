//! Iterative peak extraction with disc suppression.
//!
//! The extractor is a small state machine driven by [`Iterator::next`]:
//!
//! ```text
//! Idle -> Scanning -> Suppressing -> Scanning ... -> Done
//! ```
//!
//! Scanning looks for the strongest cell in the accumulator. A strictly positive maximum becomes
//! a [`Circle`] and the disc around it is zeroed while Suppressing. Extraction stops once the
//! requested number of circles has been emitted or no positive cell remains.

use hough_image::Image;

use crate::circle::Circle;

/// Phase of a [`PeakExtractor`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtractionState {
    /// No scan has started yet.
    Idle,
    /// Looking for the next peak.
    Scanning,
    /// A peak was found and its disc is about to be cleared.
    Suppressing,
    /// No further circle will be produced.
    Done,
}

/// Find the largest cell of `accumulator` as `(x, y, value)`.
///
/// The scan is row-major and the running maximum is only replaced by a strictly greater value,
/// so ties resolve to the smallest row and then the smallest column.
pub fn find_peak(accumulator: &Image<f32, 1>) -> Option<(usize, usize, f32)> {
    let cols = accumulator.cols();
    let mut best: Option<(usize, f32)> = None;

    for (idx, &value) in accumulator.as_slice().iter().enumerate() {
        match best {
            Some((_, max)) if value <= max => {}
            _ if value.is_nan() => {}
            _ => best = Some((idx, value)),
        }
    }

    best.map(|(idx, value)| (idx % cols, idx / cols, value))
}

/// Zero every cell whose physical distance to `center` is at most `radius`.
///
/// `spacing` gives the physical size of a cell. The center cell is always cleared.
pub fn suppress_disc(
    accumulator: &mut Image<f32, 1>,
    center: [usize; 2],
    radius: f64,
    spacing: [f64; 2],
) {
    let cols = accumulator.cols();
    let rows = accumulator.rows();
    let [cx, cy] = center;

    let data = accumulator.as_slice_mut();
    if let Some(cell) = data.get_mut(cy * cols + cx) {
        *cell = 0.0;
    }

    if radius.is_nan() || radius <= 0.0 {
        return;
    }

    // bounding box of the disc in cells, clipped to the grid
    let reach_x = (radius / spacing[0]).ceil() as usize;
    let reach_y = (radius / spacing[1]).ceil() as usize;
    let x0 = cx.saturating_sub(reach_x);
    let x1 = (cx + reach_x).min(cols.saturating_sub(1));
    let y0 = cy.saturating_sub(reach_y);
    let y1 = (cy + reach_y).min(rows.saturating_sub(1));

    let radius_sq = radius * radius;
    for y in y0..=y1 {
        let dy = (y as f64 - cy as f64) * spacing[1];
        for x in x0..=x1 {
            let dx = (x as f64 - cx as f64) * spacing[0];
            if dx * dx + dy * dy <= radius_sq {
                data[y * cols + x] = 0.0;
            }
        }
    }
}

/// Extracts circles one at a time from a smoothed accumulator.
///
/// The extractor consumes the accumulator in place: after each emitted circle the cells of its
/// suppression disc are exactly zero.
pub struct PeakExtractor<'a> {
    accumulator: &'a mut Image<f32, 1>,
    radius_image: &'a Image<f32, 1>,
    number_of_circles: usize,
    disc_radius_ratio: f64,
    spacing: [f64; 2],
    state: ExtractionState,
    pending: Option<Circle>,
    emitted: usize,
}

impl<'a> PeakExtractor<'a> {
    /// Create a new extractor.
    ///
    /// # Arguments
    ///
    /// * `accumulator` - The smoothed vote accumulator, modified in place.
    /// * `radius_image` - The mean radius of every cell.
    /// * `number_of_circles` - The maximum number of circles to emit.
    /// * `disc_radius_ratio` - The suppression disc radius as a multiple of the circle radius.
    /// * `spacing` - The physical size of a cell, `[1.0, 1.0]` to work in pixels.
    ///
    /// PRECONDITION: `accumulator` and `radius_image` have the same size.
    pub fn new(
        accumulator: &'a mut Image<f32, 1>,
        radius_image: &'a Image<f32, 1>,
        number_of_circles: usize,
        disc_radius_ratio: f64,
        spacing: [f64; 2],
    ) -> Self {
        Self {
            accumulator,
            radius_image,
            number_of_circles,
            disc_radius_ratio,
            spacing,
            state: ExtractionState::Idle,
            pending: None,
            emitted: 0,
        }
    }

    /// The current phase of the extraction.
    pub fn state(&self) -> ExtractionState {
        self.state
    }

    /// The accumulator as suppressed so far.
    pub fn accumulator(&self) -> &Image<f32, 1> {
        self.accumulator
    }

    fn scan(&mut self) -> Option<Circle> {
        let (x, y, votes) = find_peak(self.accumulator)?;
        if votes <= 0.0 {
            return None;
        }

        let idx = y * self.accumulator.cols() + x;
        let radius = self
            .radius_image
            .as_slice()
            .get(idx)
            .copied()
            .unwrap_or_default();

        Some(Circle {
            center: [x, y],
            center_point: self.accumulator.index_to_physical(x, y),
            radius: radius as f64,
            votes,
        })
    }
}

impl Iterator for PeakExtractor<'_> {
    type Item = Circle;

    fn next(&mut self) -> Option<Circle> {
        loop {
            match self.state {
                ExtractionState::Idle => {
                    self.state = if self.number_of_circles == 0 {
                        ExtractionState::Done
                    } else {
                        ExtractionState::Scanning
                    };
                }
                ExtractionState::Scanning => match self.scan() {
                    Some(circle) => {
                        self.pending = Some(circle);
                        self.state = ExtractionState::Suppressing;
                    }
                    None => self.state = ExtractionState::Done,
                },
                ExtractionState::Suppressing => {
                    let circle = self.pending.take()?;
                    suppress_disc(
                        self.accumulator,
                        circle.center,
                        self.disc_radius_ratio * circle.radius,
                        self.spacing,
                    );
                    self.emitted += 1;
                    self.state = if self.emitted >= self.number_of_circles {
                        ExtractionState::Done
                    } else {
                        ExtractionState::Scanning
                    };

                    log::trace!(
                        "circle #{} at {:?}, radius {:.3}, votes {:.3}",
                        self.emitted,
                        circle.center,
                        circle.radius,
                        circle.votes
                    );
                    return Some(circle);
                }
                ExtractionState::Done => return None,
            }
        }
    }
}

impl std::iter::FusedIterator for PeakExtractor<'_> {}
