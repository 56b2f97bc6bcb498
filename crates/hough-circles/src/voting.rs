//! Gradient directed vote casting.
//!
//! Every candidate pixel votes for the cells lying at distance `r` along both senses of its
//! gradient direction, for each sampled radius `r` and each angular offset inside the sweep.
//! Alongside the vote count, each cell keeps the mean of the radii it was voted with.

use std::time::Instant;

use hough_image::{Image, ImageSize};
use hough_imgproc::gradient::GradientField;
use hough_imgproc::parallel::ExecutionStrategy;
use rayon::prelude::*;

use crate::config::HoughCirclesConfig;
use crate::error::HoughError;

/// One `(radius, angular offset)` pair at which a candidate votes.
#[derive(Debug, Clone, Copy, PartialEq)]
struct VoteSample {
    radius: f32,
    // radius expressed in pixels along x and y
    radius_x: f32,
    radius_y: f32,
    cos: f32,
    sin: f32,
}

/// Largest number of radii a [`VoteGeometry`] samples.
pub const MAX_RADII: usize = 1 << 20;

/// Radii and angular offsets sampled by the vote caster.
#[derive(Debug, Clone, PartialEq)]
pub struct VoteGeometry {
    samples: Vec<VoteSample>,
    minimum_radius: f32,
    maximum_radius: f32,
}

impl VoteGeometry {
    /// Sample the search space of `config` for a grid of the given `size` and `spacing`.
    ///
    /// Radii go from `minimum_radius` to `maximum_radius` in steps of the finest spacing, so one
    /// step is one pixel along the finest axis. Radii longer than the diagonal of the grid are
    /// skipped since none of their votes can land inside it. At radius `r` the angular offsets
    /// are the multiples of `step / r` within `±sweep_angle / 2`, capped at half a turn.
    ///
    /// PRECONDITION: `config` is valid and `spacing` is strictly positive.
    ///
    /// # Errors
    ///
    /// Returns [`HoughError::InvalidParameter`] when more than [`MAX_RADII`] radii would be
    /// sampled.
    pub fn new(
        config: &HoughCirclesConfig,
        spacing: [f64; 2],
        size: ImageSize,
    ) -> Result<Self, HoughError> {
        let step = spacing[0].min(spacing[1]);
        let half_sweep = (config.sweep_angle / 2.0).min(std::f64::consts::PI);

        let diagonal = (size.width as f64 * spacing[0]).hypot(size.height as f64 * spacing[1]);
        let maximum_radius = config.maximum_radius.min(diagonal);

        let too_many = || HoughError::InvalidParameter {
            name: "maximum_radius",
            value: config.maximum_radius,
        };

        let num_radii = if config.minimum_radius > maximum_radius {
            0
        } else {
            let span = ((maximum_radius - config.minimum_radius) / step + 1e-9).floor();
            if !span.is_finite() || span >= MAX_RADII as f64 {
                return Err(too_many());
            }
            span as usize + 1
        };

        let mut samples = Vec::with_capacity(num_radii);

        for k in 0..num_radii {
            let radius = config.minimum_radius + k as f64 * step;

            // one pixel of arc at this radius
            let (num_offsets, dphi) = if radius > 0.0 && half_sweep > 0.0 {
                let dphi = step / radius;
                ((half_sweep / dphi + 1e-9).floor() as i64, dphi)
            } else {
                (0, 0.0)
            };

            for j in -num_offsets..=num_offsets {
                let phi = j as f64 * dphi;
                samples.push(VoteSample {
                    radius: radius as f32,
                    radius_x: (radius / spacing[0]) as f32,
                    radius_y: (radius / spacing[1]) as f32,
                    cos: phi.cos() as f32,
                    sin: phi.sin() as f32,
                });
            }
        }

        Ok(Self {
            samples,
            minimum_radius: config.minimum_radius as f32,
            maximum_radius: config.maximum_radius as f32,
        })
    }

    /// Number of distinct radii sampled.
    pub fn num_radii(&self) -> usize {
        let mut count = 0;
        let mut last = None;
        for sample in &self.samples {
            if last != Some(sample.radius) {
                count += 1;
                last = Some(sample.radius);
            }
        }
        count
    }

    /// Upper bound of the votes a single candidate can cast.
    pub fn max_votes_per_candidate(&self) -> usize {
        2 * self.samples.len()
    }
}

/// Vote counts and running radius means over a grid.
#[derive(Debug, Clone, PartialEq)]
pub struct VoteGrid {
    size: ImageSize,
    votes: Vec<f32>,
    radius: Vec<f32>,
    cast: usize,
}

impl VoteGrid {
    /// Create an empty grid of the given size.
    pub fn new(size: ImageSize) -> Self {
        Self {
            size,
            votes: vec![0.0; size.area()],
            radius: vec![0.0; size.area()],
            cast: 0,
        }
    }

    /// Add one unit vote with the given radius to the cell at `idx`.
    #[inline]
    pub fn cast(&mut self, idx: usize, radius: f32) {
        self.votes[idx] += 1.0;
        self.radius[idx] += (radius - self.radius[idx]) / self.votes[idx];
        self.cast += 1;
    }

    /// Combine two partial grids of the same size.
    ///
    /// Vote counts add up and radius means are weighted by the partial vote counts.
    pub fn merge(mut self, other: VoteGrid) -> VoteGrid {
        for ((votes, radius), (other_votes, other_radius)) in self
            .votes
            .iter_mut()
            .zip(self.radius.iter_mut())
            .zip(other.votes.iter().zip(other.radius.iter()))
        {
            if *other_votes == 0.0 {
                continue;
            }
            let total = *votes + other_votes;
            *radius = (*radius * *votes + other_radius * other_votes) / total;
            *votes = total;
        }
        self.cast += other.cast;
        self
    }

    /// Number of votes that landed inside the grid.
    pub fn votes_cast(&self) -> usize {
        self.cast
    }

    /// Number of votes received by the cell `(x, y)`.
    pub fn votes_at(&self, x: usize, y: usize) -> f32 {
        self.votes[y * self.size.width + x]
    }

    /// Mean radius voted at cell `(x, y)`, 0 when the cell received no vote.
    pub fn radius_at(&self, x: usize, y: usize) -> f32 {
        self.radius[y * self.size.width + x]
    }

    /// Turn the grid into an accumulator and a radius image sharing the geometry of `like`.
    ///
    /// Radius means are clamped into the sampled radius range to absorb rounding.
    pub fn into_images<T>(
        mut self,
        like: &Image<T, 1>,
        geometry: &VoteGeometry,
    ) -> Result<(Image<f32, 1>, Image<f32, 1>), HoughError> {
        for (radius, votes) in self.radius.iter_mut().zip(self.votes.iter()) {
            if *votes > 0.0 {
                *radius = radius.clamp(geometry.minimum_radius, geometry.maximum_radius);
            }
        }

        let accumulator = Image::new(self.size, self.votes)?
            .with_spacing(like.spacing())?
            .with_origin(like.origin());
        let radius = Image::new(self.size, self.radius)?
            .with_spacing(like.spacing())?
            .with_origin(like.origin());

        Ok((accumulator, radius))
    }
}

/// Cast the votes of a single candidate pixel into `grid`.
fn vote_candidate(
    grid: &mut VoteGrid,
    field: &GradientField,
    geometry: &VoteGeometry,
    [x, y]: [usize; 2],
) {
    let Some([ux, uy]) = field.direction(x, y) else {
        return;
    };

    let cols = grid.size.width as f32;
    let rows = grid.size.height as f32;

    for sense in [1.0f32, -1.0] {
        for sample in &geometry.samples {
            let vx = ux * sample.cos - uy * sample.sin;
            let vy = ux * sample.sin + uy * sample.cos;

            let cx = (x as f32 + sense * sample.radius_x * vx).round();
            let cy = (y as f32 + sense * sample.radius_y * vy).round();

            if cx < 0.0 || cy < 0.0 || cx >= cols || cy >= rows {
                continue;
            }

            let idx = cy as usize * grid.size.width + cx as usize;
            grid.cast(idx, sample.radius);
        }
    }
}

/// Cast the votes of every candidate into a fresh grid.
///
/// With a parallel strategy the candidates are split into one contiguous chunk per worker, each
/// worker fills a private grid and the grids are merged at the end.
///
/// # Arguments
///
/// * `candidates` - The `[x, y]` pixels allowed to vote.
/// * `field` - The gradient of the input image.
/// * `geometry` - The sampled radii and angular offsets.
/// * `size` - The size of the grid, equal to the size of `field`.
/// * `strategy` - The execution strategy.
pub fn cast_votes<I>(
    candidates: I,
    field: &GradientField,
    geometry: &VoteGeometry,
    size: ImageSize,
    strategy: ExecutionStrategy,
) -> Result<VoteGrid, HoughError>
where
    I: IntoIterator<Item = [usize; 2]>,
{
    let start = Instant::now();

    let (grid, num_candidates) = if strategy.is_parallel() {
        let candidates = candidates.into_iter().collect::<Vec<_>>();
        let num_candidates = candidates.len();

        let grid = strategy.install(|_| {
            let chunk_size = candidates
                .len()
                .div_ceil(rayon::current_num_threads())
                .max(1);

            candidates
                .par_chunks(chunk_size)
                .map(|chunk| {
                    let mut grid = VoteGrid::new(size);
                    chunk
                        .iter()
                        .for_each(|&p| vote_candidate(&mut grid, field, geometry, p));
                    grid
                })
                .reduce_with(VoteGrid::merge)
                .unwrap_or_else(|| VoteGrid::new(size))
        })?;

        (grid, num_candidates)
    } else {
        let mut grid = VoteGrid::new(size);
        let mut num_candidates = 0;
        for p in candidates {
            vote_candidate(&mut grid, field, geometry, p);
            num_candidates += 1;
        }
        (grid, num_candidates)
    };

    log::debug!(
        "cast {} votes from {} candidates over {} radii in {:?}",
        grid.votes_cast(),
        num_candidates,
        geometry.num_radii(),
        start.elapsed()
    );

    Ok(grid)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use hough_image::ImageError;

    /// A field whose gradient at every pixel is the given constant.
    fn constant_field(size: ImageSize, g: [f32; 2]) -> Result<GradientField, ImageError> {
        Ok(GradientField {
            gx: Image::from_size_val(size, g[0])?,
            gy: Image::from_size_val(size, g[1])?,
        })
    }

    fn config(min: f64, max: f64) -> HoughCirclesConfig {
        HoughCirclesConfig {
            minimum_radius: min,
            maximum_radius: max,
            ..Default::default()
        }
    }

    #[test]
    fn test_geometry_radii() -> Result<(), HoughError> {
        let size = [20, 20].into();

        let geometry = VoteGeometry::new(&config(2.0, 5.0), [1.0, 1.0], size)?;
        assert_eq!(geometry.num_radii(), 4);
        assert_eq!(geometry.max_votes_per_candidate(), 8);

        // step is the finest spacing
        let geometry = VoteGeometry::new(&config(2.0, 5.0), [0.5, 2.0], size)?;
        assert_eq!(geometry.num_radii(), 7);

        let geometry = VoteGeometry::new(&config(3.0, 3.0), [1.0, 1.0], size)?;
        assert_eq!(geometry.num_radii(), 1);

        Ok(())
    }

    #[test]
    fn test_geometry_stops_at_the_diagonal() -> Result<(), HoughError> {
        // the diagonal of 16 x 16 unit pixels is 22.6
        let geometry = VoteGeometry::new(&config(0.0, 1e20), [1.0, 1.0], [16, 16].into())?;
        assert_eq!(geometry.num_radii(), 23);

        let geometry = VoteGeometry::new(&config(0.0, f64::MAX), [0.5, 2.0], [16, 16].into())?;
        // hypot(8, 32) / 0.5
        assert_eq!(geometry.num_radii(), 66);

        // no radius fits
        let geometry = VoteGeometry::new(&config(50.0, 60.0), [1.0, 1.0], [16, 16].into())?;
        assert_eq!(geometry.num_radii(), 0);
        assert_eq!(geometry.max_votes_per_candidate(), 0);

        Ok(())
    }

    #[test]
    fn test_geometry_too_many_radii() {
        let result = VoteGeometry::new(&config(0.0, 10.0), [1.0, 1e-300], [16, 16].into());
        assert!(matches!(
            result,
            Err(HoughError::InvalidParameter {
                name: "maximum_radius",
                ..
            })
        ));
    }

    #[test]
    fn test_geometry_sweep() -> Result<(), HoughError> {
        // at r = 10 one pixel of arc is 0.1 rad, so +-0.25 rad holds offsets -2..=2
        let geometry = VoteGeometry::new(
            &HoughCirclesConfig {
                sweep_angle: 0.5,
                ..config(10.0, 10.0)
            },
            [1.0, 1.0],
            [30, 30].into(),
        )?;
        assert_eq!(geometry.max_votes_per_candidate(), 10);

        // zero radius only votes once per sense whatever the sweep
        let geometry = VoteGeometry::new(
            &HoughCirclesConfig {
                sweep_angle: 1.0,
                ..config(0.0, 0.0)
            },
            [1.0, 1.0],
            [30, 30].into(),
        )?;
        assert_eq!(geometry.max_votes_per_candidate(), 2);

        // a sweep beyond a full turn is capped at one
        let geometry = VoteGeometry::new(
            &HoughCirclesConfig {
                sweep_angle: 1e30,
                ..config(1.0, 1.0)
            },
            [1.0, 1.0],
            [30, 30].into(),
        )?;
        assert_eq!(geometry.max_votes_per_candidate(), 14);

        Ok(())
    }

    #[test]
    fn test_vote_both_senses() -> Result<(), HoughError> {
        let size = ImageSize {
            width: 11,
            height: 11,
        };
        let field = constant_field(size, [2.0, 0.0])?;
        let geometry = VoteGeometry::new(&config(3.0, 3.0), [1.0, 1.0], size)?;

        let grid = cast_votes([[5, 5]], &field, &geometry, size, ExecutionStrategy::Serial)?;

        assert_eq!(grid.votes_cast(), 2);
        assert_eq!(grid.votes_at(8, 5), 1.0);
        assert_eq!(grid.votes_at(2, 5), 1.0);
        assert_eq!(grid.radius_at(8, 5), 3.0);
        assert_eq!(grid.votes_at(5, 5), 0.0);

        Ok(())
    }

    #[test]
    fn test_votes_outside_are_discarded() -> Result<(), HoughError> {
        let size = ImageSize {
            width: 6,
            height: 6,
        };
        let field = constant_field(size, [0.0, 1.0])?;
        let geometry = VoteGeometry::new(&config(4.0, 4.0), [1.0, 1.0], size)?;

        // (1, 1) + 4 along y lands inside, (1, 1) - 4 along y does not
        let grid = cast_votes([[1, 1]], &field, &geometry, size, ExecutionStrategy::Serial)?;
        assert_eq!(grid.votes_cast(), 1);
        assert_eq!(grid.votes_at(1, 5), 1.0);

        Ok(())
    }

    #[test]
    fn test_vote_respects_spacing() -> Result<(), HoughError> {
        let size = ImageSize {
            width: 12,
            height: 12,
        };
        let field = constant_field(size, [1.0, 0.0])?;
        let geometry = VoteGeometry::new(&config(4.0, 4.0), [2.0, 2.0], size)?;

        // 4 units along x are 2 pixels
        let grid = cast_votes([[5, 5]], &field, &geometry, size, ExecutionStrategy::Serial)?;
        assert_eq!(grid.votes_at(7, 5), 1.0);
        assert_eq!(grid.votes_at(3, 5), 1.0);

        Ok(())
    }

    #[test]
    fn test_vote_anisotropic_spacing() -> Result<(), HoughError> {
        let size = ImageSize {
            width: 11,
            height: 11,
        };
        let geometry = VoteGeometry::new(&config(2.0, 2.0), [1.0, 0.5], size)?;

        // 2 units are 2 pixels along x
        let along_x = constant_field(size, [1.0, 0.0])?;
        let grid = cast_votes([[5, 5]], &along_x, &geometry, size, ExecutionStrategy::Serial)?;
        assert_eq!(grid.votes_cast(), 2);
        assert_eq!(grid.votes_at(7, 5), 1.0);
        assert_eq!(grid.votes_at(3, 5), 1.0);
        assert_eq!(grid.radius_at(7, 5), 2.0);

        // and 4 pixels along y
        let along_y = constant_field(size, [0.0, 1.0])?;
        let grid = cast_votes([[5, 5]], &along_y, &geometry, size, ExecutionStrategy::Serial)?;
        assert_eq!(grid.votes_cast(), 2);
        assert_eq!(grid.votes_at(5, 9), 1.0);
        assert_eq!(grid.votes_at(5, 1), 1.0);
        assert_eq!(grid.radius_at(5, 1), 2.0);

        Ok(())
    }

    #[test]
    fn test_no_direction_no_votes() -> Result<(), HoughError> {
        let size = ImageSize {
            width: 5,
            height: 5,
        };
        let field = constant_field(size, [0.0, 0.0])?;
        let geometry = VoteGeometry::new(&config(1.0, 2.0), [1.0, 1.0], size)?;
        let grid = cast_votes([[2, 2], [1, 1]], &field, &geometry, size, ExecutionStrategy::Serial)?;
        assert_eq!(grid.votes_cast(), 0);
        Ok(())
    }

    #[test]
    fn test_radius_mean_and_merge() {
        let size = ImageSize {
            width: 2,
            height: 1,
        };
        let mut a = VoteGrid::new(size);
        a.cast(0, 2.0);
        a.cast(0, 4.0);

        let mut b = VoteGrid::new(size);
        b.cast(0, 6.0);
        b.cast(1, 5.0);

        let merged = a.merge(b);
        assert_eq!(merged.votes_cast(), 4);
        assert_eq!(merged.votes_at(0, 0), 3.0);
        assert_relative_eq!(merged.radius_at(0, 0), 4.0, epsilon = 1e-6);
        assert_eq!(merged.radius_at(1, 0), 5.0);
    }

    #[test]
    fn test_serial_and_parallel_agree() -> Result<(), HoughError> {
        let size = ImageSize {
            width: 40,
            height: 30,
        };
        let gx = Image::new(
            size,
            (0..size.area()).map(|i| ((i * 7) % 13) as f32 - 6.0).collect(),
        )?;
        let gy = Image::new(
            size,
            (0..size.area()).map(|i| ((i * 5) % 11) as f32 - 5.0).collect(),
        )?;
        let field = GradientField { gx, gy };
        let geometry = VoteGeometry::new(
            &HoughCirclesConfig {
                sweep_angle: 0.3,
                ..config(2.0, 6.0)
            },
            [1.0, 1.0],
            size,
        )?;
        let candidates = (0..size.area())
            .filter(|i| i % 3 == 0)
            .map(|i| [i % size.width, i / size.width])
            .collect::<Vec<_>>();

        let serial = cast_votes(
            candidates.iter().copied(),
            &field,
            &geometry,
            size,
            ExecutionStrategy::Serial,
        )?;
        let parallel = cast_votes(
            candidates.iter().copied(),
            &field,
            &geometry,
            size,
            ExecutionStrategy::Fixed(3),
        )?;

        assert_eq!(serial.votes_cast(), parallel.votes_cast());
        for y in 0..size.height {
            for x in 0..size.width {
                assert_eq!(serial.votes_at(x, y), parallel.votes_at(x, y));
                assert_relative_eq!(
                    serial.radius_at(x, y),
                    parallel.radius_at(x, y),
                    epsilon = 1e-4
                );
            }
        }

        Ok(())
    }

    #[test]
    fn test_into_images_keeps_geometry() -> Result<(), HoughError> {
        let like = Image::<u8, 1>::from_size_val([3, 2].into(), 0)?
            .with_spacing([0.5, 0.25])?
            .with_origin([1.0, 2.0]);
        let geometry = VoteGeometry::new(&config(1.0, 2.0), [0.25, 0.25], like.size())?;

        let mut grid = VoteGrid::new(like.size());
        grid.cast(4, 1.5);
        let (accumulator, radius) = grid.into_images(&like, &geometry)?;

        assert_eq!(accumulator.spacing(), [0.5, 0.25]);
        assert_eq!(radius.origin(), [1.0, 2.0]);
        assert_eq!(*accumulator.get_pixel(1, 1, 0)?, 1.0);
        assert_eq!(*radius.get_pixel(1, 1, 0)?, 1.5);
        assert_eq!(*radius.get_pixel(0, 0, 0)?, 0.0);

        Ok(())
    }
}
