/// A circle hypothesis extracted from the vote accumulator.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Circle {
    /// Index of the center cell, `[x, y]`.
    pub center: [usize; 2],
    /// Physical position of the center, `origin + center * spacing`.
    pub center_point: [f64; 2],
    /// Radius in the length units of the configuration.
    pub radius: f64,
    /// Smoothed accumulator value at the center when the circle was extracted.
    pub votes: f32,
}
