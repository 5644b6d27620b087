// Copyright 2025 the Strata Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Piecewise-linear color ramps.

/// A five-stop color ramp sampled over `[0, 1]`.
///
/// Stops are evenly spaced: stop `i` sits at `i / 4`. Colors between stops
/// are interpolated linearly per channel.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ColorRamp {
    /// RGB colors of the stops, from low to high.
    pub stops: [[u8; 3]; 5],
}

impl ColorRamp {
    /// Blue, cyan, green, yellow, red.
    pub const ELEVATION: Self = Self {
        stops: [
            [0, 0, 255],
            [0, 255, 255],
            [0, 255, 0],
            [255, 255, 0],
            [255, 0, 0],
        ],
    };

    /// Samples the ramp at `t`, clamped to `[0, 1]`.
    #[must_use]
    #[expect(
        clippy::cast_possible_truncation,
        reason = "t is clamped to [0, 1], so the segment index is at most 4"
    )]
    pub fn sample(&self, t: f64) -> [u8; 3] {
        let t = if t.is_nan() { 0.0 } else { t.clamp(0.0, 1.0) };
        let segments = (self.stops.len() - 1) as f64;
        let scaled = t * segments;
        let lower = (scaled.floor() as usize).min(self.stops.len() - 2);
        let frac = scaled - lower as f64;
        let a = self.stops[lower];
        let b = self.stops[lower + 1];
        [
            lerp_channel(a[0], b[0], frac),
            lerp_channel(a[1], b[1], frac),
            lerp_channel(a[2], b[2], frac),
        ]
    }
}

impl Default for ColorRamp {
    fn default() -> Self {
        Self::ELEVATION
    }
}

#[expect(
    clippy::cast_possible_truncation,
    reason = "interpolating between two u8 values stays within u8 range"
)]
fn lerp_channel(a: u8, b: u8, t: f64) -> u8 {
    let v = f64::from(a) + (f64::from(b) - f64::from(a)) * t;
    v.round().clamp(0.0, 255.0) as u8
}
