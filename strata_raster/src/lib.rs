// Copyright 2025 the Strata Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Strata Raster: elevation colorization for composite raster layers.
//!
//! A composite raster source runs a [`PixelOperation`] for every pixel of
//! every rendered tile. The operation can not read scene state, so the scene
//! writes a [`RampPayload`] into the source's [`OperationData`] side channel
//! before each render, and [`colorize_operation`] reads it back.
//!
//! The transform is pure:
//! - Convert RGB to a grayscale intensity in `[0, 1]` (Rec. 601 luma).
//! - Remap the intensity linearly into the `[min, max]` window of the payload.
//! - Sample [`ColorRamp::ELEVATION`] at the remapped value.
//! - Output alpha is `0` outside the window or for transparent input,
//!   otherwise the payload opacity.
//!
//! ```rust
//! use strata_raster::{RampPayload, colorize};
//!
//! let payload = RampPayload::new(0.0, 1.0, 1.0);
//! assert_eq!(colorize([0, 0, 0, 255], &payload), [0, 0, 255, 255]);
//! assert_eq!(colorize([255, 255, 255, 255], &payload), [255, 0, 0, 255]);
//! ```
//!
//! [`PixelOperation`]: strata_engine::PixelOperation

mod ramp;

pub use ramp::ColorRamp;

use strata_engine::OperationData;

/// Side-channel payload of the elevation colorizer.
///
/// `min` and `max` bound the intensity window as fractions of full scale, so
/// a percentile window of 20%..80% is `min = 0.2, max = 0.8`.
#[derive(Copy, Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RampPayload {
    /// Lower bound of the intensity window, in `[0, 1]`.
    pub min: f64,
    /// Upper bound of the intensity window, in `[0, 1]`.
    pub max: f64,
    /// Opacity of pixels inside the window, in `[0, 1]`.
    pub opacity: f64,
}

impl Default for RampPayload {
    fn default() -> Self {
        Self {
            min: 0.0,
            max: 1.0,
            opacity: 1.0,
        }
    }
}

impl RampPayload {
    /// Creates a payload.
    #[must_use]
    pub const fn new(min: f64, max: f64, opacity: f64) -> Self {
        Self { min, max, opacity }
    }

    /// Creates a payload from a percentile window; both ends are clamped to
    /// `[0, 100]`.
    #[must_use]
    pub fn from_percentiles(min_pct: f64, max_pct: f64, opacity: f64) -> Self {
        Self::new(
            min_pct.clamp(0.0, 100.0) / 100.0,
            max_pct.clamp(0.0, 100.0) / 100.0,
            opacity,
        )
    }

    /// Encodes the payload as engine operation data.
    #[must_use]
    pub fn to_operation_data(&self) -> OperationData {
        OperationData::from_slice(&[self.min, self.max, self.opacity])
    }

    /// Decodes a payload, falling back to [`RampPayload::default`] per missing slot.
    #[must_use]
    pub fn from_operation_data(data: &OperationData) -> Self {
        let d = Self::default();
        Self {
            min: data.get_or(0, d.min),
            max: data.get_or(1, d.max),
            opacity: data.get_or(2, d.opacity),
        }
    }
}

/// Grayscale intensity of an RGB pixel in `[0, 1]`.
#[must_use]
pub fn intensity(pixel: [u8; 4]) -> f64 {
    let [r, g, b, _] = pixel;
    let luma = 0.299 * f64::from(r) + 0.587 * f64::from(g) + 0.114 * f64::from(b);
    (luma / 255.0).clamp(0.0, 1.0)
}

/// Colorizes one pixel against `payload`.
///
/// A degenerate window (`max <= min`) maps every in-window pixel to the first
/// ramp stop.
#[must_use]
pub fn colorize(pixel: [u8; 4], payload: &RampPayload) -> [u8; 4] {
    if pixel[3] == 0 {
        return [0, 0, 0, 0];
    }
    let v = intensity(pixel);
    if v < payload.min || v > payload.max {
        return [0, 0, 0, 0];
    }
    let span = payload.max - payload.min;
    let t = if span > 0.0 {
        (v - payload.min) / span
    } else {
        0.0
    };
    let [r, g, b] = ColorRamp::ELEVATION.sample(t);
    [r, g, b, alpha(payload.opacity)]
}

/// [`PixelOperation`](strata_engine::PixelOperation) form of [`colorize`].
#[must_use]
pub fn colorize_operation(pixel: [u8; 4], data: &OperationData) -> [u8; 4] {
    colorize(pixel, &RampPayload::from_operation_data(data))
}

#[expect(
    clippy::cast_possible_truncation,
    reason = "opacity is clamped to [0, 1] before scaling"
)]
fn alpha(opacity: f64) -> u8 {
    if opacity.is_nan() {
        return 0;
    }
    (opacity.clamp(0.0, 1.0) * 255.0).round() as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn black_and_white_hit_the_ramp_ends() {
        let p = RampPayload::from_percentiles(0.0, 100.0, 1.0);
        assert_eq!(colorize([0, 0, 0, 255], &p), [0, 0, 255, 255]);
        assert_eq!(colorize([255, 255, 255, 255], &p), [255, 0, 0, 255]);
    }

    #[test]
    fn percentiles_outside_the_range_are_clamped() {
        let p = RampPayload::from_percentiles(-20.0, 140.0, 1.0);
        assert_eq!(p, RampPayload::new(0.0, 1.0, 1.0));
    }

    #[test]
    fn mid_gray_is_green_with_scaled_alpha() {
        let p = RampPayload::new(0.0, 1.0, 0.5);
        let [r, g, b, a] = colorize([128, 128, 128, 255], &p);
        assert!(r < 5, "mid gray drifted toward yellow: r = {r}");
        assert_eq!(g, 255);
        assert_eq!(b, 0);
        assert_eq!(a, 128);
    }

    #[test]
    fn outside_the_window_is_transparent() {
        let p = RampPayload::new(0.4, 0.6, 1.0);
        assert_eq!(colorize([0, 0, 0, 255], &p)[3], 0);
        assert_eq!(colorize([255, 255, 255, 255], &p)[3], 0);
        assert_eq!(colorize([128, 128, 128, 255], &p)[3], 255);
    }

    #[test]
    fn transparent_input_stays_transparent() {
        let p = RampPayload::default();
        assert_eq!(colorize([128, 128, 128, 0], &p), [0, 0, 0, 0]);
    }

    #[test]
    fn degenerate_window_uses_the_first_stop() {
        let p = RampPayload::new(0.0, 0.0, 1.0);
        assert_eq!(colorize([0, 0, 0, 255], &p), [0, 0, 255, 255]);
    }

    #[test]
    fn operation_data_carries_the_payload() {
        let p = RampPayload::new(0.1, 0.9, 0.75);
        let data = p.to_operation_data();
        assert_eq!(RampPayload::from_operation_data(&data), p);
        assert_eq!(
            colorize_operation([200, 30, 90, 255], &data),
            colorize([200, 30, 90, 255], &p)
        );
    }

    #[test]
    fn empty_operation_data_decodes_to_default() {
        let data = OperationData::default();
        assert_eq!(RampPayload::from_operation_data(&data), RampPayload::default());
    }
}
