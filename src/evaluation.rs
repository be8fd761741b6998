//! Error statistics over streamed views and finished maps.

use glam::DVec3;
use image::RgbaImage;

use crate::errors::{Result, SheenError};
use crate::stream::{PixelBuffer, RenderTarget, ViewStream};

/// Running sum of weighted squared error.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct WeightedError {
    pub squared_error: f64,
    pub weight: f64,
}

impl WeightedError {
    pub fn add_sample(&mut self, squared_error: f64, weight: f64) {
        self.squared_error += squared_error;
        self.weight += weight;
    }

    pub fn merge(&mut self, other: WeightedError) {
        self.squared_error += other.squared_error;
        self.weight += other.weight;
    }

    /// Adds an error attachment: red holds the squared error of a texel and
    /// alpha its weight. Texels with zero weight are skipped.
    pub fn accumulate(&mut self, errors: &PixelBuffer) {
        for [error, _, _, weight] in errors.texels_f32() {
            if weight > 0.0 {
                self.add_sample(f64::from(error), f64::from(weight));
            }
        }
    }

    /// `None` until some weight has been accumulated.
    #[must_use]
    pub fn rmse(&self) -> Option<f64> {
        (self.weight > 0.0).then(|| (self.squared_error / self.weight).sqrt())
    }
}

/// RMSE over every view of a stream whose first attachment is an error
/// attachment (see [`WeightedError::accumulate`]).
pub fn stream_rmse<T: RenderTarget>(stream: &ViewStream<'_, T>) -> Result<Option<f64>> {
    let total = stream.collect_with(
        WeightedError::default,
        |total, frame| total.accumulate(frame.single()),
        WeightedError::merge,
    )?;
    Ok(total.rmse())
}

/// RMSE between a tangent-space ground-truth normal map and an estimate.
///
/// The ground truth stores only x and y; z is reconstructed. Only texels
/// where the ground truth has nonzero alpha count. Returns 0 when no texel
/// counts.
pub fn normal_map_rmse(ground_truth: &RgbaImage, estimate: &RgbaImage) -> Result<f64> {
    if ground_truth.dimensions() != estimate.dimensions() {
        return Err(SheenError::InvalidDimensions {
            width: estimate.width(),
            height: estimate.height(),
            attachments: 1,
        });
    }

    let unpack = |channel: u8| f64::from(channel) / 255.0 * 2.0 - 1.0;

    let (sum, count) = ground_truth
        .pixels()
        .zip(estimate.pixels())
        .filter(|(truth, _)| truth[3] > 0)
        .fold((0.0, 0usize), |(sum, count), (truth, est)| {
            let (x, y) = (unpack(truth[0]), unpack(truth[1]));
            let truth_dir = DVec3::new(x, y, (1.0 - x * x - y * y).max(0.0).sqrt());
            let est_dir = DVec3::new(unpack(est[0]), unpack(est[1]), unpack(est[2])).normalize_or_zero();
            (sum + truth_dir.distance_squared(est_dir), count + 1)
        });

    if count == 0 {
        return Ok(0.0);
    }
    Ok((sum / count as f64).sqrt())
}
