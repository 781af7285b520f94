use edca_lab_abstract::SweepBounds;
use serde::{Deserialize, Serialize};

use crate::error::{HarnessError, Result};

/// Relative slack allowed when checking that `step` divides the exponent span.
const STEP_TOLERANCE: f64 = 1e-9;

/// One offered-load value; `index` is its position on the sweep axis.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SweepPoint {
    pub index: usize,
    pub exponent: f64,
    /// Per-station arrival intensity, `10^exponent`.
    pub intensity: f64,
}

/// Ordered, strictly increasing offered-load axis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sweep {
    bounds: SweepBounds,
    points: Vec<SweepPoint>,
}

impl Sweep {
    /// Build `10^e` for `e = min, min + step, ..., max`.
    ///
    /// Each exponent is computed as `min + i * step` rather than by repeated
    /// addition, and the final exponent is pinned to `max`, so the upper bound is
    /// always present. A step that does not divide `max - min` is rejected.
    pub fn generate(bounds: SweepBounds) -> Result<Self> {
        let SweepBounds {
            min_exponent: min,
            max_exponent: max,
            step,
        } = bounds;

        if !min.is_finite() || !max.is_finite() || !step.is_finite() {
            return Err(HarnessError::InvalidSweep(format!(
                "bounds must be finite (min={min}, max={max}, step={step})"
            )));
        }
        if min > max {
            return Err(HarnessError::InvalidSweep(format!(
                "min exponent {min} is greater than max exponent {max}"
            )));
        }
        if step <= 0.0 {
            return Err(HarnessError::InvalidSweep(format!(
                "step must be positive, got {step}"
            )));
        }

        let ratio = (max - min) / step;
        let intervals = ratio.round();
        if (ratio - intervals).abs() > STEP_TOLERANCE * ratio.max(1.0) {
            return Err(HarnessError::InvalidSweep(format!(
                "step {step} does not divide the range [{min}, {max}] evenly"
            )));
        }

        let intervals = intervals as usize;
        let points = (0..=intervals)
            .map(|index| {
                let exponent = if index == intervals {
                    max
                } else {
                    min + index as f64 * step
                };
                SweepPoint {
                    index,
                    exponent,
                    intensity: 10f64.powf(exponent),
                }
            })
            .collect();

        Ok(Self { bounds, points })
    }

    pub fn bounds(&self) -> SweepBounds {
        self.bounds
    }

    pub fn points(&self) -> &[SweepPoint] {
        &self.points
    }

    pub fn iter(&self) -> impl Iterator<Item = &SweepPoint> {
        self.points.iter()
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// The x axis of every chart built from this sweep.
    pub fn intensities(&self) -> Vec<f64> {
        self.points.iter().map(|p| p.intensity).collect()
    }
}
