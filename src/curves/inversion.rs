use super::{Curve, CurveError};
use std::fmt;

/// Maps a volume percentage back to the pressure that produces it.
pub trait Inverse: fmt::Debug + Send + Sync {
    fn curve(&self) -> Curve;

    fn pressure_at(&self, volume_percent: f64) -> Result<f64, CurveError>;
}

/// Inverse given by an explicit formula. Volumes outside the image of the
/// curve's pressure domain are rejected instead of extrapolated.
pub struct ClosedForm {
    curve: Curve,
    inverse: fn(f64) -> f64,
    volume_range: (f64, f64),
}

impl ClosedForm {
    pub fn new(curve: Curve, inverse: fn(f64) -> f64) -> Self {
        let (lo, hi) = curve.domain();
        ClosedForm {
            curve,
            inverse,
            volume_range: (curve.volume_percent(lo), curve.volume_percent(hi)),
        }
    }
}

impl fmt::Debug for ClosedForm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClosedForm")
            .field("curve", &self.curve)
            .field("volume_range", &self.volume_range)
            .finish()
    }
}

impl Inverse for ClosedForm {
    fn curve(&self) -> Curve {
        self.curve
    }

    fn pressure_at(&self, volume_percent: f64) -> Result<f64, CurveError> {
        let (lo, hi) = self.volume_range;
        if !(lo..=hi).contains(&volume_percent) {
            return Err(CurveError::OutOfDomain { curve: self.curve, volume_percent });
        }
        Ok((self.inverse)(volume_percent))
    }
}

/// Numeric inverse for curves without a closed form.
///
/// The forward curve is sampled once over its pressure domain. A lookup
/// first locates the grid cell whose volumes bracket the target, then
/// bisects inside that cell down to floating point resolution.
#[derive(Debug, Clone)]
pub struct TabulatedInverse {
    curve: Curve,
    pressures: Vec<f64>,
    volumes: Vec<f64>,
}

const MAX_BISECTIONS: usize = 200;

impl TabulatedInverse {
    /// Fails if the curve is not strictly increasing on the grid, since the
    /// bracket search relies on it.
    pub fn build(curve: Curve, step: f64) -> Result<Self, CurveError> {
        let (lo, hi) = curve.domain();
        let cells = ((hi - lo) / step).ceil().max(1.0) as usize;

        let mut pressures = Vec::with_capacity(cells + 1);
        let mut volumes = Vec::with_capacity(cells + 1);
        for i in 0..=cells {
            let p = if i == cells { hi } else { lo + i as f64 * step };
            let v = curve.volume_percent(p);
            if let Some(&previous) = volumes.last() {
                if v <= previous {
                    return Err(CurveError::NotMonotone { curve, pressure: p });
                }
            }
            pressures.push(p);
            volumes.push(v);
        }

        Ok(TabulatedInverse { curve, pressures, volumes })
    }

    fn bisect(&self, cell: usize, target: f64) -> f64 {
        let mut lo = self.pressures[cell];
        let mut hi = self.pressures[cell + 1];

        for _ in 0..MAX_BISECTIONS {
            let mid = 0.5 * (lo + hi);
            if mid <= lo || mid >= hi {
                break;
            }
            let v = self.curve.volume_percent(mid);
            if v == target {
                return mid;
            }
            if v < target {
                lo = mid;
            } else {
                hi = mid;
            }
        }

        0.5 * (lo + hi)
    }
}

impl Inverse for TabulatedInverse {
    fn curve(&self) -> Curve {
        self.curve
    }

    fn pressure_at(&self, volume_percent: f64) -> Result<f64, CurveError> {
        let first = self.volumes[0];
        let last = self.volumes[self.volumes.len() - 1];
        if !(first..=last).contains(&volume_percent) {
            return Err(CurveError::OutOfDomain { curve: self.curve, volume_percent });
        }

        // first index whose volume exceeds the target
        let upper = self.volumes.partition_point(|&v| v <= volume_percent);
        let cell = upper.saturating_sub(1).min(self.volumes.len() - 2);
        if self.volumes[cell] == volume_percent {
            return Ok(self.pressures[cell]);
        }

        Ok(self.bisect(cell, volume_percent))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_grid_spans_domain() {
        let inverse = TabulatedInverse::build(Curve::Total, 1.0).unwrap();
        assert_eq!(inverse.pressures.first(), Some(&-50.0));
        assert_eq!(inverse.pressures.last(), Some(&100.0));
        assert_eq!(inverse.pressures.len(), 151);
    }

    #[test]
    fn test_hits_grid_points_exactly() {
        let inverse = TabulatedInverse::build(Curve::Total, 1.0).unwrap();
        let v = Curve::Total.volume_percent(5.0);
        let p = inverse.pressure_at(v).unwrap();
        assert!((p - 5.0).abs() < 1e-9);
    }

    #[test]
    fn test_domain_edges_are_invertible() {
        let inverse = TabulatedInverse::build(Curve::ChestWall, 1.0).unwrap();
        let (lo, hi) = Curve::ChestWall.domain();
        let at_lo = inverse.pressure_at(Curve::ChestWall.volume_percent(lo)).unwrap();
        let at_hi = inverse.pressure_at(Curve::ChestWall.volume_percent(hi)).unwrap();
        assert!((at_lo - lo).abs() < 1e-9);
        assert!((at_hi - hi).abs() < 1e-9);
    }

    #[test]
    fn test_closed_form_rejects_volumes_outside_image() {
        let inverse = ClosedForm::new(Curve::ChestWall, |v| (v / 51.3).ln() / 0.0635);
        assert!(inverse.pressure_at(0.0).is_err());
        assert!(inverse.pressure_at(51.3).unwrap().abs() < 1e-12);
    }
}
