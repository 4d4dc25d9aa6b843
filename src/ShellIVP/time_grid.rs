//! Output times of a shell integration.
use crate::errors::{CapacityError, SolveError, ValidationError};
use serde::{Deserialize, Serialize};

/// Julian year, s; input and result files give times in years
pub const SECONDS_PER_YEAR: f64 = 3.155_76e7;

/// strictly increasing sequence of output times, s
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeGrid {
    times: Vec<f64>,
}

impl TimeGrid {
    /// `n` times spaced evenly in log10 between `ti` and `tf`; both ends are exact
    pub fn logarithmic(ti: f64, tf: f64, n: usize, max_steps: usize) -> Result<Self, SolveError> {
        if n == 0 {
            return Err(ValidationError::EmptyTimeGrid.into());
        }
        if n > max_steps {
            return Err(CapacityError {
                what: "time steps",
                requested: n,
                limit: max_steps,
            }
            .into());
        }
        if !ti.is_finite() || ti <= 0.0 {
            return Err(ValidationError::NonPositiveInitialTime(ti).into());
        }
        if !tf.is_finite() || tf <= ti {
            return Err(ValidationError::FinalTimeNotAfterInitial { ti, tf }.into());
        }
        if n == 1 {
            return Ok(Self { times: vec![ti] });
        }
        let (log_ti, log_tf) = (ti.log10(), tf.log10());
        let step = (log_tf - log_ti) / (n - 1) as f64;
        let mut times: Vec<f64> = (0..n)
            .map(|i| 10f64.powf(log_ti + i as f64 * step))
            .collect();
        times[0] = ti;
        times[n - 1] = tf;
        Self::from_times(times)
    }

    pub fn from_times(times: Vec<f64>) -> Result<Self, SolveError> {
        if times.is_empty() {
            return Err(ValidationError::EmptyTimeGrid.into());
        }
        if !times[0].is_finite() || times[0] <= 0.0 {
            return Err(ValidationError::NonPositiveInitialTime(times[0]).into());
        }
        if let Some(index) = times
            .windows(2)
            .position(|w| !(w[1] > w[0]) || !w[1].is_finite())
        {
            return Err(ValidationError::NonIncreasingTimeGrid { index: index + 1 }.into());
        }
        Ok(Self { times })
    }

    pub fn times(&self) -> &[f64] {
        &self.times
    }

    pub fn len(&self) -> usize {
        self.times.len()
    }

    pub fn is_empty(&self) -> bool {
        self.times.is_empty()
    }

    pub fn first(&self) -> f64 {
        self.times[0]
    }

    pub fn last(&self) -> f64 {
        self.times[self.times.len() - 1]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_logarithmic_grid() {
        let grid = TimeGrid::logarithmic(1e-6, 1e7, 14, 1024).unwrap();
        assert_eq!(grid.len(), 14);
        assert_eq!(grid.first(), 1e-6);
        assert_eq!(grid.last(), 1e7);
        for (i, t) in grid.times().iter().enumerate() {
            assert_relative_eq!(*t, 10f64.powi(i as i32 - 6), max_relative = 1e-10);
        }
        assert!(grid.times().windows(2).all(|w| w[1] > w[0]));
    }

    #[test]
    fn test_single_point_grid() {
        let grid = TimeGrid::logarithmic(1.0, 1e3, 1, 1024).unwrap();
        assert_eq!(grid.times(), &[1.0]);
        assert_eq!(grid.last(), 1.0);
    }

    #[test]
    fn test_single_point_grid_still_checks_final_time() {
        for tf in [1.0, 0.5, f64::NAN] {
            assert!(matches!(
                TimeGrid::logarithmic(1.0, tf, 1, 1024),
                Err(SolveError::Validation(
                    ValidationError::FinalTimeNotAfterInitial { .. }
                ))
            ));
        }
    }

    #[test]
    fn test_invalid_grids() {
        assert!(matches!(
            TimeGrid::logarithmic(1.0, 10.0, 0, 1024),
            Err(SolveError::Validation(ValidationError::EmptyTimeGrid))
        ));
        assert!(matches!(
            TimeGrid::logarithmic(0.0, 10.0, 4, 1024),
            Err(SolveError::Validation(ValidationError::NonPositiveInitialTime(_)))
        ));
        assert!(matches!(
            TimeGrid::logarithmic(10.0, 10.0, 4, 1024),
            Err(SolveError::Validation(
                ValidationError::FinalTimeNotAfterInitial { .. }
            ))
        ));
        assert!(matches!(
            TimeGrid::logarithmic(1.0, 10.0, 2000, 1024),
            Err(SolveError::Capacity(CapacityError { requested: 2000, .. }))
        ));
        assert!(matches!(
            TimeGrid::from_times(vec![1.0, 2.0, 2.0]),
            Err(SolveError::Validation(ValidationError::NonIncreasingTimeGrid {
                index: 2
            }))
        ));
    }
}
