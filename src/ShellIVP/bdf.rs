//! # Variable-order BDF integrator for stiff systems
//!
//! Implicit multistep method of orders 1 to 5 in the NDF form (numerical differentiation
//! formulas with the Klopfenstein-Shampine κ coefficients), with the history kept as a
//! table of modified divided differences `D`. Each step:
//!
//! 1. predicts `y = Σ_{j ≤ k} D_j`;
//! 2. solves the corrector equation by simplified Newton iterations with an LU factorization
//!    of `I − c J`, `c = h / α_k`; the Jacobian is refreshed once when Newton fails to
//!    converge and the step is halved when it fails with a fresh Jacobian;
//! 3. estimates the local error from the last correction and accepts the step when its RMS
//!    norm weighted by `abs_err + rel_err·|y|` is at most 1;
//! 4. after `k + 1` steps of equal size chooses the order among k−1, k, k+1 and the next step
//!    size from the error estimates of the three orders.
//!
//! Output times are reached exactly: the step that would cross the requested time is
//! shortened to land on it, so no interpolation is involved.
//!
//! Error weights, the RMS norm, the Newton tolerance and the first step come from
//! `RustedSciThe::numerical::BDF::common`; the system enters as the same boxed closures the
//! `RustedSciThe` BDF solver takes. The step driver itself stays here: it lands on output times,
//! refreshes the Jacobian on Newton failure and reports failures as [`IntegrationError`].
use crate::errors::{IntegrationError, ValidationError};
use RustedSciThe::numerical::BDF::common::{
    NumberOrVec, newton_tol, norm, scale_func, select_initial_step,
};
use log::debug;
use nalgebra::{DMatrix, DVector, Dyn, LU};
use serde::{Deserialize, Serialize};

pub const MAX_ORDER: usize = 5;
const NEWTON_MAXITER: usize = 4;
const MIN_FACTOR: f64 = 0.2;
const MAX_FACTOR: f64 = 10.0;
const KAPPA: [f64; MAX_ORDER + 1] = [0.0, -0.1850, -1.0 / 9.0, -0.0823, -0.0415, 0.0];

/// right-hand side closure in the form the `RustedSciThe` solvers take
pub type RhsFn = Box<dyn Fn(f64, &DVector<f64>) -> DVector<f64>>;
/// Jacobian closure `∂f/∂y (t, y)`
pub type JacobianFn = Box<dyn Fn(f64, &DVector<f64>) -> DMatrix<f64>>;

/// a stiff system `dy/dt = f(t, y)` handed to the integrator as owned closures
pub trait StiffSystem {
    fn ndim(&self) -> usize;

    fn rhs_fn(&self) -> RhsFn;

    /// analytic Jacobian; `None` makes the integrator use central differences
    fn jacobian_fn(&self) -> Option<JacobianFn> {
        None
    }
}

/// central-difference approximation of `∂f/∂y`
pub fn finite_difference_jacobian(
    fun: &dyn Fn(f64, &DVector<f64>) -> DVector<f64>,
    t: f64,
    y: &DVector<f64>,
) -> DMatrix<f64> {
    let n = y.len();
    let mut jac = DMatrix::zeros(n, n);
    let mut shifted = y.clone();
    for j in 0..n {
        let orig = y[j];
        let h = 1e-8 * (1.0 + orig.abs());
        shifted[j] = orig + h;
        let f_plus = fun(t, &shifted);
        shifted[j] = orig - h;
        let f_minus = fun(t, &shifted);
        shifted[j] = orig;
        jac.set_column(j, &((f_plus - f_minus) / (2.0 * h)));
    }
    jac
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntegratorOptions {
    pub abs_err: f64,
    pub rel_err: f64,
    /// steps allowed for one call of [`BdfIntegrator::advance_to`]
    pub max_steps: usize,
    pub max_step: Option<f64>,
    pub first_step: Option<f64>,
}

impl Default for IntegratorOptions {
    fn default() -> Self {
        Self {
            abs_err: 1e-15,
            rel_err: 1e-6,
            max_steps: 100_000,
            max_step: None,
            first_step: None,
        }
    }
}

impl IntegratorOptions {
    pub fn validate(&self) -> Result<(), ValidationError> {
        for (name, value) in [("abs_err", self.abs_err), ("rel_err", self.rel_err)] {
            if !value.is_finite() || value <= 0.0 {
                return Err(ValidationError::NonPositiveTolerance { name, value });
            }
        }
        for (name, value) in [("max_step", self.max_step), ("first_step", self.first_step)] {
            if let Some(value) = value {
                if !(value > 0.0) {
                    return Err(ValidationError::NonPositiveTolerance { name, value });
                }
            }
        }
        Ok(())
    }
}

/// work counters of one integration
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct IntegratorStats {
    pub accepted_steps: usize,
    pub rejected_steps: usize,
    pub rhs_evaluations: usize,
    pub jacobian_evaluations: usize,
    pub lu_decompositions: usize,
}

/// RMS norm of `v` weighted by `scale`
fn weighted_norm(v: &DVector<f64>, scale: &DVector<f64>) -> f64 {
    norm(&v.component_div(scale))
}

/// distance from `t` to the next representable number above it
fn spacing(t: f64) -> f64 {
    let a = t.abs();
    if a == 0.0 {
        return f64::from_bits(1);
    }
    f64::from_bits(a.to_bits() + 1) - a
}

fn compute_r(order: usize, factor: f64) -> DMatrix<f64> {
    let mut m = DMatrix::zeros(order + 1, order + 1);
    for j in 0..=order {
        m[(0, j)] = 1.0;
    }
    for i in 1..=order {
        for j in 1..=order {
            m[(i, j)] = (i as f64 - 1.0 - factor * j as f64) / i as f64;
        }
    }
    // cumulative product down the columns
    for i in 1..=order {
        for j in 0..=order {
            m[(i, j)] *= m[(i - 1, j)];
        }
    }
    m
}

/// rescales the difference table for a step-size change by `factor`
fn change_d(d: &mut [DVector<f64>], order: usize, factor: f64) {
    let r = compute_r(order, factor);
    let u = compute_r(order, 1.0);
    let ru = r * u;
    let old: Vec<DVector<f64>> = d[..=order].to_vec();
    for (i, row) in d.iter_mut().take(order + 1).enumerate() {
        row.fill(0.0);
        for (j, old_row) in old.iter().enumerate() {
            row.axpy(ru[(j, i)], old_row, 1.0);
        }
    }
}

struct NewtonOutcome {
    converged: bool,
    iterations: usize,
    y: DVector<f64>,
    d: DVector<f64>,
    singular: bool,
}

pub struct BdfIntegrator {
    fun: RhsFn,
    jac_fn: JacobianFn,
    options: IntegratorOptions,
    rtol: NumberOrVec,
    atol: NumberOrVec,
    t: f64,
    y: DVector<f64>,
    h_abs: f64,
    order: usize,
    n_equal_steps: usize,
    newton_tol: f64,
    /// modified divided differences, MAX_ORDER + 3 rows
    d: Vec<DVector<f64>>,
    jac: DMatrix<f64>,
    lu: Option<LU<f64, Dyn, Dyn>>,
    gamma: [f64; MAX_ORDER + 2],
    alpha: [f64; MAX_ORDER + 2],
    error_const: [f64; MAX_ORDER + 2],
    stats: IntegratorStats,
}

impl BdfIntegrator {
    /// prepares the integration of `system` from (`t0`, `y0`); `t_end` only bounds the first step
    pub fn new<S: StiffSystem>(
        system: &S,
        t0: f64,
        y0: DVector<f64>,
        t_end: f64,
        options: IntegratorOptions,
    ) -> Result<Self, IntegrationError> {
        let n = y0.len();
        let fun = system.rhs_fn();
        let jac_fn = system.jacobian_fn().unwrap_or_else(|| {
            let rhs = system.rhs_fn();
            Box::new(move |t: f64, y: &DVector<f64>| finite_difference_jacobian(&rhs, t, y))
        });
        let rtol = NumberOrVec::Number(options.rel_err);
        let atol = NumberOrVec::Number(options.abs_err);
        let mut stats = IntegratorStats::default();
        let f0 = fun(t0, &y0);
        stats.rhs_evaluations += 1;
        if y0.iter().chain(f0.iter()).any(|v| !v.is_finite()) {
            return Err(IntegrationError::NonFinite { t: t0 });
        }

        let mut gamma = [0.0; MAX_ORDER + 2];
        let mut alpha = [0.0; MAX_ORDER + 2];
        let mut error_const = [0.0; MAX_ORDER + 2];
        for k in 1..=MAX_ORDER {
            gamma[k] = gamma[k - 1] + 1.0 / k as f64;
        }
        for k in 0..=MAX_ORDER {
            alpha[k] = (1.0 - KAPPA[k]) * gamma[k];
            error_const[k] = KAPPA[k] * gamma[k] + 1.0 / (k + 1) as f64;
        }

        let max_step = options.max_step.unwrap_or(f64::INFINITY);
        let span = (t_end - t0).abs();
        let h_abs = match options.first_step {
            Some(h) if span > 0.0 => h.min(span),
            Some(h) => h,
            None if n == 0 || span == 0.0 => span,
            None => {
                // one trial evaluation of the right-hand side
                stats.rhs_evaluations += 1;
                select_initial_step(
                    &fun,
                    t0,
                    &y0,
                    t_end,
                    max_step,
                    &f0,
                    1.0,
                    1.0,
                    rtol.clone(),
                    atol.clone(),
                )
            }
        };

        let mut d = vec![DVector::zeros(n); MAX_ORDER + 3];
        d[0] = y0.clone();
        d[1] = &f0 * h_abs;

        let jac = jac_fn(t0, &y0);
        stats.jacobian_evaluations += 1;

        let newton_tol = newton_tol(rtol.clone());
        debug!(
            "BDF start: n = {}, h0 = {:e}, newton tol = {:e}",
            n, h_abs, newton_tol
        );
        Ok(Self {
            fun,
            jac_fn,
            options,
            rtol,
            atol,
            t: t0,
            y: y0,
            h_abs,
            order: 1,
            n_equal_steps: 0,
            newton_tol,
            d,
            jac,
            lu: None,
            gamma,
            alpha,
            error_const,
            stats,
        })
    }

    pub fn t(&self) -> f64 {
        self.t
    }

    pub fn y(&self) -> &DVector<f64> {
        &self.y
    }

    pub fn order(&self) -> usize {
        self.order
    }

    pub fn stats(&self) -> IntegratorStats {
        self.stats
    }

    /// integrates until exactly `t_out` and returns the state there
    pub fn advance_to(&mut self, t_out: f64) -> Result<&DVector<f64>, IntegrationError> {
        if t_out <= self.t {
            return Ok(&self.y);
        }
        if self.y.is_empty() {
            self.t = t_out;
            return Ok(&self.y);
        }
        let mut steps = 0;
        while self.t < t_out {
            if steps >= self.options.max_steps {
                return Err(IntegrationError::TooManySteps { steps, t: self.t });
            }
            self.step(t_out)?;
            steps += 1;
        }
        Ok(&self.y)
    }

    fn rhs(&mut self, t: f64, y: &DVector<f64>) -> DVector<f64> {
        self.stats.rhs_evaluations += 1;
        (self.fun)(t, y)
    }

    /// error weights `atol + rtol·|y|`
    fn error_scale(&self, y: &DVector<f64>) -> DVector<f64> {
        DVector::from_vec(scale_func(self.rtol.clone(), self.atol.clone(), y))
    }

    fn factorize(&mut self, c: f64) -> LU<f64, Dyn, Dyn> {
        let n = self.y.len();
        let matrix = DMatrix::identity(n, n) - &self.jac * c;
        self.stats.lu_decompositions += 1;
        matrix.lu()
    }

    fn solve_bdf_system(
        &mut self,
        t_new: f64,
        y_predict: &DVector<f64>,
        c: f64,
        psi: &DVector<f64>,
        lu: &LU<f64, Dyn, Dyn>,
        scale: &DVector<f64>,
    ) -> NewtonOutcome {
        let mut d = DVector::zeros(y_predict.len());
        let mut y = y_predict.clone();
        let mut dy_norm_old: Option<f64> = None;
        let mut converged = false;
        let mut singular = false;
        let mut iterations = 0;
        for k in 0..NEWTON_MAXITER {
            iterations = k + 1;
            let f = self.rhs(t_new, &y);
            if f.iter().any(|v| !v.is_finite()) {
                break;
            }
            let rhs = &f * c - psi - &d;
            let Some(dy) = lu.solve(&rhs) else {
                singular = true;
                break;
            };
            let dy_norm = weighted_norm(&dy, scale);
            if !dy_norm.is_finite() {
                break;
            }
            let rate = dy_norm_old.map(|old| dy_norm / old);
            if let Some(rate) = rate {
                if rate >= 1.0
                    || rate.powi((NEWTON_MAXITER - k) as i32) / (1.0 - rate) * dy_norm
                        > self.newton_tol
                {
                    break;
                }
            }
            y += &dy;
            d += &dy;
            if dy_norm == 0.0
                || rate.is_some_and(|rate| rate / (1.0 - rate) * dy_norm < self.newton_tol)
            {
                converged = true;
                break;
            }
            dy_norm_old = Some(dy_norm);
        }
        NewtonOutcome {
            converged,
            iterations,
            y,
            d,
            singular,
        }
    }

    /// one accepted step, never beyond `t_bound`
    fn step(&mut self, t_bound: f64) -> Result<(), IntegrationError> {
        let t = self.t;
        let max_step = self.options.max_step.unwrap_or(f64::INFINITY);
        let min_step = 10.0 * spacing(t);
        let mut h_abs = self.h_abs;
        if h_abs > max_step {
            change_d(&mut self.d, self.order, max_step / h_abs);
            h_abs = max_step;
            self.n_equal_steps = 0;
            self.lu = None;
        } else if h_abs < min_step {
            change_d(&mut self.d, self.order, min_step / h_abs);
            h_abs = min_step;
            self.n_equal_steps = 0;
            self.lu = None;
        }

        let order = self.order;
        let mut current_jac = false;
        let mut last_failure_singular = false;
        let (t_new, y_new, d, n_iter, error_norm, scale) = loop {
            if h_abs < min_step {
                if last_failure_singular {
                    return Err(IntegrationError::SingularMatrix { t });
                }
                return Err(IntegrationError::StepSizeTooSmall { h: h_abs, t });
            }
            let mut t_new = t + h_abs;
            if t_new > t_bound {
                t_new = t_bound;
                change_d(&mut self.d, order, (t_new - t) / h_abs);
                self.n_equal_steps = 0;
                self.lu = None;
            }
            let h = t_new - t;
            h_abs = h;

            let mut y_predict = DVector::zeros(self.y.len());
            for row in &self.d[..=order] {
                y_predict += row;
            }
            if y_predict.iter().any(|v| !v.is_finite()) {
                return Err(IntegrationError::NonFinite { t });
            }
            let scale = self.error_scale(&y_predict);
            let mut psi = DVector::zeros(self.y.len());
            for j in 1..=order {
                psi.axpy(self.gamma[j], &self.d[j], 1.0);
            }
            psi /= self.alpha[order];

            let c = h / self.alpha[order];
            let outcome = loop {
                let lu = match self.lu.take() {
                    Some(lu) => lu,
                    None => self.factorize(c),
                };
                let outcome = self.solve_bdf_system(t_new, &y_predict, c, &psi, &lu, &scale);
                self.lu = Some(lu);
                if outcome.converged || current_jac {
                    break outcome;
                }
                self.jac = (self.jac_fn)(t_new, &y_predict);
                self.stats.jacobian_evaluations += 1;
                self.lu = None;
                current_jac = true;
            };

            if !outcome.converged {
                last_failure_singular = outcome.singular;
                h_abs *= 0.5;
                change_d(&mut self.d, order, 0.5);
                self.n_equal_steps = 0;
                self.lu = None;
                self.stats.rejected_steps += 1;
                continue;
            }
            last_failure_singular = false;

            let safety = 0.9 * (2 * NEWTON_MAXITER + 1) as f64
                / (2 * NEWTON_MAXITER + outcome.iterations) as f64;
            let scale = self.error_scale(&outcome.y);
            let error = &outcome.d * self.error_const[order];
            let error_norm = weighted_norm(&error, &scale);
            if error_norm > 1.0 {
                let factor =
                    MIN_FACTOR.max(safety * error_norm.powf(-1.0 / (order as f64 + 1.0)));
                h_abs *= factor;
                change_d(&mut self.d, order, factor);
                self.n_equal_steps = 0;
                self.lu = None;
                self.stats.rejected_steps += 1;
                continue;
            }
            break (t_new, outcome.y, outcome.d, outcome.iterations, error_norm, scale);
        };

        self.stats.accepted_steps += 1;
        self.n_equal_steps += 1;
        self.t = t_new;
        self.y = y_new;
        self.h_abs = h_abs;

        // D^{j+1} y_n = D^j y_n - D^j y_{n-1}, with d = D^{k+1} y_n
        self.d[order + 2] = &d - &self.d[order + 1];
        self.d[order + 1] = d;
        for i in (0..=order).rev() {
            let next = self.d[i + 1].clone();
            self.d[i] += next;
        }

        if self.n_equal_steps < order + 1 {
            return Ok(());
        }

        let error_m_norm = if order > 1 {
            weighted_norm(&(&self.d[order] * self.error_const[order - 1]), &scale)
        } else {
            f64::INFINITY
        };
        let error_p_norm = if order < MAX_ORDER {
            weighted_norm(&(&self.d[order + 2] * self.error_const[order + 1]), &scale)
        } else {
            f64::INFINITY
        };
        let norms = [error_m_norm, error_norm, error_p_norm];
        let mut best = 0;
        let mut factors = [0.0; 3];
        for (i, norm) in norms.iter().enumerate() {
            factors[i] = norm.powf(-1.0 / (order + i) as f64);
            if factors[i] > factors[best] {
                best = i;
            }
        }
        let new_order = order + best - 1;
        let safety = 0.9 * (2 * NEWTON_MAXITER + 1) as f64 / (2 * NEWTON_MAXITER + n_iter) as f64;
        let factor = MAX_FACTOR.min(safety * factors[best]);
        self.order = new_order;
        self.h_abs *= factor;
        change_d(&mut self.d, new_order, factor);
        self.n_equal_steps = 0;
        self.lu = None;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    struct Decay {
        k: f64,
    }
    impl StiffSystem for Decay {
        fn ndim(&self) -> usize {
            1
        }
        fn rhs_fn(&self) -> RhsFn {
            let k = self.k;
            Box::new(move |_t: f64, y: &DVector<f64>| -y * k)
        }
    }

    /// Robertson's chemical kinetics problem
    struct Robertson;
    impl StiffSystem for Robertson {
        fn ndim(&self) -> usize {
            3
        }
        fn rhs_fn(&self) -> RhsFn {
            Box::new(|_t: f64, y: &DVector<f64>| {
                let d0 = -0.04 * y[0] + 1e4 * y[1] * y[2];
                let d2 = 3e7 * y[1] * y[1];
                DVector::from_vec(vec![d0, -d0 - d2, d2])
            })
        }
        fn jacobian_fn(&self) -> Option<JacobianFn> {
            Some(Box::new(|_t: f64, y: &DVector<f64>| {
                DMatrix::from_row_slice(
                    3,
                    3,
                    &[
                        -0.04,
                        1e4 * y[2],
                        1e4 * y[1],
                        0.04,
                        -1e4 * y[2] - 6e7 * y[1],
                        -1e4 * y[1],
                        0.0,
                        6e7 * y[1],
                        0.0,
                    ],
                )
            }))
        }
    }

    #[test]
    fn test_compute_r_identity_for_unit_factor() {
        // R(1) U(1) = I since U = R(1) is an involution
        for order in 1..=MAX_ORDER {
            let u = compute_r(order, 1.0);
            let uu = &u * &u;
            for i in 0..=order {
                for j in 0..=order {
                    let expected = if i == j { 1.0 } else { 0.0 };
                    assert_relative_eq!(uu[(i, j)], expected, epsilon = 1e-12);
                }
            }
        }
    }

    #[test]
    fn test_exponential_decay() {
        let sys = Decay { k: 2.0 };
        let options = IntegratorOptions {
            abs_err: 1e-12,
            rel_err: 1e-8,
            ..Default::default()
        };
        let mut bdf = BdfIntegrator::new(&sys, 0.0, DVector::from_vec(vec![1.0]), 5.0, options).unwrap();
        for t in [0.1, 0.5, 1.0, 2.5, 5.0] {
            let y = bdf.advance_to(t).unwrap()[0];
            assert_eq!(bdf.t(), t);
            assert_relative_eq!(y, (-2.0 * t).exp(), max_relative = 1e-5);
        }
        let stats = bdf.stats();
        assert!(stats.accepted_steps > 0);
        assert!(stats.lu_decompositions > 0);
    }

    #[test]
    fn test_robertson_is_solved() {
        let options = IntegratorOptions {
            abs_err: 1e-10,
            rel_err: 1e-6,
            ..Default::default()
        };
        let y0 = DVector::from_vec(vec![1.0, 0.0, 0.0]);
        let mut bdf = BdfIntegrator::new(&Robertson, 0.0, y0, 4e5, options).unwrap();
        // reference solution of Hairer & Wanner
        let reference = [
            (0.4, 0.9851721, 0.01479),
            (40.0, 0.7158271, 0.2841729),
            (4000.0, 0.1832223, 0.8167768),
            (4e5, 0.004938, 0.9950620),
        ];
        for (t, y1, y3) in reference {
            bdf.advance_to(t).unwrap();
            let y = bdf.y();
            assert_relative_eq!(y.sum(), 1.0, epsilon = 1e-6);
            assert_relative_eq!(y[0], y1, max_relative = 1e-2);
            assert_relative_eq!(y[2], y3, max_relative = 2e-3);
        }
        assert!(bdf.stats().accepted_steps < 5000, "{:?}", bdf.stats());
    }

    #[test]
    fn test_finite_difference_jacobian_matches_analytic() {
        let y = DVector::from_vec(vec![0.9, 2e-5, 0.1]);
        let analytic = Robertson.jacobian_fn().unwrap()(0.0, &y);
        let numeric = finite_difference_jacobian(&Robertson.rhs_fn(), 0.0, &y);
        for i in 0..3 {
            for j in 0..3 {
                assert_relative_eq!(
                    numeric[(i, j)],
                    analytic[(i, j)],
                    epsilon = 1e-3,
                    max_relative = 1e-5
                );
            }
        }
    }

    #[test]
    fn test_first_step_respects_max_step() {
        let sys = Decay { k: 1e-3 };
        let options = IntegratorOptions {
            max_step: Some(0.25),
            ..Default::default()
        };
        let mut bdf = BdfIntegrator::new(&sys, 0.0, DVector::from_vec(vec![1.0]), 100.0, options).unwrap();
        bdf.advance_to(10.0).unwrap();
        // 10 s at no more than 0.25 s per step
        assert!(bdf.stats().accepted_steps >= 40, "{:?}", bdf.stats());
        assert_relative_eq!(bdf.y()[0], (-1e-2_f64).exp(), max_relative = 1e-5);
    }

    #[test]
    fn test_too_many_steps() {
        let sys = Decay { k: 1.0 };
        let options = IntegratorOptions {
            max_steps: 3,
            ..Default::default()
        };
        let mut bdf = BdfIntegrator::new(&sys, 0.0, DVector::from_vec(vec![1.0]), 1e3, options).unwrap();
        let err = bdf.advance_to(1e3).unwrap_err();
        assert!(matches!(err, IntegrationError::TooManySteps { steps: 3, .. }));
        assert!(err.time_reached() > 0.0);
    }

    #[test]
    fn test_non_finite_start() {
        let sys = Decay { k: f64::NAN };
        let err = BdfIntegrator::new(
            &sys,
            0.0,
            DVector::from_vec(vec![1.0]),
            1.0,
            IntegratorOptions::default(),
        )
        .err()
        .unwrap();
        assert_eq!(err, IntegrationError::NonFinite { t: 0.0 });
    }

    #[test]
    fn test_options_validation() {
        let options = IntegratorOptions {
            rel_err: 0.0,
            ..Default::default()
        };
        assert_eq!(
            options.validate(),
            Err(ValidationError::NonPositiveTolerance {
                name: "rel_err",
                value: 0.0
            })
        );
        assert!(IntegratorOptions::default().validate().is_ok());
    }
}
