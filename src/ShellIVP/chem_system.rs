//! # Rate equations of a reaction network
//!
//! [`ChemSystem`] binds a [`ReactionNetwork`] to the rate coefficients of one shell and
//! evaluates the vector field dn/dt, the per-reaction fluxes and the analytic Jacobian.
//! The state is the vector of number densities n_i (cm⁻³).
//!
//! For reaction r with rate coefficient k_r the flux is
//!
//! flux_r = k_r · Π n_j^{m_j}
//!
//! where the product runs over the distinct real reactants and m_j is the number of times
//! reactant j is listed. The flux is subtracted once per reactant occurrence and added once
//! per product occurrence.
use crate::Kinetics::network::ReactionNetwork;
use crate::Kinetics::rate_laws::PhysicalState;
use crate::ShellIVP::bdf::{JacobianFn, RhsFn, StiffSystem, finite_difference_jacobian};
use crate::errors::ValidationError;
use nalgebra::{DMatrix, DVector};
use std::collections::BTreeSet;
use std::sync::Arc;

/// rate coefficients and stoichiometry of one shell, shared with the integrator closures
#[derive(Debug, Clone)]
struct RateKernel {
    rates: Vec<f64>,
    /// distinct reactants of every reaction with their multiplicity
    reactant_powers: Vec<Vec<(usize, i32)>>,
    reactants: Vec<Vec<usize>>,
    products: Vec<Vec<usize>>,
}

impl RateKernel {
    fn flux(&self, r: usize, n: &DVector<f64>) -> f64 {
        self.reactant_powers[r]
            .iter()
            .fold(self.rates[r], |acc, &(j, m)| acc * n[j].powi(m))
    }

    fn rhs_into(&self, n: &DVector<f64>, dndt: &mut DVector<f64>) {
        dndt.fill(0.0);
        for r in 0..self.rates.len() {
            let flux = self.flux(r, n);
            for &i in &self.reactants[r] {
                dndt[i] -= flux;
            }
            for &i in &self.products[r] {
                dndt[i] += flux;
            }
        }
    }

    fn jacobian_into(&self, n: &DVector<f64>, jac: &mut DMatrix<f64>) {
        jac.fill(0.0);
        for (r, powers) in self.reactant_powers.iter().enumerate() {
            for &(j, m) in powers {
                let mut d = self.rates[r] * m as f64 * n[j].powi(m - 1);
                for &(l, ml) in powers {
                    if l != j {
                        d *= n[l].powi(ml);
                    }
                }
                for &i in &self.reactants[r] {
                    jac[(i, j)] -= d;
                }
                for &i in &self.products[r] {
                    jac[(i, j)] += d;
                }
            }
        }
    }
}

pub struct ChemSystem<'a> {
    network: &'a ReactionNetwork,
    kernel: Arc<RateKernel>,
    /// (row, column) entries of the Jacobian that can be nonzero, sorted
    pattern: Vec<(usize, usize)>,
}

impl<'a> ChemSystem<'a> {
    pub fn new(
        network: &'a ReactionNetwork,
        state: &PhysicalState,
    ) -> Result<Self, ValidationError> {
        let rates = network.rate_coefficients(state)?;
        Self::with_rates(network, rates)
    }

    /// system with externally supplied rate coefficients, one per reaction
    pub fn with_rates(
        network: &'a ReactionNetwork,
        rates: Vec<f64>,
    ) -> Result<Self, ValidationError> {
        if rates.len() != network.n_reactions() {
            return Err(ValidationError::RateCountMismatch {
                expected: network.n_reactions(),
                found: rates.len(),
            });
        }
        let mut reactant_powers = Vec::with_capacity(network.n_reactions());
        let mut entries: BTreeSet<(usize, usize)> = BTreeSet::new();
        for reaction in network.reactions() {
            let mut powers: Vec<(usize, i32)> = Vec::new();
            for &j in &reaction.reactant_indices {
                match powers.iter_mut().find(|(idx, _)| *idx == j) {
                    Some((_, m)) => *m += 1,
                    None => powers.push((j, 1)),
                }
            }
            for &(j, _) in &powers {
                for &row in reaction
                    .reactant_indices
                    .iter()
                    .chain(reaction.product_indices.iter())
                {
                    entries.insert((row, j));
                }
            }
            reactant_powers.push(powers);
        }
        let kernel = RateKernel {
            rates,
            reactant_powers,
            reactants: network
                .reactions()
                .iter()
                .map(|r| r.reactant_indices.clone())
                .collect(),
            products: network
                .reactions()
                .iter()
                .map(|r| r.product_indices.clone())
                .collect(),
        };
        Ok(Self {
            network,
            kernel: Arc::new(kernel),
            pattern: entries.into_iter().collect(),
        })
    }

    pub fn network(&self) -> &ReactionNetwork {
        self.network
    }

    pub fn rates(&self) -> &[f64] {
        &self.kernel.rates
    }

    pub fn jacobian_pattern(&self) -> &[(usize, usize)] {
        &self.pattern
    }

    /// flux of every reaction, cm⁻³ s⁻¹
    pub fn fluxes(&self, n: &DVector<f64>) -> Vec<f64> {
        (0..self.network.n_reactions())
            .map(|r| self.kernel.flux(r, n))
            .collect()
    }

    pub fn rhs_into(&self, n: &DVector<f64>, dndt: &mut DVector<f64>) {
        self.kernel.rhs_into(n, dndt);
    }

    pub fn rhs(&self, n: &DVector<f64>) -> DVector<f64> {
        let mut dndt = DVector::zeros(n.len());
        self.rhs_into(n, &mut dndt);
        dndt
    }

    pub fn jacobian_into(&self, n: &DVector<f64>, jac: &mut DMatrix<f64>) {
        self.kernel.jacobian_into(n, jac);
    }

    pub fn jacobian(&self, n: &DVector<f64>) -> DMatrix<f64> {
        let dim = n.len();
        let mut jac = DMatrix::zeros(dim, dim);
        self.jacobian_into(n, &mut jac);
        jac
    }

    /// central-difference approximation of the Jacobian
    pub fn finite_difference_jacobian(&self, n: &DVector<f64>) -> DMatrix<f64> {
        finite_difference_jacobian(&self.rhs_fn(), 0.0, n)
    }
}

impl StiffSystem for ChemSystem<'_> {
    fn ndim(&self) -> usize {
        self.network.n_species()
    }

    fn rhs_fn(&self) -> RhsFn {
        let kernel = Arc::clone(&self.kernel);
        Box::new(move |_t: f64, n: &DVector<f64>| {
            let mut dndt = DVector::zeros(n.len());
            kernel.rhs_into(n, &mut dndt);
            dndt
        })
    }

    fn jacobian_fn(&self) -> Option<JacobianFn> {
        let kernel = Arc::clone(&self.kernel);
        Some(Box::new(move |_t: f64, n: &DVector<f64>| {
            let dim = n.len();
            let mut jac = DMatrix::zeros(dim, dim);
            kernel.jacobian_into(n, &mut jac);
            jac
        }))
    }
}
