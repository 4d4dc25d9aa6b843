//! # Per-shell solve
//!
//! [`solve_shell`] integrates the chemistry of one shell from t = 0 through every time of a
//! [`TimeGrid`] and writes the abundances of the output species (and, optionally, their
//! formation/destruction routes) into a caller-owned [`ShellOutput`].
//!
//! Progress is recorded in [`ShellOutput::state`]:
//! `Initialized → Advancing → … → Completed`, or `Advancing → Failed` when the integrator gives
//! up. In the failed case the samples recorded before the failure remain valid and
//! [`ShellOutput::samples`] tells how many there are. A request rejected before integration
//! leaves the state untouched and only returns the error.
use crate::Kinetics::network::{OutputSpec, ReactionNetwork};
use crate::Kinetics::rate_laws::PhysicalState;
use crate::ShellIVP::bdf::{BdfIntegrator, IntegratorOptions, IntegratorStats};
use crate::ShellIVP::chem_system::ChemSystem;
use crate::ShellIVP::routes::{RouteTracer, SpeciesRoutes};
use crate::ShellIVP::time_grid::TimeGrid;
use crate::errors::{CapacityError, ParseError, SolveError, ValidationError};
use log::{debug, info, warn};
use nalgebra::DVector;
use serde::{Deserialize, Serialize};

/// upper bounds on the size of a run
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SolverLimits {
    pub max_shells: usize,
    pub max_time_steps: usize,
    pub max_species: usize,
    pub max_reactions: usize,
    pub max_output_species: usize,
    /// routes kept per group (formation or destruction)
    pub max_routes: usize,
    pub max_initial_abundances: usize,
}

impl Default for SolverLimits {
    fn default() -> Self {
        Self {
            max_shells: 256,
            max_time_steps: 1024,
            max_species: 1024,
            max_reactions: 16384,
            max_output_species: 256,
            max_routes: 16,
            max_initial_abundances: 256,
        }
    }
}

fn ensure(what: &'static str, requested: usize, limit: usize) -> Result<(), CapacityError> {
    if requested > limit {
        return Err(CapacityError {
            what,
            requested,
            limit,
        });
    }
    Ok(())
}

impl SolverLimits {
    pub fn check_network(&self, network: &ReactionNetwork) -> Result<(), CapacityError> {
        ensure("species", network.n_species(), self.max_species)?;
        ensure("reactions", network.n_reactions(), self.max_reactions)
    }

    pub fn check_shells(&self, n_shells: usize) -> Result<(), CapacityError> {
        ensure("shells", n_shells, self.max_shells)
    }

    pub fn check_request(
        &self,
        grid: &TimeGrid,
        output: &OutputSpec,
        n_initial: usize,
    ) -> Result<(), CapacityError> {
        ensure("time steps", grid.len(), self.max_time_steps)?;
        ensure("output species", output.len(), self.max_output_species)?;
        ensure("initial abundances", n_initial, self.max_initial_abundances)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Tolerances {
    /// absolute tolerance on number densities, cm⁻³
    pub abs_err: f64,
    pub rel_err: f64,
}

impl Default for Tolerances {
    fn default() -> Self {
        Self {
            abs_err: 1e-15,
            rel_err: 1e-6,
        }
    }
}

impl Tolerances {
    pub fn validate(&self) -> Result<(), ValidationError> {
        for (name, value) in [("abs_err", self.abs_err), ("rel_err", self.rel_err)] {
            if !value.is_finite() || value <= 0.0 {
                return Err(ValidationError::NonPositiveTolerance { name, value });
            }
        }
        Ok(())
    }
}

/// solver knobs that do not change between shells
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SolverParams {
    pub limits: SolverLimits,
    /// integrator steps allowed between two output times
    pub max_steps: usize,
    pub max_step: Option<f64>,
    pub first_step: Option<f64>,
}

impl Default for SolverParams {
    fn default() -> Self {
        Self {
            limits: SolverLimits::default(),
            max_steps: 100_000,
            max_step: None,
            first_step: None,
        }
    }
}

impl SolverParams {
    pub fn integrator_options(&self, tolerances: &Tolerances) -> IntegratorOptions {
        IntegratorOptions {
            abs_err: tolerances.abs_err,
            rel_err: tolerances.rel_err,
            max_steps: self.max_steps,
            max_step: self.max_step,
            first_step: self.first_step,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ShellState {
    Initialized,
    /// integrating towards output time `sample`
    Advancing { sample: usize },
    Completed,
    Failed { time_reached: f64, message: String },
}

/// results of one shell: `abundances[time][output species]` and optional routes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShellOutput {
    pub shell: usize,
    pub state: ShellState,
    /// number of time samples recorded so far
    pub samples: usize,
    pub abundances: Vec<Vec<f64>>,
    pub routes: Option<Vec<Vec<SpeciesRoutes>>>,
    pub stats: IntegratorStats,
    /// why the shell was rejected before integration
    pub error: Option<String>,
}

impl ShellOutput {
    pub fn new(shell: usize, n_times: usize, n_species: usize, trace_routes: bool) -> Self {
        Self {
            shell,
            state: ShellState::Initialized,
            samples: 0,
            abundances: vec![vec![0.0; n_species]; n_times],
            routes: trace_routes
                .then(|| vec![vec![SpeciesRoutes::default(); n_species]; n_times]),
            stats: IntegratorStats::default(),
            error: None,
        }
    }

    pub fn is_completed(&self) -> bool {
        self.state == ShellState::Completed
    }

    pub fn is_failed(&self) -> bool {
        matches!(self.state, ShellState::Failed { .. })
    }

    /// abundances at the last recorded time
    pub fn last_sample(&self) -> Option<&[f64]> {
        self.samples
            .checked_sub(1)
            .map(|k| self.abundances[k].as_slice())
    }

    fn check_shape(
        &self,
        n_times: usize,
        n_species: usize,
        trace_routes: bool,
    ) -> Result<(), ValidationError> {
        if self.abundances.len() != n_times
            || self.abundances.iter().any(|row| row.len() != n_species)
        {
            return Err(ValidationError::OutputShape(format!(
                "abundance storage of shell {} is not {} x {}",
                self.shell, n_times, n_species
            )));
        }
        match &self.routes {
            Some(_) if !trace_routes => Err(ValidationError::OutputShape(
                "route storage present but routes are not traced".to_string(),
            )),
            Some(routes)
                if routes.len() != n_times || routes.iter().any(|r| r.len() != n_species) =>
            {
                Err(ValidationError::OutputShape(format!(
                    "route storage of shell {} is not {} x {}",
                    self.shell, n_times, n_species
                )))
            }
            None if trace_routes => Err(ValidationError::OutputShape(
                "routes are traced but no route storage was allocated".to_string(),
            )),
            _ => Ok(()),
        }
    }
}

/// outputs of every shell of a run, indexed by shell
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputStore {
    pub times: Vec<f64>,
    pub species: Vec<String>,
    pub shells: Vec<ShellOutput>,
}

impl OutputStore {
    pub fn new(
        n_shells: usize,
        grid: &TimeGrid,
        output: &OutputSpec,
        trace_routes: bool,
        limits: &SolverLimits,
    ) -> Result<Self, CapacityError> {
        limits.check_shells(n_shells)?;
        ensure("time steps", grid.len(), limits.max_time_steps)?;
        ensure("output species", output.len(), limits.max_output_species)?;
        let shells = (0..n_shells)
            .map(|shell| ShellOutput::new(shell, grid.len(), output.len(), trace_routes))
            .collect();
        Ok(Self {
            times: grid.times().to_vec(),
            species: output.names.clone(),
            shells,
        })
    }

    pub fn shell(&self, index: usize) -> Option<&ShellOutput> {
        self.shells.get(index)
    }
}

/// number densities at t = 0; species not listed start at zero
pub fn initial_densities(
    network: &ReactionNetwork,
    initial_abundances: &[(String, f64)],
    nh: f64,
) -> Result<DVector<f64>, ParseError> {
    let mut n = DVector::zeros(network.n_species());
    for (name, x) in initial_abundances {
        let index = network
            .species_index(name)
            .ok_or_else(|| ParseError::UnknownSpecies(name.clone()))?;
        n[index] = x * nh;
    }
    Ok(n)
}

/// integrates shell `shell_index` through `grid`, recording samples into `out`
#[allow(clippy::too_many_arguments)]
pub fn solve_shell(
    params: &SolverParams,
    tolerances: &Tolerances,
    initial_abundances: &[(String, f64)],
    output: &OutputSpec,
    state: &PhysicalState,
    network: &ReactionNetwork,
    shell_index: usize,
    grid: &TimeGrid,
    trace_routes: bool,
    out: &mut ShellOutput,
) -> Result<(), SolveError> {
    let limits = &params.limits;
    limits.check_network(network)?;
    limits.check_request(grid, output, initial_abundances.len())?;
    if shell_index >= limits.max_shells {
        return Err(CapacityError {
            what: "shells",
            requested: shell_index + 1,
            limit: limits.max_shells,
        }
        .into());
    }
    tolerances.validate()?;
    state.validate()?;
    out.check_shape(grid.len(), output.len(), trace_routes)?;

    let n0 = initial_densities(network, initial_abundances, state.nh)?;
    let system = ChemSystem::new(network, state)?;
    let tracer = RouteTracer::new(limits.max_routes);

    out.shell = shell_index;
    out.samples = 0;
    out.error = None;
    out.state = ShellState::Advancing { sample: 0 };

    let options = params.integrator_options(tolerances);
    let mut integrator = match BdfIntegrator::new(&system, 0.0, n0, grid.last(), options) {
        Ok(integrator) => integrator,
        Err(err) => {
            let err = err.in_shell(shell_index);
            warn!("{}", err);
            out.state = ShellState::Failed {
                time_reached: 0.0,
                message: err.to_string(),
            };
            return Err(err.into());
        }
    };

    for (k, &t) in grid.times().iter().enumerate() {
        out.state = ShellState::Advancing { sample: k };
        if let Err(err) = integrator.advance_to(t) {
            let err = err.in_shell(shell_index);
            warn!("{}", err);
            out.state = ShellState::Failed {
                time_reached: err.time_reached(),
                message: err.to_string(),
            };
            out.stats = integrator.stats();
            return Err(err.into());
        }
        let n = integrator.y();
        for (slot, &index) in out.abundances[k].iter_mut().zip(&output.indices) {
            *slot = n[index] / state.nh;
        }
        if let Some(routes) = out.routes.as_mut() {
            routes[k] = tracer.trace_all(&system, n, output);
        }
        out.samples = k + 1;
    }

    out.stats = integrator.stats();
    out.state = ShellState::Completed;
    debug!("shell {}: {:?}", shell_index, out.stats);
    info!(
        "shell {} done: {} samples, {} steps",
        shell_index, out.samples, out.stats.accepted_steps
    );
    Ok(())
}

/// like [`solve_shell`] but allocates and returns the output
#[allow(clippy::too_many_arguments)]
pub fn solve(
    params: &SolverParams,
    tolerances: &Tolerances,
    initial_abundances: &[(String, f64)],
    output: &OutputSpec,
    state: &PhysicalState,
    network: &ReactionNetwork,
    shell_index: usize,
    grid: &TimeGrid,
    trace_routes: bool,
) -> Result<ShellOutput, SolveError> {
    let mut out = ShellOutput::new(shell_index, grid.len(), output.len(), trace_routes);
    solve_shell(
        params,
        tolerances,
        initial_abundances,
        output,
        state,
        network,
        shell_index,
        grid,
        trace_routes,
        &mut out,
    )?;
    Ok(out)
}
