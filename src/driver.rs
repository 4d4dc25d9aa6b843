//! # Multi-shell driver
//!
//! Runs the chemistry of every shell of a source model over one shared time grid. Shells are
//! independent: each rayon task owns one [`ShellOutput`] slot of the [`OutputStore`] while the
//! network, the grid and the configuration are shared read-only. A shell that fails (integrator
//! gave up, unusable physical conditions) is marked `Failed` in its slot and the others go on.
use crate::Kinetics::network::{OutputSpec, ReactionNetwork};
use crate::Kinetics::rate_laws::{PhysicalState, ShellConditions};
use crate::ShellIVP::solve::{
    OutputStore, ShellOutput, SolverParams, initial_densities, solve_shell,
};
use crate::ShellIVP::time_grid::{SECONDS_PER_YEAR, TimeGrid};
use crate::Utils::load_from_file::InputConfig;
use crate::errors::SolveError;
use log::{error, info};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::time::Instant;

/// everything a finished run produced
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelRun {
    pub grid: TimeGrid,
    pub output: OutputSpec,
    pub store: OutputStore,
}

impl ModelRun {
    /// indices of the shells that did not reach the final time, rejected ones included
    pub fn failed_shells(&self) -> Vec<usize> {
        self.store
            .shells
            .iter()
            .filter(|shell| !shell.is_completed())
            .map(|shell| shell.shell)
            .collect()
    }

    pub fn all_completed(&self) -> bool {
        self.store.shells.iter().all(ShellOutput::is_completed)
    }
}

/// Checks the request as a whole, then solves every shell in parallel.
///
/// Errors returned here (capacities, grid, tolerances, unknown species) concern the whole run and
/// are raised before any integration. Per-shell problems end up in the shell's state.
pub fn run_model(
    config: &InputConfig,
    network: &ReactionNetwork,
    source: &[ShellConditions],
    params: &SolverParams,
) -> Result<ModelRun, SolveError> {
    let limits = &params.limits;
    limits.check_network(network)?;
    limits.check_shells(source.len())?;
    config.solver.tolerances.validate()?;

    // the input gives years, the solver works in seconds
    let grid = TimeGrid::logarithmic(
        config.solver.ti * SECONDS_PER_YEAR,
        config.solver.tf * SECONDS_PER_YEAR,
        config.output.time_steps,
        limits.max_time_steps,
    )?;
    let output = OutputSpec::resolve(network, &config.output.abundances)?;
    limits.check_request(&grid, &output, config.abundances.len())?;
    // unknown initial species are a configuration problem, not a shell problem
    initial_densities(network, &config.abundances, 1.0)?;

    let trace_routes = config.output.trace_routes;
    let mut store = OutputStore::new(source.len(), &grid, &output, trace_routes, limits)?;
    info!(
        "solving {} shells: {} species, {} reactions, {} output times",
        source.len(),
        network.n_species(),
        network.n_reactions(),
        grid.len()
    );
    let start = Instant::now();
    store
        .shells
        .par_iter_mut()
        .zip(source.par_iter())
        .enumerate()
        .for_each(|(shell_index, (out, conditions))| {
            let state = PhysicalState::new(&config.phys, conditions);
            let result = solve_shell(
                params,
                &config.solver.tolerances,
                &config.abundances,
                &output,
                &state,
                network,
                shell_index,
                &grid,
                trace_routes,
                out,
            );
            if let Err(err) = result {
                // integration failures are already recorded by solve_shell
                if !out.is_failed() {
                    error!("shell {}: {}", shell_index, err);
                    out.error = Some(err.to_string());
                }
            }
        });

    let run = ModelRun {
        grid,
        output,
        store,
    };
    let failed = run.failed_shells();
    info!(
        "{} of {} shells completed in {:.3} s",
        source.len() - failed.len(),
        source.len(),
        start.elapsed().as_secs_f64()
    );
    if !failed.is_empty() {
        error!("failed shells: {:?}", failed);
    }
    Ok(run)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ShellIVP::solve::{ShellState, SolverLimits, solve};
    use crate::Utils::load_from_file::{parse_input, parse_network};
    use crate::errors::{CapacityError, ParseError};
    use approx::assert_relative_eq;

    const INPUT: &str = "\
[files]
source = shells.mdl
chem = network.chm

[solver]
ti = 1e-6
tf = 1e7
abs_err = 1e-15
rel_err = 1e-6

[abundances]
X = 1.0

[output]
time_steps = 16
abundances = X,Y
";

    fn network() -> ReactionNetwork {
        let records = parse_network("X -> Y 1e-16 0 0 2 1\n", "network.chm").unwrap();
        ReactionNetwork::from_records(records).unwrap()
    }

    fn shell(shell: usize, nh: f64, tgas: f64) -> ShellConditions {
        ShellConditions {
            shell,
            av: 20.0,
            nh,
            tgas,
            tdust: 10.0,
        }
    }

    #[test]
    fn test_all_shells_solved() {
        let config = parse_input(INPUT, None).unwrap();
        let network = network();
        let source: Vec<_> = (0..4).map(|i| shell(i, 10f64.powi(i as i32 + 2), 10.0)).collect();
        let params = SolverParams::default();
        let run = run_model(&config, &network, &source, &params).unwrap();
        assert!(run.all_completed());
        assert_eq!(run.store.shells.len(), 4);
        assert_eq!(run.store.times, run.grid.times());
        // 1e-6 to 1e7 yr
        assert_relative_eq!(run.grid.first(), 1e-6 * SECONDS_PER_YEAR);
        assert_eq!(run.grid.last(), 1e7 * SECONDS_PER_YEAR);
        let expected = (-1e-16 * 1e7 * SECONDS_PER_YEAR).exp();
        for out in &run.store.shells {
            let last = out.last_sample().unwrap();
            assert_relative_eq!(last[0], expected, max_relative = 1e-4);
            assert_relative_eq!(last[0] + last[1], 1.0, max_relative = 1e-6);
        }
    }

    #[test]
    fn test_parallel_matches_single_shell_solve() {
        let config = parse_input(INPUT, None).unwrap();
        let network = network();
        let source = vec![shell(0, 1e4, 10.0), shell(1, 1e6, 50.0)];
        let params = SolverParams::default();
        let run = run_model(&config, &network, &source, &params).unwrap();
        let state = PhysicalState::new(&config.phys, &source[1]);
        let single = solve(
            &params,
            &config.solver.tolerances,
            &config.abundances,
            &run.output,
            &state,
            &network,
            1,
            &run.grid,
            false,
        )
        .unwrap();
        assert_eq!(run.store.shells[1], single);
    }

    #[test]
    fn test_failed_shell_does_not_stop_others() {
        let config = parse_input(INPUT, None).unwrap();
        let network = network();
        // zero gas temperature is unusable
        let source = vec![shell(0, 1e4, 10.0), shell(1, 1e4, 0.0), shell(2, 1e5, 10.0)];
        let run = run_model(&config, &network, &source, &SolverParams::default()).unwrap();
        assert_eq!(run.failed_shells(), vec![1]);
        assert!(!run.all_completed());
        let rejected = &run.store.shells[1];
        assert_eq!(rejected.samples, 0);
        // never started, so never Failed
        assert_eq!(rejected.state, ShellState::Initialized);
        assert!(rejected.error.as_deref().is_some_and(|m| m.contains("tgas")));
        assert!(run.store.shells[0].error.is_none());
        assert!(run.store.shells[0].is_completed());
        assert!(run.store.shells[2].is_completed());
        assert_eq!(run.store.shells[2].samples, 16);
    }

    #[test]
    fn test_run_level_errors() {
        let network = network();
        let source = vec![shell(0, 1e4, 10.0)];
        let params = SolverParams::default();

        let mut config = parse_input(INPUT, None).unwrap();
        config.output.abundances.push("CO".to_string());
        let err = run_model(&config, &network, &source, &params).unwrap_err();
        assert!(matches!(err, SolveError::Parse(ParseError::UnknownSpecies(ref s)) if s == "CO"));

        let mut config = parse_input(INPUT, None).unwrap();
        config.abundances.push(("H2".to_string(), 0.5));
        let err = run_model(&config, &network, &source, &params).unwrap_err();
        assert!(matches!(err, SolveError::Parse(ParseError::UnknownSpecies(_))));

        let config = parse_input(INPUT, None).unwrap();
        let mut small = params.clone();
        small.limits = SolverLimits {
            max_shells: 1,
            ..SolverLimits::default()
        };
        let two = vec![shell(0, 1e4, 10.0), shell(1, 1e4, 10.0)];
        let err = run_model(&config, &network, &two, &small).unwrap_err();
        assert!(matches!(
            err,
            SolveError::Capacity(CapacityError {
                what: "shells",
                requested: 2,
                limit: 1
            })
        ));
    }
}
