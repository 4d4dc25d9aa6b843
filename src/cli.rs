//! Command line front end: `astrokin [-v...|-q] [--log-file PATH] [-j N] [--json] INPUT`.
//!
//! Times in the input file and in the `.abun`/`.rout` files are in years.
use crate::ShellIVP::solve::SolverParams;
use crate::Utils::load_from_file::{read_input, read_network, read_source};
use crate::Utils::write_results::{print_summary, write_abundances, write_json, write_routes};
use crate::driver::{ModelRun, run_model};
use crate::errors::SolveError;
use clap::Parser;
use log::{debug, info, warn};
use std::path::PathBuf;
use thiserror::Error;

#[derive(Parser, Debug)]
#[command(
    version,
    about = "Time-dependent chemistry of astrophysical shells: integrates a reaction network for every shell of a source model"
)]
pub struct Cli {
    /// Input file (.ini) with [files], [phys], [solver], [abundances] and [output] sections
    #[arg(value_name = "INPUT")]
    pub input: PathBuf,

    /// Increase verbosity level (-v for INFO, -vv for DEBUG, -vvv for TRACE)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Suppress all log output except for errors
    #[arg(short, long, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Write logs to a specified file in addition to the console output
    #[arg(long, value_name = "PATH")]
    pub log_file: Option<PathBuf>,

    /// Number of threads solving shells; defaults to the number of logical cores
    #[arg(short = 'j', long, value_name = "NUM")]
    pub threads: Option<usize>,

    /// Also write results.json with every shell, time and route
    #[arg(long)]
    pub json: bool,

    /// Directory for the result files
    #[arg(short, long, value_name = "DIR", default_value = ".")]
    pub output_dir: PathBuf,

    /// Do not print the table of final abundances
    #[arg(long)]
    pub no_summary: bool,
}

#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Solve(#[from] SolveError),
    #[error("failed to build thread pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
    #[error("{} shell(s) failed: {:?}", .0.len(), .0)]
    ShellsFailed(Vec<usize>),
}

/// reads every input, solves, writes the result files
pub fn run(cli: &Cli) -> Result<ModelRun, CliError> {
    info!("{} v{} starting up", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"));
    debug!("arguments: {:?}", cli);
    if let Some(threads) = cli.threads {
        info!("using {} threads", threads);
        rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .build_global()?;
    }

    let config = read_input(&cli.input)?;
    let network = read_network(&config.files.chem)?;
    let source = read_source(&config.files.source)?;
    if cli.verbose >= 2 {
        network.pretty_print();
    }
    let unbalanced = network.unbalanced_reactions();
    if !unbalanced.is_empty() {
        warn!("{} reactions do not conserve elements or charge", unbalanced.len());
    }
    let params = SolverParams::default();
    let run = run_model(&config, &network, &source, &params)?;

    std::fs::create_dir_all(&cli.output_dir)
        .map_err(|e| SolveError::io(cli.output_dir.display().to_string(), e))?;
    let suffix = &config.output.suffix;
    write_abundances(&run.store, &cli.output_dir, suffix)?;
    write_routes(&run.store, &cli.output_dir, suffix, params.limits.max_routes)?;
    if cli.json {
        write_json(&run, &cli.output_dir.join("results.json"))?;
    }
    if !cli.no_summary {
        print_summary(&run.store);
    }
    Ok(run)
}

/// like [`run`] but a run with failed shells is an error
pub fn run_checked(cli: &Cli) -> Result<ModelRun, CliError> {
    let run = run(cli)?;
    let failed = run.failed_shells();
    if failed.is_empty() {
        Ok(run)
    } else {
        Err(CliError::ShellsFailed(failed))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ShellIVP::time_grid::SECONDS_PER_YEAR;
    use approx::assert_relative_eq;
    use std::ffi::OsStr;
    use std::fs;
    use tempfile::tempdir;

    fn write_case(dir: &std::path::Path, source: &str) -> PathBuf {
        fs::write(dir.join("source.mdl"), source).unwrap();
        fs::write(dir.join("network.chm"), "X -> Y    1e-16    0    0    2    1\n").unwrap();
        let input = "\
[files]
source = source.mdl
chem = network.chm

[solver]
ti = 1e-6
tf = 1e7
abs_err = 1e-15
rel_err = 1e-6

[abundances]
X = 1.0
Y = 0.0

[output]
time_steps = 32
abundances = X,Y
trace_routes = 1
";
        let path = dir.join("input.ini");
        fs::write(&path, input).unwrap();
        path
    }

    #[test]
    fn test_arguments() {
        let cli = Cli::try_parse_from(["astrokin", "-vv", "-j", "2", "--json", "model.ini"]).unwrap();
        assert_eq!(cli.verbose, 2);
        assert_eq!(cli.threads, Some(2));
        assert!(cli.json);
        assert_eq!(cli.input, PathBuf::from("model.ini"));
        assert_eq!(cli.output_dir, PathBuf::from("."));
        assert!(Cli::try_parse_from(["astrokin", "-q", "-v", "model.ini"]).is_err());
        assert!(Cli::try_parse_from(["astrokin"]).is_err());
    }

    #[test]
    fn test_run_writes_results() {
        let dir = tempdir().unwrap();
        let input = write_case(dir.path(), "0 20.0 1e+04 10.0 10.0\n");
        let out_dir = dir.path().join("results");
        let cli = Cli::try_parse_from([
            OsStr::new("astrokin"),
            OsStr::new("--json"),
            OsStr::new("--no-summary"),
            OsStr::new("--output-dir"),
            out_dir.as_os_str(),
            input.as_os_str(),
        ])
        .unwrap();
        let run = run_checked(&cli).unwrap();
        // 1e7 yr at k = 1e-16 s^-1
        assert_relative_eq!(
            run.store.shells[0].last_sample().unwrap()[0],
            (-1e-16 * 1e7 * SECONDS_PER_YEAR).exp(),
            max_relative = 1e-4
        );
        assert_relative_eq!(run.store.times[31], 1e7 * SECONDS_PER_YEAR);
        // the abundance file gives the configured times back in years
        let text = fs::read_to_string(out_dir.join("X.abun")).unwrap();
        let times: Vec<f64> = text
            .lines()
            .nth(3)
            .unwrap()
            .split_whitespace()
            .map(|v| v.parse().unwrap())
            .collect();
        assert_eq!(times.len(), 32);
        assert_relative_eq!(times[0], 1e-6, max_relative = 1e-6);
        assert_relative_eq!(times[31], 1e7, max_relative = 1e-6);
        let rout = fs::read_to_string(out_dir.join("X.rout")).unwrap();
        let last_time: f64 = rout
            .lines()
            .last()
            .unwrap()
            .split_whitespace()
            .nth(1)
            .unwrap()
            .parse()
            .unwrap();
        assert_relative_eq!(last_time, 1e7, max_relative = 1e-6);
        for name in ["X.abun", "Y.abun", "X.rout", "Y.rout", "results.json"] {
            assert!(out_dir.join(name).is_file(), "{} not written", name);
        }
        let json: ModelRun =
            serde_json::from_str(&fs::read_to_string(out_dir.join("results.json")).unwrap())
                .unwrap();
        assert_eq!(json, run);
    }

    #[test]
    fn test_failed_shell_is_reported() {
        let dir = tempdir().unwrap();
        let input = write_case(dir.path(), "0 20.0 1e+04 10.0 10.0\n1 20.0 1e+04 -5.0 10.0\n");
        let cli = Cli::try_parse_from([
            OsStr::new("astrokin"),
            OsStr::new("--no-summary"),
            OsStr::new("-o"),
            dir.path().as_os_str(),
            input.as_os_str(),
        ])
        .unwrap();
        match run_checked(&cli) {
            Err(CliError::ShellsFailed(shells)) => assert_eq!(shells, vec![1]),
            other => panic!("unexpected result {:?}", other.map(|run| run.failed_shells())),
        }
        // the good shell is still written
        let text = fs::read_to_string(dir.path().join("X.abun")).unwrap();
        assert!(text.lines().any(|l| l.trim_start().starts_with("0 ")));
    }

    #[test]
    fn test_missing_input() {
        let dir = tempdir().unwrap();
        let missing = dir.path().join("nope.ini");
        let cli = Cli::try_parse_from([OsStr::new("astrokin"), missing.as_os_str()]).unwrap();
        assert!(matches!(run(&cli), Err(CliError::Solve(SolveError::Io { .. }))));
    }
}
