//! Result files of a model run.
//!
//! `<species><suffix>.abun`: three comment lines, a row with the output times, then one row per
//! shell with the abundance at each time.
//!
//! `<species><suffix>.rout`: three comment lines, then for every shell and time a formation row
//! and a destruction row, each `shell time id rate id rate ...` with exactly `n_routes` pairs;
//! missing routes are written as `0 0.0`.
//!
//! Both files give times in years. `results.json` is the serialized run as held in memory, with
//! times in seconds.
use crate::ShellIVP::routes::Route;
use crate::ShellIVP::solve::{OutputStore, ShellOutput, ShellState};
use crate::ShellIVP::time_grid::SECONDS_PER_YEAR;
use crate::errors::SolveError;
use log::info;
use prettytable::{Cell, Row, Table};
use serde::Serialize;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

fn io_err(path: &Path, e: std::io::Error) -> SolveError {
    SolveError::io(path.display().to_string(), e)
}

fn write_abundance_file(
    path: &Path,
    store: &OutputStore,
    s: usize,
    species: &str,
) -> std::io::Result<()> {
    let mut f = BufWriter::new(File::create(path)?);
    writeln!(f, "# Abundance of {}", species)?;
    writeln!(f, "# Created by {} {}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"))?;
    writeln!(f, "# First row: time (yr); next rows: shell index and abundances")?;
    write!(f, "    ")?;
    for t in &store.times {
        write!(f, " {:12.6e}", t / SECONDS_PER_YEAR)?;
    }
    writeln!(f)?;
    for shell in &store.shells {
        write!(f, "{:4}", shell.shell)?;
        for (k, sample) in shell.abundances.iter().enumerate() {
            let x = if k < shell.samples { sample[s] } else { f64::NAN };
            write!(f, " {:12.6e}", x)?;
        }
        writeln!(f)?;
    }
    f.flush()
}

/// writes one `.abun` file per output species and returns their paths
pub fn write_abundances(
    store: &OutputStore,
    dir: &Path,
    suffix: &str,
) -> Result<Vec<PathBuf>, SolveError> {
    let mut written = Vec::with_capacity(store.species.len());
    for (s, species) in store.species.iter().enumerate() {
        let path = dir.join(format!("{}{}.abun", species, suffix));
        write_abundance_file(&path, store, s, species).map_err(|e| io_err(&path, e))?;
        written.push(path);
    }
    info!("wrote {} abundance files to '{}'", written.len(), dir.display());
    Ok(written)
}

fn write_route_row(
    f: &mut impl Write,
    shell: usize,
    time: f64,
    routes: &[Route],
    n_routes: usize,
) -> std::io::Result<()> {
    write!(f, "{:4} {:12.6e}", shell, time)?;
    for i in 0..n_routes {
        match routes.get(i) {
            Some(route) => write!(f, " {:6} {:13.6e}", route.reaction_id, route.rate)?,
            None => write!(f, " {:6} {:13}", 0, "0.0")?,
        }
    }
    writeln!(f)
}

fn write_route_file(
    path: &Path,
    store: &OutputStore,
    s: usize,
    species: &str,
    n_routes: usize,
) -> std::io::Result<()> {
    let mut f = BufWriter::new(File::create(path)?);
    writeln!(f, "# Formation/destruction routes of {}", species)?;
    writeln!(f, "# Created by {} {}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"))?;
    writeln!(
        f,
        "# shell time(yr) (reaction rate) x {}; formation row, then destruction row",
        n_routes
    )?;
    for shell in &store.shells {
        let Some(routes) = &shell.routes else {
            continue;
        };
        for (k, time) in store.times.iter().enumerate().take(shell.samples) {
            let time_yr = time / SECONDS_PER_YEAR;
            let species_routes = &routes[k][s];
            write_route_row(&mut f, shell.shell, time_yr, &species_routes.formation, n_routes)?;
            write_route_row(&mut f, shell.shell, time_yr, &species_routes.destruction, n_routes)?;
        }
    }
    f.flush()
}

/// writes one `.rout` file per output species; does nothing when routes were not traced
pub fn write_routes(
    store: &OutputStore,
    dir: &Path,
    suffix: &str,
    n_routes: usize,
) -> Result<Vec<PathBuf>, SolveError> {
    let mut written = Vec::new();
    if store.shells.iter().all(|shell| shell.routes.is_none()) {
        return Ok(written);
    }
    for (s, species) in store.species.iter().enumerate() {
        let path = dir.join(format!("{}{}.rout", species, suffix));
        write_route_file(&path, store, s, species, n_routes).map_err(|e| io_err(&path, e))?;
        written.push(path);
    }
    info!("wrote {} route files to '{}'", written.len(), dir.display());
    Ok(written)
}

/// pretty JSON dump of any serializable result
pub fn write_json<T: Serialize>(value: &T, path: &Path) -> Result<(), SolveError> {
    let file = File::create(path).map_err(|e| io_err(path, e))?;
    let mut f = BufWriter::new(file);
    serde_json::to_writer_pretty(&mut f, value)?;
    f.flush().map_err(|e| io_err(path, e))?;
    info!("wrote '{}'", path.display());
    Ok(())
}

fn shell_status(shell: &ShellOutput) -> String {
    match (&shell.state, &shell.error) {
        (ShellState::Completed, _) => "ok".to_string(),
        (ShellState::Failed { time_reached, .. }, _) => {
            format!("failed at {:.3e} yr", time_reached / SECONDS_PER_YEAR)
        }
        (_, Some(_)) => "rejected".to_string(),
        (other, None) => format!("{:?}", other),
    }
}

/// table of the abundances at the last output time, one row per shell
pub fn summary_table(store: &OutputStore) -> Table {
    let mut table = Table::new();
    let mut header = vec![Cell::new("shell"), Cell::new("status")];
    header.extend(store.species.iter().map(|s| Cell::new(s)));
    table.add_row(Row::new(header));
    for shell in &store.shells {
        let status = shell_status(shell);
        let mut row = vec![Cell::new(&shell.shell.to_string()), Cell::new(&status)];
        match shell.last_sample() {
            Some(values) => row.extend(values.iter().map(|x| Cell::new(&format!("{:.4e}", x)))),
            None => row.extend(store.species.iter().map(|_| Cell::new("-"))),
        }
        table.add_row(Row::new(row));
    }
    table
}

pub fn print_summary(store: &OutputStore) {
    summary_table(store).printstd();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ShellIVP::routes::SpeciesRoutes;
    use std::fs;
    use tempfile::tempdir;

    fn store(trace_routes: bool) -> OutputStore {
        let mut shell0 = ShellOutput::new(0, 2, 2, trace_routes);
        shell0.abundances = vec![vec![1.0, 0.0], vec![0.5, 0.5]];
        shell0.samples = 2;
        shell0.state = ShellState::Completed;
        if let Some(routes) = shell0.routes.as_mut() {
            routes[1][0] = SpeciesRoutes {
                formation: vec![Route {
                    reaction_id: 3,
                    rate: 2.5e-10,
                }],
                destruction: vec![
                    Route {
                        reaction_id: 1,
                        rate: -4.0e-9,
                    },
                    Route {
                        reaction_id: 2,
                        rate: -1.0e-9,
                    },
                ],
            };
        }
        let mut shell1 = ShellOutput::new(1, 2, 2, trace_routes);
        shell1.abundances[0] = vec![1.0, 0.0];
        shell1.samples = 1;
        shell1.state = ShellState::Failed {
            time_reached: 3.0 * SECONDS_PER_YEAR,
            message: "step size too small".to_string(),
        };
        OutputStore {
            times: vec![SECONDS_PER_YEAR, 10.0 * SECONDS_PER_YEAR],
            species: vec!["X".to_string(), "HCO(+)".to_string()],
            shells: vec![shell0, shell1],
        }
    }

    #[test]
    fn test_abundance_files() {
        let dir = tempdir().unwrap();
        let paths = write_abundances(&store(false), dir.path(), "_a").unwrap();
        assert_eq!(paths.len(), 2);
        assert!(paths[1].ends_with("HCO(+)_a.abun"));
        let text = fs::read_to_string(&paths[0]).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 6);
        assert!(lines[..3].iter().all(|l| l.starts_with('#')));
        let times: Vec<f64> = lines[3].split_whitespace().map(|v| v.parse().unwrap()).collect();
        assert_eq!(times, vec![1.0, 10.0]);
        let row: Vec<f64> = lines[4].split_whitespace().map(|v| v.parse().unwrap()).collect();
        assert_eq!(row, vec![0.0, 1.0, 0.5]);
        // the failed shell has no value at the second time
        let row: Vec<&str> = lines[5].split_whitespace().collect();
        assert_eq!(row[0], "1");
        assert_eq!(row[2], "NaN");
    }

    #[test]
    fn test_route_files_are_padded() {
        let dir = tempdir().unwrap();
        assert!(write_routes(&store(false), dir.path(), "", 4).unwrap().is_empty());
        let paths = write_routes(&store(true), dir.path(), "", 4).unwrap();
        let text = fs::read_to_string(&paths[0]).unwrap();
        let rows: Vec<Vec<f64>> = text
            .lines()
            .skip(3)
            .map(|l| l.split_whitespace().map(|v| v.parse().unwrap()).collect())
            .collect();
        // shell 0: two times x two rows, shell 1: one time x two rows
        assert_eq!(rows.len(), 6);
        assert!(rows.iter().all(|r| r.len() == 2 + 2 * 4));
        assert_eq!(rows[2][..4], [0.0, 10.0, 3.0, 2.5e-10]);
        assert_eq!(rows[2][4..], [0.0; 6]);
        assert_eq!(rows[3][2..6], [1.0, -4.0e-9, 2.0, -1.0e-9]);
        assert_eq!(rows[4][0], 1.0);
    }

    #[test]
    fn test_json_and_summary() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("results.json");
        let original = store(true);
        write_json(&original, &path).unwrap();
        let back: OutputStore = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(back, original);
        assert!(back.times[1] > 3.0e8);
        let table = summary_table(&original);
        assert_eq!(table.len(), 3);
        let rendered = table.to_string();
        assert!(rendered.contains("HCO(+)"));
        assert!(rendered.contains("failed at 3.000e0 yr"));
    }

    #[test]
    fn test_rejected_shell_in_summary() {
        let mut rejected = ShellOutput::new(2, 2, 2, false);
        rejected.error = Some("invalid physical state: tgas = 0".to_string());
        let mut run = store(false);
        run.shells.push(rejected);
        let rendered = summary_table(&run).to_string();
        assert!(rendered.contains("rejected"));
        // a rejected shell is written with no values
        let dir = tempdir().unwrap();
        let paths = write_abundances(&run, dir.path(), "").unwrap();
        let text = fs::read_to_string(&paths[0]).unwrap();
        let last = text.lines().last().unwrap();
        assert_eq!(last.split_whitespace().collect::<Vec<_>>(), vec!["2", "NaN", "NaN"]);
    }
}
