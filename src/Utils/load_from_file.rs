//! Readers of the three input files of a model run:
//!
//! - the input file (`.ini`): sections `[files]`, `[phys]`, `[solver]`, `[abundances]`, `[output]`
//!   with `key = value` lines;
//! - the source model (`.mdl`): one shell per line, `shell av nh tgas tdust`;
//! - the reaction network (`.chm`): one reaction per line,
//!   `r1 + r2 -> p1 + p2  alpha beta gamma type id`.
//!
//! `#` starts a comment in all three formats. Errors carry the line number of the offending
//! record.
use crate::Kinetics::network::{ReactionNetwork, ReactionRecord};
use crate::Kinetics::rate_laws::{PhysParams, ShellConditions};
use crate::ShellIVP::solve::Tolerances;
use crate::errors::{ConfigError, ParseError, SolveError};
use log::{info, warn};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

const REACTION_PATTERN: &str = r"^(?P<lhs>.+?)\s+->\s+(?P<rhs>.+?)\s+(?P<alpha>\S+)\s+(?P<beta>\S+)\s+(?P<gamma>\S+)\s+(?P<tag>-?\d+)\s+(?P<id>-?\d+)$";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilesSection {
    pub source: PathBuf,
    pub chem: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SolverSection {
    /// first output time, yr
    pub ti: f64,
    /// last output time, yr
    pub tf: f64,
    pub tolerances: Tolerances,
}

impl Default for SolverSection {
    fn default() -> Self {
        Self {
            ti: 1e-6,
            tf: 1e7,
            tolerances: Tolerances::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputSection {
    pub time_steps: usize,
    pub abundances: Vec<String>,
    pub trace_routes: bool,
    pub suffix: String,
}

/// typed content of an input file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InputConfig {
    pub files: FilesSection,
    pub phys: PhysParams,
    pub solver: SolverSection,
    /// initial abundances relative to H, in file order
    pub abundances: Vec<(String, f64)>,
    pub output: OutputSection,
}

fn strip_comment(line: &str) -> &str {
    match line.find('#') {
        Some(pos) => &line[..pos],
        None => line,
    }
    .trim()
}

fn number<T: std::str::FromStr>(value: &str, key: &str, line: usize) -> Result<T, ConfigError> {
    value.parse::<T>().map_err(|_| ConfigError::InvalidValue {
        line,
        key: key.to_string(),
        value: value.to_string(),
    })
}

/// parses the text of an input file; relative file names are resolved against `base_dir`
pub fn parse_input(text: &str, base_dir: Option<&Path>) -> Result<InputConfig, ConfigError> {
    let mut source: Option<PathBuf> = None;
    let mut chem: Option<PathBuf> = None;
    let mut phys = PhysParams::default();
    let mut solver = SolverSection::default();
    let mut abundances: Vec<(String, f64)> = Vec::new();
    let mut time_steps = 32;
    let mut output_species: Option<Vec<String>> = None;
    let mut trace_routes = false;
    let mut suffix = String::new();

    let mut section = String::new();
    for (i, raw) in text.lines().enumerate() {
        let line_no = i + 1;
        let line = strip_comment(raw);
        if line.is_empty() {
            continue;
        }
        if let Some(name) = line.strip_prefix('[').and_then(|l| l.strip_suffix(']')) {
            section = name.trim().to_lowercase();
            if !matches!(
                section.as_str(),
                "files" | "phys" | "solver" | "abundances" | "output"
            ) {
                return Err(ConfigError::UnknownSection {
                    line: line_no,
                    section,
                });
            }
            continue;
        }
        let Some((key, value)) = line.split_once('=') else {
            return Err(ConfigError::MalformedLine {
                line: line_no,
                text: line.to_string(),
            });
        };
        let (key, value) = (key.trim(), value.trim());
        if key.is_empty() || value.is_empty() || section.is_empty() {
            return Err(ConfigError::MalformedLine {
                line: line_no,
                text: line.to_string(),
            });
        }
        let resolve = |name: &str| -> PathBuf {
            let path = PathBuf::from(name);
            match base_dir {
                Some(dir) if path.is_relative() => dir.join(path),
                _ => path,
            }
        };
        match (section.as_str(), key) {
            ("files", "source") => source = Some(resolve(value)),
            ("files", "chem") => chem = Some(resolve(value)),
            ("phys", "chi") => phys.chi = number(value, key, line_no)?,
            ("phys", "cosmic") => phys.cosmic = number(value, key, line_no)?,
            ("phys", "grain_size") => phys.grain_size = number(value, key, line_no)?,
            ("solver", "ti") => solver.ti = number(value, key, line_no)?,
            ("solver", "tf") => solver.tf = number(value, key, line_no)?,
            ("solver", "abs_err") => solver.tolerances.abs_err = number(value, key, line_no)?,
            ("solver", "rel_err") => solver.tolerances.rel_err = number(value, key, line_no)?,
            ("abundances", name) => {
                let x: f64 = number(value, key, line_no)?;
                match abundances.iter_mut().find(|(n, _)| n == name) {
                    Some(entry) => {
                        warn!("line {}: initial abundance of {} given twice", line_no, name);
                        entry.1 = x;
                    }
                    None => abundances.push((name.to_string(), x)),
                }
            }
            ("output", "time_steps") => time_steps = number(value, key, line_no)?,
            ("output", "abundances") => {
                output_species = Some(
                    value
                        .split(',')
                        .map(|s| s.trim().to_string())
                        .filter(|s| !s.is_empty())
                        .collect(),
                )
            }
            ("output", "trace_routes") => {
                trace_routes = match value {
                    "1" | "true" | "yes" => true,
                    "0" | "false" | "no" => false,
                    _ => {
                        return Err(ConfigError::InvalidValue {
                            line: line_no,
                            key: key.to_string(),
                            value: value.to_string(),
                        });
                    }
                }
            }
            ("output", "suffix") => suffix = value.to_string(),
            _ => {
                return Err(ConfigError::UnknownKey {
                    line: line_no,
                    section: section.clone(),
                    key: key.to_string(),
                });
            }
        }
    }

    let missing = |section: &str, key: &str| ConfigError::MissingKey {
        section: section.to_string(),
        key: key.to_string(),
    };
    let source = source.ok_or_else(|| missing("files", "source"))?;
    let chem = chem.ok_or_else(|| missing("files", "chem"))?;
    let output_species = output_species
        .filter(|list| !list.is_empty())
        .ok_or_else(|| missing("output", "abundances"))?;

    Ok(InputConfig {
        files: FilesSection { source, chem },
        phys,
        solver,
        abundances,
        output: OutputSection {
            time_steps,
            abundances: output_species,
            trace_routes,
            suffix,
        },
    })
}

fn read_text(path: &Path) -> Result<String, SolveError> {
    fs::read_to_string(path).map_err(|e| SolveError::io(path.display().to_string(), e))
}

/// reads the input file; the source and network paths become relative to its directory
pub fn read_input(path: &Path) -> Result<InputConfig, SolveError> {
    let text = read_text(path)?;
    let config = parse_input(&text, path.parent())?;
    info!("read input file '{}'", path.display());
    Ok(config)
}

/// parses a source model: `shell av nh tgas tdust` per line, shells numbered 0, 1, 2, ...
pub fn parse_source(text: &str, file_name: &str) -> Result<Vec<ShellConditions>, ParseError> {
    let mut shells = Vec::new();
    for (i, raw) in text.lines().enumerate() {
        let line = strip_comment(raw);
        if line.is_empty() {
            continue;
        }
        let malformed = |message: String| ParseError::MalformedRecord {
            file: file_name.to_string(),
            line: i + 1,
            message,
        };
        let columns: Vec<&str> = line.split_whitespace().collect();
        if columns.len() != 5 {
            return Err(malformed(format!(
                "expected 5 columns (shell av nh tgas tdust), found {}",
                columns.len()
            )));
        }
        let shell: usize = columns[0]
            .parse()
            .map_err(|_| malformed(format!("invalid shell index '{}'", columns[0])))?;
        if shell != shells.len() {
            return Err(malformed(format!(
                "shell index {} out of order, expected {}",
                shell,
                shells.len()
            )));
        }
        let mut values = [0.0; 4];
        for (value, column) in values.iter_mut().zip(&columns[1..]) {
            *value = column
                .parse()
                .map_err(|_| malformed(format!("invalid number '{}'", column)))?;
        }
        shells.push(ShellConditions {
            shell,
            av: values[0],
            nh: values[1],
            tgas: values[2],
            tdust: values[3],
        });
    }
    if shells.is_empty() {
        return Err(ParseError::Empty {
            file: file_name.to_string(),
        });
    }
    Ok(shells)
}

pub fn read_source(path: &Path) -> Result<Vec<ShellConditions>, SolveError> {
    let text = read_text(path)?;
    let shells = parse_source(&text, &path.display().to_string())?;
    info!("read {} shells from '{}'", shells.len(), path.display());
    Ok(shells)
}

fn side(text: &str) -> Vec<String> {
    text.split_whitespace()
        .filter(|token| *token != "+")
        .map(str::to_string)
        .collect()
}

/// parses the records of a network file
pub fn parse_network(text: &str, file_name: &str) -> Result<Vec<ReactionRecord>, ParseError> {
    let reaction_re = Regex::new(REACTION_PATTERN).map_err(|e| ParseError::MalformedRecord {
        file: file_name.to_string(),
        line: 0,
        message: e.to_string(),
    })?;
    let mut records = Vec::new();
    for (i, raw) in text.lines().enumerate() {
        let line = strip_comment(raw);
        if line.is_empty() {
            continue;
        }
        let malformed = |message: String| ParseError::MalformedRecord {
            file: file_name.to_string(),
            line: i + 1,
            message,
        };
        let caps = reaction_re.captures(line).ok_or_else(|| {
            malformed("expected 'reactants -> products alpha beta gamma type id'".to_string())
        })?;
        let float = |name: &str| -> Result<f64, ParseError> {
            caps[name]
                .parse::<f64>()
                .map_err(|_| malformed(format!("invalid {} '{}'", name, &caps[name])))
        };
        let int = |name: &str| -> Result<i64, ParseError> {
            caps[name]
                .parse::<i64>()
                .map_err(|_| malformed(format!("invalid {} '{}'", name, &caps[name])))
        };
        records.push(ReactionRecord {
            reactants: side(&caps["lhs"]),
            products: side(&caps["rhs"]),
            alpha: float("alpha")?,
            beta: float("beta")?,
            gamma: float("gamma")?,
            tag: int("tag")?,
            id: int("id")?,
        });
    }
    if records.is_empty() {
        return Err(ParseError::Empty {
            file: file_name.to_string(),
        });
    }
    Ok(records)
}

/// reads a network file and builds the network
pub fn read_network(path: &Path) -> Result<ReactionNetwork, SolveError> {
    let text = read_text(path)?;
    let records = parse_network(&text, &path.display().to_string())?;
    info!("read {} reactions from '{}'", records.len(), path.display());
    ReactionNetwork::from_records(records)
}
