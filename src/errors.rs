//! # Error taxonomy
//!
//! Every fallible operation of the crate returns one of the enums below.
//! Configuration, parsing, capacity and validation problems are detected before
//! any integration starts; integration failures are reported per shell so that a
//! multi-shell driver can keep the other shells going.
use thiserror::Error;

/// missing or invalid settings in the input file, or an unknown rate-law tag
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ConfigError {
    #[error("missing required setting '{key}' in section [{section}]")]
    MissingKey { section: String, key: String },
    #[error("line {line}: unknown section [{section}]")]
    UnknownSection { line: usize, section: String },
    #[error("line {line}: unknown key '{key}' in section [{section}]")]
    UnknownKey {
        line: usize,
        section: String,
        key: String,
    },
    #[error("line {line}: invalid value '{value}' for '{key}'")]
    InvalidValue {
        line: usize,
        key: String,
        value: String,
    },
    #[error("line {line}: expected 'key = value', got '{text}'")]
    MalformedLine { line: usize, text: String },
    #[error("reaction {reaction_id}: unknown reaction type {tag}")]
    UnknownReactionType { reaction_id: i64, tag: i64 },
}

/// malformed network or source-model records, unresolved species references
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ParseError {
    #[error("{file}:{line}: {message}")]
    MalformedRecord {
        file: String,
        line: usize,
        message: String,
    },
    #[error("species '{0}' is not present in the reaction network")]
    UnknownSpecies(String),
    #[error("reaction {reaction_id}: {message}")]
    InvalidReaction { reaction_id: i64, message: String },
    #[error("duplicate reaction identifier {0}")]
    DuplicateReactionId(i64),
    #[error("{file}: contains no records")]
    Empty { file: String },
    #[error("cannot read chemical formula of '{0}'")]
    InvalidFormula(String),
}

/// a request exceeds one of the configured maxima of [`crate::ShellIVP::solve::SolverLimits`]
#[derive(Debug, Error, Clone, PartialEq)]
#[error("too many {what}: {requested} requested, at most {limit} allowed")]
pub struct CapacityError {
    pub what: &'static str,
    pub requested: usize,
    pub limit: usize,
}

/// the stiff integrator could not meet the tolerance within its budget
#[derive(Debug, Error, Clone, PartialEq)]
pub enum IntegrationError {
    #[error("maximum number of steps ({steps}) reached at t = {t:e}")]
    TooManySteps { steps: usize, t: f64 },
    #[error("step size {h:e} became too small at t = {t:e}")]
    StepSizeTooSmall { h: f64, t: f64 },
    #[error("non-finite derivative encountered at t = {t:e}")]
    NonFinite { t: f64 },
    #[error("singular iteration matrix at t = {t:e}")]
    SingularMatrix { t: f64 },
    #[error("shell {shell}: {source}")]
    InShell {
        shell: usize,
        t_reached: f64,
        #[source]
        source: Box<IntegrationError>,
    },
}

impl IntegrationError {
    /// time at which the integrator gave up
    pub fn time_reached(&self) -> f64 {
        match self {
            IntegrationError::TooManySteps { t, .. }
            | IntegrationError::StepSizeTooSmall { t, .. }
            | IntegrationError::NonFinite { t }
            | IntegrationError::SingularMatrix { t } => *t,
            IntegrationError::InShell { t_reached, .. } => *t_reached,
        }
    }
    pub fn in_shell(self, shell: usize) -> Self {
        let t_reached = self.time_reached();
        IntegrationError::InShell {
            shell,
            t_reached,
            source: Box::new(self),
        }
    }
}

/// inputs that are well formed but not usable: time grids, tolerances, rates
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ValidationError {
    #[error("time grid is empty")]
    EmptyTimeGrid,
    #[error("time grid is not strictly increasing at index {index}")]
    NonIncreasingTimeGrid { index: usize },
    #[error("final time {tf:e} must be greater than initial time {ti:e}")]
    FinalTimeNotAfterInitial { ti: f64, tf: f64 },
    #[error("initial time must be positive, got {0:e}")]
    NonPositiveInitialTime(f64),
    #[error("tolerance '{name}' must be positive and finite, got {value:e}")]
    NonPositiveTolerance { name: &'static str, value: f64 },
    #[error("physical parameter '{name}' is invalid: {value:e}")]
    InvalidPhysicalParameter { name: &'static str, value: f64 },
    #[error("reaction {reaction_id}: rate coefficient {value:e} is negative or not finite")]
    InvalidRateCoefficient { reaction_id: i64, value: f64 },
    #[error("{found} rate coefficients given for {expected} reactions")]
    RateCountMismatch { expected: usize, found: usize },
    #[error("output storage shape does not match the request: {0}")]
    OutputShape(String),
}

/// umbrella error returned by the solver front ends
#[derive(Debug, Error)]
pub enum SolveError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("parse error: {0}")]
    Parse(#[from] ParseError),
    #[error("capacity error: {0}")]
    Capacity(#[from] CapacityError),
    #[error("integration error: {0}")]
    Integration(#[from] IntegrationError),
    #[error("validation error: {0}")]
    Validation(#[from] ValidationError),
    #[error("I/O error on '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

impl SolveError {
    pub fn io(path: impl Into<String>, source: std::io::Error) -> Self {
        SolveError::Io {
            path: path.into(),
            source,
        }
    }
}
