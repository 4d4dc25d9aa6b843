use log::LevelFilter;
use simplelog::{
    ColorChoice, CombinedLogger, Config, ConfigBuilder, SharedLogger, TermLogger, TerminalMode,
    WriteLogger,
};
use std::fs::File;
use std::path::Path;

/// `-q` keeps errors only; each `-v` opens one more level starting from warnings
pub fn level_filter(verbosity: u8, quiet: bool) -> LevelFilter {
    if quiet {
        return LevelFilter::Error;
    }
    match verbosity {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        2 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    }
}

/// file sink: never quieter than `Info`, with thread ids since shells run in parallel
pub fn file_logger(path: &Path, level: LevelFilter) -> std::io::Result<Box<WriteLogger<File>>> {
    let file = File::create(path)?;
    let config = ConfigBuilder::new()
        .set_thread_level(LevelFilter::Error)
        .build();
    Ok(WriteLogger::new(level.max(LevelFilter::Info), config, file))
}

/// installs the global logger of the binary: terminal, plus a file when `log_file` is given
pub fn init_logger(
    verbosity: u8,
    quiet: bool,
    log_file: Option<&Path>,
) -> Result<(), Box<dyn std::error::Error>> {
    let level = level_filter(verbosity, quiet);
    let mut loggers: Vec<Box<dyn SharedLogger>> = vec![TermLogger::new(
        level,
        Config::default(),
        TerminalMode::Stderr,
        ColorChoice::Auto,
    )];
    if let Some(path) = log_file {
        loggers.push(file_logger(path, level)?);
    }
    CombinedLogger::init(loggers)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use log::{Level, Log, Record};
    use tempfile::tempdir;

    #[test]
    fn test_levels() {
        assert_eq!(level_filter(0, false), LevelFilter::Warn);
        assert_eq!(level_filter(1, false), LevelFilter::Info);
        assert_eq!(level_filter(2, false), LevelFilter::Debug);
        assert_eq!(level_filter(7, false), LevelFilter::Trace);
        assert_eq!(level_filter(3, true), LevelFilter::Error);
    }

    #[test]
    fn test_file_logger_writes_records() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("run.log");
        let logger = file_logger(&path, LevelFilter::Warn).unwrap();
        logger.log(
            &Record::builder()
                .args(format_args!("shell 3 done"))
                .level(Level::Info)
                .target("AstroKin")
                .build(),
        );
        logger.log(
            &Record::builder()
                .args(format_args!("jacobian refreshed"))
                .level(Level::Debug)
                .target("AstroKin")
                .build(),
        );
        logger.flush();
        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.contains("shell 3 done"));
        assert!(!text.contains("jacobian refreshed"));
    }

    #[test]
    fn test_bad_log_path() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("missing").join("run.log");
        assert!(file_logger(&path, LevelFilter::Info).is_err());
    }
}
