use AstroKin::Utils::logger::init_logger;
use AstroKin::cli::{Cli, run_checked};
use clap::Parser;
use log::error;
use std::process::ExitCode;

fn main() -> ExitCode {
    let cli = Cli::parse();
    if let Err(e) = init_logger(cli.verbose, cli.quiet, cli.log_file.as_deref()) {
        eprintln!("cannot set up logging: {}", e);
        return ExitCode::FAILURE;
    }
    match run_checked(&cli) {
        Ok(_) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e);
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}
