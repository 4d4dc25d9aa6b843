/// reading the input file, the source model and the reaction network
pub mod load_from_file;
/// logger setup for the command line tool
pub mod logger;
/// abundance and route files, JSON dump and summary table
pub mod write_results;
