#[allow(non_snake_case)]
pub mod Kinetics;
#[allow(non_snake_case)]
pub mod ShellIVP;
#[allow(non_snake_case)]
pub mod Utils;
pub mod cli;
pub mod driver;
pub mod errors;
