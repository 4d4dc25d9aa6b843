//! # Shell Initial Value Problem (IVP) Module
//!
//! Time-dependent chemistry of one astrophysical shell: a gas parcel with constant density,
//! temperatures, extinction, cosmic-ray ionization rate and UV field.
//!
//! ## Mathematical Model
//!
//! For species i with number density n_i (cm⁻³):
//!
//! ```text
//! dn_i/dt = Σ_r (ν⁺_ir − ν⁻_ir) k_r Π_j n_j^{ν⁻_jr}
//! ```
//!
//! where ν⁻ and ν⁺ count the occurrences of a species among the reactants and the products of
//! reaction r, and k_r is given by the rate law of the reaction type. The initial densities are
//! n_i(0) = x_i(0) · n_H; results are reported as fractional abundances x_i = n_i / n_H.
//!
//! The system is stiff (rate coefficients span tens of orders of magnitude), so it is advanced
//! by a variable-order BDF method with an analytic Jacobian.
//!
//! ## Module Structure
//!
//! - [`chem_system`]: right-hand side, fluxes, analytic and finite-difference Jacobians
//! - [`bdf`]: variable-order, variable-step BDF integrator
//! - [`routes`]: ranking of formation and destruction routes
//! - [`time_grid`]: logarithmic output times
//! - [`solve`]: per-shell solve writing into caller-owned output storage
pub mod bdf;
pub mod chem_system;
pub mod routes;
pub mod solve;
pub mod time_grid;
