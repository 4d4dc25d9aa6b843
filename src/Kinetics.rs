/// Reaction network of an astrochemical model: species table built from the reactions,
/// reactions resolved to species indices, rate coefficients for a given physical state
///
///  # Examples
/// ```
/// use AstroKin::Kinetics::network::{ReactionNetwork, ReactionRecord};
/// let record = ReactionRecord {
///     reactants: vec!["H3(+)".to_string(), "CO".to_string()],
///     products: vec!["HCO(+)".to_string(), "H2".to_string()],
///     alpha: 1.7e-9,
///     beta: 0.0,
///     gamma: 0.0,
///     tag: 2,
///     id: 1,
/// };
/// let network = ReactionNetwork::from_records(vec![record]).unwrap();
/// assert_eq!(network.species_names(), vec!["H3(+)", "CO", "HCO(+)", "H2"]);
/// ```
pub mod network;
/// Closed catalog of astrochemical rate laws selected by the reaction-type tag of the network file:
/// modified Arrhenius two-body reactions, cosmic-ray and photo processes, gas-grain interactions,
/// depletion onto grains and the desorption mechanisms
pub mod rate_laws;
/// Module to calculate the atomic composition, charge and mass of a species name
///
///  # Examples
/// ```
/// use AstroKin::Kinetics::species_mass::{parse_species, species_mass};
/// let hco = parse_species("HCO(+)").unwrap();
/// assert_eq!(hco.charge, 1);
/// let m = species_mass("CH3OH").unwrap();
/// assert!((m - 32.04).abs() < 0.01);
/// ```
pub mod species_mass;
