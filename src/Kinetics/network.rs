//! # Reaction network
//!
//! Immutable collection of reactions and of the species they reference. The network is
//! built once per run from the records of the network file and then shared read-only by
//! every shell.
//!
//! Species receive a dense index in order of first appearance (reactants before products,
//! left to right, reaction by reaction). The markers `cosmic-ray`, `uv-photon` and `photon`
//! only document the process and are not species: they have no index, no concentration and
//! contribute neither to the concentration product nor to the product stoichiometry.
use crate::Kinetics::rate_laws::{PhysicalState, RateLaw, RateParams, ReactionType};
use crate::Kinetics::species_mass::{
    create_elem_composition_matrix, parse_species, species_mass,
};
use crate::errors::{ParseError, SolveError, ValidationError};
use log::{debug, info, warn};
use nalgebra::DMatrix;
use prettytable::{Cell, Row, Table};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;

/// names that may appear in reactions but are not species
pub const PSEUDO_SPECIES: [&str; 3] = ["cosmic-ray", "uv-photon", "photon"];
pub const MAX_REACTANTS: usize = 3;
pub const MAX_PRODUCTS: usize = 4;

pub fn is_pseudo_species(name: &str) -> bool {
    PSEUDO_SPECIES.contains(&name)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Species {
    pub name: String,
    pub index: usize,
}

/// one reaction as read from the network file, before species resolution
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReactionRecord {
    pub reactants: Vec<String>,
    pub products: Vec<String>,
    pub alpha: f64,
    pub beta: f64,
    pub gamma: f64,
    pub tag: i64,
    pub id: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reaction {
    pub id: i64,
    /// reactant names as written, markers included
    pub reactants: Vec<String>,
    /// product names as written, markers included
    pub products: Vec<String>,
    pub alpha: f64,
    pub beta: f64,
    pub gamma: f64,
    pub reaction_type: ReactionType,
    /// species index of every real reactant occurrence
    pub reactant_indices: Vec<usize>,
    /// species index of every real product occurrence
    pub product_indices: Vec<usize>,
    /// mass of the first real reactant (amu), set only for laws that need it
    pub mass_amu: f64,
}

impl Reaction {
    pub fn params(&self) -> RateParams {
        RateParams {
            alpha: self.alpha,
            beta: self.beta,
            gamma: self.gamma,
            mass_amu: self.mass_amu,
        }
    }

    pub fn equation(&self) -> String {
        format!(
            "{} -> {}",
            self.reactants.join(" + "),
            self.products.join(" + ")
        )
    }

    /// how many times species `index` is consumed by this reaction
    pub fn reactant_multiplicity(&self, index: usize) -> usize {
        self.reactant_indices.iter().filter(|&&i| i == index).count()
    }

    /// how many times species `index` is produced by this reaction
    pub fn product_multiplicity(&self, index: usize) -> usize {
        self.product_indices.iter().filter(|&&i| i == index).count()
    }
}

impl fmt::Display for Reaction {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{:>6}  {}", self.id, self.equation())
    }
}

/// output species resolved against the network
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputSpec {
    pub names: Vec<String>,
    pub indices: Vec<usize>,
}

impl OutputSpec {
    pub fn resolve(network: &ReactionNetwork, names: &[String]) -> Result<Self, ParseError> {
        let indices = network.resolve_names(names)?;
        Ok(Self {
            names: names.to_vec(),
            indices,
        })
    }

    pub fn len(&self) -> usize {
        self.indices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReactionNetwork {
    species: Vec<Species>,
    index_of: HashMap<String, usize>,
    reactions: Vec<Reaction>,
}

impl ReactionNetwork {
    /// builds the species table and resolves every reaction
    pub fn from_records(records: Vec<ReactionRecord>) -> Result<Self, SolveError> {
        let mut network = ReactionNetwork::default();
        let mut seen_ids: HashSet<i64> = HashSet::new();
        for record in records {
            if !seen_ids.insert(record.id) {
                return Err(ParseError::DuplicateReactionId(record.id).into());
            }
            let reaction = network.resolve_record(record)?;
            network.reactions.push(reaction);
        }
        info!(
            "reaction network: {} reactions, {} species",
            network.reactions.len(),
            network.species.len()
        );
        Ok(network)
    }

    fn resolve_record(&mut self, record: ReactionRecord) -> Result<Reaction, SolveError> {
        let invalid = |message: String| ParseError::InvalidReaction {
            reaction_id: record.id,
            message,
        };
        if record.reactants.is_empty() || record.reactants.len() > MAX_REACTANTS {
            return Err(invalid(format!(
                "{} reactants, expected 1 to {}",
                record.reactants.len(),
                MAX_REACTANTS
            ))
            .into());
        }
        if record.products.is_empty() || record.products.len() > MAX_PRODUCTS {
            return Err(invalid(format!(
                "{} products, expected 1 to {}",
                record.products.len(),
                MAX_PRODUCTS
            ))
            .into());
        }
        for (name, value) in [
            ("alpha", record.alpha),
            ("beta", record.beta),
            ("gamma", record.gamma),
        ] {
            if !value.is_finite() {
                return Err(invalid(format!("{} is not finite", name)).into());
            }
        }
        let reaction_type = ReactionType::from_network_tag(record.tag, record.id)?;

        let reactant_indices: Vec<usize> = record
            .reactants
            .iter()
            .filter(|name| !is_pseudo_species(name))
            .map(|name| self.intern(name))
            .collect();
        let product_indices: Vec<usize> = record
            .products
            .iter()
            .filter(|name| !is_pseudo_species(name))
            .map(|name| self.intern(name))
            .collect();

        let mut mass_amu = 0.0;
        if reaction_type.formula().needs_mass() {
            let first = reactant_indices.first().ok_or_else(|| {
                invalid(format!(
                    "reaction type {} needs a real reactant",
                    reaction_type.tag()
                ))
            })?;
            mass_amu = species_mass(&self.species[*first].name)?;
        }

        Ok(Reaction {
            id: record.id,
            reactants: record.reactants,
            products: record.products,
            alpha: record.alpha,
            beta: record.beta,
            gamma: record.gamma,
            reaction_type,
            reactant_indices,
            product_indices,
            mass_amu,
        })
    }

    fn intern(&mut self, name: &str) -> usize {
        if let Some(&index) = self.index_of.get(name) {
            return index;
        }
        let index = self.species.len();
        self.species.push(Species {
            name: name.to_string(),
            index,
        });
        self.index_of.insert(name.to_string(), index);
        index
    }

    pub fn species(&self) -> &[Species] {
        &self.species
    }

    pub fn n_species(&self) -> usize {
        self.species.len()
    }

    pub fn reactions(&self) -> &[Reaction] {
        &self.reactions
    }

    pub fn n_reactions(&self) -> usize {
        self.reactions.len()
    }

    pub fn species_index(&self, name: &str) -> Option<usize> {
        self.index_of.get(name).copied()
    }

    pub fn species_name(&self, index: usize) -> Option<&str> {
        self.species.get(index).map(|s| s.name.as_str())
    }

    pub fn species_names(&self) -> Vec<&str> {
        self.species.iter().map(|s| s.name.as_str()).collect()
    }

    pub fn resolve_names(&self, names: &[String]) -> Result<Vec<usize>, ParseError> {
        names
            .iter()
            .map(|name| {
                self.species_index(name)
                    .ok_or_else(|| ParseError::UnknownSpecies(name.clone()))
            })
            .collect()
    }

    /// rate coefficient of every reaction, in network order
    pub fn rate_coefficients(&self, state: &PhysicalState) -> Result<Vec<f64>, ValidationError> {
        let mut rates = Vec::with_capacity(self.reactions.len());
        for reaction in &self.reactions {
            let k = reaction
                .reaction_type
                .formula()
                .coefficient(&reaction.params(), state);
            if !k.is_finite() || k < 0.0 {
                return Err(ValidationError::InvalidRateCoefficient {
                    reaction_id: reaction.id,
                    value: k,
                });
            }
            rates.push(k);
        }
        debug!("computed {} rate coefficients", rates.len());
        Ok(rates)
    }

    /// element composition matrix (species × elements), element names and species charges
    pub fn element_matrix(&self) -> Result<(DMatrix<f64>, Vec<String>, Vec<i32>), ParseError> {
        create_elem_composition_matrix(&self.species_names())
    }

    /// identifiers of reactions whose sides differ in elements or charge;
    /// reactions with species names that cannot be read as formulas are skipped
    pub fn unbalanced_reactions(&self) -> Vec<i64> {
        let side = |indices: &[usize]| -> Option<(BTreeMap<String, usize>, i32)> {
            let mut elements = BTreeMap::new();
            let mut charge = 0;
            for &i in indices {
                let comp = parse_species(&self.species[i].name).ok()?;
                for (element, n) in comp.elements {
                    *elements.entry(element).or_insert(0) += n;
                }
                charge += comp.charge;
            }
            Some((elements, charge))
        };
        let mut unbalanced = Vec::new();
        for reaction in &self.reactions {
            // grain interactions exchange charge and matter with the implicit grain
            if reaction.reaction_type == ReactionType::GasGrain {
                continue;
            }
            let (Some(left), Some(right)) = (
                side(&reaction.reactant_indices),
                side(&reaction.product_indices),
            ) else {
                continue;
            };
            if left != right {
                warn!("reaction {} is not balanced", reaction);
                unbalanced.push(reaction.id);
            }
        }
        unbalanced
    }

    pub fn pretty_print(&self) {
        let mut table = Table::new();
        table.add_row(Row::new(vec![
            Cell::new("id"),
            Cell::new("reaction"),
            Cell::new("type"),
            Cell::new("alpha"),
            Cell::new("beta"),
            Cell::new("gamma"),
        ]));
        for r in &self.reactions {
            table.add_row(Row::new(vec![
                Cell::new(&r.id.to_string()),
                Cell::new(&r.equation()),
                Cell::new(r.reaction_type.description()),
                Cell::new(&format!("{:.3e}", r.alpha)),
                Cell::new(&format!("{:.3}", r.beta)),
                Cell::new(&format!("{:.3}", r.gamma)),
            ]));
        }
        table.printstd();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ConfigError;
    use approx::assert_relative_eq;

    fn record(reactants: &[&str], products: &[&str], alpha: f64, tag: i64, id: i64) -> ReactionRecord {
        ReactionRecord {
            reactants: reactants.iter().map(|s| s.to_string()).collect(),
            products: products.iter().map(|s| s.to_string()).collect(),
            alpha,
            beta: 0.0,
            gamma: 0.0,
            tag,
            id,
        }
    }

    fn small_network() -> ReactionNetwork {
        ReactionNetwork::from_records(vec![
            record(&["H2", "cosmic-ray"], &["H2(+)", "e(-)"], 0.97, 1, 1),
            record(&["H2(+)", "H2"], &["H3(+)", "H"], 2.08e-9, 2, 2),
            record(&["H3(+)", "CO"], &["HCO(+)", "H2"], 1.7e-9, 2, 3),
            record(&["HCO(+)", "e(-)"], &["CO", "H"], 2.4e-7, 10, 4),
            record(&["CO", "uv-photon"], &["C", "O"], 2.0e-10, 13, 5),
        ])
        .unwrap()
    }

    #[test]
    fn test_species_by_first_appearance() {
        let net = small_network();
        assert_eq!(
            net.species_names(),
            vec!["H2", "H2(+)", "e(-)", "H3(+)", "H", "CO", "HCO(+)", "C", "O"]
        );
        for (i, s) in net.species().iter().enumerate() {
            assert_eq!(s.index, i);
        }
        assert_eq!(net.species_index("cosmic-ray"), None);
        assert_eq!(net.species_index("uv-photon"), None);
    }

    #[test]
    fn test_markers_are_skipped() {
        let net = small_network();
        let r = &net.reactions()[0];
        assert_eq!(r.reactants.len(), 2);
        assert_eq!(r.reactant_indices, vec![0]);
        assert_eq!(r.product_indices, vec![1, 2]);
        assert_eq!(r.equation(), "H2 + cosmic-ray -> H2(+) + e(-)");
    }

    #[test]
    fn test_multiplicity() {
        let net = ReactionNetwork::from_records(vec![record(&["H", "H"], &["H2"], 1e-17, 8, 7)]).unwrap();
        let r = &net.reactions()[0];
        assert_eq!(r.reactant_multiplicity(0), 2);
        assert_eq!(r.product_multiplicity(1), 1);
        assert_eq!(r.product_multiplicity(0), 0);
    }

    #[test]
    fn test_unknown_tag_and_duplicate_id() {
        let err = ReactionNetwork::from_records(vec![record(&["A"], &["B"], 1.0, 17, 9)]).unwrap_err();
        assert!(matches!(
            err,
            SolveError::Config(ConfigError::UnknownReactionType { reaction_id: 9, tag: 17 })
        ));
        let err = ReactionNetwork::from_records(vec![
            record(&["A"], &["B"], 1.0, 2, 1),
            record(&["B"], &["A"], 1.0, 2, 1),
        ])
        .unwrap_err();
        assert!(matches!(err, SolveError::Parse(ParseError::DuplicateReactionId(1))));
    }

    #[test]
    fn test_side_limits() {
        let err = ReactionNetwork::from_records(vec![record(
            &["A"],
            &["B", "C", "D", "E", "F"],
            1.0,
            2,
            1,
        )])
        .unwrap_err();
        assert!(matches!(
            err,
            SolveError::Parse(ParseError::InvalidReaction { reaction_id: 1, .. })
        ));
        let err =
            ReactionNetwork::from_records(vec![record(&["A", "B", "C", "D"], &["E"], 1.0, 2, 2)])
                .unwrap_err();
        assert!(matches!(err, SolveError::Parse(_)));
    }

    #[test]
    fn test_resolve_output_species() {
        let net = small_network();
        let spec = OutputSpec::resolve(&net, &["CO".to_string(), "HCO(+)".to_string()]).unwrap();
        assert_eq!(spec.indices, vec![5, 6]);
        let err = OutputSpec::resolve(&net, &["CH4".to_string()]).unwrap_err();
        assert_eq!(err, ParseError::UnknownSpecies("CH4".to_string()));
    }

    #[test]
    fn test_rate_coefficients_and_mass() {
        let mut records = vec![record(&["CO"], &["CO(ice)"], 1.0, 20, 1)];
        let mut desorption = record(&["CO(ice)"], &["CO"], 1.0, 21, 2);
        // binding energy, K
        desorption.gamma = 855.0;
        records.push(desorption);
        let net = ReactionNetwork::from_records(records).unwrap();
        assert_relative_eq!(net.reactions()[0].mass_amu, 28.01, epsilon = 1e-2);
        let state = PhysicalState {
            av: 10.0,
            nh: 1e4,
            tgas: 10.0,
            tdust: 10.0,
            cosmic: 1.3e-17,
            chi: 1.0,
            grain_size: 1e-5,
        };
        let rates = net.rate_coefficients(&state).unwrap();
        assert_eq!(rates.len(), 2);
        assert!(rates.iter().all(|k| *k > 0.0));
    }

    #[test]
    fn test_negative_rate_rejected() {
        let net = ReactionNetwork::from_records(vec![record(&["A"], &["B"], -1.0, 2, 11)]).unwrap();
        let state = PhysicalState {
            av: 1.0,
            nh: 1e4,
            tgas: 10.0,
            tdust: 10.0,
            cosmic: 1.3e-17,
            chi: 1.0,
            grain_size: 1e-5,
        };
        let err = net.rate_coefficients(&state).unwrap_err();
        assert_eq!(
            err,
            ValidationError::InvalidRateCoefficient {
                reaction_id: 11,
                value: -1.0
            }
        );
    }

    #[test]
    fn test_balance_check() {
        let net = small_network();
        assert!(net.unbalanced_reactions().is_empty());
        let net = ReactionNetwork::from_records(vec![record(&["CO"], &["C"], 1.0, 2, 3)]).unwrap();
        assert_eq!(net.unbalanced_reactions(), vec![3]);
        let (matrix, elements, _) = small_network().element_matrix().unwrap();
        assert_eq!(matrix.nrows(), 9);
        assert_eq!(elements, vec!["H", "C", "O"]);
    }
}
