//! Module to calculate the atomic composition, charge and mass of an astrochemical species name
//!
//! Species names follow the network-file convention: element symbols with optional
//! counts, an optional parenthesised group with a multiplier (`CH3(CH2)2OH`),
//! and trailing markers for charge or phase: `HCO(+)`, `e(-)`, `He(++)`, `CO(ice)`.
use crate::errors::ParseError;
use nalgebra::DMatrix;
use std::collections::{BTreeMap, HashSet};

/// mass of the electron in atomic mass units
pub const ELECTRON_MASS_AMU: f64 = 5.485_799e-4;

// Define a struct to hold element data
pub struct Element {
    name: &'static str,
    atomic_mass: f64,
}

// elements that appear in interstellar and circumstellar networks
const ELEMENTS: &[Element] = &[
    Element {
        name: "H",
        atomic_mass: 1.008,
    },
    Element {
        name: "D",
        atomic_mass: 2.014,
    },
    Element {
        name: "He",
        atomic_mass: 4.0026,
    },
    Element {
        name: "C",
        atomic_mass: 12.011,
    },
    Element {
        name: "N",
        atomic_mass: 14.007,
    },
    Element {
        name: "O",
        atomic_mass: 15.999,
    },
    Element {
        name: "F",
        atomic_mass: 18.998,
    },
    Element {
        name: "Na",
        atomic_mass: 22.99,
    },
    Element {
        name: "Mg",
        atomic_mass: 24.305,
    },
    Element {
        name: "Al",
        atomic_mass: 26.98,
    },
    Element {
        name: "Si",
        atomic_mass: 28.085,
    },
    Element {
        name: "P",
        atomic_mass: 30.974,
    },
    Element {
        name: "S",
        atomic_mass: 32.065,
    },
    Element {
        name: "Cl",
        atomic_mass: 35.45,
    },
    Element {
        name: "Ar",
        atomic_mass: 39.948,
    },
    Element {
        name: "K",
        atomic_mass: 39.102,
    },
    Element {
        name: "Ca",
        atomic_mass: 40.08,
    },
    Element {
        name: "Ti",
        atomic_mass: 47.867,
    },
    Element {
        name: "Fe",
        atomic_mass: 55.845,
    },
    Element {
        name: "Ni",
        atomic_mass: 58.69,
    },
];

fn atomic_mass(symbol: &str) -> Option<f64> {
    ELEMENTS
        .iter()
        .find(|e| e.name == symbol)
        .map(|e| e.atomic_mass)
}

/// elemental composition, charge and mass of one species
#[derive(Debug, Clone, PartialEq)]
pub struct SpeciesComposition {
    pub elements: BTreeMap<String, usize>,
    /// net charge in units of the elementary charge
    pub charge: i32,
    /// mass in atomic mass units, electrons included
    pub mass_amu: f64,
}

/// strips trailing `(+)`, `(-)`, `(++)` and phase markers like `(ice)`, returning the bare formula and the charge
fn strip_markers(name: &str) -> (String, i32) {
    let mut formula = name.trim().to_string();
    let mut charge = 0;
    loop {
        let Some(open) = formula.rfind('(') else {
            break;
        };
        if !formula.ends_with(')') {
            break;
        }
        let marker = &formula[open + 1..formula.len() - 1];
        if !marker.is_empty() && marker.chars().all(|c| c == '+') {
            charge += marker.len() as i32;
        } else if !marker.is_empty() && marker.chars().all(|c| c == '-') {
            charge -= marker.len() as i32;
        } else if !matches!(marker, "ice" | "gr" | "s" | "g") {
            // a real group such as (CH2)2 ends with a digit, not with ')'
            break;
        }
        formula.truncate(open);
    }
    (formula, charge)
}

/// reads element symbols and counts; one level of parenthesised groups is allowed
fn parse_bare_formula(formula: &str, name: &str) -> Result<BTreeMap<String, usize>, ParseError> {
    let chars: Vec<char> = formula.chars().collect();
    let mut counts: BTreeMap<String, usize> = BTreeMap::new();
    // group contents collected until the closing bracket, then multiplied
    let mut group: Option<BTreeMap<String, usize>> = None;
    let mut i = 0;
    let read_number = |i: &mut usize| -> usize {
        let start = *i;
        while *i < chars.len() && chars[*i].is_ascii_digit() {
            *i += 1;
        }
        if start == *i {
            1
        } else {
            chars[start..*i]
                .iter()
                .collect::<String>()
                .parse()
                .unwrap_or(1)
        }
    };
    while i < chars.len() {
        let c = chars[i];
        if c == '(' {
            if group.is_some() {
                return Err(ParseError::InvalidFormula(name.to_string()));
            }
            group = Some(BTreeMap::new());
            i += 1;
            continue;
        }
        if c == ')' {
            let inner = group
                .take()
                .ok_or_else(|| ParseError::InvalidFormula(name.to_string()))?;
            i += 1;
            let multiplier = read_number(&mut i);
            for (element, n) in inner {
                *counts.entry(element).or_insert(0) += n * multiplier;
            }
            continue;
        }
        if !c.is_ascii_uppercase() {
            return Err(ParseError::InvalidFormula(name.to_string()));
        }
        // a lowercase letter always belongs to the preceding capital: "CO" is carbon + oxygen, "Co" is rejected
        let mut symbol = c.to_string();
        if i + 1 < chars.len() && chars[i + 1].is_ascii_lowercase() {
            let two: String = [c, chars[i + 1]].iter().collect();
            if atomic_mass(&two).is_some() {
                symbol = two;
                i += 1;
            } else {
                return Err(ParseError::InvalidFormula(name.to_string()));
            }
        }
        i += 1;
        if atomic_mass(&symbol).is_none() {
            return Err(ParseError::InvalidFormula(name.to_string()));
        }
        let n = read_number(&mut i);
        let target = group.as_mut().unwrap_or(&mut counts);
        *target.entry(symbol).or_insert(0) += n;
    }
    if group.is_some() {
        return Err(ParseError::InvalidFormula(name.to_string()));
    }
    Ok(counts)
}

/// Function to parse a species name and return its elements, charge and mass
pub fn parse_species(name: &str) -> Result<SpeciesComposition, ParseError> {
    let (formula, charge) = strip_markers(name);
    if formula == "e" && charge == -1 {
        return Ok(SpeciesComposition {
            elements: BTreeMap::new(),
            charge,
            mass_amu: ELECTRON_MASS_AMU,
        });
    }
    if formula.is_empty() {
        return Err(ParseError::InvalidFormula(name.to_string()));
    }
    let elements = parse_bare_formula(&formula, name)?;
    let mut mass_amu = 0.0;
    for (element, count) in elements.iter() {
        // present by construction
        mass_amu += atomic_mass(element).unwrap_or(0.0) * *count as f64;
    }
    mass_amu -= charge as f64 * ELECTRON_MASS_AMU;
    Ok(SpeciesComposition {
        elements,
        charge,
        mass_amu,
    })
}

/// mass of a species in atomic mass units
pub fn species_mass(name: &str) -> Result<f64, ParseError> {
    Ok(parse_species(name)?.mass_amu)
}

/// matrix of element counts (species × elements) plus the element names, and the charge vector;
/// a closed network conserves `Aᵀ n` and `qᵀ n`
pub fn create_elem_composition_matrix(
    species: &[&str],
) -> Result<(DMatrix<f64>, Vec<String>, Vec<i32>), ParseError> {
    let mut compositions = Vec::with_capacity(species.len());
    let mut seen: HashSet<String> = HashSet::new();
    let mut elements: Vec<String> = Vec::new();
    for name in species {
        let comp = parse_species(name)?;
        for element in comp.elements.keys() {
            if seen.insert(element.clone()) {
                elements.push(element.clone());
            }
        }
        compositions.push(comp);
    }
    let mut matrix = DMatrix::zeros(species.len(), elements.len());
    let mut charges = Vec::with_capacity(species.len());
    for (i, comp) in compositions.iter().enumerate() {
        for (j, element) in elements.iter().enumerate() {
            if let Some(count) = comp.elements.get(element) {
                matrix[(i, j)] = *count as f64;
            }
        }
        charges.push(comp.charge);
    }
    Ok((matrix, elements, charges))
}
