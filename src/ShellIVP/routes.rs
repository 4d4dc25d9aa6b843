//! Formation and destruction routes: the reactions contributing most to the change of a
//! species abundance at a given state.
use crate::Kinetics::network::{OutputSpec, ReactionNetwork};
use crate::ShellIVP::chem_system::ChemSystem;
use nalgebra::DVector;
use serde::{Deserialize, Serialize};

/// contribution of one reaction; positive for formation, negative for destruction (cm⁻³ s⁻¹)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Route {
    pub reaction_id: i64,
    pub rate: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SpeciesRoutes {
    pub formation: Vec<Route>,
    pub destruction: Vec<Route>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RouteTracer {
    max_routes: usize,
}

impl RouteTracer {
    pub fn new(max_routes: usize) -> Self {
        Self { max_routes }
    }

    pub fn max_routes(&self) -> usize {
        self.max_routes
    }

    /// top routes of species `index` given the flux of every reaction
    pub fn trace(&self, network: &ReactionNetwork, fluxes: &[f64], index: usize) -> SpeciesRoutes {
        let mut formation = Vec::new();
        let mut destruction = Vec::new();
        for (reaction, &flux) in network.reactions().iter().zip(fluxes) {
            let produced = reaction.product_multiplicity(index);
            if produced > 0 {
                let rate = flux * produced as f64;
                if rate != 0.0 {
                    formation.push(Route {
                        reaction_id: reaction.id,
                        rate,
                    });
                }
            }
            let consumed = reaction.reactant_multiplicity(index);
            if consumed > 0 {
                let rate = -flux * consumed as f64;
                if rate != 0.0 {
                    destruction.push(Route {
                        reaction_id: reaction.id,
                        rate,
                    });
                }
            }
        }
        SpeciesRoutes {
            formation: self.rank(formation),
            destruction: self.rank(destruction),
        }
    }

    /// routes of every output species at the densities `n`
    pub fn trace_all(
        &self,
        system: &ChemSystem,
        n: &DVector<f64>,
        output: &OutputSpec,
    ) -> Vec<SpeciesRoutes> {
        let fluxes = system.fluxes(n);
        output
            .indices
            .iter()
            .map(|&index| self.trace(system.network(), &fluxes, index))
            .collect()
    }

    fn rank(&self, mut routes: Vec<Route>) -> Vec<Route> {
        routes.sort_by(|a, b| {
            b.rate
                .abs()
                .total_cmp(&a.rate.abs())
                .then(a.reaction_id.cmp(&b.reaction_id))
        });
        routes.truncate(self.max_routes);
        routes
    }
}
