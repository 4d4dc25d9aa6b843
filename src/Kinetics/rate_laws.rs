//! # Rate laws of the astrochemical reaction catalog
//!
//! Every reaction in a network file carries three parameters (α, β, γ) and an integer
//! reaction-type tag. The tag selects one formula from a closed catalog; the formula is a
//! pure function of the parameters and of the [`PhysicalState`] of the shell.
//!
//! | tag | [`ReactionType`] | formula |
//! |-----|------------------|---------|
//! | 0 | `GasGrain` | α (T/300)^β · x_gr · n_H |
//! | 1 | `CosmicRayIonization` | α ζ |
//! | 2–12 | two-body gas-phase families | α (T/300)^β exp(−γ/T) |
//! | 13 | `Photo` | χ α exp(−γ A_V) |
//! | 14 | `CosmicRayPhoto` | α (ζ/ζ₀) (T/300)^β γ / (1 − ω) |
//! | 20 | `Depletion` | α π a² v_th x_gr n_H |
//! | 21 | `ThermalDesorption` | α ν₀ exp(−γ/T_dust) |
//! | 22 | `CosmicRayDesorption` | α f(70 K) ν₀ exp(−γ/70) ζ/ζ₀ |
//! | 23 | `PhotoDesorption` | α χ F₀ exp(−2 A_V) / N_s |
//!
//! x_gr is the grain number abundance relative to H for the configured grain radius a,
//! v_th = √(8kT/πm) the thermal speed and ν₀ = √(2 N_s E_b/(π² m)) the characteristic
//! vibration frequency of the adsorbed species (E_b = γ k). Units are CGS; rates are in s⁻¹
//! for one-body laws and cm³ s⁻¹ for two-body laws (the solver works in number densities).
use crate::errors::{ConfigError, ValidationError};
use enum_dispatch::enum_dispatch;
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;
use std::fmt;

/// Boltzmann constant, erg/K
pub const BOLTZMANN: f64 = 1.380_649e-16;
/// atomic mass unit, g
pub const AMU: f64 = 1.660_539e-24;
/// proton mass, g
pub const PROTON_MASS: f64 = 1.672_622e-24;
/// dust-to-gas mass ratio
pub const DUST_TO_GAS_MASS_RATIO: f64 = 0.01;
/// grain material density, g/cm³
pub const GRAIN_DENSITY: f64 = 3.0;
/// mean gas mass per hydrogen nucleus in units of the proton mass
pub const MEAN_MASS_PER_H: f64 = 1.4;
/// surface density of adsorption sites, cm⁻²
pub const SITES_DENSITY: f64 = 1.5e15;
/// reference cosmic-ray ionization rate, s⁻¹
pub const ZETA_0: f64 = 1.3e-17;
/// grain albedo in the far ultraviolet
pub const GRAIN_ALBEDO: f64 = 0.6;
/// fraction of time a grain spends near 70 K after a cosmic-ray hit
pub const CR_HEATING_FRACTION: f64 = 3.16e-19;
/// peak grain temperature after a cosmic-ray hit, K
pub const CR_PEAK_TEMPERATURE: f64 = 70.0;
/// interstellar FUV photon flux, photons cm⁻² s⁻¹
pub const ISRF_PHOTON_FLUX: f64 = 1.0e8;

/// global physical parameters shared by all shells
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PhysParams {
    pub chi: f64,
    pub cosmic: f64,
    pub grain_size: f64,
}

impl Default for PhysParams {
    fn default() -> Self {
        Self {
            chi: 1.0,
            cosmic: ZETA_0,
            grain_size: 1e-5,
        }
    }
}

/// one row of the source model
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ShellConditions {
    pub shell: usize,
    pub av: f64,
    pub nh: f64,
    pub tgas: f64,
    pub tdust: f64,
}

/// physical conditions of one shell, constant during its integration
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PhysicalState {
    /// visual extinction, mag
    pub av: f64,
    /// total hydrogen number density, cm⁻³
    pub nh: f64,
    /// gas temperature, K
    pub tgas: f64,
    /// dust temperature, K
    pub tdust: f64,
    /// cosmic-ray ionization rate, s⁻¹
    pub cosmic: f64,
    /// UV field scaling factor (Draine units)
    pub chi: f64,
    /// grain radius, cm
    pub grain_size: f64,
}

impl PhysicalState {
    pub fn new(params: &PhysParams, shell: &ShellConditions) -> Self {
        Self {
            av: shell.av,
            nh: shell.nh,
            tgas: shell.tgas,
            tdust: shell.tdust,
            cosmic: params.cosmic,
            chi: params.chi,
            grain_size: params.grain_size,
        }
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        let positive = [
            ("nh", self.nh),
            ("tgas", self.tgas),
            ("tdust", self.tdust),
            ("grain_size", self.grain_size),
        ];
        for (name, value) in positive {
            if !value.is_finite() || value <= 0.0 {
                return Err(ValidationError::InvalidPhysicalParameter { name, value });
            }
        }
        let non_negative = [("av", self.av), ("cosmic", self.cosmic), ("chi", self.chi)];
        for (name, value) in non_negative {
            if !value.is_finite() || value < 0.0 {
                return Err(ValidationError::InvalidPhysicalParameter { name, value });
            }
        }
        Ok(())
    }

    /// number abundance of grains relative to hydrogen nuclei
    pub fn grain_abundance(&self) -> f64 {
        let grain_mass = 4.0 / 3.0 * PI * self.grain_size.powi(3) * GRAIN_DENSITY;
        DUST_TO_GAS_MASS_RATIO * MEAN_MASS_PER_H * PROTON_MASS / grain_mass
    }
}

/// parameters of one reaction as read from the network
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RateParams {
    pub alpha: f64,
    pub beta: f64,
    pub gamma: f64,
    /// mass of the first reactant in amu; only read by the grain adsorption/desorption laws
    pub mass_amu: f64,
}

impl RateParams {
    pub fn new(alpha: f64, beta: f64, gamma: f64) -> Self {
        Self {
            alpha,
            beta,
            gamma,
            mass_amu: 0.0,
        }
    }
}

#[enum_dispatch]
pub trait RateLaw {
    /// rate coefficient for the given parameters and conditions
    fn coefficient(&self, p: &RateParams, state: &PhysicalState) -> f64;
    /// true when the law reads the reactant mass
    fn needs_mass(&self) -> bool {
        false
    }
}

fn temperature_factor(p: &RateParams, state: &PhysicalState) -> f64 {
    (state.tgas / 300.0).powf(p.beta)
}

fn vibration_frequency(p: &RateParams) -> f64 {
    let mass = p.mass_amu * AMU;
    (2.0 * SITES_DENSITY * p.gamma * BOLTZMANN / (PI * PI * mass)).sqrt()
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GasGrainLaw;
impl RateLaw for GasGrainLaw {
    fn coefficient(&self, p: &RateParams, state: &PhysicalState) -> f64 {
        p.alpha * temperature_factor(p, state) * state.grain_abundance() * state.nh
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CosmicRayLaw;
impl RateLaw for CosmicRayLaw {
    fn coefficient(&self, p: &RateParams, state: &PhysicalState) -> f64 {
        p.alpha * state.cosmic
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ModifiedArrheniusLaw;
impl RateLaw for ModifiedArrheniusLaw {
    fn coefficient(&self, p: &RateParams, state: &PhysicalState) -> f64 {
        p.alpha * temperature_factor(p, state) * (-p.gamma / state.tgas).exp()
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PhotoLaw;
impl RateLaw for PhotoLaw {
    fn coefficient(&self, p: &RateParams, state: &PhysicalState) -> f64 {
        state.chi * p.alpha * (-p.gamma * state.av).exp()
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CosmicRayPhotoLaw;
impl RateLaw for CosmicRayPhotoLaw {
    fn coefficient(&self, p: &RateParams, state: &PhysicalState) -> f64 {
        p.alpha * (state.cosmic / ZETA_0) * temperature_factor(p, state) * p.gamma
            / (1.0 - GRAIN_ALBEDO)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DepletionLaw;
impl RateLaw for DepletionLaw {
    fn coefficient(&self, p: &RateParams, state: &PhysicalState) -> f64 {
        let mass = p.mass_amu * AMU;
        let thermal_speed = (8.0 * BOLTZMANN * state.tgas / (PI * mass)).sqrt();
        p.alpha
            * PI
            * state.grain_size.powi(2)
            * thermal_speed
            * state.grain_abundance()
            * state.nh
    }
    fn needs_mass(&self) -> bool {
        true
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ThermalDesorptionLaw;
impl RateLaw for ThermalDesorptionLaw {
    fn coefficient(&self, p: &RateParams, state: &PhysicalState) -> f64 {
        p.alpha * vibration_frequency(p) * (-p.gamma / state.tdust).exp()
    }
    fn needs_mass(&self) -> bool {
        true
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CosmicRayDesorptionLaw;
impl RateLaw for CosmicRayDesorptionLaw {
    fn coefficient(&self, p: &RateParams, state: &PhysicalState) -> f64 {
        p.alpha
            * CR_HEATING_FRACTION
            * vibration_frequency(p)
            * (-p.gamma / CR_PEAK_TEMPERATURE).exp()
            * (state.cosmic / ZETA_0)
    }
    fn needs_mass(&self) -> bool {
        true
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PhotoDesorptionLaw;
impl RateLaw for PhotoDesorptionLaw {
    fn coefficient(&self, p: &RateParams, state: &PhysicalState) -> f64 {
        p.alpha * state.chi * ISRF_PHOTON_FLUX * (-2.0 * state.av).exp() / SITES_DENSITY
    }
}

/// closed set of rate formulas
#[enum_dispatch(RateLaw)]
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RateFormula {
    GasGrain(GasGrainLaw),
    CosmicRay(CosmicRayLaw),
    ModifiedArrhenius(ModifiedArrheniusLaw),
    Photo(PhotoLaw),
    CosmicRayPhoto(CosmicRayPhotoLaw),
    Depletion(DepletionLaw),
    ThermalDesorption(ThermalDesorptionLaw),
    CosmicRayDesorption(CosmicRayDesorptionLaw),
    PhotoDesorption(PhotoDesorptionLaw),
}

/// reaction-type tags of the network format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ReactionType {
    GasGrain,
    CosmicRayIonization,
    IonMolecule,
    ChargeExchange,
    NegativeIonNeutral,
    RadiativeAssociation,
    AssociativeEjection,
    NeutralNeutralIonization,
    NeutralNeutral,
    NeutralRadiativeAssociation,
    DissociativeRecombination,
    RadiativeRecombination,
    IonIonRecombination,
    Photo,
    CosmicRayPhoto,
    Depletion,
    ThermalDesorption,
    CosmicRayDesorption,
    PhotoDesorption,
}

impl ReactionType {
    pub const ALL: [ReactionType; 19] = [
        ReactionType::GasGrain,
        ReactionType::CosmicRayIonization,
        ReactionType::IonMolecule,
        ReactionType::ChargeExchange,
        ReactionType::NegativeIonNeutral,
        ReactionType::RadiativeAssociation,
        ReactionType::AssociativeEjection,
        ReactionType::NeutralNeutralIonization,
        ReactionType::NeutralNeutral,
        ReactionType::NeutralRadiativeAssociation,
        ReactionType::DissociativeRecombination,
        ReactionType::RadiativeRecombination,
        ReactionType::IonIonRecombination,
        ReactionType::Photo,
        ReactionType::CosmicRayPhoto,
        ReactionType::Depletion,
        ReactionType::ThermalDesorption,
        ReactionType::CosmicRayDesorption,
        ReactionType::PhotoDesorption,
    ];

    pub fn from_tag(tag: i64) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.tag() == tag)
    }

    /// like [`ReactionType::from_tag`] but reports the offending reaction
    pub fn from_network_tag(tag: i64, reaction_id: i64) -> Result<Self, ConfigError> {
        Self::from_tag(tag).ok_or(ConfigError::UnknownReactionType { reaction_id, tag })
    }

    pub fn tag(self) -> i64 {
        match self {
            ReactionType::GasGrain => 0,
            ReactionType::CosmicRayIonization => 1,
            ReactionType::IonMolecule => 2,
            ReactionType::ChargeExchange => 3,
            ReactionType::NegativeIonNeutral => 4,
            ReactionType::RadiativeAssociation => 5,
            ReactionType::AssociativeEjection => 6,
            ReactionType::NeutralNeutralIonization => 7,
            ReactionType::NeutralNeutral => 8,
            ReactionType::NeutralRadiativeAssociation => 9,
            ReactionType::DissociativeRecombination => 10,
            ReactionType::RadiativeRecombination => 11,
            ReactionType::IonIonRecombination => 12,
            ReactionType::Photo => 13,
            ReactionType::CosmicRayPhoto => 14,
            ReactionType::Depletion => 20,
            ReactionType::ThermalDesorption => 21,
            ReactionType::CosmicRayDesorption => 22,
            ReactionType::PhotoDesorption => 23,
        }
    }

    pub fn formula(self) -> RateFormula {
        match self {
            ReactionType::GasGrain => GasGrainLaw.into(),
            ReactionType::CosmicRayIonization => CosmicRayLaw.into(),
            ReactionType::IonMolecule
            | ReactionType::ChargeExchange
            | ReactionType::NegativeIonNeutral
            | ReactionType::RadiativeAssociation
            | ReactionType::AssociativeEjection
            | ReactionType::NeutralNeutralIonization
            | ReactionType::NeutralNeutral
            | ReactionType::NeutralRadiativeAssociation
            | ReactionType::DissociativeRecombination
            | ReactionType::RadiativeRecombination
            | ReactionType::IonIonRecombination => ModifiedArrheniusLaw.into(),
            ReactionType::Photo => PhotoLaw.into(),
            ReactionType::CosmicRayPhoto => CosmicRayPhotoLaw.into(),
            ReactionType::Depletion => DepletionLaw.into(),
            ReactionType::ThermalDesorption => ThermalDesorptionLaw.into(),
            ReactionType::CosmicRayDesorption => CosmicRayDesorptionLaw.into(),
            ReactionType::PhotoDesorption => PhotoDesorptionLaw.into(),
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            ReactionType::GasGrain => "gas-grain interaction",
            ReactionType::CosmicRayIonization => "cosmic-ray ionization",
            ReactionType::IonMolecule => "ion-molecule reaction",
            ReactionType::ChargeExchange => "charge exchange",
            ReactionType::NegativeIonNeutral => "negative ion - neutral reaction",
            ReactionType::RadiativeAssociation => "radiative association",
            ReactionType::AssociativeEjection => "associative ejection",
            ReactionType::NeutralNeutralIonization => "neutral + neutral -> ion + electron",
            ReactionType::NeutralNeutral => "neutral-neutral reaction",
            ReactionType::NeutralRadiativeAssociation => "neutral-neutral radiative association",
            ReactionType::DissociativeRecombination => "dissociative recombination",
            ReactionType::RadiativeRecombination => "radiative recombination",
            ReactionType::IonIonRecombination => "positive ion - negative ion recombination",
            ReactionType::Photo => "photo-ionization / photo-dissociation",
            ReactionType::CosmicRayPhoto => "cosmic-ray induced photo-reaction",
            ReactionType::Depletion => "depletion onto grains",
            ReactionType::ThermalDesorption => "thermal desorption",
            ReactionType::CosmicRayDesorption => "cosmic-ray desorption",
            ReactionType::PhotoDesorption => "photo-desorption",
        }
    }

    /// rate coefficient of this reaction type
    pub fn rate(self, p: &RateParams, state: &PhysicalState) -> f64 {
        self.formula().coefficient(p, state)
    }
}

impl fmt::Display for ReactionType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{} ({})", self.tag(), self.description())
    }
}
