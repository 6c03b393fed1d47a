//! Clothing resistance models: per-segment convective heat transfer and
//! vapour transfer values as a function of air velocity.

use crate::imports::*;
use std::collections::BTreeMap;

/// Latent heat of evaporation of water \[J/kg\]
const LATENT_HEAT: f64 = 2257e3;
/// Radiative coefficient of black radiators at room temperature \[W/(m²·°C)\]
const H_R_ROOM: f64 = 5.0;
/// Thermal conductivity of still air in a clothing gap \[W/(m·°C)\]
const K_AIR: f64 = 24e-3;
/// Air-layer evaporative resistance coefficients \[m²·kPa/W\], \[m\]
const REA_A: f64 = 0.0334;
const REA_B: f64 = 15e-3;

/// Serves the exchange coefficients a thermal model needs per segment
pub trait ClothingResistance {
    /// Convective heat transfer value for `segment`
    fn heat_transfer_coefficient(&self, segment: Segment, air_velocity: f64) -> f64;
    /// Vapour transfer value for `segment`
    fn vapour_transfer_coefficient(&self, segment: Segment, air_velocity: f64) -> f64;
}

/// Values of bare skin: `(vapour, heat)`
pub fn nude_coefficients(air_velocity: f64) -> (f64, f64) {
    let root = (0.11 + air_velocity.max(0.0)).sqrt();
    let vapour = LATENT_HEAT / (2430e3 / 0.1353 * root);
    let heat = H_R_ROOM + 8.3 * root;
    (vapour, heat)
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Default)]
pub struct NudeClothing;

impl ClothingResistance for NudeClothing {
    fn heat_transfer_coefficient(&self, _segment: Segment, air_velocity: f64) -> f64 {
        nude_coefficients(air_velocity).1
    }

    fn vapour_transfer_coefficient(&self, _segment: Segment, air_velocity: f64) -> f64 {
        nude_coefficients(air_velocity).0
    }
}

/// One fabric layer. The first layer of a segment stands for the skin
/// boundary and only its thickness is used.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, ApproxEq)]
pub struct ClothingLayer {
    /// \[m\]
    pub thickness: f64,
    /// intrinsic thermal value of the fabric
    pub thermal: f64,
    /// intrinsic evaporative value of the fabric
    pub evaporative: f64,
}

/// Layered ensemble keyed by segment label or symmetric name (`Arm` covers
/// both arms). Segments without layers are bare.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, ApproxEq)]
pub struct ClothingEnsemble {
    #[serde(default)]
    pub name: String,
    pub layers: BTreeMap<String, Vec<ClothingLayer>>,
    /// torso/limb breadth per segment \[m\]; standard anatomy when absent
    #[serde(default)]
    pub anatomy_breadth: Option<BTreeMap<String, f64>>,
}

impl SerdeAPI for ClothingEnsemble {
    fn init(&mut self) -> anyhow::Result<()> {
        self.validate()
    }
}

/// Standard anatomy breadths \[m\]
pub fn standard_breadth(segment: Segment) -> f64 {
    match segment {
        Segment::Head => 0.142,
        Segment::Chest | Segment::Back => 0.167,
        Segment::Pelvis => 0.147,
        Segment::LeftShoulder | Segment::RightShoulder => 0.117,
        Segment::LeftArm | Segment::RightArm => 0.112,
        Segment::LeftHand => 0.052,
        Segment::RightHand => 0.0524,
        Segment::LeftThigh => 0.120,
        Segment::RightThigh => 0.118,
        Segment::LeftLeg | Segment::RightLeg => 0.082,
        Segment::LeftFoot | Segment::RightFoot => 0.078,
    }
}

impl ClothingEnsemble {
    pub fn validate(&self) -> anyhow::Result<()> {
        for (key, layers) in &self.layers {
            ensure!(
                Segment::resolve(key).is_some(),
                config_err!("clothing ensemble {:?}: unknown segment {key:?}", self.name)
            );
            for layer in layers.iter().skip(1) {
                ensure!(
                    layer.thickness > 0.0 && layer.thermal >= 0.0 && layer.evaporative >= 0.0,
                    config_err!(
                        "clothing ensemble {:?}, {key}: layers need positive thickness and non-negative values",
                        self.name
                    )
                );
            }
            ensure!(
                layers.first().map_or(true, |l| l.thickness >= 0.0),
                config_err!("clothing ensemble {:?}, {key}: negative skin layer thickness", self.name)
            );
        }
        if let Some(breadth) = &self.anatomy_breadth {
            for (key, value) in breadth {
                ensure!(
                    Segment::resolve(key).is_some() && *value > 0.0,
                    config_err!("invalid anatomy breadth {key:?}: {value}")
                );
            }
        }
        Ok(())
    }

    /// Layers covering `segment`; an exact label wins over a symmetric name
    fn layers_for(&self, segment: Segment) -> Option<&[ClothingLayer]> {
        self.layers
            .get(segment.label())
            .or_else(|| {
                self.layers.iter().find_map(|(key, layers)| {
                    Segment::resolve(key)
                        .filter(|segs| segs.len() > 1 && segs.contains(&segment))
                        .map(|_| layers)
                })
            })
            .map(|layers| layers.as_slice())
            .filter(|layers| !layers.is_empty())
    }

    fn breadth(&self, segment: Segment) -> f64 {
        self.anatomy_breadth
            .as_ref()
            .and_then(|b| b.get(segment.label()))
            .copied()
            .unwrap_or_else(|| standard_breadth(segment))
    }

    /// Accumulates the layer stack outward from the skin; `gap` gives the
    /// contribution of the air gap under layer `i`
    fn combine(
        &self,
        segment: Segment,
        layers: &[ClothingLayer],
        base: f64,
        intrinsic: impl Fn(&ClothingLayer) -> f64,
        gap: impl Fn(f64) -> f64,
    ) -> f64 {
        let breadth = self.breadth(segment);
        let radius: Vec<f64> = layers
            .iter()
            .scan(0.0, |acc, layer| {
                *acc += layer.thickness + breadth;
                Some(*acc)
            })
            .collect();
        let mut total = base;
        for i in 1..layers.len() {
            total += gap(layers[i].thickness) * radius[0] / radius[i - 1]
                + intrinsic(&layers[i]) * radius[0] / radius[i];
        }
        total
    }
}

impl ClothingResistance for ClothingEnsemble {
    fn heat_transfer_coefficient(&self, segment: Segment, air_velocity: f64) -> f64 {
        let (_, nude) = nude_coefficients(air_velocity);
        match self.layers_for(segment) {
            Some(layers) => self.combine(
                segment,
                layers,
                nude,
                |l| l.thermal,
                |thickness| 1.0 / (H_R_ROOM + K_AIR / thickness),
            ),
            None => nude,
        }
    }

    fn vapour_transfer_coefficient(&self, segment: Segment, air_velocity: f64) -> f64 {
        let (nude, _) = nude_coefficients(air_velocity);
        match self.layers_for(segment) {
            Some(layers) => self.combine(
                segment,
                layers,
                nude,
                |l| l.evaporative,
                |thickness| REA_A * (1.0 - (-thickness / REA_B).exp()),
            ),
            None => nude,
        }
    }
}

/// Clothing choice of an activity
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClothingModel {
    #[default]
    Nude,
    Ensemble(ClothingEnsemble),
    /// ensemble bundled with the crate, e.g. `clothing/summer_ensemble.yaml`
    Resource { path: String },
}

impl ClothingModel {
    /// Resolves bundled resources into an ensemble
    pub fn load(&self) -> anyhow::Result<ClothingModel> {
        match self {
            #[cfg(feature = "resources")]
            Self::Resource { path } => Ok(Self::Ensemble(
                ClothingEnsemble::from_resource(path)
                    .with_context(|| format_dbg!(path))?,
            )),
            #[cfg(not(feature = "resources"))]
            Self::Resource { path } => bail!(config_err!(
                "clothing resource {path:?} requested without the `resources` feature"
            )),
            other => Ok(other.clone()),
        }
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        match self {
            Self::Ensemble(e) => e.validate(),
            _ => Ok(()),
        }
    }
}

impl ClothingResistance for ClothingModel {
    fn heat_transfer_coefficient(&self, segment: Segment, air_velocity: f64) -> f64 {
        match self {
            Self::Ensemble(e) => e.heat_transfer_coefficient(segment, air_velocity),
            _ => NudeClothing.heat_transfer_coefficient(segment, air_velocity),
        }
    }

    fn vapour_transfer_coefficient(&self, segment: Segment, air_velocity: f64) -> f64 {
        match self {
            Self::Ensemble(e) => e.vapour_transfer_coefficient(segment, air_velocity),
            _ => NudeClothing.vapour_transfer_coefficient(segment, air_velocity),
        }
    }
}
