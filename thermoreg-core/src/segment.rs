//! The 16 canonical anatomical segments and the region groups used by the
//! dynamic comfort model.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Number of canonical segments
pub const N_SEGMENTS: usize = 16;
/// Number of thermal compartments per element: core, muscle, fat, skin
pub const N_COMPARTMENTS: usize = 4;

pub const CORE: usize = 0;
pub const MUSCLE: usize = 1;
pub const FAT: usize = 2;
pub const SKIN: usize = 3;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Segment {
    #[serde(rename = "Head")]
    Head,
    #[serde(rename = "Chest")]
    Chest,
    #[serde(rename = "Back")]
    Back,
    #[serde(rename = "Pelvis")]
    Pelvis,
    #[serde(rename = "L-shoulder")]
    LeftShoulder,
    #[serde(rename = "R-shoulder")]
    RightShoulder,
    #[serde(rename = "L-arm")]
    LeftArm,
    #[serde(rename = "R-arm")]
    RightArm,
    #[serde(rename = "L-hand")]
    LeftHand,
    #[serde(rename = "R-hand")]
    RightHand,
    #[serde(rename = "L-thigh")]
    LeftThigh,
    #[serde(rename = "R-thigh")]
    RightThigh,
    #[serde(rename = "L-leg")]
    LeftLeg,
    #[serde(rename = "R-leg")]
    RightLeg,
    #[serde(rename = "L-foot")]
    LeftFoot,
    #[serde(rename = "R-foot")]
    RightFoot,
}

impl Segment {
    /// All segments in table order
    pub const ALL: [Segment; N_SEGMENTS] = [
        Segment::Head,
        Segment::Chest,
        Segment::Back,
        Segment::Pelvis,
        Segment::LeftShoulder,
        Segment::RightShoulder,
        Segment::LeftArm,
        Segment::RightArm,
        Segment::LeftHand,
        Segment::RightHand,
        Segment::LeftThigh,
        Segment::RightThigh,
        Segment::LeftLeg,
        Segment::RightLeg,
        Segment::LeftFoot,
        Segment::RightFoot,
    ];

    /// Row of this segment in every reference table
    pub fn index(self) -> usize {
        self as usize
    }

    pub fn from_index(index: usize) -> Option<Segment> {
        Self::ALL.get(index).copied()
    }

    pub fn label(self) -> &'static str {
        match self {
            Segment::Head => "Head",
            Segment::Chest => "Chest",
            Segment::Back => "Back",
            Segment::Pelvis => "Pelvis",
            Segment::LeftShoulder => "L-shoulder",
            Segment::RightShoulder => "R-shoulder",
            Segment::LeftArm => "L-arm",
            Segment::RightArm => "R-arm",
            Segment::LeftHand => "L-hand",
            Segment::RightHand => "R-hand",
            Segment::LeftThigh => "L-thigh",
            Segment::RightThigh => "R-thigh",
            Segment::LeftLeg => "L-leg",
            Segment::RightLeg => "R-leg",
            Segment::LeftFoot => "L-foot",
            Segment::RightFoot => "R-foot",
        }
    }

    /// Fixed label list, in table order, used to key per-segment output
    pub fn labels() -> Vec<String> {
        Self::ALL.iter().map(|s| s.label().to_string()).collect()
    }

    /// Resolves a segment label or a symmetric name (`Shoulder`, `Arm`, `Hand`,
    /// `Thigh`, `Leg`, `Foot`) to the segments it denotes.
    pub fn resolve(name: &str) -> Option<Vec<Segment>> {
        if let Ok(seg) = name.parse::<Segment>() {
            return Some(vec![seg]);
        }
        let pair = match name {
            "Shoulder" => [Segment::LeftShoulder, Segment::RightShoulder],
            "Arm" => [Segment::LeftArm, Segment::RightArm],
            "Hand" => [Segment::LeftHand, Segment::RightHand],
            "Thigh" => [Segment::LeftThigh, Segment::RightThigh],
            "Leg" => [Segment::LeftLeg, Segment::RightLeg],
            "Foot" => [Segment::LeftFoot, Segment::RightFoot],
            _ => return None,
        };
        Some(pair.to_vec())
    }
}

impl fmt::Display for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for Segment {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .find(|seg| seg.label() == s)
            .copied()
            .ok_or_else(|| anyhow::anyhow!("Unknown segment label {s:?}"))
    }
}

/// Body regions the dynamic sensation model reports on. Left and right
/// segments are pooled; chest and back form one torso region.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ComfortRegion {
    Head,
    Chest,
    LowerArm,
    Hand,
    Thigh,
    LowerLeg,
    Foot,
}

impl ComfortRegion {
    pub const ALL: [ComfortRegion; 7] = [
        ComfortRegion::Head,
        ComfortRegion::Chest,
        ComfortRegion::LowerArm,
        ComfortRegion::Hand,
        ComfortRegion::Thigh,
        ComfortRegion::LowerLeg,
        ComfortRegion::Foot,
    ];

    pub fn segments(self) -> &'static [Segment] {
        match self {
            ComfortRegion::Head => &[Segment::Head],
            ComfortRegion::Chest => &[Segment::Chest, Segment::Back],
            ComfortRegion::LowerArm => &[Segment::LeftArm, Segment::RightArm],
            ComfortRegion::Hand => &[Segment::LeftHand, Segment::RightHand],
            ComfortRegion::Thigh => &[Segment::LeftThigh, Segment::RightThigh],
            ComfortRegion::LowerLeg => &[Segment::LeftLeg, Segment::RightLeg],
            ComfortRegion::Foot => &[Segment::LeftFoot, Segment::RightFoot],
        }
    }
}
