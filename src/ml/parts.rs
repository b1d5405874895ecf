//! Body part catalogue
//!
//! The 24 regions the BodyPix part model labels, in model output order.

use serde::{Deserialize, Serialize};

/// Number of parts the segmentation model distinguishes
pub const NUM_PARTS: usize = 24;

/// A body region produced by the part segmentation model
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BodyPart {
    LeftFace,
    RightFace,
    LeftUpperArmFront,
    LeftUpperArmBack,
    RightUpperArmFront,
    RightUpperArmBack,
    LeftLowerArmFront,
    LeftLowerArmBack,
    RightLowerArmFront,
    RightLowerArmBack,
    LeftHand,
    RightHand,
    TorsoFront,
    TorsoBack,
    LeftUpperLegFront,
    LeftUpperLegBack,
    RightUpperLegFront,
    RightUpperLegBack,
    LeftLowerLegFront,
    LeftLowerLegBack,
    RightLowerLegFront,
    RightLowerLegBack,
    LeftFeet,
    RightFeet,
}

impl BodyPart {
    /// All parts, indexed by their model label
    pub const ALL: [BodyPart; NUM_PARTS] = [
        BodyPart::LeftFace,
        BodyPart::RightFace,
        BodyPart::LeftUpperArmFront,
        BodyPart::LeftUpperArmBack,
        BodyPart::RightUpperArmFront,
        BodyPart::RightUpperArmBack,
        BodyPart::LeftLowerArmFront,
        BodyPart::LeftLowerArmBack,
        BodyPart::RightLowerArmFront,
        BodyPart::RightLowerArmBack,
        BodyPart::LeftHand,
        BodyPart::RightHand,
        BodyPart::TorsoFront,
        BodyPart::TorsoBack,
        BodyPart::LeftUpperLegFront,
        BodyPart::LeftUpperLegBack,
        BodyPart::RightUpperLegFront,
        BodyPart::RightUpperLegBack,
        BodyPart::LeftLowerLegFront,
        BodyPart::LeftLowerLegBack,
        BodyPart::RightLowerLegFront,
        BodyPart::RightLowerLegBack,
        BodyPart::LeftFeet,
        BodyPart::RightFeet,
    ];

    /// Look up a part by its model label
    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }

    /// Model label of this part
    pub fn index(self) -> usize {
        self as usize
    }

    /// Snake-case name, matching the config file spelling
    pub fn name(self) -> &'static str {
        match self {
            BodyPart::LeftFace => "left_face",
            BodyPart::RightFace => "right_face",
            BodyPart::LeftUpperArmFront => "left_upper_arm_front",
            BodyPart::LeftUpperArmBack => "left_upper_arm_back",
            BodyPart::RightUpperArmFront => "right_upper_arm_front",
            BodyPart::RightUpperArmBack => "right_upper_arm_back",
            BodyPart::LeftLowerArmFront => "left_lower_arm_front",
            BodyPart::LeftLowerArmBack => "left_lower_arm_back",
            BodyPart::RightLowerArmFront => "right_lower_arm_front",
            BodyPart::RightLowerArmBack => "right_lower_arm_back",
            BodyPart::LeftHand => "left_hand",
            BodyPart::RightHand => "right_hand",
            BodyPart::TorsoFront => "torso_front",
            BodyPart::TorsoBack => "torso_back",
            BodyPart::LeftUpperLegFront => "left_upper_leg_front",
            BodyPart::LeftUpperLegBack => "left_upper_leg_back",
            BodyPart::RightUpperLegFront => "right_upper_leg_front",
            BodyPart::RightUpperLegBack => "right_upper_leg_back",
            BodyPart::LeftLowerLegFront => "left_lower_leg_front",
            BodyPart::LeftLowerLegBack => "left_lower_leg_back",
            BodyPart::RightLowerLegFront => "right_lower_leg_front",
            BodyPart::RightLowerLegBack => "right_lower_leg_back",
            BodyPart::LeftFeet => "left_feet",
            BodyPart::RightFeet => "right_feet",
        }
    }

    /// Parse a snake-case part name
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|part| part.name() == name)
    }
}

impl std::fmt::Display for BodyPart {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}
