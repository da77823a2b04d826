//! Utility types a bill or responsibility setting can refer to

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::AllocationError;

/// Kind of metered or flat-rate service billed to a property
///
/// Variants are declared alphabetically by their display name so the derived
/// ordering matches a plain string sort.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum UtilityType {
    Cable,
    Electric,
    Gas,
    #[serde(rename = "HOA")]
    Hoa,
    Internet,
    Other,
    Sewer,
    Trash,
    Water,
}

impl UtilityType {
    pub const ALL: [UtilityType; 9] = [
        UtilityType::Cable,
        UtilityType::Electric,
        UtilityType::Gas,
        UtilityType::Hoa,
        UtilityType::Internet,
        UtilityType::Other,
        UtilityType::Sewer,
        UtilityType::Trash,
        UtilityType::Water,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            UtilityType::Cable => "Cable",
            UtilityType::Electric => "Electric",
            UtilityType::Gas => "Gas",
            UtilityType::Hoa => "HOA",
            UtilityType::Internet => "Internet",
            UtilityType::Other => "Other",
            UtilityType::Sewer => "Sewer",
            UtilityType::Trash => "Trash",
            UtilityType::Water => "Water",
        }
    }
}

impl fmt::Display for UtilityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for UtilityType {
    type Err = AllocationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        UtilityType::ALL
            .into_iter()
            .find(|t| t.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| AllocationError::validation(format!("Unknown utility type: {}", s)))
    }
}
