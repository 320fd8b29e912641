/// Lattice cell records.
use serde::{Deserialize, Serialize};

/// Rock name the pattern engine assigns to empty cells.
pub const AIR: &str = "air";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CellIndex {
    pub i: u32,
    pub j: u32,
    pub k: u32,
}

/// Material properties assigned by the pattern engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Material {
    pub rock: String,
    pub density: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub zone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cu_grade: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub au_grade: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<f64>,
}

impl Material {
    pub fn rock(rock: impl Into<String>, density: f64) -> Self {
        Self {
            rock: rock.into(),
            density,
            zone: None,
            cu_grade: None,
            au_grade: None,
            value: None,
        }
    }

    pub fn air() -> Self {
        Self::rock(AIR, 0.0)
    }

    pub fn is_air(&self) -> bool {
        self.rock == AIR
    }
}

/// One lattice cell. Skeletons straight out of the grid builder carry no
/// material.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Block {
    pub position: [f64; 3],
    pub index: CellIndex,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub material: Option<Material>,
}

impl Block {
    pub fn skeleton(position: [f64; 3], index: CellIndex) -> Self {
        Self {
            position,
            index,
            material: None,
        }
    }

    /// Cells without material, or explicitly marked as air, are empty space.
    pub fn is_air(&self) -> bool {
        self.material.as_ref().is_none_or(Material::is_air)
    }
}
