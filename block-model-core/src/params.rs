/// Grid parameters: validated lattice definition and material pattern.
use crate::error::ValidationError;
use constants::limits::{MAX_CELL_COUNT, MAX_CELL_SIZE, MAX_TOTAL_CELLS, MIN_CELL_COUNT};
use constants::pattern::{DEFAULT_PATTERN, get_pattern_info};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Vec3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Vec3 {
    pub const fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    pub fn to_array(self) -> [f64; 3] {
        [self.x, self.y, self.z]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CellCounts {
    pub x: u32,
    pub y: u32,
    pub z: u32,
}

impl CellCounts {
    pub const fn new(x: u32, y: u32, z: u32) -> Self {
        Self { x, y, z }
    }

    pub fn total(&self) -> u64 {
        self.x as u64 * self.y as u64 * self.z as u64
    }
}

/// One of the catalogue patterns in `constants::pattern::PATTERN_MAP`.
///
/// Parsing never fails: unrecognised identifiers collapse to the default
/// pattern so stale payloads still regenerate something sensible.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct PatternId(&'static str);

impl PatternId {
    pub fn parse(id: &str) -> Self {
        match get_pattern_info(id) {
            Some(info) => Self(info.id),
            None => {
                log::warn!("Unknown pattern '{}', using '{}'", id, DEFAULT_PATTERN);
                Self(DEFAULT_PATTERN)
            }
        }
    }

    pub fn as_str(&self) -> &'static str {
        self.0
    }

    /// Whether material assignment for this pattern draws random numbers.
    pub fn is_seeded(&self) -> bool {
        get_pattern_info(self.0).is_some_and(|p| p.seeded)
    }
}

impl Default for PatternId {
    fn default() -> Self {
        Self(DEFAULT_PATTERN)
    }
}

impl fmt::Debug for PatternId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PatternId({})", self.0)
    }
}

impl fmt::Display for PatternId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0)
    }
}

impl Serialize for PatternId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.0)
    }
}

impl<'de> Deserialize<'de> for PatternId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(Self::parse(&raw))
    }
}

/// Lattice definition. Construction validates every field, so a value of this
/// type is always safe to generate from.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawGridParameters")]
pub struct GridParameters {
    origin: Vec3,
    cell_size: Vec3,
    counts: CellCounts,
    pattern: PatternId,
}

/// Untrusted wire form of `GridParameters`.
#[derive(Deserialize)]
struct RawGridParameters {
    origin: Vec3,
    cell_size: Vec3,
    counts: CellCounts,
    #[serde(default)]
    pattern: PatternId,
}

impl TryFrom<RawGridParameters> for GridParameters {
    type Error = ValidationError;

    fn try_from(raw: RawGridParameters) -> Result<Self, Self::Error> {
        GridParameters::new(raw.origin, raw.cell_size, raw.counts, raw.pattern)
    }
}

impl GridParameters {
    pub fn new(
        origin: Vec3,
        cell_size: Vec3,
        counts: CellCounts,
        pattern: PatternId,
    ) -> Result<Self, ValidationError> {
        for (field, value) in [
            ("origin.x", origin.x),
            ("origin.y", origin.y),
            ("origin.z", origin.z),
            ("cell_size.x", cell_size.x),
            ("cell_size.y", cell_size.y),
            ("cell_size.z", cell_size.z),
        ] {
            if !value.is_finite() {
                return Err(ValidationError::NonFinite { field, value });
            }
        }

        for (axis, value) in [('x', cell_size.x), ('y', cell_size.y), ('z', cell_size.z)] {
            if value <= 0.0 || value > MAX_CELL_SIZE {
                return Err(ValidationError::CellSizeOutOfRange {
                    axis,
                    value,
                    max: MAX_CELL_SIZE,
                });
            }
        }

        for (axis, value) in [('x', counts.x), ('y', counts.y), ('z', counts.z)] {
            if !(MIN_CELL_COUNT..=MAX_CELL_COUNT).contains(&value) {
                return Err(ValidationError::CellCountOutOfRange {
                    axis,
                    value,
                    min: MIN_CELL_COUNT,
                    max: MAX_CELL_COUNT,
                });
            }
        }

        let total = counts.total();
        if total > MAX_TOTAL_CELLS {
            return Err(ValidationError::TooManyCells {
                total,
                max: MAX_TOTAL_CELLS,
            });
        }

        Ok(Self {
            origin,
            cell_size,
            counts,
            pattern,
        })
    }

    pub fn origin(&self) -> Vec3 {
        self.origin
    }

    pub fn cell_size(&self) -> Vec3 {
        self.cell_size
    }

    pub fn counts(&self) -> CellCounts {
        self.counts
    }

    pub fn pattern(&self) -> PatternId {
        self.pattern
    }

    pub fn total_cells(&self) -> u64 {
        self.counts.total()
    }

    pub fn cell_volume(&self) -> f64 {
        self.cell_size.x * self.cell_size.y * self.cell_size.z
    }
}
