/// Material pattern catalogue. Identifiers are the stable wire names used in
/// cache keys, gallery payloads and statistics histograms.
pub struct PatternInfo {
    pub id: &'static str,
    pub name: &'static str,
    /// Patterns with stochastic material assignment need a reproducibility seed.
    pub seeded: bool,
}

/// Identifier substituted for anything not found in `PATTERN_MAP`.
pub const DEFAULT_PATTERN: &str = "uniform";

pub const PATTERN_MAP: &[PatternInfo] = &[
    PatternInfo {
        id: "uniform",
        name: "uniform host rock",
        seeded: false,
    },
    PatternInfo {
        id: "layered",
        name: "layered sediments",
        seeded: false,
    },
    PatternInfo {
        id: "porphyry",
        name: "porphyry copper",
        seeded: true,
    },
    PatternInfo {
        id: "vein",
        name: "vein system",
        seeded: true,
    },
    PatternInfo {
        id: "disseminated",
        name: "disseminated gold",
        seeded: true,
    },
    PatternInfo {
        id: "skarn",
        name: "contact skarn",
        seeded: true,
    },
    PatternInfo {
        id: "massive_sulphide",
        name: "volcanogenic massive sulphide",
        seeded: true,
    },
    PatternInfo {
        id: "epithermal",
        name: "epithermal gold-silver",
        seeded: true,
    },
    PatternInfo {
        id: "stockwork",
        name: "stockwork",
        seeded: true,
    },
    PatternInfo {
        id: "breccia_pipe",
        name: "breccia pipe",
        seeded: true,
    },
    PatternInfo {
        id: "placer",
        name: "alluvial placer",
        seeded: false,
    },
    PatternInfo {
        id: "kimberlite",
        name: "kimberlite pipe",
        seeded: false,
    },
];

pub fn get_pattern_info(id: &str) -> Option<&'static PatternInfo> {
    PATTERN_MAP.iter().find(|p| p.id == id)
}

pub fn get_pattern_name(id: &str) -> String {
    get_pattern_info(id)
        .map_or("unknown", |p| p.name)
        .to_string()
}
