/// Every cache entry key starts with this prefix.
pub const CACHE_PREFIX: &str = "blockModelCache_";

pub const STATS_KEY: &str = "blockModelStats";

pub const GALLERY_KEY: &str = "blockModelGallery";

/// Holds `COORDINATE_CONVENTION_VERSION` from the last successful startup.
pub const CONVENTION_KEY: &str = "blockModelCoordinateConvention";
