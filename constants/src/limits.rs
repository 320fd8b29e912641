/// Cells generated per cooperative scheduling step.
pub const CHUNK_SIZE: usize = 10_000;

/// Models at or above this size are memoized in the cache.
pub const LARGE_MODEL_THRESHOLD: u64 = 50_000;

/// Hard ceiling on `count_x * count_y * count_z`.
pub const MAX_TOTAL_CELLS: u64 = 100_000_000;

/// Models below this size are generated in a single pass.
pub const SYNC_GENERATION_LIMIT: u64 = 500_000;

/// Upper bound (inclusive) on a single cell edge.
pub const MAX_CELL_SIZE: f64 = 10_000.0;

/// Per-axis cell count bounds (inclusive).
pub const MIN_CELL_COUNT: u32 = 1;
pub const MAX_CELL_COUNT: u32 = 1_000;

/// Soft budget for one serialized cache entry.
pub const CACHE_MAX_PAYLOAD_BYTES: usize = 8 * 1024 * 1024;

pub const CACHE_FRESHNESS_MS: i64 = 24 * 60 * 60 * 1000;
pub const CACHE_RETENTION_MS: i64 = 7 * 24 * 60 * 60 * 1000;

pub const GALLERY_CAP: usize = 50;
pub const GALLERY_NAME_MAX_LEN: usize = 100;

/// Fraction of `GALLERY_CAP` kept when a gallery write hits the storage quota.
pub const GALLERY_QUOTA_RETRY_NUMERATOR: usize = 4;
pub const GALLERY_QUOTA_RETRY_DENOMINATOR: usize = 5;

/// Serialized export text larger than this is refused.
pub const EXPORT_MAX_TEXT_BYTES: usize = 500 * 1024 * 1024;

/// Deflate level for export archives. Favours speed over ratio.
pub const EXPORT_COMPRESSION_LEVEL: i64 = 6;
