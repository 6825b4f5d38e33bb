//! Structured logging schema and field name constants for tandem.
//!
//! All crates use these names for structured `tracing` fields so log
//! aggregation can query aggregation runs and queries uniformly.
//!
//! ## Log Level Contract
//!
//! | Level | Usage |
//! |-------|-------|
//! | ERROR | A rollback itself failed; the store needs operator attention |
//! | WARN  | A category failed during a batch run, other categories continued |
//! | INFO  | Batch run and pruning completions |
//! | DEBUG | Decision points (material change checks, per-category edge counts) |
//! | TRACE | Per-row iteration |

// ─── Identity fields ───────────────────────────────────────────────────────

/// Subsystem originating the log event.
/// Values: "aggregator", "recommender", "ratings", "retention", "database", "config"
pub const SUBSYSTEM: &str = "subsystem";

/// Component within a subsystem.
/// Examples: "pool", "links", "retention", "recommender"
pub const COMPONENT: &str = "component";

/// Logical operation name.
/// Examples: "rebuild_category", "adjust_incremental", "prune"
pub const OPERATION: &str = "op";

// ─── Entity fields ─────────────────────────────────────────────────────────

/// Category partition being operated on.
pub const CATEGORY_ID: &str = "category_id";

/// Member id of a rating.
pub const MEMBER_ID: &str = "member_id";

/// Product id of a rating or link source.
pub const PRODUCT_ID: &str = "product_id";

/// Aggregation mode ("links", "slope").
pub const LINK_MODE: &str = "mode";

// ─── Measurement fields ────────────────────────────────────────────────────

/// Wall-clock duration in milliseconds.
pub const DURATION_MS: &str = "duration_ms";

/// Number of results returned by a query.
pub const RESULT_COUNT: &str = "result_count";

/// Number of links written for a category or source item.
pub const LINK_COUNT: &str = "link_count";

/// Number of ratings read or deleted.
pub const RATING_COUNT: &str = "rating_count";

// ─── Outcome fields ────────────────────────────────────────────────────────

/// Boolean success/failure indicator.
pub const SUCCESS: &str = "success";

/// Error message when an operation fails.
pub const ERROR_MSG: &str = "error";

/// Every field name above, for log pipelines that whitelist fields.
pub const ALL_FIELDS: &[&str] = &[
    SUBSYSTEM,
    COMPONENT,
    OPERATION,
    CATEGORY_ID,
    MEMBER_ID,
    PRODUCT_ID,
    LINK_MODE,
    DURATION_MS,
    RESULT_COUNT,
    LINK_COUNT,
    RATING_COUNT,
    SUCCESS,
    ERROR_MSG,
];
