//! Persistence, HTTP fetch utilities and the read-side aggregate engine for waza.

pub mod archive;
pub mod cache;
pub mod db;
pub mod fetch;
pub mod judoka;
pub mod query;
pub mod stats;

pub use archive::{ArchivedPayload, PayloadArchive};
pub use cache::{CacheConfig, CacheKey, CacheStats, Clock, ManualClock, ResultCache, SystemClock};
pub use db::Database;
pub use fetch::{
    classify_reqwest_error, classify_status, BackoffPolicy, FetchError, FetchedResponse,
    HttpClientConfig, HttpFetcher, RetryDisposition,
};
pub use judoka::{JudokaStats, JudokaStatsService, MatchRef, Perspective, WazaBreakdown};
pub use query::{BindValue, Join, TechniqueQuery, WALKOVER_MARKERS};
pub use stats::{
    height_buckets, CompetitionSummary, FilterOptions, HeightBucket, Overview, ScoreGroupCount,
    ScoreGroupTop, StatsService, TechniqueCount, TechniqueStats,
};

pub const CRATE_NAME: &str = "waza-storage";

/// Default location of the embedded database.
pub const DEFAULT_DATABASE_URL: &str = "sqlite://waza.db";

pub fn database_url_from_env() -> String {
    std::env::var("DATABASE_URL").unwrap_or_else(|_| DEFAULT_DATABASE_URL.to_string())
}
