//! Remote data adapter: the `JudoApi` contract plus HTTP and fixture-backed
//! implementations sharing one set of normalizers.

use async_trait::async_trait;
use thiserror::Error;
use waza_core::{CategoryRef, Competition, JudokaProfile, Match, MatchDetail};

pub mod fixture;
pub mod http;
pub mod normalize;

pub use fixture::FixtureJudoApi;
pub use http::{HttpJudoApi, DEFAULT_API_BASE_URL};
pub use normalize::{
    normalize_categories, normalize_competitions, normalize_competitor, normalize_contest_detail,
    normalize_contests, normalize_gender,
};

pub const CRATE_NAME: &str = "waza-adapters";

/// Contest parts requested for a single match detail.
pub const DETAIL_PARTS: &str = "info,score_list,media,events";

#[derive(Debug, Error)]
pub enum AdapterError {
    #[error("{endpoint} unavailable: {reason}")]
    Unavailable { endpoint: String, reason: String },
    #[error("decoding {endpoint} payload: {source}")]
    Decode {
        endpoint: String,
        #[source]
        source: serde_json::Error,
    },
    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}

/// The four logical operations of the remote API. Absence of data is an
/// empty list or `None`, never an error.
#[async_trait]
pub trait JudoApi: Send + Sync {
    async fn competitions(&self) -> Result<Vec<Competition>, AdapterError>;

    async fn categories(&self, competition_id: i64) -> Result<Vec<CategoryRef>, AdapterError>;

    async fn contests(
        &self,
        competition_id: i64,
        weight_id: &str,
    ) -> Result<Vec<Match>, AdapterError>;

    async fn contest_detail(
        &self,
        competition_id: i64,
        contest_code: &str,
    ) -> Result<Option<MatchDetail>, AdapterError>;

    async fn competitor_info(&self, person_id: &str)
        -> Result<Option<JudokaProfile>, AdapterError>;
}
