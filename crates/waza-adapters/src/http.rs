//! HTTP-backed [`JudoApi`]. Transport and decoding failures are logged and
//! reported as "no data".

use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use tracing::{debug, warn};
use waza_core::{CategoryRef, Competition, JudokaProfile, Match, MatchDetail};
use waza_storage::{HttpFetcher, PayloadArchive};

use crate::normalize::{
    normalize_categories, normalize_competitions, normalize_competitor, normalize_contest_detail,
    normalize_contests,
};
use crate::{AdapterError, JudoApi, DETAIL_PARTS};

pub const DEFAULT_API_BASE_URL: &str = "https://data.ijf.org/api/get_json";

#[derive(Debug, Clone)]
pub struct HttpJudoApi {
    http: HttpFetcher,
    base_url: String,
    archive: Option<PayloadArchive>,
}

impl HttpJudoApi {
    pub fn new(http: HttpFetcher, base_url: impl Into<String>) -> Self {
        Self {
            http,
            base_url: base_url.into(),
            archive: None,
        }
    }

    /// Keeps every distinct body fetched for each resource.
    pub fn with_archive(mut self, archive: PayloadArchive) -> Self {
        self.archive = Some(archive);
        self
    }

    pub fn query_for(action: &str, params: &[(&str, String)]) -> Vec<(String, String)> {
        std::iter::once(("params[action]".to_string(), action.to_string()))
            .chain(
                params
                    .iter()
                    .map(|(key, value)| (format!("params[{key}]"), value.clone())),
            )
            .collect()
    }

    /// `resource` names what was asked for; it keys the archive only.
    async fn get_json(
        &self,
        action: &str,
        resource: &str,
        params: &[(&str, String)],
    ) -> Option<Value> {
        let query = Self::query_for(action, params);
        let response = match self.http.fetch_bytes(action, &self.base_url, &query).await {
            Ok(response) => response,
            Err(err) => {
                warn!(action, error = %err, "remote request failed");
                return None;
            }
        };

        if let Some(archive) = &self.archive {
            if let Err(err) = archive.archive(action, resource, &response.body).await {
                warn!(action, resource, error = %err, "archiving payload failed");
            }
        }

        match serde_json::from_slice::<Value>(&response.body) {
            Ok(value) => {
                debug!(action, bytes = response.body.len(), "payload decoded");
                Some(value)
            }
            Err(err) => {
                warn!(action, error = %err, "payload is not valid json");
                None
            }
        }
    }
}

#[async_trait]
impl JudoApi for HttpJudoApi {
    async fn competitions(&self) -> Result<Vec<Competition>, AdapterError> {
        Ok(self
            .get_json("competition.get_list", "all", &[])
            .await
            .map(|payload| normalize_competitions(&payload))
            .unwrap_or_default())
    }

    async fn categories(&self, competition_id: i64) -> Result<Vec<CategoryRef>, AdapterError> {
        Ok(self
            .get_json(
                "competition.categories_full",
                &competition_id.to_string(),
                &[("id_competition", competition_id.to_string())],
            )
            .await
            .map(|payload| normalize_categories(&payload))
            .unwrap_or_default())
    }

    async fn contests(
        &self,
        competition_id: i64,
        weight_id: &str,
    ) -> Result<Vec<Match>, AdapterError> {
        Ok(self
            .get_json(
                "contest.find",
                &format!("{competition_id}-{weight_id}"),
                &[
                    ("id_competition", competition_id.to_string()),
                    ("id_weight", weight_id.to_string()),
                    ("order_by", "cnum".to_string()),
                ],
            )
            .await
            .map(|payload| normalize_contests(&payload))
            .unwrap_or_default())
    }

    async fn contest_detail(
        &self,
        competition_id: i64,
        contest_code: &str,
    ) -> Result<Option<MatchDetail>, AdapterError> {
        Ok(self
            .get_json(
                "contest.find",
                contest_code,
                &[
                    ("contest_code", contest_code.to_string()),
                    ("part", DETAIL_PARTS.to_string()),
                ],
            )
            .await
            .and_then(|payload| normalize_contest_detail(&payload, competition_id)))
    }

    async fn competitor_info(
        &self,
        person_id: &str,
    ) -> Result<Option<JudokaProfile>, AdapterError> {
        Ok(self
            .get_json(
                "competitor.info",
                person_id,
                &[("id_person", person_id.to_string())],
            )
            .await
            .and_then(|payload| normalize_competitor(person_id, &payload, Utc::now())))
    }
}
