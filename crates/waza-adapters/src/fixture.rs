//! Offline [`JudoApi`] serving recorded payloads from disk or memory.
//!
//! Layout under the fixture root:
//! `competitions.json`, `categories/<cid>.json`, `contests/<cid>-<wid>.json`,
//! `details/<code>.json`, `competitors/<pid>.json`. Missing files mean
//! "no data", exactly like an empty remote response.

use std::collections::{BTreeSet, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};

use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use waza_core::{CategoryRef, Competition, JudokaProfile, Match, MatchDetail};

use crate::normalize::{
    normalize_categories, normalize_competitions, normalize_competitor, normalize_contest_detail,
    normalize_contests,
};
use crate::{AdapterError, JudoApi};

#[derive(Debug, Default)]
pub struct FixtureJudoApi {
    root: Option<PathBuf>,
    payloads: HashMap<String, Value>,
    failing_competitions: BTreeSet<i64>,
    fetched_at: Option<DateTime<Utc>>,
    detail_requests: AtomicUsize,
    profile_requests: AtomicUsize,
}

impl FixtureJudoApi {
    pub fn from_dir(root: impl Into<PathBuf>) -> Self {
        Self {
            root: Some(root.into()),
            ..Self::default()
        }
    }

    pub fn in_memory() -> Self {
        Self::default()
    }

    pub fn with_competitions(self, payload: Value) -> Self {
        self.with_payload("competitions", payload)
    }

    pub fn with_categories(self, competition_id: i64, payload: Value) -> Self {
        self.with_payload(format!("categories/{competition_id}"), payload)
    }

    pub fn with_contests(self, competition_id: i64, weight_id: &str, payload: Value) -> Self {
        self.with_payload(format!("contests/{competition_id}-{weight_id}"), payload)
    }

    pub fn with_detail(self, contest_code: &str, payload: Value) -> Self {
        self.with_payload(format!("details/{contest_code}"), payload)
    }

    pub fn with_competitor(self, person_id: &str, payload: Value) -> Self {
        self.with_payload(format!("competitors/{person_id}"), payload)
    }

    /// In-memory payloads take precedence over files under the root.
    pub fn with_payload(mut self, key: impl Into<String>, payload: Value) -> Self {
        self.payloads.insert(key.into(), payload);
        self
    }

    /// Every category or contest request for `competition_id` fails.
    pub fn failing_competition(mut self, competition_id: i64) -> Self {
        self.failing_competitions.insert(competition_id);
        self
    }

    /// Pins the `last_updated` stamp of returned profiles.
    pub fn with_fetched_at(mut self, fetched_at: DateTime<Utc>) -> Self {
        self.fetched_at = Some(fetched_at);
        self
    }

    pub fn detail_requests(&self) -> usize {
        self.detail_requests.load(Ordering::Relaxed)
    }

    pub fn profile_requests(&self) -> usize {
        self.profile_requests.load(Ordering::Relaxed)
    }

    fn load(&self, key: &str) -> Result<Option<Value>, AdapterError> {
        if let Some(value) = self.payloads.get(key) {
            return Ok(Some(value.clone()));
        }
        let Some(root) = &self.root else {
            return Ok(None);
        };
        let path = root.join(format!("{key}.json"));
        if !path.exists() {
            return Ok(None);
        }
        read_json_file(&path).map(Some)
    }

    fn check_competition(&self, competition_id: i64, endpoint: &str) -> Result<(), AdapterError> {
        if self.failing_competitions.contains(&competition_id) {
            return Err(AdapterError::Unavailable {
                endpoint: endpoint.to_string(),
                reason: format!("injected failure for competition {competition_id}"),
            });
        }
        Ok(())
    }
}

fn read_json_file(path: &Path) -> Result<Value, AdapterError> {
    let data = fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_str(&data).map_err(|source| AdapterError::Decode {
        endpoint: path.display().to_string(),
        source,
    })
}

#[async_trait]
impl JudoApi for FixtureJudoApi {
    async fn competitions(&self) -> Result<Vec<Competition>, AdapterError> {
        Ok(self
            .load("competitions")?
            .map(|payload| normalize_competitions(&payload))
            .unwrap_or_default())
    }

    async fn categories(&self, competition_id: i64) -> Result<Vec<CategoryRef>, AdapterError> {
        self.check_competition(competition_id, "competition.categories_full")?;
        Ok(self
            .load(&format!("categories/{competition_id}"))?
            .map(|payload| normalize_categories(&payload))
            .unwrap_or_default())
    }

    async fn contests(
        &self,
        competition_id: i64,
        weight_id: &str,
    ) -> Result<Vec<Match>, AdapterError> {
        self.check_competition(competition_id, "contest.find")?;
        Ok(self
            .load(&format!("contests/{competition_id}-{weight_id}"))?
            .map(|payload| normalize_contests(&payload))
            .unwrap_or_default())
    }

    async fn contest_detail(
        &self,
        competition_id: i64,
        contest_code: &str,
    ) -> Result<Option<MatchDetail>, AdapterError> {
        self.detail_requests.fetch_add(1, Ordering::Relaxed);
        Ok(self
            .load(&format!("details/{contest_code}"))?
            .and_then(|payload| normalize_contest_detail(&payload, competition_id)))
    }

    async fn competitor_info(
        &self,
        person_id: &str,
    ) -> Result<Option<JudokaProfile>, AdapterError> {
        self.profile_requests.fetch_add(1, Ordering::Relaxed);
        let fetched_at = self.fetched_at.unwrap_or_else(Utc::now);
        Ok(self
            .load(&format!("competitors/{person_id}"))?
            .and_then(|payload| normalize_competitor(person_id, &payload, fetched_at)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::tempdir;

    #[tokio::test]
    async fn memory_payloads_override_files() {
        let dir = tempdir().expect("tempdir");
        fs::write(
            dir.path().join("competitions.json"),
            r#"[{"id": 1, "name": "From disk"}]"#,
        )
        .expect("write");

        let disk = FixtureJudoApi::from_dir(dir.path());
        assert_eq!(disk.competitions().await.expect("disk")[0].name, "From disk");

        let overridden = FixtureJudoApi::from_dir(dir.path())
            .with_competitions(json!([{"id": 2, "name": "From memory"}]));
        assert_eq!(
            overridden.competitions().await.expect("memory")[0].name,
            "From memory"
        );
    }

    #[tokio::test]
    async fn missing_payloads_are_empty_and_failures_are_errors() {
        let api = FixtureJudoApi::in_memory().failing_competition(5);
        assert!(api.categories(4).await.expect("empty").is_empty());
        assert!(api.contest_detail(4, "nope").await.expect("none").is_none());
        assert!(matches!(
            api.categories(5).await,
            Err(AdapterError::Unavailable { .. })
        ));
        assert!(api.contests(5, "1").await.is_err());
        assert_eq!(api.detail_requests(), 1);
    }

    #[tokio::test]
    async fn malformed_fixture_is_a_decode_error() {
        let dir = tempdir().expect("tempdir");
        fs::create_dir_all(dir.path().join("categories")).expect("mkdir");
        fs::write(dir.path().join("categories/3.json"), "{not json").expect("write");
        let api = FixtureJudoApi::from_dir(dir.path());
        assert!(matches!(
            api.categories(3).await,
            Err(AdapterError::Decode { .. })
        ));
    }
}
