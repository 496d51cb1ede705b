//! Crawl orchestration: competitions to techniques, then athlete profiles.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use serde::Serialize;
use tokio::fs;
use tracing::{debug, info, info_span, warn, Instrument};
use uuid::Uuid;
use waza_adapters::{HttpJudoApi, JudoApi, DEFAULT_API_BASE_URL};
use waza_core::{
    extract_with_context, has_techniques, Category, Competition, JudokaProfile, MatchDetail,
    Technique, TechniqueContext,
};
use waza_storage::{
    BackoffPolicy, Database, HttpClientConfig, HttpFetcher, PayloadArchive, ResultCache,
    DEFAULT_DATABASE_URL,
};

pub const CRATE_NAME: &str = "waza-sync";

/// Leading match details probed before a category is crawled in full.
pub const SAMPLE_SIZE: usize = 3;

#[derive(Debug, Clone)]
pub struct SyncConfig {
    pub database_url: String,
    pub api_base_url: String,
    pub user_agent: String,
    pub http_timeout_secs: u64,
    pub http_concurrency: usize,
    pub http_max_retries: usize,
    pub crawl_workers: usize,
    pub profile_workers: usize,
    pub profile_flush_every: usize,
    pub reports_dir: Option<PathBuf>,
    pub archive_dir: Option<PathBuf>,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            database_url: DEFAULT_DATABASE_URL.to_string(),
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            user_agent: "waza-bot/0.1".to_string(),
            http_timeout_secs: 20,
            http_concurrency: 16,
            http_max_retries: 0,
            crawl_workers: 25,
            profile_workers: 20,
            profile_flush_every: 50,
            reports_dir: Some(PathBuf::from("./reports")),
            archive_dir: None,
        }
    }
}

impl SyncConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            database_url: std::env::var("DATABASE_URL").unwrap_or(defaults.database_url),
            api_base_url: std::env::var("WAZA_API_BASE_URL").unwrap_or(defaults.api_base_url),
            user_agent: std::env::var("WAZA_USER_AGENT").unwrap_or(defaults.user_agent),
            http_timeout_secs: env_or("WAZA_HTTP_TIMEOUT_SECS", defaults.http_timeout_secs),
            http_concurrency: env_or("WAZA_HTTP_CONCURRENCY", defaults.http_concurrency),
            http_max_retries: env_or("WAZA_HTTP_MAX_RETRIES", defaults.http_max_retries),
            crawl_workers: env_or("WAZA_CRAWL_WORKERS", defaults.crawl_workers),
            profile_workers: env_or("WAZA_PROFILE_WORKERS", defaults.profile_workers),
            profile_flush_every: env_or("WAZA_PROFILE_FLUSH_EVERY", defaults.profile_flush_every),
            reports_dir: std::env::var("WAZA_REPORTS_DIR")
                .map(PathBuf::from)
                .ok()
                .or(defaults.reports_dir),
            archive_dir: std::env::var("WAZA_ARCHIVE_DIR").map(PathBuf::from).ok(),
        }
    }

    pub fn http_client_config(&self) -> HttpClientConfig {
        HttpClientConfig {
            timeout: Duration::from_secs(self.http_timeout_secs),
            user_agent: Some(self.user_agent.clone()),
            max_in_flight: self.http_concurrency.max(1),
            backoff: BackoffPolicy {
                max_retries: self.http_max_retries,
                ..Default::default()
            },
        }
    }

    pub fn build_http_api(&self) -> Result<HttpJudoApi> {
        let http = HttpFetcher::new(self.http_client_config())?;
        let api = HttpJudoApi::new(http, self.api_base_url.clone());
        Ok(match &self.archive_dir {
            Some(dir) => api.with_archive(PayloadArchive::new(dir.clone())),
            None => api,
        })
    }

    pub fn crawl_options(&self) -> CrawlOptions {
        CrawlOptions {
            workers: self.crawl_workers,
            ..Default::default()
        }
    }

    pub fn profile_options(&self) -> ProfileOptions {
        ProfileOptions {
            force: false,
            workers: self.profile_workers,
            flush_every: self.profile_flush_every,
        }
    }
}

fn env_or<T: FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

#[derive(Debug, Clone)]
pub struct CrawlOptions {
    /// Competitions with a year below this (or no year at all) are ignored.
    pub min_year: Option<i32>,
    pub skip_crawled: bool,
    pub workers: usize,
    /// Restricts the run to these competitions when set.
    pub competition_ids: Option<BTreeSet<i64>>,
}

impl Default for CrawlOptions {
    fn default() -> Self {
        Self {
            min_year: None,
            skip_crawled: false,
            workers: 25,
            competition_ids: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ProfileOptions {
    pub force: bool,
    pub workers: usize,
    pub flush_every: usize,
}

impl Default for ProfileOptions {
    fn default() -> Self {
        Self {
            force: false,
            workers: 20,
            flush_every: 50,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum CompetitionOutcome {
    Persisted,
    DoneEmpty,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CompetitionReport {
    pub competition_id: i64,
    pub outcome: CompetitionOutcome,
    pub categories: usize,
    pub categories_skipped: usize,
    pub matches_processed: usize,
    pub techniques_written: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct CrawlSummary {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub competitions_listed: usize,
    pub competitions_skipped: usize,
    pub persisted: usize,
    pub done_empty: usize,
    pub failed: usize,
    pub categories_skipped: usize,
    pub matches_processed: usize,
    pub techniques_written: u64,
    pub errors: Vec<String>,
    pub competitions: Vec<CompetitionReport>,
    pub report_path: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProfileSummary {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub athletes: usize,
    pub already_stored: usize,
    pub fetched: usize,
    pub missing: usize,
    pub failed: usize,
    pub errors: Vec<String>,
    pub report_path: Option<String>,
}

pub struct CrawlPipeline {
    api: Arc<dyn JudoApi>,
    db: Database,
    reports_dir: Option<PathBuf>,
    cache: Option<Arc<ResultCache>>,
}

impl CrawlPipeline {
    pub fn new(api: Arc<dyn JudoApi>, db: Database) -> Self {
        Self {
            api,
            db,
            reports_dir: None,
            cache: None,
        }
    }

    /// Connects the database named by `config` and talks to the live API.
    pub async fn from_config(config: &SyncConfig) -> Result<Self> {
        let db = Database::connect(&config.database_url).await?;
        let api = config.build_http_api()?;
        Ok(Self::new(Arc::new(api), db).with_reports_dir(config.reports_dir.clone()))
    }

    pub fn with_reports_dir(mut self, reports_dir: Option<PathBuf>) -> Self {
        self.reports_dir = reports_dir;
        self
    }

    /// Cleared after every crawl so readers never see pre-crawl aggregates.
    pub fn with_cache(mut self, cache: Arc<ResultCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    pub async fn run_crawl(&self, options: &CrawlOptions) -> Result<CrawlSummary> {
        let started_at = Utc::now();
        let run_id = Uuid::new_v4();
        let span = info_span!("crawl", %run_id);

        let mut errors = Vec::new();
        let listed = match self.api.competitions().instrument(span.clone()).await {
            Ok(listed) => listed,
            Err(err) => {
                warn!(parent: &span, error = %err, "competition list unavailable");
                errors.push(format!("competition list: {err}"));
                Vec::new()
            }
        };
        let competitions_listed = listed.len();

        let crawled = if options.skip_crawled {
            self.db.competition_ids().await?
        } else {
            BTreeSet::new()
        };
        let pending: Vec<Competition> = listed
            .into_iter()
            .filter(|c| match options.min_year {
                Some(min) => c.year.is_some_and(|year| year >= min),
                None => true,
            })
            .filter(|c| {
                options
                    .competition_ids
                    .as_ref()
                    .map_or(true, |ids| ids.contains(&c.id))
            })
            .filter(|c| !crawled.contains(&c.id))
            .collect();
        info!(
            parent: &span,
            listed = competitions_listed,
            pending = pending.len(),
            "crawl starting"
        );

        let mut reports = Vec::new();
        let mut failed = 0usize;
        let workers = options.workers.max(1);
        for batch in pending.chunks(workers) {
            let results: Vec<_> = stream::iter(batch)
                .map(|competition| {
                    let span = span.clone();
                    async move {
                        let result = self.crawl_competition(competition).instrument(span).await;
                        (competition, result)
                    }
                })
                .buffer_unordered(workers)
                .collect()
                .await;
            for (competition, result) in results {
                match result {
                    Ok(report) => reports.push(report),
                    Err(err) => {
                        warn!(parent: &span, competition_id = competition.id, error = %format!("{err:#}"), "competition failed");
                        errors.push(format!("competition {}: {err:#}", competition.id));
                        failed += 1;
                    }
                }
            }
            self.db.flush().await?;
        }

        if let Some(cache) = &self.cache {
            cache.clear();
        }

        let mut summary = CrawlSummary {
            run_id,
            started_at,
            finished_at: Utc::now(),
            competitions_listed,
            competitions_skipped: competitions_listed - pending.len(),
            persisted: count_outcome(&reports, CompetitionOutcome::Persisted),
            done_empty: count_outcome(&reports, CompetitionOutcome::DoneEmpty),
            failed,
            categories_skipped: reports.iter().map(|r| r.categories_skipped).sum(),
            matches_processed: reports.iter().map(|r| r.matches_processed).sum(),
            techniques_written: reports.iter().map(|r| r.techniques_written).sum(),
            errors,
            competitions: reports,
            report_path: None,
        };
        summary.report_path = self
            .write_report(run_id, "crawl_summary.json", &summary)
            .await?
            .map(|p| p.display().to_string());
        info!(
            parent: &span,
            persisted = summary.persisted,
            done_empty = summary.done_empty,
            failed = summary.failed,
            techniques = summary.techniques_written,
            "crawl finished"
        );
        Ok(summary)
    }

    /// Crawls one competition end to end. An `Err` is the failed state and
    /// leaves stored data for the competition untouched.
    pub async fn crawl_competition(&self, competition: &Competition) -> Result<CompetitionReport> {
        let categories = self
            .api
            .categories(competition.id)
            .await
            .with_context(|| format!("listing categories of {}", competition.id))?;

        let mut record = competition.clone();
        record.categories.clear();
        let mut techniques: Vec<Technique> = Vec::new();
        let mut categories_skipped = 0usize;
        let mut matches_processed = 0usize;

        for category in &categories {
            let matches = self
                .api
                .contests(competition.id, &category.weight_id)
                .await
                .with_context(|| {
                    format!(
                        "listing contests of {}",
                        Category::composite_id(competition.id, &category.weight_id)
                    )
                })?;

            let mut sampled: Vec<Option<MatchDetail>> = Vec::new();
            for m in matches.iter().take(SAMPLE_SIZE) {
                sampled.push(self.api.contest_detail(competition.id, &m.contest_code).await?);
            }
            let productive = sampled.iter().flatten().any(has_techniques);

            let ctx = TechniqueContext {
                competition_name: competition.name.clone(),
                weight_class: category.weight_class.clone(),
                gender: category.gender.clone(),
                event_type: competition.event_type.clone(),
            };
            let mut category_matches = Vec::with_capacity(matches.len());
            if !productive {
                debug!(
                    competition_id = competition.id,
                    weight_class = %category.weight_class,
                    sampled = sampled.len(),
                    "category skipped by sampling"
                );
                categories_skipped += 1;
                category_matches = matches;
            } else {
                let mut sampled = sampled.into_iter();
                for mut m in matches {
                    let detail = match sampled.next() {
                        Some(detail) => detail,
                        None => self.api.contest_detail(competition.id, &m.contest_code).await?,
                    };
                    if let Some(detail) = detail {
                        let mut extracted = extract_with_context(&detail, &ctx);
                        for technique in &mut extracted {
                            technique.competition_id = competition.id;
                        }
                        techniques.extend(extracted.iter().cloned());
                        m.techniques = extracted;
                    }
                    matches_processed += 1;
                    category_matches.push(m);
                }
            }

            record.categories.push(Category {
                id: Category::composite_id(competition.id, &category.weight_id),
                weight_id: category.weight_id.clone(),
                weight_class: category.weight_class.clone(),
                gender: category.gender.clone(),
                matches: category_matches,
            });
        }

        let techniques_written = self.db.persist_competition(&record, &techniques).await?;
        let outcome = if techniques_written > 0 {
            CompetitionOutcome::Persisted
        } else {
            CompetitionOutcome::DoneEmpty
        };
        info!(
            competition_id = competition.id,
            ?outcome,
            categories = categories.len(),
            categories_skipped,
            techniques = techniques_written,
            "competition crawled"
        );
        Ok(CompetitionReport {
            competition_id: competition.id,
            outcome,
            categories: categories.len(),
            categories_skipped,
            matches_processed,
            techniques_written,
        })
    }

    pub async fn fetch_profiles(&self, options: &ProfileOptions) -> Result<ProfileSummary> {
        let started_at = Utc::now();
        let run_id = Uuid::new_v4();
        let span = info_span!("profiles", %run_id);

        let athletes = self.db.athlete_ids().await?;
        let stored = if options.force {
            BTreeSet::new()
        } else {
            self.db.profile_ids().await?
        };

        let mut errors = Vec::new();
        let mut already_stored = 0usize;
        let mut pending = Vec::new();
        for id in &athletes {
            if !is_person_id(id) {
                warn!(parent: &span, athlete_id = %id, "skipping non-numeric athlete id");
                errors.push(format!("athlete {id}: not a numeric id"));
            } else if stored.contains(id) {
                already_stored += 1;
            } else {
                pending.push(id.as_str());
            }
        }
        info!(
            parent: &span,
            athletes = athletes.len(),
            pending = pending.len(),
            force = options.force,
            "profile fetch starting"
        );

        let mut fetched = 0usize;
        let mut missing = 0usize;
        let mut failed = errors.len();
        let mut since_flush = 0usize;
        let workers = options.workers.max(1);
        for batch in pending.chunks(workers) {
            let results: Vec<_> = stream::iter(batch)
                .map(|id| async move { (*id, self.api.competitor_info(id).await) })
                .buffer_unordered(workers)
                .collect()
                .await;
            for (id, result) in results {
                match result {
                    Ok(Some(profile)) => {
                        self.db.upsert_profile(&profile).await?;
                        fetched += 1;
                    }
                    Ok(None) => missing += 1,
                    Err(err) => {
                        warn!(parent: &span, athlete_id = %id, error = %err, "profile fetch failed");
                        errors.push(format!("athlete {id}: {err}"));
                        failed += 1;
                    }
                }
            }
            since_flush += batch.len();
            if since_flush >= options.flush_every.max(1) {
                self.db.flush().await?;
                since_flush = 0;
            }
        }
        self.db.flush().await?;

        if fetched > 0 {
            if let Some(cache) = &self.cache {
                cache.clear();
            }
        }

        let mut summary = ProfileSummary {
            run_id,
            started_at,
            finished_at: Utc::now(),
            athletes: athletes.len(),
            already_stored,
            fetched,
            missing,
            failed,
            errors,
            report_path: None,
        };
        summary.report_path = self
            .write_report(run_id, "profile_summary.json", &summary)
            .await?
            .map(|p| p.display().to_string());
        info!(
            parent: &span,
            fetched,
            missing,
            failed,
            "profile fetch finished"
        );
        Ok(summary)
    }

    /// Stored profile first (unless `force`), otherwise fetched and stored.
    pub async fn lookup_profile(&self, id: &str, force: bool) -> Result<Option<JudokaProfile>> {
        if !force {
            if let Some(profile) = self.db.get_profile(id).await? {
                return Ok(Some(profile));
            }
        }
        if !is_person_id(id) {
            warn!(athlete_id = %id, "refusing lookup of non-numeric athlete id");
            return Ok(None);
        }
        let Some(profile) = self
            .api
            .competitor_info(id)
            .await
            .with_context(|| format!("fetching profile {id}"))?
        else {
            return Ok(None);
        };
        self.db.upsert_profile(&profile).await?;
        if let Some(cache) = &self.cache {
            cache.clear();
        }
        Ok(Some(profile))
    }

    async fn write_report<T: Serialize>(
        &self,
        run_id: Uuid,
        file_name: &str,
        report: &T,
    ) -> Result<Option<PathBuf>> {
        let Some(root) = &self.reports_dir else {
            return Ok(None);
        };
        let dir = root.join(run_id.to_string());
        fs::create_dir_all(&dir)
            .await
            .with_context(|| format!("creating {}", dir.display()))?;
        let path = dir.join(file_name);
        let bytes = serde_json::to_vec_pretty(report).context("serializing run report")?;
        fs::write(&path, bytes)
            .await
            .with_context(|| format!("writing {}", path.display()))?;
        Ok(Some(path))
    }
}

fn count_outcome(reports: &[CompetitionReport], outcome: CompetitionOutcome) -> usize {
    reports.iter().filter(|r| r.outcome == outcome).count()
}

pub fn is_person_id(id: &str) -> bool {
    !id.is_empty() && id.bytes().all(|b| b.is_ascii_digit())
}

/// Latest run directory under `root`, by modification time.
pub fn latest_report_dir(root: &Path) -> Result<Option<PathBuf>> {
    if !root.exists() {
        return Ok(None);
    }
    let mut latest: Option<(std::time::SystemTime, PathBuf)> = None;
    for entry in std::fs::read_dir(root).with_context(|| format!("reading {}", root.display()))? {
        let entry = entry?;
        if !entry.file_type()?.is_dir() {
            continue;
        }
        let modified = entry.metadata()?.modified()?;
        if latest.as_ref().map_or(true, |(t, _)| modified > *t) {
            latest = Some((modified, entry.path()));
        }
    }
    Ok(latest.map(|(_, path)| path))
}
