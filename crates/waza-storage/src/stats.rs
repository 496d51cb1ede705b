//! Filtered aggregate statistics over stored techniques.

use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use sqlx::Row;
use tracing::debug;
use waza_core::{FilterSignature, HeightRange, ScoreGroup, TechniqueFilters};

use crate::cache::{CacheKey, ResultCache};
use crate::db::Database;
use crate::query::{BindValue, Join, TechniqueQuery};

/// Percentiles used to derive height bracket boundaries.
pub const HEIGHT_PERCENTILES: [u32; 10] = [10, 25, 35, 40, 50, 60, 70, 75, 80, 90];

/// Boundary snapped into the bracket sequence when it falls inside the upper
/// half of the distribution.
pub const CANONICAL_HEIGHT_BOUNDARY: i32 = 180;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Overview {
    pub total_competitions: i64,
    pub total_matches: i64,
    pub total_techniques: i64,
    pub unique_athletes: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TechniqueCount {
    pub name: String,
    pub count: i64,
    pub avg_score: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoreGroupCount {
    pub score_group: ScoreGroup,
    pub count: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoreGroupTop {
    pub score_group: ScoreGroup,
    pub techniques: Vec<TechniqueCount>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TechniqueStats {
    pub name: String,
    pub category: String,
    pub count: i64,
    pub ippon: i64,
    pub waza_ari: i64,
    pub yuko: i64,
    pub avg_score: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HeightBucket {
    pub label: String,
    pub min: Option<i32>,
    pub max: Option<i32>,
}

impl From<HeightRange> for HeightBucket {
    fn from(range: HeightRange) -> Self {
        Self {
            label: range.to_string(),
            min: range.min,
            max: range.max,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FilterOptions {
    pub genders: Vec<String>,
    pub weight_classes: Vec<String>,
    pub event_types: Vec<String>,
    pub years: Vec<i32>,
    pub technique_categories: Vec<String>,
    pub score_groups: Vec<ScoreGroup>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompetitionSummary {
    pub id: i64,
    pub name: String,
    pub date: String,
    pub location: String,
    pub event_type: String,
    pub year: Option<i32>,
    pub technique_count: i64,
}

/// Read-side aggregate API. Every operation goes through the shared
/// [`ResultCache`].
#[derive(Debug, Clone)]
pub struct StatsService {
    db: Database,
    cache: Arc<ResultCache>,
}

impl StatsService {
    pub fn new(db: Database, cache: Arc<ResultCache>) -> Self {
        Self { db, cache }
    }

    pub fn cache(&self) -> &Arc<ResultCache> {
        &self.cache
    }

    pub async fn overview(&self, filters: &TechniqueFilters) -> Result<Overview> {
        cached(&self.cache, "overview", filters.signature(), || async move {
            let query = TechniqueQuery::from_filters(filters);
            let row = query
                .select(
                    "COUNT(DISTINCT t.competition_id) AS competitions, \
                     COUNT(DISTINCT t.match_contest_code) AS matches, \
                     COUNT(*) AS techniques, \
                     COUNT(DISTINCT t.competitor_id) AS athletes",
                )
                .build()
                .fetch_one(self.db.pool())
                .await
                .context("computing overview")?;
            Ok(Overview {
                total_competitions: row.try_get("competitions")?,
                total_matches: row.try_get("matches")?,
                total_techniques: row.try_get("techniques")?,
                unique_athletes: row.try_get("athletes")?,
            })
        })
        .await
    }

    pub async fn top_techniques(
        &self,
        filters: &TechniqueFilters,
        limit: u32,
    ) -> Result<Vec<TechniqueCount>> {
        let operation = format!("top_techniques:{limit}");
        cached(&self.cache, &operation, filters.signature(), || async move {
            let mut builder = TechniqueQuery::from_filters(filters).select(
                "t.technique_name AS name, COUNT(*) AS count, AVG(t.score) AS avg_score",
            );
            builder
                .push(" GROUP BY t.technique_name ORDER BY count DESC, name ASC LIMIT ")
                .push_bind(i64::from(limit));
            let rows = builder
                .build()
                .fetch_all(self.db.pool())
                .await
                .context("computing top techniques")?;
            rows.iter()
                .map(|row| -> Result<_> {
                    Ok(TechniqueCount {
                        name: row.try_get("name")?,
                        count: row.try_get("count")?,
                        avg_score: round2(row.try_get("avg_score")?),
                    })
                })
                .collect()
        })
        .await
    }

    /// Counts per score group, in canonical group order; empty groups omitted.
    pub async fn score_group_counts(
        &self,
        filters: &TechniqueFilters,
    ) -> Result<Vec<ScoreGroupCount>> {
        cached(&self.cache, "score_group_counts", filters.signature(), || async move {
            let mut builder = TechniqueQuery::from_filters(filters)
                .select("t.score_group AS score_group, COUNT(*) AS count");
            builder.push(" GROUP BY t.score_group");
            let rows = builder
                .build()
                .fetch_all(self.db.pool())
                .await
                .context("computing score group counts")?;

            let mut counts: BTreeMap<ScoreGroup, i64> = BTreeMap::new();
            for row in &rows {
                let group: String = row.try_get("score_group")?;
                let group = group.parse().unwrap_or(ScoreGroup::Unknown);
                *counts.entry(group).or_default() += row.try_get::<i64, _>("count")?;
            }
            Ok(counts
                .into_iter()
                .map(|(score_group, count)| ScoreGroupCount { score_group, count })
                .collect())
        })
        .await
    }

    pub async fn top_techniques_by_score_group(
        &self,
        filters: &TechniqueFilters,
        per_group: usize,
    ) -> Result<Vec<ScoreGroupTop>> {
        let operation = format!("top_techniques_by_score_group:{per_group}");
        cached(&self.cache, &operation, filters.signature(), || async move {
            let mut builder = TechniqueQuery::from_filters(filters).select(
                "t.score_group AS score_group, t.technique_name AS name, \
                 COUNT(*) AS count, AVG(t.score) AS avg_score",
            );
            builder.push(
                " GROUP BY t.score_group, t.technique_name ORDER BY t.score_group, count DESC, name ASC",
            );
            let rows = builder
                .build()
                .fetch_all(self.db.pool())
                .await
                .context("computing top techniques per score group")?;

            let mut groups: BTreeMap<ScoreGroup, Vec<TechniqueCount>> = BTreeMap::new();
            for row in &rows {
                let group: String = row.try_get("score_group")?;
                let entry = groups
                    .entry(group.parse().unwrap_or(ScoreGroup::Unknown))
                    .or_default();
                if entry.len() < per_group {
                    entry.push(TechniqueCount {
                        name: row.try_get("name")?,
                        count: row.try_get("count")?,
                        avg_score: round2(row.try_get("avg_score")?),
                    });
                }
            }
            Ok(groups
                .into_iter()
                .map(|(score_group, techniques)| ScoreGroupTop {
                    score_group,
                    techniques,
                })
                .collect())
        })
        .await
    }

    /// Per-technique statistics for the catalog view, most frequent first.
    pub async fn technique_catalog(
        &self,
        filters: &TechniqueFilters,
    ) -> Result<Vec<TechniqueStats>> {
        cached(&self.cache, "technique_catalog", filters.signature(), || async move {
            let mut builder = TechniqueQuery::from_filters(filters).select(
                "t.technique_name AS name, \
                 MAX(t.technique_category) AS category, \
                 COUNT(*) AS count, \
                 SUM(CASE WHEN t.score_group = 'Ippon' THEN 1 ELSE 0 END) AS ippon, \
                 SUM(CASE WHEN t.score_group = 'Waza-ari' THEN 1 ELSE 0 END) AS waza_ari, \
                 SUM(CASE WHEN t.score_group = 'Yuko' THEN 1 ELSE 0 END) AS yuko, \
                 AVG(t.score) AS avg_score",
            );
            builder.push(" GROUP BY t.technique_name ORDER BY count DESC, name ASC");
            let rows = builder
                .build()
                .fetch_all(self.db.pool())
                .await
                .context("computing technique catalog")?;
            rows.iter()
                .map(|row| -> Result<_> {
                    Ok(TechniqueStats {
                        name: row.try_get("name")?,
                        category: row.try_get("category")?,
                        count: row.try_get("count")?,
                        ippon: row.try_get("ippon")?,
                        waza_ari: row.try_get("waza_ari")?,
                        yuko: row.try_get("yuko")?,
                        avg_score: round2(row.try_get("avg_score")?),
                    })
                })
                .collect()
        })
        .await
    }

    /// Population-balanced height brackets over athletes that have at least
    /// one recorded technique.
    pub async fn height_ranges(&self) -> Result<Vec<HeightBucket>> {
        cached(&self.cache, "height_ranges", FilterSignature::default(), || async move {
            let mut builder = TechniqueQuery::new()
                .require(Join::Profiles)
                .and_where("p.height IS NOT NULL AND p.height > ?", vec![BindValue::Int(0)])
                .select("DISTINCT p.height AS height");
            builder.push(" ORDER BY height");
            let rows = builder
                .build()
                .fetch_all(self.db.pool())
                .await
                .context("loading athlete heights")?;
            let heights = rows
                .iter()
                .map(|row| row.try_get::<i32, _>("height"))
                .collect::<Result<Vec<_>, _>>()?;
            Ok(height_buckets(&heights)
                .into_iter()
                .map(HeightBucket::from)
                .collect())
        })
        .await
    }

    pub async fn filter_options(&self) -> Result<FilterOptions> {
        cached(&self.cache, "filter_options", FilterSignature::default(), || async move {
            let pool = self.db.pool();
            let distinct = |column: &'static str| async move {
                let sql = format!(
                    "SELECT DISTINCT {column} AS value FROM techniques \
                     WHERE {column} <> '' ORDER BY {column}"
                );
                let rows = sqlx::query(&sql)
                    .fetch_all(pool)
                    .await
                    .with_context(|| format!("listing distinct {column}"))?;
                rows.iter()
                    .map(|row| row.try_get::<String, _>("value").map_err(anyhow::Error::from))
                    .collect::<Result<Vec<_>>>()
            };

            let years = sqlx::query(
                "SELECT DISTINCT year FROM competitions WHERE year IS NOT NULL ORDER BY year DESC",
            )
            .fetch_all(pool)
            .await
            .context("listing competition years")?
            .iter()
            .map(|row| row.try_get::<i32, _>("year"))
            .collect::<Result<Vec<_>, _>>()?;

            let mut score_groups: Vec<ScoreGroup> = distinct("score_group")
                .await?
                .iter()
                .filter_map(|g| g.parse().ok())
                .collect();
            score_groups.sort();
            score_groups.dedup();

            Ok(FilterOptions {
                genders: distinct("gender").await?,
                weight_classes: distinct("weight_class").await?,
                event_types: distinct("event_type").await?,
                years,
                technique_categories: distinct("technique_category").await?,
                score_groups,
            })
        })
        .await
    }

    pub async fn list_competitions(&self) -> Result<Vec<CompetitionSummary>> {
        cached(&self.cache, "list_competitions", FilterSignature::default(), || async move {
            let rows = sqlx::query(
                r#"
                SELECT c.competition_id, c.name, c.date, c.location, c.event_type, c.year,
                       COUNT(t.id) AS technique_count
                  FROM competitions c
                  LEFT JOIN techniques t ON t.competition_id = c.competition_id
                 GROUP BY c.competition_id
                 ORDER BY c.date DESC, c.competition_id DESC
                "#,
            )
            .fetch_all(self.db.pool())
            .await
            .context("listing competitions")?;
            rows.iter()
                .map(|row| -> Result<_> {
                    Ok(CompetitionSummary {
                        id: row.try_get("competition_id")?,
                        name: row.try_get("name")?,
                        date: row.try_get("date")?,
                        location: row.try_get("location")?,
                        event_type: row.try_get("event_type")?,
                        year: row.try_get("year")?,
                        technique_count: row.try_get("technique_count")?,
                    })
                })
                .collect()
        })
        .await
    }
}

/// Serves `operation` from the cache, computing and storing it on a miss.
pub(crate) async fn cached<T, F, Fut>(
    cache: &ResultCache,
    operation: &str,
    signature: FilterSignature,
    compute: F,
) -> Result<T>
where
    T: Serialize + DeserializeOwned,
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let key = CacheKey::new(operation, signature);
    if let Some(value) = cache.get(&key) {
        if let Ok(hit) = serde_json::from_value(value) {
            return Ok(hit);
        }
    }
    debug!(key = %key, "cache miss");
    let fresh = compute().await?;
    let value = serde_json::to_value(&fresh).context("serializing cached result")?;
    cache.insert(key, value);
    Ok(fresh)
}

pub(crate) fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

pub(crate) fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Nearest-rank percentile over an ascending, non-empty slice.
fn percentile(sorted: &[i32], pct: u32) -> i32 {
    let n = sorted.len();
    let rank = (u64::from(pct) * n as u64).div_ceil(100) as usize;
    sorted[rank.clamp(1, n) - 1]
}

/// Derives contiguous, non-overlapping height brackets from observed heights.
///
/// Cut points are the distinct percentile values strictly above the minimum
/// height; the first bracket is open below and the last open above, so every
/// input height lands in exactly one bracket. With no usable cut point the
/// result is a single unbounded bracket.
pub fn height_buckets(heights: &[i32]) -> Vec<HeightRange> {
    let mut distinct: Vec<i32> = heights.iter().copied().filter(|h| *h > 0).collect();
    distinct.sort_unstable();
    distinct.dedup();
    let Some(&lowest) = distinct.first() else {
        return Vec::new();
    };

    let percentiles: Vec<(u32, i32)> = HEIGHT_PERCENTILES
        .iter()
        .map(|&pct| (pct, percentile(&distinct, pct)))
        .collect();
    let mut cuts: Vec<i32> = percentiles.iter().map(|(_, value)| *value).collect();

    let median = percentile(&distinct, 50);
    let snaps = median < CANONICAL_HEIGHT_BOUNDARY
        && percentiles
            .iter()
            .any(|&(pct, value)| pct > 50 && value > CANONICAL_HEIGHT_BOUNDARY);
    if snaps {
        cuts.push(CANONICAL_HEIGHT_BOUNDARY);
    }

    cuts.retain(|cut| *cut > lowest);
    cuts.sort_unstable();
    cuts.dedup();

    let (Some(&first), Some(&last)) = (cuts.first(), cuts.last()) else {
        return vec![HeightRange::new(None, None)];
    };
    let mut buckets = vec![HeightRange::new(None, Some(first))];
    buckets.extend(
        cuts.windows(2)
            .map(|pair| HeightRange::new(Some(pair[0]), Some(pair[1]))),
    );
    buckets.push(HeightRange::new(Some(last), None));
    buckets
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::cache::{CacheConfig, ManualClock};
    use crate::db::fixtures::{competition, technique};
    use chrono::Utc;
    use waza_core::JudokaProfile;

    fn assert_coverage(heights: &[i32], buckets: &[HeightRange]) {
        for h in heights {
            let hits = buckets.iter().filter(|b| b.contains(*h)).count();
            assert_eq!(hits, 1, "height {h} in {hits} buckets: {buckets:?}");
        }
        for pair in buckets.windows(2) {
            assert_eq!(pair[0].max, pair[1].min, "gap or overlap in {buckets:?}");
        }
    }

    #[test]
    fn buckets_cover_every_height_exactly_once() {
        let heights: Vec<i32> = (155..=200).step_by(3).collect();
        let buckets = height_buckets(&heights);
        assert!(buckets.len() > 3);
        assert_eq!(buckets.first().and_then(|b| b.min), None);
        assert_eq!(buckets.last().and_then(|b| b.max), None);
        assert_coverage(&heights, &buckets);
    }

    #[test]
    fn canonical_boundary_is_snapped_into_upper_half() {
        let heights = [160, 165, 168, 170, 172, 175, 178, 183, 186, 190];
        let buckets = height_buckets(&heights);
        assert!(buckets.iter().any(|b| b.max == Some(180)));
        assert!(buckets.iter().any(|b| b.min == Some(180)));
        assert_coverage(&heights, &buckets);
    }

    #[test]
    fn boundary_not_snapped_when_median_is_above_it() {
        let heights = [181, 184, 187, 190, 193, 196];
        let buckets = height_buckets(&heights);
        assert!(buckets.iter().all(|b| b.min != Some(180) && b.max != Some(180)));
        assert_coverage(&heights, &buckets);
    }

    #[test]
    fn degenerate_inputs() {
        assert!(height_buckets(&[]).is_empty());
        assert!(height_buckets(&[0, -5]).is_empty());
        assert_eq!(height_buckets(&[175, 175]), vec![HeightRange::new(None, None)]);

        let two = height_buckets(&[182, 190]);
        assert_eq!(
            two,
            vec![HeightRange::new(None, Some(190)), HeightRange::new(Some(190), None)]
        );
        assert_coverage(&[182, 190], &two);
    }

    #[test]
    fn nearest_rank_percentiles() {
        let sorted = [150, 160, 170, 180];
        assert_eq!(percentile(&sorted, 10), 150);
        assert_eq!(percentile(&sorted, 25), 150);
        assert_eq!(percentile(&sorted, 50), 160);
        assert_eq!(percentile(&sorted, 90), 180);
    }

    async fn seeded() -> (Database, StatsService, Arc<ManualClock>) {
        let db = Database::in_memory().await.expect("db");
        db.upsert_competition(&competition(1, 2022)).await.expect("c1");
        db.upsert_competition(&competition(2, 2023)).await.expect("c2");

        let mut women = technique(2, "w1", "30", Some("31"), "uchi-mata", ScoreGroup::Ippon);
        women.gender = "w".to_string();
        db.replace_techniques(
            1,
            &[
                technique(1, "a1", "10", Some("11"), "seoi-nage", ScoreGroup::Ippon),
                technique(1, "a1", "10", Some("11"), "seoi-nage", ScoreGroup::WazaAri),
                technique(1, "a2", "12", Some("10"), "uchi-mata", ScoreGroup::Yuko),
                technique(1, "a3", "12", None, "fusen-gachi", ScoreGroup::Ippon),
            ],
        )
        .await
        .expect("t1");
        db.replace_techniques(
            2,
            &[
                women,
                technique(2, "b1", "10", Some("12"), "seoi-nage", ScoreGroup::Yuko),
            ],
        )
        .await
        .expect("t2");

        for (id, height) in [("10", 170), ("12", 185), ("30", 160)] {
            db.upsert_profile(&JudokaProfile {
                id: id.to_string(),
                name: format!("ATHLETE {id}"),
                height: Some(height),
                age: None,
                country: "FRA".to_string(),
                last_updated: Utc::now(),
            })
            .await
            .expect("profile");
        }

        let clock = Arc::new(ManualClock::new());
        let cache = Arc::new(ResultCache::with_clock(CacheConfig::default(), clock.clone()));
        (db.clone(), StatsService::new(db, cache), clock)
    }

    #[tokio::test]
    async fn overview_excludes_walkovers() {
        let (_, stats, _) = seeded().await;
        let overview = stats.overview(&TechniqueFilters::default()).await.expect("overview");
        assert_eq!(
            overview,
            Overview {
                total_competitions: 2,
                total_matches: 4,
                total_techniques: 5,
                unique_athletes: 3,
            }
        );
    }

    #[tokio::test]
    async fn top_techniques_rank_by_frequency() {
        let (_, stats, _) = seeded().await;
        let top = stats
            .top_techniques(&TechniqueFilters::default(), 1)
            .await
            .expect("top");
        assert_eq!(top.len(), 1);
        assert_eq!(top[0].name, "seoi-nage");
        assert_eq!(top[0].count, 3);
        assert_eq!(top[0].avg_score, round2((10.0 + 7.0 + 5.0) / 3.0));
    }

    #[tokio::test]
    async fn adding_a_filter_never_grows_the_result() {
        let (_, stats, _) = seeded().await;
        let base = TechniqueFilters {
            gender: Some("m".to_string()),
            ..Default::default()
        };
        let narrowed = [
            TechniqueFilters { year: Some(2022), ..base.clone() },
            TechniqueFilters {
                height_range: Some(HeightRange::new(Some(165), Some(180))),
                ..base.clone()
            },
            TechniqueFilters {
                year: Some(2023),
                height_range: Some(HeightRange::new(None, Some(180))),
                ..base.clone()
            },
            TechniqueFilters { score_group: Some(ScoreGroup::Yuko), ..base.clone() },
        ];

        let all = stats.overview(&base).await.expect("base").total_techniques;
        assert_eq!(all, 4);
        let mut narrowed_counts = Vec::new();
        for filters in &narrowed {
            let count = stats.overview(filters).await.expect("narrowed").total_techniques;
            assert!(count <= all);
            narrowed_counts.push(count);
        }
        assert_eq!(narrowed_counts, vec![3, 3, 1, 2]);
    }

    #[tokio::test]
    async fn cache_serves_until_ttl_then_reflects_writes() {
        let (db, stats, clock) = seeded().await;
        let filters = TechniqueFilters {
            competition_id: Some(2),
            ..Default::default()
        };
        let first = stats.score_group_counts(&filters).await.expect("first");

        db.replace_techniques(
            2,
            &[technique(2, "z", "10", None, "o-goshi", ScoreGroup::Penalty)],
        )
        .await
        .expect("rewrite");

        let second = stats.score_group_counts(&filters).await.expect("second");
        assert_eq!(
            serde_json::to_vec(&first).unwrap(),
            serde_json::to_vec(&second).unwrap()
        );
        assert_eq!(stats.cache().stats().hits, 1);

        clock.advance(Duration::from_secs(301));
        let third = stats.score_group_counts(&filters).await.expect("third");
        assert_eq!(
            third,
            vec![ScoreGroupCount {
                score_group: ScoreGroup::Penalty,
                count: 1
            }]
        );
    }

    #[tokio::test]
    async fn per_group_and_catalog_views() {
        let (_, stats, _) = seeded().await;
        let filters = TechniqueFilters::default();

        let per_group = stats
            .top_techniques_by_score_group(&filters, 1)
            .await
            .expect("per group");
        let groups: Vec<_> = per_group.iter().map(|g| g.score_group).collect();
        assert_eq!(groups, vec![ScoreGroup::Ippon, ScoreGroup::WazaAri, ScoreGroup::Yuko]);
        assert!(per_group.iter().all(|g| g.techniques.len() == 1));

        let catalog = stats.technique_catalog(&filters).await.expect("catalog");
        let seoi = catalog.iter().find(|t| t.name == "seoi-nage").expect("seoi");
        assert_eq!((seoi.count, seoi.ippon, seoi.waza_ari, seoi.yuko), (3, 1, 1, 1));
        assert_eq!(seoi.category, "tachi-waza");
        assert!(catalog.iter().all(|t| t.name != "fusen-gachi"));
    }

    #[tokio::test]
    async fn height_ranges_and_options() {
        let (_, stats, _) = seeded().await;
        let ranges = stats.height_ranges().await.expect("ranges");
        assert_eq!(ranges.first().map(|b| b.min), Some(None));
        assert_eq!(ranges.last().map(|b| b.max), Some(None));
        let parsed: Vec<HeightRange> = ranges.iter().map(|b| b.label.parse().unwrap()).collect();
        assert_coverage(&[160, 170, 185], &parsed);

        let options = stats.filter_options().await.expect("options");
        assert_eq!(options.genders, vec!["m", "w"]);
        assert_eq!(options.years, vec![2023, 2022]);
        assert_eq!(
            options.score_groups,
            vec![ScoreGroup::Ippon, ScoreGroup::WazaAri, ScoreGroup::Yuko]
        );

        let competitions = stats.list_competitions().await.expect("competitions");
        assert_eq!(competitions.len(), 2);
        assert_eq!(competitions[0].id, 2);
        assert_eq!(competitions[1].technique_count, 4);
    }
}
