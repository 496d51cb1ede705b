//! Per-athlete technique breakdowns, performed and received.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use sqlx::Row;
use waza_core::{ScoreGroup, TechniqueFilters};

use crate::cache::ResultCache;
use crate::db::{technique_from_row, Database};
use crate::query::{Join, TechniqueQuery};
use crate::stats::{cached, round1, round2};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Perspective {
    /// Techniques the athlete scored.
    Performed,
    /// Techniques scored against the athlete.
    Received,
}

impl Perspective {
    fn as_str(self) -> &'static str {
        match self {
            Perspective::Performed => "performed",
            Perspective::Received => "received",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchRef {
    pub contest_code: String,
    pub competition_id: i64,
    pub competition_name: String,
    pub year: Option<i32>,
    pub weight_class: String,
    pub opponent_id: Option<String>,
    pub opponent_name: Option<String>,
    pub opponent_country: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WazaBreakdown {
    pub technique_name: String,
    pub technique_category: String,
    pub count: i64,
    pub percentage: f64,
    pub avg_score: f64,
    pub ippon: i64,
    pub waza_ari: i64,
    pub yuko: i64,
    pub matches: Vec<MatchRef>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JudokaStats {
    pub athlete_id: String,
    pub perspective: Perspective,
    pub name: Option<String>,
    pub height: Option<i32>,
    pub age: Option<i32>,
    pub country: Option<String>,
    pub total_techniques: i64,
    pub competition_count: i64,
    pub waza_breakdown: Vec<WazaBreakdown>,
    pub favorite_technique: Option<String>,
}

#[derive(Debug, Clone)]
pub struct JudokaStatsService {
    db: Database,
    cache: Arc<ResultCache>,
}

impl JudokaStatsService {
    pub fn new(db: Database, cache: Arc<ResultCache>) -> Self {
        Self { db, cache }
    }

    pub async fn stats_for(&self, athlete_id: &str, filters: &TechniqueFilters) -> Result<JudokaStats> {
        self.breakdown(athlete_id, filters, Perspective::Performed).await
    }

    pub async fn received_stats_for(
        &self,
        athlete_id: &str,
        filters: &TechniqueFilters,
    ) -> Result<JudokaStats> {
        self.breakdown(athlete_id, filters, Perspective::Received).await
    }

    async fn breakdown(
        &self,
        athlete_id: &str,
        filters: &TechniqueFilters,
        perspective: Perspective,
    ) -> Result<JudokaStats> {
        let operation = format!("judoka:{}:{athlete_id}", perspective.as_str());
        cached(&self.cache, &operation, filters.signature(), || async move {
            let query = TechniqueQuery::from_filters(filters).require(Join::Competitions);
            let query = match perspective {
                Perspective::Performed => query.performed_by(athlete_id),
                Perspective::Received => query.received_by(athlete_id),
            };
            let mut builder = query.select(
                "t.competitor_id, t.competitor_name, t.opponent_id, t.opponent_name, \
                 t.opponent_country, t.technique_name, t.technique_type, t.technique_category, \
                 t.side, t.score, t.score_group, t.timestamp, t.note, t.competition_id, \
                 t.match_contest_code, t.competition_name, t.weight_class, t.gender, t.event_type, \
                 c.year AS competition_year, c.name AS stored_competition_name",
            );
            builder.push(" ORDER BY t.competition_id, t.match_contest_code, t.id");
            let rows = builder
                .build()
                .fetch_all(self.db.pool())
                .await
                .with_context(|| format!("loading techniques for athlete {athlete_id}"))?;

            let mut groups: BTreeMap<String, Accumulator> = BTreeMap::new();
            let mut competitions = BTreeSet::new();
            let mut athlete_name = None;
            for row in &rows {
                let technique = technique_from_row(row)?;
                let year: Option<i32> = row.try_get("competition_year")?;
                let stored_name: Option<String> = row.try_get("stored_competition_name")?;
                competitions.insert(technique.competition_id);

                // The counterpart is whoever stood across from the athlete.
                let (opponent_id, opponent_name, opponent_country) = match perspective {
                    Perspective::Performed => {
                        if athlete_name.is_none() {
                            athlete_name = Some(technique.competitor_name.clone());
                        }
                        (
                            technique.opponent_id.clone(),
                            technique.opponent_name.clone(),
                            technique.opponent_country.clone(),
                        )
                    }
                    Perspective::Received => {
                        if athlete_name.is_none() {
                            athlete_name = technique.opponent_name.clone();
                        }
                        (
                            Some(technique.competitor_id.clone()),
                            Some(technique.competitor_name.clone()),
                            None,
                        )
                    }
                };

                let acc = groups
                    .entry(technique.technique_name.clone())
                    .or_insert_with(|| Accumulator::new(&technique.technique_category));
                acc.count += 1;
                acc.score_total += i64::from(technique.score);
                match technique.score_group {
                    ScoreGroup::Ippon => acc.ippon += 1,
                    ScoreGroup::WazaAri => acc.waza_ari += 1,
                    ScoreGroup::Yuko => acc.yuko += 1,
                    ScoreGroup::Penalty | ScoreGroup::Unknown => {}
                }
                if acc.seen_contests.insert(technique.match_contest_code.clone()) {
                    acc.matches.push(MatchRef {
                        contest_code: technique.match_contest_code.clone(),
                        competition_id: technique.competition_id,
                        competition_name: stored_name
                            .filter(|n| !n.is_empty())
                            .unwrap_or(technique.competition_name.clone()),
                        year,
                        weight_class: technique.weight_class.clone(),
                        opponent_id,
                        opponent_name,
                        opponent_country,
                    });
                }
            }

            let total: i64 = groups.values().map(|acc| acc.count).sum();
            let mut waza_breakdown: Vec<WazaBreakdown> = groups
                .into_iter()
                .map(|(technique_name, acc)| acc.finish(technique_name, total))
                .collect();
            waza_breakdown.sort_by(|a, b| {
                b.count
                    .cmp(&a.count)
                    .then_with(|| a.technique_name.cmp(&b.technique_name))
            });

            let profile = self.db.get_profile(athlete_id).await?;
            let name = profile
                .as_ref()
                .map(|p| p.name.clone())
                .filter(|n| !n.is_empty())
                .or(athlete_name);

            Ok(JudokaStats {
                athlete_id: athlete_id.to_string(),
                perspective,
                name,
                height: profile.as_ref().and_then(|p| p.height),
                age: profile.as_ref().and_then(|p| p.age),
                country: profile
                    .as_ref()
                    .map(|p| p.country.clone())
                    .filter(|c| !c.is_empty()),
                total_techniques: total,
                competition_count: competitions.len() as i64,
                favorite_technique: waza_breakdown.first().map(|w| w.technique_name.clone()),
                waza_breakdown,
            })
        })
        .await
    }
}

struct Accumulator {
    category: String,
    count: i64,
    score_total: i64,
    ippon: i64,
    waza_ari: i64,
    yuko: i64,
    seen_contests: BTreeSet<String>,
    matches: Vec<MatchRef>,
}

impl Accumulator {
    fn new(category: &str) -> Self {
        Self {
            category: category.to_string(),
            count: 0,
            score_total: 0,
            ippon: 0,
            waza_ari: 0,
            yuko: 0,
            seen_contests: BTreeSet::new(),
            matches: Vec::new(),
        }
    }

    fn finish(self, technique_name: String, total: i64) -> WazaBreakdown {
        let percentage = if total > 0 {
            round1(self.count as f64 * 100.0 / total as f64)
        } else {
            0.0
        };
        WazaBreakdown {
            technique_name,
            technique_category: self.category,
            count: self.count,
            percentage,
            avg_score: round2(self.score_total as f64 / self.count.max(1) as f64),
            ippon: self.ippon,
            waza_ari: self.waza_ari,
            yuko: self.yuko,
            matches: self.matches,
        }
    }
}
