//! SQLite-backed persistence for competitions, techniques and athlete profiles.

use std::collections::BTreeSet;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::migrate::Migrator;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::{QueryBuilder, Row, Sqlite, Transaction};
use tracing::debug;
use waza_core::{Category, Competition, JudokaProfile, ScoreGroup, Technique};

static MIGRATOR: Migrator = sqlx::migrate!("./migrations");

/// Rows per multi-row INSERT; keeps bound parameters under SQLite's limit.
const INSERT_CHUNK: usize = 40;

#[derive(Debug, Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Opens (creating if missing) and migrates the database at `url`.
    pub async fn connect(url: &str) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(url)
            .with_context(|| format!("parsing database url {url}"))?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_secs(10));
        let pool = SqlitePoolOptions::new()
            .max_connections(8)
            .connect_with(options)
            .await
            .with_context(|| format!("opening database {url}"))?;
        let db = Self { pool };
        db.migrate().await?;
        Ok(db)
    }

    /// Private in-memory database. A single long-lived connection keeps the
    /// schema alive for the lifetime of the pool.
    pub async fn in_memory() -> Result<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")
            .context("parsing in-memory database url")?;
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await
            .context("opening in-memory database")?;
        let db = Self { pool };
        db.migrate().await?;
        Ok(db)
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn migrate(&self) -> Result<()> {
        MIGRATOR
            .run(&self.pool)
            .await
            .context("applying database migrations")
    }

    pub async fn upsert_competition(&self, competition: &Competition) -> Result<()> {
        let mut tx = self.pool.begin().await.context("beginning transaction")?;
        upsert_competition_tx(&mut tx, competition).await?;
        tx.commit().await.context("committing competition upsert")
    }

    pub async fn get_competition(&self, competition_id: i64) -> Result<Option<Competition>> {
        let row = sqlx::query(
            r#"
            SELECT competition_id, name, date, location, event_type, year, categories_blob
              FROM competitions
             WHERE competition_id = ?
            "#,
        )
        .bind(competition_id)
        .fetch_optional(&self.pool)
        .await
        .with_context(|| format!("loading competition {competition_id}"))?;

        row.map(|r| competition_from_row(&r)).transpose()
    }

    /// Newest first; categories are decoded from the stored blob.
    pub async fn list_competitions(&self) -> Result<Vec<Competition>> {
        let rows = sqlx::query(
            r#"
            SELECT competition_id, name, date, location, event_type, year, categories_blob
              FROM competitions
             ORDER BY date DESC, competition_id DESC
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .context("listing competitions")?;

        rows.iter().map(competition_from_row).collect()
    }

    pub async fn competition_ids(&self) -> Result<BTreeSet<i64>> {
        let rows = sqlx::query("SELECT competition_id FROM competitions")
            .fetch_all(&self.pool)
            .await
            .context("listing competition ids")?;
        rows.iter()
            .map(|r| r.try_get::<i64, _>("competition_id").map_err(anyhow::Error::from))
            .collect()
    }

    /// Deletes every technique of `competition_id` and inserts `techniques`
    /// in one transaction. Returns the number of rows inserted.
    pub async fn replace_techniques(
        &self,
        competition_id: i64,
        techniques: &[Technique],
    ) -> Result<u64> {
        let mut tx = self.pool.begin().await.context("beginning transaction")?;
        let inserted = replace_techniques_tx(&mut tx, competition_id, techniques).await?;
        tx.commit().await.context("committing technique replacement")?;
        Ok(inserted)
    }

    /// Upserts the competition and replaces its techniques atomically.
    pub async fn persist_competition(
        &self,
        competition: &Competition,
        techniques: &[Technique],
    ) -> Result<u64> {
        let mut tx = self.pool.begin().await.context("beginning transaction")?;
        upsert_competition_tx(&mut tx, competition).await?;
        let inserted = replace_techniques_tx(&mut tx, competition.id, techniques).await?;
        tx.commit()
            .await
            .with_context(|| format!("committing competition {}", competition.id))?;
        debug!(competition_id = competition.id, inserted, "competition persisted");
        Ok(inserted)
    }

    pub async fn techniques_for_competition(&self, competition_id: i64) -> Result<Vec<Technique>> {
        let rows = sqlx::query(
            r#"
            SELECT competitor_id, competitor_name, opponent_id, opponent_name, opponent_country,
                   technique_name, technique_type, technique_category, side, score, score_group,
                   timestamp, note, competition_id, match_contest_code, competition_name,
                   weight_class, gender, event_type
              FROM techniques
             WHERE competition_id = ?
             ORDER BY id
            "#,
        )
        .bind(competition_id)
        .fetch_all(&self.pool)
        .await
        .with_context(|| format!("loading techniques for competition {competition_id}"))?;

        rows.iter().map(technique_from_row).collect()
    }

    pub async fn technique_count(&self) -> Result<i64> {
        sqlx::query_scalar("SELECT COUNT(*) FROM techniques")
            .fetch_one(&self.pool)
            .await
            .context("counting techniques")
    }

    pub async fn upsert_profile(&self, profile: &JudokaProfile) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO judoka_profiles (id, name, height, age, country, last_updated)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                height = excluded.height,
                age = excluded.age,
                country = excluded.country,
                last_updated = excluded.last_updated
            "#,
        )
        .bind(&profile.id)
        .bind(&profile.name)
        .bind(profile.height)
        .bind(profile.age)
        .bind(&profile.country)
        .bind(profile.last_updated)
        .execute(&self.pool)
        .await
        .with_context(|| format!("upserting profile {}", profile.id))?;
        Ok(())
    }

    pub async fn get_profile(&self, id: &str) -> Result<Option<JudokaProfile>> {
        let row = sqlx::query(
            "SELECT id, name, height, age, country, last_updated FROM judoka_profiles WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .with_context(|| format!("loading profile {id}"))?;

        row.map(|r| profile_from_row(&r)).transpose()
    }

    pub async fn profile_ids(&self) -> Result<BTreeSet<String>> {
        let rows = sqlx::query("SELECT id FROM judoka_profiles")
            .fetch_all(&self.pool)
            .await
            .context("listing profile ids")?;
        rows.iter()
            .map(|r| r.try_get::<String, _>("id").map_err(anyhow::Error::from))
            .collect()
    }

    /// Every distinct non-empty performer or opponent id, sorted.
    pub async fn athlete_ids(&self) -> Result<BTreeSet<String>> {
        let rows = sqlx::query(
            r#"
            SELECT competitor_id AS athlete_id FROM techniques WHERE competitor_id <> ''
            UNION
            SELECT opponent_id AS athlete_id FROM techniques
             WHERE opponent_id IS NOT NULL AND opponent_id <> ''
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .context("listing athlete ids")?;
        rows.iter()
            .map(|r| r.try_get::<String, _>("athlete_id").map_err(anyhow::Error::from))
            .collect()
    }

    /// Checkpoints the write-ahead log into the main database file.
    pub async fn flush(&self) -> Result<()> {
        sqlx::query("PRAGMA wal_checkpoint(PASSIVE)")
            .execute(&self.pool)
            .await
            .context("checkpointing write-ahead log")?;
        Ok(())
    }
}

async fn upsert_competition_tx(
    tx: &mut Transaction<'_, Sqlite>,
    competition: &Competition,
) -> Result<()> {
    let blob = serde_json::to_string(&categories_for_blob(&competition.categories))
        .context("serializing categories blob")?;
    sqlx::query(
        r#"
        INSERT INTO competitions (competition_id, name, date, location, event_type, year, categories_blob)
        VALUES (?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(competition_id) DO UPDATE SET
            name = excluded.name,
            date = excluded.date,
            location = excluded.location,
            event_type = excluded.event_type,
            year = excluded.year,
            categories_blob = excluded.categories_blob
        "#,
    )
    .bind(competition.id)
    .bind(&competition.name)
    .bind(&competition.date)
    .bind(&competition.location)
    .bind(&competition.event_type)
    .bind(competition.year)
    .bind(blob)
    .execute(&mut **tx)
    .await
    .with_context(|| format!("upserting competition {}", competition.id))?;
    Ok(())
}

async fn replace_techniques_tx(
    tx: &mut Transaction<'_, Sqlite>,
    competition_id: i64,
    techniques: &[Technique],
) -> Result<u64> {
    sqlx::query("DELETE FROM techniques WHERE competition_id = ?")
        .bind(competition_id)
        .execute(&mut **tx)
        .await
        .with_context(|| format!("purging techniques for competition {competition_id}"))?;

    let mut inserted = 0u64;
    for chunk in techniques.chunks(INSERT_CHUNK) {
        let mut builder: QueryBuilder<Sqlite> = QueryBuilder::new(
            "INSERT INTO techniques (competitor_id, competitor_name, technique_name, technique_type, \
             technique_category, side, score, timestamp, note, competition_id, match_contest_code, \
             competition_name, weight_class, gender, event_type, score_group, opponent_id, \
             opponent_name, opponent_country) ",
        );
        builder.push_values(chunk, |mut b, t| {
            b.push_bind(&t.competitor_id)
                .push_bind(&t.competitor_name)
                .push_bind(&t.technique_name)
                .push_bind(&t.technique_type)
                .push_bind(&t.technique_category)
                .push_bind(&t.side)
                .push_bind(t.score)
                .push_bind(t.timestamp)
                .push_bind(&t.note)
                .push_bind(competition_id)
                .push_bind(&t.match_contest_code)
                .push_bind(&t.competition_name)
                .push_bind(&t.weight_class)
                .push_bind(&t.gender)
                .push_bind(&t.event_type)
                .push_bind(t.score_group.as_str())
                .push_bind(&t.opponent_id)
                .push_bind(&t.opponent_name)
                .push_bind(&t.opponent_country);
        });
        let result = builder
            .build()
            .execute(&mut **tx)
            .await
            .with_context(|| format!("inserting techniques for competition {competition_id}"))?;
        inserted += result.rows_affected();
    }
    Ok(inserted)
}

/// Match lists are kept in the blob for reference; techniques live in their
/// own table and are not duplicated here.
fn categories_for_blob(categories: &[Category]) -> Vec<Category> {
    categories
        .iter()
        .map(|category| {
            let mut category = category.clone();
            for m in &mut category.matches {
                m.techniques.clear();
            }
            category
        })
        .collect()
}

fn competition_from_row(row: &SqliteRow) -> Result<Competition> {
    let blob: String = row.try_get("categories_blob")?;
    let categories: Vec<Category> =
        serde_json::from_str(&blob).context("decoding categories blob")?;
    Ok(Competition {
        id: row.try_get("competition_id")?,
        name: row.try_get("name")?,
        date: row.try_get("date")?,
        location: row.try_get("location")?,
        event_type: row.try_get("event_type")?,
        year: row.try_get("year")?,
        categories,
    })
}

pub(crate) fn technique_from_row(row: &SqliteRow) -> Result<Technique> {
    let score_group: String = row.try_get("score_group")?;
    Ok(Technique {
        competitor_id: row.try_get("competitor_id")?,
        competitor_name: row.try_get("competitor_name")?,
        opponent_id: row.try_get("opponent_id")?,
        opponent_name: row.try_get("opponent_name")?,
        opponent_country: row.try_get("opponent_country")?,
        technique_name: row.try_get("technique_name")?,
        technique_type: row.try_get("technique_type")?,
        technique_category: row.try_get("technique_category")?,
        side: row.try_get("side")?,
        score: row.try_get("score")?,
        score_group: score_group.parse().unwrap_or(ScoreGroup::Unknown),
        timestamp: row.try_get("timestamp")?,
        note: row.try_get("note")?,
        competition_id: row.try_get("competition_id")?,
        match_contest_code: row.try_get("match_contest_code")?,
        competition_name: row.try_get("competition_name")?,
        weight_class: row.try_get("weight_class")?,
        gender: row.try_get("gender")?,
        event_type: row.try_get("event_type")?,
    })
}

pub(crate) fn profile_from_row(row: &SqliteRow) -> Result<JudokaProfile> {
    let last_updated: DateTime<Utc> = row.try_get("last_updated")?;
    Ok(JudokaProfile {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        height: row.try_get("height")?,
        age: row.try_get("age")?,
        country: row.try_get("country")?,
        last_updated,
    })
}


#[cfg(test)]
mod tests {
    use super::fixtures::{competition, technique};
    use super::*;
    use chrono::TimeZone;
    use tempfile::tempdir;
    use waza_core::{Match, ScoreGroup};

    #[tokio::test]
    async fn corrupt_category_blob_is_an_error() {
        let db = Database::in_memory().await.expect("db");
        sqlx::query(
            "INSERT INTO competitions (competition_id, name, categories_blob) VALUES (?, ?, ?)",
        )
        .bind(9_i64)
        .bind("Broken")
        .bind("{not json")
        .execute(db.pool())
        .await
        .expect("raw insert");

        let err = db.get_competition(9).await.expect_err("corrupt blob");
        assert!(format!("{err:#}").contains("decoding categories blob"));
        assert!(db.list_competitions().await.is_err());
    }

    #[tokio::test]
    async fn competition_upsert_overwrites_instead_of_duplicating() {
        let db = Database::in_memory().await.expect("db");
        let mut comp = competition(1, 2023);
        db.upsert_competition(&comp).await.expect("first upsert");
        comp.name = "Renamed".to_string();
        db.upsert_competition(&comp).await.expect("second upsert");

        let all = db.list_competitions().await.expect("list");
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].name, "Renamed");
        assert_eq!(db.competition_ids().await.expect("ids").len(), 1);
    }

    #[tokio::test]
    async fn replace_techniques_never_merges() {
        let db = Database::in_memory().await.expect("db");
        let first: Vec<_> = (0..60)
            .map(|i| technique(7, &format!("c{i}"), "1", Some("2"), "seoi-nage", ScoreGroup::Ippon))
            .collect();
        let second = vec![technique(7, "x", "3", None, "uchi-mata", ScoreGroup::Yuko)];
        let other = vec![technique(8, "y", "4", None, "o-goshi", ScoreGroup::WazaAri)];

        assert_eq!(db.replace_techniques(7, &first).await.expect("first"), 60);
        db.replace_techniques(8, &other).await.expect("other");
        assert_eq!(db.replace_techniques(7, &second).await.expect("second"), 1);

        let stored = db.techniques_for_competition(7).await.expect("load");
        assert_eq!(stored, second);
        assert_eq!(db.techniques_for_competition(8).await.expect("load").len(), 1);
        assert_eq!(db.technique_count().await.expect("count"), 2);
    }

    #[tokio::test]
    async fn persist_competition_strips_techniques_from_blob() {
        let db = Database::in_memory().await.expect("db");
        let t = technique(9, "m1", "1", Some("2"), "ko-uchi-gari", ScoreGroup::Yuko);
        let mut comp = competition(9, 2024);
        comp.categories.push(Category {
            id: Category::composite_id(9, "1"),
            weight_id: "1".to_string(),
            weight_class: "-60".to_string(),
            gender: "m".to_string(),
            matches: vec![Match {
                contest_code: "m1".to_string(),
                match_number: Some(1),
                competitors: Vec::new(),
                techniques: vec![t.clone()],
            }],
        });

        db.persist_competition(&comp, &[t]).await.expect("persist");
        let loaded = db.get_competition(9).await.expect("get").expect("present");
        assert_eq!(loaded.categories.len(), 1);
        assert!(loaded.categories[0].matches[0].techniques.is_empty());
        assert_eq!(loaded.year, Some(2024));
        assert!(db.get_competition(10).await.expect("get").is_none());
    }

    #[tokio::test]
    async fn profiles_upsert_by_id() {
        let db = Database::in_memory().await.expect("db");
        let ts = Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).single().expect("ts");
        let mut profile = JudokaProfile {
            id: "55".to_string(),
            name: "ONO Shohei".to_string(),
            height: Some(170),
            age: None,
            country: "JPN".to_string(),
            last_updated: ts,
        };
        db.upsert_profile(&profile).await.expect("insert");
        profile.age = Some(31);
        db.upsert_profile(&profile).await.expect("update");

        let loaded = db.get_profile("55").await.expect("get").expect("present");
        assert_eq!(loaded, profile);
        assert_eq!(db.profile_ids().await.expect("ids").len(), 1);
    }

    #[tokio::test]
    async fn athlete_ids_cover_performers_and_opponents() {
        let db = Database::in_memory().await.expect("db");
        db.replace_techniques(
            1,
            &[
                technique(1, "a", "10", Some("11"), "seoi-nage", ScoreGroup::Ippon),
                technique(1, "b", "11", None, "uchi-mata", ScoreGroup::Yuko),
                technique(1, "c", "12", Some(""), "o-goshi", ScoreGroup::Yuko),
            ],
        )
        .await
        .expect("insert");

        let ids: Vec<_> = db.athlete_ids().await.expect("ids").into_iter().collect();
        assert_eq!(ids, vec!["10", "11", "12"]);
    }

    #[tokio::test]
    async fn file_database_is_created_and_flushable() {
        let dir = tempdir().expect("tempdir");
        let url = format!("sqlite://{}", dir.path().join("waza.db").display());
        let db = Database::connect(&url).await.expect("connect");
        db.upsert_competition(&competition(3, 2022)).await.expect("upsert");
        db.flush().await.expect("flush");
        assert!(dir.path().join("waza.db").exists());
    }
}
