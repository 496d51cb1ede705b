//! Filter-driven query composition over the `techniques` table.
//!
//! A [`TechniqueQuery`] is a conjunction of predicates plus the set of joins
//! those predicates need. Joins are a set, so `year` and `heightRange` can be
//! active together and still produce a single statement.

use std::collections::BTreeSet;

use sqlx::{QueryBuilder, Sqlite};
use waza_core::TechniqueFilters;

/// Technique names that record a walkover or forfeit rather than a throw.
pub const WALKOVER_MARKERS: [&str; 5] = [
    "fusen-gachi",
    "kiken-gachi",
    "fusen-make",
    "kiken-make",
    "walkover",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Join {
    Competitions,
    Profiles,
}

impl Join {
    fn clause(self) -> &'static str {
        match self {
            Join::Competitions => {
                " LEFT JOIN competitions c ON c.competition_id = t.competition_id"
            }
            Join::Profiles => " INNER JOIN judoka_profiles p ON p.id = t.competitor_id",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum BindValue {
    Text(String),
    Int(i64),
}

impl From<&str> for BindValue {
    fn from(value: &str) -> Self {
        BindValue::Text(value.to_string())
    }
}

impl From<String> for BindValue {
    fn from(value: String) -> Self {
        BindValue::Text(value)
    }
}

impl From<i64> for BindValue {
    fn from(value: i64) -> Self {
        BindValue::Int(value)
    }
}

impl From<i32> for BindValue {
    fn from(value: i32) -> Self {
        BindValue::Int(i64::from(value))
    }
}

#[derive(Debug, Clone)]
struct Predicate {
    sql: String,
    binds: Vec<BindValue>,
}

#[derive(Debug, Clone)]
pub struct TechniqueQuery {
    predicates: Vec<Predicate>,
    joins: BTreeSet<Join>,
}

impl Default for TechniqueQuery {
    fn default() -> Self {
        Self::new()
    }
}

impl TechniqueQuery {
    /// Base query: every technique except walkover markers.
    pub fn new() -> Self {
        let placeholders = vec!["?"; WALKOVER_MARKERS.len()].join(", ");
        let query = Self {
            predicates: Vec::new(),
            joins: BTreeSet::new(),
        };
        query.and_where(
            format!("LOWER(t.technique_name) NOT IN ({placeholders})"),
            WALKOVER_MARKERS.iter().map(|m| BindValue::from(*m)).collect(),
        )
    }

    pub fn from_filters(filters: &TechniqueFilters) -> Self {
        let mut query = Self::new();
        let text_fields = [
            ("t.gender", &filters.gender),
            ("t.weight_class", &filters.weight_class),
            ("t.event_type", &filters.event_type),
            ("t.technique_category", &filters.technique_category),
        ];
        for (column, value) in text_fields {
            if let Some(value) = value.as_deref().map(str::trim).filter(|v| !v.is_empty()) {
                query = query.and_where(format!("{column} = ?"), vec![value.into()]);
            }
        }
        if let Some(competition_id) = filters.competition_id {
            query = query.and_where("t.competition_id = ?", vec![competition_id.into()]);
        }
        if let Some(score_group) = filters.score_group {
            query = query.and_where("t.score_group = ?", vec![score_group.as_str().into()]);
        }
        if let Some(year) = filters.year {
            query = query
                .require(Join::Competitions)
                .and_where("c.year = ?", vec![year.into()]);
        }
        if let Some(range) = filters.height_range.filter(|r| r.is_bounded()) {
            query = query.require(Join::Profiles);
            if let Some(min) = range.min {
                query = query.and_where("p.height >= ?", vec![min.into()]);
            }
            if let Some(max) = range.max {
                query = query.and_where("p.height < ?", vec![max.into()]);
            }
        }
        query
    }

    pub fn performed_by(self, athlete_id: &str) -> Self {
        self.and_where("t.competitor_id = ?", vec![athlete_id.into()])
    }

    pub fn received_by(self, athlete_id: &str) -> Self {
        self.and_where("t.opponent_id = ?", vec![athlete_id.into()])
    }

    pub fn require(mut self, join: Join) -> Self {
        self.joins.insert(join);
        self
    }

    /// Appends one conjunct. `sql` uses `?` placeholders, one per bind.
    pub fn and_where(mut self, sql: impl Into<String>, binds: Vec<BindValue>) -> Self {
        self.predicates.push(Predicate {
            sql: sql.into(),
            binds,
        });
        self
    }

    pub fn joins(&self) -> &BTreeSet<Join> {
        &self.joins
    }

    pub fn binds(&self) -> Vec<BindValue> {
        self.predicates
            .iter()
            .flat_map(|p| p.binds.iter().cloned())
            .collect()
    }

    /// `FROM ... WHERE ...` text with placeholders, as sent to SQLite.
    pub fn from_where_sql(&self) -> String {
        let mut sql = String::from(" FROM techniques t");
        for join in &self.joins {
            sql.push_str(join.clause());
        }
        let conjuncts: Vec<_> = self
            .predicates
            .iter()
            .map(|p| format!("({})", p.sql))
            .collect();
        if !conjuncts.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&conjuncts.join(" AND "));
        }
        sql
    }

    /// Starts a statement `SELECT <columns> FROM techniques t ... WHERE ...`.
    /// Callers append grouping, ordering and limits to the returned builder.
    pub fn select(&self, columns: &str) -> QueryBuilder<'static, Sqlite> {
        let mut builder = QueryBuilder::new(format!("SELECT {columns} FROM techniques t"));
        for join in &self.joins {
            builder.push(join.clause());
        }
        for (index, predicate) in self.predicates.iter().enumerate() {
            builder.push(if index == 0 { " WHERE (" } else { " AND (" });
            let mut binds = predicate.binds.iter();
            let mut pieces = predicate.sql.split('?').peekable();
            while let Some(piece) = pieces.next() {
                builder.push(piece);
                if pieces.peek().is_some() {
                    match binds.next() {
                        Some(BindValue::Text(v)) => builder.push_bind(v.clone()),
                        Some(BindValue::Int(v)) => builder.push_bind(*v),
                        None => builder.push("NULL"),
                    };
                }
            }
            builder.push(")");
        }
        builder
    }
}
