//! Core domain model for waza: competitions, extracted techniques, athlete
//! profiles and the filter signature shared by the storage and web layers.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub mod extract;

pub use extract::{
    canonical_technique_name, extract, extract_with_context, has_techniques, is_excluded_hold,
    technique_category_for, EventActor, EventTag, MatchDetail, RawEvent, TechniqueContext,
};

pub const CRATE_NAME: &str = "waza-core";

pub const DEFAULT_TECHNIQUE_CATEGORY: &str = "tachi-waza";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("unknown score group: {0}")]
    ScoreGroup(String),
    #[error("invalid height range: {0}")]
    HeightRange(String),
    #[error("unknown filter field: {0}")]
    UnknownField(String),
    #[error("invalid value for {field}: {value}")]
    InvalidValue { field: &'static str, value: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ScoreGroup {
    Ippon,
    #[serde(rename = "Waza-ari")]
    WazaAri,
    Yuko,
    Penalty,
    Unknown,
}

impl ScoreGroup {
    pub const ALL: [ScoreGroup; 5] = [
        ScoreGroup::Ippon,
        ScoreGroup::WazaAri,
        ScoreGroup::Yuko,
        ScoreGroup::Penalty,
        ScoreGroup::Unknown,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ScoreGroup::Ippon => "Ippon",
            ScoreGroup::WazaAri => "Waza-ari",
            ScoreGroup::Yuko => "Yuko",
            ScoreGroup::Penalty => "Penalty",
            ScoreGroup::Unknown => "Unknown",
        }
    }

    /// Infers a group from a bare numeric score when no tag named one.
    pub fn from_score(score: i32) -> Self {
        match score {
            10 => ScoreGroup::Ippon,
            7 => ScoreGroup::WazaAri,
            5 => ScoreGroup::Yuko,
            s if s < 0 => ScoreGroup::Penalty,
            _ => ScoreGroup::Unknown,
        }
    }
}

impl fmt::Display for ScoreGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ScoreGroup {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace(' ', "-");
        match normalized.as_str() {
            "ippon" => Ok(ScoreGroup::Ippon),
            "waza-ari" | "wazaari" => Ok(ScoreGroup::WazaAri),
            "yuko" => Ok(ScoreGroup::Yuko),
            "penalty" => Ok(ScoreGroup::Penalty),
            "unknown" => Ok(ScoreGroup::Unknown),
            _ => Err(ParseError::ScoreGroup(s.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Competition {
    pub id: i64,
    pub name: String,
    pub date: String,
    pub location: String,
    pub event_type: String,
    pub year: Option<i32>,
    #[serde(default)]
    pub categories: Vec<Category>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    pub id: String,
    pub weight_id: String,
    pub weight_class: String,
    pub gender: String,
    #[serde(default)]
    pub matches: Vec<Match>,
}

impl Category {
    pub fn composite_id(competition_id: i64, weight_id: &str) -> String {
        format!("{competition_id}-{weight_id}")
    }
}

/// Weight-class reference as listed by the remote API, before any matches
/// have been fetched for it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryRef {
    pub weight_id: String,
    pub weight_class: String,
    pub gender: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Match {
    pub contest_code: String,
    pub match_number: Option<i32>,
    #[serde(default)]
    pub competitors: Vec<CompetitorRef>,
    #[serde(default)]
    pub techniques: Vec<Technique>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct CompetitorRef {
    pub id: String,
    pub name: String,
    pub country: String,
}

/// One scored technique event. Competition and category context is copied
/// onto every record so the read path never has to join for it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Technique {
    pub competitor_id: String,
    pub competitor_name: String,
    pub opponent_id: Option<String>,
    pub opponent_name: Option<String>,
    pub opponent_country: Option<String>,
    pub technique_name: String,
    pub technique_type: String,
    pub technique_category: String,
    pub side: String,
    pub score: i32,
    pub score_group: ScoreGroup,
    pub timestamp: i64,
    pub note: String,
    pub competition_id: i64,
    pub match_contest_code: String,
    pub competition_name: String,
    pub weight_class: String,
    pub gender: String,
    pub event_type: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JudokaProfile {
    pub id: String,
    pub name: String,
    pub height: Option<i32>,
    pub age: Option<i32>,
    pub country: String,
    pub last_updated: DateTime<Utc>,
}

/// Half-open height bracket `[min, max)` in centimetres.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct HeightRange {
    pub min: Option<i32>,
    pub max: Option<i32>,
}

impl HeightRange {
    pub fn new(min: Option<i32>, max: Option<i32>) -> Self {
        Self { min, max }
    }

    pub fn is_bounded(&self) -> bool {
        self.min.is_some() || self.max.is_some()
    }

    pub fn contains(&self, height: i32) -> bool {
        self.min.map_or(true, |min| height >= min) && self.max.map_or(true, |max| height < max)
    }
}

impl fmt::Display for HeightRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.min, self.max) {
            (None, Some(max)) => write!(f, "<{max}"),
            (Some(min), None) => write!(f, "{min}+"),
            (Some(min), Some(max)) => write!(f, "{min}-{max}"),
            (None, None) => f.write_str("all"),
        }
    }
}

impl FromStr for HeightRange {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let raw = s.trim();
        let invalid = || ParseError::HeightRange(s.to_string());
        let parse = |v: &str| v.trim().parse::<i32>().map_err(|_| invalid());

        if raw.eq_ignore_ascii_case("all") {
            return Ok(Self::new(None, None));
        }
        if let Some(max) = raw.strip_prefix('<') {
            return Ok(Self::new(None, Some(parse(max)?)));
        }
        if let Some(min) = raw.strip_suffix('+') {
            return Ok(Self::new(Some(parse(min)?), None));
        }
        let (min, max) = raw.split_once('-').ok_or_else(invalid)?;
        let (min, max) = (parse(min)?, parse(max)?);
        if min >= max {
            return Err(invalid());
        }
        Ok(Self::new(Some(min), Some(max)))
    }
}

impl TryFrom<String> for HeightRange {
    type Error = ParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<HeightRange> for String {
    fn from(value: HeightRange) -> Self {
        value.to_string()
    }
}

/// Sparse set of optional predicates applied to technique aggregates.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TechniqueFilters {
    pub gender: Option<String>,
    pub weight_class: Option<String>,
    pub event_type: Option<String>,
    pub competition_id: Option<i64>,
    pub year: Option<i32>,
    pub height_range: Option<HeightRange>,
    pub technique_category: Option<String>,
    pub score_group: Option<ScoreGroup>,
}

impl TechniqueFilters {
    pub const FIELDS: [&'static str; 8] = [
        "competitionId",
        "eventType",
        "gender",
        "heightRange",
        "scoreGroup",
        "techniqueCategory",
        "weightClass",
        "year",
    ];

    /// Builds filters from `(field, value)` pairs in any order. Blank values
    /// are treated as absent.
    pub fn from_pairs<'a, I>(pairs: I) -> Result<Self, ParseError>
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let mut filters = Self::default();
        for (field, value) in pairs {
            filters.set(field, value)?;
        }
        Ok(filters)
    }

    pub fn set(&mut self, field: &str, value: &str) -> Result<(), ParseError> {
        let value = value.trim();
        let text = non_blank(value);
        match field {
            "gender" => self.gender = text,
            "weightClass" => self.weight_class = text,
            "eventType" => self.event_type = text,
            "techniqueCategory" => self.technique_category = text,
            "competitionId" => {
                self.competition_id = text
                    .map(|v| {
                        v.parse().map_err(|_| ParseError::InvalidValue {
                            field: "competitionId",
                            value: v,
                        })
                    })
                    .transpose()?
            }
            "year" => {
                self.year = text
                    .map(|v| {
                        v.parse().map_err(|_| ParseError::InvalidValue {
                            field: "year",
                            value: v,
                        })
                    })
                    .transpose()?
            }
            "heightRange" => self.height_range = text.map(|v| v.parse()).transpose()?,
            "scoreGroup" => self.score_group = text.map(|v| v.parse()).transpose()?,
            other => return Err(ParseError::UnknownField(other.to_string())),
        }
        Ok(())
    }

    pub fn is_empty(&self) -> bool {
        self.signature().is_empty()
    }

    /// Canonical, order-independent serialization of the present predicates.
    pub fn signature(&self) -> FilterSignature {
        let mut pairs = Vec::new();
        let mut push = |field: &'static str, value: Option<String>| {
            if let Some(value) = value.and_then(|v| non_blank(&v)) {
                pairs.push((field, value));
            }
        };
        push("gender", self.gender.clone());
        push("weightClass", self.weight_class.clone());
        push("eventType", self.event_type.clone());
        push("competitionId", self.competition_id.map(|v| v.to_string()));
        push("year", self.year.map(|v| v.to_string()));
        push(
            "heightRange",
            self.height_range
                .filter(HeightRange::is_bounded)
                .map(|v| v.to_string()),
        );
        push("techniqueCategory", self.technique_category.clone());
        push("scoreGroup", self.score_group.map(|v| v.to_string()));
        pairs.sort();
        FilterSignature(pairs)
    }
}

fn non_blank(value: &str) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct FilterSignature(Vec<(&'static str, String)>);

impl FilterSignature {
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn pairs(&self) -> &[(&'static str, String)] {
        &self.0
    }
}

impl fmt::Display for FilterSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            return f.write_str("all");
        }
        let joined = self
            .0
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join("&");
        f.write_str(&joined)
    }
}
