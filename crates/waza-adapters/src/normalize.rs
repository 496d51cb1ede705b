//! Per-endpoint normalizers from the remote API's irregular JSON onto the
//! canonical model. Alternate field names are only known here.

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use waza_core::{
    CategoryRef, Competition, CompetitorRef, EventActor, EventTag, JudokaProfile, Match,
    MatchDetail, RawEvent,
};

/// `competition.get_list` → competitions without categories.
pub fn normalize_competitions(payload: &Value) -> Vec<Competition> {
    records(payload, &["competitions", "data"])
        .into_iter()
        .filter_map(normalize_competition)
        .collect()
}

fn normalize_competition(record: &Map<String, Value>) -> Option<Competition> {
    let id = int_field(record, &["id_competition", "id"])?;
    let date = text_field(record, &["date_from", "date"])
        .map(|d| d.replace('/', "-"))
        .unwrap_or_default();
    let year = int_field(record, &["year", "comp_year"])
        .and_then(|y| i32::try_from(y).ok())
        .or_else(|| year_from_date(&date));

    let place: Vec<String> = ["city", "country"]
        .iter()
        .filter_map(|key| text_field(record, &[key]))
        .collect();
    let location = if place.is_empty() {
        text_field(record, &["location"]).unwrap_or_default()
    } else {
        place.join(", ")
    };

    Some(Competition {
        id,
        name: text_field(record, &["name", "title"]).unwrap_or_default(),
        date,
        location,
        event_type: event_type(record),
        year,
        categories: Vec::new(),
    })
}

fn event_type(record: &Map<String, Value>) -> String {
    for key in ["prime_event", "event_type", "type"] {
        match record.get(key) {
            Some(Value::Bool(true)) => return "prime".to_string(),
            Some(Value::String(s)) => {
                let s = s.trim();
                match s.to_ascii_lowercase().as_str() {
                    "" | "0" | "false" => continue,
                    "1" | "true" if key == "prime_event" => return "prime".to_string(),
                    _ => return s.to_string(),
                }
            }
            Some(Value::Number(n)) if key == "prime_event" && n.as_i64() == Some(1) => {
                return "prime".to_string()
            }
            _ => continue,
        }
    }
    String::new()
}

fn year_from_date(date: &str) -> Option<i32> {
    date.get(..4)?.parse().ok()
}

/// `competition.categories_full` → flat list of weight classes. Groups and
/// weight ids are visited in ascending numeric order.
pub fn normalize_categories(payload: &Value) -> Vec<CategoryRef> {
    let groups: Vec<&Map<String, Value>> = match payload {
        Value::Object(map) if map.contains_key("categories") => vec![map],
        Value::Object(map) => sorted_entries(map)
            .into_iter()
            .filter_map(|(_, v)| v.as_object())
            .collect(),
        Value::Array(items) => items.iter().filter_map(Value::as_object).collect(),
        _ => Vec::new(),
    };

    let mut out = Vec::new();
    for group in groups {
        let gender = normalize_gender(&text_field(group, &["gender"]).unwrap_or_default());
        let weights: Vec<(String, String)> = match group.get("categories") {
            Some(Value::Object(map)) => sorted_entries(map)
                .into_iter()
                .filter_map(|(wid, label)| weight_label(label).map(|l| (wid.clone(), l)))
                .collect(),
            Some(Value::Array(items)) => items
                .iter()
                .filter_map(Value::as_object)
                .filter_map(|item| {
                    Some((
                        text_field(item, &["id_weight", "id"])?,
                        text_field(item, &["name", "weight"])?,
                    ))
                })
                .collect(),
            _ => Vec::new(),
        };
        out.extend(weights.into_iter().map(|(weight_id, weight_class)| CategoryRef {
            weight_id,
            weight_class,
            gender: gender.clone(),
        }));
    }
    out
}

fn weight_label(value: &Value) -> Option<String> {
    match value {
        Value::Object(map) => text_field(map, &["name", "weight"]),
        other => scalar_text(other),
    }
}

/// Collapses the many spellings of gender onto `m` / `w`.
pub fn normalize_gender(raw: &str) -> String {
    match raw.trim().to_ascii_lowercase().as_str() {
        "m" | "men" | "male" | "1" => "m".to_string(),
        "w" | "f" | "women" | "female" | "2" => "w".to_string(),
        other => other.to_string(),
    }
}

/// `contest.find` by competition and weight → match list in source order.
pub fn normalize_contests(payload: &Value) -> Vec<Match> {
    records(payload, &["contests"])
        .into_iter()
        .filter_map(|record| {
            Some(Match {
                contest_code: contest_code(record)?,
                match_number: match_number(record),
                competitors: competitors(record),
                techniques: Vec::new(),
            })
        })
        .collect()
}

/// `contest.find` by contest code → the first contest's detail, if any.
pub fn normalize_contest_detail(payload: &Value, fallback_competition_id: i64) -> Option<MatchDetail> {
    let record = records(payload, &["contests"]).into_iter().next()?;
    let events = match record.get("events") {
        Some(Value::Array(items)) => items.iter().filter_map(Value::as_object).map(raw_event).collect(),
        _ => Vec::new(),
    };
    Some(MatchDetail {
        contest_code: contest_code(record)?,
        competition_id: int_field(record, &["id_competition"]).unwrap_or(fallback_competition_id),
        match_number: match_number(record),
        competitors: competitors(record),
        events,
    })
}

fn raw_event(record: &Map<String, Value>) -> RawEvent {
    let tags = array_objects(record, "tags")
        .filter_map(|tag| {
            Some(EventTag::new(
                text_field(tag, &["name", "tag_name"])?,
                text_field(tag, &["group_name", "group"]).unwrap_or_default(),
            ))
        })
        .collect();
    let actors = array_objects(record, "actors")
        .filter_map(|actor| {
            Some(EventActor {
                id_person: text_field(actor, &["id_person", "id"])?,
                family_name: text_field(actor, &["family_name"]).unwrap_or_default(),
                given_name: text_field(actor, &["given_name"]).unwrap_or_default(),
            })
        })
        .collect();
    RawEvent {
        tags,
        actors,
        time_sec: int_field(record, &["time_sec", "time"]),
        score: int_field(record, &["score"]).and_then(|s| i32::try_from(s).ok()),
    }
}

fn contest_code(record: &Map<String, Value>) -> Option<String> {
    text_field(record, &["contest_code_long", "contest_code"])
}

fn match_number(record: &Map<String, Value>) -> Option<i32> {
    int_field(record, &["fight_no", "contest_number"]).and_then(|n| i32::try_from(n).ok())
}

fn competitors(record: &Map<String, Value>) -> Vec<CompetitorRef> {
    ["white", "blue"]
        .iter()
        .filter_map(|side| {
            let id = text_field(record, &[&format!("id_person_{side}")])?;
            let name = text_field(record, &[&format!("person_{side}")]).unwrap_or_else(|| {
                let family = text_field(record, &[&format!("family_name_{side}")]).unwrap_or_default();
                let given = text_field(record, &[&format!("given_name_{side}")]).unwrap_or_default();
                format!("{family} {given}").trim().to_string()
            });
            let country = text_field(
                record,
                &[&format!("country_short_{side}"), &format!("country_{side}")],
            )
            .unwrap_or_default();
            Some(CompetitorRef { id, name, country })
        })
        .collect()
}

/// `competitor.info` → profile stamped with `fetched_at`.
pub fn normalize_competitor(
    person_id: &str,
    payload: &Value,
    fetched_at: DateTime<Utc>,
) -> Option<JudokaProfile> {
    let record = match payload {
        Value::Object(map) => map,
        Value::Array(items) => items.first()?.as_object()?,
        _ => return None,
    };
    if record.is_empty() {
        return None;
    }

    let family = text_field(record, &["family_name"]).unwrap_or_default();
    let given = text_field(record, &["given_name"]).unwrap_or_default();
    let name = match format!("{family} {given}").trim() {
        "" => text_field(record, &["name"]).unwrap_or_default(),
        joined => joined.to_string(),
    };

    Some(JudokaProfile {
        id: person_id.to_string(),
        name,
        height: positive_measure(record.get("height")),
        age: positive_measure(record.get("age")),
        country: text_field(record, &["country", "country_short"]).unwrap_or_default(),
        last_updated: fetched_at,
    })
}

/// Leading digits of a string or number, e.g. `"178 cm"` → 178.
fn positive_measure(value: Option<&Value>) -> Option<i32> {
    let text = scalar_text(value?)?;
    let digits: String = text.chars().take_while(char::is_ascii_digit).collect();
    digits.parse::<i32>().ok().filter(|v| *v > 0)
}

/// Unwraps the envelope: a bare list, an object holding the list under one
/// of `keys`, a single record, or an object keyed by record id.
fn records<'a>(payload: &'a Value, keys: &[&str]) -> Vec<&'a Map<String, Value>> {
    match payload {
        Value::Array(items) => items.iter().filter_map(Value::as_object).collect(),
        Value::Object(map) => {
            if let Some(inner) = keys.iter().find_map(|k| map.get(*k)) {
                return records(inner, &[]);
            }
            if map.values().all(Value::is_object) && !map.is_empty() {
                sorted_entries(map)
                    .into_iter()
                    .filter_map(|(_, v)| v.as_object())
                    .collect()
            } else if map.is_empty() {
                Vec::new()
            } else {
                vec![map]
            }
        }
        _ => Vec::new(),
    }
}

/// Object entries ordered by numeric key where keys are numeric.
fn sorted_entries(map: &Map<String, Value>) -> Vec<(&String, &Value)> {
    let mut entries: Vec<_> = map.iter().collect();
    entries.sort_by(|(a, _), (b, _)| {
        match (a.parse::<i64>(), b.parse::<i64>()) {
            (Ok(x), Ok(y)) => x.cmp(&y),
            _ => a.cmp(b),
        }
    });
    entries
}

fn array_objects<'a>(
    record: &'a Map<String, Value>,
    key: &str,
) -> impl Iterator<Item = &'a Map<String, Value>> {
    record
        .get(key)
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter_map(Value::as_object)
}

fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => {
            let s = s.trim();
            (!s.is_empty()).then(|| s.to_string())
        }
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn text_field<K: AsRef<str>>(record: &Map<String, Value>, keys: &[K]) -> Option<String> {
    keys.iter()
        .find_map(|key| record.get(key.as_ref()).and_then(scalar_text))
}

fn int_field(record: &Map<String, Value>, keys: &[&str]) -> Option<i64> {
    keys.iter().find_map(|key| match record.get(*key)? {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    })
}
