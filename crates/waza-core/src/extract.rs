//! Technique extraction from raw match-event payloads.
//!
//! Pure functions only: the same `MatchDetail` always yields the same ordered
//! list of techniques.

use serde::{Deserialize, Serialize};

use crate::{CompetitorRef, ScoreGroup, Technique, DEFAULT_TECHNIQUE_CATEGORY};

/// Holds, chokes and joint locks. These belong to a separate category and are
/// never reported as throwing techniques.
const EXCLUDED_HOLDS: &[&str] = &[
    "kesa-gatame",
    "kuzure-kesa-gatame",
    "makura-kesa-gatame",
    "ushiro-kesa-gatame",
    "kata-gatame",
    "kami-shiho-gatame",
    "kuzure-kami-shiho-gatame",
    "tate-shiho-gatame",
    "uki-gatame",
    "ura-gatame",
    "juji-gatame",
    "ude-garami",
    "ude-gatame",
    "hiza-gatame",
    "waki-gatame",
    "hara-gatame",
    "ashi-gatame",
    "te-gatame",
    "sankaku-gatame",
    "hadaka-jime",
    "okuri-eri-jime",
    "kata-ha-jime",
    "katate-jime",
    "ryote-jime",
    "sode-guruma-jime",
    "tsukkomi-jime",
    "sankaku-jime",
    "nami-juji-jime",
    "gyaku-juji-jime",
    "kata-juji-jime",
    "do-jime",
];

const HOLD_START_TAGS: &[&str] = &["osaekomi", "osaekomi-start", "hold-start", "toketa"];

/// Tag group names that carry a score, in priority order. First match wins.
const SCORE_PRIORITY: &[(&str, i32, ScoreGroup)] = &[
    ("ippon", 10, ScoreGroup::Ippon),
    ("waza-ari-awasete-ippon", 10, ScoreGroup::Ippon),
    ("waza-ari", 7, ScoreGroup::WazaAri),
    ("yuko", 5, ScoreGroup::Yuko),
    ("shido", -1, ScoreGroup::Penalty),
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct MatchDetail {
    pub contest_code: String,
    pub competition_id: i64,
    pub match_number: Option<i32>,
    #[serde(default)]
    pub competitors: Vec<CompetitorRef>,
    #[serde(default)]
    pub events: Vec<RawEvent>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct RawEvent {
    #[serde(default)]
    pub tags: Vec<EventTag>,
    #[serde(default)]
    pub actors: Vec<EventActor>,
    pub time_sec: Option<i64>,
    pub score: Option<i32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct EventTag {
    pub name: String,
    #[serde(default)]
    pub group_name: String,
}

impl EventTag {
    pub fn new(name: impl Into<String>, group_name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            group_name: group_name.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct EventActor {
    pub id_person: String,
    #[serde(default)]
    pub family_name: String,
    #[serde(default)]
    pub given_name: String,
}

/// Competition and category context copied onto every extracted record.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TechniqueContext {
    pub competition_name: String,
    pub weight_class: String,
    pub gender: String,
    pub event_type: String,
}

pub fn extract(detail: &MatchDetail) -> Vec<Technique> {
    extract_with_context(detail, &TechniqueContext::default())
}

pub fn extract_with_context(detail: &MatchDetail, ctx: &TechniqueContext) -> Vec<Technique> {
    detail
        .events
        .iter()
        .filter_map(|event| extract_event(detail, ctx, event))
        .collect()
}

/// Cheap pre-check: does any event carry a non-structural tag?
pub fn has_techniques(detail: &MatchDetail) -> bool {
    detail
        .events
        .iter()
        .any(|event| event.tags.iter().any(|tag| !is_structural(tag)))
}

pub fn canonical_technique_name(raw: &str) -> String {
    raw.trim()
        .to_lowercase()
        .split(|c: char| c.is_whitespace() || c == '_' || c == '-')
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join("-")
}

pub fn is_excluded_hold(name: &str) -> bool {
    let canonical = canonical_technique_name(name);
    EXCLUDED_HOLDS.contains(&canonical.as_str())
}

pub fn technique_category_for(name: &str) -> &'static str {
    let canonical = canonical_technique_name(name);
    if canonical.ends_with("-jime") {
        "shime-waza"
    } else if canonical.contains("shiho-gatame") || canonical.contains("kesa-gatame") {
        "osaekomi-waza"
    } else if canonical.contains("garami") || canonical.ends_with("-gatame") {
        match canonical.as_str() {
            "kata-gatame" | "uki-gatame" | "ura-gatame" => "osaekomi-waza",
            _ => "kansetsu-waza",
        }
    } else {
        DEFAULT_TECHNIQUE_CATEGORY
    }
}

fn extract_event(detail: &MatchDetail, ctx: &TechniqueContext, event: &RawEvent) -> Option<Technique> {
    if event.tags.is_empty() {
        return None;
    }

    let first = event.tags.iter().find(|tag| !is_structural(tag))?;
    let technique_name = canonical_technique_name(&first.name);
    if technique_name.is_empty()
        || technique_name.starts_with("cancel")
        || is_excluded_hold(&technique_name)
    {
        return None;
    }

    let side = event
        .tags
        .iter()
        .find_map(|tag| direction_of(&tag.name))
        .unwrap_or_default();
    let (score, score_group) = score_for(event);

    let (competitor_id, competitor_name) = event
        .actors
        .first()
        .map(|actor| (actor.id_person.trim().to_string(), actor_name(actor)))
        .unwrap_or_default();
    let opponent = opponent_of(detail, &competitor_id);

    Some(Technique {
        competitor_id,
        competitor_name,
        opponent_id: opponent.map(|o| o.id.clone()),
        opponent_name: opponent.map(|o| o.name.clone()),
        opponent_country: opponent.map(|o| o.country.clone()),
        technique_category: technique_category_for(&technique_name).to_string(),
        technique_name,
        technique_type: first.group_name.trim().to_string(),
        side: side.to_string(),
        score,
        score_group,
        timestamp: event.time_sec.unwrap_or(0),
        note: event
            .tags
            .iter()
            .map(|tag| tag.name.trim())
            .collect::<Vec<_>>()
            .join(", "),
        competition_id: detail.competition_id,
        match_contest_code: detail.contest_code.clone(),
        competition_name: ctx.competition_name.clone(),
        weight_class: ctx.weight_class.clone(),
        gender: ctx.gender.clone(),
        event_type: ctx.event_type.clone(),
    })
}

fn normalized(value: &str) -> String {
    canonical_technique_name(value)
}

fn direction_of(name: &str) -> Option<&'static str> {
    match normalized(name).as_str() {
        "left" => Some("Left"),
        "right" => Some("Right"),
        _ => None,
    }
}

fn is_structural(tag: &EventTag) -> bool {
    let name = normalized(&tag.name);
    let group = normalized(&tag.group_name);
    direction_of(&tag.name).is_some()
        || HOLD_START_TAGS.contains(&name.as_str())
        || group.contains("shido")
        || group.contains("non-combativity")
}

fn score_for(event: &RawEvent) -> (i32, ScoreGroup) {
    let groups = event
        .tags
        .iter()
        .map(|tag| normalized(&tag.group_name))
        .collect::<Vec<_>>();
    for (group, score, score_group) in SCORE_PRIORITY {
        if groups.iter().any(|g| g.as_str() == *group) {
            return (*score, *score_group);
        }
    }
    let score = event.score.unwrap_or(0);
    (score, ScoreGroup::from_score(score))
}

fn actor_name(actor: &EventActor) -> String {
    format!("{} {}", actor.family_name.trim(), actor.given_name.trim())
        .trim()
        .to_string()
}

fn opponent_of<'a>(detail: &'a MatchDetail, performer_id: &str) -> Option<&'a CompetitorRef> {
    if detail.competitors.len() != 2 || performer_id.is_empty() {
        return None;
    }
    if !detail.competitors.iter().any(|c| c.id == performer_id) {
        return None;
    }
    detail.competitors.iter().find(|c| c.id != performer_id)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn actor(id: &str) -> EventActor {
        EventActor {
            id_person: id.to_string(),
            family_name: format!("FAMILY{id}"),
            given_name: format!("Given{id}"),
        }
    }

    fn event(tags: &[(&str, &str)], actor_id: &str, time_sec: i64) -> RawEvent {
        RawEvent {
            tags: tags.iter().map(|(n, g)| EventTag::new(*n, *g)).collect(),
            actors: vec![actor(actor_id)],
            time_sec: Some(time_sec),
            score: None,
        }
    }

    fn detail(events: Vec<RawEvent>) -> MatchDetail {
        MatchDetail {
            contest_code: "wc2023_m_0073_0012".to_string(),
            competition_id: 2653,
            match_number: Some(12),
            competitors: vec![
                CompetitorRef {
                    id: "101".to_string(),
                    name: "FAMILY101 Given101".to_string(),
                    country: "JPN".to_string(),
                },
                CompetitorRef {
                    id: "202".to_string(),
                    name: "FAMILY202 Given202".to_string(),
                    country: "FRA".to_string(),
                },
            ],
            events,
        }
    }

    fn mixed_match() -> MatchDetail {
        detail(vec![
            event(&[("Shido", "Shido")], "101", 30),
            event(&[("Ko-soto-gari", "Waza-ari"), ("Right", "Direction")], "101", 45),
            event(&[("Passivity", "Non-combativity")], "202", 61),
            event(&[("Seoi-nage", "Yuko"), ("Left", "Direction")], "202", 90),
            event(&[("Left", "Direction"), ("Ko-uchi-gari", "Yuko")], "101", 130),
            event(
                &[
                    ("Osaekomi", "Hold"),
                    ("Yoko-shiho-gatame", "Waza-ari-awasete-ippon"),
                    ("Left", "Direction"),
                ],
                "101",
                170,
            ),
        ])
    }

    #[test]
    fn penalties_are_excluded_and_techniques_kept_in_order() {
        let techniques = extract(&mixed_match());
        let tuples = techniques
            .iter()
            .map(|t| (t.technique_name.as_str(), t.score, t.side.as_str()))
            .collect::<Vec<_>>();
        assert_eq!(
            tuples,
            vec![
                ("ko-soto-gari", 7, "Right"),
                ("seoi-nage", 5, "Left"),
                ("ko-uchi-gari", 5, "Left"),
                ("yoko-shiho-gatame", 10, "Left"),
            ]
        );
        assert!(techniques
            .iter()
            .all(|t| t.score_group != ScoreGroup::Penalty));
        assert_eq!(techniques[0].score_group, ScoreGroup::WazaAri);
        assert_eq!(techniques[1].score_group, ScoreGroup::Yuko);
        assert_eq!(techniques[3].score_group, ScoreGroup::Ippon);
        assert_eq!(techniques[3].technique_category, "osaekomi-waza");
    }

    #[test]
    fn extraction_is_deterministic() {
        let input = mixed_match();
        assert_eq!(extract(&input), extract(&input));
    }

    #[test]
    fn performer_and_opponent_are_resolved() {
        let techniques = extract(&mixed_match());
        let first = &techniques[0];
        assert_eq!(first.competitor_id, "101");
        assert_eq!(first.competitor_name, "FAMILY101 Given101");
        assert_eq!(first.opponent_id.as_deref(), Some("202"));
        assert_eq!(first.opponent_country.as_deref(), Some("FRA"));
        assert_eq!(first.match_contest_code, "wc2023_m_0073_0012");
        assert_eq!(first.competition_id, 2653);
        assert_eq!(first.timestamp, 45);
        assert_eq!(first.technique_type, "Waza-ari");
        assert_eq!(first.note, "Ko-soto-gari, Right");

        let second = &techniques[1];
        assert_eq!(second.competitor_id, "202");
        assert_eq!(second.opponent_id.as_deref(), Some("101"));
    }

    #[test]
    fn holds_chokes_and_locks_never_appear() {
        let input = detail(vec![
            event(&[("Kesa-gatame", "Ippon")], "101", 10),
            event(&[("JUJI-GATAME", "Ippon")], "101", 20),
            event(&[("Hadaka jime", "Waza-ari")], "202", 30),
            event(&[("Uchi-mata", "Ippon")], "202", 40),
        ]);
        let techniques = extract(&input);
        assert_eq!(techniques.len(), 1);
        assert_eq!(techniques[0].technique_name, "uchi-mata");
    }

    #[test]
    fn cancellation_markers_are_discarded() {
        let input = detail(vec![
            event(&[("Cancel Waza-ari", "Waza-ari")], "101", 10),
            event(&[("CANCELLED", "Ippon")], "101", 11),
            event(&[("cancel", "")], "101", 12),
        ]);
        assert!(extract(&input).is_empty());
    }

    #[test]
    fn first_remaining_tag_wins() {
        let input = detail(vec![event(
            &[("Right", "Direction"), ("O-soto-gari", "Waza-ari"), ("Harai-goshi", "Waza-ari")],
            "101",
            5,
        )]);
        let techniques = extract(&input);
        assert_eq!(techniques.len(), 1);
        assert_eq!(techniques[0].technique_name, "o-soto-gari");
        assert_eq!(techniques[0].side, "Right");
    }

    #[test]
    fn score_falls_back_to_numeric_inference() {
        let mut ev = event(&[("Tai-otoshi", "Nage-waza")], "101", 5);
        ev.score = Some(7);
        let mut unscored = event(&[("Sumi-gaeshi", "Nage-waza")], "202", 6);
        unscored.score = None;

        let techniques = extract(&detail(vec![ev, unscored]));
        assert_eq!(techniques[0].score, 7);
        assert_eq!(techniques[0].score_group, ScoreGroup::WazaAri);
        assert_eq!(techniques[1].score, 0);
        assert_eq!(techniques[1].score_group, ScoreGroup::Unknown);
    }

    #[test]
    fn events_without_tags_or_actors_are_handled() {
        let bare = RawEvent {
            time_sec: Some(3),
            ..Default::default()
        };
        let mut anonymous = event(&[("Uchi-mata", "Ippon")], "101", 4);
        anonymous.actors.clear();

        let techniques = extract(&detail(vec![bare, anonymous]));
        assert_eq!(techniques.len(), 1);
        assert_eq!(techniques[0].competitor_id, "");
        assert_eq!(techniques[0].opponent_id, None);
    }

    #[test]
    fn context_is_stamped_on_every_record() {
        let ctx = TechniqueContext {
            competition_name: "World Championships Doha 2023".to_string(),
            weight_class: "-73 kg".to_string(),
            gender: "m".to_string(),
            event_type: "world-championships".to_string(),
        };
        let techniques = extract_with_context(&mixed_match(), &ctx);
        assert!(techniques
            .iter()
            .all(|t| t.weight_class == "-73 kg" && t.gender == "m"));
    }

    #[test]
    fn has_techniques_only_counts_non_structural_tags() {
        let structural = detail(vec![
            event(&[("Shido", "Shido")], "101", 1),
            event(&[("Left", "Direction")], "101", 2),
            RawEvent::default(),
        ]);
        assert!(!has_techniques(&structural));
        assert!(has_techniques(&mixed_match()));
    }

    #[test]
    fn canonical_names_and_categories() {
        assert_eq!(canonical_technique_name("  Ko Soto_Gari "), "ko-soto-gari");
        assert_eq!(technique_category_for("Uchi-mata"), "tachi-waza");
        assert_eq!(technique_category_for("hadaka-jime"), "shime-waza");
        assert_eq!(technique_category_for("juji-gatame"), "kansetsu-waza");
        assert_eq!(technique_category_for("kami-shiho-gatame"), "osaekomi-waza");
        assert!(is_excluded_hold("Ude Garami"));
        assert!(!is_excluded_hold("Yoko-shiho-gatame"));
    }
}
